/*
[INPUT]:  Public Binance stream endpoint
[OUTPUT]: Decoded trades and depth snapshots printed to stdout
[POS]:    Examples - subscription manager usage
[UPDATE]: When the subscription API changes
*/

use binance_stream_adapter::types::DepthLevel;
use binance_stream_adapter::ws::{depth_stream, trade_stream};
use binance_stream_adapter::*;
use tokio::time::{Duration, timeout};

/// Example: subscribe to BTCUSDT trades and top-5 depth for 20 seconds
#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Binance Stream Example ===\n");

    let mut manager = SubscriptionManager::new(SessionConfig::default())?;
    let mut events = manager.take_receiver().expect("Receiver already taken");

    manager.subscribe([
        trade_stream("BTCUSDT"),
        depth_stream("BTCUSDT", DepthLevel::Five),
    ])?;
    manager.connect()?;
    println!("✓ Connecting to {}", manager.session().url());

    let run = async {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Opened { generation } => println!("✓ Connected (generation {generation})"),
                SessionEvent::Message { payload, .. } => match decode_frame(&payload) {
                    Ok(frame) => match frame.event {
                        MarketEvent::Trade(trade) => {
                            println!("trade {} {} @ {}", trade.symbol, trade.quantity, trade.price)
                        }
                        MarketEvent::PartialDepth(depth) => println!(
                            "depth bid {:?} ask {:?}",
                            depth.bids.first().map(|level| level.price()),
                            depth.asks.first().map(|level| level.price())
                        ),
                        other => println!("{}", other.kind()),
                    },
                    Err(err) => println!("✗ decode failed: {err}"),
                },
                other => println!("{other:?}"),
            }
        }
    };
    let _ = timeout(Duration::from_secs(20), run).await;

    manager.shutdown_and_wait().await;
    println!("\n✓ Stream example complete");
    Ok(())
}
