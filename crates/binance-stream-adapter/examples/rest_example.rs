/*
[INPUT]:  Public Binance REST endpoint
[OUTPUT]: Server time and symbol metadata printed to stdout
[POS]:    Examples - REST client usage
[UPDATE]: When public endpoints change
*/

use binance_stream_adapter::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Binance REST Example ===\n");

    let client = BinanceClient::new()?;
    client.ping().await?;
    println!("✓ API reachable");

    let time = client.server_time().await?;
    println!("✓ Server time: {}", time.server_time);

    let info = client.exchange_info(Some("BTCUSDT")).await?;
    for symbol in &info.symbols {
        println!("  {} {} ({}/{})", symbol.symbol, symbol.status, symbol.base_asset, symbol.quote_asset);
    }
    Ok(())
}
