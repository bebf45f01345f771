/*
[INPUT]:  Stream endpoint URL
[OUTPUT]: Split writer/reader halves of one physical WebSocket
[POS]:    WebSocket layer - transport seam between session and socket library
[UPDATE]: When changing TLS setup or swapping the socket implementation
*/

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
pub use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::error::{BinanceError, Result};

/// Outbound half of a connection
pub type WsWriter = Pin<Box<dyn Sink<WsMessage, Error = BinanceError> + Send>>;

/// Inbound half of a connection
pub type WsReader = Pin<Box<dyn Stream<Item = Result<WsMessage>> + Send>>;

/// Opens physical connections for a session.
///
/// Each call must return a brand new socket; the session never reuses halves
/// across reconnects.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(WsWriter, WsReader)>;
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connector")
    }
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(WsWriter, WsReader)> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "websocket upgrade completed");

        let (write, read) = ws_stream.split();
        let writer = write.sink_map_err(BinanceError::from);
        let reader = read.map(|frame| frame.map_err(BinanceError::from));

        Ok((Box::pin(writer), Box::pin(reader)))
    }
}
