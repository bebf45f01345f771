/*
[INPUT]:  Stream endpoint configuration and subscription requests
[OUTPUT]: Resilient stream session, subscription replay, decoded market events
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod backoff;
pub mod config;
pub mod message;
pub mod session;
pub mod stream;
pub mod subscription;
pub mod transport;

pub use backoff::BackoffSchedule;
pub use config::{DEFAULT_STREAM_URL, SessionConfig};
pub use message::{MarketEvent, MarketFrame, decode_frame};
pub use session::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, ConnectionSession, SessionEvent, SessionState,
};
pub use stream::{
    ALL_TICKERS_STREAM, depth_stream, diff_depth_stream, kline_stream, ticker_stream,
    trade_stream,
};
pub use subscription::{ControlMessage, ControlMethod, RequestIdGenerator, SubscriptionManager};
pub use transport::{Connector, TungsteniteConnector, WsMessage, WsReader, WsWriter};
