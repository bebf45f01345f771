/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Binance stream adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod http;
pub mod types;
pub mod ws;

pub use error::{BinanceError, Result};

// Re-export commonly used types from http
pub use http::{BinanceClient, ClientConfig, Credentials, RequestSigner};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionSession,
    Connector,
    MarketEvent,
    MarketFrame,
    SessionConfig,
    SessionEvent,
    SessionState,
    SubscriptionManager,
    TungsteniteConnector,
    decode_frame,
};
