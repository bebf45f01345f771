/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod public;
pub mod signature;

pub use signature::RequestSigner;

pub use client::{BinanceClient, ClientConfig, Credentials, DEFAULT_API_URL};
