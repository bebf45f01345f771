/*
[INPUT]:  Binance stream parameters
[OUTPUT]: Typed Rust enums for stream naming
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When new stream parameters are supported
*/

use crate::error::BinanceError;

/// Partial book depth levels offered by `<symbol>@depth<levels>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DepthLevel {
    #[default]
    Five,
    Ten,
    Twenty,
}

impl DepthLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            DepthLevel::Five => 5,
            DepthLevel::Ten => 10,
            DepthLevel::Twenty => 20,
        }
    }
}

impl TryFrom<u8> for DepthLevel {
    type Error = BinanceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DepthLevel::Five),
            10 => Ok(DepthLevel::Ten),
            20 => Ok(DepthLevel::Twenty),
            other => Err(BinanceError::Config(format!(
                "depth level must be 5, 10 or 20, got {other}"
            ))),
        }
    }
}
