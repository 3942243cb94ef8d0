pub mod core;
pub mod exchanges;

pub use core::{
    config::StreamConfig,
    errors::StreamError,
    kernel::{open, open_with_retry, DoneSignal, StopHandle, StreamHandle, TerminationReason},
};
pub use exchanges::binance::BinanceStreamClient;
