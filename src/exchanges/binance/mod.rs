pub mod streams;

// Re-export main types for easier importing
pub use streams::BinanceStreamClient;
