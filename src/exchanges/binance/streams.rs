use crate::core::config::{StreamConfig, DEFAULT_STREAM_BASE_URL};
use crate::core::errors::StreamError;
use crate::core::kernel::{open, ErrorHandler, MessageHandler, StreamHandle, WsConfig};
use tracing::instrument;

/// Builds Binance stream endpoints and opens sessions on them
///
/// A raw client serves exactly one stream per connection at
/// `<base>/ws/<stream>`; a combined client multiplexes any number of streams
/// at `<base>/stream?streams=<a>/<b>`, where each payload arrives wrapped as
/// `{"stream": ..., "data": ...}`.
#[derive(Debug, Clone)]
pub struct BinanceStreamClient {
    base_url: String,
    combined: bool,
    ws_config: WsConfig,
}

impl BinanceStreamClient {
    pub fn new(combined: bool) -> Self {
        Self {
            base_url: DEFAULT_STREAM_BASE_URL.to_string(),
            combined,
            ws_config: WsConfig::default(),
        }
    }

    pub fn from_config(config: &StreamConfig, combined: bool) -> Self {
        Self {
            base_url: config.stream_base_url().to_string(),
            combined,
            ws_config: config.ws_config(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    pub fn is_combined(&self) -> bool {
        self.combined
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint prefix that stream names are appended to.
    pub fn endpoint(&self) -> String {
        if self.combined {
            format!("{}/stream?streams=", self.base_url)
        } else {
            format!("{}/ws", self.base_url)
        }
    }

    pub fn stream_url(&self, streams: &[impl AsRef<str>]) -> Result<String, StreamError> {
        if streams.is_empty() {
            return Err(StreamError::InvalidParameters(
                "at least one stream is required".to_string(),
            ));
        }

        if self.combined {
            let joined = streams
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join("/");
            return Ok(format!("{}{}", self.endpoint(), joined));
        }

        match streams {
            [stream] => Ok(format!("{}/{}", self.endpoint(), stream.as_ref())),
            _ => Err(StreamError::InvalidParameters(format!(
                "raw stream endpoint takes exactly one stream, got {}",
                streams.len()
            ))),
        }
    }

    #[instrument(skip_all, fields(combined = self.combined, stream_count = streams.len()))]
    pub async fn subscribe<M, E>(
        &self,
        streams: &[impl AsRef<str>],
        on_message: M,
        on_error: E,
    ) -> Result<StreamHandle, StreamError>
    where
        M: MessageHandler,
        E: ErrorHandler,
    {
        let url = self.stream_url(streams)?;
        open(&url, &self.ws_config, on_message, on_error).await
    }
}

impl Default for BinanceStreamClient {
    fn default() -> Self {
        Self::new(false)
    }
}

pub fn agg_trade(symbol: &str) -> String {
    format!("{}@aggTrade", symbol.to_lowercase())
}

pub fn trade(symbol: &str) -> String {
    format!("{}@trade", symbol.to_lowercase())
}

/// `interval` uses Binance notation, e.g. `1m`, `4h`, `1M`.
pub fn kline(symbol: &str, interval: &str) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval)
}

pub fn mini_ticker(symbol: &str) -> String {
    format!("{}@miniTicker", symbol.to_lowercase())
}

pub fn all_mini_tickers() -> String {
    "!miniTicker@arr".to_string()
}

pub fn ticker(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

pub fn book_ticker(symbol: &str) -> String {
    format!("{}@bookTicker", symbol.to_lowercase())
}

/// Partial book depth; `levels` is 5, 10 or 20 and `update_speed_ms` 100 or 1000.
pub fn depth(symbol: &str, levels: u8, update_speed_ms: Option<u16>) -> String {
    match update_speed_ms {
        Some(speed) => format!("{}@depth{}@{}ms", symbol.to_lowercase(), levels, speed),
        None => format!("{}@depth{}", symbol.to_lowercase(), levels),
    }
}

/// Diff depth updates.
pub fn diff_depth(symbol: &str, update_speed_ms: Option<u16>) -> String {
    match update_speed_ms {
        Some(speed) => format!("{}@depth@{}ms", symbol.to_lowercase(), speed),
        None => format!("{}@depth", symbol.to_lowercase()),
    }
}

/// User data streams are addressed by the listen key itself.
pub fn user_data(listen_key: &str) -> String {
    listen_key.to_string()
}
