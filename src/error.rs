use crate::config::ConfigError;
use crate::marketplace::MarketplaceError;
use crate::telemetry::TelemetryError;

/// Failures that end a `serve` or `demo` run. Request-level failures stay `MarketplaceError`s and
/// are rendered by the marketplace router.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),
}
