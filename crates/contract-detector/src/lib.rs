pub mod address;
pub mod config;
pub mod detector;
pub mod error;
pub mod provider;
pub mod reachability;
pub mod token;

use std::sync::Arc;

use error::Error;

// Re-exports for convenience
pub use address::ContractAddress;
pub use config::DetectorConfig;
pub use detector::ContractDataDetector;
pub use provider::{AssetDefinitionStore, TokenProvider};
pub use reachability::Reachability;
pub use token::{ContractData, NonFungibleBalance, TokenType};

/// Detect a contract's token type and metadata, collecting every event.
///
/// This is the main entry point when the caller does not need incremental
/// progress. The last event is always terminal.
pub async fn detect(
    address: &str,
    provider: Arc<dyn TokenProvider>,
    reachability: Arc<dyn Reachability>,
) -> Result<Vec<ContractData>, Error> {
    detect_with_config(address, provider, reachability, DetectorConfig::default()).await
}

/// Like [`detect`], with explicit detector configuration.
pub async fn detect_with_config(
    address: &str,
    provider: Arc<dyn TokenProvider>,
    reachability: Arc<dyn Reachability>,
    config: DetectorConfig,
) -> Result<Vec<ContractData>, Error> {
    let address = ContractAddress::parse(address)?;
    let detector = ContractDataDetector::new(address, provider, reachability).with_config(config)?;
    Ok(detector.fetch_all().await)
}
