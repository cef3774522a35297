use thiserror::Error;

/// Problems with the externally supplied configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("claimant pool is empty; add at least one entry under [claimants].pool")]
    EmptyClaimantPool,

    #[error("invalid window timing: {0}")]
    Window(String),

    #[error("invalid burst settings: {0}")]
    Burst(String),

    #[error("invalid endpoint {field}: {reason}")]
    Endpoint { field: &'static str, reason: String },
}
