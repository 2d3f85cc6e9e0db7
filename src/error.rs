use thiserror::Error;

/// SDK Error type
#[derive(Error, Debug)]
pub enum Error {
    /// The quote source failed for the whole poll
    #[error("Quote source error: {0}")]
    QuoteSource(String),

    /// Transaction building or broadcasting failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Balance stream error
    #[error("Balance error: {0}")]
    Balance(String),

    /// Operation exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A swap was confirmed without a selected provider
    #[error("No provider is selected")]
    MissingSelectedProvider,

    /// The selected provider has no loaded quote
    #[error("Selected provider '{0}' has no loaded quote")]
    QuoteNotLoaded(String),

    /// The selected quote still needs an allowance grant
    #[error("Permission must be granted before swapping with '{0}'")]
    PermissionRequired(String),

    /// Fee information is absent for the requested action
    #[error("Fee is unavailable: {0}")]
    FeeUnavailable(String),

    /// Approval was requested but the quote carried no approval payload
    #[error("No approval data is available")]
    MissingApprovalData,

    /// Source or destination asset has not been chosen yet
    #[error("Missing asset: {0}")]
    MissingAsset(String),

    /// Amount input could not be interpreted
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a violated precondition of a user action rather than a runtime
    /// failure. These abort the action and are never retried automatically.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::MissingSelectedProvider
                | Error::QuoteNotLoaded(_)
                | Error::PermissionRequired(_)
                | Error::FeeUnavailable(_)
                | Error::MissingApprovalData
                | Error::MissingAsset(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
