pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod simulation;
pub mod sources;
pub mod swap;
pub mod utils;

pub use config::EngineConfig;
pub use error::Error;
pub use logging::{setup_logging, LoggingConfig};
pub use swap::{
    EngineEvent, PollingState, QuotesSnapshot, Side, SwapEngine, SwapEngineDeps,
};

// Re-export common model types
pub use models::{
    AggregateQuotes, ApproveData, ApproveType, Asset, AssetStatus, ExpressError, Fee, FeeInfo,
    FeeTier, PermissionState, Provider, ProviderType, QuotesLoaded, SwapProcessState, SwapState,
    TokenGroup, TokensData,
};
pub use sources::{
    BalanceStream, MinimumAmountSource, QuoteSource, TransactionFacade, TxOutcome,
};

// Re-export the decimal type used for all amounts
pub use rust_decimal::Decimal;
