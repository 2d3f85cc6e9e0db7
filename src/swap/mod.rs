//! Swap quote aggregation and execution

pub mod balance;
pub mod classifier;
pub mod engine;
pub mod events;
pub mod executor;
pub mod fee;
pub mod permission;
pub mod search;
pub mod selector;

pub use balance::BalanceSubscription;
pub use engine::{SwapEngine, SwapEngineDeps};
pub use events::{EngineEvent, PollingState, QuotesSnapshot, Side};
pub use executor::SwapExecutor;
pub use fee::resolve_fee;
pub use permission::PermissionFlowController;
pub use search::filter_tokens;
pub use selector::{PromoSignal, PromoState, Selection, SelectionMemory};
