//! Collaborator seams
//!
//! The engine talks to the outside world only through these traits: a quote source that
//! asks every provider at once, a transaction facade that builds and broadcasts swaps and
//! approvals, a balance stream per asset and a minimum-amount lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{
    ApproveData, ApproveType, Asset, AssetStatus, ExpressError, Fee, FeeInfo, FeeTier, Provider,
    QuotesLoaded, SwapAmount, SwapPayload,
};

/// Request for one quote poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub from: AssetStatus,
    pub to: AssetStatus,
    /// Raw amount text as entered, already cut to the source decimals
    pub amount: String,
    pub reduce_balance_by: Decimal,
    /// Providers to ask, in display order
    pub providers: Vec<Provider>,
    pub fee_tier: FeeTier,
}

impl QuoteRequest {
    pub fn parsed_amount(&self) -> Option<SwapAmount> {
        SwapAmount::from_input(&self.amount, self.from.asset.decimals)
    }
}

/// Allowance answer for a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowanceStatus {
    NotRequired,
    Required(ApproveData),
}

/// Quote as returned by a provider, before classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    pub to_amount: Decimal,
    /// Overrides the fiat value derived from the asset rate
    pub from_amount_fiat: Option<Decimal>,
    /// Overrides the fiat value derived from the asset rate
    pub to_amount_fiat: Option<Decimal>,
    pub fee_info: Option<FeeInfo>,
    pub allowance: AllowanceStatus,
    pub swap_payload: Option<SwapPayload>,
    pub include_fee_in_amount: bool,
}

/// What a single provider answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawQuoteOutcome {
    Quote(RawQuote),
    Failed(ExpressError),
}

/// Outcome of a broadcast swap or approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    TxSent {
        tx_hash: String,
        explorer_url: Option<String>,
    },
    /// The wallet is a demo wallet; nothing was broadcast
    DemoMode,
    Error {
        message: String,
    },
}

pub type ApprovalOutcome = TxOutcome;

/// Everything needed to execute the selected quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub provider: Provider,
    pub from: AssetStatus,
    pub to: AssetStatus,
    pub amount: SwapAmount,
    pub quote: QuotesLoaded,
    pub payload: Option<SwapPayload>,
    pub fee: Fee,
}

/// Everything needed to grant an allowance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub provider: Provider,
    pub asset: Asset,
    pub approve_data: ApproveData,
    pub approve_type: ApproveType,
    pub fee: Fee,
}

/// Quote aggregation backend
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Ask every provider of the request for a quote. Providers missing from the result
    /// did not answer. An `Err` means the whole poll failed.
    async fn fetch(&self, request: &QuoteRequest)
        -> Result<HashMap<String, RawQuoteOutcome>, Error>;
}

/// Wallet-side transaction building and broadcasting
#[async_trait]
pub trait TransactionFacade: Send + Sync {
    async fn build_and_send(&self, request: &SwapRequest) -> Result<TxOutcome, Error>;

    async fn build_approval(&self, request: &ApprovalRequest) -> Result<ApprovalOutcome, Error>;
}

/// Live balances
#[async_trait]
pub trait BalanceStream: Send + Sync {
    /// Stream of status updates for one asset. Dropping the stream ends the subscription.
    fn subscribe(&self, asset: &Asset) -> Result<BoxStream<'static, AssetStatus>, Error>;

    /// Ask the backend to reload balances of a network
    async fn refresh(&self, network: &str) -> Result<(), Error>;
}

/// Minimum sendable amount per asset, used as an amount hint
#[async_trait]
pub trait MinimumAmountSource: Send + Sync {
    async fn minimum_amount(&self, asset: &Asset) -> Option<Decimal>;
}
