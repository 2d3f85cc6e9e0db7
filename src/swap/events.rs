//! Events emitted by a swap session

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::selector::{self, PromoState};
use crate::error::Error;
use crate::models::{
    AggregateQuotes, ApproveData, AssetStatus, Fee, FeeTier, Provider, SwapProcessState,
    SwapState, TokenGroup,
};

/// Side of the swap a balance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    From,
    To,
}

/// Whether the session polls quotes, and why not when it does not.
///
/// Balance changes re-poll only while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollingState {
    #[default]
    Active,
    ScreenStopped,
    /// Approval dialog is open
    AwaitingPermission,
    /// An approval or swap is being broadcast
    Executing,
    /// The swap was sent; the session is finished
    SwapSent,
    /// The last poll failed as a whole; waits for a retry
    FetchFailed,
}

/// What the UI needs to render the quote area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotesSnapshot {
    pub selected_provider: Option<Provider>,
    pub displayed_provider: Option<Provider>,
    pub displayed_state: Option<SwapState>,
    pub quotes: AggregateQuotes,
    pub fee_tier: FeeTier,
    pub selected_fee: Option<Fee>,
    pub best_rated_provider: Option<String>,
    pub show_best_rate_badge: bool,
    /// Percentage each other provider returns relative to the selected one
    pub prices_lower_best: HashMap<String, Decimal>,
}

impl QuotesSnapshot {
    pub fn from_state(state: &SwapProcessState) -> Self {
        let quotes = &state.last_loaded_quotes;
        let prices_lower_best = state
            .selected_provider
            .as_ref()
            .map(|provider| selector::prices_lower_best(&provider.provider_id, quotes))
            .unwrap_or_default();

        Self {
            selected_provider: state.selected_provider.clone(),
            displayed_provider: state.displayed_provider().cloned(),
            displayed_state: state.displayed_state().cloned(),
            quotes: quotes.clone(),
            fee_tier: state.selected_fee_tier,
            selected_fee: state.selected_fee.clone(),
            best_rated_provider: selector::best_rated_provider(quotes)
                .or_else(|| state.displayed_provider())
                .map(|provider| provider.provider_id.clone()),
            show_best_rate_badge: selector::show_best_rate_badge(quotes),
            prices_lower_best,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A poll started; silent polls keep the current quotes on screen
    QuotesLoading { silent: bool },
    QuotesUpdated(QuotesSnapshot),
    /// The whole poll failed; polling stays stopped until retried
    QuotesFetchFailed { message: String },
    PromoProvider {
        provider_id: String,
        state: PromoState,
    },
    AmountUpdated {
        amount: String,
        minimum: Option<Decimal>,
    },
    TokensUpdated(TokenGroup),
    BalanceUpdated { side: Side, status: AssetStatus },
    PermissionRequested { approve_data: ApproveData, fee: Fee },
    ApprovalFailed { message: String },
    SwapSucceeded {
        provider_id: String,
        tx_hash: String,
        explorer_url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    DemoMode,
    SwapFailed { message: String },
}

impl EngineEvent {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged_by_variant() {
        let event = EngineEvent::AmountUpdated {
            amount: "12.5".to_string(),
            minimum: Some(Decimal::new(5, 1)),
        };
        let json = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["AmountUpdated"]["amount"], "12.5");
        assert_eq!(value["AmountUpdated"]["minimum"], "0.5");
        assert_eq!(
            EngineEvent::QuotesLoading { silent: true }.to_json().unwrap(),
            r#"{"QuotesLoading":{"silent":true}}"#
        );
    }

    #[test]
    fn test_empty_state_snapshot_serializes() {
        let snapshot = QuotesSnapshot::from_state(&SwapProcessState::default());
        assert_eq!(snapshot.best_rated_provider, None);
        assert!(EngineEvent::QuotesUpdated(snapshot).to_json().is_ok());
    }
}
