use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument, Span};

use super::fee::resolve_for_state;
use crate::error::Error;
use crate::models::{SwapAmount, SwapProcessState, SwapState};
use crate::sources::{BalanceStream, SwapRequest, TransactionFacade, TxOutcome};

/// Executes the selected quote and schedules the follow-up balance refresh
pub struct SwapExecutor {
    transactions: Arc<dyn TransactionFacade>,
    balances: Arc<dyn BalanceStream>,
    refresh_delay: Duration,
}

impl SwapExecutor {
    pub fn new(
        transactions: Arc<dyn TransactionFacade>,
        balances: Arc<dyn BalanceStream>,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            transactions,
            balances,
            refresh_delay,
        }
    }

    pub fn transactions(&self) -> &dyn TransactionFacade {
        self.transactions.as_ref()
    }

    /// Check the swap preconditions against the session state
    pub fn prepare(state: &SwapProcessState) -> Result<SwapRequest, Error> {
        let provider = state
            .selected_provider
            .clone()
            .ok_or(Error::MissingSelectedProvider)?;
        let from = state
            .from_asset
            .clone()
            .ok_or_else(|| Error::MissingAsset("source asset".to_string()))?;
        let to = state
            .to_asset
            .clone()
            .ok_or_else(|| Error::MissingAsset("destination asset".to_string()))?;

        let swap_state = state.last_loaded_quotes.get(&provider.provider_id);
        let quote = match swap_state {
            Some(SwapState::QuotesLoaded(loaded)) => loaded.clone(),
            _ => return Err(Error::QuoteNotLoaded(provider.provider_id.clone())),
        };
        if quote.permission_state.blocks_swap() {
            return Err(Error::PermissionRequired(provider.provider_id.clone()));
        }

        let fee = state
            .selected_fee
            .clone()
            .or_else(|| swap_state.and_then(|s| resolve_for_state(s, state.selected_fee_tier)))
            .ok_or_else(|| {
                Error::FeeUnavailable(format!("no fee for '{}'", provider.provider_id))
            })?;

        let amount = SwapAmount::from_input(&state.amount, from.asset.decimals)
            .filter(|amount| !amount.is_zero())
            .ok_or_else(|| Error::InvalidAmount(state.amount.clone()))?;

        Ok(SwapRequest {
            provider,
            from,
            to,
            amount,
            quote,
            payload: state.pending_swap_payload.clone(),
            fee,
        })
    }

    /// Build and broadcast the swap. Facade errors are reported as [`TxOutcome::Error`].
    pub async fn execute(&self, request: &SwapRequest) -> TxOutcome {
        info!(
            provider = %request.provider.provider_id,
            from = %request.from.asset.id,
            to = %request.to.asset.id,
            amount = %request.amount.value,
            "Executing swap"
        );
        match self.transactions.build_and_send(request).await {
            Ok(TxOutcome::Error { message }) => {
                warn!(error = %message, "Swap rejected");
                TxOutcome::Error { message }
            }
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Swap failed");
                TxOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Refresh balances of `network` once the configured delay has passed
    pub fn schedule_balance_refresh(&self, network: String) -> JoinHandle<()> {
        let balances = Arc::clone(&self.balances);
        let delay = self.refresh_delay;
        tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = balances.refresh(&network).await {
                    warn!(network = %network, error = %e, "Balance refresh failed");
                }
            }
            .instrument(Span::current()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AggregateQuotes, Asset, AssetStatus, Fee, FeeInfo, PermissionState, Provider,
        ProviderType, QuotesLoaded, TokenSwapInfo,
    };
    use rust_decimal::Decimal;

    fn loaded(permission_state: PermissionState, fee_info: Option<FeeInfo>) -> SwapState {
        SwapState::QuotesLoaded(QuotesLoaded {
            from: TokenSwapInfo {
                asset: Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
                amount: Decimal::ONE,
                amount_fiat: None,
            },
            to: TokenSwapInfo {
                asset: Asset::coin("bnb", "BNB", "BNB", 18, "bsc"),
                amount: Decimal::TEN,
                amount_fiat: None,
            },
            fee_info,
            permission_state,
            swap_payload: None,
            include_fee_in_amount: false,
            price_impact: None,
            warnings: Vec::new(),
        })
    }

    fn state(swap_state: SwapState) -> SwapProcessState {
        let provider = Provider::new("a", "A", ProviderType::Dex);
        SwapProcessState {
            from_asset: Some(AssetStatus::new(
                Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
                Some(Decimal::TEN),
                None,
            )),
            to_asset: Some(AssetStatus::new(
                Asset::coin("bnb", "BNB", "BNB", 18, "bsc"),
                None,
                None,
            )),
            amount: "1".to_string(),
            selected_provider: Some(provider.clone()),
            last_loaded_quotes: AggregateQuotes::new(vec![(provider, swap_state)]),
            ..SwapProcessState::default()
        }
    }

    #[test]
    fn test_prepare_preconditions() {
        let mut missing = state(SwapState::EmptyAmount);
        missing.selected_provider = None;
        assert!(matches!(
            SwapExecutor::prepare(&missing),
            Err(Error::MissingSelectedProvider)
        ));

        assert!(matches!(
            SwapExecutor::prepare(&state(SwapState::EmptyAmount)),
            Err(Error::QuoteNotLoaded(_))
        ));

        let pending = state(loaded(PermissionState::InProgress, None));
        assert!(matches!(
            SwapExecutor::prepare(&pending),
            Err(Error::PermissionRequired(_))
        ));

        let no_fee = state(loaded(PermissionState::NotNeeded, None));
        assert!(matches!(
            SwapExecutor::prepare(&no_fee),
            Err(Error::FeeUnavailable(_))
        ));
    }

    #[test]
    fn test_prepare_resolves_fee_from_quote() {
        let ready = state(loaded(
            PermissionState::NotNeeded,
            Some(FeeInfo::Single(Fee::new(Decimal::new(3, 3)))),
        ));
        let request = SwapExecutor::prepare(&ready).unwrap();
        assert_eq!(request.fee.amount, Decimal::new(3, 3));
        assert_eq!(request.amount.value, Decimal::ONE);
    }
}
