//! Turns raw provider answers into per-provider [`SwapState`]s

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};

use super::permission::PermissionFlowController;
use crate::models::{
    AggregateQuotes, ExpressError, Provider, QuoteWarning, QuotesLoaded, SwapAmount,
    SwapErrorState, SwapState, TokenSwapInfo,
};
use crate::sources::{QuoteRequest, RawQuote, RawQuoteOutcome};

/// Every provider of the request gets [`SwapState::EmptyAmount`]
pub fn empty_amount(providers: &[Provider]) -> AggregateQuotes {
    AggregateQuotes::new(
        providers
            .iter()
            .map(|provider| (provider.clone(), SwapState::EmptyAmount))
            .collect(),
    )
}

/// Classify the answers of one poll. The result keeps the provider order of the request;
/// a provider without an answer is `ProviderUnavailable`.
pub fn classify(
    request: &QuoteRequest,
    amount: SwapAmount,
    mut outcomes: HashMap<String, RawQuoteOutcome>,
    permissions: &PermissionFlowController,
) -> AggregateQuotes {
    let entries = request
        .providers
        .iter()
        .map(|provider| {
            let state = match outcomes.remove(&provider.provider_id) {
                Some(RawQuoteOutcome::Quote(raw)) => SwapState::QuotesLoaded(loaded_state(
                    request,
                    amount,
                    provider,
                    raw,
                    permissions,
                )),
                Some(RawQuoteOutcome::Failed(error)) => error_state(request, amount, error),
                None => error_state(request, amount, ExpressError::ProviderUnavailable),
            };
            (provider.clone(), state)
        })
        .collect();

    AggregateQuotes::new(entries)
}

fn loaded_state(
    request: &QuoteRequest,
    amount: SwapAmount,
    provider: &Provider,
    raw: RawQuote,
    permissions: &PermissionFlowController,
) -> QuotesLoaded {
    let from_fiat = raw
        .from_amount_fiat
        .or_else(|| request.from.fiat_value(amount.value));
    let to_fiat = raw
        .to_amount_fiat
        .or_else(|| request.to.fiat_value(raw.to_amount));
    let permission_state = permissions.permission_state(provider, &request.from, &raw.allowance);

    let mut warnings = Vec::new();
    if let Some(balance) = request.from.balance {
        if amount.value + request.reduce_balance_by > balance {
            warnings.push(QuoteWarning::InsufficientBalance { available: balance });
        }
    }

    QuotesLoaded {
        from: TokenSwapInfo {
            asset: request.from.asset.clone(),
            amount: amount.value,
            amount_fiat: from_fiat,
        },
        to: TokenSwapInfo {
            asset: request.to.asset.clone(),
            amount: raw.to_amount,
            amount_fiat: to_fiat,
        },
        fee_info: raw.fee_info,
        permission_state,
        swap_payload: raw.swap_payload,
        include_fee_in_amount: raw.include_fee_in_amount,
        price_impact: price_impact(from_fiat, to_fiat),
        warnings,
    }
}

fn error_state(request: &QuoteRequest, amount: SwapAmount, error: ExpressError) -> SwapState {
    SwapState::Error(SwapErrorState {
        error,
        from: TokenSwapInfo {
            asset: request.from.asset.clone(),
            amount: amount.value,
            amount_fiat: request.from.fiat_value(amount.value),
        },
        include_fee_in_amount: false,
    })
}

/// Share of fiat value lost in the swap, `1 - to / from`, rounded half-up to 2 places
pub fn price_impact(from_fiat: Option<Decimal>, to_fiat: Option<Decimal>) -> Option<Decimal> {
    let from_fiat = from_fiat.filter(|v| !v.is_zero())?;
    let to_fiat = to_fiat?;
    let ratio = to_fiat.checked_div(from_fiat)?;
    Some((Decimal::ONE - ratio).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}
