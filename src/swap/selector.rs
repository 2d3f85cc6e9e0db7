//! Provider selection
//!
//! Picks the provider whose quote is shown and executed after every poll. A user choice is
//! sticky until the user edits the amount again; a fresh choice prefers the recommended
//! provider, then the best price, then the first considered provider.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::{AggregateQuotes, Provider, QuotesLoaded};

/// Selection state carried across polls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionMemory {
    pub selected_provider: Option<Provider>,
    /// Set by an amount edit, consumed by the next selection
    pub amount_changed_by_user: bool,
}

/// Whether the recommended provider also has the best price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromoState {
    Native,
    Recommended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoSignal {
    pub provider_id: String,
    pub state: PromoState,
}

/// Result of one selection round
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Provider to execute with; `None` when nothing is selectable
    pub selected: Option<Provider>,
    /// Provider whose state the UI shows
    pub displayed: Option<Provider>,
    /// Only emitted when a provider is chosen from scratch
    pub promo: Option<PromoSignal>,
}

/// Lowest price ratio wins, ties go to the earlier provider. A quote without a usable ratio
/// only wins when no candidate has one.
pub fn best_by_price<'a, I>(candidates: I) -> Option<&'a Provider>
where
    I: IntoIterator<Item = (&'a Provider, &'a QuotesLoaded)>,
{
    let mut best: Option<(&Provider, Option<Decimal>)> = None;
    for (provider, quote) in candidates {
        let ratio = quote.price_ratio();
        best = match best {
            None => Some((provider, ratio)),
            Some((_, Some(best_ratio))) if ratio.map_or(false, |r| r < best_ratio) => {
                Some((provider, ratio))
            }
            Some((_, None)) if ratio.is_some() => Some((provider, ratio)),
            keep => keep,
        };
    }
    best.map(|(provider, _)| provider)
}

/// Select the provider for a freshly loaded aggregate
pub fn select(quotes: &AggregateQuotes, memory: &mut SelectionMemory) -> Selection {
    let considered: Vec<&Provider> = quotes.considered().collect();
    let Some(first_considered) = considered.first().copied() else {
        return Selection {
            selected: None,
            displayed: quotes.first_provider().cloned(),
            promo: None,
        };
    };

    let best = best_by_price(quotes.loaded());
    let previous = memory.selected_provider.as_ref().and_then(|previous| {
        considered
            .iter()
            .copied()
            .find(|provider| provider.provider_id == previous.provider_id)
    });

    let (chosen, promo) = match previous {
        Some(previous) if memory.amount_changed_by_user => (best.unwrap_or(previous), None),
        Some(previous) => (previous, None),
        None => {
            let recommended = quotes
                .loaded()
                .map(|(provider, _)| provider)
                .find(|provider| provider.is_recommended);
            let promo = promo_signal(recommended, best);
            let chosen = recommended.or(best).unwrap_or(first_considered);
            (chosen, promo)
        }
    };

    memory.amount_changed_by_user = false;
    memory.selected_provider = Some(chosen.clone());

    Selection {
        selected: Some(chosen.clone()),
        displayed: Some(chosen.clone()),
        promo,
    }
}

fn promo_signal(recommended: Option<&Provider>, best: Option<&Provider>) -> Option<PromoSignal> {
    let recommended = recommended?;
    let state = if best.map_or(false, |best| best.provider_id == recommended.provider_id) {
        PromoState::Native
    } else {
        PromoState::Recommended
    };
    Some(PromoSignal {
        provider_id: recommended.provider_id.clone(),
        state,
    })
}

/// How much less each other loaded provider returns compared to the selected one, as a
/// percentage rounded half-up to 2 places. Providers returning nothing are skipped.
pub fn prices_lower_best(selected_id: &str, quotes: &AggregateQuotes) -> HashMap<String, Decimal> {
    let Some(selected_to) = quotes
        .get(selected_id)
        .and_then(|state| state.as_loaded())
        .map(|loaded| loaded.to.amount)
    else {
        return HashMap::new();
    };

    quotes
        .loaded()
        .filter(|(provider, _)| provider.provider_id != selected_id)
        .filter_map(|(provider, loaded)| {
            let ratio = selected_to.checked_div(loaded.to.amount)?;
            let percent = ((Decimal::ONE - ratio) * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Some((provider.provider_id.clone(), percent))
        })
        .collect()
}

/// Provider with the best price among loaded quotes, shown with a badge when more than one
/// provider is considered
pub fn best_rated_provider(quotes: &AggregateQuotes) -> Option<&Provider> {
    best_by_price(quotes.loaded())
}

pub fn show_best_rate_badge(quotes: &AggregateQuotes) -> bool {
    quotes.considered().count() > 1
}
