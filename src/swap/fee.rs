use crate::models::{Fee, FeeInfo, FeeTier, SwapState};

/// Resolve the concrete fee for a tier. A single fee ignores the tier.
pub fn resolve_fee(fee_info: &FeeInfo, tier: FeeTier) -> Fee {
    match (fee_info, tier) {
        (FeeInfo::Single(fee), _) => fee.clone(),
        (FeeInfo::Choosable { normal, .. }, FeeTier::Normal) => normal.clone(),
        (FeeInfo::Choosable { priority, .. }, FeeTier::Priority) => priority.clone(),
    }
}

/// Fee of a quote state for a tier, if the state is a loaded quote with fee info
pub fn resolve_for_state(state: &SwapState, tier: FeeTier) -> Option<Fee> {
    state
        .as_loaded()
        .and_then(|loaded| loaded.fee_info.as_ref())
        .map(|fee_info| resolve_fee(fee_info, tier))
}

impl FeeTier {
    pub fn toggled(self) -> Self {
        match self {
            FeeTier::Normal => FeeTier::Priority,
            FeeTier::Priority => FeeTier::Normal,
        }
    }
}
