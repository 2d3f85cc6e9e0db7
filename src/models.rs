//! Swap Data Model
//!
//! Providers, assets, amounts, fees and the per-provider quote states that the engine
//! aggregates. Everything here is plain data; behaviour lives in the `swap` module.

use std::hash::{Hash, Hasher};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Providers
// ============================================================================

/// How a provider settles a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    /// On-chain aggregator, may require an allowance
    Dex,
    /// On-chain bridge between networks, may require an allowance
    DexBridge,
    /// Custodial exchange, deposit based, never requires an allowance
    Cex,
}

/// An exchange provider able to quote and execute swaps.
///
/// Providers are compared and hashed by `provider_id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: String,
    pub name: String,
    pub provider_type: ProviderType,
    pub is_recommended: bool,
}

impl Provider {
    pub fn new(provider_id: &str, name: &str, provider_type: ProviderType) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            name: name.to_string(),
            provider_type,
            is_recommended: false,
        }
    }

    pub fn recommended(mut self) -> Self {
        self.is_recommended = true;
        self
    }

    pub fn supports_allowance(&self) -> bool {
        !matches!(self.provider_type, ProviderType::Cex)
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        self.provider_id == other.provider_id
    }
}

impl Eq for Provider {}

impl Hash for Provider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider_id.hash(state);
    }
}

// ============================================================================
// Assets and amounts
// ============================================================================

/// Whether an asset is a network's native coin or a contract token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Coin,
    Token { contract_address: String },
}

/// A currency on a specific network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub network: String,
    pub kind: AssetKind,
}

impl Asset {
    pub fn coin(id: &str, symbol: &str, name: &str, decimals: u32, network: &str) -> Self {
        Self {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            network: network.to_string(),
            kind: AssetKind::Coin,
        }
    }

    pub fn token(
        id: &str,
        symbol: &str,
        name: &str,
        decimals: u32,
        network: &str,
        contract_address: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            network: network.to_string(),
            kind: AssetKind::Token {
                contract_address: contract_address.to_string(),
            },
        }
    }

    /// Two assets can be swapped into each other only if their ids differ
    pub fn is_swap_distinct(&self, other: &Asset) -> bool {
        self.id != other.id
    }

    pub fn contract_address(&self) -> Option<&str> {
        match &self.kind {
            AssetKind::Coin => None,
            AssetKind::Token { contract_address } => Some(contract_address),
        }
    }
}

/// An asset together with its live balance and fiat rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatus {
    pub asset: Asset,
    /// `None` while the balance is still loading
    pub balance: Option<Decimal>,
    /// Price of one unit in the app's fiat currency
    pub fiat_rate: Option<Decimal>,
}

impl AssetStatus {
    pub fn new(asset: Asset, balance: Option<Decimal>, fiat_rate: Option<Decimal>) -> Self {
        Self {
            asset,
            balance,
            fiat_rate,
        }
    }

    pub fn available_balance(&self) -> Decimal {
        self.balance.unwrap_or(Decimal::ZERO)
    }

    pub fn is_zero_balance(&self) -> bool {
        self.available_balance().is_zero()
    }

    pub fn fiat_value(&self, amount: Decimal) -> Option<Decimal> {
        self.fiat_rate.map(|rate| rate * amount)
    }
}

/// A decimal amount scoped to an asset's precision.
///
/// The value is always truncated (rounded toward zero) to `decimals` places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapAmount {
    pub value: Decimal,
    pub decimals: u32,
}

impl SwapAmount {
    pub fn new(value: Decimal, decimals: u32) -> Self {
        Self {
            value: value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero),
            decimals,
        }
    }

    /// Parse user input. Blank or unparsable input yields `None`; a comma is accepted as the
    /// decimal separator.
    pub fn from_input(input: &str, decimals: u32) -> Option<Self> {
        let normalized = input.trim().replace(',', ".");
        if normalized.is_empty() {
            return None;
        }
        normalized
            .parse::<Decimal>()
            .ok()
            .map(|value| Self::new(value, decimals))
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

/// Cut the fractional part of an amount input to at most `max_decimals` digits while keeping
/// the rest of the text intact, so a half-typed value like `"12."` survives.
pub fn cut_amount_with_decimals(max_decimals: u32, input: &str) -> String {
    let normalized = input.trim().replace(',', ".");
    match normalized.split_once('.') {
        Some((whole, _)) if max_decimals == 0 => whole.to_string(),
        Some((whole, fraction)) => {
            let kept: String = fraction.chars().take(max_decimals as usize).collect();
            format!("{}.{}", whole, kept)
        }
        None => normalized,
    }
}

// ============================================================================
// Fees
// ============================================================================

/// Fee tier chosen by the user, independent of the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeeTier {
    #[default]
    Normal,
    Priority,
}

/// A concrete network fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Decimal,
    pub amount_fiat: Option<Decimal>,
    pub gas_limit: Option<u64>,
}

impl Fee {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            amount_fiat: None,
            gas_limit: None,
        }
    }
}

/// Fee options returned with a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeInfo {
    Single(Fee),
    Choosable {
        minimum: Fee,
        normal: Fee,
        priority: Fee,
    },
}

// ============================================================================
// Permission / allowance
// ============================================================================

/// Amount granted by an approval transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproveType {
    /// Exactly the amount of this swap
    Limited,
    /// Unbounded allowance
    Unlimited,
}

/// Everything needed to build an approval transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveData {
    /// Contract that will spend the token
    pub spender_address: String,
    /// Encoded approval call
    pub call_data: String,
    pub fee: Option<FeeInfo>,
    pub from_amount: Decimal,
}

/// Allowance state of a loaded quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    NotNeeded,
    ReadyForRequest(ApproveData),
    InProgress,
}

impl PermissionState {
    /// A swap cannot be executed while an allowance is missing or pending
    pub fn blocks_swap(&self) -> bool {
        !matches!(self, PermissionState::NotNeeded)
    }
}

// ============================================================================
// Quote states
// ============================================================================

/// Provider-specific transaction payload needed to execute a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPayload {
    pub to_address: String,
    pub data: String,
    pub value: Decimal,
}

/// One side of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSwapInfo {
    pub asset: Asset,
    pub amount: Decimal,
    pub amount_fiat: Option<Decimal>,
}

/// Non-fatal conditions attached to a loaded quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteWarning {
    /// The amount plus reductions exceeds the available balance
    InsufficientBalance { available: Decimal },
}

/// A successfully loaded quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotesLoaded {
    pub from: TokenSwapInfo,
    pub to: TokenSwapInfo,
    pub fee_info: Option<FeeInfo>,
    pub permission_state: PermissionState,
    pub swap_payload: Option<SwapPayload>,
    pub include_fee_in_amount: bool,
    /// `1 - to_fiat / from_fiat`, 2 dp
    pub price_impact: Option<Decimal>,
    pub warnings: Vec<QuoteWarning>,
}

impl QuotesLoaded {
    /// Fiat spent per unit of fiat received. Lower is better. `None` when either side has no
    /// usable fiat value.
    pub fn price_ratio(&self) -> Option<Decimal> {
        let from_fiat = self.from.amount_fiat.filter(|v| !v.is_zero())?;
        let to_fiat = self.to.amount_fiat.filter(|v| !v.is_zero())?;
        from_fiat.checked_div(to_fiat)
    }
}

/// Provider-scoped quote errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressError {
    TooSmallAmount { min_amount: Decimal },
    TooBigAmount { max_amount: Decimal },
    /// Provider did not answer this poll
    ProviderUnavailable,
    ProviderError { code: i64, message: String },
}

impl ExpressError {
    /// The user can fix this by editing the amount
    pub fn is_user_resolvable(&self) -> bool {
        matches!(
            self,
            ExpressError::TooSmallAmount { .. } | ExpressError::TooBigAmount { .. }
        )
    }

    pub fn code(&self) -> i64 {
        match self {
            ExpressError::TooSmallAmount { .. } => 2250,
            ExpressError::TooBigAmount { .. } => 2251,
            ExpressError::ProviderUnavailable => 2000,
            ExpressError::ProviderError { code, .. } => *code,
        }
    }
}

impl std::fmt::Display for ExpressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressError::TooSmallAmount { min_amount } => {
                write!(f, "Amount is too small, minimum is {}", min_amount)
            }
            ExpressError::TooBigAmount { max_amount } => {
                write!(f, "Amount is too big, maximum is {}", max_amount)
            }
            ExpressError::ProviderUnavailable => write!(f, "Provider is unavailable"),
            ExpressError::ProviderError { code, message } => {
                write!(f, "Provider error {}: {}", code, message)
            }
        }
    }
}

/// A provider-scoped failure with the last known source token info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapErrorState {
    pub error: ExpressError,
    pub from: TokenSwapInfo,
    pub include_fee_in_amount: bool,
}

/// Classified outcome of one provider for one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SwapState {
    EmptyAmount,
    QuotesLoaded(QuotesLoaded),
    Error(SwapErrorState),
}

impl SwapState {
    pub fn as_loaded(&self) -> Option<&QuotesLoaded> {
        match self {
            SwapState::QuotesLoaded(loaded) => Some(loaded),
            _ => None,
        }
    }

    pub fn is_user_resolvable_error(&self) -> bool {
        matches!(self, SwapState::Error(state) if state.error.is_user_resolvable())
    }

    /// Loaded quotes and user-resolvable errors are eligible for selection
    pub fn is_considered(&self) -> bool {
        matches!(self, SwapState::QuotesLoaded(_)) || self.is_user_resolvable_error()
    }
}

/// Per-provider outcome of one poll, in request order.
///
/// Always replaced as a whole; the order is the provider order of the request so that "first"
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuotes {
    entries: Vec<(Provider, SwapState)>,
}

impl AggregateQuotes {
    pub fn new(entries: Vec<(Provider, SwapState)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Provider, &SwapState)> {
        self.entries.iter().map(|(provider, state)| (provider, state))
    }

    pub fn get(&self, provider_id: &str) -> Option<&SwapState> {
        self.entries
            .iter()
            .find(|(provider, _)| provider.provider_id == provider_id)
            .map(|(_, state)| state)
    }

    pub fn provider(&self, provider_id: &str) -> Option<&Provider> {
        self.entries
            .iter()
            .find(|(provider, _)| provider.provider_id == provider_id)
            .map(|(provider, _)| provider)
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.provider(provider_id).is_some()
    }

    pub fn first_provider(&self) -> Option<&Provider> {
        self.entries.first().map(|(provider, _)| provider)
    }

    pub fn loaded(&self) -> impl Iterator<Item = (&Provider, &QuotesLoaded)> {
        self.entries
            .iter()
            .filter_map(|(provider, state)| state.as_loaded().map(|loaded| (provider, loaded)))
    }

    pub fn considered(&self) -> impl Iterator<Item = &Provider> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_considered())
            .map(|(provider, _)| provider)
    }

    /// Copy with the permission state of one loaded quote replaced
    pub fn with_permission_state(&self, provider_id: &str, permission: PermissionState) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(provider, state)| match state {
                SwapState::QuotesLoaded(loaded) if provider.provider_id == provider_id => (
                    provider.clone(),
                    SwapState::QuotesLoaded(QuotesLoaded {
                        permission_state: permission.clone(),
                        ..loaded.clone()
                    }),
                ),
                _ => (provider.clone(), state.clone()),
            })
            .collect();
        Self { entries }
    }
}

// ============================================================================
// Token lists
// ============================================================================

/// A selectable asset and the providers able to swap into/out of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapAvailability {
    pub status: AssetStatus,
    pub providers: Vec<Provider>,
}

/// Selectable assets for one side of the swap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenGroup {
    pub available: Vec<SwapAvailability>,
    pub unavailable: Vec<SwapAvailability>,
    /// Set when this group is the result of a search
    pub is_after_search: bool,
}

impl TokenGroup {
    pub fn find_available(&self, asset_id: &str) -> Option<&SwapAvailability> {
        self.available
            .iter()
            .find(|entry| entry.status.asset.id == asset_id)
    }
}

/// Assets swappable with the session's fixed asset, in both directions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokensData {
    /// Assets that can be swapped into the fixed asset (reversed order)
    pub from_group: TokenGroup,
    /// Assets the fixed asset can be swapped into (direct order)
    pub to_group: TokenGroup,
}

// ============================================================================
// Session state
// ============================================================================

/// Complete state of one swap session.
///
/// Owned by the engine and only ever replaced as a whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapProcessState {
    pub from_asset: Option<AssetStatus>,
    pub to_asset: Option<AssetStatus>,
    /// Amount the current quotes were requested for, in source decimals
    pub amount: String,
    pub reduce_balance_by: Decimal,
    pub selected_provider: Option<Provider>,
    pub selected_fee_tier: FeeTier,
    /// Fee resolved from the displayed quote and the selected tier
    pub selected_fee: Option<Fee>,
    pub last_loaded_quotes: AggregateQuotes,
    pub pending_swap_payload: Option<SwapPayload>,
    pub pending_approval_payload: Option<ApproveData>,
    pub tokens: Option<TokensData>,
    pub is_order_reversed: bool,
}

impl SwapProcessState {
    /// The provider whose quote the UI shows: the selection, or the first quote when nothing
    /// is selectable
    pub fn displayed_provider(&self) -> Option<&Provider> {
        self.selected_provider
            .as_ref()
            .or_else(|| self.last_loaded_quotes.first_provider())
    }

    pub fn displayed_state(&self) -> Option<&SwapState> {
        self.displayed_provider()
            .and_then(|provider| self.last_loaded_quotes.get(&provider.provider_id))
    }

    /// Group the user currently picks tokens from
    pub fn selectable_group(&self) -> Option<&TokenGroup> {
        self.tokens.as_ref().map(|tokens| {
            if self.is_order_reversed {
                &tokens.from_group
            } else {
                &tokens.to_group
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn usdt() -> Asset {
        Asset::token("usdt", "USDT", "Tether", 6, "ethereum", "0xdac17f")
    }

    #[test]
    fn test_swap_amount_truncates_to_decimals() {
        let amount = SwapAmount::from_input("1,23456789", 6).unwrap();
        assert_eq!(amount.value, dec("1.234567"));

        assert!(SwapAmount::from_input("  ", 6).is_none());
        assert!(SwapAmount::from_input("abc", 6).is_none());
        assert!(SwapAmount::from_input("0", 6).unwrap().is_zero());
    }

    #[test]
    fn test_cut_amount_with_decimals() {
        assert_eq!(cut_amount_with_decimals(2, "10.12345"), "10.12");
        assert_eq!(cut_amount_with_decimals(2, "10,5"), "10.5");
        assert_eq!(cut_amount_with_decimals(0, "7.9"), "7");
        assert_eq!(cut_amount_with_decimals(8, "12."), "12.");
        assert_eq!(cut_amount_with_decimals(8, "42"), "42");
    }

    #[test]
    fn test_provider_equality_by_id() {
        let a = Provider::new("oneinch", "1inch", ProviderType::Dex);
        let b = Provider::new("oneinch", "1inch v6", ProviderType::Dex).recommended();
        assert_eq!(a, b);
    }

    #[test]
    fn test_price_ratio_requires_both_fiat_values() {
        let mut loaded = QuotesLoaded {
            from: TokenSwapInfo {
                asset: usdt(),
                amount: dec("100"),
                amount_fiat: Some(dec("98")),
            },
            to: TokenSwapInfo {
                asset: Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
                amount: dec("0.05"),
                amount_fiat: Some(dec("100")),
            },
            fee_info: None,
            permission_state: PermissionState::NotNeeded,
            swap_payload: None,
            include_fee_in_amount: false,
            price_impact: None,
            warnings: Vec::new(),
        };
        assert_eq!(loaded.price_ratio(), Some(dec("0.98")));

        loaded.to.amount_fiat = Some(Decimal::ZERO);
        assert_eq!(loaded.price_ratio(), None);

        loaded.to.amount_fiat = None;
        assert_eq!(loaded.price_ratio(), None);
    }

    #[test]
    fn test_considered_states() {
        let too_small = SwapState::Error(SwapErrorState {
            error: ExpressError::TooSmallAmount {
                min_amount: dec("10"),
            },
            from: TokenSwapInfo {
                asset: usdt(),
                amount: dec("1"),
                amount_fiat: None,
            },
            include_fee_in_amount: false,
        });
        let unavailable = SwapState::Error(SwapErrorState {
            error: ExpressError::ProviderUnavailable,
            from: TokenSwapInfo {
                asset: usdt(),
                amount: dec("1"),
                amount_fiat: None,
            },
            include_fee_in_amount: false,
        });

        assert!(too_small.is_considered());
        assert!(!unavailable.is_considered());
        assert!(!SwapState::EmptyAmount.is_considered());
    }

    #[test]
    fn test_zero_balance_detection() {
        let status = AssetStatus::new(usdt(), None, None);
        assert!(status.is_zero_balance());

        let status = AssetStatus::new(usdt(), Some(dec("3.5")), Some(dec("1")));
        assert!(!status.is_zero_balance());
        assert_eq!(status.fiat_value(dec("2")), Some(dec("2")));
    }
}
