//! In-memory market
//!
//! Deterministic implementations of the collaborator traits, used by the `swap-sim` binary
//! and by tests. Providers quote at a fixed rate; allowances, outcomes and latencies can be
//! scripted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::error::Error;
use crate::models::{
    ApproveData, Asset, AssetStatus, ExpressError, Fee, FeeInfo, Provider, ProviderType,
    SwapAmount, SwapAvailability, SwapPayload, TokenGroup, TokensData,
};
use crate::sources::{
    AllowanceStatus, ApprovalOutcome, ApprovalRequest, BalanceStream, MinimumAmountSource,
    QuoteRequest, QuoteSource, RawQuote, RawQuoteOutcome, SwapRequest, TransactionFacade,
    TxOutcome,
};
use crate::utils::lock;

/// Scripted behaviour of one provider
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    pub provider: Provider,
    /// Destination units per source unit
    pub rate: Decimal,
    pub fee_info: Option<FeeInfo>,
    pub requires_allowance: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub failure: Option<ExpressError>,
}

impl SimulatedProvider {
    pub fn new(provider: Provider, rate: Decimal) -> Self {
        Self {
            provider,
            rate,
            fee_info: Some(FeeInfo::Single(Fee::new(Decimal::new(1, 3)))),
            requires_allowance: false,
            min_amount: None,
            max_amount: None,
            failure: None,
        }
    }

    pub fn with_fee(mut self, fee_info: Option<FeeInfo>) -> Self {
        self.fee_info = fee_info;
        self
    }

    pub fn with_allowance(mut self) -> Self {
        self.requires_allowance = true;
        self
    }

    pub fn with_limits(mut self, min_amount: Option<Decimal>, max_amount: Option<Decimal>) -> Self {
        self.min_amount = min_amount;
        self.max_amount = max_amount;
        self
    }

    pub fn failing(mut self, failure: ExpressError) -> Self {
        self.failure = Some(failure);
        self
    }

    fn spender(&self) -> String {
        format!("0x{}-router", self.provider.provider_id)
    }
}

/// Scripted result of a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedTx {
    Sent,
    Demo,
    /// The facade answers with [`TxOutcome::Error`]
    Rejected(String),
    /// The facade itself fails
    Unreachable(String),
}

/// Quote source and transaction facade backed by scripted providers
pub struct SimulatedMarket {
    explorer_base: String,
    providers: Mutex<HashMap<String, SimulatedProvider>>,
    granted: Mutex<HashSet<String>>,
    latencies: Mutex<VecDeque<Duration>>,
    default_latency: Duration,
    failing_fetches: AtomicUsize,
    fetches: Mutex<Vec<QuoteRequest>>,
    swap_outcome: Mutex<SimulatedTx>,
    approval_outcome: Mutex<SimulatedTx>,
    sent_swaps: Mutex<Vec<SwapRequest>>,
    approvals: Mutex<Vec<ApprovalRequest>>,
    tx_counter: AtomicU64,
}

fn grant_key(asset_id: &str, provider_id: &str) -> String {
    format!("{}:{}", asset_id, provider_id)
}

impl SimulatedMarket {
    pub fn new(providers: Vec<SimulatedProvider>, default_latency: Duration) -> Self {
        Self {
            explorer_base: "https://explorer.invalid".to_string(),
            providers: Mutex::new(
                providers
                    .into_iter()
                    .map(|p| (p.provider.provider_id.clone(), p))
                    .collect(),
            ),
            granted: Mutex::new(HashSet::new()),
            latencies: Mutex::new(VecDeque::new()),
            default_latency,
            failing_fetches: AtomicUsize::new(0),
            fetches: Mutex::new(Vec::new()),
            swap_outcome: Mutex::new(SimulatedTx::Sent),
            approval_outcome: Mutex::new(SimulatedTx::Sent),
            sent_swaps: Mutex::new(Vec::new()),
            approvals: Mutex::new(Vec::new()),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn upsert_provider(&self, provider: SimulatedProvider) {
        lock(&self.providers).insert(provider.provider.provider_id.clone(), provider);
    }

    /// The provider stops answering
    pub fn remove_provider(&self, provider_id: &str) {
        lock(&self.providers).remove(provider_id);
    }

    /// Latency of the next fetch; queued values are used in order
    pub fn push_latency(&self, latency: Duration) {
        lock(&self.latencies).push_back(latency);
    }

    /// The next `count` fetches fail as a whole
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub fn set_swap_outcome(&self, outcome: SimulatedTx) {
        *lock(&self.swap_outcome) = outcome;
    }

    pub fn set_approval_outcome(&self, outcome: SimulatedTx) {
        *lock(&self.approval_outcome) = outcome;
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.fetches).len()
    }

    /// Amounts of all fetches so far, in call order
    pub fn fetched_amounts(&self) -> Vec<String> {
        lock(&self.fetches)
            .iter()
            .map(|request| request.amount.clone())
            .collect()
    }

    pub fn sent_swaps(&self) -> Vec<SwapRequest> {
        lock(&self.sent_swaps).clone()
    }

    pub fn approvals(&self) -> Vec<ApprovalRequest> {
        lock(&self.approvals).clone()
    }

    pub fn is_granted(&self, asset_id: &str, provider_id: &str) -> bool {
        lock(&self.granted).contains(&grant_key(asset_id, provider_id))
    }

    fn next_latency(&self) -> Duration {
        lock(&self.latencies)
            .pop_front()
            .unwrap_or(self.default_latency)
    }

    fn next_tx(&self) -> (String, Option<String>) {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = format!("0x{:064x}", n);
        let explorer_url = format!("{}/tx/{}", self.explorer_base, tx_hash);
        (tx_hash, Some(explorer_url))
    }

    fn broadcast(&self, outcome: SimulatedTx) -> Result<TxOutcome, Error> {
        match outcome {
            SimulatedTx::Sent => {
                let (tx_hash, explorer_url) = self.next_tx();
                Ok(TxOutcome::TxSent {
                    tx_hash,
                    explorer_url,
                })
            }
            SimulatedTx::Demo => Ok(TxOutcome::DemoMode),
            SimulatedTx::Rejected(message) => Ok(TxOutcome::Error { message }),
            SimulatedTx::Unreachable(message) => Err(Error::Transaction(message)),
        }
    }

    fn quote(
        &self,
        sim: &SimulatedProvider,
        request: &QuoteRequest,
        amount: SwapAmount,
    ) -> RawQuoteOutcome {
        if let Some(failure) = &sim.failure {
            return RawQuoteOutcome::Failed(failure.clone());
        }
        if let Some(min_amount) = sim.min_amount.filter(|min| amount.value < *min) {
            return RawQuoteOutcome::Failed(ExpressError::TooSmallAmount { min_amount });
        }
        if let Some(max_amount) = sim.max_amount.filter(|max| amount.value > *max) {
            return RawQuoteOutcome::Failed(ExpressError::TooBigAmount { max_amount });
        }

        let to_amount = (amount.value * sim.rate)
            .round_dp_with_strategy(request.to.asset.decimals, RoundingStrategy::ToZero);
        let from_asset = &request.from.asset;
        let needs_grant = sim.requires_allowance
            && from_asset.contract_address().is_some()
            && !self.is_granted(&from_asset.id, &sim.provider.provider_id);

        let allowance = if needs_grant {
            AllowanceStatus::Required(ApproveData {
                spender_address: sim.spender(),
                call_data: format!("0x095ea7b3{}", sim.provider.provider_id),
                fee: sim.fee_info.clone(),
                from_amount: amount.value,
            })
        } else {
            AllowanceStatus::NotRequired
        };

        let value = match from_asset.contract_address() {
            Some(_) => Decimal::ZERO,
            None => amount.value,
        };

        RawQuoteOutcome::Quote(RawQuote {
            to_amount,
            from_amount_fiat: None,
            to_amount_fiat: None,
            fee_info: sim.fee_info.clone(),
            allowance,
            swap_payload: Some(SwapPayload {
                to_address: sim.spender(),
                data: format!("0xswap-{}", sim.provider.provider_id),
                value,
            }),
            include_fee_in_amount: false,
        })
    }
}

#[async_trait]
impl QuoteSource for SimulatedMarket {
    async fn fetch(
        &self,
        request: &QuoteRequest,
    ) -> Result<HashMap<String, RawQuoteOutcome>, Error> {
        lock(&self.fetches).push(request.clone());
        let latency = self.next_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::QuoteSource("simulated outage".to_string()));
        }

        let amount = request
            .parsed_amount()
            .ok_or_else(|| Error::InvalidAmount(request.amount.clone()))?;
        let providers = lock(&self.providers).clone();

        let outcomes = request
            .providers
            .iter()
            .filter_map(|provider| {
                providers
                    .get(&provider.provider_id)
                    .map(|sim| (provider.provider_id.clone(), self.quote(sim, request, amount)))
            })
            .collect::<HashMap<_, _>>();
        debug!(amount = %amount.value, answered = outcomes.len(), "Simulated fetch");
        Ok(outcomes)
    }
}

#[async_trait]
impl TransactionFacade for SimulatedMarket {
    async fn build_and_send(&self, request: &SwapRequest) -> Result<TxOutcome, Error> {
        lock(&self.sent_swaps).push(request.clone());
        let outcome = lock(&self.swap_outcome).clone();
        self.broadcast(outcome)
    }

    async fn build_approval(&self, request: &ApprovalRequest) -> Result<ApprovalOutcome, Error> {
        lock(&self.approvals).push(request.clone());
        let outcome = lock(&self.approval_outcome).clone();
        let result = self.broadcast(outcome);
        if let Ok(TxOutcome::TxSent { .. }) = &result {
            lock(&self.granted).insert(grant_key(&request.asset.id, &request.provider.provider_id));
        }
        result
    }
}

/// Balance backend with pushable updates
#[derive(Default)]
pub struct SimulatedBalances {
    statuses: Mutex<HashMap<String, AssetStatus>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<AssetStatus>>>>,
    refreshes: Mutex<Vec<String>>,
}

impl SimulatedBalances {
    pub fn new(statuses: impl IntoIterator<Item = AssetStatus>) -> Self {
        Self {
            statuses: Mutex::new(
                statuses
                    .into_iter()
                    .map(|status| (status.asset.id.clone(), status))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Change a balance and notify live subscribers
    pub fn set_balance(&self, asset_id: &str, balance: Decimal) {
        let status = {
            let mut statuses = lock(&self.statuses);
            match statuses.get_mut(asset_id) {
                Some(status) => {
                    status.balance = Some(balance);
                    status.clone()
                }
                None => return,
            }
        };

        let mut subscribers = lock(&self.subscribers);
        if let Some(senders) = subscribers.get_mut(asset_id) {
            senders.retain(|sender| sender.unbounded_send(status.clone()).is_ok());
        }
    }

    /// Number of subscriptions on `asset_id` whose consumer is still alive
    pub fn live_subscribers(&self, asset_id: &str) -> usize {
        lock(&self.subscribers)
            .get(asset_id)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    pub fn refreshed_networks(&self) -> Vec<String> {
        lock(&self.refreshes).clone()
    }
}

#[async_trait]
impl BalanceStream for SimulatedBalances {
    fn subscribe(&self, asset: &Asset) -> Result<BoxStream<'static, AssetStatus>, Error> {
        let (sender, receiver) = mpsc::unbounded();
        if let Some(status) = lock(&self.statuses).get(&asset.id) {
            sender
                .unbounded_send(status.clone())
                .map_err(|e| Error::Balance(e.to_string()))?;
        }
        lock(&self.subscribers)
            .entry(asset.id.clone())
            .or_default()
            .push(sender);
        Ok(receiver.boxed())
    }

    async fn refresh(&self, network: &str) -> Result<(), Error> {
        lock(&self.refreshes).push(network.to_string());
        Ok(())
    }
}

/// Fixed minimum amounts per asset id
#[derive(Debug, Clone, Default)]
pub struct StaticMinimums {
    minimums: HashMap<String, Decimal>,
}

impl StaticMinimums {
    pub fn with(mut self, asset_id: &str, minimum: Decimal) -> Self {
        self.minimums.insert(asset_id.to_string(), minimum);
        self
    }
}

#[async_trait]
impl MinimumAmountSource for StaticMinimums {
    async fn minimum_amount(&self, asset: &Asset) -> Option<Decimal> {
        self.minimums.get(&asset.id).copied()
    }
}

/// A ready-made session: USDT on Ethereum swapped into a few assets by three providers
pub struct DemoScenario {
    pub from: AssetStatus,
    pub tokens: TokensData,
    pub providers: Vec<SimulatedProvider>,
    pub statuses: Vec<AssetStatus>,
}

impl DemoScenario {
    pub fn new() -> Self {
        let usdt = AssetStatus::new(
            Asset::token(
                "usdt-eth",
                "USDT",
                "Tether USD",
                6,
                "ethereum",
                "0xdac17f958d2ee523a2206206994597c13d831ec7",
            ),
            Some(Decimal::new(1_500, 0)),
            Some(Decimal::ONE),
        );
        let eth = AssetStatus::new(
            Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
            Some(Decimal::new(25, 2)),
            Some(Decimal::new(2_000, 0)),
        );
        let bnb = AssetStatus::new(
            Asset::coin("bnb", "BNB", "BNB", 18, "bsc"),
            Some(Decimal::ZERO),
            Some(Decimal::new(600, 0)),
        );

        let oneinch = SimulatedProvider::new(
            Provider::new("oneinch", "1inch", ProviderType::Dex),
            Decimal::new(4_95, 6),
        )
        .with_allowance()
        .with_fee(Some(FeeInfo::Choosable {
            minimum: Fee::new(Decimal::new(8, 4)),
            normal: Fee::new(Decimal::new(1, 3)),
            priority: Fee::new(Decimal::new(15, 4)),
        }));
        let changenow = SimulatedProvider::new(
            Provider::new("changenow", "ChangeNOW", ProviderType::Cex).recommended(),
            Decimal::new(4_90, 6),
        )
        .with_limits(Some(Decimal::new(50, 0)), Some(Decimal::new(10_000, 0)));
        let bridge = SimulatedProvider::new(
            Provider::new("rango", "Rango", ProviderType::DexBridge),
            Decimal::new(1_64, 5),
        );

        let eth_providers = vec![oneinch.provider.clone(), changenow.provider.clone()];
        let bnb_providers = vec![bridge.provider.clone(), changenow.provider.clone()];

        let tokens = TokensData {
            from_group: TokenGroup {
                available: vec![
                    SwapAvailability {
                        status: eth.clone(),
                        providers: eth_providers.clone(),
                    },
                    SwapAvailability {
                        status: bnb.clone(),
                        providers: bnb_providers.clone(),
                    },
                ],
                ..TokenGroup::default()
            },
            to_group: TokenGroup {
                available: vec![
                    SwapAvailability {
                        status: eth.clone(),
                        providers: eth_providers,
                    },
                    SwapAvailability {
                        status: bnb.clone(),
                        providers: bnb_providers,
                    },
                ],
                ..TokenGroup::default()
            },
        };

        Self {
            statuses: vec![usdt.clone(), eth, bnb],
            from: usdt,
            tokens,
            providers: vec![oneinch, changenow, bridge],
        }
    }
}

impl Default for DemoScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeeTier;

    fn request(amount: &str, scenario: &DemoScenario) -> QuoteRequest {
        QuoteRequest {
            from: scenario.from.clone(),
            to: scenario.tokens.to_group.available[0].status.clone(),
            amount: amount.to_string(),
            reduce_balance_by: Decimal::ZERO,
            providers: scenario.tokens.to_group.available[0].providers.clone(),
            fee_tier: FeeTier::Normal,
        }
    }

    #[tokio::test]
    async fn test_limits_and_allowance() {
        let scenario = DemoScenario::new();
        let market = SimulatedMarket::new(scenario.providers.clone(), Duration::ZERO);

        let outcomes = market.fetch(&request("10", &scenario)).await.unwrap();
        assert!(matches!(
            outcomes.get("changenow"),
            Some(RawQuoteOutcome::Failed(ExpressError::TooSmallAmount { .. }))
        ));
        match outcomes.get("oneinch") {
            Some(RawQuoteOutcome::Quote(quote)) => {
                assert!(matches!(quote.allowance, AllowanceStatus::Required(_)));
                assert_eq!(quote.to_amount, Decimal::new(495, 5));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scripted_outage() {
        let scenario = DemoScenario::new();
        let market = SimulatedMarket::new(scenario.providers.clone(), Duration::ZERO);
        market.fail_next_fetches(1);

        assert!(market.fetch(&request("100", &scenario)).await.is_err());
        assert!(market.fetch(&request("100", &scenario)).await.is_ok());
        assert_eq!(market.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_balance_updates_reach_subscribers() {
        let scenario = DemoScenario::new();
        let balances = SimulatedBalances::new(scenario.statuses.clone());
        let mut stream = balances.subscribe(&scenario.from.asset).unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.balance, Some(Decimal::new(1_500, 0)));

        balances.set_balance("usdt-eth", Decimal::new(900, 0));
        let second = stream.next().await.unwrap();
        assert_eq!(second.balance, Some(Decimal::new(900, 0)));

        drop(stream);
        assert_eq!(balances.live_subscribers("usdt-eth"), 0);
    }
}
