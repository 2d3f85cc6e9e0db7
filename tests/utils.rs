use std::sync::Arc;
use std::time::Duration;

use swap_express_sdk::{
    models::{SwapAvailability, TokenGroup},
    simulation::{SimulatedBalances, SimulatedMarket, SimulatedProvider, StaticMinimums},
    Asset, AssetStatus, Decimal, EngineConfig, EngineEvent, Provider, ProviderType,
    QuotesSnapshot, SwapEngine, SwapEngineDeps, TokensData,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[cfg(test)]
pub mod test_utils {
    use super::*;

    /// Upper bound for waiting on an event, in virtual time
    pub const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

    /// A running engine wired to the in-memory market
    pub struct TestSession {
        pub engine: SwapEngine,
        pub events: UnboundedReceiver<EngineEvent>,
        pub market: Arc<SimulatedMarket>,
        pub balances: Arc<SimulatedBalances>,
    }

    pub fn dec(value: &str) -> Decimal {
        value.parse().expect("valid decimal")
    }

    pub fn usdt(balance: &str) -> AssetStatus {
        AssetStatus::new(
            Asset::token("usdt", "USDT", "Tether USD", 6, "ethereum", "0xdac17f"),
            Some(dec(balance)),
            Some(Decimal::ONE),
        )
    }

    pub fn eth() -> AssetStatus {
        AssetStatus::new(
            Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
            Some(dec("0.5")),
            Some(dec("2000")),
        )
    }

    pub fn bnb() -> AssetStatus {
        AssetStatus::new(
            Asset::coin("bnb", "BNB", "BNB", 18, "bsc"),
            Some(Decimal::ZERO),
            Some(dec("600")),
        )
    }

    pub fn dex(id: &str) -> Provider {
        Provider::new(id, &id.to_uppercase(), ProviderType::Dex)
    }

    /// Same availability in both directions
    pub fn tokens(entries: &[(AssetStatus, Vec<Provider>)]) -> TokensData {
        let group = TokenGroup {
            available: entries
                .iter()
                .map(|(status, providers)| SwapAvailability {
                    status: status.clone(),
                    providers: providers.clone(),
                })
                .collect(),
            ..TokenGroup::default()
        };
        TokensData {
            from_group: group.clone(),
            to_group: group,
        }
    }

    /// Start a session from `from` into ETH served by `providers`
    pub fn start_session(from: AssetStatus, providers: Vec<SimulatedProvider>) -> TestSession {
        let ids: Vec<Provider> = providers.iter().map(|p| p.provider.clone()).collect();
        let tokens = tokens(&[(eth(), ids.clone()), (bnb(), ids)]);
        start_session_with(from, providers, tokens)
    }

    pub fn start_session_with(
        from: AssetStatus,
        providers: Vec<SimulatedProvider>,
        tokens: TokensData,
    ) -> TestSession {
        let market = Arc::new(SimulatedMarket::new(providers, Duration::ZERO));
        let balances = Arc::new(SimulatedBalances::new(vec![from.clone(), eth(), bnb()]));
        let deps = SwapEngineDeps {
            quote_source: market.clone(),
            transactions: market.clone(),
            balances: balances.clone(),
            minimums: Arc::new(StaticMinimums::default().with("usdt", dec("0.5"))),
        };

        let (engine, events) = SwapEngine::new(EngineConfig::default(), deps, from);
        engine.set_tokens(tokens, Some("eth"));

        TestSession {
            engine,
            events,
            market,
            balances,
        }
    }

    /// Wait for the first event matching `predicate`, skipping others
    pub async fn next_event<F>(
        events: &mut UnboundedReceiver<EngineEvent>,
        predicate: F,
    ) -> EngineEvent
    where
        F: Fn(&EngineEvent) -> bool,
    {
        let found = tokio::time::timeout(EVENT_TIMEOUT, async {
            while let Some(event) = events.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await;

        match found {
            Ok(Some(event)) => event,
            _ => panic!("expected event was not emitted"),
        }
    }

    /// Wait for a quote snapshot matching `predicate`
    pub async fn wait_for_quotes<F>(
        events: &mut UnboundedReceiver<EngineEvent>,
        predicate: F,
    ) -> QuotesSnapshot
    where
        F: Fn(&QuotesSnapshot) -> bool,
    {
        let event = next_event(events, |event| {
            matches!(event, EngineEvent::QuotesUpdated(snapshot) if predicate(snapshot))
        })
        .await;
        match event {
            EngineEvent::QuotesUpdated(snapshot) => snapshot,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// Snapshot with at least one loaded quote
    pub fn has_loaded(snapshot: &QuotesSnapshot) -> bool {
        snapshot.quotes.loaded().next().is_some()
    }

    pub fn selected_id(snapshot: &QuotesSnapshot) -> Option<&str> {
        snapshot
            .selected_provider
            .as_ref()
            .map(|provider| provider.provider_id.as_str())
    }

    /// Everything already queued on the channel
    pub fn drain(events: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
