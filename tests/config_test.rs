mod utils;

use std::sync::Arc;
use std::time::Duration;

use swap_express_sdk::{
    simulation::{SimulatedBalances, SimulatedMarket, SimulatedProvider, StaticMinimums},
    Decimal, EngineConfig, Error, SwapEngine, SwapEngineDeps,
};
use utils::test_utils::{dec, dex, eth, has_loaded, tokens, usdt, wait_for_quotes};

#[test]
fn test_file_values_and_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "update_period_ms = 3000\nsearch_debounce_ms = 250\n").unwrap();

    std::env::set_var("SWAP_ENGINE_QUOTE_TIMEOUT_MS", "4500");
    let loaded = EngineConfig::load(&path);
    std::env::remove_var("SWAP_ENGINE_QUOTE_TIMEOUT_MS");

    let config = loaded.unwrap();
    assert_eq!(config.update_period(), Duration::from_secs(3));
    assert_eq!(config.search_debounce(), Duration::from_millis(250));
    assert_eq!(config.quote_timeout(), Duration::from_millis(4_500));
    assert_eq!(config.amount_debounce_ms, 1_000);
}

#[test]
fn test_invalid_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "quote_timeout_ms = 0\n").unwrap();

    assert!(matches!(EngineConfig::load(&path), Err(Error::Config(_))));
    assert!(EngineConfig::load(&dir.path().join("missing.toml")).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_session_follows_configured_timing() {
    let config = EngineConfig {
        update_period_ms: 2_000,
        quote_timeout_ms: 500,
        ..EngineConfig::default()
    };
    let provider = SimulatedProvider::new(dex("a"), dec("0.0005"));
    let market = Arc::new(SimulatedMarket::new(vec![provider.clone()], Duration::ZERO));
    let balances = Arc::new(SimulatedBalances::new(vec![usdt("500"), eth()]));
    let deps = SwapEngineDeps {
        quote_source: market.clone(),
        transactions: market.clone(),
        balances,
        minimums: Arc::new(StaticMinimums::default()),
    };

    let (engine, mut events) = SwapEngine::new(config, deps, usdt("500"));
    engine.set_tokens(tokens(&[(eth(), vec![provider.provider])]), None);
    engine.on_amount_changed("100", true, Decimal::ZERO).await;
    wait_for_quotes(&mut events, has_loaded).await;

    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert_eq!(market.fetch_count(), 3);

    // a fetch slower than the timeout fails the poll
    market.push_latency(Duration::from_secs(1));
    engine.on_retry_quotes();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!engine.is_polling());
}
