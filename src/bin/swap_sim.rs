//! Swap Express Simulator
//!
//! Runs a swap session against the in-memory market and prints every engine event.
//! Useful for watching debouncing, polling and provider selection without a wallet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use swap_express_sdk::{
    logging::{LogLevel, LoggingConfig},
    setup_logging,
    simulation::{DemoScenario, SimulatedBalances, SimulatedMarket, StaticMinimums},
    ApproveType, Decimal, EngineConfig, EngineEvent, FeeTier, SwapEngine, SwapEngineDeps,
};
use tokio::time::Instant;

#[derive(Parser)]
#[command(name = "swap-sim")]
#[command(about = "Swap Express SDK - simulated swap session")]
#[command(version)]
struct Args {
    /// Amount of USDT to swap
    #[arg(short, long, default_value = "100")]
    amount: String,

    /// Destination asset id (eth, bnb)
    #[arg(short, long, default_value = "eth")]
    to: String,

    /// How long to run the session, in seconds
    #[arg(short, long, default_value_t = 25)]
    seconds: u64,

    /// Path to an engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the priority fee tier
    #[arg(long)]
    priority: bool,

    /// Grant the allowance and execute the swap once quotes are loaded
    #[arg(long)]
    execute: bool,

    /// Simulated provider latency in milliseconds
    #[arg(long, default_value_t = 300)]
    latency_ms: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::from_env();
    logging.level = args
        .log_level
        .parse::<LogLevel>()
        .map_err(anyhow::Error::msg)?;
    setup_logging(&logging)?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let scenario = DemoScenario::new();
    let market = Arc::new(SimulatedMarket::new(
        scenario.providers.clone(),
        Duration::from_millis(args.latency_ms),
    ));
    let balances = Arc::new(SimulatedBalances::new(scenario.statuses.clone()));
    let deps = SwapEngineDeps {
        quote_source: market.clone(),
        transactions: market.clone(),
        balances: balances.clone(),
        minimums: Arc::new(StaticMinimums::default().with("usdt-eth", Decimal::ONE)),
    };

    let (engine, mut events) = SwapEngine::new(config, deps, scenario.from.clone());
    println!("Session {}", engine.session_id());

    engine.set_tokens(scenario.tokens.clone(), Some(&args.to));
    if args.priority {
        engine.on_fee_tier_selected(FeeTier::Priority);
    }
    engine
        .on_amount_changed(&args.amount, true, Decimal::ZERO)
        .await;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut executed = false;

    loop {
        let event = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if args.json {
            println!("{}", event.to_json()?);
        } else {
            print_event(&event);
        }

        if args.execute && !executed {
            if let EngineEvent::QuotesUpdated(snapshot) = &event {
                if snapshot.selected_provider.is_some() {
                    executed = true;
                    execute(&engine).await;
                }
            }
        }
    }

    engine.on_screen_stopped();
    println!("Fetches: {}", market.fetch_count());
    for network in balances.refreshed_networks() {
        println!("Balance refresh requested for {}", network);
    }
    Ok(())
}

async fn execute(engine: &SwapEngine) {
    if engine.state().pending_approval_payload.is_some() {
        match engine.on_give_permission(ApproveType::Limited).await {
            Ok(outcome) => println!("Approval: {:?}", outcome),
            Err(e) => eprintln!("Approval not possible: {}", e),
        }
        return;
    }

    match engine.on_swap_confirmed().await {
        Ok(outcome) => println!("Swap: {:?}", outcome),
        Err(e) => eprintln!("Swap not possible: {}", e),
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::QuotesLoading { silent } => {
            println!("... loading quotes{}", if *silent { " (silent)" } else { "" });
        }
        EngineEvent::QuotesUpdated(snapshot) => {
            println!(
                "Quotes: selected={} best={} badge={}",
                snapshot
                    .selected_provider
                    .as_ref()
                    .map_or("-", |p| p.provider_id.as_str()),
                snapshot.best_rated_provider.as_deref().unwrap_or("-"),
                snapshot.show_best_rate_badge
            );
            for (provider, state) in snapshot.quotes.iter() {
                match state.as_loaded() {
                    Some(loaded) => println!(
                        "  {:<10} {} {} (fee {:?}, impact {:?}, permission {:?})",
                        provider.name,
                        loaded.to.amount,
                        loaded.to.asset.symbol,
                        snapshot.selected_fee.as_ref().map(|f| f.amount),
                        loaded.price_impact,
                        loaded.permission_state
                    ),
                    None => println!("  {:<10} {:?}", provider.name, state),
                }
            }
            for (provider_id, percent) in &snapshot.prices_lower_best {
                println!("  {} differs by {}%", provider_id, percent);
            }
        }
        other => println!("{:?}", other),
    }
}
