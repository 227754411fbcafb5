use std::sync::Arc;

use anyhow::Context;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use hashroad::config::{Config, FeedMode};
use hashroad::engine::{Engine, EngineState};
use hashroad::feeds::simulated::SimulatedFeed;
use hashroad::feeds::trongrid::TronGridFeed;
use hashroad::feeds::window::BlockWindow;
use hashroad::feeds::BlockSource;
use hashroad::models::block::{Axis, Block, Outcome};
use hashroad::models::task::{RuleScope, Strategy, TargetPolicy, TaskSpec};
use hashroad::persistence;
use hashroad::signals::predictor::HeuristicPredictor;
use hashroad::telemetry::alerts::AlertManager;
use hashroad::telemetry::pnl::PnlTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config first so RUST_LOG from .env applies
    let config = Config::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_target(false)
        .init();

    info!("================================================");
    info!("  HASHROAD v{}", env!("CARGO_PKG_VERSION"));
    info!("  Block-hash roads with a simulated staking engine");
    info!("================================================");

    if let Err(e) = config.validate() {
        error!("Config validation failed: {e}");
        return Err(e);
    }

    // === Engine state ===
    let loaded = if config.storage.persist {
        persistence::load_state(&config.storage.state_path)?
    } else {
        None
    };
    let fresh = loaded.is_none();
    let mut state = match loaded {
        Some(state) => state,
        None => EngineState::new(config.engine.clone()).context("Invalid engine config")?,
    };

    if fresh && config.demo_tasks {
        seed_demo_tasks(&mut state)?;
    }
    if let Err(e) = state.audit() {
        warn!("Ledger audit failed on startup: {e}");
    }

    info!("--- Engine configuration ---");
    info!("  Balance:      {} (initial {})", state.bankroll.balance, state.bankroll.initial_balance);
    info!("  Payout odds:  {}", state.config.payout_odds);
    info!("  Base stake:   {}", state.config.base_stake);
    info!("  Stop-loss:    {}", state.config.stop_loss);
    info!("  Take-profit:  {}", state.config.take_profit);
    info!(
        "  Rules:        {}",
        state.config.rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>().join(", ")
    );
    info!("  Tasks:        {} ({} active)", state.tasks.len(), state.active_tasks());
    if state.tasks.is_empty() {
        info!("  No tasks configured. Set DEMO_TASKS=true to seed a demo set.");
    }

    // Pending targets the feed should make sure to deliver
    let (wanted_tx, wanted_rx) = watch::channel(state.ledger.pending_heights());
    let engine = Engine::new(state);
    let pnl_tracker = Arc::new(PnlTracker::new());
    let alert_mgr = Arc::new(AlertManager::new(config.telemetry.clone()));
    let mut predictor = HeuristicPredictor::from_entropy();
    let mut window = BlockWindow::new(config.feed.window_size);

    // === Start block feed ===
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (block_tx, mut block_rx) = mpsc::channel::<Vec<Block>>(64);

    let feed: Box<dyn BlockSource> = match config.feed.mode {
        FeedMode::TronGrid => Box::new(TronGridFeed::new(config.feed.clone())?),
        FeedMode::Simulated => Box::new(SimulatedFeed::new(&config.feed)),
    };
    info!("Block feed: {}", feed.name());
    let feed_handle = feed.spawn(block_tx, wanted_rx, shutdown_tx.subscribe());

    info!("=== HASHROAD running === Press Ctrl+C to shutdown.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            batch = block_rx.recv() => {
                let Some(batch) = batch else {
                    warn!("Block feed stopped");
                    break;
                };
                let (added, late) = window.merge(batch);
                if added == 0 && late.is_empty() {
                    continue;
                }

                let report = if late.is_empty() {
                    engine.run_cycle(window.as_slice(), &mut predictor).await
                } else {
                    // back-filled targets older than the window, still descending
                    let mut blocks = window.as_slice().to_vec();
                    blocks.extend(late);
                    engine.run_cycle(&blocks, &mut predictor).await
                };
                pnl_tracker.record_cycle(&report);
                wanted_tx.send_replace(engine.read(|s| s.ledger.pending_heights()).await);

                let drawdown_pct = engine.read(|s| s.bankroll.drawdown_pct()).await;
                alert_mgr.on_cycle(&report, drawdown_pct).await;

                if config.storage.persist && !report.is_quiet() {
                    let snapshot = engine.snapshot().await;
                    if let Err(e) = persistence::save_state(&config.storage.state_path, &snapshot) {
                        error!("Failed to persist state: {e:#}");
                    }
                }

                let every = config.telemetry.summary_every_cycles.max(1);
                if pnl_tracker.cycles() % every == 0 {
                    pnl_tracker.log_summary(&engine.snapshot().await);
                }
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    error!("Failed to listen for Ctrl+C: {e}");
                }
                info!("Shutdown signal received. Cleaning up...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(());
    drop(block_rx);
    if let Err(e) = feed_handle.await {
        warn!("Feed task ended abnormally: {e}");
    }

    let snapshot = engine.snapshot().await;
    if config.storage.persist {
        persistence::save_state(&config.storage.state_path, &snapshot)?;
        info!("State saved to {}", config.storage.state_path);
    }
    pnl_tracker.log_summary(&snapshot);

    info!("HASHROAD shutdown complete.");
    Ok(())
}

/// A spread of strategies and policies so a fresh install bets right away.
fn seed_demo_tasks(state: &mut EngineState) -> anyhow::Result<()> {
    let specs = [
        TaskSpec {
            name: "flat-odd".into(),
            scope: RuleScope::Single("1".into()),
            strategy: Strategy::Flat,
            policy: TargetPolicy::Fixed { outcome: Outcome::Odd },
            base_stake: None,
        },
        TaskSpec {
            name: "martingale-follow".into(),
            scope: RuleScope::Single("5".into()),
            strategy: Strategy::Martingale {
                multiplier: dec!(2),
                max_cycle: 6,
            },
            policy: TargetPolicy::FollowLast {
                axis: Axis::Size,
                min_streak: 3,
            },
            base_stake: None,
        },
        TaskSpec {
            name: "fib-reverse".into(),
            scope: RuleScope::Single("10".into()),
            strategy: Strategy::Fibonacci,
            policy: TargetPolicy::ReverseLast {
                axis: Axis::Parity,
                min_streak: 4,
            },
            base_stake: None,
        },
        TaskSpec {
            name: "kelly-ai".into(),
            scope: RuleScope::Single("1".into()),
            strategy: Strategy::Kelly { risk_fraction: 0.05 },
            policy: TargetPolicy::AiSingle,
            base_stake: None,
        },
        TaskSpec {
            name: "paroli-dragon".into(),
            scope: RuleScope::AllRules,
            strategy: Strategy::Paroli,
            policy: TargetPolicy::DragonTrend { min_streak: 5 },
            base_stake: None,
        },
        TaskSpec {
            name: "1326-bead".into(),
            scope: RuleScope::AllRules,
            strategy: Strategy::OneThreeTwoSix,
            policy: TargetPolicy::DragonBead { min_streak: 4 },
            base_stake: None,
        },
    ];

    for spec in specs {
        let id = state.create_task(spec)?;
        state.toggle_task(id)?;
    }
    info!("Seeded {} demo tasks", state.tasks.len());
    Ok(())
}
