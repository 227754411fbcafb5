use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;

use crate::engine::EngineState;
use crate::models::wager::WagerSource;
use crate::strategies::orchestrator::CycleReport;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PnlEntry {
    pub wins: u64,
    pub losses: u64,
    pub staked: Decimal,
    pub net: Decimal,
}

/// Realized P&L per wager source (each task, plus manual), fed from cycle
/// reports.
pub struct PnlTracker {
    by_source: DashMap<WagerSource, PnlEntry>,
    cycles: AtomicU64,
    placed: AtomicU64,
}

impl PnlTracker {
    pub fn new() -> Self {
        Self {
            by_source: DashMap::new(),
            cycles: AtomicU64::new(0),
            placed: AtomicU64::new(0),
        }
    }

    /// Fold one cycle's settlements into the running totals.
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.placed.fetch_add(report.placements.len() as u64, Ordering::Relaxed);

        for s in &report.settlements {
            let source = match s.task_id {
                Some(id) => WagerSource::Task(id),
                None => WagerSource::Manual,
            };
            let mut entry = self.by_source.entry(source).or_default();
            if s.won {
                entry.wins += 1;
            } else {
                entry.losses += 1;
            }
            entry.staked += s.stake;
            entry.net += s.net();
        }
    }

    pub fn source_pnl(&self, source: WagerSource) -> PnlEntry {
        self.by_source.get(&source).map(|v| *v).unwrap_or_default()
    }

    pub fn total_net(&self) -> Decimal {
        self.by_source.iter().map(|e| e.value().net).sum()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Print summary to log.
    pub fn log_summary(&self, state: &EngineState) {
        let bank = &state.bankroll;
        info!(
            "=== P&L SUMMARY === balance={} profit={} peak={} max_dd={} pending={} active_tasks={}/{} cycles={} placed={}",
            bank.balance,
            bank.profit(),
            bank.peak_balance,
            bank.max_drawdown,
            state.ledger.pending().count(),
            state.active_tasks(),
            state.tasks.len(),
            self.cycles(),
            self.placed.load(Ordering::Relaxed),
        );

        for task in &state.tasks {
            info!(
                "  Task {} [{}{}]: W/L={}/{} win_rate={:.1}% profit={} max_dd={} next_stake={}",
                task.name,
                task.strategy.label(),
                if task.is_active { "" } else { ", paused" },
                task.stats.wins,
                task.stats.losses,
                task.stats.win_rate() * 100.0,
                task.stats.profit,
                task.stats.max_drawdown,
                task.stake_state.stake_amount,
            );
        }

        let manual = self.source_pnl(WagerSource::Manual);
        if manual.wins + manual.losses > 0 {
            info!("  Manual: W/L={}/{} net={}", manual.wins, manual.losses, manual.net);
        }
    }
}

impl Default for PnlTracker {
    fn default() -> Self {
        Self::new()
    }
}
