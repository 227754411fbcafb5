use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AuditError, WagerError};
use crate::models::bankroll::Bankroll;
use crate::models::block::Block;
use crate::models::rule::RuleId;
use crate::models::task::TaskId;
use crate::models::wager::{Wager, WagerId, WagerKey, WagerSource, WagerStatus, WagerTicket};
use crate::risk::risk_manager::RiskManager;

/// Outcome of settling one wager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub wager_id: WagerId,
    pub task_id: Option<TaskId>,
    pub rule_id: RuleId,
    pub target_height: u64,
    pub won: bool,
    pub stake: Decimal,
    pub payout: Decimal,
    pub resulting_bankroll: Decimal,
}

impl Settlement {
    pub fn net(&self) -> Decimal {
        self.payout - self.stake
    }
}

/// Append-only record of every wager, with settlement logic.
///
/// Every stake debit and payout credit the bankroll sees goes through here,
/// stamped with a monotonic event sequence so the history can be replayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LedgerRecord", into = "LedgerRecord")]
pub struct WagerLedger {
    wagers: Vec<Wager>,
    next_id: WagerId,
    next_seq: u64,
    /// (rule, height, source) -> wager. Rebuilt on load.
    index: HashMap<WagerKey, WagerId>,
}

/// Persisted layout of the ledger. The duplicate index is derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerRecord {
    wagers: Vec<Wager>,
    #[serde(default)]
    next_id: WagerId,
    #[serde(default)]
    next_seq: u64,
}

impl From<LedgerRecord> for WagerLedger {
    fn from(record: LedgerRecord) -> Self {
        let index = record.wagers.iter().map(|w| (w.key(), w.id)).collect();
        let max_id = record.wagers.iter().map(|w| w.id + 1).max().unwrap_or(0);
        let max_seq = record
            .wagers
            .iter()
            .map(|w| w.settled_seq.unwrap_or(w.placed_seq) + 1)
            .max()
            .unwrap_or(0);
        Self {
            next_id: record.next_id.max(max_id),
            next_seq: record.next_seq.max(max_seq),
            wagers: record.wagers,
            index,
        }
    }
}

impl From<WagerLedger> for LedgerRecord {
    fn from(ledger: WagerLedger) -> Self {
        Self {
            wagers: ledger.wagers,
            next_id: ledger.next_id,
            next_seq: ledger.next_seq,
        }
    }
}

impl WagerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a wager: reject duplicates and unaffordable stakes, debit the
    /// stake and append the wager as pending.
    pub fn place(
        &mut self,
        ticket: WagerTicket,
        bankroll: &mut Bankroll,
        risk: &RiskManager<'_>,
    ) -> Result<WagerId, WagerError> {
        let key = ticket.key();
        if self.index.contains_key(&key) {
            return Err(WagerError::Duplicate {
                rule_id: key.rule_id,
                target_height: key.target_height,
            });
        }
        risk.check_stake(bankroll, ticket.stake)?;

        bankroll.debit(ticket.stake);

        let id = self.next_id;
        self.next_id += 1;
        let seq = self.bump_seq();

        let wager = Wager::from_ticket(id, seq, ticket);
        debug!(
            "Wager #{id} placed: rule={} height={} {} stake={} balance={}",
            wager.rule_id, wager.target_height, wager.predicted, wager.stake, bankroll.balance
        );
        self.index.insert(key, id);
        self.wagers.push(wager);
        Ok(id)
    }

    /// Resolve every pending wager targeting `block`. Settled wagers are never
    /// touched again, so repeated calls are no-ops.
    pub fn settle(&mut self, block: &Block, bankroll: &mut Bankroll) -> Vec<Settlement> {
        let mut out = Vec::new();
        for i in 0..self.wagers.len() {
            if self.wagers[i].is_pending() && self.wagers[i].target_height == block.height {
                out.push(self.settle_at(i, block, bankroll));
            }
        }
        out
    }

    /// Resolve every pending wager whose target block is in `blocks`, in
    /// insertion order.
    pub fn settle_window(&mut self, blocks: &[Block], bankroll: &mut Bankroll) -> Vec<Settlement> {
        let by_height: HashMap<u64, &Block> = blocks.iter().map(|b| (b.height, b)).collect();
        let mut out = Vec::new();
        for i in 0..self.wagers.len() {
            if !self.wagers[i].is_pending() {
                continue;
            }
            if let Some(block) = by_height.get(&self.wagers[i].target_height) {
                out.push(self.settle_at(i, block, bankroll));
            }
        }
        out
    }

    fn settle_at(&mut self, i: usize, block: &Block, bankroll: &mut Bankroll) -> Settlement {
        let seq = self.bump_seq();
        let wager = &mut self.wagers[i];

        let won = block.outcome(wager.axis) == wager.predicted;
        let payout = if won {
            wager.stake * wager.payout_multiplier
        } else {
            Decimal::ZERO
        };
        bankroll.credit(payout);

        wager.status = if won { WagerStatus::Won } else { WagerStatus::Lost };
        wager.payout = payout;
        wager.resulting_bankroll = Some(bankroll.balance);
        wager.settled_seq = Some(seq);

        info!(
            "Wager #{} {}: rule={} height={} predicted={} actual={} stake={} payout={} balance={}",
            wager.id,
            if won { "WON" } else { "LOST" },
            wager.rule_id,
            wager.target_height,
            wager.predicted,
            block.outcome(wager.axis),
            wager.stake,
            payout,
            bankroll.balance,
        );

        Settlement {
            wager_id: wager.id,
            task_id: wager.task_id,
            rule_id: wager.rule_id.clone(),
            target_height: wager.target_height,
            won,
            stake: wager.stake,
            payout,
            resulting_bankroll: bankroll.balance,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Replay every placement and settlement in event order starting from
    /// `initial_balance`, checking each recorded resulting bankroll.
    /// Returns the replayed balance.
    pub fn audit(&self, initial_balance: Decimal) -> Result<Decimal, AuditError> {
        enum Event<'a> {
            Placed(&'a Wager),
            Settled(&'a Wager),
        }

        let mut events: Vec<(u64, Event<'_>)> = Vec::with_capacity(self.wagers.len() * 2);
        for w in &self.wagers {
            events.push((w.placed_seq, Event::Placed(w)));
            match (w.status, w.settled_seq) {
                (WagerStatus::Pending, _) => {}
                (_, Some(seq)) => events.push((seq, Event::Settled(w))),
                (_, None) => return Err(AuditError::MissingResult(w.id)),
            }
        }
        events.sort_by_key(|(seq, _)| *seq);

        let mut seen = HashSet::with_capacity(events.len());
        let mut balance = initial_balance;
        for (seq, event) in &events {
            if !seen.insert(*seq) {
                return Err(AuditError::DuplicateEvent(*seq));
            }
            match event {
                Event::Placed(w) => balance -= w.stake,
                Event::Settled(w) => {
                    balance += w.payout;
                    let recorded = w.resulting_bankroll.ok_or(AuditError::MissingResult(w.id))?;
                    if recorded != balance {
                        return Err(AuditError::BankrollMismatch {
                            id: w.id,
                            replayed: balance,
                            recorded,
                        });
                    }
                }
            }
        }
        Ok(balance)
    }

    pub fn wagers(&self) -> &[Wager] {
        &self.wagers
    }

    pub fn get(&self, id: WagerId) -> Option<&Wager> {
        self.wagers.iter().find(|w| w.id == id)
    }

    pub fn len(&self) -> usize {
        self.wagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wagers.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Wager> {
        self.wagers.iter().filter(|w| w.is_pending())
    }

    pub fn pending_for(&self, source: WagerSource) -> impl Iterator<Item = &Wager> {
        self.pending().filter(move |w| w.source() == source)
    }

    pub fn has_pending_for(&self, source: WagerSource) -> bool {
        self.pending_for(source).next().is_some()
    }

    pub fn has_pending(&self, rule_id: &str, target_height: u64, source: WagerSource) -> bool {
        let key = WagerKey {
            rule_id: rule_id.to_string(),
            target_height,
            source,
        };
        self.index
            .get(&key)
            .and_then(|id| self.wagers.iter().find(|w| w.id == *id))
            .is_some_and(Wager::is_pending)
    }

    /// Any wager, settled or not, already holds this key.
    pub fn contains(&self, key: &WagerKey) -> bool {
        self.index.contains_key(key)
    }

    /// Most recent first.
    pub fn history(&self, limit: usize) -> Vec<&Wager> {
        self.wagers.iter().rev().take(limit).collect()
    }

    pub fn pending_stake(&self) -> Decimal {
        self.pending().map(|w| w.stake).sum()
    }

    /// Distinct target heights still awaiting a block, ascending.
    pub fn pending_heights(&self) -> Vec<u64> {
        let mut heights: Vec<u64> = self.pending().map(|w| w.target_height).collect();
        heights.sort_unstable();
        heights.dedup();
        heights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::block::Outcome;
    use crate::signals::streak::test_support::blocks;
    use rust_decimal_macros::dec;

    fn ticket(height: u64, predicted: Outcome, stake: Decimal) -> WagerTicket {
        WagerTicket {
            task_id: None,
            rule_id: "1".into(),
            target_height: height,
            predicted,
            stake,
            payout_multiplier: dec!(1.98),
            confidence: None,
        }
    }

    #[test]
    fn test_place_debits_and_rejects_duplicates() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(1000));
        let mut ledger = WagerLedger::new();

        let id = ledger.place(ticket(10, Outcome::Odd, dec!(100)), &mut bank, &risk).unwrap();
        assert_eq!(id, 0);
        assert_eq!(bank.balance, dec!(900));

        let dup = ledger.place(ticket(10, Outcome::Even, dec!(100)), &mut bank, &risk);
        assert!(matches!(dup, Err(WagerError::Duplicate { .. })));
        assert_eq!(bank.balance, dec!(900));
        assert_eq!(ledger.len(), 1);

        // Different source, same rule and height: allowed.
        let mut t = ticket(10, Outcome::Even, dec!(100));
        t.task_id = Some(uuid::Uuid::new_v4());
        assert!(ledger.place(t, &mut bank, &risk).is_ok());
    }

    #[test]
    fn test_place_rejects_unaffordable_stake() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(50));
        let mut ledger = WagerLedger::new();
        let res = ledger.place(ticket(10, Outcome::Odd, dec!(51)), &mut bank, &risk);
        assert!(matches!(res, Err(WagerError::InsufficientBankroll { .. })));
        assert_eq!(bank.balance, dec!(50));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_settle_is_idempotent() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(10000));
        let mut ledger = WagerLedger::new();
        ledger.place(ticket(7, Outcome::Odd, dec!(100)), &mut bank, &risk).unwrap();

        let window = blocks(&[(7, 3)]);
        let first = ledger.settle(&window[0], &mut bank);
        assert_eq!(first.len(), 1);
        assert!(first[0].won);
        assert_eq!(first[0].payout, dec!(198));
        assert_eq!(bank.balance, dec!(10098));

        let second = ledger.settle(&window[0], &mut bank);
        assert!(second.is_empty());
        assert_eq!(bank.balance, dec!(10098));
        assert_eq!(ledger.wagers()[0].status, WagerStatus::Won);
    }

    #[test]
    fn test_settle_window_in_insertion_order() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(1000));
        let mut ledger = WagerLedger::new();
        ledger.place(ticket(12, Outcome::Big, dec!(100)), &mut bank, &risk).unwrap();
        ledger.place(ticket(11, Outcome::Even, dec!(100)), &mut bank, &risk).unwrap();
        ledger.place(ticket(99, Outcome::Odd, dec!(100)), &mut bank, &risk).unwrap();

        // 11 -> digit 4 (even, small); 12 -> digit 8 (even, big)
        let window = blocks(&[(11, 4), (12, 8)]);
        let settled = ledger.settle_window(&window, &mut bank);
        let ids: Vec<WagerId> = settled.iter().map(|s| s.wager_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(settled.iter().all(|s| s.won));
        assert_eq!(ledger.pending().count(), 1);
        assert_eq!(ledger.pending_stake(), dec!(100));
        assert_eq!(ledger.pending_heights(), vec![99]);
    }

    #[test]
    fn test_pending_heights_are_distinct() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(1000));
        let mut ledger = WagerLedger::new();
        ledger.place(ticket(30, Outcome::Odd, dec!(10)), &mut bank, &risk).unwrap();
        let mut other = ticket(30, Outcome::Big, dec!(10));
        other.rule_id = "2".into();
        ledger.place(other, &mut bank, &risk).unwrap();
        ledger.place(ticket(20, Outcome::Odd, dec!(10)), &mut bank, &risk).unwrap();
        assert_eq!(ledger.pending_heights(), vec![20, 30]);

        ledger.settle_window(&blocks(&[(20, 1)]), &mut bank);
        assert_eq!(ledger.pending_heights(), vec![30]);
    }

    #[test]
    fn test_audit_replays_history() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(1000));
        let mut ledger = WagerLedger::new();
        ledger.place(ticket(1, Outcome::Odd, dec!(100)), &mut bank, &risk).unwrap();
        ledger.place(ticket(2, Outcome::Odd, dec!(50)), &mut bank, &risk).unwrap();
        ledger.settle_window(&blocks(&[(1, 1), (2, 2)]), &mut bank);
        ledger.place(ticket(3, Outcome::Small, dec!(30)), &mut bank, &risk).unwrap();

        assert_eq!(ledger.audit(dec!(1000)), Ok(bank.balance));

        let mut tampered = ledger.clone();
        tampered.wagers[0].resulting_bankroll = Some(dec!(1));
        assert!(matches!(
            tampered.audit(dec!(1000)),
            Err(AuditError::BankrollMismatch { id: 0, .. })
        ));
    }

    #[test]
    fn test_index_rebuilt_on_load() {
        let cfg = EngineConfig::default();
        let risk = RiskManager::new(&cfg);
        let mut bank = Bankroll::new(dec!(1000));
        let mut ledger = WagerLedger::new();
        ledger.place(ticket(5, Outcome::Odd, dec!(10)), &mut bank, &risk).unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        assert!(!json.contains("index"));
        let mut loaded: WagerLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, ledger);
        assert!(loaded.has_pending("1", 5, WagerSource::Manual));

        let dup = loaded.place(ticket(5, Outcome::Odd, dec!(10)), &mut bank, &risk);
        assert!(matches!(dup, Err(WagerError::Duplicate { .. })));
        let next = loaded.place(ticket(6, Outcome::Odd, dec!(10)), &mut bank, &risk).unwrap();
        assert_eq!(next, 1);
    }
}
