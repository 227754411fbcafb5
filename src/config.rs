use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::rule::{default_rules, Rule};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub feed: FeedConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    /// Seed a set of active demo tasks into a fresh state.
    #[serde(default)]
    pub demo_tasks: bool,
}

/// Global engine settings. Persisted with the engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_balance: Decimal,
    pub payout_odds: Decimal,      // decimal odds credited on a win (e.g. 1.98)
    pub base_stake: Decimal,       // default stake for new tasks
    pub stop_loss: Decimal,        // absolute loss that halts all tasks, 0 = off
    pub take_profit: Decimal,      // absolute profit that halts all tasks, 0 = off
    #[serde(default = "default_rules")]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMode {
    TronGrid,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub mode: FeedMode,
    pub api_url: String,
    pub api_key: Option<String>,
    pub poll_interval_ms: u64,
    pub window_size: usize,    // blocks kept in the rolling window
    pub backfill_limit: u64,   // max missing heights fetched per poll
    pub max_backoff_ms: u64,
    pub simulated_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_stop: bool,
    pub alert_on_bankrupt: bool,
    pub drawdown_alert_pct: f64,      // alert when drawdown from peak exceeds this (e.g. 20.0)
    pub summary_every_cycles: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_path: String,
    pub persist: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            payout_odds: dec!(1.98),
            base_stake: dec!(100),
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            rules: default_rules(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::Simulated,
            api_url: "https://api.trongrid.io".into(),
            api_key: None,
            poll_interval_ms: 3000,
            window_size: 500,
            backfill_limit: 20,
            max_backoff_ms: 30_000,
            simulated_seed: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_stop: true,
            alert_on_bankrupt: true,
            drawdown_alert_pct: 20.0,
            summary_every_cycles: 20,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: "hashroad_state.json".into(),
            persist: true,
        }
    }
}

impl EngineConfig {
    /// Reject values that must never reach the staking engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(EngineError::config("initial balance must be positive"));
        }
        if self.payout_odds <= Decimal::ZERO {
            return Err(EngineError::config(format!(
                "payout odds must be positive, got {}",
                self.payout_odds
            )));
        }
        if self.base_stake <= Decimal::ZERO {
            return Err(EngineError::config(format!(
                "base stake must be positive, got {}",
                self.base_stake
            )));
        }
        if self.stop_loss < Decimal::ZERO || self.take_profit < Decimal::ZERO {
            return Err(EngineError::config("stop-loss and take-profit cannot be negative"));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            validate_rule(rule)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(EngineError::config(format!("duplicate rule id {}", rule.id)));
            }
        }
        Ok(())
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

pub fn validate_rule(rule: &Rule) -> Result<(), EngineError> {
    if rule.id.trim().is_empty() {
        return Err(EngineError::config("rule id cannot be empty"));
    }
    if rule.step == 0 {
        return Err(EngineError::config(format!("rule {} step must be at least 1", rule.id)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   INITIAL_BALANCE, PAYOUT_ODDS, BASE_STAKE, STOP_LOSS, TAKE_PROFIT
    ///   FEED_MODE: "trongrid" or "simulated" (default: simulated)
    ///   FEED_API_URL, TRONGRID_API_KEY, POLL_INTERVAL_MS, WINDOW_SIZE, SIM_SEED
    ///   STATE_PATH: JSON snapshot location; PERSIST=false disables saving
    ///   DEMO_TASKS=true: seed active demo tasks into a fresh state
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL
    ///   RUST_LOG: log level (default: info)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        overlay(&mut config.engine.initial_balance, "INITIAL_BALANCE");
        overlay(&mut config.engine.payout_odds, "PAYOUT_ODDS");
        overlay(&mut config.engine.base_stake, "BASE_STAKE");
        overlay(&mut config.engine.stop_loss, "STOP_LOSS");
        overlay(&mut config.engine.take_profit, "TAKE_PROFIT");

        if let Ok(mode) = std::env::var("FEED_MODE") {
            match mode.to_lowercase().as_str() {
                "trongrid" | "live" => config.feed.mode = FeedMode::TronGrid,
                "simulated" | "sim" => config.feed.mode = FeedMode::Simulated,
                other => tracing::warn!("Unknown FEED_MODE={other}, keeping {:?}", config.feed.mode),
            }
        }
        if let Ok(url) = std::env::var("FEED_API_URL") {
            if !url.is_empty() {
                config.feed.api_url = url;
            }
        }
        if let Ok(key) = std::env::var("TRONGRID_API_KEY") {
            if !key.is_empty() {
                config.feed.api_key = Some(key);
            }
        }
        overlay(&mut config.feed.poll_interval_ms, "POLL_INTERVAL_MS");
        overlay(&mut config.feed.window_size, "WINDOW_SIZE");
        if let Some(seed) = env_parse::<u64>("SIM_SEED") {
            config.feed.simulated_seed = Some(seed);
        }

        if let Ok(path) = std::env::var("STATE_PATH") {
            if !path.is_empty() {
                config.storage.state_path = path;
            }
        }
        if let Ok(v) = std::env::var("PERSIST") {
            config.storage.persist = !(v == "false" || v == "0");
        }
        if let Ok(v) = std::env::var("DEMO_TASKS") {
            config.demo_tasks = v == "true" || v == "1";
        }

        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.telemetry.telegram_bot_token = Some(token);
            }
        }
        if let Ok(chat) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat.is_empty() {
                config.telemetry.telegram_chat_id = Some(chat);
            }
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.is_empty() {
                config.telemetry.discord_webhook_url = Some(url);
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;
        anyhow::ensure!(self.feed.window_size >= 100, "window_size must be at least 100");
        anyhow::ensure!(self.feed.poll_interval_ms >= 200, "poll_interval_ms must be at least 200");
        anyhow::ensure!(
            self.telemetry.drawdown_alert_pct >= 0.0,
            "drawdown_alert_pct cannot be negative"
        );
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn overlay<T: FromStr>(slot: &mut T, key: &str) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("Ignoring unparsable {key}={raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.payout_odds, dec!(1.98));
        assert!(config.engine.rule("20").is_some());
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let mut engine = EngineConfig::default();
        engine.base_stake = Decimal::ZERO;
        assert!(matches!(engine.validate(), Err(EngineError::ConfigValidation(_))));

        let mut engine = EngineConfig::default();
        engine.payout_odds = dec!(-1);
        assert!(engine.validate().is_err());

        let mut engine = EngineConfig::default();
        engine.rules.push(Rule::new("bad", "zero step", 0, 0));
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_rule_ids() {
        let mut engine = EngineConfig::default();
        engine.rules.push(Rule::new("20", "again", 20, 3));
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_engine_config_defaults_rules_on_load() {
        let raw = serde_json::json!({
            "initial_balance": "5000",
            "payout_odds": "1.95",
            "base_stake": "50",
            "stop_loss": "0",
            "take_profit": "0"
        });
        let engine: EngineConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(engine.rules, default_rules());
    }
}
