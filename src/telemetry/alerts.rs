use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{error, info};

use crate::config::TelemetryConfig;
use crate::strategies::orchestrator::{CycleReport, StatusReason};

/// Sends alerts via Telegram or Discord webhooks.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
    /// Set once the drawdown alert fired; cleared when drawdown recovers.
    drawdown_fired: AtomicBool,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            drawdown_fired: AtomicBool::new(false),
        }
    }

    pub fn is_configured(&self) -> bool {
        let telegram = self.config.telegram_bot_token.is_some() && self.config.telegram_chat_id.is_some();
        telegram || self.config.discord_webhook_url.is_some()
    }

    /// Send an alert message.
    pub async fn send(&self, message: &str) {
        info!("ALERT: {message}");

        if let Err(e) = self.send_telegram(message).await {
            error!("Telegram alert failed: {e}");
        }

        if let Err(e) = self.send_discord(message).await {
            error!("Discord alert failed: {e}");
        }
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.config.telegram_bot_token, &self.config.telegram_chat_id) else {
            return Ok(()); // Not configured
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("HASHROAD: {message}"),
        });

        self.http.post(&url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({
            "content": format!("**HASHROAD**: {message}")
        });

        self.http.post(webhook_url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Alerts raised by one cycle: stop trips, bankruptcies and the
    /// drawdown threshold.
    pub fn alerts_for(&self, report: &CycleReport, drawdown_pct: f64) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(trigger) = report.stop {
            if self.config.alert_on_stop {
                out.push(format!("All tasks halted: {trigger}. Balance {}", report.balance));
            }
        }

        if self.config.alert_on_bankrupt {
            for change in &report.status_changes {
                if let StatusReason::Bankrupt { required, available } = change.reason {
                    out.push(format!(
                        "Task {} paused: stake {required} exceeds balance {available}",
                        change.task_name
                    ));
                }
            }
        }

        if self.drawdown_crossed(drawdown_pct) {
            out.push(format!(
                "Drawdown {drawdown_pct:.1}% from peak (threshold {:.1}%)",
                self.config.drawdown_alert_pct
            ));
        }

        out
    }

    /// Fires once per excursion past the threshold.
    fn drawdown_crossed(&self, drawdown_pct: f64) -> bool {
        let threshold = self.config.drawdown_alert_pct;
        if threshold <= 0.0 {
            return false;
        }
        if drawdown_pct >= threshold {
            !self.drawdown_fired.swap(true, Ordering::Relaxed)
        } else {
            self.drawdown_fired.store(false, Ordering::Relaxed);
            false
        }
    }

    pub async fn on_cycle(&self, report: &CycleReport, drawdown_pct: f64) {
        for message in self.alerts_for(report, drawdown_pct) {
            self.send(&message).await;
        }
    }
}
