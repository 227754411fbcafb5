use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeSet;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::feeds::BlockSource;
use crate::models::block::Block;

/// Polls a TronGrid-compatible full node for the chain head.
///
/// Heights skipped between two polls are remembered and back-filled one by
/// one with `getblockbynum`, up to `backfill_limit` per poll. A failed
/// back-fill stays on the list and is retried on the next poll.
/// Upper bound on remembered missing heights. The oldest are forgotten first.
pub const MAX_TRACKED_MISSING: usize = 2_000;

pub struct TronGridFeed {
    config: FeedConfig,
    http: reqwest::Client,
}

impl TronGridFeed {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(key).context("Invalid TronGrid API key")?;
            headers.insert("TRON-PRO-API-KEY", value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(2)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, http })
    }

    async fn now_block(&self) -> Result<Block> {
        let url = format!("{}/wallet/getnowblock", self.config.api_url);
        let raw: TronBlock = self
            .http
            .post(&url)
            .send()
            .await
            .context("getnowblock request failed")?
            .error_for_status()?
            .json()
            .await
            .context("getnowblock: malformed response")?;
        raw.into_block().context("getnowblock: block without header")
    }

    async fn block_by_num(&self, height: u64) -> Result<Block> {
        let url = format!("{}/wallet/getblockbynum", self.config.api_url);
        let raw: TronBlock = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "num": height }))
            .send()
            .await
            .with_context(|| format!("getblockbynum {height} request failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("getblockbynum {height}: malformed response"))?;
        raw.into_block()
            .with_context(|| format!("getblockbynum {height}: block not found"))
    }

    /// One poll: the head plus whatever [`fetch_plan`] picks from the missing
    /// and wanted heights.
    async fn poll(&self, last_seen: Option<u64>, missing: &mut BTreeSet<u64>, wanted: &[u64]) -> Result<Vec<Block>> {
        let head = self.now_block().await?;

        if let Some(last) = last_seen {
            if head.height > last + 1 {
                missing.extend(last + 1..head.height);
            }
        }
        while missing.len() > MAX_TRACKED_MISSING {
            missing.pop_first();
        }

        let plan = fetch_plan(missing, wanted, head.height, self.config.backfill_limit as usize);
        let mut batch = Vec::with_capacity(plan.len() + 1);
        for height in plan {
            match self.block_by_num(height).await {
                Ok(block) => {
                    missing.remove(&height);
                    batch.push(block);
                }
                Err(e) => {
                    debug!("Back-fill of {height} failed, will retry: {e:#}");
                    missing.insert(height);
                }
            }
        }

        batch.push(head);
        Ok(batch)
    }
}

impl BlockSource for TronGridFeed {
    fn name(&self) -> &'static str {
        "trongrid"
    }

    fn spawn(
        self: Box<Self>,
        tx: mpsc::Sender<Vec<Block>>,
        wanted: watch::Receiver<Vec<u64>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval_ms = self.config.poll_interval_ms;
            let mut delay_ms = 0u64;
            let mut backoff_ms = interval_ms;
            let mut last_seen: Option<u64> = None;
            let mut missing = BTreeSet::new();

            info!("TronGrid feed polling {} every {interval_ms}ms", self.config.api_url);

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)) => {}
                    _ = shutdown.recv() => {
                        info!("TronGrid feed shutdown");
                        return;
                    }
                }

                let targets = wanted.borrow().clone();
                match self.poll(last_seen, &mut missing, &targets).await {
                    Ok(batch) => {
                        backoff_ms = interval_ms;
                        delay_ms = interval_ms;
                        let Some(top) = batch.iter().map(|b| b.height).max() else {
                            continue;
                        };
                        last_seen = Some(last_seen.map_or(top, |seen| seen.max(top)));
                        if tx.send(batch).await.is_err() {
                            debug!("Block receiver dropped, stopping TronGrid feed");
                            return;
                        }
                    }
                    Err(e) => {
                        let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4);
                        delay_ms = backoff_ms + jitter;
                        warn!("TronGrid poll failed: {e:#}. Retrying in {delay_ms}ms");
                        backoff_ms = (backoff_ms * 2).min(self.config.max_backoff_ms);
                    }
                }
            }
        })
    }
}

/// Heights to back-fill this poll, at most `limit`, all below `head`.
///
/// Wanted heights come first since pending wagers wait on them, then the
/// most recent missing ones.
pub fn fetch_plan(missing: &BTreeSet<u64>, wanted: &[u64], head: u64, limit: usize) -> Vec<u64> {
    let mut plan = Vec::with_capacity(limit);
    let candidates = wanted.iter().copied().chain(missing.iter().rev().copied());
    for height in candidates.filter(|h| *h < head) {
        if plan.len() >= limit {
            break;
        }
        if !plan.contains(&height) {
            plan.push(height);
        }
    }
    plan
}

// --- TronGrid response types ---

#[derive(Debug, Deserialize)]
struct TronBlock {
    #[serde(rename = "blockID", default)]
    block_id: Option<String>,
    #[serde(default)]
    block_header: Option<BlockHeader>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    raw_data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    number: u64,
    #[serde(default)]
    timestamp: i64,
}

impl TronBlock {
    fn into_block(self) -> Option<Block> {
        let hash = self.block_id?;
        let raw = self.block_header?.raw_data;
        let produced_at: DateTime<Utc> = Utc.timestamp_millis_opt(raw.timestamp).single().unwrap_or_else(Utc::now);
        Some(Block::new(raw.number, hash, produced_at))
    }
}
