use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::feeds::BlockSource;
use crate::models::block::Block;

/// Starting height of a simulated chain, roughly where mainnet sits.
pub const GENESIS_HEIGHT: u64 = 60_000_000;
/// Blocks emitted up front so streaks and the predictor have history.
pub const WARMUP_BLOCKS: usize = 300;
/// Nominal block interval, used for synthetic timestamps.
pub const BLOCK_INTERVAL_MS: i64 = 3_000;

/// Deterministic synthetic chain: each hash is
/// `sha256(prev_hash || height || nonce)` with the nonce drawn from a
/// seeded RNG.
pub struct SimulatedChain {
    rng: StdRng,
    height: u64,
    prev_hash: [u8; 32],
}

impl SimulatedChain {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            height: GENESIS_HEIGHT,
            prev_hash: [0u8; 32],
        }
    }

    pub fn next_block(&mut self) -> Block {
        self.height += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.rng.next_u64().to_be_bytes());
        let digest = hasher.finalize();
        self.prev_hash.copy_from_slice(&digest);

        Block::new(self.height, hex::encode(digest), Utc::now())
    }

    /// `n` blocks back-dated so the newest lands at roughly now.
    pub fn history(&mut self, n: usize) -> Vec<Block> {
        let mut blocks: Vec<Block> = (0..n).map(|_| self.next_block()).collect();
        let now = Utc::now();
        let len = blocks.len() as i64;
        for (i, b) in blocks.iter_mut().enumerate() {
            b.produced_at = now - Duration::milliseconds((len - 1 - i as i64) * BLOCK_INTERVAL_MS);
        }
        blocks
    }

    pub fn height(&self) -> u64 {
        self.height
    }
}

/// Offline block source emitting one synthetic block per poll interval.
pub struct SimulatedFeed {
    chain: SimulatedChain,
    interval_ms: u64,
}

impl SimulatedFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            chain: SimulatedChain::new(config.simulated_seed),
            interval_ms: config.poll_interval_ms,
        }
    }
}

impl BlockSource for SimulatedFeed {
    fn name(&self) -> &'static str {
        "simulated"
    }

    // Every height is emitted in order, so there is nothing to back-fill.
    fn spawn(
        self: Box<Self>,
        tx: mpsc::Sender<Vec<Block>>,
        _wanted: watch::Receiver<Vec<u64>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let SimulatedFeed {
            mut chain,
            interval_ms,
        } = *self;

        tokio::spawn(async move {
            let warmup = chain.history(WARMUP_BLOCKS);
            info!(
                "Simulated feed: {} warm-up blocks up to height {}, then one every {interval_ms}ms",
                warmup.len(),
                chain.height()
            );
            if tx.send(warmup).await.is_err() {
                return;
            }

            let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let block = chain.next_block();
                        debug!("Simulated block {} {}", block.height, block.hash);
                        if tx.send(vec![block]).await.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Simulated feed shutdown");
                        return;
                    }
                }
            }
        })
    }
}
