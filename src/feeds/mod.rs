pub mod simulated;
pub mod trongrid;
pub mod window;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::models::block::Block;

/// A producer of new blocks.
///
/// Implementations run on their own task, push batches of freshly seen
/// blocks (any order, possibly overlapping earlier batches) into `tx`, and
/// exit on `shutdown` or when the receiver is dropped.
///
/// `wanted` carries the target heights of wagers still awaiting settlement.
/// Sources that can fetch past heights should deliver those at or below
/// their head even if they were skipped earlier.
pub trait BlockSource: Send + 'static {
    fn name(&self) -> &'static str;

    fn spawn(
        self: Box<Self>,
        tx: mpsc::Sender<Vec<Block>>,
        wanted: watch::Receiver<Vec<u64>>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()>;
}
