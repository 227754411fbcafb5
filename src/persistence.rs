use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::engine::EngineState;

/// Write the engine state as pretty JSON. The file is written next to the
/// target and renamed over it, so a crash never leaves a torn snapshot.
pub fn save_state(path: impl AsRef<Path>, state: &EngineState) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(state).context("Failed to serialize engine state")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!("State saved to {}", path.display());
    Ok(())
}

/// Load a previously saved state. A missing file is not an error.
pub fn load_state(path: impl AsRef<Path>) -> Result<Option<EngineState>> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let state: EngineState =
        serde_json::from_str(&raw).with_context(|| format!("Corrupt state file {}", path.display()))?;
    state
        .config
        .validate()
        .with_context(|| format!("Invalid config in {}", path.display()))?;

    info!(
        "Loaded state from {}: balance={} wagers={} tasks={}",
        path.display(),
        state.bankroll.balance,
        state.ledger.len(),
        state.tasks.len()
    );
    Ok(Some(state))
}
