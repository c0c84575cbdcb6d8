// src/watch/settle.rs

//! Short settle delay for producers that do not write-then-rename.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::fs::FileSystem;

/// Wait until the size of `path` stops changing between two checks `delay`
/// apart, giving up after `checks` rounds.
///
/// Returns `Ok(true)` when the file looked stable, `Ok(false)` when it was
/// still growing after the last check. A zero `delay` skips the wait.
pub async fn wait_until_stable(
    fs: &dyn FileSystem,
    path: &Path,
    delay: Duration,
    checks: u32,
) -> Result<bool> {
    if delay.is_zero() || checks == 0 {
        return Ok(true);
    }

    let mut last = fs.file_len(path)?;
    for round in 1..=checks {
        tokio::time::sleep(delay).await;
        let len = fs.file_len(path)?;
        if len == last {
            debug!(path = %path.display(), round, len, "task file settled");
            return Ok(true);
        }
        last = len;
    }

    warn!(
        path = %path.display(),
        checks,
        "task file still growing; producers should write to a temporary name and rename"
    );
    Ok(false)
}
