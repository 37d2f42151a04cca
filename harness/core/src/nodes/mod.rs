pub mod evmd;
pub mod geth;

use std::{env, io, path::PathBuf, process::Child, sync::LazyLock};

use tempfile::TempDir;
use tracing::{info, warn};

pub(crate) static CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

pub(crate) fn create_tempdir(prefix: &str) -> io::Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("harness-{prefix}-"))
        .tempdir()
}

fn keep_node_data() -> bool {
    env::var("HARNESS_KEEP_DATA").is_ok_and(|v| v == "true" || v == "1")
}

/// On teardown, either remove the node home or keep it for post-mortem when
/// `HARNESS_KEEP_DATA` is set.
pub(crate) fn teardown_home(home: Option<TempDir>, label: &str) {
    let Some(home) = home else { return };
    if keep_node_data() {
        let path = home.keep();
        info!(label, path = %path.display(), "keeping node home");
    }
}

pub(crate) fn kill_child(child: &mut Child, label: &str) {
    if let Err(e) = child.kill() {
        warn!(label, error = %e, "failed to kill node process");
    }
    if let Err(e) = child.wait() {
        warn!(label, error = %e, "failed to reap node process");
    }
}

/// Binary path from the environment override, falling back to `$PATH` lookup
/// by name.
#[must_use]
pub fn binary_path(env_key: &str, default_name: &str) -> PathBuf {
    env::var(env_key).map_or_else(|_| PathBuf::from(default_name), PathBuf::from)
}
