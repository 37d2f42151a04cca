pub mod accounts;
pub mod cli;
pub mod cluster;
pub mod eth;
pub mod events;
pub mod nodes;
pub mod variant;
pub mod wait;

use std::{env, io, net::TcpListener, ops::Mul as _, sync::LazyLock, time::Duration};

pub use cluster::{Cluster, ClusterRegistry, ClusterSettings, ScopeId, SetupError};
pub use variant::{Backend, TransportKind};
pub use wait::{
    PollStatus, WaitError, WaitOptions, wait_for, wait_for_condition, wait_for_new_blocks,
};

static IS_SLOW_TEST_ENV: LazyLock<bool> =
    LazyLock::new(|| env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true"));

/// In slow test environments like CI coverage runs, use 2x timeout.
#[must_use]
pub fn adjust_timeout(d: Duration) -> Duration {
    if *IS_SLOW_TEST_ENV { d.mul(2) } else { d }
}

/// An OS-assigned free TCP port on localhost.
pub fn free_tcp_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
