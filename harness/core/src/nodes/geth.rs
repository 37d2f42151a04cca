use std::{
    path::PathBuf,
    process::{Child, Command, Stdio},
    time::Duration,
};

use tempfile::TempDir;
use tracing::info;

use super::{binary_path, create_tempdir, kill_child, teardown_home};
use crate::{
    adjust_timeout,
    cluster::SetupError,
    eth::EthClient,
    free_tcp_port,
    wait::{WaitOptions, wait_for_condition},
};

const READY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct GethOptions {
    pub binary: PathBuf,
    /// Dev-mode block period in seconds; 1 keeps block cadence comparable to
    /// the chain under test.
    pub dev_period_secs: u64,
}

impl Default for GethOptions {
    fn default() -> Self {
        Self {
            binary: binary_path("GETH_BIN", "geth"),
            dev_period_secs: 1,
        }
    }
}

/// Reference client: `geth --dev` with HTTP and WebSocket RPC enabled. The
/// dev account is created and unlocked by geth itself; tests discover it via
/// `eth_accounts`.
pub struct GethNode {
    datadir: Option<TempDir>,
    child: Child,
    http_url: String,
    ws_url: String,
}

impl Drop for GethNode {
    fn drop(&mut self) {
        kill_child(&mut self.child, "geth");
        teardown_home(self.datadir.take(), "geth");
    }
}

impl GethNode {
    pub async fn spawn(options: GethOptions) -> Result<Self, SetupError> {
        let datadir = create_tempdir("geth")?;
        let http_port = free_tcp_port()?;
        let ws_port = free_tcp_port()?;

        info!(http_port, ws_port, "starting geth --dev");
        let child = Command::new(&options.binary)
            .arg("--dev")
            .args(["--dev.period", &options.dev_period_secs.to_string()])
            .arg("--datadir")
            .arg(datadir.path())
            .args([
                "--http",
                "--http.addr",
                "127.0.0.1",
                "--http.port",
                &http_port.to_string(),
                "--http.api",
                "eth,net,web3",
                "--ws",
                "--ws.addr",
                "127.0.0.1",
                "--ws.port",
                &ws_port.to_string(),
                "--ws.api",
                "eth,net,web3",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SetupError::Launch {
                what: options.binary.display().to_string(),
                source,
            })?;

        let mut node = Self {
            datadir: Some(datadir),
            child,
            http_url: format!("http://127.0.0.1:{http_port}"),
            ws_url: format!("ws://127.0.0.1:{ws_port}"),
        };

        if let Err(err) = node.wait_online().await {
            kill_child(&mut node.child, "geth");
            return Err(err);
        }
        Ok(node)
    }

    /// Dev mode mines on demand, so readiness is just the RPC answering.
    async fn wait_online(&self) -> Result<(), SetupError> {
        let timeout = adjust_timeout(READY_TIMEOUT);
        let eth = EthClient::http(&self.http_url).map_err(|e| SetupError::Readiness {
            what: format!("geth json-rpc at {}", self.http_url),
            reason: e.to_string(),
        })?;

        wait_for_condition(
            "geth rpc online",
            WaitOptions::new(Duration::from_millis(100), timeout),
            || {
                let eth = eth.clone();
                async move {
                    Ok::<_, std::convert::Infallible>(eth.block_number().await.is_ok())
                }
            },
        )
        .await
        .map_err(|_| SetupError::Readiness {
            what: format!("geth json-rpc at {}", self.http_url),
            reason: format!("rpc not serving within {timeout:?}"),
        })
    }

    #[must_use]
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}
