use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    time::Duration,
};

use tempfile::TempDir;
use tracing::{debug, info};

use super::{CLIENT, binary_path, create_tempdir, kill_child, teardown_home};
use crate::{
    accounts::PREFUNDED,
    adjust_timeout,
    cli::ChainCli,
    cluster::SetupError,
    eth::EthClient,
    free_tcp_port,
    wait::{WaitOptions, wait_for_condition},
};

pub const DEFAULT_CHAIN_ID: &str = "harness_9000-1";
pub const BASE_DENOM: &str = "aharness";

const GENESIS_BALANCE: &str = "100000000000000000000000000";
const VALIDATOR_STAKE: &str = "1000000000000000000000000";
const READY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DbBackend {
    Goleveldb,
    Rocksdb,
}

impl DbBackend {
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Goleveldb => "goleveldb",
            Self::Rocksdb => "rocksdb",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EvmdOptions {
    pub binary: PathBuf,
    pub chain_id: String,
    pub db_backend: DbBackend,
    /// Slow down block production (5s commit timeout instead of 1s); some
    /// tests need room to observe state between blocks.
    pub long_timeout_commit: bool,
}

impl Default for EvmdOptions {
    fn default() -> Self {
        Self {
            binary: binary_path("EVMD_BIN", "evmd"),
            chain_id: DEFAULT_CHAIN_ID.to_owned(),
            db_backend: DbBackend::Goleveldb,
            long_timeout_commit: false,
        }
    }
}

impl EvmdOptions {
    #[must_use]
    pub fn with_db_backend(mut self, db_backend: DbBackend) -> Self {
        self.db_backend = db_backend;
        self
    }
}

/// A single-validator `evmd` chain running in a temporary home, with the
/// EVM JSON-RPC enabled on both HTTP and WebSocket.
pub struct EvmdNode {
    home: Option<TempDir>,
    child: Child,
    http_url: String,
    ws_url: String,
    cometbft_url: String,
    cli: ChainCli,
}

impl Drop for EvmdNode {
    fn drop(&mut self) {
        kill_child(&mut self.child, "evmd");
        teardown_home(self.home.take(), "evmd");
    }
}

impl EvmdNode {
    pub async fn spawn(options: EvmdOptions) -> Result<Self, SetupError> {
        let home = create_tempdir("evmd")?;

        let json_rpc_port = free_tcp_port()?;
        let ws_port = free_tcp_port()?;
        let rpc_port = free_tcp_port()?;
        let p2p_port = free_tcp_port()?;
        let grpc_port = free_tcp_port()?;

        let cometbft_url = format!("http://127.0.0.1:{rpc_port}");
        let cli = ChainCli::new(
            options.binary.clone(),
            home.path(),
            cometbft_url.clone(),
            options.chain_id.clone(),
        );

        init_home(&cli, &options)?;
        patch_commit_timeout(home.path(), options.long_timeout_commit)?;

        info!(
            chain_id = %options.chain_id,
            db_backend = options.db_backend.flag(),
            json_rpc_port,
            "starting evmd"
        );
        let child = Command::new(&options.binary)
            .arg("start")
            .arg("--home")
            .arg(home.path())
            .args([
                "--json-rpc.enable",
                "--json-rpc.api",
                "eth,net,web3",
                "--json-rpc.address",
                &format!("127.0.0.1:{json_rpc_port}"),
                "--json-rpc.ws-address",
                &format!("127.0.0.1:{ws_port}"),
                "--rpc.laddr",
                &format!("tcp://127.0.0.1:{rpc_port}"),
                "--p2p.laddr",
                &format!("tcp://127.0.0.1:{p2p_port}"),
                "--grpc.address",
                &format!("127.0.0.1:{grpc_port}"),
                "--db_backend",
                options.db_backend.flag(),
            ])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SetupError::Launch {
                what: options.binary.display().to_string(),
                source,
            })?;

        let mut node = Self {
            home: Some(home),
            child,
            http_url: format!("http://127.0.0.1:{json_rpc_port}"),
            ws_url: format!("ws://127.0.0.1:{ws_port}"),
            cometbft_url,
            cli,
        };

        if let Err(err) = node.wait_online().await {
            // fail fast; the caller never retries cluster startup
            kill_child(&mut node.child, "evmd");
            return Err(err);
        }
        Ok(node)
    }

    /// Ready means the JSON-RPC answers and the chain produced its first
    /// block, so queries against `latest` have something to stand on.
    async fn wait_online(&self) -> Result<(), SetupError> {
        let timeout = adjust_timeout(READY_TIMEOUT);
        let eth = EthClient::http(&self.http_url).map_err(|e| SetupError::Readiness {
            what: format!("evmd json-rpc at {}", self.http_url),
            reason: e.to_string(),
        })?;

        let options = WaitOptions::new(Duration::from_millis(200), timeout);
        wait_for_condition("evmd first block", options, || {
            let eth = eth.clone();
            async move { Ok::<_, std::convert::Infallible>(matches!(eth.block_number().await, Ok(h) if h >= 1)) }
        })
        .await
        .map_err(|_| SetupError::Readiness {
            what: format!("evmd json-rpc at {}", self.http_url),
            reason: format!("no block produced within {timeout:?}"),
        })?;

        // the CometBFT RPC backs the chain CLI; probe it too
        let status_url = format!("{}/status", self.cometbft_url);
        wait_for_condition(
            "evmd cometbft rpc",
            WaitOptions::new(Duration::from_millis(200), timeout),
            || {
                let url = status_url.clone();
                async move {
                    Ok::<_, std::convert::Infallible>(
                        CLIENT
                            .get(&url)
                            .send()
                            .await
                            .is_ok_and(|res| res.status().is_success()),
                    )
                }
            },
        )
        .await
        .map_err(|_| SetupError::Readiness {
            what: format!("evmd cometbft rpc at {}", self.cometbft_url),
            reason: format!("status endpoint not serving within {timeout:?}"),
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

    #[must_use]
    pub fn cli(&self) -> &ChainCli {
        &self.cli
    }
}

/// One-time home initialization: genesis, keyring, validator gentx.
fn init_home(cli: &ChainCli, options: &EvmdOptions) -> Result<(), SetupError> {
    debug!(home = %cli.home().display(), "initializing evmd home");
    cli.init("harness-node")?;

    for account in &PREFUNDED {
        cli.keys_add_recover(account.name, account.mnemonic)?;
        cli.add_genesis_account(account.name, &format!("{GENESIS_BALANCE}{BASE_DENOM}"))?;
    }

    cli.gentx(
        "validator",
        &format!("{VALIDATOR_STAKE}{BASE_DENOM}"),
        &options.chain_id,
    )?;
    cli.collect_gentxs()?;
    Ok(())
}

/// Rewrite `consensus.timeout_commit` in the generated CometBFT config so
/// block cadence matches what the test asked for.
fn patch_commit_timeout(home: &Path, long_timeout_commit: bool) -> Result<(), SetupError> {
    let config_path = home.join("config").join("config.toml");
    let raw = fs::read_to_string(&config_path)?;
    let mut config: toml::Value = raw
        .parse()
        .map_err(|e: toml::de::Error| SetupError::Config(e.to_string()))?;

    let timeout = if long_timeout_commit { "5s" } else { "1s" };
    if let Some(consensus) = config
        .get_mut("consensus")
        .and_then(toml::Value::as_table_mut)
    {
        consensus.insert(
            "timeout_commit".to_owned(),
            toml::Value::String(timeout.to_owned()),
        );
    }

    let rendered =
        toml::to_string_pretty(&config).map_err(|e| SetupError::Config(e.to_string()))?;
    fs::write(&config_path, rendered)?;
    Ok(())
}
