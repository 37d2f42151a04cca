use std::{
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    events::TxEvent,
    wait::{PollStatus, WaitError, WaitOptions, wait_for},
};

const KEYRING_BACKEND: &str = "test";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    NonZeroExit { command: String, stderr: String },
    #[error("failed to parse `{command}` output: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{command}` produced no {expected}")]
    MissingOutput {
        command: String,
        expected: &'static str,
    },
}

/// Broadcast result of a chain-native transaction. `code == 0` means the
/// transaction was accepted into the mempool; inclusion is confirmed
/// separately through [`ChainCli::wait_for_tx_receipt`].
#[derive(Clone, Debug, Deserialize)]
pub struct TxResponse {
    pub code: u32,
    pub txhash: String,
    #[serde(default)]
    pub raw_log: String,
}

/// A committed transaction as reported by `query tx`.
#[derive(Clone, Debug, Deserialize)]
pub struct TxResult {
    pub code: u32,
    pub txhash: String,
    #[serde(default)]
    pub events: Vec<TxEvent>,
}

/// Wrapper over a Cosmos SDK chain binary's CLI, pointed at one node's RPC
/// endpoint and key home. All key material uses the `test` keyring backend.
#[derive(Clone, Debug)]
pub struct ChainCli {
    binary: PathBuf,
    home: PathBuf,
    node: String,
    chain_id: String,
}

impl ChainCli {
    #[must_use]
    pub fn new(binary: PathBuf, home: &Path, node: String, chain_id: String) -> Self {
        Self {
            binary,
            home: home.to_owned(),
            node,
            chain_id,
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// RPC endpoint this CLI is pointed at.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    fn run_raw(&self, args: &[&str], stdin: Option<&str>) -> Result<String, CliError> {
        let command = self.command_line(args);
        debug!(%command, "running chain cli");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .arg("--home")
            .arg(&self.home)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = if let Some(input) = stdin {
            cmd.stdin(Stdio::piped());
            let mut child = cmd.spawn().map_err(|source| CliError::Spawn {
                command: command.clone(),
                source,
            })?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .map_err(|source| CliError::Spawn {
                        command: command.clone(),
                        source,
                    })?;
            }
            child.wait_with_output()
        } else {
            cmd.output()
        }
        .map_err(|source| CliError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(CliError::NonZeroExit {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_json<T>(&self, args: &[&str], stdin: Option<&str>) -> Result<T, CliError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut args = args.to_vec();
        args.extend_from_slice(&["--output", "json"]);
        let stdout = self.run_raw(&args, stdin)?;
        serde_json::from_str(&stdout).map_err(|source| CliError::Parse {
            command: self.command_line(&args),
            source,
        })
    }

    fn tx_json(&self, args: &[&str], from: &str, fees: Option<&str>) -> Result<TxResponse, CliError> {
        let mut args = args.to_vec();
        args.extend_from_slice(&[
            "--from",
            from,
            "--chain-id",
            &self.chain_id,
            "--node",
            &self.node,
            "--keyring-backend",
            KEYRING_BACKEND,
            "--gas",
            "auto",
            "--gas-adjustment",
            "1.5",
            "--yes",
        ]);
        if let Some(fees) = fees {
            args.extend_from_slice(&["--fees", fees]);
        }
        self.run_json(&args, None)
    }

    /// Initialize a fresh node home with a default genesis.
    pub fn init(&self, moniker: &str) -> Result<(), CliError> {
        self.run_raw(&["init", moniker, "--chain-id", &self.chain_id], None)
            .map(|_| ())
    }

    /// Allocate a genesis balance to a keyring account.
    pub fn add_genesis_account(&self, name: &str, amount: &str) -> Result<(), CliError> {
        self.run_raw(
            &[
                "genesis",
                "add-genesis-account",
                name,
                amount,
                "--keyring-backend",
                KEYRING_BACKEND,
            ],
            None,
        )
        .map(|_| ())
    }

    /// Create the self-delegation transaction for the single genesis
    /// validator.
    pub fn gentx(&self, name: &str, stake: &str, chain_id: &str) -> Result<(), CliError> {
        self.run_raw(
            &[
                "genesis",
                "gentx",
                name,
                stake,
                "--chain-id",
                chain_id,
                "--keyring-backend",
                KEYRING_BACKEND,
            ],
            None,
        )
        .map(|_| ())
    }

    pub fn collect_gentxs(&self) -> Result<(), CliError> {
        self.run_raw(&["genesis", "collect-gentxs"], None).map(|_| ())
    }

    /// Run a `keys` subcommand; these touch the keyring only, never the node.
    pub fn keys_add_recover(&self, name: &str, mnemonic: &str) -> Result<(), CliError> {
        self.run_raw(
            &[
                "keys",
                "add",
                name,
                "--recover",
                "--keyring-backend",
                KEYRING_BACKEND,
            ],
            Some(mnemonic),
        )
        .map(|_| ())
    }

    /// Bech32 account address of a named key in the keyring.
    pub fn address(&self, name: &str) -> Result<String, CliError> {
        let args = [
            "keys",
            "show",
            name,
            "-a",
            "--keyring-backend",
            KEYRING_BACKEND,
        ];
        let stdout = self.run_raw(&args, None)?;
        let address = stdout.trim();
        if address.is_empty() {
            return Err(CliError::MissingOutput {
                command: self.command_line(&args),
                expected: "address",
            });
        }
        Ok(address.to_owned())
    }

    /// Translate a hex address into its bech32 rendering via `debug addr`.
    pub fn bech32_address(&self, hex_address: &str) -> Result<String, CliError> {
        let trimmed = hex_address.trim_start_matches("0x");
        let args = ["debug", "addr", trimmed];
        let stdout = self.run_raw(&args, None)?;
        stdout
            .lines()
            .find_map(|line| line.strip_prefix("Bech32 Acc:"))
            .map(|addr| addr.trim().to_owned())
            .ok_or(CliError::MissingOutput {
                command: self.command_line(&args),
                expected: "bech32 account address",
            })
    }

    pub fn query_balance(&self, address: &str, denom: &str) -> Result<u128, CliError> {
        #[derive(Deserialize)]
        struct Coin {
            amount: String,
        }
        let args = [
            "query",
            "bank",
            "balances",
            address,
            "--denom",
            denom,
            "--node",
            &self.node,
        ];
        let coin: Coin = self.run_json(&args, None)?;
        coin.amount
            .parse()
            .map_err(|_| CliError::MissingOutput {
                command: self.command_line(&args),
                expected: "integer amount",
            })
    }

    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: &str,
        fees: &str,
    ) -> Result<TxResponse, CliError> {
        self.tx_json(&["tx", "bank", "send", from, to, amount], from, Some(fees))
    }

    /// Fungible token transfer over an IBC channel on the `transfer` port.
    /// A memo, when given, rides along in the packet for ibc-hooks consumers
    /// on the receiving chain.
    pub fn ibc_transfer(
        &self,
        from: &str,
        receiver: &str,
        amount: &str,
        channel: &str,
        memo: Option<&str>,
        fees: &str,
    ) -> Result<TxResponse, CliError> {
        let mut args = vec![
            "tx",
            "ibc-transfer",
            "transfer",
            "transfer",
            channel,
            receiver,
            amount,
        ];
        if let Some(memo) = memo {
            args.extend_from_slice(&["--memo", memo]);
        }
        self.tx_json(&args, from, Some(fees))
    }

    pub fn wasm_store(&self, from: &str, wasm_path: &Path) -> Result<TxResponse, CliError> {
        let path = wasm_path.display().to_string();
        self.tx_json(&["tx", "wasm", "store", &path], from, None)
    }

    pub fn wasm_instantiate2(
        &self,
        from: &str,
        code_id: &str,
        init_msg: &str,
        label: &str,
    ) -> Result<TxResponse, CliError> {
        let salt = hex::encode(label);
        self.tx_json(
            &[
                "tx",
                "wasm",
                "instantiate2",
                code_id,
                init_msg,
                &salt,
                "--label",
                label,
                "--no-admin",
            ],
            from,
            None,
        )
    }

    pub fn wasm_execute(
        &self,
        from: &str,
        contract: &str,
        msg: &str,
    ) -> Result<TxResponse, CliError> {
        self.tx_json(&["tx", "wasm", "execute", contract, msg], from, None)
    }

    pub fn gamm_create_pool(&self, from: &str, pool_file: &Path) -> Result<TxResponse, CliError> {
        let path = pool_file.display().to_string();
        self.tx_json(
            &["tx", "gamm", "create-pool", "--pool-file", &path],
            from,
            None,
        )
    }

    /// Node status through the CometBFT RPC; fails while the node is down,
    /// which makes it a usable readiness probe.
    pub fn status(&self) -> Result<serde_json::Value, CliError> {
        self.run_json(&["status", "--node", &self.node], None)
    }

    pub fn query_channels(&self) -> Result<serde_json::Value, CliError> {
        self.run_json(
            &["query", "ibc", "channel", "channels", "--node", &self.node],
            None,
        )
    }

    /// Committed transaction by hash; `Ok(None)` while the transaction is not
    /// yet indexed. Any other CLI failure propagates.
    pub fn query_tx(&self, hash: &str) -> Result<Option<TxResult>, CliError> {
        let args = ["query", "tx", hash, "--node", &self.node];
        match self.run_json(&args, None) {
            Ok(result) => Ok(Some(result)),
            Err(CliError::NonZeroExit { stderr, .. }) if stderr.contains("not found") => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Poll `query tx` until the transaction is committed and indexed.
    pub async fn wait_for_tx_receipt(
        &self,
        hash: &str,
        options: WaitOptions,
    ) -> Result<TxResult, WaitError<CliError>> {
        wait_for(&format!("chain tx {hash}"), options, || async {
            Ok(match self.query_tx(hash)? {
                Some(result) => PollStatus::Ready(result),
                None => PollStatus::Pending,
            })
        })
        .await
    }
}
