use std::{fmt, io, sync::Arc};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    accounts,
    cli::{ChainCli, CliError},
    eth::{EthClient, RpcError},
    nodes::{
        evmd::{DbBackend, EvmdNode, EvmdOptions},
        geth::{GethNode, GethOptions},
    },
    variant::Backend,
};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to launch {what}: {source}")]
    Launch {
        what: String,
        #[source]
        source: io::Error,
    },
    #[error("{what} did not become ready: {reason}")]
    Readiness { what: String, reason: String },
    #[error("node config error: {0}")]
    Config(String),
    #[error(transparent)]
    Cli(#[from] CliError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A cluster for this (variant, scope) already failed to start. Startup
    /// is never retried; every dependent test fails fast with the original
    /// reason.
    #[error("cluster {backend} [{scope}] failed earlier: {reason}")]
    PreviousAttemptFailed {
        backend: Backend,
        scope: ScopeId,
        reason: String,
    },
}

/// Cache scope of a provisioned cluster. Session-scoped clusters are shared
/// read-mostly across the whole run; module scopes get fresh, genesis-level
/// isolated chains.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ScopeId {
    Session,
    Module(&'static str),
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Module(name) => write!(f, "module:{name}"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClusterSettings {
    pub evmd: EvmdOptions,
    pub geth: GethOptions,
}

enum ClusterProcess {
    Evmd(Arc<EvmdNode>),
    Geth(Arc<GethNode>),
}

/// Handle to a running network backend: one EVM RPC transport plus, for the
/// chain under test, the chain-native CLI surface.
pub struct Cluster {
    backend: Backend,
    scope: ScopeId,
    eth: EthClient,
    process: ClusterProcess,
}

impl Cluster {
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    #[must_use]
    pub const fn scope(&self) -> ScopeId {
        self.scope
    }

    #[must_use]
    pub const fn eth(&self) -> &EthClient {
        &self.eth
    }

    /// Chain-native CLI; absent for the reference client.
    #[must_use]
    pub fn cli(&self) -> Option<&ChainCli> {
        match &self.process {
            ClusterProcess::Evmd(node) => Some(node.cli()),
            ClusterProcess::Geth(_) => None,
        }
    }

    pub async fn head_height(&self) -> Result<u64, RpcError> {
        self.eth.block_number().await
    }

    /// An address that can send value through `eth_sendTransaction` on this
    /// backend. The reference client funds its own dev account instead of the
    /// genesis registry, so the deviation is an explicit branch here.
    pub async fn prefunded_sender(&self) -> Result<String, RpcError> {
        match self.backend {
            Backend::Geth => {
                let accounts = self.eth.accounts().await?;
                accounts.into_iter().next().ok_or_else(|| {
                    RpcError::UnexpectedResponse("geth dev node has no unlocked accounts".into())
                })
            }
            Backend::Evmd | Backend::EvmdWebsocket | Backend::EvmdRocksdb => {
                let account = accounts::prefunded("validator")
                    .expect("validator is part of the genesis registry");
                Ok(account.eth_address.to_owned())
            }
        }
    }
}

enum EntryState {
    Ready(Arc<Cluster>),
    Failed(String),
}

struct RegistryEntry {
    backend: Backend,
    scope: ScopeId,
    state: EntryState,
}

/// Owns every provisioned cluster, keyed by (variant, scope). Exactly one
/// cluster is constructed per key; teardown runs LIFO when the registry is
/// dropped.
pub struct ClusterRegistry {
    settings: ClusterSettings,
    entries: Mutex<Vec<RegistryEntry>>,
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClusterRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut();
        while let Some(entry) = entries.pop() {
            if matches!(entry.state, EntryState::Ready(_)) {
                info!(backend = %entry.backend, scope = %entry.scope, "tearing down cluster");
            }
        }
    }
}

impl ClusterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(ClusterSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: ClusterSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Return the cluster for (backend, scope), provisioning it on first use.
    pub async fn acquire(
        &self,
        backend: Backend,
        scope: ScopeId,
    ) -> Result<Arc<Cluster>, SetupError> {
        let mut entries = self.entries.lock().await;
        if let Some(cluster) = Self::lookup(&entries, backend, scope)? {
            return Ok(cluster);
        }

        let result = self.provision(&mut entries, backend, scope).await;
        let state = match &result {
            Ok(cluster) => EntryState::Ready(Arc::clone(cluster)),
            Err(err) => {
                warn!(backend = %backend, scope = %scope, error = %err, "cluster provisioning failed");
                EntryState::Failed(err.to_string())
            }
        };
        entries.push(RegistryEntry {
            backend,
            scope,
            state,
        });
        result
    }

    fn lookup(
        entries: &[RegistryEntry],
        backend: Backend,
        scope: ScopeId,
    ) -> Result<Option<Arc<Cluster>>, SetupError> {
        for entry in entries {
            if entry.backend == backend && entry.scope == scope {
                return match &entry.state {
                    EntryState::Ready(cluster) => Ok(Some(Arc::clone(cluster))),
                    EntryState::Failed(reason) => Err(SetupError::PreviousAttemptFailed {
                        backend,
                        scope,
                        reason: reason.clone(),
                    }),
                };
            }
        }
        Ok(None)
    }

    async fn provision(
        &self,
        entries: &mut Vec<RegistryEntry>,
        backend: Backend,
        scope: ScopeId,
    ) -> Result<Arc<Cluster>, SetupError> {
        info!(backend = %backend, scope = %scope, "provisioning cluster");
        match backend {
            Backend::Evmd => self.spawn_evmd(DbBackend::Goleveldb, backend, scope).await,
            Backend::EvmdRocksdb => self.spawn_evmd(DbBackend::Rocksdb, backend, scope).await,
            Backend::EvmdWebsocket => {
                // derived variant: same chain instance as `evmd`, transport
                // swapped to the websocket endpoint
                let base = match Self::lookup(entries, Backend::Evmd, scope)? {
                    Some(cluster) => cluster,
                    None => {
                        let cluster = self
                            .spawn_evmd(DbBackend::Goleveldb, Backend::Evmd, scope)
                            .await?;
                        entries.push(RegistryEntry {
                            backend: Backend::Evmd,
                            scope,
                            state: EntryState::Ready(Arc::clone(&cluster)),
                        });
                        cluster
                    }
                };
                let ClusterProcess::Evmd(node) = &base.process else {
                    unreachable!("evmd entries always hold an evmd process");
                };
                let eth = EthClient::websocket(node.ws_url()).await?;
                Ok(Arc::new(Cluster {
                    backend,
                    scope,
                    eth,
                    process: ClusterProcess::Evmd(Arc::clone(node)),
                }))
            }
            Backend::Geth => {
                let node = GethNode::spawn(self.settings.geth.clone()).await?;
                let eth = EthClient::http(node.http_url())?;
                Ok(Arc::new(Cluster {
                    backend,
                    scope,
                    eth,
                    process: ClusterProcess::Geth(Arc::new(node)),
                }))
            }
        }
    }

    async fn spawn_evmd(
        &self,
        db_backend: DbBackend,
        backend: Backend,
        scope: ScopeId,
    ) -> Result<Arc<Cluster>, SetupError> {
        let options = self.settings.evmd.clone().with_db_backend(db_backend);
        let node = EvmdNode::spawn(options).await?;
        let eth = EthClient::http(node.http_url())?;
        Ok(Arc::new(Cluster {
            backend,
            scope,
            eth,
            process: ClusterProcess::Evmd(Arc::new(node)),
        }))
    }
}
