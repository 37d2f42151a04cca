use std::fmt;

/// Network backend a test body runs against.
///
/// The set is closed on purpose: provisioning dispatches with exhaustive
/// matches, so adding a variant is a compile-time checked extension point.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Backend {
    /// Default `evmd` build, JSON-RPC over HTTP.
    Evmd,
    /// Same chain instance as [`Backend::Evmd`], JSON-RPC over WebSocket.
    EvmdWebsocket,
    /// `evmd` started with the rocksdb storage backend.
    EvmdRocksdb,
    /// Reference client, `geth --dev`.
    Geth,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportKind {
    Http,
    WebSocket,
}

impl Backend {
    pub const ALL: [Self; 4] = [
        Self::Evmd,
        Self::EvmdWebsocket,
        Self::EvmdRocksdb,
        Self::Geth,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Evmd => "evmd",
            Self::EvmdWebsocket => "evmd-ws",
            Self::EvmdRocksdb => "evmd-rocksdb",
            Self::Geth => "geth",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.label() == label)
    }

    /// Whether this variant runs the chain-under-test binary (and therefore
    /// exposes the chain-native CLI surface).
    #[must_use]
    pub const fn uses_evmd_binary(self) -> bool {
        match self {
            Self::Evmd | Self::EvmdWebsocket | Self::EvmdRocksdb => true,
            Self::Geth => false,
        }
    }

    #[must_use]
    pub const fn transport(self) -> TransportKind {
        match self {
            Self::EvmdWebsocket => TransportKind::WebSocket,
            Self::Evmd | Self::EvmdRocksdb | Self::Geth => TransportKind::Http,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
