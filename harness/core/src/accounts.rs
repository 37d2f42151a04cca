use sha2::{Digest as _, Sha256};

/// A pre-funded genesis account. The keys are imported into the node keyring
/// from the fixed mnemonics during cluster provisioning, so the node signs on
/// behalf of these accounts via `eth_sendTransaction` and the chain CLI.
#[derive(Clone, Copy, Debug)]
pub struct Account {
    pub name: &'static str,
    pub eth_address: &'static str,
    pub mnemonic: &'static str,
}

/// Registry of accounts funded at genesis. Addresses are derived from the
/// mnemonics with the standard EVM HD path; they must stay in sync with the
/// genesis allocation written during `evmd` home initialization.
pub const PREFUNDED: [Account; 4] = [
    Account {
        name: "validator",
        eth_address: "0x57f96e6b86cdefdb3d412547816a82e3e0ebf9d2",
        mnemonic: "gesture inject test cycle original hollow east ridge hen combine junk child bacon zero hope comfort vacuum milk pitch cage oppose unhappy lunar seat",
    },
    Account {
        name: "community",
        eth_address: "0x378c50d9264c63f3f92b806d4ee56e9d86ffb3ec",
        mnemonic: "notable error gospel wave pair ugly measure elite toddler cost various fly make eye ketchup despair slab throw tribe swarm word fruit into inmate",
    },
    Account {
        name: "signer1",
        eth_address: "0x8fb4c86bf4834e577cf1f3d5fb5c10ebf4f60cc7",
        mnemonic: "dress interest erupt crucial dutch hover wreck sort bamboo bar sea tape crumble virus drop tilt nurse position cage vanish sight fortune spice fuel",
    },
    Account {
        name: "signer2",
        eth_address: "0x2fa5a56b8a5ba1f233a1a2c8f59d1634c5bf5d8c",
        mnemonic: "night fog apology sing quality tunnel blouse token trumpet asset leader mystery mention cradle sun adapt erode bonus exhibit glove mercy zone cycle mushroom",
    },
];

/// Look up a pre-funded account by its keyring name.
#[must_use]
pub fn prefunded(name: &str) -> Option<&'static Account> {
    PREFUNDED.iter().find(|account| account.name == name)
}

const DERIVATION_SEED: &[u8] = b"harness-derived-account";

/// Deterministically derive a fresh, unfunded `0x` address for a given index.
/// Derived accounts have no key material behind them; they are receiver and
/// query targets only.
#[must_use]
pub fn derive_new_account(index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DERIVATION_SEED);
    hasher.update(index.to_be_bytes());
    let digest = hasher.finalize();
    // an address is the trailing 20 bytes, like an EVM address derivation
    format!("0x{}", hex::encode(&digest[digest.len() - 20..]))
}
