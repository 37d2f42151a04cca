//! Account-state queries across every backend: nonce reads pinned to a
//! historical height must be immune to later transfers, and queries against
//! not-yet-produced heights must fail with the conventional error code.

use harness_core::{
    Backend, ClusterRegistry, ClusterSettings, ScopeId,
    accounts::derive_new_account,
    eth::{EthClient, TxRequest, to_quantity},
    nodes::evmd::EvmdOptions,
};
use tests::common::{init_tracing, send_and_confirm, wait_for_new_heads};

const MODULE: ScopeId = ScopeId::Module("account");
const TRANSFER_AMOUNT: u128 = 10_u128.pow(18);

/// Error code EVM nodes answer with when the requested height does not exist
/// yet.
const UNAVAILABLE_HEIGHT_CODE: i32 = -32000;

/// This module runs its chains with slow 5s blocks, so the pinned-height read
/// is comfortably historical by the time the transfer lands.
fn module_registry() -> ClusterRegistry {
    ClusterRegistry::with_settings(ClusterSettings {
        evmd: EvmdOptions {
            long_timeout_commit: true,
            ..EvmdOptions::default()
        },
        ..ClusterSettings::default()
    })
}

#[tokio::test]
#[ignore = "requires evmd and geth binaries"]
async fn transaction_count_pinned_to_a_height_is_stable() {
    init_tracing();
    let registry = module_registry();

    for backend in Backend::ALL {
        let cluster = registry
            .acquire(backend, MODULE)
            .await
            .unwrap_or_else(|e| panic!("provisioning {backend} failed: {e}"));
        transaction_count_body(
            backend,
            cluster.eth(),
            &cluster.prefunded_sender().await.unwrap(),
        )
        .await;
    }
}

async fn transaction_count_body(backend: Backend, eth: &EthClient, sender: &str) {
    let receiver = derive_new_account(1);

    // pin a height before the transfer so the later re-read targets history
    let pinned_height = eth.block_number().await.unwrap();
    let pinned_tag = to_quantity(u128::from(pinned_height));
    let nonce_before = eth
        .get_transaction_count(&receiver, &pinned_tag)
        .await
        .unwrap();

    // make sure the transfer lands strictly after the pinned height
    wait_for_new_heads(eth, 1).await;
    let receipt = send_and_confirm(eth, &TxRequest::transfer(sender, &receiver, TRANSFER_AMOUNT)).await;
    assert!(
        receipt.succeeded().unwrap(),
        "{backend}: transfer must be mined successfully"
    );
    assert!(
        receipt.block_number().unwrap() > pinned_height,
        "{backend}: transfer landed at or before the pinned height"
    );

    // the pinned read is unchanged, and the receiver never sent anything so
    // its latest nonce matches too
    let nonce_pinned = eth
        .get_transaction_count(&receiver, &pinned_tag)
        .await
        .unwrap();
    let nonce_latest = eth.get_transaction_count(&receiver, "latest").await.unwrap();
    assert_eq!(
        nonce_pinned, nonce_before,
        "{backend}: pinned-height nonce changed after the transfer"
    );
    assert_eq!(
        nonce_latest, nonce_before,
        "{backend}: latest nonce changed for an account that never sent"
    );
}

#[tokio::test]
#[ignore = "requires evmd and geth binaries"]
async fn queries_against_future_heights_are_rejected() {
    init_tracing();
    let registry = module_registry();

    for backend in Backend::ALL {
        let cluster = registry
            .acquire(backend, MODULE)
            .await
            .unwrap_or_else(|e| panic!("provisioning {backend} failed: {e}"));
        let eth = cluster.eth();

        let head = eth.block_number().await.unwrap();
        let future_tag = to_quantity(u128::from(head + 1_000));
        let err = eth
            .get_transaction_count(&derive_new_account(2), &future_tag)
            .await
            .expect_err("future heights must not be queryable");
        assert_eq!(
            err.code(),
            Some(UNAVAILABLE_HEIGHT_CODE),
            "{backend}: unexpected error for future height: {err}"
        );
    }
}
