//! `eth_feeHistory` semantics: pinned and symbolic tags must agree, the
//! returned window holds one base fee per block plus the next base fee, and
//! the window is clamped at the genesis boundary.

use futures::future::try_join_all;
use harness_core::{
    Backend, ClusterRegistry, ScopeId,
    accounts::derive_new_account,
    eth::{EthClient, TxRequest, parse_quantity, to_quantity},
};
use tests::common::{init_tracing, send_and_confirm, wait_until_height};

const MODULE: ScopeId = ScopeId::Module("fee-history");

/// The websocket variant shares its chain with `evmd`, so the fee curve
/// coverage runs once per distinct chain instance.
const BACKENDS: [Backend; 3] = [Backend::Evmd, Backend::EvmdRocksdb, Backend::Geth];

const WINDOW: u64 = 4;
/// base fee per block in the window, plus the next block's base fee
const FULL_LEN: usize = 5;
/// at genesis there is one base fee plus the next one
const GENESIS_LEN: usize = 2;
const PERCENTILES: [f64; 1] = [100.0];

#[tokio::test]
#[ignore = "requires evmd and geth binaries"]
async fn fee_history_window_and_clamping() {
    init_tracing();
    let registry = ClusterRegistry::new();

    for backend in BACKENDS {
        let cluster = registry
            .acquire(backend, MODULE)
            .await
            .unwrap_or_else(|e| panic!("provisioning {backend} failed: {e}"));
        let eth = cluster.eth();
        let sender = cluster.prefunded_sender().await.unwrap();

        // a priced transfer gives the fee market something to report
        let gas_price = eth.gas_price().await.unwrap();
        let tx = TxRequest::transfer(&sender, &derive_new_account(3), 10).with_gas_price(gas_price);
        send_and_confirm(eth, &tx).await;

        // the window assertions below address heights 1..=5 directly
        wait_until_height(eth, 6).await;
        let head = eth.block_number().await.unwrap();

        let head_tag = to_quantity(u128::from(head));
        assert_identical_windows(backend, eth, ["latest", &head_tag], FULL_LEN).await;
        assert_identical_windows(backend, eth, ["earliest", "0x0"], GENESIS_LEN).await;

        sliding_window_body(backend, eth).await;
    }
}

/// The two tags name the same block, so concurrent queries must return the
/// same base fee array of the expected length.
async fn assert_identical_windows(
    backend: Backend,
    eth: &EthClient,
    tags: [&str; 2],
    expected_len: usize,
) {
    let histories = try_join_all(tags.map(|tag| {
        let eth = eth.clone();
        let tag = tag.to_owned();
        async move { eth.fee_history(WINDOW, &tag, &PERCENTILES).await }
    }))
    .await
    .unwrap_or_else(|e| panic!("{backend}: fee history query for {tags:?} failed: {e}"));

    assert_eq!(
        histories[0].base_fee_per_gas, histories[1].base_fee_per_gas,
        "{backend}: {tags:?} disagree on the base fee window"
    );
    assert_eq!(
        histories[0].base_fee_per_gas.len(),
        expected_len,
        "{backend}: wrong window length for {tags:?}"
    );
}

/// Walk the newest-block pin from height 1 upward. Until the window fits
/// entirely above genesis the result is truncated and pinned to oldest block
/// 0; afterwards the window slides.
async fn sliding_window_body(backend: Backend, eth: &EthClient) {
    for pinned in 1..=5_u64 {
        let history = eth
            .fee_history(WINDOW, &to_quantity(u128::from(pinned)), &PERCENTILES)
            .await
            .unwrap();

        let expected_len = if pinned <= 2 {
            GENESIS_LEN + usize::try_from(pinned).unwrap()
        } else {
            FULL_LEN
        };
        assert_eq!(
            history.base_fee_per_gas.len(),
            expected_len,
            "{backend}: window length mismatch at pinned height {pinned}"
        );

        let expected_oldest = pinned.saturating_sub(WINDOW - 1);
        assert_eq!(
            parse_quantity(&history.oldest_block).unwrap(),
            u128::from(expected_oldest),
            "{backend}: oldest block mismatch at pinned height {pinned}"
        );
    }
}
