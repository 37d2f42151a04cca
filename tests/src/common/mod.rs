use std::{sync::Once, time::Duration};

use harness_core::{
    WaitOptions, adjust_timeout,
    eth::{EthClient, TxReceipt, TxRequest},
    wait_for_condition, wait_for_new_blocks,
};

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// One-time tracing setup for test binaries; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    });
}

/// Submit a node-signed transaction and block until its receipt is available.
pub async fn send_and_confirm(eth: &EthClient, tx: &TxRequest) -> TxReceipt {
    let hash = eth
        .send_transaction(tx)
        .await
        .expect("transaction submission failed");
    eth.wait_for_transaction_receipt(
        &hash,
        WaitOptions::default().with_timeout(adjust_timeout(CONFIRM_TIMEOUT)),
    )
    .await
    .expect("transaction was not included")
}

/// Block until the head advances by `delta` new blocks. Used when a
/// transaction must land in a block after the currently pending one.
pub async fn wait_for_new_heads(eth: &EthClient, delta: u64) -> u64 {
    let options = WaitOptions::new(
        Duration::from_millis(100),
        adjust_timeout(CONFIRM_TIMEOUT),
    );
    wait_for_new_blocks(
        || {
            let eth = eth.clone();
            async move { eth.block_number().await }
        },
        delta,
        options,
    )
    .await
    .expect("chain head did not advance")
}

/// Block until the chain has produced at least `height` blocks.
pub async fn wait_until_height(eth: &EthClient, height: u64) {
    let options = WaitOptions::new(
        Duration::from_millis(200),
        adjust_timeout(CONFIRM_TIMEOUT),
    );
    wait_for_condition(&format!("chain height >= {height}"), options, || {
        let eth = eth.clone();
        async move { Ok::<_, std::convert::Infallible>(matches!(eth.block_number().await, Ok(h) if h >= height)) }
    })
    .await
    .expect("chain did not reach requested height");
}
