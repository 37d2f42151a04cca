//! Hermetic coverage of the polling primitives against an in-memory ledger,
//! exercising the same shapes the chain suites use against live nodes.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use harness_core::{PollStatus, WaitError, WaitOptions, wait_for, wait_for_condition};

/// A balance that changes only when a "transfer" is applied to it.
#[derive(Clone, Default)]
struct Ledger {
    balance: Arc<AtomicU64>,
    polls: Arc<AtomicU64>,
}

impl Ledger {
    fn read(&self) -> u64 {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.balance.load(Ordering::SeqCst)
    }

    fn credit(&self, amount: u64) {
        self.balance.fetch_add(amount, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn waiting_for_a_balance_change_that_never_happens_times_out() {
    let ledger = Ledger::default();
    ledger.credit(1_000);
    let old_balance = ledger.read();

    let options = WaitOptions::new(Duration::from_millis(100), Duration::from_secs(1));
    let result = wait_for_condition("balance change", options, || {
        let ledger = ledger.clone();
        async move { Ok::<_, std::convert::Infallible>(ledger.read() != old_balance) }
    })
    .await;

    match result {
        Err(WaitError::Timeout {
            description,
            attempts,
            ..
        }) => {
            assert_eq!(description, "balance change");
            // one attempt up front plus one per elapsed interval
            assert_eq!(attempts, 11);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn balance_wait_observes_a_transfer_landing_mid_poll() {
    let ledger = Ledger::default();
    ledger.credit(5_000);
    let old_balance = ledger.read();
    let amount = 750;

    // the transfer "lands" while the waiter is on its third poll
    let crediting = ledger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        crediting.credit(amount);
    });

    let options = WaitOptions::new(Duration::from_millis(100), Duration::from_secs(5));
    let new_balance = wait_for("incoming transfer", options, || {
        let ledger = ledger.clone();
        async move {
            let balance = ledger.read();
            Ok::<_, std::convert::Infallible>(if balance == old_balance {
                PollStatus::Pending
            } else {
                PollStatus::Ready(balance)
            })
        }
    })
    .await
    .expect("transfer should be observed before the deadline");

    assert_eq!(new_balance, old_balance + amount);
    // polls: initial read + observing reads, never more than the budget allows
    assert!(ledger.polls.load(Ordering::SeqCst) <= 6);
}
