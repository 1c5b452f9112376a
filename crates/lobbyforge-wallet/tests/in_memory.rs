//! Behaviour of the in-memory gateway used by the rest of the workspace.

use std::time::Duration;

use lobbyforge_protocol::{Amount, WalletAddress};
use lobbyforge_wallet::{InMemoryWallet, WalletError, WalletGateway};

fn units(n: u64) -> Amount {
    Amount::from_base_units(n)
}

#[tokio::test]
async fn test_custodial_account_is_stable_per_owner() {
    let wallet = InMemoryWallet::new();
    let alice = WalletAddress::new("alice");
    let bob = WalletAddress::new("bob");

    let a1 = wallet.custodial_account(&alice).await.unwrap();
    let a2 = wallet.custodial_account(&alice).await.unwrap();
    let b = wallet.custodial_account(&bob).await.unwrap();

    assert_eq!(a1, a2);
    assert_ne!(a1.address, b.address);
    assert!(a1.address.as_str().starts_with("custody_"));
}

#[tokio::test]
async fn test_transfer_moves_funds_and_logs_receipt() {
    let wallet = InMemoryWallet::new();
    let from = wallet
        .custodial_account(&WalletAddress::new("alice"))
        .await
        .unwrap();
    let to = WalletAddress::new("bob");
    wallet.deposit(&from.address, units(10)).await;

    let receipt = wallet.transfer(&from, &to, units(4)).await.unwrap();
    assert!(receipt.id.starts_with("tx_"));
    assert_eq!(wallet.balance(&from.address).await, units(6));
    assert_eq!(wallet.balance(&to).await, units(4));

    let log = wallet.transfer_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].receipt, receipt);
}

#[tokio::test]
async fn test_transfer_checks_balance_at_transfer_time() {
    let wallet = InMemoryWallet::new();
    let from = wallet
        .custodial_account(&WalletAddress::new("alice"))
        .await
        .unwrap();
    wallet.deposit(&from.address, units(10)).await;
    wallet.withdraw(&from.address, units(8)).await;

    let err = wallet
        .transfer(&from, &WalletAddress::new("bob"), units(5))
        .await
        .unwrap_err();
    assert_eq!(err.reason, "insufficient funds");
    assert_eq!(wallet.balance(&from.address).await, units(2));
    assert_eq!(wallet.transfer_count().await, 0);
}

#[tokio::test]
async fn test_rejected_destination_fails() {
    let wallet = InMemoryWallet::new();
    let from = wallet
        .custodial_account(&WalletAddress::new("alice"))
        .await
        .unwrap();
    let bob = WalletAddress::new("bob");
    wallet.deposit(&from.address, units(10)).await;
    wallet.fail_transfers_to(&bob).await;

    assert!(wallet.transfer(&from, &bob, units(1)).await.is_err());
    assert_eq!(wallet.balance(&from.address).await, units(10));
}

#[tokio::test]
async fn test_offline_gateway_errors() {
    let wallet = InMemoryWallet::new();
    wallet.set_offline(true).await;

    let err = wallet
        .balance_of(&WalletAddress::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Unavailable(_)));
    assert!(
        wallet
            .custodial_account(&WalletAddress::new("x"))
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_latency_delays_transfer() {
    let wallet = InMemoryWallet::new();
    let from = wallet
        .custodial_account(&WalletAddress::new("alice"))
        .await
        .unwrap();
    wallet.deposit(&from.address, units(10)).await;
    wallet.set_latency(Duration::from_secs(5)).await;

    let start = tokio::time::Instant::now();
    wallet
        .transfer(&from, &WalletAddress::new("bob"), units(1))
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
}
