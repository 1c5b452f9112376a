use std::sync::Arc;
use std::time::Duration;

use lobbyforge::prelude::*;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

const WAGER: &str = "0.05";

async fn fund(wallet: &InMemoryWallet, owner: &str, amount: &str) -> Result<(), Box<dyn std::error::Error>> {
    let account = wallet.custodial_account(&WalletAddress::new(owner)).await?;
    wallet.deposit(&account.address, amount.parse()?).await;
    Ok(())
}

async fn balance(wallet: &InMemoryWallet, owner: &str) -> Result<Amount, Box<dyn std::error::Error>> {
    let account = wallet.custodial_account(&WalletAddress::new(owner)).await?;
    Ok(wallet.balance(&account.address).await)
}

// ---------------------------------------------------------------------------
// Demo
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lobbyforge::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::from_json_file(path).await?,
        None => {
            let mut config = ServiceConfig::default();
            config.lobby.countdown_secs = 3;
            config
        }
    };

    let store = Arc::new(InMemoryStore::new());
    let wallet = Arc::new(InMemoryWallet::new());
    let service = LobbyService::new(store, Arc::clone(&wallet), config)?;
    service.start().await;

    fund(&wallet, "alice", "1").await?;
    fund(&wallet, "bob", "1").await?;

    // Print every event as one JSON line.
    let mut events = service.subscribe();
    let (started_tx, mut started_rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("event {line}");
            }
            if let LobbyEvent::GameStarted { lobby_id } = event {
                let _ = started_tx.send(lobby_id).await;
            }
        }
    });

    let wager: Amount = WAGER.parse()?;
    let lobbies = service.list_lobbies(Some(wager), Some(GameType::Duel)).await?;
    let lobby_id = lobbies
        .first()
        .map(|l| l.lobby_id.clone())
        .ok_or("no open duel lobby")?;
    tracing::info!(%lobby_id, %wager, "joining permanent duel");

    service.join_lobby(&lobby_id, WalletAddress::new("alice")).await?;
    service.join_lobby(&lobby_id, WalletAddress::new("bob")).await?;

    let started = tokio::time::timeout(Duration::from_secs(30), started_rx.recv())
        .await?
        .ok_or("event stream closed")?;
    tracing::info!(lobby_id = %started, "game running");

    let summary = service
        .submit_results(
            &lobby_id,
            vec![
                PlayerResult {
                    wallet: WalletAddress::new("alice"),
                    team: None,
                    score: 3,
                },
                PlayerResult {
                    wallet: WalletAddress::new("bob"),
                    team: None,
                    score: 1,
                },
            ],
        )
        .await?;
    println!("settlement {}", serde_json::to_string_pretty(&summary)?);

    println!("alice {}", balance(&wallet, "alice").await?);
    println!("bob   {}", balance(&wallet, "bob").await?);

    let refilled = service.list_lobbies(Some(wager), Some(GameType::Duel)).await?;
    tracing::info!(open = refilled.len(), "duel slot after settlement");

    service.shutdown().await;
    Ok(())
}
