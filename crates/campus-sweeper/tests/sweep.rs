use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;

use campus_db::Database;
use campus_sweeper::Sweeper;
use campus_tokens::{TokenAction, TokenError, TokenRegistry};

fn setup() -> (Arc<Database>, TokenRegistry) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (db.clone(), TokenRegistry::new(db))
}

#[test]
fn sweep_removes_exhausted_and_expired_tokens() {
    let (db, registry) = setup();

    // Fully used, but never deleted by a failing redeem.
    let exhausted = registry
        .issue(TokenAction::VerifyEmail, 1, None, Some(1))
        .unwrap();
    registry.redeem(&exhausted.url).unwrap();

    let expired = registry
        .issue(
            TokenAction::JoinChat,
            2,
            Some(Utc::now() - ChronoDuration::hours(2)),
            None,
        )
        .unwrap();
    let live = registry
        .issue(
            TokenAction::JoinGroup,
            3,
            Some(Utc::now() + ChronoDuration::hours(2)),
            None,
        )
        .unwrap();
    let unlimited = registry.issue(TokenAction::JoinChat, 4, None, None).unwrap();
    let partly_used = registry
        .issue(TokenAction::JoinChat, 5, None, Some(3))
        .unwrap();
    registry.redeem(&partly_used.url).unwrap();

    let report = Sweeper::new(db, Duration::from_secs(3600)).sweep().unwrap();
    assert_eq!(report.tokens, 2);
    assert_eq!(report.accounts, 0);

    assert!(matches!(
        registry.get(&exhausted.url),
        Err(TokenError::NotFound)
    ));
    assert!(matches!(
        registry.get(&expired.url),
        Err(TokenError::NotFound)
    ));
    assert!(registry.get(&live.url).is_ok());
    assert!(registry.get(&unlimited.url).is_ok());
    assert!(registry.get(&partly_used.url).is_ok());
}

#[test]
fn sweep_removes_stale_unconfirmed_accounts() {
    let (db, _registry) = setup();
    db.create_account(1, "old@example.com").unwrap();
    db.create_account(2, "fresh@example.com").unwrap();
    db.create_account(3, "veteran@example.com").unwrap();
    db.mark_account_confirmed(3).unwrap();

    // Accounts 1 and 3 predate the grace window; only 1 is unconfirmed.
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE accounts SET date_created = datetime('now', '-2 hours') WHERE id IN (1, 3)",
            [],
        )?;
        Ok(())
    })
    .unwrap();

    let report = Sweeper::new(db.clone(), Duration::from_secs(3600))
        .sweep()
        .unwrap();
    assert_eq!(report.accounts, 1);

    assert!(db.get_account(1).unwrap().is_none());
    assert!(db.get_account(2).unwrap().is_some());
    assert!(db.get_account(3).unwrap().is_some());
}

#[test]
fn grace_window_is_configurable() {
    let (db, _registry) = setup();
    db.create_account(1, "slow@example.com").unwrap();
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE accounts SET date_created = datetime('now', '-2 minutes') WHERE id = 1",
            [],
        )?;
        Ok(())
    })
    .unwrap();

    let sweeper = Sweeper::new(db.clone(), Duration::from_secs(3600))
        .with_grace(ChronoDuration::minutes(1));
    assert_eq!(sweeper.sweep().unwrap().accounts, 1);
    assert!(db.get_account(1).unwrap().is_none());
}

#[tokio::test]
async fn sweeper_stops_on_shutdown_signal() {
    let (db, _registry) = setup();
    let sweeper = Sweeper::new(db, Duration::from_millis(10));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(sweeper.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}

#[tokio::test]
async fn sweep_error_does_not_kill_the_loop() {
    let (db, _registry) = setup();
    db.with_conn(|conn| {
        conn.execute("DROP TABLE links", [])?;
        Ok(())
    })
    .unwrap();

    let sweeper = Sweeper::new(db, Duration::from_millis(10));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(sweeper.run(shutdown_rx));

    // Several ticks fail against the dropped table; the loop survives.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}
