use std::time::Duration;

use raft_userstore::bootstrap;
use raft_userstore::consensus::Consensus;
use raft_userstore::error::StoreError;
use raft_userstore::store::StoreInfo;

use crate::fixtures::node_config;
use crate::fixtures::wait_for_leader;
use crate::fixtures::wait_for_metrics;

/// A one node cluster accepts writes once it has elected itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node_set_get() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39201")?;

    let app = bootstrap::start(&config).await?;
    wait_for_leader(&app).await?;

    assert_eq!(StoreInfo { leader: true }, app.store.info());

    app.store.set("bob", "pw1").await?;
    assert_eq!("pw1", app.store.get("bob").await?);
    assert!(matches!(app.store.get("alice").await, Err(StoreError::NotFound)));

    app.shutdown().await?;
    Ok(())
}

/// Bootstrapping an initialized node fails without disturbing it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_twice() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39202")?;

    let app = bootstrap::start(&config).await?;
    wait_for_leader(&app).await?;

    bootstrap::bootstrap_cluster(&app, &config).await;
    let members = bootstrap::initial_members(&config.raft_addr, &config.bootstrap_servers);
    assert!(app.raft.bootstrap_cluster(members).await.is_err());

    app.store.set("bob", "pw1").await?;
    assert_eq!("pw1", app.store.get("bob").await?);

    app.shutdown().await?;
    Ok(())
}

/// A node that never joined a cluster is not a leader and rejects writes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uninitialized_node_rejects_writes() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39203")?;

    let app = bootstrap::open(&config).await?;

    assert_eq!(StoreInfo { leader: false }, app.store.info());
    let res = app.store.set("bob", "pw1").await;
    assert!(matches!(res, Err(StoreError::NotLeader { .. })));
    assert!(matches!(app.store.get("bob").await, Err(StoreError::NotFound)));

    app.shutdown().await?;
    Ok(())
}

/// Users written before a restart are recovered from the snapshot and the
/// log that follows it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_recovers_users() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39204")?;

    {
        let app = bootstrap::start(&config).await?;
        wait_for_leader(&app).await?;

        app.store.set("bob", "pw1").await?;

        app.trigger_snapshot().await?;
        wait_for_metrics(&app, "snapshot built", |m| m.snapshot.is_some()).await?;

        app.store.set("carol", "pw2").await?;
        app.shutdown().await?;
    }

    // Let the storage handles of the stopped node drop.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(std::fs::read_dir(config.snapshot_dir())?.count() >= 1);

    let app = bootstrap::start(&config).await?;
    wait_for_leader(&app).await?;

    // The entry for carol is applied again once the leader commits its first entry.
    wait_for_metrics(&app, "replay log", |m| {
        m.last_applied.map(|l| l.index).unwrap_or_default() >= 3
    })
    .await?;

    assert_eq!("pw1", app.store.get("bob").await?);
    assert_eq!("pw2", app.store.get("carol").await?);

    app.shutdown().await?;
    Ok(())
}
