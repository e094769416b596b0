//! Connection pool behaviour under concurrent scrapes

use std::sync::Arc;
use std::time::Duration;

use tikmon_device::transport::mock::{MockConfig, MockConnector};
use tikmon_device::{ConnectionKey, ConnectionPool, PoolConfig};

fn slow_connector() -> Arc<MockConnector> {
    Arc::new(MockConnector::new(MockConfig {
        open_latency_ms: 50,
        ..Default::default()
    }))
}

// =============================================================================
// Same key
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_opens_one_session() {
    let connector = slow_connector();
    let pool = Arc::new(ConnectionPool::new(connector.clone(), PoolConfig::default()));
    let key = ConnectionKey::new("10.0.0.1", "admin", "secret");

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            tokio::spawn(async move { pool.get_connection(&key).await })
        })
        .collect();

    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap().unwrap());
    }

    assert_eq!(connector.opened(), 1);
    assert!(Arc::ptr_eq(&connections[0], &connections[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_gets_share_session() {
    let connector = slow_connector();
    let pool = Arc::new(ConnectionPool::new(connector.clone(), PoolConfig::default()));
    let key = ConnectionKey::new("10.0.0.1", "admin", "secret");

    let results = spawn_gets(&pool, &key, 16).await;
    assert_eq!(results, 16);
    assert_eq!(connector.opened(), 1);
}

async fn spawn_gets(pool: &Arc<ConnectionPool>, key: &ConnectionKey, n: usize) -> usize {
    let mut set = tokio::task::JoinSet::new();
    for _ in 0..n {
        let pool = Arc::clone(pool);
        let key = key.clone();
        set.spawn(async move { pool.get_connection(&key).await.is_ok() });
    }
    let mut ok = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap() {
            ok += 1;
        }
    }
    ok
}

// =============================================================================
// Different keys
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_keys_do_not_serialize() {
    let connector = slow_connector();
    let pool = Arc::new(ConnectionPool::new(connector.clone(), PoolConfig::default()));

    let started = tokio::time::Instant::now();
    let a = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.get_connection(&ConnectionKey::new("a", "u", "p"))
                .await
                .is_ok()
        })
    };
    let b = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.get_connection(&ConnectionKey::new("b", "u", "p"))
                .await
                .is_ok()
        })
    };
    assert!(a.await.unwrap());
    assert!(b.await.unwrap());

    assert_eq!(connector.opened(), 2);
    // two 50ms opens in parallel, well below the serialized 100ms
    assert!(started.elapsed() < Duration::from_millis(95));
}

// =============================================================================
// Background sweep
// =============================================================================

#[tokio::test]
async fn test_cleanup_task_evicts_and_stops_on_drop() {
    let connector = Arc::new(MockConnector::new(MockConfig::default()));
    let pool = Arc::new(ConnectionPool::new(
        connector.clone(),
        PoolConfig {
            use_timeout: Duration::from_millis(10),
            cleanup_interval: Duration::from_millis(10),
            ..Default::default()
        },
    ));
    pool.get_connection(&ConnectionKey::new("a", "u", "p"))
        .await
        .unwrap();

    let task = pool.spawn_cleanup();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(pool.is_empty());

    drop(task);
    pool.get_connection(&ConnectionKey::new("a", "u", "p"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.len(), 1);
}
