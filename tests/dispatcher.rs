//! Job files and config files driving a dispatched group

use nodesync::common::Config;
use nodesync::node::{NodeClient, RetryPolicy};
use nodesync::{GroupDispatcher, JobDefinition};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_dispatch_from_files() {
    let dir = TempDir::new().unwrap();

    let job_path = dir.path().join("job.json");
    std::fs::write(
        &job_path,
        r#"{"target_group": "job-7", "port": 0, "nodes": [{"role": "server", "count": 1}, {"role": "client", "count": 2}]}"#,
    )
    .unwrap();

    let config_path = dir.path().join("coordinator.toml");
    std::fs::write(&config_path, "bind_host = \"127.0.0.1\"\npoll_delay_secs = 1\n").unwrap();

    let job = JobDefinition::from_file(&job_path).unwrap();
    let config = Config::load_from(&config_path).unwrap();
    let handle = GroupDispatcher::new(job, config).start().await.unwrap();
    let addr = handle.local_addr().to_string();

    let policy = RetryPolicy::fixed(Duration::from_millis(20)).with_deadline(Duration::from_secs(10));
    let nodes = [("srv", "server"), ("c1", "client"), ("c2", "client")];
    let joins: Vec<_> = nodes
        .iter()
        .map(|(name, role)| {
            let client = NodeClient::new("job-7", *name, *role, addr.clone(), policy.clone());
            tokio::spawn(async move { client.join().await })
        })
        .collect();

    for join in joins {
        let rendezvous = join.await.unwrap().unwrap();
        assert_eq!(rendezvous.snapshot.count, 3);
        assert_eq!(
            rendezvous.snapshot.client_names().collect::<Vec<_>>(),
            vec!["c1", "c2", "srv"]
        );
    }

    let status = handle.group().status();
    assert!(status.complete);
    assert_eq!(status.roles.get("client").map(Vec::len), Some(2));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_role_over_capacity_is_refused() {
    let job = JobDefinition::from_json(
        r#"{"target_group": "g1", "port": 0, "nodes": ["server", "client"]}"#,
    )
    .unwrap();
    let config = Config {
        bind_host: "127.0.0.1".into(),
        ..Config::default()
    };
    let handle = GroupDispatcher::new(job, config).start().await.unwrap();
    let addr = handle.local_addr().to_string();

    let policy = RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(3);
    let s1 = NodeClient::new("g1", "s1", "server", addr.clone(), policy.clone());
    let s2 = NodeClient::new("g1", "s2", "server", addr.clone(), policy);

    assert!(s1.join().await.is_err());
    // second server is refused and the group stays at one member
    assert!(s2.join().await.is_err());
    assert_eq!(handle.group().joined(), 1);
    assert!(handle.stats().snapshot().protocol_errors >= 3);

    handle.stop().await.unwrap();
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.coordinator_addr(), "localhost:3079");
}

#[test]
fn test_malformed_job_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(JobDefinition::from_file(&path).is_err());
    assert!(JobDefinition::from_file(&dir.path().join("missing.json")).is_err());
}
