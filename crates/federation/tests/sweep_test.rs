//! Integration tests for the sweep scheduler

use async_trait::async_trait;
use federation::{
    AddressResolver, ChatClient, ClientError, GroupAttribute, HealthProbe, ResolutionError,
    Retention, StatusTree, SweepConfig, SweepScheduler, TreeNode,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Chat client answering from mutable tables
#[derive(Default)]
struct FakeClient {
    groups: Mutex<Vec<String>>,
    members: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    detail_reads: AtomicUsize,
}

impl FakeClient {
    fn set_groups(&self, groups: &[&str]) {
        *self.groups.lock().unwrap() = groups.iter().map(|g| g.to_string()).collect();
    }

    fn set_members(&self, group: &str, members: &[&str]) {
        self.members.lock().unwrap().insert(
            group.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    fn fail_membership(&self, group: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(group.to_string());
        } else {
            failing.remove(group);
        }
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn list_joined_groups(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn list_members(&self, group: &str) -> Result<Vec<String>, ClientError> {
        // Give sibling groups a chance to interleave
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.failing.lock().unwrap().contains(group) {
            return Err(ClientError::Api {
                status: 403,
                message: "M_FORBIDDEN: not in room".to_string(),
            });
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(group)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_group_attribute(
        &self,
        group: &str,
        attribute: GroupAttribute,
    ) -> Result<Option<String>, ClientError> {
        self.detail_reads.fetch_add(1, Ordering::SeqCst);
        Ok(match attribute {
            GroupAttribute::Title => Some(format!("Room {}", &group[1..2])),
            GroupAttribute::CanonicalAlias => None,
            GroupAttribute::Avatar => None,
        })
    }

    fn media_url(&self, reference: &str) -> Option<String> {
        Some(reference.to_string())
    }
}

/// Every domain resolves; reachability is switchable per address
#[derive(Default)]
struct FakeNetwork {
    down: Mutex<HashSet<String>>,
    unresolvable: Mutex<HashSet<String>>,
}

#[async_trait]
impl AddressResolver for FakeNetwork {
    async fn resolve(&self, domain: &str) -> Result<String, ResolutionError> {
        if self.unresolvable.lock().unwrap().contains(domain) {
            return Err(ResolutionError::new(domain));
        }
        Ok(format!("{}:8448", domain))
    }
}

#[async_trait]
impl HealthProbe for FakeNetwork {
    async fn probe(&self, address: &str) -> bool {
        !self.down.lock().unwrap().contains(address)
    }
}

fn build(
    client: Arc<FakeClient>,
    network: Arc<FakeNetwork>,
    retention: Retention,
) -> (SweepScheduler, Arc<StatusTree>) {
    let tree = Arc::new(StatusTree::new());
    let config = SweepConfig {
        interval: Duration::from_millis(10),
        max_concurrent_checks: 4,
        control_group: Some("!log:x".to_string()),
        retention,
    };
    let scheduler = SweepScheduler::new(
        client,
        network.clone(),
        network,
        tree.clone(),
        config,
        None,
    );
    (scheduler, tree)
}

fn find<'a>(node: &'a TreeNode, name: &str) -> &'a TreeNode {
    node.children
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no node named {}", name))
}

#[tokio::test]
async fn test_membership_failure_is_isolated() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x", "!b:x", "!c:x", "!log:x"]);
    client.set_members("!a:x", &["@u:a1.example", "@v:a2.example"]);
    client.set_members("!b:x", &["@u:b1.example"]);
    client.set_members("!c:x", &["@u:c1.example", "@v:c1.example"]);
    let (scheduler, tree) = build(client.clone(), network.clone(), Retention::Retain);

    // First cycle: everything succeeds
    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.groups_checked, 3);
    assert_eq!(report.groups_skipped, 1);
    let before = tree.snapshot().await;
    let group_a = find(&before, "Room a - #!a:x").clone();

    // Second cycle: group A's membership fetch fails, B and C change
    client.fail_membership("!a:x", true);
    network.down.lock().unwrap().insert("a1.example:8448".to_string());
    network.down.lock().unwrap().insert("b1.example:8448".to_string());
    client.set_members("!c:x", &["@u:c1.example"]);

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.groups_checked, 2);
    assert_eq!(report.groups_failed, 1);

    let after = tree.snapshot().await;
    assert_eq!(find(&after, "Room a - #!a:x"), &group_a);

    let b = find(&after, "Room b - #!b:x");
    assert_eq!(find(b, "b1.example").status.as_deref(), Some("Failed (Unreachable)"));

    let c = find(&after, "Room c - #!c:x");
    assert_eq!(find(c, "c1.example").status.as_deref(), Some("OK"));
    assert_eq!(find(c, "c1.example").user_count, Some(1));
}

#[tokio::test]
async fn test_unresolvable_server_status() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x"]);
    client.set_members("!a:x", &["@u:gone.example"]);
    network
        .unresolvable
        .lock()
        .unwrap()
        .insert("gone.example".to_string());
    let (scheduler, tree) = build(client, network, Retention::Retain);

    scheduler.run_cycle().await.unwrap();

    let snapshot = tree.snapshot().await;
    let status = find(&snapshot.children[0], "gone.example").status.clone().unwrap();
    assert!(status.starts_with("Failed (Delegation Failed: "));
    assert!(status.contains("gone.example"));
}

#[tokio::test]
async fn test_retain_keeps_absent_nodes() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x", "!b:x"]);
    client.set_members("!a:x", &["@u:a1.example", "@v:a2.example"]);
    client.set_members("!b:x", &["@u:b1.example"]);
    let (scheduler, tree) = build(client.clone(), network, Retention::Retain);
    scheduler.run_cycle().await.unwrap();

    client.set_groups(&["!a:x"]);
    client.set_members("!a:x", &["@u:a1.example"]);
    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.nodes_pruned, 0);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.server_count().await, 3);
}

#[tokio::test]
async fn test_prune_absent_removes_nodes() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x", "!b:x"]);
    client.set_members("!a:x", &["@u:a1.example", "@v:a2.example"]);
    client.set_members("!b:x", &["@u:b1.example"]);
    let (scheduler, tree) = build(client.clone(), network, Retention::PruneAbsent);
    scheduler.run_cycle().await.unwrap();

    client.set_groups(&["!a:x"]);
    client.set_members("!a:x", &["@u:a1.example"]);
    let report = scheduler.run_cycle().await.unwrap();

    // a2.example and group b
    assert_eq!(report.nodes_pruned, 2);
    let snapshot = tree.snapshot().await;
    assert_eq!(snapshot.children.len(), 1);
    let names: Vec<_> = snapshot.children[0]
        .children
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, vec!["a1.example"]);
}

#[tokio::test]
async fn test_group_details_read_once() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x", "!b:x"]);
    client.set_members("!a:x", &["@u:a1.example"]);
    client.set_members("!b:x", &["@u:b1.example"]);
    let (scheduler, _tree) = build(client.clone(), network, Retention::Retain);

    for _ in 0..3 {
        scheduler.run_cycle().await.unwrap();
    }

    // Three attributes per group, fetched on creation only
    assert_eq!(client.detail_reads.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_run_loop_repeats_cycles() {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    client.set_groups(&["!a:x"]);
    client.set_members("!a:x", &["@u:a1.example"]);
    let (scheduler, tree) = build(client.clone(), network.clone(), Retention::Retain);

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    let first = tree.snapshot().await;
    assert_eq!(find(&first.children[0], "a1.example").status.as_deref(), Some("OK"));

    network.down.lock().unwrap().insert("a1.example:8448".to_string());
    tokio::time::sleep(Duration::from_millis(200)).await;
    let later = tree.snapshot().await;
    assert_eq!(
        find(&later.children[0], "a1.example").status.as_deref(),
        Some("Failed (Unreachable)")
    );

    handle.abort();
}

/// Resolver recording how many resolutions run at once
#[derive(Default)]
struct CountingNetwork {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl AddressResolver for CountingNetwork {
    async fn resolve(&self, domain: &str) -> Result<String, ResolutionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("{}:8448", domain))
    }
}

#[async_trait]
impl HealthProbe for CountingNetwork {
    async fn probe(&self, _address: &str) -> bool {
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_permit_bounds_checks_without_deadlock() {
    let client = Arc::new(FakeClient::default());
    let groups: Vec<String> = (0..5).map(|g| format!("!g{}:x", g)).collect();
    let group_refs: Vec<&str> = groups.iter().map(String::as_str).collect();
    client.set_groups(&group_refs);
    for group in &groups {
        let members: Vec<String> = (0..5).map(|s| format!("@u:s{}.example", s)).collect();
        let member_refs: Vec<&str> = members.iter().map(String::as_str).collect();
        client.set_members(group, &member_refs);
    }

    let network = Arc::new(CountingNetwork::default());
    let tree = Arc::new(StatusTree::new());
    let config = SweepConfig {
        interval: Duration::from_secs(60),
        max_concurrent_checks: 1,
        control_group: None,
        retention: Retention::Retain,
    };
    let scheduler = SweepScheduler::new(
        client,
        network.clone(),
        network.clone(),
        tree.clone(),
        config,
        None,
    );

    let report = tokio::time::timeout(Duration::from_secs(10), scheduler.run_cycle())
        .await
        .expect("cycle finished")
        .unwrap();

    assert_eq!(report.groups_checked, 5);
    assert_eq!(report.servers_checked, 25);
    assert_eq!(report.servers_ok, 25);
    assert_eq!(network.peak.load(Ordering::SeqCst), 1);
}

/// Resolver that blocks until the test hands out permits
struct GatedNetwork {
    gate: Semaphore,
}

#[async_trait]
impl AddressResolver for GatedNetwork {
    async fn resolve(&self, domain: &str) -> Result<String, ResolutionError> {
        let _permit = self.gate.acquire().await.unwrap();
        Ok(format!("{}:8448", domain))
    }
}

#[async_trait]
impl HealthProbe for GatedNetwork {
    async fn probe(&self, _address: &str) -> bool {
        true
    }
}

#[tokio::test]
async fn test_unchecked_server_reports_member_count() {
    let client = Arc::new(FakeClient::default());
    client.set_groups(&["!a:x"]);
    client.set_members("!a:x", &["@u:a1.example", "@v:a1.example"]);

    let network = Arc::new(GatedNetwork {
        gate: Semaphore::new(0),
    });
    let tree = Arc::new(StatusTree::new());
    let scheduler = Arc::new(SweepScheduler::new(
        client,
        network.clone(),
        network.clone(),
        tree.clone(),
        SweepConfig::default(),
        None,
    ));

    let cycle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_cycle().await })
    };

    let pending = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = tree.snapshot().await;
            if let Some(server) = snapshot
                .children
                .first()
                .and_then(|group| group.children.first())
            {
                if server.user_count == Some(2) {
                    return server.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server node written");
    assert_eq!(pending.status.as_deref(), Some("unknown"));

    network.gate.add_permits(1);
    let report = cycle.await.unwrap().unwrap();
    assert_eq!(report.servers_ok, 1);

    let done = tree.snapshot().await;
    let server = find(&done.children[0], "a1.example");
    assert_eq!(server.status.as_deref(), Some("OK"));
    assert_eq!(server.user_count, Some(2));
}
