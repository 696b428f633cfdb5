//! Shared group/server status tree.
//!
//! The tree is written by many sweep tasks and read by the HTTP layer at the
//! same time:
//! - groups sit in a `DashMap` of `OnceCell` slots, so the first caller for
//!   a group id runs the detail fetch and every concurrent caller awaits the
//!   same result;
//! - each group's server list is behind its own `RwLock`, and lookup plus
//!   append happen under one write guard;
//! - a server's status and member count share one lock and are replaced
//!   together.

use crate::snapshot::{self, TreeNode};
use crate::types::{GroupDetails, GroupId, ServerState, ServerStatus};
use dashmap::DashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// A federation server observed among a group's members
#[derive(Debug)]
pub struct ServerNode {
    domain: String,
    state: RwLock<ServerState>,
}

impl ServerNode {
    fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            state: RwLock::new(ServerState::default()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Copy of the current status and member count
    pub async fn state(&self) -> ServerState {
        self.state.read().await.clone()
    }

    /// Replace status and member count in one write
    pub async fn update(&self, status: ServerStatus, user_count: usize) {
        let mut state = self.state.write().await;
        *state = ServerState { status, user_count };
    }

    /// Set the member count of a node that has not been checked yet.
    ///
    /// Checked nodes keep the count that was written with their status.
    pub async fn set_unchecked_count(&self, user_count: usize) {
        let mut state = self.state.write().await;
        if state.status == ServerStatus::Unknown {
            state.user_count = user_count;
        }
    }
}

/// A joined group and the servers seen in it
#[derive(Debug)]
pub struct GroupNode {
    id: GroupId,
    name: String,
    avatar: Option<String>,
    seq: u64,
    servers: RwLock<Vec<Arc<ServerNode>>>,
}

impl GroupNode {
    fn new(id: &str, details: GroupDetails, seq: u64) -> Self {
        Self {
            id: id.to_string(),
            name: details.name,
            avatar: details.avatar,
            seq,
            servers: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    /// Servers in first-seen order
    pub async fn servers(&self) -> Vec<Arc<ServerNode>> {
        self.servers.read().await.clone()
    }

    /// Existing server for `domain`, or a new one in state "unknown"
    pub async fn get_or_create_server(&self, domain: &str) -> Arc<ServerNode> {
        let mut servers = self.servers.write().await;
        if let Some(existing) = servers.iter().find(|s| s.domain == domain) {
            return existing.clone();
        }

        debug!(group = %self.id, domain, "Adding server node");
        let node = Arc::new(ServerNode::new(domain));
        servers.push(node.clone());
        node
    }

    /// Drop servers whose domain is not in `keep`, returning how many were removed
    pub async fn retain_servers(&self, keep: &HashSet<String>) -> usize {
        let mut servers = self.servers.write().await;
        let before = servers.len();
        servers.retain(|s| keep.contains(&s.domain));
        before - servers.len()
    }
}

/// Concurrent store of all group and server nodes
#[derive(Debug, Default)]
pub struct StatusTree {
    groups: DashMap<GroupId, Arc<OnceCell<Arc<GroupNode>>>>,
    next_seq: AtomicU64,
}

impl StatusTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing node for `id`, or a new one built from `fetch_details`.
    ///
    /// Concurrent first-touch calls for the same id run `fetch_details` once
    /// and all receive the same node.
    pub async fn get_or_create_group<F, Fut>(&self, id: &str, fetch_details: F) -> Arc<GroupNode>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GroupDetails>,
    {
        // Clone the slot out so no map guard is held across the await
        let slot = self.groups.entry(id.to_string()).or_default().clone();

        slot.get_or_init(|| async move {
            let details = fetch_details().await;
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            info!(group = id, name = %details.name, "Adding group node");
            Arc::new(GroupNode::new(id, details, seq))
        })
        .await
        .clone()
    }

    /// Existing group node, if created
    pub fn group(&self, id: &str) -> Option<Arc<GroupNode>> {
        self.groups.get(id).and_then(|slot| slot.get().cloned())
    }

    /// All created groups in creation order
    pub fn groups(&self) -> Vec<Arc<GroupNode>> {
        let mut groups: Vec<_> = self
            .groups
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();
        groups.sort_by_key(|g| g.seq);
        groups
    }

    /// Number of created groups
    pub fn len(&self) -> usize {
        self.groups.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of server nodes across all groups
    pub async fn server_count(&self) -> usize {
        let mut count = 0;
        for group in self.groups() {
            count += group.servers.read().await.len();
        }
        count
    }

    pub async fn get_or_create_server(&self, group: &GroupNode, domain: &str) -> Arc<ServerNode> {
        group.get_or_create_server(domain).await
    }

    pub async fn update_status(&self, server: &ServerNode, status: ServerStatus, user_count: usize) {
        server.update(status, user_count).await;
    }

    /// Drop groups whose id is not in `keep`, returning how many were removed
    pub fn retain_groups(&self, keep: &HashSet<GroupId>) -> usize {
        let before = self.groups.len();
        self.groups.retain(|id, _| {
            if keep.contains(id) {
                true
            } else {
                info!(group = %id, "Removing group node");
                false
            }
        });
        before - self.groups.len()
    }

    /// Deep copy for export
    pub async fn snapshot(&self) -> TreeNode {
        snapshot::export(self).await
    }
}
