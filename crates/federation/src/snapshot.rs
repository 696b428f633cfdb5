//! Exportable copy of the status tree.

use crate::tree::StatusTree;
use serde::{Deserialize, Serialize};

/// Name of the synthetic root node
pub const ROOT_NAME: &str = "Root";

/// Status reported for the root and for every group
pub const GROUP_STATUS: &str = "ok";

/// One node of the exported tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// Deep-copy the tree: root, groups in creation order, servers in first-seen order.
pub async fn export(tree: &StatusTree) -> TreeNode {
    let mut children = Vec::new();

    for group in tree.groups() {
        let mut servers = Vec::new();
        for server in group.servers().await {
            let state = server.state().await;
            servers.push(TreeNode {
                name: server.domain().to_string(),
                avatar: None,
                status: Some(state.status.to_string()),
                user_count: Some(state.user_count),
                children: Vec::new(),
            });
        }

        children.push(TreeNode {
            name: group.name().to_string(),
            avatar: group.avatar().map(str::to_string),
            status: Some(GROUP_STATUS.to_string()),
            user_count: None,
            children: servers,
        });
    }

    TreeNode {
        name: ROOT_NAME.to_string(),
        avatar: None,
        status: Some(GROUP_STATUS.to_string()),
        user_count: None,
        children,
    }
}
