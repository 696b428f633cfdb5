//! Federation monitor types and structures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a joined group (a room id such as `!abc:example.org`).
pub type GroupId = String;

/// Port used when a federation address carries no explicit port.
pub const DEFAULT_FEDERATION_PORT: u16 = 8448;

/// Status recorded on a server node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerStatus {
    /// Not probed yet
    #[default]
    Unknown,
    /// Probe succeeded
    Ok,
    /// Address resolved but the probe failed
    Unreachable,
    /// No address could be discovered; carries the resolver error
    DelegationFailed(String),
}

impl ServerStatus {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ServerStatus::Unknown => "unknown",
            ServerStatus::Ok => "ok",
            ServerStatus::Unreachable => "unreachable",
            ServerStatus::DelegationFailed(_) => "delegation_failed",
        }
    }

    /// Check if the status is a successful probe
    pub fn is_ok(&self) -> bool {
        *self == ServerStatus::Ok
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Unknown => write!(f, "unknown"),
            ServerStatus::Ok => write!(f, "OK"),
            ServerStatus::Unreachable => write!(f, "Failed (Unreachable)"),
            ServerStatus::DelegationFailed(detail) => {
                write!(f, "Failed (Delegation Failed: {})", detail)
            }
        }
    }
}

/// Status and member count of a server, always written together
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerState {
    /// Last recorded status
    pub status: ServerStatus,

    /// Members from this server in the group as of the last sweep
    pub user_count: usize,
}

/// Display details of a group, fetched once when its node is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDetails {
    /// "title - alias"
    pub name: String,

    /// Avatar image URL
    pub avatar: Option<String>,
}

impl GroupDetails {
    /// Build details from raw group attributes, applying fallbacks.
    ///
    /// A missing title becomes `(unknown title)`, a missing alias becomes the
    /// group id, and the alias always carries a single leading `#`.
    pub fn from_attributes(
        group: &str,
        title: Option<String>,
        alias: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        let title = title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "(unknown title)".to_string());
        let alias = alias
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| group.to_string());
        let alias = if alias.starts_with('#') {
            alias
        } else {
            format!("#{}", alias)
        };

        Self {
            name: format!("{} - {}", title, alias),
            avatar: Some(avatar.unwrap_or_else(|| placeholder_avatar(group))),
        }
    }
}

/// Placeholder avatar derived from the character after the group id sigil
pub fn placeholder_avatar(group: &str) -> String {
    match group.chars().nth(1) {
        Some(letter) => format!(
            "https://dummyimage.com/24x24/FF4136/FFFFFF.png&text={}",
            letter
        ),
        None => "https://dummyimage.com/24x24/FF4136/FFFFFF.png&text=R".to_string(),
    }
}

/// Node retention policy across sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Nodes live for the lifetime of the process
    #[default]
    Retain,
    /// Groups and servers missing from a successful fetch are removed
    PruneAbsent,
}

/// Discovery and probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Timeout for the well-known delegation fetch
    #[serde(with = "humantime_serde")]
    pub well_known_timeout: Duration,

    /// Timeout for each DNS lookup
    #[serde(with = "humantime_serde")]
    pub dns_timeout: Duration,

    /// Timeout for the federation version probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Port appended to addresses without one
    pub default_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            well_known_timeout: Duration::from_secs(5),
            dns_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            default_port: DEFAULT_FEDERATION_PORT,
        }
    }
}

/// Sweep scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Pause between the end of one cycle and the start of the next
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound on concurrent network tasks across the whole sweep
    pub max_concurrent_checks: usize,

    /// Group that is never swept
    pub control_group: Option<GroupId>,

    /// What happens to nodes that disappear
    pub retention: Retention,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrent_checks: 64,
            control_group: None,
            retention: Retention::Retain,
        }
    }
}

/// Summary of one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Groups whose servers were checked
    pub groups_checked: usize,

    /// Groups skipped (the control group)
    pub groups_skipped: usize,

    /// Groups abandoned because membership could not be fetched
    pub groups_failed: usize,

    /// Server checks completed
    pub servers_checked: usize,

    /// Server checks that ended in "OK"
    pub servers_ok: usize,

    /// Nodes removed by the retention policy
    pub nodes_pruned: usize,
}
