//! Reachability monitoring of federated chat servers.
//!
//! For every group the monitoring identity has joined, the sweep collects the
//! origin servers of its members, discovers each server's federation address,
//! probes it and records the result in a shared status tree:
//! - `resolver`: well-known delegation, SRV records and hostname fallback
//! - `probe`: federation version endpoint check
//! - `tree`: concurrent group/server store with single-flight group creation
//! - `sweep`: periodic two-level fan-out over groups and servers
//! - `snapshot`: JSON-ready copy of the tree
//!
//! # Example
//!
//! ```no_run
//! use federation::{
//!     ChatClient, FederationResolver, StatusTree, SweepScheduler, SystemDiscovery, VersionProbe,
//!     types::{DiscoveryConfig, SweepConfig},
//! };
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn ChatClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let discovery = DiscoveryConfig::default();
//! let resolver = FederationResolver::new(SystemDiscovery::new(&discovery)?, discovery.default_port);
//! let probe = VersionProbe::new(discovery.probe_timeout)?;
//! let tree = Arc::new(StatusTree::new());
//!
//! let scheduler = SweepScheduler::new(
//!     client,
//!     Arc::new(resolver),
//!     Arc::new(probe),
//!     tree.clone(),
//!     SweepConfig::default(),
//!     None,
//! );
//! scheduler.run_cycle().await?;
//!
//! let json = serde_json::to_string(&tree.snapshot().await)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod resolver;
pub mod snapshot;
pub mod sweep;
pub mod tree;
pub mod types;

pub use client::{ChatClient, GroupAttribute};
pub use error::{ClientError, DiscoveryError, ProbeError, ResolutionError, SweepError};
pub use metrics::SweepMetrics;
pub use probe::{HealthProbe, VersionProbe};
pub use resolver::{AddressResolver, DiscoveryBackend, FederationResolver, SystemDiscovery};
pub use snapshot::TreeNode;
pub use sweep::SweepScheduler;
pub use tree::{GroupNode, ServerNode, StatusTree};
pub use types::{
    DiscoveryConfig, GroupDetails, GroupId, Retention, ServerState, ServerStatus, SweepConfig,
    SweepReport,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_display() {
        assert_eq!(ServerStatus::Unknown.to_string(), "unknown");
        assert_eq!(ServerStatus::Ok.to_string(), "OK");
        assert_eq!(ServerStatus::Unreachable.to_string(), "Failed (Unreachable)");
        assert_eq!(
            ServerStatus::DelegationFailed("no records".into()).to_string(),
            "Failed (Delegation Failed: no records)"
        );
    }

    #[test]
    fn test_group_details_fallbacks() {
        let details = GroupDetails::from_attributes("!abc:example.org", None, None, None);
        assert_eq!(details.name, "(unknown title) - #!abc:example.org");
        assert_eq!(
            details.avatar.as_deref(),
            Some("https://dummyimage.com/24x24/FF4136/FFFFFF.png&text=a")
        );
    }

    #[test]
    fn test_group_details_alias_prefix() {
        let details = GroupDetails::from_attributes(
            "!abc:example.org",
            Some("Lobby".into()),
            Some("lobby:example.org".into()),
            Some("https://example.org/a.png".into()),
        );
        assert_eq!(details.name, "Lobby - #lobby:example.org");
        assert_eq!(details.avatar.as_deref(), Some("https://example.org/a.png"));

        let details = GroupDetails::from_attributes(
            "!abc:example.org",
            Some("Lobby".into()),
            Some("#lobby:example.org".into()),
            None,
        );
        assert_eq!(details.name, "Lobby - #lobby:example.org");
    }

    #[test]
    fn test_sweep_config_yaml_defaults() {
        let config: SweepConfig =
            serde_json::from_str(r#"{"interval":"30s","max_concurrent_checks":8,"control_group":null,"retention":"prune_absent"}"#)
                .unwrap();
        assert_eq!(config.interval, std::time::Duration::from_secs(30));
        assert_eq!(config.retention, Retention::PruneAbsent);
    }
}
