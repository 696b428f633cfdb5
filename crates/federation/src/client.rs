//! Chat-network client interface used by the sweep.

use crate::error::ClientError;
use crate::types::GroupId;
use async_trait::async_trait;

/// Group state attributes read when a group node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupAttribute {
    Title,
    CanonicalAlias,
    Avatar,
}

/// Access to the monitoring identity's view of the chat network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Groups the monitoring identity currently belongs to
    async fn list_joined_groups(&self) -> Result<Vec<GroupId>, ClientError>;

    /// Member identities (`@user:server`) of a group
    async fn list_members(&self, group: &str) -> Result<Vec<String>, ClientError>;

    /// A state attribute of a group, `None` when unset
    async fn read_group_attribute(
        &self,
        group: &str,
        attribute: GroupAttribute,
    ) -> Result<Option<String>, ClientError>;

    /// Downloadable URL for a media reference such as an avatar
    fn media_url(&self, reference: &str) -> Option<String>;
}
