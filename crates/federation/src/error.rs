//! Error types for discovery, probing and sweeping.

use crate::types::GroupId;
use std::time::Duration;
use thiserror::Error;

/// No usable federation address was found for a domain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not resolve federation server for {domain}")]
pub struct ResolutionError {
    pub domain: String,
}

impl ResolutionError {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

/// Failure of a single discovery mechanism
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("malformed well-known document: {0}")]
    Body(#[from] serde_json::Error),

    #[error("well-known document has no server field")]
    MissingServer,

    #[error("DNS lookup failed: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    #[error("host lookup failed: {0}")]
    Host(#[from] std::io::Error),

    #[error("no records found")]
    NoRecords,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of a federation health probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Failure reported by the chat-network client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid homeserver URL: {0}")]
    InvalidUrl(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("{0}")]
    Other(String),
}

/// Failures that cut a sweep short
#[derive(Debug, Error)]
pub enum SweepError {
    /// The joined group list could not be fetched; the whole cycle is skipped
    #[error("failed to fetch joined groups: {0}")]
    GroupList(#[source] ClientError),

    /// Membership of one group could not be fetched; only that group is skipped
    #[error("failed to fetch members of {group}: {source}")]
    Membership {
        group: GroupId,
        #[source]
        source: ClientError,
    },

    #[error("concurrency limiter closed")]
    LimiterClosed,
}
