//! Federation server address discovery.
//!
//! A server name is turned into a `host:port` address by trying, in order:
//! IP literals, well-known delegation, the `_matrix-fed._tcp`
//! SRV record, the deprecated `_matrix._tcp` SRV record, and finally plain
//! hostname resolution. The first mechanism that succeeds wins; none is
//! retried.

use crate::error::{DiscoveryError, ResolutionError};
use crate::types::DiscoveryConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::time::timeout;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use tracing::{debug, warn};

/// Path of the server delegation document
pub const WELL_KNOWN_PATH: &str = "/.well-known/matrix/server";

/// Current federation SRV service label
pub const SRV_SERVICE: &str = "_matrix-fed._tcp";

/// Deprecated federation SRV service label
pub const DEPRECATED_SRV_SERVICE: &str = "_matrix._tcp";

/// First target of an SRV answer, as returned by DNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub target: String,
    pub port: u16,
}

/// Network mechanisms used by discovery
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Fetch the well-known document for `domain` and return its server field
    async fn well_known(&self, domain: &str) -> Result<String, DiscoveryError>;

    /// Look up the first SRV record for a fully formed service name
    async fn srv(&self, name: &str) -> Result<SrvTarget, DiscoveryError>;

    /// Check that `domain` resolves to at least one address
    async fn lookup_host(&self, domain: &str) -> Result<(), DiscoveryError>;
}

/// Domain name to federation address
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<String, ResolutionError>;
}

/// Resolver applying the federation discovery precedence over a backend
pub struct FederationResolver<B> {
    backend: B,
    default_port: u16,
}

impl<B: DiscoveryBackend> FederationResolver<B> {
    pub fn new(backend: B, default_port: u16) -> Self {
        Self {
            backend,
            default_port,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn resolve_srv(&self, domain: &str) -> Option<String> {
        for service in [SRV_SERVICE, DEPRECATED_SRV_SERVICE] {
            let name = format!("{}.{}", service, domain);
            match self.backend.srv(&name).await {
                Ok(srv) => {
                    let address = format!("{}:{}", srv.target.trim_end_matches('.'), srv.port);
                    debug!(domain, service, address = %address, "Resolved via SRV record");
                    return Some(address);
                }
                Err(e) => debug!(domain, service, error = %e, "SRV lookup failed"),
            }
        }
        None
    }
}

#[async_trait]
impl<B: DiscoveryBackend> AddressResolver for FederationResolver<B> {
    async fn resolve(&self, domain: &str) -> Result<String, ResolutionError> {
        if let Some(ip) = parse_ip_literal(domain) {
            return Ok(SocketAddr::new(ip, self.default_port).to_string());
        }

        match self.backend.well_known(domain).await {
            Ok(server) => {
                let address = with_default_port(&server, self.default_port);
                debug!(domain, address = %address, "Resolved via well-known delegation");
                return Ok(address);
            }
            Err(e) => debug!(domain, error = %e, "Well-known delegation unavailable"),
        }

        if let Some(address) = self.resolve_srv(domain).await {
            return Ok(address);
        }

        match self.backend.lookup_host(domain).await {
            Ok(()) => {
                debug!(domain, "Resolved via hostname fallback");
                return Ok(format!("{}:{}", domain, self.default_port));
            }
            Err(e) => debug!(domain, error = %e, "Hostname lookup failed"),
        }

        warn!(domain, "Federation server discovery failed");
        Err(ResolutionError::new(domain))
    }
}

/// Parse `1.2.3.4`, `::1` or `[::1]` as an IP address
fn parse_ip_literal(name: &str) -> Option<IpAddr> {
    let bare = name
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(name);
    bare.parse().ok()
}

/// True for `host:port` and `[v6]:port`
fn has_explicit_port(address: &str) -> bool {
    if let Some(rest) = address.strip_prefix('[') {
        return rest
            .split_once("]:")
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    }

    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

fn with_default_port(server: &str, default_port: u16) -> String {
    if has_explicit_port(server) {
        return server.to_string();
    }
    match parse_ip_literal(server) {
        Some(ip) => SocketAddr::new(ip, default_port).to_string(),
        None => format!("{}:{}", server, default_port),
    }
}

#[derive(Deserialize)]
struct WellKnownServer {
    #[serde(rename = "m.server")]
    server: Option<String>,
}

/// Discovery over HTTPS and the system DNS configuration
pub struct SystemDiscovery {
    http: reqwest::Client,
    scheme: &'static str,
    dns: TokioAsyncResolver,
    well_known_timeout: Duration,
    dns_timeout: Duration,
}

impl SystemDiscovery {
    /// Create a backend with the given timeouts. DNS lookups are attempted once.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        Self::with_scheme("https", config)
    }

    /// Fetch well-known documents over plain HTTP, for local listeners without TLS
    pub fn plaintext(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        Self::with_scheme("http", config)
    }

    fn with_scheme(scheme: &'static str, config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(config.well_known_timeout)
            .build()?;

        let (resolver_config, mut opts) = match trust_dns_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!(error = %e, "Failed to read system DNS configuration, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = config.dns_timeout;
        opts.attempts = 1;

        Ok(Self {
            http,
            scheme,
            dns: TokioAsyncResolver::tokio(resolver_config, opts),
            well_known_timeout: config.well_known_timeout,
            dns_timeout: config.dns_timeout,
        })
    }
}

#[async_trait]
impl DiscoveryBackend for SystemDiscovery {
    async fn well_known(&self, domain: &str) -> Result<String, DiscoveryError> {
        let url = format!("{}://{}{}", self.scheme, domain, WELL_KNOWN_PATH);

        let response = match timeout(self.well_known_timeout, self.http.get(&url).send()).await {
            Ok(response) => response?,
            Err(_) => return Err(DiscoveryError::Timeout(self.well_known_timeout)),
        };

        if response.status() != reqwest::StatusCode::OK {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let document: WellKnownServer = serde_json::from_slice(&body)?;
        document
            .server
            .filter(|server| !server.is_empty())
            .ok_or(DiscoveryError::MissingServer)
    }

    async fn srv(&self, name: &str) -> Result<SrvTarget, DiscoveryError> {
        let lookup = timeout(self.dns_timeout, self.dns.srv_lookup(name))
            .await
            .map_err(|_| DiscoveryError::Timeout(self.dns_timeout))??;

        let record = lookup.iter().next().ok_or(DiscoveryError::NoRecords)?;
        Ok(SrvTarget {
            target: record.target().to_utf8(),
            port: record.port(),
        })
    }

    async fn lookup_host(&self, domain: &str) -> Result<(), DiscoveryError> {
        let mut addrs = timeout(
            self.dns_timeout,
            tokio::net::lookup_host(format!("{}:0", domain)),
        )
        .await
        .map_err(|_| DiscoveryError::Timeout(self.dns_timeout))??;

        match addrs.next() {
            Some(_) => Ok(()),
            None => Err(DiscoveryError::NoRecords),
        }
    }
}
