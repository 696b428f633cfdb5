//! Wires the Matrix client, the sweep scheduler and the HTTP server together.

use crate::config::Config;
use crate::http_server::TreeServer;
use crate::matrix::MatrixClient;
use common::{Error, Result};
use federation::{
    FederationResolver, StatusTree, SweepMetrics, SweepScheduler, SystemDiscovery, VersionProbe,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Federation monitor process
pub struct MonitorServer {
    config: Config,
}

impl MonitorServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Log in, then sweep and serve until a task exits or ctrl-c is received
    pub async fn run(self) -> Result<()> {
        let matrix = &self.config.matrix;
        info!(homeserver = %matrix.homeserver, user = %matrix.username, "Starting federation monitor");

        let mut client =
            MatrixClient::new(&matrix.homeserver, matrix.request_timeout).map_err(Error::client)?;
        client
            .login(&matrix.username, &matrix.password)
            .await
            .map_err(Error::client)?;

        let discovery = self.config.to_discovery_config();
        let backend = SystemDiscovery::new(&discovery).map_err(Error::other)?;
        let resolver = FederationResolver::new(backend, discovery.default_port);
        let probe = VersionProbe::new(discovery.probe_timeout).map_err(Error::other)?;

        let tree = Arc::new(StatusTree::new());
        let metrics = Arc::new(SweepMetrics::new());

        let scheduler = SweepScheduler::new(
            Arc::new(client),
            Arc::new(resolver),
            Arc::new(probe),
            tree.clone(),
            self.config.to_sweep_config(),
            Some(metrics.clone()),
        );
        let http = TreeServer::new(tree, metrics, self.config.http.listen_addr.clone());

        let sweep_handle = tokio::spawn(scheduler.run());
        let http_handle = tokio::spawn(http.run());

        info!("All tasks spawned, monitor running");

        tokio::select! {
            result = sweep_handle => {
                if let Err(e) = result {
                    warn!(error = %e, "Sweep task ended unexpectedly");
                }
            }
            result = http_handle => {
                match result {
                    Ok(Ok(())) => info!("HTTP server completed"),
                    Ok(Err(e)) => return Err(Error::Io(e)),
                    Err(e) => warn!(error = %e, "HTTP task ended unexpectedly"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received");
            }
        }

        info!("Federation monitor stopped");
        Ok(())
    }
}
