//! Periodic sweep over joined groups and their federation servers.

use crate::client::{ChatClient, GroupAttribute};
use crate::error::SweepError;
use crate::metrics::SweepMetrics;
use crate::probe::HealthProbe;
use crate::resolver::AddressResolver;
use crate::tree::StatusTree;
use crate::types::{GroupDetails, GroupId, Retention, ServerStatus, SweepConfig, SweepReport};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Collaborators shared by every task of a sweep
struct SweepContext {
    client: Arc<dyn ChatClient>,
    resolver: Arc<dyn AddressResolver>,
    probe: Arc<dyn HealthProbe>,
    tree: Arc<StatusTree>,
    limiter: Semaphore,
    retention: Retention,
    metrics: Option<Arc<SweepMetrics>>,
}

#[derive(Debug, Default)]
struct GroupOutcome {
    servers_checked: usize,
    servers_ok: usize,
    nodes_pruned: usize,
}

/// Drives sweep cycles and writes results into the status tree
pub struct SweepScheduler {
    ctx: Arc<SweepContext>,
    interval: Duration,
    control_group: Option<GroupId>,
}

impl SweepScheduler {
    pub fn new(
        client: Arc<dyn ChatClient>,
        resolver: Arc<dyn AddressResolver>,
        probe: Arc<dyn HealthProbe>,
        tree: Arc<StatusTree>,
        config: SweepConfig,
        metrics: Option<Arc<SweepMetrics>>,
    ) -> Self {
        let ctx = SweepContext {
            client,
            resolver,
            probe,
            tree,
            limiter: Semaphore::new(config.max_concurrent_checks.max(1)),
            retention: config.retention,
            metrics,
        };

        Self {
            ctx: Arc::new(ctx),
            interval: config.interval,
            control_group: config.control_group,
        }
    }

    /// The tree this scheduler writes to
    pub fn tree(&self) -> Arc<StatusTree> {
        self.ctx.tree.clone()
    }

    /// Run cycles forever, pausing `interval` after each one
    pub async fn run(self) {
        info!(interval = ?self.interval, "Sweep scheduler started");

        loop {
            let start = Instant::now();
            match self.run_cycle().await {
                Ok(report) => info!(
                    groups_checked = report.groups_checked,
                    groups_failed = report.groups_failed,
                    servers_checked = report.servers_checked,
                    servers_ok = report.servers_ok,
                    duration_ms = start.elapsed().as_millis(),
                    "Sweep cycle complete"
                ),
                Err(e) => warn!(error = %e, "Sweep cycle skipped"),
            }

            debug!(interval = ?self.interval, "Waiting for next cycle");
            sleep(self.interval).await;
        }
    }

    /// Run a single cycle and wait for every group and server task in it
    pub async fn run_cycle(&self) -> Result<SweepReport, SweepError> {
        let start = Instant::now();

        let groups = match self.ctx.client.list_joined_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                if let Some(ref m) = self.ctx.metrics {
                    m.record_sweep_failure();
                }
                return Err(SweepError::GroupList(e));
            }
        };
        info!(groups = groups.len(), "Checking server statuses");

        let mut report = SweepReport::default();
        let mut tasks = JoinSet::new();

        for group in &groups {
            if self.control_group.as_deref() == Some(group.as_str()) {
                debug!(group = %group, "Skipping control group");
                report.groups_skipped += 1;
                continue;
            }
            tasks.spawn(sweep_group(self.ctx.clone(), group.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    report.groups_checked += 1;
                    report.servers_checked += outcome.servers_checked;
                    report.servers_ok += outcome.servers_ok;
                    report.nodes_pruned += outcome.nodes_pruned;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Group sweep abandoned");
                    report.groups_failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Group task failed");
                    report.groups_failed += 1;
                }
            }
        }

        if self.ctx.retention == Retention::PruneAbsent {
            let joined: HashSet<GroupId> = groups.into_iter().collect();
            report.nodes_pruned += self.ctx.tree.retain_groups(&joined);
        }

        if let Some(ref m) = self.ctx.metrics {
            m.record_sweep(start.elapsed());
            m.update_tree_size(self.ctx.tree.len(), self.ctx.tree.server_count().await);
        }

        Ok(report)
    }
}

/// Fetch members of one group, then check each of its servers in parallel.
///
/// Server nodes are created here before fanning out, so server tasks only
/// write status.
async fn sweep_group(ctx: Arc<SweepContext>, group: GroupId) -> Result<GroupOutcome, SweepError> {
    let (members, node) = {
        let _permit = ctx
            .limiter
            .acquire()
            .await
            .map_err(|_| SweepError::LimiterClosed)?;

        let members = ctx
            .client
            .list_members(&group)
            .await
            .map_err(|source| SweepError::Membership {
                group: group.clone(),
                source,
            })?;

        let node = ctx
            .tree
            .get_or_create_group(&group, || fetch_group_details(ctx.client.as_ref(), &group))
            .await;

        (members, node)
    };

    let domains = count_domains(&members);
    debug!(group = %group, members = members.len(), servers = domains.len(), "Processing group");

    let mut outcome = GroupOutcome::default();
    if ctx.retention == Retention::PruneAbsent {
        let present: HashSet<String> = domains.iter().map(|(domain, _)| domain.clone()).collect();
        outcome.nodes_pruned = node.retain_servers(&present).await;
    }

    let mut tasks = JoinSet::new();
    for (domain, user_count) in domains {
        let server = ctx.tree.get_or_create_server(&node, &domain).await;
        server.set_unchecked_count(user_count).await;
        let ctx = ctx.clone();
        let group = group.clone();

        tasks.spawn(async move {
            let _permit = ctx
                .limiter
                .acquire()
                .await
                .map_err(|_| SweepError::LimiterClosed)?;

            let status =
                check_server(ctx.resolver.as_ref(), ctx.probe.as_ref(), server.domain()).await;
            debug!(group = %group, domain = server.domain(), status = %status, user_count, "Server checked");

            ctx.tree.update_status(&server, status.clone(), user_count).await;
            if let Some(ref m) = ctx.metrics {
                m.record_check(&status);
            }
            Ok::<_, SweepError>(status)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(status)) => {
                outcome.servers_checked += 1;
                if status.is_ok() {
                    outcome.servers_ok += 1;
                }
            }
            Ok(Err(e)) => warn!(group = %group, error = %e, "Server check abandoned"),
            Err(e) => warn!(group = %group, error = %e, "Server task failed"),
        }
    }

    Ok(outcome)
}

/// Resolve then probe one server, mapping the result to a status
pub async fn check_server(
    resolver: &dyn AddressResolver,
    probe: &dyn HealthProbe,
    domain: &str,
) -> ServerStatus {
    match resolver.resolve(domain).await {
        Ok(address) => {
            if probe.probe(&address).await {
                ServerStatus::Ok
            } else {
                ServerStatus::Unreachable
            }
        }
        Err(e) => ServerStatus::DelegationFailed(e.to_string()),
    }
}

/// Server name of a member id: the segment after the first `:` up to the
/// next one, or empty
pub fn extract_domain(member: &str) -> &str {
    member.split(':').nth(1).unwrap_or("")
}

/// Distinct member domains in first-seen order, with member counts
pub fn count_domains(members: &[String]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for member in members {
        let domain = extract_domain(member);
        if domain.is_empty() {
            debug!(member = %member, "Ignoring member id without server name");
            continue;
        }
        match index.get(domain) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(domain, counts.len());
                counts.push((domain.to_string(), 1));
            }
        }
    }

    counts
}

async fn fetch_group_details(client: &dyn ChatClient, group: &str) -> GroupDetails {
    let title = read_attribute(client, group, GroupAttribute::Title).await;
    let alias = read_attribute(client, group, GroupAttribute::CanonicalAlias).await;
    if alias.is_none() {
        debug!(group, "No canonical alias found");
    }
    let avatar = read_attribute(client, group, GroupAttribute::Avatar)
        .await
        .and_then(|reference| client.media_url(&reference));

    GroupDetails::from_attributes(group, title, alias, avatar)
}

async fn read_attribute(
    client: &dyn ChatClient,
    group: &str,
    attribute: GroupAttribute,
) -> Option<String> {
    match client.read_group_attribute(group, attribute).await {
        Ok(value) => value,
        Err(e) => {
            debug!(group, attribute = ?attribute, error = %e, "Failed to read group attribute");
            None
        }
    }
}
