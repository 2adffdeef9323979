//! The sync loop: pod listing in, one reconciliation cycle out, every interval.

use std::{future::Future, sync::Arc, time::Duration};

use chaos_tc::{
    cidr,
    command::{Executor, Tc},
    cycle::{CycleReport, PodTarget, Reconciler},
    profile::ChaosProfile,
};
use tokio::time::MissedTickBehavior;

use crate::{
    config::AgentConfig,
    pods::{FilePodSource, LabelSelector, PodRecord, PodSource, PodSourceError},
    registry::{EtcdResolver, InterfaceResolver, RegistryError},
};

/// Errors that end the sync loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Source(#[from] PodSourceError),
    #[error("sync task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Pods of one listing, sorted by what the cycle does with them.
#[derive(Debug, Default)]
pub struct Desired {
    /// Pods to reconcile.
    pub targets: Vec<PodTarget>,
    /// Pods whose interface is unknown this time. Their state is kept as is.
    pub held: Vec<PodTarget>,
    /// Pods left out because of an error in their record.
    pub rejected: Vec<String>,
}

/// Outcome of one [`Agent::sync`].
#[derive(Debug, Default)]
pub struct SyncReport {
    pub cycle: CycleReport,
    /// Pods whose interface could not be resolved.
    pub held: Vec<String>,
    /// Pods with an invalid IP or profile.
    pub rejected: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.cycle.is_clean() && self.held.is_empty() && self.rejected.is_empty()
    }
}

/// Converges the chaos annotations of the node's pods, one cycle at a time.
#[derive(Clone)]
pub struct Agent {
    source: Arc<dyn PodSource>,
    resolver: Option<Arc<dyn InterfaceResolver>>,
    selector: LabelSelector,
    reconciler: Reconciler,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("selector", &self.selector)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(
        source: Arc<dyn PodSource>,
        selector: LabelSelector,
        reconciler: Reconciler,
    ) -> Self {
        Self { source, resolver: None, selector, reconciler }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn InterfaceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Wires the production agent: pods from the configured file, interfaces from etcd when an
    /// endpoint is configured.
    pub fn from_config(config: &AgentConfig, executor: Arc<dyn Executor>) -> Self {
        let tc = Tc::new(executor.clone()).with_program(&config.tc_path);
        let reconciler = Reconciler::new(tc, config.devices(), config.shaper.clone());
        let source = Arc::new(FilePodSource::new(&config.pods));
        let agent = Self::new(source, config.selector.clone(), reconciler);

        match &config.etcd_endpoint {
            Some(endpoint) => agent.with_resolver(Arc::new(
                EtcdResolver::new(endpoint.as_str(), executor).with_curl(config.curl_path.as_str()),
            )),
            None => agent,
        }
    }

    /// Reads the pod listing and turns it into cycle input.
    pub fn desired(&self) -> Result<Desired, PodSourceError> {
        let mut desired = Desired::default();

        for pod in self.source.list()? {
            if !self.selector.matches(&pod.labels) {
                continue;
            }
            let key = pod.key();

            let Some(ip) = pod.pod_ip.as_deref().filter(|ip| !ip.is_empty()) else {
                tracing::warn!(pod = %key, "pod has no IP yet, skipping");
                continue;
            };

            let (ingress, egress) = pod.chaos();
            if ingress.trim().is_empty() && egress.trim().is_empty() {
                tracing::warn!(pod = %key, "chaos is on, but the pod's chaos info was not set");
                continue;
            }

            let target = match target(&pod, ip, ingress, egress) {
                Ok(target) => target,
                Err(error) => {
                    tracing::error!(pod = %key, %error, "invalid chaos settings, skipping");
                    desired.rejected.push(key);
                    continue;
                }
            };

            match self.interface(&pod) {
                Ok(interface) => desired.targets.push(PodTarget { interface, ..target }),
                Err(error) => {
                    tracing::error!(pod = %key, %error, "failed to resolve pod interface");
                    desired.held.push(target);
                }
            }
        }

        Ok(desired)
    }

    fn interface(&self, pod: &PodRecord) -> Result<String, RegistryError> {
        if let Some(interface) = pod.interface.as_ref().filter(|i| !i.is_empty()) {
            return Ok(interface.clone());
        }
        match &self.resolver {
            Some(resolver) => resolver.resolve(pod),
            None => Err(RegistryError::NoInterface { pod: pod.key() }),
        }
    }

    /// Runs one full cycle. Blocking.
    ///
    /// A failed listing skips the cycle altogether, collection included.
    pub fn sync(&self) -> Result<SyncReport, PodSourceError> {
        let desired = self.desired()?;
        tracing::debug!(
            targets = desired.targets.len(),
            held = desired.held.len(),
            "pods need chaos on this node"
        );

        let cycle = self.reconciler.run_cycle_holding(&desired.targets, &desired.held);
        Ok(SyncReport {
            cycle,
            held: desired.held.into_iter().map(|p| p.name).collect(),
            rejected: desired.rejected,
        })
    }

    /// Runs [`Agent::sync`] every `interval` until `shutdown` resolves. A cycle in flight is
    /// finished before returning.
    pub async fn run(
        self,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), AgentError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let agent = self.clone();
            match tokio::task::spawn_blocking(move || agent.sync()).await? {
                Ok(report) if report.is_clean() => tracing::debug!("sync complete"),
                Ok(report) => tracing::warn!(
                    failed = report.cycle.failed.len(),
                    held = report.held.len(),
                    rejected = report.rejected.len(),
                    gc_errors = report.cycle.gc.errors.len(),
                    "sync completed with errors"
                ),
                Err(error) => tracing::error!(%error, "failed to list pods, skipping cycle"),
            }
        }
    }
}

fn target(
    pod: &PodRecord,
    ip: &str,
    ingress: &str,
    egress: &str,
) -> Result<PodTarget, chaos_tc::Error> {
    Ok(PodTarget {
        name: pod.key(),
        interface: String::new(),
        cidr: cidr::parse(ip)?,
        egress: ChaosProfile::parse(egress)?,
        ingress: ChaosProfile::parse(ingress)?,
    })
}
