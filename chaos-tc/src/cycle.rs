//! One reconciliation cycle over the desired pods of a node.

use ipnet::Ipv4Net;
use rustc_hash::FxHashSet;

use crate::{
    command::Tc,
    config::ShaperConfig,
    device::ShapingDevices,
    gc::{GarbageCollector, GcReport},
    profile::{ChaosProfile, Direction},
    shaper::{DirectionFailure, Shaper},
    Error,
};

/// Desired chaos for one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    /// Used for logging and reporting only.
    pub name: String,
    /// Host-side interface, e.g. `cali67801d38217`.
    pub interface: String,
    pub cidr: Ipv4Net,
    pub egress: Option<ChaosProfile>,
    pub ingress: Option<ChaosProfile>,
}

impl PodTarget {
    pub fn has_chaos(&self) -> bool {
        self.egress.is_some() || self.ingress.is_some()
    }
}

/// One direction of one pod that did not converge this cycle.
#[derive(Debug)]
pub struct PodFailure {
    pub pod: String,
    pub direction: Direction,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    /// Pods whose shaping converged.
    pub reconciled: Vec<String>,
    /// At most one entry per pod and direction.
    pub failed: Vec<PodFailure>,
    pub gc: GcReport,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.gc.is_clean()
    }
}

/// Drives [`Shaper`] for every pod, then the [`GarbageCollector`].
#[derive(Debug, Clone)]
pub struct Reconciler {
    tc: Tc,
    devices: ShapingDevices,
    config: ShaperConfig,
    gc: GarbageCollector,
}

impl Reconciler {
    pub fn new(tc: Tc, devices: ShapingDevices, config: ShaperConfig) -> Self {
        let gc = GarbageCollector::new(tc.clone(), devices.clone());
        Self { tc, devices, config, gc }
    }

    pub fn devices(&self) -> &ShapingDevices {
        &self.devices
    }

    /// Runs one cycle. A failing pod is reported and skipped; its CIDR still counts as desired,
    /// so whatever it already has on the shaping devices survives collection.
    pub fn run_cycle(&self, pods: &[PodTarget]) -> CycleReport {
        self.run_cycle_holding(pods, &[])
    }

    /// Runs one cycle over `pods`. `held` pods are desired but cannot be reconciled right now,
    /// e.g. because their interface is unknown: their state is neither touched nor collected.
    pub fn run_cycle_holding(&self, pods: &[PodTarget], held: &[PodTarget]) -> CycleReport {
        let mut report = CycleReport::default();
        let mut desired_egress = FxHashSet::default();
        let mut desired_ingress = FxHashSet::default();

        let mut desire = |pod: &PodTarget| {
            if pod.egress.is_some() {
                desired_egress.insert(pod.cidr);
            }
            if pod.ingress.is_some() {
                desired_ingress.insert(pod.cidr);
            }
        };

        for pod in held {
            tracing::debug!(pod = %pod.name, cidr = %pod.cidr, "holding pod state");
            desire(pod);
        }

        for pod in pods {
            if !pod.has_chaos() {
                tracing::debug!(pod = %pod.name, "no chaos requested, skipping");
                continue;
            }

            desire(pod);

            let failures = self.reconcile_pod(pod);
            if failures.is_empty() {
                tracing::debug!(pod = %pod.name, interface = %pod.interface, "pod reconciled");
                report.reconciled.push(pod.name.clone());
            }
            for DirectionFailure { direction, error } in failures {
                tracing::error!(
                    pod = %pod.name,
                    interface = %pod.interface,
                    %direction,
                    %error,
                    "failed to reconcile pod"
                );
                report.failed.push(PodFailure { pod: pod.name.clone(), direction, error });
            }
        }

        report.gc = self.gc.delete_extra_chaos(&desired_egress, &desired_ingress);

        tracing::info!(
            reconciled = report.reconciled.len(),
            failed = report.failed.len(),
            collected = report.gc.removed.len(),
            "cycle finished"
        );
        report
    }

    fn reconcile_pod(&self, pod: &PodTarget) -> Vec<DirectionFailure> {
        let mut shaper =
            Shaper::new(self.tc.clone(), self.devices.clone(), self.config.clone(), &pod.interface);
        shaper.reconcile(&pod.cidr, pod.egress.as_ref(), pod.ingress.as_ref())
    }
}
