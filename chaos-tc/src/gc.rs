//! Removal of shaping state for CIDRs that are no longer desired.
//!
//! Collection is filter-driven: a CIDR is known to a device only through its u32 rule, and the
//! rule names the class to remove alongside it.

use ipnet::Ipv4Net;
use rustc_hash::FxHashSet;

use crate::{
    command::Tc,
    device::{ShapingDevice, ShapingDevices},
    handle::ClassId,
    inspect::Inspector,
    profile::Direction,
    shaper::{delete_class, delete_filter},
    Error, Result,
};

/// A CIDR whose filter and class were removed from a shaping device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub direction: Direction,
    pub device: String,
    pub cidr: Ipv4Net,
    pub class: ClassId,
}

/// A collection step that failed. `cidr` is `None` when the device listing itself failed.
#[derive(Debug)]
pub struct GcFailure {
    pub device: String,
    pub cidr: Option<Ipv4Net>,
    pub error: Error,
}

/// Outcome of a collection pass.
#[derive(Debug, Default)]
pub struct GcReport {
    pub removed: Vec<Removed>,
    /// Failures of the pass. Collection continued past each of them.
    pub errors: Vec<GcFailure>,
}

impl GcReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The removed entries, or the first failure of the pass.
    pub fn into_result(self) -> Result<Vec<Removed>> {
        match self.errors.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.removed),
        }
    }
}

/// Removes the classes and filters of CIDRs that are no longer desired.
///
/// Collection is filter-driven: a class that no filter points at is never looked at.
#[derive(Debug, Clone)]
pub struct GarbageCollector {
    tc: Tc,
    inspector: Inspector,
    devices: ShapingDevices,
}

impl GarbageCollector {
    pub fn new(tc: Tc, devices: ShapingDevices) -> Self {
        let inspector = Inspector::new(tc.clone());
        Self { tc, inspector, devices }
    }

    /// Removes every CIDR found on a shaping device that is missing from the desired set of the
    /// device's direction. Failures are recorded and the pass moves on.
    pub fn delete_extra_chaos(
        &self,
        desired_egress: &FxHashSet<Ipv4Net>,
        desired_ingress: &FxHashSet<Ipv4Net>,
    ) -> GcReport {
        let mut report = GcReport::default();

        for (direction, device) in self.devices.iter() {
            let desired = match direction {
                Direction::Egress => desired_egress,
                Direction::Ingress => desired_ingress,
            };

            let existing = match self.inspector.filter_cidrs(device.name()) {
                Ok(cidrs) => cidrs,
                Err(error) => {
                    tracing::error!(device = %device, %error, "failed to list filters");
                    let device = device.name().to_string();
                    report.errors.push(GcFailure { device, cidr: None, error });
                    continue;
                }
            };

            for cidr in existing.into_iter().filter(|cidr| !desired.contains(cidr)) {
                match self.reset(&cidr, device) {
                    Ok(class) => report.removed.push(Removed {
                        direction,
                        device: device.name().to_string(),
                        cidr,
                        class,
                    }),
                    Err(error) => {
                        tracing::error!(device = %device, %cidr, %error, "failed to remove chaos");
                        report.errors.push(GcFailure {
                            device: device.name().to_string(),
                            cidr: Some(cidr),
                            error,
                        });
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(
                removed = report.removed.len(),
                errors = report.errors.len(),
                "collected stale chaos"
            );
        }
        report
    }

    /// Deletes the filter matching `cidr` on `device`, then its class. Returns the class the
    /// filter pointed to.
    pub fn reset(&self, cidr: &Ipv4Net, device: &ShapingDevice) -> Result<ClassId> {
        let name = device.name();
        let _guard = device.lock();

        let filter = self
            .inspector
            .find_filter(name, cidr)?
            .ok_or_else(|| Error::NotFound { cidr: *cidr, device: name.to_string() })?;

        tracing::info!(device = %name, %cidr, class = %filter.class, "removing chaos");
        delete_filter(&self.tc, name, &filter.handle)?;

        if self.inspector.class_exists(name, filter.class)? {
            delete_class(&self.tc, name, filter.class)?;
        } else {
            tracing::debug!(device = %name, class = %filter.class, "class already gone");
        }

        Ok(filter.class)
    }
}
