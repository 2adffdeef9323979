//! Per-pod shaping.
//!
//! Pod traffic is not shaped on the pod interface itself. Both directions are mirrored onto the
//! shared [`ShapingDevices`](crate::device::ShapingDevices), where one HTB class per pod CIDR
//! carries the rate limit and a `netem` qdisc below it carries the faults:
//!
//! ```text
//!                 pod interface (caliXXXXXXXXXXX)
//!   ingress hook ffff: ──mirred──▶ ifb<first>   filter `match ip src <cidr>` ─▶ 1:<id> ─▶ netem
//!   root htb 1: ─▶ 1:1 ──mirred──▶ ifb<second>  filter `match ip dst <cidr>` ─▶ 1:<id> ─▶ netem
//! ```
//!
//! Every step checks kernel state before mutating it, so a cycle can be repeated any number of
//! times and picks up where a failed cycle left off.

use ipnet::Ipv4Net;

use crate::{
    alloc::ClassIdAllocator,
    command::Tc,
    config::ShaperConfig,
    device::ShapingDevices,
    handle::{ClassId, INGRESS_HANDLE, MIRROR_CLASS, MIRROR_QUEUE_HANDLE, ROOT_HANDLE},
    inspect::Inspector,
    profile::{ChaosProfile, Direction},
    Error, Result,
};

/// Class ids resolved for one pod interface during the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaperCache {
    pub egress: Option<ClassId>,
    pub ingress: Option<ClassId>,
}

impl ShaperCache {
    pub fn get(&self, direction: Direction) -> Option<ClassId> {
        match direction {
            Direction::Egress => self.egress,
            Direction::Ingress => self.ingress,
        }
    }

    fn set(&mut self, direction: Direction, class: ClassId) {
        match direction {
            Direction::Egress => self.egress = Some(class),
            Direction::Ingress => self.ingress = Some(class),
        }
    }
}

/// State of a CIDR's class and filter on a shaping device, as found before reconciling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidrState {
    /// No filter matches the CIDR.
    Absent,
    /// A filter matches the CIDR but its class is gone.
    Dangling,
    /// Filter and class are both present.
    Active,
}

/// A direction of a pod that could not be converged this cycle.
#[derive(Debug)]
pub struct DirectionFailure {
    pub direction: Direction,
    pub error: Error,
}

/// Reconciles the shaping of a single pod interface. Constructed per pod, per cycle.
#[derive(Debug)]
pub struct Shaper {
    tc: Tc,
    inspector: Inspector,
    allocator: ClassIdAllocator,
    devices: ShapingDevices,
    config: ShaperConfig,
    interface: String,
    cache: ShaperCache,
}

impl Shaper {
    pub fn new(
        tc: Tc,
        devices: ShapingDevices,
        config: ShaperConfig,
        interface: impl Into<String>,
    ) -> Self {
        let inspector = Inspector::new(tc.clone());
        let allocator = ClassIdAllocator::new(inspector.clone()).with_bound(config.class_id_bound);

        Self {
            tc,
            inspector,
            allocator,
            devices,
            config,
            interface: interface.into(),
            cache: ShaperCache::default(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn cache(&self) -> &ShaperCache {
        &self.cache
    }

    /// Converges every direction that has a profile. The directions are independent: a failure
    /// in one is returned and does not stop the other.
    pub fn reconcile(
        &mut self,
        cidr: &Ipv4Net,
        egress: Option<&ChaosProfile>,
        ingress: Option<&ChaosProfile>,
    ) -> Vec<DirectionFailure> {
        let mut failures = Vec::new();

        for (direction, profile) in [(Direction::Egress, egress), (Direction::Ingress, ingress)] {
            let Some(profile) = profile else {
                tracing::debug!(%cidr, %direction, "no chaos requested");
                continue;
            };
            if let Err(error) = self.reconcile_direction(direction, cidr, profile) {
                failures.push(DirectionFailure { direction, error });
            }
        }
        failures
    }

    /// Mirrors one direction of the pod's traffic onto its shaping device, makes sure `cidr` has
    /// a class there and applies `profile` to that class.
    pub fn reconcile_direction(
        &mut self,
        direction: Direction,
        cidr: &Ipv4Net,
        profile: &ChaosProfile,
    ) -> Result<()> {
        match direction {
            Direction::Egress => self.reconcile_egress_mirroring(cidr)?,
            Direction::Ingress => self.reconcile_ingress_mirroring(cidr)?,
        };

        let class = match self.cache.get(direction) {
            Some(class) => class,
            None => self.reconcile_cidr_class(direction, cidr)?.0,
        };
        self.apply_profile(direction, class, profile)
    }

    /// Mirrors traffic entering the pod (the interface's egress) onto the second shaping device.
    ///
    /// Returns `false` when the interface already carries the root HTB qdisc.
    pub fn reconcile_ingress_mirroring(&mut self, cidr: &Ipv4Net) -> Result<bool> {
        if self.inspector.qdisc_presence(&self.interface)?.root_htb {
            tracing::debug!(interface = %self.interface, "ingress mirroring already initialized");
            return Ok(false);
        }

        let iface = self.interface.as_str();
        let target = self.devices.second().name();
        let mirror_class = MIRROR_CLASS.to_string();
        let limit = self.config.mirror_queue_limit.to_string();

        tracing::info!(interface = %iface, device = %target, "setting up ingress mirroring");

        self.tc.run_tolerant(["qdisc", "del", "dev", iface, "root"]);
        self.tc.run([
            "qdisc", "add", "dev", iface, "root", "handle", ROOT_HANDLE, "htb", "default", "1",
        ])?;
        self.tc.run([
            "class",
            "add",
            "dev",
            iface,
            "parent",
            ROOT_HANDLE,
            "classid",
            mirror_class.as_str(),
            "htb",
            "rate",
            self.config.safety_rate.as_str(),
        ])?;
        self.tc.run([
            "qdisc",
            "add",
            "dev",
            iface,
            "parent",
            mirror_class.as_str(),
            "handle",
            MIRROR_QUEUE_HANDLE,
            "pfifo",
            "limit",
            limit.as_str(),
        ])?;
        self.tc.run(mirror_filter(iface, ROOT_HANDLE, target))?;

        self.reconcile_cidr_class(Direction::Ingress, cidr)?;
        Ok(true)
    }

    /// Mirrors traffic leaving the pod (the interface's ingress) onto the first shaping device.
    ///
    /// Returns `false` when the interface already carries the ingress hook.
    pub fn reconcile_egress_mirroring(&mut self, cidr: &Ipv4Net) -> Result<bool> {
        if self.inspector.qdisc_presence(&self.interface)?.ingress {
            tracing::debug!(interface = %self.interface, "egress mirroring already initialized");
            return Ok(false);
        }

        let iface = self.interface.as_str();
        let target = self.devices.first().name();

        tracing::info!(interface = %iface, device = %target, "setting up egress mirroring");

        self.tc.run_tolerant(["qdisc", "del", "dev", iface, "ingress"]);
        self.tc.run(["qdisc", "add", "dev", iface, "ingress"])?;
        self.tc.run(mirror_filter(iface, INGRESS_HANDLE, target))?;

        self.reconcile_cidr_class(Direction::Egress, cidr)?;
        Ok(true)
    }

    /// Converges the class and filter of `cidr` on the shaping device of `direction`, and caches
    /// the resulting class id.
    ///
    /// Returns the class and the state the CIDR was found in.
    pub fn reconcile_cidr_class(
        &mut self,
        direction: Direction,
        cidr: &Ipv4Net,
    ) -> Result<(ClassId, CidrState)> {
        let device = self.devices.for_direction(direction);
        let name = device.name();
        let _guard = device.lock();

        let state = match self.inspector.find_filter(name, cidr)? {
            None => CidrState::Absent,
            Some(filter) if self.inspector.class_exists(name, filter.class)? => {
                if !self.inspector.netem_attached(name, filter.class)? {
                    tracing::info!(device = %name, class = %filter.class, "re-attaching netem");
                    attach_netem(&self.tc, name, filter.class)?;
                }
                tracing::debug!(device = %name, %cidr, class = %filter.class, "reusing class");
                self.cache.set(direction, filter.class);
                return Ok((filter.class, CidrState::Active));
            }
            Some(filter) => {
                tracing::warn!(
                    device = %name, %cidr, class = %filter.class, handle = %filter.handle,
                    "filter points to a missing class, deleting it"
                );
                delete_filter(&self.tc, name, &filter.handle)?;
                CidrState::Dangling
            }
        };

        let class = self.allocator.next_class_id(name)?;
        let class_str = class.to_string();
        let cidr_str = cidr.to_string();
        tracing::info!(device = %name, %cidr, %class, ?state, "creating class");

        // Filter first: if anything below fails the next cycle finds a dangling filter and
        // rebuilds, while a class without filter would never be collected.
        self.tc.run([
            "filter",
            "add",
            "dev",
            name,
            "parent",
            ROOT_HANDLE,
            "protocol",
            "ip",
            "prio",
            "1",
            "u32",
            "match",
            "ip",
            direction.match_selector(),
            cidr_str.as_str(),
            "flowid",
            class_str.as_str(),
        ])?;
        self.tc.run([
            "class",
            "add",
            "dev",
            name,
            "parent",
            ROOT_HANDLE,
            "classid",
            class_str.as_str(),
            "htb",
            "rate",
            self.config.safety_rate.as_str(),
        ])?;
        attach_netem(&self.tc, name, class)?;

        self.cache.set(direction, class);
        Ok((class, state))
    }

    /// Applies `profile` to an existing class. Both steps update in place, so re-applying the
    /// same profile leaves the kernel unchanged.
    pub fn apply_profile(
        &self,
        direction: Direction,
        class: ClassId,
        profile: &ChaosProfile,
    ) -> Result<()> {
        let device = self.devices.for_direction(direction).name();
        let class_str = class.to_string();

        tracing::info!(device = %device, %class, %profile, "applying chaos");

        self.tc.run([
            "class",
            "change",
            "dev",
            device,
            "parent",
            ROOT_HANDLE,
            "classid",
            class_str.as_str(),
            "htb",
            "rate",
            profile.rate.as_str(),
        ])?;

        let mut netem: Vec<String> =
            ["qdisc", "change", "dev", device, "parent", class_str.as_str(), "netem"]
                .into_iter()
                .map(String::from)
                .collect();
        netem.extend(profile.netem_args());
        self.tc.run(netem)?;

        Ok(())
    }

    /// Removes both mirroring hook points from the interface.
    pub fn clear_mirroring(&self) -> Result<()> {
        let presence = self.inspector.qdisc_presence(&self.interface)?;
        let iface = self.interface.as_str();

        if presence.root_htb {
            tracing::info!(interface = %iface, "clearing ingress mirroring");
            self.tc.run(["qdisc", "del", "dev", iface, "root"])?;
        }
        if presence.ingress {
            tracing::info!(interface = %iface, "clearing egress mirroring");
            self.tc.run(["qdisc", "del", "dev", iface, "ingress"])?;
        }
        Ok(())
    }
}

/// Catch-all u32 filter redirecting everything under `parent` to `target`.
fn mirror_filter<'a>(iface: &'a str, parent: &'a str, target: &'a str) -> [&'a str; 23] {
    [
        "filter", "add", "dev", iface, "parent", parent, "protocol", "ip", "prio", "1", "u32",
        "match", "u32", "0", "0", "flowid", "1:1", "action", "mirred", "egress", "redirect", "dev",
        target,
    ]
}

fn attach_netem(tc: &Tc, device: &str, class: ClassId) -> Result<()> {
    let class = class.to_string();
    tc.run(["qdisc", "add", "dev", device, "parent", class.as_str(), "netem"])?;
    Ok(())
}

/// Deletes the u32 rule with `handle` from a shaping device.
pub(crate) fn delete_filter(tc: &Tc, device: &str, handle: &str) -> Result<()> {
    tc.run([
        "filter", "del", "dev", device, "parent", ROOT_HANDLE, "protocol", "ip", "prio", "1",
        "handle", handle, "u32",
    ])?;
    Ok(())
}

/// Deletes a class, and the qdiscs below it, from a shaping device.
pub(crate) fn delete_class(tc: &Tc, device: &str, class: ClassId) -> Result<()> {
    let class = class.to_string();
    tc.run(["class", "del", "dev", device, "parent", ROOT_HANDLE, "classid", class.as_str()])?;
    Ok(())
}
