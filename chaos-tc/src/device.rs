//! The two node-wide shaping devices.
//!
//! Traffic of every pod is mirrored onto one of two `ifb` devices, one per direction, where the
//! per-CIDR classes and fault-emulation qdiscs live. Bootstrapping them is a one-time step at
//! agent start; a failure there is fatal to the agent.

use std::{fmt, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    command::Tc,
    handle::ROOT_HANDLE,
    inspect::Inspector,
    profile::Direction,
    Result,
};

/// Prefix of the intermediate functional block devices.
pub const IFB_PREFIX: &str = "ifb";

/// One shared shaping device.
///
/// Every [`Shaper`](crate::shaper::Shaper) mutates the class and filter namespace of the same
/// devices, and allocation is read-then-write against kernel state. The device lock serializes
/// those sequences.
#[derive(Debug)]
pub struct ShapingDevice {
    index: u32,
    name: String,
    lock: Mutex<()>,
}

impl ShapingDevice {
    pub fn new(index: u32) -> Self {
        Self { index, name: format!("{IFB_PREFIX}{index}"), lock: Mutex::new(()) }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter the device's critical section.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

impl fmt::Display for ShapingDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The pair of shaping devices. The first carries pod egress, the second pod ingress.
#[derive(Debug, Clone)]
pub struct ShapingDevices {
    first: Arc<ShapingDevice>,
    second: Arc<ShapingDevice>,
}

impl ShapingDevices {
    pub fn new(first: u32, second: u32) -> Self {
        Self {
            first: Arc::new(ShapingDevice::new(first)),
            second: Arc::new(ShapingDevice::new(second)),
        }
    }

    pub fn first(&self) -> &ShapingDevice {
        &self.first
    }

    pub fn second(&self) -> &ShapingDevice {
        &self.second
    }

    pub fn for_direction(&self, direction: Direction) -> &ShapingDevice {
        match direction {
            Direction::Egress => &self.first,
            Direction::Ingress => &self.second,
        }
    }

    /// Devices paired with the direction they carry.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &ShapingDevice)> {
        [(Direction::Egress, &*self.first), (Direction::Ingress, &*self.second)].into_iter()
    }
}

/// Makes sure both shaping devices exist, are up and carry a root HTB qdisc. Idempotent.
///
/// `ip` is the program used for link management, usually `ip`.
pub fn bootstrap(tc: &Tc, ip: &str, devices: &ShapingDevices) -> Result<()> {
    let inspector = Inspector::new(tc.clone());
    let ip_link = |args: &[&str]| -> Result<()> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        tracing::debug!("running: {ip} {}", args.join(" "));
        tc.executor().execute(ip, &args)?;
        Ok(())
    };

    for (direction, device) in devices.iter() {
        let name = device.name();
        let _guard = device.lock();

        if ip_link(&["link", "show", "dev", name]).is_err() {
            tracing::info!(device = %name, "creating shaping device");
            ip_link(&["link", "add", name, "type", "ifb"])?;
        }
        ip_link(&["link", "set", "dev", name, "up"])?;

        if !inspector.qdisc_presence(name)?.root_htb {
            tracing::info!(device = %name, %direction, "installing root htb on shaping device");
            tc.run_tolerant(["qdisc", "del", "dev", name, "root"]);
            tc.run(["qdisc", "add", "dev", name, "root", "handle", ROOT_HANDLE, "htb"])?;
        }
    }

    Ok(())
}
