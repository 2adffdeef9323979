use std::sync::Arc;

use chaos_tc::{
    command::Tc,
    config::ShaperConfig,
    cycle::{PodTarget, Reconciler},
    device::{self, ShapingDevices},
    handle::ClassId,
    profile::ChaosProfile,
};

mod bootstrap;
mod collection;
mod mirroring;
mod profiles;

use kernel::FakeKernel;

/// A bootstrapped node with shaping devices `ifb0` and `ifb1` and the given pod interfaces.
pub(crate) struct Node {
    pub kernel: Arc<FakeKernel>,
    pub tc: Tc,
    pub devices: ShapingDevices,
    pub reconciler: Reconciler,
}

impl Node {
    pub fn new(interfaces: &[&str]) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let kernel = FakeKernel::with_links(interfaces);
        let tc = kernel.tc();
        let devices = ShapingDevices::new(0, 1);
        device::bootstrap(&tc, "ip", &devices).unwrap();

        let reconciler = Reconciler::new(tc.clone(), devices.clone(), ShaperConfig::default());
        kernel.clear_calls();

        Self { kernel, tc, devices, reconciler }
    }
}

pub(crate) fn pod(name: &str, interface: &str, ip: &str, egress: &str, ingress: &str) -> PodTarget {
    PodTarget {
        name: name.to_string(),
        interface: interface.to_string(),
        cidr: chaos_tc::cidr::parse(ip).unwrap(),
        egress: ChaosProfile::parse(egress).unwrap(),
        ingress: ChaosProfile::parse(ingress).unwrap(),
    }
}

pub(crate) fn class(minor: u16) -> ClassId {
    ClassId::root_child(minor)
}
