use chaos_tc::device::{self, ShapingDevices};

use crate::kernel::FakeKernel;

#[test]
fn shaping_devices_are_created_once() {
    let kernel = FakeKernel::with_links(&["eth0"]);
    let tc = kernel.tc();
    let devices = ShapingDevices::new(0, 1);

    device::bootstrap(&tc, "ip", &devices).unwrap();

    for dev in ["ifb0", "ifb1"] {
        assert!(kernel.is_up(dev), "{dev} down");
        assert!(kernel.has_root_htb(dev), "{dev} without root htb");
        assert!(kernel.classes(dev).is_empty());
    }

    let snapshot = kernel.snapshot();
    kernel.clear_calls();
    device::bootstrap(&tc, "ip", &devices).unwrap();

    assert_eq!(kernel.snapshot(), snapshot);
    assert_eq!(kernel.mutations(), vec!["ip link set dev ifb0 up", "ip link set dev ifb1 up"]);
}

#[test]
fn existing_devices_are_kept() {
    let kernel = FakeKernel::with_links(&["ifb3"]);
    let tc = kernel.tc();

    device::bootstrap(&tc, "ip", &ShapingDevices::new(3, 4)).unwrap();

    let mutations = kernel.mutations();
    assert!(!mutations.iter().any(|c| c == "ip link add ifb3 type ifb"));
    assert!(mutations.iter().any(|c| c == "ip link add ifb4 type ifb"));
    assert!(kernel.has_root_htb("ifb3"));
    assert!(kernel.has_root_htb("ifb4"));
}

#[test]
fn refused_device_creation_is_fatal() {
    let kernel = FakeKernel::with_links(&[]);
    kernel.fail("ip link add ifb1 type ifb");

    let err = device::bootstrap(&kernel.tc(), "ip", &ShapingDevices::new(0, 1)).unwrap_err();
    assert!(matches!(err, chaos_tc::Error::Execution(_)));
}
