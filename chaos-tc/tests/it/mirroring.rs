use chaos_tc::{config::ShaperConfig, profile::ChaosProfile, shaper::Shaper};

use crate::{class, Node};

const IFACE: &str = "cali1a2b3c4d5e6";

fn shaper(node: &Node) -> Shaper {
    Shaper::new(node.tc.clone(), node.devices.clone(), ShaperConfig::default(), IFACE)
}

#[test]
fn both_directions_are_mirrored_once() {
    let node = Node::new(&[IFACE]);
    let cidr = "10.244.0.5/32".parse().unwrap();
    let profile = ChaosProfile::parse("10mbit").unwrap();

    assert!(shaper(&node).reconcile(&cidr, profile.as_ref(), profile.as_ref()).is_empty());

    assert!(node.kernel.has_root_htb(IFACE));
    assert!(node.kernel.has_ingress(IFACE));
    assert_eq!(node.kernel.redirects(IFACE, "1:"), vec!["ifb1"]);
    assert_eq!(node.kernel.redirects(IFACE, "ffff:"), vec!["ifb0"]);
    assert_eq!(node.kernel.classes(IFACE), vec![class(1)]);

    // The class created while mirroring belongs to the pod's CIDR.
    assert_eq!(node.kernel.filters("ifb0"), vec![(cidr, class(1))]);
    assert_eq!(node.kernel.filters("ifb1"), vec![(cidr, class(1))]);
    assert_eq!(node.kernel.netem("ifb0", class(1)), Some(vec![]));

    let snapshot = node.kernel.snapshot();
    node.kernel.clear_calls();

    assert!(shaper(&node).reconcile(&cidr, profile.as_ref(), profile.as_ref()).is_empty());

    assert_eq!(node.kernel.snapshot(), snapshot);
    assert!(node.kernel.mutations().is_empty());
}

#[test]
fn directions_are_independent() {
    let node = Node::new(&[IFACE]);
    let cidr = "10.244.0.5/32".parse().unwrap();
    let profile = ChaosProfile::parse(",loss 1%").unwrap();

    let mut shaper = shaper(&node);
    assert!(shaper.reconcile_ingress_mirroring(&cidr).unwrap());
    assert!(!node.kernel.has_ingress(IFACE));
    assert!(node.kernel.filters("ifb0").is_empty());

    assert!(shaper.reconcile(&cidr, profile.as_ref(), None).is_empty());
    assert!(node.kernel.has_ingress(IFACE));
    assert_eq!(node.kernel.filters("ifb0"), vec![(cidr, class(1))]);
    assert_eq!(shaper.cache().egress, Some(class(1)));
    assert_eq!(shaper.cache().ingress, Some(class(1)));
}

#[test]
fn hooks_are_cleared() {
    let node = Node::new(&[IFACE]);
    let cidr = "10.244.0.5/32".parse().unwrap();
    let profile = ChaosProfile::parse("1mbit").unwrap();

    let mut shaper = shaper(&node);
    assert!(shaper.reconcile(&cidr, profile.as_ref(), profile.as_ref()).is_empty());
    shaper.clear_mirroring().unwrap();

    assert!(!node.kernel.has_root_htb(IFACE));
    assert!(!node.kernel.has_ingress(IFACE));
    assert!(node.kernel.redirects(IFACE, "ffff:").is_empty());

    // Clearing twice is harmless.
    shaper.clear_mirroring().unwrap();
}

#[test]
fn missing_interface_fails() {
    let node = Node::new(&[]);
    let cidr = "10.244.0.5/32".parse().unwrap();
    let profile = ChaosProfile::parse("1mbit").unwrap();

    let failures = shaper(&node).reconcile(&cidr, profile.as_ref(), None);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].error, chaos_tc::Error::Execution(_)));
    assert!(node.kernel.filters("ifb0").is_empty());
}
