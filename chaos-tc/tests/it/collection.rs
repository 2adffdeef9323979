use chaos_tc::{gc::GarbageCollector, Error};
use rustc_hash::FxHashSet;

use crate::{class, pod, Node};

const A: &str = "cali0000000000a";
const B: &str = "cali0000000000b";
const C: &str = "cali0000000000c";

#[test]
fn only_stale_pods_are_collected() {
    let node = Node::new(&[A, B, C]);
    let a = pod("a", A, "10.3.0.1", "1mbit", "1mbit");
    let b = pod("b", B, "10.3.0.2", "2mbit", "2mbit");
    let c = pod("c", C, "10.3.0.3", "3mbit", "3mbit");

    assert!(node.reconciler.run_cycle(&[a, b.clone(), c.clone()]).is_clean());
    let b_class = node.kernel.class_of("ifb0", "10.3.0.2/32").unwrap();
    let c_class = node.kernel.class_of("ifb0", "10.3.0.3/32").unwrap();

    let report = node.reconciler.run_cycle(&[b, c]);

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.gc.removed.len(), 2);
    assert!(report.gc.removed.iter().all(|r| r.cidr == "10.3.0.1/32".parse().unwrap()));

    for dev in ["ifb0", "ifb1"] {
        assert_eq!(node.kernel.class_of(dev, "10.3.0.1/32"), None);
        assert_eq!(node.kernel.filters(dev).len(), 2);
        assert_eq!(node.kernel.classes(dev).len(), 2);
    }
    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.2/32"), Some(b_class));
    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.3/32"), Some(c_class));
}

#[test]
fn failing_pod_is_not_collected() {
    let node = Node::new(&[A, B]);
    let pods = [pod("a", A, "10.3.0.1", "1mbit", ""), pod("b", B, "10.3.0.2", "2mbit", "")];
    assert!(node.reconciler.run_cycle(&pods).is_clean());

    let change = "tc class change dev ifb0 parent 1: classid 1:1 htb rate 1mbit";
    node.kernel.fail(change);
    let report = node.reconciler.run_cycle(&pods);

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].pod, "a");
    assert!(report.gc.removed.is_empty());
    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.1/32"), Some(class(1)));
}

#[test]
fn cleared_direction_is_collected() {
    let node = Node::new(&[A]);
    node.reconciler.run_cycle(&[pod("a", A, "10.3.0.1", "1mbit", "1mbit")]);

    let report = node.reconciler.run_cycle(&[pod("a", A, "10.3.0.1", "1mbit", "")]);

    assert_eq!(report.gc.removed.len(), 1);
    assert!(node.kernel.filters("ifb1").is_empty());
    assert!(node.kernel.classes("ifb1").is_empty());
    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.1/32"), Some(class(1)));
}

#[test]
fn freed_ids_are_reused() {
    let node = Node::new(&[A, B, C]);
    node.reconciler.run_cycle(&[
        pod("a", A, "10.3.0.1", "1mbit", ""),
        pod("b", B, "10.3.0.2", "1mbit", ""),
    ]);
    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.2/32"), Some(class(2)));

    node.reconciler.run_cycle(&[pod("b", B, "10.3.0.2", "1mbit", "")]);
    node.reconciler.run_cycle(&[
        pod("b", B, "10.3.0.2", "1mbit", ""),
        pod("c", C, "10.3.0.3", "1mbit", ""),
    ]);

    assert_eq!(node.kernel.class_of("ifb0", "10.3.0.3/32"), Some(class(1)));
}

#[test]
fn reset_requires_a_filter() {
    let node = Node::new(&[]);
    let gc = GarbageCollector::new(node.tc.clone(), node.devices.clone());

    let err = gc.reset(&"10.3.0.9/32".parse().unwrap(), node.devices.first()).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let report = gc.delete_extra_chaos(&FxHashSet::default(), &FxHashSet::default());
    assert!(report.is_clean());
    assert!(report.removed.is_empty());
}
