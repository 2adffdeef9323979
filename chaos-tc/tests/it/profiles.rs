use crate::{class, pod, Node};

const IFACE: &str = "cali0f0f0f0f0f0";

fn strings(args: &[&str]) -> Option<Vec<String>> {
    Some(args.iter().map(|s| s.to_string()).collect())
}

#[test]
fn empty_rate_uses_default() {
    let node = Node::new(&[IFACE]);
    let report = node.reconciler.run_cycle(&[pod("p", IFACE, "10.2.0.1", ",delay 100ms", "")]);

    assert!(report.is_clean());
    assert_eq!(node.kernel.class_rate("ifb0", class(1)).as_deref(), Some("4gbps"));
    assert_eq!(node.kernel.netem("ifb0", class(1)), strings(&["delay", "100ms"]));
    assert!(node.kernel.classes("ifb1").is_empty());
}

#[test]
fn empty_profiles_touch_nothing() {
    let node = Node::new(&[IFACE]);
    let report = node.reconciler.run_cycle(&[pod("p", IFACE, "10.2.0.1", "", "")]);

    assert!(report.is_clean());
    assert!(report.reconciled.is_empty());
    assert!(node.kernel.mutations().is_empty());
    assert!(!node.kernel.has_root_htb(IFACE));
    assert!(!node.kernel.has_ingress(IFACE));
}

#[test]
fn profile_change_updates_the_same_class() {
    let node = Node::new(&[IFACE]);

    let profile = "10mbit,delay 100ms 10ms,loss 1%";
    node.reconciler.run_cycle(&[pod("p", IFACE, "10.2.0.1", "", profile)]);
    assert_eq!(node.kernel.class_rate("ifb1", class(1)).as_deref(), Some("10mbit"));
    assert_eq!(
        node.kernel.netem("ifb1", class(1)),
        strings(&["delay", "100ms", "10ms", "loss", "1%"])
    );

    let report =
        node.reconciler.run_cycle(&[pod("p", IFACE, "10.2.0.1", "", "1mbit,duplicate 5%")]);

    assert!(report.is_clean());
    assert_eq!(node.kernel.classes("ifb1"), vec![class(1)]);
    assert_eq!(node.kernel.class_rate("ifb1", class(1)).as_deref(), Some("1mbit"));
    assert_eq!(node.kernel.netem("ifb1", class(1)), strings(&["duplicate", "5%"]));
}

#[test]
fn reapplying_a_profile_is_stable() {
    let node = Node::new(&[IFACE]);
    let pods = [pod("p", IFACE, "10.2.0.1", "2mbit,corrupt 0.1%", "3mbit,reorder 25% 50%")];

    node.reconciler.run_cycle(&pods);
    let snapshot = node.kernel.snapshot();
    node.kernel.clear_calls();

    assert!(node.reconciler.run_cycle(&pods).is_clean());

    assert_eq!(node.kernel.snapshot(), snapshot);
    // Only in-place updates on a converged node.
    assert!(node.kernel.mutations().iter().all(|c| c.contains(" change ")));
}
