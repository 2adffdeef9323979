//! Traffic-control reconciliation engine for per-pod network chaos.
//!
//! Given, for every pod on a node, its interface, its CIDR and the faults desired in each
//! direction, the engine converges kernel `tc` state so that:
//!
//! - both directions of the pod's traffic are mirrored onto two shared `ifb` shaping devices
//!   (see [`shaper`]),
//! - each shaping device carries one HTB class with a `netem` qdisc per shaped CIDR, steered by a
//!   u32 filter, with the requested rate and faults applied,
//! - classes and filters of CIDRs that are no longer desired are removed (see [`gc`]).
//!
//! All kernel access goes through an injected [`Executor`](command::Executor) wrapped in
//! [`Tc`](command::Tc). Reads parse `tc ... show` listings strictly ([`inspect`]); every mutation
//! is preceded by a read, so repeating a cycle is harmless and a partially applied cycle is
//! completed by the next one.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chaos_tc::{
//!     command::{Runner, Tc},
//!     config::ShaperConfig,
//!     cycle::{PodTarget, Reconciler},
//!     device::{self, ShapingDevices},
//!     profile::ChaosProfile,
//! };
//!
//! let tc = Tc::new(Arc::new(Runner));
//! let devices = ShapingDevices::new(0, 1);
//! device::bootstrap(&tc, "ip", &devices)?;
//!
//! let pod = PodTarget {
//!     name: "default/nginx".to_string(),
//!     interface: "cali1234567890a".to_string(),
//!     cidr: chaos_tc::cidr::parse("10.244.1.7")?,
//!     egress: ChaosProfile::parse("10mbit,delay 100ms")?,
//!     ingress: None,
//! };
//!
//! let report = Reconciler::new(tc, devices, ShaperConfig::default()).run_cycle(&[pod]);
//! assert!(report.is_clean());
//! # Ok::<(), chaos_tc::Error>(())
//! ```

#![doc(issue_tracker_base_url = "https://github.com/huanwei/kube-chaos/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod alloc;
pub mod cidr;
pub mod command;
pub mod config;
pub mod cycle;
pub mod device;
pub mod gc;
pub mod handle;
pub mod inspect;
pub mod profile;
pub mod shaper;

mod error;
pub use error::{Error, Result};
