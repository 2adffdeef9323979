//! Node agent for per-pod network chaos.
//!
//! Every sync interval the agent reads the pods scheduled on its node, keeps the ones selected
//! for chaos, resolves their host-side interfaces and hands them to
//! [`chaos_tc::cycle::Reconciler`], which converges the kernel's traffic-control state.
//!
//! Pods opt in through two annotations, [`pods::INGRESS_ANNOTATION`] and
//! [`pods::EGRESS_ANNOTATION`], each holding a profile such as `10mbit,delay 100ms,loss 1%`.

pub mod agent;
pub mod cli;
pub mod config;
pub mod pods;
pub mod registry;
