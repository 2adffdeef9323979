//! Command line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "kube-chaos")]
#[command(author, version, about = "Per-pod network fault injection through Linux traffic control")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub options: Options,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// The subcommand, `run` when none is given.
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Bootstrap the shaping devices, then reconcile every sync interval until interrupted
    Run,
    /// Bootstrap the shaping devices and run a single cycle
    Once,
    /// Only create and initialize the shaping devices
    Bootstrap,
    /// Remove the mirroring hooks from a pod interface
    Clear {
        /// Pod interface, e.g. cali67801d38217
        interface: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Options {
    /// JSON listing of the pods on this node
    #[arg(
        long,
        env = "KUBE_CHAOS_PODS",
        default_value = "/var/run/kube-chaos/pods.json",
        global = true
    )]
    pub pods: PathBuf,

    /// Calico etcd endpoint used to resolve pod interfaces, e.g. http://10.96.232.136:6666
    #[arg(long, global = true)]
    pub etcd_endpoint: Option<String>,

    /// Only pods with these labels get chaos, e.g. chaos=on
    #[arg(long, default_value = "", global = true)]
    pub label_selector: String,

    /// Seconds between two cycles
    #[arg(long, default_value_t = 10, global = true)]
    pub sync_duration: u64,

    /// Index of the ifb device shaping pod egress
    #[arg(long, default_value_t = 0, global = true)]
    pub first_ifb: u32,

    /// Index of the ifb device shaping pod ingress
    #[arg(long, default_value_t = 1, global = true)]
    pub second_ifb: u32,

    /// Rate of new classes before a profile is applied
    #[arg(long, default_value = "4gbps", global = true)]
    pub safety_rate: String,

    /// Exclusive upper bound of class ids per shaping device
    #[arg(long, default_value_t = 10_000, global = true)]
    pub class_id_bound: u16,

    /// Packet limit of the mirror queue on pod interfaces
    #[arg(long, default_value_t = 1_600, global = true)]
    pub mirror_queue_limit: u32,

    #[arg(long, default_value = "tc", global = true)]
    pub tc_path: String,

    #[arg(long, default_value = "ip", global = true)]
    pub ip_path: String,

    #[arg(long, default_value = "curl", global = true)]
    pub curl_path: String,
}
