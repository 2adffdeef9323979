use std::{path::PathBuf, time::Duration};

use chaos_tc::{config::ShaperConfig, device::ShapingDevices, profile::Rate};

use crate::{
    cli::Options,
    pods::{LabelSelector, ParseSelectorError},
};

/// A setting that passed the command line parser but cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("shaping device indices must differ, got {0} twice")]
    SameDevices(u32),
    #[error("sync duration must be positive")]
    ZeroSyncDuration,
    #[error("invalid safety rate: {0}")]
    SafetyRate(#[source] chaos_tc::Error),
    #[error("class id bound must be at least 2, got {0}")]
    ClassIdBound(u16),
    #[error(transparent)]
    Selector(#[from] ParseSelectorError),
}

/// Validated agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// JSON pod listing.
    pub pods: PathBuf,
    /// Calico etcd, unset when interfaces come from the listing only.
    pub etcd_endpoint: Option<String>,
    pub selector: LabelSelector,
    pub sync_interval: Duration,
    pub first_ifb: u32,
    pub second_ifb: u32,
    pub shaper: ShaperConfig,
    pub tc_path: String,
    pub ip_path: String,
    pub curl_path: String,
}

impl AgentConfig {
    pub fn devices(&self) -> ShapingDevices {
        ShapingDevices::new(self.first_ifb, self.second_ifb)
    }
}

impl TryFrom<&Options> for AgentConfig {
    type Error = ConfigError;

    fn try_from(opts: &Options) -> Result<Self, Self::Error> {
        if opts.first_ifb == opts.second_ifb {
            return Err(ConfigError::SameDevices(opts.first_ifb));
        }
        if opts.sync_duration == 0 {
            return Err(ConfigError::ZeroSyncDuration);
        }
        if opts.class_id_bound < 2 {
            return Err(ConfigError::ClassIdBound(opts.class_id_bound));
        }
        let safety_rate: Rate = opts.safety_rate.parse().map_err(ConfigError::SafetyRate)?;

        let shaper = ShaperConfig::default()
            .with_safety_rate(safety_rate)
            .with_class_id_bound(opts.class_id_bound)
            .with_mirror_queue_limit(opts.mirror_queue_limit);

        Ok(Self {
            pods: opts.pods.clone(),
            etcd_endpoint: opts.etcd_endpoint.clone().filter(|e| !e.trim().is_empty()),
            selector: opts.label_selector.parse()?,
            sync_interval: Duration::from_secs(opts.sync_duration),
            first_ifb: opts.first_ifb,
            second_ifb: opts.second_ifb,
            shaper,
            tc_path: opts.tc_path.clone(),
            ip_path: opts.ip_path.clone(),
            curl_path: opts.curl_path.clone(),
        })
    }
}
