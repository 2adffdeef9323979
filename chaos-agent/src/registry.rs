//! Resolution of a pod's host-side interface.
//!
//! Calico names the host end of a pod's veth pair `cali` followed by 11 hex digits and records it
//! in the workload endpoint it keeps in etcd.

use std::sync::{Arc, OnceLock};

use chaos_tc::command::{self, Executor};
use regex::Regex;

use crate::pods::PodRecord;

const INTERFACE_PATTERN: &str = "cali[a-f0-9]{11}";

/// Failure to resolve a pod interface.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to query registry: {0}")]
    Execution(#[from] command::Error),
    #[error("no interface found for pod {pod}")]
    NoInterface { pod: String },
}

/// Finds the host-side interface of a pod.
pub trait InterfaceResolver: Send + Sync + 'static {
    fn resolve(&self, pod: &PodRecord) -> Result<String, RegistryError>;
}

/// Looks interfaces up in Calico's etcd (v2 keys API) with `curl`.
pub struct EtcdResolver {
    endpoint: String,
    curl: String,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for EtcdResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdResolver")
            .field("endpoint", &self.endpoint)
            .field("curl", &self.curl)
            .finish_non_exhaustive()
    }
}

impl EtcdResolver {
    pub fn new(endpoint: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self { endpoint: endpoint.into(), curl: "curl".to_string(), executor }
    }

    pub fn with_curl(mut self, curl: impl Into<String>) -> Self {
        self.curl = curl.into();
        self
    }

    /// Key URL of the pod's `eth0` workload endpoint.
    pub fn endpoint_url(&self, pod: &PodRecord) -> String {
        format!(
            "{}/v2/keys/calico/v1/host/{}/workload/k8s/{}.{}/endpoint/eth0",
            self.endpoint.trim_end_matches('/'),
            pod.host_ip,
            pod.namespace,
            pod.name
        )
    }
}

impl InterfaceResolver for EtcdResolver {
    fn resolve(&self, pod: &PodRecord) -> Result<String, RegistryError> {
        let args = vec!["-sL".to_string(), self.endpoint_url(pod)];
        let output = self.executor.execute(&self.curl, &args)?;

        let interface = extract_interface(&output.stdout)
            .ok_or_else(|| RegistryError::NoInterface { pod: pod.key() })?;

        tracing::debug!(pod = %pod.key(), %interface, "resolved pod interface");
        Ok(interface.to_string())
    }
}

/// The first Calico interface name in `data`.
pub fn extract_interface(data: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN
        .get_or_init(|| Regex::new(INTERFACE_PATTERN).expect("interface pattern is valid"))
        .find(data)
        .map(|m| m.as_str())
}
