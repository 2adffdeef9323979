//! The desired state: pods on this node and their chaos annotations.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

/// Annotation holding the profile for traffic entering the pod.
pub const INGRESS_ANNOTATION: &str = "kubernetes.io/ingress-chaos";
/// Annotation holding the profile for traffic leaving the pod.
pub const EGRESS_ANNOTATION: &str = "kubernetes.io/egress-chaos";

/// Failure to read the pod listing.
#[derive(Debug, thiserror::Error)]
pub enum PodSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A pod as seen by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PodRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub host_ip: String,
    /// Unset until the pod has been scheduled and networked.
    #[serde(default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Host-side interface of the pod, when the producer of the listing knows it.
    #[serde(default)]
    pub interface: Option<String>,
}

impl PodRecord {
    /// `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The raw ingress and egress profiles. A missing annotation reads as an empty profile.
    pub fn chaos(&self) -> (&str, &str) {
        (self.annotation(INGRESS_ANNOTATION), self.annotation(EGRESS_ANNOTATION))
    }

    fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map_or("", String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    pods: Vec<PodRecord>,
}

/// Provides the current pod listing, once per cycle.
pub trait PodSource: Send + Sync + 'static {
    fn list(&self) -> Result<Vec<PodRecord>, PodSourceError>;
}

/// Reads the listing from a JSON file kept up to date by an external collaborator:
///
/// ```json
/// {"pods": [{"name": "web-0", "namespace": "default", "host_ip": "10.10.102.80",
///            "pod_ip": "192.168.0.10", "labels": {"chaos": "on"},
///            "annotations": {"kubernetes.io/egress-chaos": "10mbit,delay 100ms"}}]}
/// ```
#[derive(Debug, Clone)]
pub struct FilePodSource {
    path: PathBuf,
}

impl FilePodSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PodSource for FilePodSource {
    fn list(&self) -> Result<Vec<PodRecord>, PodSourceError> {
        let data = fs::read_to_string(&self.path)
            .map_err(|source| PodSourceError::Io { path: self.path.clone(), source })?;
        let list: PodList = serde_json::from_str(&data)
            .map_err(|source| PodSourceError::Json { path: self.path.clone(), source })?;

        tracing::debug!(path = %self.path.display(), pods = list.pods.len(), "read pod listing");
        Ok(list.pods)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid label selector {0:?}, expected key=value[,key=value]")]
pub struct ParseSelectorError(String);

/// Equality-based label selector, `k=v[,k=v]`. The empty selector matches every pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether every requirement holds in `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl FromStr for LabelSelector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();

        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| ParseSelectorError(s.to_string()))?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || key.contains(['=', '!']) || value.contains('=') {
                return Err(ParseSelectorError(s.to_string()));
            }
            requirements.push((key.to_string(), value.to_string()));
        }

        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
