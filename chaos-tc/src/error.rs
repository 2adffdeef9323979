use ipnet::Ipv4Net;

use crate::command;

/// Errors of the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The control-plane tool could not run or returned a failure.
    #[error("execution failure: {0}")]
    Execution(#[from] command::Error),
    /// A listing line did not have the expected shape.
    #[error("unexpected tc output ({reason}): {line:?}")]
    Parse { reason: &'static str, line: String },
    /// Every class id below the bound is taken on the device.
    #[error("exhausted class id space on {device} (bound {bound})")]
    AllocationExhausted { device: String, bound: u16 },
    /// No filter on the device matches the CIDR.
    #[error("no filter for {cidr} on {device}")]
    NotFound { cidr: Ipv4Net, device: String },
    /// A profile annotation that `tc` would not accept.
    #[error("invalid chaos profile {profile:?}: {reason}")]
    InvalidProfile { profile: String, reason: &'static str },
    /// Neither an IPv4 address nor an IPv4 CIDR.
    #[error("invalid cidr {0:?}")]
    InvalidCidr(String),
}

impl Error {
    pub(crate) fn parse(reason: &'static str, line: impl Into<String>) -> Self {
        Self::Parse { reason, line: line.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
