//! Chaos profiles: the desired fault settings for one direction of a pod's traffic.
//!
//! A profile is written as a comma-separated string. Field 0 is the HTB rate (empty means
//! [`Rate::default`]), every following field is handed to `netem` as-is:
//!
//! ```text
//! 10mbit,delay 100ms 10ms,loss 1%
//! ,duplicate 5%
//! ```
//!
//! An empty string means no fault is desired for that direction.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// The direction of pod traffic a profile applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Traffic leaving the pod. Intercepted on the pod interface's ingress hook.
    Egress,
    /// Traffic entering the pod. Intercepted on the pod interface's root qdisc.
    Ingress,
}

impl Direction {
    /// The u32 selector matching the pod address on the shaping device.
    pub const fn match_selector(self) -> &'static str {
        match self {
            Self::Egress => "src",
            Self::Ingress => "dst",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Egress => f.write_str("egress"),
            Self::Ingress => f.write_str("ingress"),
        }
    }
}

/// Units understood by `tc` rate parsing, compared case-insensitively.
const RATE_UNITS: &[&str] = &[
    "", "bit", "kbit", "mbit", "gbit", "tbit", "bps", "kbps", "mbps", "gbps", "tbps", "kibit",
    "mibit", "gibit", "tibit", "kibps", "mibps", "gibps", "tibps",
];

/// A bandwidth specification in `tc` syntax, e.g. `10mbit` or `4gbps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rate(String);

impl Rate {
    /// Highest rate that `tc` accepts reliably for an HTB class.
    pub const DEFAULT: &'static str = "4gbps";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Rate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidProfile { profile: s.to_string(), reason };

        let s = s.trim();
        let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
        let (number, unit) = s.split_at(split);

        if number.is_empty() || number.parse::<f64>().is_err() {
            return Err(invalid("rate must start with a number"));
        }
        if !RATE_UNITS.iter().any(|u| u.eq_ignore_ascii_case(unit)) {
            return Err(invalid("unknown rate unit"));
        }

        Ok(Self(s.to_string()))
    }
}

/// A parsed chaos profile for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosProfile {
    /// Bandwidth cap of the pod's class.
    pub rate: Rate,
    /// Fault-emulation fields in order, e.g. `["delay 100ms", "loss 1%"]`.
    pub netem: Vec<String>,
}

impl ChaosProfile {
    /// Parses an annotation value. An empty (or blank) value yields `None`: no fault is desired.
    pub fn parse(s: &str) -> Result<Option<Self>> {
        if s.trim().is_empty() {
            return Ok(None);
        }

        let mut fields = s.split(',').map(str::trim);
        let rate = match fields.next() {
            Some("") | None => Rate::default(),
            Some(rate) => rate.parse()?,
        };
        let netem = fields.filter(|f| !f.is_empty()).map(str::to_string).collect();

        Ok(Some(Self { rate, netem }))
    }

    /// The `netem` arguments as individual argv tokens.
    pub fn netem_args(&self) -> Vec<String> {
        self.netem.iter().flat_map(|f| f.split_whitespace()).map(str::to_string).collect()
    }
}

impl fmt::Display for ChaosProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rate)?;
        for field in &self.netem {
            write!(f, ",{field}")?;
        }
        Ok(())
    }
}
