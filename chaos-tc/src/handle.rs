//! TC handle representation and the numbering scheme used on pod interfaces and shaping devices.
//!
//! TC handles are 32-bit values split into major:minor (16:16 bits). `tc` prints and parses both
//! halves in hexadecimal, so class `1:10` on the command line is minor 16, and minor 10 is
//! printed as `1:a`. [`ClassId`] follows the same convention.
//!
//! | Component                      | Handle   |
//! |--------------------------------|----------|
//! | HTB root (pod iface and ifb)   | `1:`     |
//! | Mirror class on pod iface      | `1:1`    |
//! | Mirror queue on pod iface      | `2:`     |
//! | Ingress hook on pod iface      | `ffff:`  |
//! | Per-CIDR class on ifb          | `1:<id>` |

use std::{fmt, str::FromStr};

/// Major number of the root HTB qdisc, on both pod interfaces and shaping devices.
pub const ROOT_MAJOR: u16 = 1;

/// Root HTB qdisc handle as accepted by `tc`.
pub const ROOT_HANDLE: &str = "1:";

/// Handle of the `pfifo` queue below the mirror class on a pod interface.
pub const MIRROR_QUEUE_HANDLE: &str = "2:";

/// Handle of the ingress hook qdisc.
pub const INGRESS_HANDLE: &str = "ffff:";

/// Class on a pod interface that all mirrored traffic flows through.
pub const MIRROR_CLASS: ClassId = ClassId::new(ROOT_MAJOR, 1);

/// A traffic class identifier, `major:minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId {
    pub major: u16,
    pub minor: u16,
}

impl ClassId {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// A class under the root HTB qdisc of a shaping device.
    pub const fn root_child(minor: u16) -> Self {
        Self::new(ROOT_MAJOR, minor)
    }

    /// The class as a 32-bit kernel handle.
    pub const fn as_u32(self) -> u32 {
        (self.major as u32) << 16 | self.minor as u32
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid class id {0:?}")]
pub struct ParseClassIdError(pub String);

impl FromStr for ClassId {
    type Err = ParseClassIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseClassIdError(s.to_string());

        let (major, minor) = s.split_once(':').ok_or_else(err)?;
        if major.is_empty() || minor.is_empty() {
            return Err(err());
        }
        let major = u16::from_str_radix(major, 16).map_err(|_| err())?;
        let minor = u16::from_str_radix(minor, 16).map_err(|_| err())?;

        Ok(Self { major, minor })
    }
}
