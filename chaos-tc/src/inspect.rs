//! Structured views over `tc ... show` listings.
//!
//! Every listing line is checked against the exact shape `tc` prints for it. Anything else is a
//! [`Error::Parse`]: a partial read of kernel state could make the engine delete or reuse the wrong
//! objects, so there is no best-effort fallback.

use ipnet::Ipv4Net;
use rustc_hash::FxHashSet;

use crate::{
    cidr,
    command::Tc,
    handle::{ClassId, INGRESS_HANDLE, ROOT_HANDLE},
    Error, Result,
};

/// Field count of an HTB class line without a leaf qdisc:
///
/// ```text
/// class htb 1:1 root prio 0 rate 4Gbit ceil 4Gbit burst 1600b cburst 1600b
/// ```
const CLASS_FIELDS: usize = 14;
/// Field count of an HTB class line with a `leaf <handle>` pair.
const CLASS_FIELDS_WITH_LEAF: usize = 16;

/// Field count of a u32 rule header, once the optional `chain <n>` pair and hardware flag are
/// stripped:
///
/// ```text
/// filter parent 1: protocol ip pref 1 u32 fh 800::800 order 2048 key ht 800 bkt 0 flowid 1:5
/// ```
const FILTER_HEADER_FIELDS: usize = 19;

/// A u32 rule on a shaping device steering one CIDR into one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRecord {
    pub cidr: Ipv4Net,
    pub class: ClassId,
    /// Filter handle, e.g. `800::800`, needed to delete exactly this rule.
    pub handle: String,
}

/// A qdisc line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdiscRecord {
    pub kind: String,
    pub handle: String,
    /// `None` for the root qdisc.
    pub parent: Option<String>,
}

/// Which of the mirroring hook points are already installed on a pod interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QdiscPresence {
    pub root_htb: bool,
    pub ingress: bool,
}

/// Reads kernel traffic-control state through `tc`.
#[derive(Debug, Clone)]
pub struct Inspector {
    tc: Tc,
}

impl Inspector {
    pub fn new(tc: Tc) -> Self {
        Self { tc }
    }

    /// Ids of every class on `device`.
    pub fn list_classes(&self, device: &str) -> Result<FxHashSet<ClassId>> {
        parse_classes(&self.tc.run(["class", "show", "dev", device])?)
    }

    /// Whether `class` is present on `device`.
    pub fn class_exists(&self, device: &str, class: ClassId) -> Result<bool> {
        let exists = self.list_classes(device)?.contains(&class);
        if exists {
            tracing::debug!(%device, %class, "class already present");
        }
        Ok(exists)
    }

    /// Every CIDR rule on `device`, in listing order.
    pub fn list_filters(&self, device: &str) -> Result<Vec<FilterRecord>> {
        parse_filters(&self.tc.run(["filter", "show", "dev", device])?)
    }

    /// The rule matching `cidr` on `device`, if any.
    pub fn find_filter(&self, device: &str, cidr: &Ipv4Net) -> Result<Option<FilterRecord>> {
        Ok(self.list_filters(device)?.into_iter().find(|f| f.cidr == *cidr))
    }

    /// CIDRs currently referenced by rules on `device`, without duplicates.
    pub fn filter_cidrs(&self, device: &str) -> Result<Vec<Ipv4Net>> {
        let mut seen = FxHashSet::default();
        Ok(self
            .list_filters(device)?
            .into_iter()
            .map(|f| f.cidr)
            .filter(|cidr| seen.insert(*cidr))
            .collect())
    }

    /// Every qdisc on `device`, in listing order.
    pub fn list_qdiscs(&self, device: &str) -> Result<Vec<QdiscRecord>> {
        parse_qdiscs(&self.tc.run(["qdisc", "show", "dev", device])?)
    }

    pub fn qdisc_presence(&self, interface: &str) -> Result<QdiscPresence> {
        let mut presence = QdiscPresence::default();
        for qdisc in self.list_qdiscs(interface)? {
            if qdisc.kind == "htb" && qdisc.handle == ROOT_HANDLE && qdisc.parent.is_none() {
                presence.root_htb = true;
            }
            if qdisc.kind == "ingress" && qdisc.handle == INGRESS_HANDLE {
                presence.ingress = true;
            }
        }
        Ok(presence)
    }

    /// Whether a `netem` qdisc hangs directly below `class` on `device`.
    pub fn netem_attached(&self, device: &str, class: ClassId) -> Result<bool> {
        let parent = class.to_string();
        Ok(self
            .list_qdiscs(device)?
            .iter()
            .any(|q| q.kind == "netem" && q.parent.as_deref() == Some(parent.as_str())))
    }
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

pub(crate) fn parse_classes(output: &str) -> Result<FxHashSet<ClassId>> {
    let mut classes = FxHashSet::default();
    for line in non_empty_lines(output) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != CLASS_FIELDS && parts.len() != CLASS_FIELDS_WITH_LEAF {
            return Err(Error::parse("class line field count", line));
        }
        if parts[0] != "class" {
            return Err(Error::parse("class line prefix", line));
        }
        let class = parts[2].parse().map_err(|_| Error::parse("class id", line))?;
        classes.insert(class);
    }
    Ok(classes)
}

pub(crate) fn parse_filters(output: &str) -> Result<Vec<FilterRecord>> {
    let mut records = Vec::new();
    let mut header: Option<&str> = None;

    for line in non_empty_lines(output) {
        if line.starts_with("filter ") {
            header = Some(line);
            continue;
        }
        if !line.starts_with("match ") {
            return Err(Error::parse("unrecognized filter line", line));
        }

        // match 0a000001/ffffffff at 16
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 4 || parts[2] != "at" {
            return Err(Error::parse("match line shape", line));
        }
        let header = header.ok_or_else(|| Error::parse("match line without filter", line))?;
        let (handle, class) = parse_filter_header(header)?;

        records.push(FilterRecord { cidr: cidr::decode(parts[1])?, class, handle });
    }

    Ok(records)
}

fn parse_filter_header(line: &str) -> Result<(String, ClassId)> {
    let mut parts: Vec<&str> = line.split_whitespace().collect();

    // Newer iproute2 prints `chain <n>` after the classifier kind and a hardware offload flag
    // at the end.
    if parts.get(8) == Some(&"chain") {
        if parts.len() < 10 {
            return Err(Error::parse("filter chain", line));
        }
        parts.drain(8..10);
    }
    if matches!(parts.last(), Some(&"not_in_hw") | Some(&"in_hw")) {
        parts.pop();
    }

    if parts.len() != FILTER_HEADER_FIELDS {
        return Err(Error::parse("filter line field count", line));
    }
    if parts[0] != "filter" || parts[8] != "fh" || parts[17] != "flowid" {
        return Err(Error::parse("filter line layout", line));
    }
    let class = parts[18].parse().map_err(|_| Error::parse("filter flowid", line))?;

    Ok((parts[9].to_string(), class))
}

pub(crate) fn parse_qdiscs(output: &str) -> Result<Vec<QdiscRecord>> {
    non_empty_lines(output)
        .map(|line| {
            // qdisc htb 1: root refcnt 2 r2q 10 default 0x1 direct_packets_stat 0
            // qdisc ingress ffff: parent ffff:fff1 ----------------
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 || parts[0] != "qdisc" {
                return Err(Error::parse("qdisc line shape", line));
            }
            let parent = match parts[3] {
                "root" => None,
                "parent" => Some(
                    parts.get(4).ok_or_else(|| Error::parse("qdisc parent", line))?.to_string(),
                ),
                _ => return Err(Error::parse("qdisc attachment", line)),
            };

            Ok(QdiscRecord { kind: parts[1].to_string(), handle: parts[2].to_string(), parent })
        })
        .collect()
}
