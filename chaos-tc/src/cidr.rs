//! Conversion between IPv4 CIDRs and the match patterns printed by u32 filters.
//!
//! `tc filter show` prints a `match ip dst 10.0.0.1/32` rule as `match 0a000001/ffffffff at 16`:
//! the network address and the netmask as two 8-digit hexadecimal words.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::{Error, Result};

/// Parses a CIDR (or a bare address, taken as /32) and clears its host bits.
pub fn parse(s: &str) -> Result<Ipv4Net> {
    let s = s.trim();
    let net = match s.parse::<Ipv4Net>() {
        Ok(net) => net,
        Err(_) => {
            let addr = s.parse::<Ipv4Addr>().map_err(|_| Error::InvalidCidr(s.to_string()))?;
            Ipv4Net::from(addr)
        }
    };

    Ok(net.trunc())
}

/// Encodes a CIDR as the hex pattern used in u32 match rules.
pub fn encode(net: &Ipv4Net) -> String {
    format!("{:08x}/{:08x}", u32::from(net.network()), u32::from(net.netmask()))
}

/// Decodes a u32 match pattern back into a CIDR.
pub fn decode(hex: &str) -> Result<Ipv4Net> {
    let invalid = || Error::parse("malformed match pattern", hex);

    let (addr, mask) = hex.split_once('/').ok_or_else(invalid)?;
    let word = |s: &str| {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        u32::from_str_radix(s, 16).map_err(|_| invalid())
    };
    let addr = word(addr)?;
    let mask = word(mask)?;

    let prefix = mask.leading_ones();
    // Only contiguous masks describe a CIDR.
    if mask.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(invalid());
    }

    Ipv4Net::new(Ipv4Addr::from(addr), prefix as u8).map_err(|_| invalid())
}
