//! IPv4 prefixes and interface addresses.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixParseError {
    #[error("missing '/' in prefix '{0}'")]
    MissingLength(String),
    #[error("invalid IPv4 address in '{0}'")]
    InvalidAddress(String),
    #[error("invalid prefix length in '{0}' (expected 0..=32)")]
    InvalidLength(String),
}

/// An IPv4 network. The address is always normalized to the network
/// address, so `10.1.2.3/8` and `10.0.0.0/8` are the same prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    address: u32,
    length: u8,
}

fn mask(length: u8) -> u32 {
    match length {
        0 => 0,
        l => u32::MAX << (32 - u32::from(l.min(32))),
    }
}

impl Prefix {
    pub fn new(address: Ipv4Addr, length: u8) -> Self {
        let length = length.min(32);
        Self {
            address: u32::from(address) & mask(length),
            length,
        }
    }

    /// `0.0.0.0/0`.
    pub fn any() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }

    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address)
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// First address of the network, as an integer.
    pub fn first_ip(&self) -> i64 {
        i64::from(self.address)
    }

    /// Last address of the network, as an integer.
    pub fn last_ip(&self) -> i64 {
        i64::from(self.address | !mask(self.length))
    }

    pub fn contains_ip(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.length) == self.address
    }

    /// True iff `other` is equal to or more specific than `self`.
    pub fn contains(&self, other: &Prefix) -> bool {
        other.length >= self.length && other.address & mask(self.length) == self.address
    }

    /// True iff the two networks share at least one address.
    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.length)
    }
}

fn split_address(s: &str) -> Result<(Ipv4Addr, u8), PrefixParseError> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| PrefixParseError::MissingLength(s.to_string()))?;
    let address = addr
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| PrefixParseError::InvalidAddress(s.to_string()))?;
    let length = len
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|l| *l <= 32)
        .ok_or_else(|| PrefixParseError::InvalidLength(s.to_string()))?;
    Ok((address, length))
}

impl FromStr for Prefix {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, length) = split_address(s)?;
        Ok(Prefix::new(address, length))
    }
}

impl TryFrom<String> for Prefix {
    type Error = PrefixParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(p: Prefix) -> Self {
        p.to_string()
    }
}

/// The address configured on an interface: host address plus subnet length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub length: u8,
}

impl InterfaceAddress {
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        Self {
            ip,
            length: length.min(32),
        }
    }

    /// The connected subnet.
    pub fn prefix(&self) -> Prefix {
        Prefix::new(self.ip, self.length)
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.length)
    }
}

impl FromStr for InterfaceAddress {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, length) = split_address(s)?;
        Ok(InterfaceAddress::new(ip, length))
    }
}

impl TryFrom<String> for InterfaceAddress {
    type Error = PrefixParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InterfaceAddress> for String {
    fn from(a: InterfaceAddress) -> Self {
        a.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Prefix {
        s.parse().expect("valid prefix")
    }

    #[test]
    fn parsing_normalizes_host_bits() {
        assert_eq!(p("10.1.2.3/8"), p("10.0.0.0/8"));
        assert_eq!(p("10.1.2.3/8").to_string(), "10.0.0.0/8");
        assert_eq!(p("1.2.3.4/0"), Prefix::any());
    }

    #[test]
    fn parsing_rejects_malformed_input() {
        assert!(matches!(
            "10.0.0.0".parse::<Prefix>(),
            Err(PrefixParseError::MissingLength(_))
        ));
        assert!(matches!(
            "10.0.0/8".parse::<Prefix>(),
            Err(PrefixParseError::InvalidAddress(_))
        ));
        assert!(matches!(
            "10.0.0.0/33".parse::<Prefix>(),
            Err(PrefixParseError::InvalidLength(_))
        ));
    }

    #[test]
    fn overlap_of_nested_and_disjoint_networks() {
        assert!(p("10.0.0.0/8").overlaps(&p("10.1.1.0/24")));
        assert!(p("10.1.1.0/24").overlaps(&p("10.0.0.0/8")));
        assert!(!p("10.0.0.0/8").overlaps(&p("192.168.0.0/16")));
        assert!(Prefix::any().overlaps(&p("192.168.0.0/16")));
    }

    #[test]
    fn address_range_bounds() {
        let net = p("192.168.0.0/16");
        assert_eq!(net.first_ip(), 3_232_235_520);
        assert_eq!(net.last_ip(), 3_232_301_055);
        assert_eq!(Prefix::any().last_ip(), i64::from(u32::MAX));
        assert_eq!(p("10.0.0.1/32").first_ip(), p("10.0.0.1/32").last_ip());
    }

    #[test]
    fn interface_address_keeps_host_and_yields_subnet() {
        let addr: InterfaceAddress = "10.0.12.1/30".parse().expect("valid address");
        assert_eq!(addr.ip, Ipv4Addr::new(10, 0, 12, 1));
        assert_eq!(addr.prefix(), p("10.0.12.0/30"));
        assert!(addr.prefix().contains_ip(Ipv4Addr::new(10, 0, 12, 2)));
        assert!(!addr.prefix().contains_ip(Ipv4Addr::new(10, 0, 12, 4)));
    }

    #[test]
    fn prefixes_round_trip_through_json_as_strings() {
        let json = serde_json::to_string(&p("172.16.0.0/12")).expect("serialize");
        assert_eq!(json, "\"172.16.0.0/12\"");
        let back: Prefix = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, p("172.16.0.0/12"));
    }
}
