//! Addresses and CIDR prefixes as they appear in BGP routes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family. Routes of different families live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub const fn bits(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        })
    }
}

/// An IPv4 or IPv6 address, serialized as its textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpAddress(IpAddr);

impl IpAddress {
    pub const fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(IpAddr::V4(Ipv4Addr::new(a, b, c, d)))
    }

    pub const fn inner(self) -> IpAddr {
        self.0
    }

    pub const fn version(self) -> IpVersion {
        match self.0 {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    /// `0.0.0.0` or `::`. BGP uses it as the next hop of locally
    /// originated routes.
    pub fn is_unspecified(self) -> bool {
        self.0.is_unspecified()
    }

    /// Address bits packed to the top of a `u128`, so one mask routine
    /// serves both families.
    fn left_aligned(self) -> u128 {
        match self.0 {
            IpAddr::V4(v4) => u128::from(u32::from(v4)) << 96,
            IpAddr::V6(v6) => u128::from(v6),
        }
    }

    fn from_left_aligned(version: IpVersion, bits: u128) -> Self {
        Self(match version {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::from((bits >> 96) as u32)),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
        })
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(Self)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl TryFrom<String> for IpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(addr: IpAddress) -> String {
        addr.to_string()
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        Self(addr)
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        Self(IpAddr::V4(addr))
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        Self(IpAddr::V6(addr))
    }
}

fn netmask(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0)
}

/// A CIDR prefix with host bits cleared.
///
/// `10.0.0.1/24` parses to `10.0.0.0/24`. Two prefixes are the same route
/// key only when both network bits and length match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    network: IpAddress,
    len: u8,
}

impl IpPrefix {
    pub fn new(address: IpAddress, len: u8) -> Result<Self, ParseError> {
        let version = address.version();
        if len > version.bits() {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{address}/{len}: length exceeds {} bits",
                version.bits()
            )));
        }
        Ok(Self {
            network: IpAddress::from_left_aligned(version, address.left_aligned() & netmask(len)),
            len,
        })
    }

    /// The full-length prefix of a single host.
    pub const fn host(address: IpAddress) -> Self {
        Self {
            network: address,
            len: address.version().bits(),
        }
    }

    pub const fn address(&self) -> IpAddress {
        self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.len
    }

    pub const fn version(&self) -> IpVersion {
        self.network.version()
    }

    /// `0.0.0.0/0` or `::/0`.
    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    /// Network bits left-aligned in a `u128`. Orders longer matches of the
    /// same network next to each other.
    pub fn network_bits(&self) -> u128 {
        self.network.left_aligned()
    }

    /// Whether `ip` falls inside this prefix. Never true across families.
    pub fn contains(&self, ip: IpAddress) -> bool {
        ip.version() == self.version()
            && ip.left_aligned() & netmask(self.len) == self.network_bits()
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidIpPrefix(s.to_string());
        let (addr, len) = s.split_once('/').ok_or_else(invalid)?;
        let len = len.parse::<u8>().map_err(|_| invalid())?;
        Self::new(addr.parse()?, len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_family_of_address() {
        assert_eq!(ip("192.0.2.1").version(), IpVersion::V4);
        assert_eq!(ip("2001:db8::1").version(), IpVersion::V6);
        assert_eq!(ip("192.0.2.1"), IpAddress::v4(192, 0, 2, 1));
        assert!("192.0.2".parse::<IpAddress>().is_err());
    }

    #[test]
    fn test_unspecified_next_hop() {
        assert!(ip("0.0.0.0").is_unspecified());
        assert!(ip("::").is_unspecified());
        assert!(!ip("192.0.2.1").is_unspecified());
    }

    #[test]
    fn test_host_bits_cleared() {
        assert_eq!(prefix("10.1.2.3/8"), prefix("10.0.0.0/8"));
        assert_eq!(prefix("10.1.2.3/8").to_string(), "10.0.0.0/8");
        assert_eq!(prefix("2001:db8:1::7/48").to_string(), "2001:db8:1::/48");
        assert_eq!(prefix("10.1.2.3/32").to_string(), "10.1.2.3/32");
    }

    #[test]
    fn test_length_is_part_of_identity() {
        let wide = prefix("10.0.0.0/8");
        let narrow = prefix("10.0.0.0/16");
        assert_ne!(wide, narrow);
        assert_eq!(wide.network_bits(), narrow.network_bits());
        assert!(wide < narrow);
    }

    #[test]
    fn test_default_route() {
        assert!(prefix("0.0.0.0/0").is_default());
        assert!(prefix("::/0").is_default());
        assert!(!prefix("10.0.0.0/8").is_default());
        assert!(prefix("0.0.0.0/0").contains(ip("203.0.113.9")));
    }

    #[test]
    fn test_contains() {
        let subnet = prefix("192.168.10.0/24");
        assert!(subnet.contains(ip("192.168.10.1")));
        assert!(subnet.contains(ip("192.168.10.255")));
        assert!(!subnet.contains(ip("192.168.11.1")));
        assert!(!subnet.contains(ip("::ffff:192.168.10.1")));

        let v6 = prefix("2001:db8::/32");
        assert!(v6.contains(ip("2001:db8:ffff::1")));
        assert!(!v6.contains(ip("2001:db9::1")));
    }

    #[test]
    fn test_host_prefix() {
        let v4 = IpPrefix::host("192.168.10.1".parse().unwrap());
        assert_eq!(v4, "192.168.10.1/32".parse::<IpPrefix>().unwrap());
        let v6 = IpPrefix::host("2001:db8::1".parse().unwrap());
        assert_eq!(v6.prefix_len(), 128);
        assert!(v6.contains("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("2001:db8::/129".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0/x".parse::<IpPrefix>().is_err());
    }
}
