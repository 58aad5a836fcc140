//! Common network types for the SDN-IP routing control plane.
//!
//! This crate provides type-safe representations of the network primitives
//! shared by the route pipeline and the intent layer:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 or IPv6 address
//! - [`IpPrefix`]: normalised IP network prefixes (CIDR notation)
//! - [`IpVersion`]: address family discriminator
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod ip;
mod mac;
mod vlan;

pub use ip::{IpAddress, IpPrefix, IpVersion};
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
