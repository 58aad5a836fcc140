//! 802.1Q VLAN tags carried on border interfaces.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// A usable VLAN tag.
///
/// An untagged interface has no `VlanId` at all (`Option<VlanId>`), so the
/// reserved values 0 and 4095 are never representable.
///
/// ```
/// use sdnip_types::VlanId;
///
/// assert_eq!(VlanId::new(20).unwrap().as_u16(), 20);
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const VALID: RangeInclusive<u16> = 1..=4094;

    pub fn new(tag: u16) -> Result<Self, ParseError> {
        Self::VALID
            .contains(&tag)
            .then_some(Self(tag))
            .ok_or(ParseError::InvalidVlanId(tag))
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidVlanId(0))
            .and_then(Self::new)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        Self::new(tag)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}
