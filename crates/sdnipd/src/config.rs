//! Configuration file support for sdnipd
//!
//! Loads and validates the border interfaces, BGP peers and intent tuning
//! from a TOML file. Default location: /etc/sdnip/sdnipd.toml

use crate::error::{Result, SdnIpError};
use crate::types::{
    ApplicationId, BgpPeer, BgpSpeaker, ConnectPoint, Interface, InterfaceIpAddress, SpeakerAddress,
};
use sdnip_types::{IpAddress, IpVersion, MacAddress, VlanId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sdnip/sdnipd.toml";

/// Intent tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Priority added per prefix bit
    #[serde(default = "default_priority_multiplier")]
    pub priority_multiplier: u32,

    /// Base priority of a zero-length prefix
    #[serde(default = "default_priority_offset")]
    pub priority_offset: u32,
}

/// A border interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub device_id: String,
    pub port: u32,
    pub mac: MacAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<VlanId>,
    /// Interface addresses with their subnet length, e.g. "192.168.10.101/24"
    #[serde(default)]
    pub ips: Vec<InterfaceIpAddress>,
}

impl InterfaceConfig {
    pub fn connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(self.device_id.clone(), self.port)
    }
}

/// An external BGP peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpPeerConfig {
    pub ip_address: IpAddress,
    pub device_id: String,
    pub port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
}

impl BgpPeerConfig {
    pub fn connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(self.device_id.clone(), self.port)
    }
}

/// Address of a BGP speaker on the subnet behind one border interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerAddressConfig {
    pub device_id: String,
    pub port: u32,
    pub ip_address: IpAddress,
}

impl SpeakerAddressConfig {
    pub fn connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(self.device_id.clone(), self.port)
    }
}

/// A BGP speaker attached to the fabric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgpSpeakerConfig {
    pub name: String,
    pub device_id: String,
    pub port: u32,
    pub mac: MacAddress,
    #[serde(default)]
    pub addresses: Vec<SpeakerAddressConfig>,
}

impl BgpSpeakerConfig {
    pub fn connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(self.device_id.clone(), self.port)
    }
}

/// Complete sdnipd configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdnIpConfig {
    /// Application owning every intent this instance writes
    #[serde(default = "default_app_id")]
    pub app_id: String,

    #[serde(default)]
    pub intents: IntentConfig,

    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,

    #[serde(default)]
    pub bgp_peers: Vec<BgpPeerConfig>,

    #[serde(default)]
    pub bgp_speakers: Vec<BgpSpeakerConfig>,
}

impl IntentConfig {
    /// Priority of a /128 route, or `None` if it does not fit in a `u32`.
    pub fn max_priority(&self) -> Option<u32> {
        u32::from(IpVersion::V6.bits())
            .checked_mul(self.priority_multiplier)?
            .checked_add(self.priority_offset)
    }
}

fn default_app_id() -> String {
    "org.onosproject.sdnip".to_string()
}

fn default_priority_multiplier() -> u32 {
    5
}

fn default_priority_offset() -> u32 {
    100
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            priority_multiplier: default_priority_multiplier(),
            priority_offset: default_priority_offset(),
        }
    }
}

impl Default for SdnIpConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            intents: IntentConfig::default(),
            interfaces: Vec::new(),
            bgp_peers: Vec::new(),
            bgp_speakers: Vec::new(),
        }
    }
}

impl SdnIpConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SdnIpError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SdnIpError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SdnIpError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn app_id(&self) -> ApplicationId {
        ApplicationId::new(self.app_id.clone())
    }

    pub fn interfaces(&self) -> Vec<Interface> {
        self.interfaces
            .iter()
            .map(|intf| Interface {
                name: intf.name.clone(),
                connect_point: intf.connect_point(),
                ip_addresses: intf.ips.clone(),
                mac: intf.mac,
                vlan: intf.vlan,
            })
            .collect()
    }

    pub fn bgp_peers(&self) -> Vec<BgpPeer> {
        self.bgp_peers
            .iter()
            .map(|peer| BgpPeer {
                ip_address: peer.ip_address,
                connect_point: peer.connect_point(),
                interface_name: peer.interface_name.clone(),
            })
            .collect()
    }

    pub fn bgp_speakers(&self) -> Vec<BgpSpeaker> {
        self.bgp_speakers
            .iter()
            .map(|speaker| BgpSpeaker {
                name: speaker.name.clone(),
                connect_point: speaker.connect_point(),
                mac: speaker.mac,
                addresses: speaker
                    .addresses
                    .iter()
                    .map(|addr| SpeakerAddress {
                        connect_point: addr.connect_point(),
                        ip_address: addr.ip_address,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_empty() {
            return Err(SdnIpError::Config("app_id must not be empty".to_string()));
        }

        if self.intents.priority_multiplier == 0 {
            return Err(SdnIpError::Config(
                "priority_multiplier must be > 0".to_string(),
            ));
        }

        if self.intents.max_priority().is_none() {
            return Err(SdnIpError::Config(format!(
                "priority_multiplier {} with priority_offset {} overflows the priority of a /128 route",
                self.intents.priority_multiplier, self.intents.priority_offset
            )));
        }

        let mut connect_points = HashSet::new();
        let mut names = HashSet::new();
        for intf in &self.interfaces {
            if !connect_points.insert(intf.connect_point()) {
                return Err(SdnIpError::Config(format!(
                    "Duplicate interface connect point {}",
                    intf.connect_point()
                )));
            }
            if !names.insert(intf.name.as_str()) {
                return Err(SdnIpError::Config(format!(
                    "Duplicate interface name {}",
                    intf.name
                )));
            }
        }

        for peer in &self.bgp_peers {
            if !connect_points.contains(&peer.connect_point()) {
                return Err(SdnIpError::Config(format!(
                    "BGP peer {} attaches at {} which is not a configured interface",
                    peer.ip_address,
                    peer.connect_point()
                )));
            }
            if let Some(name) = &peer.interface_name {
                if !names.contains(name.as_str()) {
                    return Err(SdnIpError::Config(format!(
                        "BGP peer {} refers to unknown interface {}",
                        peer.ip_address, name
                    )));
                }
            }
        }

        let mut speakers = HashSet::new();
        for speaker in &self.bgp_speakers {
            if !speakers.insert(speaker.name.as_str()) {
                return Err(SdnIpError::Config(format!(
                    "Duplicate BGP speaker name {}",
                    speaker.name
                )));
            }
            for addr in &speaker.addresses {
                if !connect_points.contains(&addr.connect_point()) {
                    return Err(SdnIpError::Config(format!(
                        "BGP speaker {} address {} is at {} which is not a configured interface",
                        speaker.name,
                        addr.ip_address,
                        addr.connect_point()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
app_id = "sdnip-lab"

[intents]
priority_offset = 200

[[interfaces]]
name = "sw1-eth1"
device_id = "of:0000000000000001"
port = 1
mac = "00:00:00:00:00:01"
ips = ["192.168.10.101/24"]

[[interfaces]]
name = "sw2-eth1"
device_id = "of:0000000000000002"
port = 1
mac = "00:00:00:00:00:02"
vlan = 20
ips = ["192.168.20.101/24", "2001:db8:20::101/64"]

[[bgp_peers]]
ip_address = "192.168.10.1"
device_id = "of:0000000000000001"
port = 1
interface_name = "sw1-eth1"

[[bgp_speakers]]
name = "bgp1"
device_id = "of:0000000000000001"
port = 100
mac = "00:00:00:00:00:aa"

[[bgp_speakers.addresses]]
device_id = "of:0000000000000001"
port = 1
ip_address = "192.168.10.101"

[[bgp_speakers.addresses]]
device_id = "of:0000000000000002"
port = 1
ip_address = "192.168.20.101"
"#;

    #[test]
    fn test_default_config() {
        let config = SdnIpConfig::default();
        assert_eq!(config.app_id, "org.onosproject.sdnip");
        assert_eq!(config.intents.priority_multiplier, 5);
        assert_eq!(config.intents.priority_offset, 100);
        assert!(config.interfaces.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.app_id().as_str(), "sdnip-lab");
        assert_eq!(config.intents.priority_offset, 200);
        // Unspecified values should use defaults
        assert_eq!(config.intents.priority_multiplier, 5);

        let interfaces = config.interfaces();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[1].vlan, Some(VlanId::new(20).unwrap()));
        assert_eq!(interfaces[1].ip_addresses.len(), 2);
        assert_eq!(
            interfaces[1].ip_addresses[0].subnet.to_string(),
            "192.168.20.0/24"
        );

        let peers = config.bgp_peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].connect_point, interfaces[0].connect_point);

        let speakers = config.bgp_speakers();
        assert_eq!(speakers.len(), 1);
        assert_eq!(speakers[0].connect_point, ConnectPoint::new("of:0000000000000001", 100));
        assert_eq!(
            speakers[0].address_towards(&peers[0]),
            Some("192.168.10.101".parse().unwrap())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_multiplier() {
        let mut config = SdnIpConfig::default();
        config.intents.priority_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_priority_overflow() {
        let mut config = SdnIpConfig::default();
        config.intents.priority_multiplier = 40_000_000;
        assert!(matches!(config.validate(), Err(SdnIpError::Config(_))));

        // 128 * 33_554_431 + 127 == u32::MAX
        config.intents.priority_multiplier = 33_554_431;
        config.intents.priority_offset = 127;
        assert_eq!(config.intents.max_priority(), Some(u32::MAX));
        assert!(config.validate().is_ok());

        config.intents.priority_offset = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_speaker_address_without_interface() {
        let mut config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        config.bgp_speakers[0].addresses[1].port = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_speaker() {
        let mut config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        config.bgp_speakers.push(config.bgp_speakers[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_connect_point() {
        let mut config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        let mut dup = config.interfaces[0].clone();
        dup.name = "sw1-eth1-dup".to_string();
        config.interfaces.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_peer_without_interface() {
        let mut config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        config.bgp_peers[0].port = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_peer_unknown_interface_name() {
        let mut config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();
        config.bgp_peers[0].interface_name = Some("sw9-eth1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_mac_is_rejected() {
        let broken = SAMPLE.replace("00:00:00:00:00:01", "00:00:00:00:01");
        assert!(toml::from_str::<SdnIpConfig>(&broken).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = SdnIpConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.interfaces.len(), 2);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"app_id = [").unwrap();

        let err = SdnIpConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, SdnIpError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdnipd.toml");
        let config: SdnIpConfig = toml::from_str(SAMPLE).unwrap();

        config.save(&path).unwrap();
        let reloaded = SdnIpConfig::load_or_default(&path).unwrap();
        assert_eq!(reloaded.interfaces(), config.interfaces());
        assert_eq!(reloaded.bgp_peers(), config.bgp_peers());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SdnIpConfig::load_or_default("/nonexistent/sdnipd.toml").unwrap();
        assert_eq!(config.app_id, "org.onosproject.sdnip");
    }
}
