//! Per-slot configuration and its persistent store.
//! The store writes atomically (temp file + rename) on every successful
//! mutation; reads happen once at startup.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::random_u32;
use crate::MAX_SLOTS;

/// Errors rejected synchronously at the control boundary
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("locked")]
    Locked,

    #[error("invalid multicast address")]
    InvalidMulticast,

    #[error("port out of range")]
    PortOutOfRange,

    #[error("unknown slot")]
    UnknownSlot,

    #[error("failed to persist config: {0}")]
    Persist(String),
}

/// Persistent configuration of one bridge slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Slot id, 1..=4
    pub slot_id: u8,
    /// Discovered NDI source name; None = unassigned
    pub ndi_source_name: Option<String>,
    /// Human label used in SDP s= and SAP
    pub aes67_stream_name: String,
    /// IPv4 multicast group for the L24 flow; the monitor flow uses the
    /// same group on mcast_port + 2
    pub mcast_ip: Ipv4Addr,
    /// Even UDP port for the L24 flow
    pub mcast_port: u16,
    /// RTP synchronization source, assigned once per slot
    pub ssrc: u32,
}

impl SlotConfig {
    /// Default configuration for a slot id: 239.69.0.<id>:5004 with a
    /// freshly assigned SSRC.
    pub fn default_for(slot_id: u8) -> Self {
        Self {
            slot_id,
            ndi_source_name: None,
            aes67_stream_name: format!("AES67 Slot {}", slot_id),
            mcast_ip: Ipv4Addr::new(239, 69, 0, slot_id),
            mcast_port: 5004,
            ssrc: random_u32(),
        }
    }

    /// Validate the user-settable fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_id == 0 || self.slot_id as usize > MAX_SLOTS {
            return Err(ConfigError::UnknownSlot);
        }
        if !self.mcast_ip.is_multicast() {
            return Err(ConfigError::InvalidMulticast);
        }
        // Even port with room for the +2 monitor flow
        if self.mcast_port == 0 || self.mcast_port % 2 != 0 || self.mcast_port > 65_533 {
            return Err(ConfigError::PortOutOfRange);
        }
        Ok(())
    }
}

/// File-backed store for the four slot configs.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load persisted configs, filling gaps with defaults. A missing or
    /// unreadable file yields all defaults.
    pub fn load_or_default(&self) -> Vec<SlotConfig> {
        let mut configs: Vec<SlotConfig> = (1..=MAX_SLOTS as u8)
            .map(SlotConfig::default_for)
            .collect();

        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<SlotConfig>>(&bytes) {
                Ok(loaded) => {
                    for cfg in loaded {
                        let id = cfg.slot_id as usize;
                        if (1..=MAX_SLOTS).contains(&id) {
                            configs[id - 1] = cfg;
                        }
                    }
                    info!("loaded slot config from {}", self.path.display());
                }
                Err(e) => warn!("ignoring malformed config {}: {}", self.path.display(), e),
            },
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not read {}: {}", self.path.display(), e),
        }

        configs
    }

    /// Atomically persist the configs: write a temp file next to the
    /// target, then rename over it.
    pub fn save(&self, configs: &[SlotConfig]) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(configs)?;

        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ndi-aes67-{}-{}.json", tag, random_u32()));
        path
    }

    #[test]
    fn test_defaults() {
        let cfg = SlotConfig::default_for(3);
        assert_eq!(cfg.mcast_ip, Ipv4Addr::new(239, 69, 0, 3));
        assert_eq!(cfg.mcast_port, 5004);
        assert_eq!(cfg.aes67_stream_name, "AES67 Slot 3");
        assert!(cfg.ndi_source_name.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut cfg = SlotConfig::default_for(1);

        cfg.mcast_ip = Ipv4Addr::new(192, 168, 1, 1);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidMulticast)
        ));

        cfg.mcast_ip = Ipv4Addr::new(239, 69, 0, 1);
        cfg.mcast_port = 5005; // odd
        assert!(matches!(cfg.validate(), Err(ConfigError::PortOutOfRange)));

        cfg.mcast_port = 65_534; // no room for the monitor flow
        assert!(matches!(cfg.validate(), Err(ConfigError::PortOutOfRange)));

        cfg.mcast_port = 5004;
        assert!(cfg.validate().is_ok());

        cfg.slot_id = 5;
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownSlot)));
    }

    #[test]
    fn test_error_messages_are_boundary_strings() {
        assert_eq!(ConfigError::Locked.to_string(), "locked");
        assert_eq!(
            ConfigError::InvalidMulticast.to_string(),
            "invalid multicast address"
        );
        assert_eq!(ConfigError::PortOutOfRange.to_string(), "port out of range");
        assert_eq!(ConfigError::UnknownSlot.to_string(), "unknown slot");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = temp_path("roundtrip");
        let store = ConfigStore::new(&path);

        let mut configs = store.load_or_default();
        configs[1].ndi_source_name = Some("CAM 2 (Audio)".to_string());
        configs[1].mcast_port = 6000;
        store.save(&configs).unwrap();

        let reloaded = ConfigStore::new(&path).load_or_default();
        assert_eq!(
            reloaded[1].ndi_source_name.as_deref(),
            Some("CAM 2 (Audio)")
        );
        assert_eq!(reloaded[1].mcast_port, 6000);
        // SSRC survives persistence
        assert_eq!(reloaded[1].ssrc, configs[1].ssrc);

        // No temp file left behind
        let mut tmp = path.clone();
        tmp.set_extension("tmp");
        assert!(!tmp.exists());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let store = ConfigStore::new(temp_path("missing"));
        let configs = store.load_or_default();
        assert_eq!(configs.len(), MAX_SLOTS);
        assert_eq!(configs[0].slot_id, 1);
        assert_eq!(configs[3].slot_id, 4);
    }
}
