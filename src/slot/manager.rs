//! Slot Manager: owns the four slot engines, serializes configuration
//! changes, enforces the configuration lock while running, and exposes the
//! control surface consumed by the HTTP collaborator.

use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;

use crate::ndi::{SourceConnector, SourceDirectory};
use crate::net;
use crate::sap::{build_sdp, PtpConfig, SapAnnouncer, SapEntry, SdpFlavor};
use crate::slot::config::{ConfigError, ConfigStore, SlotConfig};
use crate::slot::engine::{SlotEngine, SlotState, SlotStatus};
use crate::MAX_SLOTS;

/// Discovery pass bound for refresh_sources
const REFRESH_TIMEOUT: Duration = Duration::from_secs(2);

/// Aggregate bridge status for the control surface
#[derive(Debug, Clone)]
pub struct AggregateStatus {
    /// True while any slot is Starting or Live
    pub running: bool,
    /// First non-empty slot diagnostic, in slot order
    pub message: String,
}

struct Inner {
    configs: Vec<SlotConfig>,
    engines: Vec<SlotEngine>,
    store: ConfigStore,
    connector: Arc<dyn SourceConnector>,
    directory: Option<Arc<SourceDirectory>>,
    ptp: PtpConfig,
    source_ip: Ipv4Addr,
}

impl Inner {
    fn edit_mode(&self) -> bool {
        self.engines.iter().all(|e| e.is_idle())
    }

    fn aggregate(&self) -> AggregateStatus {
        let running = self
            .engines
            .iter()
            .any(|e| matches!(e.state(), SlotState::Starting | SlotState::Live));
        let message = self
            .engines
            .iter()
            .map(|e| e.status().message)
            .find(|m| !m.is_empty())
            .unwrap_or_default();
        AggregateStatus { running, message }
    }

    fn live_entries(&self) -> Vec<SapEntry> {
        self.engines
            .iter()
            .zip(&self.configs)
            .filter(|(engine, _)| engine.is_live())
            .map(|(_, config)| SapEntry {
                slot_id: config.slot_id,
                sdp: build_sdp(config, self.source_ip, &self.ptp, SdpFlavor::Aes67),
            })
            .collect()
    }
}

/// The bridge's single owned control value: engines, config store,
/// discovery, and the SAP announcer.
pub struct SlotManager {
    inner: Arc<Mutex<Inner>>,
    announcer: Option<SapAnnouncer>,
}

impl SlotManager {
    /// Create a manager around an injected source connector. The config
    /// file at `store_path` is loaded (or defaulted) and the announcer
    /// thread starts immediately; it announces nothing until slots go
    /// Live.
    pub fn new(
        store_path: impl AsRef<Path>,
        connector: Arc<dyn SourceConnector>,
        directory: Option<Arc<SourceDirectory>>,
    ) -> Self {
        let store = ConfigStore::new(store_path.as_ref());
        let configs = store.load_or_default();
        let engines = (1..=MAX_SLOTS as u8).map(SlotEngine::new).collect();

        let source_ip = net::source_ip();
        let interface = net::outbound_interface().unwrap_or(None);

        let inner = Arc::new(Mutex::new(Inner {
            configs,
            engines,
            store,
            connector,
            directory,
            ptp: PtpConfig::from_env(),
            source_ip,
        }));

        let weak = Arc::downgrade(&inner);
        let announcer = match SapAnnouncer::start(
            source_ip,
            interface,
            Box::new(move || match weak.upgrade() {
                Some(inner) => inner.lock().live_entries(),
                None => Vec::new(),
            }),
        ) {
            Ok(announcer) => Some(announcer),
            Err(e) => {
                warn!("SAP announcer failed to start: {}", e);
                None
            }
        };

        Self { inner, announcer }
    }

    /// Create a manager backed by the NDI runtime.
    pub fn with_ndi(store_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let ndi = grafton_ndi::NDI::new()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let ndi = Arc::new(ndi);

        let connector = Arc::new(crate::ndi::NdiConnector::new(ndi.clone()));
        let directory = Arc::new(SourceDirectory::new(ndi));
        Ok(Self::new(store_path, connector, Some(directory)))
    }

    // --- configuration -----------------------------------------------------

    pub fn list_configs(&self) -> Vec<SlotConfig> {
        self.inner.lock().configs.clone()
    }

    pub fn get_config(&self, slot_id: u8) -> Result<SlotConfig, ConfigError> {
        let inner = self.inner.lock();
        let index = slot_index(slot_id)?;
        Ok(inner.configs[index].clone())
    }

    /// Update one slot's config. Rejected with `locked` unless every slot
    /// is Idle; persisted atomically before the in-memory state changes.
    /// The slot's SSRC is assigned once and preserved across updates.
    pub fn set_config(&self, slot_id: u8, config: SlotConfig) -> Result<SlotConfig, ConfigError> {
        let mut inner = self.inner.lock();
        let index = slot_index(slot_id)?;

        if !inner.edit_mode() {
            return Err(ConfigError::Locked);
        }

        let mut config = config;
        config.slot_id = slot_id;
        config.ssrc = inner.configs[index].ssrc;
        config.validate()?;

        let mut updated = inner.configs.clone();
        updated[index] = config.clone();
        inner
            .store
            .save(&updated)
            .map_err(|e| ConfigError::Persist(e.to_string()))?;

        inner.configs = updated;
        Ok(config)
    }

    // --- lifecycle ---------------------------------------------------------

    /// Start every slot with an assigned source. Slots without a source
    /// stay Idle. Returns the aggregate status after the starts.
    pub fn start_all(&self) -> AggregateStatus {
        let mut inner = self.inner.lock();

        let interface = net::outbound_interface();
        let connector = inner.connector.clone();
        let mut started = 0usize;

        for index in 0..MAX_SLOTS {
            if inner.configs[index].ndi_source_name.is_none() {
                continue;
            }
            started += 1;

            match &interface {
                Ok(iface) => {
                    let config = inner.configs[index].clone();
                    if let Err(e) = inner.engines[index].start(config, *iface, connector.clone()) {
                        warn!("slot {}: start failed: {}", index + 1, e);
                    }
                }
                Err(_) => inner.engines[index].force_fail("interface not found"),
            }
        }

        if started == 0 {
            return AggregateStatus {
                running: false,
                message: "no slots configured".to_string(),
            };
        }

        inner.aggregate()
    }

    /// Stop every non-Idle slot. Idempotent.
    pub fn stop_all(&self) -> AggregateStatus {
        let mut inner = self.inner.lock();
        for engine in &mut inner.engines {
            engine.stop();
        }
        inner.aggregate()
    }

    // --- introspection -----------------------------------------------------

    pub fn status(&self) -> AggregateStatus {
        self.inner.lock().aggregate()
    }

    /// Slot ids currently Live
    pub fn active_slots(&self) -> Vec<u8> {
        let inner = self.inner.lock();
        inner
            .engines
            .iter()
            .zip(&inner.configs)
            .filter(|(engine, _)| engine.is_live())
            .map(|(_, config)| config.slot_id)
            .collect()
    }

    /// SDP for one flow of a Live slot; None when the slot is unknown or
    /// not Live (the collaborator maps this to 404).
    pub fn slot_sdp(&self, slot_id: u8, flavor: SdpFlavor) -> Option<String> {
        let inner = self.inner.lock();
        let index = slot_index(slot_id).ok()?;
        if !inner.engines[index].is_live() {
            return None;
        }
        Some(build_sdp(
            &inner.configs[index],
            inner.source_ip,
            &inner.ptp,
            flavor,
        ))
    }

    /// Full counter snapshot of one slot
    pub fn debug_slot(&self, slot_id: u8) -> Result<SlotStatus, ConfigError> {
        let inner = self.inner.lock();
        let index = slot_index(slot_id)?;
        Ok(inner.engines[index].status())
    }

    // --- discovery ---------------------------------------------------------

    /// Source names from the last discovery pass
    pub fn list_sources(&self) -> Vec<String> {
        let directory = self.inner.lock().directory.clone();
        directory.map(|d| d.list()).unwrap_or_default()
    }

    /// Re-run discovery, then return the refreshed list (the cached list
    /// on discovery failure).
    pub fn refresh_sources(&self) -> Vec<String> {
        let directory = self.inner.lock().directory.clone();
        match directory {
            Some(directory) => directory
                .refresh(REFRESH_TIMEOUT)
                .unwrap_or_else(|_| directory.list()),
            None => Vec::new(),
        }
    }
}

impl Drop for SlotManager {
    fn drop(&mut self) {
        self.stop_all();
        if let Some(mut announcer) = self.announcer.take() {
            announcer.stop();
        }
    }
}

fn slot_index(slot_id: u8) -> Result<usize, ConfigError> {
    if slot_id == 0 || slot_id as usize > MAX_SLOTS {
        return Err(ConfigError::UnknownSlot);
    }
    Ok(slot_id as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndi::{AudioFrame, FrameSource, SourceError};
    use crate::net::random_u32;
    use std::net::UdpSocket;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;

    /// Connector whose sources are chosen by name:
    /// - "never": connects but never yields a frame (slot stays Starting)
    /// - "dies": yields a few frames, then a terminal error
    /// - anything else: yields silent 10ms frames forever
    struct BehaviorConnector;

    struct BehaviorSource {
        frames_before_error: Option<u32>,
        yields: bool,
    }

    impl FrameSource for BehaviorSource {
        fn next_frame(
            &mut self,
            timeout: Duration,
        ) -> Result<Option<AudioFrame>, SourceError> {
            if !self.yields {
                thread::sleep(timeout);
                return Ok(None);
            }
            if let Some(ref mut remaining) = self.frames_before_error {
                if *remaining == 0 {
                    return Err(SourceError::Disconnected);
                }
                *remaining -= 1;
            }
            thread::sleep(Duration::from_millis(10));
            Ok(Some(AudioFrame::silent(48_000, 2, 480)))
        }
    }

    impl SourceConnector for BehaviorConnector {
        fn connect(
            &self,
            name: &str,
            _deadline: Duration,
        ) -> Result<Box<dyn FrameSource>, SourceError> {
            match name {
                "never" => Ok(Box::new(BehaviorSource {
                    frames_before_error: None,
                    yields: false,
                })),
                "dies" => Ok(Box::new(BehaviorSource {
                    frames_before_error: Some(5),
                    yields: true,
                })),
                _ => Ok(Box::new(BehaviorSource {
                    frames_before_error: None,
                    yields: true,
                })),
            }
        }
    }

    fn temp_store(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ndi-aes67-mgr-{}-{}.json", tag, random_u32()));
        path
    }

    fn wait_for<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    /// Bind receivers on an adjacent (port, port+2) pair on loopback.
    fn bind_flow_pair() -> (UdpSocket, UdpSocket, u16) {
        for _ in 0..50 {
            let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
            let port = match probe.local_addr().unwrap().port() {
                p if p % 2 == 0 && p < 65_000 => p,
                _ => continue,
            };
            if let Ok(monitor) = UdpSocket::bind(("127.0.0.1", port + 2)) {
                return (probe, monitor, port);
            }
        }
        panic!("could not find an adjacent UDP port pair");
    }

    fn manager(path: &Path) -> SlotManager {
        SlotManager::new(path, Arc::new(BehaviorConnector), None)
    }

    #[test]
    fn test_config_lock_while_running() {
        let path = temp_store("lock");
        let manager = manager(&path);

        // Edit mode: assign a source that connects but never streams
        let mut cfg = manager.get_config(1).unwrap();
        cfg.ndi_source_name = Some("never".to_string());
        manager.set_config(1, cfg).unwrap();

        let persisted_before = std::fs::read(&path).unwrap();

        let status = manager.start_all();
        assert!(status.running);

        // Running mode: writes rejected, file untouched
        let mut cfg2 = manager.get_config(2).unwrap();
        cfg2.aes67_stream_name = "Renamed".to_string();
        assert!(matches!(
            manager.set_config(2, cfg2.clone()),
            Err(ConfigError::Locked)
        ));
        assert_eq!(std::fs::read(&path).unwrap(), persisted_before);

        // Back to edit mode
        manager.stop_all();
        assert!(manager.set_config(2, cfg2).is_ok());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_slot_independence_and_sdp() {
        let path = temp_store("independence");
        let (slot1_rx, _slot1_mon, port1) = bind_flow_pair();
        let (_slot2_rx, _slot2_mon, port2) = bind_flow_pair();

        // Seed the store directly: loopback destinations let the test
        // observe the flows without multicast routing.
        let mut configs: Vec<SlotConfig> = (1..=MAX_SLOTS as u8)
            .map(SlotConfig::default_for)
            .collect();
        configs[0].ndi_source_name = Some("Studio A (Audio)".to_string());
        configs[0].aes67_stream_name = "Studio A".to_string();
        configs[0].mcast_ip = std::net::Ipv4Addr::LOCALHOST;
        configs[0].mcast_port = port1;
        configs[1].ndi_source_name = Some("dies".to_string());
        configs[1].mcast_ip = std::net::Ipv4Addr::LOCALHOST;
        configs[1].mcast_port = port2;
        ConfigStore::new(&path).save(&configs).unwrap();

        let manager = manager(&path);
        manager.start_all();

        assert!(wait_for(
            || manager.active_slots() == vec![1]
                && manager.debug_slot(2).unwrap().state == SlotState::Failed,
            Duration::from_secs(5)
        ));

        // Slot 2 failed with the source loss; slot 1 unaffected
        let slot2 = manager.debug_slot(2).unwrap();
        assert_eq!(slot2.message, "source disconnected");
        let status = manager.status();
        assert!(status.running);
        assert_eq!(status.message, "source disconnected");

        // Slot 1 still emits after slot 2's death: drain the backlog,
        // then demand a fresh packet
        let mut buf = [0u8; 2048];
        slot1_rx
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        while slot1_rx.recv_from(&mut buf).is_ok() {}
        slot1_rx
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        assert!(slot1_rx.recv_from(&mut buf).is_ok());

        // SDP available for the Live slot only
        let sdp = manager.slot_sdp(1, SdpFlavor::Aes67).unwrap();
        assert!(sdp.contains("s=Studio A\r\n"));
        assert!(sdp.contains(&format!("m=audio {} RTP/AVP 98\r\n", port1)));
        let monitor = manager.slot_sdp(1, SdpFlavor::Monitor).unwrap();
        assert!(monitor.contains(&format!("m=audio {} RTP/AVP 11\r\n", port1 + 2)));
        assert!(manager.slot_sdp(2, SdpFlavor::Aes67).is_none());
        assert!(manager.slot_sdp(3, SdpFlavor::Aes67).is_none());

        manager.stop_all();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_boundary_errors() {
        let path = temp_store("errors");
        let manager = manager(&path);

        assert!(matches!(
            manager.get_config(0),
            Err(ConfigError::UnknownSlot)
        ));
        assert!(matches!(
            manager.get_config(5),
            Err(ConfigError::UnknownSlot)
        ));

        let mut cfg = manager.get_config(1).unwrap();
        cfg.mcast_ip = std::net::Ipv4Addr::new(10, 0, 0, 1);
        assert!(matches!(
            manager.set_config(1, cfg),
            Err(ConfigError::InvalidMulticast)
        ));

        let mut cfg = manager.get_config(1).unwrap();
        cfg.mcast_port = 4999;
        assert!(matches!(
            manager.set_config(1, cfg),
            Err(ConfigError::PortOutOfRange)
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_ssrc_preserved_across_updates() {
        let path = temp_store("ssrc");
        let manager = manager(&path);

        let original = manager.get_config(3).unwrap();
        let mut update = original.clone();
        update.ssrc = 1; // callers cannot reassign the SSRC
        update.aes67_stream_name = "Renamed".to_string();

        let updated = manager.set_config(3, update).unwrap();
        assert_eq!(updated.ssrc, original.ssrc);
        assert_eq!(updated.aes67_stream_name, "Renamed");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_start_all_without_sources() {
        let path = temp_store("empty");
        let manager = manager(&path);

        let status = manager.start_all();
        assert!(!status.running);
        assert_eq!(status.message, "no slots configured");
        assert!(manager.active_slots().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_no_directory_means_no_sources() {
        let path = temp_store("nodir");
        let manager = manager(&path);
        assert!(manager.list_sources().is_empty());
        assert!(manager.refresh_sources().is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
