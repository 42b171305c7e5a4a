//! Per-slot pipeline engine: ingest -> format gate -> repacker -> L24/L16
//! packetization -> multicast send, driven by one worker thread.
//!
//! Single-thread data path: the worker reads frames, repacks, builds and
//! sends packets. No locks between frames; state and counters are atomics
//! shared with the control side.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::ndi::{FrameSource, SourceConnector, SourceError};
use crate::net::random_u32;
use crate::output::emitter::SendOutcome;
use crate::output::{FrameChunker, MulticastEmitter, PcmEncoding, RtpPacketBuilder};
use crate::slot::config::SlotConfig;
use crate::{AES67_CHANNELS, AES67_SAMPLE_RATE};

/// How long the engine may sit in Starting without a sent packet
const START_WATCHDOG: Duration = Duration::from_secs(5);

/// Frame read timeout; bounds how quickly cancellation is observed
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Discovery deadline when resolving the source name to a receiver
const CONNECT_DEADLINE: Duration = Duration::from_secs(2);

/// Grace period for the worker to exit after stop() sets cancel
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Consecutive hard send errors before the slot fails
const MAX_CONSECUTIVE_SEND_ERRORS: u32 = 100;

/// Slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Starting,
    Live,
    Stopping,
    Failed,
}

impl SlotState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SlotState::Starting,
            2 => SlotState::Live,
            3 => SlotState::Stopping,
            4 => SlotState::Failed,
            _ => SlotState::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotState::Idle => "Idle",
            SlotState::Starting => "Starting",
            SlotState::Live => "Live",
            SlotState::Stopping => "Stopping",
            SlotState::Failed => "Failed",
        }
    }
}

/// Transient status snapshot of one slot
#[derive(Debug, Clone)]
pub struct SlotStatus {
    pub state: SlotState,
    /// Diagnostic message; empty while Live
    pub message: String,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub last_send_unix_ns: u64,
    pub frames_received: u64,
    pub underruns: u64,
    pub param_mismatch_count: u64,
    pub send_errors: u64,
}

/// Errors surfaced synchronously by start()
#[derive(Error, Debug)]
pub enum StartError {
    #[error("no NDI source assigned")]
    NoSource,

    #[error("socket bind failed")]
    SocketBind(#[source] std::io::Error),
}

/// State and counters shared between the worker thread and the control side
struct SlotShared {
    state: AtomicU8,
    message: Mutex<String>,
    cancel: AtomicBool,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    last_send_unix_ns: AtomicU64,
    frames_received: AtomicU64,
    underruns: AtomicU64,
    param_mismatch_count: AtomicU64,
    send_errors: AtomicU64,
}

impl SlotShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Idle as u8),
            message: Mutex::new(String::new()),
            cancel: AtomicBool::new(false),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            last_send_unix_ns: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            param_mismatch_count: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
        }
    }

    fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn fail(&self, slot_id: u8, message: String) {
        warn!("slot {}: {}", slot_id, message);
        *self.message.lock() = message;
        self.set_state(SlotState::Failed);
    }

    fn reset_counters(&self) {
        self.packets_sent.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.last_send_unix_ns.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.param_mismatch_count.store(0, Ordering::Relaxed);
        self.send_errors.store(0, Ordering::Relaxed);
    }

    fn record_send(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.last_send_unix_ns.store(now, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SlotStatus {
        SlotStatus {
            state: self.state(),
            message: self.message.lock().clone(),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            last_send_unix_ns: self.last_send_unix_ns.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            param_mismatch_count: self.param_mismatch_count.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// One slot's pipeline engine. Composes the frame source, format gate,
/// repacker, packet builders, and emitters; owns the worker thread.
pub struct SlotEngine {
    slot_id: u8,
    shared: Arc<SlotShared>,
    worker: Option<JoinHandle<()>>,
}

impl SlotEngine {
    pub fn new(slot_id: u8) -> Self {
        Self {
            slot_id,
            shared: Arc::new(SlotShared::new()),
            worker: None,
        }
    }

    pub fn state(&self) -> SlotState {
        self.shared.state()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == SlotState::Idle
    }

    pub fn is_live(&self) -> bool {
        self.state() == SlotState::Live
    }

    pub fn status(&self) -> SlotStatus {
        self.shared.snapshot()
    }

    /// Mark the slot Failed without spawning anything (startup errors
    /// detected by the manager, e.g. interface resolution).
    pub(crate) fn force_fail(&mut self, message: &str) {
        self.reap();
        self.shared.fail(self.slot_id, message.to_string());
    }

    /// Start the pipeline: open both flow sockets, seed the RTP counters,
    /// spawn the worker, and enter Starting. Safe to call in any state;
    /// a running engine is left untouched, a Failed one is cleared first.
    pub fn start(
        &mut self,
        config: SlotConfig,
        interface: Option<Ipv4Addr>,
        connector: Arc<dyn SourceConnector>,
    ) -> Result<(), StartError> {
        match self.state() {
            SlotState::Starting | SlotState::Live | SlotState::Stopping => return Ok(()),
            SlotState::Failed => {
                self.reap();
                *self.shared.message.lock() = String::new();
                self.shared.set_state(SlotState::Idle);
            }
            SlotState::Idle => self.reap(),
        }

        let source_name = match config.ndi_source_name.clone() {
            Some(name) => name,
            None => return Err(StartError::NoSource),
        };

        let l24_dest = SocketAddrV4::new(config.mcast_ip, config.mcast_port);
        let l16_dest = SocketAddrV4::new(config.mcast_ip, config.mcast_port + 2);

        let l24_emitter = match MulticastEmitter::new(l24_dest, interface) {
            Ok(e) => e,
            Err(e) => {
                self.shared.fail(self.slot_id, "socket bind failed".to_string());
                return Err(StartError::SocketBind(e));
            }
        };
        let l16_emitter = match MulticastEmitter::new(l16_dest, interface) {
            Ok(e) => e,
            Err(e) => {
                self.shared.fail(self.slot_id, "socket bind failed".to_string());
                return Err(StartError::SocketBind(e));
            }
        };

        self.shared.reset_counters();
        *self.shared.message.lock() = String::new();
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.set_state(SlotState::Starting);

        info!(
            "slot {}: starting '{}' -> {} (+monitor on {})",
            self.slot_id,
            source_name,
            l24_dest,
            l16_dest.port()
        );

        let shared = self.shared.clone();
        let slot_id = self.slot_id;
        let ssrc = config.ssrc;

        self.worker = Some(thread::spawn(move || {
            Self::worker_loop(
                shared,
                slot_id,
                ssrc,
                source_name,
                connector,
                l24_emitter,
                l16_emitter,
            );
        }));

        Ok(())
    }

    /// Stop the pipeline. Synchronous and idempotent: signals cancel,
    /// waits up to the grace period for the worker, then abandons the
    /// handle (the worker exits on its next cancel check, bounded by the
    /// frame read timeout, and closes its sockets as it unwinds).
    pub fn stop(&mut self) {
        if self.state() == SlotState::Idle && self.worker.is_none() {
            return;
        }

        self.shared.cancel.store(true, Ordering::SeqCst);
        self.shared.set_state(SlotState::Stopping);

        if let Some(worker) = self.worker.take() {
            let deadline = Instant::now() + STOP_GRACE;
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                warn!("slot {}: worker did not stop in time, abandoning", self.slot_id);
            }
        }

        *self.shared.message.lock() = String::new();
        self.shared.set_state(SlotState::Idle);
        info!("slot {}: stopped", self.slot_id);
    }

    /// Join a worker that has already finished (after Failed), so a
    /// restart never piles up handles.
    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                self.worker = Some(worker);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn worker_loop(
        shared: Arc<SlotShared>,
        slot_id: u8,
        ssrc: u32,
        source_name: String,
        connector: Arc<dyn SourceConnector>,
        l24_emitter: MulticastEmitter,
        l16_emitter: MulticastEmitter,
    ) {
        let started = Instant::now();

        let mut source: Box<dyn FrameSource> =
            match connector.connect(&source_name, CONNECT_DEADLINE) {
                Ok(source) => source,
                Err(SourceError::Disconnected) => {
                    shared.fail(slot_id, "source disconnected".to_string());
                    return;
                }
                Err(_) => {
                    shared.fail(slot_id, "source not found".to_string());
                    return;
                }
            };

        let mut chunker = FrameChunker::new();
        let mut l24 = RtpPacketBuilder::new(
            ssrc,
            PcmEncoding::L24,
            random_u32() as u16,
            random_u32(),
        );
        let mut l16 = RtpPacketBuilder::new(
            ssrc,
            PcmEncoding::L16,
            random_u32() as u16,
            random_u32(),
        );

        let mut live = false;
        let mut consecutive_send_errors: u32 = 0;

        loop {
            if shared.cancel.load(Ordering::SeqCst) {
                return;
            }
            if !live && started.elapsed() > START_WATCHDOG {
                shared.fail(slot_id, "receiver did not connect".to_string());
                return;
            }

            let frame = match source.next_frame(FRAME_READ_TIMEOUT) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    if live {
                        shared.underruns.fetch_add(1, Ordering::Relaxed);
                    }
                    continue;
                }
                Err(_) => {
                    shared.fail(slot_id, "source disconnected".to_string());
                    return;
                }
            };

            shared.frames_received.fetch_add(1, Ordering::Relaxed);

            // Format gate: fixed target, re-checked on every frame
            if frame.sample_rate != AES67_SAMPLE_RATE || frame.channels != AES67_CHANNELS {
                shared.param_mismatch_count.fetch_add(1, Ordering::Relaxed);
                shared.fail(
                    slot_id,
                    format!(
                        "unsupported format: {}Hz/{}ch",
                        frame.sample_rate, frame.channels
                    ),
                );
                return;
            }

            chunker.push(&frame);

            while let Some(chunk) = chunker.pop_chunk() {
                for (builder, emitter) in
                    [(&mut l24, &l24_emitter), (&mut l16, &l16_emitter)]
                {
                    let packet = builder.build_packet(&chunk);
                    match emitter.send(packet) {
                        SendOutcome::Sent => {
                            shared.record_send(packet.len());
                            consecutive_send_errors = 0;
                            if !live {
                                live = true;
                                shared.set_state(SlotState::Live);
                                info!("slot {}: live", slot_id);
                            }
                        }
                        SendOutcome::WouldBlock => {
                            // Buffer full: drop, RTP never retransmits
                        }
                        SendOutcome::Failed => {
                            shared.send_errors.fetch_add(1, Ordering::Relaxed);
                            consecutive_send_errors += 1;
                        }
                    }
                }

                if consecutive_send_errors > MAX_CONSECUTIVE_SEND_ERRORS {
                    shared.fail(slot_id, "excessive send errors".to_string());
                    return;
                }
            }
        }
    }
}

impl Drop for SlotEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
