//! Synthetic tone bridge.
//!
//! Drives the whole slot pipeline from a generated 1kHz tone instead of an
//! NDI receiver, so the AES67 output path can be exercised (and watched in
//! Wireshark) without any NDI hardware on the network.
//!
//! Usage: cargo run --example tone_to_aes67

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ndi_aes67::{
    AudioFrame, FrameSource, SlotManager, SourceConnector, SourceError,
};

/// 1kHz sine at -6dBFS, delivered in 10ms frames
struct ToneSource {
    phase: f32,
}

impl FrameSource for ToneSource {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<AudioFrame>, SourceError> {
        const SAMPLES: u32 = 480;
        let mut frame = AudioFrame::silent(48_000, 2, SAMPLES);

        for i in 0..SAMPLES as usize {
            let value = 0.5 * (self.phase * std::f32::consts::TAU).sin();
            self.phase = (self.phase + 1_000.0 / 48_000.0).fract();
            frame.data[i * 2] = value;
            frame.data[i * 2 + 1] = value;
        }

        // Real-time pacing, one frame per 10ms
        thread::sleep(Duration::from_millis(10));
        Ok(Some(frame))
    }
}

struct ToneConnector;

impl SourceConnector for ToneConnector {
    fn connect(
        &self,
        _name: &str,
        _deadline: Duration,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(ToneSource { phase: 0.0 }))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("ndi-aes67 Tone Bridge");
    println!("=====================");
    println!();
    println!("Sending a 1kHz tone as AES67 L24 multicast on 239.69.0.1:5004");
    println!("(monitor L16 flow on port 5006, SAP on 224.2.127.254:9875).");
    println!();
    println!("Press Ctrl+C to stop.");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let manager = SlotManager::new("tone_slots.json", Arc::new(ToneConnector), None);

    let mut config = manager.get_config(1).expect("slot 1 exists");
    config.ndi_source_name = Some("tone".to_string());
    config.aes67_stream_name = "Tone 1kHz".to_string();
    manager
        .set_config(1, config)
        .expect("configure slot 1");

    let status = manager.start_all();
    println!("running: {} {}", status.running, status.message);

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(2));
        if let Ok(status) = manager.debug_slot(1) {
            println!(
                "slot 1: {:?} packets={} bytes={} underruns={}",
                status.state, status.packets_sent, status.bytes_sent, status.underruns
            );
        }
    }

    manager.stop_all();
    println!("Done.");
}
