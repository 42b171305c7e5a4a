//! NDI to AES67 bridge CLI.
//!
//! Discovers NDI sources, assigns the first one (or the name given on the
//! command line) to slot 1, and bridges it to AES67 multicast until Ctrl+C.
//!
//! Usage: cargo run --example ndi_to_aes67 [source name]
//!
//! Environment:
//!   MCAST_IFACE  outbound interface name (optional)
//!   PTP_GMID     grandmaster id quoted in SDP (optional)
//!   PTP_DOMAIN   PTP domain, default 0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ndi_aes67::SlotManager;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("ndi-aes67 Bridge");
    println!("================");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let manager = match SlotManager::with_ndi("slots.json") {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to initialize NDI: {}", e);
            eprintln!();
            eprintln!("Make sure the NDI runtime is installed.");
            return;
        }
    };

    println!("Discovering NDI sources...");
    let sources = manager.refresh_sources();
    if sources.is_empty() {
        eprintln!("No NDI sources found on the network.");
        return;
    }
    for (i, name) in sources.iter().enumerate() {
        println!("  [{}] {}", i, name);
    }

    let wanted = std::env::args().nth(1).unwrap_or_else(|| sources[0].clone());
    println!();
    println!("Bridging '{}' on slot 1", wanted);

    let mut config = manager.get_config(1).expect("slot 1 exists");
    config.ndi_source_name = Some(wanted);
    if let Err(e) = manager.set_config(1, config) {
        eprintln!("Failed to configure slot 1: {}", e);
        return;
    }

    let status = manager.start_all();
    println!("running: {} {}", status.running, status.message);

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(2));
        if let Ok(status) = manager.debug_slot(1) {
            println!(
                "slot 1: {:?} packets={} frames={} underruns={} {}",
                status.state,
                status.packets_sent,
                status.frames_received,
                status.underruns,
                status.message
            );
        }
    }

    manager.stop_all();
    println!("Done.");
}
