mod command;
mod config;
mod connection;
mod context;
mod error;
mod frame;
mod hal;
mod node;
mod queue;
mod recorder;
mod sampler;
mod status;
mod storage;
mod writer;

use config::Config;
use connection::MqttLink;
use crossbeam_channel::bounded;
use hal::{MonotonicClock, SyntheticAdc};
use node::Node;
use status::StatusReporter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::Storage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    log::info!(
        "Device '{}': {} channels, {} samples/frame every {} ms",
        config.device_id,
        config.channel_count,
        config.samples_per_frame,
        config.sample_interval_ms
    );

    let storage = Arc::new(Storage::new(&config.storage_root));
    storage.mount();

    // Channels between the network thread and the node loop
    let (inbox_tx, inbox_rx) = bounded(config.inbox_capacity);
    let (outbox_tx, outbox_rx) = bounded(config.outbox_capacity);

    let link = MqttLink::new(&config, inbox_tx, outbox_rx);
    let link_thread = std::thread::Builder::new()
        .name("mqtt-link".into())
        .spawn(move || {
            if let Err(e) = link.run() {
                log::error!("MQTT link stopped: {}", e);
            }
        })?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            log::info!("Shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let mut node = Node::new(
        &config,
        Arc::clone(&storage),
        SyntheticAdc::new(config.channel_count),
        MonotonicClock::new(),
        inbox_rx,
        StatusReporter::new(outbox_tx),
    );
    node.run(&shutdown);

    // Dropping the last reporter lets the link flush and disconnect
    drop(node);
    storage.unmount();
    if link_thread.join().is_err() {
        log::error!("MQTT link thread panicked");
    }

    log::info!("Cleanup complete.");
    Ok(())
}
