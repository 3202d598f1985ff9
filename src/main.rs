use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use contactd::{AppConfig, DebounceError, DebounceManager, GpioBackend};

#[cfg(feature = "hardware-gpio")]
use contactd::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use contactd::MockGpioBackend;

/// Externally visible state of one contact sensor.
struct Contact {
    index: usize,
    name: String,
    triggered: AtomicBool,
}

fn contact_trigger_handler(contact: &Arc<Contact>) {
    info!("Contact {} ({}) triggered.", contact.index, contact.name);
    contact.triggered.store(true, Ordering::Release);
}

fn contact_clear_handler(contact: &Arc<Contact>) {
    info!("Contact {} ({}) cleared.", contact.index, contact.name);
    contact.triggered.store(false, Ordering::Release);
}

fn start_contacts<B: GpioBackend + 'static>(
    manager: &DebounceManager<B>,
    config: &AppConfig,
) -> Result<Vec<Arc<Contact>>, DebounceError> {
    let mut pins: Vec<_> = config.contacts.iter().collect();
    pins.sort_by_key(|(pin, _)| **pin);

    let mut contacts = Vec::with_capacity(pins.len());
    let mut ids = Vec::with_capacity(pins.len());
    for (index, (pin, cfg)) in pins.into_iter().enumerate() {
        let id = manager.create_with_pull(*pin, cfg.active_level, cfg.pull)?;
        let contact = Arc::new(Contact {
            index,
            name: cfg.name.clone(),
            triggered: AtomicBool::new(false),
        });
        manager.set_release_callback(id, contact.clone(), contact_clear_handler)?;
        manager.set_press_callback(id, contact.clone(), contact_trigger_handler)?;
        contacts.push(contact);
        ids.push(id);
    }

    // every callback is in place before the first event is raised
    for id in ids {
        manager.init(id)?;
    }

    Ok(contacts)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONTACTD_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load_from_file(&config_path)
        .unwrap_or_else(|e| panic!("Failed to load config: {e}"));

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            Arc::new(
                LibgpiodBackend::new(&config.contacts)
                    .unwrap_or_else(|e| panic!("Failed to init libgpiod backend: {e}")),
            )
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            Arc::new(MockGpioBackend::default())
        }
    };

    let manager = DebounceManager::new(backend, config.debounce)
        .unwrap_or_else(|e| panic!("Failed to start debounce worker: {e}"));

    let contacts = start_contacts(&manager, &config)
        .unwrap_or_else(|e| panic!("Failed to start contact monitoring: {e}"));
    info!(
        "Monitoring {} contacts with a {} ms quiet interval",
        contacts.len(),
        config.debounce.quiet_interval_ms
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for id in manager.channel_ids() {
        if let Err(e) = manager.delete(id) {
            warn!("failed to delete {id}: {e}");
        }
    }
    for contact in &contacts {
        info!(
            "Contact {} final state: {}",
            contact.name,
            if contact.triggered.load(Ordering::Acquire) { "triggered" } else { "clear" }
        );
    }

    Ok(())
}
