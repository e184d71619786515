use log::{info, warn};
use std::sync::Arc;

use peripherals::{AppConfig, GpioBackend, Lifecycle, PeripheralManager, PioError, input};

#[cfg(feature = "hardware-gpio")]
use peripherals::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use peripherals::MockGpioBackend;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), PioError> {
    env_logger::init();

    let config = match std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PIO_CONFIG").ok())
    {
        Some(path) => AppConfig::load_from_file(&path)
            .unwrap_or_else(|e| panic!("Failed to load config: {e}")),
        None => AppConfig::default(),
    };

    let device = config
        .device
        .clone()
        .or_else(|| std::env::var("PIO_DEVICE").ok())
        .unwrap_or_default();
    let pins = config.boards.resolve(&device).clone();
    info!(
        "Device '{device}': button {}, LED {}",
        pins.button, pins.led
    );

    let backend: Arc<dyn GpioBackend> = {
        #[cfg(feature = "hardware-gpio")]
        {
            Arc::new(
                LibgpiodBackend::new(config.lines.clone())
                    .unwrap_or_else(|e| panic!("Failed to init libgpiod backend: {e}")),
            )
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            warn!("Built without hardware-gpio, using mock lines");
            Arc::new(MockGpioBackend::with_lines([
                pins.button.clone(),
                pins.led.clone(),
            ]))
        }
    };

    let manager = Arc::new(PeripheralManager::new(backend));
    let (key_tx, mut key_rx) = input::channel();
    let activity = config.sample.build(config.button_key);
    let mut lifecycle = Lifecycle::new(activity, manager, pins, Arc::new(key_tx));

    lifecycle.activate()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!("Failed to listen for shutdown signal: {e}");
                }
                break;
            }
            Some(event) = key_rx.recv() => {
                lifecycle.dispatch_key(event);
            }
        }
    }

    info!("Shutting down...");
    lifecycle.deactivate()
}
