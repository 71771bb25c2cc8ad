use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use serbridge::{
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, Gateway, GatewayConfig, PERSISTENT_REGION_SIZE,
    error::{GatewayError, GatewayResult},
    interface::serialport::{SerialPortLine, first_usb_serial_port},
    store::{FileRegion, MemoryRegion, PersistentRegion},
};
use tracing::info;

#[derive(Parser, Debug, Clone)]
pub(crate) struct RunOptions {
    /// Serial port (first USB serial adapter if omitted)
    #[clap(short, long)]
    serial: Option<String>,

    /// Address both listeners bind to
    #[clap(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// TCP port of the raw data channel
    #[clap(short, long, default_value_t = DEFAULT_DATA_PORT)]
    data_port: u16,

    /// TCP port of the line-based control channel
    #[clap(short, long, default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    /// Do not listen for control connections
    #[clap(long, default_value_t = false)]
    no_control: bool,

    /// File holding the persisted settings
    #[clap(long, default_value = "serbridge.eeprom")]
    store: PathBuf,

    /// Keep settings in memory only; `save` does not survive a restart
    #[clap(long, default_value_t = false)]
    volatile: bool,

    /// Pause between scheduler ticks in microseconds
    #[clap(long, default_value_t = 500)]
    tick_micros: u64,

    /// Log at debug level
    #[clap(short, long, default_value_t = false)]
    pub(crate) verbose: bool,
}

pub(crate) fn handle_run(opts: RunOptions) -> GatewayResult<()> {
    let port = match opts.serial.clone() {
        Some(port) => port,
        None => first_usb_serial_port()?,
    };
    info!("Using serial port {}", port);

    let config = GatewayConfig {
        bind_address: opts.bind,
        data_port: opts.data_port,
        control_port: opts.control_port,
        control_enabled: !opts.no_control,
        tick_interval: Duration::from_micros(opts.tick_micros),
    };
    let serial = SerialPortLine::new(port);

    if opts.volatile {
        info!("Settings are volatile");
        serve(config, serial, MemoryRegion::new())
    } else {
        info!("Settings stored in {}", opts.store.display());
        let region = FileRegion::open(&opts.store, PERSISTENT_REGION_SIZE)?;
        serve(config, serial, region)
    }
}

fn serve<R: PersistentRegion>(
    config: GatewayConfig,
    serial: SerialPortLine,
    region: R,
) -> GatewayResult<()> {
    let mut gateway = Gateway::new(config, serial, region)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)).map_err(|e| {
            GatewayError::Configuration(format!("Failed to set Ctrl-C handler: {}", e))
        })?;
    }

    gateway.run(&running);
    Ok(())
}
