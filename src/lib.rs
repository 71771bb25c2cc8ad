use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge::{DataBridge, PumpStats};
use control::{ControlSession, ControlStats};
use error::GatewayResult;
use interface::SerialLine;
use interface::tcp::{TcpClient, accept_latest, bind_listener};
use settings::Settings;
use store::{PersistentRegion, SettingsStore};
use tracing::{debug, info, warn};

pub mod bridge;
pub mod codec;
pub(crate) mod constants;
pub mod control;
pub mod error;
pub mod interface;
pub mod settings;
pub mod store;
pub mod util;

pub use constants::{
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_TICK_INTERVAL, LABEL_CAPACITY,
    MIN_PLAUSIBLE_BAUDRATE, PERSISTENT_REGION_SIZE,
};

/// Listener and scheduling parameters
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: IpAddr,
    pub data_port: u16,
    pub control_port: u16,
    /// Without the control channel the settings stay as loaded at boot
    pub control_enabled: bool,
    pub tick_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            data_port: DEFAULT_DATA_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            control_enabled: true,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Something living next to the gateway that needs a slice of every tick,
/// e.g. a firmware updater or a discovery responder. `poll` must not block.
pub trait Collaborator {
    fn name(&self) -> &str;

    fn poll(&mut self) -> GatewayResult<()>;
}

/// One step of a scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    AcceptData,
    AcceptControl,
    PollControl,
    PumpBridge,
    ServiceCollaborators,
}

/// Every tick runs these phases in this order
pub const TICK_PHASES: [TickPhase; 5] = [
    TickPhase::AcceptData,
    TickPhase::AcceptControl,
    TickPhase::PollControl,
    TickPhase::PumpBridge,
    TickPhase::ServiceCollaborators,
];

/// What a single tick did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub data_accepted: bool,
    pub control_accepted: bool,
    pub control: ControlStats,
    pub pumped: PumpStats,
}

/// Close and reopen the serial line with `settings`. A failed open is
/// logged and the line stays closed until the next change.
pub(crate) fn apply_settings<S: SerialLine + ?Sized>(serial: &mut S, settings: &Settings) {
    let config = settings.serial_config();
    info!("Applying serial settings: {} (config 0x{:02x})", settings, config.bits());
    if let Err(e) = serial.reopen(settings.baudrate, config) {
        warn!("Serial reopen failed: {}", e);
    }
    if !serial.is_open() {
        warn!("Serial line closed until the settings change");
    }
}

/// Serial-to-TCP gateway.
///
/// Owns the live settings, the serial line and both connections; everything
/// runs on the caller's thread, one `tick` at a time.
pub struct Gateway<S: SerialLine, R: PersistentRegion> {
    config: GatewayConfig,
    settings: Settings,
    store: SettingsStore<R>,
    serial: S,
    data_listener: TcpListener,
    control_listener: Option<TcpListener>,
    bridge: DataBridge<TcpClient>,
    control: ControlSession<TcpClient>,
    collaborators: Vec<Box<dyn Collaborator>>,
}

impl<S: SerialLine, R: PersistentRegion> Gateway<S, R> {
    /// Load (and if needed repair) the stored settings, open the serial
    /// line with them and start listening.
    pub fn new(config: GatewayConfig, mut serial: S, region: R) -> GatewayResult<Self> {
        let mut store = SettingsStore::new(region);
        let settings = store.boot_repair()?;
        apply_settings(&mut serial, &settings);

        let data_listener = bind_listener(SocketAddr::new(config.bind_address, config.data_port))?;
        info!("Data channel listening on {}", local_addr(&data_listener));

        let control_listener = if config.control_enabled {
            let listener =
                bind_listener(SocketAddr::new(config.bind_address, config.control_port))?;
            info!("Control channel listening on {}", local_addr(&listener));
            Some(listener)
        } else {
            info!("Control channel disabled");
            None
        };

        Ok(Gateway {
            config,
            settings,
            store,
            serial,
            data_listener,
            control_listener,
            bridge: DataBridge::new(),
            control: ControlSession::new(),
            collaborators: Vec::new(),
        })
    }

    pub fn register_collaborator(&mut self, collaborator: Box<dyn Collaborator>) {
        debug!("Registered collaborator {}", collaborator.name());
        self.collaborators.push(collaborator);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &SettingsStore<R> {
        &self.store
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn data_addr(&self) -> GatewayResult<SocketAddr> {
        self.data_listener.local_addr().map_err(|e| {
            error::GatewayError::Communication(format!("Data listener has no address: {}", e))
        })
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Run every phase once. Failures are logged; the next tick starts over.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for phase in TICK_PHASES {
            if let Err(e) = self.run_phase(phase, &mut report) {
                warn!("Tick phase {:?} failed: {}", phase, e);
            }
        }

        report
    }

    fn run_phase(&mut self, phase: TickPhase, report: &mut TickReport) -> GatewayResult<()> {
        match phase {
            TickPhase::AcceptData => {
                if let Some(client) = accept_latest(&self.data_listener)? {
                    info!("Data client connected from {}", client.peer());
                    self.bridge.attach(client);
                    report.data_accepted = true;
                }
            }
            TickPhase::AcceptControl => {
                let Some(listener) = self.control_listener.as_ref() else {
                    return Ok(());
                };
                if let Some(client) = accept_latest(listener)? {
                    info!("Control client connected from {}", client.peer());
                    self.control.attach(client);
                    report.control_accepted = true;
                }
            }
            TickPhase::PollControl => {
                report.control =
                    self.control
                        .poll(&mut self.settings, &mut self.store, &mut self.serial)?;
            }
            TickPhase::PumpBridge => {
                report.pumped = self.bridge.pump(&mut self.serial)?;
            }
            TickPhase::ServiceCollaborators => {
                for collaborator in self.collaborators.iter_mut() {
                    if let Err(e) = collaborator.poll() {
                        warn!("Collaborator {} failed: {}", collaborator.name(), e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Tick until `running` is cleared, sleeping between ticks so
    /// collaborators and the OS get their turn.
    pub fn run(&mut self, running: &AtomicBool) {
        info!("Gateway running, label {}", self.settings.label);
        while running.load(Ordering::SeqCst) {
            self.tick();
            std::thread::sleep(self.config.tick_interval);
        }
        info!("Gateway stopped");
    }
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
