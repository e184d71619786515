use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashSet;

use crate::config::{ActiveType, EdgeTrigger};
use crate::error::PioError;
use crate::watcher::{self, Subscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

impl EdgeKind {
    pub fn from_levels(old: bool, new: bool) -> Option<Self> {
        match (old, new) {
            (false, true) => Some(EdgeKind::Rising),
            (true, false) => Some(EdgeKind::Falling),
            _ => None,
        }
    }

    pub fn matches(self, trigger: EdgeTrigger) -> bool {
        match trigger {
            EdgeTrigger::None => false,
            EdgeTrigger::Rising => self == EdgeKind::Rising,
            EdgeTrigger::Falling => self == EdgeKind::Falling,
            EdgeTrigger::Both => true,
        }
    }
}

/// Called by a backend for every edge matching the configured trigger.
///
/// Backends must not hold their own locks while calling it: delivery reads
/// the line back through the same driver.
pub type EdgeNotifier = Arc<dyn Fn(EdgeKind) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out(bool),
}

impl Direction {
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::In)
    }
}

pub trait GpioBackend: Send + Sync {
    fn line_names(&self) -> Vec<String>;
    fn open_line(&self, name: &str) -> Result<Box<dyn LineDriver>, PioError>;
}

/// Background edge source taken out of a driver. Dropping it stops the source
/// and waits for an in-flight notification, so it must be dropped with no pin
/// lock held.
pub type DetachedEdgeSource = Box<dyn Send>;

pub trait LineDriver: Send {
    fn configure_input(&mut self) -> Result<(), PioError>;
    fn configure_output(&mut self, level: bool) -> Result<(), PioError>;
    fn set_edge_trigger(
        &mut self,
        trigger: EdgeTrigger,
        notifier: Option<EdgeNotifier>,
    ) -> Result<(), PioError>;
    fn read_level(&mut self) -> Result<bool, PioError>;
    fn write_level(&mut self, level: bool) -> Result<(), PioError>;
    fn release(&mut self) -> Result<(), PioError>;

    fn detach_edge_source(&mut self) -> Option<DetachedEdgeSource> {
        None
    }
}

type LeaseTable = Arc<Mutex<FxHashSet<String>>>;

pub struct PeripheralManager {
    backend: Arc<dyn GpioBackend>,
    leases: LeaseTable,
}

impl PeripheralManager {
    pub fn new(backend: Arc<dyn GpioBackend>) -> Self {
        Self {
            backend,
            leases: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    pub fn gpio_list(&self) -> Vec<String> {
        let mut names = self.backend.line_names();
        names.sort();
        names
    }

    pub fn open_gpio(&self, name: &str) -> Result<PinHandle, PioError> {
        let mut leases = self.leases.lock();
        if leases.contains(name) {
            return Err(PioError::PinUnavailable(format!("{name} is already open")));
        }

        let driver = self.backend.open_line(name)?;
        leases.insert(name.to_string());
        debug!("opened GPIO {name}");

        Ok(PinHandle::new(name, driver, self.leases.clone()))
    }
}

pub(crate) struct PinShared {
    pub(crate) name: String,
    // held across read + callback; close takes it before tearing down
    pub(crate) delivery: ReentrantMutex<()>,
    pub(crate) state: Mutex<PinState>,
}

pub(crate) struct PinState {
    pub(crate) closed: bool,
    pub(crate) direction: Direction,
    pub(crate) active_type: ActiveType,
    pub(crate) edge: EdgeTrigger,
    pub(crate) driver: Option<Box<dyn LineDriver>>,
    pub(crate) subscriber: Option<Subscriber>,
    pub(crate) next_subscription: u64,
}

pub struct PinHandle {
    shared: Arc<PinShared>,
    leases: LeaseTable,
}

impl PinHandle {
    fn new(name: &str, driver: Box<dyn LineDriver>, leases: LeaseTable) -> Self {
        Self {
            shared: Arc::new(PinShared {
                name: name.to_string(),
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(PinState {
                    closed: false,
                    direction: Direction::In,
                    active_type: ActiveType::High,
                    edge: EdgeTrigger::None,
                    driver: Some(driver),
                    subscriber: None,
                    next_subscription: 0,
                }),
            }),
            leases,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<PinShared> {
        &self.shared
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn direction(&self) -> Direction {
        self.shared.state.lock().direction
    }

    pub fn edge_trigger(&self) -> EdgeTrigger {
        self.shared.state.lock().edge
    }

    pub fn active_type(&self) -> ActiveType {
        self.shared.state.lock().active_type
    }

    fn with_open_state<T>(
        &self,
        f: impl FnOnce(&mut PinState, &mut dyn LineDriver) -> Result<T, PioError>,
    ) -> Result<T, PioError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(PioError::Closed(self.shared.name.clone()));
        }
        let mut driver = state
            .driver
            .take()
            .ok_or_else(|| PioError::Closed(self.shared.name.clone()))?;
        let result = f(state, &mut *driver);
        state.driver = Some(driver);
        result
    }

    pub fn configure_direction(&self, direction: Direction) -> Result<(), PioError> {
        let name = self.name();
        let mut retired = None;
        let result = self.with_open_state(|state, driver| {
            match direction {
                Direction::In => driver.configure_input()?,
                Direction::Out(initial) => {
                    if state.subscriber.is_some() {
                        return Err(PioError::InvalidConfiguration(format!(
                            "{name} has an active edge callback and cannot become an output"
                        )));
                    }
                    retired = driver.detach_edge_source();
                    if state.edge != EdgeTrigger::None {
                        driver.set_edge_trigger(EdgeTrigger::None, None)?;
                        state.edge = EdgeTrigger::None;
                    }
                    driver.configure_output(state.active_type.apply(initial))?;
                }
            }
            state.direction = direction;
            Ok(())
        });
        drop(retired);
        result
    }

    pub fn configure_edge_trigger(&self, trigger: EdgeTrigger) -> Result<(), PioError> {
        let name = self.name();
        let notifier = (trigger != EdgeTrigger::None).then(|| self.notifier());
        let mut retired = None;
        let result = self.with_open_state(|state, driver| {
            if !state.direction.is_input() {
                return Err(PioError::InvalidConfiguration(format!(
                    "edge trigger requires {name} to be an input"
                )));
            }
            if trigger == EdgeTrigger::None && state.subscriber.is_some() {
                return Err(PioError::InvalidConfiguration(format!(
                    "{name} has an active edge callback, unregister it first"
                )));
            }
            retired = driver.detach_edge_source();
            driver.set_edge_trigger(trigger, notifier)?;
            state.edge = trigger;
            Ok(())
        });
        // the old listener may be blocked in delivery on the state lock
        drop(retired);
        result
    }

    pub fn configure_active_type(&self, active_type: ActiveType) -> Result<(), PioError> {
        self.with_open_state(|state, _| {
            state.active_type = active_type;
            Ok(())
        })
    }

    pub fn read(&self) -> Result<bool, PioError> {
        let name = self.name();
        self.with_open_state(|state, driver| {
            if !state.direction.is_input() {
                return Err(PioError::InvalidConfiguration(format!(
                    "{name} is not configured as input"
                )));
            }
            Ok(state.active_type.apply(driver.read_level()?))
        })
    }

    pub fn write(&self, value: bool) -> Result<(), PioError> {
        let name = self.name();
        self.with_open_state(|state, driver| {
            if state.direction.is_input() {
                return Err(PioError::InvalidConfiguration(format!(
                    "{name} must be an output to set its value"
                )));
            }
            driver.write_level(state.active_type.apply(value))
        })
    }

    /// Releases the line. Calling it again is a no-op.
    ///
    /// Waits for an in-flight edge delivery on another thread; once this
    /// returns no callback observes the handle.
    pub fn close(&self) -> Result<(), PioError> {
        let (driver, subscriber) = {
            let _fence = self.shared.delivery.lock();
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            (state.driver.take(), state.subscriber.take())
        };
        drop(subscriber);

        let result = match driver {
            Some(mut driver) => driver.release(),
            None => Ok(()),
        };
        self.leases.lock().remove(&self.shared.name);
        debug!("closed GPIO {}", self.shared.name);

        result
    }

    fn notifier(&self) -> EdgeNotifier {
        let pin: Weak<PinShared> = Arc::downgrade(&self.shared);
        Arc::new(move |edge| {
            if let Some(shared) = pin.upgrade() {
                watcher::deliver(&shared, edge);
            }
        })
    }
}

impl Drop for PinHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing GPIO {}: {e}", self.shared.name);
        }
    }
}
