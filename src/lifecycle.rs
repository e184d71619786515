use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::board::BoardPins;
use crate::driver::ButtonInputDriver;
use crate::error::PioError;
use crate::gpio::{PeripheralManager, PinHandle};
use crate::input::{KeyAction, KeyCode, KeyEvent, KeyEventSink};
use crate::watcher::EdgeSubscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Opening,
    Active,
    Closing,
    Closed,
}

pub enum Resource {
    Pin(Arc<PinHandle>),
    Subscription(EdgeSubscription),
    Driver(ButtonInputDriver),
}

impl Resource {
    fn label(&self) -> String {
        match self {
            Resource::Pin(pin) => format!("GPIO {}", pin.name()),
            Resource::Subscription(sub) => format!("edge callback on {}", sub.pin_name()),
            Resource::Driver(driver) => format!("input driver on {}", driver.pin_name()),
        }
    }

    fn unregister(&mut self) {
        match self {
            Resource::Subscription(sub) => sub.unsubscribe(),
            Resource::Driver(driver) => driver.unregister(),
            Resource::Pin(_) => {}
        }
    }

    fn close(&mut self) -> Result<(), PioError> {
        match self {
            Resource::Pin(pin) => pin.close(),
            Resource::Driver(driver) => driver.close(),
            Resource::Subscription(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivationFailure {
    pub label: String,
    pub error: PioError,
}

pub trait Activity: Send {
    fn name(&self) -> &'static str;

    fn on_create(&mut self, ctx: &mut ActivationContext<'_>);

    fn on_destroy(&mut self) {}

    fn on_key_down(&mut self, _code: KeyCode) -> bool {
        false
    }

    fn on_key_up(&mut self, _code: KeyCode) -> bool {
        false
    }
}

pub struct ActivationContext<'a> {
    manager: &'a PeripheralManager,
    pins: &'a BoardPins,
    keys: &'a Arc<dyn KeyEventSink>,
    resources: &'a mut Vec<Resource>,
    failures: &'a mut Vec<ActivationFailure>,
}

impl ActivationContext<'_> {
    pub fn manager(&self) -> &PeripheralManager {
        self.manager
    }

    pub fn pins(&self) -> &BoardPins {
        self.pins
    }

    pub fn key_sink(&self) -> Arc<dyn KeyEventSink> {
        self.keys.clone()
    }

    pub fn open_gpio(&mut self, name: &str) -> Result<Arc<PinHandle>, PioError> {
        let pin = Arc::new(self.manager.open_gpio(name)?);
        self.resources.push(Resource::Pin(pin.clone()));
        Ok(pin)
    }

    pub fn hold(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Runs one independent opening step. A failure is logged and recorded;
    /// whatever the step registered before failing stays held.
    pub fn attempt<F>(&mut self, label: &str, step: F) -> bool
    where
        F: FnOnce(&mut Self) -> Result<(), PioError>,
    {
        match step(self) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error opening {label}: {e}");
                self.failures.push(ActivationFailure {
                    label: label.to_string(),
                    error: e,
                });
                false
            }
        }
    }
}

pub struct Lifecycle {
    state: LifecycleState,
    activity: Box<dyn Activity>,
    manager: Arc<PeripheralManager>,
    pins: BoardPins,
    keys: Arc<dyn KeyEventSink>,
    resources: Vec<Resource>,
    failures: Vec<ActivationFailure>,
}

impl Lifecycle {
    pub fn new(
        activity: Box<dyn Activity>,
        manager: Arc<PeripheralManager>,
        pins: BoardPins,
        keys: Arc<dyn KeyEventSink>,
    ) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            activity,
            manager,
            pins,
            keys,
            resources: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn failures(&self) -> &[ActivationFailure] {
        &self.failures
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn activate(&mut self) -> Result<(), PioError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(PioError::InvalidState(format!(
                "cannot activate from {:?}",
                self.state
            )));
        }
        self.state = LifecycleState::Opening;
        info!("Starting {} sample", self.activity.name());
        debug!("Available GPIO: {:?}", self.manager.gpio_list());

        let mut ctx = ActivationContext {
            manager: self.manager.as_ref(),
            pins: &self.pins,
            keys: &self.keys,
            resources: &mut self.resources,
            failures: &mut self.failures,
        };
        self.activity.on_create(&mut ctx);

        if self.is_degraded() {
            warn!(
                "{} sample active with {} peripheral(s) missing",
                self.activity.name(),
                self.failures.len()
            );
        }
        self.state = LifecycleState::Active;
        Ok(())
    }

    pub fn dispatch_key(&mut self, event: KeyEvent) -> bool {
        if self.state != LifecycleState::Active {
            debug!("key event {event:?} ignored in state {:?}", self.state);
            return false;
        }
        let handled = match event.action {
            KeyAction::Down => self.activity.on_key_down(event.code),
            KeyAction::Up => self.activity.on_key_up(event.code),
        };
        if !handled {
            debug!("key event {event:?} not handled");
        }
        handled
    }

    pub fn deactivate(&mut self) -> Result<(), PioError> {
        if self.state != LifecycleState::Active {
            return Err(PioError::InvalidState(format!(
                "cannot deactivate from {:?}",
                self.state
            )));
        }
        self.state = LifecycleState::Closing;
        self.activity.on_destroy();
        self.release_all();
        self.state = LifecycleState::Closed;
        info!("Stopped {} sample", self.activity.name());
        Ok(())
    }

    fn release_all(&mut self) {
        for resource in self.resources.iter_mut().rev() {
            resource.unregister();
        }
        for resource in self.resources.iter_mut().rev() {
            if let Err(e) = resource.close() {
                error!("Error closing {}: {e}", resource.label());
            }
        }
        self.resources.clear();
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.state == LifecycleState::Active {
            let _ = self.deactivate();
        }
    }
}
