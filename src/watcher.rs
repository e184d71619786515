use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::EdgeTrigger;
use crate::error::PioError;
use crate::gpio::{EdgeKind, PinHandle, PinShared};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalEvent {
    pub pin: String,
    pub edge: EdgeKind,
    /// Polarity-corrected level: `true` means pressed / active.
    pub asserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    KeepActive,
    StopActive,
}

impl From<bool> for Continuation {
    fn from(keep: bool) -> Self {
        if keep {
            Continuation::KeepActive
        } else {
            Continuation::StopActive
        }
    }
}

pub type EdgeCallback = Box<dyn FnMut(LogicalEvent) -> Continuation + Send>;

pub(crate) struct Subscriber {
    id: u64,
    callback: Arc<Mutex<EdgeCallback>>,
}

impl PinHandle {
    pub fn subscribe<F>(&self, callback: F) -> Result<EdgeSubscription, PioError>
    where
        F: FnMut(LogicalEvent) -> Continuation + Send + 'static,
    {
        let shared = self.shared();
        let mut state = shared.state.lock();
        let name = &shared.name;

        if state.closed {
            return Err(PioError::Closed(name.clone()));
        }
        if !state.direction.is_input() {
            return Err(PioError::InvalidConfiguration(format!(
                "{name} is not configured as input"
            )));
        }
        if state.edge == EdgeTrigger::None {
            return Err(PioError::InvalidConfiguration(format!(
                "{name} has no edge trigger configured"
            )));
        }
        if state.subscriber.is_some() {
            return Err(PioError::InvalidConfiguration(format!(
                "{name} already has an edge callback"
            )));
        }

        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriber = Some(Subscriber {
            id,
            callback: Arc::new(Mutex::new(Box::new(callback))),
        });
        debug!("registered edge callback on {name}");

        Ok(EdgeSubscription {
            pin: Arc::downgrade(shared),
            name: name.clone(),
            id,
        })
    }
}

pub struct EdgeSubscription {
    pin: Weak<PinShared>,
    name: String,
    id: u64,
}

impl EdgeSubscription {
    pub fn pin_name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.pin.upgrade().is_some_and(|shared| {
            let state = shared.state.lock();
            !state.closed && state.subscriber.as_ref().is_some_and(|s| s.id == self.id)
        })
    }

    pub fn unsubscribe(&self) {
        let Some(shared) = self.pin.upgrade() else {
            return;
        };
        let removed = {
            let _fence = shared.delivery.lock();
            take_subscriber(&shared, self.id)
        };
        if removed.is_some() {
            debug!("unregistered edge callback on {}", self.name);
        }
    }
}

impl Drop for EdgeSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn take_subscriber(shared: &PinShared, id: u64) -> Option<Subscriber> {
    let mut state = shared.state.lock();
    if state.subscriber.as_ref().is_some_and(|s| s.id == id) {
        state.subscriber.take()
    } else {
        None
    }
}

pub(crate) fn deliver(shared: &PinShared, edge: EdgeKind) {
    let _fence = shared.delivery.lock();

    let (callback, id, asserted) = {
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.closed {
            return;
        }
        let Some(subscriber) = state.subscriber.as_ref() else {
            return;
        };
        let (callback, id) = (subscriber.callback.clone(), subscriber.id);
        let Some(driver) = state.driver.as_mut() else {
            return;
        };
        match driver.read_level() {
            Ok(level) => (callback, id, state.active_type.apply(level)),
            Err(e) => {
                warn!("Error reading GPIO {}: {e}", shared.name);
                return;
            }
        }
    };

    let Some(mut callback) = callback.try_lock() else {
        debug!("nested edge on {} dropped", shared.name);
        return;
    };
    let next = (*callback)(LogicalEvent {
        pin: shared.name.clone(),
        edge,
        asserted,
    });
    drop(callback);

    if next == Continuation::StopActive && take_subscriber(shared, id).is_some() {
        debug!("edge callback on {} asked to stop", shared.name);
    }
}
