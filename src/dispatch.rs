use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;

use crate::error::PioError;
use crate::gpio::PinHandle;
use crate::input::{KeyCode, KeyEvent, KeyEventSink};
use crate::watcher::{Continuation, EdgeSubscription, LogicalEvent};

pub trait EdgeAction: Send + 'static {
    fn on_event(&mut self, event: &LogicalEvent) -> Continuation;
}

pub fn subscribe<A: EdgeAction>(pin: &PinHandle, mut action: A) -> Result<EdgeSubscription, PioError> {
    pin.subscribe(move |event| action.on_event(&event))
}

pub struct LogValue;

impl EdgeAction for LogValue {
    fn on_event(&mut self, event: &LogicalEvent) -> Continuation {
        info!("GPIO changed, button {}", event.asserted);
        Continuation::KeepActive
    }
}

#[derive(Clone, Default)]
pub struct OutputSlot(Arc<RwLock<Option<Arc<PinHandle>>>>);

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, pin: Arc<PinHandle>) {
        *self.0.write() = Some(pin);
    }

    pub fn detach(&self) -> Option<Arc<PinHandle>> {
        self.0.write().take()
    }

    pub fn get(&self) -> Option<Arc<PinHandle>> {
        self.0.read().clone()
    }

    pub fn write(&self, value: bool) -> Result<(), PioError> {
        match self.get() {
            Some(pin) => pin.write(value),
            None => Err(PioError::PinUnavailable("output pin is not open".into())),
        }
    }
}

pub struct Echo {
    target: OutputSlot,
}

impl Echo {
    pub fn new(target: OutputSlot) -> Self {
        Self { target }
    }
}

impl EdgeAction for Echo {
    fn on_event(&mut self, event: &LogicalEvent) -> Continuation {
        if let Err(e) = self.target.write(event.asserted) {
            warn!("Error mirroring {} to output: {e}", event.pin);
        }
        Continuation::KeepActive
    }
}

pub struct KeySynthesis {
    code: KeyCode,
    sink: Arc<dyn KeyEventSink>,
}

impl KeySynthesis {
    pub fn new(code: KeyCode, sink: Arc<dyn KeyEventSink>) -> Self {
        Self { code, sink }
    }
}

impl EdgeAction for KeySynthesis {
    fn on_event(&mut self, event: &LogicalEvent) -> Continuation {
        let key = if event.asserted {
            KeyEvent::down(self.code)
        } else {
            KeyEvent::up(self.code)
        };
        if let Err(e) = self.sink.send_key(key) {
            warn!("Error injecting key event for {}: {e}", event.pin);
        }
        Continuation::KeepActive
    }
}
