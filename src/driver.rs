use std::sync::Arc;

use log::debug;

use crate::config::{ActiveType, EdgeTrigger};
use crate::dispatch::{self, KeySynthesis};
use crate::error::PioError;
use crate::gpio::{Direction, PeripheralManager, PinHandle};
use crate::input::{KeyCode, KeyEventSink};
use crate::watcher::EdgeSubscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicState {
    PressedWhenHigh,
    PressedWhenLow,
}

impl LogicState {
    fn active_type(self) -> ActiveType {
        match self {
            LogicState::PressedWhenHigh => ActiveType::High,
            LogicState::PressedWhenLow => ActiveType::Low,
        }
    }
}

pub struct ButtonInputDriver {
    pin: PinHandle,
    code: KeyCode,
    subscription: Option<EdgeSubscription>,
}

impl ButtonInputDriver {
    pub fn open(
        manager: &PeripheralManager,
        pin_name: &str,
        logic: LogicState,
        code: KeyCode,
    ) -> Result<Self, PioError> {
        let pin = manager.open_gpio(pin_name)?;
        pin.configure_direction(Direction::In)?;
        pin.configure_edge_trigger(EdgeTrigger::Both)?;
        pin.configure_active_type(logic.active_type())?;

        Ok(Self {
            pin,
            code,
            subscription: None,
        })
    }

    pub fn key_code(&self) -> KeyCode {
        self.code
    }

    pub fn pin_name(&self) -> &str {
        self.pin.name()
    }

    pub fn is_registered(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn register(&mut self, sink: Arc<dyn KeyEventSink>) -> Result<(), PioError> {
        if self.subscription.is_some() {
            return Err(PioError::InvalidConfiguration(format!(
                "input driver on {} is already registered",
                self.pin.name()
            )));
        }
        let subscription = dispatch::subscribe(&self.pin, KeySynthesis::new(self.code, sink))?;
        self.subscription = Some(subscription);
        debug!("input driver on {} registered for key {:?}", self.pin.name(), self.code);
        Ok(())
    }

    pub fn unregister(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn close(&mut self) -> Result<(), PioError> {
        self.unregister();
        self.pin.close()
    }
}
