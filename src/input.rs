use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PioError;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const ENTER: KeyCode = KeyCode(66);
    pub const SPACE: KeyCode = KeyCode(62);
}

impl Default for KeyCode {
    fn default() -> Self {
        KeyCode::SPACE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn down(code: KeyCode) -> Self {
        Self {
            code,
            action: KeyAction::Down,
        }
    }

    pub fn up(code: KeyCode) -> Self {
        Self {
            code,
            action: KeyAction::Up,
        }
    }
}

pub trait KeyEventSink: Send + Sync {
    fn send_key(&self, event: KeyEvent) -> Result<(), PioError>;
}

pub type KeyEventSender = mpsc::UnboundedSender<KeyEvent>;
pub type KeyEventReceiver = mpsc::UnboundedReceiver<KeyEvent>;

pub fn channel() -> (KeyEventSender, KeyEventReceiver) {
    mpsc::unbounded_channel()
}

impl KeyEventSink for KeyEventSender {
    fn send_key(&self, event: KeyEvent) -> Result<(), PioError> {
        self.send(event)
            .map_err(|e| PioError::IoFailure(format!("input queue closed: {e}")))
    }
}
