mod backend;
pub mod board;
pub mod config;
pub mod dispatch;
pub mod driver;
mod error;
pub mod gpio;
pub mod input;
pub mod lifecycle;
pub mod samples;
pub mod watcher;

pub use board::{BoardPins, BoardTable};
pub use config::{ActiveType, AppConfig, EdgeTrigger, LineConfig, Sample};
pub use driver::{ButtonInputDriver, LogicState};
pub use error::PioError;
pub use gpio::{
    DetachedEdgeSource, Direction, EdgeKind, EdgeNotifier, GpioBackend, LineDriver,
    PeripheralManager, PinHandle,
};
pub use input::{KeyAction, KeyCode, KeyEvent, KeyEventSink};
pub use lifecycle::{ActivationContext, Activity, Lifecycle, LifecycleState, Resource};
pub use watcher::{Continuation, EdgeSubscription, LogicalEvent};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
