use std::sync::Arc;

use peripherals::samples::{ButtonSample, DriverSample, LedSample};
use peripherals::{
    Activity, BoardTable, ButtonInputDriver, KeyCode, KeyEvent, KeyEventSink, Lifecycle, LifecycleState,
    LogicState, MockGpioBackend, PeripheralManager, PioError, Sample, input,
};

const BUTTON: &str = "BCM21";
const LED: &str = "BCM6";

struct Rig {
    backend: Arc<MockGpioBackend>,
    manager: Arc<PeripheralManager>,
    keys: input::KeyEventReceiver,
    sink: Arc<dyn KeyEventSink>,
}

fn rig() -> Rig {
    let backend = Arc::new(MockGpioBackend::with_lines([BUTTON, LED]));
    // buttons idle high through their pull-up
    backend.set_input_level(BUTTON, true).unwrap();
    let manager = Arc::new(PeripheralManager::new(backend.clone()));
    let (tx, keys) = input::channel();

    Rig {
        backend,
        manager,
        keys,
        sink: Arc::new(tx),
    }
}

impl Rig {
    fn lifecycle(&self, sample: Sample) -> Lifecycle {
        let pins = BoardTable::default().resolve("rpi3").clone();
        Lifecycle::new(
            sample.build(KeyCode::SPACE),
            self.manager.clone(),
            pins,
            self.sink.clone(),
        )
    }

    fn press(&self) {
        self.backend.set_input_level(BUTTON, false).unwrap();
    }

    fn release(&self) {
        self.backend.set_input_level(BUTTON, true).unwrap();
    }

    fn pump(&mut self, lifecycle: &mut Lifecycle) -> Vec<bool> {
        let mut handled = Vec::new();
        while let Ok(event) = self.keys.try_recv() {
            handled.push(lifecycle.dispatch_key(event));
        }
        handled
    }
}

#[test]
fn button_sample_opens_and_releases_button() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Button);
    assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);

    lifecycle.activate().unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Active);
    assert!(r.backend.is_claimed(BUTTON).unwrap());
    assert!(!r.backend.is_claimed(LED).unwrap());

    r.press();
    r.release();

    lifecycle.deactivate().unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Closed);
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
}

#[test]
fn led_sample_mirrors_button() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Led);
    lifecycle.activate().unwrap();
    assert!(!lifecycle.is_degraded());

    r.press();
    assert_eq!(r.backend.writes(LED).unwrap(), vec![true]);
    r.release();
    assert_eq!(r.backend.writes(LED).unwrap(), vec![true, false]);

    lifecycle.deactivate().unwrap();
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
    assert_eq!(r.backend.releases(LED).unwrap(), 1);

    r.press();
    assert_eq!(r.backend.writes(LED).unwrap(), vec![true, false]);
}

#[test]
fn driver_sample_routes_key_events_to_led() {
    let mut r = rig();
    let mut lifecycle = r.lifecycle(Sample::Driver);
    lifecycle.activate().unwrap();

    r.press();
    assert_eq!(r.pump(&mut lifecycle), vec![true]);
    assert!(r.backend.level(LED).unwrap());

    r.release();
    assert_eq!(r.pump(&mut lifecycle), vec![true]);
    assert!(!r.backend.level(LED).unwrap());
    assert_eq!(r.backend.writes(LED).unwrap(), vec![true, false]);

    lifecycle.deactivate().unwrap();
}

#[test]
fn driver_sample_ignores_other_keys() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Driver);
    lifecycle.activate().unwrap();

    assert!(!lifecycle.dispatch_key(KeyEvent::down(KeyCode::ENTER)));
    assert!(!lifecycle.dispatch_key(KeyEvent::up(KeyCode::ENTER)));
    assert!(r.backend.writes(LED).unwrap().is_empty());
    assert!(!r.backend.level(LED).unwrap());
}

#[test]
fn input_failure_leaves_output_usable() {
    let r = rig();
    r.backend.set_fail_open(BUTTON, true).unwrap();
    let mut lifecycle = r.lifecycle(Sample::Driver);

    lifecycle.activate().unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Active);
    assert_eq!(lifecycle.failures().len(), 1);
    assert_eq!(lifecycle.failures()[0].label, "button driver");
    assert!(matches!(
        lifecycle.failures()[0].error,
        PioError::PinUnavailable(_)
    ));

    assert!(lifecycle.dispatch_key(KeyEvent::down(KeyCode::SPACE)));
    assert!(r.backend.level(LED).unwrap());

    lifecycle.deactivate().unwrap();
    assert_eq!(r.backend.releases(LED).unwrap(), 1);
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 0);
}

#[test]
fn missing_led_drops_mirrored_values() {
    let r = rig();
    r.backend.set_fail_open(LED, true).unwrap();
    let mut lifecycle = r.lifecycle(Sample::Led);

    lifecycle.activate().unwrap();
    assert!(lifecycle.is_degraded());
    assert_eq!(lifecycle.failures()[0].label, "LED GPIO");

    r.press();
    r.release();
    assert!(r.backend.writes(LED).unwrap().is_empty());

    lifecycle.deactivate().unwrap();
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
}

#[test]
fn led_write_failure_keeps_mirroring() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Led);
    lifecycle.activate().unwrap();

    r.backend.set_fail_writes(LED, true).unwrap();
    r.press();
    assert!(r.backend.writes(LED).unwrap().is_empty());

    r.backend.set_fail_writes(LED, false).unwrap();
    r.release();
    assert_eq!(r.backend.writes(LED).unwrap(), vec![false]);
}

#[test]
fn teardown_continues_after_close_failure() {
    let r = rig();
    r.backend.set_fail_release(LED, true).unwrap();
    let mut lifecycle = r.lifecycle(Sample::Led);
    lifecycle.activate().unwrap();

    lifecycle.deactivate().unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Closed);
    assert_eq!(r.backend.releases(LED).unwrap(), 1);
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
    assert!(!r.backend.is_claimed(BUTTON).unwrap());
}

#[test]
fn lifecycle_signals_must_be_ordered() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Button);

    assert!(matches!(
        lifecycle.deactivate(),
        Err(PioError::InvalidState(_))
    ));
    assert!(!lifecycle.dispatch_key(KeyEvent::down(KeyCode::SPACE)));

    lifecycle.activate().unwrap();
    assert!(matches!(lifecycle.activate(), Err(PioError::InvalidState(_))));
    lifecycle.deactivate().unwrap();
    assert!(matches!(
        lifecycle.deactivate(),
        Err(PioError::InvalidState(_))
    ));
}

#[test]
fn dropping_active_lifecycle_releases_pins() {
    let r = rig();
    let mut lifecycle = r.lifecycle(Sample::Led);
    lifecycle.activate().unwrap();
    drop(lifecycle);

    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
    assert_eq!(r.backend.releases(LED).unwrap(), 1);
}

#[test]
fn samples_can_be_built_directly() {
    let r = rig();
    let pins = BoardTable::default().resolve("rpi3bp").clone();

    let activities: Vec<Box<dyn Activity>> = vec![
        Box::new(ButtonSample),
        Box::new(LedSample::default()),
        Box::new(DriverSample::new(KeyCode::SPACE)),
    ];
    for activity in activities {
        let mut lifecycle = Lifecycle::new(activity, r.manager.clone(), pins.clone(), r.sink.clone());
        lifecycle.activate().unwrap();
        assert!(!lifecycle.is_degraded());
        lifecycle.deactivate().unwrap();
    }
}

#[test]
fn button_driver_registers_once() {
    let mut r = rig();
    let mut driver =
        ButtonInputDriver::open(&r.manager, BUTTON, LogicState::PressedWhenLow, KeyCode::SPACE)
            .unwrap();
    assert_eq!(driver.key_code(), KeyCode::SPACE);

    driver.register(r.sink.clone()).unwrap();
    assert!(driver.is_registered());
    assert!(matches!(
        driver.register(r.sink.clone()),
        Err(PioError::InvalidConfiguration(_))
    ));

    r.press();
    assert_eq!(r.keys.try_recv().unwrap(), KeyEvent::down(KeyCode::SPACE));
    r.release();
    assert_eq!(r.keys.try_recv().unwrap(), KeyEvent::up(KeyCode::SPACE));

    driver.unregister();
    assert!(!driver.is_registered());
    r.press();
    assert!(r.keys.try_recv().is_err());

    driver.close().unwrap();
    driver.close().unwrap();
    assert_eq!(r.backend.releases(BUTTON).unwrap(), 1);
}

#[test]
fn closed_input_queue_is_reported() {
    let (tx, rx) = input::channel();
    drop(rx);

    assert!(matches!(
        tx.send_key(KeyEvent::down(KeyCode::SPACE)),
        Err(PioError::IoFailure(_))
    ));
}
