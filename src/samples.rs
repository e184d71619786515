use log::{error, warn};

use crate::config::{ActiveType, EdgeTrigger, Sample};
use crate::dispatch::{self, Echo, LogValue, OutputSlot};
use crate::driver::{ButtonInputDriver, LogicState};
use crate::error::PioError;
use crate::gpio::{Direction, PinHandle};
use crate::input::KeyCode;
use crate::lifecycle::{ActivationContext, Activity, Resource};

impl Sample {
    pub fn build(self, key: KeyCode) -> Box<dyn Activity> {
        match self {
            Sample::Button => Box::new(ButtonSample),
            Sample::Led => Box::new(LedSample::default()),
            Sample::Driver => Box::new(DriverSample::new(key)),
        }
    }
}

// value is true when the pin is LOW
fn configure_button(pin: &PinHandle) -> Result<(), PioError> {
    pin.configure_direction(Direction::In)?;
    pin.configure_edge_trigger(EdgeTrigger::Both)?;
    pin.configure_active_type(ActiveType::Low)
}

fn open_led(ctx: &mut ActivationContext<'_>, name: &str, slot: &OutputSlot) -> Result<(), PioError> {
    let led = ctx.open_gpio(name)?;
    led.configure_direction(Direction::Out(false))?;
    slot.attach(led);
    Ok(())
}

pub struct ButtonSample;

impl Activity for ButtonSample {
    fn name(&self) -> &'static str {
        "button"
    }

    fn on_create(&mut self, ctx: &mut ActivationContext<'_>) {
        let button = ctx.pins().button.clone();
        ctx.attempt("button GPIO", |ctx| {
            let pin = ctx.open_gpio(&button)?;
            configure_button(&pin)?;
            let subscription = dispatch::subscribe(&pin, LogValue)?;
            ctx.hold(Resource::Subscription(subscription));
            Ok(())
        });
    }
}

#[derive(Default)]
pub struct LedSample {
    led: OutputSlot,
}

impl Activity for LedSample {
    fn name(&self) -> &'static str {
        "led"
    }

    fn on_create(&mut self, ctx: &mut ActivationContext<'_>) {
        let pins = ctx.pins().clone();

        let target = self.led.clone();
        ctx.attempt("button GPIO", |ctx| {
            let pin = ctx.open_gpio(&pins.button)?;
            configure_button(&pin)?;
            let subscription = dispatch::subscribe(&pin, Echo::new(target))?;
            ctx.hold(Resource::Subscription(subscription));
            Ok(())
        });

        ctx.attempt("LED GPIO", |ctx| open_led(ctx, &pins.led, &self.led));
    }

    fn on_destroy(&mut self) {
        self.led.detach();
    }
}

pub struct DriverSample {
    key: KeyCode,
    led: OutputSlot,
}

impl DriverSample {
    pub fn new(key: KeyCode) -> Self {
        Self {
            key,
            led: OutputSlot::new(),
        }
    }

    fn set_led_value(&self, value: bool) {
        if self.led.get().is_none() {
            warn!("LED is not open, ignoring value {value}");
            return;
        }
        if let Err(e) = self.led.write(value) {
            error!("Error updating GPIO value: {e}");
        }
    }
}

impl Activity for DriverSample {
    fn name(&self) -> &'static str {
        "driver"
    }

    fn on_create(&mut self, ctx: &mut ActivationContext<'_>) {
        let pins = ctx.pins().clone();
        let key = self.key;

        ctx.attempt("button driver", |ctx| {
            let mut driver =
                ButtonInputDriver::open(ctx.manager(), &pins.button, LogicState::PressedWhenLow, key)?;
            let registered = driver.register(ctx.key_sink());
            ctx.hold(Resource::Driver(driver));
            registered
        });

        ctx.attempt("LED GPIO", |ctx| open_led(ctx, &pins.led, &self.led));
    }

    fn on_destroy(&mut self) {
        self.led.detach();
    }

    fn on_key_down(&mut self, code: KeyCode) -> bool {
        if code != self.key {
            return false;
        }
        self.set_led_value(true);
        true
    }

    fn on_key_up(&mut self, code: KeyCode) -> bool {
        if code != self.key {
            return false;
        }
        self.set_led_value(false);
        true
    }
}
