use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rustc_hash::FxHashMap;

use crate::config::EdgeTrigger;
use crate::error::PioError;
use crate::gpio::{EdgeKind, EdgeNotifier, GpioBackend, LineDriver};

#[derive(Default)]
pub struct MockGpioBackend {
    lines: RwLock<FxHashMap<String, Arc<Mutex<MockLineState>>>>, // keyed by pin name
}

#[derive(Default)]
struct MockLineState {
    claimed: bool,
    output: bool,
    level: bool,
    edge: EdgeTrigger,
    notifier: Option<EdgeNotifier>,
    writes: Vec<bool>,
    releases: usize,
    fail_open: bool,
    fail_reads: bool,
    fail_writes: bool,
    fail_release: bool,
}

fn lock(line: &Mutex<MockLineState>) -> Result<MutexGuard<'_, MockLineState>, PioError> {
    line.lock()
        .map_err(|e| PioError::IoFailure(format!("lock poisoned: {e}")))
}

impl MockGpioBackend {
    pub fn with_lines<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::default();
        for name in names {
            backend.add_line(name);
        }
        backend
    }

    pub fn add_line<S: Into<String>>(&self, name: S) {
        if let Ok(mut lines) = self.lines.write() {
            lines.entry(name.into()).or_default();
        }
    }

    fn line(&self, name: &str) -> Result<Arc<Mutex<MockLineState>>, PioError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| PioError::IoFailure(format!("lock poisoned: {e}")))?;
        lines
            .get(name)
            .cloned()
            .ok_or_else(|| PioError::PinUnavailable(format!("unknown pin {name}")))
    }

    fn with_line<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MockLineState) -> T,
    ) -> Result<T, PioError> {
        let line = self.line(name)?;
        let mut pin = lock(&line)?;
        Ok(f(&mut pin))
    }

    /// Drives the electrical level of an input line, firing the edge
    /// notifier when the transition matches the configured trigger.
    pub fn set_input_level(&self, name: &str, level: bool) -> Result<(), PioError> {
        let line = self.line(name)?;
        let notify = {
            let mut pin = lock(&line)?;
            if pin.output {
                return Err(PioError::InvalidConfiguration(format!(
                    "{name} is driven as an output"
                )));
            }
            let old = pin.level;
            pin.level = level;

            match (EdgeKind::from_levels(old, level), &pin.notifier) {
                (Some(edge), Some(notifier)) if edge.matches(pin.edge) => {
                    Some((notifier.clone(), edge))
                }
                _ => None,
            }
        };

        if let Some((notifier, edge)) = notify {
            notifier(edge);
        }
        Ok(())
    }

    pub fn level(&self, name: &str) -> Result<bool, PioError> {
        self.with_line(name, |pin| pin.level)
    }

    pub fn writes(&self, name: &str) -> Result<Vec<bool>, PioError> {
        self.with_line(name, |pin| pin.writes.clone())
    }

    pub fn releases(&self, name: &str) -> Result<usize, PioError> {
        self.with_line(name, |pin| pin.releases)
    }

    pub fn is_claimed(&self, name: &str) -> Result<bool, PioError> {
        self.with_line(name, |pin| pin.claimed)
    }

    pub fn set_fail_open(&self, name: &str, fail: bool) -> Result<(), PioError> {
        self.with_line(name, |pin| pin.fail_open = fail)
    }

    pub fn set_fail_reads(&self, name: &str, fail: bool) -> Result<(), PioError> {
        self.with_line(name, |pin| pin.fail_reads = fail)
    }

    pub fn set_fail_writes(&self, name: &str, fail: bool) -> Result<(), PioError> {
        self.with_line(name, |pin| pin.fail_writes = fail)
    }

    pub fn set_fail_release(&self, name: &str, fail: bool) -> Result<(), PioError> {
        self.with_line(name, |pin| pin.fail_release = fail)
    }
}

impl GpioBackend for MockGpioBackend {
    fn line_names(&self) -> Vec<String> {
        self.lines
            .read()
            .map(|lines| lines.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn open_line(&self, name: &str) -> Result<Box<dyn LineDriver>, PioError> {
        let line = self.line(name)?;
        {
            let mut pin = lock(&line)?;
            if pin.fail_open {
                return Err(PioError::PinUnavailable(format!("{name} failed to open")));
            }
            if pin.claimed {
                return Err(PioError::PinUnavailable(format!("{name} is busy")));
            }
            pin.claimed = true;
            pin.output = false;
            pin.edge = EdgeTrigger::None;
            pin.notifier = None;
            pin.writes.clear();
        }

        Ok(Box::new(MockLine {
            state: line,
            released: false,
        }))
    }
}

struct MockLine {
    state: Arc<Mutex<MockLineState>>,
    released: bool,
}

impl LineDriver for MockLine {
    fn configure_input(&mut self) -> Result<(), PioError> {
        lock(&self.state)?.output = false;
        Ok(())
    }

    fn configure_output(&mut self, level: bool) -> Result<(), PioError> {
        let mut pin = lock(&self.state)?;
        pin.output = true;
        pin.level = level;
        Ok(())
    }

    fn set_edge_trigger(
        &mut self,
        trigger: EdgeTrigger,
        notifier: Option<EdgeNotifier>,
    ) -> Result<(), PioError> {
        let mut pin = lock(&self.state)?;
        pin.edge = trigger;
        pin.notifier = notifier;
        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, PioError> {
        let pin = lock(&self.state)?;
        if pin.fail_reads {
            return Err(PioError::IoFailure("injected read failure".into()));
        }
        Ok(pin.level)
    }

    fn write_level(&mut self, level: bool) -> Result<(), PioError> {
        let mut pin = lock(&self.state)?;
        if pin.fail_writes {
            return Err(PioError::IoFailure("injected write failure".into()));
        }
        if !pin.output {
            return Err(PioError::InvalidConfiguration(
                "line must be in output mode to set value".into(),
            ));
        }
        pin.level = level;
        pin.writes.push(level);
        Ok(())
    }

    fn release(&mut self) -> Result<(), PioError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut pin = lock(&self.state)?;
        pin.claimed = false;
        pin.output = false;
        pin.edge = EdgeTrigger::None;
        pin.notifier = None;
        pin.releases += 1;
        if pin.fail_release {
            return Err(PioError::IoFailure("injected release failure".into()));
        }
        Ok(())
    }
}
