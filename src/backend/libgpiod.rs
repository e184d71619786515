use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, yield_now};
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::FairMutex;
use rustc_hash::FxHashMap;

use crate::config::{EdgeTrigger, LineConfig};
use crate::error::PioError;
use crate::gpio::{DetachedEdgeSource, EdgeKind, EdgeNotifier, GpioBackend, LineDriver};

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;
const LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS: Duration = Duration::from_millis(10);

pub struct LibgpiodBackend {
    lines: FxHashMap<String, LineConfig>,
}

struct GpiodHandle {
    request: request::Request,
}

struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        name: String,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        notifier: EdgeNotifier,
    ) -> Result<Self, PioError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| PioError::IoFailure(format!("event buffer: {e}")))?;

        let handle = thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                let mut edges = Vec::new();
                {
                    let hdl = gpiod_handle.lock();
                    let req = &hdl.request;

                    let has_event =
                        match req.wait_edge_events(Some(LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS)) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("wait edge events error for {name}: {e}");
                                yield_now();
                                continue;
                            }
                        };
                    if !has_event {
                        continue;
                    }

                    let events = match req.read_edge_events(&mut buffer) {
                        Ok(evts) => evts,
                        Err(e) => {
                            warn!("read edge events error for {name}: {e}");
                            continue;
                        }
                    };
                    for evt in events {
                        let Ok(evt) = evt else { continue };
                        match evt.event_type() {
                            Ok(line::EdgeKind::Rising) => edges.push(EdgeKind::Rising),
                            Ok(line::EdgeKind::Falling) => edges.push(EdgeKind::Falling),
                            Err(_) => continue,
                        }
                    }
                }

                // delivery reads the line back, so the request lock must be free here
                for edge in edges {
                    notifier(edge);
                }
            }
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl EdgeListener {
    fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            // closing from inside a callback runs on the listener thread itself
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl LibgpiodBackend {
    pub fn new(lines: FxHashMap<String, LineConfig>) -> Result<Self, PioError> {
        if lines.is_empty() {
            return Err(PioError::Config(
                "no lines configured for the libgpiod backend".into(),
            ));
        }
        Ok(Self { lines })
    }

    fn make_line_settings(
        output: Option<bool>,
        edge: EdgeTrigger,
    ) -> Result<line::Settings, PioError> {
        let mut ls = line::Settings::new()
            .map_err(|e| PioError::IoFailure(format!("libgpiod settings: {e}")))?;

        match output {
            Some(level) => {
                ls.set_direction(line::Direction::Output)
                    .map_err(|e| PioError::IoFailure(format!("set direction: {e}")))?;
                ls.set_output_value(level_value(level))
                    .map_err(|e| PioError::IoFailure(format!("set output value: {e}")))?;
            }
            None => {
                ls.set_direction(line::Direction::Input)
                    .map_err(|e| PioError::IoFailure(format!("set direction: {e}")))?;
                let detect = edge != EdgeTrigger::None;
                let edge = match edge {
                    EdgeTrigger::None => None,
                    EdgeTrigger::Rising => Some(line::Edge::Rising),
                    EdgeTrigger::Falling => Some(line::Edge::Falling),
                    EdgeTrigger::Both => Some(line::Edge::Both),
                };
                ls.set_edge_detection(edge)
                    .map_err(|e| PioError::IoFailure(format!("set edge detection: {e}")))?;
                if detect {
                    ls.set_event_clock(EventClock::Realtime)
                        .map_err(|e| PioError::IoFailure(format!("set event clock: {e}")))?;
                }
            }
        }

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, PioError> {
        let mut cfg =
            line::Config::new().map_err(|e| PioError::IoFailure(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| PioError::IoFailure(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }
}

fn level_value(level: bool) -> line::Value {
    if level {
        line::Value::Active
    } else {
        line::Value::InActive
    }
}

impl GpioBackend for LibgpiodBackend {
    fn line_names(&self) -> Vec<String> {
        self.lines.keys().cloned().collect()
    }

    fn open_line(&self, name: &str) -> Result<Box<dyn LineDriver>, PioError> {
        let cfg = self
            .lines
            .get(name)
            .ok_or_else(|| PioError::PinUnavailable(format!("unknown pin {name}")))?;

        let chip = Chip::open(&cfg.chip)
            .map_err(|e| PioError::PinUnavailable(format!("{name}: open chip {}: {e}", cfg.chip)))?;
        let line_settings = Self::make_line_settings(None, EdgeTrigger::None)?;
        let line_cfg = Self::make_line_config(cfg.line, line_settings)?;
        let mut req_cfg = request::Config::new()
            .map_err(|e| PioError::IoFailure(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| PioError::IoFailure(format!("request consumer: {e}")))?;
        // the kernel refuses a second request for a line another consumer holds
        let request = chip
            .request_lines(Some(&req_cfg), &line_cfg)
            .map_err(|e| PioError::PinUnavailable(format!("{name}: request line: {e}")))?;
        debug!("requested {name} as {}:{}", cfg.chip, cfg.line);

        Ok(Box::new(LibgpiodLine {
            name: name.to_string(),
            offset: cfg.line,
            output: None,
            edge: EdgeTrigger::None,
            gpiod_handle: Some(Arc::new(FairMutex::new(GpiodHandle { request }))),
            listener: None,
        }))
    }
}

struct LibgpiodLine {
    name: String,
    offset: u32,
    output: Option<bool>,
    edge: EdgeTrigger,
    gpiod_handle: Option<Arc<FairMutex<GpiodHandle>>>,
    listener: Option<EdgeListener>, // dropped before the request
}

impl LibgpiodLine {
    fn handle(&self) -> Result<&Arc<FairMutex<GpiodHandle>>, PioError> {
        self.gpiod_handle
            .as_ref()
            .ok_or_else(|| PioError::Closed(self.name.clone()))
    }

    fn reconfigure(&self) -> Result<(), PioError> {
        let line_settings = LibgpiodBackend::make_line_settings(self.output, self.edge)?;
        let line_cfg = LibgpiodBackend::make_line_config(self.offset, line_settings)?;
        self.handle()?
            .lock()
            .request
            .reconfigure_lines(&line_cfg)
            .map_err(|e| PioError::IoFailure(format!("reconfigure lines: {e}")))?;
        Ok(())
    }
}

impl LineDriver for LibgpiodLine {
    fn configure_input(&mut self) -> Result<(), PioError> {
        self.output = None;
        self.reconfigure()
    }

    fn configure_output(&mut self, level: bool) -> Result<(), PioError> {
        self.listener.take();
        self.edge = EdgeTrigger::None;
        self.output = Some(level);
        self.reconfigure()
    }

    fn set_edge_trigger(
        &mut self,
        trigger: EdgeTrigger,
        notifier: Option<EdgeNotifier>,
    ) -> Result<(), PioError> {
        // stop the old listener before reconfiguring lines
        self.listener.take();
        self.edge = trigger;
        self.reconfigure()?;

        if trigger != EdgeTrigger::None
            && let Some(notifier) = notifier
        {
            let handle = self.handle()?.clone();
            self.listener = Some(EdgeListener::new(self.name.clone(), handle, notifier)?);
        }
        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, PioError> {
        let value = self
            .handle()?
            .lock()
            .request
            .value(self.offset)
            .map_err(|e| PioError::IoFailure(format!("get value: {e}")))?;
        Ok(matches!(value, line::Value::Active))
    }

    fn write_level(&mut self, level: bool) -> Result<(), PioError> {
        self.handle()?
            .lock()
            .request
            .set_value(self.offset, level_value(level))
            .map_err(|e| PioError::IoFailure(format!("set value: {e}")))?;
        Ok(())
    }

    fn release(&mut self) -> Result<(), PioError> {
        self.listener.take();
        self.gpiod_handle.take();
        Ok(())
    }

    fn detach_edge_source(&mut self) -> Option<DetachedEdgeSource> {
        let listener = self.listener.take()?;
        listener.stop();
        Some(Box::new(listener))
    }
}
