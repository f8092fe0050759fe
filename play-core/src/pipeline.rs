//! Playback pipeline controller.
//!
//! Owns the lifecycle that wires probe → frame source → pacer → sink. One
//! dedicated worker thread runs the blocking decode/pace/present loop; the
//! surrounding control surface talks to it only through the state-machine
//! operations here and the event channel.
//!
//! State machine:
//!
//! ```text
//! Idle --start--> Probing --ok--> Decoding <--resume-- Paused
//!                    |               |  \--pause-----^
//!                    |               |--eos--------> Stopped
//!                    |               \--error------> Failed
//!                    \--error------> Failed
//! any state --stop--> Stopped
//! ```

use crate::backend::MediaBackend;
use crate::decoder::{FrameSource, SourceControl, SourceError};
use crate::frame::PixelLayout;
use crate::pacer::FramePacer;
use crate::probe::ProbeError;
use crate::render::{FrameSink, RenderError};
use crate::source::MediaSource;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use thiserror::Error;

const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Cannot {op} while {state}")]
    InvalidTransition {
        op: &'static str,
        state: &'static str,
    },
}

/// Playback session state. `Stopped` and `Failed` are terminal for the
/// session; a fresh `start` begins a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Probing,
    Decoding,
    Paused,
    Stopped,
    Failed(String),
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Decoding => "decoding",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }

    fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Failed(_))
    }
}

/// Asynchronous notifications to the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    /// A frame was presented; carries the running count for this session.
    FrameRendered(u64),
    EndOfStream,
    /// One per failed session, identifying the cause.
    Error(String),
}

/// Playback tuning.
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    pub layout: PixelLayout,
    /// Overrides the probed frame rate when set.
    pub target_fps: Option<f64>,
    /// Ends the session cleanly after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            layout: PixelLayout::Rgb24,
            target_fps: None,
            max_frames: None,
        }
    }
}

struct Shared {
    state: Mutex<PipelineState>,
    cond: Condvar,
    stop: AtomicBool,
    /// Published by the worker once the decode process is up; taken by
    /// `stop` to interrupt a blocked read.
    control: Mutex<Option<Arc<dyn SourceControl>>>,
}

impl Shared {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, events: &Sender<PipelineEvent>, new: PipelineState) {
        let mut state = self.state.lock();
        if *state != new {
            *state = new.clone();
            let _ = events.send(PipelineEvent::StateChanged(new));
        }
    }
}

/// Owns one playback session at a time.
///
/// Dropping the controller stops playback and tears down the decode process.
pub struct PipelineController {
    shared: Arc<Shared>,
    backend: Arc<dyn MediaBackend>,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    config: PlayerConfig,
    events_tx: Sender<PipelineEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineController {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        sink: Box<dyn FrameSink>,
        config: PlayerConfig,
    ) -> (Self, Receiver<PipelineEvent>) {
        let (events_tx, events_rx) = mpsc::channel();
        let controller = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Idle),
                cond: Condvar::new(),
                stop: AtomicBool::new(false),
                control: Mutex::new(None),
            }),
            backend,
            sink: Arc::new(Mutex::new(sink)),
            config,
            events_tx,
            worker: Mutex::new(None),
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.lock().clone()
    }

    /// Begin a new playback session. Valid from Idle, Stopped or Failed.
    pub fn start(&self, source: MediaSource) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state.lock();
            if !state.can_start() {
                return Err(PipelineError::InvalidTransition {
                    op: "start",
                    state: state.name(),
                });
            }
            *state = PipelineState::Probing;
        }
        let _ = self
            .events_tx
            .send(PipelineEvent::StateChanged(PipelineState::Probing));

        // The previous session's worker, if any, already reached a terminal
        // state; reap it before spawning the next.
        let previous = self.worker.lock().take();
        if let Some(handle) = previous {
            let _ = handle.join();
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        let backend = self.backend.clone();
        let sink = self.sink.clone();
        let events = self.events_tx.clone();
        let config = self.config;

        tracing::info!(%source, "starting playback");
        let handle = std::thread::Builder::new()
            .name("play-pipeline".into())
            .spawn(move || run_session(shared, backend, sink, events, source, config))
            .map_err(|e| self.abort_start(e))?;

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Roll back a start that set Probing but could not spawn its worker.
    /// The session never began, so the controller returns to Idle and stays
    /// startable.
    fn abort_start(&self, err: std::io::Error) -> PipelineError {
        self.shared.set_state(&self.events_tx, PipelineState::Idle);
        SourceError::Io(err).into()
    }

    /// Pause frame delivery. Only valid while decoding.
    pub fn pause(&self) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        if *state != PipelineState::Decoding {
            return Err(PipelineError::InvalidTransition {
                op: "pause",
                state: state.name(),
            });
        }
        *state = PipelineState::Paused;
        drop(state);
        let _ = self
            .events_tx
            .send(PipelineEvent::StateChanged(PipelineState::Paused));
        Ok(())
    }

    /// Resume a paused session.
    pub fn resume(&self) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        if *state != PipelineState::Paused {
            return Err(PipelineError::InvalidTransition {
                op: "resume",
                state: state.name(),
            });
        }
        *state = PipelineState::Decoding;
        drop(state);
        self.shared.cond.notify_all();
        let _ = self
            .events_tx
            .send(PipelineEvent::StateChanged(PipelineState::Decoding));
        Ok(())
    }

    /// Stop playback from any state. Idempotent; unblocks a pending pipe
    /// read by terminating the decode process, then waits for the worker.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cond.notify_all();

        let control = self.shared.control.lock().take();
        if let Some(control) = control {
            control.interrupt();
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        self.shared
            .set_state(&self.events_tx, PipelineState::Stopped);
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

enum SessionEnd {
    EndOfStream,
    StopRequested,
    FrameBudget,
}

/// The decode/pace/present loop. Runs on the dedicated worker thread; every
/// blocking call in the pipeline happens here.
fn run_session(
    shared: Arc<Shared>,
    backend: Arc<dyn MediaBackend>,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    events: Sender<PipelineEvent>,
    source: MediaSource,
    config: PlayerConfig,
) {
    let info = match backend.probe(&source, config.layout) {
        Ok(info) => info,
        Err(e) => return fail(&shared, &events, e.into()),
    };

    if shared.stop_requested() {
        return shared.set_state(&events, PipelineState::Stopped);
    }

    let (mut src, control) = match backend.open(&source, info.geometry) {
        Ok(pair) => pair,
        Err(e) => return fail(&shared, &events, e.into()),
    };
    *shared.control.lock() = Some(control);

    shared.set_state(&events, PipelineState::Decoding);

    let fps = config
        .target_fps
        .or(info.frame_rate)
        .unwrap_or(DEFAULT_FPS);
    let mut pacer = FramePacer::new(fps);
    tracing::debug!(fps, "pipeline decoding");

    let mut rendered: u64 = 0;
    let outcome = loop {
        if shared.stop_requested() {
            break Ok(SessionEnd::StopRequested);
        }

        // Hold frame delivery while paused; stop must still get through.
        {
            let mut state = shared.state.lock();
            while *state == PipelineState::Paused && !shared.stop_requested() {
                shared.cond.wait(&mut state);
            }
        }
        if shared.stop_requested() {
            break Ok(SessionEnd::StopRequested);
        }

        match src.next_frame() {
            Ok(Some(frame)) => {
                pacer.wait();
                if shared.stop_requested() {
                    // Frame dropped on stop, never presented.
                    break Ok(SessionEnd::StopRequested);
                }
                if let Err(e) = sink.lock().present(frame, &info.geometry) {
                    break Err(PipelineError::from(e));
                }
                rendered += 1;
                let _ = events.send(PipelineEvent::FrameRendered(rendered));
                if config.max_frames.is_some_and(|max| rendered >= max) {
                    break Ok(SessionEnd::FrameBudget);
                }
            }
            Ok(None) => break Ok(SessionEnd::EndOfStream),
            Err(e) => break Err(PipelineError::from(e)),
        }
    };

    src.close();
    shared.control.lock().take();

    match outcome {
        // A read error after stop was requested is the cancellation path,
        // not a failure.
        Err(_) if shared.stop_requested() => {
            shared.set_state(&events, PipelineState::Stopped);
        }
        Err(e) => fail(&shared, &events, e),
        Ok(SessionEnd::EndOfStream) if !shared.stop_requested() => {
            tracing::info!(rendered, "end of stream");
            let _ = events.send(PipelineEvent::EndOfStream);
            shared.set_state(&events, PipelineState::Stopped);
        }
        Ok(_) => {
            tracing::debug!(rendered, "session stopped");
            shared.set_state(&events, PipelineState::Stopped);
        }
    }
}

/// Single error notification, then the terminal Failed state.
fn fail(shared: &Shared, events: &Sender<PipelineEvent>, err: PipelineError) {
    let reason = err.to_string();
    tracing::error!(%reason, "pipeline failed");
    let _ = events.send(PipelineEvent::Error(reason.clone()));
    shared.set_state(events, PipelineState::Failed(reason));
}
