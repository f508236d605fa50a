//! The pipeline loop: one task owning the camera, interaction state,
//! compositor, display and recorder.
//!
//! Everything that mutates state arrives as a [`Command`] and is handled
//! between frame ticks, so each `compose` call sees one consistent state.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use framelab_capture::FrameSource;
use framelab_common::config::Config;
use framelab_common::state::{InteractionEvent, InteractionState, RoiPhase};
use framelab_pipeline::compositor::{Compositor, CompositorStyle};
use framelab_pipeline::display::{DisplaySink, Viewport};
use framelab_pipeline::paths;
use framelab_pipeline::recorder::{Recorder, RecorderError, SinkSpec};
use framelab_pipeline::snapshot::{self, SnapshotError};
use framelab_pipeline::stats::FrameRateMeter;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error("{0}")]
    Rejected(String),
    #[error("pipeline is not running")]
    Unavailable,
}

pub type Reply = oneshot::Sender<Result<String, ControlError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerAction {
    Down,
    Move,
    Up,
}

#[derive(Debug)]
pub enum Command {
    /// An interaction event in frame coordinates.
    Event { event: InteractionEvent, reply: Reply },
    /// A pointer event in preview surface coordinates.
    Pointer {
        action: PointerAction,
        x: i32,
        y: i32,
        reply: Reply,
    },
    Snapshot { path: Option<PathBuf>, reply: Reply },
    StartRecording { path: Option<PathBuf>, reply: Reply },
    StopRecording { reply: Reply },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub fps: f64,
    pub frames_total: u64,
    pub width: u32,
    pub height: u32,
    pub recording: bool,
    pub recording_path: Option<PathBuf>,
    pub message: String,
    pub state: InteractionState,
}

pub struct App {
    source: Box<dyn FrameSource>,
    compositor: Compositor,
    state: InteractionState,
    recorder: Recorder,
    display: Box<dyn DisplaySink>,
    display_failed: bool,
    meter: FrameRateMeter,
    status: watch::Sender<StatusReport>,
    message: String,
    output_dir: PathBuf,
    surface: (u32, u32),
    tick_interval: Duration,
    stats_interval: Duration,
}

impl App {
    /// `width x height` is the size of the first frame the source produced.
    pub fn new(
        config: &Config,
        source: Box<dyn FrameSource>,
        (width, height): (u32, u32),
        recorder: Recorder,
        display: Box<dyn DisplaySink>,
    ) -> (Self, watch::Receiver<StatusReport>) {
        let state = InteractionState::new(width, height);
        let (status, status_rx) = watch::channel(StatusReport {
            fps: 0.0,
            frames_total: 0,
            width,
            height,
            recording: false,
            recording_path: None,
            message: "Ready".into(),
            state: state.clone(),
        });
        let app = Self {
            source,
            compositor: Compositor::new(CompositorStyle::from(&config.pipeline)),
            state,
            recorder,
            display,
            display_failed: false,
            meter: FrameRateMeter::new(),
            status,
            message: "Ready".into(),
            output_dir: config.output.dir.clone(),
            surface: (config.preview.surface_width, config.preview.surface_height),
            tick_interval: Duration::from_millis(config.pipeline.tick_interval_ms),
            stats_interval: Duration::from_millis(config.pipeline.stats_interval_ms),
        };
        (app, status_rx)
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Drive the pipeline until `shutdown` resolves, then tear down.
    pub async fn run<F>(mut self, mut commands: mpsc::Receiver<Command>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut frame_tick = tokio::time::interval(self.tick_interval);
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_tick = tokio::time::interval(self.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            "entering pipeline loop"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Some(command) = commands.recv() => self.handle(command).await,
                _ = frame_tick.tick() => self.on_frame_tick().await,
                _ = stats_tick.tick() => self.on_stats_tick(),
            }
        }
        self.teardown().await;
    }

    pub async fn on_frame_tick(&mut self) {
        // No new frame yet: skip this tick.
        let Some(raw) = self.source.read_frame() else {
            return;
        };
        let (width, height) = raw.dimensions();
        if (width, height) != self.state.frame_size() {
            info!(width, height, "frame size changed");
            self.state.set_frame_size(width, height);
        }

        let frame = self.compositor.compose(raw, &self.state);
        self.meter.record_frame();

        match self.display.present(&frame) {
            Ok(()) => self.display_failed = false,
            Err(e) => {
                if !self.display_failed {
                    warn!(error = %e, "failed to present frame");
                }
                self.display_failed = true;
            }
        }

        if self.recorder.is_recording() {
            let pushed = self.recorder.push(frame);
            if pushed.is_err() || self.recorder.writer_exited() {
                // The writer reports its own error when stopped.
                let _ = self.stop_recording().await;
                self.publish_status();
            }
        }
    }

    pub fn on_stats_tick(&mut self) {
        let frames = self.meter.sample();
        debug!(frames, fps = self.meter.last_fps(), "frame rate");
        self.publish_status();
    }

    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Event { event, reply } => {
                let message = self.apply_event(event);
                let _ = reply.send(Ok(message));
            }
            Command::Pointer { action, x, y, reply } => {
                let (fw, fh) = self.state.frame_size();
                let viewport = Viewport::fit(fw, fh, self.surface.0, self.surface.1);
                let p = viewport.surface_to_frame(x, y);
                let event = match action {
                    PointerAction::Down => InteractionEvent::PointerDown { x: p.x, y: p.y },
                    PointerAction::Move => InteractionEvent::PointerMove { x: p.x, y: p.y },
                    PointerAction::Up => InteractionEvent::PointerUp { x: p.x, y: p.y },
                };
                let message = self.apply_event(event);
                let _ = reply.send(Ok(message));
            }
            Command::Snapshot { path, reply } => {
                let _ = reply.send(self.snapshot(path));
            }
            Command::StartRecording { path, reply } => {
                let _ = reply.send(self.start_recording(path));
            }
            Command::StopRecording { reply } => {
                let _ = reply.send(self.stop_recording().await);
            }
        }
        self.publish_status();
    }

    fn apply_event(&mut self, event: InteractionEvent) -> String {
        let was_drawing = matches!(self.state.phase(), RoiPhase::Drawing { .. });
        let is_reset = matches!(
            event,
            InteractionEvent::RoiReset | InteractionEvent::RoiModeToggled { armed: false }
        );
        self.state.apply(event);

        if was_drawing && self.state.phase() == RoiPhase::Committed {
            if let Some(roi) = self.state.roi() {
                return self.set_message(format!(
                    "ROI Selected: ({},{}) to ({},{})",
                    roi.x1, roi.y1, roi.x2, roi.y2
                ));
            }
        }
        if is_reset {
            return self.set_message("ROI Reset".into());
        }
        self.message.clone()
    }

    fn set_message(&mut self, message: String) -> String {
        self.message = message;
        self.message.clone()
    }

    fn snapshot(&mut self, path: Option<PathBuf>) -> Result<String, ControlError> {
        let composed = self
            .source
            .latest_frame()
            .map(|raw| self.compositor.compose(raw, &self.state));
        let path = path
            .unwrap_or_else(|| paths::snapshot_path(&self.output_dir, Utc::now().timestamp_millis()));
        match snapshot::export_latest(composed.as_ref(), &path) {
            Ok(written) => Ok(self.set_message(format!("Snapshot saved to {}", written.display()))),
            Err(e) => {
                warn!(error = %e, "snapshot failed");
                self.set_message(format!("Snapshot failed: {e}"));
                Err(e.into())
            }
        }
    }

    fn start_recording(&mut self, path: Option<PathBuf>) -> Result<String, ControlError> {
        let (width, height) = self.state.frame_size();
        let spec = SinkSpec {
            path: path.unwrap_or_else(|| {
                paths::recording_path(&self.output_dir, Utc::now().timestamp_millis())
            }),
            fps: self.source.nominal_fps(),
            width,
            height,
        };
        match self.recorder.start(spec) {
            Ok(_) => {
                self.state
                    .apply(InteractionEvent::RecordingChanged { active: true });
                Ok(self.set_message("Recording started...".into()))
            }
            Err(e) => {
                error!(error = %e, "failed to start recording");
                self.set_message(format!("Failed to start recording: {e}"));
                Err(e.into())
            }
        }
    }

    async fn stop_recording(&mut self) -> Result<String, ControlError> {
        let result = self.recorder.stop().await;
        self.state
            .apply(InteractionEvent::RecordingChanged { active: false });
        match result {
            Ok(Some(summary)) => Ok(self.set_message(format!(
                "Recording stopped: {} ({} frames, {} dropped)",
                summary.path.display(),
                summary.frames_written,
                summary.frames_dropped
            ))),
            Ok(None) => Ok(self.set_message("Not recording".into())),
            Err(e) => {
                error!(error = %e, "recording failed");
                self.set_message(format!("Recording failed: {e}"));
                Err(e.into())
            }
        }
    }

    fn publish_status(&self) {
        let (width, height) = self.state.frame_size();
        self.status.send_replace(StatusReport {
            fps: self.meter.last_fps(),
            frames_total: self.meter.total_frames(),
            width,
            height,
            recording: self.state.is_recording(),
            recording_path: self.recorder.active().map(|s| s.path.clone()),
            message: self.message.clone(),
            state: self.state.clone(),
        });
    }

    async fn teardown(&mut self) {
        if self.recorder.is_recording() {
            match self.stop_recording().await {
                Ok(message) => info!(message, "recording finalized on shutdown"),
                Err(e) => warn!(error = %e, "recording could not be finalized cleanly"),
            }
        }
        self.source.close();
        self.publish_status();
        info!(frames = self.meter.total_frames(), "pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelab_capture::pattern::PatternSource;
    use framelab_common::frame::Frame;
    use framelab_common::geometry::Rect;
    use framelab_common::state::FilterKind;
    use framelab_pipeline::display::DisplayError;
    use framelab_pipeline::recorder::{SinkOpener, VideoSink};
    use futures_util::future::BoxFuture;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Shown(Arc<Mutex<Vec<Frame>>>);

    impl DisplaySink for Shown {
        fn present(&mut self, frame: &Frame) -> Result<(), DisplayError> {
            self.0.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct Written(Arc<Mutex<Vec<u64>>>);

    struct MemorySink(Written);

    impl VideoSink for MemorySink {
        fn write_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<(), RecorderError>> {
            self.0 .0.lock().unwrap().push(frame.seq);
            Box::pin(async { Ok(()) })
        }

        fn finish(self: Box<Self>) -> BoxFuture<'static, Result<u64, RecorderError>> {
            let written = self.0 .0.lock().unwrap().len() as u64;
            Box::pin(async move { Ok(written) })
        }
    }

    struct MemoryOpener(Written, bool);

    impl SinkOpener for MemoryOpener {
        fn open(&self, spec: &SinkSpec) -> Result<Box<dyn VideoSink>, RecorderError> {
            if self.1 {
                return Err(RecorderError::Open(spec.path.display().to_string(), "no codec".into()));
            }
            Ok(Box::new(MemorySink(self.0.clone())))
        }
    }

    struct Harness {
        app: App,
        status: watch::Receiver<StatusReport>,
        shown: Shown,
        written: Written,
    }

    fn harness(fail_open: bool) -> Harness {
        let mut config = Config::default();
        config.preview.surface_width = 128;
        config.preview.surface_height = 96;
        config.output.dir = std::env::temp_dir().join(format!("framelab-app-{}", std::process::id()));
        let shown = Shown::default();
        let written = Written::default();
        let recorder = Recorder::new(Box::new(MemoryOpener(written.clone(), fail_open)), 16);
        let (app, status) = App::new(
            &config,
            Box::new(PatternSource::new(64, 48, 30.0)),
            (64, 48),
            recorder,
            Box::new(shown.clone()),
        );
        Harness {
            app,
            status,
            shown,
            written,
        }
    }

    async fn send(app: &mut App, make: impl FnOnce(Reply) -> Command) -> Result<String, ControlError> {
        let (tx, rx) = oneshot::channel();
        app.handle(make(tx)).await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn ticks_present_composed_frames() {
        let mut h = harness(false);
        for _ in 0..3 {
            h.app.on_frame_tick().await;
        }
        assert_eq!(h.shown.0.lock().unwrap().len(), 3);
        h.app.on_stats_tick();
        assert_eq!(h.status.borrow().frames_total, 3);
    }

    #[tokio::test]
    async fn events_update_state_and_status() {
        let mut h = harness(false);
        send(&mut h.app, |reply| Command::Event {
            event: InteractionEvent::FilterSelected {
                filter: FilterKind::Invert,
            },
            reply,
        })
        .await
        .unwrap();
        assert_eq!(h.app.state().filter(), FilterKind::Invert);
        assert_eq!(h.status.borrow().state.filter(), FilterKind::Invert);
    }

    #[tokio::test]
    async fn pointer_is_mapped_through_viewport() {
        let mut h = harness(false);
        send(&mut h.app, |reply| Command::Event {
            event: InteractionEvent::RoiModeToggled { armed: true },
            reply,
        })
        .await
        .unwrap();
        // 64x48 frame on a 128x96 surface: scale 2, no bars.
        send(&mut h.app, |reply| Command::Pointer {
            action: PointerAction::Down,
            x: 20,
            y: 20,
            reply,
        })
        .await
        .unwrap();
        let message = send(&mut h.app, |reply| Command::Pointer {
            action: PointerAction::Up,
            x: 60,
            y: 80,
            reply,
        })
        .await
        .unwrap();
        assert_eq!(h.app.state().roi(), Some(Rect { x1: 10, y1: 10, x2: 30, y2: 40 }));
        assert_eq!(message, "ROI Selected: (10,10) to (30,40)");
    }

    #[tokio::test]
    async fn recording_captures_ticks_until_stopped() {
        let mut h = harness(false);
        send(&mut h.app, |reply| Command::StartRecording { path: None, reply })
            .await
            .unwrap();
        assert!(h.app.state().is_recording());
        assert!(h.status.borrow().recording);
        for _ in 0..5 {
            h.app.on_frame_tick().await;
        }
        let message = send(&mut h.app, |reply| Command::StopRecording { reply })
            .await
            .unwrap();
        assert!(message.contains("5 frames"), "{message}");
        assert_eq!(h.written.0.lock().unwrap().len(), 5);
        assert!(!h.app.state().is_recording());
    }

    #[tokio::test]
    async fn failed_open_keeps_recording_flag_false() {
        let mut h = harness(true);
        let result = send(&mut h.app, |reply| Command::StartRecording { path: None, reply }).await;
        assert!(matches!(result, Err(ControlError::Recorder(RecorderError::Open(..)))));
        assert!(!h.app.state().is_recording());
        assert!(h.status.borrow().message.starts_with("Failed to start recording"));
        // Display keeps running.
        h.app.on_frame_tick().await;
        assert_eq!(h.shown.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_writes_composed_frame() {
        let mut h = harness(false);
        let dir = std::env::temp_dir().join(format!("framelab-app-snap-{}", std::process::id()));
        let path = dir.join("shot.png");
        let message = send(&mut h.app, |reply| Command::Snapshot {
            path: Some(path.clone()),
            reply,
        })
        .await
        .unwrap();
        assert!(message.starts_with("Snapshot saved to"));
        let saved = image_size(&path);
        assert_eq!(saved, (64, 48));
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn image_size(path: &std::path::Path) -> (u32, u32) {
        let bytes = std::fs::read(path).unwrap();
        Frame::decode(&bytes, 0, 0).unwrap().dimensions()
    }

    #[tokio::test]
    async fn stop_when_idle_reports_not_recording() {
        let mut h = harness(false);
        let message = send(&mut h.app, |reply| Command::StopRecording { reply })
            .await
            .unwrap();
        assert_eq!(message, "Not recording");
    }

    #[tokio::test]
    async fn run_finalizes_recording_on_shutdown() {
        let mut h = harness(false);
        send(&mut h.app, |reply| Command::StartRecording { path: None, reply })
            .await
            .unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let status = h.status.clone();
        h.app
            .run(rx, tokio::time::sleep(Duration::from_millis(150)))
            .await;
        assert!(!status.borrow().recording);
        assert!(!h.written.0.lock().unwrap().is_empty());
    }
}
