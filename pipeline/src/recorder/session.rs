use std::path::PathBuf;

use framelab_common::frame::Frame;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{RecorderError, SinkOpener, SinkSpec, VideoSink, FALLBACK_FPS};

/// What a finished recording produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

struct Session {
    tx: mpsc::Sender<Frame>,
    writer: JoinHandle<WriterOutcome>,
    spec: SinkSpec,
    dropped: u64,
}

struct WriterOutcome {
    write_error: Option<RecorderError>,
    finished: Result<u64, RecorderError>,
}

pub struct Recorder {
    opener: Box<dyn SinkOpener>,
    queue_depth: usize,
    session: Option<Session>,
}

/// The nominal rate cameras report is sometimes 0 or garbage.
pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

impl Recorder {
    pub fn new(opener: Box<dyn SinkOpener>, queue_depth: usize) -> Self {
        Self {
            opener,
            queue_depth: queue_depth.max(1),
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Parameters of the session in progress.
    pub fn active(&self) -> Option<&SinkSpec> {
        self.session.as_ref().map(|s| &s.spec)
    }

    /// Open a sink and start the writer. Must be called within a tokio runtime.
    ///
    /// On failure no session exists afterwards.
    pub fn start(&mut self, spec: SinkSpec) -> Result<SinkSpec, RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let spec = SinkSpec {
            fps: effective_fps(spec.fps),
            ..spec
        };
        let sink = self.opener.open(&spec)?;

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let writer = tokio::spawn(run_writer(sink, rx));
        info!(
            path = %spec.path.display(),
            fps = spec.fps,
            width = spec.width,
            height = spec.height,
            "recording started"
        );
        self.session = Some(Session {
            tx,
            writer,
            spec: spec.clone(),
            dropped: 0,
        });
        Ok(spec)
    }

    /// Queue a frame for the writer without blocking. A full queue drops the
    /// frame; the error case means the writer has already given up.
    pub fn push(&mut self, frame: Frame) -> Result<(), RecorderError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                session.dropped += 1;
                debug!(seq = frame.seq, dropped = session.dropped, "recording queue full, frame dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(RecorderError::Closed),
        }
    }

    /// True once the writer task has ended while the session is still open,
    /// which only happens after a write failure.
    pub fn writer_exited(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.writer.is_finished())
    }

    /// Close the queue, let the writer drain it, and finish the sink. Returns
    /// `None` when nothing was recording.
    pub async fn stop(&mut self) -> Result<Option<RecordingSummary>, RecorderError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let Session {
            tx,
            writer,
            spec,
            dropped,
        } = session;
        drop(tx);

        let outcome = writer
            .await
            .map_err(|e| RecorderError::Join(e.to_string()))?;
        let frames_written = outcome.finished?;
        if let Some(e) = outcome.write_error {
            return Err(e);
        }

        let summary = RecordingSummary {
            path: spec.path,
            frames_written,
            frames_dropped: dropped,
            fps: spec.fps,
            width: spec.width,
            height: spec.height,
        };
        info!(
            path = %summary.path.display(),
            frames_written,
            frames_dropped = dropped,
            "recording stopped"
        );
        Ok(Some(summary))
    }
}

async fn run_writer(mut sink: Box<dyn VideoSink>, mut rx: mpsc::Receiver<Frame>) -> WriterOutcome {
    let mut write_error = None;
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.write_frame(&frame).await {
            error!(error = %e, seq = frame.seq, "recording write failed");
            write_error = Some(e);
            break;
        }
    }
    // Dropping the receiver makes further pushes fail fast.
    drop(rx);

    let finished = sink.finish().await;
    if let Err(e) = &finished {
        warn!(error = %e, "failed to finalize recording");
    }
    WriterOutcome {
        write_error,
        finished,
    }
}
