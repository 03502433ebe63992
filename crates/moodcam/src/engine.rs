use moodcam_core::{AnalyzerError, EmotionAnalyzer, EmotionResult};
use moodcam_hw::frame::is_dark_frame;
use moodcam_hw::{Camera, CameraError, CaptureSurface};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A live camera stream bound to the video surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub device: String,
    /// Native resolution negotiated with the driver.
    pub width: u32,
    pub height: u32,
}

/// Messages sent from the controller to the engine thread.
enum EngineRequest {
    Acquire {
        device: String,
        warmup_frames: usize,
        reply: oneshot::Sender<Result<StreamInfo, EngineError>>,
    },
    Capture {
        reply: oneshot::Sender<Result<Option<EmotionResult>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Open the camera and bind it to the video surface.
    pub async fn acquire(
        &self,
        device: &str,
        warmup_frames: usize,
    ) -> Result<StreamInfo, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Acquire {
                device: device.to_string(),
                warmup_frames,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Snapshot the current frame and classify it.
    ///
    /// `Ok(None)` means the video surface is not bound and nothing was done.
    pub async fn capture(&self) -> Result<Option<EmotionResult>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Capture { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The engine owns the loaded models, the camera once acquired, and the
/// off-screen capture surface. Requests are served one at a time.
pub fn spawn_engine(mut analyzer: EmotionAnalyzer) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("moodcam-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut camera: Option<Camera> = None;
            let mut surface = CaptureSurface::new();

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Acquire {
                        device,
                        warmup_frames,
                        reply,
                    } => {
                        let result = open_camera(&device, warmup_frames).map(|cam| {
                            let info = StreamInfo {
                                device: cam.device_path.clone(),
                                width: cam.width,
                                height: cam.height,
                            };
                            camera = Some(cam);
                            info
                        });
                        let _ = reply.send(result);
                    }
                    EngineRequest::Capture { reply } => {
                        let result = run_capture(camera.as_mut(), &mut surface, &mut analyzer);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn open_camera(device: &str, warmup_frames: usize) -> Result<Camera, EngineError> {
    let mut camera = Camera::open(device)?;
    tracing::info!(
        device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    tracing::info!(count = warmup_frames, "discarding warmup frames");
    camera.warm_up(warmup_frames)?;

    Ok(camera)
}

/// Draw the current frame into the capture surface and classify the snapshot.
fn run_capture(
    camera: Option<&mut Camera>,
    surface: &mut CaptureSurface,
    analyzer: &mut EmotionAnalyzer,
) -> Result<Option<EmotionResult>, EngineError> {
    let Some(camera) = camera else {
        tracing::debug!("capture skipped: video surface not bound");
        return Ok(None);
    };

    let frame = camera.capture_frame()?;
    let snapshot = surface.draw(&frame.image);
    tracing::debug!(
        seq = frame.sequence,
        width = snapshot.width(),
        height = snapshot.height(),
        "snapshot drawn"
    );

    if is_dark_frame(snapshot, 0.95) {
        tracing::warn!(seq = frame.sequence, "snapshot is almost entirely dark");
    }

    Ok(Some(analyzer.analyze(snapshot)?))
}

#[cfg(test)]
impl EngineHandle {
    /// An engine without models or camera that answers requests in arrival
    /// order. Acquiring takes `acquire_delay`; captures report no face once a
    /// camera is bound and `None` before.
    pub(crate) fn scripted(acquire_delay: std::time::Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
        tokio::spawn(async move {
            let mut bound = false;
            while let Some(req) = rx.recv().await {
                match req {
                    EngineRequest::Acquire { device, reply, .. } => {
                        tokio::time::sleep(acquire_delay).await;
                        bound = true;
                        let _ = reply.send(Ok(StreamInfo {
                            device,
                            width: 640,
                            height: 480,
                        }));
                    }
                    EngineRequest::Capture { reply } => {
                        let _ = reply.send(Ok(bound.then_some(EmotionResult::NoFace)));
                    }
                }
            }
        });
        EngineHandle { tx }
    }
}
