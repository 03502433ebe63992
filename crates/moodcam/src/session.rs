//! Interactive session: feeds the controller from the model loader, stdin,
//! and the engine, and performs the effects it asks for.

use crate::app::{App, Effect, Event};
use crate::config::Config;
use crate::engine::{spawn_engine, EngineHandle};
use crate::view;
use anyhow::Result;
use moodcam_core::EmotionAnalyzer;
use moodcam_models::ModelStore;
use std::future::Future;
use std::io::BufRead;
use tokio::sync::mpsc;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Capture,
    Quit,
    Unknown,
}

fn parse_command(line: &str) -> Command {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "c" | "capture" => Command::Capture,
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Unknown,
    }
}

/// Fetch both model artifacts and build the analyzer from them.
pub async fn load_analyzer(config: &Config) -> Result<EmotionAnalyzer> {
    let store = ModelStore::new(
        &config.model_dir,
        config.model_base_url.as_str(),
        config.download_timeout(),
    )?;
    let paths = store.fetch_all().await?;

    let analyzer = tokio::task::spawn_blocking(move || {
        EmotionAnalyzer::load(&paths.face_detector, &paths.expression_classifier)
    })
    .await??;

    Ok(analyzer)
}

async fn load_engine(config: &Config) -> Result<EngineHandle> {
    let analyzer = load_analyzer(config).await?;
    Ok(spawn_engine(analyzer)?)
}

/// Read stdin lines on a dedicated thread.
///
/// A blocking read cannot be cancelled. Kept off the runtime's blocking pool,
/// it cannot hold up runtime shutdown after the session ends.
fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::Builder::new()
        .name("moodcam-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Run until the user quits, stdin closes, or Ctrl-C.
///
/// A model-load failure is logged and leaves the view on the loading
/// message; there is no retry.
pub async fn run(config: Config) -> Result<()> {
    let input = spawn_stdin_reader()?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut renderer = Renderer::default();
    drive(load_engine(&config), input, shutdown, &config, &mut renderer).await;

    tracing::info!("moodcam shutting down");
    Ok(())
}

/// The session loop. Returns the final controller state once `shutdown`
/// resolves, the user quits, or `input` closes.
async fn drive(
    loading: impl Future<Output = Result<EngineHandle>>,
    mut input: mpsc::Receiver<String>,
    shutdown: impl Future<Output = ()>,
    config: &Config,
    renderer: &mut Renderer,
) -> App {
    let (events_tx, mut events_rx) = mpsc::channel::<Event>(16);
    let mut app = App::new();
    renderer.draw(&app);

    tokio::pin!(loading);
    tokio::pin!(shutdown);
    let mut load_pending = true;
    let mut effects: Option<mpsc::Sender<Effect>> = None;

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            loaded = &mut loading, if load_pending => {
                load_pending = false;
                match loaded {
                    Ok(engine) => {
                        effects = Some(spawn_effect_runner(engine, config, events_tx.clone()));
                        Event::ModelsLoaded
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "error loading models");
                        continue;
                    }
                }
            }
            Some(event) = events_rx.recv() => event,
            line = input.recv() => match line {
                Some(line) => match parse_command(&line) {
                    Command::Capture => Event::CaptureRequested,
                    Command::Quit => break,
                    Command::Unknown => {
                        tracing::debug!(input = %line.trim(), "unknown command");
                        continue;
                    }
                },
                None => break,
            },
        };

        if let Some(effect) = app.handle(event) {
            perform(effect, effects.as_ref(), &events_tx).await;
        }
        renderer.draw(&app);
    }

    app
}

/// Hand an effect to the runner; without one, a capture fails right away.
async fn perform(
    effect: Effect,
    effects: Option<&mpsc::Sender<Effect>>,
    events: &mpsc::Sender<Event>,
) {
    let queued = match effects {
        Some(tx) => tx.send(effect).await.is_ok(),
        None => false,
    };
    if !queued {
        tracing::error!(?effect, "engine not running");
        if effect == Effect::RunCapture {
            let _ = events.try_send(Event::CaptureFailed);
        }
    }
}

/// Perform effects one at a time, in the order the controller issued them,
/// and report each outcome as an event.
///
/// Keeping one runner means a capture requested right after the models load
/// reaches the engine only after the camera acquire.
fn spawn_effect_runner(
    engine: EngineHandle,
    config: &Config,
    events: mpsc::Sender<Event>,
) -> mpsc::Sender<Effect> {
    let (tx, mut rx) = mpsc::channel::<Effect>(4);
    let device = config.camera_device.clone();
    let warmup_frames = config.warmup_frames;
    let timeout = config.capture_timeout();

    tokio::spawn(async move {
        while let Some(effect) = rx.recv().await {
            let event = match effect {
                Effect::AcquireCamera => match engine.acquire(&device, warmup_frames).await {
                    Ok(info) => Event::CameraBound(info),
                    Err(e) => {
                        tracing::error!(device = %device, error = %e, "error accessing camera");
                        continue;
                    }
                },
                Effect::RunCapture => match tokio::time::timeout(timeout, engine.capture()).await {
                    Ok(Ok(result)) => Event::CaptureFinished(result),
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "capture failed");
                        Event::CaptureFailed
                    }
                    Err(_) => {
                        tracing::warn!(?timeout, "capture timed out");
                        Event::CaptureFailed
                    }
                },
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    });

    tx
}

/// Prints the view to stdout whenever it changes.
#[derive(Default)]
struct Renderer {
    last: Option<String>,
}

impl Renderer {
    fn draw(&mut self, app: &App) -> bool {
        let rendered = view::render(app);
        if self.last.as_deref() == Some(rendered.as_str()) {
            return false;
        }
        println!("\n{rendered}");
        self.last = Some(rendered);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ModelLoadState;
    use moodcam_core::EmotionResult;
    use std::time::Duration;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(""), Command::Capture);
        assert_eq!(parse_command("  c \n"), Command::Capture);
        assert_eq!(parse_command("Capture"), Command::Capture);
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command("exit"), Command::Quit);
        assert_eq!(parse_command("hello"), Command::Unknown);
    }

    #[test]
    fn test_renderer_skips_unchanged_view() {
        let mut renderer = Renderer::default();
        let mut app = App::new();
        assert!(renderer.draw(&app));
        assert!(!renderer.draw(&app));

        app.handle(Event::ModelsLoaded);
        assert!(renderer.draw(&app));
        assert!(!renderer.draw(&app));
    }

    #[tokio::test]
    async fn test_capture_without_engine_reports_failure() {
        let (tx, mut rx) = mpsc::channel(1);
        perform(Effect::RunCapture, None, &tx).await;
        assert_eq!(rx.recv().await, Some(Event::CaptureFailed));
    }

    async fn drive_with_timeout(
        loading: impl Future<Output = Result<EngineHandle>>,
        input: mpsc::Receiver<String>,
        shutdown: impl Future<Output = ()>,
    ) -> App {
        let config = Config::from_lookup(|_| None);
        let mut renderer = Renderer::default();
        tokio::time::timeout(
            Duration::from_secs(5),
            drive(loading, input, shutdown, &config, &mut renderer),
        )
        .await
        .expect("session did not end")
    }

    #[tokio::test]
    async fn test_failed_model_load_stays_loading() {
        let (input_tx, input_rx) = mpsc::channel(4);
        input_tx.send(String::new()).await.unwrap();
        input_tx.send("q".to_string()).await.unwrap();

        let app = drive_with_timeout(
            async { Err(anyhow::anyhow!("model download failed")) },
            input_rx,
            std::future::pending(),
        )
        .await;

        assert_eq!(app.load_state(), ModelLoadState::Loading);
        assert!(!app.capture_in_flight());
        assert!(app.result().is_none());
        assert_eq!(
            view::render(&app),
            format!("{}\n{}", view::HEADING, view::LOADING_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_shutdown_ends_session_with_idle_input() {
        // The sender stays alive: no line ever arrives, as with a blocked stdin.
        let (_input_tx, input_rx) = mpsc::channel::<String>(1);
        let app = drive_with_timeout(std::future::pending(), input_rx, async {}).await;
        assert_eq!(app.load_state(), ModelLoadState::Loading);
    }

    #[tokio::test]
    async fn test_closed_input_ends_session() {
        let (input_tx, input_rx) = mpsc::channel::<String>(1);
        drop(input_tx);
        drive_with_timeout(std::future::pending(), input_rx, std::future::pending()).await;
    }

    #[tokio::test]
    async fn test_capture_waits_for_camera_acquire() {
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let config = Config::from_lookup(|_| None);
        let engine = EngineHandle::scripted(Duration::from_millis(50));
        let effects = spawn_effect_runner(engine, &config, events_tx);

        effects.send(Effect::AcquireCamera).await.unwrap();
        effects.send(Effect::RunCapture).await.unwrap();

        assert!(matches!(events_rx.recv().await, Some(Event::CameraBound(_))));
        assert_eq!(
            events_rx.recv().await,
            Some(Event::CaptureFinished(Some(EmotionResult::NoFace)))
        );
    }
}
