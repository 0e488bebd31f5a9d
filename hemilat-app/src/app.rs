use crate::adapters::{
    ChannelKeys, LoggingAudio, LoggingPhysiology, LoggingTrigger, SceneDisplay, SharedScene,
};
use crate::settings::Settings;
use anyhow::{Context, Result, anyhow};
use hemilat_core::{Devices, KeyPress};
use hemilat_experiment::{JsonLinesLog, Session, SessionReport};
use hemilat_render::{SceneRenderer, SceneStyle, TextCache};
use hemilat_timing::{Clock, FrameTimes, HighPrecisionClock};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

/// Name the session core sees for a key, lowercase.
pub fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Character(s) => Some(s.to_lowercase()),
        Key::Named(NamedKey::Space) => Some("space".to_string()),
        Key::Named(NamedKey::Shift) => Some("shift".to_string()),
        Key::Named(NamedKey::Enter) => Some("return".to_string()),
        Key::Named(NamedKey::Escape) => Some("escape".to_string()),
        Key::Named(named) => Some(format!("{named:?}").to_lowercase()),
        _ => None,
    }
}

/// Starts the session on its own thread. The devices are built there; only
/// their sendable parts cross over.
fn spawn_session(
    settings: &Settings,
    clock: HighPrecisionClock,
    scene: SharedScene,
    keys: mpsc::Receiver<KeyPress>,
) -> Result<JoinHandle<SessionReport>> {
    let log = JsonLinesLog::create(&settings.app.output.session_log)?;
    let codes = settings.app.trigger_codes();
    let session = Session::new(settings.session.clone(), clock.clone(), StdRng::from_os_rng())?;

    thread::Builder::new()
        .name("session".to_string())
        .spawn(move || {
            let mut devices = Devices {
                renderer: Box::new(SceneDisplay::new(scene, StdRng::from_os_rng())),
                trigger: Box::new(LoggingTrigger::new(codes)),
                physiology: Box::new(LoggingPhysiology::new(clock)),
                keys: Box::new(ChannelKeys::new(keys)),
                audio: Box::new(LoggingAudio),
                log: Box::new(log),
            };
            session.run(&mut devices)
        })
        .context("spawning session thread")
}

pub struct App {
    settings: Settings,
    clock: HighPrecisionClock,
    scene: SharedScene,
    keys: Sender<KeyPress>,
    session: Option<JoinHandle<SessionReport>>,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SceneRenderer>,
    refresh_rate: Option<f64>,
    present_times: FrameTimes,
    last_present: Option<Duration>,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(settings: Settings) -> Result<Self> {
        let clock = HighPrecisionClock::new();
        let scene = SharedScene::default();
        let (tx, rx) = mpsc::channel();
        let session = spawn_session(&settings, clock.clone(), Arc::clone(&scene), rx)?;

        Ok(Self {
            settings,
            clock,
            scene,
            keys: tx,
            session: Some(session),
            window: None,
            pixels: None,
            renderer: None,
            refresh_rate: None,
            present_times: FrameTimes::default(),
            last_present: None,
            failure: None,
        })
    }

    /// Runs the window until the session ends and returns its exit code.
    pub fn run(mut self) -> Result<i32> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "display starting"
        );
        event_loop.run_app(&mut self)?;

        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        let stats = self.present_times.calibration_stats();
        info!(
            fps = stats.effective_fps,
            jitter_ms = stats.jitter_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            "presentation timing"
        );
        if let Some(renderer) = &self.renderer {
            let draw = renderer.draw_times().calibration_stats();
            info!(
                jitter_ms = draw.jitter_ns / 1e6,
                max_ms = draw.max_frame_time_ns / 1e6,
                "scene draw timing"
            );
        }

        let report = self.finish_session()?;
        if let Some(err) = self.failure.take() {
            error!("display failed: {:#}", err);
            return Ok(1);
        }
        info!("{}", report.summary);
        Ok(report.exit_code())
    }

    fn finish_session(&mut self) -> Result<SessionReport> {
        let handle = self
            .session
            .take()
            .ok_or_else(|| anyhow!("session already collected"))?;
        if !handle.is_finished() {
            info!("window closed, asking the session to quit and waiting for it to stop");
            let quit = KeyPress::new(self.settings.session.keys.quit.clone(), self.clock.now());
            if self.keys.send(quit).is_err() {
                warn!("session no longer reading keys");
            }
        }
        handle
            .join()
            .map_err(|_| anyhow!("session thread panicked"))
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let display = &self.settings.app.display;
        let mut attributes = Window::default_attributes()
            .with_title(display.title.clone())
            .with_resizable(false);
        if display.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = self.refresh_rate,
            "display configured"
        );

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);

        let text = match &display.font {
            Some(path) => Some(TextCache::load(path, display.font_size)?),
            None => {
                warn!("no font configured, cues and feedback will not be drawn");
                None
            }
        };
        let style = SceneStyle {
            late_after: self.settings.session.task.max_time,
            ..SceneStyle::default()
        };
        self.renderer = Some(SceneRenderer::new(size.width, size.height, style, text)?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let scene = {
            let mut shared = self
                .scene
                .lock()
                .map_err(|_| anyhow!("scene lock poisoned"))?;
            let snapshot = shared.clone();
            shared.advance_frame();
            snapshot
        };

        let stats = renderer.render(&scene, pixels.frame_mut(), &self.clock)?;
        pixels.render()?;

        let now = self.clock.now();
        if let Some(last) = self.last_present.replace(now) {
            self.present_times.record(now.saturating_sub(last));
        }
        debug!(
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            "frame"
        );
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if let Some(pixels) = self.pixels.as_mut() {
            pixels.resize_surface(size.width, size.height)?;
            pixels.resize_buffer(size.width, size.height)?;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(size.width, size.height)?;
        }
        info!(width = size.width, height = size.height, "display resized");
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                self.fail(event_loop, err.context("creating window"));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render() {
                    self.fail(event_loop, err);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                let at = self.clock.now();
                if let Some(name) = key_name(&event.logical_key) {
                    if self.keys.send(KeyPress::new(name, at)).is_err() {
                        debug!("key dropped, session finished");
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(err) = self.handle_resize(size) {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.as_ref().is_some_and(JoinHandle::is_finished) {
            event_loop.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn keys_are_named_in_lowercase() {
        assert_eq!(key_name(&Key::Character(SmolStr::new("Q"))), Some("q".to_string()));
        assert_eq!(key_name(&Key::Named(NamedKey::Space)), Some("space".to_string()));
        assert_eq!(key_name(&Key::Named(NamedKey::Shift)), Some("shift".to_string()));
        assert_eq!(key_name(&Key::Named(NamedKey::Tab)), Some("tab".to_string()));
    }
}
