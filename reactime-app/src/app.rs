use crate::options::AppOptions;
use anyhow::{Context, Result};
use pixels::{Pixels, SurfaceTexture};
use reactime_core::{InputEvent, KeyCode};
use reactime_experiment::{
    BatteryConfig, BatteryDriver, BatteryEvent, JsonSessionRecorder, RunnerEvent,
};
use reactime_render::{Scene, SkiaRenderer};
use reactime_timing::{HighPrecisionTimer, Timer};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode as WinitKey, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

pub struct App {
    options: AppOptions,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    scene: Scene,
    battery: BatteryDriver,
    recorder: JsonSessionRecorder,
    timer: HighPrecisionTimer,
    cursor: (f32, f32),
    started: bool,
}

impl App {
    pub fn new(options: AppOptions) -> Result<Self> {
        let config = BatteryConfig::load(&options.battery)
            .with_context(|| format!("loading battery {}", options.battery.display()))?;
        info!(tasks = config.tasks.len(), order = ?config.order, "battery loaded");
        let recorder = JsonSessionRecorder::new(&options.session, options.participant.clone());

        Ok(Self {
            options,
            window: None,
            pixels: None,
            renderer: None,
            scene: Scene::new(),
            battery: BatteryDriver::new(config),
            recorder,
            timer: HighPrecisionTimer::new(),
            cursor: (0.0, 0.0),
            started: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting battery; press ESC to stop"
        );
        event_loop.run_app(&mut self)?;
        self.save();
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .context("no monitor available")?;

        let refresh_hz = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Reactime")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz,
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);

        let mut renderer = SkiaRenderer::new(size.width, size.height)?;
        match &self.options.font {
            Some(path) => renderer = renderer.with_font_file(path)?,
            None => warn!("no font found, set REACTIME_FONT; text will not be drawn"),
        }
        self.renderer = Some(renderer);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn apply(&mut self, events: Vec<BatteryEvent>) {
        for event in events {
            match event {
                BatteryEvent::Runner {
                    event: RunnerEvent::Render(command),
                    ..
                } => self.scene.apply(&command),
                BatteryEvent::Runner { task, event } => debug!(task = %task, ?event, "runner event"),
                BatteryEvent::TaskStarted { task, position } => {
                    info!(task = %task, position, "task started")
                }
                BatteryEvent::TaskSkipped { task, error } => {
                    warn!(task = %task, %error, "task skipped")
                }
                BatteryEvent::TaskFinished { task, status } => {
                    info!(task = %task, status = status.as_str(), "task finished");
                    self.save();
                }
                BatteryEvent::Completed { at_ms } => {
                    info!(at_ms, "battery completed; press ESC to close");
                    self.save();
                }
                BatteryEvent::Aborted { at_ms } => {
                    info!(at_ms, "battery aborted");
                    self.save();
                }
            }
        }
        if let Some(window) = &self.window {
            // The trail sheet is the only mouse-driven screen.
            window.set_cursor_visible(!self.scene.trail.is_empty());
        }
    }

    /// Reads the clock and moves the scene to it, so onsets and rests are
    /// stamped with the time the engine saw.
    fn now_ms(&mut self) -> u64 {
        let now = self.timer.now_ms();
        self.scene.set_time(now);
        now
    }

    fn update(&mut self) {
        let now = self.now_ms();
        if !self.started {
            self.started = true;
            let events = self.battery.start(now, &mut self.recorder);
            self.apply(events);
        }
        if self.battery.next_deadline().is_some_and(|d| d <= now) {
            let events = self.battery.advance(now, &mut self.recorder);
            self.apply(events);
        }
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let stats = renderer.render_frame(&self.scene, pixels.frame_mut(), &self.timer)?;
        let t = self.timer.now();
        pixels.render()?;
        let present = self.timer.elapsed(t);
        self.timer.record_frame(stats.total + present);
        if stats.redrawn {
            debug!(
                draw_ms = stats.draw.as_secs_f64() * 1e3,
                copy_ms = stats.copy.as_secs_f64() * 1e3,
                present_ms = present.as_secs_f64() * 1e3,
                "frame"
            );
        }
        Ok(())
    }

    fn handle_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let code = map_key(key);
        if !self.battery.is_finished() {
            let input = InputEvent::key(code, self.now_ms());
            let events = self.battery.handle_input(input, &mut self.recorder);
            self.apply(events);
        }
        if code == KeyCode::Escape {
            self.exit(event_loop);
        }
    }

    fn handle_click(&mut self) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        let (w, h) = renderer.size();
        let Some(item) = self.scene.trail_item_at(w, h, self.cursor.0, self.cursor.1) else {
            return;
        };
        let input = InputEvent::select(item, self.now_ms());
        let events = self.battery.handle_input(input, &mut self.recorder);
        self.apply(events);
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                error!(%e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                error!(%e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size.width, size.height) {
                error!(%e, "failed to resize renderer");
            }
        }
        info!(width = size.width, height = size.height, "display resized");
    }

    fn save(&mut self) {
        if let Err(e) = self.recorder.save() {
            error!(%e, path = %self.recorder.path().display(), "failed to save session");
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if !self.battery.is_finished() {
            let now = self.now_ms();
            let events = self.battery.abort(now, &mut self.recorder);
            self.apply(events);
        }
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.save();
        let stats = self.timer.calibration_stats();
        info!(
            fps = stats.effective_fps,
            jitter_ms = stats.jitter_ns / 1e6,
            "session closed"
        );
        event_loop.exit();
    }
}

/// Maps a physical key to the battery's DOM-style codes.
fn map_key(key: PhysicalKey) -> KeyCode {
    let PhysicalKey::Code(code) = key else {
        return KeyCode::Other;
    };
    match code {
        WinitKey::Space => KeyCode::Space,
        WinitKey::ArrowLeft => KeyCode::ArrowLeft,
        WinitKey::ArrowRight => KeyCode::ArrowRight,
        WinitKey::KeyR => KeyCode::KeyR,
        WinitKey::KeyY => KeyCode::KeyY,
        WinitKey::KeyG => KeyCode::KeyG,
        WinitKey::KeyB => KeyCode::KeyB,
        WinitKey::Escape => KeyCode::Escape,
        _ => KeyCode::Other,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(%e, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.exit(event_loop),
            WindowEvent::RedrawRequested => {
                self.update();
                if let Err(e) = self.render() {
                    error!(%e, "render failed");
                    self.exit(event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = self.window.clone() {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }
}
