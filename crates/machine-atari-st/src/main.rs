//! Atari ST (STF/FM) emulator binary: windowed via winit + pixels, or
//! headless for scripted capture. The 68000 decoder itself is an
//! external collaborator (see `motorola_68000::CpuCore`); this binary
//! wires the placeholder `NullCpu` by default, which advances PC
//! without decoding real instructions.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use gilrs::{Button, Gilrs};
use motorola_68000::NullCpu;
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use machine_atari_st::cli::{self, CliArgs};
use machine_atari_st::{AtariConfig, AtariSt, Bus, RunError, TOS_BASE_STE, TOS_BASE_STF, TOS_SIZE_STE, TOS_SIZE_STF};

type SharedMachine = Arc<Mutex<AtariSt<NullCpu>>>;

const SCALE: u32 = 2;

fn load_tos(path: &Path) -> Result<(Vec<u8>, u32), RunError> {
    let data = std::fs::read(path).map_err(|source| RunError::TosRead { path: path.to_path_buf(), source })?;
    match data.len() {
        n if n == TOS_SIZE_STF => Ok((data, TOS_BASE_STF)),
        n if n == TOS_SIZE_STE => Ok((data, TOS_BASE_STE)),
        actual => Err(RunError::TosSize { path: path.to_path_buf(), actual }),
    }
}

fn build_machine(cli: &CliArgs, config: &AtariConfig) -> Result<AtariSt<NullCpu>, RunError> {
    let tos_path = cli.tos_path.clone().or_else(|| config.tos_path.clone()).ok_or_else(|| RunError::TosRead {
        path: PathBuf::from("<none configured>"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no --tos or TOSPath configured"),
    })?;
    let (rom, tos_base) = load_tos(&tos_path)?;

    let ram_size = config.ram_configuration().bytes();
    let mut bus = Bus::new(ram_size, rom, tos_base, config.sample_rate);

    let (mx, _my) = cli.mouse_sensitivity.unwrap_or((config.mouse_x_sensitivity, config.mouse_y_sensitivity));
    bus.acia.set_mouse_sensitivity(mx.clamp(1, 127) as u8);

    if let Some(floppy_path) = cli.floppy_path.clone().or_else(|| config.floppy_image_path.clone()) {
        let data = std::fs::read(&floppy_path).map_err(|source| RunError::FloppyRead { path: floppy_path.clone(), source })?;
        let is_msa = floppy_path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("msa"));
        let image = if is_msa {
            format_atari_floppy::FloppyImage::from_msa_bytes(&data, false)
        } else {
            format_atari_floppy::FloppyImage::from_st_bytes(data, false)
        }
        .map_err(|source| RunError::FloppyFormat { path: floppy_path.clone(), source })?;
        bus.wd.insert_disk(0, image);
    }

    let max_speed = cli.max_speed.unwrap_or(config.max_speed);
    let mut machine = AtariSt::new(NullCpu::new(), bus, max_speed);
    machine.reset();
    Ok(machine)
}

fn load_config(cli: &CliArgs) -> Result<AtariConfig, RunError> {
    let mut config = match &cli.altconfig_path {
        Some(path) => AtariConfig::load_from(path)?,
        None => AtariConfig::load_default()?,
    };
    config.debug_mode = config.debug_mode || cli.debug;
    Ok(config)
}

fn run_headless(machine: &mut AtariSt<NullCpu>, frames: u32) {
    for _ in 0..frames {
        machine.run_frame();
    }
}

/// Builds the output stream the YM audio ring is pulled through. Kept
/// alive for as long as the returned `cpal::Stream` lives; dropping it
/// stops playback.
fn build_audio_stream(machine: SharedMachine) -> Option<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;
    let supported = device.default_output_config().ok()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;

    let stream = device
        .build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let frames_needed = data.len() / channels.max(1);
                let mut atari = machine.lock().expect("audio stream mutex poisoned");
                let samples = atari.bus.ym.pull_samples(frames_needed);
                let mut it = samples.iter();
                for frame in data.chunks_mut(channels.max(1)) {
                    let sample = it.next().copied().unwrap_or(0.0);
                    for slot in frame {
                        *slot = sample;
                    }
                }
            },
            |err| eprintln!("audio stream error: {err}"),
            None,
        )
        .ok()?;

    if let Err(e) = stream.play() {
        eprintln!("failed to start audio stream: {e}");
        return None;
    }
    log::info!("audio output at {sample_rate} Hz, {channels} channel(s)");
    Some(stream)
}

struct App {
    machine: SharedMachine,
    gilrs: Option<Gilrs>,
    window: Option<&'static Window>,
    pixels: Option<Pixels<'static>>,
    // Held only to keep the audio callback alive; never read directly.
    _audio_stream: Option<cpal::Stream>,
}

impl App {
    fn new(machine: SharedMachine, audio_stream: Option<cpal::Stream>) -> Self {
        Self {
            machine,
            gilrs: Gilrs::new().ok(),
            window: None,
            pixels: None,
            _audio_stream: audio_stream,
        }
    }

    fn poll_gamepad(&mut self) {
        let Some(gilrs) = self.gilrs.as_mut() else { return };
        while gilrs.next_event().is_some() {}
        let Some((_id, pad)) = gilrs.gamepads().next() else { return };
        let fire = pad.is_pressed(Button::South);
        let up = pad.is_pressed(Button::DPadUp);
        let down = pad.is_pressed(Button::DPadDown);
        let left = pad.is_pressed(Button::DPadLeft);
        let right = pad.is_pressed(Button::DPadRight);
        let mut machine = self.machine.lock().expect("machine mutex poisoned");
        machine.bus.acia.joystick_input(fire, up, down, left, right);
    }

    fn handle_key(&mut self, keycode: KeyCode, pressed: bool) {
        let scancode = match keycode {
            KeyCode::Escape => 0x01,
            KeyCode::Enter => 0x1C,
            KeyCode::Space => 0x39,
            _ => return,
        };
        let mut machine = self.machine.lock().expect("machine mutex poisoned");
        machine.bus.acia.key_event(scancode, pressed);
    }

    fn update_pixels(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else { return };
        let machine = self.machine.lock().expect("machine mutex poisoned");
        let frame = pixels.frame_mut();
        for (i, &argb) in machine.framebuffer.iter().enumerate() {
            let offset = i * 4;
            frame[offset] = ((argb >> 16) & 0xFF) as u8;
            frame[offset + 1] = ((argb >> 8) & 0xFF) as u8;
            frame[offset + 2] = (argb & 0xFF) as u8;
            frame[offset + 3] = 0xFF;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let fb_width = atari_video_shifter::FB_WIDTH as u32;
        let fb_height = atari_video_shifter::FB_HEIGHT as u32;
        let window_size = winit::dpi::LogicalSize::new(fb_width * SCALE, fb_height * SCALE);
        let attrs = WindowAttributes::default()
            .with_title("Atari ST")
            .with_inner_size(window_size)
            .with_resizable(false);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window: &'static Window = Box::leak(Box::new(window));
                let inner = window.inner_size();
                let surface = SurfaceTexture::new(inner.width, inner.height, window);
                match Pixels::new(fb_width, fb_height, surface) {
                    Ok(pixels) => self.pixels = Some(pixels),
                    Err(e) => {
                        eprintln!("failed to create pixels surface: {e}");
                        event_loop.exit();
                        return;
                    }
                }
                self.window = Some(window);
            }
            Err(e) => {
                eprintln!("failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    self.handle_key(keycode, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::RedrawRequested => {
                self.poll_gamepad();
                self.machine.lock().expect("machine mutex poisoned").run_frame();
                self.update_pixels();
                if let Some(pixels) = self.pixels.as_ref() {
                    if let Err(e) = pixels.render() {
                        eprintln!("render error: {e}");
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    env_logger::init();
    let cli = cli::parse_args();

    let config = load_config(&cli).unwrap_or_else(|e| {
        eprintln!("config error: {e}");
        process::exit(1);
    });

    let machine = build_machine(&cli, &config).unwrap_or_else(|e| {
        eprintln!("startup error: {e}");
        process::exit(1);
    });

    if config.debug_mode {
        log::info!("debug tracing enabled");
    }

    if std::env::var_os("ATARI_ST_HEADLESS").is_some() {
        let mut machine = machine;
        run_headless(&mut machine, 50);
        return;
    }

    let machine: SharedMachine = Arc::new(Mutex::new(machine));
    let audio_stream = build_audio_stream(Arc::clone(&machine));
    let mut app = App::new(machine, audio_stream);

    let event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(e) => {
            eprintln!("failed to create event loop: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = event_loop.run_app(&mut app) {
        eprintln!("event loop error: {e}");
        process::exit(1);
    }
}
