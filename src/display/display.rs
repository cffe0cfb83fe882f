//! SDL2 Window Display Module
//! One window per stream, created the first time that stream is shown.
//! Keys arrive as SDL text-input events; closing any window quits.

use std::collections::{HashMap, VecDeque};

use color_eyre::{eyre::eyre, Result};
use sdl2::event::{Event, WindowEvent};
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::Canvas;
use sdl2::video::Window;
use sdl2::EventPump;
use tracing::{debug, info};

use super::{DisplayImage, DisplaySurface};
use crate::DisplayConfig;

/// SDL2 Window Display
pub struct Sdl2Display {
    _sdl: sdl2::Sdl,
    video: sdl2::VideoSubsystem,
    event_pump: EventPump,
    windows: HashMap<String, Canvas<Window>>,
    pending_keys: VecDeque<char>,
    config: DisplayConfig,
}

impl Sdl2Display {
    pub fn new(config: DisplayConfig) -> Result<Self> {
        let sdl = sdl2::init().map_err(|e| eyre!(e))?;
        let video = sdl.video().map_err(|e| eyre!(e))?;
        video.text_input().start();
        let event_pump = sdl.event_pump().map_err(|e| eyre!(e))?;

        Ok(Self {
            _sdl: sdl,
            video,
            event_pump,
            windows: HashMap::new(),
            pending_keys: VecDeque::new(),
            config,
        })
    }

    fn window_for(&mut self, stream: &str, image: &DisplayImage) -> Result<&mut Canvas<Window>> {
        if !self.windows.contains_key(stream) {
            let (w, h) = if self.config.resizable {
                (self.config.width, self.config.height)
            } else {
                (image.width, image.height)
            };
            let mut builder = self.video.window(stream, w, h);
            builder.position_centered();
            if self.config.resizable {
                builder.resizable();
            }
            let canvas = builder.build()?.into_canvas().build()?;
            info!("Opened window '{}' ({}x{})", stream, w, h);
            self.windows.insert(stream.to_string(), canvas);
        }
        self.windows
            .get_mut(stream)
            .ok_or_else(|| eyre!("window for '{}' vanished", stream))
    }
}

impl DisplaySurface for Sdl2Display {
    fn show(&mut self, stream: &str, image: &DisplayImage) -> Result<()> {
        let bgr = image.to_bgr();
        let pitch = image.width as usize * 3;
        let canvas = self.window_for(stream, image)?;
        let texture_creator = canvas.texture_creator();

        let mut texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::BGR24, image.width, image.height)
            .map_err(|e| eyre!(e))?;

        texture.update(None, &bgr, pitch).map_err(|e| eyre!(e))?;

        canvas.clear();
        canvas.copy(&texture, None, None).map_err(|e| eyre!(e))?;
        canvas.present();
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        if let Some(key) = self.pending_keys.pop_front() {
            return Ok(Some(key));
        }
        while let Some(event) = self.event_pump.poll_event() {
            match event {
                Event::Quit { .. }
                | Event::Window {
                    win_event: WindowEvent::Close,
                    ..
                } => {
                    debug!("Window close requested");
                    return Ok(Some('q'));
                }
                Event::TextInput { text, .. } => {
                    self.pending_keys.extend(text.chars());
                    if let Some(key) = self.pending_keys.pop_front() {
                        return Ok(Some(key));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }
}
