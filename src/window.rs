use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use crate::env::Frame;
use crate::error::Result;
use crate::human::{Frontend, InputEvent};

/// A `minifb` window, opened on the first presented frame.
pub struct WindowFrontend {
    title: String,
    scale: Scale,
    target_fps: usize,
    window: Option<Window>,
    // Set when `present` already pumped the event queue this iteration.
    pumped: bool,
}

impl WindowFrontend {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            scale: Scale::X4,
            target_fps: 60,
            window: None,
            pumped: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.window.as_ref().is_some_and(Window::is_open)
    }

    fn open(&self, width: usize, height: usize) -> Result<Window> {
        let mut window = Window::new(
            &self.title,
            width,
            height,
            WindowOptions {
                resize: true,
                scale: self.scale,
                ..Default::default()
            },
        )?;
        window.set_target_fps(self.target_fps);
        Ok(window)
    }
}

impl Frontend for WindowFrontend {
    fn poll_events(&mut self) -> Result<Vec<InputEvent>> {
        let Some(window) = self.window.as_mut() else {
            return Ok(Vec::new());
        };
        if !std::mem::take(&mut self.pumped) {
            window.update();
        }

        let mut events = Vec::new();
        if !window.is_open() || window.is_key_pressed(Key::Escape, KeyRepeat::No) {
            events.push(InputEvent::Quit);
            return Ok(events);
        }
        events.extend(
            window
                .get_keys_pressed(KeyRepeat::No)
                .into_iter()
                .filter_map(key_char)
                .map(InputEvent::KeyDown),
        );
        events.extend(
            window
                .get_keys_released()
                .into_iter()
                .filter_map(key_char)
                .map(InputEvent::KeyUp),
        );
        Ok(events)
    }

    fn present(&mut self, frame: Frame<'_>) -> Result<()> {
        if self.window.is_none() {
            self.window = Some(self.open(frame.width, frame.height)?);
        }
        if let Some(window) = self.window.as_mut() {
            window.update_with_buffer(frame.pixels, frame.width, frame.height)?;
            self.pumped = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.window = None;
        self.pumped = false;
    }
}

/// Key identifier as used by `keys_to_action` mappings.
pub fn key_char(key: Key) -> Option<char> {
    let c = match key {
        Key::A => 'a',
        Key::B => 'b',
        Key::C => 'c',
        Key::D => 'd',
        Key::E => 'e',
        Key::F => 'f',
        Key::G => 'g',
        Key::H => 'h',
        Key::I => 'i',
        Key::J => 'j',
        Key::K => 'k',
        Key::L => 'l',
        Key::M => 'm',
        Key::N => 'n',
        Key::O => 'o',
        Key::P => 'p',
        Key::Q => 'q',
        Key::R => 'r',
        Key::S => 's',
        Key::T => 't',
        Key::U => 'u',
        Key::V => 'v',
        Key::W => 'w',
        Key::X => 'x',
        Key::Y => 'y',
        Key::Z => 'z',
        Key::Key0 => '0',
        Key::Key1 => '1',
        Key::Key2 => '2',
        Key::Key3 => '3',
        Key::Key4 => '4',
        Key::Key5 => '5',
        Key::Key6 => '6',
        Key::Key7 => '7',
        Key::Key8 => '8',
        Key::Key9 => '9',
        Key::Space => ' ',
        _ => return None,
    };
    Some(c)
}
