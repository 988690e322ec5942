use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};

pub const RAM_SIZE: usize = 128;

// =============================================================================
// RAM Addresses (Pong)
// =============================================================================

pub mod ram {
    /// Non-zero while the ball has just been returned / is waiting to be served
    pub const RETURN_INDICATOR: usize = 11;
    pub const ENEMY_SCORE: usize = 13;
    pub const PLAYER_SCORE: usize = 14;
    pub const ENEMY_Y: usize = 21;
    pub const BALL_X: usize = 49;
    pub const PLAYER_Y: usize = 51;
    pub const BALL_Y: usize = 54;
    // Velocities are stored as two's-complement i8
    pub const BALL_DX: usize = 56;
    pub const BALL_DY: usize = 58;

    pub const LAZY_ENEMY_Y: u8 = 127;
    pub const LAZY_BALL_X: u8 = 130;
}

// =============================================================================
// Environment Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    None,
    Human,
    RgbArray,
}

/// Options forwarded verbatim to the backend. The interceptor never reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub render_mode: RenderMode,
    pub frameskip: u32,
    pub repeat_action_probability: f64,
    pub render_oc_overlay: bool,
    pub max_num_frames_per_episode: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::None,
            frameskip: 4,
            repeat_action_probability: 0.25,
            render_oc_overlay: false,
            max_num_frames_per_episode: Some(108_000),
            seed: None,
        }
    }
}

impl EnvConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

// =============================================================================
// Action Space & Key Mapping
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpace {
    pub n: usize,
}

impl ActionSpace {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn contains(&self, action: u8) -> bool {
        (action as usize) < self.n
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        rng.random_range(0..self.n) as u8
    }
}

/// Lookup from a combination of held keys to an action id.
///
/// Combinations are stored sorted, so `['d', ' ']` and `[' ', 'd']` resolve to
/// the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
    entries: HashMap<Vec<char>, u8>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keys: &[char], action: u8) {
        self.entries.insert(canonical(keys.iter().copied()), action);
    }

    pub fn get<I: IntoIterator<Item = char>>(&self, keys: I) -> Option<u8> {
        self.entries.get(&canonical(keys)).copied()
    }

    /// True when `key` on its own is a mapped combination.
    pub fn binds(&self, key: char) -> bool {
        self.entries.contains_key(&vec![key])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a [char], u8)> for KeyMap {
    fn from_iter<T: IntoIterator<Item = (&'a [char], u8)>>(iter: T) -> Self {
        let mut map = KeyMap::new();
        for (keys, action) in iter {
            map.insert(keys, action);
        }
        map
    }
}

fn canonical<I: IntoIterator<Item = char>>(keys: I) -> Vec<char> {
    let mut keys: Vec<char> = keys.into_iter().collect();
    keys.sort_unstable();
    keys
}

// =============================================================================
// Step / Reset Results
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepInfo {
    pub frame_number: u64,
    pub episode_frame_number: u64,
    pub lives: u8,
}

#[derive(Debug, Clone)]
pub struct ResetResult {
    pub obs: [u8; RAM_SIZE],
    pub info: StepInfo,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub obs: [u8; RAM_SIZE],
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A rendered 0RGB frame borrowed from the environment.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub pixels: &'a [u32],
    pub width: usize,
    pub height: usize,
}

// =============================================================================
// Environment Contract
// =============================================================================

pub trait RamAccess {
    fn ram(&self) -> &[u8];

    fn set_ram(&mut self, index: usize, value: u8) -> Result<()>;

    fn peek(&self, index: usize) -> Result<u8> {
        let ram = self.ram();
        ram.get(index).copied().ok_or(Error::RamOutOfRange {
            index,
            size: ram.len(),
        })
    }
}

impl RamAccess for [u8; RAM_SIZE] {
    fn ram(&self) -> &[u8] {
        self
    }

    fn set_ram(&mut self, index: usize, value: u8) -> Result<()> {
        let size = self.len();
        let slot = self
            .get_mut(index)
            .ok_or(Error::RamOutOfRange { index, size })?;
        *slot = value;
        Ok(())
    }
}

pub trait AtariEnv: RamAccess {
    fn make(game: &str, config: EnvConfig) -> Result<Self>
    where
        Self: Sized;

    fn reset(&mut self, seed: Option<u64>) -> Result<ResetResult>;

    fn step(&mut self, action: u8) -> Result<StepResult>;

    fn action_space(&self) -> ActionSpace;

    fn keys_to_action(&self) -> KeyMap;

    /// Draws the current frame, or `None` when rendering is disabled.
    fn render(&mut self) -> Option<Frame<'_>>;

    fn close(&mut self);
}
