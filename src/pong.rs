use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::env::{
    ActionSpace, AtariEnv, EnvConfig, Frame, KeyMap, RAM_SIZE, RamAccess, RenderMode,
    ResetResult, StepInfo, StepResult, ram,
};
use crate::error::{Error, Result};

// =============================================================================
// Court Geometry
// =============================================================================

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 210;

/// RAM x coordinates are screen x + 48, as on the cartridge.
const X_OFFSET: i16 = 48;
const FIELD_TOP: i16 = 34;
const FIELD_BOTTOM: i16 = 194;
const PADDLE_WIDTH: i16 = 4;
const PADDLE_HEIGHT: i16 = 16;
const BALL_SIZE: i16 = 2;
const ENEMY_PADDLE_X: i16 = 64;
const PLAYER_PADDLE_X: i16 = 188;
const LEFT_GOAL: i16 = 48;
const RIGHT_GOAL: i16 = 206;
const PADDLE_MIN_Y: i16 = FIELD_TOP;
const PADDLE_MAX_Y: i16 = FIELD_BOTTOM - PADDLE_HEIGHT;
const PADDLE_START_Y: u8 = 106;

const BALL_PARK_X: u8 = 128;
const BALL_PARK_Y: u8 = 113;
const BALL_SPEED: i8 = 2;
const SERVE_DELAY: u8 = 60;

const PLAYER_SPEED: i16 = 3;
const ENEMY_SPEED: i16 = 2;
const WINNING_SCORE: u8 = 21;

const COLOR_BACKGROUND: u32 = 0x90_48_11;
const COLOR_WALL: u32 = 0xEC_EC_EC;
const COLOR_BALL: u32 = 0xEC_EC_EC;
const COLOR_ENEMY: u32 = 0xD5_82_4A;
const COLOR_PLAYER: u32 = 0x5C_BA_5C;

pub mod action {
    pub const NOOP: u8 = 0;
    pub const FIRE: u8 = 1;
    pub const RIGHT: u8 = 2;
    pub const LEFT: u8 = 3;
    pub const RIGHTFIRE: u8 = 4;
    pub const LEFTFIRE: u8 = 5;
    pub const COUNT: usize = 6;
}

// =============================================================================
// Objects
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectCategory {
    Player,
    Enemy,
    Ball,
}

impl ObjectCategory {
    fn color(self) -> u32 {
        match self {
            ObjectCategory::Player => COLOR_PLAYER,
            ObjectCategory::Enemy => COLOR_ENEMY,
            ObjectCategory::Ball => COLOR_BALL,
        }
    }
}

/// An object read out of RAM, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameObject {
    pub category: ObjectCategory,
    pub x: i16,
    pub y: i16,
    pub w: i16,
    pub h: i16,
}

// =============================================================================
// Pong Environment
// =============================================================================

/// RAM-driven Pong. Every frame reads its state from RAM and writes it back,
/// so patches made between frames are what the next frame plays with.
pub struct PongSim {
    mem: [u8; RAM_SIZE],
    config: EnvConfig,
    rng: SmallRng,
    last_action: u8,
    frame_number: u64,
    episode_frame_number: u64,
    frame: Vec<u32>,
}

impl PongSim {
    pub fn new(config: EnvConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let mut sim = Self {
            mem: [0; RAM_SIZE],
            config,
            rng,
            last_action: action::NOOP,
            frame_number: 0,
            episode_frame_number: 0,
            frame: Vec::new(),
        };
        sim.reset_state();
        sim
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn scores(&self) -> (u8, u8) {
        (self.mem[ram::PLAYER_SCORE], self.mem[ram::ENEMY_SCORE])
    }

    pub fn game_over(&self) -> bool {
        let (player, enemy) = self.scores();
        player >= WINNING_SCORE || enemy >= WINNING_SCORE
    }

    fn ball_in_play(&self) -> bool {
        self.mem[ram::RETURN_INDICATOR] == 0
    }

    pub fn objects(&self) -> Vec<GameObject> {
        let mut objects = vec![
            GameObject {
                category: ObjectCategory::Player,
                x: PLAYER_PADDLE_X - X_OFFSET,
                y: self.mem[ram::PLAYER_Y] as i16,
                w: PADDLE_WIDTH,
                h: PADDLE_HEIGHT,
            },
            GameObject {
                category: ObjectCategory::Enemy,
                x: ENEMY_PADDLE_X - X_OFFSET,
                y: self.mem[ram::ENEMY_Y] as i16,
                w: PADDLE_WIDTH,
                h: PADDLE_HEIGHT,
            },
        ];
        if self.ball_in_play() {
            objects.push(GameObject {
                category: ObjectCategory::Ball,
                x: self.mem[ram::BALL_X] as i16 - X_OFFSET,
                y: self.mem[ram::BALL_Y] as i16,
                w: BALL_SIZE,
                h: BALL_SIZE,
            });
        }
        objects
    }

    fn reset_state(&mut self) {
        self.mem = [0; RAM_SIZE];
        self.mem[ram::PLAYER_Y] = PADDLE_START_Y;
        self.mem[ram::ENEMY_Y] = PADDLE_START_Y;
        let toward_player = self.rng.random::<bool>();
        self.park_ball(if toward_player { BALL_SPEED } else { -BALL_SPEED });
        self.last_action = action::NOOP;
        self.episode_frame_number = 0;
    }

    fn park_ball(&mut self, serve_dx: i8) {
        self.mem[ram::BALL_X] = BALL_PARK_X;
        self.mem[ram::BALL_Y] = BALL_PARK_Y;
        self.mem[ram::BALL_DX] = serve_dx as u8;
        self.mem[ram::BALL_DY] = 0;
        self.mem[ram::RETURN_INDICATOR] = SERVE_DELAY;
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            frame_number: self.frame_number,
            episode_frame_number: self.episode_frame_number,
            lives: 0,
        }
    }

    /// One emulated frame. Returns the reward earned in it.
    fn advance_frame(&mut self, action: u8) -> f32 {
        let player_y = self.mem[ram::PLAYER_Y] as i16 + paddle_direction(action) * PLAYER_SPEED;
        let player_y = player_y.clamp(PADDLE_MIN_Y, PADDLE_MAX_Y);
        self.mem[ram::PLAYER_Y] = player_y as u8;

        let ball_y = self.mem[ram::BALL_Y] as i16;
        let enemy_y = self.mem[ram::ENEMY_Y] as i16;
        let target = ball_y + BALL_SIZE / 2 - PADDLE_HEIGHT / 2;
        let step = (target - enemy_y).clamp(-ENEMY_SPEED, ENEMY_SPEED);
        let enemy_y = (enemy_y + step).clamp(PADDLE_MIN_Y, PADDLE_MAX_Y);
        self.mem[ram::ENEMY_Y] = enemy_y as u8;

        let countdown = self.mem[ram::RETURN_INDICATOR];
        if countdown > 0 {
            self.mem[ram::RETURN_INDICATOR] = countdown - 1;
            if countdown == 1 {
                let dy: i8 = match self.rng.random_range(0..4) {
                    0 => -2,
                    1 => -1,
                    2 => 1,
                    _ => 2,
                };
                self.mem[ram::BALL_DY] = dy as u8;
            }
            return 0.0;
        }

        let mut dx = self.mem[ram::BALL_DX] as i8 as i16;
        let mut dy = self.mem[ram::BALL_DY] as i8 as i16;
        let mut x = self.mem[ram::BALL_X] as i16 + dx;
        let mut y = ball_y + dy;

        if y <= FIELD_TOP {
            y = FIELD_TOP;
            dy = dy.abs();
        } else if y >= FIELD_BOTTOM - BALL_SIZE {
            y = FIELD_BOTTOM - BALL_SIZE;
            dy = -dy.abs();
        }

        if dx < 0 && hits_paddle(x, y, ENEMY_PADDLE_X, enemy_y) {
            x = ENEMY_PADDLE_X + PADDLE_WIDTH;
            dx = -dx;
            dy = deflect(y, enemy_y);
        } else if dx > 0 && hits_paddle(x, y, PLAYER_PADDLE_X, player_y) {
            x = PLAYER_PADDLE_X - BALL_SIZE;
            dx = -dx;
            dy = deflect(y, player_y);
        }

        if x <= LEFT_GOAL {
            self.mem[ram::PLAYER_SCORE] = self.mem[ram::PLAYER_SCORE].saturating_add(1);
            self.park_ball(-BALL_SPEED);
            return 1.0;
        }
        if x >= RIGHT_GOAL {
            self.mem[ram::ENEMY_SCORE] = self.mem[ram::ENEMY_SCORE].saturating_add(1);
            self.park_ball(BALL_SPEED);
            return -1.0;
        }

        self.mem[ram::BALL_X] = x as u8;
        self.mem[ram::BALL_Y] = y as u8;
        self.mem[ram::BALL_DX] = dx as i8 as u8;
        self.mem[ram::BALL_DY] = dy as i8 as u8;
        0.0
    }

    fn draw(&mut self) {
        let size = SCREEN_WIDTH * SCREEN_HEIGHT;
        if self.frame.len() != size {
            self.frame = vec![0; size];
        }
        self.frame.fill(COLOR_BACKGROUND);

        let width = SCREEN_WIDTH as i16;
        self.fill_rect(0, FIELD_TOP - 10, width, 10, COLOR_WALL);
        self.fill_rect(0, FIELD_BOTTOM, width, 16, COLOR_WALL);

        let (player_score, enemy_score) = self.scores();
        self.draw_score(enemy_score, 20, COLOR_ENEMY);
        self.draw_score(player_score, 100, COLOR_PLAYER);

        let objects = self.objects();
        for obj in &objects {
            self.fill_rect(obj.x, obj.y, obj.w, obj.h, obj.category.color());
        }
        if self.config.render_oc_overlay {
            for obj in &objects {
                self.outline_rect(obj.x - 1, obj.y - 1, obj.w + 2, obj.h + 2, 0xFF_FF_FF);
            }
        }
    }

    fn draw_score(&mut self, score: u8, x: i16, color: u32) {
        const SCALE: i16 = 3;
        let tens = score / 10;
        let ones = score % 10;
        if tens > 0 {
            self.draw_digit(tens, x, 2, SCALE, color);
        }
        self.draw_digit(ones, x + 4 * SCALE, 2, SCALE, color);
    }

    fn draw_digit(&mut self, digit: u8, x: i16, y: i16, scale: i16, color: u32) {
        for (row, bits) in DIGIT_FONT[digit as usize % 10].iter().enumerate() {
            for col in 0..3i16 {
                if bits & (0b100 >> col) != 0 {
                    self.fill_rect(x + col * scale, y + row as i16 * scale, scale, scale, color);
                }
            }
        }
    }

    fn fill_rect(&mut self, x: i16, y: i16, w: i16, h: i16, color: u32) {
        let x0 = x.clamp(0, SCREEN_WIDTH as i16) as usize;
        let x1 = (x + w).clamp(0, SCREEN_WIDTH as i16) as usize;
        let y0 = y.clamp(0, SCREEN_HEIGHT as i16) as usize;
        let y1 = (y + h).clamp(0, SCREEN_HEIGHT as i16) as usize;
        for row in y0..y1 {
            self.frame[row * SCREEN_WIDTH + x0..row * SCREEN_WIDTH + x1].fill(color);
        }
    }

    fn outline_rect(&mut self, x: i16, y: i16, w: i16, h: i16, color: u32) {
        self.fill_rect(x, y, w, 1, color);
        self.fill_rect(x, y + h - 1, w, 1, color);
        self.fill_rect(x, y, 1, h, color);
        self.fill_rect(x + w - 1, y, 1, h, color);
    }
}

const DIGIT_FONT: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// RIGHT moves the paddle up the screen, LEFT moves it down.
fn paddle_direction(action: u8) -> i16 {
    match action {
        action::RIGHT | action::RIGHTFIRE => -1,
        action::LEFT | action::LEFTFIRE => 1,
        _ => 0,
    }
}

fn hits_paddle(ball_x: i16, ball_y: i16, paddle_x: i16, paddle_y: i16) -> bool {
    ball_x < paddle_x + PADDLE_WIDTH
        && ball_x + BALL_SIZE > paddle_x
        && ball_y < paddle_y + PADDLE_HEIGHT
        && ball_y + BALL_SIZE > paddle_y
}

/// Steeper returns the further the ball lands from the paddle centre.
fn deflect(ball_y: i16, paddle_y: i16) -> i16 {
    let offset = (ball_y + BALL_SIZE / 2) - (paddle_y + PADDLE_HEIGHT / 2);
    (offset / 3).clamp(-3, 3)
}

impl RamAccess for PongSim {
    fn ram(&self) -> &[u8] {
        &self.mem
    }

    fn set_ram(&mut self, index: usize, value: u8) -> Result<()> {
        self.mem.set_ram(index, value)
    }
}

impl AtariEnv for PongSim {
    fn make(game: &str, config: EnvConfig) -> Result<Self> {
        if !game.contains("Pong") {
            return Err(Error::UnsupportedGame {
                game: game.to_string(),
            });
        }
        Ok(Self::new(config))
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<ResetResult> {
        if let Some(seed) = seed {
            self.rng = SmallRng::seed_from_u64(seed);
        }
        self.reset_state();
        debug!(?seed, "pong reset");
        Ok(ResetResult {
            obs: self.mem,
            info: self.info(),
        })
    }

    fn step(&mut self, action: u8) -> Result<StepResult> {
        if !self.action_space().contains(action) {
            return Err(Error::InvalidAction {
                action,
                n: action::COUNT,
            });
        }

        let mut reward = 0.0;
        if !self.game_over() {
            for _ in 0..self.config.frameskip.max(1) {
                if self.rng.random::<f64>() >= self.config.repeat_action_probability {
                    self.last_action = action;
                }
                reward += self.advance_frame(self.last_action);
                self.frame_number += 1;
                self.episode_frame_number += 1;
                if self.game_over() {
                    let (player, enemy) = self.scores();
                    info!(player, enemy, frames = self.episode_frame_number, "game over");
                    break;
                }
            }
        }

        let terminated = self.game_over();
        let truncated = !terminated
            && self
                .config
                .max_num_frames_per_episode
                .is_some_and(|max| self.episode_frame_number >= max);
        Ok(StepResult {
            obs: self.mem,
            reward,
            terminated,
            truncated,
            info: self.info(),
        })
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::new(action::COUNT)
    }

    fn keys_to_action(&self) -> KeyMap {
        KeyMap::from_iter([
            (&[][..], action::NOOP),
            (&[' '][..], action::FIRE),
            (&['d'][..], action::RIGHT),
            (&['a'][..], action::LEFT),
            (&['d', ' '][..], action::RIGHTFIRE),
            (&['a', ' '][..], action::LEFTFIRE),
        ])
    }

    fn render(&mut self) -> Option<Frame<'_>> {
        if self.config.render_mode == RenderMode::None {
            return None;
        }
        self.draw();
        Some(Frame {
            pixels: &self.frame,
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
        })
    }

    fn close(&mut self) {
        self.frame = Vec::new();
    }
}
