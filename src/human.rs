use std::collections::HashSet;
use tracing::{debug, info};

use crate::env::{AtariEnv, EnvConfig, Frame, KeyMap, RenderMode};
use crate::error::Result;
use crate::hack::{HackAtari, ensure_covered};
use crate::modifs::ModifSet;

pub const PAUSE_KEY: char = 'p';
pub const RESET_KEY: char = 'r';
pub const NOOP: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(char),
    KeyUp(char),
    /// Window closed (or Escape).
    Quit,
}

/// Where input comes from and frames go to.
pub trait Frontend {
    /// All events since the previous poll.
    fn poll_events(&mut self) -> Result<Vec<InputEvent>>;

    fn present(&mut self, frame: Frame<'_>) -> Result<()>;

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Paused,
    Terminated,
}

/// Keyboard play on top of a modified environment.
pub struct HumanPlayable<E: AtariEnv, F: Frontend> {
    env: HackAtari<E>,
    frontend: F,
    state: LoopState,
    current_keys_down: HashSet<char>,
    keys2actions: KeyMap,
    // Set on the step that ends an episode, cleared by the reset key.
    episode_over: bool,
    episodes_finished: usize,
}

impl<E: AtariEnv, F: Frontend> HumanPlayable<E, F> {
    pub fn new<I, S>(game: &str, modifs: I, config: EnvConfig, frontend: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_modifs(game, ModifSet::from_names(modifs), config, frontend)
    }

    /// Builds the backend for keyboard play: rendered to the frontend with the
    /// object overlay, one emulated frame per step.
    pub fn with_modifs(
        game: &str,
        modifs: ModifSet,
        config: EnvConfig,
        frontend: F,
    ) -> Result<Self> {
        ensure_covered(game)?;
        let config = EnvConfig {
            render_mode: RenderMode::Human,
            render_oc_overlay: true,
            frameskip: 1,
            ..config
        };
        let env = HackAtari::with_modifs(game, modifs, E::make(game, config)?)?;
        Self::from_env(env, frontend)
    }

    /// Resets and renders once so the frontend has a surface before the first poll.
    pub fn from_env(mut env: HackAtari<E>, frontend: F) -> Result<Self> {
        env.reset(None)?;
        let keys2actions = env.env().keys_to_action();
        let mut playable = Self {
            env,
            frontend,
            state: LoopState::Running,
            current_keys_down: HashSet::new(),
            keys2actions,
            episode_over: false,
            episodes_finished: 0,
        };
        playable.render()?;
        Ok(playable)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn env(&self) -> &HackAtari<E> {
        &self.env
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn episodes_finished(&self) -> usize {
        self.episodes_finished
    }

    pub fn run(&mut self) -> Result<()> {
        while self.tick()? != LoopState::Terminated {}
        self.env.close();
        self.frontend.close();
        Ok(())
    }

    /// One poll-act-render iteration. Acts only while running.
    pub fn tick(&mut self) -> Result<LoopState> {
        self.handle_user_input()?;
        if self.state == LoopState::Running {
            let action = self.action();
            let ret = self.env.step(action)?;
            if ret.done() && !self.episode_over {
                self.episode_over = true;
                self.episodes_finished += 1;
                info!(
                    terminated = ret.terminated,
                    frames = ret.info.episode_frame_number,
                    "episode over, press '{RESET_KEY}' to restart"
                );
            }
            self.render()?;
        }
        Ok(self.state)
    }

    /// The action for the held keys, or NOOP when the combination is unmapped.
    pub fn action(&self) -> u8 {
        self.keys2actions
            .get(self.current_keys_down.iter().copied())
            .unwrap_or(NOOP)
    }

    fn handle_user_input(&mut self) -> Result<()> {
        for event in self.frontend.poll_events()? {
            match event {
                InputEvent::Quit => {
                    self.state = LoopState::Terminated;
                }
                InputEvent::KeyDown(key) => {
                    if key == PAUSE_KEY {
                        self.toggle_pause();
                    }
                    if key == RESET_KEY {
                        // Raw reset: reset-time modifiers are not re-applied.
                        self.env.env_mut().reset(None)?;
                        self.episode_over = false;
                        debug!("environment reset from keyboard");
                    } else if self.keys2actions.binds(key) {
                        self.current_keys_down.insert(key);
                    }
                }
                InputEvent::KeyUp(key) => {
                    if self.keys2actions.binds(key) {
                        self.current_keys_down.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn toggle_pause(&mut self) {
        self.state = match self.state {
            LoopState::Running => LoopState::Paused,
            LoopState::Paused => LoopState::Running,
            LoopState::Terminated => LoopState::Terminated,
        };
        debug!(state = ?self.state, "pause toggled");
    }

    fn render(&mut self) -> Result<()> {
        if let Some(frame) = self.env.render() {
            self.frontend.present(frame)?;
        }
        Ok(())
    }
}
