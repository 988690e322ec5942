pub mod env;
pub mod error;
pub mod hack;
pub mod human;
pub mod modifs;
pub mod pong;
pub mod window;

pub use env::{
    ActionSpace, AtariEnv, EnvConfig, Frame, KeyMap, RAM_SIZE, RamAccess, RenderMode, ResetResult,
    StepInfo, StepResult, ram,
};
pub use error::{Error, Result};
pub use hack::{GAME_LIST, HackAtari, ensure_covered};
pub use human::{Frontend, HumanPlayable, InputEvent, LoopState};
pub use modifs::{HookPoint, LazyEnemy, ModifSet, Modification, RamModifier};
pub use pong::{GameObject, ObjectCategory, PongSim};
pub use window::WindowFrontend;
