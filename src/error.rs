use thiserror::Error;

/// Errors produced by the modification layer and the bundled backends.
///
/// Construction-time checks (`UnsupportedGame`, `UnknownModification`) fail
/// before the wrapped environment is touched. Everything else is raised by the
/// environment or the frontend and is passed through unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested game id matches none of the supported titles.
    #[error("Game {game} is not covered in the HackAtari")]
    UnsupportedGame { game: String },

    /// A modification name outside the catalog, rejected in strict mode.
    #[error("unknown modification `{name}`")]
    UnknownModification { name: String },

    #[error("RAM index {index} out of range (size {size})")]
    RamOutOfRange { index: usize, size: usize },

    #[error("action {action} outside the action space (n = {n})")]
    InvalidAction { action: u8, n: usize },

    #[error("window error: {0}")]
    Window(#[from] minifb::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
