//! CLI error type.

use std::path::PathBuf;

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from the resolution engine.
    #[error(transparent)]
    Engine(#[from] nametag::Error),

    /// The configuration has blocking issues.
    #[error("configuration has {0} error(s)")]
    InvalidConfig(usize),

    /// Refused to overwrite an existing file.
    #[error("{} already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    /// Serializing the configuration for display failed.
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}
