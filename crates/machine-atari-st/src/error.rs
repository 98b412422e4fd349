//! Top-level error surface for configuration loading and the runner
//! binary. Leaf chip crates use hand-written `Display`/`Error` enums
//! (matching `format-atari-floppy::FloppyFormatError`); this crate's
//! heavier config/CLI surface uses `thiserror` instead, the same split
//! this workspace's other `machine-*` crates keep.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("cannot write config file {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed config at {path}: {source}")]
    Parse { path: PathBuf, #[source] source: json5::Error },
    #[error("cannot determine a platform config directory")]
    NoConfigDir,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot read TOS ROM at {path}: {source}")]
    TosRead { path: PathBuf, #[source] source: std::io::Error },
    #[error("TOS ROM at {path} is {actual} bytes; expected 192KiB or 256KiB")]
    TosSize { path: PathBuf, actual: usize },
    #[error("cannot read floppy image {path}: {source}")]
    FloppyRead { path: PathBuf, #[source] source: std::io::Error },
    #[error("cannot parse floppy image {path}: {source}")]
    FloppyFormat { path: PathBuf, #[source] source: format_atari_floppy::FloppyFormatError },
}
