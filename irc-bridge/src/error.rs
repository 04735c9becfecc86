//! Error types for the bridge library.

use std::path::PathBuf;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("nickname must not be empty")]
    EmptyNickname,

    #[error("no servers configured")]
    NoServers,

    #[error("server {0} has an empty identifier")]
    EmptyIdentifier(String),

    #[error("identifier {0:?} is used by more than one server")]
    DuplicateIdentifier(String),
}
