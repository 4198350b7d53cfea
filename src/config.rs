//! Environment configuration.

use std::env;

/// Environment-driven settings for the client core.
///
/// Everything has a sensible default; variables exist for development
/// overrides and packaging hooks.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Base URL of the backend (`EMBER_BACKEND_URL`). Defaults to the
    /// supervised local address.
    pub backend_url: Option<String>,
    /// Pinned backend archive path (`EMBER_BACKEND_ARCHIVE`).
    pub backend_archive: Option<String>,
    /// Pinned runtime extraction root (`EMBER_RUNTIME_ROOT`).
    pub runtime_root: Option<String>,
    /// Backend source tree for the development profile (`EMBER_DEV_BACKEND`).
    /// When set, the supervisor launches from this tree instead of the
    /// packaged archive.
    pub dev_backend_root: Option<String>,
    /// Interpreter for the development profile (`EMBER_DEV_PYTHON`).
    pub dev_interpreter: Option<String>,
    /// Cloud routing key (`EMBER_OPENROUTER_KEY`).
    pub openrouter_key: Option<String>,
    /// Model identifier for new turns (`EMBER_MODEL`).
    pub model: Option<String>,
    /// Skip backend supervision entirely (`EMBER_NO_SPAWN=1`); the client
    /// then expects an already-running backend.
    pub no_spawn: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            backend_url: env_string_opt("EMBER_BACKEND_URL"),
            backend_archive: env_string_opt("EMBER_BACKEND_ARCHIVE"),
            runtime_root: env_string_opt("EMBER_RUNTIME_ROOT"),
            dev_backend_root: env_string_opt("EMBER_DEV_BACKEND"),
            dev_interpreter: env_string_opt("EMBER_DEV_PYTHON"),
            openrouter_key: env_string_opt("EMBER_OPENROUTER_KEY"),
            model: env_string_opt("EMBER_MODEL"),
            no_spawn: env_flag("EMBER_NO_SPAWN"),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
