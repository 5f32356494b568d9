//! Settings file handling for the fcnet binary.

use fcnet_core::CoreSettings;
use fcnet_core::handshake::ACK_LEN;
use std::fs;
use std::path::Path;

/// Smallest admin request limit that still fits a useful request.
const MIN_MESSAGE_SIZE: usize = 256;

/// Load settings from a TOML file.
///
/// Fields missing from the file keep their defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<CoreSettings> {
    let contents = fs::read_to_string(path)?;
    let settings: CoreSettings = toml::from_str(&contents)?;
    Ok(settings)
}

/// Load from `path` if given, otherwise use defaults.
///
/// # Errors
///
/// Returns an error if a given file cannot be loaded or fails validation.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<CoreSettings> {
    let settings = match path {
        Some(path) => load(path)?,
        None => CoreSettings::default(),
    };
    validate(&settings)?;
    Ok(settings)
}

/// Validate settings
///
/// # Errors
///
/// Returns an error if settings are invalid.
pub fn validate(settings: &CoreSettings) -> anyhow::Result<()> {
    if settings.max_config_size <= ACK_LEN {
        anyhow::bail!(
            "max_config_size must be larger than {} bytes",
            ACK_LEN
        );
    }

    if settings.max_message_size < MIN_MESSAGE_SIZE {
        anyhow::bail!("max_message_size must be at least {} bytes", MIN_MESSAGE_SIZE);
    }

    if settings.arena_limit < settings.max_message_size {
        anyhow::bail!(
            "arena_limit ({}) must be at least max_message_size ({})",
            settings.arena_limit,
            settings.max_message_size
        );
    }

    if settings.cookie_window_secs == 0 {
        anyhow::bail!("cookie_window_secs must be at least 1");
    }

    if settings.log_queue_capacity == 0 {
        anyhow::bail!("log_queue_capacity must be at least 1");
    }

    Ok(())
}
