//! Follower settings on disk: reads and writes `~/.trailbot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use trailbot_types::{FollowerConfig, Policy};

/// Return the path to `~/.trailbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".trailbot").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<FollowerConfig>, String> {
    load_from(&config_path())
}

/// Load, apply environment overrides, then validate.
pub(crate) fn load_from(path: &Path) -> Result<Option<FollowerConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: FollowerConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Apply `TRAILBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TRAILBOT_POLICY` | `policy` (`blended`, `state_machine`, `fsm`) |
/// | `TRAILBOT_ENABLED` | `enabled` |
/// | `TRAILBOT_Z_SCALE` | `z_scale` |
/// | `TRAILBOT_TICK_HZ` | `tick_hz` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut FollowerConfig) {
    if let Ok(v) = std::env::var("TRAILBOT_POLICY")
        && let Ok(policy) = v.parse::<Policy>()
    {
        cfg.policy = policy;
    }
    if let Ok(v) = std::env::var("TRAILBOT_ENABLED")
        && let Some(enabled) = parse_flag(&v)
    {
        cfg.enabled = enabled;
    }
    if let Ok(v) = std::env::var("TRAILBOT_Z_SCALE")
        && let Ok(scale) = v.trim().parse::<f32>()
    {
        cfg.z_scale = scale;
    }
    if let Ok(v) = std::env::var("TRAILBOT_TICK_HZ")
        && let Ok(hz) = v.trim().parse::<f32>()
    {
        cfg.tick_hz = hz;
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.trailbot/` if necessary.
pub fn save(cfg: &FollowerConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &FollowerConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
