//! Configuration Vault – reads/writes `~/.sweepbot/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use sweepbot_hal::sim::SimConfig;
use sweepbot_perception::heading::HeadingFilterConfig;
use sweepbot_perception::odometry::EncoderCalibration;
use sweepbot_perception::scan::ScanConfig;
use sweepbot_runtime::{CorrectionConfig, MotionConfig, NavigationConfig};

/// Persisted configuration stored in `~/.sweepbot/config.toml`.
///
/// Every section falls back to its defaults, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stop after this many sweep cycles; unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
    pub calibration: EncoderCalibration,
    pub heading: HeadingFilterConfig,
    pub scan: ScanConfig,
    pub motion: MotionConfig,
    pub navigation: NavigationConfig,
    pub correction: CorrectionConfig,
    pub sim: SimConfig,
}

/// Return the path to `~/.sweepbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sweepbot").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SWEEPBOT_*` environment variable overrides to `cfg`. Values that
/// do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SWEEPBOT_PERIMETER_X` | `navigation.perimeter_x_cm` |
/// | `SWEEPBOT_PERIMETER_Y` | `navigation.perimeter_y_cm` |
/// | `SWEEPBOT_SWEEP_INCREMENT` | `navigation.sweep_increment_cm` |
/// | `SWEEPBOT_MAX_CYCLES` | `max_cycles` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parse::<f32>("SWEEPBOT_PERIMETER_X").filter(|v| *v > 0.0) {
        cfg.navigation.perimeter_x_cm = v;
    }
    if let Some(v) = env_parse::<f32>("SWEEPBOT_PERIMETER_Y").filter(|v| *v > 0.0) {
        cfg.navigation.perimeter_y_cm = v;
    }
    if let Some(v) = env_parse::<f32>("SWEEPBOT_SWEEP_INCREMENT").filter(|v| *v > 0.0) {
        cfg.navigation.sweep_increment_cm = v;
    }
    if let Some(v) = env_parse::<u64>("SWEEPBOT_MAX_CYCLES") {
        cfg.max_cycles = Some(v);
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.sweepbot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
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
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests share process state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn saved_config_loads_back_with_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.navigation.perimeter_x_cm = 300.0;
        cfg.max_cycles = Some(12);
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.navigation.perimeter_x_cm, 300.0);
        assert_eq!(loaded.navigation.perimeter_y_cm, 20.0);
        assert_eq!(loaded.max_cycles, Some(12));
        assert_eq!(loaded.calibration.pulses_per_rev, 12);
        assert_eq!(loaded.correction.max_restarts, 3);
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[navigation]\nperimeter_y_cm = 150.0\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.navigation.perimeter_y_cm, 150.0);
        assert_eq!(loaded.navigation.sweep_increment_cm, 5.0);
        assert_eq!(loaded.scan.forward_deg, 270.0);
        assert!(loaded.max_cycles.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "navigation = [").expect("write");

        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_sweepbot_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".sweepbot"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_perimeter_and_cycles() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("SWEEPBOT_PERIMETER_X", "120");
            std::env::set_var("SWEEPBOT_PERIMETER_Y", "80.5");
            std::env::set_var("SWEEPBOT_SWEEP_INCREMENT", "4");
            std::env::set_var("SWEEPBOT_MAX_CYCLES", "7");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("SWEEPBOT_PERIMETER_X");
            std::env::remove_var("SWEEPBOT_PERIMETER_Y");
            std::env::remove_var("SWEEPBOT_SWEEP_INCREMENT");
            std::env::remove_var("SWEEPBOT_MAX_CYCLES");
        }

        assert_eq!(cfg.navigation.perimeter_x_cm, 120.0);
        assert_eq!(cfg.navigation.perimeter_y_cm, 80.5);
        assert_eq!(cfg.navigation.sweep_increment_cm, 4.0);
        assert_eq!(cfg.max_cycles, Some(7));
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("SWEEPBOT_PERIMETER_X", "wide");
            std::env::set_var("SWEEPBOT_SWEEP_INCREMENT", "-3");
            std::env::set_var("SWEEPBOT_MAX_CYCLES", "forever");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("SWEEPBOT_PERIMETER_X");
            std::env::remove_var("SWEEPBOT_SWEEP_INCREMENT");
            std::env::remove_var("SWEEPBOT_MAX_CYCLES");
        }

        let defaults = NavigationConfig::default();
        assert_eq!(cfg.navigation.perimeter_x_cm, defaults.perimeter_x_cm);
        assert_eq!(cfg.navigation.sweep_increment_cm, defaults.sweep_increment_cm);
        assert!(cfg.max_cycles.is_none());
    }
}
