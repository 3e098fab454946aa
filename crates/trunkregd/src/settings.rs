//! Configuration loading for the daemon
//!
//! Precedence: environment variables, then the TOML file, then built-in
//! defaults. A missing file is only tolerated at the default location.

use std::path::Path;

use anyhow::{Context, Result};
use trunkreg_core::AgentConfig;

/// Config file used when neither `--config` nor `TRUNKREG_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/trunkreg/trunkreg.toml";

/// Load, override from the process environment, and validate
pub fn load(path: Option<&Path>) -> Result<AgentConfig> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load`] with an explicit environment lookup
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<AgentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_file(default)?
            } else {
                AgentConfig::default()
            }
        }
    };

    config.apply_env_overrides(lookup)?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<AgentConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn file_values_override_defaults() {
        let file = config_file(
            r#"
            debug = true

            [database]
            host = "db.internal"
            database = "pbx"

            [dns]
            hosted_zone_id = "/hostedzone/Z123"
            cooldown_secs = 600

            [engine]
            update_interval_sec = 30

            [registry.profile]
            allow = "ulaw"
            "#,
        );

        let config = load_with(Some(file.path()), no_env).unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.database, "pbx");
        assert_eq!(config.database.user, "root");
        assert_eq!(config.dns.cooldown_secs, 600);
        assert_eq!(config.engine.update_interval_secs, 30);
        assert_eq!(config.registry.profile.allow, "ulaw");
        assert_eq!(config.registry.profile.port, 4569);
        assert_eq!(config.effective_log_level(), "debug");
    }

    #[test]
    fn environment_wins_over_file() {
        let file = config_file(
            r#"
            [database]
            host = "db.internal"

            [dns]
            hosted_zone_id = "/hostedzone/Z123"
            "#,
        );
        let env: HashMap<&str, &str> = [("MYSQL_HOST", "10.9.8.7"), ("TRUNKREG_LOG_LEVEL", "WARN")]
            .into_iter()
            .collect();

        let config =
            load_with(Some(file.path()), |name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.database.host, "10.9.8.7");
        assert_eq!(config.effective_log_level(), "warn");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let err = load_with(Some(&missing), no_env).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        // No hosted zone and no dry run
        let file = config_file("[database]\nhost = \"db.internal\"\n");
        assert!(load_with(Some(file.path()), no_env).is_err());

        let file = config_file("[dns]\ndry_run = true\n[engine]\nupdate_interval_secs = 0\n");
        assert!(load_with(Some(file.path()), no_env).is_err());
    }

    #[test]
    fn malformed_toml_is_reported() {
        let file = config_file("[database\nhost = ");
        let err = load_with(Some(file.path()), no_env).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }
}
