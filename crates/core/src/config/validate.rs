use std::path::Path;

use super::{types::Config, ConfigError};
use crate::naming::normalize_title;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn require_dir(path: &Path, key: &str) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{} cannot be empty", key)));
    }
    Ok(())
}

/// Validate configuration
/// Currently validates:
/// - Intervals are not 0
/// - Required directories are set
/// - No quality is listed in both tiers
/// - Watch and destination directories differ
/// - Alias targets contain at least one letter or digit
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let torrents = &config.torrents;
    if torrents.update_interval_secs == 0 {
        return Err(invalid("torrents.update_interval_secs cannot be 0"));
    }
    if torrents.backfill_interval_secs == 0 {
        return Err(invalid("torrents.backfill_interval_secs cannot be 0"));
    }
    if config.calendars.update_interval_secs == 0 {
        return Err(invalid("calendars.update_interval_secs cannot be 0"));
    }

    require_dir(&torrents.watch_dir, "torrents.watch_dir")?;
    require_dir(&config.files.watch_dir, "files.watch_dir")?;
    require_dir(&config.files.temp_dir, "files.temp_dir")?;
    require_dir(&config.files.destination_dir, "files.destination_dir")?;

    for quality in &torrents.primary_qualities {
        if torrents
            .secondary_qualities
            .iter()
            .any(|s| s.eq_ignore_ascii_case(quality))
        {
            return Err(invalid(format!(
                "quality '{}' is listed as both primary and secondary",
                quality
            )));
        }
    }

    if config.files.watch_dir == config.files.destination_dir {
        return Err(invalid(
            "files.watch_dir and files.destination_dir must differ",
        ));
    }

    for (alias, title) in &config.aliases {
        if normalize_title(title).is_empty() {
            return Err(invalid(format!(
                "aliases.{} must contain a letter or digit",
                alias
            )));
        }
    }

    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts cannot be 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn config(extra: &str) -> Config {
        let toml = format!(
            r#"
[torrents]
watch_dir = "/torrents"
primary_qualities = ["1080p"]
secondary_qualities = ["720p"]
{extra}

[files]
watch_dir = "/downloads"
temp_dir = "/staging"
destination_dir = "/library"
"#
        );
        load_config_from_str(&toml).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&config("")).is_ok());
    }

    #[test]
    fn test_validate_zero_interval_fails() {
        let err = validate_config(&config("update_interval_secs = 0")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_quality_in_both_tiers_fails() {
        let mut config = config("");
        config.torrents.secondary_qualities.push("1080P".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("1080P") || err.to_string().contains("1080p"));
    }

    #[test]
    fn test_validate_missing_torrent_watch_dir_fails() {
        let mut config = config("");
        config.torrents.watch_dir = Default::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_watch_equals_destination_fails() {
        let mut config = config("");
        config.files.destination_dir = config.files.watch_dir.clone();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_unusable_alias_fails() {
        let mut config = config("");
        config
            .aliases
            .insert("drwho".to_string(), "Doctor Who/2005".to_string());
        assert!(validate_config(&config).is_ok());

        config.aliases.insert("broken".to_string(), "--".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("aliases.broken"));
    }
}
