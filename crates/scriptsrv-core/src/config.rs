use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::CommandSpec;
use crate::controller::ControllerSettings;
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "scriptsrv.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_description")]
	pub description: String,
	/// Raw command lines, one supervised process each.
	#[serde(default)]
	pub commands: Vec<String>,
	#[serde(default = "default_restart_delay")]
	pub restart_delay_secs: u64,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_secs: u64,
	#[serde(default)]
	pub error_log: ErrorLogConfig,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			name: default_name(),
			description: default_description(),
			commands: Vec::new(),
			restart_delay_secs: default_restart_delay(),
			stop_timeout_secs: default_stop_timeout(),
			error_log: ErrorLogConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorLogConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Defaults to `ErrorLogs` under the base directory.
	pub dir: Option<PathBuf>,
	#[serde(default = "default_max_age_days")]
	pub max_age_days: u32,
}

impl Default for ErrorLogConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			dir: None,
			max_age_days: default_max_age_days(),
		}
	}
}

impl ErrorLogConfig {
	pub fn resolve_dir(&self, base: &Path) -> PathBuf {
		match &self.dir {
			Some(dir) if dir.is_absolute() => dir.clone(),
			Some(dir) => base.join(dir),
			None => base.join(crate::logs::ERROR_LOG_DIR),
		}
	}
}

fn default_name() -> String {
	"scriptsrv".to_string()
}
fn default_description() -> String {
	"Runs scripts as a background service".to_string()
}
fn default_restart_delay() -> u64 {
	5
}
fn default_stop_timeout() -> u64 {
	10
}
fn default_true() -> bool {
	true
}
fn default_max_age_days() -> u32 {
	21
}

impl ServiceConfig {
	pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		if config.restart_delay_secs == 0 {
			return Err(ConfigError::ZeroRestartDelay {
				path: path.to_path_buf(),
			});
		}
		Ok(config)
	}

	/// Every configured command, parsed. Any bad entry fails the whole set.
	pub fn command_specs(&self) -> Result<Vec<CommandSpec>, ConfigError> {
		CommandSpec::parse_all(&self.commands)
	}

	pub fn controller_settings(&self, workdir: impl Into<PathBuf>) -> ControllerSettings {
		ControllerSettings::new(workdir)
			.restart_delay(Duration::from_secs(self.restart_delay_secs))
			.stop_timeout(Duration::from_secs(self.stop_timeout_secs))
	}
}

/// Read a config file that must exist.
pub fn load(path: &Path) -> Result<ServiceConfig, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	ServiceConfig::from_toml(&content, path)
}

/// Read a config file if present, defaults otherwise. A file that exists but
/// does not parse is still an error.
pub fn load_or_default(path: &Path) -> Result<ServiceConfig, ConfigError> {
	if path.exists() {
		load(path)
	} else {
		Ok(ServiceConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_empty() {
		let config = ServiceConfig::from_toml("", Path::new("empty.toml")).unwrap();
		assert_eq!(config.name, "scriptsrv");
		assert_eq!(config.restart_delay_secs, 5);
		assert_eq!(config.stop_timeout_secs, 10);
		assert!(config.commands.is_empty());
		assert!(config.error_log.enabled);
		assert_eq!(config.error_log.max_age_days, 21);
	}

	#[test]
	fn zero_restart_delay_rejected() {
		let err = ServiceConfig::from_toml("restart_delay_secs = 0\n", Path::new("busy.toml")).unwrap_err();
		assert!(matches!(err, ConfigError::ZeroRestartDelay { .. }));
		assert!(err.to_string().contains("busy.toml"));
	}

	#[test]
	fn full_file() {
		let content = r#"
name = "workers"
description = "Background workers"
commands = ["node server.js", "python |my worker.py| -v"]
restart_delay_secs = 2
stop_timeout_secs = 4

[error_log]
dir = "/var/log/workers"
max_age_days = 7
"#;
		let config = ServiceConfig::from_toml(content, Path::new("workers.toml")).unwrap();
		assert_eq!(config.name, "workers");
		assert_eq!(config.commands.len(), 2);

		let specs = config.command_specs().unwrap();
		assert_eq!(specs[1].executable, "python");
		assert_eq!(specs[1].arguments, vec!["my worker.py".to_string(), "-v".to_string()]);

		let settings = config.controller_settings("/opt/workers");
		assert_eq!(settings.supervisor.restart_delay, Duration::from_secs(2));
		assert_eq!(settings.stop_timeout, Duration::from_secs(4));
		assert_eq!(
			config.error_log.resolve_dir(Path::new("/opt/workers")),
			PathBuf::from("/var/log/workers")
		);
	}

	#[test]
	fn error_log_dir_relative_to_base() {
		let mut log = ErrorLogConfig::default();
		assert_eq!(log.resolve_dir(Path::new("/srv")), PathBuf::from("/srv/ErrorLogs"));
		log.dir = Some("logs/errors".into());
		assert_eq!(log.resolve_dir(Path::new("/srv")), PathBuf::from("/srv/logs/errors"));
	}

	#[test]
	fn parse_error_names_file() {
		let err = ServiceConfig::from_toml("commands = 3", Path::new("bad.toml")).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { .. }));
		assert!(err.to_string().contains("bad.toml"));
	}

	#[test]
	fn bad_command_in_file_is_config_error() {
		let config = ServiceConfig::from_toml(r#"commands = ["ok", "|open"]"#, Path::new("x.toml")).unwrap();
		assert!(matches!(config.command_specs(), Err(ConfigError::UnbalancedQuote { .. })));
	}

	#[test]
	fn missing_file() {
		let path = std::env::temp_dir().join("scriptsrv-config-does-not-exist.toml");
		assert!(matches!(load(&path), Err(ConfigError::Read { .. })));
		assert_eq!(load_or_default(&path).unwrap().name, "scriptsrv");
	}
}
