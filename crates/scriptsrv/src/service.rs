use std::path::{Path, PathBuf};
use std::process::Command;

use scriptsrv_core::Error;

pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// A systemd unit that re-runs this binary with the given arguments.
#[derive(Debug, Clone)]
pub struct UnitFile {
	pub name: String,
	pub description: String,
	pub exec: Vec<String>,
	pub working_dir: PathBuf,
}

impl UnitFile {
	pub fn render(&self) -> String {
		let exec_start = self
			.exec
			.iter()
			.map(|arg| quote_arg(arg))
			.collect::<Vec<_>>()
			.join(" ");

		format!(
			"[Unit]\n\
			 Description={description}\n\
			 After=network.target\n\
			 \n\
			 [Service]\n\
			 Type=simple\n\
			 ExecStart={exec_start}\n\
			 WorkingDirectory={working_dir}\n\
			 KillMode=mixed\n\
			 Restart=on-failure\n\
			 \n\
			 [Install]\n\
			 WantedBy=multi-user.target\n",
			description = escape_specifiers(&self.description),
			exec_start = exec_start,
			working_dir = escape_specifiers(&self.working_dir.to_string_lossy()),
		)
	}
}

/// Double-quote for systemd's command-line syntax, escaping `\`, `"` and `%`.
fn quote_arg(arg: &str) -> String {
	let mut quoted = String::with_capacity(arg.len() + 2);
	quoted.push('"');
	for c in arg.chars() {
		match c {
			'\\' => quoted.push_str("\\\\"),
			'"' => quoted.push_str("\\\""),
			'%' => quoted.push_str("%%"),
			_ => quoted.push(c),
		}
	}
	quoted.push('"');
	quoted
}

fn escape_specifiers(value: &str) -> String {
	value.replace('%', "%%")
}

/// Registers, removes, starts and stops the service through systemctl.
pub struct ServiceManager {
	unit_dir: PathBuf,
	systemctl: String,
}

impl ServiceManager {
	pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
		Self {
			unit_dir: unit_dir.into(),
			systemctl: "systemctl".to_string(),
		}
	}

	pub fn unit_path(&self, name: &str) -> PathBuf {
		self.unit_dir.join(format!("{}.service", name))
	}

	pub fn install(&self, unit: &UnitFile) -> Result<PathBuf, Error> {
		let path = self.unit_path(&unit.name);
		if path.exists() {
			return Err(Error::ServiceManager {
				action: "install".to_string(),
				detail: format!("{} already exists, uninstall first", path.display()),
			});
		}
		std::fs::create_dir_all(&self.unit_dir)?;
		std::fs::write(&path, unit.render())?;
		self.systemctl("daemon-reload", &["daemon-reload"])?;
		self.systemctl("enable", &["enable", &unit.name])?;
		Ok(path)
	}

	pub fn uninstall(&self, name: &str) -> Result<(), Error> {
		let path = self.unit_path(name);
		if !path.exists() {
			return Err(Error::ServiceManager {
				action: "uninstall".to_string(),
				detail: format!("{} not found", path.display()),
			});
		}
		// a service that fails to stop keeps its unit file
		self.systemctl("disable", &["disable", "--now", name])?;
		std::fs::remove_file(&path)?;
		self.systemctl("daemon-reload", &["daemon-reload"])?;
		Ok(())
	}

	pub fn start(&self, name: &str) -> Result<String, Error> {
		self.systemctl("start", &["start", name])
	}

	pub fn stop(&self, name: &str) -> Result<String, Error> {
		self.systemctl("stop", &["stop", name])
	}

	fn systemctl(&self, action: &str, args: &[&str]) -> Result<String, Error> {
		let output = Command::new(&self.systemctl)
			.args(args)
			.output()
			.map_err(|e| Error::ServiceManager {
				action: action.to_string(),
				detail: format!("cannot run {}: {}", self.systemctl, e),
			})?;

		let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
		if output.status.success() {
			Ok(stdout)
		} else {
			let stderr = String::from_utf8_lossy(&output.stderr);
			Err(Error::ServiceManager {
				action: action.to_string(),
				detail: format!("{} ({})", stderr.trim(), output.status),
			})
		}
	}
}

/// ExecStart for an installed service: this binary plus the settings it was
/// installed with.
pub fn exec_args(exe: &Path, name: &str, commands: &[String], config: Option<&Path>) -> Vec<String> {
	let mut args = vec![
		exe.to_string_lossy().to_string(),
		"--name".to_string(),
		name.to_string(),
	];
	if let Some(config) = config {
		args.push("--config".to_string());
		args.push(config.to_string_lossy().to_string());
	}
	for command in commands {
		args.push("--command".to_string());
		args.push(command.clone());
	}
	args
}

#[cfg(test)]
mod tests {
	use super::*;

	fn unit() -> UnitFile {
		UnitFile {
			name: "workers".into(),
			description: "Runs 100% of the workers".into(),
			exec: exec_args(
				Path::new("/opt/workers/scriptsrv"),
				"workers",
				&["node server.js".into(), "python |my worker.py|".into()],
				None,
			),
			working_dir: "/opt/workers".into(),
		}
	}

	#[test]
	fn exec_args_repeat_command_flag() {
		let args = exec_args(Path::new("/bin/x"), "svc", &["a b".into(), "c".into()], Some(Path::new("/etc/x.toml")));
		assert_eq!(
			args,
			vec!["/bin/x", "--name", "svc", "--config", "/etc/x.toml", "--command", "a b", "--command", "c"]
		);
	}

	#[test]
	fn render_unit() {
		let text = unit().render();
		assert!(text.contains("Description=Runs 100%% of the workers\n"));
		assert!(text.contains(
			"ExecStart=\"/opt/workers/scriptsrv\" \"--name\" \"workers\" \"--command\" \"node server.js\" \"--command\" \"python |my worker.py|\"\n"
		));
		assert!(text.contains("WorkingDirectory=/opt/workers\n"));
		assert!(text.contains("WantedBy=multi-user.target"));
	}

	#[test]
	fn quote_escapes_specials() {
		assert_eq!(quote_arg(r#"say "hi" \ 50%"#), r#""say \"hi\" \\ 50%%""#);
	}

	#[test]
	fn unit_path_uses_service_suffix() {
		let manager = ServiceManager::new("/tmp/units");
		assert_eq!(manager.unit_path("workers"), PathBuf::from("/tmp/units/workers.service"));
	}

	#[test]
	fn uninstall_missing_unit_fails() {
		let dir = std::env::temp_dir().join(format!("scriptsrv-units-{}", std::process::id()));
		let manager = ServiceManager::new(&dir);
		let err = manager.uninstall("nothing-here").unwrap_err();
		assert!(err.to_string().contains("not found"));
	}

	#[test]
	fn uninstall_keeps_unit_when_disable_fails() {
		let dir = std::env::temp_dir().join(format!("scriptsrv-units-disable-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let manager = ServiceManager {
			unit_dir: dir.clone(),
			systemctl: "false".to_string(),
		};
		let path = manager.unit_path("workers");
		std::fs::write(&path, unit().render()).unwrap();

		let err = manager.uninstall("workers").unwrap_err();
		assert!(err.to_string().starts_with("disable failed"));
		assert!(path.exists());

		let _ = std::fs::remove_dir_all(&dir);
	}
}
