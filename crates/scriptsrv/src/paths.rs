use std::io;
use std::path::{Path, PathBuf};

use scriptsrv_core::config::CONFIG_FILE_NAME;

/// Directory holding this binary. Supervised commands run here.
pub fn install_dir() -> io::Result<PathBuf> {
	let exe = std::env::current_exe()?;
	exe.parent()
		.map(Path::to_path_buf)
		.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))
}

/// systemd sets `INVOCATION_ID` for every unit it starts.
pub fn under_service_manager() -> bool {
	std::env::var_os("INVOCATION_ID").is_some()
}

/// Where relative log paths are anchored: the install directory when started
/// by the service manager, the current directory otherwise.
pub fn log_base_dir(install_dir: &Path) -> PathBuf {
	if under_service_manager() {
		install_dir.to_path_buf()
	} else {
		std::env::current_dir().unwrap_or_else(|_| install_dir.to_path_buf())
	}
}

pub fn default_config_path(install_dir: &Path) -> PathBuf {
	install_dir.join(CONFIG_FILE_NAME)
}

/// `path` as seen from `base`. Absolute paths pass through.
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		base.join(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn install_dir_contains_test_binary() {
		let dir = install_dir().unwrap();
		let exe = std::env::current_exe().unwrap();
		assert_eq!(exe.parent().unwrap(), dir);
	}

	#[test]
	fn config_path_next_to_binary() {
		let path = default_config_path(Path::new("/opt/app"));
		assert_eq!(path, PathBuf::from("/opt/app/scriptsrv.toml"));
	}

	#[test]
	fn relative_paths_anchor_to_base() {
		let base = Path::new("/home/ops");
		assert_eq!(resolve_against(Path::new("svc.toml"), base), PathBuf::from("/home/ops/svc.toml"));
		assert_eq!(resolve_against(Path::new("conf/svc.toml"), base), PathBuf::from("/home/ops/conf/svc.toml"));
		assert_eq!(resolve_against(Path::new("/etc/svc.toml"), base), PathBuf::from("/etc/svc.toml"));
	}
}
