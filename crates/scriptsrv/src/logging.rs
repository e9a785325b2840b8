use std::path::{Path, PathBuf};
use std::sync::Mutex;

use scriptsrv_core::logs::{self, ErrorLogFile};
use scriptsrv_core::ErrorLogConfig;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Console output filtered by `RUST_LOG` (default `info`), plus ERROR events
/// appended to the dated error log. Returns the error log path if one opened.
pub fn init(config: &ErrorLogConfig, base: &Path) -> Option<PathBuf> {
	let console = fmt::layer().with_target(false).with_filter(
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
	);

	let mut expired = 0;
	let mut open_error = None;
	let mut error_log_path = None;

	let error_layer = if config.enabled {
		let dir = config.resolve_dir(base);
		expired = logs::expire_logs(&dir, config.max_age_days);
		match ErrorLogFile::open(&dir) {
			Ok(file) => {
				error_log_path = Some(file.path());
				Some(
					fmt::layer()
						.with_ansi(false)
						.with_target(false)
						.with_writer(Mutex::new(file))
						.with_filter(LevelFilter::ERROR),
				)
			}
			Err(e) => {
				open_error = Some(format!("cannot open {}: {}", dir.display(), e));
				None
			}
		}
	} else {
		None
	};

	tracing_subscriber::registry().with(console).with(error_layer).init();

	if expired > 0 {
		tracing::info!("removed {} expired error log(s)", expired);
	}
	if let Some(e) = open_error {
		tracing::warn!("error log disabled, {}", e);
	}
	error_log_path
}
