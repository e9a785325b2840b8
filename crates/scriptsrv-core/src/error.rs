use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::controller::ServiceState;

/// Problems with the configured command set, surfaced before anything is spawned.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("empty command: {raw:?}")]
	EmptyCommand { raw: String },

	#[error("unbalanced '|' in command: {raw:?}")]
	UnbalancedQuote { raw: String },

	#[error("no commands configured")]
	NoCommands,

	#[error("{}: restart_delay_secs must be at least 1", path.display())]
	ZeroRestartDelay { path: PathBuf },

	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

/// Why a single attempt did not succeed. Always handled by the supervisor loop.
#[derive(thiserror::Error, Debug)]
pub enum Failure {
	#[error("spawn failed: {0}")]
	Spawn(#[source] io::Error),

	#[error("exited with {status}")]
	Exited { status: ExitStatus, stderr: String },

	#[error("wait failed: {0}")]
	Wait(#[source] io::Error),
}

impl Failure {
	/// Exit code of a runtime failure, if the process exited normally.
	pub fn exit_code(&self) -> Option<i32> {
		match self {
			Failure::Exited { status, .. } => status.code(),
			_ => None,
		}
	}

	pub fn stderr(&self) -> Option<&str> {
		match self {
			Failure::Exited { stderr, .. } if !stderr.is_empty() => Some(stderr),
			_ => None,
		}
	}
}

#[derive(thiserror::Error, Debug)]
#[error("invalid service transition: {from:?} -> {to:?}")]
pub struct TransitionError {
	pub from: ServiceState,
	pub to: ServiceState,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("service host failed: {0}")]
	Host(String),

	#[error(transparent)]
	Transition(#[from] TransitionError),

	#[error("{action} failed: {detail}")]
	ServiceManager { action: String, detail: String },

	#[error("io error: {0}")]
	Io(#[from] io::Error),
}
