use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::command::CommandSpec;
use crate::error::Failure;
use crate::output::{StderrCapture, FAILURE_TAIL_SIZE};

/// How long a failed attempt waits for its stderr pipe to drain.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// The result of one attempt. Exactly one is produced per spawn.
#[derive(Debug)]
pub enum Outcome {
	Succeeded,
	Failed(Failure),
	Cancelled,
}

impl Outcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Outcome::Succeeded)
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Outcome::Cancelled)
	}

	pub fn failure(&self) -> Option<&Failure> {
		match self {
			Outcome::Failed(f) => Some(f),
			_ => None,
		}
	}
}

/// A started child process, not yet resolved.
pub struct RunningProcess {
	child: Child,
	pid: Option<u32>,
	stderr: StderrCapture,
	reader: Option<JoinHandle<()>>,
}

/// Start `spec` in `workdir` with stderr captured. A failure here means no
/// process exists.
pub fn start(spec: &CommandSpec, workdir: &Path) -> Result<RunningProcess, Failure> {
	let mut cmd = Command::new(&spec.executable);
	cmd.args(&spec.arguments)
		.current_dir(workdir)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::piped())
		.process_group(0)
		.kill_on_drop(true);

	let mut child = cmd.spawn().map_err(Failure::Spawn)?;
	let pid = child.id();
	tracing::debug!(
		"spawned {} (pid {}) in {}",
		spec,
		pid.unwrap_or(0),
		workdir.display()
	);

	let stderr = StderrCapture::new();
	let reader = child
		.stderr
		.take()
		.map(|pipe| tokio::spawn(stderr.clone().pipe(pipe)));

	Ok(RunningProcess {
		child,
		pid,
		stderr,
		reader,
	})
}

/// Start `spec` and drive it to an outcome.
pub async fn spawn(spec: &CommandSpec, workdir: &Path, token: CancelToken) -> Outcome {
	match start(spec, workdir) {
		Ok(process) => process.wait(token).await,
		Err(failure) => Outcome::Failed(failure),
	}
}

impl RunningProcess {
	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub fn stderr(&self) -> &StderrCapture {
		&self.stderr
	}

	/// Wait for the process to exit or the token to fire.
	///
	/// The token is sampled again once the wait returns; if it has fired the
	/// attempt is `Cancelled` even when the process also exited on its own.
	pub async fn wait(mut self, mut token: CancelToken) -> Outcome {
		let waited = tokio::select! {
			status = self.child.wait() => Some(status),
			_ = token.cancelled() => None,
		};

		let status = match waited {
			Some(status) if !token.is_cancelled() => status,
			// already reaped; its pid may belong to someone else by now
			Some(_) => return Outcome::Cancelled,
			None => {
				self.terminate().await;
				return Outcome::Cancelled;
			}
		};

		match status {
			Ok(status) if status.success() => Outcome::Succeeded,
			Ok(status) => {
				let stderr = self.drain_stderr().await;
				Outcome::Failed(Failure::Exited { status, stderr })
			}
			Err(e) => {
				self.terminate().await;
				Outcome::Failed(Failure::Wait(e))
			}
		}
	}

	/// SIGKILL the whole process group and reap the child.
	async fn terminate(&mut self) {
		if let Some(pid) = self.pid {
			let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
		}
		let _ = self.child.kill().await;
		let _ = self.child.wait().await;
	}

	async fn drain_stderr(&mut self) -> String {
		if let Some(reader) = self.reader.take() {
			let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, reader).await;
		}
		self.stderr.tail(FAILURE_TAIL_SIZE).await
	}
}
