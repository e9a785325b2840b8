use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};

use crate::cancel::{self, CancelToken, CancelTrigger};
use crate::command::CommandSpec;
use crate::error::Failure;
use crate::runner::{self, Outcome};

/// Fixed pause between a failed attempt and the next one.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
	/// Working directory for every attempt.
	pub workdir: PathBuf,
	pub restart_delay: Duration,
}

impl SupervisorSettings {
	pub fn new(workdir: impl Into<PathBuf>) -> Self {
		Self {
			workdir: workdir.into(),
			restart_delay: DEFAULT_RESTART_DELAY,
		}
	}

	pub fn restart_delay(mut self, delay: Duration) -> Self {
		self.restart_delay = delay;
		self
	}
}

/// Resolved state of a loop. Both stopped states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
	Running,
	StoppedBySuccess,
	StoppedByCancellation,
}

impl LoopState {
	pub fn is_stopped(&self) -> bool {
		!matches!(self, LoopState::Running)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Attempting,
	Sleeping,
	Stopped,
}

#[derive(Debug, Clone)]
pub struct LoopStatus {
	pub command: String,
	pub attempts: u32,
	pub pid: Option<u32>,
	pub phase: Phase,
	pub state: LoopState,
	pub last_failure: Option<String>,
}

/// State shared between a running loop and whoever holds its handle.
pub(crate) struct LoopShared {
	/// Trigger for the attempt in flight. Empty between attempts.
	scope: Mutex<Option<CancelTrigger>>,
	status: RwLock<LoopStatus>,
}

impl LoopShared {
	pub(crate) fn new(spec: &CommandSpec) -> Self {
		Self {
			scope: Mutex::new(None),
			status: RwLock::new(LoopStatus {
				command: spec.to_command_line(),
				attempts: 0,
				pid: None,
				phase: Phase::Attempting,
				state: LoopState::Running,
				last_failure: None,
			}),
		}
	}

	fn scope(&self) -> MutexGuard<'_, Option<CancelTrigger>> {
		self.scope.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Install a fresh scope for the next attempt, unless stop was requested.
	///
	/// `stop` is checked under the slot lock, so a stop issued before
	/// [`cancel_current`](Self::cancel_current) can never miss the new scope.
	fn begin_attempt(&self, stop: &CancelToken) -> Option<CancelToken> {
		let mut slot = self.scope();
		if stop.is_cancelled() {
			return None;
		}
		let (trigger, token) = cancel::scope();
		*slot = Some(trigger);
		Some(token)
	}

	fn end_attempt(&self) {
		self.scope().take();
	}

	/// Fire the live scope, if any. Returns whether one was live.
	pub(crate) fn cancel_current(&self) -> bool {
		match self.scope().as_ref() {
			Some(trigger) => {
				trigger.cancel();
				true
			}
			None => false,
		}
	}

	async fn update<R>(&self, f: impl FnOnce(&mut LoopStatus) -> R) -> R {
		let mut status = self.status.write().await;
		f(&mut status)
	}

	pub(crate) async fn status(&self) -> LoopStatus {
		self.status.read().await.clone()
	}
}

/// Retry loop for one command.
///
/// Attempts run until one succeeds or is cancelled. A failed attempt is
/// followed by a fixed delay; `stop` is checked during that delay and before
/// every new attempt.
pub struct SupervisorLoop {
	spec: CommandSpec,
	settings: SupervisorSettings,
	stop: CancelToken,
	shared: Arc<LoopShared>,
}

impl SupervisorLoop {
	pub fn new(spec: CommandSpec, settings: SupervisorSettings, stop: CancelToken) -> Self {
		let shared = Arc::new(LoopShared::new(&spec));
		Self::with_shared(spec, settings, stop, shared)
	}

	pub(crate) fn with_shared(
		spec: CommandSpec,
		settings: SupervisorSettings,
		stop: CancelToken,
		shared: Arc<LoopShared>,
	) -> Self {
		Self {
			spec,
			settings,
			stop,
			shared,
		}
	}

	/// Run on its own task.
	pub fn spawn(self) -> LoopHandle {
		let shared = Arc::clone(&self.shared);
		let task = tokio::spawn(self.run());
		LoopHandle { shared, task }
	}

	pub async fn run(self) -> LoopState {
		let label = self.spec.executable.clone();
		let mut stop = self.stop.clone();

		loop {
			let Some(token) = self.shared.begin_attempt(&stop) else {
				tracing::info!("[{}] stop requested, not starting", label);
				return self.finish(LoopState::StoppedByCancellation).await;
			};

			let attempt = self
				.shared
				.update(|s| {
					s.attempts += 1;
					s.phase = Phase::Attempting;
					s.pid = None;
					s.attempts
				})
				.await;
			tracing::info!("[{}] starting (attempt {}): {}", label, attempt, self.spec);

			let outcome = match runner::start(&self.spec, &self.settings.workdir) {
				Ok(process) => {
					let pid = process.pid();
					self.shared.update(|s| s.pid = pid).await;
					process.wait(token).await
				}
				Err(failure) => Outcome::Failed(failure),
			};
			self.shared.end_attempt();

			match outcome {
				Outcome::Succeeded => {
					tracing::info!("[{}] exited cleanly, not restarting", label);
					return self.finish(LoopState::StoppedBySuccess).await;
				}
				Outcome::Cancelled => {
					tracing::info!("[{}] cancelled", label);
					return self.finish(LoopState::StoppedByCancellation).await;
				}
				Outcome::Failed(failure) => {
					log_failure(&label, &failure);
					let reason = failure.to_string();
					self.shared
						.update(|s| {
							s.pid = None;
							s.phase = Phase::Sleeping;
							s.last_failure = Some(reason);
						})
						.await;

					tracing::info!(
						"[{}] retrying in {}s",
						label,
						self.settings.restart_delay.as_secs_f32()
					);
					tokio::select! {
						_ = tokio::time::sleep(self.settings.restart_delay) => {}
						_ = stop.cancelled() => {}
					}
					if stop.is_cancelled() {
						tracing::info!("[{}] stop requested during retry delay", label);
						return self.finish(LoopState::StoppedByCancellation).await;
					}
				}
			}
		}
	}

	async fn finish(&self, state: LoopState) -> LoopState {
		self.shared
			.update(|s| {
				s.pid = None;
				s.phase = Phase::Stopped;
				s.state = state;
			})
			.await;
		state
	}
}

fn log_failure(label: &str, failure: &Failure) {
	match failure.stderr() {
		Some(stderr) => tracing::error!("[{}] {}, stderr:\n{}", label, failure, stderr),
		None => tracing::error!("[{}] {}", label, failure),
	}
}

/// Owner's side of a spawned loop.
pub struct LoopHandle {
	shared: Arc<LoopShared>,
	task: JoinHandle<LoopState>,
}

impl LoopHandle {
	/// Cancel the attempt currently in flight. Returns false if the loop was
	/// between attempts.
	pub fn cancel(&self) -> bool {
		self.shared.cancel_current()
	}

	pub async fn status(&self) -> LoopStatus {
		self.shared.status().await
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Force the task down. Dropping an in-flight child kills it.
	pub fn abort(&self) {
		self.task.abort();
	}

	/// Wait for the loop to reach a terminal state. Call at most once.
	pub async fn join(&mut self) -> Result<LoopState, JoinError> {
		(&mut self.task).await
	}
}
