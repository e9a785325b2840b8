use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::cancel::{self, CancelTrigger};
use crate::command::CommandSpec;
use crate::error::{Error, TransitionError};
use crate::supervisor::{LoopHandle, LoopShared, LoopStatus, SupervisorLoop, SupervisorSettings};

/// How long a stop waits for loops to wind down before aborting them.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Instructions from the OS service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
	Interrogate,
	Stop,
	Shutdown,
	Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
	StartPending,
	Running,
	StopPending,
	Stopped,
}

/// What the controller reports back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
	pub state: ServiceState,
	pub accepts_stop: bool,
	pub accepts_shutdown: bool,
}

impl StatusReport {
	/// Stop and shutdown are only accepted while running.
	pub fn new(state: ServiceState) -> Self {
		let running = state == ServiceState::Running;
		Self {
			state,
			accepts_stop: running,
			accepts_shutdown: running,
		}
	}
}

/// Linear service lifecycle: StartPending -> Running -> StopPending -> Stopped.
pub struct Lifecycle {
	current: watch::Sender<StatusReport>,
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}

impl Lifecycle {
	pub fn new() -> Self {
		let (current, _) = watch::channel(StatusReport::new(ServiceState::StartPending));
		Self { current }
	}

	pub fn current(&self) -> StatusReport {
		*self.current.borrow()
	}

	pub fn can_transition(&self, to: ServiceState) -> bool {
		matches!(
			(self.current().state, to),
			(ServiceState::StartPending, ServiceState::Running)
				| (ServiceState::Running, ServiceState::StopPending)
				| (ServiceState::StopPending, ServiceState::Stopped)
		)
	}

	pub fn transition(&mut self, to: ServiceState) -> Result<StatusReport, TransitionError> {
		let from = self.current().state;
		if !self.can_transition(to) {
			return Err(TransitionError { from, to });
		}
		tracing::debug!("service state: {:?} -> {:?}", from, to);
		let report = StatusReport::new(to);
		self.current.send_replace(report);
		Ok(report)
	}

	fn subscribe(&self) -> watch::Receiver<StatusReport> {
		self.current.subscribe()
	}
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
	pub supervisor: SupervisorSettings,
	pub stop_timeout: Duration,
}

impl ControllerSettings {
	pub fn new(workdir: impl Into<PathBuf>) -> Self {
		Self {
			supervisor: SupervisorSettings::new(workdir),
			stop_timeout: DEFAULT_STOP_TIMEOUT,
		}
	}

	pub fn restart_delay(mut self, delay: Duration) -> Self {
		self.supervisor.restart_delay = delay;
		self
	}

	pub fn stop_timeout(mut self, timeout: Duration) -> Self {
		self.stop_timeout = timeout;
		self
	}
}

/// Read-only view of a controller's loops and lifecycle, usable while it runs.
#[derive(Clone)]
pub struct Monitor {
	loops: Arc<[Arc<LoopShared>]>,
	state: watch::Receiver<StatusReport>,
}

impl Monitor {
	pub async fn status(&self) -> Vec<LoopStatus> {
		let mut result = Vec::with_capacity(self.loops.len());
		for shared in self.loops.iter() {
			result.push(shared.status().await);
		}
		result
	}

	pub fn service_state(&self) -> ServiceState {
		self.state.borrow().state
	}

	pub fn len(&self) -> usize {
		self.loops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.loops.is_empty()
	}
}

/// Owns one supervisor loop per command and drives the service lifecycle from
/// control events.
pub struct ServiceController {
	specs: Vec<CommandSpec>,
	settings: ControllerSettings,
	shared: Arc<[Arc<LoopShared>]>,
	lifecycle: Lifecycle,
	stop: CancelTrigger,
}

impl ServiceController {
	pub fn new(specs: Vec<CommandSpec>, settings: ControllerSettings) -> Self {
		let shared = specs.iter().map(|spec| Arc::new(LoopShared::new(spec))).collect();
		let (stop, _) = cancel::scope();
		Self {
			specs,
			settings,
			shared,
			lifecycle: Lifecycle::new(),
			stop,
		}
	}

	pub fn monitor(&self) -> Monitor {
		Monitor {
			loops: Arc::clone(&self.shared),
			state: self.lifecycle.subscribe(),
		}
	}

	/// Serve until a stop or shutdown event, then cancel every loop and report
	/// `Stopped`. A closed event channel counts as shutdown.
	pub async fn run(
		mut self,
		mut events: mpsc::Receiver<ControlEvent>,
		reports: mpsc::Sender<StatusReport>,
	) -> Result<(), Error> {
		send_report(&reports, self.lifecycle.current()).await;

		let mut loops = self.start_loops();
		tracing::info!("supervising {} command(s)", loops.len());
		self.report(&reports, ServiceState::Running).await?;

		loop {
			match events.recv().await {
				Some(ControlEvent::Interrogate) => {
					send_report(&reports, self.lifecycle.current()).await;
				}
				Some(event @ (ControlEvent::Stop | ControlEvent::Shutdown)) => {
					tracing::info!("{:?} requested, cancelling all commands", event);
					break;
				}
				Some(ControlEvent::Other(code)) => {
					tracing::warn!("unexpected control request #{}", code);
				}
				None => {
					tracing::warn!("control channel closed, shutting down");
					break;
				}
			}
		}

		self.cancel_all(&loops);
		self.report(&reports, ServiceState::StopPending).await?;
		self.join_all(&mut loops).await;
		self.report(&reports, ServiceState::Stopped).await?;
		Ok(())
	}

	fn start_loops(&self) -> Vec<LoopHandle> {
		self.specs
			.iter()
			.zip(self.shared.iter())
			.map(|(spec, shared)| {
				SupervisorLoop::with_shared(
					spec.clone(),
					self.settings.supervisor.clone(),
					self.stop.token(),
					Arc::clone(shared),
				)
				.spawn()
			})
			.collect()
	}

	/// Raise the stop signal first so a loop between attempts sees it before
	/// installing a new scope, then fire every live scope.
	fn cancel_all(&self, loops: &[LoopHandle]) {
		self.stop.cancel();
		let live = loops.iter().filter(|handle| handle.cancel()).count();
		tracing::debug!("cancelled {} live attempt(s) of {}", live, loops.len());
	}

	async fn join_all(&self, loops: &mut [LoopHandle]) {
		let deadline = tokio::time::Instant::now() + self.settings.stop_timeout;
		for (spec, handle) in self.specs.iter().zip(loops.iter_mut()) {
			match tokio::time::timeout_at(deadline, handle.join()).await {
				Ok(Ok(state)) => tracing::debug!("[{}] finished: {:?}", spec.executable, state),
				Ok(Err(e)) => tracing::error!("[{}] supervisor task failed: {}", spec.executable, e),
				Err(_) => {
					tracing::warn!(
						"[{}] did not stop within {}s, aborting",
						spec.executable,
						self.settings.stop_timeout.as_secs()
					);
					handle.abort();
				}
			}
		}
	}

	async fn report(
		&mut self,
		reports: &mpsc::Sender<StatusReport>,
		state: ServiceState,
	) -> Result<(), Error> {
		let report = self.lifecycle.transition(state)?;
		tracing::info!("service {:?}", state);
		send_report(reports, report).await;
		Ok(())
	}
}

/// The host may stop listening at any point; that never stops the controller.
async fn send_report(reports: &mpsc::Sender<StatusReport>, report: StatusReport) {
	if reports.send(report).await.is_err() {
		tracing::warn!("status channel closed, dropping {:?} report", report.state);
	}
}
