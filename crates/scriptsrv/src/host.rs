use scriptsrv_core::{ControlEvent, Error, Monitor, ServiceController, ServiceState, StatusReport};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// Map a POSIX signal to the control event it stands for.
pub fn control_event(kind: SignalKind) -> Option<ControlEvent> {
	if kind == SignalKind::terminate() || kind == SignalKind::interrupt() {
		Some(ControlEvent::Stop)
	} else if kind == SignalKind::user_defined1() {
		Some(ControlEvent::Interrogate)
	} else {
		None
	}
}

fn listen(kind: SignalKind, name: &str) -> Result<Signal, Error> {
	signal(kind).map_err(|e| Error::Host(format!("cannot listen for {}: {}", name, e)))
}

/// Host the controller in the foreground: signals become control events and
/// status reports go to the log. Returns once the controller reports `Stopped`.
pub async fn run(controller: ServiceController) -> Result<(), Error> {
	let mut terminate = listen(SignalKind::terminate(), "SIGTERM")?;
	let mut interrupt = listen(SignalKind::interrupt(), "SIGINT")?;
	let mut user1 = listen(SignalKind::user_defined1(), "SIGUSR1")?;

	let (events_tx, events_rx) = mpsc::channel(8);
	let (reports_tx, reports_rx) = mpsc::channel(8);

	let forwarder = tokio::spawn(async move {
		loop {
			let kind = tokio::select! {
				_ = terminate.recv() => SignalKind::terminate(),
				_ = interrupt.recv() => SignalKind::interrupt(),
				_ = user1.recv() => SignalKind::user_defined1(),
			};
			let Some(event) = control_event(kind) else {
				continue;
			};
			tracing::debug!("signal {:?} -> {:?}", kind, event);
			if events_tx.send(event).await.is_err() {
				break;
			}
		}
	});

	let reporter = tokio::spawn(log_reports(reports_rx, controller.monitor()));

	let result = controller.run(events_rx, reports_tx).await;
	forwarder.abort();
	let _ = reporter.await;
	result
}

/// A repeated state is an interrogate echo; answer it with per-command status.
async fn log_reports(mut reports: mpsc::Receiver<StatusReport>, monitor: Monitor) {
	let mut last = None;
	while let Some(report) = reports.recv().await {
		if last == Some(report.state) {
			tracing::info!("status: {:?}", report.state);
			for status in monitor.status().await {
				tracing::info!(
					"  {}: {:?}/{:?}, attempts {}, pid {}",
					status.command,
					status.state,
					status.phase,
					status.attempts,
					status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
				);
			}
		}
		last = Some(report.state);
		if report.state == ServiceState::Stopped {
			break;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signal_mapping() {
		assert_eq!(control_event(SignalKind::terminate()), Some(ControlEvent::Stop));
		assert_eq!(control_event(SignalKind::interrupt()), Some(ControlEvent::Stop));
		assert_eq!(control_event(SignalKind::user_defined1()), Some(ControlEvent::Interrogate));
		assert_eq!(control_event(SignalKind::hangup()), None);
	}
}
