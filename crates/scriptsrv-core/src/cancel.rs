use tokio::sync::watch;

/// Create a fresh single-use cancellation scope.
pub fn scope() -> (CancelTrigger, CancelToken) {
	let (tx, rx) = watch::channel(false);
	(CancelTrigger(tx), CancelToken(rx))
}

/// The firing half of a cancellation scope.
#[derive(Debug)]
pub struct CancelTrigger(watch::Sender<bool>);

impl CancelTrigger {
	pub fn cancel(&self) {
		self.0.send_replace(true);
	}

	pub fn is_cancelled(&self) -> bool {
		*self.0.borrow()
	}

	pub fn token(&self) -> CancelToken {
		CancelToken(self.0.subscribe())
	}
}

/// The observing half. Once fired it stays fired.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
	pub fn is_cancelled(&self) -> bool {
		*self.0.borrow()
	}

	/// Resolves once the scope is cancelled. Never resolves if the trigger is
	/// dropped without firing.
	pub async fn cancelled(&mut self) {
		let fired = self.0.wait_for(|fired| *fired).await.is_ok();
		if !fired {
			std::future::pending::<()>().await;
		}
	}
}
