//! # scriptsrv-core
//!
//! Supervision engine for running a fixed set of commands as a background
//! service.
//!
//! Each command string is tokenized into a [`CommandSpec`], driven by its own
//! supervisor loop that restarts it after a fixed delay when it fails, and the
//! whole set is owned by a [`ServiceController`] that reacts to control events
//! from the OS service host.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use scriptsrv_core::{CommandSpec, ControlEvent, ServiceController, ControllerSettings};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let specs = vec![CommandSpec::parse("node server.js").unwrap()];
//! let controller = ServiceController::new(specs, ControllerSettings::new("/opt/app"));
//!
//! let (events_tx, events_rx) = mpsc::channel(8);
//! let (reports_tx, _reports_rx) = mpsc::channel(8);
//! let service = tokio::spawn(controller.run(events_rx, reports_tx));
//!
//! events_tx.send(ControlEvent::Stop).await.unwrap();
//! service.await.unwrap().unwrap();
//! # }
//! ```

pub mod cancel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod logs;
pub mod output;
pub mod runner;
pub mod supervisor;

pub use cancel::{CancelToken, CancelTrigger};
pub use command::CommandSpec;
pub use config::{ErrorLogConfig, ServiceConfig};
pub use controller::{ControlEvent, ControllerSettings, Monitor, ServiceController, ServiceState, StatusReport};
pub use error::{ConfigError, Error, Failure};
pub use output::StderrCapture;
pub use runner::{Outcome, RunningProcess};
pub use supervisor::{LoopHandle, LoopState, LoopStatus, Phase, SupervisorLoop, SupervisorSettings};
