mod host;
mod logging;
mod paths;
mod service;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use scriptsrv_core::{config, CommandSpec, Error, ServiceConfig, ServiceController};

use service::{ServiceManager, UnitFile};

#[derive(Debug, Parser)]
#[command(name = "scriptsrv", version, about = "Run commands as a supervised background service")]
struct Cli {
	/// Install the service with the systemd service manager
	#[arg(long, group = "action")]
	install: bool,
	/// Remove the installed service
	#[arg(long, group = "action")]
	uninstall: bool,
	/// Start the installed service
	#[arg(long, group = "action")]
	start: bool,
	/// Stop the installed service
	#[arg(long, group = "action")]
	stop: bool,

	/// Name of the service
	#[arg(long)]
	name: Option<String>,
	/// What the service does
	#[arg(long)]
	description: Option<String>,
	/// A command to supervise, e.g. "node server.js" (repeatable; use |...| to keep spaces)
	#[arg(long = "command", value_name = "COMMAND")]
	commands: Vec<String>,
	/// Config file (default: scriptsrv.toml next to the binary)
	#[arg(long)]
	config: Option<PathBuf>,
	/// Where systemd unit files are written
	#[arg(long, default_value = service::DEFAULT_UNIT_DIR)]
	unit_dir: PathBuf,
}

impl Cli {
	/// The config file merged with flags. Flags win; `--command` replaces the
	/// file's list.
	fn load_config(&self, install_dir: &Path) -> Result<ServiceConfig, Error> {
		let mut config = match &self.config {
			Some(path) => config::load(path)?,
			None => config::load_or_default(&paths::default_config_path(install_dir))?,
		};
		if let Some(name) = &self.name {
			config.name = name.clone();
		}
		if let Some(description) = &self.description {
			config.description = description.clone();
		}
		if !self.commands.is_empty() {
			config.commands = self.commands.clone();
		}
		Ok(config)
	}

	/// ExecStart for `--install`. The unit runs from the install dir, so a
	/// relative `--config` is pinned to `cwd`.
	fn exec_args(&self, exe: &Path, config: &ServiceConfig, cwd: &Path) -> Vec<String> {
		let config_path = self.config.as_deref().map(|path| paths::resolve_against(path, cwd));
		service::exec_args(exe, &config.name, &config.commands, config_path.as_deref())
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let install_dir = match paths::install_dir() {
		Ok(dir) => dir,
		Err(e) => {
			eprintln!("{} cannot resolve install directory: {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	let config = match cli.load_config(&install_dir) {
		Ok(config) => config,
		Err(e) => return config_error(&e),
	};

	let manager = ServiceManager::new(&cli.unit_dir);

	if cli.uninstall {
		return finish(manager.uninstall(&config.name).map(|_| {
			eprintln!("{}: uninstalled", config.name.bold());
		}));
	}
	if cli.start {
		return finish(manager.start(&config.name).map(|_| {
			eprintln!("{}: started", config.name.bold());
		}));
	}
	if cli.stop {
		return finish(manager.stop(&config.name).map(|_| {
			eprintln!("{}: stopped", config.name.bold());
		}));
	}

	// every remaining path needs a valid command set before going further
	let specs = match config.command_specs() {
		Ok(specs) => specs,
		Err(e) => return config_error(&e.into()),
	};

	if cli.install {
		return finish(install(&cli, &config, &install_dir, &manager));
	}

	run(config, specs, &install_dir)
}

fn install(cli: &Cli, config: &ServiceConfig, install_dir: &Path, manager: &ServiceManager) -> Result<(), Error> {
	let exe = std::env::current_exe()?;
	let cwd = std::env::current_dir()?;
	let unit = UnitFile {
		name: config.name.clone(),
		description: config.description.clone(),
		exec: cli.exec_args(&exe, config, &cwd),
		working_dir: install_dir.to_path_buf(),
	};
	let path = manager.install(&unit)?;
	eprintln!("{}: installed {}", config.name.bold(), path.display().dimmed());
	for command in &config.commands {
		eprintln!("  {} {}", "command".cyan(), command);
	}
	Ok(())
}

fn run(config: ServiceConfig, specs: Vec<CommandSpec>, install_dir: &Path) -> ExitCode {
	let base = paths::log_base_dir(install_dir);
	if let Some(path) = logging::init(&config.error_log, &base) {
		tracing::debug!("error log: {}", path.display());
	}

	for spec in &specs {
		tracing::info!("command: {}", spec);
	}

	let controller = ServiceController::new(specs, config.controller_settings(install_dir));

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			tracing::error!("{} service failed: {}", config.name, Error::Host(e.to_string()));
			return ExitCode::FAILURE;
		}
	};

	match runtime.block_on(host::run(controller)) {
		Ok(()) => {
			tracing::info!("{} service stopped", config.name);
			ExitCode::SUCCESS
		}
		Err(e) => {
			tracing::error!("{} service failed: {}", config.name, e);
			ExitCode::FAILURE
		}
	}
}

fn config_error(e: &Error) -> ExitCode {
	eprintln!("{} {}", "config error:".red().bold(), e);
	ExitCode::from(2)
}

fn finish(result: Result<(), Error>) -> ExitCode {
	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}
