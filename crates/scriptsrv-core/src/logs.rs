use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ERROR_LOG_DIR: &str = "ErrorLogs";
pub const ERROR_LOG_PREFIX: &str = "ErrorLogs";

/// `<prefix> YY-MMDD.log` for today.
pub fn current_log_name(prefix: &str) -> String {
	format!("{} {}.log", prefix, now_ymd())
}

pub fn parse_log_date(filename: &str) -> Option<(u32, u32, u32)> {
	let parts: Vec<&str> = filename.splitn(2, ' ').collect();
	if parts.len() < 2 {
		return None;
	}
	let rest = parts[1];
	let date_str = rest
		.split(' ')
		.next()
		.unwrap_or(rest)
		.trim_end_matches(".log");

	let parts: Vec<&str> = date_str.splitn(2, '-').collect();
	if parts.len() != 2 {
		return None;
	}
	let year: u32 = parts[0].parse().ok()?;
	let mmdd = parts[1];
	if mmdd.len() != 4 || !mmdd.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	let month: u32 = mmdd[..2].parse().ok()?;
	let day: u32 = mmdd[2..].parse().ok()?;
	Some((year, month, day))
}

/// Delete dated `.log` files in `log_dir` older than `max_age_days`.
/// Zero keeps everything. Returns how many files were removed.
pub fn expire_logs(log_dir: &Path, max_age_days: u32) -> usize {
	if max_age_days == 0 {
		return 0;
	}
	let entries = match fs::read_dir(log_dir) {
		Ok(e) => e,
		Err(_) => return 0,
	};

	let cutoff_secs = now_secs().saturating_sub(max_age_days as u64 * 86400);
	let mut removed = 0;

	for entry in entries.flatten() {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("log") {
			continue;
		}
		let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
		if let Some((y, m, d)) = parse_log_date(&name) {
			if date_to_epoch(y, m, d) < cutoff_secs && fs::remove_file(&path).is_ok() {
				removed += 1;
			}
		}
	}
	removed
}

pub fn secs_to_datetime(secs: u64) -> (u32, u32, u32, u32, u32) {
	let days = (secs / 86400) as i64;
	let time_of_day = secs % 86400;
	let hour = (time_of_day / 3600) as u32;
	let minute = ((time_of_day % 3600) / 60) as u32;

	let z = days + 719468;
	let era = if z >= 0 { z } else { z - 146096 } / 146097;
	let doe = (z - era * 146097) as u32;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = doy - (153 * mp + 2) / 5 + 1;
	let m = if mp < 10 { mp + 3 } else { mp - 9 };
	let y = if m <= 2 { y + 1 } else { y };

	(y as u32, m, d, hour, minute)
}

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

fn now_ymd() -> String {
	let (year, month, day, _, _) = secs_to_datetime(now_secs());
	format!("{:02}-{:02}{:02}", year % 100, month, day)
}

fn date_to_epoch(year: u32, month: u32, day: u32) -> u64 {
	let full_year = if year < 100 { 2000 + year } else { year };
	let y = full_year as i64;
	let m = month as i64;
	let d = day as i64;

	let y_adj = if m <= 2 { y - 1 } else { y };
	let m_adj = if m <= 2 { m + 9 } else { m - 3 };

	let era = if y_adj >= 0 { y_adj } else { y_adj - 399 } / 400;
	let yoe = y_adj - era * 400;
	let doy = (153 * m_adj + 2) / 5 + d - 1;
	let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
	let days = era * 146097 + doe - 719468;
	(days * 86400) as u64
}

/// Append-only error log that moves to a new dated file when the day changes.
pub struct ErrorLogFile {
	dir: PathBuf,
	name: String,
	file: Option<File>,
}

impl ErrorLogFile {
	pub fn open(dir: &Path) -> io::Result<Self> {
		fs::create_dir_all(dir)?;
		let name = current_log_name(ERROR_LOG_PREFIX);
		let file = open_append(&dir.join(&name))?;
		Ok(Self {
			dir: dir.to_path_buf(),
			name,
			file: Some(file),
		})
	}

	pub fn path(&self) -> PathBuf {
		self.dir.join(&self.name)
	}

	fn roll(&mut self) {
		let name = current_log_name(ERROR_LOG_PREFIX);
		if name == self.name && self.file.is_some() {
			return;
		}
		self.file = open_append(&self.dir.join(&name)).ok();
		self.name = name;
	}
}

impl Write for ErrorLogFile {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.roll();
		match self.file.as_mut() {
			Some(file) => file.write(buf),
			None => Ok(buf.len()),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.file.as_mut() {
			Some(file) => file.flush(),
			None => Ok(()),
		}
	}
}

fn open_append(path: &Path) -> io::Result<File> {
	OpenOptions::new().create(true).append(true).open(path)
}
