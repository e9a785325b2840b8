use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

const RING_BUFFER_SIZE: usize = 64 * 1024;

/// Bytes of stderr attached to a failure report.
pub const FAILURE_TAIL_SIZE: usize = 4 * 1024;

/// In-memory ring of a child's most recent stderr output.
#[derive(Clone)]
pub struct StderrCapture {
	ring: Arc<Mutex<VecDeque<u8>>>,
	capacity: usize,
}

impl Default for StderrCapture {
	fn default() -> Self {
		Self::new()
	}
}

impl StderrCapture {
	pub fn new() -> Self {
		Self::with_capacity(RING_BUFFER_SIZE)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
			capacity,
		}
	}

	pub async fn write(&self, data: &[u8]) {
		let mut ring = self.ring.lock().await;
		for &byte in data {
			if ring.len() >= self.capacity {
				ring.pop_front();
			}
			ring.push_back(byte);
		}
	}

	pub async fn snapshot(&self) -> Vec<u8> {
		let ring = self.ring.lock().await;
		ring.iter().copied().collect()
	}

	/// The last `max` bytes as trimmed, lossily decoded text.
	pub async fn tail(&self, max: usize) -> String {
		let ring = self.ring.lock().await;
		let skip = ring.len().saturating_sub(max);
		let bytes: Vec<u8> = ring.iter().skip(skip).copied().collect();
		String::from_utf8_lossy(&bytes).trim().to_string()
	}

	/// Drain `reader` into the ring until EOF or a read error.
	pub async fn pipe<R: AsyncRead + Unpin>(self, mut reader: R) {
		let mut buf = [0u8; 4096];
		loop {
			match reader.read(&mut buf).await {
				Ok(0) => break,
				Ok(n) => self.write(&buf[..n]).await,
				Err(_) => break,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn ring_keeps_most_recent_bytes() {
		let capture = StderrCapture::with_capacity(8);
		capture.write(b"0123456789").await;
		assert_eq!(capture.snapshot().await, b"23456789");
	}

	#[tokio::test]
	async fn tail_trims_and_limits() {
		let capture = StderrCapture::new();
		capture.write(b"first line\nsecond line\n").await;
		assert_eq!(capture.tail(12).await, "second line");
		assert_eq!(capture.tail(1024).await, "first line\nsecond line");
	}

	#[tokio::test]
	async fn pipe_reads_until_eof() {
		let capture = StderrCapture::new();
		let data: &[u8] = b"boom\n";
		capture.clone().pipe(data).await;
		assert_eq!(capture.tail(64).await, "boom");
	}
}
