//! Line splitting for subprocess output
//!
//! Git redraws progress lines with a bare carriage return, so both `\r` and
//! `\n` end a line here. Empty lines are dropped.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

pub struct LineReader<R> {
	inner: R,
	buf: Vec<u8>,
	eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
	pub fn new(inner: R) -> Self {
		LineReader { inner, buf: Vec::new(), eof: false }
	}

	/// Next non-empty line; `None` once the stream is exhausted
	pub async fn next_line(&mut self) -> io::Result<Option<String>> {
		loop {
			if let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
				let line: Vec<u8> = self.buf.drain(..=pos).collect();
				let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
				if text.is_empty() {
					continue;
				}
				return Ok(Some(text));
			}

			if self.eof {
				if self.buf.is_empty() {
					return Ok(None);
				}
				let rest = std::mem::take(&mut self.buf);
				return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
			}

			let mut chunk = [0u8; READ_CHUNK];
			let n = self.inner.read(&mut chunk).await?;
			if n == 0 {
				self.eof = true;
			} else {
				self.buf.extend_from_slice(&chunk[..n]);
			}
		}
	}
}


// vim: ts=4
