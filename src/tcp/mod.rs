//! The network-facing half of the client: the byte transport, the framed
//! connection, the session facade and the periodic scan helper.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

pub mod connection;
pub mod scan;
pub mod session;

pub use connection::Connection;
pub use scan::{RefreshableTag, ScanList};
pub use session::{ConnectOptions, DeviceInfo, EtherNetIP, DEFAULT_PORT};

/// The byte channel a connection drives: send all, receive some, close.
///
/// Implemented for [TcpStream]; anything else (a recorded script, a tunnel)
/// can stand in as long as it honors the receive deadline.
pub trait Transport {
	/// Sends the whole buffer.
	fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()>;

	/// Receives at least one byte into `buf`, returning the count. A return
	/// of 0 means the peer closed the channel.
	fn recv_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

	/// Bounds the next receive; an expired deadline surfaces as a
	/// `WouldBlock` or `TimedOut` i/o error.
	fn set_recv_deadline(&mut self, timeout: Option<Duration>) -> std::io::Result<()>;

	/// Closes the channel. Pending and subsequent i/o fails.
	fn close(&mut self) -> std::io::Result<()>;
}

impl Transport for TcpStream {
	fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
		self.write_all(bytes)
	}

	fn recv_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		self.read(buf)
	}

	fn set_recv_deadline(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
		self.set_read_timeout(timeout)
	}

	fn close(&mut self) -> std::io::Result<()> {
		self.shutdown(Shutdown::Both)
	}
}

#[cfg(test)]
pub(crate) mod mock {
	use super::Transport;
	use std::cmp::min;
	use std::io;
	use std::time::Duration;

	/// Scripted channel: hands out one canned response frame per request in
	/// `chunk`-byte slices and records everything sent. A receive never
	/// crosses a frame boundary, and an exhausted script acts like a silent
	/// peer (every receive times out).
	pub struct MockChannel {
		pub sent: Vec<Vec<u8>>,
		responses: Vec<Vec<u8>>,
		message: usize,
		cursor: usize,
		chunk: usize,
		pub closed: bool,
	}

	impl MockChannel {
		pub fn new(responses: Vec<Vec<u8>>, chunk: usize) -> MockChannel {
			MockChannel {
				sent: Vec::new(),
				responses,
				message: 0,
				cursor: 0,
				chunk,
				closed: false,
			}
		}
	}

	impl Transport for MockChannel {
		fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
			self.sent.push(bytes.to_vec());
			Ok(())
		}

		fn recv_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			while self.message < self.responses.len()
				&& self.cursor == self.responses[self.message].len()
			{
				self.message += 1;
				self.cursor = 0;
			}
			if self.message == self.responses.len() {
				return Err(io::ErrorKind::WouldBlock.into());
			}
			let data = &self.responses[self.message];
			let count = min(min(self.chunk, buf.len()), data.len() - self.cursor);
			buf[..count].copy_from_slice(&data[self.cursor..self.cursor + count]);
			self.cursor += count;
			Ok(count)
		}

		fn set_recv_deadline(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
			Ok(())
		}

		fn close(&mut self) -> io::Result<()> {
			self.closed = true;
			Ok(())
		}
	}
}
