use std::io::Cursor;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use log::debug;

use crate::{error::Error, layer::ProtocolLayer, tcp::Transport};

/// A framed request/response channel over one [Transport].
///
/// Owns the scratch buffer every layer encodes into and decodes from, so a
/// connection serves exactly one transaction at a time; concurrent callers
/// need their own connection or external serialization.
pub struct Connection<T: Transport = TcpStream> {
	transport: T,
	buffer: Vec<u8>,
	capacity: usize,
	timeout: Duration,
}

impl<T: Transport> Connection<T> {
	/// `capacity` bounds both the encoded request and the buffered
	/// response; 600 bytes covers every non-fragmented request this client
	/// issues.
	pub fn new(transport: T, capacity: usize, timeout: Duration) -> Connection<T> {
		Connection {
			transport,
			buffer: Vec::with_capacity(capacity),
			capacity,
			timeout,
		}
	}

	/// Encodes `layer` into the buffer and drains it to the transport.
	pub fn write<L: ProtocolLayer>(&mut self, layer: &L) -> Result<(), Error> {
		let size = layer.request_size();
		if size > self.capacity {
			return Err(Error::Argument(format!(
				"request of {} bytes exceeds the {} byte buffer",
				size, self.capacity
			)));
		}
		self.buffer.clear();
		layer.encode(&mut self.buffer)?;
		debug_assert_eq!(self.buffer.len(), size);
		debug!("sending {} byte request", self.buffer.len());
		self.transport.send_bytes(&self.buffer).map_err(|e| {
			if Self::is_timeout(&e) {
				Error::Timeout(self.timeout)
			} else {
				Error::Io(e)
			}
		})
	}

	/// Receives until `layer.response_size` is satisfied, then decodes.
	///
	/// The response size is re-evaluated as bytes arrive: the encapsulation
	/// layer reports its bare header until the length field is present,
	/// then the full frame. Hitting the deadline first reports a timeout.
	pub fn read<L: ProtocolLayer>(&mut self, layer: &mut L) -> Result<(), Error> {
		self.buffer.clear();
		let deadline = Instant::now() + self.timeout;
		let mut chunk = [0u8; 256];
		loop {
			let needed = layer.response_size(&self.buffer);
			if needed > self.capacity {
				return Err(Error::Framing(format!(
					"response of {} bytes exceeds the {} byte buffer",
					needed, self.capacity
				)));
			}
			if self.buffer.len() >= needed {
				break;
			}
			let now = Instant::now();
			if now >= deadline {
				return Err(Error::Timeout(self.timeout));
			}
			self.transport.set_recv_deadline(Some(deadline - now))?;
			match self.transport.recv_bytes(&mut chunk) {
				Ok(0) => {
					return Err(Error::Framing("connection closed mid-frame".into()));
				}
				Ok(count) => self.buffer.extend_from_slice(&chunk[..count]),
				Err(e) if Self::is_timeout(&e) => {
					return Err(Error::Timeout(self.timeout));
				}
				Err(e) => return Err(Error::Io(e)),
			}
		}
		let frame = layer.response_size(&self.buffer);
		debug!("received {} byte response", frame);
		let mut r = Cursor::new(&self.buffer[..]);
		layer.decode(&mut r, frame)
	}

	/// One request/response transaction.
	pub fn execute<L: ProtocolLayer>(&mut self, layer: &mut L) -> Result<(), Error> {
		self.write(layer)?;
		self.read(layer)
	}

	pub fn close(&mut self) -> std::io::Result<()> {
		self.transport.close()
	}

	fn is_timeout(e: &std::io::Error) -> bool {
		matches!(
			e.kind(),
			std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{Command, Encapsulation};
	use crate::services::RegisterSession;
	use crate::tcp::mock::MockChannel;

	fn register_reply(session: u32) -> Vec<u8> {
		let mut v = Vec::new();
		v.extend_from_slice(&0x0065u16.to_le_bytes());
		v.extend_from_slice(&4u16.to_le_bytes());
		v.extend_from_slice(&session.to_le_bytes());
		v.extend_from_slice(&0u32.to_le_bytes());
		v.extend_from_slice(&[0u8; 8]);
		v.extend_from_slice(&0u32.to_le_bytes());
		v.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
		v
	}

	#[test]
	fn test_execute_reassembles_partial_reads() {
		// 3-byte chunks force the read loop to grow the frame across many
		// receives, including a split of the length field itself.
		let channel = MockChannel::new(vec![register_reply(0x0600_1DB7)], 3);
		let mut connection = Connection::new(channel, 600, Duration::from_millis(200));

		let mut request =
			Encapsulation::new(Command::RegisterSession, 0, [0; 8], RegisterSession);
		connection.execute(&mut request).unwrap();

		assert_eq!(request.session, 0x0600_1DB7);
	}

	#[test]
	fn test_silent_peer_times_out() {
		let channel = MockChannel::new(vec![], 16);
		let mut connection = Connection::new(channel, 600, Duration::from_millis(50));

		let mut request =
			Encapsulation::new(Command::RegisterSession, 0, [0; 8], RegisterSession);
		let err = connection.execute(&mut request).unwrap_err();
		assert!(matches!(err, Error::Timeout(_)));
	}

	#[test]
	fn test_truncated_frame_times_out() {
		// Only half the advertised frame ever arrives.
		let mut reply = register_reply(77);
		reply.truncate(20);
		let channel = MockChannel::new(vec![reply], 16);
		let mut connection = Connection::new(channel, 600, Duration::from_millis(50));

		let mut request =
			Encapsulation::new(Command::RegisterSession, 0, [0; 8], RegisterSession);
		let err = connection.execute(&mut request).unwrap_err();
		assert!(matches!(err, Error::Timeout(_)));
	}

	#[test]
	fn test_oversize_request_rejected() {
		let channel = MockChannel::new(vec![], 16);
		let mut connection = Connection::new(channel, 20, Duration::from_millis(50));

		let request = Encapsulation::new(Command::RegisterSession, 0, [0; 8], RegisterSession);
		let err = connection.write(&request).unwrap_err();
		assert!(matches!(err, Error::Argument(_)));
	}
}
