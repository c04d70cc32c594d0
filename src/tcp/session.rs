use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, warn};

use crate::{
	data::CipData,
	error::Error,
	layer::ProtocolLayer,
	path::CipPath,
	protocol::{Command, Encapsulation, MessageRouter, SendRRData, StatusPolicy, UnconnectedSend},
	services::{
		IntAttribute, ListServices, MultiRequest, ReadData, RegisterSession, ShortAttribute,
		StringAttribute, WriteData, GET_ATTRIBUTE_SINGLE, MULTI_REQUEST, READ_DATA, WRITE_DATA,
	},
	tcp::{Connection, Transport},
};

/// EtherNet/IP explicit messaging uses TCP port 0xAF12.
pub const DEFAULT_PORT: u16 = 0xAF12;

/// Options used to open a session.
///
/// See also [EtherNetIP::connect_with].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
	/// TCP port of the device, almost always [DEFAULT_PORT].
	pub port: u16,
	/// Deadline applied to every send and receive.
	pub timeout: Duration,
	/// Size of the request/response buffer. The default covers every
	/// non-fragmented request this client issues; a request that does not
	/// fit fails with [Error::Argument] before anything is sent.
	pub buffer_size: usize,
}

impl std::default::Default for ConnectOptions {
	fn default() -> ConnectOptions {
		ConnectOptions {
			port: DEFAULT_PORT,
			timeout: Duration::from_secs(2),
			buffer_size: 600,
		}
	}
}

/// Identity of the controller a session is talking to, read during connect.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
	pub vendor: u16,
	pub device_type: u16,
	pub revision: u16,
	pub serial: u32,
	pub name: String,
}

/// A registered EtherNet/IP session against one controller.
///
/// Opening a session connects, verifies the device speaks EtherNet/IP,
/// registers a session handle and reads the controller's identity; the
/// session then exposes symbolic tag reads and writes:
///
/// ```no_run
/// use etherip::EtherNetIP;
///
/// let mut plc = EtherNetIP::connect("192.168.1.10", 0)?;
/// let value = plc.read_tag("Counter")?;
/// plc.write_tag("Setpoint", 3.5f32.into())?;
/// plc.close();
/// # Ok::<(), etherip::Error>(())
/// ```
///
/// A session owns its connection and buffer and serves one transaction at a
/// time; share it across threads only behind external serialization.
pub struct EtherNetIP<T: Transport = TcpStream> {
	connection: Option<Connection<T>>,
	session: u32,
	slot: u8,
	context_counter: u64,
	info: Option<DeviceInfo>,
}

impl EtherNetIP {
	/// Connects to `address` on the default port with default options.
	/// `slot` is the chassis slot holding the controller CPU.
	pub fn connect(address: &str, slot: u8) -> Result<EtherNetIP, Error> {
		EtherNetIP::connect_with(address, slot, &ConnectOptions::default())
	}

	pub fn connect_with(
		address: &str,
		slot: u8,
		options: &ConnectOptions,
	) -> Result<EtherNetIP, Error> {
		let addr = (address, options.port)
			.to_socket_addrs()?
			.next()
			.ok_or_else(|| Error::Argument(format!("cannot resolve '{}'", address)))?;
		let stream = TcpStream::connect_timeout(&addr, options.timeout)?;
		stream.set_nodelay(true)?;
		stream.set_write_timeout(Some(options.timeout))?;
		debug!("connected to {}, slot {}", addr, slot);
		EtherNetIP::with_transport(stream, slot, options)
	}
}

impl<T: Transport> EtherNetIP<T> {
	/// Runs the session handshake over an already-open transport.
	pub fn with_transport(
		transport: T,
		slot: u8,
		options: &ConnectOptions,
	) -> Result<EtherNetIP<T>, Error> {
		let mut plc = EtherNetIP {
			connection: Some(Connection::new(
				transport,
				options.buffer_size,
				options.timeout,
			)),
			session: 0,
			slot,
			context_counter: 0,
			info: None,
		};
		plc.handshake()?;
		Ok(plc)
	}

	fn handshake(&mut self) -> Result<(), Error> {
		let services = self.list_services()?;
		if !services.supports_ethernet_ip() {
			return Err(Error::UnsupportedService(match services.services.first() {
				Some(item) => format!("first advertised service is '{}'", item.name),
				None => "no services advertised".into(),
			}));
		}
		self.register_session()?;
		let info = DeviceInfo {
			vendor: self.short_attribute(1)?,
			device_type: self.short_attribute(2)?,
			revision: self.short_attribute(4)?,
			serial: self.int_attribute(6)?,
			name: self.string_attribute(7)?,
		};
		debug!(
			"session 0x{:08X} open: '{}' (vendor {}, serial 0x{:08X})",
			self.session, info.name, info.vendor, info.serial
		);
		self.info = Some(info);
		Ok(())
	}

	/// Identity of the connected controller.
	pub fn device_info(&self) -> Result<&DeviceInfo, Error> {
		self.info.as_ref().ok_or(Error::NotConnected)
	}

	/// The session handle allocated by the controller, 0 when closed.
	pub fn session_handle(&self) -> u32 {
		self.session
	}

	/// Reads one element of `tag`.
	pub fn read_tag(&mut self, tag: &str) -> Result<CipData, Error> {
		self.read_tag_with(tag, 1, None)
	}

	/// Reads `elements` consecutive elements of an array tag.
	pub fn read_tag_elements(&mut self, tag: &str, elements: u16) -> Result<CipData, Error> {
		self.read_tag_with(tag, elements, None)
	}

	/// Reads a tag with an explicit sender context for correlation.
	pub fn read_tag_with(
		&mut self,
		tag: &str,
		elements: u16,
		context: Option<[u8; 8]>,
	) -> Result<CipData, Error> {
		let path = CipPath::symbol(tag)?;
		let response =
			self.execute_cip(READ_DATA, path, ReadData::new(elements), context)?;
		let data = response
			.body
			.data
			.ok_or_else(|| Error::Framing("read response carried no data".into()))?;
		debug!("read '{}' = {}", tag, data);
		Ok(data)
	}

	/// Writes `value` to `tag`. The value's CIP type must match the tag's
	/// stored type or the controller rejects the write.
	pub fn write_tag(&mut self, tag: &str, value: CipData) -> Result<(), Error> {
		self.write_tag_with(tag, value, None)
	}

	pub fn write_tag_with(
		&mut self,
		tag: &str,
		value: CipData,
		context: Option<[u8; 8]>,
	) -> Result<(), Error> {
		let path = CipPath::symbol(tag)?;
		debug!("write '{}' = {}", tag, value);
		self.execute_cip(WRITE_DATA, path, WriteData::new(value), context)?;
		Ok(())
	}

	/// Reads several tags in one transaction, one element each.
	///
	/// Results come back in request order; a tag the controller rejects
	/// yields an `Err` in its slot without failing the batch.
	pub fn read_many(&mut self, tags: &[&str]) -> Result<Vec<Result<CipData, Error>>, Error> {
		let pairs: Vec<(&str, u16)> = tags.iter().map(|&tag| (tag, 1)).collect();
		self.read_many_elements(&pairs)
	}

	/// Reads several array tags in one transaction with per-tag element
	/// counts.
	pub fn read_many_elements(
		&mut self,
		tags: &[(&str, u16)],
	) -> Result<Vec<Result<CipData, Error>>, Error> {
		if tags.is_empty() {
			return Ok(Vec::new());
		}
		let mut requests = Vec::with_capacity(tags.len());
		for (tag, elements) in tags {
			requests.push(MessageRouter::with_policy(
				READ_DATA,
				CipPath::symbol(tag)?,
				ReadData::new(*elements),
				StatusPolicy::Record,
			));
		}
		let response = self.execute_multi(requests)?;
		Ok(response
			.into_iter()
			.map(|sub| match sub.status_error() {
				Some(e) => Err(e),
				None => sub
					.body
					.data
					.ok_or_else(|| Error::Framing("read response carried no data".into())),
			})
			.collect())
	}

	/// Writes several tags in one transaction. `tags` and `values` must
	/// have equal lengths; results come back in request order.
	pub fn write_many(
		&mut self,
		tags: &[&str],
		values: &[CipData],
	) -> Result<Vec<Result<(), Error>>, Error> {
		if tags.len() != values.len() {
			return Err(Error::Argument(format!(
				"{} tags but {} values",
				tags.len(),
				values.len()
			)));
		}
		if tags.is_empty() {
			return Ok(Vec::new());
		}
		let mut requests = Vec::with_capacity(tags.len());
		for (tag, value) in tags.iter().zip(values) {
			requests.push(MessageRouter::with_policy(
				WRITE_DATA,
				CipPath::symbol(tag)?,
				WriteData::new(value.clone()),
				StatusPolicy::Record,
			));
		}
		let response = self.execute_multi(requests)?;
		Ok(response
			.into_iter()
			.map(|sub| match sub.status_error() {
				Some(e) => Err(e),
				None => Ok(()),
			})
			.collect())
	}

	/// Unregisters the session and closes the transport. Idempotent.
	///
	/// The controller may drop the socket as soon as the unregister request
	/// is acknowledged, so nothing is read back; a failed unregister is
	/// logged and the transport is closed regardless.
	pub fn close(&mut self) {
		if let Some(mut connection) = self.connection.take() {
			if self.session != 0 {
				debug!("unregistering session 0x{:08X}", self.session);
				let request = Encapsulation::new(
					Command::UnregisterSession,
					self.session,
					self.next_context(),
					(),
				);
				if let Err(e) = connection.write(&request) {
					warn!("unregister of session 0x{:08X} failed: {}", self.session, e);
				}
				self.session = 0;
			}
			let _ = connection.close();
		}
	}

	fn list_services(&mut self) -> Result<ListServices, Error> {
		let mut request = Encapsulation::new(
			Command::ListServices,
			self.session,
			self.next_context(),
			ListServices::default(),
		);
		self.connection()?.execute(&mut request)?;
		Ok(request.body)
	}

	fn register_session(&mut self) -> Result<(), Error> {
		let mut request = Encapsulation::new(
			Command::RegisterSession,
			0,
			self.next_context(),
			RegisterSession,
		);
		self.connection()?.execute(&mut request)?;
		if request.session == 0 {
			return Err(Error::Framing(
				"controller allocated a zero session handle".into(),
			));
		}
		self.session = request.session;
		Ok(())
	}

	fn short_attribute(&mut self, attr: u8) -> Result<u16, Error> {
		let path = CipPath::identity().attr(attr);
		let response =
			self.execute_cip(GET_ATTRIBUTE_SINGLE, path, ShortAttribute::default(), None)?;
		Ok(response.body.value)
	}

	fn int_attribute(&mut self, attr: u8) -> Result<u32, Error> {
		let path = CipPath::identity().attr(attr);
		let response =
			self.execute_cip(GET_ATTRIBUTE_SINGLE, path, IntAttribute::default(), None)?;
		Ok(response.body.value)
	}

	fn string_attribute(&mut self, attr: u8) -> Result<String, Error> {
		let path = CipPath::identity().attr(attr);
		let response =
			self.execute_cip(GET_ATTRIBUTE_SINGLE, path, StringAttribute::default(), None)?;
		Ok(response.body.value)
	}

	/// Builds and executes the full stack around one CIP request.
	fn execute_cip<B: ProtocolLayer>(
		&mut self,
		service: u8,
		path: CipPath,
		body: B,
		context: Option<[u8; 8]>,
	) -> Result<MessageRouter<B>, Error> {
		self.execute_router(MessageRouter::new(service, path, body), context)
	}

	fn execute_multi<B: ProtocolLayer>(
		&mut self,
		requests: Vec<MessageRouter<B>>,
	) -> Result<Vec<MessageRouter<B>>, Error> {
		let outer = MessageRouter::with_policy(
			MULTI_REQUEST,
			CipPath::message_router(),
			MultiRequest::new(requests),
			StatusPolicy::TolerateEmbedded,
		);
		Ok(self.execute_router(outer, None)?.body.requests)
	}

	fn execute_router<B: ProtocolLayer>(
		&mut self,
		router: MessageRouter<B>,
		context: Option<[u8; 8]>,
	) -> Result<MessageRouter<B>, Error> {
		if self.session == 0 {
			return Err(Error::NotConnected);
		}
		let context = match context {
			Some(context) => context,
			None => self.next_context(),
		};
		let stack = SendRRData::new(UnconnectedSend::new(self.slot, router));
		let mut request = Encapsulation::new(Command::SendRRData, self.session, context, stack);
		self.connection()?.execute(&mut request)?;
		Ok(request.body.body.body)
	}

	fn connection(&mut self) -> Result<&mut Connection<T>, Error> {
		self.connection.as_mut().ok_or(Error::NotConnected)
	}

	fn next_context(&mut self) -> [u8; 8] {
		self.context_counter = self.context_counter.wrapping_add(1);
		self.context_counter.to_le_bytes()
	}
}

impl<T: Transport> Drop for EtherNetIP<T> {
	fn drop(&mut self) {
		self.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tcp::mock::MockChannel;

	const SESSION: u32 = 0x0A0B_0C0D;

	fn encap(command: u16, session: u32, context: u64, body: &[u8]) -> Vec<u8> {
		let mut v = Vec::new();
		v.extend_from_slice(&command.to_le_bytes());
		v.extend_from_slice(&(body.len() as u16).to_le_bytes());
		v.extend_from_slice(&session.to_le_bytes());
		v.extend_from_slice(&0u32.to_le_bytes());
		v.extend_from_slice(&context.to_le_bytes());
		v.extend_from_slice(&0u32.to_le_bytes());
		v.extend_from_slice(body);
		v
	}

	fn router_reply(service: u8, status: u8, extended: &[u16], body: &[u8]) -> Vec<u8> {
		let mut v = vec![service | 0x80, 0x00, status, extended.len() as u8];
		for word in extended {
			v.extend_from_slice(&word.to_le_bytes());
		}
		v.extend_from_slice(body);
		v
	}

	fn cip_reply(context: u64, service: u8, status: u8, body: &[u8]) -> Vec<u8> {
		let router = router_reply(service, status, &[], body);
		let mut cpf = Vec::new();
		cpf.extend_from_slice(&0u32.to_le_bytes());
		cpf.extend_from_slice(&0u16.to_le_bytes());
		cpf.extend_from_slice(&2u16.to_le_bytes());
		cpf.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
		cpf.extend_from_slice(&0x00B2u16.to_le_bytes());
		cpf.extend_from_slice(&(router.len() as u16).to_le_bytes());
		cpf.extend_from_slice(&router);
		encap(0x006F, SESSION, context, &cpf)
	}

	fn list_services_reply(context: u64) -> Vec<u8> {
		let mut body = Vec::new();
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0x0100u16.to_le_bytes());
		body.extend_from_slice(&20u16.to_le_bytes());
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0x0120u16.to_le_bytes());
		body.extend_from_slice(b"Communications\0\0");
		encap(0x0004, 0, context, &body)
	}

	// The handshake issues ListServices, RegisterSession and the five
	// Identity attribute reads, with contexts 1..=7.
	fn handshake_script() -> Vec<Vec<u8>> {
		vec![
			list_services_reply(1),
			encap(0x0065, SESSION, 2, &[0x01, 0x00, 0x00, 0x00]),
			cip_reply(3, 0x0E, 0, &[0x01, 0x00]),
			cip_reply(4, 0x0E, 0, &[0x0E, 0x00]),
			cip_reply(5, 0x0E, 0, &[0x14, 0x01]),
			cip_reply(6, 0x0E, 0, &[0x78, 0x56, 0x34, 0x12]),
			cip_reply(7, 0x0E, 0, b"\x091769-L32E"),
		]
	}

	fn connected(mut script: Vec<Vec<u8>>) -> EtherNetIP<MockChannel> {
		let mut responses = handshake_script();
		responses.append(&mut script);
		let channel = MockChannel::new(responses, 64);
		EtherNetIP::with_transport(
			channel,
			0,
			&ConnectOptions {
				timeout: Duration::from_millis(100),
				..ConnectOptions::default()
			},
		)
		.unwrap()
	}

	#[test]
	fn test_handshake_populates_device_info() {
		let plc = connected(vec![]);
		assert_eq!(plc.session_handle(), SESSION);
		assert_eq!(
			plc.device_info().unwrap(),
			&DeviceInfo {
				vendor: 1,
				device_type: 0x000E,
				revision: 0x0114,
				serial: 0x1234_5678,
				name: "1769-L32E".into(),
			}
		);
	}

	#[test]
	fn test_non_ethernet_ip_device_rejected() {
		let mut body = Vec::new();
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0x0100u16.to_le_bytes());
		body.extend_from_slice(&20u16.to_le_bytes());
		body.extend_from_slice(&1u16.to_le_bytes());
		body.extend_from_slice(&0u16.to_le_bytes());
		body.extend_from_slice(b"Modbus gateway\0\0");
		let channel = MockChannel::new(vec![encap(0x0004, 0, 1, &body)], 64);

		let err = EtherNetIP::with_transport(channel, 0, &ConnectOptions::default())
			.err()
			.unwrap();
		assert!(matches!(err, Error::UnsupportedService(_)));
	}

	#[test]
	fn test_read_tag() {
		let mut plc = connected(vec![cip_reply(
			8,
			0x4C,
			0,
			&[0xC4, 0x00, 0x2A, 0x00, 0x00, 0x00],
		)]);
		let value = plc.read_tag("Counter").unwrap();
		assert_eq!(value, CipData::Dint(vec![42]));
	}

	#[test]
	fn test_write_tag() {
		let mut plc = connected(vec![cip_reply(8, 0x4D, 0, &[])]);
		plc.write_tag("Setpoint", 3.5f32.into()).unwrap();
	}

	#[test]
	fn test_write_type_mismatch() {
		let router = router_reply(0x4D, 0xFF, &[0x2107], &[]);
		let mut cpf = Vec::new();
		cpf.extend_from_slice(&0u32.to_le_bytes());
		cpf.extend_from_slice(&0u16.to_le_bytes());
		cpf.extend_from_slice(&2u16.to_le_bytes());
		cpf.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
		cpf.extend_from_slice(&0x00B2u16.to_le_bytes());
		cpf.extend_from_slice(&(router.len() as u16).to_le_bytes());
		cpf.extend_from_slice(&router);
		let mut plc = connected(vec![encap(0x006F, SESSION, 8, &cpf)]);

		let err = plc.write_tag("Setpoint", CipData::from(1i32)).unwrap_err();
		assert!(matches!(err, Error::TypeMismatch));
	}

	#[test]
	fn test_read_many_reports_per_tag() {
		// "A" answers a DINT, "Missing" answers status 0x05 (unknown tag).
		let good = router_reply(0x4C, 0, &[], &[0xC4, 0x00, 0x07, 0x00, 0x00, 0x00]);
		let bad = router_reply(0x4C, 0x05, &[0x0000], &[]);
		let mut body = Vec::new();
		body.extend_from_slice(&2u16.to_le_bytes());
		body.extend_from_slice(&6u16.to_le_bytes());
		body.extend_from_slice(&((6 + good.len()) as u16).to_le_bytes());
		body.extend_from_slice(&good);
		body.extend_from_slice(&bad);
		let reply = router_reply(0x0A, 0x1E, &[], &body);
		let mut cpf = Vec::new();
		cpf.extend_from_slice(&0u32.to_le_bytes());
		cpf.extend_from_slice(&0u16.to_le_bytes());
		cpf.extend_from_slice(&2u16.to_le_bytes());
		cpf.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
		cpf.extend_from_slice(&0x00B2u16.to_le_bytes());
		cpf.extend_from_slice(&(reply.len() as u16).to_le_bytes());
		cpf.extend_from_slice(&reply);
		let mut plc = connected(vec![encap(0x006F, SESSION, 8, &cpf)]);

		let results = plc.read_many(&["A", "Missing"]).unwrap();
		assert_eq!(results.len(), 2);
		assert_eq!(*results[0].as_ref().unwrap(), CipData::Dint(vec![7]));
		assert!(matches!(
			results[1],
			Err(Error::ProtocolStatus { status: 0x05, .. })
		));
	}

	#[test]
	fn test_timeout_then_close_succeeds() {
		let mut plc = connected(vec![]);
		let err = plc.read_tag("Anything").unwrap_err();
		assert!(matches!(err, Error::Timeout(_)));

		plc.close();
		plc.close();
		assert!(matches!(plc.read_tag("More"), Err(Error::NotConnected)));
	}

	#[test]
	fn test_write_many_length_mismatch() {
		let mut plc = connected(vec![]);
		let err = plc
			.write_many(&["A", "B"], &[CipData::from(1i32)])
			.unwrap_err();
		assert!(matches!(err, Error::Argument(_)));
	}
}
