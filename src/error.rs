use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the protocol stack and the session facade.
#[derive(Error, Debug)]
pub enum Error {
	#[error("i/o error")]
	Io(#[from] io::Error),

	/// A send or receive did not complete within the configured deadline.
	///
	/// The connection is only usable afterwards if the next operation reads a
	/// complete frame; callers that cannot guarantee that should close it.
	#[error("timed out after {0:?}")]
	Timeout(Duration),

	/// The response bytes do not form the frame we asked for: wrong command,
	/// wrong reply service, echoed context mismatch, or a truncated body.
	#[error("framing error: {0}")]
	Framing(String),

	/// The controller answered with a non-zero CIP general status.
	#[error("service 0x{service:02X} returned status 0x{status:02X} (extended {extended:04X?})")]
	ProtocolStatus {
		service: u8,
		status: u8,
		extended: Vec<u16>,
	},

	/// The written value's CIP type disagrees with the tag's stored type.
	#[error("written value's CIP type does not match the tag's type")]
	TypeMismatch,

	#[error("not connected")]
	NotConnected,

	/// The device's ListServices reply did not advertise EtherNet/IP.
	#[error("device does not speak EtherNet/IP: {0}")]
	UnsupportedService(String),

	/// Caller error: bad tag syntax, mismatched batch lengths, oversize
	/// request, out-of-range element access.
	#[error("invalid argument: {0}")]
	Argument(String),
}

impl Error {
	/// Map a decoded MessageRouter status to the most specific error kind.
	///
	/// Logix controllers report a write with the wrong data type as general
	/// status 0xFF with extended word 0x2107.
	pub(crate) fn from_status(service: u8, status: u8, extended: Vec<u16>) -> Error {
		if status == 0xFF && extended.contains(&0x2107) {
			Error::TypeMismatch
		} else {
			Error::ProtocolStatus {
				service,
				status,
				extended,
			}
		}
	}
}
