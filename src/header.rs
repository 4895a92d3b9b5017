use crate::error::{FramerError, Result};
use crate::CAPTURE_PATTERN;

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

/// An OGG page header
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PageHeader {
	/// The position in the stream the page started at
	pub start: u64,
	pub(crate) header_type_flag: u8,
	/// The page's absolute granule position
	pub abgp: u64,
	/// The page's stream serial number
	pub stream_serial: u32,
	/// The page's sequence number
	pub sequence_number: u32,
	pub(crate) checksum: u32,
}

impl PageHeader {
	pub(crate) fn new(
		header_type_flag: u8,
		abgp: u64,
		stream_serial: u32,
		sequence_number: u32,
	) -> Self {
		Self {
			start: 0,
			header_type_flag,
			abgp,
			stream_serial,
			sequence_number,
			checksum: 0,
		}
	}

	/// Reads a header and its segment table
	///
	/// `start` is the absolute position in the physical stream at which the
	/// page begins, as known by the caller.
	pub(crate) fn read<R>(data: &mut R, start: u64) -> Result<(Self, Vec<u8>)>
	where
		R: Read,
	{
		let mut sig = [0; 4];
		data.read_exact(&mut sig)?;

		if &sig != CAPTURE_PATTERN {
			return Err(FramerError::MissingMagic);
		}

		// Version, always 0
		let version = data.read_u8()?;

		if version != 0 {
			return Err(FramerError::InvalidVersion);
		}

		let header_type_flag = data.read_u8()?;

		let abgp = data.read_u64::<LittleEndian>()?;
		let stream_serial = data.read_u32::<LittleEndian>()?;
		let sequence_number = data.read_u32::<LittleEndian>()?;
		let checksum = data.read_u32::<LittleEndian>()?;

		// A segment count of 0 is unusual, but legal (a nil page)
		let segment_count = data.read_u8()?;

		let mut segment_table = vec![0; usize::from(segment_count)];
		data.read_exact(&mut segment_table)?;

		let header = Self {
			start,
			header_type_flag,
			abgp,
			stream_serial,
			sequence_number,
			checksum,
		};

		Ok((header, segment_table))
	}

	/// Returns the page's header type flag
	pub fn header_type_flag(&self) -> u8 {
		self.header_type_flag
	}

	/// Returns the page's checksum
	pub fn checksum(&self) -> u32 {
		self.checksum
	}
}
