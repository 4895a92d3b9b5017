//! An incremental OGG page framer for live byte streams
//!
//! The input is an unbounded sequence of byte chunks of arbitrary, caller-chosen
//! sizes with no alignment guarantee against page boundaries; the output is the
//! stream's pages in arrival order, each either checksum-validated or flagged.
//! The framer performs no I/O of its own, so it can sit behind either a blocking
//! or an event-driven byte source.
//!
//! ```rust
//! use ogg_framer::{Framer, Page, PageResult};
//!
//! # fn main() -> ogg_framer::Result<()> {
//! let mut page = Page::new(0, 0, 1234, 0, vec![1, 2, 3])?;
//! page.gen_crc();
//!
//! let mut framer = Framer::new();
//! let mut results = framer.feed(&page.as_bytes())?;
//! results.extend(framer.finish()?);
//!
//! assert_eq!(results, vec![PageResult::Valid(page)]);
//! # Ok(()) }
//! ```

mod crc;
mod error;
mod framer;
mod header;

pub use crc::crc32;
pub use error::{FramerError, Result};
pub use framer::{Framer, PageResult};
pub use header::PageHeader;

/// The capture pattern marking the start of every page
pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// The size of a page's fixed header, up to and including the segment count
pub const PAGE_HEADER_SIZE: usize = 27;
/// The maximum page content size
pub const MAX_CONTENT_SIZE: usize = 65025;
/// The maximum total size of a single page on the wire
pub const MAX_PAGE_SIZE: usize = PAGE_HEADER_SIZE + 255 + MAX_CONTENT_SIZE;

/// The page contains data of a packet continued from the previous page
pub const CONTINUED_PACKET: u8 = 0x01;
/// The page is the first page of the logical bitstream
pub const CONTAINS_FIRST_PAGE_OF_BITSTREAM: u8 = 0x02;
/// The page is the last page of the logical bitstream
pub const CONTAINS_LAST_PAGE_OF_BITSTREAM: u8 = 0x04;

/// An OGG page
///
/// Pages coming out of a [`Framer`] are immutable snapshots of the bytes that
/// arrived; pages built through [`Page::new`] can still have their checksum
/// filled in with [`Page::gen_crc`] before being written out.
#[derive(Clone, PartialEq, Debug)]
pub struct Page {
	pub(crate) content: Vec<u8>,
	pub(crate) header: PageHeader,
	pub(crate) segment_table: Vec<u8>,
	/// The position in the stream the page ended
	pub end: u64,
}

impl Page {
	/// Create a new `Page`
	///
	/// This will have the following defaults:
	///
	/// * `checksum` = 0
	/// * `start` = 0
	/// * `end` = the page's total length on the wire
	///
	/// # Errors
	///
	/// See [`segment_table`]
	pub fn new(
		header_type_flag: u8,
		abgp: u64,
		stream_serial: u32,
		sequence_number: u32,
		content: Vec<u8>,
	) -> Result<Self> {
		let segment_table = segment_table(content.len())?;
		let end = (PAGE_HEADER_SIZE + segment_table.len() + content.len()) as u64;

		Ok(Self {
			content,
			header: PageHeader::new(header_type_flag, abgp, stream_serial, sequence_number),
			segment_table,
			end,
		})
	}

	/// Convert the Page to Vec<u8> for writing
	///
	/// NOTE: This will write the checksum as is. It is likely [`Page::gen_crc`] will have
	/// to be used prior.
	pub fn as_bytes(&self) -> Vec<u8> {
		let mut bytes =
			Vec::with_capacity(PAGE_HEADER_SIZE + self.segment_table.len() + self.content.len());

		bytes.extend(CAPTURE_PATTERN);
		bytes.push(0);
		bytes.push(self.header.header_type_flag);
		bytes.extend(self.header.abgp.to_le_bytes());
		bytes.extend(self.header.stream_serial.to_le_bytes());
		bytes.extend(self.header.sequence_number.to_le_bytes());
		bytes.extend(self.header.checksum.to_le_bytes());
		bytes.push(self.segment_table.len() as u8);
		bytes.extend(self.segment_table.iter());
		bytes.extend(self.content.iter());

		bytes
	}

	/// Generates the CRC checksum of the page
	///
	/// The checksum is computed over the serialized page with the checksum
	/// field itself zeroed, then stored.
	pub fn gen_crc(&mut self) {
		self.header.checksum = 0;
		self.header.checksum = crc::crc32(&self.as_bytes());
	}

	/// Returns the page's header
	pub fn header(&self) -> &PageHeader {
		&self.header
	}

	/// Returns the page's content
	pub fn content(&self) -> &[u8] {
		self.content.as_slice()
	}

	/// Consumes the page and returns its content
	pub fn take_content(self) -> Vec<u8> {
		self.content
	}

	/// Returns the page's segment table
	pub fn segment_table(&self) -> &[u8] {
		self.segment_table.as_slice()
	}

	/// Returns the page's total length on the wire
	pub fn len(&self) -> u64 {
		self.end - self.header.start
	}
}

/// Creates a segment table for a single packet of `length` bytes
///
/// A `length` that is a multiple of 255 produces a terminating lacing value
/// of 0, marking the end of the packet.
///
/// # Errors
///
/// `length` needs more than 255 lacing values to terminate within one page
pub fn segment_table(length: usize) -> Result<Vec<u8>> {
	let mut segments = vec![255u8; length / 255];
	segments.push((length % 255) as u8);

	if segments.len() > 255 {
		return Err(FramerError::TooMuchData);
	}

	Ok(segments)
}
