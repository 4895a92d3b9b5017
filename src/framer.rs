use crate::error::{FramerError, Result};
use crate::header::PageHeader;
use crate::{crc, CAPTURE_PATTERN, MAX_PAGE_SIZE, PAGE_HEADER_SIZE, Page};

use std::io::Cursor;

use log::{debug, trace};

/// The default bound on sync-free buffered bytes
///
/// Generous enough to survive a page with a corrupted capture pattern
/// followed by a maximum-sized page.
pub(crate) const DEFAULT_MAX_BUFFERED: usize = 150 * 1024;

/// The outcome of framing a single page
#[derive(Clone, PartialEq, Debug)]
pub enum PageResult {
	/// A complete page whose checksum matched
	Valid(Page),
	/// A complete page whose stored checksum did not match the received bytes
	///
	/// The page still advances framing by its declared length; whether its
	/// fields are usable is up to the consumer.
	ChecksumMismatch {
		/// The decoded page, fields taken as-is from the corrupt bytes
		page: Page,
		/// The checksum calculated over the received bytes
		calculated: u32,
	},
	/// The stream ended before the page's declared length was buffered
	TruncatedAtEndOfStream(Vec<u8>),
	/// A capture pattern opened a page whose header could not be used
	///
	/// Carries the skipped bytes, running up to the next capture pattern (or
	/// the end of the stream).
	MalformedHeader(Vec<u8>),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum State {
	/// Scanning buffered bytes for the capture pattern
	Seeking,
	/// `buf` starts with a capture pattern; waiting for the declared length
	Accumulating,
	/// `finish` was called, no more input is accepted
	Closed,
	/// A fatal stream error occurred, no more input is accepted
	Poisoned,
}

/// An incremental OGG page framer
///
/// Bytes go in through [`Framer::feed`] in chunks of any size; complete pages
/// come out in arrival order, each validated against its checksum. The framer
/// never blocks and never performs I/O, so retrying or reconnecting the byte
/// source is entirely the caller's concern.
///
/// A framer is single-use: once [`Framer::finish`] is called (or a fatal
/// stream error is returned), further calls to `feed` fail with
/// [`FramerError::InvalidState`].
pub struct Framer {
	state: State,
	buf: Vec<u8>,
	/// Absolute stream offset of `buf[0]`
	base: u64,
	/// Bytes of a broken page currently being skipped over
	skipped: Vec<u8>,
	/// Contiguous sync-free bytes scanned since the last capture pattern
	sync_free: u64,
	max_buffered: usize,
}

impl Framer {
	/// Creates a framer with the default sync-free byte bound
	pub fn new() -> Self {
		Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
	}

	/// Creates a framer that gives up after `max_buffered` sync-free bytes
	///
	/// If more than `max_buffered` bytes are scanned without locating a
	/// capture pattern, the stream is considered unrecoverable and
	/// [`FramerError::StreamUnrecoverable`] is returned. Bounds smaller than
	/// [`MAX_PAGE_SIZE`] will reject streams that a larger bound could still
	/// frame.
	pub fn with_max_buffered(max_buffered: usize) -> Self {
		Self {
			state: State::Seeking,
			buf: Vec::new(),
			base: 0,
			skipped: Vec::new(),
			sync_free: 0,
			max_buffered,
		}
	}

	/// Appends a chunk of bytes and advances framing as far as possible
	///
	/// Returns every page completed by this call, valid or flagged, in
	/// arrival order. An empty `Vec` simply means no page boundary was
	/// reached yet. Never blocks.
	///
	/// # Errors
	///
	/// * [`FramerError::InvalidState`] after [`Framer::finish`] or a prior fatal error
	/// * [`FramerError::StreamUnrecoverable`] when the sync-free bound is exceeded
	pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<PageResult>> {
		match self.state {
			State::Closed | State::Poisoned => return Err(FramerError::InvalidState),
			_ => {},
		}

		self.buf.extend_from_slice(chunk);
		self.advance()
	}

	/// Signals the end of input
	///
	/// Any in-flight partial page is flushed as
	/// [`PageResult::TruncatedAtEndOfStream`] (or
	/// [`PageResult::MalformedHeader`] for a span still being skipped), then
	/// the framer is closed. Calling `finish` again returns no results.
	///
	/// # Errors
	///
	/// Infallible today; the `Result` keeps the contract uniform with
	/// [`Framer::feed`].
	pub fn finish(&mut self) -> Result<Vec<PageResult>> {
		let mut results = Vec::new();

		match self.state {
			State::Closed | State::Poisoned => {
				self.state = State::Closed;
				return Ok(results);
			},
			State::Seeking => {
				if self.skipped.is_empty() {
					if !self.buf.is_empty() {
						trace!(
							"Discarding {} trailing sync-free bytes at end of stream",
							self.buf.len()
						);
						self.buf.clear();
					}
				} else {
					// The remaining lookback bytes belong to the skipped span
					self.skipped.extend_from_slice(&self.buf);
					self.buf.clear();
					results.push(PageResult::MalformedHeader(std::mem::take(
						&mut self.skipped,
					)));
				}
			},
			State::Accumulating => {
				debug!(
					"Stream ended {} bytes into an incomplete page",
					self.buf.len()
				);
				results.push(PageResult::TruncatedAtEndOfStream(std::mem::take(
					&mut self.buf,
				)));
			},
		}

		self.state = State::Closed;
		Ok(results)
	}

	/// Returns the number of bytes currently buffered
	pub fn buffered(&self) -> usize {
		self.buf.len()
	}

	fn advance(&mut self) -> Result<Vec<PageResult>> {
		let mut results = Vec::new();

		loop {
			let progressed = match self.state {
				State::Seeking => self.seek(&mut results)?,
				State::Accumulating => self.accumulate(&mut results)?,
				State::Closed | State::Poisoned => false,
			};

			if !progressed {
				break;
			}
		}

		Ok(results)
	}

	/// Scans for the capture pattern, discarding noise (or growing the
	/// currently-skipped span) along the way
	fn seek(&mut self, results: &mut Vec<PageResult>) -> Result<bool> {
		if let Some(pos) = find_capture(&self.buf) {
			if pos > 0 {
				let pre: Vec<u8> = self.buf.drain(..pos).collect();
				self.base += pre.len() as u64;

				if self.skipped.is_empty() {
					trace!("Discarding {} bytes of pre-stream noise", pre.len());
				} else {
					self.skipped.extend_from_slice(&pre);
				}
			}

			if !self.skipped.is_empty() {
				debug!(
					"Resynchronized after skipping {} unusable bytes",
					self.skipped.len()
				);
				results.push(PageResult::MalformedHeader(std::mem::take(
					&mut self.skipped,
				)));
			}

			self.sync_free = 0;
			self.state = State::Accumulating;
			return Ok(true);
		}

		// No capture pattern yet. Keep a short lookback so a pattern split
		// across `feed` calls is still found, and drop the rest.
		let lookback = CAPTURE_PATTERN.len() - 1;
		if self.buf.len() > lookback {
			let dropped: Vec<u8> = self.buf.drain(..self.buf.len() - lookback).collect();
			self.base += dropped.len() as u64;
			self.sync_free += dropped.len() as u64;

			if self.skipped.is_empty() {
				trace!("Discarding {} sync-free bytes", dropped.len());
			} else {
				self.skipped.extend_from_slice(&dropped);
			}

			if self.sync_free > self.max_buffered as u64 {
				self.state = State::Poisoned;
				return Err(FramerError::StreamUnrecoverable {
					scanned: self.sync_free,
				});
			}
		}

		Ok(false)
	}

	/// Waits for the declared page length, then validates and emits the page
	fn accumulate(&mut self, results: &mut Vec<PageResult>) -> Result<bool> {
		debug_assert!(self.buf.starts_with(CAPTURE_PATTERN));

		if self.buf.len() < PAGE_HEADER_SIZE {
			return Ok(false);
		}

		// Version, always 0. Anything else means this capture pattern does
		// not open a usable page; skip it and rescan.
		if self.buf[4] != 0 {
			debug!("Capture pattern with nonzero stream structure version, skipping");
			return self.reject_page();
		}

		let segment_count = usize::from(self.buf[PAGE_HEADER_SIZE - 1]);
		let header_len = PAGE_HEADER_SIZE + segment_count;
		if self.buf.len() < header_len {
			return Ok(false);
		}

		let content_len: usize = self.buf[PAGE_HEADER_SIZE..header_len]
			.iter()
			.map(|&b| usize::from(b))
			.sum();
		let total = header_len + content_len;
		debug_assert!(total <= MAX_PAGE_SIZE);

		if self.buf.len() < total {
			return Ok(false);
		}

		// Recompute the checksum over the page with the checksum field zeroed
		let mut calculated = crc::update(0, &self.buf[..22]);
		calculated = crc::update(calculated, &[0; 4]);
		calculated = crc::update(calculated, &self.buf[26..total]);

		let page = self.decode_page(total)?;

		if page.header.checksum == calculated {
			results.push(PageResult::Valid(page));
		} else {
			debug!(
				"Page checksum mismatch at offset {} (stored {:#010x}, calculated {:#010x})",
				self.base, page.header.checksum, calculated
			);
			results.push(PageResult::ChecksumMismatch { page, calculated });
		}

		// Consume exactly the declared length; surplus bytes stay buffered
		// for the next page
		self.buf.drain(..total);
		self.base += total as u64;
		self.sync_free = 0;
		self.state = State::Seeking;

		Ok(true)
	}

	/// Decodes the fully-buffered page occupying `buf[..total]`
	fn decode_page(&self, total: usize) -> Result<Page> {
		let mut cursor = Cursor::new(&self.buf[..total]);
		let (header, segment_table) = PageHeader::read(&mut cursor, self.base)?;

		let content = self.buf[PAGE_HEADER_SIZE + segment_table.len()..total].to_vec();

		Ok(Page {
			content,
			header,
			segment_table,
			end: self.base + total as u64,
		})
	}

	/// Moves an unusable capture pattern into the skipped span and resumes
	/// scanning after it
	fn reject_page(&mut self) -> Result<bool> {
		// The capture pattern cannot overlap a later occurrence of itself,
		// so the whole literal is skipped at once.
		let capture: Vec<u8> = self.buf.drain(..CAPTURE_PATTERN.len()).collect();
		self.base += capture.len() as u64;
		self.skipped.extend_from_slice(&capture);

		self.state = State::Seeking;
		Ok(true)
	}
}

impl Default for Framer {
	fn default() -> Self {
		Self::new()
	}
}

fn find_capture(buf: &[u8]) -> Option<usize> {
	buf.windows(CAPTURE_PATTERN.len())
		.position(|window| window == CAPTURE_PATTERN)
}

#[cfg(test)]
mod tests {
	use super::{Framer, PageResult};
	use crate::{FramerError, PAGE_HEADER_SIZE, Page};

	fn build_page(serial: u32, sequence_number: u32, content: &[u8]) -> Page {
		let mut page = Page::new(0, 0, serial, sequence_number, content.to_vec()).unwrap();
		page.gen_crc();
		page
	}

	fn feed_in_chunks(framer: &mut Framer, bytes: &[u8], chunk_size: usize) -> Vec<PageResult> {
		let mut results = Vec::new();
		for chunk in bytes.chunks(chunk_size) {
			results.extend(framer.feed(chunk).unwrap());
		}
		results
	}

	#[test]
	fn chunk_size_independence() {
		let page = build_page(1111, 0, b"hello");
		let bytes = page.as_bytes();

		for chunk_size in [1, 2, 7, bytes.len()] {
			let mut framer = Framer::new();
			let mut results = feed_in_chunks(&mut framer, &bytes, chunk_size);
			results.extend(framer.finish().unwrap());

			assert_eq!(
				results,
				vec![PageResult::Valid(page.clone())],
				"chunk size {} disagreed",
				chunk_size
			);
		}
	}

	#[test]
	fn pages_emitted_in_order() {
		let mut bytes = Vec::new();
		for sequence_number in 0..5u32 {
			let content = vec![sequence_number as u8; 40 + sequence_number as usize];
			bytes.extend(build_page(9000, sequence_number, &content).as_bytes());
		}

		let mut framer = Framer::new();
		let mut results = feed_in_chunks(&mut framer, &bytes, 11);
		results.extend(framer.finish().unwrap());

		assert_eq!(results.len(), 5);
		for (i, result) in results.iter().enumerate() {
			match result {
				PageResult::Valid(page) => {
					assert_eq!(page.header().stream_serial, 9000);
					assert_eq!(page.header().sequence_number, i as u32);
					assert_eq!(page.content(), vec![i as u8; 40 + i].as_slice());
				},
				other => panic!("expected a valid page, got {:?}", other),
			}
		}
	}

	#[test]
	fn corrupt_page_is_flagged_and_framing_recovers() {
		let first = build_page(42, 0, b"first page content");
		let second = build_page(42, 1, b"second page content");

		let mut bytes = first.as_bytes();
		// Flip a payload byte, leaving the stored checksum alone
		let payload_byte = PAGE_HEADER_SIZE + first.segment_table().len() + 3;
		bytes[payload_byte] ^= 0x40;
		bytes.extend(second.as_bytes());

		let mut framer = Framer::new();
		let mut results = framer.feed(&bytes).unwrap();
		results.extend(framer.finish().unwrap());

		assert_eq!(results.len(), 2);
		match &results[0] {
			PageResult::ChecksumMismatch { page, calculated } => {
				assert_eq!(page.header().stream_serial, 42);
				assert_ne!(*calculated, page.header().checksum());
			},
			other => panic!("expected a checksum mismatch, got {:?}", other),
		}
		assert_eq!(results[1], PageResult::Valid(second_at_offset(&second, &first)));
	}

	// The second page's offsets account for the first page preceding it
	fn second_at_offset(second: &Page, first: &Page) -> Page {
		let mut expected = second.clone();
		expected.header.start += first.len();
		expected.end += first.len();
		expected
	}

	#[test]
	fn truncated_page_flushed_on_finish() {
		let bytes = build_page(7, 0, &[0xCD; 90]).as_bytes();
		let partial = &bytes[..40];

		let mut framer = Framer::new();
		assert!(framer.feed(partial).unwrap().is_empty());

		let results = framer.finish().unwrap();
		assert_eq!(
			results,
			vec![PageResult::TruncatedAtEndOfStream(partial.to_vec())]
		);

		// Closed for good
		assert!(matches!(
			framer.feed(b"more"),
			Err(FramerError::InvalidState)
		));
		assert!(framer.finish().unwrap().is_empty());
	}

	#[test]
	fn sync_free_stream_is_unrecoverable() {
		let mut framer = Framer::with_max_buffered(1024);

		let result = framer.feed(&[0u8; 2048]);
		assert!(matches!(
			result,
			Err(FramerError::StreamUnrecoverable { scanned }) if scanned > 1024
		));

		// Poisoned for good
		assert!(matches!(
			framer.feed(b"OggS"),
			Err(FramerError::InvalidState)
		));
	}

	#[test]
	fn surplus_bytes_stay_buffered() {
		let page = build_page(5150, 0, &[1, 2, 3, 4, 5]);
		let bytes = page.as_bytes();
		assert_eq!(bytes.len(), 33);

		let next = build_page(5150, 1, b"following page").as_bytes();

		let mut framer = Framer::new();
		let results = framer.feed(&bytes).unwrap();
		assert_eq!(results, vec![PageResult::Valid(page)]);

		// Only the next page's first 10 header bytes have arrived
		assert!(framer.feed(&next[..10]).unwrap().is_empty());
		assert_eq!(framer.buffered(), 10);
	}

	#[test_log::test]
	fn noise_before_first_page_is_discarded() {
		let page = build_page(31, 0, b"after the noise");
		let mut bytes = vec![0x17, 0x03, 0x01, 0xFF, 0xFE];
		bytes.extend(page.as_bytes());

		// Split so the capture pattern itself spans a chunk boundary
		let split = 7; // two bytes into "OggS"
		let mut framer = Framer::new();
		let mut results = framer.feed(&bytes[..split]).unwrap();
		results.extend(framer.feed(&bytes[split..]).unwrap());
		results.extend(framer.finish().unwrap());

		assert_eq!(results.len(), 1);
		match &results[0] {
			PageResult::Valid(found) => {
				assert_eq!(found.header().stream_serial, 31);
				assert_eq!(found.content(), page.content());
				// Offsets are absolute within the physical stream
				assert_eq!(found.header().start, 5);
			},
			other => panic!("expected a valid page, got {:?}", other),
		}
	}

	#[test_log::test]
	fn malformed_header_skipped_exactly_once() {
		let good = build_page(64, 3, b"still frames fine");

		// A capture pattern with a nonzero version byte, then junk, then a
		// real page
		let mut bytes = b"OggS\x01".to_vec();
		bytes.extend([0xAA; 10]);
		let junk_len = bytes.len();
		bytes.extend(good.as_bytes());

		let mut framer = Framer::new();
		let mut results = framer.feed(&bytes).unwrap();
		results.extend(framer.finish().unwrap());

		assert_eq!(results.len(), 2);
		assert_eq!(
			results[0],
			PageResult::MalformedHeader(bytes[..junk_len].to_vec())
		);
		match &results[1] {
			PageResult::Valid(page) => assert_eq!(page.content(), good.content()),
			other => panic!("expected a valid page, got {:?}", other),
		}
	}

	#[test]
	fn malformed_span_flushed_on_finish() {
		let mut framer = Framer::new();

		// Nonzero version, never followed by another capture pattern. The
		// accumulate step needs a full fixed header before rejecting.
		let mut bytes = b"OggS\x01".to_vec();
		bytes.extend([0xBB; 30]);

		assert!(framer.feed(&bytes).unwrap().is_empty());

		let results = framer.finish().unwrap();
		assert_eq!(results, vec![PageResult::MalformedHeader(bytes)]);
	}

	#[test]
	fn nil_page_is_accepted() {
		// A page with a segment count of 0 and no content
		let mut bytes = Vec::new();
		bytes.extend(b"OggS");
		bytes.push(0); // version
		bytes.push(0); // header type
		bytes.extend(0u64.to_le_bytes()); // abgp
		bytes.extend(77u32.to_le_bytes()); // serial
		bytes.extend(0u32.to_le_bytes()); // sequence
		bytes.extend(0u32.to_le_bytes()); // checksum, patched below
		bytes.push(0); // segment count

		let checksum = crate::crc32(&bytes);
		bytes[22..26].copy_from_slice(&checksum.to_le_bytes());

		let mut framer = Framer::new();
		let results = framer.feed(&bytes).unwrap();

		assert_eq!(results.len(), 1);
		match &results[0] {
			PageResult::Valid(page) => {
				assert_eq!(page.header().stream_serial, 77);
				assert!(page.content().is_empty());
				assert!(page.segment_table().is_empty());
			},
			other => panic!("expected a valid page, got {:?}", other),
		}
	}

	#[test]
	fn payload_containing_capture_pattern_is_not_split() {
		let page = build_page(88, 0, b"data with OggS inside of it");
		let bytes = page.as_bytes();

		let mut framer = Framer::new();
		let mut results = feed_in_chunks(&mut framer, &bytes, 9);
		results.extend(framer.finish().unwrap());

		assert_eq!(results, vec![PageResult::Valid(page)]);
	}
}
