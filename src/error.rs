use std::error::Error;
use std::fmt;

/// Alias for `Result<T, FramerError>`
pub type Result<T> = std::result::Result<T, FramerError>;

/// Errors that can occur while framing a stream or building pages
#[derive(Debug)]
pub enum FramerError {
	/// More sync-free bytes than the configured bound were scanned without
	/// locating a capture pattern; the framer cannot safely continue
	StreamUnrecoverable {
		/// The number of sync-free bytes scanned
		scanned: u64,
	},
	/// `feed` was called after `finish`, or after a fatal stream error
	InvalidState,
	/// The data contains a page without a magic signature (OggS)
	MissingMagic,
	/// The data contains a page with a nonzero version
	InvalidVersion,
	/// The content contains too much data for a single page
	TooMuchData,
	/// Any std::io::Error
	Io(std::io::Error),
}

impl fmt::Display for FramerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FramerError::StreamUnrecoverable { scanned } => {
				write!(
					f,
					"No capture pattern found within {} sync-free bytes",
					scanned
				)
			},
			FramerError::InvalidState => {
				write!(f, "The framer is closed and cannot accept more input")
			},
			FramerError::MissingMagic => write!(f, "Page is missing a magic signature"),
			FramerError::InvalidVersion => {
				write!(f, "Invalid stream structure version (Should always be 0)")
			},
			FramerError::TooMuchData => write!(f, "Too much data was provided"),
			FramerError::Io(err) => write!(f, "{}", err),
		}
	}
}

impl Error for FramerError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match *self {
			FramerError::Io(ref e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for FramerError {
	fn from(err: std::io::Error) -> FramerError {
		FramerError::Io(err)
	}
}
