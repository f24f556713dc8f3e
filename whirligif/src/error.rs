use std::io;

use thiserror::Error;

/// All of the ways reading or writing a GIF stream can fail. Each variant carries a short
/// human-readable description of what was being read or written at the time.
#[derive(Error, Debug)]
pub enum GifError {
	#[error("Bad GIF header: {0}")]
	BadHeader(String),

	#[error("Unexpected end of stream while reading {0}")]
	UnexpectedEof(String),

	#[error("Unknown block code 0x{0:02x}")]
	UnknownBlock(u8),

	#[error("Mismatched graphic control extension count: {0}")]
	InvalidGceCount(String),

	#[error("Bad color table: {0}")]
	BadColorTable(String),

	#[error("Image data ended early: {0}")]
	ImageDataTooShort(String),

	#[error("Palette index {index} is out of range for a color table of {size} entries")]
	PaletteIndexOutOfRange { index: u8, size: usize },

	#[error("Interlace pass overran the image height ({0} rows)")]
	InterlaceOverrun(u16),

	#[error("Corrupt image data: {0}")]
	CorruptImageData(String),

	#[error("Malformed XMP application extension: {0}")]
	MalformedXmp(String),

	#[error("More than one XMP application extension is present")]
	MultipleXmp,

	#[error("Image has too many colors to build an exact palette ({0} maximum)")]
	TooManyColors(usize),

	#[error("GIF I/O error")]
	IOError(#[from] io::Error),
}

impl GifError {
	/// Maps an I/O error from the underlying byte source to either [GifError::UnexpectedEof]
	/// naming the field that was being read, or a plain [GifError::IOError] for anything that
	/// isn't an EOF condition.
	pub(crate) fn eof(error: io::Error, context: &str) -> GifError {
		if error.kind() == io::ErrorKind::UnexpectedEof {
			GifError::UnexpectedEof(context.to_string())
		} else {
			GifError::IOError(error)
		}
	}
}
