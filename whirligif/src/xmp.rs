//! XMP metadata embedded in a GIF stream. XMP packets live in an application extension whose
//! identifier is "XMP DataXMP". The XML payload is written unterminated, so a 256-byte "magic
//! trailer" (0xFF counting down through 0x00) is appended after it; a naive sub-block scanner
//! walking the raw XML bytes as length prefixes always lands inside the trailer and terminates
//! cleanly.

use byteorder::WriteBytesExt;

use crate::blocks::{write_sub_blocks, Block, APPLICATION_LABEL, EXTENSION_INTRODUCER};
use crate::error::GifError;
use crate::parser::GifContents;

/// Identifier plus authentication code of the XMP application extension.
pub const XMP_IDENTIFIER: [u8; 11] = *b"XMP DataXMP";

pub const MAGIC_TRAILER_LENGTH: usize = 256;

/// The 256 magic trailer bytes: 0xFF, 0xFE, ... 0x01, 0x00.
pub fn magic_trailer() -> [u8; MAGIC_TRAILER_LENGTH] {
	let mut trailer = [0u8; MAGIC_TRAILER_LENGTH];
	for (i, byte) in trailer.iter_mut().enumerate() {
		*byte = 0xff - i as u8;
	}
	trailer
}

/// Finds the XMP application extension among the parsed blocks and returns its XML string, or
/// None when the stream carries no XMP at all.
pub(crate) fn extract(contents: &GifContents) -> Result<Option<String>, GifError> {
	let mut found = None;
	for block in &contents.blocks {
		if let Block::Application(application) = block {
			if application.identifier == XMP_IDENTIFIER {
				if found.is_some() {
					return Err(GifError::MultipleXmp);
				}
				found = Some(application);
			}
		}
	}

	let application = match found {
		Some(application) => application,
		None => return Ok(None),
	};

	if application.data.len() < MAGIC_TRAILER_LENGTH {
		return Err(GifError::MalformedXmp(format!(
			"payload of {} bytes is too short to hold the magic trailer",
			application.data.len()
		)));
	}
	let (xml, trailer) = application.data.split_at(application.data.len() - MAGIC_TRAILER_LENGTH);
	if trailer != magic_trailer() {
		return Err(GifError::MalformedXmp("magic trailer bytes are corrupt".to_string()));
	}

	match std::str::from_utf8(xml) {
		Ok(xml) => Ok(Some(xml.to_string())),
		Err(error) => Err(GifError::MalformedXmp(format!("payload is not valid UTF-8: {}", error))),
	}
}

/// Writes a complete XMP application extension: introducer, label, identifier sub-block, then
/// the XML bytes plus magic trailer packetized into sub-blocks.
pub(crate) fn write_xmp_extension<T: WriteBytesExt>(writer: &mut T, xml: &str) -> Result<(), GifError> {
	writer.write_u8(EXTENSION_INTRODUCER)?;
	writer.write_u8(APPLICATION_LABEL)?;
	writer.write_u8(XMP_IDENTIFIER.len() as u8)?;
	writer.write_all(&XMP_IDENTIFIER)?;

	let mut payload = Vec::with_capacity(xml.len() + MAGIC_TRAILER_LENGTH);
	payload.extend_from_slice(xml.as_bytes());
	payload.extend_from_slice(&magic_trailer());
	write_sub_blocks(&payload, writer)
}
