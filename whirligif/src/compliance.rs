//! Compliance checking: a lenient full read of a stream that collects descriptive notes about
//! everything questionable it ran into, instead of failing on the first oddity the way the
//! normal read operations do.

use byteorder::ReadBytesExt;

use crate::blocks::{Block, GifVersion};
use crate::error::GifError;
use crate::parser::{GifContents, ParseOptions};

/// The outcome of [check_compliance]: which signature the stream declared and a list of notes,
/// one per questionable thing found. An empty list means a clean stream.
#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
	version: Option<GifVersion>,
	notes: Vec<String>,
}

impl ComplianceReport {
	/// The GIF version the stream's signature declared.
	pub fn version(&self) -> Option<GifVersion> {
		self.version
	}

	pub fn notes(&self) -> &[String] {
		&self.notes
	}

	pub fn is_clean(&self) -> bool {
		self.notes.is_empty()
	}

	pub(crate) fn note(&mut self, note: impl Into<String>) {
		self.notes.push(note.into());
	}
}

/// Reads a whole stream and reports on its compliance: the signature found, frames that extend
/// beyond the logical screen, unknown extension labels, stray pad bytes, surplus image data and
/// mismatched graphic control extension counts. Hard structural damage (a bad header, a
/// truncated stream, an undecodable code stream) still fails like a normal read.
pub fn check_compliance<T: ReadBytesExt>(reader: &mut T) -> Result<ComplianceReport, GifError> {
	let mut report = ComplianceReport::default();
	let contents = GifContents::read_internal(reader, &ParseOptions::default(), Some(&mut report))?;

	report.version = Some(contents.header.version);
	if contents.header.screen_width == 0 || contents.header.screen_height == 0 {
		report.note(format!(
			"logical screen dimensions {}x{} include a zero",
			contents.header.screen_width, contents.header.screen_height
		));
	}

	let mut image_count = 0usize;
	let mut graphic_control_count = 0usize;
	for block in &contents.blocks {
		match block {
			Block::Image(descriptor) => {
				image_count += 1;
				let right = descriptor.left as u32 + descriptor.width as u32;
				let bottom = descriptor.top as u32 + descriptor.height as u32;
				if right > contents.header.screen_width as u32 || bottom > contents.header.screen_height as u32 {
					report.note(format!(
						"frame {} at ({}, {}) size {}x{} extends beyond the {}x{} logical screen",
						image_count - 1,
						descriptor.left,
						descriptor.top,
						descriptor.width,
						descriptor.height,
						contents.header.screen_width,
						contents.header.screen_height
					));
				}
			}
			Block::GraphicControl(_) => graphic_control_count += 1,
			Block::Application(application) => {
				if application.identifier.len() != 11 {
					report.note(format!(
						"application extension identifier is {} bytes instead of 11",
						application.identifier.len()
					));
				}
			}
			Block::Generic(generic) => {
				report.note(format!("unknown extension label 0x{:02x}", generic.code & 0xff));
			}
			_ => {}
		}
	}

	if graphic_control_count != 0 && graphic_control_count != image_count {
		report.note(format!(
			"{} graphic control extensions for {} image descriptors",
			graphic_control_count, image_count
		));
	}

	Ok(report)
}
