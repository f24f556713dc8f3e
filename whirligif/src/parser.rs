//! The block-stream parser: reads a whole GIF stream into an in-memory [GifContents] record,
//! plus the read-side convenience operations built on top of it (info, metadata, frames, XMP).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use byteorder::ReadBytesExt;

use crate::blocks::{
	extension_code, read_sub_blocks, ApplicationExtension, Block, CommentExtension, DisposalMethod, GenericBlock,
	GifHeader, GifVersion, GraphicControlExtension, ImageDescriptor, PlainTextExtension, APPLICATION_LABEL,
	COMMENT_LABEL, EXTENSION_INTRODUCER, GIF_TRAILER, GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, PLAIN_TEXT_LABEL,
};
use crate::compliance::ComplianceReport;
use crate::error::GifError;
use crate::frame::make_frame;
use crate::image::RgbaImage;
use crate::lzw::lzw_decode;
use crate::palette::ColorTable;
use crate::xmp;

/// Upper bound on `width * height` checked before the decoded index buffer for a frame is
/// allocated, so that a malformed descriptor cannot demand an absurd allocation.
pub const MAX_DECODE_PIXELS: u64 = 1 << 26;

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
	/// When set, image descriptors are returned without decoded image data. The compressed
	/// sub-block chains are still drained so parsing continues at the following block.
	pub stop_before_image_data: bool,
}

/// Basic facts about a stream, reported without materializing any pixels.
#[derive(Debug, Clone)]
pub struct GifInfo {
	pub version: GifVersion,
	/// dimensions of the first frame
	pub width: u16,
	pub height: u16,
	pub frame_count: usize,
	pub bits_per_pixel: u8,
	pub comments: Vec<String>,
	/// true when any frame enables transparency
	pub transparent: bool,
	pub compression: &'static str,
}

/// Per-frame placement and timing metadata.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameMetadata {
	pub left: u16,
	pub top: u16,
	/// delay before the next frame, in hundredths of a second
	pub delay: u16,
	pub disposal: DisposalMethod,
}

#[derive(Debug, Clone)]
pub struct GifMetadata {
	pub screen_width: u16,
	pub screen_height: u16,
	pub frames: Vec<FrameMetadata>,
}

/// Everything a GIF stream contains: the header, the global color table if there is one, and
/// every block in file order. All records are immutable once parsed; frames are materialized
/// from them on demand.
#[derive(Debug, Clone)]
pub struct GifContents {
	pub header: GifHeader,
	pub global_color_table: Option<ColorTable>,
	pub blocks: Vec<Block>,
}

impl GifContents {
	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<GifContents, GifError> {
		Self::read_with_options(reader, &ParseOptions::default())
	}

	pub fn read_with_options<T: ReadBytesExt>(reader: &mut T, options: &ParseOptions) -> Result<GifContents, GifError> {
		Self::read_internal(reader, options, None)
	}

	pub(crate) fn read_internal<T: ReadBytesExt>(
		reader: &mut T,
		options: &ParseOptions,
		mut report: Option<&mut ComplianceReport>,
	) -> Result<GifContents, GifError> {
		let header = GifHeader::read(reader)?;

		let global_color_table = if header.has_global_color_table() {
			Some(ColorTable::read(reader, header.global_color_table_bits(), "global color table")?)
		} else {
			None
		};

		let mut blocks = Vec::new();
		loop {
			let tag = reader.read_u8().map_err(|e| GifError::eof(e, "block tag"))?;
			match tag {
				GIF_TRAILER => break,
				// stray zero bytes between blocks show up in known-broken files; skip them on
				// read, never write them
				0x00 => {
					if let Some(report) = report.as_deref_mut() {
						report.note("stray 0x00 pad byte between blocks");
					}
				}
				IMAGE_SEPARATOR => {
					blocks.push(Block::Image(read_image(reader, options, &mut report)?));
				}
				EXTENSION_INTRODUCER => {
					let label = reader.read_u8().map_err(|e| GifError::eof(e, "extension label"))?;
					let block = match label {
						GRAPHIC_CONTROL_LABEL => Block::GraphicControl(GraphicControlExtension::read(reader)?),
						COMMENT_LABEL => Block::Comment(CommentExtension::read(reader)?),
						PLAIN_TEXT_LABEL => Block::PlainText(PlainTextExtension::read(reader)?),
						APPLICATION_LABEL => Block::Application(ApplicationExtension::read(reader)?),
						_ => Block::Generic(GenericBlock::read(reader, extension_code(label))?),
					};
					blocks.push(block);
				}
				_ => return Err(GifError::UnknownBlock(tag)),
			}
		}

		Ok(GifContents { header, global_color_table, blocks })
	}

	pub fn image_descriptors(&self) -> impl Iterator<Item = &ImageDescriptor> {
		self.blocks.iter().filter_map(|block| match block {
			Block::Image(descriptor) => Some(descriptor),
			_ => None,
		})
	}

	pub fn graphic_controls(&self) -> impl Iterator<Item = &GraphicControlExtension> {
		self.blocks.iter().filter_map(|block| match block {
			Block::GraphicControl(extension) => Some(extension),
			_ => None,
		})
	}

	pub fn frame_count(&self) -> usize {
		self.image_descriptors().count()
	}

	/// All comment extension texts, in file order.
	pub fn comments(&self) -> Vec<String> {
		self.blocks
			.iter()
			.filter_map(|block| match block {
				Block::Comment(comment) => Some(comment.text()),
				_ => None,
			})
			.collect()
	}

	/// The embedded XMP XML string, if the stream carries one.
	pub fn xmp(&self) -> Result<Option<String>, GifError> {
		xmp::extract(self)
	}

	/// Pairs each image descriptor with its graphic control extension. A stream either has no
	/// graphic control extensions at all, or exactly one per image descriptor (the i-th pairs
	/// with the i-th in file order); anything else is malformed.
	fn paired_graphic_controls(&self) -> Result<Vec<Option<&GraphicControlExtension>>, GifError> {
		let descriptor_count = self.frame_count();
		let extensions: Vec<&GraphicControlExtension> = self.graphic_controls().collect();
		if extensions.is_empty() {
			return Ok(vec![None; descriptor_count]);
		}
		if extensions.len() != descriptor_count {
			return Err(GifError::InvalidGceCount(format!(
				"{} graphic control extensions for {} image descriptors",
				extensions.len(),
				descriptor_count
			)));
		}
		Ok(extensions.into_iter().map(Some).collect())
	}

	/// Basic facts about the stream. Requires at least one image descriptor to report on.
	pub fn info(&self) -> Result<GifInfo, GifError> {
		let first = self
			.image_descriptors()
			.next()
			.ok_or_else(|| GifError::BadHeader("no image descriptor found".to_string()))?;
		Ok(GifInfo {
			version: self.header.version,
			width: first.width,
			height: first.height,
			frame_count: self.frame_count(),
			bits_per_pixel: self.header.bits_per_pixel(),
			comments: self.comments(),
			transparent: self.graphic_controls().any(|extension| extension.has_transparency()),
			compression: "LZW",
		})
	}

	/// Per-frame metadata (position, delay, disposal) plus the logical screen size.
	pub fn metadata(&self) -> Result<GifMetadata, GifError> {
		let graphic_controls = self.paired_graphic_controls()?;
		let frames = self
			.image_descriptors()
			.zip(graphic_controls)
			.map(|(descriptor, extension)| FrameMetadata {
				left: descriptor.left,
				top: descriptor.top,
				delay: extension.map(|e| e.delay).unwrap_or(0),
				disposal: extension.map(|e| e.disposal()).unwrap_or(DisposalMethod::Unspecified),
			})
			.collect();
		Ok(GifMetadata {
			screen_width: self.header.screen_width,
			screen_height: self.header.screen_height,
			frames,
		})
	}

	fn color_table_for<'a>(&'a self, descriptor: &'a ImageDescriptor, index: usize) -> Result<&'a ColorTable, GifError> {
		descriptor
			.local_color_table
			.as_ref()
			.or(self.global_color_table.as_ref())
			.ok_or_else(|| GifError::BadColorTable(format!("no color table in scope for frame {}", index)))
	}

	/// Materializes the first frame.
	pub fn first_frame(&self) -> Result<RgbaImage, GifError> {
		let graphic_controls = self.paired_graphic_controls()?;
		let descriptor = self
			.image_descriptors()
			.next()
			.ok_or_else(|| GifError::BadHeader("no image descriptor found".to_string()))?;
		make_frame(descriptor, graphic_controls[0], self.color_table_for(descriptor, 0)?)
	}

	/// Materializes every frame, in file order.
	pub fn frames(&self) -> Result<Vec<RgbaImage>, GifError> {
		let graphic_controls = self.paired_graphic_controls()?;
		let mut frames = Vec::with_capacity(self.frame_count());
		for (index, descriptor) in self.image_descriptors().enumerate() {
			frames.push(make_frame(descriptor, graphic_controls[index], self.color_table_for(descriptor, index)?)?);
		}
		Ok(frames)
	}
}

fn read_image<T: ReadBytesExt>(
	reader: &mut T,
	options: &ParseOptions,
	report: &mut Option<&mut ComplianceReport>,
) -> Result<ImageDescriptor, GifError> {
	let mut descriptor = ImageDescriptor::read(reader)?;

	if descriptor.has_local_color_table() {
		descriptor.local_color_table =
			Some(ColorTable::read(reader, descriptor.local_color_table_bits(), "local color table")?);
	}

	descriptor.min_code_size = reader.read_u8().map_err(|e| GifError::eof(e, "LZW minimum code size"))?;
	let compressed = read_sub_blocks(reader, "image data sub-blocks")?;

	if !options.stop_before_image_data {
		let pixel_count = descriptor.width as u64 * descriptor.height as u64;
		if pixel_count > MAX_DECODE_PIXELS {
			return Err(GifError::CorruptImageData(format!(
				"image dimensions {}x{} exceed the decode budget",
				descriptor.width, descriptor.height
			)));
		}

		let mut data = lzw_decode(&compressed, descriptor.min_code_size as usize, pixel_count as usize)
			.map_err(|e| GifError::CorruptImageData(format!("image data: {}", e)))?;
		if data.len() > pixel_count as usize {
			// more indices than pixels is not fatal, the surplus is dropped
			if let Some(report) = report.as_deref_mut() {
				report.note(format!(
					"image data decodes to more than the {} pixels the descriptor declares",
					pixel_count
				));
			}
			data.truncate(pixel_count as usize);
		}
		descriptor.image_data = Some(data);
	}

	Ok(descriptor)
}

/// Reads just the logical screen dimensions from the start of a stream.
pub fn read_dimensions<T: ReadBytesExt>(reader: &mut T) -> Result<(u16, u16), GifError> {
	let header = GifHeader::read(reader)?;
	Ok((header.screen_width, header.screen_height))
}

/// Reads basic facts about a stream without decoding any image data.
pub fn read_info<T: ReadBytesExt>(reader: &mut T) -> Result<GifInfo, GifError> {
	GifContents::read_with_options(reader, &ParseOptions { stop_before_image_data: true })?.info()
}

/// Reads per-frame metadata without decoding any image data.
pub fn read_metadata<T: ReadBytesExt>(reader: &mut T) -> Result<GifMetadata, GifError> {
	GifContents::read_with_options(reader, &ParseOptions { stop_before_image_data: true })?.metadata()
}

/// Reads a stream and materializes its first frame.
pub fn read_first_frame<T: ReadBytesExt>(reader: &mut T) -> Result<RgbaImage, GifError> {
	GifContents::read(reader)?.first_frame()
}

/// Reads a stream and materializes every frame.
pub fn read_all_frames<T: ReadBytesExt>(reader: &mut T) -> Result<Vec<RgbaImage>, GifError> {
	GifContents::read(reader)?.frames()
}

/// Reads the embedded XMP XML string, if any, without decoding any image data.
pub fn read_xmp<T: ReadBytesExt>(reader: &mut T) -> Result<Option<String>, GifError> {
	GifContents::read_with_options(reader, &ParseOptions { stop_before_image_data: true })?.xmp()
}

/// Reads a whole GIF file from disk.
pub fn read_gif_file(path: &Path) -> Result<GifContents, GifError> {
	let f = File::open(path)?;
	let mut reader = BufReader::new(f);
	GifContents::read(&mut reader)
}
