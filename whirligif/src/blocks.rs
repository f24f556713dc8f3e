//! The wire-level records of a GIF stream: the logical screen descriptor, the block variants
//! that follow it, and the length-prefixed sub-block chains most of them carry their payloads in.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::GifError;
use crate::palette::ColorTable;

pub const IMAGE_SEPARATOR: u8 = 0x2c;
pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const GIF_TRAILER: u8 = 0x3b;

pub const GRAPHIC_CONTROL_LABEL: u8 = 0xf9;
pub const COMMENT_LABEL: u8 = 0xfe;
pub const PLAIN_TEXT_LABEL: u8 = 0x01;
pub const APPLICATION_LABEL: u8 = 0xff;

/// Builds the 16-bit composite block code for an extension label. Extensions are keyed as
/// `(0x21 << 8) | label` so that every block type shares a single code space with the plain
/// 0x2C image separator.
#[inline]
pub const fn extension_code(label: u8) -> u16 {
	((EXTENSION_INTRODUCER as u16) << 8) | label as u16
}

pub const IMAGE_DESCRIPTOR_CODE: u16 = IMAGE_SEPARATOR as u16;
pub const GRAPHIC_CONTROL_CODE: u16 = extension_code(GRAPHIC_CONTROL_LABEL);
pub const COMMENT_CODE: u16 = extension_code(COMMENT_LABEL);
pub const PLAIN_TEXT_CODE: u16 = extension_code(PLAIN_TEXT_LABEL);
pub const APPLICATION_CODE: u16 = extension_code(APPLICATION_LABEL);

/// Reads a chain of length-prefixed sub-blocks, concatenating all of their payload bytes
/// together. The chain is terminated by a zero-length sub-block, which is consumed.
pub fn read_sub_blocks<T: ReadBytesExt>(reader: &mut T, context: &str) -> Result<Vec<u8>, GifError> {
	let mut data = Vec::new();
	let mut count = reader.read_u8().map_err(|e| GifError::eof(e, context))?;
	while count > 0 {
		let mut sub_block = vec![0u8; count as usize];
		reader.read_exact(&mut sub_block).map_err(|e| GifError::eof(e, context))?;
		data.append(&mut sub_block);
		count = reader.read_u8().map_err(|e| GifError::eof(e, context))?;
	}
	Ok(data)
}

/// Same as [read_sub_blocks], but keeps the individual sub-blocks separate instead of
/// concatenating them.
pub fn read_sub_block_list<T: ReadBytesExt>(reader: &mut T, context: &str) -> Result<Vec<Vec<u8>>, GifError> {
	let mut sub_blocks = Vec::new();
	let mut count = reader.read_u8().map_err(|e| GifError::eof(e, context))?;
	while count > 0 {
		let mut sub_block = vec![0u8; count as usize];
		reader.read_exact(&mut sub_block).map_err(|e| GifError::eof(e, context))?;
		sub_blocks.push(sub_block);
		count = reader.read_u8().map_err(|e| GifError::eof(e, context))?;
	}
	Ok(sub_blocks)
}

/// Splits a byte buffer into a chain of sub-blocks of at most 255 bytes each, followed by the
/// terminating zero-length sub-block.
pub fn write_sub_blocks<T: WriteBytesExt>(data: &[u8], writer: &mut T) -> Result<(), GifError> {
	for sub_block in data.chunks(255) {
		writer.write_u8(sub_block.len() as u8)?;
		writer.write_all(sub_block)?;
	}
	writer.write_u8(0)?;
	Ok(())
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GifVersion {
	Gif87a,
	Gif89a,
}

impl GifVersion {
	pub fn from_bytes(bytes: &[u8; 3]) -> Option<GifVersion> {
		match bytes {
			b"87a" => Some(GifVersion::Gif87a),
			b"89a" => Some(GifVersion::Gif89a),
			_ => None,
		}
	}

	pub fn to_bytes(&self) -> [u8; 3] {
		match self {
			GifVersion::Gif87a => *b"87a",
			GifVersion::Gif89a => *b"89a",
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			GifVersion::Gif87a => "GIF 87a",
			GifVersion::Gif89a => "GIF 89a",
		}
	}
}

/// The GIF signature and logical screen descriptor found at the very start of every stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GifHeader {
	pub version: GifVersion,
	pub screen_width: u16,
	pub screen_height: u16,
	pub flags: u8,
	pub background_color: u8,
	pub aspect_ratio: u8,
}

impl GifHeader {
	pub fn has_global_color_table(&self) -> bool {
		self.flags & 0b10000000 != 0
	}

	pub fn set_global_color_table(&mut self, value: bool) {
		self.flags |= (value as u8).wrapping_shl(7);
	}

	pub fn color_resolution_bits(&self) -> u8 {
		(self.flags & 0b01110000).wrapping_shr(4)
	}

	pub fn set_color_resolution_bits(&mut self, value: u8) {
		self.flags |= (value & 0b111).wrapping_shl(4);
	}

	pub fn is_color_table_sorted(&self) -> bool {
		self.flags & 0b00001000 != 0
	}

	pub fn global_color_table_bits(&self) -> u8 {
		self.flags & 0b00000111
	}

	pub fn set_global_color_table_bits(&mut self, value: u8) {
		self.flags |= value & 0b111;
	}

	pub fn bits_per_pixel(&self) -> u8 {
		self.color_resolution_bits() + 1
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		let mut signature = [0u8; 3];
		reader.read_exact(&mut signature).map_err(|e| GifError::eof(e, "GIF signature"))?;
		if signature != *b"GIF" {
			return Err(GifError::BadHeader(format!("expected GIF signature, found {:02x?}", signature)));
		}
		let mut version_bytes = [0u8; 3];
		reader.read_exact(&mut version_bytes).map_err(|e| GifError::eof(e, "GIF version"))?;
		let version = GifVersion::from_bytes(&version_bytes)
			.ok_or_else(|| GifError::BadHeader(format!("unsupported GIF version {:02x?}", version_bytes)))?;
		Ok(GifHeader {
			version,
			screen_width: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "logical screen width"))?,
			screen_height: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "logical screen height"))?,
			flags: reader.read_u8().map_err(|e| GifError::eof(e, "logical screen descriptor flags"))?,
			background_color: reader.read_u8().map_err(|e| GifError::eof(e, "background color index"))?,
			aspect_ratio: reader.read_u8().map_err(|e| GifError::eof(e, "pixel aspect ratio"))?,
		})
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		writer.write_all(b"GIF")?;
		writer.write_all(&self.version.to_bytes())?;
		writer.write_u16::<LittleEndian>(self.screen_width)?;
		writer.write_u16::<LittleEndian>(self.screen_height)?;
		writer.write_u8(self.flags)?;
		writer.write_u8(self.background_color)?;
		writer.write_u8(self.aspect_ratio)?;
		Ok(())
	}
}

/// How a frame should be treated when the following frame is rendered, from the 3-bit disposal
/// field of a graphic control extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisposalMethod {
	Unspecified,
	DoNotDispose,
	RestoreToBackground,
	RestoreToPrevious,
	Reserved4,
	Reserved5,
	Reserved6,
	Reserved7,
}

impl DisposalMethod {
	pub fn from_bits(value: u8) -> DisposalMethod {
		use DisposalMethod::*;
		match value & 0b111 {
			0 => Unspecified,
			1 => DoNotDispose,
			2 => RestoreToBackground,
			3 => RestoreToPrevious,
			4 => Reserved4,
			5 => Reserved5,
			6 => Reserved6,
			_ => Reserved7,
		}
	}

	pub fn to_bits(&self) -> u8 {
		use DisposalMethod::*;
		match self {
			Unspecified => 0,
			DoNotDispose => 1,
			RestoreToBackground => 2,
			RestoreToPrevious => 3,
			Reserved4 => 4,
			Reserved5 => 5,
			Reserved6 => 6,
			Reserved7 => 7,
		}
	}
}

/// A single frame: position and size on the logical screen, an optional local color table, and
/// the frame's palette index data. `image_data` holds the decoded indices (one byte per pixel)
/// and is `None` when parsing was asked to stop before image data.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
	pub left: u16,
	pub top: u16,
	pub width: u16,
	pub height: u16,
	pub flags: u8,
	pub local_color_table: Option<ColorTable>,
	pub min_code_size: u8,
	pub image_data: Option<Vec<u8>>,
}

impl ImageDescriptor {
	pub fn has_local_color_table(&self) -> bool {
		self.flags & 0b10000000 != 0
	}

	pub fn set_local_color_table(&mut self, value: bool) {
		self.flags |= (value as u8).wrapping_shl(7);
	}

	pub fn is_interlaced(&self) -> bool {
		self.flags & 0b01000000 != 0
	}

	pub fn set_interlaced(&mut self, value: bool) {
		self.flags |= (value as u8).wrapping_shl(6);
	}

	pub fn is_color_table_sorted(&self) -> bool {
		self.flags & 0b00100000 != 0
	}

	pub fn local_color_table_bits(&self) -> u8 {
		self.flags & 0b00000111
	}

	pub fn set_local_color_table_bits(&mut self, value: u8) {
		self.flags |= value & 0b111;
	}

	/// Reads the 9 bytes of geometry and flags. The local color table, minimum code size and
	/// image data that follow on the wire are filled in by the block-stream parser.
	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		Ok(ImageDescriptor {
			left: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "image descriptor left position"))?,
			top: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "image descriptor top position"))?,
			width: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "image descriptor width"))?,
			height: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "image descriptor height"))?,
			flags: reader.read_u8().map_err(|e| GifError::eof(e, "image descriptor flags"))?,
			local_color_table: None,
			min_code_size: 0,
			image_data: None,
		})
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		writer.write_u16::<LittleEndian>(self.left)?;
		writer.write_u16::<LittleEndian>(self.top)?;
		writer.write_u16::<LittleEndian>(self.width)?;
		writer.write_u16::<LittleEndian>(self.height)?;
		writer.write_u8(self.flags)?;
		Ok(())
	}
}

/// Delay, transparency and disposal information for the image descriptor that follows it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GraphicControlExtension {
	pub flags: u8,
	/// delay before the next frame, in hundredths of a second
	pub delay: u16,
	pub transparent_color: u8,
}

impl GraphicControlExtension {
	pub fn has_transparency(&self) -> bool {
		self.flags & 0b00000001 != 0
	}

	pub fn set_transparency(&mut self, value: bool) {
		self.flags |= value as u8;
	}

	pub fn disposal(&self) -> DisposalMethod {
		DisposalMethod::from_bits((self.flags & 0b00011100).wrapping_shr(2))
	}

	pub fn set_disposal(&mut self, disposal: DisposalMethod) {
		self.flags |= disposal.to_bits().wrapping_shl(2);
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		// the fixed block size byte (4) and the trailing terminator are consumed but not kept
		let _block_size = reader.read_u8().map_err(|e| GifError::eof(e, "graphic control extension block size"))?;
		let extension = GraphicControlExtension {
			flags: reader.read_u8().map_err(|e| GifError::eof(e, "graphic control extension flags"))?,
			delay: reader.read_u16::<LittleEndian>().map_err(|e| GifError::eof(e, "graphic control extension delay"))?,
			transparent_color: reader.read_u8().map_err(|e| GifError::eof(e, "transparent color index"))?,
		};
		let _terminator = reader.read_u8().map_err(|e| GifError::eof(e, "graphic control extension terminator"))?;
		Ok(extension)
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		writer.write_u8(4)?;
		writer.write_u8(self.flags)?;
		writer.write_u16::<LittleEndian>(self.delay)?;
		writer.write_u8(self.transparent_color)?;
		writer.write_u8(0)?;
		Ok(())
	}
}

/// Free-form commentary carried in the stream, conventionally 7-bit ASCII.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommentExtension {
	pub data: Vec<u8>,
}

impl CommentExtension {
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.data).into_owned()
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		Ok(CommentExtension { data: read_sub_blocks(reader, "comment extension data")? })
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		write_sub_blocks(&self.data, writer)
	}
}

/// A plain text extension. The payload is kept as the raw sub-block chain, nothing in here
/// interprets it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlainTextExtension {
	pub sub_blocks: Vec<Vec<u8>>,
}

impl PlainTextExtension {
	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		Ok(PlainTextExtension { sub_blocks: read_sub_block_list(reader, "plain text extension data")? })
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		for sub_block in &self.sub_blocks {
			writer.write_u8(sub_block.len() as u8)?;
			writer.write_all(sub_block)?;
		}
		writer.write_u8(0)?;
		Ok(())
	}
}

/// An application extension: the first sub-block names the owning application (11 bytes of
/// identifier plus authentication code for well-formed files), the remaining sub-blocks are the
/// application's payload, concatenated here.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ApplicationExtension {
	pub identifier: Vec<u8>,
	pub data: Vec<u8>,
}

impl ApplicationExtension {
	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		let length = reader.read_u8().map_err(|e| GifError::eof(e, "application extension identifier size"))?;
		if length == 0 {
			// a zero-length first sub-block already terminates the chain
			return Ok(ApplicationExtension { identifier: Vec::new(), data: Vec::new() });
		}
		let mut identifier = vec![0u8; length as usize];
		reader.read_exact(&mut identifier).map_err(|e| GifError::eof(e, "application extension identifier"))?;
		Ok(ApplicationExtension {
			identifier, //
			data: read_sub_blocks(reader, "application extension payload")?,
		})
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		if self.identifier.is_empty() {
			writer.write_u8(0)?;
			return Ok(());
		}
		writer.write_u8(self.identifier.len() as u8)?;
		writer.write_all(&self.identifier)?;
		write_sub_blocks(&self.data, writer)
	}
}

/// Any extension with a label this crate does not recognize. The label is preserved inside the
/// composite block code and the payload is kept as the raw sub-block chain, so unknown blocks
/// survive a read unharmed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GenericBlock {
	pub code: u16,
	pub sub_blocks: Vec<Vec<u8>>,
}

impl GenericBlock {
	pub fn read<T: ReadBytesExt>(reader: &mut T, code: u16) -> Result<Self, GifError> {
		Ok(GenericBlock {
			code, //
			sub_blocks: read_sub_block_list(reader, "extension data")?,
		})
	}

	pub fn write<T: WriteBytesExt>(&self, writer: &mut T) -> Result<(), GifError> {
		for sub_block in &self.sub_blocks {
			writer.write_u8(sub_block.len() as u8)?;
			writer.write_all(sub_block)?;
		}
		writer.write_u8(0)?;
		Ok(())
	}

	/// All sub-block payload bytes concatenated together.
	pub fn data(&self) -> Vec<u8> {
		self.sub_blocks.concat()
	}
}

/// One parsed block from the stream, in file order.
#[derive(Debug, Clone)]
pub enum Block {
	Image(ImageDescriptor),
	GraphicControl(GraphicControlExtension),
	Comment(CommentExtension),
	PlainText(PlainTextExtension),
	Application(ApplicationExtension),
	Generic(GenericBlock),
}

impl Block {
	/// The 16-bit composite block code of this block (see [extension_code]).
	pub fn code(&self) -> u16 {
		use Block::*;
		match self {
			Image(_) => IMAGE_DESCRIPTOR_CODE,
			GraphicControl(_) => GRAPHIC_CONTROL_CODE,
			Comment(_) => COMMENT_CODE,
			PlainText(_) => PLAIN_TEXT_CODE,
			Application(_) => APPLICATION_CODE,
			Generic(generic) => generic.code,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use claim::assert_matches;

	use super::*;

	#[test]
	fn sub_blocks_round_trip() -> Result<(), GifError> {
		let data: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
		let mut written = Vec::new();
		write_sub_blocks(&data, &mut written)?;
		// 600 bytes split as 255 + 255 + 90 plus a length byte each and the terminator
		assert_eq!(600 + 3 + 1, written.len());
		assert_eq!(255, written[0]);
		assert_eq!(0, *written.last().unwrap());

		let mut reader = Cursor::new(&written);
		assert_eq!(data, read_sub_blocks(&mut reader, "test data")?);
		Ok(())
	}

	#[test]
	fn empty_sub_block_chain_round_trips() -> Result<(), GifError> {
		let mut written = Vec::new();
		write_sub_blocks(&[], &mut written)?;
		assert_eq!(vec![0], written);

		let mut reader = Cursor::new(&written);
		assert!(read_sub_blocks(&mut reader, "test data")?.is_empty());
		Ok(())
	}

	#[test]
	fn truncated_sub_block_chain_reports_eof() {
		let mut reader = Cursor::new(vec![5u8, 1, 2]);
		assert_matches!(read_sub_blocks(&mut reader, "test data"), Err(GifError::UnexpectedEof(_)));
	}

	#[test]
	fn header_flags() {
		let mut header = GifHeader {
			version: GifVersion::Gif89a,
			screen_width: 320,
			screen_height: 200,
			flags: 0,
			background_color: 0,
			aspect_ratio: 0,
		};
		assert!(!header.has_global_color_table());
		header.set_global_color_table(true);
		header.set_global_color_table_bits(7);
		header.set_color_resolution_bits(7);
		assert!(header.has_global_color_table());
		assert_eq!(7, header.global_color_table_bits());
		assert_eq!(7, header.color_resolution_bits());
		assert_eq!(8, header.bits_per_pixel());
		assert_eq!(0b11110111, header.flags);
	}

	#[test]
	fn header_round_trips() -> Result<(), GifError> {
		let header = GifHeader {
			version: GifVersion::Gif87a,
			screen_width: 64,
			screen_height: 48,
			flags: 0b10000001,
			background_color: 3,
			aspect_ratio: 0,
		};
		let mut written = Vec::new();
		header.write(&mut written)?;
		assert_eq!(b"GIF87a", &written[0..6]);

		let mut reader = Cursor::new(&written);
		assert_eq!(header, GifHeader::read(&mut reader)?);
		Ok(())
	}

	#[test]
	fn header_rejects_bad_signature_and_version() {
		let mut reader = Cursor::new(b"JIF89a\x01\x00\x01\x00\x00\x00\x00".to_vec());
		assert_matches!(GifHeader::read(&mut reader), Err(GifError::BadHeader(_)));

		let mut reader = Cursor::new(b"GIF88a\x01\x00\x01\x00\x00\x00\x00".to_vec());
		assert_matches!(GifHeader::read(&mut reader), Err(GifError::BadHeader(_)));
	}

	#[test]
	fn disposal_method_maps_all_raw_values() {
		for value in 0..8 {
			assert_eq!(value, DisposalMethod::from_bits(value).to_bits());
		}
		assert_eq!(DisposalMethod::Unspecified, DisposalMethod::from_bits(0));
		assert_eq!(DisposalMethod::DoNotDispose, DisposalMethod::from_bits(1));
		assert_eq!(DisposalMethod::RestoreToBackground, DisposalMethod::from_bits(2));
		assert_eq!(DisposalMethod::RestoreToPrevious, DisposalMethod::from_bits(3));
		// only the low three bits count
		assert_eq!(DisposalMethod::DoNotDispose, DisposalMethod::from_bits(0b1001));
	}

	#[test]
	fn graphic_control_round_trips() -> Result<(), GifError> {
		let mut extension = GraphicControlExtension { flags: 0, delay: 100, transparent_color: 255 };
		extension.set_transparency(true);
		extension.set_disposal(DisposalMethod::RestoreToBackground);
		assert!(extension.has_transparency());
		assert_eq!(DisposalMethod::RestoreToBackground, extension.disposal());

		let mut written = Vec::new();
		extension.write(&mut written)?;
		assert_eq!(vec![4, 0b00001001, 100, 0, 255, 0], written);

		let mut reader = Cursor::new(&written);
		assert_eq!(extension, GraphicControlExtension::read(&mut reader)?);
		Ok(())
	}

	#[test]
	fn comment_round_trips() -> Result<(), GifError> {
		let comment = CommentExtension { data: b"made with whirligif".to_vec() };
		assert_eq!("made with whirligif", comment.text());

		let mut written = Vec::new();
		comment.write(&mut written)?;
		let mut reader = Cursor::new(&written);
		assert_eq!(comment, CommentExtension::read(&mut reader)?);
		Ok(())
	}

	#[test]
	fn application_extension_round_trips() -> Result<(), GifError> {
		let extension = ApplicationExtension {
			identifier: b"NETSCAPE2.0".to_vec(), //
			data: vec![1, 0, 0],
		};
		let mut written = Vec::new();
		extension.write(&mut written)?;
		let mut reader = Cursor::new(&written);
		assert_eq!(extension, ApplicationExtension::read(&mut reader)?);
		Ok(())
	}

	#[test]
	fn generic_block_keeps_sub_block_boundaries() -> Result<(), GifError> {
		let block = GenericBlock {
			code: extension_code(0xab), //
			sub_blocks: vec![vec![1, 2, 3], vec![4, 5]],
		};
		let mut written = Vec::new();
		block.write(&mut written)?;
		assert_eq!(vec![3, 1, 2, 3, 2, 4, 5, 0], written);

		let mut reader = Cursor::new(&written);
		let reread = GenericBlock::read(&mut reader, extension_code(0xab))?;
		assert_eq!(block, reread);
		assert_eq!(vec![1, 2, 3, 4, 5], reread.data());
		Ok(())
	}

	#[test]
	fn composite_block_codes() {
		assert_eq!(0x2c, IMAGE_DESCRIPTOR_CODE);
		assert_eq!(0x21f9, GRAPHIC_CONTROL_CODE);
		assert_eq!(0x21fe, COMMENT_CODE);
		assert_eq!(0x2101, PLAIN_TEXT_CODE);
		assert_eq!(0x21ff, APPLICATION_CODE);
		assert_eq!(0x21ab, Block::Generic(GenericBlock { code: 0x21ab, sub_blocks: Vec::new() }).code());
	}
}
