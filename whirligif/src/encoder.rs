//! The single-frame GIF89a writer. Always emits a local color table sized to the palette that
//! was built for the image, with an optional transparent slot at the end and an optional XMP
//! application extension ahead of the image descriptor.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use byteorder::WriteBytesExt;

use crate::blocks::{
	write_sub_blocks, GifHeader, GifVersion, GraphicControlExtension, ImageDescriptor, EXTENSION_INTRODUCER,
	GIF_TRAILER, GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR,
};
use crate::error::GifError;
use crate::image::{from_argb32, RgbaImage};
use crate::lzw::lzw_encode;
use crate::palette::{ColorTable, ExactPaletteBuilder, Palette, PaletteBuilder, MAX_COLORS};
use crate::xmp::write_xmp_extension;

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
	/// XMP XML to embed as an application extension, if any.
	pub xmp: Option<String>,
}

/// Encodes a single-frame GIF89a stream using the default (exact, non-quantizing) palette
/// builder. Fails with [GifError::TooManyColors] when the image holds more distinct opaque
/// colors than a palette can carry.
pub fn write_gif<T: WriteBytesExt>(writer: &mut T, image: &RgbaImage, options: &WriteOptions) -> Result<(), GifError> {
	write_gif_with_builder(writer, image, options, &ExactPaletteBuilder)
}

/// Same as [write_gif], but with a caller-supplied palette builder, which is how quantization
/// support is plugged in.
pub fn write_gif_with_builder<T: WriteBytesExt, P: PaletteBuilder>(
	writer: &mut T,
	image: &RgbaImage,
	options: &WriteOptions,
	builder: &P,
) -> Result<(), GifError> {
	// one palette slot is reserved for the transparent index when any pixel needs it
	let has_transparency = image.has_transparency();
	let max_colors = MAX_COLORS - has_transparency as usize;
	let palette = match builder
		.build_exact(image, max_colors)
		.or_else(|| builder.build_quantized(image, max_colors))
	{
		Some(palette) => palette,
		None => return Err(GifError::TooManyColors(max_colors)),
	};

	let palette_size = palette.len() + has_transparency as usize;
	let size_code = ColorTable::size_code_for(palette_size);
	let transparent_index = palette_size.saturating_sub(1) as u8;

	let mut header = GifHeader {
		version: GifVersion::Gif89a,
		screen_width: image.width(),
		screen_height: image.height(),
		flags: 0,
		background_color: 0,
		aspect_ratio: 0,
	};
	header.set_color_resolution_bits(size_code);
	header.write(writer)?;

	writer.write_u8(EXTENSION_INTRODUCER)?;
	writer.write_u8(GRAPHIC_CONTROL_LABEL)?;
	let mut graphic_control = GraphicControlExtension {
		flags: 0,
		delay: 0,
		transparent_color: if has_transparency { transparent_index } else { 0 },
	};
	graphic_control.set_transparency(has_transparency);
	graphic_control.write(writer)?;

	if let Some(xml) = &options.xmp {
		write_xmp_extension(writer, xml)?;
	}

	writer.write_u8(IMAGE_SEPARATOR)?;
	let mut descriptor = ImageDescriptor {
		left: 0,
		top: 0,
		width: image.width(),
		height: image.height(),
		flags: 0,
		local_color_table: None,
		min_code_size: 0,
		image_data: None,
	};
	descriptor.set_local_color_table(true);
	descriptor.set_local_color_table_bits(size_code);
	descriptor.write(writer)?;

	build_color_table(&palette, size_code).write(writer)?;

	let min_code_size = (size_code as usize + 1).max(2);
	writer.write_u8(min_code_size as u8)?;

	let indices = image_to_indices(image, &palette, has_transparency, transparent_index);
	let compressed =
		lzw_encode(&indices, min_code_size).map_err(|e| GifError::CorruptImageData(format!("image data: {}", e)))?;
	write_sub_blocks(&compressed, writer)?;

	writer.write_u8(GIF_TRAILER)?;
	Ok(())
}

// the local color table carries its full 2^(size_code + 1) entries, zero-padded past the
// palette (the transparent slot, when present, is part of the padding)
fn build_color_table(palette: &Palette, size_code: u8) -> ColorTable {
	let mut bytes = Vec::with_capacity(ColorTable::byte_length_for_size_code(size_code));
	for index in 0..ColorTable::entries_for_size_code(size_code) {
		let (r, g, b) = palette.entry(index).unwrap_or((0, 0, 0));
		bytes.extend_from_slice(&[r, g, b]);
	}
	ColorTable::from_bytes(bytes)
}

fn image_to_indices(image: &RgbaImage, palette: &Palette, has_transparency: bool, transparent_index: u8) -> Vec<u8> {
	image
		.pixels()
		.iter()
		.map(|&pixel| {
			let (a, r, g, b) = from_argb32(pixel);
			if has_transparency && a < 255 {
				transparent_index
			} else {
				palette.index_of(r, g, b)
			}
		})
		.collect()
}

impl RgbaImage {
	pub fn to_gif_bytes<T: WriteBytesExt>(&self, writer: &mut T, options: &WriteOptions) -> Result<(), GifError> {
		write_gif(writer, self, options)
	}

	pub fn to_gif_file(&self, path: &Path, options: &WriteOptions) -> Result<(), GifError> {
		let f = File::create(path)?;
		let mut writer = BufWriter::new(f);
		self.to_gif_bytes(&mut writer, options)
	}
}

#[cfg(test)]
mod tests {
	use claim::assert_matches;

	use super::*;

	#[test]
	fn layout_of_an_opaque_single_pixel() -> Result<(), GifError> {
		let mut image = RgbaImage::new(1, 1);
		image.set_pixel(0, 0, 0xffff0000);

		let mut written = Vec::new();
		write_gif(&mut written, &image, &WriteOptions::default())?;

		assert_eq!(b"GIF89a", &written[0..6]);
		// 1x1 logical screen, no global color table, color resolution = size code 0
		assert_eq!(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00], &written[6..13]);
		// graphic control extension with no transparency
		assert_eq!(&[0x21, 0xf9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00], &written[13..21]);
		// image descriptor at the origin with a 2-entry local color table
		assert_eq!(&[0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x80], &written[21..31]);
		// the local table: red, then zero padding
		assert_eq!(&[0xff, 0x00, 0x00, 0x00, 0x00, 0x00], &written[31..37]);
		// minimum code size is clamped up to 2
		assert_eq!(0x02, written[37]);
		assert_eq!(0x3b, *written.last().unwrap());
		Ok(())
	}

	#[test]
	fn transparency_claims_the_last_palette_slot() -> Result<(), GifError> {
		let mut image = RgbaImage::new(2, 1);
		image.set_pixel(0, 0, 0xffff0000);
		image.set_pixel(1, 0, 0x00000000);

		let mut written = Vec::new();
		write_gif(&mut written, &image, &WriteOptions::default())?;

		// palette is [red] plus the reserved slot; transparency flag on, index 1
		assert_eq!(&[0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x01, 0x00], &written[13..21]);
		Ok(())
	}

	#[test]
	fn too_many_colors_without_a_quantizer() {
		let mut image = RgbaImage::new(32, 32);
		for y in 0..32u16 {
			for x in 0..32u16 {
				// 1024 distinct colors
				let value = (y as u32) * 32 + x as u32;
				image.set_pixel(x, y, 0xff000000 | (value << 8) | value);
			}
		}
		let mut written = Vec::new();
		let result = write_gif(&mut written, &image, &WriteOptions::default());
		assert_matches!(result, Err(GifError::TooManyColors(256)));
	}

	#[test]
	fn quantizing_builder_is_used_as_the_fallback() -> Result<(), GifError> {
		struct MonochromeBuilder;
		impl PaletteBuilder for MonochromeBuilder {
			fn build_exact(&self, _image: &RgbaImage, _max_colors: usize) -> Option<Palette> {
				None
			}

			fn build_quantized(&self, _image: &RgbaImage, _max_colors: usize) -> Option<Palette> {
				Some(Palette::new(vec![(0, 0, 0), (255, 255, 255)]))
			}
		}

		let mut image = RgbaImage::new(2, 1);
		image.set_pixel(0, 0, 0xff202020);
		image.set_pixel(1, 0, 0xffe0e0e0);

		let mut written = Vec::new();
		write_gif_with_builder(&mut written, &image, &WriteOptions::default(), &MonochromeBuilder)?;

		let mut reader = std::io::Cursor::new(written);
		let frame = crate::parser::read_first_frame(&mut reader)?;
		// nearest-match indexing snaps each pixel to a palette end
		assert_eq!(&[0xff000000, 0xffffffff], frame.pixels());
		Ok(())
	}
}
