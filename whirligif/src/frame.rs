//! Frame materialization: expanding a frame's decoded palette indices into a full 0xAARRGGBB
//! raster, honoring the in-scope color table, transparency and interlacing.

use crate::blocks::{GraphicControlExtension, ImageDescriptor};
use crate::error::GifError;
use crate::image::RgbaImage;
use crate::palette::ColorTable;

/// Maps a source row of an interlaced image to its destination row. Interlaced frames store
/// their rows in four passes: every 8th row from 0, every 8th row from 4, every 4th row from 2,
/// then every other row from 1.
pub fn deinterlaced_row(row: u16, height: u16) -> Result<u16, GifError> {
	let height = height as u32;
	let mut row = row as u32;

	let pass1 = (height + 7) / 8;
	if row < pass1 {
		return Ok((8 * row) as u16);
	}
	row -= pass1;

	let pass2 = (height + 3) / 8;
	if row < pass2 {
		return Ok((4 + 8 * row) as u16);
	}
	row -= pass2;

	let pass3 = (height + 1) / 4;
	if row < pass3 {
		return Ok((2 + 4 * row) as u16);
	}
	row -= pass3;

	let pass4 = height / 2;
	if row < pass4 {
		return Ok((1 + 2 * row) as u16);
	}

	Err(GifError::InterlaceOverrun(height as u16))
}

/// Expands a frame's decoded palette indices into a width x height raster of packed 0xAARRGGBB
/// pixels. Transparent pixels (when the paired graphic control extension enables transparency)
/// come out as fully transparent black, everything else as fully opaque.
pub fn make_frame(
	descriptor: &ImageDescriptor,
	graphic_control: Option<&GraphicControlExtension>,
	color_table: &ColorTable,
) -> Result<RgbaImage, GifError> {
	let entries = color_table.to_argb_entries()?;
	let data = match &descriptor.image_data {
		Some(data) => data,
		None => return Err(GifError::ImageDataTooShort("image data was not decoded".to_string())),
	};
	let transparent_index = match graphic_control {
		Some(gce) if gce.has_transparency() => Some(gce.transparent_color),
		_ => None,
	};

	let width = descriptor.width as usize;
	let mut image = RgbaImage::new(descriptor.width, descriptor.height);
	let mut pos = 0;

	for row in 0..descriptor.height {
		let y = if descriptor.is_interlaced() {
			deinterlaced_row(row, descriptor.height)? as usize
		} else {
			row as usize
		};

		for x in 0..width {
			let index = match data.get(pos) {
				Some(&index) => index,
				None => {
					return Err(GifError::ImageDataTooShort(format!(
						"needed {} pixels but image data holds {}",
						width * descriptor.height as usize,
						data.len()
					)));
				}
			};
			pos += 1;

			let color = match entries.get(index as usize) {
				Some(&color) => color,
				None => return Err(GifError::PaletteIndexOutOfRange { index, size: entries.len() }),
			};
			image.pixels_mut()[y * width + x] = if Some(index) == transparent_index { 0x00000000 } else { color };
		}
	}

	Ok(image)
}

#[cfg(test)]
mod tests {
	use claim::assert_matches;

	use super::*;

	fn descriptor(width: u16, height: u16, data: Vec<u8>) -> ImageDescriptor {
		ImageDescriptor {
			left: 0,
			top: 0,
			width,
			height,
			flags: 0,
			local_color_table: None,
			min_code_size: 2,
			image_data: Some(data),
		}
	}

	fn two_color_table() -> ColorTable {
		ColorTable::from_bytes(vec![0xff, 0x00, 0x00, 0x00, 0x00, 0xff])
	}

	#[test]
	fn interlaced_row_order_for_height_8() -> Result<(), GifError> {
		let order: Vec<u16> = (0..8).map(|row| deinterlaced_row(row, 8).unwrap()).collect();
		assert_eq!(vec![0, 4, 2, 6, 1, 3, 5, 7], order);
		Ok(())
	}

	#[test]
	fn interlaced_rows_permute_every_height() {
		for height in 1..=64u16 {
			let mut seen = vec![false; height as usize];
			for row in 0..height {
				let y = deinterlaced_row(row, height).unwrap();
				assert!(y < height, "row {} of height {} mapped out of range to {}", row, height, y);
				assert!(!seen[y as usize], "row {} of height {} mapped to {} twice", row, height, y);
				seen[y as usize] = true;
			}
			assert!(seen.iter().all(|&hit| hit));
		}
	}

	#[test]
	fn interlaced_row_overrun_fails() {
		assert_matches!(deinterlaced_row(8, 8), Err(GifError::InterlaceOverrun(8)));
	}

	#[test]
	fn expands_indices_through_the_color_table() -> Result<(), GifError> {
		let frame = make_frame(&descriptor(2, 2, vec![0, 1, 1, 0]), None, &two_color_table())?;
		assert_eq!(&[0xffff0000, 0xff0000ff, 0xff0000ff, 0xffff0000], frame.pixels());
		Ok(())
	}

	#[test]
	fn interlaced_frame_lands_rows_in_display_order() -> Result<(), GifError> {
		// a 1x8 column whose source rows are 0,1,..,7; display order interleaves them
		let table = ColorTable::from_bytes((0..8u8).flat_map(|i| [i, i, i]).collect());
		let mut interlaced = descriptor(1, 8, (0..8).collect());
		interlaced.set_interlaced(true);

		let frame = make_frame(&interlaced, None, &table)?;
		let grays: Vec<u8> = frame.pixels().iter().map(|&pixel| (pixel & 0xff) as u8).collect();
		assert_eq!(vec![0, 4, 2, 5, 1, 6, 3, 7], grays);
		Ok(())
	}

	#[test]
	fn transparent_index_becomes_clear_pixels() -> Result<(), GifError> {
		let mut gce = GraphicControlExtension { flags: 0, delay: 0, transparent_color: 1 };
		gce.set_transparency(true);

		let frame = make_frame(&descriptor(2, 1, vec![0, 1]), Some(&gce), &two_color_table())?;
		assert_eq!(&[0xffff0000, 0x00000000], frame.pixels());
		Ok(())
	}

	#[test]
	fn transparency_flag_off_leaves_pixels_opaque() -> Result<(), GifError> {
		let gce = GraphicControlExtension { flags: 0, delay: 0, transparent_color: 1 };
		let frame = make_frame(&descriptor(2, 1, vec![0, 1]), Some(&gce), &two_color_table())?;
		assert_eq!(&[0xffff0000, 0xff0000ff], frame.pixels());
		Ok(())
	}

	#[test]
	fn short_image_data_fails() {
		let result = make_frame(&descriptor(2, 2, vec![0, 1]), None, &two_color_table());
		assert_matches!(result, Err(GifError::ImageDataTooShort(_)));
	}

	#[test]
	fn out_of_range_index_fails() {
		let result = make_frame(&descriptor(2, 1, vec![0, 5]), None, &two_color_table());
		assert_matches!(result, Err(GifError::PaletteIndexOutOfRange { index: 5, size: 2 }));
	}

	#[test]
	fn ragged_color_table_fails() {
		let table = ColorTable::from_bytes(vec![1, 2, 3, 4]);
		let result = make_frame(&descriptor(1, 1, vec![0]), None, &table);
		assert_matches!(result, Err(GifError::BadColorTable(_)));
	}
}
