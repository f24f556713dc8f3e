pub use crate::{
	blocks::*, //
	compliance::*,
	encoder::*,
	error::*,
	frame::*,
	image::*,
	lzw::*,
	palette::*,
	parser::*,
	xmp::*,
};
