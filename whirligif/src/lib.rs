//! A decoder and encoder for the GIF (Graphics Interchange Format) file format, versions 87a
//! and 89a.
//!
//! The read side parses a whole stream into an in-memory [parser::GifContents] record (header,
//! optional global color table, every block in file order) from which frames, per-frame
//! metadata, basic image info and embedded XMP metadata can be materialized. The write side
//! emits a single-frame GIF89a stream from an [image::RgbaImage], optionally embedding an XMP
//! packet. Both sides include their own GIF-variant LZW codec.
//!
//! Animation playback and frame compositing are out of scope: frames come back as independent
//! rasters together with their delay/disposal metadata.

pub mod blocks;
pub mod compliance;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod image;
pub mod lzw;
pub mod palette;
pub mod parser;
pub mod xmp;

pub mod prelude;
