//! GIF-variant implementation of LZW (Lempel-Ziv-Welch) compression and decompression.
//!
//! The GIF flavour of LZW differs from the generic algorithm in a few ways:
//!
//! * Variable/dynamic code bit sizes are used, starting at one bit more than the "minimum code
//!   size" and growing up to a maximum of 12 bits, at which point the dictionary is full and no
//!   further entries are added until a clear code resets it.
//! * Two reserved codes sit immediately above the root alphabet: a "clear code" which resets the
//!   dictionary and code bit size, and an "end of information" code which terminates the stream.
//! * Codes are packed LSB-first into a little-endian bit stream.
//!
//! Sub-block packetization is not handled here. The decoder takes the already re-assembled
//! compressed byte buffer (the parser concatenates the sub-block chain first), and the encoder
//! returns a raw compressed byte buffer for the writer to split into sub-blocks.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LzwError {
	#[error("Minimum code size {0} is outside the supported range of 2 to 8")]
	UnsupportedMinCodeSize(usize),

	#[error("Byte value {0} does not fit the root alphabet for minimum code size {1}")]
	ValueOutOfRange(u8, usize),

	#[error("Corrupt code stream: {0}")]
	CorruptCodeStream(String),
}

const MIN_CODE_SIZE: usize = 2;
const MAX_CODE_SIZE: usize = 8;
const MAX_BITS: usize = 12;
const TABLE_SIZE: usize = 1 << MAX_BITS;

// dictionary entries are (prefix, suffix) pairs. root entries and the reserved codes have no
// prefix, which is marked with this sentinel.
const NO_PREFIX: u16 = u16::MAX;

fn is_valid_min_code_size(min_code_size: usize) -> bool {
	(MIN_CODE_SIZE..=MAX_CODE_SIZE).contains(&min_code_size)
}

/// Reads variable bit-size codes out of a byte slice, LSB-first.
#[derive(Debug)]
struct CodeReader<'a> {
	bytes: &'a [u8],
	pos: usize,
	buffer: u32,
	buffer_length: usize,
	bit_size: usize,
}

impl<'a> CodeReader<'a> {
	pub fn new(bytes: &'a [u8], bit_size: usize) -> Self {
		CodeReader {
			bytes, //
			pos: 0,
			buffer: 0,
			buffer_length: 0,
			bit_size,
		}
	}

	#[inline]
	pub fn set_bit_size(&mut self, bit_size: usize) {
		self.bit_size = bit_size;
	}

	pub fn read_code(&mut self) -> Option<u16> {
		while self.buffer_length < self.bit_size {
			if self.pos >= self.bytes.len() {
				return None;
			}
			self.buffer |= (self.bytes[self.pos] as u32) << self.buffer_length;
			self.buffer_length += 8;
			self.pos += 1;
		}
		let code = (self.buffer & ((1 << self.bit_size) - 1)) as u16;
		self.buffer >>= self.bit_size;
		self.buffer_length -= self.bit_size;
		Some(code)
	}
}

/// Packs variable bit-size codes into a byte buffer, LSB-first.
#[derive(Debug)]
struct CodeWriter {
	buffer: u32,
	buffer_length: usize,
	bit_size: usize,
	output: Vec<u8>,
}

impl CodeWriter {
	pub fn new(bit_size: usize) -> Self {
		CodeWriter {
			buffer: 0, //
			buffer_length: 0,
			bit_size,
			output: Vec::new(),
		}
	}

	#[inline]
	pub fn set_bit_size(&mut self, bit_size: usize) {
		self.bit_size = bit_size;
	}

	pub fn push_code(&mut self, code: u16) {
		self.buffer |= (code as u32 & ((1 << self.bit_size) - 1)) << self.buffer_length;
		self.buffer_length += self.bit_size;
		while self.buffer_length >= 8 {
			self.output.push((self.buffer & 0xff) as u8);
			self.buffer >>= 8;
			self.buffer_length -= 8;
		}
	}

	pub fn finish(mut self) -> Vec<u8> {
		if self.buffer_length > 0 {
			self.output.push((self.buffer & 0xff) as u8);
		}
		self.output
	}
}

// walks the prefix chain of `code` down to its root and returns the first byte of its expansion
fn first_byte(prefix: &[u16], suffix: &[u8], mut code: u16) -> u8 {
	while prefix[code as usize] != NO_PREFIX {
		code = prefix[code as usize];
	}
	suffix[code as usize]
}

// appends the full expansion of `code` to `output`, returning the expansion's first byte.
// prefix chains always point at strictly smaller codes, so this terminates within the table size.
fn expand_code(prefix: &[u16], suffix: &[u8], code: u16, scratch: &mut Vec<u8>, output: &mut Vec<u8>) -> u8 {
	scratch.clear();
	let mut current = code;
	loop {
		scratch.push(suffix[current as usize]);
		if prefix[current as usize] == NO_PREFIX {
			break;
		}
		current = prefix[current as usize];
	}
	let first = *scratch.last().unwrap();
	output.extend(scratch.iter().rev());
	first
}

/// Decodes a GIF LZW code stream back into the original bytes. `data` is the full compressed
/// byte buffer (all image data sub-blocks concatenated together) and `output_size` is the number
/// of bytes the caller expects the stream to decode to. Decoding stops once that many bytes have
/// been produced or the end-of-information code is found, whichever comes first; the returned
/// buffer can be slightly longer than `output_size` when the final dictionary string runs past
/// it, and shorter when the stream ends early with an end code.
pub fn lzw_decode(data: &[u8], min_code_size: usize, output_size: usize) -> Result<Vec<u8>, LzwError> {
	if !is_valid_min_code_size(min_code_size) {
		return Err(LzwError::UnsupportedMinCodeSize(min_code_size));
	}

	let clear_code = 1u16 << min_code_size;
	let end_code = clear_code + 1;
	let first_free = clear_code + 2;

	let mut prefix = vec![NO_PREFIX; TABLE_SIZE];
	let mut suffix = vec![0u8; TABLE_SIZE];
	for i in 0..clear_code as usize {
		suffix[i] = i as u8;
	}

	let mut next_code = first_free;
	let mut bit_size = min_code_size + 1;
	let mut reader = CodeReader::new(data, bit_size);
	let mut prev: Option<u16> = None;
	let mut output = Vec::with_capacity(output_size);
	let mut scratch = Vec::with_capacity(TABLE_SIZE);

	while output.len() < output_size {
		let code = match reader.read_code() {
			Some(code) => code,
			None => {
				return Err(LzwError::CorruptCodeStream(format!(
					"code stream ended after {} of {} bytes",
					output.len(),
					output_size
				)));
			}
		};

		if code == clear_code {
			// dropping the counters back is all it takes to discard the dynamic entries, they
			// can no longer be referenced by any code the resized reader will produce
			next_code = first_free;
			bit_size = min_code_size + 1;
			reader.set_bit_size(bit_size);
			prev = None;
			continue;
		}
		if code == end_code {
			break;
		}

		let prev_code = match prev {
			None => {
				// the first code after a reset carries no prefix context, so it must be a root
				if code >= clear_code {
					return Err(LzwError::CorruptCodeStream(format!(
						"first code {} after a reset is not a root value",
						code
					)));
				}
				output.push(code as u8);
				prev = Some(code);
				continue;
			}
			Some(prev_code) => prev_code,
		};

		if code < next_code {
			let first = expand_code(&prefix, &suffix, code, &mut scratch, &mut output);
			if (next_code as usize) < TABLE_SIZE {
				prefix[next_code as usize] = prev_code;
				suffix[next_code as usize] = first;
				next_code += 1;
				if (next_code as usize) == (1 << bit_size) && bit_size < MAX_BITS {
					bit_size += 1;
					reader.set_bit_size(bit_size);
				}
			}
		} else if code == next_code && (next_code as usize) < TABLE_SIZE {
			// the code being defined right now: its expansion is prev's expansion plus prev's
			// own first byte
			let first = first_byte(&prefix, &suffix, prev_code);
			prefix[next_code as usize] = prev_code;
			suffix[next_code as usize] = first;
			expand_code(&prefix, &suffix, next_code, &mut scratch, &mut output);
			next_code += 1;
			if (next_code as usize) == (1 << bit_size) && bit_size < MAX_BITS {
				bit_size += 1;
				reader.set_bit_size(bit_size);
			}
		} else {
			return Err(LzwError::CorruptCodeStream(format!("code {} is not in the dictionary", code)));
		}

		prev = Some(code);
	}

	Ok(output)
}

/// Encodes bytes into a GIF LZW code stream, returning the raw compressed byte buffer (not yet
/// split into sub-blocks). Every input byte must fit the root alphabet, that is, be less than
/// `1 << min_code_size`. The stream always begins with a clear code and ends with an
/// end-of-information code, with the dictionary reset via a clear code whenever it fills up.
pub fn lzw_encode(data: &[u8], min_code_size: usize) -> Result<Vec<u8>, LzwError> {
	if !is_valid_min_code_size(min_code_size) {
		return Err(LzwError::UnsupportedMinCodeSize(min_code_size));
	}

	let clear_code = 1u16 << min_code_size;
	let end_code = clear_code + 1;
	let first_free = clear_code + 2;

	let mut bit_size = min_code_size + 1;
	let mut writer = CodeWriter::new(bit_size);
	writer.push_code(clear_code);

	let mut iter = data.iter();
	let mut prev = match iter.next() {
		Some(&byte) if (byte as u16) < clear_code => byte as u16,
		Some(&byte) => return Err(LzwError::ValueOutOfRange(byte, min_code_size)),
		None => {
			writer.push_code(end_code);
			return Ok(writer.finish());
		}
	};

	let mut table: HashMap<(u16, u8), u16> = HashMap::with_capacity(TABLE_SIZE);
	let mut next_code = first_free;

	for &byte in iter {
		if (byte as u16) >= clear_code {
			return Err(LzwError::ValueOutOfRange(byte, min_code_size));
		}

		if let Some(&code) = table.get(&(prev, byte)) {
			// still matching an existing dictionary string, keep going
			prev = code;
			continue;
		}

		writer.push_code(prev);
		let new_code = next_code;
		table.insert((prev, byte), new_code);
		next_code += 1;

		// bump the code bit size once a created code no longer fits the current one. this is
		// one entry later than the decoder's own growth check, which is correct: the decoder's
		// table runs one code behind this one.
		if (new_code as usize) > (1 << bit_size) - 1 && bit_size < MAX_BITS {
			bit_size += 1;
			writer.set_bit_size(bit_size);
		}

		if (new_code as usize) == TABLE_SIZE - 1 {
			// the dictionary is full, reset it and start over
			writer.push_code(clear_code);
			table.clear();
			next_code = first_free;
			bit_size = min_code_size + 1;
			writer.set_bit_size(bit_size);
		}

		prev = byte as u16;
	}

	writer.push_code(prev);

	// the decoder inserts its matching table entry only once it reads this final code. if that
	// entry lands exactly on the width boundary the decoder grows before reading the next code,
	// so the end code has to be written one bit wider to match.
	if (next_code as usize) == (1 << bit_size) && bit_size < MAX_BITS {
		bit_size += 1;
		writer.set_bit_size(bit_size);
	}
	writer.push_code(end_code);

	Ok(writer.finish())
}
