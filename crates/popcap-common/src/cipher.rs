//! PopCap byte cipher.
//!
//! Every byte of a `.pak` archive (header, entry metadata and payload) is
//! XORed with a single fixed key. The transform has no key schedule and no
//! position dependence, so encoding and decoding are the same operation.

/// The XOR key applied to every archive byte.
///
/// This is hardcoded in the game client and is not a secret.
pub const PAK_XOR_KEY: u8 = 0xF7;

/// Decode a single archive byte.
#[inline]
pub const fn decode(byte: u8) -> u8 {
    byte ^ PAK_XOR_KEY
}

/// Encode a single byte for storage in an archive.
///
/// Identical to [`decode`]; provided so call sites read naturally.
#[inline]
pub const fn encode(byte: u8) -> u8 {
    decode(byte)
}

/// Decode a buffer in place.
#[inline]
pub fn decode_in_place(data: &mut [u8]) {
    for byte in data.iter_mut() {
        *byte = decode(*byte);
    }
}

/// Encode a buffer in place.
#[inline]
pub fn encode_in_place(data: &mut [u8]) {
    decode_in_place(data);
}
