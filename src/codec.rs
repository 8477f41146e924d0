// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Storage codec. Everything written to a backend goes through these helpers.
//! Consensus hashes do not, they use the explicit layout of `HashWriter`.

use bincode::enc::write::Writer;

pub const CODEC_BYTES_LIMIT: usize = 1_000_000;

pub fn encode_to_vec<T: bincode::Encode>(val: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    let config = bincode::config::standard()
        .with_little_endian()
        .with_variable_int_encoding()
        .with_limit::<CODEC_BYTES_LIMIT>();

    bincode::encode_to_vec(val, config)
}

pub fn encode<W: Writer, T: bincode::Encode>(
    writer: W,
    val: &T,
) -> Result<(), bincode::error::EncodeError> {
    let config = bincode::config::standard()
        .with_little_endian()
        .with_variable_int_encoding()
        .with_limit::<CODEC_BYTES_LIMIT>();

    bincode::encode_into_writer(val, writer, config)
}

pub fn decode<T: bincode::Decode>(bytes: &[u8]) -> Result<T, bincode::error::DecodeError> {
    let config = bincode::config::standard()
        .with_little_endian()
        .with_variable_int_encoding()
        .with_limit::<CODEC_BYTES_LIMIT>();

    bincode::decode_from_slice(bytes, config).map(|r| r.0)
}

/// Encodes a 256-bit checkpoint as 8 fixed width words. Checkpoints are
/// mostly zero in their upper half so varint encoding would make them
/// variable length, which breaks prefix scans over them.
#[inline]
pub fn encode_fixed_8_array_u32<E: bincode::enc::Encoder>(
    s: &[u32; 8],
    encoder: &mut E,
) -> core::result::Result<(), bincode::error::EncodeError> {
    let mut v: [u8; 32] = [0; 32];

    for (i, word) in s.iter().enumerate() {
        let j = i * 4;
        v[j..j + 4].copy_from_slice(&word.to_le_bytes());
    }

    bincode::Encode::encode(&v, encoder)
}

#[inline]
pub fn decode_fixed_8_array_u32<D: bincode::de::Decoder>(
    decoder: &mut D,
) -> Result<[u32; 8], bincode::error::DecodeError> {
    let v: [u8; 32] = bincode::Decode::decode(decoder)?;
    let mut out: [u32; 8] = [0; 8];

    for (i, word) in out.iter_mut().enumerate() {
        let j = i * 4;
        let mut nn = [0; 4];
        nn.copy_from_slice(&v[j..j + 4]);
        *word = u32::from_le_bytes(nn);
    }

    Ok(out)
}
