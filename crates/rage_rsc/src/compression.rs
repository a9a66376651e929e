//! Raw DEFLATE helpers shared by resource frames and archive entries.

use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use tracing::instrument;

use crate::error::Result;

/// Compress a buffer into a raw DEFLATE stream (no zlib header or checksum)
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a raw DEFLATE stream
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 2);
    decoder.read_to_end(&mut output)?;
    Ok(output)
}
