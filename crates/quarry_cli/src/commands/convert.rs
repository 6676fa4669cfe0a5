//! Convert command implementation.

use super::{read_input, write_output, Encoding};
use quarry_codec::{Decode, Encode};
use quarry_core::Diff;
use std::path::Path;

/// Runs the convert command.
pub fn run(
    input: &Path,
    output: &Path,
    from: Encoding,
    to: Encoding,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_input(input)?;
    let converted = convert(&bytes, from, to)?;
    write_output(output, &converted)?;
    Ok(())
}

/// Decodes a diff in `from` and re-encodes it in `to`.
pub fn convert(bytes: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let diff = match from {
        Encoding::Json => Diff::decode_json(std::str::from_utf8(bytes)?)?,
        Encoding::Cbor => Diff::decode_cbor(bytes)?,
    };
    tracing::debug!(from = ?from, to = ?to, bytes = bytes.len(), "converting diff");

    Ok(match to {
        Encoding::Json => {
            let mut text = quarry_codec::to_json_pretty(&diff)?;
            text.push('\n');
            text.into_bytes()
        }
        Encoding::Cbor => diff.encode_cbor()?,
    })
}
