use anyhow::{bail, Context, Result};

/// Decode URL-encoded bytes (percent-encoding)
///
/// `info_hash` and `peer_id` arrive as raw binary escaped with `%XX`, so the
/// result is bytes rather than a string. `+` is kept as the literal byte 0x2b;
/// clients escape a real space as `%20`.
pub fn url_decode(encoded: &str) -> Result<Vec<u8>> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let pair = bytes
                    .get(i + 1..i + 3)
                    .context("Incomplete percent-encoding")?;
                let mut byte = [0u8; 1];
                hex::decode_to_slice(pair, &mut byte)
                    .context("Invalid hex digits in percent-encoding")?;
                decoded.push(byte[0]);
                i += 3;
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    Ok(decoded)
}

/// Decode a scrape `info_hash` value.
///
/// A 40-character hex string is taken as hex; anything else is percent-decoded
/// as raw bytes. The result must be exactly 20 bytes.
pub fn decode_info_hash_param(value: &str) -> Result<[u8; 20]> {
    if value.len() == 40 {
        let mut out = [0u8; 20];
        if hex::decode_to_slice(value, &mut out).is_ok() {
            return Ok(out);
        }
    }

    let raw = url_decode(value)?;
    match <[u8; 20]>::try_from(raw.as_slice()) {
        Ok(out) => Ok(out),
        Err(_) => bail!("info_hash must be 20 bytes, got {}", raw.len()),
    }
}
