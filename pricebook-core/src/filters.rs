//! Stream decoding for the filters found in text-bearing PDFs.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::PdfReadError;
use crate::objects::{Dictionary, PdfObject};

/// Decode a stream body by applying its `/Filter` chain in order.
///
/// `/DecodeParms` predictors are honored for `FlateDecode`, which is how
/// cross-reference streams are normally stored.
pub fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>, PdfReadError> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None => return Ok(data.to_vec()),
        Some(PdfObject::Name(n)) => vec![n.as_str()],
        Some(PdfObject::Array(items)) => items.iter().filter_map(PdfObject::as_name).collect(),
        Some(_) => return Err(PdfReadError::UnsupportedFilter("(non-name)".into())),
    };
    let params: Vec<Option<&Dictionary>> = match dict.get("DecodeParms") {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(items)) => items.iter().map(PdfObject::as_dict).collect(),
        _ => Vec::new(),
    };

    let mut buf = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let parms = params.get(i).copied().flatten();
        buf = match *filter {
            "FlateDecode" | "Fl" => {
                let inflated = inflate(&buf)?;
                match parms {
                    Some(p) => apply_predictor(p, inflated)?,
                    None => inflated,
                }
            }
            "ASCIIHexDecode" | "AHx" => ascii_hex_decode(&buf),
            "ASCII85Decode" | "A85" => ascii85_decode(&buf)?,
            other => return Err(PdfReadError::UnsupportedFilter(other.to_string())),
        };
    }
    Ok(buf)
}

/// Inflate zlib data. Output decoded before a corrupt tail is kept, since
/// many producers pad or truncate the final block.
fn inflate(data: &[u8]) -> Result<Vec<u8>, PdfReadError> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(e) if !out.is_empty() => {
            tracing::debug!(error = %e, decoded = out.len(), "keeping partially inflated stream");
            Ok(out)
        }
        Err(e) => Err(PdfReadError::Decompress(e.to_string())),
    }
}

fn ascii_hex_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        let Some(nibble) = (b as char).to_digit(16) else {
            continue;
        };
        match high.take() {
            Some(h) => out.push(h << 4 | nibble as u8),
            None => high = Some(nibble as u8),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    out
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>, PdfReadError> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut n = 0;
    let body = data.strip_prefix(b"<~").unwrap_or(data);
    for &b in body {
        match b {
            b'~' => break,
            b'z' if n == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[n] = b - b'!';
                n += 1;
                if n == 5 {
                    out.extend_from_slice(&ascii85_group(&group)?);
                    n = 0;
                }
            }
            b if b.is_ascii_whitespace() => {}
            _ => return Err(PdfReadError::Decompress("invalid ASCII85 character".into())),
        }
    }
    if n == 1 {
        return Err(PdfReadError::Decompress("truncated ASCII85 group".into()));
    }
    if n > 1 {
        // Pad a partial group with 'u' and keep n - 1 output bytes.
        for slot in group.iter_mut().skip(n) {
            *slot = b'u' - b'!';
        }
        let bytes = ascii85_group(&group)?;
        out.extend_from_slice(&bytes[..n - 1]);
    }
    Ok(out)
}

fn ascii85_group(group: &[u8; 5]) -> Result<[u8; 4], PdfReadError> {
    let value = group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(u32::from(d)))
        .ok_or_else(|| PdfReadError::Decompress("ASCII85 group overflow".into()))?;
    Ok(value.to_be_bytes())
}

/// Undo a TIFF (2) or PNG (10..=15) predictor.
fn apply_predictor(parms: &Dictionary, data: Vec<u8>) -> Result<Vec<u8>, PdfReadError> {
    let predictor = parms.get_i64("Predictor").unwrap_or(1);
    if predictor < 2 {
        return Ok(data);
    }
    let colors = predictor_param(parms, "Colors", 1)?;
    let bpc = predictor_param(parms, "BitsPerComponent", 8)?;
    let columns = predictor_param(parms, "Columns", 1)?;
    let overflow = || PdfReadError::Decompress("predictor row size overflows".into());
    let pixel_bits = colors.checked_mul(bpc).ok_or_else(overflow)?;
    let bpp = pixel_bits.div_ceil(8).max(1);
    let row_len = pixel_bits
        .checked_mul(columns)
        .ok_or_else(overflow)?
        .div_ceil(8);
    if row_len > data.len() {
        return Err(PdfReadError::Decompress(format!(
            "predictor row of {row_len} bytes exceeds the {}-byte stream",
            data.len()
        )));
    }

    if predictor == 2 {
        if bpc != 8 {
            return Err(PdfReadError::Decompress(format!(
                "TIFF predictor with {bpc} bits per component"
            )));
        }
        let mut out = data;
        for row in out.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(out);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (&kind, encoded) = chunk
            .split_first()
            .ok_or_else(|| PdfReadError::Decompress("empty predictor row".into()))?;
        let mut row = encoded.to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PdfReadError::Decompress(format!(
                        "unknown PNG predictor row type {other}"
                    )))
                }
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn predictor_param(parms: &Dictionary, key: &str, default: i64) -> Result<usize, PdfReadError> {
    let value = parms.get_i64(key).unwrap_or(default).max(1);
    usize::try_from(value).map_err(|_| PdfReadError::Decompress(format!("/{key} {value} out of range")))
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn dict(entries: Vec<(&str, PdfObject)>) -> Dictionary {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn unfiltered_stream_is_returned_as_is() {
        let out = decode_stream(&Dictionary::new(), b"BT ET").unwrap();
        assert_eq!(out, b"BT ET");
    }

    #[test]
    fn flate_decode() {
        let d = dict(vec![("Filter", PdfObject::Name("FlateDecode".into()))]);
        let out = decode_stream(&d, &deflate(b"BT (Hello) Tj ET")).unwrap();
        assert_eq!(out, b"BT (Hello) Tj ET");
    }

    #[test]
    fn flate_garbage_is_an_error() {
        let d = dict(vec![("Filter", PdfObject::Name("FlateDecode".into()))]);
        let err = decode_stream(&d, b"definitely not zlib").unwrap_err();
        assert!(matches!(err, PdfReadError::Decompress(_)));
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let d = dict(vec![("Filter", PdfObject::Name("JBIG2Decode".into()))]);
        assert_eq!(
            decode_stream(&d, b"").unwrap_err(),
            PdfReadError::UnsupportedFilter("JBIG2Decode".into())
        );
    }

    #[test]
    fn ascii_hex_then_flate_chain() {
        let hex: String = deflate(b"(chained) Tj")
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        let d = dict(vec![(
            "Filter",
            PdfObject::Array(vec![
                PdfObject::Name("ASCIIHexDecode".into()),
                PdfObject::Name("FlateDecode".into()),
            ]),
        )]);
        let out = decode_stream(&d, format!("{hex}>").as_bytes()).unwrap();
        assert_eq!(out, b"(chained) Tj");
    }

    #[test]
    fn ascii85_decode_known_value() {
        // "Man " encodes to "9jqo^", "sure" to "F*2M7"; "z" is four zero bytes.
        assert_eq!(ascii85_decode(b"9jqo^F*2M7z~>").unwrap(), b"Man sure\0\0\0\0");
    }

    #[test]
    fn ascii85_partial_group() {
        // "Ma" encodes to "9jn".
        assert_eq!(ascii85_decode(b"<~9jn~>").unwrap(), b"Ma");
    }

    #[test]
    fn png_up_predictor() {
        let parms = dict(vec![
            ("Predictor", PdfObject::Integer(12)),
            ("Columns", PdfObject::Integer(3)),
        ]);
        // Row 1: None filter; row 2: Up filter with deltas of 1.
        let encoded = vec![0, 10, 20, 30, 2, 1, 1, 1];
        let out = apply_predictor(&parms, encoded).unwrap();
        assert_eq!(out, vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn png_sub_and_paeth_predictors() {
        let parms = dict(vec![
            ("Predictor", PdfObject::Integer(15)),
            ("Columns", PdfObject::Integer(3)),
        ]);
        let encoded = vec![1, 5, 1, 1, 4, 0, 0, 0];
        let out = apply_predictor(&parms, encoded).unwrap();
        // Sub: 5, 6, 7. Paeth with zero deltas copies the row above.
        assert_eq!(out, vec![5, 6, 7, 5, 6, 7]);
    }

    #[test]
    fn oversized_predictor_row_is_an_error() {
        let parms = dict(vec![
            ("Predictor", PdfObject::Integer(12)),
            ("Colors", PdfObject::Integer(4)),
            ("Columns", PdfObject::Integer(1 << 62)),
        ]);
        assert!(matches!(
            apply_predictor(&parms, vec![2, 0, 0, 0, 0]),
            Err(PdfReadError::Decompress(_))
        ));

        let parms = dict(vec![
            ("Predictor", PdfObject::Integer(12)),
            ("Columns", PdfObject::Integer(1_000_000)),
        ]);
        assert!(matches!(
            apply_predictor(&parms, vec![2, 1, 1, 1]),
            Err(PdfReadError::Decompress(_))
        ));
    }

    #[test]
    fn hostile_decode_parms_fail_through_decode_stream() {
        let mut parms = Dictionary::new();
        parms.insert("Predictor", PdfObject::Integer(12));
        parms.insert("Colors", PdfObject::Integer(4));
        parms.insert("Columns", PdfObject::Integer(4_611_686_018_427_387_904));
        let d = dict(vec![
            ("Filter", PdfObject::Name("FlateDecode".into())),
            ("DecodeParms", PdfObject::Dictionary(parms)),
        ]);
        assert!(matches!(
            decode_stream(&d, &deflate(&[2, 0, 0, 0, 0])),
            Err(PdfReadError::Decompress(_))
        ));
    }
}
