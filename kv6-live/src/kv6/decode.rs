//! Payload decoding.
//!
//! The feed does not reliably tell us how a payload is encoded: most frames
//! are gzip-compressed UTF-8 XML, but some publishers send zlib streams,
//! raw deflate, UTF-16, or plain text with junk in front. `decode_payload`
//! tries each possibility in a fixed order and always returns some text.

use std::borrow::Cow;
use std::io::Read;

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};

/// Root elements (or the XML declaration) we expect in a KV6 payload.
pub const MARKERS: [&str; 3] = ["<VV_TM_PUSH", "<KV6posinfo", "<?xml"];

/// Upper bound on decompressed size, against decompression bombs.
const MAX_INFLATED_BYTES: u64 = 32 * 1024 * 1024;

/// Strict text encodings tried in order when the payload is not compressed.
const TEXT_ENCODINGS: [&Encoding; 3] = [UTF_8, UTF_16LE, UTF_16BE];

/// Compression detected on a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zlib,
    /// Raw deflate with no header, found by trying it blind.
    Deflate,
}

/// How the (decompressed) bytes were turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMethod {
    /// Decoded without errors in the named encoding and contains a marker.
    Strict(&'static str),
    /// Single-byte decode, cut at the first marker.
    MarkerScan,
    /// Single-byte decode of everything; no marker was found.
    Lossy,
}

/// Result of decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub text: String,
    pub compression: Option<Compression>,
    pub method: TextMethod,
}

impl DecodedPayload {
    /// Whether the text is likely to hold KV6 markup.
    pub fn has_marker(&self) -> bool {
        self.method != TextMethod::Lossy
    }
}

/// Decode an opaque payload into text. Never fails.
///
/// # Examples
///
/// ```
/// use kv6_live::kv6::decode_payload;
///
/// let decoded = decode_payload(b"\x81\x00<KV6posinfo/>");
/// assert_eq!(decoded.text, "<KV6posinfo/>");
/// assert!(decoded.has_marker());
///
/// let junk = decode_payload(&[0xff, 0xfe, 0x00]);
/// assert!(!junk.has_marker());
/// ```
pub fn decode_payload(bytes: &[u8]) -> DecodedPayload {
    if is_gzip(bytes)
        && let Some(inflated) = inflate(MultiGzDecoder::new(bytes))
    {
        return with_compression(decode_text(&inflated), Compression::Gzip);
    }

    if is_zlib(bytes)
        && let Some(inflated) = inflate(ZlibDecoder::new(bytes))
    {
        return with_compression(decode_text(&inflated), Compression::Zlib);
    }

    if let Some(inflated) = inflate(DeflateDecoder::new(bytes))
        && !inflated.is_empty()
    {
        let decoded = decode_text(&inflated);
        if decoded.has_marker() {
            return with_compression(decoded, Compression::Deflate);
        }
    }

    decode_text(bytes)
}

/// Steps that apply to uncompressed bytes: strict encodings, then a marker
/// scan over a single-byte decode, then the whole single-byte decode.
fn decode_text(bytes: &[u8]) -> DecodedPayload {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes)
        && let Some(text) = strict_decode(encoding, &bytes[bom_len..])
        && contains_marker(&text)
    {
        return text_payload(text.into_owned(), TextMethod::Strict(encoding.name()));
    }

    for encoding in TEXT_ENCODINGS {
        if let Some(text) = strict_decode(encoding, bytes)
            && contains_marker(&text)
        {
            return text_payload(text.into_owned(), TextMethod::Strict(encoding.name()));
        }
    }

    let (lossy, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    match first_marker(&lossy) {
        Some(start) => text_payload(lossy[start..].to_string(), TextMethod::MarkerScan),
        None => text_payload(lossy.into_owned(), TextMethod::Lossy),
    }
}

fn strict_decode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}

fn text_payload(text: String, method: TextMethod) -> DecodedPayload {
    DecodedPayload {
        text,
        compression: None,
        method,
    }
}

fn with_compression(mut decoded: DecodedPayload, compression: Compression) -> DecodedPayload {
    decoded.compression = Some(compression);
    decoded
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x1f, 0x8b])
}

/// A zlib header: deflate method, window <= 32K, and a valid check value.
fn is_zlib(bytes: &[u8]) -> bool {
    match bytes {
        [cmf, flg, ..] => {
            cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(*cmf) * 256 + u16::from(*flg)) % 31 == 0
        }
        _ => false,
    }
}

fn inflate(decoder: impl Read) -> Option<Vec<u8>> {
    inflate_at_most(decoder, MAX_INFLATED_BYTES)
}

/// Inflate the whole stream, or `None` if it errors or exceeds `limit`.
fn inflate_at_most(decoder: impl Read, limit: u64) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    decoder.take(limit + 1).read_to_end(&mut out).ok()?;
    (out.len() as u64 <= limit).then_some(out)
}

fn contains_marker(text: &str) -> bool {
    MARKERS.iter().any(|m| text.contains(m))
}

fn first_marker(text: &str) -> Option<usize> {
    MARKERS.iter().filter_map(|m| text.find(m)).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use std::io::Write;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><VV_TM_PUSH><KV6posinfo><ONSTOP><vehiclenumber>4021</vehiclenumber></ONSTOP></KV6posinfo></VV_TM_PUSH>"#;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn utf16be(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    #[test]
    fn gzip_recovers_text() {
        let decoded = decode_payload(&gzip(XML.as_bytes()));
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.compression, Some(Compression::Gzip));
        assert_eq!(decoded.method, TextMethod::Strict("UTF-8"));
    }

    #[test]
    fn every_gzip_member_is_inflated() {
        let (head, tail) = XML.split_at(40);
        let mut bytes = gzip(head.as_bytes());
        bytes.extend(gzip(tail.as_bytes()));

        let decoded = decode_payload(&bytes);
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.compression, Some(Compression::Gzip));
    }

    #[test]
    fn oversized_stream_is_rejected() {
        let len = XML.len() as u64;
        let compressed = gzip(XML.as_bytes());

        let fits = inflate_at_most(MultiGzDecoder::new(&compressed[..]), len);
        assert_eq!(fits.as_deref(), Some(XML.as_bytes()));
        assert!(inflate_at_most(MultiGzDecoder::new(&compressed[..]), len - 1).is_none());
    }

    #[test]
    fn zlib_recovers_text() {
        let decoded = decode_payload(&zlib(XML.as_bytes()));
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.compression, Some(Compression::Zlib));
    }

    #[test]
    fn raw_deflate_recovers_text() {
        let decoded = decode_payload(&deflate(XML.as_bytes()));
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.compression, Some(Compression::Deflate));
    }

    #[test]
    fn plain_utf8() {
        let decoded = decode_payload(XML.as_bytes());
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.compression, None);
        assert_eq!(decoded.method, TextMethod::Strict("UTF-8"));
    }

    #[test]
    fn utf16_without_bom() {
        let decoded = decode_payload(&utf16le(XML));
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.method, TextMethod::Strict("UTF-16LE"));

        let decoded = decode_payload(&utf16be(XML));
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.method, TextMethod::Strict("UTF-16BE"));
    }

    #[test]
    fn utf16_with_bom() {
        let mut bytes = vec![0xff, 0xfe];
        bytes.extend(utf16le(XML));
        let decoded = decode_payload(&bytes);
        assert_eq!(decoded.text, XML);
        assert_eq!(decoded.method, TextMethod::Strict("UTF-16LE"));
    }

    #[test]
    fn leading_junk_is_cut_at_marker() {
        let mut bytes = vec![0x00, 0xff, 0xc3, 0x28];
        bytes.extend_from_slice(b"<KV6posinfo><ARRIVAL/></KV6posinfo>");
        let decoded = decode_payload(&bytes);
        assert_eq!(decoded.text, "<KV6posinfo><ARRIVAL/></KV6posinfo>");
        assert_eq!(decoded.method, TextMethod::MarkerScan);
    }

    #[test]
    fn earliest_marker_wins() {
        let mut bytes = vec![0xff];
        bytes.extend_from_slice(b"<VV_TM_PUSH><KV6posinfo/></VV_TM_PUSH>");
        let decoded = decode_payload(&bytes);
        assert!(decoded.text.starts_with("<VV_TM_PUSH>"));
    }

    #[test]
    fn no_marker_is_lossy() {
        let decoded = decode_payload(&[0x81, 0xe9, 0x41]);
        assert_eq!(decoded.method, TextMethod::Lossy);
        assert!(!decoded.has_marker());
        assert_eq!(decoded.text, "\u{81}éA");
    }

    #[test]
    fn empty_input() {
        let decoded = decode_payload(&[]);
        assert_eq!(decoded.text, "");
        assert!(!decoded.has_marker());
    }

    #[test]
    fn truncated_gzip_falls_through() {
        let mut bytes = gzip(XML.as_bytes());
        bytes.truncate(12);
        let decoded = decode_payload(&bytes);
        assert_eq!(decoded.compression, None);
        assert!(!decoded.has_marker());
    }

    #[test]
    fn zlib_header_check() {
        assert!(is_zlib(&[0x78, 0x9c]));
        assert!(is_zlib(&[0x78, 0x01]));
        assert!(is_zlib(&[0x78, 0xda]));
        assert!(!is_zlib(&[0x78, 0x00]));
        assert!(!is_zlib(b"<?"));
        assert!(!is_zlib(&[0x78]));
    }
}
