//! Byte-to-text decoding for files read from disk.

use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding as RsEncoding, BIG5, GBK, SHIFT_JIS, WINDOWS_1252};

/// 支援的傳統多位元編碼。 / Legacy multi-byte encodings tried after UTF-8 fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyEncoding {
    Windows1252,
    ShiftJis,
    Gbk,
    Big5,
}

impl LegacyEncoding {
    fn to_rs(self) -> &'static RsEncoding {
        match self {
            LegacyEncoding::Windows1252 => WINDOWS_1252,
            LegacyEncoding::ShiftJis => SHIFT_JIS,
            LegacyEncoding::Gbk => GBK,
            LegacyEncoding::Big5 => BIG5,
        }
    }

    fn from_rs(encoding: &'static RsEncoding) -> Option<Self> {
        if encoding == WINDOWS_1252 {
            Some(LegacyEncoding::Windows1252)
        } else if encoding == SHIFT_JIS {
            Some(LegacyEncoding::ShiftJis)
        } else if encoding == GBK {
            Some(LegacyEncoding::Gbk)
        } else if encoding == BIG5 {
            Some(LegacyEncoding::Big5)
        } else {
            None
        }
    }
}

/// 將檔案位元組解碼為文字；無法辨識時回傳 `None`。 / Decodes file bytes into text, `None` when no supported encoding fits.
///
/// BOMs win, then a UTF-16 heuristic, then strict UTF-8. Anything else holding a
/// NUL byte is treated as binary; the rest goes through legacy detection.
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        return String::from_utf8(rest.to_vec()).ok();
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        return decode_utf16(rest, false);
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        return decode_utf16(rest, true);
    }
    for big_endian in [false, true] {
        if looks_like_utf16(&bytes, big_endian) {
            if let Some(text) = decode_utf16(&bytes, big_endian) {
                return Some(text);
            }
        }
    }

    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return Some(text),
        Err(err) => err.into_bytes(),
    };
    if bytes.contains(&0) {
        return None;
    }
    let legacy = detect_legacy_encoding(&bytes)?;
    decode_legacy(&bytes, legacy)
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| {
            let pair = [chunk[0], chunk[1]];
            if big_endian {
                u16::from_be_bytes(pair)
            } else {
                u16::from_le_bytes(pair)
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

fn decode_legacy(bytes: &[u8], legacy: LegacyEncoding) -> Option<String> {
    let (cow, had_errors) = legacy.to_rs().decode_without_bom_handling(bytes);
    if had_errors {
        return None;
    }
    Some(match cow {
        Cow::Borrowed(slice) => slice.to_owned(),
        Cow::Owned(string) => string,
    })
}

fn detect_legacy_encoding(bytes: &[u8]) -> Option<LegacyEncoding> {
    if bytes.is_empty() {
        return None;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    LegacyEncoding::from_rs(detector.guess(None, true))
}

fn looks_like_utf16(bytes: &[u8], big_endian: bool) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }

    let sample_len = bytes.len().min(64);
    let mut zero_count = 0;
    let mut total = 0;
    for chunk in bytes[..sample_len].chunks_exact(2) {
        let zero_byte = if big_endian { chunk[0] } else { chunk[1] };
        if zero_byte == 0 {
            zero_count += 1;
        }
        total += 1;
    }
    total > 0 && zero_count * 2 >= total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(text: &str, big_endian: bool) -> Vec<u8> {
        text.encode_utf16()
            .flat_map(|unit| {
                if big_endian {
                    unit.to_be_bytes()
                } else {
                    unit.to_le_bytes()
                }
            })
            .collect()
    }

    #[test]
    fn plain_utf8_and_bom() {
        assert_eq!(
            decode_text(b"fn main() {}\r\n".to_vec()).as_deref(),
            Some("fn main() {}\r\n")
        );
        assert_eq!(decode_text(b"\xEF\xBB\xBFhello".to_vec()).as_deref(), Some("hello"));
    }

    #[test]
    fn utf16_with_and_without_bom() {
        let mut bytes = b"\xFF\xFE".to_vec();
        bytes.extend(utf16("hi!", false));
        assert_eq!(decode_text(bytes).as_deref(), Some("hi!"));
        assert_eq!(decode_text(utf16("plain", true)).as_deref(), Some("plain"));
    }

    #[test]
    fn detects_gbk_and_shift_jis() {
        let (encoded, _, _) = GBK.encode("中文測試");
        assert_eq!(
            detect_legacy_encoding(&encoded),
            Some(LegacyEncoding::Gbk)
        );
        assert_eq!(decode_text(encoded.into_owned()).as_deref(), Some("中文測試"));

        let (encoded, _, _) = SHIFT_JIS.encode("テスト");
        assert_eq!(decode_text(encoded.into_owned()).as_deref(), Some("テスト"));
    }

    #[test]
    fn rejects_binary_and_broken_sequences() {
        assert!(decode_text(vec![0x00, 0x01, 0xFF]).is_none());
        // SHIFT_JIS lead byte 0x82 paired with 0xFF is invalid.
        assert!(decode_text(vec![0x82, 0xFF]).is_none());
    }

    #[test]
    fn empty_file_is_empty_text() {
        assert_eq!(decode_text(Vec::new()).as_deref(), Some(""));
    }
}
