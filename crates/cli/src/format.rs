//! Value → string rendering for command output.
//!
//! Values are rendered in one of three encodings:
//! - **text**: UTF-8, with invalid sequences replaced
//! - **hex**: lowercase, two digits per byte
//! - **base64**: standard alphabet with padding

use std::fmt::Write as _;

use base64::Engine as _;

/// Output encoding for values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Hex,
    Base64,
}

impl OutputFormat {
    /// Map a `--format` value. Unknown names fall back to text; clap has
    /// already restricted the choices.
    pub fn from_name(name: &str) -> Self {
        match name {
            "hex" => OutputFormat::Hex,
            "base64" => OutputFormat::Base64,
            _ => OutputFormat::Text,
        }
    }
}

/// Render raw bytes.
pub fn format_bytes(data: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => String::from_utf8_lossy(data).into_owned(),
        OutputFormat::Hex => {
            let mut out = String::with_capacity(data.len() * 2);
            for byte in data {
                let _ = write!(out, "{:02x}", byte);
            }
            out
        }
        OutputFormat::Base64 => base64::engine::general_purpose::STANDARD.encode(data),
    }
}

/// Render a lookup result: `(nil)` when absent.
pub fn format_lookup(value: Option<&[u8]>, format: OutputFormat) -> String {
    match value {
        Some(v) => format_bytes(v, format),
        None => "(nil)".to_string(),
    }
}

/// Render scanned entries, one `key<TAB>value` per line. Keys are always
/// rendered as text.
pub fn format_entries(entries: &[(Vec<u8>, Vec<u8>)], format: OutputFormat) -> String {
    if entries.is_empty() {
        return "(empty)".to_string();
    }
    entries
        .iter()
        .map(|(k, v)| {
            format!(
                "{}\t{}",
                format_bytes(k, OutputFormat::Text),
                format_bytes(v, format)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render an error with its context chain.
pub fn format_error(err: &anyhow::Error) -> String {
    format!("(error) {:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_text() {
        assert_eq!(format_bytes(b"World", OutputFormat::Text), "World");
        assert_eq!(format_bytes(&[0x66, 0xff], OutputFormat::Text), "f\u{fffd}");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_bytes(&[0x00, 0xab, 0x10], OutputFormat::Hex), "00ab10");
        assert_eq!(format_bytes(b"", OutputFormat::Hex), "");
    }

    #[test]
    fn test_format_base64() {
        assert_eq!(format_bytes(b"hello", OutputFormat::Base64), "aGVsbG8=");
    }

    #[test]
    fn test_format_nil() {
        assert_eq!(format_lookup(None, OutputFormat::Text), "(nil)");
        assert_eq!(format_lookup(Some(b""), OutputFormat::Text), "");
    }

    #[test]
    fn test_format_entries() {
        let entries = vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), vec![0xff]),
        ];
        assert_eq!(format_entries(&entries, OutputFormat::Hex), "a\t31\nb\tff");
        assert_eq!(format_entries(&[], OutputFormat::Text), "(empty)");
    }

    #[test]
    fn test_format_name() {
        assert_eq!(OutputFormat::from_name("hex"), OutputFormat::Hex);
        assert_eq!(OutputFormat::from_name("base64"), OutputFormat::Base64);
        assert_eq!(OutputFormat::from_name("text"), OutputFormat::Text);
    }
}
