//! Key/value encodings
//!
//! Keys and values are accepted as text (its UTF-8 bytes) or as raw byte
//! buffers. A [`Slice`] always owns or pins its bytes, so it stays valid after
//! the caller's original buffer is gone: text and borrowed bytes are copied,
//! owned `String`/`Vec<u8>` are moved, and a [`Bytes`] buffer is pinned by
//! reference count without copying.
//!
//! Results come back as a [`Value`]: text by default, raw bytes when the read
//! asks for them.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// Bytes handed to the database as a key or value.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Slice(Bytes);

impl Slice {
    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the underlying buffer
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Slice {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Slice {
    fn from(s: &str) -> Self {
        Slice(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<&String> for Slice {
    fn from(s: &String) -> Self {
        Slice::from(s.as_str())
    }
}

impl From<String> for Slice {
    fn from(s: String) -> Self {
        Slice(Bytes::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Slice {
    fn from(b: &[u8]) -> Self {
        Slice(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Slice {
    fn from(b: &[u8; N]) -> Self {
        Slice(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Slice {
    fn from(v: Vec<u8>) -> Self {
        Slice(Bytes::from(v))
    }
}

impl From<&Vec<u8>> for Slice {
    fn from(v: &Vec<u8>) -> Self {
        Slice(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for Slice {
    fn from(b: Bytes) -> Self {
        Slice(b)
    }
}

impl From<&Bytes> for Slice {
    fn from(b: &Bytes) -> Self {
        Slice(b.clone())
    }
}

impl From<Slice> for Bytes {
    fn from(s: Slice) -> Self {
        s.0
    }
}

/// A key or value delivered back to the caller.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Decoded as UTF-8 (invalid sequences replaced)
    Text(String),
    /// Raw bytes
    Bytes(Bytes),
}

impl Value {
    /// Wrap raw engine output in the encoding the caller asked for.
    pub fn from_raw(raw: Vec<u8>, as_buffer: bool) -> Self {
        if as_buffer {
            return Value::Bytes(Bytes::from(raw));
        }
        match String::from_utf8(raw) {
            Ok(s) => Value::Text(s),
            Err(e) => Value::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        }
    }

    /// The value's bytes, whichever encoding it carries
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Bytes(b) => &b[..],
        }
    }

    /// The text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            Value::Bytes(_) => None,
        }
    }

    /// True for raw-bytes values
    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    /// Consume into owned bytes
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Value::Text(s) => s.into_bytes(),
            Value::Bytes(b) => b.to_vec(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
        }
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn text_and_bytes_encode_identically() {
        let from_text = Slice::from("Hello");
        let from_bytes = Slice::from(&b"Hello"[..]);
        let from_vec = Slice::from(b"Hello".to_vec());
        assert_eq!(from_text, from_bytes);
        assert_eq!(from_text, from_vec);
        assert_eq!(from_text.as_bytes(), b"Hello");
    }

    #[test]
    fn bytes_are_pinned_not_copied() {
        let buf = Bytes::from(vec![1u8, 2, 3]);
        let slice = Slice::from(&buf);
        assert_eq!(slice.as_bytes().as_ptr(), buf.as_ptr());
    }

    #[test]
    fn borrowed_text_is_copied() {
        let text = String::from("key");
        let slice = Slice::from(&text);
        drop(text);
        assert_eq!(&*slice, b"key");
    }

    #[test]
    fn value_from_raw_text() {
        let value = Value::from_raw(b"World".to_vec(), false);
        assert_eq!(value, "World");
        assert!(!value.is_bytes());
    }

    #[test]
    fn value_from_raw_bytes() {
        let value = Value::from_raw(vec![0, 159, 146, 150], true);
        assert!(value.is_bytes());
        assert_eq!(value.as_bytes(), &[0, 159, 146, 150]);
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn invalid_utf8_as_text_is_lossy() {
        let value = Value::from_raw(vec![b'a', 0xff, b'b'], false);
        assert_eq!(value.as_str(), Some("a\u{fffd}b"));
    }

    #[test]
    fn into_vec_round_trips_bytes() {
        let value = Value::from_raw(b"xyz".to_vec(), true);
        assert_eq!(value.into_vec(), b"xyz".to_vec());
    }

    proptest! {
        #[test]
        fn buffers_preserve_every_byte(raw in prop::collection::vec(any::<u8>(), 0..256)) {
            let value = Value::from_raw(raw.clone(), true);
            prop_assert_eq!(value.as_bytes(), &raw[..]);
            let slice = Slice::from(raw.clone());
            prop_assert_eq!(slice.as_bytes(), &raw[..]);
        }

        #[test]
        fn valid_text_decodes_unchanged(text in "\\PC*") {
            let value = Value::from_raw(text.clone().into_bytes(), false);
            prop_assert_eq!(value.as_str(), Some(text.as_str()));
        }
    }
}
