//! Write batch representation
//!
//! An ordered list of mutations applied atomically by [`Engine::write`].
//! Each mutation owns (or pins) its key and value bytes, so a batch never
//! depends on the buffers it was built from.
//!
//! # Encoding
//!
//! ```text
//! ┌──────────────┬───────────────────────────────────────────────┐
//! │ Count (u32)  │ Mutation * count                              │
//! └──────────────┴───────────────────────────────────────────────┘
//!
//! Mutation:
//!   Put:    0x01 │ key_len (u32) │ key │ value_len (u32) │ value
//!   Delete: 0x00 │ key_len (u32) │ key
//! ```
//!
//! All integers are little-endian.
//!
//! [`Engine::write`]: crate::Engine::write

use std::io::{Cursor as IoCursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use quarry_core::{Error, Result, Slice};
use smallvec::SmallVec;

const TAG_DELETE: u8 = 0x00;
const TAG_PUT: u8 = 0x01;

/// A single mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set `key` to `value`
    Put {
        /// Key bytes
        key: Bytes,
        /// Value bytes
        value: Bytes,
    },
    /// Remove `key`
    Delete {
        /// Key bytes
        key: Bytes,
    },
}

impl Mutation {
    /// The key this mutation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => &key[..],
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Mutation::Put { key, value } => 1 + 4 + key.len() + 4 + value.len(),
            Mutation::Delete { key } => 1 + 4 + key.len(),
        }
    }
}

/// Ordered sequence of mutations. Single-mutation batches stay inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    mutations: SmallVec<[Mutation; 1]>,
    byte_size: usize,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put
    pub fn put(&mut self, key: Slice, value: Slice) {
        self.push(Mutation::Put {
            key: key.into_bytes(),
            value: value.into_bytes(),
        });
    }

    /// Append a delete
    pub fn delete(&mut self, key: Slice) {
        self.push(Mutation::Delete {
            key: key.into_bytes(),
        });
    }

    fn push(&mut self, mutation: Mutation) {
        self.byte_size += mutation.encoded_len();
        self.mutations.push(mutation);
    }

    /// Remove every mutation
    pub fn clear(&mut self) {
        self.mutations.clear();
        self.byte_size = 0;
    }

    /// Number of mutations
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// True when the batch holds no mutations
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Size of the encoded batch in bytes
    pub fn encoded_len(&self) -> usize {
        4 + self.byte_size
    }

    /// Mutations in application order
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    /// Fail with `BadArgument` if the batch cannot be framed as one log
    /// record. Every length prefix is at most the encoded size, so checking
    /// that one is enough.
    pub fn check_frame(&self) -> Result<()> {
        frame_len(self.encoded_len(), "write batch").map(|_| ())
    }

    /// Append the encoded batch to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.check_frame()?;
        buf.reserve(self.encoded_len());
        put_len(buf, self.mutations.len(), "mutation count")?;
        for mutation in &self.mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    buf.push(TAG_PUT);
                    put_len(buf, key.len(), "key")?;
                    buf.extend_from_slice(key);
                    put_len(buf, value.len(), "value")?;
                    buf.extend_from_slice(value);
                }
                Mutation::Delete { key } => {
                    buf.push(TAG_DELETE);
                    put_len(buf, key.len(), "key")?;
                    buf.extend_from_slice(key);
                }
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decode a batch produced by [`encode_into`](Self::encode_into).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = IoCursor::new(data);
        let count = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::corruption("write batch too short"))?;

        let mut batch = WriteBatch::new();
        for i in 0..count {
            let tag = reader
                .read_u8()
                .map_err(|_| Error::corruption(format!("write batch truncated at mutation {}", i)))?;
            let key = read_chunk(&mut reader)?;
            match tag {
                TAG_PUT => {
                    let value = read_chunk(&mut reader)?;
                    batch.push(Mutation::Put { key, value });
                }
                TAG_DELETE => batch.push(Mutation::Delete { key }),
                other => {
                    return Err(Error::corruption(format!(
                        "unknown write batch tag {:#04x}",
                        other
                    )))
                }
            }
        }

        if (reader.position() as usize) != data.len() {
            return Err(Error::corruption("trailing bytes after write batch"));
        }
        Ok(batch)
    }
}

/// Convert a length to its on-disk `u32` form.
pub(crate) fn frame_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::bad_argument(format!(
            "{} of {} bytes exceeds the {} byte limit",
            what,
            len,
            u32::MAX
        ))
    })
}

fn put_len(buf: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = frame_len(len, what)?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn read_chunk(reader: &mut IoCursor<&[u8]>) -> Result<Bytes> {
    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::corruption("write batch length prefix truncated"))? as usize;
    let remaining = reader.get_ref().len() - reader.position() as usize;
    if len > remaining {
        return Err(Error::corruption(format!(
            "write batch chunk of {} bytes exceeds remaining {}",
            len, remaining
        )));
    }
    let mut chunk = vec![0u8; len];
    reader
        .read_exact(&mut chunk)
        .map_err(|_| Error::corruption("write batch chunk truncated"))?;
    Ok(Bytes::from(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn sample() -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put(Slice::from("a"), Slice::from("1"));
        batch.delete(Slice::from("b"));
        batch.put(Slice::from(vec![0u8, 255]), Slice::from(Vec::new()));
        batch
    }

    #[test]
    fn encode_decode_preserves_order() {
        let batch = sample();
        let decoded = WriteBatch::decode(&batch.encode().unwrap()).unwrap();
        assert_eq!(decoded, batch);
        let keys: Vec<&[u8]> = decoded.iter().map(|m| m.key()).collect();
        assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &[0u8, 255][..]]);
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let batch = sample();
        assert_eq!(batch.encode().unwrap().len(), batch.encoded_len());
        assert_eq!(WriteBatch::new().encode().unwrap().len(), 4);
    }

    #[test]
    fn clear_resets_size() {
        let mut batch = sample();
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.encoded_len(), 4);
    }

    #[test]
    fn truncated_batch_is_corruption() {
        let encoded = sample().encode().unwrap();
        let err = WriteBatch::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn oversized_length_is_corruption() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.push(TAG_DELETE);
        buf.write_u32::<LittleEndian>(u32::MAX).unwrap();
        assert!(WriteBatch::decode(&buf).unwrap_err().is_corruption());
    }

    #[test]
    fn unknown_tag_is_corruption() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.push(0x7f);
        buf.write_u32::<LittleEndian>(0).unwrap();
        assert!(WriteBatch::decode(&buf).unwrap_err().is_corruption());
    }

    #[test]
    fn frame_len_accepts_u32_range() {
        assert_eq!(frame_len(0, "key").unwrap(), 0);
        assert_eq!(frame_len(u32::MAX as usize, "value").unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn frame_len_rejects_four_gib_and_more() {
        let err = frame_len(u32::MAX as usize + 1, "value").unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
        assert!(err.to_string().contains("value of 4294967296 bytes"));
    }

    #[test]
    fn ordinary_batches_fit_one_frame() {
        sample().check_frame().unwrap();
        WriteBatch::new().check_frame().unwrap();
    }
}
