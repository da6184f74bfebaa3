//! Log file and record format.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (8 bytes)              │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Flags (1)    │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! `Length` counts the payload only. The CRC covers flags and payload. The
//! payload is an encoded [`WriteBatch`], zstd-compressed when flag bit 0 is set.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use quarry_core::{Compression, Error, Result};
use tracing::warn;

use crate::batch::{frame_len, WriteBatch};

/// Magic bytes identifying a log file: "QRYL"
pub const LOG_MAGIC: [u8; 4] = *b"QRYL";

/// Current log format version
pub const LOG_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 8;

/// Bytes of framing around each payload (length + flags + crc)
pub const RECORD_OVERHEAD: usize = 4 + 1 + 4;

/// Payloads smaller than this are never compressed
pub const COMPRESSION_THRESHOLD: usize = 256;

const FLAG_ZSTD: u8 = 0x01;
const ZSTD_LEVEL: i32 = 3;

/// Serialize the file header.
pub fn file_header() -> [u8; FILE_HEADER_SIZE] {
    let mut bytes = [0u8; FILE_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&LOG_MAGIC);
    LittleEndian::write_u32(&mut bytes[4..8], LOG_FORMAT_VERSION);
    bytes
}

/// Validate the header at the start of `data`.
pub fn check_file_header(data: &[u8]) -> Result<()> {
    if data.len() < FILE_HEADER_SIZE {
        return Err(Error::corruption("log file header truncated"));
    }
    if data[0..4] != LOG_MAGIC {
        return Err(Error::corruption("log file has invalid magic bytes"));
    }
    let version = LittleEndian::read_u32(&data[4..8]);
    if version != LOG_FORMAT_VERSION {
        return Err(Error::corruption(format!(
            "unsupported log format version {}",
            version
        )));
    }
    Ok(())
}

fn checksum(flags: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[flags]);
    hasher.update(payload);
    hasher.finalize()
}

/// Frame an encoded batch as a log record, compressing per `compression`.
///
/// Fails with `BadArgument` when the batch is too large to frame.
pub fn encode_record(batch: &WriteBatch, compression: Compression) -> Result<Vec<u8>> {
    let raw = batch.encode()?;
    let (flags, payload) = match compression {
        Compression::Zstd if raw.len() >= COMPRESSION_THRESHOLD => {
            match zstd::bulk::compress(&raw, ZSTD_LEVEL) {
                Ok(compressed) if compressed.len() < raw.len() => (FLAG_ZSTD, compressed),
                Ok(_) => (0, raw),
                Err(e) => {
                    warn!(target: "quarry::storage", error = %e, "zstd compression failed, storing record uncompressed");
                    (0, raw)
                }
            }
        }
        _ => (0, raw),
    };

    let payload_len = frame_len(payload.len(), "record payload")?;
    let mut record = Vec::with_capacity(payload.len() + RECORD_OVERHEAD);
    let mut len = [0u8; 4];
    LittleEndian::write_u32(&mut len, payload_len);
    record.extend_from_slice(&len);
    record.push(flags);
    record.extend_from_slice(&payload);
    let mut crc = [0u8; 4];
    LittleEndian::write_u32(&mut crc, checksum(flags, &payload));
    record.extend_from_slice(&crc);
    Ok(record)
}

fn decode_payload(flags: u8, payload: &[u8]) -> Result<WriteBatch> {
    if flags & !FLAG_ZSTD != 0 {
        return Err(Error::corruption(format!("unknown record flags {:#04x}", flags)));
    }
    if flags & FLAG_ZSTD != 0 {
        let raw = zstd::stream::decode_all(payload)
            .map_err(|e| Error::corruption(format!("record decompression failed: {}", e)))?;
        WriteBatch::decode(&raw)
    } else {
        WriteBatch::decode(payload)
    }
}

/// Result of scanning a log image.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Intact batches, in log order
    pub batches: Vec<WriteBatch>,
    /// Byte offset just past the last well-framed record
    pub valid_len: u64,
    /// Records skipped because their checksum or payload was bad
    pub dropped: usize,
    /// Bytes after `valid_len` that do not form a complete record
    pub torn_tail: u64,
    /// First problem seen, for diagnostics
    pub first_error: Option<String>,
}

impl LogScan {
    /// True when every byte of the log was accounted for by intact records
    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.torn_tail == 0
    }
}

/// Scan a complete log image (header included).
///
/// A record whose frame fits inside the image but whose checksum or payload
/// is bad is skipped and counted in `dropped`; scanning continues after it.
/// A frame that runs past the end of the image ends the scan as a torn tail.
pub fn scan_log(data: &[u8]) -> Result<LogScan> {
    check_file_header(data)?;

    let mut scan = LogScan {
        valid_len: FILE_HEADER_SIZE as u64,
        ..LogScan::default()
    };
    let mut offset = FILE_HEADER_SIZE;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < RECORD_OVERHEAD {
            break;
        }
        let len = LittleEndian::read_u32(&data[offset..offset + 4]) as usize;
        if len > remaining - RECORD_OVERHEAD {
            break;
        }
        let flags = data[offset + 4];
        let payload = &data[offset + 5..offset + 5 + len];
        let stored_crc = LittleEndian::read_u32(&data[offset + 5 + len..offset + 9 + len]);
        let end = offset + RECORD_OVERHEAD + len;

        if stored_crc != checksum(flags, payload) {
            scan.dropped += 1;
            scan.first_error
                .get_or_insert_with(|| format!("checksum mismatch in record at offset {}", offset));
        } else {
            match decode_payload(flags, payload) {
                Ok(batch) => scan.batches.push(batch),
                Err(e) => {
                    scan.dropped += 1;
                    scan.first_error
                        .get_or_insert_with(|| format!("record at offset {}: {}", offset, e));
                }
            }
        }
        offset = end;
        scan.valid_len = end as u64;
    }

    scan.torn_tail = (data.len() as u64) - scan.valid_len;
    if scan.torn_tail > 0 {
        scan.first_error.get_or_insert_with(|| {
            format!(
                "{} bytes of incomplete record at offset {}",
                scan.torn_tail, scan.valid_len
            )
        });
    }
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Slice;

    fn batch(key: &str, value: &str) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put(Slice::from(key), Slice::from(value));
        batch
    }

    fn image(records: &[Vec<u8>]) -> Vec<u8> {
        let mut data = file_header().to_vec();
        for record in records {
            data.extend_from_slice(record);
        }
        data
    }

    #[test]
    fn header_round_trip() {
        check_file_header(&file_header()).unwrap();
        let mut bad = file_header();
        bad[0] = b'X';
        assert!(check_file_header(&bad).unwrap_err().is_corruption());
    }

    #[test]
    fn scan_reads_records_in_order() {
        let data = image(&[
            encode_record(&batch("a", "1"), Compression::None).unwrap(),
            encode_record(&batch("b", "2"), Compression::Zstd).unwrap(),
        ]);
        let scan = scan_log(&data).unwrap();
        assert!(scan.is_clean());
        assert_eq!(scan.batches.len(), 2);
        assert_eq!(scan.batches[1], batch("b", "2"));
        assert_eq!(scan.valid_len, data.len() as u64);
    }

    #[test]
    fn large_records_are_compressed() {
        let big = "x".repeat(4096);
        let record = encode_record(&batch("k", &big), Compression::Zstd).unwrap();
        assert!(record.len() < 4096);
        assert_eq!(record[4], FLAG_ZSTD);

        let scan = scan_log(&image(&[record])).unwrap();
        assert_eq!(scan.batches[0], batch("k", &big));
    }

    #[test]
    fn compression_none_stores_verbatim() {
        let big = "x".repeat(4096);
        let record = encode_record(&batch("k", &big), Compression::None).unwrap();
        assert_eq!(record[4], 0);
        assert!(record.len() > 4096);
    }

    #[test]
    fn checksum_mismatch_is_skipped() {
        let mut middle = encode_record(&batch("b", "2"), Compression::None).unwrap();
        let last = middle.len() - 5;
        middle[last] ^= 0xff;
        let data = image(&[
            encode_record(&batch("a", "1"), Compression::None).unwrap(),
            middle,
            encode_record(&batch("c", "3"), Compression::None).unwrap(),
        ]);
        let scan = scan_log(&data).unwrap();
        assert_eq!(scan.dropped, 1);
        assert_eq!(scan.torn_tail, 0);
        assert_eq!(scan.batches, vec![batch("a", "1"), batch("c", "3")]);
        assert!(scan.first_error.unwrap().contains("checksum"));
    }

    #[test]
    fn torn_tail_is_reported() {
        let second = encode_record(&batch("b", "2"), Compression::None).unwrap();
        let mut data = image(&[encode_record(&batch("a", "1"), Compression::None).unwrap()]);
        let intact = data.len() as u64;
        data.extend_from_slice(&second[..second.len() - 3]);

        let scan = scan_log(&data).unwrap();
        assert_eq!(scan.batches.len(), 1);
        assert_eq!(scan.valid_len, intact);
        assert_eq!(scan.torn_tail, (second.len() - 3) as u64);
        assert!(!scan.is_clean());
    }
}
