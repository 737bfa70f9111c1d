//! Segment record types.
//!
//! ```text
//! | len u32 | pkey u64 | lineage u64 | flags u8 | payload | crc32 u32 |
//! ```
//!
//! `len` covers the whole record including itself and the checksum. The
//! CRC is computed over every byte before it.

use crate::error::{CoreError, CoreResult};
use crate::types::Pkey;

/// Flags for segment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRecordFlags(u8);

impl SegmentRecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record is a tombstone (row deleted).
    pub const TOMBSTONE: Self = Self(0x01);

    /// Creates new flags from raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One version of a row as stored in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Pkey of this version.
    pub pkey: Pkey,
    /// Pkey of the first version of the logical row.
    pub lineage: Pkey,
    /// Record flags.
    pub flags: SegmentRecordFlags,
    /// Encoded row, empty for tombstones.
    pub payload: Vec<u8>,
}

impl SegmentRecord {
    /// len (4) + pkey (8) + lineage (8) + flags (1)
    pub(crate) const HEADER_SIZE: usize = 21;
    /// CRC size.
    pub(crate) const CRC_SIZE: usize = 4;
    /// Smallest valid encoded record.
    pub(crate) const MIN_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Creates a live record version.
    #[must_use]
    pub fn put(pkey: Pkey, lineage: Pkey, payload: Vec<u8>) -> Self {
        Self {
            pkey,
            lineage,
            flags: SegmentRecordFlags::NONE,
            payload,
        }
    }

    /// Creates a tombstone ending `lineage`.
    #[must_use]
    pub fn tombstone(pkey: Pkey, lineage: Pkey) -> Self {
        Self {
            pkey,
            lineage,
            flags: SegmentRecordFlags::TOMBSTONE,
            payload: Vec::new(),
        }
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Encodes the record to bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let record_len = self.encoded_size();
        let len = u32::try_from(record_len)
            .map_err(|_| CoreError::invalid_operation("record larger than 4 GiB"))?;
        let mut buf = Vec::with_capacity(record_len);

        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.pkey.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.lineage.as_u64().to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        Ok(buf)
    }

    /// Reads the length prefix of the record starting at `data[0]`.
    #[must_use]
    pub(crate) fn peek_len(data: &[u8]) -> Option<usize> {
        let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes) as usize)
    }

    /// Decodes a record from bytes.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let record_len = Self::peek_len(data)
            .ok_or_else(|| CoreError::segment_corruption("record too short"))?;
        if record_len < Self::MIN_SIZE {
            return Err(CoreError::segment_corruption(format!(
                "record length {record_len} below minimum"
            )));
        }
        if data.len() < record_len {
            return Err(CoreError::segment_corruption("incomplete record"));
        }

        let body = &data[..record_len - Self::CRC_SIZE];
        let stored_crc = u32::from_le_bytes(read_array(data, record_len - Self::CRC_SIZE));
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        Ok(Self {
            pkey: Pkey::new(u64::from_le_bytes(read_array(data, 4))),
            lineage: Pkey::new(u64::from_le_bytes(read_array(data, 12))),
            flags: SegmentRecordFlags::from_byte(data[20]),
            payload: body[Self::HEADER_SIZE..].to_vec(),
        })
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CRC_SIZE
    }
}

/// Copies `N` bytes at `at`; callers have checked the bounds.
pub(crate) fn read_array<const N: usize>(data: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[at..at + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_record_roundtrip() {
        let record = SegmentRecord::put(Pkey::new(42), Pkey::new(7), vec![0xCA, 0xFE, 0xBA, 0xBE]);

        let encoded = record.encode().unwrap();
        let decoded = SegmentRecord::decode(&encoded).unwrap();

        assert_eq!(record, decoded);
        assert!(!decoded.is_tombstone());
    }

    #[test]
    fn tombstone_record_roundtrip() {
        let record = SegmentRecord::tombstone(Pkey::new(100), Pkey::new(3));
        assert!(record.is_tombstone());

        let decoded = SegmentRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(record, decoded);
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn detect_corruption() {
        let record = SegmentRecord::put(Pkey::new(1), Pkey::new(1), vec![1, 2, 3]);

        let mut encoded = record.encode().unwrap();
        encoded[10] ^= 0xFF;

        let result = SegmentRecord::decode(&encoded);
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn short_and_incomplete_records_are_rejected() {
        let encoded = SegmentRecord::put(Pkey::new(1), Pkey::new(1), vec![9; 8])
            .encode()
            .unwrap();
        assert!(matches!(
            SegmentRecord::decode(&encoded[..2]),
            Err(CoreError::SegmentCorruption { .. })
        ));
        assert!(matches!(
            SegmentRecord::decode(&encoded[..encoded.len() - 1]),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }

    #[test]
    fn encoded_size() {
        let record = SegmentRecord::put(Pkey::new(1), Pkey::new(1), vec![1, 2, 3, 4, 5]);
        assert_eq!(record.encoded_size(), record.encode().unwrap().len());
        assert_eq!(
            SegmentRecord::peek_len(&record.encode().unwrap()),
            Some(record.encoded_size())
        );
    }
}
