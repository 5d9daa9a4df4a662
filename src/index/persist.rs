//! Dump and reload
//!
//! Layout (little endian):
//!
//! ```text
//! magic "CHT\x01" | key bytes u8 | layout u8 | flags u8 | reserved u8
//! min_key u64 | max_key u64 | num_keys u64 | num_bins u64 | max_error u64
//! shift u32 | table words u64 | table [u32]
//! blake3(everything above) [u8; 32]
//! ```
//!
//! Reloading re-derives the geometry and checks every word, so a dump that
//! passes validation can never send a lookup out of the table or into a loop.
//! Every node but the root must be the child of exactly one word.

use bitvec::prelude::*;
use tracing::debug;

use super::CompactHistTree;
use crate::builder::IndexConfig;
use crate::layout::{LayoutMode, Word, MAX_TABLE_WORDS, PAYLOAD_MASK};
use crate::tree::Geometry;
use crate::util::Key;
use crate::ChtError;

const MAGIC: [u8; 4] = *b"CHT\x01";
const FLAG_MAX_KEY_PRESENT: u8 = 1;
const HEADER_LEN: usize = 4 + 4 + 5 * 8 + 4 + 8;
const CHECKSUM_LEN: usize = blake3::OUT_LEN;

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ChtError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| corrupt("truncated dump"))?;
        let chunk = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(chunk)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ChtError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ChtError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, ChtError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, ChtError> {
        self.array().map(u64::from_le_bytes)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

fn corrupt(reason: impl Into<String>) -> ChtError {
    ChtError::CorruptDump(reason.into())
}

fn to_usize(value: u64, field: &str) -> Result<usize, ChtError> {
    usize::try_from(value).map_err(|_| corrupt(format!("{} {} does not fit usize", field, value)))
}

impl<K: Key> CompactHistTree<K> {
    /// Serialize the index with a trailing blake3 checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.table.len() * 4 + CHECKSUM_LEN);
        out.extend_from_slice(&MAGIC);
        out.push(K::BYTES);
        out.push(self.layout.as_byte());
        out.push(if self.max_key_present {
            FLAG_MAX_KEY_PRESENT
        } else {
            0
        });
        out.push(0);

        for field in [
            self.min_key.to_u64(),
            self.max_key.to_u64(),
            self.num_keys as u64,
            self.num_bins as u64,
            self.max_error as u64,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&self.shift.to_le_bytes());
        out.extend_from_slice(&(self.table.len() as u64).to_le_bytes());
        for word in &self.table {
            out.extend_from_slice(&word.to_le_bytes());
        }

        let checksum = blake3::hash(&out);
        out.extend_from_slice(checksum.as_bytes());
        out
    }

    /// Rebuild an index from [`to_bytes`](Self::to_bytes) output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChtError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(corrupt(format!("dump of {} bytes is too short", bytes.len())));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes()[..] != trailer[..] {
            return Err(corrupt("checksum mismatch"));
        }

        let mut reader = ByteReader::new(body);
        if reader.array::<4>()? != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let key_bytes = reader.u8()?;
        if key_bytes != K::BYTES {
            return Err(corrupt(format!(
                "dump holds {}-byte keys, expected {}",
                key_bytes,
                K::BYTES
            )));
        }
        let layout_byte = reader.u8()?;
        let layout = LayoutMode::from_byte(layout_byte)
            .ok_or_else(|| corrupt(format!("unknown layout {}", layout_byte)))?;
        let flags = reader.u8()?;
        if flags & !FLAG_MAX_KEY_PRESENT != 0 || reader.u8()? != 0 {
            return Err(corrupt(format!("unknown flags {:#04x}", flags)));
        }

        let min_raw = reader.u64()?;
        let max_raw = reader.u64()?;
        let min_key = K::from_u64(min_raw).ok_or_else(|| corrupt("min_key out of key range"))?;
        let max_key = K::from_u64(max_raw).ok_or_else(|| corrupt("max_key out of key range"))?;
        let num_keys = to_usize(reader.u64()?, "num_keys")?;
        let num_bins = to_usize(reader.u64()?, "num_bins")?;
        let max_error = to_usize(reader.u64()?, "max_error")?;
        let shift = reader.u32()?;
        let words = reader.u64()?;

        let config = IndexConfig::new(num_bins, max_error)
            .map_err(|err| corrupt(format!("bad configuration: {}", err)))?;
        let geometry = Geometry::new(min_raw, max_raw, &config)
            .map_err(|err| corrupt(format!("bad bounds: {}", err)))?;
        if geometry.shift != shift {
            return Err(corrupt(format!(
                "shift {} does not match bounds (expected {})",
                shift, geometry.shift
            )));
        }
        if num_keys > PAYLOAD_MASK as usize {
            return Err(corrupt(format!("num_keys {} exceeds the word payload", num_keys)));
        }
        if words == 0 || words > MAX_TABLE_WORDS || words % num_bins as u64 != 0 {
            return Err(corrupt(format!("bad table length {}", words)));
        }
        let words = words as usize;
        if reader.remaining() != words * 4 {
            return Err(corrupt(format!(
                "table of {} words needs {} bytes, found {}",
                words,
                words * 4,
                reader.remaining()
            )));
        }

        let nodes = words / num_bins;
        let mut referenced = bitvec![0; nodes];
        let mut table = Vec::with_capacity(words);
        for position in 0..words {
            let raw = reader.u32()?;
            match Word::decode(raw) {
                Word::Leaf(partial_sum) if partial_sum as usize > num_keys => {
                    return Err(corrupt(format!(
                        "word {}: partial sum {} exceeds {} keys",
                        position, partial_sum, num_keys
                    )));
                }
                Word::Child(offset) => {
                    let offset = offset as usize;
                    let node_start = position - position % num_bins;
                    if offset % num_bins != 0 || offset <= node_start || offset >= words {
                        return Err(corrupt(format!(
                            "word {}: bad child offset {}",
                            position, offset
                        )));
                    }
                    if referenced.replace(offset / num_bins, true) {
                        return Err(corrupt(format!(
                            "word {}: node at {} referenced twice",
                            position, offset
                        )));
                    }
                }
                Word::Leaf(_) => {}
            }
            table.push(raw);
        }
        if let Some(orphan) = referenced[1..].first_zero() {
            return Err(corrupt(format!("node {} is unreachable", orphan + 1)));
        }

        debug!(
            num_keys,
            words,
            layout = ?layout,
            "reloaded index"
        );
        Ok(Self::assemble(
            &geometry,
            (min_key, max_key),
            num_keys,
            flags & FLAG_MAX_KEY_PRESENT != 0,
            layout,
            table,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompactHistTree<u64> {
        let mut keys: Vec<u64> = (0..2_000).map(|k| k * 31 % 9_973 + k).collect();
        keys.sort_unstable();
        let config = IndexConfig::new(8, 4)
            .unwrap()
            .with_layout(LayoutMode::CacheOblivious);
        CompactHistTree::from_sorted(&keys, config).unwrap()
    }

    /// Recompute the trailer after tampering with the body.
    fn reseal(bytes: &mut Vec<u8>) {
        bytes.truncate(bytes.len() - CHECKSUM_LEN);
        let checksum = blake3::hash(bytes);
        bytes.extend_from_slice(checksum.as_bytes());
    }

    #[test]
    fn test_reload_is_identical() {
        let index = sample();
        let bytes = index.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + index.table().len() * 4 + CHECKSUM_LEN);
        assert_eq!(CompactHistTree::<u64>::from_bytes(&bytes).unwrap(), index);
    }

    #[test]
    fn test_flipped_bit_fails_checksum() {
        let mut bytes = sample().to_bytes();
        bytes[HEADER_LEN + 5] ^= 0x10;
        assert_eq!(
            CompactHistTree::<u64>::from_bytes(&bytes),
            Err(ChtError::CorruptDump("checksum mismatch".to_string()))
        );
    }

    #[test]
    fn test_key_width_must_match() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            CompactHistTree::<u32>::from_bytes(&bytes),
            Err(ChtError::CorruptDump(_))
        ));
    }

    #[test]
    fn test_truncated_dump_is_rejected() {
        let bytes = sample().to_bytes();
        assert!(CompactHistTree::<u64>::from_bytes(&bytes[..20]).is_err());
        assert!(CompactHistTree::<u64>::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_backward_child_offset_is_rejected() {
        let index = sample();
        let position = index
            .table()
            .iter()
            .position(|&word| matches!(Word::decode(word), Word::Child(_)))
            .unwrap();
        let mut bytes = index.to_bytes();
        let at = HEADER_LEN + position * 4;
        bytes[at..at + 4].copy_from_slice(&0u32.to_le_bytes());
        reseal(&mut bytes);

        assert!(matches!(
            CompactHistTree::<u64>::from_bytes(&bytes),
            Err(ChtError::CorruptDump(reason)) if reason.contains("child offset")
        ));
    }

    #[test]
    fn test_shared_child_is_rejected() {
        // Dense keys with a small error split both root bins.
        let keys: Vec<u64> = (0..64).collect();
        let index = CompactHistTree::from_sorted(&keys, IndexConfig::new(2, 2).unwrap()).unwrap();
        assert_eq!(Word::decode(index.table()[0]), Word::Child(2));
        assert!(matches!(Word::decode(index.table()[1]), Word::Child(_)));

        // Point the second root bin at the first bin's child.
        let mut bytes = index.to_bytes();
        bytes[HEADER_LEN + 4..HEADER_LEN + 8].copy_from_slice(&2u32.to_le_bytes());
        reseal(&mut bytes);

        assert!(matches!(
            CompactHistTree::<u64>::from_bytes(&bytes),
            Err(ChtError::CorruptDump(reason)) if reason.contains("referenced twice")
        ));
    }

    #[test]
    fn test_inconsistent_shift_is_rejected() {
        let mut bytes = sample().to_bytes();
        let at = 8 + 5 * 8;
        bytes[at] ^= 1;
        reseal(&mut bytes);
        assert!(matches!(
            CompactHistTree::<u64>::from_bytes(&bytes),
            Err(ChtError::CorruptDump(reason)) if reason.contains("shift")
        ));
    }
}
