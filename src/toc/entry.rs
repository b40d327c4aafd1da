use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Table of contents record for one stored entry.
///
/// Block offsets are relative to `entry_offset_bytes` and mark the first byte
/// of each block; the first offset is always 0. The byte span of block `j`
/// runs to the next offset, or to the end of the entry for the last block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Id of the stored string
    pub id: u32,

    /// Id of the data file the string was stored in
    pub file_id: u32,

    /// Byte offset of the entry within its data file
    pub entry_offset_bytes: u32,

    /// Total length of the entry in bytes
    pub entry_length_bytes: u32,

    /// Total length of the entry in characters. Unknown (0) for entries
    /// reloaded from disk after deletion.
    pub entry_length_characters: u32,

    /// Fixed block size in characters (byte size differs per block)
    pub block_size_characters: u32,

    /// Relative block start offsets in bytes
    pub block_offset_bytes: Vec<u32>,

    /// Tombstone; the entry keeps its byte footprint until compaction
    pub deleted: bool,
}

impl TocEntry {
    /// Byte offset in the data file of the first byte of the given block.
    pub fn block_start_offset(&self, block: usize) -> u64 {
        self.entry_offset_bytes as u64 + self.block_offset_bytes[block] as u64
    }

    /// Byte offset in the data file of the first byte beyond the given block.
    pub fn block_end_offset(&self, block: usize) -> u64 {
        if block + 1 < self.block_offset_bytes.len() {
            self.entry_offset_bytes as u64 + self.block_offset_bytes[block + 1] as u64
        } else {
            self.entry_offset_bytes as u64 + self.entry_length_bytes as u64
        }
    }

    /// Size of this record serialized, in bytes.
    pub fn size_bytes(&self) -> usize {
        28 + self.block_offset_bytes.len() * 4
    }

    /// Serialize this record to the writer. The character length field doubles
    /// as the tombstone: -1 is written in place of the length for deleted
    /// entries, so the length of a deleted entry does not survive a reload.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.id)
            .map_err(|e| Error::Write("toc entry id", e))?;
        w.write_u32::<LittleEndian>(self.file_id)
            .map_err(|e| Error::Write("toc entry file id", e))?;
        w.write_u32::<LittleEndian>(self.entry_offset_bytes)
            .map_err(|e| Error::Write("toc entry offset", e))?;
        w.write_u32::<LittleEndian>(self.entry_length_bytes)
            .map_err(|e| Error::Write("toc entry byte length", e))?;
        let char_length = if self.deleted {
            -1
        } else {
            self.entry_length_characters as i32
        };
        w.write_i32::<LittleEndian>(char_length)
            .map_err(|e| Error::Write("toc entry character length", e))?;
        w.write_u32::<LittleEndian>(self.block_size_characters)
            .map_err(|e| Error::Write("toc entry block size", e))?;
        w.write_u32::<LittleEndian>(self.block_offset_bytes.len() as u32)
            .map_err(|e| Error::Write("toc entry block count", e))?;
        for offset in &self.block_offset_bytes {
            w.write_u32::<LittleEndian>(*offset)
                .map_err(|e| Error::Write("toc entry block offset", e))?;
        }
        Ok(())
    }

    /// Read one record from the reader.
    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let id = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry id", e))?;
        let file_id = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry file id", e))?;
        let entry_offset_bytes = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry offset", e))?;
        let entry_length_bytes = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry byte length", e))?;
        let char_length = r
            .read_i32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry character length", e))?;
        let deleted = char_length < 0;
        let entry_length_characters = if deleted { 0 } else { char_length as u32 };
        let block_size_characters = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry block size", e))?;
        let n_blocks = r
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::Read("toc entry block count", e))?;
        let mut block_offset_bytes = Vec::with_capacity(n_blocks as usize);
        for _ in 0..n_blocks {
            let offset = r
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::Read("toc entry block offset", e))?;
            block_offset_bytes.push(offset);
        }
        Ok(Self {
            id,
            file_id,
            entry_offset_bytes,
            entry_length_bytes,
            entry_length_characters,
            block_size_characters,
            block_offset_bytes,
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> TocEntry {
        TocEntry {
            id: 1,
            file_id: 1,
            entry_offset_bytes: 0,
            entry_length_bytes: 5,
            entry_length_characters: 5,
            block_size_characters: 4,
            block_offset_bytes: vec![0, 4],
            deleted: false,
        }
    }

    #[test]
    fn test_entry_roundtrip() {
        let original = sample_entry();
        let mut buf = Vec::new();
        original.serialize(&mut buf).expect("Failed to serialize");
        assert_eq!(buf.len(), original.size_bytes());

        let decoded = TocEntry::deserialize(&mut buf.as_slice()).expect("Failed to deserialize");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_entry_exact_bytes() {
        let entry = sample_entry();
        let mut buf = Vec::new();
        entry.serialize(&mut buf).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes()); // id
        expected.extend_from_slice(&1u32.to_le_bytes()); // file id
        expected.extend_from_slice(&0u32.to_le_bytes()); // entry offset
        expected.extend_from_slice(&5u32.to_le_bytes()); // byte length
        expected.extend_from_slice(&5i32.to_le_bytes()); // character length
        expected.extend_from_slice(&4u32.to_le_bytes()); // block size
        expected.extend_from_slice(&2u32.to_le_bytes()); // block count
        expected.extend_from_slice(&0u32.to_le_bytes()); // block offset 0
        expected.extend_from_slice(&4u32.to_le_bytes()); // block offset 1

        assert_eq!(buf, expected);
        assert_eq!(buf.len(), 28 + 2 * 4);
    }

    #[test]
    fn test_deleted_entry_loses_character_length() {
        let mut original = sample_entry();
        original.deleted = true;

        let mut buf = Vec::new();
        original.serialize(&mut buf).unwrap();

        // The character length slot holds the tombstone
        assert_eq!(&buf[16..20], &(-1i32).to_le_bytes());

        let decoded = TocEntry::deserialize(&mut buf.as_slice()).unwrap();
        assert!(decoded.deleted);
        assert_eq!(decoded.entry_length_characters, 0);
        assert_eq!(decoded.entry_length_bytes, original.entry_length_bytes);
        assert_eq!(decoded.block_offset_bytes, original.block_offset_bytes);
    }

    #[test]
    fn test_entry_without_blocks() {
        let entry = TocEntry {
            id: 7,
            file_id: 2,
            entry_offset_bytes: 123,
            entry_length_bytes: 0,
            entry_length_characters: 0,
            block_size_characters: 4000,
            block_offset_bytes: vec![],
            deleted: false,
        };

        let mut buf = Vec::new();
        entry.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), 28);

        let decoded = TocEntry::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_truncated_record_fails() {
        let entry = sample_entry();
        let mut buf = Vec::new();
        entry.serialize(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        let result = TocEntry::deserialize(&mut buf.as_slice());
        assert!(matches!(result, Err(Error::Read("toc entry block offset", _))));
    }

    #[test]
    fn test_block_offsets() {
        let entry = TocEntry {
            id: 3,
            file_id: 1,
            entry_offset_bytes: 100,
            entry_length_bytes: 11,
            entry_length_characters: 10,
            block_size_characters: 4,
            block_offset_bytes: vec![0, 4, 9],
            deleted: false,
        };

        assert_eq!(entry.block_start_offset(0), 100);
        assert_eq!(entry.block_end_offset(0), 104);
        assert_eq!(entry.block_start_offset(1), 104);
        assert_eq!(entry.block_end_offset(1), 109);
        assert_eq!(entry.block_start_offset(2), 109);
        assert_eq!(entry.block_end_offset(2), 111);
    }
}
