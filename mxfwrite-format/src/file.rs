//! Seekable MXF file wrapper.
//!
//! `MxfFile` owns the output sink and the ordered list of partition packs
//! written so far. It provides KAG-aligned fill, fill to an absolute
//! position (for the header metadata reserve), the Random Index Pack and the
//! in-place partition rewrite performed at complete-write time.

use crate::error::{MxfError, Result};
use crate::klv::{write_fill, DEFAULT_MIN_LLEN, KEY_SIZE};
use crate::partition::{Partition, RandomIndexPack};
use crate::ul::{labels, UL};
use std::io::{Seek, SeekFrom, Write};

/// A seekable MXF output file.
pub struct MxfFile<W: Write + Seek> {
    writer: W,
    min_llen: u8,
    fill_key: UL,
    partitions: Vec<Partition>,
}

impl<W: Write + Seek> MxfFile<W> {
    /// Wrap a seekable sink with default settings.
    pub fn new(writer: W) -> Self {
        MxfFile {
            writer,
            min_llen: DEFAULT_MIN_LLEN,
            fill_key: labels::KLV_FILL,
            partitions: Vec::new(),
        }
    }

    /// Set the minimum encoded BER length size.
    pub fn set_min_llen(&mut self, min_llen: u8) {
        self.min_llen = min_llen;
    }

    /// The minimum encoded BER length size.
    pub fn min_llen(&self) -> u8 {
        self.min_llen
    }

    /// Set the KLV fill key (compliant or legacy).
    pub fn set_fill_key(&mut self, fill_key: UL) {
        self.fill_key = fill_key;
    }

    /// The configured KLV fill key.
    pub fn fill_key(&self) -> UL {
        self.fill_key
    }

    /// Current byte position in the file.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.writer.stream_position()?)
    }

    /// Seek to an absolute byte position.
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Write a new partition pack at the current position and register it.
    ///
    /// `this_partition` and `previous_partition` are filled in from the file
    /// state. Returns the index of the new partition.
    pub fn create_partition(&mut self, mut partition: Partition) -> Result<usize> {
        partition.this_partition = self.tell()?;
        partition.previous_partition = self
            .partitions
            .last()
            .map(|p| p.this_partition)
            .unwrap_or(0);
        partition.write(&mut self.writer, self.min_llen)?;
        self.partitions.push(partition);
        Ok(self.partitions.len() - 1)
    }

    /// All partitions written so far.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Mutable access to a partition for byte-count updates.
    pub fn partition_mut(&mut self, index: usize) -> &mut Partition {
        &mut self.partitions[index]
    }

    /// Pad with a fill item so the position is KAG-aligned relative to the
    /// start of the current partition.
    pub fn fill_to_kag(&mut self) -> Result<()> {
        let Some(partition) = self.partitions.last() else {
            return Ok(());
        };
        let kag = partition.kag_size as u64;
        if kag <= 1 {
            return Ok(());
        }
        let partition_start = partition.this_partition;

        let position = self.tell()?;
        let relative = position - partition_start;
        let mut fill = (kag - relative % kag) % kag;
        if fill == 0 {
            return Ok(());
        }
        let overhead = (KEY_SIZE + self.min_llen as usize) as u64;
        while fill < overhead {
            fill += kag;
        }
        write_fill(&mut self.writer, &self.fill_key, fill, self.min_llen)
    }

    /// Pad with a fill item so the next write lands exactly at `target`.
    pub fn fill_to_position(&mut self, target: u64) -> Result<()> {
        let position = self.tell()?;
        if position == target {
            return Ok(());
        }
        if position > target {
            return Err(MxfError::InvalidArgument(format!(
                "Cannot fill backwards from {} to {}",
                position, target
            )));
        }
        write_fill(
            &mut self.writer,
            &self.fill_key,
            target - position,
            self.min_llen,
        )
    }

    /// Write the Random Index Pack for all registered partitions.
    pub fn write_rip(&mut self) -> Result<()> {
        let mut rip = RandomIndexPack::new();
        for partition in &self.partitions {
            rip.add_entry(partition.body_sid, partition.this_partition);
        }
        rip.write(&mut self.writer, self.min_llen)?;
        Ok(())
    }

    /// Rewrite every partition pack in place with the final footer offset
    /// and byte counts, restoring the file position afterwards.
    pub fn update_partitions(&mut self) -> Result<()> {
        let footer_offset = self
            .partitions
            .iter()
            .rev()
            .find(|p| matches!(p.kind, crate::partition::PartitionKind::Footer))
            .map(|p| p.this_partition)
            .unwrap_or(0);

        let saved = self.tell()?;
        for partition in &mut self.partitions {
            partition.footer_partition = footer_offset;
            self.writer.seek(SeekFrom::Start(partition.this_partition))?;
            partition.write(&mut self.writer, self.min_llen)?;
        }
        self.writer.seek(SeekFrom::Start(saved))?;
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consume the wrapper and return the sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek> Write for MxfFile<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ul::{PartitionState, UniversalLabel};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_create_partition_links_offsets() {
        let mut file = MxfFile::new(Cursor::new(Vec::new()));

        let header = Partition::header();
        file.create_partition(header).unwrap();

        // push some essence-like bytes
        file.write_all(&[0u8; 100]).unwrap();

        let body = Partition::body();
        let body_index = file.create_partition(body).unwrap();

        let partitions = file.partitions();
        assert_eq!(partitions[0].this_partition, 0);
        assert!(partitions[body_index].this_partition > 0);
        assert_eq!(partitions[body_index].previous_partition, 0);
    }

    #[test]
    fn test_fill_to_kag() {
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let mut header = Partition::header();
        header.kag_size = 512;
        file.create_partition(header).unwrap();

        file.fill_to_kag().unwrap();
        assert_eq!(file.tell().unwrap() % 512, 0);

        // already aligned: no further fill
        let pos = file.tell().unwrap();
        file.fill_to_kag().unwrap();
        assert_eq!(file.tell().unwrap(), pos);
    }

    #[test]
    fn test_fill_to_position_exact() {
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        file.write_all(&[1u8; 10]).unwrap();
        file.fill_to_position(128).unwrap();
        assert_eq!(file.tell().unwrap(), 128);

        assert!(file.fill_to_position(100).is_err());
    }

    #[test]
    fn test_update_partitions_rewrites_footer_offset() {
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        file.create_partition(Partition::header()).unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let footer_index = file.create_partition(Partition::footer()).unwrap();
        let footer_offset = file.partitions()[footer_index].this_partition;

        // upgrade and rewrite
        for i in 0..file.partitions().len() {
            file.partition_mut(i).set_closed_complete();
        }
        file.update_partitions().unwrap();

        assert_eq!(file.partitions()[0].footer_partition, footer_offset);

        let bytes = file.into_inner().into_inner();
        let key = UniversalLabel(bytes[0..16].try_into().unwrap());
        assert!(key.is_header_partition());
        assert_eq!(
            PartitionState::from_key_byte(bytes[14]),
            Some(PartitionState::ClosedComplete)
        );
        assert_eq!(bytes[13], 0x02);
    }

    #[test]
    fn test_write_rip_lists_all_partitions() {
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        file.create_partition(Partition::header()).unwrap();
        let mut body = Partition::body();
        body.body_sid = 2;
        file.create_partition(body).unwrap();
        file.create_partition(Partition::footer()).unwrap();

        let end = file.tell().unwrap();
        file.write_rip().unwrap();
        let bytes = file.into_inner().into_inner();

        // three 12-byte entries + key + llen + overall length
        assert_eq!(bytes.len() as u64, end + 16 + 4 + 3 * 12 + 4);
    }
}
