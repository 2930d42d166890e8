//! MXF partition packs and the Random Index Pack.
//!
//! MXF files are divided into partitions: a header partition, optional body
//! partitions and a footer partition. Partition packs are written once while
//! streaming and rewritten in place at complete-write time with final byte
//! counts and upgraded keys.

use crate::error::Result;
use crate::klv::{encode_ber_length, write_kl};
use crate::ul::{labels, partition_pack_key, PartitionState, UL};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Partition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Header,
    Body,
    Footer,
}

impl PartitionKind {
    fn key_byte(&self) -> u8 {
        match self {
            PartitionKind::Header => 0x02,
            PartitionKind::Body => 0x03,
            PartitionKind::Footer => 0x04,
        }
    }
}

/// An MXF partition pack.
#[derive(Debug, Clone)]
pub struct Partition {
    pub kind: PartitionKind,
    pub state: PartitionState,
    pub major_version: u16,
    pub minor_version: u16,
    pub kag_size: u32,
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer_partition: u64,
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: UL,
    pub essence_containers: Vec<UL>,
}

impl Partition {
    /// Create a header partition pack.
    pub fn header() -> Self {
        Partition::new(PartitionKind::Header)
    }

    /// Create a body partition pack.
    pub fn body() -> Self {
        Partition::new(PartitionKind::Body)
    }

    /// Create a footer partition pack.
    pub fn footer() -> Self {
        let mut partition = Partition::new(PartitionKind::Footer);
        partition.state = PartitionState::ClosedComplete;
        partition
    }

    fn new(kind: PartitionKind) -> Self {
        Partition {
            kind,
            state: PartitionState::OpenIncomplete,
            major_version: 1,
            minor_version: 3,
            kag_size: 1,
            this_partition: 0,
            previous_partition: 0,
            footer_partition: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 0,
            operational_pattern: labels::OP_1A_MULTITRACK,
            essence_containers: Vec::new(),
        }
    }

    /// The partition pack key for the current kind and state.
    pub fn pack_key(&self) -> UL {
        partition_pack_key(self.kind.key_byte(), self.state)
    }

    /// Upgrade an open/incomplete key to closed and complete.
    pub fn set_closed_complete(&mut self) {
        self.state = PartitionState::ClosedComplete;
    }

    /// Add an essence container label, ignoring duplicates.
    pub fn add_essence_container(&mut self, ul: UL) {
        if !self.essence_containers.contains(&ul) {
            self.essence_containers.push(ul);
        }
    }

    /// Total serialized size with the given minimum BER length size.
    pub fn size(&self, min_llen: u8) -> u64 {
        let value_size = self.value_size();
        16 + encode_ber_length(value_size, min_llen).len() as u64 + value_size
    }

    fn value_size(&self) -> u64 {
        // fixed fields (88 bytes) plus the essence container batch
        88 + self.essence_containers.len() as u64 * 16
    }

    /// Write the partition pack, returning the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W, min_llen: u8) -> Result<u64> {
        let value_size = self.value_size();
        let kl_size = write_kl(writer, &self.pack_key(), value_size, min_llen)?;

        writer.write_u16::<BigEndian>(self.major_version)?;
        writer.write_u16::<BigEndian>(self.minor_version)?;
        writer.write_u32::<BigEndian>(self.kag_size)?;
        writer.write_u64::<BigEndian>(self.this_partition)?;
        writer.write_u64::<BigEndian>(self.previous_partition)?;
        writer.write_u64::<BigEndian>(self.footer_partition)?;
        writer.write_u64::<BigEndian>(self.header_byte_count)?;
        writer.write_u64::<BigEndian>(self.index_byte_count)?;
        writer.write_u32::<BigEndian>(self.index_sid)?;
        writer.write_u64::<BigEndian>(self.body_offset)?;
        writer.write_u32::<BigEndian>(self.body_sid)?;
        writer.write_all(&self.operational_pattern)?;

        writer.write_u32::<BigEndian>(self.essence_containers.len() as u32)?;
        writer.write_u32::<BigEndian>(16)?;
        for ec in &self.essence_containers {
            writer.write_all(ec)?;
        }

        Ok(kl_size as u64 + value_size)
    }
}

/// One Random Index Pack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    /// Body SID of the partition (0 for header/footer partitions).
    pub body_sid: u32,
    /// Byte offset of the partition pack in the file.
    pub byte_offset: u64,
}

/// The Random Index Pack appended after the footer partition.
#[derive(Debug, Clone, Default)]
pub struct RandomIndexPack {
    pub entries: Vec<RipEntry>,
}

impl RandomIndexPack {
    /// Create an empty RIP.
    pub fn new() -> Self {
        RandomIndexPack::default()
    }

    /// Add a partition entry.
    pub fn add_entry(&mut self, body_sid: u32, byte_offset: u64) {
        self.entries.push(RipEntry {
            body_sid,
            byte_offset,
        });
    }

    /// Write the RIP, returning the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W, min_llen: u8) -> Result<u64> {
        // entries plus the trailing overall length
        let value_size = self.entries.len() as u64 * 12 + 4;
        let kl_size = write_kl(writer, &labels::RANDOM_INDEX_PACK, value_size, min_llen)?;

        for entry in &self.entries {
            writer.write_u32::<BigEndian>(entry.body_sid)?;
            writer.write_u64::<BigEndian>(entry.byte_offset)?;
        }

        let overall_length = kl_size as u64 + value_size;
        writer.write_u32::<BigEndian>(overall_length as u32)?;

        Ok(overall_length)
    }
}
