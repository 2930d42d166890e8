//! Index table building.
//!
//! Two shapes are produced. A constant-bytes-per-element (CBE) track writes a
//! single index segment whose edit-unit byte count covers every edit unit; it
//! is written as a placeholder at prepare time and rewritten at complete time
//! with the final duration. A variable-bytes-per-element (VBE) track collects
//! one entry per edit unit; entries whose temporal offsets are only known
//! when a future picture arrives are cached per element and patched in place
//! after serialization.

use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::klv::{write_klv, write_local_item};
use crate::metadata::tags;
use crate::ul::labels;
use mxfwrite_core::{generate_uuid, Rational};
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use uuid::Uuid;

/// Maximum byte size of one segment's index entry array. Keeps the local set
/// item below the 2-byte length limit with room for the segment header.
pub const MAX_INDEX_SEGMENT_SIZE: usize = 65_000;

// headroom for closing a GOP when the current edit unit may start a partition
const MAX_GOP_SIZE_GUESS: u32 = 30;

const MAX_CACHE_ENTRIES: usize = 250;

/// One VBE index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub temporal_offset: i8,
    pub key_frame_offset: i8,
    pub flags: u8,
    pub can_start_partition: bool,
}

impl Default for IndexEntry {
    fn default() -> Self {
        IndexEntry {
            temporal_offset: 0,
            key_frame_offset: 0,
            flags: 0,
            can_start_partition: true,
        }
    }
}

impl IndexEntry {
    /// Create an entry.
    pub fn new(
        temporal_offset: i8,
        key_frame_offset: i8,
        flags: u8,
        can_start_partition: bool,
    ) -> Self {
        IndexEntry {
            temporal_offset,
            key_frame_offset,
            flags,
            can_start_partition,
        }
    }

    /// An entry is default when all three serialized bytes are zero.
    pub fn is_default(&self) -> bool {
        self.temporal_offset == 0 && self.key_frame_offset == 0 && self.flags == 0
    }

    /// Compatible if this entry is still the default or the other entry
    /// matches it exactly.
    pub fn is_compatible(&self, other: &IndexEntry) -> bool {
        self.is_default()
            || (self.temporal_offset == other.temporal_offset
                && self.key_frame_offset == other.key_frame_offset
                && self.flags == other.flags)
    }
}

/// One delta entry describing an element's byte offset within a content
/// package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaEntry {
    pub pos_table_index: i8,
    pub slice: u8,
    pub element_delta: u32,
}

/// One content package element registered with the index table.
struct IndexElement {
    track_index: u32,
    is_picture: bool,
    is_cbe: bool,
    apply_temporal_reordering: bool,
    slice_offset: u8,
    element_size: u32,
    cache: BTreeMap<i64, IndexEntry>,
}

impl IndexElement {
    fn new(track_index: u32, is_picture: bool, is_cbe: bool, apply_temporal_reordering: bool) -> Self {
        IndexElement {
            track_index,
            is_picture,
            is_cbe,
            apply_temporal_reordering,
            slice_offset: 0,
            element_size: 0,
            cache: BTreeMap::new(),
        }
    }

    fn cache_entry(&mut self, position: i64, entry: IndexEntry) -> Result<()> {
        if self.cache.len() >= MAX_CACHE_ENTRIES && !self.cache.contains_key(&position) {
            return Err(MxfError::IndexInvariantViolation(format!(
                "Index entry cache for track {} exceeds {} entries",
                self.track_index, MAX_CACHE_ENTRIES
            )));
        }
        self.cache.insert(position, entry);
        Ok(())
    }

    fn update_cached(&mut self, position: i64, temporal_offset: i8) -> Result<()> {
        match self.cache.get_mut(&position) {
            Some(entry) => {
                entry.temporal_offset = temporal_offset;
                Ok(())
            }
            None => Err(MxfError::IndexInvariantViolation(format!(
                "No cached index entry at position {} for track {}",
                position, self.track_index
            ))),
        }
    }

    fn take_entry(&mut self, position: i64) -> Option<IndexEntry> {
        self.cache.remove(&position)
    }

    fn can_start_partition(&self, position: i64) -> bool {
        if self.is_cbe {
            return true;
        }
        self.cache
            .get(&position)
            .map(|entry| entry.can_start_partition)
            .unwrap_or(false)
    }
}

/// Serialized fields of one index table segment.
struct SegmentHeader {
    instance_uid: Uuid,
    index_edit_rate: Rational,
    start_position: i64,
    duration: i64,
    edit_unit_byte_count: u32,
    index_sid: u32,
    body_sid: u32,
    slice_count: u8,
}

impl SegmentHeader {
    fn new(
        index_sid: u32,
        body_sid: u32,
        index_edit_rate: Rational,
        start_position: i64,
        slice_count: u8,
    ) -> Self {
        SegmentHeader {
            instance_uid: generate_uuid(),
            index_edit_rate,
            start_position,
            duration: 0,
            edit_unit_byte_count: 0,
            index_sid,
            body_sid,
            slice_count,
        }
    }
}

fn serialize_segment(
    header: &SegmentHeader,
    delta_entries: &[DeltaEntry],
    entries: Option<(u32, &[u8])>,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    write_local_item(&mut body, tags::INSTANCE_UID, header.instance_uid.as_bytes())?;

    let mut rate = [0u8; 8];
    rate[..4].copy_from_slice(&header.index_edit_rate.num.to_be_bytes());
    rate[4..].copy_from_slice(&header.index_edit_rate.den.to_be_bytes());
    write_local_item(&mut body, tags::INDEX_EDIT_RATE, &rate)?;

    write_local_item(
        &mut body,
        tags::INDEX_START_POSITION,
        &header.start_position.to_be_bytes(),
    )?;
    write_local_item(&mut body, tags::INDEX_DURATION, &header.duration.to_be_bytes())?;
    write_local_item(
        &mut body,
        tags::EDIT_UNIT_BYTE_COUNT,
        &header.edit_unit_byte_count.to_be_bytes(),
    )?;
    write_local_item(&mut body, tags::INDEX_SID, &header.index_sid.to_be_bytes())?;
    write_local_item(&mut body, tags::BODY_SID, &header.body_sid.to_be_bytes())?;
    write_local_item(&mut body, tags::SLICE_COUNT, &[header.slice_count])?;

    if !delta_entries.is_empty() {
        let mut array = Vec::with_capacity(8 + delta_entries.len() * 6);
        array.extend_from_slice(&(delta_entries.len() as u32).to_be_bytes());
        array.extend_from_slice(&6u32.to_be_bytes());
        for delta in delta_entries {
            array.push(delta.pos_table_index as u8);
            array.push(delta.slice);
            array.extend_from_slice(&delta.element_delta.to_be_bytes());
        }
        write_local_item(&mut body, tags::DELTA_ENTRY_ARRAY, &array)?;
    }

    if let Some((entry_size, entry_bytes)) = entries {
        let count = entry_bytes.len() as u32 / entry_size;
        let mut array = Vec::with_capacity(8 + entry_bytes.len());
        array.extend_from_slice(&count.to_be_bytes());
        array.extend_from_slice(&entry_size.to_be_bytes());
        array.extend_from_slice(entry_bytes);
        write_local_item(&mut body, tags::INDEX_ENTRY_ARRAY, &array)?;
    }

    Ok(body)
}

/// A standalone CBE index segment for a single-element track file.
///
/// Written as a placeholder at prepare time with a zero duration and
/// rewritten in place at complete time with the final duration.
pub struct CbeIndexSegment {
    header: SegmentHeader,
}

impl CbeIndexSegment {
    /// Create a segment with a known edit-unit byte count.
    pub fn new(
        index_sid: u32,
        body_sid: u32,
        index_edit_rate: Rational,
        edit_unit_byte_count: u32,
    ) -> Self {
        let mut header = SegmentHeader::new(index_sid, body_sid, index_edit_rate, 0, 0);
        header.edit_unit_byte_count = edit_unit_byte_count;
        CbeIndexSegment { header }
    }

    /// The indexed edit-unit byte count.
    pub fn edit_unit_byte_count(&self) -> u32 {
        self.header.edit_unit_byte_count
    }

    /// Set the final index duration before the rewrite.
    pub fn set_duration(&mut self, duration: i64) {
        self.header.duration = duration;
    }

    /// The current index duration.
    pub fn duration(&self) -> i64 {
        self.header.duration
    }

    /// Write the segment, returning the number of bytes written.
    pub fn write<W: Write + Seek>(&self, file: &mut MxfFile<W>) -> Result<u64> {
        let body = serialize_segment(&self.header, &[], None)?;
        let min_llen = file.min_llen();
        let written = write_klv(file, &labels::INDEX_TABLE_SEGMENT, &body, min_llen)?;
        Ok(written as u64)
    }
}

/// One segment of a multi-segment index table.
struct IndexSegment {
    header: SegmentHeader,
    entry_size: u32,
    entries: Vec<u8>,
}

impl IndexSegment {
    fn new(
        index_sid: u32,
        body_sid: u32,
        index_edit_rate: Rational,
        start_position: i64,
        entry_size: u32,
        slice_count: u8,
    ) -> Self {
        IndexSegment {
            header: SegmentHeader::new(
                index_sid,
                body_sid,
                index_edit_rate,
                start_position,
                slice_count,
            ),
            entry_size,
            entries: Vec::new(),
        }
    }

    fn require_new_segment(&self, can_start_partition: bool) -> bool {
        let next_size = self.entries.len() + self.entry_size as usize;
        next_size > MAX_INDEX_SEGMENT_SIZE
            || (can_start_partition
                && next_size
                    > MAX_INDEX_SEGMENT_SIZE - (MAX_GOP_SIZE_GUESS * self.entry_size) as usize)
    }

    fn add_index_entry(&mut self, entry: &IndexEntry, stream_offset: i64, slice_cp_offsets: &[u32]) {
        debug_assert_eq!(self.entry_size as usize, 11 + slice_cp_offsets.len() * 4);

        self.entries.push(entry.temporal_offset as u8);
        self.entries.push(entry.key_frame_offset as u8);
        self.entries.push(entry.flags);
        self.entries.extend_from_slice(&stream_offset.to_be_bytes());
        for offset in slice_cp_offsets {
            self.entries.extend_from_slice(&offset.to_be_bytes());
        }

        self.header.duration += 1;
    }

    fn update_temporal_offset(&mut self, segment_position: i64, temporal_offset: i8) -> Result<()> {
        let byte_index = segment_position * self.entry_size as i64;
        if segment_position < 0 || byte_index as usize >= self.entries.len() {
            return Err(MxfError::IndexInvariantViolation(format!(
                "Index entry position {} is outside the serialized segment",
                segment_position
            )));
        }
        self.entries[byte_index as usize] = temporal_offset as u8;
        Ok(())
    }

    fn add_cbe_entry(&mut self, edit_unit_byte_count: u32) -> Result<()> {
        if self.header.edit_unit_byte_count == 0 {
            self.header.edit_unit_byte_count = edit_unit_byte_count;
        } else if self.header.edit_unit_byte_count != edit_unit_byte_count {
            return Err(MxfError::IndexInvariantViolation(format!(
                "Content package size changed from {} to {} in a CBE index table",
                self.header.edit_unit_byte_count, edit_unit_byte_count
            )));
        }
        self.header.duration += 1;
        Ok(())
    }

    fn duration(&self) -> i64 {
        self.header.duration
    }
}

/// The index table builder for one essence container.
pub struct IndexTable {
    index_sid: u32,
    body_sid: u32,
    edit_rate: Rational,
    elements: Vec<IndexElement>,
    is_cbe: bool,
    have_avci: bool,
    slice_count: u8,
    entry_size: u32,
    avci_first_segment: Option<IndexSegment>,
    segments: Vec<IndexSegment>,
    delta_entries: Vec<DeltaEntry>,
    duration: i64,
    stream_offset: i64,
    prepared: bool,
}

impl IndexTable {
    /// Create an index table builder.
    pub fn new(index_sid: u32, body_sid: u32, edit_rate: Rational) -> Self {
        IndexTable {
            index_sid,
            body_sid,
            edit_rate,
            elements: Vec::new(),
            is_cbe: true,
            have_avci: false,
            slice_count: 0,
            entry_size: 0,
            avci_first_segment: None,
            segments: Vec::new(),
            delta_entries: Vec::new(),
            duration: 0,
            stream_offset: 0,
            prepared: false,
        }
    }

    /// Register a picture element.
    pub fn register_picture_element(
        &mut self,
        track_index: u32,
        is_cbe: bool,
        apply_temporal_reordering: bool,
    ) {
        self.elements.push(IndexElement::new(
            track_index,
            true,
            is_cbe,
            apply_temporal_reordering,
        ));
        self.is_cbe &= is_cbe;
    }

    /// Register an AVC-Intra picture element whose first edit unit carries
    /// prepended parameter sets.
    pub fn register_avc_intra_element(&mut self, track_index: u32) {
        self.elements.push(IndexElement::new(track_index, true, true, false));
        self.have_avci = true;
    }

    /// Register a sound element.
    pub fn register_sound_element(&mut self, track_index: u32) {
        self.elements.push(IndexElement::new(track_index, false, true, false));
    }

    /// Freeze the element order, assign slices and create the initial
    /// segment.
    pub fn prepare_write(&mut self) {
        // picture elements first, stable for ties
        self.elements.sort_by_key(|element| !element.is_picture);

        self.entry_size = 11;
        self.slice_count = 0;
        for i in 0..self.elements.len() {
            if i > 0 && !self.elements[i - 1].is_cbe {
                self.slice_count += 1;
                self.entry_size += 4;
            }
            self.elements[i].slice_offset = self.slice_count;
        }
        debug_assert!(!self.is_cbe || self.slice_count == 0);

        self.segments.push(IndexSegment::new(
            self.index_sid,
            self.body_sid,
            self.edit_rate,
            0,
            self.entry_size,
            self.slice_count,
        ));
        if self.have_avci && self.is_cbe {
            self.avci_first_segment = Some(IndexSegment::new(
                self.index_sid,
                self.body_sid,
                self.edit_rate,
                0,
                self.entry_size,
                self.slice_count,
            ));
        }
        self.prepared = true;
    }

    /// Whether every registered element is CBE.
    pub fn is_cbe(&self) -> bool {
        self.is_cbe
    }

    /// Bytes of one index entry: `11 + 4 * slice_count`.
    pub fn index_entry_size(&self) -> u32 {
        self.entry_size
    }

    /// Number of slices in each index entry.
    pub fn slice_count(&self) -> u8 {
        self.slice_count
    }

    /// The current duration in edit units.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// The frozen element order as registered track indexes.
    pub fn element_order(&self) -> Vec<u32> {
        self.elements.iter().map(|e| e.track_index).collect()
    }

    /// Derive the delta entries from nominal element sizes so that a CBE
    /// placeholder serializes with its final layout.
    pub fn set_nominal_element_sizes(&mut self, element_sizes: &[u32]) -> Result<()> {
        if element_sizes.len() != self.elements.len() {
            return Err(MxfError::InvalidArgument(format!(
                "{} element sizes supplied for {} registered elements",
                element_sizes.len(),
                self.elements.len()
            )));
        }
        self.derive_delta_entries(element_sizes, false);
        Ok(())
    }

    /// Cache a VBE index entry for a later edit unit.
    pub fn add_index_entry(
        &mut self,
        track_index: u32,
        position: i64,
        entry: IndexEntry,
    ) -> Result<()> {
        if self.is_cbe {
            return Err(MxfError::IndexInvariantViolation(
                "Cannot add VBE index entries to a CBE index table".to_string(),
            ));
        }
        if position < self.duration {
            return Err(MxfError::IndexInvariantViolation(format!(
                "Index entry position {} is before the current duration {}",
                position, self.duration
            )));
        }
        self.element_mut(track_index)?.cache_entry(position, entry)
    }

    /// Patch the temporal offset of the entry at `position`: in the cache if
    /// the edit unit has not been indexed yet, otherwise in the serialized
    /// segment bytes.
    pub fn update_index_entry(
        &mut self,
        track_index: u32,
        position: i64,
        temporal_offset: i8,
    ) -> Result<()> {
        if self.is_cbe {
            return Err(MxfError::IndexInvariantViolation(
                "Cannot update VBE index entries in a CBE index table".to_string(),
            ));
        }
        if position < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Negative index entry position {}",
                position
            )));
        }

        if position >= self.duration {
            return self
                .element_mut(track_index)?
                .update_cached(position, temporal_offset);
        }

        let mut end_offset = self.duration - position;
        let mut i = self.segments.len();
        loop {
            if i == 0 {
                return Err(MxfError::IndexInvariantViolation(format!(
                    "Index entry position {} is not held in any segment",
                    position
                )));
            }
            i -= 1;
            if end_offset <= self.segments[i].duration() {
                break;
            }
            end_offset -= self.segments[i].duration();
        }
        let segment = &mut self.segments[i];
        segment.update_temporal_offset(segment.duration() - end_offset, temporal_offset)
    }

    /// Whether a new body partition may start at the current edit unit.
    pub fn can_start_partition(&self) -> bool {
        if self.is_cbe {
            return true;
        }
        self.elements
            .iter()
            .all(|element| element.can_start_partition(self.duration))
    }

    /// Index one content package.
    ///
    /// `size` is the total byte count of the edit unit and `element_sizes`
    /// the per-element byte counts in the frozen element order.
    pub fn update_index(&mut self, size: u32, element_sizes: &[u32]) -> Result<()> {
        if !self.prepared {
            return Err(MxfError::StateMisuse {
                operation: "update_index",
                state: "not prepared",
            });
        }
        if element_sizes.len() != self.elements.len() {
            return Err(MxfError::InvalidArgument(format!(
                "{} element sizes supplied for {} registered elements",
                element_sizes.len(),
                self.elements.len()
            )));
        }

        if self.duration == 0 || (self.avci_first_segment.is_some() && self.duration == 1) {
            self.derive_delta_entries(element_sizes, true);
        } else {
            for (element, &element_size) in self.elements.iter().zip(element_sizes) {
                if element.is_cbe && element.element_size != element_size {
                    return Err(MxfError::IndexInvariantViolation(format!(
                        "Fixed size element for track {} changed from {} to {} bytes",
                        element.track_index, element.element_size, element_size
                    )));
                }
            }
        }

        if self.is_cbe {
            self.update_cbe_index(size, element_sizes)?;
        } else {
            self.update_vbe_index(element_sizes)?;
        }

        self.duration += 1;
        self.stream_offset += size as i64;
        Ok(())
    }

    fn update_cbe_index(&mut self, size: u32, element_sizes: &[u32]) -> Result<()> {
        if self.duration == 0 && self.avci_first_segment.is_some() {
            if let Some(first) = self.avci_first_segment.as_mut() {
                first.add_cbe_entry(size)?;
            }
            self.segments[0].header.start_position = 1;
            return Ok(());
        }

        // drop the first segment when the parameter sets turn out to be
        // included in every frame and the sizes match the later edit units
        if self.duration == 1 {
            let first_matches = self
                .avci_first_segment
                .as_ref()
                .map(|first| first.header.edit_unit_byte_count == size)
                .unwrap_or(false);
            if first_matches {
                let elements_match = self
                    .elements
                    .iter()
                    .zip(element_sizes)
                    .all(|(element, &element_size)| {
                        !element.is_cbe || element.element_size == element_size
                    });
                if elements_match {
                    self.avci_first_segment = None;
                    self.segments[0].header.start_position = 0;
                    self.segments[0].add_cbe_entry(size)?;
                }
            }
        }

        self.segments[0].add_cbe_entry(size)
    }

    fn update_vbe_index(&mut self, element_sizes: &[u32]) -> Result<()> {
        // consult the caches before any entry is taken
        let can_start_partition = self.can_start_partition();

        let mut entry = IndexEntry::default();
        let mut slice_cp_offsets = Vec::with_capacity(self.slice_count as usize);
        let mut slice_cp_offset = 0u32;
        let mut prev_slice_offset = 0u8;
        let duration = self.duration;

        for (element, &element_size) in self.elements.iter_mut().zip(element_sizes) {
            if let Some(element_entry) = element.take_entry(duration) {
                if !element_entry.is_default() {
                    if !entry.is_compatible(&element_entry) {
                        return Err(MxfError::IndexInvariantViolation(format!(
                            "Incompatible index entries at position {}",
                            duration
                        )));
                    }
                    entry = element_entry;
                }
            }

            if element.slice_offset != prev_slice_offset {
                slice_cp_offsets.push(slice_cp_offset);
                prev_slice_offset = element.slice_offset;
            }
            slice_cp_offset += element_size;
        }

        let need_new_segment = match self.segments.last() {
            Some(segment) => segment.require_new_segment(can_start_partition),
            None => true,
        };
        if need_new_segment {
            self.segments.push(IndexSegment::new(
                self.index_sid,
                self.body_sid,
                self.edit_rate,
                self.duration,
                self.entry_size,
                self.slice_count,
            ));
        }

        let stream_offset = self.stream_offset;
        if let Some(segment) = self.segments.last_mut() {
            segment.add_index_entry(&entry, stream_offset, &slice_cp_offsets);
        }
        Ok(())
    }

    fn derive_delta_entries(&mut self, element_sizes: &[u32], record_element_sizes: bool) {
        self.delta_entries.clear();

        let mut prev_slice_offset = 0u8;
        let mut element_delta = 0u32;
        for (element, &element_size) in self.elements.iter_mut().zip(element_sizes) {
            if element.slice_offset != prev_slice_offset {
                element_delta = 0;
            }

            self.delta_entries.push(DeltaEntry {
                pos_table_index: if element.apply_temporal_reordering { -1 } else { 0 },
                slice: element.slice_offset,
                element_delta,
            });

            prev_slice_offset = element.slice_offset;
            element_delta += element_size;

            if record_element_sizes && element.is_cbe {
                element.element_size = element_size;
            }
        }

        // a single all-zero delta entry carries no information
        if self.delta_entries.len() == 1 && self.delta_entries[0] == DeltaEntry::default() {
            self.delta_entries.clear();
        }
    }

    fn element_mut(&mut self, track_index: u32) -> Result<&mut IndexElement> {
        self.elements
            .iter_mut()
            .find(|element| element.track_index == track_index)
            .ok_or_else(|| {
                MxfError::InvalidArgument(format!(
                    "Track index {} is not registered with the index table",
                    track_index
                ))
            })
    }

    /// Whether any index segments would be written.
    pub fn have_segments(&self) -> bool {
        self.is_cbe || self.segments.first().map(|s| s.duration() > 0).unwrap_or(false)
    }

    /// Write the CBE segment(s). Used both for the placeholder at prepare
    /// time and for the in-place rewrite at complete time.
    pub fn write_cbe_segments<W: Write + Seek>(&self, file: &mut MxfFile<W>) -> Result<u64> {
        if !self.is_cbe {
            return Err(MxfError::IndexInvariantViolation(
                "Cannot write CBE segments for a VBE index table".to_string(),
            ));
        }

        let min_llen = file.min_llen();
        let mut written = 0u64;
        if let Some(first) = &self.avci_first_segment {
            let body = serialize_segment(&first.header, &self.delta_entries, None)?;
            written += write_klv(file, &labels::INDEX_TABLE_SEGMENT, &body, min_llen)? as u64;
        }
        // with a separate first segment, the main segment is only omitted
        // when exactly one edit unit was written
        if self.avci_first_segment.is_none() || self.duration != 1 {
            let body = serialize_segment(&self.segments[0].header, &self.delta_entries, None)?;
            written += write_klv(file, &labels::INDEX_TABLE_SEGMENT, &body, min_llen)? as u64;
        }
        Ok(written)
    }

    /// Stream out all VBE segments, draining them.
    pub fn write_vbe_segments<W: Write + Seek>(&mut self, file: &mut MxfFile<W>) -> Result<u64> {
        if self.is_cbe {
            return Err(MxfError::IndexInvariantViolation(
                "Cannot write VBE segments for a CBE index table".to_string(),
            ));
        }
        if !self.have_segments() {
            return Err(MxfError::IndexInvariantViolation(
                "No index segments to write".to_string(),
            ));
        }

        let min_llen = file.min_llen();
        let mut written = 0u64;
        for segment in self.segments.drain(..) {
            let body = serialize_segment(
                &segment.header,
                &self.delta_entries,
                Some((segment.entry_size, &segment.entries)),
            )?;
            written += write_klv(file, &labels::INDEX_TABLE_SEGMENT, &body, min_llen)? as u64;
        }
        Ok(written)
    }
}
