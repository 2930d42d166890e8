//! The OP-1a clip writer.
//!
//! One file, one material package and one file source package whose timeline
//! tracks cover every essence stream. Frame-wrapped clips interleave one
//! content package per edit unit; a clip holding only a single sound stream
//! is clip-wrapped at the sampling rate.

use crate::content::Stream;
use mxfwrite_core::{rounded_tc_base, Rational, Timecode, Umid};
use mxfwrite_format::descriptor::EssenceConfig;
use mxfwrite_format::error::{MxfError, Result};
use mxfwrite_format::file::MxfFile;
use mxfwrite_format::index::{CbeIndexSegment, IndexEntry, IndexTable};
use mxfwrite_format::klv::{encode_ber_length, write_klv, KEY_SIZE};
use mxfwrite_format::metadata::{
    ContentStorage, Descriptor, EssenceContainerData, FileDescriptorCommon, HeaderMetadata,
    Identification, MetadataSet, MultipleDescriptor, Package, Preface, Sequence, SetId,
    SourceClip, TimecodeComponent, Track,
};
use mxfwrite_format::partition::Partition;
use mxfwrite_format::ul::{essence_track_number, labels, UL};
use mxfwrite_format::writer::{ClipInfo, TIMECODE_TRACK_ID};
use std::io::{Seek, Write};

const FIRST_VIDEO_TRACK_ID: u32 = 1001;
const FIRST_AUDIO_TRACK_ID: u32 = 2001;
const INDEX_SID: u32 = 1;
const BODY_SID: u32 = 2;

/// Configuration of an OP-1a clip.
#[derive(Debug, Clone)]
pub struct Op1aClipConfig {
    /// The clip frame rate driving content package interleaving.
    pub frame_rate: Rational,
    /// Clip-level identity written into the header metadata.
    pub info: ClipInfo,
    pub kag_size: u32,
    pub min_llen: u8,
    pub reserve_min_bytes: u32,
}

impl Op1aClipConfig {
    /// Defaults for a frame rate.
    pub fn new(frame_rate: Rational) -> Self {
        let info = ClipInfo {
            start_timecode: Timecode::from_offset(rounded_tc_base(frame_rate), false, 0),
            ..ClipInfo::default()
        };
        Op1aClipConfig {
            frame_rate,
            info,
            kag_size: 1,
            min_llen: 4,
            reserve_min_bytes: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Prepared,
    Writing,
    Completed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "new",
            State::Prepared => "prepared",
            State::Writing => "writing",
            State::Completed => "completed",
        }
    }
}

/// Writes one OP-1a file holding several essence streams.
pub struct Op1aClip<W: Write + Seek> {
    file: MxfFile<W>,
    config: Op1aClipConfig,
    streams: Vec<Stream>,
    element_order: Vec<usize>,
    state: State,
    clip_wrapped: bool,
    index_table: Option<IndexTable>,
    cbe_segment: Option<CbeIndexSegment>,
    header_metadata: HeaderMetadata,
    material_package: Option<SetId>,
    file_package: Option<SetId>,
    file_package_uid: Umid,
    edit_units_written: i64,
    container_size: i64,
    header_metadata_start_pos: u64,
    header_metadata_end_pos: u64,
    index_table_start_pos: u64,
    index_table_end_pos: u64,
    clip_kl_pos: Option<u64>,
    end_pos: u64,
}

impl<W: Write + Seek> Op1aClip<W> {
    /// Create a clip writer over a seekable sink.
    pub fn new(sink: W, config: Op1aClipConfig) -> Self {
        let mut file = MxfFile::new(sink);
        file.set_min_llen(config.min_llen);
        Op1aClip {
            file,
            config,
            streams: Vec::new(),
            element_order: Vec::new(),
            state: State::New,
            clip_wrapped: false,
            index_table: None,
            cbe_segment: None,
            header_metadata: HeaderMetadata::new(),
            material_package: None,
            file_package: None,
            file_package_uid: Umid::generate(),
            edit_units_written: 0,
            container_size: 0,
            header_metadata_start_pos: 0,
            header_metadata_end_pos: 0,
            index_table_start_pos: 0,
            index_table_end_pos: 0,
            clip_kl_pos: None,
            end_pos: 0,
        }
    }

    /// Register an essence stream, returning its track index.
    pub fn add_track(&mut self, essence: EssenceConfig) -> Result<u32> {
        if self.state != State::New {
            return Err(MxfError::StateMisuse {
                operation: "add_track",
                state: self.state.name(),
            });
        }
        essence.validate()?;

        let is_picture = essence.essence_type.is_picture();
        if is_picture && essence.sample_rate != self.config.frame_rate {
            return Err(MxfError::InvalidArgument(format!(
                "Picture sample rate {} does not match the clip frame rate {}",
                essence.sample_rate, self.config.frame_rate
            )));
        }

        let same_kind = self
            .streams
            .iter()
            .filter(|stream| stream.essence.essence_type.is_picture() == is_picture)
            .count() as u32;
        let element_key = essence.element_key((same_kind + 1) as u8);
        let track_id = if is_picture {
            FIRST_VIDEO_TRACK_ID + same_kind
        } else {
            FIRST_AUDIO_TRACK_ID + same_kind
        };

        self.streams.push(Stream::new(essence, element_key, track_id));
        Ok(self.streams.len() as u32 - 1)
    }

    /// Freeze the element order, build the header metadata and write the
    /// header, index placeholder and essence partitions.
    pub fn prepare_write(&mut self) -> Result<()> {
        if self.state != State::New {
            return Err(MxfError::StateMisuse {
                operation: "prepare_write",
                state: self.state.name(),
            });
        }
        if self.streams.is_empty() {
            return Err(MxfError::InvalidArgument(
                "OP-1a clip has no tracks".to_string(),
            ));
        }

        // pictures first, stable for ties
        let mut order: Vec<usize> = (0..self.streams.len()).collect();
        order.sort_by_key(|&i| !self.streams[i].essence.essence_type.is_picture());
        self.element_order = order;

        self.clip_wrapped = self.streams.len() == 1
            && !self.streams[0].essence.essence_type.is_picture();

        if self.clip_wrapped {
            let stream = &self.streams[0];
            self.cbe_segment = Some(CbeIndexSegment::new(
                INDEX_SID,
                BODY_SID,
                stream.essence.sample_rate,
                stream.essence.block_align() as u32,
            ));
        } else {
            for index in 0..self.streams.len() {
                self.streams[index].resolve_samples_per_edit_unit(self.config.frame_rate)?;
            }

            let mut index_table = IndexTable::new(INDEX_SID, BODY_SID, self.config.frame_rate);
            for &i in &self.element_order {
                let stream = &self.streams[i];
                let essence_type = stream.essence.essence_type;
                if essence_type.is_avc_intra() {
                    index_table.register_avc_intra_element(i as u32);
                } else if essence_type.is_picture() {
                    index_table.register_picture_element(
                        i as u32,
                        essence_type.is_cbe(),
                        essence_type.apply_temporal_reordering(),
                    );
                } else {
                    index_table.register_sound_element(i as u32);
                }
            }
            index_table.prepare_write();

            if index_table.is_cbe() {
                let nominal: Vec<u32> = self
                    .element_order
                    .iter()
                    .map(|&i| {
                        let stream = &self.streams[i];
                        let payload = if stream.essence.essence_type.is_picture() {
                            stream.essence.sample_size()
                        } else {
                            stream.samples_per_edit_unit * stream.essence.block_align() as u32
                        };
                        KEY_SIZE as u32 + self.config.min_llen as u32 + payload
                    })
                    .collect();
                index_table.set_nominal_element_sizes(&nominal)?;
            }
            self.index_table = Some(index_table);
        }

        self.build_header_metadata();

        let operational_pattern = self.operational_pattern();
        let essence_containers: Vec<UL> = self.essence_containers();

        // header partition pack
        let mut header = Partition::header();
        header.kag_size = self.config.kag_size;
        header.operational_pattern = operational_pattern;
        for ec in &essence_containers {
            header.add_essence_container(*ec);
        }
        let header_index = self.file.create_partition(header)?;
        self.file.fill_to_kag()?;

        // header metadata padded to the byte reserve
        self.header_metadata_start_pos = self.file.tell()?;
        self.header_metadata.write(&mut self.file)?;
        let target = self.file.tell()? + self.config.reserve_min_bytes as u64;
        let target = self.kag_aligned(target, header_index);
        self.file.fill_to_position(target)?;
        self.header_metadata_end_pos = self.file.tell()?;
        self.file.partition_mut(header_index).header_byte_count =
            self.header_metadata_end_pos - self.header_metadata_start_pos;

        // CBE index placeholder partition
        let write_cbe_placeholder =
            self.cbe_segment.is_some() || self.index_table.as_ref().map(|t| t.is_cbe()) == Some(true);
        if write_cbe_placeholder {
            let mut index_partition = Partition::body();
            index_partition.kag_size = self.config.kag_size;
            index_partition.operational_pattern = operational_pattern;
            index_partition.index_sid = INDEX_SID;
            let partition_index = self.file.create_partition(index_partition)?;
            self.file.fill_to_kag()?;

            self.index_table_start_pos = self.file.tell()?;
            if let Some(segment) = &self.cbe_segment {
                segment.write(&mut self.file)?;
            } else if let Some(index_table) = &self.index_table {
                index_table.write_cbe_segments(&mut self.file)?;
            }
            self.file.fill_to_kag()?;
            self.index_table_end_pos = self.file.tell()?;
            self.file.partition_mut(partition_index).index_byte_count =
                self.index_table_end_pos - self.index_table_start_pos;
        }

        // essence body partition pack
        let mut essence_partition = Partition::body();
        essence_partition.kag_size = self.config.kag_size;
        essence_partition.operational_pattern = operational_pattern;
        essence_partition.body_sid = BODY_SID;
        for ec in &essence_containers {
            essence_partition.add_essence_container(*ec);
        }
        self.file.create_partition(essence_partition)?;
        self.file.fill_to_kag()?;

        if self.clip_wrapped {
            self.clip_kl_pos = Some(self.file.tell()?);
            let element_key = self.streams[0].element_key;
            self.file.write_all(&element_key)?;
            self.file.write_all(&encode_ber_length(0, 8))?;
        }

        self.state = State::Prepared;
        Ok(())
    }

    /// Write samples for one track. Complete content packages are flushed as
    /// soon as every stream holds one edit unit.
    pub fn write_samples(&mut self, track_index: u32, data: &[u8], num_samples: u32) -> Result<()> {
        if self.state != State::Prepared && self.state != State::Writing {
            return Err(MxfError::StateMisuse {
                operation: "write_samples",
                state: self.state.name(),
            });
        }
        let stream_count = self.streams.len() as u32;
        if track_index >= stream_count {
            return Err(MxfError::InvalidArgument(format!(
                "Track index {} is out of range for {} tracks",
                track_index, stream_count
            )));
        }

        if self.clip_wrapped {
            let stream = &mut self.streams[track_index as usize];
            let block_align = stream.essence.block_align() as u64;
            if data.len() as u64 != num_samples as u64 * block_align {
                return Err(MxfError::InvalidArgument(format!(
                    "{} bytes do not hold {} samples of {} bytes",
                    data.len(),
                    num_samples,
                    block_align
                )));
            }
            self.file.write_all(data)?;
            stream.container_duration += num_samples as i64;
            self.container_size += data.len() as i64;
        } else {
            self.streams[track_index as usize].push(data, num_samples)?;
            self.flush_content_packages()?;
        }

        self.state = State::Writing;
        Ok(())
    }

    /// Cache a VBE index entry for a track's upcoming edit unit.
    pub fn add_index_entry(
        &mut self,
        track_index: u32,
        position: i64,
        entry: IndexEntry,
    ) -> Result<()> {
        match self.index_table.as_mut() {
            Some(index_table) => index_table.add_index_entry(track_index, position, entry),
            None => Err(MxfError::IndexInvariantViolation(
                "Clip has no VBE index table".to_string(),
            )),
        }
    }

    /// Patch a temporal offset once the reordering is known.
    pub fn update_index_entry(
        &mut self,
        track_index: u32,
        position: i64,
        temporal_offset: i8,
    ) -> Result<()> {
        match self.index_table.as_mut() {
            Some(index_table) => {
                index_table.update_index_entry(track_index, position, temporal_offset)
            }
            None => Err(MxfError::IndexInvariantViolation(
                "Clip has no VBE index table".to_string(),
            )),
        }
    }

    /// Whether a new body partition could start at the current edit unit.
    pub fn can_start_partition(&self) -> bool {
        match &self.index_table {
            Some(index_table) => index_table.can_start_partition(),
            None => true,
        }
    }

    /// Write the footer, Random Index Pack and all in-place rewrites.
    pub fn complete_write(&mut self) -> Result<()> {
        if self.state != State::Prepared && self.state != State::Writing {
            return Err(MxfError::StateMisuse {
                operation: "complete_write",
                state: self.state.name(),
            });
        }

        if !self.clip_wrapped {
            for &i in &self.element_order {
                let leftover = self.streams[i].leftover_bytes();
                if leftover > 0 {
                    log::warn!(
                        "Dropping {} buffered bytes of an incomplete content package on track {}",
                        leftover,
                        i
                    );
                }
            }
        }

        // finalize the clip-wrapped KLV length
        if let Some(clip_kl_pos) = self.clip_kl_pos {
            let end = self.file.tell()?;
            self.file.seek_to(clip_kl_pos + KEY_SIZE as u64)?;
            self.file
                .write_all(&encode_ber_length(self.container_size as u64, 8))?;
            self.file.seek_to(end)?;
        }

        // trailing index partition for VBE segments
        let have_vbe_segments = self
            .index_table
            .as_ref()
            .map(|t| !t.is_cbe() && t.have_segments() && t.duration() > 0)
            .unwrap_or(false);
        if have_vbe_segments {
            let mut index_partition = Partition::body();
            index_partition.kag_size = self.config.kag_size;
            index_partition.operational_pattern = self.operational_pattern();
            index_partition.index_sid = INDEX_SID;
            let partition_index = self.file.create_partition(index_partition)?;
            self.file.fill_to_kag()?;
            let index_start = self.file.tell()?;
            if let Some(index_table) = self.index_table.as_mut() {
                index_table.write_vbe_segments(&mut self.file)?;
            }
            self.file.fill_to_kag()?;
            let index_end = self.file.tell()?;
            self.file.partition_mut(partition_index).index_byte_count = index_end - index_start;
        }

        // final durations in both packages and the descriptors
        self.update_durations();

        // footer partition and RIP
        let mut footer = Partition::footer();
        footer.kag_size = self.config.kag_size;
        footer.operational_pattern = self.operational_pattern();
        self.file.create_partition(footer)?;
        self.file.fill_to_kag()?;
        self.file.write_rip()?;
        self.end_pos = self.file.tell()?;

        // rewrite the header metadata within the reserved span
        self.file.seek_to(self.header_metadata_start_pos)?;
        self.header_metadata.write(&mut self.file)?;
        self.file.fill_to_position(self.header_metadata_end_pos)?;

        // rewrite the CBE index with the final duration
        if let Some(segment) = self.cbe_segment.as_mut() {
            segment.set_duration(self.streams[0].container_duration);
            self.file.seek_to(self.index_table_start_pos)?;
            segment.write(&mut self.file)?;
            self.file.fill_to_position(self.index_table_end_pos)?;
        } else if self.index_table.as_ref().map(|t| t.is_cbe()) == Some(true) {
            self.file.seek_to(self.index_table_start_pos)?;
            if let Some(index_table) = &self.index_table {
                index_table.write_cbe_segments(&mut self.file)?;
            }
            self.file.fill_to_position(self.index_table_end_pos)?;
        }

        // upgrade partition keys and rewrite the packs in place
        for i in 0..self.file.partitions().len() {
            self.file.partition_mut(i).set_closed_complete();
        }
        self.file.update_partitions()?;

        self.file.seek_to(self.end_pos)?;
        self.file.flush()?;
        self.state = State::Completed;
        Ok(())
    }

    fn flush_content_packages(&mut self) -> Result<()> {
        let order = self.element_order.clone();
        loop {
            let complete = order.iter().all(|&i| self.streams[i].has_edit_unit());
            if !complete {
                return Ok(());
            }

            let mut element_sizes = Vec::with_capacity(order.len());
            let mut total = 0u32;
            for &i in &order {
                let chunk = self.streams[i].pop_edit_unit();
                let element_key = self.streams[i].element_key;
                let written =
                    write_klv(&mut self.file, &element_key, &chunk, self.config.min_llen)?;
                element_sizes.push(written as u32);
                total += written as u32;
            }

            if let Some(index_table) = self.index_table.as_mut() {
                index_table.update_index(total, &element_sizes)?;
            }
            self.edit_units_written += 1;
            self.container_size += total as i64;
        }
    }

    fn operational_pattern(&self) -> UL {
        if self.streams.len() > 1 {
            labels::OP_1A_MULTITRACK
        } else {
            labels::OP_1A_UNITRACK
        }
    }

    fn essence_containers(&self) -> Vec<UL> {
        let mut containers = Vec::new();
        for stream in &self.streams {
            let ul = stream.essence.essence_container_ul(self.clip_wrapped);
            if !containers.contains(&ul) {
                containers.push(ul);
            }
        }
        if self.streams.len() > 1 {
            containers.insert(0, labels::EC_GENERIC_MULTIPLE);
        }
        containers
    }

    fn timecode_rate(&self) -> Rational {
        if self.clip_wrapped {
            self.streams[0].essence.sample_rate
        } else {
            self.config.frame_rate
        }
    }

    fn build_header_metadata(&mut self) {
        let info = self.config.info.clone();
        let date = info.creation_date;
        let operational_pattern = self.operational_pattern();
        let essence_containers = self.essence_containers();
        let timecode_rate = self.timecode_rate();
        let hm = &mut self.header_metadata;

        let mut preface = Preface::new(operational_pattern, date);
        preface.essence_containers = essence_containers;
        hm.add(MetadataSet::Preface(preface));

        let identification_id = hm.add(MetadataSet::Identification(Identification {
            this_generation_uid: info.generation_uid,
            company_name: info.company_name.clone(),
            product_name: info.product_name.clone(),
            version_string: info.version_string.clone(),
            product_uid: info.product_uid,
            product_version: info.product_version,
            modification_date: date,
        }));

        let content_storage_id = hm.add(MetadataSet::ContentStorage(ContentStorage::default()));
        let ecd_id = hm.add(MetadataSet::EssenceContainerData(EssenceContainerData {
            linked_package_uid: self.file_package_uid,
            index_sid: INDEX_SID,
            body_sid: BODY_SID,
        }));

        // material package
        let mut material = Package::new(Umid::generate(), date);
        material.name = info.clip_name.clone();

        let tc_sequence = hm.add(MetadataSet::Sequence(Sequence::new(labels::DDEF_TIMECODE)));
        let tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
            duration: -1,
            rounded_tc_base: info.start_timecode.rounded_tc_base(),
            drop_frame: info.start_timecode.is_drop_frame(),
            start_timecode: info.start_timecode.offset(),
        }));
        if let Some(sequence) = hm.sequence_mut(tc_sequence) {
            sequence.components.push(tc_component);
        }
        let material_tc_track = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: TIMECODE_TRACK_ID,
            track_number: 0,
            track_name: Some("TC1".to_string()),
            edit_rate: timecode_rate,
            origin: 0,
            sequence: Some(tc_sequence),
        }));
        material.tracks.push(material_tc_track);

        let mut file_package = Package::new(self.file_package_uid, date);

        let sp_tc_sequence = hm.add(MetadataSet::Sequence(Sequence::new(labels::DDEF_TIMECODE)));
        let sp_tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
            duration: -1,
            rounded_tc_base: info.start_timecode.rounded_tc_base(),
            drop_frame: info.start_timecode.is_drop_frame(),
            start_timecode: info.start_timecode.offset(),
        }));
        if let Some(sequence) = hm.sequence_mut(sp_tc_sequence) {
            sequence.components.push(sp_tc_component);
        }
        let sp_tc_track = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: TIMECODE_TRACK_ID,
            track_number: 0,
            track_name: Some("TC1".to_string()),
            edit_rate: timecode_rate,
            origin: 0,
            sequence: Some(sp_tc_sequence),
        }));
        file_package.tracks.push(sp_tc_track);

        let mut video_number = 0u32;
        let mut audio_number = 0u32;
        for &i in &self.element_order.clone() {
            let (essence_sample_rate, is_picture, track_id, element_key) = {
                let stream = &self.streams[i];
                (
                    stream.essence.sample_rate,
                    stream.essence.essence_type.is_picture(),
                    stream.track_id,
                    stream.element_key,
                )
            };
            let data_definition = if is_picture {
                labels::DDEF_PICTURE
            } else {
                labels::DDEF_SOUND
            };
            let track_name = if is_picture {
                video_number += 1;
                format!("V{}", video_number)
            } else {
                audio_number += 1;
                format!("A{}", audio_number)
            };

            // material package timeline track referencing the file package
            let material_clip = hm.add(MetadataSet::SourceClip(SourceClip {
                data_definition,
                duration: -1,
                start_position: 0,
                source_package_id: self.file_package_uid,
                source_track_id: track_id,
            }));
            let mut material_sequence = Sequence::new(data_definition);
            material_sequence.components.push(material_clip);
            let material_sequence_id = hm.add(MetadataSet::Sequence(material_sequence));
            let material_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id,
                track_number: 0,
                track_name: Some(track_name.clone()),
                edit_rate: essence_sample_rate,
                origin: 0,
                sequence: Some(material_sequence_id),
            }));
            material.tracks.push(material_track);

            // file package timeline track holding the essence
            let sp_clip = hm.add(MetadataSet::SourceClip(SourceClip {
                data_definition,
                duration: -1,
                start_position: 0,
                source_package_id: Umid::default(),
                source_track_id: 0,
            }));
            let mut sp_sequence = Sequence::new(data_definition);
            sp_sequence.components.push(sp_clip);
            let sp_sequence_id = hm.add(MetadataSet::Sequence(sp_sequence));
            let sp_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id,
                track_number: essence_track_number(&element_key),
                track_name: Some(track_name),
                edit_rate: essence_sample_rate,
                origin: 0,
                sequence: Some(sp_sequence_id),
            }));
            file_package.tracks.push(sp_track);
        }

        // descriptor: one file descriptor, or a multiple descriptor wrapping
        // one sub-descriptor per stream
        let descriptor_id = if self.streams.len() == 1 {
            let stream = &self.streams[0];
            stream
                .essence
                .build_descriptor(hm, stream.track_id, self.clip_wrapped)
        } else {
            let mut sub_descriptors = Vec::with_capacity(self.streams.len());
            for &i in &self.element_order.clone() {
                let (essence, track_id) = {
                    let stream = &self.streams[i];
                    (stream.essence.clone(), stream.track_id)
                };
                sub_descriptors.push(essence.build_descriptor(hm, track_id, false));
            }
            hm.add(MetadataSet::Descriptor(Descriptor::Multiple(
                MultipleDescriptor {
                    common: FileDescriptorCommon {
                        linked_track_id: 0,
                        sample_rate: self.config.frame_rate,
                        container_duration: -1,
                        essence_container: labels::EC_GENERIC_MULTIPLE,
                    },
                    sub_descriptors,
                },
            )))
        };
        file_package.descriptor = Some(descriptor_id);

        let material_id = hm.add(MetadataSet::MaterialPackage(material));
        let file_package_id = hm.add(MetadataSet::SourcePackage(file_package));

        match hm.get_mut(content_storage_id) {
            MetadataSet::ContentStorage(cs) => {
                cs.packages.push(material_id);
                cs.packages.push(file_package_id);
                cs.essence_container_data.push(ecd_id);
            }
            _ => unreachable!("content storage id references a content storage set"),
        }
        if let Some(preface) = hm.preface_mut() {
            preface.identifications.push(identification_id);
            preface.content_storage = Some(content_storage_id);
            preface.primary_package = Some(file_package_id);
        }

        self.material_package = Some(material_id);
        self.file_package = Some(file_package_id);
    }

    fn stream_duration(&self, stream: &Stream) -> i64 {
        if self.clip_wrapped {
            stream.container_duration
        } else {
            self.edit_units_written * stream.samples_per_edit_unit as i64
        }
    }

    fn timecode_duration(&self) -> i64 {
        if self.clip_wrapped {
            self.streams[0].container_duration
        } else {
            self.edit_units_written
        }
    }

    fn update_durations(&mut self) {
        let mut durations: Vec<(u32, i64)> = vec![(TIMECODE_TRACK_ID, self.timecode_duration())];
        for stream in &self.streams {
            durations.push((stream.track_id, self.stream_duration(stream)));
        }

        for package_id in [self.material_package, self.file_package].into_iter().flatten() {
            let track_ids = match self.header_metadata.package(package_id) {
                Some(package) => package.tracks.clone(),
                None => continue,
            };
            for track_set_id in track_ids {
                let (sequence_id, track_id) = {
                    let Some(track) = self.header_metadata.track(track_set_id) else {
                        continue;
                    };
                    (track.sequence, track.track_id)
                };
                let Some(duration) = durations
                    .iter()
                    .find(|(id, _)| *id == track_id)
                    .map(|(_, d)| *d)
                else {
                    continue;
                };
                let Some(sequence_id) = sequence_id else {
                    continue;
                };

                let component_ids = {
                    let Some(sequence) = self.header_metadata.sequence_mut(sequence_id) else {
                        continue;
                    };
                    if sequence.duration >= 0 {
                        continue;
                    }
                    sequence.duration = duration;
                    sequence.components.clone()
                };
                for component_id in component_ids {
                    if let Some(clip) = self.header_metadata.source_clip_mut(component_id) {
                        if clip.duration < 0 {
                            clip.duration = duration;
                        }
                    } else if let Some(component) =
                        self.header_metadata.timecode_component_mut(component_id)
                    {
                        if component.duration < 0 {
                            component.duration = duration;
                        }
                    }
                }
            }
        }

        // container durations in the descriptor tree
        let Some(file_package_id) = self.file_package else {
            return;
        };
        let Some(descriptor_id) = self
            .header_metadata
            .package(file_package_id)
            .and_then(|p| p.descriptor)
        else {
            return;
        };

        let sub_ids: Vec<SetId> = match self.header_metadata.descriptor(descriptor_id) {
            Some(Descriptor::Multiple(multiple)) => multiple.sub_descriptors.clone(),
            _ => Vec::new(),
        };
        let top_level_duration = if sub_ids.is_empty() {
            self.stream_duration(&self.streams[0])
        } else {
            self.edit_units_written
        };
        if let Some(common) = self
            .header_metadata
            .descriptor_mut(descriptor_id)
            .and_then(|d| d.common_mut())
        {
            common.container_duration = top_level_duration;
        }
        for sub_id in sub_ids {
            let linked = self
                .header_metadata
                .descriptor(sub_id)
                .and_then(|d| d.common())
                .map(|c| c.linked_track_id);
            let Some(linked_track_id) = linked else {
                continue;
            };
            let duration = self
                .streams
                .iter()
                .find(|stream| stream.track_id == linked_track_id)
                .map(|stream| self.stream_duration(stream));
            if let (Some(duration), Some(common)) = (
                duration,
                self.header_metadata
                    .descriptor_mut(sub_id)
                    .and_then(|d| d.common_mut()),
            ) {
                common.container_duration = duration;
            }
        }
    }

    fn kag_aligned(&self, target: u64, partition_index: usize) -> u64 {
        let kag = self.config.kag_size as u64;
        if kag <= 1 {
            return target;
        }
        let relative = target - self.file.partitions()[partition_index].this_partition;
        target + (kag - relative % kag) % kag
    }

    /// Content packages written so far.
    pub fn edit_units_written(&self) -> i64 {
        self.edit_units_written
    }

    /// Essence bytes written so far.
    pub fn container_size(&self) -> i64 {
        self.container_size
    }

    /// The CBE index segment of a clip-wrapped clip.
    pub fn cbe_index(&self) -> Option<&CbeIndexSegment> {
        self.cbe_segment.as_ref()
    }

    /// The header metadata graph.
    pub fn header_metadata(&self) -> &HeaderMetadata {
        &self.header_metadata
    }

    /// The material package set id, available after prepare.
    pub fn material_package_id(&self) -> Option<SetId> {
        self.material_package
    }

    /// The file source package set id, available after prepare.
    pub fn file_package_id(&self) -> Option<SetId> {
        self.file_package
    }

    /// Partitions written so far with their file offsets.
    pub fn partitions(&self) -> &[Partition] {
        self.file.partitions()
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.file.into_inner()
    }
}
