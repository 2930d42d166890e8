//! The per-file track writer state machine.
//!
//! A track writer owns one open MXF file and drives it through
//! `New -> Prepared -> Writing -> Completed`. Prepare writes the header
//! partition, the header metadata padded to a byte reserve, an optional CBE
//! index partition and the essence body partition. Complete writes the
//! footer and Random Index Pack, then seeks back to rewrite the header
//! metadata (consuming exactly the reserved span), the CBE index segment and
//! the partition packs with closed-and-complete keys.

use crate::descriptor::{EssenceConfig, AVCI_HEADER_SIZE};
use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::index::{CbeIndexSegment, IndexEntry, IndexTable};
use crate::klv::{encode_ber_length, write_klv, KEY_SIZE};
use crate::metadata::{
    ContentStorage, EssenceContainerData, HeaderMetadata, Identification, MetadataSet, Package,
    Preface, ProductVersion, Sequence, SetId, SourceClip, TimecodeComponent, Track,
};
use crate::partition::Partition;
use crate::ul::{essence_track_number, labels, UL};
use mxfwrite_core::{Timecode, Timestamp, Umid, NULL_UMID};
use std::io::{Seek, Write};
use uuid::Uuid;

/// Track id of the timecode track in single-track files.
pub const TIMECODE_TRACK_ID: u32 = 901;
/// Track id of the video timeline track in single-track files.
pub const VIDEO_TRACK_ID: u32 = 1001;
/// Track id of the audio timeline track in single-track files.
pub const AUDIO_TRACK_ID: u32 = 2001;

const TIMECODE_TRACK_NAME: &str = "Timecode";
const VIDEO_TRACK_NAME: &str = "Video";
const AUDIO_TRACK_NAME: &str = "Audio";

/// How samples are framed in the essence container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrappingMode {
    /// One KLV per content package.
    Frame,
    /// A single KLV whose length is finalized at complete time.
    Clip,
}

/// Static configuration of a track writer.
#[derive(Debug, Clone)]
pub struct TrackWriterConfig {
    pub essence: EssenceConfig,
    pub wrapping: WrappingMode,
    pub operational_pattern: UL,
    pub index_sid: u32,
    pub body_sid: u32,
    pub kag_size: u32,
    pub min_llen: u8,
    /// Minimum byte reserve between header metadata and the next partition.
    pub reserve_min_bytes: u32,
    /// Use the pre-377-1 fill key instead of the compliant one.
    pub use_legacy_fill_key: bool,
    /// 1-based essence element number.
    pub element_number: u8,
}

impl TrackWriterConfig {
    /// Defaults for a single-track file: frame wrapping for pictures, clip
    /// wrapping for sound.
    pub fn new(essence: EssenceConfig) -> Self {
        let wrapping = if essence.essence_type.is_picture() {
            WrappingMode::Frame
        } else {
            WrappingMode::Clip
        };
        TrackWriterConfig {
            essence,
            wrapping,
            operational_pattern: labels::OP_1A_UNITRACK,
            index_sid: 1,
            body_sid: 2,
            kag_size: 1,
            min_llen: 4,
            reserve_min_bytes: 8192,
            use_legacy_fill_key: false,
            element_number: 1,
        }
    }
}

/// Clip-level identity carried into each file's header metadata.
#[derive(Debug, Clone)]
pub struct ClipInfo {
    pub clip_name: Option<String>,
    pub company_name: String,
    pub product_name: String,
    pub version_string: String,
    pub product_uid: Uuid,
    pub product_version: ProductVersion,
    pub creation_date: Timestamp,
    pub generation_uid: Uuid,
    pub start_timecode: Timecode,
}

impl Default for ClipInfo {
    fn default() -> Self {
        ClipInfo {
            clip_name: None,
            company_name: "mxfwrite".to_string(),
            product_name: "mxfwrite library".to_string(),
            version_string: env!("CARGO_PKG_VERSION").to_string(),
            product_uid: Uuid::nil(),
            product_version: ProductVersion::default(),
            creation_date: Timestamp::now(),
            generation_uid: mxfwrite_core::generate_uuid(),
            start_timecode: Timecode::default(),
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

/// Writes one essence stream into one MXF file.
pub struct TrackWriter<W: Write + Seek> {
    file: MxfFile<W>,
    config: TrackWriterConfig,
    header_metadata: HeaderMetadata,
    material_package: SetId,
    file_source_package: SetId,
    state: State,
    sample_size: u32,
    element_key: UL,
    index_table: Option<IndexTable>,
    cbe_index: Option<CbeIndexSegment>,
    container_duration: i64,
    container_size: i64,
    output_start_offset: i64,
    output_end_offset: i64,
    header_metadata_start_pos: u64,
    header_metadata_end_pos: u64,
    index_table_start_pos: u64,
    index_table_end_pos: u64,
    clip_kl_pos: Option<u64>,
    end_pos: u64,
}

impl<W: Write + Seek> TrackWriter<W> {
    /// Create a writer over a seekable sink with prebuilt header metadata.
    pub fn new(
        sink: W,
        config: TrackWriterConfig,
        header_metadata: HeaderMetadata,
        material_package: SetId,
        file_source_package: SetId,
    ) -> Result<Self> {
        config.essence.validate()?;

        let element_key = config.essence.element_key(config.element_number);
        let mut file = MxfFile::new(sink);
        file.set_min_llen(config.min_llen);
        if config.use_legacy_fill_key {
            file.set_fill_key(labels::KLV_FILL_LEGACY);
        }

        Ok(TrackWriter {
            file,
            config,
            header_metadata,
            material_package,
            file_source_package,
            state: State::New,
            sample_size: 0,
            element_key,
            index_table: None,
            cbe_index: None,
            container_duration: 0,
            container_size: 0,
            output_start_offset: 0,
            output_end_offset: 0,
            header_metadata_start_pos: 0,
            header_metadata_end_pos: 0,
            index_table_start_pos: 0,
            index_table_end_pos: 0,
            clip_kl_pos: None,
            end_pos: 0,
        })
    }

    /// Skip essence at the start of the output timeline.
    pub fn set_output_start_offset(&mut self, offset: i64) -> Result<()> {
        if offset < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output start offset {} is negative",
                offset
            )));
        }
        self.output_start_offset = offset;
        Ok(())
    }

    /// Trim essence at the end of the output timeline.
    pub fn set_output_end_offset(&mut self, offset: i64) -> Result<()> {
        if offset > 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output end offset {} is positive",
                offset
            )));
        }
        self.output_end_offset = offset;
        Ok(())
    }

    /// Transition `New -> Prepared`: write the header partition, header
    /// metadata, optional CBE index partition and the essence partition.
    pub fn prepare_write(&mut self) -> Result<()> {
        if self.state != State::New {
            return Err(MxfError::StateMisuse {
                operation: "prepare_write",
                state: self.state.name(),
            });
        }

        self.sample_size = self.config.essence.sample_size();
        let is_cbe = self.config.essence.essence_type.is_cbe();
        let sample_rate = self.config.essence.sample_rate;

        if self.config.essence.essence_type.is_avc_intra() {
            // the first edit unit may carry prepended parameter sets: a
            // segment pair indexes it separately
            let mut index = IndexTable::new(self.config.index_sid, self.config.body_sid, sample_rate);
            index.register_avc_intra_element(0);
            index.prepare_write();
            index.set_nominal_element_sizes(&[
                KEY_SIZE as u32 + self.config.min_llen as u32 + self.sample_size,
            ])?;
            self.index_table = Some(index);
        } else if is_cbe {
            let edit_unit_byte_count = match self.config.wrapping {
                WrappingMode::Frame => {
                    KEY_SIZE as u32 + self.config.min_llen as u32 + self.sample_size
                }
                WrappingMode::Clip => self.sample_size,
            };
            self.cbe_index = Some(CbeIndexSegment::new(
                self.config.index_sid,
                self.config.body_sid,
                sample_rate,
                edit_unit_byte_count,
            ));
        } else {
            let mut index = IndexTable::new(self.config.index_sid, self.config.body_sid, sample_rate);
            index.register_picture_element(
                0,
                false,
                self.config.essence.essence_type.apply_temporal_reordering(),
            );
            index.prepare_write();
            self.index_table = Some(index);
        }

        let essence_container = self
            .config
            .essence
            .essence_container_ul(self.config.wrapping == WrappingMode::Clip);

        // header partition pack
        let mut header = Partition::header();
        header.kag_size = self.config.kag_size;
        header.operational_pattern = self.config.operational_pattern;
        header.add_essence_container(essence_container);
        let header_index = self.file.create_partition(header)?;
        self.file.fill_to_kag()?;

        // header metadata padded to the byte reserve
        self.header_metadata_start_pos = self.file.tell()?;
        self.header_metadata.write(&mut self.file)?;
        let mut target = self.file.tell()? + self.config.reserve_min_bytes as u64;
        if self.config.kag_size > 1 {
            let relative = target - self.file.partitions()[header_index].this_partition;
            target += (self.config.kag_size as u64 - relative % self.config.kag_size as u64)
                % self.config.kag_size as u64;
        }
        self.file.fill_to_position(target)?;
        self.header_metadata_end_pos = self.file.tell()?;
        self.file.partition_mut(header_index).header_byte_count =
            self.header_metadata_end_pos - self.header_metadata_start_pos;

        // CBE index partition with a placeholder segment
        let cbe_indexed = self.cbe_index.is_some()
            || self.index_table.as_ref().map(|t| t.is_cbe()) == Some(true);
        if cbe_indexed {
            let mut index_partition = Partition::body();
            index_partition.kag_size = self.config.kag_size;
            index_partition.operational_pattern = self.config.operational_pattern;
            index_partition.index_sid = self.config.index_sid;
            index_partition.body_sid = 0;
            index_partition.add_essence_container(essence_container);
            let partition_index = self.file.create_partition(index_partition)?;
            self.file.fill_to_kag()?;

            self.index_table_start_pos = self.file.tell()?;
            if let Some(cbe_index) = &self.cbe_index {
                cbe_index.write(&mut self.file)?;
            } else if let Some(index_table) = &self.index_table {
                index_table.write_cbe_segments(&mut self.file)?;
            }
            self.index_table_end_pos = self.file.tell()?;
            self.file.fill_to_kag()?;
            let index_end = self.file.tell()?;
            self.file.partition_mut(partition_index).index_byte_count =
                index_end - self.index_table_start_pos;
        }

        // essence body partition pack
        let mut essence_partition = Partition::body();
        essence_partition.kag_size = self.config.kag_size;
        essence_partition.operational_pattern = self.config.operational_pattern;
        essence_partition.body_sid = self.config.body_sid;
        essence_partition.body_offset = 0;
        essence_partition.add_essence_container(essence_container);
        self.file.create_partition(essence_partition)?;
        self.file.fill_to_kag()?;

        // clip wrapping opens a single KLV whose length is patched later
        if self.config.wrapping == WrappingMode::Clip {
            self.clip_kl_pos = Some(self.file.tell()?);
            self.file.write_all(&self.element_key)?;
            let placeholder = encode_ber_length(0, 8);
            self.file.write_all(&placeholder)?;
        }

        self.state = State::Prepared;
        Ok(())
    }

    /// Write contiguous samples.
    ///
    /// For a fixed sample size the data must hold exactly `num_samples`
    /// samples; a VBE frame is written as a single sample.
    pub fn write_samples(&mut self, data: &[u8], num_samples: u32) -> Result<()> {
        if self.state != State::Prepared && self.state != State::Writing {
            return Err(MxfError::StateMisuse {
                operation: "write_samples",
                state: self.state.name(),
            });
        }
        if num_samples == 0 || data.is_empty() {
            return Err(MxfError::InvalidArgument(
                "write_samples requires data and a sample count".to_string(),
            ));
        }

        if self.index_table.is_some() {
            // indexed per frame: one sample at a time, AVC-Intra may carry
            // the prepended parameter sets on the first edit unit
            if num_samples != 1 {
                return Err(MxfError::InvalidArgument(
                    "Indexed essence is written one sample at a time".to_string(),
                ));
            }
            if self.sample_size > 0
                && data.len() as u32 != self.sample_size
                && data.len() as u32 != self.sample_size + AVCI_HEADER_SIZE
            {
                return Err(MxfError::InvalidArgument(format!(
                    "{} bytes do not hold one sample of {} bytes",
                    data.len(),
                    self.sample_size
                )));
            }
        } else if data.len() as u64 != num_samples as u64 * self.sample_size as u64 {
            return Err(MxfError::InvalidArgument(format!(
                "{} bytes do not hold {} samples of {} bytes",
                data.len(),
                num_samples,
                self.sample_size
            )));
        }

        match self.config.wrapping {
            WrappingMode::Clip => {
                self.file.write_all(data)?;
            }
            WrappingMode::Frame => {
                if let Some(index) = self.index_table.as_mut() {
                    let written =
                        write_klv(&mut self.file, &self.element_key, data, self.config.min_llen)?;
                    index.update_index(written as u32, &[written as u32])?;
                } else {
                    for frame in data.chunks_exact(self.sample_size as usize) {
                        write_klv(&mut self.file, &self.element_key, frame, self.config.min_llen)?;
                    }
                }
            }
        }

        self.container_duration += num_samples as i64;
        self.container_size += data.len() as i64;
        self.state = State::Writing;
        Ok(())
    }

    /// Cache a VBE index entry for an upcoming edit unit.
    pub fn add_index_entry(&mut self, position: i64, entry: IndexEntry) -> Result<()> {
        match self.index_table.as_mut() {
            Some(index) => index.add_index_entry(0, position, entry),
            None => Err(MxfError::IndexInvariantViolation(
                "Track has no VBE index table".to_string(),
            )),
        }
    }

    /// Patch the temporal offset of an already-supplied index entry.
    pub fn update_index_entry(&mut self, position: i64, temporal_offset: i8) -> Result<()> {
        match self.index_table.as_mut() {
            Some(index) => index.update_index_entry(0, position, temporal_offset),
            None => Err(MxfError::IndexInvariantViolation(
                "Track has no VBE index table".to_string(),
            )),
        }
    }

    /// Transition to `Completed`: footer, RIP and the in-place rewrites.
    pub fn complete_write(&mut self) -> Result<()> {
        if self.state != State::Prepared && self.state != State::Writing {
            return Err(MxfError::StateMisuse {
                operation: "complete_write",
                state: self.state.name(),
            });
        }

        let output_duration = self.output_duration()?;
        let package_duration = self.duration()?;

        // finalize the clip-wrapped KLV length
        if let Some(clip_kl_pos) = self.clip_kl_pos {
            let end = self.file.tell()?;
            self.file.seek_to(clip_kl_pos + KEY_SIZE as u64)?;
            let length = encode_ber_length(self.container_size as u64, 8);
            self.file.write_all(&length)?;
            self.file.seek_to(end)?;
        }

        // trailing index partition for VBE segments
        let have_vbe_segments = self
            .index_table
            .as_ref()
            .map(|index| !index.is_cbe() && index.have_segments() && index.duration() > 0)
            .unwrap_or(false);
        if have_vbe_segments {
            let mut index_partition = Partition::body();
            index_partition.kag_size = self.config.kag_size;
            index_partition.operational_pattern = self.config.operational_pattern;
            index_partition.index_sid = self.config.index_sid;
            index_partition.body_sid = 0;
            let partition_index = self.file.create_partition(index_partition)?;
            self.file.fill_to_kag()?;
            let index_start = self.file.tell()?;
            if let Some(index) = self.index_table.as_mut() {
                index.write_vbe_segments(&mut self.file)?;
            }
            self.file.fill_to_kag()?;
            let index_end = self.file.tell()?;
            self.file.partition_mut(partition_index).index_byte_count = index_end - index_start;
        }

        // final durations into the package graphs
        self.update_package_durations(self.material_package, output_duration, None);
        self.update_package_durations(
            self.file_source_package,
            package_duration,
            Some(self.output_start_offset),
        );
        if let Some(descriptor_id) = self
            .header_metadata
            .package(self.file_source_package)
            .and_then(|p| p.descriptor)
        {
            if let Some(common) = self
                .header_metadata
                .descriptor_mut(descriptor_id)
                .and_then(|d| d.common_mut())
            {
                common.container_duration = self.container_duration;
            }
        }

        // footer partition and RIP
        let mut footer = Partition::footer();
        footer.kag_size = self.config.kag_size;
        footer.operational_pattern = self.config.operational_pattern;
        self.file.create_partition(footer)?;
        self.file.fill_to_kag()?;
        self.file.write_rip()?;
        self.end_pos = self.file.tell()?;

        // rewrite the header metadata within the reserved span
        self.file.seek_to(self.header_metadata_start_pos)?;
        self.header_metadata.write(&mut self.file)?;
        self.file.fill_to_position(self.header_metadata_end_pos)?;

        // rewrite the CBE index segment with the final duration
        if let Some(cbe_index) = self.cbe_index.as_mut() {
            cbe_index.set_duration(self.container_duration);
            self.file.seek_to(self.index_table_start_pos)?;
            cbe_index.write(&mut self.file)?;
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

    fn update_package_durations(&mut self, package_id: SetId, duration: i64, origin: Option<i64>) {
        let track_ids = match self.header_metadata.package(package_id) {
            Some(package) => package.tracks.clone(),
            None => return,
        };

        for track_id in track_ids {
            let sequence_id = {
                let Some(track) = self.header_metadata.track_mut(track_id) else {
                    continue;
                };
                if let Some(origin) = origin {
                    track.origin = origin;
                }
                track.sequence
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

    /// Duration of the essence container in edit units.
    pub fn container_duration(&self) -> i64 {
        self.container_duration
    }

    /// Bytes of essence written so far.
    pub fn container_size(&self) -> i64 {
        self.container_size
    }

    /// Output duration: container duration minus the start/end trims.
    pub fn output_duration(&self) -> Result<i64> {
        if self.container_duration == 0 && self.output_end_offset < 0 {
            return Err(MxfError::InvalidArgument(
                "Zero-length track cannot have a negative output end offset".to_string(),
            ));
        }
        let duration = self.container_duration - self.output_start_offset + self.output_end_offset;
        if duration < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output start {} / end {} offsets leave a negative duration {}",
                self.output_start_offset, self.output_end_offset, duration
            )));
        }
        Ok(duration)
    }

    /// File source package track duration: container duration plus the end
    /// trim.
    pub fn duration(&self) -> Result<i64> {
        let duration = self.container_duration + self.output_end_offset;
        if duration < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output end offset {} leaves a negative track duration {}",
                self.output_end_offset, duration
            )));
        }
        Ok(duration)
    }

    /// The essence configuration.
    pub fn essence(&self) -> &EssenceConfig {
        &self.config.essence
    }

    /// The CBE index segment, if this track is CBE-indexed.
    pub fn cbe_index(&self) -> Option<&CbeIndexSegment> {
        self.cbe_index.as_ref()
    }

    /// The header metadata graph.
    pub fn header_metadata(&self) -> &HeaderMetadata {
        &self.header_metadata
    }

    /// Mutable header metadata, e.g. for attaching locators before complete.
    pub fn header_metadata_mut(&mut self) -> &mut HeaderMetadata {
        &mut self.header_metadata
    }

    /// The material package set id.
    pub fn material_package_id(&self) -> SetId {
        self.material_package
    }

    /// The file source package set id.
    pub fn file_source_package_id(&self) -> SetId {
        self.file_source_package
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

/// Build the header metadata of a single-essence track file: a material
/// package and a file source package, each with a timecode track and one
/// timeline track, cross-referenced by UMID.
#[allow(clippy::too_many_arguments)]
pub fn single_track_metadata(
    clip: &ClipInfo,
    config: &TrackWriterConfig,
    material_package_uid: Umid,
    file_package_uid: Umid,
    track_name_suffix: Option<&str>,
    lower_level_source: Option<(Umid, u32)>,
    output_start_offset: i64,
) -> (HeaderMetadata, SetId, SetId) {
    let mut hm = HeaderMetadata::new();
    let essence = &config.essence;
    let is_picture = essence.essence_type.is_picture();
    let sample_rate = essence.sample_rate;
    let date = clip.creation_date;
    let essence_container =
        essence.essence_container_ul(config.wrapping == WrappingMode::Clip);
    let timeline_track_id = if is_picture { VIDEO_TRACK_ID } else { AUDIO_TRACK_ID };
    let data_definition = if is_picture {
        labels::DDEF_PICTURE
    } else {
        labels::DDEF_SOUND
    };

    let mut preface = Preface::new(config.operational_pattern, date);
    preface.essence_containers.push(essence_container);
    let preface_id = hm.add(MetadataSet::Preface(preface));

    let identification_id = hm.add(MetadataSet::Identification(Identification {
        this_generation_uid: clip.generation_uid,
        company_name: clip.company_name.clone(),
        product_name: clip.product_name.clone(),
        version_string: clip.version_string.clone(),
        product_uid: clip.product_uid,
        product_version: clip.product_version,
        modification_date: date,
    }));

    let content_storage_id = hm.add(MetadataSet::ContentStorage(ContentStorage::default()));
    let ecd_id = hm.add(MetadataSet::EssenceContainerData(EssenceContainerData {
        linked_package_uid: file_package_uid,
        index_sid: config.index_sid,
        body_sid: config.body_sid,
    }));

    // material package with timecode and timeline tracks
    let mut material = Package::new(material_package_uid, date);
    if let Some(clip_name) = &clip.clip_name {
        let suffix = track_name_suffix.unwrap_or("");
        material.name = Some(format!("{}{}", clip_name, suffix));
    }

    let tc_sequence = hm.add(MetadataSet::Sequence(Sequence::new(labels::DDEF_TIMECODE)));
    let tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
        duration: -1,
        rounded_tc_base: clip.start_timecode.rounded_tc_base(),
        drop_frame: clip.start_timecode.is_drop_frame(),
        start_timecode: clip.start_timecode.offset(),
    }));
    if let Some(sequence) = hm.sequence_mut(tc_sequence) {
        sequence.components.push(tc_component);
    }
    let material_tc_track = hm.add(MetadataSet::TimelineTrack(Track {
        track_id: TIMECODE_TRACK_ID,
        track_number: 0,
        track_name: Some(TIMECODE_TRACK_NAME.to_string()),
        edit_rate: sample_rate,
        origin: 0,
        sequence: Some(tc_sequence),
    }));
    material.tracks.push(material_tc_track);

    let material_clip = hm.add(MetadataSet::SourceClip(SourceClip {
        data_definition,
        duration: -1,
        start_position: 0,
        source_package_id: file_package_uid,
        source_track_id: timeline_track_id,
    }));
    let mut material_sequence = Sequence::new(data_definition);
    material_sequence.components.push(material_clip);
    let material_sequence_id = hm.add(MetadataSet::Sequence(material_sequence));
    let material_track = hm.add(MetadataSet::TimelineTrack(Track {
        track_id: timeline_track_id,
        track_number: 0,
        track_name: Some(
            if is_picture { VIDEO_TRACK_NAME } else { AUDIO_TRACK_NAME }.to_string(),
        ),
        edit_rate: sample_rate,
        origin: 0,
        sequence: Some(material_sequence_id),
    }));
    material.tracks.push(material_track);
    let material_id = hm.add(MetadataSet::MaterialPackage(material));

    // file source package
    let mut file_package = Package::new(file_package_uid, date);

    let mut sp_start_timecode = clip.start_timecode;
    sp_start_timecode.add_offset(-output_start_offset, sample_rate);
    let sp_tc_sequence = hm.add(MetadataSet::Sequence(Sequence::new(labels::DDEF_TIMECODE)));
    let sp_tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
        duration: -1,
        rounded_tc_base: sp_start_timecode.rounded_tc_base(),
        drop_frame: sp_start_timecode.is_drop_frame(),
        start_timecode: sp_start_timecode.offset(),
    }));
    if let Some(sequence) = hm.sequence_mut(sp_tc_sequence) {
        sequence.components.push(sp_tc_component);
    }
    let sp_tc_track = hm.add(MetadataSet::TimelineTrack(Track {
        track_id: TIMECODE_TRACK_ID,
        track_number: 0,
        track_name: Some(TIMECODE_TRACK_NAME.to_string()),
        edit_rate: sample_rate,
        origin: 0,
        sequence: Some(sp_tc_sequence),
    }));
    file_package.tracks.push(sp_tc_track);

    let (source_package_id, source_track_id) = lower_level_source.unwrap_or((NULL_UMID, 0));
    let sp_clip = hm.add(MetadataSet::SourceClip(SourceClip {
        data_definition,
        duration: -1,
        start_position: 0,
        source_package_id,
        source_track_id,
    }));
    let mut sp_sequence = Sequence::new(data_definition);
    sp_sequence.components.push(sp_clip);
    let sp_sequence_id = hm.add(MetadataSet::Sequence(sp_sequence));
    let element_key = essence.element_key(config.element_number);
    let sp_track = hm.add(MetadataSet::TimelineTrack(Track {
        track_id: timeline_track_id,
        track_number: essence_track_number(&element_key),
        track_name: Some(
            if is_picture { VIDEO_TRACK_NAME } else { AUDIO_TRACK_NAME }.to_string(),
        ),
        edit_rate: sample_rate,
        origin: 0,
        sequence: Some(sp_sequence_id),
    }));
    file_package.tracks.push(sp_track);

    let descriptor_id = essence.build_descriptor(
        &mut hm,
        timeline_track_id,
        config.wrapping == WrappingMode::Clip,
    );
    file_package.descriptor = Some(descriptor_id);
    let file_package_set_id = hm.add(MetadataSet::SourcePackage(file_package));

    // wire the graph together
    match hm.get_mut(content_storage_id) {
        MetadataSet::ContentStorage(cs) => {
            cs.packages.push(material_id);
            cs.packages.push(file_package_set_id);
            cs.essence_container_data.push(ecd_id);
        }
        _ => unreachable!("content storage id references a content storage set"),
    }
    if let Some(preface) = hm.preface_mut() {
        preface.identifications.push(identification_id);
        preface.content_storage = Some(content_storage_id);
        preface.primary_package = Some(file_package_set_id);
    }
    debug_assert_eq!(hm.preface_id(), Some(preface_id));

    (hm, material_id, file_package_set_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EssenceType;
    use crate::partition::PartitionKind;
    use crate::ul::PartitionState;
    use mxfwrite_core::Rational;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn pcm_writer() -> TrackWriter<Cursor<Vec<u8>>> {
        let config = TrackWriterConfig::new(EssenceConfig::pcm(1, 16));
        let clip = ClipInfo::default();
        let (hm, material, file_package) = single_track_metadata(
            &clip,
            &config,
            Umid::generate(),
            Umid::generate(),
            None,
            None,
            0,
        );
        TrackWriter::new(Cursor::new(Vec::new()), config, hm, material, file_package).unwrap()
    }

    fn dv_writer() -> TrackWriter<Cursor<Vec<u8>>> {
        let config = TrackWriterConfig::new(EssenceConfig::new(
            EssenceType::IecDv25,
            Rational::FPS_25,
        ));
        let clip = ClipInfo::default();
        let (hm, material, file_package) = single_track_metadata(
            &clip,
            &config,
            Umid::generate(),
            Umid::generate(),
            None,
            None,
            0,
        );
        TrackWriter::new(Cursor::new(Vec::new()), config, hm, material, file_package).unwrap()
    }

    #[test]
    fn test_state_misuse() {
        let mut writer = pcm_writer();
        assert!(matches!(
            writer.write_samples(&[0, 0], 1),
            Err(MxfError::StateMisuse { .. })
        ));
        assert!(matches!(
            writer.complete_write(),
            Err(MxfError::StateMisuse { .. })
        ));

        writer.prepare_write().unwrap();
        assert!(matches!(
            writer.prepare_write(),
            Err(MxfError::StateMisuse { .. })
        ));

        writer.write_samples(&[0, 0], 1).unwrap();
        writer.complete_write().unwrap();
        assert!(matches!(
            writer.write_samples(&[0, 0], 1),
            Err(MxfError::StateMisuse { .. })
        ));
    }

    #[test]
    fn test_clip_wrapped_pcm_one_second() {
        let mut writer = pcm_writer();
        writer.prepare_write().unwrap();

        let samples = vec![0u8; 2 * 48_000];
        writer.write_samples(&samples, 48_000).unwrap();
        writer.complete_write().unwrap();

        assert_eq!(writer.container_duration(), 48_000);
        assert_eq!(writer.container_size(), 96_000);

        let cbe = writer.cbe_index().unwrap();
        assert_eq!(cbe.edit_unit_byte_count(), 2);
        assert_eq!(cbe.duration(), 48_000);

        // header, CBE index, essence body and footer partitions
        let kinds: Vec<PartitionKind> = writer.partitions().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PartitionKind::Header,
                PartitionKind::Body,
                PartitionKind::Body,
                PartitionKind::Footer
            ]
        );
    }

    #[test]
    fn test_partition_keys_upgraded_and_rip_matches() {
        let mut writer = pcm_writer();
        writer.prepare_write().unwrap();
        writer.write_samples(&[0u8; 96], 48).unwrap();
        writer.complete_write().unwrap();

        let offsets: Vec<u64> = writer
            .partitions()
            .iter()
            .map(|p| p.this_partition)
            .collect();
        let sids: Vec<u32> = writer.partitions().iter().map(|p| p.body_sid).collect();
        let bytes = writer.into_inner().into_inner();

        // every partition pack in the file carries the closed complete key
        for &offset in &offsets {
            let key = &bytes[offset as usize..offset as usize + 16];
            assert_eq!(key[14], PartitionState::ClosedComplete.key_byte());
        }

        // RIP entries exactly match the partition offsets
        let rip_overall =
            u32::from_be_bytes(bytes[bytes.len() - 4..].try_into().unwrap()) as usize;
        let rip_start = bytes.len() - rip_overall;
        assert_eq!(&bytes[rip_start..rip_start + 16], &labels::RANDOM_INDEX_PACK);
        let mut entry_pos = rip_start + 16 + 4;
        for (&offset, &sid) in offsets.iter().zip(&sids) {
            let entry_sid =
                u32::from_be_bytes(bytes[entry_pos..entry_pos + 4].try_into().unwrap());
            let entry_offset =
                u64::from_be_bytes(bytes[entry_pos + 4..entry_pos + 12].try_into().unwrap());
            assert_eq!(entry_sid, sid);
            assert_eq!(entry_offset, offset);
            entry_pos += 12;
        }
    }

    #[test]
    fn test_clip_wrapped_klv_length_patched() {
        let mut writer = pcm_writer();
        writer.prepare_write().unwrap();
        let clip_kl_pos = writer.clip_kl_pos.unwrap() as usize;
        writer.write_samples(&[0u8; 96_000], 48_000).unwrap();
        writer.complete_write().unwrap();

        let bytes = writer.into_inner().into_inner();
        let length_bytes = &bytes[clip_kl_pos + 16..clip_kl_pos + 24];
        assert_eq!(length_bytes[0], 0x87);
        let mut length = 0u64;
        for &byte in &length_bytes[1..] {
            length = (length << 8) | byte as u64;
        }
        assert_eq!(length, 96_000);
    }

    #[test]
    fn test_frame_wrapped_dv25() {
        let mut writer = dv_writer();
        writer.prepare_write().unwrap();

        let frame = vec![0u8; 144_000];
        for _ in 0..100 {
            writer.write_samples(&frame, 1).unwrap();
        }
        writer.complete_write().unwrap();

        let cbe = writer.cbe_index().unwrap();
        assert_eq!(cbe.edit_unit_byte_count(), 16 + 4 + 144_000);
        assert_eq!(cbe.duration(), 100);

        // material package sequence duration is the output duration
        let hm = writer.header_metadata();
        let material = hm.package(writer.material_package_id()).unwrap();
        let mut found_picture_sequence = false;
        for &track_id in &material.tracks {
            let track = hm.track(track_id).unwrap();
            let sequence = hm.sequence(track.sequence.unwrap()).unwrap();
            assert_eq!(sequence.duration, 100);
            if labels::is_picture_ddef(&sequence.data_definition) {
                found_picture_sequence = true;
            }
        }
        assert!(found_picture_sequence);

        // no -1 sentinel survives in the descriptor
        let file_package = hm.package(writer.file_source_package_id()).unwrap();
        let descriptor = hm.descriptor(file_package.descriptor.unwrap()).unwrap();
        assert_eq!(descriptor.common().unwrap().container_duration, 100);
    }

    #[test]
    fn test_header_metadata_rewrite_consumes_reserve_exactly() {
        let mut writer = dv_writer();
        writer.prepare_write().unwrap();
        let start = writer.header_metadata_start_pos;
        let end = writer.header_metadata_end_pos;
        assert!(end - start >= 8192);

        writer.write_samples(&vec![0u8; 144_000], 1).unwrap();
        // complete rewrites the header metadata and must land exactly on the
        // recorded end position, otherwise fill_to_position fails
        writer.complete_write().unwrap();

        let header_byte_count = writer.partitions()[0].header_byte_count;
        assert_eq!(header_byte_count, end - start);
    }

    #[test]
    fn test_zero_length_track_with_negative_end_offset_rejected() {
        let mut writer = pcm_writer();
        writer.set_output_end_offset(-10).unwrap();
        writer.prepare_write().unwrap();
        assert!(matches!(
            writer.complete_write(),
            Err(MxfError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_output_offset_validation() {
        let mut writer = pcm_writer();
        assert!(writer.set_output_start_offset(-1).is_err());
        assert!(writer.set_output_end_offset(1).is_err());
        writer.set_output_start_offset(10).unwrap();
        writer.set_output_end_offset(-10).unwrap();
    }

    #[test]
    fn test_avc_intra_first_frame_carries_parameter_sets() {
        let config = TrackWriterConfig::new(EssenceConfig::new(
            EssenceType::Avci100_1080i,
            Rational::FPS_25,
        ));
        let clip = ClipInfo::default();
        let (hm, material, file_package) = single_track_metadata(
            &clip,
            &config,
            Umid::generate(),
            Umid::generate(),
            None,
            None,
            0,
        );
        let mut writer =
            TrackWriter::new(Cursor::new(Vec::new()), config, hm, material, file_package)
                .unwrap();
        writer.prepare_write().unwrap();

        // oversized first frame, regular frames afterwards
        writer.write_samples(&vec![0u8; 568_832 + 512], 1).unwrap();
        writer.write_samples(&vec![0u8; 568_832], 1).unwrap();
        writer.write_samples(&vec![0u8; 568_832], 1).unwrap();

        // a frame that is neither size is rejected
        assert!(writer.write_samples(&vec![0u8; 100], 1).is_err());

        writer.complete_write().unwrap();
        assert_eq!(writer.container_duration(), 3);

        let kinds: Vec<PartitionKind> = writer.partitions().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PartitionKind::Header,
                PartitionKind::Body,
                PartitionKind::Body,
                PartitionKind::Footer
            ]
        );
    }

    #[test]
    fn test_mpeg_track_uses_vbe_index() {
        let config = TrackWriterConfig::new(EssenceConfig::new(
            EssenceType::Mpeg2lg422pHl,
            Rational::FPS_25,
        ));
        let clip = ClipInfo::default();
        let (hm, material, file_package) = single_track_metadata(
            &clip,
            &config,
            Umid::generate(),
            Umid::generate(),
            None,
            None,
            0,
        );
        let mut writer =
            TrackWriter::new(Cursor::new(Vec::new()), config, hm, material, file_package)
                .unwrap();
        writer.prepare_write().unwrap();
        assert!(writer.cbe_index().is_none());

        writer
            .add_index_entry(0, IndexEntry::new(0, 0, 0x80, true))
            .unwrap();
        writer.write_samples(&[0u8; 60_000], 1).unwrap();
        writer
            .add_index_entry(1, IndexEntry::new(-1, -1, 0, false))
            .unwrap();
        writer.write_samples(&[0u8; 20_000], 1).unwrap();
        writer.complete_write().unwrap();

        // footer flow adds the trailing index partition
        let kinds: Vec<PartitionKind> = writer.partitions().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PartitionKind::Header,
                PartitionKind::Body,
                PartitionKind::Body,
                PartitionKind::Footer
            ]
        );
        let index_partition = &writer.partitions()[2];
        assert_eq!(index_partition.index_sid, 1);
        assert!(index_partition.index_byte_count > 0);
    }
}
