//! The Avid clip coordinator.
//!
//! Owns the per-track writers plus the tape and import source package
//! descriptions. Each track file carries its own copy of the material
//! package and of every registered source package; locators and user
//! comments are attached to every copy when writing completes, and track
//! durations are propagated down the material -> file -> tape reference
//! chain.

use crate::track::AvidTrack;
use mxfwrite_core::{
    convert_duration_rate, convert_position, convert_position_rate, rounded_tc_base, Rational,
    Rounding, Timecode, Umid,
};
use mxfwrite_format::metadata::{
    ContentStorage, Descriptor, DmSegment, EssenceContainerData, EventTrack, HeaderMetadata,
    Identification, ImportDescriptor, MetadataSet, NetworkLocator, Package, Preface, RgbColor,
    Sequence, SetId, SourceClip, TaggedValue, TapeDescriptor, TimecodeComponent, Track,
};
use mxfwrite_format::ul::{essence_track_number, labels};
use mxfwrite_format::writer::{
    ClipInfo, TrackWriter, TrackWriterConfig, AUDIO_TRACK_ID, TIMECODE_TRACK_ID, VIDEO_TRACK_ID,
};
use mxfwrite_format::{EssenceConfig, MxfError, Result, WrappingMode};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

// limited by the number of references in a strong reference vector
const MAX_LOCATORS: usize = 4095;

const DM_TRACK_ID: u32 = 1000;
const DM_TRACK_NUMBER: u32 = 1;

/// The fixed Avid locator colour palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvidRgbColor {
    White,
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
    Black,
}

impl AvidRgbColor {
    /// The RGB triple written into the comment marker.
    pub fn rgb(&self) -> RgbColor {
        match self {
            AvidRgbColor::White => RgbColor {
                red: 65534,
                green: 65535,
                blue: 65535,
            },
            AvidRgbColor::Red => RgbColor {
                red: 41471,
                green: 12134,
                blue: 6564,
            },
            AvidRgbColor::Yellow => RgbColor {
                red: 58981,
                green: 58981,
                blue: 6553,
            },
            AvidRgbColor::Green => RgbColor {
                red: 13107,
                green: 52428,
                blue: 13107,
            },
            AvidRgbColor::Cyan => RgbColor {
                red: 13107,
                green: 52428,
                blue: 52428,
            },
            AvidRgbColor::Blue => RgbColor {
                red: 13107,
                green: 13107,
                blue: 52428,
            },
            AvidRgbColor::Magenta => RgbColor {
                red: 52428,
                green: 13107,
                blue: 52428,
            },
            AvidRgbColor::Black => RgbColor {
                red: 0,
                green: 0,
                blue: 0,
            },
        }
    }
}

/// A locator shown as a colour-coded marker on the Avid timeline.
#[derive(Debug, Clone)]
pub struct AvidLocator {
    pub position: i64,
    pub color: AvidRgbColor,
    pub comment: Option<String>,
}

/// The provenance kind of a default source package.
#[derive(Debug, Clone)]
pub enum SourceKind {
    Tape,
    Import { uri: String },
}

struct DefaultSource {
    package_uid: Umid,
    name: String,
    kind: SourceKind,
    num_video: u32,
    num_audio: u32,
    /// Per-track duration; `-1` for import sources until complete.
    duration: i64,
    /// Tape timecode track start.
    start_timecode: i64,
}

/// Coordinates the per-track files of one Avid clip.
pub struct AvidClip {
    frame_rate: Rational,
    filename_prefix: String,
    project_name: Option<String>,
    clip_name: Option<String>,
    start_timecode: Timecode,
    start_timecode_set: bool,
    info: ClipInfo,
    material_package_uid: Umid,
    user_comments: BTreeMap<String, String>,
    locators: Vec<AvidLocator>,
    sources: Vec<DefaultSource>,
    tracks: Vec<AvidTrack>,
    track_order: Vec<usize>,
    prepared: bool,
    completed: bool,
}

impl AvidClip {
    /// Create a clip for a supported frame rate with a filename prefix for
    /// the per-track files.
    pub fn new(frame_rate: Rational, filename_prefix: impl Into<String>) -> Result<Self> {
        let supported = [
            Rational::FPS_25,
            Rational::FPS_50,
            Rational::FPS_2997,
            Rational::FPS_5994,
        ];
        if !supported.contains(&frame_rate) {
            return Err(MxfError::InvalidArgument(format!(
                "Unsupported Avid clip frame rate {}",
                frame_rate
            )));
        }

        Ok(AvidClip {
            frame_rate,
            filename_prefix: filename_prefix.into(),
            project_name: None,
            clip_name: None,
            start_timecode: Timecode::from_offset(rounded_tc_base(frame_rate), false, 0),
            start_timecode_set: false,
            info: ClipInfo::default(),
            material_package_uid: Umid::generate_avid(),
            user_comments: BTreeMap::new(),
            locators: Vec::new(),
            sources: Vec::new(),
            tracks: Vec::new(),
            track_order: Vec::new(),
            prepared: false,
            completed: false,
        })
    }

    /// The clip frame rate.
    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    /// Set the Avid project name, attached as the `_PJ` attribute.
    pub fn set_project_name(&mut self, name: impl Into<String>) {
        self.project_name = Some(name.into());
    }

    /// Set the clip name carried by the material package.
    pub fn set_clip_name(&mut self, name: impl Into<String>) {
        self.clip_name = Some(name.into());
    }

    /// Set the clip start timecode.
    pub fn set_start_timecode(&mut self, start_timecode: Timecode) {
        self.start_timecode = start_timecode;
        self.start_timecode_set = true;
    }

    /// Clip-level identity written into every file.
    pub fn info_mut(&mut self) -> &mut ClipInfo {
        &mut self.info
    }

    /// Set or replace a user comment.
    pub fn set_user_comment(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.user_comments.insert(name.into(), value.into());
    }

    /// Add a timeline locator.
    ///
    /// The 4096th locator is rejected: a strong reference vector holds at
    /// most 4095 entries.
    pub fn add_locator(&mut self, locator: AvidLocator) -> Result<()> {
        if self.locators.len() >= MAX_LOCATORS {
            return Err(MxfError::FormatLimit(format!(
                "Cannot add more than {} locators",
                MAX_LOCATORS
            )));
        }
        self.locators.push(locator);
        Ok(())
    }

    /// Locators added so far.
    pub fn locator_count(&self) -> usize {
        self.locators.len()
    }

    /// Create a default tape source package: 120 hours of picture and sound
    /// tracks plus a timecode track starting at 00:00:00:00.
    pub fn create_default_tape_source(
        &mut self,
        name: impl Into<String>,
        num_video_tracks: u32,
        num_audio_tracks: u32,
    ) -> Umid {
        let package_uid = Umid::generate_avid();
        let tape_duration = 120 * 60 * 60 * rounded_tc_base(self.frame_rate) as i64;
        self.sources.push(DefaultSource {
            package_uid,
            name: name.into(),
            kind: SourceKind::Tape,
            num_video: num_video_tracks,
            num_audio: num_audio_tracks,
            duration: tape_duration,
            start_timecode: 0,
        });
        package_uid
    }

    /// Override the start timecode of a default source package's timecode
    /// track.
    pub fn set_source_start_timecode(
        &mut self,
        package_uid: &Umid,
        start_timecode: Timecode,
    ) -> Result<()> {
        let source = self
            .sources
            .iter_mut()
            .find(|source| source.package_uid == *package_uid)
            .ok_or_else(|| {
                MxfError::InvalidArgument("Unknown source package UMID".to_string())
            })?;
        source.start_timecode = start_timecode.offset();
        Ok(())
    }

    /// Create a default import source package holding the source URI; track
    /// durations stay unset until writing completes.
    pub fn create_default_import_source(
        &mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        num_video_tracks: u32,
        num_audio_tracks: u32,
    ) -> Umid {
        let package_uid = Umid::generate_avid();
        self.sources.push(DefaultSource {
            package_uid,
            name: name.into(),
            kind: SourceKind::Import { uri: uri.into() },
            num_video: num_video_tracks,
            num_audio: num_audio_tracks,
            duration: -1,
            start_timecode: 0,
        });
        package_uid
    }

    /// `(package UMID, track id)` pairs of a source package's picture
    /// tracks.
    pub fn picture_source_references(&self, package_uid: &Umid) -> Vec<(Umid, u32)> {
        self.source_references(package_uid, true)
    }

    /// `(package UMID, track id)` pairs of a source package's sound tracks.
    pub fn sound_source_references(&self, package_uid: &Umid) -> Vec<(Umid, u32)> {
        self.source_references(package_uid, false)
    }

    fn source_references(&self, package_uid: &Umid, is_picture: bool) -> Vec<(Umid, u32)> {
        let Some(source) = self
            .sources
            .iter()
            .find(|source| source.package_uid == *package_uid)
        else {
            return Vec::new();
        };
        if is_picture {
            (0..source.num_video)
                .map(|i| (source.package_uid, i + 1))
                .collect()
        } else {
            (0..source.num_audio)
                .map(|i| (source.package_uid, source.num_video + i + 1))
                .collect()
        }
    }

    /// Create a track whose filename derives from the clip prefix:
    /// `<prefix>_v<n>.mxf` / `<prefix>_a<n>.mxf`, 1-based per kind.
    pub fn create_track(&mut self, essence: EssenceConfig) -> Result<u32> {
        if self.filename_prefix.is_empty() {
            return Err(MxfError::InvalidArgument(
                "Cannot derive track filenames from an empty prefix".to_string(),
            ));
        }
        let is_picture = essence.essence_type.is_picture();
        let track_number = self
            .tracks
            .iter()
            .filter(|track| track.is_picture() == is_picture)
            .count() as u32
            + 1;
        let filename = format!(
            "{}_{}{}.mxf",
            self.filename_prefix,
            if is_picture { "v" } else { "a" },
            track_number
        );
        self.create_track_with_filename(essence, filename)
    }

    /// Create a track writing to an explicit filename.
    pub fn create_track_with_filename(
        &mut self,
        essence: EssenceConfig,
        filename: impl Into<PathBuf>,
    ) -> Result<u32> {
        if self.prepared {
            return Err(MxfError::StateMisuse {
                operation: "create_track",
                state: "prepared",
            });
        }
        essence.validate()?;
        self.tracks.push(AvidTrack::new(essence, filename.into()));
        Ok(self.tracks.len() as u32 - 1)
    }

    /// Borrow a track.
    pub fn track(&self, track_index: u32) -> Option<&AvidTrack> {
        self.tracks.get(track_index as usize)
    }

    /// Mutably borrow a track, e.g. to set a source reference.
    pub fn track_mut(&mut self, track_index: u32) -> Option<&mut AvidTrack> {
        self.tracks.get_mut(track_index as usize)
    }

    /// Number of tracks.
    pub fn track_count(&self) -> u32 {
        self.tracks.len() as u32
    }

    /// Build every track's header metadata, open the files and write the
    /// header partitions. Picture tracks come first; tape start timecodes
    /// are propagated into the file source packages.
    pub fn prepare_write(&mut self) -> Result<()> {
        if self.prepared {
            return Err(MxfError::StateMisuse {
                operation: "prepare_write",
                state: "prepared",
            });
        }
        if self.tracks.is_empty() {
            return Err(MxfError::InvalidArgument("Clip has no tracks".to_string()));
        }

        // pictures first, stable for ties
        let mut order: Vec<usize> = (0..self.tracks.len()).collect();
        order.sort_by_key(|&i| !self.tracks[i].is_picture());
        self.track_order = order.clone();

        for (position, &i) in order.iter().enumerate() {
            self.tracks[i].material_track_id = position as u32 + 1;
        }

        for &i in &order {
            let (header_metadata, material_id, file_package_id) = self.build_track_metadata(i);
            let mut config = TrackWriterConfig::new(self.tracks[i].essence.clone());
            config.operational_pattern = labels::OP_ATOM;

            let sink = BufWriter::new(File::create(&self.tracks[i].filepath)?);
            let mut writer =
                TrackWriter::new(sink, config, header_metadata, material_id, file_package_id)?;
            writer.set_output_start_offset(self.tracks[i].output_start_offset)?;
            writer.set_output_end_offset(self.tracks[i].output_end_offset)?;
            writer.prepare_write()?;
            self.tracks[i].writer = Some(writer);
        }

        self.prepared = true;
        self.set_tape_start_timecode()?;
        Ok(())
    }

    /// Write samples to one track.
    pub fn write_samples(&mut self, track_index: u32, data: &[u8], num_samples: u32) -> Result<()> {
        let track = self
            .tracks
            .get_mut(track_index as usize)
            .ok_or_else(|| {
                MxfError::InvalidArgument(format!("No track with index {}", track_index))
            })?;
        track.write_samples(data, num_samples)
    }

    /// Attach comments and locators, propagate durations and complete every
    /// track file.
    pub fn complete_write(&mut self) -> Result<()> {
        if !self.prepared || self.completed {
            return Err(MxfError::StateMisuse {
                operation: "complete_write",
                state: if self.completed { "completed" } else { "new" },
            });
        }

        self.update_header_metadata()?;

        for i in 0..self.tracks.len() {
            self.tracks[i].complete()?;
        }
        self.completed = true;
        Ok(())
    }

    /// The shortest track output duration at the clip frame rate.
    pub fn duration(&self) -> i64 {
        let mut min_duration = -1i64;
        for track in &self.tracks {
            let Ok(duration) = track.output_duration() else {
                continue;
            };
            let at_clip_rate = convert_duration_rate(
                track.essence.sample_rate,
                duration,
                self.frame_rate,
                Rounding::Auto,
            );
            if min_duration < 0 || at_clip_rate < min_duration {
                min_duration = at_clip_rate;
            }
        }
        min_duration.max(0)
    }

    fn material_timecode_track_wanted(&self) -> bool {
        let has_import = self
            .sources
            .iter()
            .any(|source| matches!(source.kind, SourceKind::Import { .. }));
        let has_tape = self
            .sources
            .iter()
            .any(|source| matches!(source.kind, SourceKind::Tape));
        self.start_timecode_set && (has_import || !has_tape)
    }

    fn build_track_metadata(&self, index: usize) -> (HeaderMetadata, SetId, SetId) {
        let mut hm = HeaderMetadata::new();
        let date = self.info.creation_date;
        let this_track = &self.tracks[index];
        let this_config = TrackWriterConfig::new(this_track.essence.clone());
        let clip_wrapped = this_config.wrapping == WrappingMode::Clip;

        let mut preface = Preface::new(labels::OP_ATOM, date);
        preface
            .essence_containers
            .push(this_track.essence.essence_container_ul(clip_wrapped));
        hm.add(MetadataSet::Preface(preface));

        let identification_id = hm.add(MetadataSet::Identification(Identification {
            this_generation_uid: self.info.generation_uid,
            company_name: self.info.company_name.clone(),
            product_name: self.info.product_name.clone(),
            version_string: self.info.version_string.clone(),
            product_uid: self.info.product_uid,
            product_version: self.info.product_version,
            modification_date: date,
        }));
        let content_storage_id = hm.add(MetadataSet::ContentStorage(ContentStorage::default()));
        let ecd_id = hm.add(MetadataSet::EssenceContainerData(EssenceContainerData {
            linked_package_uid: this_track.file_package_uid,
            index_sid: this_config.index_sid,
            body_sid: this_config.body_sid,
        }));

        // material package copy holding a timeline track for every clip track
        let mut material = Package::new(self.material_package_uid, date);
        material.name = self.clip_name.clone();
        material.app_code = Some(7);
        material.convert_frame_rate = Some(false);
        if let Some(project) = &self.project_name {
            let attribute = hm.add(MetadataSet::TaggedValue(TaggedValue {
                name: "_PJ".to_string(),
                value: project.clone(),
            }));
            material.attributes.push(attribute);
        }

        let mut video_number = 0u32;
        let mut audio_number = 0u32;
        let mut next_track_id = 1u32;
        for &i in &self.track_order {
            let track = &self.tracks[i];
            let is_picture = track.is_picture();
            let data_definition = if is_picture {
                labels::DDEF_PICTURE
            } else {
                labels::DDEF_SOUND
            };
            let (type_number, name) = if is_picture {
                video_number += 1;
                (video_number, format!("V{}", video_number))
            } else {
                audio_number += 1;
                (audio_number, format!("A{}", audio_number))
            };

            let source_clip = hm.add(MetadataSet::SourceClip(SourceClip {
                data_definition,
                duration: -1,
                start_position: 0,
                source_package_id: track.file_package_uid,
                source_track_id: if is_picture { VIDEO_TRACK_ID } else { AUDIO_TRACK_ID },
            }));
            let mut sequence = Sequence::new(data_definition);
            sequence.components.push(source_clip);
            let sequence_id = hm.add(MetadataSet::Sequence(sequence));
            let timeline_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id: track.material_track_id,
                track_number: type_number,
                track_name: Some(name),
                edit_rate: track.essence.sample_rate,
                origin: 0,
                sequence: Some(sequence_id),
            }));
            material.tracks.push(timeline_track);
            next_track_id = next_track_id.max(track.material_track_id + 1);
        }

        if self.material_timecode_track_wanted() {
            let tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
                duration: -1,
                rounded_tc_base: self.start_timecode.rounded_tc_base(),
                drop_frame: self.start_timecode.is_drop_frame(),
                start_timecode: self.start_timecode.offset(),
            }));
            let mut tc_sequence = Sequence::new(labels::DDEF_TIMECODE);
            tc_sequence.components.push(tc_component);
            let tc_sequence_id = hm.add(MetadataSet::Sequence(tc_sequence));
            let tc_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id: next_track_id,
                track_number: 1,
                track_name: Some("TC1".to_string()),
                edit_rate: self.frame_rate,
                origin: 0,
                sequence: Some(tc_sequence_id),
            }));
            material.tracks.push(tc_track);
        }
        let material_id = hm.add(MetadataSet::MaterialPackage(material));

        // this track's file source package
        let mut file_package = Package::new(this_track.file_package_uid, date);
        let is_picture = this_track.is_picture();
        let data_definition = if is_picture {
            labels::DDEF_PICTURE
        } else {
            labels::DDEF_SOUND
        };
        let timeline_track_id = if is_picture { VIDEO_TRACK_ID } else { AUDIO_TRACK_ID };
        let sample_rate = this_track.essence.sample_rate;

        let mut sp_start_timecode = self.start_timecode;
        sp_start_timecode.add_offset(-this_track.output_start_offset, sample_rate);
        let sp_tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
            duration: -1,
            rounded_tc_base: sp_start_timecode.rounded_tc_base(),
            drop_frame: sp_start_timecode.is_drop_frame(),
            start_timecode: sp_start_timecode.offset(),
        }));
        let mut sp_tc_sequence = Sequence::new(labels::DDEF_TIMECODE);
        sp_tc_sequence.components.push(sp_tc_component);
        let sp_tc_sequence_id = hm.add(MetadataSet::Sequence(sp_tc_sequence));
        let sp_tc_track = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: TIMECODE_TRACK_ID,
            track_number: 0,
            track_name: Some("Timecode".to_string()),
            edit_rate: sample_rate,
            origin: 0,
            sequence: Some(sp_tc_sequence_id),
        }));
        file_package.tracks.push(sp_tc_track);

        let (source_package_id, source_track_id) =
            this_track.source_ref.unwrap_or((Umid::default(), 0));
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
        let element_key = this_track.essence.element_key(this_config.element_number);
        let sp_track = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: timeline_track_id,
            track_number: essence_track_number(&element_key),
            track_name: Some(if is_picture { "Video" } else { "Audio" }.to_string()),
            edit_rate: sample_rate,
            origin: 0,
            sequence: Some(sp_sequence_id),
        }));
        file_package.tracks.push(sp_track);

        let descriptor_id =
            this_track
                .essence
                .build_descriptor(&mut hm, timeline_track_id, clip_wrapped);
        file_package.descriptor = Some(descriptor_id);
        let file_package_id = hm.add(MetadataSet::SourcePackage(file_package));

        // copies of the tape and import source packages
        let mut source_package_ids = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            source_package_ids.push(self.build_source_package(&mut hm, source));
        }

        match hm.get_mut(content_storage_id) {
            MetadataSet::ContentStorage(cs) => {
                cs.packages.push(material_id);
                cs.packages.push(file_package_id);
                cs.packages.extend(source_package_ids);
                cs.essence_container_data.push(ecd_id);
            }
            _ => unreachable!("content storage id references a content storage set"),
        }
        if let Some(preface) = hm.preface_mut() {
            preface.identifications.push(identification_id);
            preface.content_storage = Some(content_storage_id);
            preface.primary_package = Some(file_package_id);
        }

        (hm, material_id, file_package_id)
    }

    fn build_source_package(&self, hm: &mut HeaderMetadata, source: &DefaultSource) -> SetId {
        let date = self.info.creation_date;
        let mut package = Package::new(source.package_uid, date);
        package.name = Some(source.name.clone());
        if let Some(project) = &self.project_name {
            let attribute = hm.add(MetadataSet::TaggedValue(TaggedValue {
                name: "_PJ".to_string(),
                value: project.clone(),
            }));
            package.attributes.push(attribute);
        }

        let mut track_id = 1u32;
        let mut video_number = 1u32;
        let mut audio_number = 1u32;
        for i in 0..source.num_video + source.num_audio {
            let is_video = i < source.num_video;
            let data_definition = if is_video {
                labels::DDEF_PICTURE
            } else {
                labels::DDEF_SOUND
            };
            let (number, name) = if is_video {
                let n = video_number;
                video_number += 1;
                (n, format!("V{}", n))
            } else {
                let n = audio_number;
                audio_number += 1;
                (n, format!("A{}", n))
            };

            let source_clip = hm.add(MetadataSet::SourceClip(SourceClip {
                data_definition,
                duration: source.duration,
                start_position: 0,
                source_package_id: Umid::default(),
                source_track_id: 0,
            }));
            let mut sequence = Sequence::new(data_definition);
            sequence.duration = source.duration;
            sequence.components.push(source_clip);
            let sequence_id = hm.add(MetadataSet::Sequence(sequence));
            let track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id,
                track_number: number,
                track_name: Some(name),
                edit_rate: self.frame_rate,
                origin: 0,
                sequence: Some(sequence_id),
            }));
            package.tracks.push(track);
            track_id += 1;
        }

        if matches!(source.kind, SourceKind::Tape) {
            let tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
                duration: source.duration,
                rounded_tc_base: rounded_tc_base(self.frame_rate),
                drop_frame: false,
                start_timecode: source.start_timecode,
            }));
            let mut tc_sequence = Sequence::new(labels::DDEF_TIMECODE);
            tc_sequence.duration = source.duration;
            tc_sequence.components.push(tc_component);
            let tc_sequence_id = hm.add(MetadataSet::Sequence(tc_sequence));
            let tc_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id,
                track_number: 1,
                track_name: Some("TC1".to_string()),
                edit_rate: self.frame_rate,
                origin: 0,
                sequence: Some(tc_sequence_id),
            }));
            package.tracks.push(tc_track);
        }

        let descriptor = match &source.kind {
            SourceKind::Tape => {
                hm.add(MetadataSet::Descriptor(Descriptor::Tape(TapeDescriptor {
                    color_frame: 0,
                })))
            }
            SourceKind::Import { uri } => {
                let mut import = ImportDescriptor::default();
                if !uri.is_empty() {
                    let locator = hm.add(MetadataSet::NetworkLocator(NetworkLocator {
                        url: uri.clone(),
                    }));
                    import.locators.push(locator);
                }
                hm.add(MetadataSet::Descriptor(Descriptor::Import(import)))
            }
        };
        package.descriptor = Some(descriptor);

        hm.add(MetadataSet::SourcePackage(package))
    }

    /// Set the start position of file source package source clips that
    /// reference a tape source package, from the tape and clip start
    /// timecodes.
    fn set_tape_start_timecode(&mut self) -> Result<()> {
        let clip_base = rounded_tc_base(self.frame_rate) as i64;
        let clip_tc = self.start_timecode;
        let frame_rate = self.frame_rate;

        for track in &mut self.tracks {
            let Some((ref_umid, _)) = track.source_ref else {
                continue;
            };
            let Some(writer) = track.writer.as_mut() else {
                continue;
            };
            let hm = writer.header_metadata_mut();

            let Some(ref_package) = hm.find_package_by_umid(&ref_umid) else {
                continue;
            };
            if !hm.is_tape_package(ref_package) {
                continue;
            }
            let Some(tc_id) = hm.find_timecode_component(ref_package) else {
                continue;
            };
            let (tape_base, tape_start) = {
                let Some(component) = hm.timecode_component(tc_id) else {
                    continue;
                };
                (component.rounded_tc_base as i64, component.start_timecode)
            };

            let tape_tc_start_offset =
                convert_position(tape_start, clip_base, tape_base, Rounding::Auto);
            let clip_tc_start_offset = convert_position(
                clip_tc.offset(),
                clip_base,
                clip_tc.rounded_tc_base() as i64,
                Rounding::Auto,
            );
            let start_position = clip_tc_start_offset - tape_tc_start_offset;
            if start_position < 0 {
                // the tape's start timecode was later than the clip start
                log::warn!(
                    "Not setting start timecode in file source package because the start position is negative"
                );
                continue;
            }

            // set the start position on the first essence track of the file
            // source package
            let file_package = writer.file_source_package_id();
            let hm = writer.header_metadata_mut();
            let track_ids = match hm.package(file_package) {
                Some(package) => package.tracks.clone(),
                None => continue,
            };
            for track_set_id in track_ids {
                let (edit_rate, sequence_id) = {
                    let Some(track) = hm.track(track_set_id) else {
                        continue;
                    };
                    (track.edit_rate, track.sequence)
                };
                let Some(sequence_id) = sequence_id else {
                    continue;
                };
                let component_id = {
                    let Some(sequence) = hm.sequence(sequence_id) else {
                        continue;
                    };
                    if !labels::is_picture_ddef(&sequence.data_definition)
                        && !labels::is_sound_ddef(&sequence.data_definition)
                    {
                        continue;
                    }
                    match sequence.components.first() {
                        Some(&component_id) => component_id,
                        None => continue,
                    }
                };
                if let Some(source_clip) = hm.source_clip_mut(component_id) {
                    source_clip.start_position =
                        convert_position_rate(frame_rate, start_position, edit_rate, Rounding::Auto);
                }
                break;
            }
        }
        Ok(())
    }

    /// Attach comments and locators and propagate durations through every
    /// metadata copy.
    fn update_header_metadata(&mut self) -> Result<()> {
        let comments: Vec<(String, String)> = self
            .user_comments
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let locators = self.locators.clone();
        let frame_rate = self.frame_rate;

        // locators describe the first picture track, or the first track
        let described_track_id = self
            .track_order
            .iter()
            .find(|&&i| self.tracks[i].is_picture())
            .or(self.track_order.first())
            .map(|&i| self.tracks[i].material_track_id)
            .unwrap_or(0);

        // comments and locators go into every material package copy
        for track in &mut self.tracks {
            let Some(writer) = track.writer.as_mut() else {
                continue;
            };
            let material_id = writer.material_package_id();
            let hm = writer.header_metadata_mut();

            for (name, value) in &comments {
                let comment_id = hm.add(MetadataSet::TaggedValue(TaggedValue {
                    name: name.clone(),
                    value: value.clone(),
                }));
                if let Some(package) = hm.package_mut(material_id) {
                    package.user_comments.push(comment_id);
                }
            }

            if !locators.is_empty() {
                let mut dm_sequence = Sequence::new(labels::DDEF_DESCRIPTIVE_METADATA);
                dm_sequence.duration = 0;
                let mut segment_ids = Vec::with_capacity(locators.len());
                for locator in &locators {
                    segment_ids.push(hm.add(MetadataSet::DmSegment(DmSegment {
                        event_start_position: locator.position,
                        comment: locator.comment.clone(),
                        track_ids: if described_track_id > 0 {
                            vec![described_track_id]
                        } else {
                            Vec::new()
                        },
                        marker_color: Some(locator.color.rgb()),
                    })));
                }
                dm_sequence.components = segment_ids;
                let dm_sequence_id = hm.add(MetadataSet::Sequence(dm_sequence));
                let event_track = hm.add(MetadataSet::EventTrack(EventTrack {
                    track_id: DM_TRACK_ID,
                    track_number: DM_TRACK_NUMBER,
                    event_edit_rate: frame_rate,
                    sequence: Some(dm_sequence_id),
                }));
                if let Some(package) = hm.package_mut(material_id) {
                    package.tracks.push(event_track);
                }
            }
        }

        // propagate each track's duration into every metadata copy
        let durations: Vec<(u32, Rational, i64)> = {
            let mut durations = Vec::with_capacity(self.tracks.len());
            for track in &self.tracks {
                durations.push((
                    track.material_track_id,
                    track.essence.sample_rate,
                    track.output_duration()?,
                ));
            }
            durations
        };
        for track in &mut self.tracks {
            let Some(writer) = track.writer.as_mut() else {
                continue;
            };
            let material_id = writer.material_package_id();
            let hm = writer.header_metadata_mut();
            for &(material_track_id, edit_rate, duration) in &durations {
                if let Some(track_set_id) = hm.find_track(material_id, material_track_id) {
                    update_track_durations(hm, track_set_id, edit_rate, duration);
                }
            }
        }

        // timecode tracks follow the longest essence track in each package
        for track in &mut self.tracks {
            let sample_rate = track.essence.sample_rate;
            let source_ref = track.source_ref;
            let Some(writer) = track.writer.as_mut() else {
                continue;
            };
            let material_id = writer.material_package_id();
            let hm = writer.header_metadata_mut();
            update_timecode_track_duration(hm, material_id, frame_rate);
            if let Some((ref_umid, _)) = source_ref {
                if let Some(ref_package) = hm.find_package_by_umid(&ref_umid) {
                    update_timecode_track_duration(hm, ref_package, sample_rate);
                }
            }
        }

        self.set_tape_start_timecode()
    }
}

/// Set a track's sequence and component durations, following source clip
/// references down to the packages they name. Durations that are already set
/// are preserved; a warning is logged when the existing value is smaller
/// than the computed one.
fn update_track_durations(
    hm: &mut HeaderMetadata,
    track_set_id: SetId,
    edit_rate: Rational,
    duration: i64,
) {
    let (track_rate, sequence_id) = {
        let Some(track) = hm.track(track_set_id) else {
            return;
        };
        let Some(sequence_id) = track.sequence else {
            return;
        };
        (track.edit_rate, sequence_id)
    };

    let track_duration = convert_duration_rate(edit_rate, duration, track_rate, Rounding::Auto);

    let component_ids = {
        let Some(sequence) = hm.sequence_mut(sequence_id) else {
            return;
        };
        if sequence.duration >= 0 {
            if sequence.duration < track_duration {
                log::warn!("Existing track duration is less than the essence duration");
            }
            return;
        }
        sequence.duration = track_duration;
        sequence.components.clone()
    };

    for component_id in component_ids {
        if let Some(clip) = hm.source_clip_mut(component_id) {
            clip.duration = track_duration;
            let (source_package_id, source_track_id, start_position) = (
                clip.source_package_id,
                clip.source_track_id,
                clip.start_position,
            );
            if !source_package_id.is_null() {
                if let Some(ref_package) = hm.find_package_by_umid(&source_package_id) {
                    if let Some(ref_track) = hm.find_track(ref_package, source_track_id) {
                        update_track_durations(
                            hm,
                            ref_track,
                            track_rate,
                            start_position + track_duration,
                        );
                    }
                }
            }
        } else if let Some(component) = hm.timecode_component_mut(component_id) {
            component.duration = track_duration;
        }
    }
}

/// Set a package's timecode track durations to the longest of its picture
/// and sound tracks, where still unset.
fn update_timecode_track_duration(
    hm: &mut HeaderMetadata,
    package_id: SetId,
    package_edit_rate: Rational,
) {
    let track_ids = match hm.package(package_id) {
        Some(package) => package.tracks.clone(),
        None => return,
    };

    let mut max_duration = 0i64;
    for &track_set_id in &track_ids {
        let Some(track) = hm.track(track_set_id) else {
            continue;
        };
        let Some(sequence_id) = track.sequence else {
            continue;
        };
        let Some(sequence) = hm.sequence(sequence_id) else {
            continue;
        };
        if !labels::is_picture_ddef(&sequence.data_definition)
            && !labels::is_sound_ddef(&sequence.data_definition)
        {
            continue;
        }
        let duration = convert_duration_rate(
            track.edit_rate,
            sequence.duration,
            package_edit_rate,
            Rounding::Auto,
        );
        max_duration = max_duration.max(duration);
    }

    for track_set_id in track_ids {
        let sequence_id = {
            let Some(track) = hm.track(track_set_id) else {
                continue;
            };
            let Some(sequence_id) = track.sequence else {
                continue;
            };
            sequence_id
        };
        let is_unset_timecode = {
            let Some(sequence) = hm.sequence(sequence_id) else {
                continue;
            };
            labels::is_timecode_ddef(&sequence.data_definition) && sequence.duration < 0
        };
        if is_unset_timecode {
            update_track_durations(hm, track_set_id, package_edit_rate, max_duration);
        }
    }
}
