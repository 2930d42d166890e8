//! The AS-02 clip: per-track component files driven in lockstep, plus the
//! primary version file tying them together by UMID.

use crate::bundle::As02Bundle;
use crate::error::{As02Error, Result};
use crate::manifest::FileRole;
use crate::track::As02Track;
use mxfwrite_core::{rounded_tc_base, Rational, Timecode, Umid};
use mxfwrite_format::file::MxfFile;
use mxfwrite_format::metadata::{
    ContentStorage, HeaderMetadata, Identification, MetadataSet, Package, Preface, Sequence,
    SourceClip, TimecodeComponent, Track,
};
use mxfwrite_format::partition::Partition;
use mxfwrite_format::ul::labels;
use mxfwrite_format::writer::{ClipInfo, AUDIO_TRACK_ID, TIMECODE_TRACK_ID, VIDEO_TRACK_ID};
use mxfwrite_format::EssenceConfig;
use std::fs::File;
use std::io::BufWriter;

/// Coordinates the component tracks of one AS-02 bundle version.
pub struct As02Clip {
    bundle: As02Bundle,
    version_filename: String,
    frame_rate: Rational,
    info: ClipInfo,
    tracks: Vec<As02Track>,
    prepared: bool,
    completed: bool,
}

impl As02Clip {
    /// Create a clip writing the bundle's primary version.
    pub fn new(bundle: As02Bundle, frame_rate: Rational) -> Self {
        let version_filename = format!("{}.mxf", bundle.bundle_name());
        let info = ClipInfo {
            clip_name: Some(bundle.bundle_name().to_string()),
            start_timecode: Timecode::from_offset(rounded_tc_base(frame_rate), false, 0),
            ..ClipInfo::default()
        };
        As02Clip {
            bundle,
            version_filename,
            frame_rate,
            info,
            tracks: Vec::new(),
            prepared: false,
            completed: false,
        }
    }

    /// The clip frame rate.
    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    /// The bundle this clip writes into.
    pub fn bundle(&self) -> &As02Bundle {
        &self.bundle
    }

    /// Mutable access to the bundle, e.g. for shim details.
    pub fn bundle_mut(&mut self) -> &mut As02Bundle {
        &mut self.bundle
    }

    /// Set the clip start timecode.
    pub fn set_start_timecode(&mut self, start_timecode: Timecode) {
        self.info.start_timecode = start_timecode;
    }

    /// Clip-level identity written into every file.
    pub fn info_mut(&mut self) -> &mut ClipInfo {
        &mut self.info
    }

    /// Create an essence component track, registering its file in the
    /// manifest with the file source package UMID as id.
    pub fn create_track(&mut self, essence: EssenceConfig) -> Result<u32> {
        if self.prepared {
            return Err(As02Error::InvalidArgument(
                "Cannot create tracks after prepare".to_string(),
            ));
        }
        essence.validate().map_err(As02Error::Mxf)?;

        let is_picture = essence.essence_type.is_picture();
        let clip_track_number = self
            .tracks
            .iter()
            .filter(|track| track.is_picture() == is_picture)
            .count() as u32
            + 1;

        let (filepath, relative_uri) = self.bundle.essence_component_filepath(
            &self.version_filename,
            is_picture,
            clip_track_number,
        )?;
        let manifest_index = self
            .bundle
            .manifest
            .register_file(&relative_uri, FileRole::EssenceComponent);

        let track = As02Track::new(
            essence,
            filepath,
            relative_uri,
            manifest_index,
            clip_track_number,
        );
        self.bundle.manifest.file_mut(manifest_index).id = Some(track.file_package_uid());

        self.tracks.push(track);
        Ok(self.tracks.len() as u32 - 1)
    }

    /// Borrow a track.
    pub fn track(&self, track_index: u32) -> Option<&As02Track> {
        self.tracks.get(track_index as usize)
    }

    /// Mutably borrow a track, e.g. for MIC settings or output offsets.
    pub fn track_mut(&mut self, track_index: u32) -> Option<&mut As02Track> {
        self.tracks.get_mut(track_index as usize)
    }

    /// Number of tracks.
    pub fn track_count(&self) -> u32 {
        self.tracks.len() as u32
    }

    /// Prepare every track: open its file and write the header partitions.
    /// Picture tracks are prepared first.
    pub fn prepare_write(&mut self) -> Result<()> {
        if self.prepared {
            return Err(As02Error::InvalidArgument(
                "Clip is already prepared".to_string(),
            ));
        }
        if self.tracks.is_empty() {
            return Err(As02Error::InvalidArgument("Clip has no tracks".to_string()));
        }

        let mut order: Vec<usize> = (0..self.tracks.len()).collect();
        order.sort_by_key(|&i| !self.tracks[i].is_picture());

        let info = self.info.clone();
        for i in order {
            self.tracks[i].prepare(&info)?;
        }
        self.prepared = true;
        Ok(())
    }

    /// Write samples to one track.
    pub fn write_samples(&mut self, track_index: u32, data: &[u8], num_samples: u32) -> Result<()> {
        let track = self
            .tracks
            .get_mut(track_index as usize)
            .ok_or_else(|| {
                As02Error::InvalidArgument(format!("No track with index {}", track_index))
            })?;
        track.write_samples(data, num_samples)
    }

    /// Complete every track, update the manifest entries and write the
    /// primary version file.
    pub fn complete_write(&mut self) -> Result<()> {
        if !self.prepared || self.completed {
            return Err(As02Error::InvalidArgument(
                "Clip must be prepared and not yet completed".to_string(),
            ));
        }

        for i in 0..self.tracks.len() {
            self.tracks[i].complete()?;

            let (mic_type, mic_scope, mic_value) = {
                let (t, s, v) = self.tracks[i].mic();
                (t, s, v.map(|value| value.to_string()))
            };
            let manifest_index = self.tracks[i].manifest_index();
            let entry = self.bundle.manifest.file_mut(manifest_index);
            entry.mic_type = mic_type;
            entry.mic_scope = mic_scope;
            entry.mic = mic_value;
        }

        self.write_version_file()?;
        self.completed = true;
        Ok(())
    }

    /// Write the shim and manifest documents.
    pub fn finalize_bundle(&mut self) -> Result<()> {
        self.bundle.finalize()
    }

    /// The shortest track output duration at the clip frame rate.
    pub fn duration(&self) -> i64 {
        let mut min_duration = -1i64;
        for track in &self.tracks {
            let Some(duration) = track.output_duration() else {
                continue;
            };
            let at_clip_rate = mxfwrite_core::convert_duration_rate(
                track.essence().sample_rate,
                duration,
                self.frame_rate,
                mxfwrite_core::Rounding::Auto,
            );
            if min_duration < 0 || at_clip_rate < min_duration {
                min_duration = at_clip_rate;
            }
        }
        min_duration.max(0)
    }

    /// The primary version file: header metadata only, with a material
    /// package whose source clips reference the component files by UMID.
    fn write_version_file(&mut self) -> Result<()> {
        let (filepath, relative_uri) = self.bundle.primary_version_filepath();
        let version_index = self
            .bundle
            .manifest
            .register_file(&relative_uri, FileRole::PrimaryVersion);

        let mut hm = HeaderMetadata::new();
        let date = self.info.creation_date;

        let mut preface = Preface::new(labels::OP_1A_MULTITRACK, date);
        for track in &self.tracks {
            let container = track.essence().essence_container_ul(!track.is_picture());
            if !preface.essence_containers.contains(&container) {
                preface.essence_containers.push(container);
            }
        }
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

        let material_uid = Umid::generate();
        let mut material = Package::new(material_uid, date);
        material.name = self.info.clip_name.clone();

        // timecode track at the clip frame rate
        let duration = self.duration();
        let tc_component = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
            duration,
            rounded_tc_base: self.info.start_timecode.rounded_tc_base(),
            drop_frame: self.info.start_timecode.is_drop_frame(),
            start_timecode: self.info.start_timecode.offset(),
        }));
        let mut tc_sequence = Sequence::new(labels::DDEF_TIMECODE);
        tc_sequence.duration = duration;
        tc_sequence.components.push(tc_component);
        let tc_sequence_id = hm.add(MetadataSet::Sequence(tc_sequence));
        let tc_track = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: TIMECODE_TRACK_ID,
            track_number: 0,
            track_name: Some("Timecode".to_string()),
            edit_rate: self.frame_rate,
            origin: 0,
            sequence: Some(tc_sequence_id),
        }));
        material.tracks.push(tc_track);

        // one timeline track per essence component
        let mut track_id = 1u32;
        for track in &self.tracks {
            let data_definition = if track.is_picture() {
                labels::DDEF_PICTURE
            } else {
                labels::DDEF_SOUND
            };
            let track_duration = track.output_duration().unwrap_or(0);

            let source_clip = hm.add(MetadataSet::SourceClip(SourceClip {
                data_definition,
                duration: track_duration,
                start_position: 0,
                source_package_id: track.file_package_uid(),
                source_track_id: if track.is_picture() {
                    VIDEO_TRACK_ID
                } else {
                    AUDIO_TRACK_ID
                },
            }));
            let mut sequence = Sequence::new(data_definition);
            sequence.duration = track_duration;
            sequence.components.push(source_clip);
            let sequence_id = hm.add(MetadataSet::Sequence(sequence));
            let timeline_track = hm.add(MetadataSet::TimelineTrack(Track {
                track_id,
                track_number: 0,
                track_name: None,
                edit_rate: track.essence().sample_rate,
                origin: 0,
                sequence: Some(sequence_id),
            }));
            material.tracks.push(timeline_track);
            track_id += 1;
        }
        let material_id = hm.add(MetadataSet::MaterialPackage(material));

        match hm.get_mut(content_storage_id) {
            MetadataSet::ContentStorage(cs) => cs.packages.push(material_id),
            _ => unreachable!("content storage id references a content storage set"),
        }
        if let Some(preface) = hm.preface_mut() {
            preface.identifications.push(identification_id);
            preface.content_storage = Some(content_storage_id);
        }

        // metadata-only file: closed complete from the start
        let mut file = MxfFile::new(BufWriter::new(File::create(&filepath)?));
        let mut header = Partition::header();
        header.set_closed_complete();
        header.operational_pattern = labels::OP_1A_MULTITRACK;
        let header_index = file.create_partition(header)?;
        let metadata_start = file.tell()?;
        hm.write(&mut file)?;
        let metadata_end = file.tell()?;
        file.partition_mut(header_index).header_byte_count = metadata_end - metadata_start;

        let mut footer = Partition::footer();
        footer.operational_pattern = labels::OP_1A_MULTITRACK;
        file.create_partition(footer)?;
        file.write_rip()?;
        file.update_partitions()?;
        file.flush()?;

        self.bundle.manifest.file_mut(version_index).id = Some(material_uid);
        Ok(())
    }
}
