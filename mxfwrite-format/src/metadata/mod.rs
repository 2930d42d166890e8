//! Header metadata modelled as a flat arena of sets.
//!
//! MXF header metadata is a graph with shared referents: the ContentStorage
//! references packages, packages reference tracks, sequences and source
//! clips, and source clips reference other packages by UMID. The graph is
//! stored as one flat arena keyed by instance UID. Strong references carry
//! the arena id of the target and are resolved to instance UIDs when
//! serializing; weak package references carry only the UMID.

mod write;

pub(crate) use write::tags;

use crate::ul::UL;
use mxfwrite_core::{generate_uuid, Rational, Timestamp, Umid};
use uuid::Uuid;

/// Identifier of a metadata set within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(u32);

/// Product version carried in the Identification set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
    pub release: u16,
}

/// The Preface set.
#[derive(Debug, Clone)]
pub struct Preface {
    pub last_modified_date: Timestamp,
    /// MXF version: 259 is v1.3 (SMPTE 377-1).
    pub version: u16,
    pub operational_pattern: UL,
    pub essence_containers: Vec<UL>,
    pub dm_schemes: Vec<UL>,
    pub identifications: Vec<SetId>,
    pub content_storage: Option<SetId>,
    pub primary_package: Option<SetId>,
}

impl Preface {
    /// A v1.3 preface for an operational pattern.
    pub fn new(operational_pattern: UL, last_modified_date: Timestamp) -> Self {
        Preface {
            last_modified_date,
            version: 259,
            operational_pattern,
            essence_containers: Vec::new(),
            dm_schemes: Vec::new(),
            identifications: Vec::new(),
            content_storage: None,
            primary_package: None,
        }
    }
}

/// The Identification set.
#[derive(Debug, Clone)]
pub struct Identification {
    pub this_generation_uid: Uuid,
    pub company_name: String,
    pub product_name: String,
    pub version_string: String,
    pub product_uid: Uuid,
    pub product_version: ProductVersion,
    pub modification_date: Timestamp,
}

/// The ContentStorage set.
#[derive(Debug, Clone, Default)]
pub struct ContentStorage {
    pub packages: Vec<SetId>,
    pub essence_container_data: Vec<SetId>,
}

/// The EssenceContainerData set.
#[derive(Debug, Clone)]
pub struct EssenceContainerData {
    pub linked_package_uid: Umid,
    pub index_sid: u32,
    pub body_sid: u32,
}

/// A material or source package.
#[derive(Debug, Clone)]
pub struct Package {
    pub package_uid: Umid,
    pub name: Option<String>,
    pub creation_date: Timestamp,
    pub modified_date: Timestamp,
    pub tracks: Vec<SetId>,
    /// Source packages only.
    pub descriptor: Option<SetId>,
    /// Avid mob attributes (TaggedValue references).
    pub attributes: Vec<SetId>,
    /// Avid user comments (TaggedValue references).
    pub user_comments: Vec<SetId>,
    /// Avid application code.
    pub app_code: Option<i32>,
    /// Avid frame rate conversion flag.
    pub convert_frame_rate: Option<bool>,
}

impl Package {
    /// Create a package with a UMID and creation date.
    pub fn new(package_uid: Umid, date: Timestamp) -> Self {
        Package {
            package_uid,
            name: None,
            creation_date: date,
            modified_date: date,
            tracks: Vec::new(),
            descriptor: None,
            attributes: Vec::new(),
            user_comments: Vec::new(),
            app_code: None,
            convert_frame_rate: None,
        }
    }
}

/// A timeline track.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    pub track_number: u32,
    pub track_name: Option<String>,
    pub edit_rate: Rational,
    pub origin: i64,
    pub sequence: Option<SetId>,
}

/// A descriptive-metadata event track.
#[derive(Debug, Clone)]
pub struct EventTrack {
    pub track_id: u32,
    pub track_number: u32,
    pub event_edit_rate: Rational,
    pub sequence: Option<SetId>,
}

/// A sequence of structural components.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub data_definition: UL,
    /// `-1` until writing completes.
    pub duration: i64,
    pub components: Vec<SetId>,
}

impl Sequence {
    /// A sequence with no components and the unset duration sentinel.
    pub fn new(data_definition: UL) -> Self {
        Sequence {
            data_definition,
            duration: -1,
            components: Vec::new(),
        }
    }
}

/// A source clip referencing another package by UMID.
#[derive(Debug, Clone)]
pub struct SourceClip {
    pub data_definition: UL,
    pub duration: i64,
    pub start_position: i64,
    pub source_package_id: Umid,
    pub source_track_id: u32,
}

/// A timecode component.
#[derive(Debug, Clone)]
pub struct TimecodeComponent {
    pub duration: i64,
    pub rounded_tc_base: u16,
    pub drop_frame: bool,
    pub start_timecode: i64,
}

/// An RGB colour triple used for Avid marker colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

/// A descriptive-metadata segment carrying a locator.
#[derive(Debug, Clone)]
pub struct DmSegment {
    pub event_start_position: i64,
    pub comment: Option<String>,
    pub track_ids: Vec<u32>,
    pub marker_color: Option<RgbColor>,
}

/// A network locator holding a source URI.
#[derive(Debug, Clone)]
pub struct NetworkLocator {
    pub url: String,
}

/// An Avid tagged name/value pair.
#[derive(Debug, Clone)]
pub struct TaggedValue {
    pub name: String,
    pub value: String,
}

/// Properties shared by all file descriptors.
#[derive(Debug, Clone)]
pub struct FileDescriptorCommon {
    pub linked_track_id: u32,
    pub sample_rate: Rational,
    /// `-1` until writing completes.
    pub container_duration: i64,
    pub essence_container: UL,
}

/// A CDCI picture descriptor (also used for the MPEG video descriptor).
#[derive(Debug, Clone)]
pub struct CdciDescriptor {
    pub common: FileDescriptorCommon,
    /// 0 full frame, 1 separate fields, 3 mixed fields.
    pub frame_layout: u8,
    pub stored_width: u32,
    pub stored_height: u32,
    pub aspect_ratio: Rational,
    pub video_line_map: Vec<i32>,
    pub component_depth: u32,
    pub horizontal_subsampling: u32,
    pub vertical_subsampling: u32,
    pub picture_essence_coding: UL,
}

/// A WAVE PCM sound descriptor.
#[derive(Debug, Clone)]
pub struct WaveAudioDescriptor {
    pub common: FileDescriptorCommon,
    pub audio_sampling_rate: Rational,
    pub channel_count: u32,
    pub quantization_bits: u32,
    pub locked: bool,
    pub block_align: u16,
    pub avg_bps: u32,
}

/// A multiple descriptor wrapping one sub-descriptor per essence stream.
#[derive(Debug, Clone)]
pub struct MultipleDescriptor {
    pub common: FileDescriptorCommon,
    pub sub_descriptors: Vec<SetId>,
}

/// A tape descriptor for default tape source packages.
#[derive(Debug, Clone)]
pub struct TapeDescriptor {
    pub color_frame: i32,
}

/// An import descriptor for default import source packages.
#[derive(Debug, Clone, Default)]
pub struct ImportDescriptor {
    pub locators: Vec<SetId>,
}

/// The descriptor attached to a source package.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Cdci(CdciDescriptor),
    MpegVideo(CdciDescriptor),
    WaveAudio(WaveAudioDescriptor),
    Multiple(MultipleDescriptor),
    Tape(TapeDescriptor),
    Import(ImportDescriptor),
}

impl Descriptor {
    /// The shared file-descriptor properties, if this is a file descriptor.
    pub fn common(&self) -> Option<&FileDescriptorCommon> {
        match self {
            Descriptor::Cdci(d) | Descriptor::MpegVideo(d) => Some(&d.common),
            Descriptor::WaveAudio(d) => Some(&d.common),
            Descriptor::Multiple(d) => Some(&d.common),
            Descriptor::Tape(_) | Descriptor::Import(_) => None,
        }
    }

    /// Mutable shared file-descriptor properties.
    pub fn common_mut(&mut self) -> Option<&mut FileDescriptorCommon> {
        match self {
            Descriptor::Cdci(d) | Descriptor::MpegVideo(d) => Some(&mut d.common),
            Descriptor::WaveAudio(d) => Some(&mut d.common),
            Descriptor::Multiple(d) => Some(&mut d.common),
            Descriptor::Tape(_) | Descriptor::Import(_) => None,
        }
    }
}

/// One metadata set in the arena.
#[derive(Debug, Clone)]
pub enum MetadataSet {
    Preface(Preface),
    Identification(Identification),
    ContentStorage(ContentStorage),
    EssenceContainerData(EssenceContainerData),
    MaterialPackage(Package),
    SourcePackage(Package),
    TimelineTrack(Track),
    EventTrack(EventTrack),
    Sequence(Sequence),
    SourceClip(SourceClip),
    TimecodeComponent(TimecodeComponent),
    DmSegment(DmSegment),
    NetworkLocator(NetworkLocator),
    TaggedValue(TaggedValue),
    Descriptor(Descriptor),
}

struct SetEntry {
    instance_uid: Uuid,
    body: MetadataSet,
}

/// The header metadata arena.
#[derive(Default)]
pub struct HeaderMetadata {
    sets: Vec<SetEntry>,
    preface: Option<SetId>,
}

impl HeaderMetadata {
    /// Create an empty arena.
    pub fn new() -> Self {
        HeaderMetadata::default()
    }

    /// Add a set, generating its instance UID.
    pub fn add(&mut self, body: MetadataSet) -> SetId {
        let id = SetId(self.sets.len() as u32);
        self.sets.push(SetEntry {
            instance_uid: generate_uuid(),
            body,
        });
        if matches!(self.sets[id.0 as usize].body, MetadataSet::Preface(_)) {
            self.preface = Some(id);
        }
        id
    }

    /// The preface set id, if one was added.
    pub fn preface_id(&self) -> Option<SetId> {
        self.preface
    }

    /// The instance UID of a set.
    pub fn instance_uid(&self, id: SetId) -> Uuid {
        self.sets[id.0 as usize].instance_uid
    }

    /// Borrow a set.
    pub fn get(&self, id: SetId) -> &MetadataSet {
        &self.sets[id.0 as usize].body
    }

    /// Mutably borrow a set.
    pub fn get_mut(&mut self, id: SetId) -> &mut MetadataSet {
        &mut self.sets[id.0 as usize].body
    }

    /// Number of sets in the arena.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Borrow the preface.
    pub fn preface(&self) -> Option<&Preface> {
        match self.preface.map(|id| self.get(id)) {
            Some(MetadataSet::Preface(p)) => Some(p),
            _ => None,
        }
    }

    /// Mutably borrow the preface.
    pub fn preface_mut(&mut self) -> Option<&mut Preface> {
        match self.preface.map(|id| id.0 as usize) {
            Some(index) => match &mut self.sets[index].body {
                MetadataSet::Preface(p) => Some(p),
                _ => None,
            },
            None => None,
        }
    }

    /// Borrow a material or source package.
    pub fn package(&self, id: SetId) -> Option<&Package> {
        match self.get(id) {
            MetadataSet::MaterialPackage(p) | MetadataSet::SourcePackage(p) => Some(p),
            _ => None,
        }
    }

    /// Mutably borrow a material or source package.
    pub fn package_mut(&mut self, id: SetId) -> Option<&mut Package> {
        match self.get_mut(id) {
            MetadataSet::MaterialPackage(p) | MetadataSet::SourcePackage(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow a timeline track.
    pub fn track(&self, id: SetId) -> Option<&Track> {
        match self.get(id) {
            MetadataSet::TimelineTrack(t) => Some(t),
            _ => None,
        }
    }

    /// Mutably borrow a timeline track.
    pub fn track_mut(&mut self, id: SetId) -> Option<&mut Track> {
        match self.get_mut(id) {
            MetadataSet::TimelineTrack(t) => Some(t),
            _ => None,
        }
    }

    /// Borrow a sequence.
    pub fn sequence(&self, id: SetId) -> Option<&Sequence> {
        match self.get(id) {
            MetadataSet::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Mutably borrow a sequence.
    pub fn sequence_mut(&mut self, id: SetId) -> Option<&mut Sequence> {
        match self.get_mut(id) {
            MetadataSet::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow a source clip.
    pub fn source_clip(&self, id: SetId) -> Option<&SourceClip> {
        match self.get(id) {
            MetadataSet::SourceClip(c) => Some(c),
            _ => None,
        }
    }

    /// Mutably borrow a source clip.
    pub fn source_clip_mut(&mut self, id: SetId) -> Option<&mut SourceClip> {
        match self.get_mut(id) {
            MetadataSet::SourceClip(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow a timecode component.
    pub fn timecode_component(&self, id: SetId) -> Option<&TimecodeComponent> {
        match self.get(id) {
            MetadataSet::TimecodeComponent(c) => Some(c),
            _ => None,
        }
    }

    /// Mutably borrow a timecode component.
    pub fn timecode_component_mut(&mut self, id: SetId) -> Option<&mut TimecodeComponent> {
        match self.get_mut(id) {
            MetadataSet::TimecodeComponent(c) => Some(c),
            _ => None,
        }
    }

    /// Borrow a descriptor.
    pub fn descriptor(&self, id: SetId) -> Option<&Descriptor> {
        match self.get(id) {
            MetadataSet::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    /// Mutably borrow a descriptor.
    pub fn descriptor_mut(&mut self, id: SetId) -> Option<&mut Descriptor> {
        match self.get_mut(id) {
            MetadataSet::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    /// Find a package by its UMID.
    pub fn find_package_by_umid(&self, umid: &Umid) -> Option<SetId> {
        self.sets.iter().enumerate().find_map(|(i, entry)| {
            match &entry.body {
                MetadataSet::MaterialPackage(p) | MetadataSet::SourcePackage(p)
                    if p.package_uid == *umid =>
                {
                    Some(SetId(i as u32))
                }
                _ => None,
            }
        })
    }

    /// Find a timeline track of a package by track id.
    pub fn find_track(&self, package_id: SetId, track_id: u32) -> Option<SetId> {
        let package = self.package(package_id)?;
        package
            .tracks
            .iter()
            .copied()
            .find(|&tid| self.track(tid).map(|t| t.track_id) == Some(track_id))
    }

    /// Find the timecode component of a package, searching its tracks for a
    /// timecode sequence.
    pub fn find_timecode_component(&self, package_id: SetId) -> Option<SetId> {
        let package = self.package(package_id)?;
        for &track_id in &package.tracks {
            let Some(track) = self.track(track_id) else {
                continue;
            };
            let Some(sequence_id) = track.sequence else {
                continue;
            };
            let Some(sequence) = self.sequence(sequence_id) else {
                continue;
            };
            if !crate::ul::labels::is_timecode_ddef(&sequence.data_definition) {
                continue;
            }
            for &component_id in &sequence.components {
                if self.timecode_component(component_id).is_some() {
                    return Some(component_id);
                }
            }
        }
        None
    }

    /// Whether a package carries a tape descriptor.
    pub fn is_tape_package(&self, package_id: SetId) -> bool {
        self.package(package_id)
            .and_then(|p| p.descriptor)
            .and_then(|d| self.descriptor(d))
            .map(|d| matches!(d, Descriptor::Tape(_)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ul::labels;

    fn test_package(hm: &mut HeaderMetadata, umid: Umid) -> SetId {
        let package = Package::new(umid, Timestamp::default());
        hm.add(MetadataSet::SourcePackage(package))
    }

    #[test]
    fn test_arena_instance_uids_are_unique() {
        let mut hm = HeaderMetadata::new();
        let a = test_package(&mut hm, Umid::generate());
        let b = test_package(&mut hm, Umid::generate());
        assert_ne!(hm.instance_uid(a), hm.instance_uid(b));
    }

    #[test]
    fn test_find_package_by_umid() {
        let mut hm = HeaderMetadata::new();
        let umid = Umid::generate();
        let id = test_package(&mut hm, umid);
        test_package(&mut hm, Umid::generate());

        assert_eq!(hm.find_package_by_umid(&umid), Some(id));
        assert_eq!(hm.find_package_by_umid(&Umid::generate()), None);
    }

    #[test]
    fn test_find_track() {
        let mut hm = HeaderMetadata::new();
        let package_id = test_package(&mut hm, Umid::generate());
        let track_id = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: 1001,
            track_number: 1,
            track_name: None,
            edit_rate: Rational::FPS_25,
            origin: 0,
            sequence: None,
        }));
        hm.package_mut(package_id).unwrap().tracks.push(track_id);

        assert_eq!(hm.find_track(package_id, 1001), Some(track_id));
        assert_eq!(hm.find_track(package_id, 2001), None);
    }

    #[test]
    fn test_find_timecode_component() {
        let mut hm = HeaderMetadata::new();
        let package_id = test_package(&mut hm, Umid::generate());

        let component_id = hm.add(MetadataSet::TimecodeComponent(TimecodeComponent {
            duration: -1,
            rounded_tc_base: 25,
            drop_frame: false,
            start_timecode: 90_000,
        }));
        let mut sequence = Sequence::new(labels::DDEF_TIMECODE);
        sequence.components.push(component_id);
        let sequence_id = hm.add(MetadataSet::Sequence(sequence));
        let track_id = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: 901,
            track_number: 0,
            track_name: Some("TC1".into()),
            edit_rate: Rational::FPS_25,
            origin: 0,
            sequence: Some(sequence_id),
        }));
        hm.package_mut(package_id).unwrap().tracks.push(track_id);

        assert_eq!(hm.find_timecode_component(package_id), Some(component_id));
    }

    #[test]
    fn test_is_tape_package() {
        let mut hm = HeaderMetadata::new();
        let package_id = test_package(&mut hm, Umid::generate());
        assert!(!hm.is_tape_package(package_id));

        let descriptor_id = hm.add(MetadataSet::Descriptor(Descriptor::Tape(TapeDescriptor {
            color_frame: 0,
        })));
        hm.package_mut(package_id).unwrap().descriptor = Some(descriptor_id);
        assert!(hm.is_tape_package(package_id));
    }
}
