//! Header metadata serialization.
//!
//! Sets are serialized as local-tag-prefixed KLVs under a Primer Pack. The
//! arena is walked in a stable order anchored at the Preface so that two
//! writes of the same graph produce the same byte layout; the rewrite at
//! complete-write time only changes field values, never the length.

use super::{
    CdciDescriptor, Descriptor, FileDescriptorCommon, HeaderMetadata, MetadataSet, ProductVersion,
    SetId,
};
use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::klv::{write_klv, write_local_item};
use crate::ul::{labels, UL};
use mxfwrite_core::{Rational, Timestamp, Umid};
use std::io::{Seek, Write};
use uuid::Uuid;

/// Local tags used in header metadata and index table segments.
pub(crate) mod tags {
    pub const INSTANCE_UID: u16 = 0x3C0A;
    pub const GENERATION_UID: u16 = 0x0102;

    // Preface
    pub const LAST_MODIFIED_DATE: u16 = 0x3B02;
    pub const VERSION: u16 = 0x3B05;
    pub const IDENTIFICATIONS: u16 = 0x3B06;
    pub const CONTENT_STORAGE: u16 = 0x3B03;
    pub const PRIMARY_PACKAGE: u16 = 0x3B08;
    pub const OPERATIONAL_PATTERN: u16 = 0x3B09;
    pub const ESSENCE_CONTAINERS: u16 = 0x3B0A;
    pub const DM_SCHEMES: u16 = 0x3B0B;

    // Identification
    pub const THIS_GENERATION_UID: u16 = 0x3C09;
    pub const COMPANY_NAME: u16 = 0x3C01;
    pub const PRODUCT_NAME: u16 = 0x3C02;
    pub const PRODUCT_VERSION: u16 = 0x3C03;
    pub const VERSION_STRING: u16 = 0x3C04;
    pub const PRODUCT_UID: u16 = 0x3C05;
    pub const MODIFICATION_DATE: u16 = 0x3C06;

    // ContentStorage
    pub const PACKAGES: u16 = 0x1901;
    pub const ESSENCE_CONTAINER_DATA: u16 = 0x1902;

    // EssenceContainerData
    pub const LINKED_PACKAGE_UID: u16 = 0x2701;
    pub const INDEX_SID: u16 = 0x3F06;
    pub const BODY_SID: u16 = 0x3F07;

    // GenericPackage
    pub const PACKAGE_UID: u16 = 0x4401;
    pub const PACKAGE_NAME: u16 = 0x4402;
    pub const PACKAGE_CREATION_DATE: u16 = 0x4405;
    pub const PACKAGE_MODIFIED_DATE: u16 = 0x4404;
    pub const TRACKS: u16 = 0x4403;
    pub const DESCRIPTOR_REF: u16 = 0x4701;

    // Track
    pub const TRACK_ID: u16 = 0x4801;
    pub const TRACK_NAME: u16 = 0x4802;
    pub const TRACK_NUMBER: u16 = 0x4804;
    pub const EDIT_RATE: u16 = 0x4B01;
    pub const ORIGIN: u16 = 0x4B02;
    pub const SEQUENCE_REF: u16 = 0x4803;
    pub const EVENT_EDIT_RATE: u16 = 0x4901;

    // StructuralComponent
    pub const DATA_DEFINITION: u16 = 0x0201;
    pub const DURATION: u16 = 0x0202;

    // Sequence
    pub const STRUCTURAL_COMPONENTS: u16 = 0x1001;

    // SourceClip
    pub const START_POSITION: u16 = 0x1201;
    pub const SOURCE_PACKAGE_ID: u16 = 0x1101;
    pub const SOURCE_TRACK_ID: u16 = 0x1102;

    // TimecodeComponent
    pub const START_TIMECODE: u16 = 0x1501;
    pub const ROUNDED_TIMECODE_BASE: u16 = 0x1502;
    pub const DROP_FRAME: u16 = 0x1503;

    // DMSegment
    pub const EVENT_START_POSITION: u16 = 0x0601;
    pub const EVENT_COMMENT: u16 = 0x0602;
    pub const DM_TRACK_IDS: u16 = 0x6102;

    // GenericDescriptor / FileDescriptor
    pub const LOCATORS: u16 = 0x2F01;
    pub const LINKED_TRACK_ID: u16 = 0x3006;
    pub const SAMPLE_RATE: u16 = 0x3001;
    pub const CONTAINER_DURATION: u16 = 0x3002;
    pub const ESSENCE_CONTAINER: u16 = 0x3004;

    // Picture descriptors
    pub const FRAME_LAYOUT: u16 = 0x320C;
    pub const STORED_WIDTH: u16 = 0x3203;
    pub const STORED_HEIGHT: u16 = 0x3202;
    pub const ASPECT_RATIO: u16 = 0x320E;
    pub const VIDEO_LINE_MAP: u16 = 0x320D;
    pub const PICTURE_ESSENCE_CODING: u16 = 0x3201;
    pub const COMPONENT_DEPTH: u16 = 0x3301;
    pub const HORIZONTAL_SUBSAMPLING: u16 = 0x3302;
    pub const VERTICAL_SUBSAMPLING: u16 = 0x3308;

    // Sound descriptors
    pub const AUDIO_SAMPLING_RATE: u16 = 0x3D03;
    pub const LOCKED: u16 = 0x3D02;
    pub const CHANNEL_COUNT: u16 = 0x3D07;
    pub const QUANTIZATION_BITS: u16 = 0x3D01;
    pub const BLOCK_ALIGN: u16 = 0x3D0A;
    pub const AVG_BPS: u16 = 0x3D09;
    pub const SOUND_ESSENCE_COMPRESSION: u16 = 0x3D06;

    // MultipleDescriptor
    pub const SUB_DESCRIPTORS: u16 = 0x3F01;

    // NetworkLocator
    pub const URL_STRING: u16 = 0x4001;

    // Index table segment
    pub const INDEX_EDIT_RATE: u16 = 0x3F0B;
    pub const INDEX_START_POSITION: u16 = 0x3F0C;
    pub const INDEX_DURATION: u16 = 0x3F0D;
    pub const EDIT_UNIT_BYTE_COUNT: u16 = 0x3F05;
    pub const SLICE_COUNT: u16 = 0x3F08;
    pub const DELTA_ENTRY_ARRAY: u16 = 0x3F09;
    pub const INDEX_ENTRY_ARRAY: u16 = 0x3F0A;

    // Extension properties, mapped to their labels through the primer
    pub const MOB_ATTRIBUTE_LIST: u16 = 0x8001;
    pub const USER_COMMENTS: u16 = 0x8002;
    pub const APP_CODE: u16 = 0x8003;
    pub const CONVERT_FRAME_RATE: u16 = 0x8004;
    pub const MARKER_COLOR: u16 = 0x8005;
    pub const TAGGED_VALUE_NAME: u16 = 0x8006;
    pub const TAGGED_VALUE_VALUE: u16 = 0x8007;
    pub const COLOR_FRAME: u16 = 0x8008;
}

fn item_label(tag: u16) -> UL {
    match tag {
        tags::INSTANCE_UID => [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x15, 0x02, 0x00, 0x00,
            0x00, 0x00,
        ],
        tags::GENERATION_UID => [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x05, 0x20, 0x07, 0x01, 0x08, 0x00,
            0x00, 0x00,
        ],
        tags::MOB_ATTRIBUTE_LIST => labels::AVID_MOB_ATTRIBUTE_LIST,
        tags::USER_COMMENTS => labels::AVID_USER_COMMENTS,
        tags::APP_CODE => labels::AVID_APP_CODE,
        tags::CONVERT_FRAME_RATE => labels::AVID_CONVERT_FRAME_RATE,
        tags::MARKER_COLOR => labels::AVID_MARKER_COLOR,
        tags::TAGGED_VALUE_NAME => labels::AVID_TAGGED_VALUE_NAME,
        tags::TAGGED_VALUE_VALUE => labels::AVID_TAGGED_VALUE_VALUE,
        // remaining item labels are derived from their local tag
        _ => [
            0x06,
            0x0E,
            0x2B,
            0x34,
            0x01,
            0x01,
            0x01,
            0x02,
            0x03,
            0x01,
            (tag >> 8) as u8,
            tag as u8,
            0x00,
            0x00,
            0x00,
            0x00,
        ],
    }
}

/// The primer pack: local tag to item label mappings.
#[derive(Default)]
struct Primer {
    entries: Vec<(u16, UL)>,
}

impl Primer {
    fn register(&mut self, tag: u16) {
        if !self.entries.iter().any(|(t, _)| *t == tag) {
            self.entries.push((tag, item_label(tag)));
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.entries.len() * 18);
        bytes.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&18u32.to_be_bytes());
        for (tag, ul) in &self.entries {
            bytes.extend_from_slice(&tag.to_be_bytes());
            bytes.extend_from_slice(ul);
        }
        bytes
    }
}

/// Accumulates the local-set body of one metadata set.
struct SetBuf<'a> {
    bytes: Vec<u8>,
    primer: &'a mut Primer,
}

impl<'a> SetBuf<'a> {
    fn new(primer: &'a mut Primer) -> Self {
        SetBuf {
            bytes: Vec::new(),
            primer,
        }
    }

    fn raw(&mut self, tag: u16, value: &[u8]) -> Result<()> {
        self.primer.register(tag);
        write_local_item(&mut self.bytes, tag, value)?;
        Ok(())
    }

    fn uuid(&mut self, tag: u16, value: &Uuid) -> Result<()> {
        self.raw(tag, value.as_bytes())
    }

    fn umid(&mut self, tag: u16, value: &Umid) -> Result<()> {
        self.raw(tag, value.as_bytes())
    }

    fn ul(&mut self, tag: u16, value: &UL) -> Result<()> {
        self.raw(tag, value)
    }

    fn u8(&mut self, tag: u16, value: u8) -> Result<()> {
        self.raw(tag, &[value])
    }

    fn u16(&mut self, tag: u16, value: u16) -> Result<()> {
        self.raw(tag, &value.to_be_bytes())
    }

    fn u32(&mut self, tag: u16, value: u32) -> Result<()> {
        self.raw(tag, &value.to_be_bytes())
    }

    fn i32(&mut self, tag: u16, value: i32) -> Result<()> {
        self.raw(tag, &value.to_be_bytes())
    }

    fn i64(&mut self, tag: u16, value: i64) -> Result<()> {
        self.raw(tag, &value.to_be_bytes())
    }

    fn boolean(&mut self, tag: u16, value: bool) -> Result<()> {
        self.raw(tag, &[value as u8])
    }

    fn rational(&mut self, tag: u16, value: Rational) -> Result<()> {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&value.num.to_be_bytes());
        bytes[4..].copy_from_slice(&value.den.to_be_bytes());
        self.raw(tag, &bytes)
    }

    fn timestamp(&mut self, tag: u16, value: &Timestamp) -> Result<()> {
        self.raw(tag, &value.to_bytes())
    }

    fn product_version(&mut self, tag: u16, value: &ProductVersion) -> Result<()> {
        let mut bytes = Vec::with_capacity(10);
        for field in [
            value.major,
            value.minor,
            value.patch,
            value.build,
            value.release,
        ] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        self.raw(tag, &bytes)
    }

    fn string(&mut self, tag: u16, value: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(value.len() * 2);
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        self.raw(tag, &bytes)
    }

    fn strong_ref(&mut self, tag: u16, target: &Uuid) -> Result<()> {
        self.raw(tag, target.as_bytes())
    }

    fn ref_vector(&mut self, tag: u16, targets: &[Uuid]) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + targets.len() * 16);
        bytes.extend_from_slice(&(targets.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&16u32.to_be_bytes());
        for target in targets {
            bytes.extend_from_slice(target.as_bytes());
        }
        self.raw(tag, &bytes)
    }

    fn ul_batch(&mut self, tag: u16, uls: &[UL]) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + uls.len() * 16);
        bytes.extend_from_slice(&(uls.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&16u32.to_be_bytes());
        for ul in uls {
            bytes.extend_from_slice(ul);
        }
        self.raw(tag, &bytes)
    }

    fn u32_batch(&mut self, tag: u16, values: &[u32]) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + values.len() * 4);
        bytes.extend_from_slice(&(values.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        for value in values {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        self.raw(tag, &bytes)
    }

    fn i32_batch(&mut self, tag: u16, values: &[i32]) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + values.len() * 4);
        bytes.extend_from_slice(&(values.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        for value in values {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        self.raw(tag, &bytes)
    }
}

impl HeaderMetadata {
    /// Serialize and write the primer pack followed by all sets, returning
    /// the number of bytes written.
    pub fn write<W: Write + Seek>(&self, file: &mut MxfFile<W>) -> Result<u64> {
        let order = self.emit_order()?;

        let mut primer = Primer::default();
        let mut serialized = Vec::with_capacity(order.len());
        for id in order {
            serialized.push(self.serialize_set(id, &mut primer)?);
        }

        let min_llen = file.min_llen();
        let start = file.tell()?;
        write_klv(file, &labels::PRIMER_PACK, &primer.serialize(), min_llen)?;
        for (key, body) in &serialized {
            write_klv(file, key, body, min_llen)?;
        }
        Ok(file.tell()? - start)
    }

    /// The stable emission order, anchored at the Preface.
    fn emit_order(&self) -> Result<Vec<SetId>> {
        let preface_id = self.preface_id().ok_or_else(|| {
            MxfError::InvalidArgument("Header metadata has no preface".to_string())
        })?;

        let mut order = Vec::with_capacity(self.len());
        let mut seen = vec![false; self.len()];
        let mut push = |order: &mut Vec<SetId>, seen: &mut Vec<bool>, id: SetId| {
            let index = self.index_of(id);
            if !seen[index] {
                seen[index] = true;
                order.push(id);
            }
        };

        push(&mut order, &mut seen, preface_id);
        let Some(preface) = self.preface() else {
            return Err(MxfError::InvalidArgument(
                "Preface id does not reference a preface set".to_string(),
            ));
        };
        for &id in &preface.identifications {
            push(&mut order, &mut seen, id);
        }

        let Some(content_storage_id) = preface.content_storage else {
            return Ok(order);
        };
        push(&mut order, &mut seen, content_storage_id);

        let MetadataSet::ContentStorage(content_storage) = self.get(content_storage_id) else {
            return Err(MxfError::InvalidArgument(
                "ContentStorage reference does not name a ContentStorage set".to_string(),
            ));
        };
        for &id in &content_storage.essence_container_data {
            push(&mut order, &mut seen, id);
        }

        for &package_id in &content_storage.packages {
            push(&mut order, &mut seen, package_id);
            let Some(package) = self.package(package_id) else {
                continue;
            };

            for &track_id in &package.tracks {
                push(&mut order, &mut seen, track_id);
                let sequence_id = match self.get(track_id) {
                    MetadataSet::TimelineTrack(track) => track.sequence,
                    MetadataSet::EventTrack(track) => track.sequence,
                    _ => None,
                };
                let Some(sequence_id) = sequence_id else {
                    continue;
                };
                push(&mut order, &mut seen, sequence_id);
                if let Some(sequence) = self.sequence(sequence_id) {
                    for &component_id in &sequence.components {
                        push(&mut order, &mut seen, component_id);
                    }
                }
            }

            for &id in package.attributes.iter().chain(&package.user_comments) {
                push(&mut order, &mut seen, id);
            }

            if let Some(descriptor_id) = package.descriptor {
                push(&mut order, &mut seen, descriptor_id);
                if let Some(descriptor) = self.descriptor(descriptor_id) {
                    match descriptor {
                        Descriptor::Multiple(multiple) => {
                            for &sub_id in &multiple.sub_descriptors {
                                push(&mut order, &mut seen, sub_id);
                            }
                        }
                        Descriptor::Import(import) => {
                            for &locator_id in &import.locators {
                                push(&mut order, &mut seen, locator_id);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(order)
    }

    fn index_of(&self, id: SetId) -> usize {
        // SetId is an index into the arena
        let SetId(index) = id;
        index as usize
    }

    fn serialize_set(&self, id: SetId, primer: &mut Primer) -> Result<(UL, Vec<u8>)> {
        let mut buf = SetBuf::new(primer);
        buf.uuid(tags::INSTANCE_UID, &self.instance_uid(id))?;

        let key = match self.get(id) {
            MetadataSet::Preface(preface) => {
                buf.timestamp(tags::LAST_MODIFIED_DATE, &preface.last_modified_date)?;
                buf.u16(tags::VERSION, preface.version)?;
                let idents: Vec<Uuid> = preface
                    .identifications
                    .iter()
                    .map(|&i| self.instance_uid(i))
                    .collect();
                buf.ref_vector(tags::IDENTIFICATIONS, &idents)?;
                if let Some(cs) = preface.content_storage {
                    buf.strong_ref(tags::CONTENT_STORAGE, &self.instance_uid(cs))?;
                }
                if let Some(primary) = preface.primary_package {
                    buf.raw(tags::PRIMARY_PACKAGE, self.instance_uid(primary).as_bytes())?;
                }
                buf.ul(tags::OPERATIONAL_PATTERN, &preface.operational_pattern)?;
                buf.ul_batch(tags::ESSENCE_CONTAINERS, &preface.essence_containers)?;
                buf.ul_batch(tags::DM_SCHEMES, &preface.dm_schemes)?;
                labels::PREFACE
            }
            MetadataSet::Identification(ident) => {
                buf.uuid(tags::THIS_GENERATION_UID, &ident.this_generation_uid)?;
                buf.string(tags::COMPANY_NAME, &ident.company_name)?;
                buf.string(tags::PRODUCT_NAME, &ident.product_name)?;
                buf.product_version(tags::PRODUCT_VERSION, &ident.product_version)?;
                buf.string(tags::VERSION_STRING, &ident.version_string)?;
                buf.uuid(tags::PRODUCT_UID, &ident.product_uid)?;
                buf.timestamp(tags::MODIFICATION_DATE, &ident.modification_date)?;
                labels::IDENTIFICATION
            }
            MetadataSet::ContentStorage(cs) => {
                let packages: Vec<Uuid> =
                    cs.packages.iter().map(|&i| self.instance_uid(i)).collect();
                buf.ref_vector(tags::PACKAGES, &packages)?;
                let ecds: Vec<Uuid> = cs
                    .essence_container_data
                    .iter()
                    .map(|&i| self.instance_uid(i))
                    .collect();
                buf.ref_vector(tags::ESSENCE_CONTAINER_DATA, &ecds)?;
                labels::CONTENT_STORAGE
            }
            MetadataSet::EssenceContainerData(ecd) => {
                buf.umid(tags::LINKED_PACKAGE_UID, &ecd.linked_package_uid)?;
                buf.u32(tags::INDEX_SID, ecd.index_sid)?;
                buf.u32(tags::BODY_SID, ecd.body_sid)?;
                labels::ESSENCE_CONTAINER_DATA
            }
            MetadataSet::MaterialPackage(package) | MetadataSet::SourcePackage(package) => {
                buf.umid(tags::PACKAGE_UID, &package.package_uid)?;
                if let Some(name) = &package.name {
                    buf.string(tags::PACKAGE_NAME, name)?;
                }
                buf.timestamp(tags::PACKAGE_CREATION_DATE, &package.creation_date)?;
                buf.timestamp(tags::PACKAGE_MODIFIED_DATE, &package.modified_date)?;
                let tracks: Vec<Uuid> = package
                    .tracks
                    .iter()
                    .map(|&i| self.instance_uid(i))
                    .collect();
                buf.ref_vector(tags::TRACKS, &tracks)?;
                if let Some(descriptor) = package.descriptor {
                    buf.strong_ref(tags::DESCRIPTOR_REF, &self.instance_uid(descriptor))?;
                }
                if !package.attributes.is_empty() {
                    let refs: Vec<Uuid> = package
                        .attributes
                        .iter()
                        .map(|&i| self.instance_uid(i))
                        .collect();
                    buf.ref_vector(tags::MOB_ATTRIBUTE_LIST, &refs)?;
                }
                if !package.user_comments.is_empty() {
                    let refs: Vec<Uuid> = package
                        .user_comments
                        .iter()
                        .map(|&i| self.instance_uid(i))
                        .collect();
                    buf.ref_vector(tags::USER_COMMENTS, &refs)?;
                }
                if let Some(app_code) = package.app_code {
                    buf.i32(tags::APP_CODE, app_code)?;
                }
                if let Some(convert) = package.convert_frame_rate {
                    buf.boolean(tags::CONVERT_FRAME_RATE, convert)?;
                }
                match self.get(id) {
                    MetadataSet::MaterialPackage(_) => labels::MATERIAL_PACKAGE,
                    _ => labels::SOURCE_PACKAGE,
                }
            }
            MetadataSet::TimelineTrack(track) => {
                buf.u32(tags::TRACK_ID, track.track_id)?;
                if let Some(name) = &track.track_name {
                    buf.string(tags::TRACK_NAME, name)?;
                }
                buf.u32(tags::TRACK_NUMBER, track.track_number)?;
                buf.rational(tags::EDIT_RATE, track.edit_rate)?;
                buf.i64(tags::ORIGIN, track.origin)?;
                if let Some(sequence) = track.sequence {
                    buf.strong_ref(tags::SEQUENCE_REF, &self.instance_uid(sequence))?;
                }
                labels::TIMELINE_TRACK
            }
            MetadataSet::EventTrack(track) => {
                buf.u32(tags::TRACK_ID, track.track_id)?;
                buf.u32(tags::TRACK_NUMBER, track.track_number)?;
                buf.rational(tags::EVENT_EDIT_RATE, track.event_edit_rate)?;
                if let Some(sequence) = track.sequence {
                    buf.strong_ref(tags::SEQUENCE_REF, &self.instance_uid(sequence))?;
                }
                labels::EVENT_TRACK
            }
            MetadataSet::Sequence(sequence) => {
                buf.ul(tags::DATA_DEFINITION, &sequence.data_definition)?;
                buf.i64(tags::DURATION, sequence.duration)?;
                let components: Vec<Uuid> = sequence
                    .components
                    .iter()
                    .map(|&i| self.instance_uid(i))
                    .collect();
                buf.ref_vector(tags::STRUCTURAL_COMPONENTS, &components)?;
                labels::SEQUENCE
            }
            MetadataSet::SourceClip(clip) => {
                buf.ul(tags::DATA_DEFINITION, &clip.data_definition)?;
                buf.i64(tags::DURATION, clip.duration)?;
                buf.i64(tags::START_POSITION, clip.start_position)?;
                buf.umid(tags::SOURCE_PACKAGE_ID, &clip.source_package_id)?;
                buf.u32(tags::SOURCE_TRACK_ID, clip.source_track_id)?;
                labels::SOURCE_CLIP
            }
            MetadataSet::TimecodeComponent(component) => {
                buf.ul(tags::DATA_DEFINITION, &labels::DDEF_TIMECODE)?;
                buf.i64(tags::DURATION, component.duration)?;
                buf.i64(tags::START_TIMECODE, component.start_timecode)?;
                buf.u16(tags::ROUNDED_TIMECODE_BASE, component.rounded_tc_base)?;
                buf.boolean(tags::DROP_FRAME, component.drop_frame)?;
                labels::TIMECODE_COMPONENT
            }
            MetadataSet::DmSegment(segment) => {
                buf.ul(tags::DATA_DEFINITION, &labels::DDEF_DESCRIPTIVE_METADATA)?;
                buf.i64(tags::EVENT_START_POSITION, segment.event_start_position)?;
                if let Some(comment) = &segment.comment {
                    buf.string(tags::EVENT_COMMENT, comment)?;
                }
                if !segment.track_ids.is_empty() {
                    buf.u32_batch(tags::DM_TRACK_IDS, &segment.track_ids)?;
                }
                if let Some(color) = segment.marker_color {
                    let mut bytes = [0u8; 6];
                    bytes[0..2].copy_from_slice(&color.red.to_be_bytes());
                    bytes[2..4].copy_from_slice(&color.green.to_be_bytes());
                    bytes[4..6].copy_from_slice(&color.blue.to_be_bytes());
                    buf.raw(tags::MARKER_COLOR, &bytes)?;
                }
                labels::DM_SEGMENT
            }
            MetadataSet::NetworkLocator(locator) => {
                buf.string(tags::URL_STRING, &locator.url)?;
                labels::NETWORK_LOCATOR
            }
            MetadataSet::TaggedValue(tagged) => {
                buf.string(tags::TAGGED_VALUE_NAME, &tagged.name)?;
                buf.string(tags::TAGGED_VALUE_VALUE, &tagged.value)?;
                labels::TAGGED_VALUE
            }
            MetadataSet::Descriptor(descriptor) => match descriptor {
                Descriptor::Cdci(d) => {
                    self.write_picture_descriptor(&mut buf, d)?;
                    labels::CDCI_DESCRIPTOR
                }
                Descriptor::MpegVideo(d) => {
                    self.write_picture_descriptor(&mut buf, d)?;
                    labels::MPEG_VIDEO_DESCRIPTOR
                }
                Descriptor::WaveAudio(d) => {
                    self.write_descriptor_common(&mut buf, &d.common)?;
                    buf.rational(tags::AUDIO_SAMPLING_RATE, d.audio_sampling_rate)?;
                    buf.boolean(tags::LOCKED, d.locked)?;
                    buf.u32(tags::CHANNEL_COUNT, d.channel_count)?;
                    buf.u32(tags::QUANTIZATION_BITS, d.quantization_bits)?;
                    buf.u16(tags::BLOCK_ALIGN, d.block_align)?;
                    buf.u32(tags::AVG_BPS, d.avg_bps)?;
                    buf.ul(tags::SOUND_ESSENCE_COMPRESSION, &labels::CODING_PCM)?;
                    labels::WAVE_AUDIO_DESCRIPTOR
                }
                Descriptor::Multiple(d) => {
                    self.write_descriptor_common(&mut buf, &d.common)?;
                    let subs: Vec<Uuid> = d
                        .sub_descriptors
                        .iter()
                        .map(|&i| self.instance_uid(i))
                        .collect();
                    buf.ref_vector(tags::SUB_DESCRIPTORS, &subs)?;
                    labels::MULTIPLE_DESCRIPTOR
                }
                Descriptor::Tape(d) => {
                    buf.i32(tags::COLOR_FRAME, d.color_frame)?;
                    labels::TAPE_DESCRIPTOR
                }
                Descriptor::Import(d) => {
                    if !d.locators.is_empty() {
                        let locators: Vec<Uuid> =
                            d.locators.iter().map(|&i| self.instance_uid(i)).collect();
                        buf.ref_vector(tags::LOCATORS, &locators)?;
                    }
                    labels::IMPORT_DESCRIPTOR
                }
            },
        };

        Ok((key, buf.bytes))
    }

    fn write_descriptor_common(
        &self,
        buf: &mut SetBuf<'_>,
        common: &FileDescriptorCommon,
    ) -> Result<()> {
        buf.u32(tags::LINKED_TRACK_ID, common.linked_track_id)?;
        buf.rational(tags::SAMPLE_RATE, common.sample_rate)?;
        buf.i64(tags::CONTAINER_DURATION, common.container_duration)?;
        buf.ul(tags::ESSENCE_CONTAINER, &common.essence_container)?;
        Ok(())
    }

    fn write_picture_descriptor(&self, buf: &mut SetBuf<'_>, d: &CdciDescriptor) -> Result<()> {
        self.write_descriptor_common(buf, &d.common)?;
        buf.u8(tags::FRAME_LAYOUT, d.frame_layout)?;
        buf.u32(tags::STORED_WIDTH, d.stored_width)?;
        buf.u32(tags::STORED_HEIGHT, d.stored_height)?;
        buf.rational(tags::ASPECT_RATIO, d.aspect_ratio)?;
        buf.i32_batch(tags::VIDEO_LINE_MAP, &d.video_line_map)?;
        buf.ul(tags::PICTURE_ESSENCE_CODING, &d.picture_essence_coding)?;
        buf.u32(tags::COMPONENT_DEPTH, d.component_depth)?;
        buf.u32(tags::HORIZONTAL_SUBSAMPLING, d.horizontal_subsampling)?;
        buf.u32(tags::VERTICAL_SUBSAMPLING, d.vertical_subsampling)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::file::MxfFile;
    use crate::ul::labels;
    use mxfwrite_core::{Rational, Timestamp, Umid};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn minimal_metadata() -> (HeaderMetadata, SetId, SetId) {
        let mut hm = HeaderMetadata::new();
        let date = Timestamp::new(2024, 3, 1, 12, 0, 0, 0);

        hm.add(MetadataSet::Preface(Preface::new(labels::OP_1A_UNITRACK, date)));
        let cs_id = hm.add(MetadataSet::ContentStorage(ContentStorage::default()));

        let package_umid = Umid::generate();
        let mut package = Package::new(package_umid, date);

        let clip_id = hm.add(MetadataSet::SourceClip(SourceClip {
            data_definition: labels::DDEF_PICTURE,
            duration: -1,
            start_position: 0,
            source_package_id: Umid::default(),
            source_track_id: 0,
        }));
        let mut sequence = Sequence::new(labels::DDEF_PICTURE);
        sequence.components.push(clip_id);
        let sequence_id = hm.add(MetadataSet::Sequence(sequence));
        let track_id = hm.add(MetadataSet::TimelineTrack(Track {
            track_id: 1001,
            track_number: 0,
            track_name: Some("Video".into()),
            edit_rate: Rational::FPS_25,
            origin: 0,
            sequence: Some(sequence_id),
        }));
        package.tracks.push(track_id);
        let package_id = hm.add(MetadataSet::SourcePackage(package));

        match hm.get_mut(cs_id) {
            MetadataSet::ContentStorage(cs) => cs.packages.push(package_id),
            _ => unreachable!(),
        }
        if let Some(preface) = hm.preface_mut() {
            preface.content_storage = Some(cs_id);
        }

        (hm, sequence_id, clip_id)
    }

    #[test]
    fn test_write_starts_with_primer_pack() {
        let (hm, _, _) = minimal_metadata();
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let written = hm.write(&mut file).unwrap();

        let bytes = file.into_inner().into_inner();
        assert_eq!(written, bytes.len() as u64);
        assert_eq!(&bytes[0..16], &labels::PRIMER_PACK);
    }

    #[test]
    fn test_rewrite_preserves_length() {
        let (mut hm, sequence_id, clip_id) = minimal_metadata();

        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let first = hm.write(&mut file).unwrap();

        // completing the write changes durations from -1 to final values
        hm.sequence_mut(sequence_id).unwrap().duration = 250;
        hm.source_clip_mut(clip_id).unwrap().duration = 250;

        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let second = hm.write(&mut file).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_write_without_preface_fails() {
        let hm = HeaderMetadata::new();
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        assert!(hm.write(&mut file).is_err());
    }

    #[test]
    fn test_tagged_values_and_dm_segments_serialize() {
        let (mut hm, _, _) = minimal_metadata();
        let comment_id = hm.add(MetadataSet::TaggedValue(TaggedValue {
            name: "Descript".into(),
            value: "news item".into(),
        }));
        let dm_id = hm.add(MetadataSet::DmSegment(DmSegment {
            event_start_position: 100,
            comment: Some("first cut".into()),
            track_ids: vec![1],
            marker_color: Some(RgbColor {
                red: 41471,
                green: 12134,
                blue: 6564,
            }),
        }));
        let mut dm_sequence = Sequence::new(labels::DDEF_DESCRIPTIVE_METADATA);
        dm_sequence.components.push(dm_id);
        let dm_sequence_id = hm.add(MetadataSet::Sequence(dm_sequence));
        let event_track_id = hm.add(MetadataSet::EventTrack(EventTrack {
            track_id: 1000,
            track_number: 1,
            event_edit_rate: Rational::FPS_25,
            sequence: Some(dm_sequence_id),
        }));

        // attach to the package so emit order reaches the new sets
        let package_id = {
            let preface = hm.preface().unwrap();
            let cs_id = preface.content_storage.unwrap();
            match hm.get(cs_id) {
                MetadataSet::ContentStorage(cs) => cs.packages[0],
                _ => unreachable!(),
            }
        };
        let package = hm.package_mut(package_id).unwrap();
        package.tracks.push(event_track_id);
        package.user_comments.push(comment_id);

        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let written = hm.write(&mut file).unwrap();
        assert!(written > 0);

        let bytes = file.into_inner().into_inner();
        let find =
            |needle: &[u8]| bytes.windows(needle.len()).any(|window| window == needle);
        assert!(find(&labels::TAGGED_VALUE));
        assert!(find(&labels::DM_SEGMENT));
        assert!(find(&labels::EVENT_TRACK));
    }
}
