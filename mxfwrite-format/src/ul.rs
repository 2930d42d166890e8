//! Universal Label (UL) types and the label inventory used when writing.
//!
//! Universal Labels are 16-byte identifiers defined by SMPTE for all
//! elements in MXF files: partition packs, metadata sets, essence containers
//! and essence elements.

use std::fmt;

/// A 16-byte Universal Label.
pub type UL = [u8; 16];

/// Universal Label wrapper with helper methods.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniversalLabel(pub UL);

impl UniversalLabel {
    /// Create from raw bytes.
    pub fn new(bytes: UL) -> Self {
        UniversalLabel(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &UL {
        &self.0
    }

    /// Check if this is a SMPTE-registered label (starts with 06 0E 2B 34).
    pub fn is_smpte(&self) -> bool {
        self.0[0] == 0x06 && self.0[1] == 0x0E && self.0[2] == 0x2B && self.0[3] == 0x34
    }

    /// Check if this is a partition pack key of any kind.
    pub fn is_partition_pack(&self) -> bool {
        self.0[0..13] == labels::PARTITION_PACK_BASE[0..13]
            && (0x02..=0x04).contains(&self.0[13])
    }

    /// Check if this is a header partition pack key.
    pub fn is_header_partition(&self) -> bool {
        self.is_partition_pack() && self.0[13] == 0x02
    }

    /// Check if this is a body partition pack key.
    pub fn is_body_partition(&self) -> bool {
        self.is_partition_pack() && self.0[13] == 0x03
    }

    /// Check if this is a footer partition pack key.
    pub fn is_footer_partition(&self) -> bool {
        self.is_partition_pack() && self.0[13] == 0x04
    }

    /// Check if this is a fill item.
    pub fn is_fill_item(&self) -> bool {
        self.0[0..4] == labels::KLV_FILL[0..4] && self.0[8..13] == labels::KLV_FILL[8..13]
    }
}

impl fmt::Debug for UniversalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UL(")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Openness and completeness embedded in a partition pack key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    OpenIncomplete,
    ClosedIncomplete,
    OpenComplete,
    ClosedComplete,
}

impl PartitionState {
    /// The key byte 14 value for this state.
    pub fn key_byte(&self) -> u8 {
        match self {
            PartitionState::OpenIncomplete => 0x01,
            PartitionState::ClosedIncomplete => 0x02,
            PartitionState::OpenComplete => 0x03,
            PartitionState::ClosedComplete => 0x04,
        }
    }

    /// Decode a state from key byte 14.
    pub fn from_key_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PartitionState::OpenIncomplete),
            0x02 => Some(PartitionState::ClosedIncomplete),
            0x03 => Some(PartitionState::OpenComplete),
            0x04 => Some(PartitionState::ClosedComplete),
            _ => None,
        }
    }
}

/// Label constants used by the writer.
pub mod labels {
    use super::UL;

    /// Common prefix of partition pack keys; byte 13 selects header/body/footer
    /// and byte 14 the openness/completeness state.
    pub const PARTITION_PACK_BASE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x02, 0x00,
        0x00,
    ];

    /// Primer pack.
    pub const PRIMER_PACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x05, 0x01,
        0x00,
    ];

    /// KLV fill item, SMPTE 377-1 compliant version.
    pub const KLV_FILL: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// KLV fill item with the pre-377-1 version byte.
    pub const KLV_FILL_LEGACY: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// Random Index Pack.
    pub const RANDOM_INDEX_PACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x11, 0x01,
        0x00,
    ];

    /// Index table segment set.
    pub const INDEX_TABLE_SEGMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
        0x00,
    ];

    // ------------------------------------------------------------------
    // Operational patterns
    // ------------------------------------------------------------------

    /// OP-1a, multi-track, stream, internal essence.
    pub const OP_1A_MULTITRACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01, 0x09,
        0x00,
    ];

    /// OP-1a, uni-track, stream, internal essence (per-track files).
    pub const OP_1A_UNITRACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01, 0x01,
        0x00,
    ];

    /// Avid OP-Atom style per-track file pattern.
    pub const OP_ATOM: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0D, 0x01, 0x02, 0x01, 0x10, 0x00, 0x00,
        0x00,
    ];

    // ------------------------------------------------------------------
    // Header metadata set keys (byte 14 selects the set)
    // ------------------------------------------------------------------

    const fn set_key(set: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01,
            set, 0x00,
        ]
    }

    pub const PREFACE: UL = set_key(0x2F);
    pub const IDENTIFICATION: UL = set_key(0x30);
    pub const CONTENT_STORAGE: UL = set_key(0x18);
    pub const ESSENCE_CONTAINER_DATA: UL = set_key(0x23);
    pub const MATERIAL_PACKAGE: UL = set_key(0x36);
    pub const SOURCE_PACKAGE: UL = set_key(0x37);
    pub const TIMELINE_TRACK: UL = set_key(0x3B);
    pub const EVENT_TRACK: UL = set_key(0x39);
    pub const SEQUENCE: UL = set_key(0x0F);
    pub const SOURCE_CLIP: UL = set_key(0x11);
    pub const TIMECODE_COMPONENT: UL = set_key(0x14);
    pub const DM_SEGMENT: UL = set_key(0x41);
    pub const NETWORK_LOCATOR: UL = set_key(0x32);
    pub const MULTIPLE_DESCRIPTOR: UL = set_key(0x44);
    pub const CDCI_DESCRIPTOR: UL = set_key(0x28);
    pub const MPEG_VIDEO_DESCRIPTOR: UL = set_key(0x51);
    pub const WAVE_AUDIO_DESCRIPTOR: UL = set_key(0x48);
    pub const TAPE_DESCRIPTOR: UL = set_key(0x2E);
    pub const IMPORT_DESCRIPTOR: UL = set_key(0x4A);
    pub const TAGGED_VALUE: UL = set_key(0x3F);

    // ------------------------------------------------------------------
    // Data definitions
    // ------------------------------------------------------------------

    pub const DDEF_PICTURE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x01, 0x00, 0x00,
        0x00,
    ];
    pub const DDEF_SOUND: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x02, 0x00, 0x00,
        0x00,
    ];
    pub const DDEF_TIMECODE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x01, 0x01, 0x00, 0x00,
        0x00,
    ];
    pub const DDEF_DESCRIPTIVE_METADATA: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x01, 0x10, 0x00, 0x00,
        0x00,
    ];

    /// Check if a data definition label is the picture label.
    pub fn is_picture_ddef(ul: &UL) -> bool {
        *ul == DDEF_PICTURE
    }

    /// Check if a data definition label is the sound label.
    pub fn is_sound_ddef(ul: &UL) -> bool {
        *ul == DDEF_SOUND
    }

    /// Check if a data definition label is the timecode label.
    pub fn is_timecode_ddef(ul: &UL) -> bool {
        *ul == DDEF_TIMECODE
    }

    // ------------------------------------------------------------------
    // Essence container labels (byte 13/14 select the mapping and profile)
    // ------------------------------------------------------------------

    const fn container_key(mapping: u8, profile: u8, wrapping: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x02,
            mapping, profile, wrapping,
        ]
    }

    pub const EC_IEC_DV25_FRAME: UL = container_key(0x02, 0x02, 0x01);
    pub const EC_DVBASED_DV25_FRAME: UL = container_key(0x02, 0x3A, 0x01);
    pub const EC_DV50_FRAME: UL = container_key(0x02, 0x48, 0x01);
    pub const EC_DV100_FRAME: UL = container_key(0x02, 0x60, 0x01);
    pub const EC_D10_FRAME: UL = container_key(0x01, 0x01, 0x01);
    pub const EC_AVCI_FRAME: UL = container_key(0x10, 0x60, 0x01);
    pub const EC_UNC_FRAME: UL = container_key(0x05, 0x7F, 0x01);
    pub const EC_MPEG_ES_FRAME: UL = container_key(0x04, 0x60, 0x01);
    pub const EC_BWF_FRAME: UL = container_key(0x06, 0x01, 0x00);
    pub const EC_BWF_CLIP: UL = container_key(0x06, 0x02, 0x00);
    /// Generic container holding multiple wrappings (OP-1a multi-stream).
    pub const EC_GENERIC_MULTIPLE: UL = container_key(0x7F, 0x01, 0x00);

    // ------------------------------------------------------------------
    // Picture / sound essence coding labels used in descriptors
    // ------------------------------------------------------------------

    const fn coding_key(b12: u8, b13: u8, b14: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x04, 0x01, 0x02, 0x02, b12, b13,
            b14, 0x00,
        ]
    }

    pub const CODING_IEC_DV25: UL = coding_key(0x02, 0x01, 0x02);
    pub const CODING_DVBASED_DV25: UL = coding_key(0x02, 0x02, 0x02);
    pub const CODING_DV50: UL = coding_key(0x02, 0x02, 0x04);
    pub const CODING_DV100: UL = coding_key(0x02, 0x02, 0x06);
    pub const CODING_D10: UL = coding_key(0x01, 0x02, 0x01);
    pub const CODING_AVCI: UL = coding_key(0x01, 0x32, 0x01);
    pub const CODING_MPEG2LG: UL = coding_key(0x01, 0x03, 0x03);
    pub const CODING_UNC: UL = coding_key(0x01, 0x7F, 0x00);

    /// AES3/BWF PCM sound essence compression (uncompressed).
    pub const CODING_PCM: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x04, 0x02, 0x02, 0x01, 0x00, 0x00, 0x00,
        0x00,
    ];

    // ------------------------------------------------------------------
    // Avid extension property labels, mapped through the primer
    // ------------------------------------------------------------------

    const fn avid_ext_key(b14: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x01, 0x01, 0x01, 0x01,
            b14, 0x00,
        ]
    }

    pub const AVID_MOB_ATTRIBUTE_LIST: UL = avid_ext_key(0x01);
    pub const AVID_USER_COMMENTS: UL = avid_ext_key(0x02);
    pub const AVID_APP_CODE: UL = avid_ext_key(0x03);
    pub const AVID_CONVERT_FRAME_RATE: UL = avid_ext_key(0x04);
    pub const AVID_MARKER_COLOR: UL = avid_ext_key(0x05);
    pub const AVID_TAGGED_VALUE_NAME: UL = avid_ext_key(0x06);
    pub const AVID_TAGGED_VALUE_VALUE: UL = avid_ext_key(0x07);
}

/// The track number linked to an essence element key: its last four bytes.
pub fn essence_track_number(key: &UL) -> u32 {
    u32::from_be_bytes([key[12], key[13], key[14], key[15]])
}

/// Build a partition pack key for a kind byte and state.
pub fn partition_pack_key(kind_byte: u8, state: PartitionState) -> UL {
    let mut key = labels::PARTITION_PACK_BASE;
    key[13] = kind_byte;
    key[14] = state.key_byte();
    key
}

/// Build an essence element key.
///
/// `item_type` is the generic container item type (e.g. 0x15 picture,
/// 0x16 sound, 0x18 compound), `element_type` the coding-specific element
/// type and `element_number` the 1-based element number within the item.
pub fn essence_element_key(
    item_type: u8,
    element_count: u8,
    element_type: u8,
    element_number: u8,
) -> UL {
    [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, item_type,
        element_count, element_type, element_number,
    ]
}
