//! UUID and UMID generation.
//!
//! UMIDs (SMPTE 330M) are 32 bytes: a 16-byte prefix describing material
//! type and generation method, followed by a 16-byte material number. Both
//! the standard prefix (material type not identified, UUID generation
//! method) and the Avid-flavoured prefix are supported.

use std::fmt;
use uuid::Uuid;

// material type not identified, UUID material generation method,
// no instance method defined
const UMID_PREFIX: [u8; 16] = [
    0x06, 0x0a, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x05, 0x01, 0x01, 0x0f, 0x20, 0x13, 0x00, 0x00,
    0x00,
];

// prefix used by Avid AAF-compatible files
const AVID_UMID_PREFIX: [u8; 16] = [
    0x06, 0x0a, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x0f, 0x00, 0x13, 0x00, 0x00,
    0x00,
];

/// The all-zero UMID used for unresolved source references.
pub const NULL_UMID: Umid = Umid([0; 32]);

/// Generate a universally unique 16-byte identifier.
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// A 32-byte Unique Material Identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Umid(pub [u8; 32]);

impl Umid {
    /// Create a UMID from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Umid(bytes)
    }

    /// Generate a UMID with the standard SMPTE prefix.
    pub fn generate() -> Self {
        Self::with_prefix(&UMID_PREFIX)
    }

    /// Generate a UMID with the Avid prefix.
    pub fn generate_avid() -> Self {
        Self::with_prefix(&AVID_UMID_PREFIX)
    }

    fn with_prefix(prefix: &[u8; 16]) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(prefix);
        bytes[16..].copy_from_slice(generate_uuid().as_bytes());
        Umid(bytes)
    }

    /// Check whether this is the null UMID.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The material number (the trailing UUID).
    pub fn material_number(&self) -> &[u8] {
        &self.0[16..]
    }
}

impl Default for Umid {
    fn default() -> Self {
        NULL_UMID
    }
}

impl fmt::Debug for Umid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Umid(")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
