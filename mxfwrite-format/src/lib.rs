//! # mxfwrite-format
//!
//! MXF (SMPTE 377-1) file structure primitives and the shared authoring
//! engine used by the OP-1a, AS-02 and Avid output flavours:
//!
//! - Universal Labels and the label inventory used when writing
//! - KLV framing with configurable BER length encoding
//! - Partition packs and the Random Index Pack
//! - A seekable MXF file wrapper with KAG fill and in-place partition rewrite
//! - Header metadata modelled as a flat arena of sets
//! - The index table builder (CBE and VBE)
//! - The essence capability table
//! - The per-file track writer state machine

pub mod descriptor;
pub mod error;
pub mod file;
pub mod index;
pub mod klv;
pub mod metadata;
pub mod partition;
pub mod ul;
pub mod writer;

pub use descriptor::{EssenceConfig, EssenceType};
pub use error::{MxfError, Result};
pub use file::MxfFile;
pub use index::{CbeIndexSegment, DeltaEntry, IndexEntry, IndexTable};
pub use metadata::{HeaderMetadata, MetadataSet, SetId};
pub use partition::{Partition, PartitionKind, RandomIndexPack};
pub use ul::{UniversalLabel, UL};
pub use writer::{TrackWriter, TrackWriterConfig, WrappingMode};
