//! # mxfwrite-as02
//!
//! AS-02 bundle writing: a directory holding a manifest, a shim, a primary
//! version MXF file and per-track media MXF files cross-referenced by UMID.
//! Each essence component registers itself in the manifest at creation time
//! and may carry a media integrity check over its essence bytes or the
//! entire file.

mod bundle;
mod clip;
mod error;
mod manifest;
mod shim;
mod track;

pub use bundle::As02Bundle;
pub use clip::As02Clip;
pub use error::{As02Error, Result};
pub use manifest::{FileRole, Manifest, ManifestFile, MicContext, MicScope, MicType};
pub use shim::Shim;
pub use track::As02Track;
