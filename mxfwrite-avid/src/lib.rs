//! # mxfwrite-avid
//!
//! Avid-flavoured AAF-compatible MXF writing: per-track files plus an
//! Avid-style material package with user comments and colour-coded locators,
//! laid out for ingest by Avid editors. Every track file carries its own
//! copy of the material package and of the tape or import source packages it
//! references.

mod clip;
mod track;

pub use clip::{AvidClip, AvidLocator, AvidRgbColor, SourceKind};
pub use track::AvidTrack;
