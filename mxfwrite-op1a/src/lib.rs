//! # mxfwrite-op1a
//!
//! OP-1a single-file MXF writing: one file whose header metadata, index
//! table, body partition and footer describe several essence streams wrapped
//! together. The clip interleaves one content package per edit unit, picture
//! elements first, in the element order frozen at prepare time. A clip with
//! a single sound stream is clip-wrapped at the sampling rate instead.

mod clip;
mod content;

pub use clip::{Op1aClip, Op1aClipConfig};
