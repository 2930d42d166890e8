//! # mxfwrite-core
//!
//! Core types and utilities shared by the mxfwrite MXF authoring crates:
//! - Rational edit rates and the position/duration conversion algebra
//! - SMPTE 12M timecode with drop-frame support
//! - MXF timestamps (1/250 s quantum)
//! - UUID and UMID generation

pub mod error;
pub mod identifiers;
pub mod rational;
pub mod timecode;
pub mod timestamp;

pub use error::{CoreError, Result};
pub use identifiers::{generate_uuid, Umid, NULL_UMID};
pub use rational::{
    convert_duration, convert_duration_rate, convert_position, convert_position_rate,
    rounded_tc_base, Rational, Rounding,
};
pub use timecode::Timecode;
pub use timestamp::Timestamp;
