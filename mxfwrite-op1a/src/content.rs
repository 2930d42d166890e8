//! Per-stream sample buffering for content package interleaving.
//!
//! Picture streams queue whole frames; sound streams queue raw sample bytes
//! that are chunked into the per-edit-unit block when a content package is
//! assembled.

use mxfwrite_core::{convert_duration_rate, Rational, Rounding};
use mxfwrite_format::{EssenceConfig, MxfError, Result, UL};
use std::collections::VecDeque;

/// One essence stream of an OP-1a clip.
pub(crate) struct Stream {
    pub essence: EssenceConfig,
    pub element_key: UL,
    /// Timeline track id in both packages.
    pub track_id: u32,
    /// Samples of this stream per content package.
    pub samples_per_edit_unit: u32,
    /// Samples written, at the stream's own sample rate.
    pub container_duration: i64,
    frames: VecDeque<Vec<u8>>,
    bytes: Vec<u8>,
}

impl Stream {
    pub fn new(essence: EssenceConfig, element_key: UL, track_id: u32) -> Self {
        Stream {
            essence,
            element_key,
            track_id,
            samples_per_edit_unit: 1,
            container_duration: 0,
            frames: VecDeque::new(),
            bytes: Vec::new(),
        }
    }

    /// Fix the number of samples per content package for the clip frame
    /// rate. Sound streams must divide into whole samples per edit unit.
    pub fn resolve_samples_per_edit_unit(&mut self, frame_rate: Rational) -> Result<()> {
        if self.essence.essence_type.is_picture() {
            self.samples_per_edit_unit = 1;
            return Ok(());
        }

        let rate = self.essence.sample_rate;
        let num = rate.num as i64 * frame_rate.den as i64;
        let den = rate.den as i64 * frame_rate.num as i64;
        if num % den != 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Sample rate {} does not divide into whole samples per {} edit unit",
                rate, frame_rate
            )));
        }
        self.samples_per_edit_unit =
            convert_duration_rate(frame_rate, 1, rate, Rounding::Nearest) as u32;
        Ok(())
    }

    /// Queue incoming samples.
    pub fn push(&mut self, data: &[u8], num_samples: u32) -> Result<()> {
        if self.essence.essence_type.is_picture() {
            if num_samples != 1 {
                return Err(MxfError::InvalidArgument(
                    "Picture streams are written one frame at a time".to_string(),
                ));
            }
            let sample_size = self.essence.sample_size();
            if sample_size > 0 && data.len() < sample_size as usize {
                return Err(MxfError::InvalidArgument(format!(
                    "Frame of {} bytes is smaller than the fixed sample size {}",
                    data.len(),
                    sample_size
                )));
            }
            self.frames.push_back(data.to_vec());
        } else {
            let block_align = self.essence.block_align() as u64;
            if data.len() as u64 != num_samples as u64 * block_align {
                return Err(MxfError::InvalidArgument(format!(
                    "{} bytes do not hold {} samples of {} bytes",
                    data.len(),
                    num_samples,
                    block_align
                )));
            }
            self.bytes.extend_from_slice(data);
        }
        self.container_duration += num_samples as i64;
        Ok(())
    }

    /// Whether a complete edit unit is buffered.
    pub fn has_edit_unit(&self) -> bool {
        if self.essence.essence_type.is_picture() {
            !self.frames.is_empty()
        } else {
            self.bytes.len() >= self.edit_unit_bytes()
        }
    }

    /// Bytes buffered beyond complete edit units.
    pub fn leftover_bytes(&self) -> usize {
        if self.essence.essence_type.is_picture() {
            self.frames.iter().map(|f| f.len()).sum()
        } else {
            self.bytes.len()
        }
    }

    /// Take one edit unit's worth of data.
    pub fn pop_edit_unit(&mut self) -> Vec<u8> {
        if self.essence.essence_type.is_picture() {
            self.frames.pop_front().unwrap_or_default()
        } else {
            let take = self.edit_unit_bytes().min(self.bytes.len());
            self.bytes.drain(..take).collect()
        }
    }

    fn edit_unit_bytes(&self) -> usize {
        self.samples_per_edit_unit as usize * self.essence.block_align() as usize
    }
}
