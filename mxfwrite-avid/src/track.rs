//! One per-track file of an Avid clip.

use mxfwrite_core::Umid;
use mxfwrite_format::writer::TrackWriter;
use mxfwrite_format::{EssenceConfig, IndexEntry, MxfError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// One essence track written to its own Avid-flavoured file.
pub struct AvidTrack {
    pub(crate) essence: EssenceConfig,
    pub(crate) filepath: PathBuf,
    pub(crate) file_package_uid: Umid,
    /// Track id within the material package, assigned at prepare.
    pub(crate) material_track_id: u32,
    pub(crate) source_ref: Option<(Umid, u32)>,
    pub(crate) output_start_offset: i64,
    pub(crate) output_end_offset: i64,
    pub(crate) writer: Option<TrackWriter<BufWriter<File>>>,
    pub(crate) final_output_duration: Option<i64>,
}

impl AvidTrack {
    pub(crate) fn new(essence: EssenceConfig, filepath: PathBuf) -> Self {
        AvidTrack {
            essence,
            filepath,
            file_package_uid: Umid::generate_avid(),
            material_track_id: 0,
            source_ref: None,
            output_start_offset: 0,
            output_end_offset: 0,
            writer: None,
            final_output_duration: None,
        }
    }

    /// Whether this is a picture track.
    pub fn is_picture(&self) -> bool {
        self.essence.essence_type.is_picture()
    }

    /// The essence configuration.
    pub fn essence(&self) -> &EssenceConfig {
        &self.essence
    }

    /// The Avid-prefixed UMID of the file source package.
    pub fn file_package_uid(&self) -> Umid {
        self.file_package_uid
    }

    /// The file this track writes to.
    pub fn filepath(&self) -> &std::path::Path {
        &self.filepath
    }

    /// Reference a tape or import source package track.
    pub fn set_source_ref(&mut self, package_uid: Umid, track_id: u32) {
        self.source_ref = Some((package_uid, track_id));
    }

    /// Skip essence at the start of the output timeline.
    pub fn set_output_start_offset(&mut self, offset: i64) -> Result<()> {
        if offset < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output start offset {} is negative",
                offset
            )));
        }
        self.output_start_offset = offset;
        Ok(())
    }

    /// Trim essence at the end of the output timeline.
    pub fn set_output_end_offset(&mut self, offset: i64) -> Result<()> {
        if offset > 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output end offset {} is positive",
                offset
            )));
        }
        self.output_end_offset = offset;
        Ok(())
    }

    /// Cache a VBE index entry for an upcoming edit unit.
    pub fn add_index_entry(&mut self, position: i64, entry: IndexEntry) -> Result<()> {
        self.writer_mut("add_index_entry")?.add_index_entry(position, entry)
    }

    /// Patch a temporal offset once the reordering is known.
    pub fn update_index_entry(&mut self, position: i64, temporal_offset: i8) -> Result<()> {
        self.writer_mut("update_index_entry")?
            .update_index_entry(position, temporal_offset)
    }

    pub(crate) fn write_samples(&mut self, data: &[u8], num_samples: u32) -> Result<()> {
        self.writer_mut("write_samples")?.write_samples(data, num_samples)
    }

    pub(crate) fn complete(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MxfError::StateMisuse {
            operation: "complete_write",
            state: "new",
        })?;
        writer.complete_write()?;
        self.final_output_duration = Some(writer.output_duration()?);
        Ok(())
    }

    /// The file's header metadata graph, available once prepared.
    pub fn header_metadata(&self) -> Option<&mxfwrite_format::HeaderMetadata> {
        self.writer.as_ref().map(|writer| writer.header_metadata())
    }

    /// The material package copy in this file's metadata.
    pub fn material_package_id(&self) -> Option<mxfwrite_format::SetId> {
        self.writer.as_ref().map(|writer| writer.material_package_id())
    }

    /// The file source package in this file's metadata.
    pub fn file_source_package_id(&self) -> Option<mxfwrite_format::SetId> {
        self.writer.as_ref().map(|writer| writer.file_source_package_id())
    }

    /// Output duration in edit units; before complete it reflects the
    /// samples written so far.
    pub fn output_duration(&self) -> Result<i64> {
        if let Some(duration) = self.final_output_duration {
            return Ok(duration);
        }
        match &self.writer {
            Some(writer) => writer.output_duration(),
            None => Ok(0),
        }
    }

    pub(crate) fn writer_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut TrackWriter<BufWriter<File>>> {
        self.writer.as_mut().ok_or(MxfError::StateMisuse {
            operation,
            state: "new",
        })
    }
}
