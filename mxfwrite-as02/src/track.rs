//! One essence component file of an AS-02 bundle.
//!
//! Wraps the shared track writer with bundle concerns: the manifest entry,
//! the essence-only integrity digest and the component file naming.

use crate::error::Result;
use crate::manifest::{MicContext, MicScope, MicType};
use mxfwrite_core::Umid;
use mxfwrite_format::writer::{single_track_metadata, ClipInfo, TrackWriter, TrackWriterConfig};
use mxfwrite_format::{EssenceConfig, IndexEntry, MxfError};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// One essence component track.
pub struct As02Track {
    essence: EssenceConfig,
    filepath: PathBuf,
    relative_uri: String,
    manifest_index: usize,
    clip_track_number: u32,
    material_package_uid: Umid,
    file_package_uid: Umid,
    mic_type: MicType,
    mic_scope: MicScope,
    mic_context: MicContext,
    mic_value: Option<String>,
    lower_level_source: Option<(Umid, u32)>,
    output_start_offset: i64,
    output_end_offset: i64,
    final_duration: Option<i64>,
    container_duration: i64,
    writer: Option<TrackWriter<BufWriter<File>>>,
}

impl As02Track {
    pub(crate) fn new(
        essence: EssenceConfig,
        filepath: PathBuf,
        relative_uri: String,
        manifest_index: usize,
        clip_track_number: u32,
    ) -> Self {
        As02Track {
            essence,
            filepath,
            relative_uri,
            manifest_index,
            clip_track_number,
            material_package_uid: Umid::generate(),
            file_package_uid: Umid::generate(),
            mic_type: MicType::None,
            mic_scope: MicScope::EssenceOnly,
            mic_context: MicContext::None,
            mic_value: None,
            lower_level_source: None,
            output_start_offset: 0,
            output_end_offset: 0,
            final_duration: None,
            container_duration: 0,
            writer: None,
        }
    }

    /// The UMID of the file source package, also used as the manifest id.
    pub fn file_package_uid(&self) -> Umid {
        self.file_package_uid
    }

    /// The component file's relative URI within the bundle.
    pub fn relative_uri(&self) -> &str {
        &self.relative_uri
    }

    /// The manifest entry index of this component.
    pub fn manifest_index(&self) -> usize {
        self.manifest_index
    }

    /// Whether this is a picture track.
    pub fn is_picture(&self) -> bool {
        self.essence.essence_type.is_picture()
    }

    /// The essence configuration.
    pub fn essence(&self) -> &EssenceConfig {
        &self.essence
    }

    /// Select the integrity check algorithm.
    pub fn set_mic_type(&mut self, mic_type: MicType) {
        self.mic_type = mic_type;
    }

    /// Select the integrity check scope.
    pub fn set_mic_scope(&mut self, mic_scope: MicScope) {
        self.mic_scope = mic_scope;
    }

    /// The selected integrity check settings and final value.
    pub fn mic(&self) -> (MicType, MicScope, Option<&str>) {
        (self.mic_type, self.mic_scope, self.mic_value.as_deref())
    }

    /// Reference a lower-level source package by UMID and track id.
    pub fn set_lower_level_source(&mut self, package_uid: Umid, track_id: u32) {
        self.lower_level_source = Some((package_uid, track_id));
    }

    /// Skip essence at the start of the output timeline.
    pub fn set_output_start_offset(&mut self, offset: i64) -> Result<()> {
        if offset < 0 {
            return Err(MxfError::InvalidArgument(format!(
                "Output start offset {} is negative",
                offset
            ))
            .into());
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
            ))
            .into());
        }
        self.output_end_offset = offset;
        Ok(())
    }

    pub(crate) fn prepare(&mut self, info: &ClipInfo) -> Result<()> {
        let config = TrackWriterConfig::new(self.essence.clone());

        let suffix = format!(
            "__track_{}{}",
            if self.is_picture() { "v" } else { "a" },
            self.clip_track_number
        );
        let (header_metadata, material_package, file_package) = single_track_metadata(
            info,
            &config,
            self.material_package_uid,
            self.file_package_uid,
            Some(&suffix),
            self.lower_level_source,
            self.output_start_offset,
        );

        let sink = BufWriter::new(File::create(&self.filepath)?);
        let mut writer = TrackWriter::new(
            sink,
            config,
            header_metadata,
            material_package,
            file_package,
        )?;
        writer.set_output_start_offset(self.output_start_offset)?;
        writer.set_output_end_offset(self.output_end_offset)?;
        writer.prepare_write()?;
        self.writer = Some(writer);

        self.mic_context = if self.mic_scope == MicScope::EssenceOnly {
            MicContext::new(self.mic_type)
        } else {
            MicContext::None
        };
        Ok(())
    }

    pub(crate) fn write_samples(&mut self, data: &[u8], num_samples: u32) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MxfError::StateMisuse {
            operation: "write_samples",
            state: "new",
        })?;
        writer.write_samples(data, num_samples)?;
        self.mic_context.update(data);
        Ok(())
    }

    /// Cache a VBE index entry for an upcoming edit unit.
    pub fn add_index_entry(&mut self, position: i64, entry: IndexEntry) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MxfError::StateMisuse {
            operation: "add_index_entry",
            state: "new",
        })?;
        writer.add_index_entry(position, entry)?;
        Ok(())
    }

    /// Patch a temporal offset once the reordering is known.
    pub fn update_index_entry(&mut self, position: i64, temporal_offset: i8) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MxfError::StateMisuse {
            operation: "update_index_entry",
            state: "new",
        })?;
        writer.update_index_entry(position, temporal_offset)?;
        Ok(())
    }

    pub(crate) fn complete(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or(MxfError::StateMisuse {
            operation: "complete_write",
            state: "new",
        })?;
        writer.complete_write()?;
        self.final_duration = Some(writer.output_duration()?);
        self.container_duration = writer.container_duration();

        let context = std::mem::replace(&mut self.mic_context, MicContext::None);
        self.mic_value = context.finalize();
        Ok(())
    }

    /// Output duration in edit units, known after complete.
    pub fn output_duration(&self) -> Option<i64> {
        self.final_duration
    }

    /// Essence container duration in edit units.
    pub fn container_duration(&self) -> i64 {
        self.writer
            .as_ref()
            .map(|writer| writer.container_duration())
            .unwrap_or(self.container_duration)
    }
}
