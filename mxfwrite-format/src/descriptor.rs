//! Essence types and the capability table.
//!
//! Each essence family/profile is one `EssenceType` variant; the table maps a
//! variant to its essence container label, element key, supported sample
//! rates, index shape and sample-size rule, and builds the matching file
//! descriptor. Unknown (type, rate) pairs fail before any file is created.

use crate::error::{MxfError, Result};
use crate::metadata::{
    CdciDescriptor, Descriptor, FileDescriptorCommon, HeaderMetadata, MetadataSet, SetId,
    WaveAudioDescriptor,
};
use crate::ul::{essence_element_key, labels, UL};
use mxfwrite_core::Rational;

/// Extra bytes in the first AVC-Intra edit unit when the sequence and
/// picture parameter sets are prepended.
pub const AVCI_HEADER_SIZE: u32 = 512;

const RATES_50HZ_FAMILY: &[Rational] = &[Rational::FPS_25, Rational::FPS_2997];
const RATES_ALL_FRAME: &[Rational] = &[
    Rational::FPS_25,
    Rational::FPS_2997,
    Rational::FPS_50,
    Rational::FPS_5994,
];
const RATES_PCM: &[Rational] = &[Rational::SR_48K];

/// Supported essence families and profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceType {
    IecDv25,
    DvBasedDv25,
    Dv50,
    Dv100_1080i,
    Dv100_720p,
    D10_30,
    D10_40,
    D10_50,
    Avci100_1080i,
    Avci100_1080p,
    Avci100_720p,
    Avci50_1080i,
    Avci50_1080p,
    Avci50_720p,
    UncSd,
    UncHd1080i,
    UncHd1080p,
    UncHd720p,
    Mpeg2lg422pHl,
    Mpeg2lgMpHl,
    Mpeg2lgMpH14,
    WavePcm,
}

impl EssenceType {
    /// Whether this is a picture essence type.
    pub fn is_picture(&self) -> bool {
        !matches!(self, EssenceType::WavePcm)
    }

    /// Whether edit units have a constant byte count.
    pub fn is_cbe(&self) -> bool {
        !matches!(
            self,
            EssenceType::Mpeg2lg422pHl | EssenceType::Mpeg2lgMpHl | EssenceType::Mpeg2lgMpH14
        )
    }

    /// Whether index entries need temporal reordering offsets.
    pub fn apply_temporal_reordering(&self) -> bool {
        matches!(
            self,
            EssenceType::Mpeg2lg422pHl | EssenceType::Mpeg2lgMpHl | EssenceType::Mpeg2lgMpH14
        )
    }

    /// Whether this is an AVC-Intra type with an oversized first edit unit.
    pub fn is_avc_intra(&self) -> bool {
        matches!(
            self,
            EssenceType::Avci100_1080i
                | EssenceType::Avci100_1080p
                | EssenceType::Avci100_720p
                | EssenceType::Avci50_1080i
                | EssenceType::Avci50_1080p
                | EssenceType::Avci50_720p
        )
    }

    /// Sample rates in the capability table for this type.
    pub fn supported_sample_rates(&self) -> &'static [Rational] {
        match self {
            EssenceType::IecDv25
            | EssenceType::DvBasedDv25
            | EssenceType::Dv50
            | EssenceType::Dv100_1080i
            | EssenceType::D10_30
            | EssenceType::D10_40
            | EssenceType::D10_50
            | EssenceType::Avci100_1080i
            | EssenceType::Avci100_1080p
            | EssenceType::Avci50_1080i
            | EssenceType::Avci50_1080p
            | EssenceType::Mpeg2lgMpH14 => RATES_50HZ_FAMILY,
            EssenceType::Dv100_720p
            | EssenceType::Avci100_720p
            | EssenceType::Avci50_720p
            | EssenceType::UncSd
            | EssenceType::UncHd1080i
            | EssenceType::UncHd1080p
            | EssenceType::UncHd720p
            | EssenceType::Mpeg2lg422pHl
            | EssenceType::Mpeg2lgMpHl => RATES_ALL_FRAME,
            EssenceType::WavePcm => RATES_PCM,
        }
    }
}

/// Configuration of one essence stream.
#[derive(Debug, Clone)]
pub struct EssenceConfig {
    pub essence_type: EssenceType,
    pub sample_rate: Rational,
    /// Picture aspect ratio.
    pub aspect_ratio: Rational,
    /// Sound channel count.
    pub channel_count: u32,
    /// Sound quantization bits.
    pub quantization_bits: u32,
    /// Sound locked-to-video flag.
    pub locked: bool,
}

impl EssenceConfig {
    /// Create a configuration for a picture essence type.
    pub fn new(essence_type: EssenceType, sample_rate: Rational) -> Self {
        EssenceConfig {
            essence_type,
            sample_rate,
            aspect_ratio: Rational::new(16, 9),
            channel_count: 1,
            quantization_bits: 16,
            locked: true,
        }
    }

    /// Create a 48 kHz PCM configuration.
    pub fn pcm(channel_count: u32, quantization_bits: u32) -> Self {
        EssenceConfig {
            essence_type: EssenceType::WavePcm,
            sample_rate: Rational::SR_48K,
            aspect_ratio: Rational::new(16, 9),
            channel_count,
            quantization_bits,
            locked: true,
        }
    }

    /// Check the configuration against the capability table.
    pub fn validate(&self) -> Result<()> {
        if !self
            .essence_type
            .supported_sample_rates()
            .contains(&self.sample_rate)
        {
            return Err(MxfError::UnsupportedSampleRate {
                essence_type: self.essence_type,
                rate: self.sample_rate,
            });
        }
        if self.essence_type == EssenceType::WavePcm {
            if self.channel_count == 0 {
                return Err(MxfError::InvalidArgument(
                    "PCM channel count must be at least 1".to_string(),
                ));
            }
            if self.quantization_bits == 0 || self.quantization_bits > 32 {
                return Err(MxfError::InvalidArgument(format!(
                    "Unsupported PCM quantization bits {}",
                    self.quantization_bits
                )));
            }
        }
        Ok(())
    }

    /// Bytes of one sample; 0 for VBE essence.
    pub fn sample_size(&self) -> u32 {
        use EssenceType::*;
        let ntsc = self.sample_rate == Rational::FPS_2997 || self.sample_rate == Rational::FPS_5994;
        match self.essence_type {
            IecDv25 | DvBasedDv25 => {
                if ntsc {
                    120_000
                } else {
                    144_000
                }
            }
            Dv50 => {
                if ntsc {
                    240_000
                } else {
                    288_000
                }
            }
            Dv100_1080i | Dv100_720p => {
                let high_rate = self.sample_rate == Rational::FPS_50
                    || self.sample_rate == Rational::FPS_5994;
                match (high_rate, ntsc) {
                    (true, true) => 240_000,
                    (true, false) => 288_000,
                    (false, true) => 480_000,
                    (false, false) => 576_000,
                }
            }
            D10_30 => {
                if ntsc {
                    125_125
                } else {
                    150_000
                }
            }
            D10_40 => {
                if ntsc {
                    166_833
                } else {
                    200_000
                }
            }
            D10_50 => {
                if ntsc {
                    208_541
                } else {
                    250_000
                }
            }
            Avci100_1080i | Avci100_1080p => 568_832,
            Avci100_720p | Avci50_1080i | Avci50_1080p => 284_672,
            Avci50_720p => 142_336,
            UncSd => {
                if ntsc {
                    699_840
                } else {
                    829_440
                }
            }
            UncHd1080i | UncHd1080p => 4_147_200,
            UncHd720p => 1_843_200,
            Mpeg2lg422pHl | Mpeg2lgMpHl | Mpeg2lgMpH14 => 0,
            WavePcm => self.block_align() as u32,
        }
    }

    /// PCM block alignment: channels times rounded-up sample bytes.
    pub fn block_align(&self) -> u16 {
        (self.channel_count * self.quantization_bits.div_ceil(8)) as u16
    }

    /// The essence container label.
    pub fn essence_container_ul(&self, clip_wrapped: bool) -> UL {
        use EssenceType::*;
        match self.essence_type {
            IecDv25 => labels::EC_IEC_DV25_FRAME,
            DvBasedDv25 => labels::EC_DVBASED_DV25_FRAME,
            Dv50 => labels::EC_DV50_FRAME,
            Dv100_1080i | Dv100_720p => labels::EC_DV100_FRAME,
            D10_30 | D10_40 | D10_50 => labels::EC_D10_FRAME,
            Avci100_1080i | Avci100_1080p | Avci100_720p | Avci50_1080i | Avci50_1080p
            | Avci50_720p => labels::EC_AVCI_FRAME,
            UncSd | UncHd1080i | UncHd1080p | UncHd720p => labels::EC_UNC_FRAME,
            Mpeg2lg422pHl | Mpeg2lgMpHl | Mpeg2lgMpH14 => labels::EC_MPEG_ES_FRAME,
            WavePcm => {
                if clip_wrapped {
                    labels::EC_BWF_CLIP
                } else {
                    labels::EC_BWF_FRAME
                }
            }
        }
    }

    /// The essence element key for a 1-based element number.
    pub fn element_key(&self, element_number: u8) -> UL {
        use EssenceType::*;
        let (item_type, element_type) = match self.essence_type {
            IecDv25 | DvBasedDv25 | Dv50 | Dv100_1080i | Dv100_720p => (0x18, 0x01),
            D10_30 | D10_40 | D10_50 => (0x05, 0x01),
            Avci100_1080i | Avci100_1080p | Avci100_720p | Avci50_1080i | Avci50_1080p
            | Avci50_720p => (0x15, 0x10),
            UncSd | UncHd1080i | UncHd1080p | UncHd720p => (0x15, 0x02),
            Mpeg2lg422pHl | Mpeg2lgMpHl | Mpeg2lgMpH14 => (0x15, 0x05),
            WavePcm => (0x16, 0x01),
        };
        essence_element_key(item_type, 0x01, element_type, element_number)
    }

    /// Build the file descriptor for this stream and add it to the arena.
    pub fn build_descriptor(
        &self,
        header_metadata: &mut HeaderMetadata,
        linked_track_id: u32,
        clip_wrapped: bool,
    ) -> SetId {
        let common = FileDescriptorCommon {
            linked_track_id,
            sample_rate: self.sample_rate,
            container_duration: -1,
            essence_container: self.essence_container_ul(clip_wrapped),
        };

        let descriptor = if self.essence_type == EssenceType::WavePcm {
            Descriptor::WaveAudio(WaveAudioDescriptor {
                audio_sampling_rate: self.sample_rate,
                channel_count: self.channel_count,
                quantization_bits: self.quantization_bits,
                locked: self.locked,
                block_align: self.block_align(),
                avg_bps: (self.sample_rate.num as u32 / self.sample_rate.den as u32)
                    * self.block_align() as u32,
                common,
            })
        } else {
            let (stored_width, stored_height) = self.stored_dimensions();
            let cdci = CdciDescriptor {
                common,
                frame_layout: self.frame_layout(),
                stored_width,
                stored_height,
                aspect_ratio: self.aspect_ratio,
                video_line_map: self.video_line_map(),
                component_depth: self.component_depth(),
                horizontal_subsampling: self.horizontal_subsampling(),
                vertical_subsampling: self.vertical_subsampling(),
                picture_essence_coding: self.picture_essence_coding(),
            };
            if self.essence_type.apply_temporal_reordering() {
                Descriptor::MpegVideo(cdci)
            } else {
                Descriptor::Cdci(cdci)
            }
        };

        header_metadata.add(MetadataSet::Descriptor(descriptor))
    }

    fn is_sd(&self) -> bool {
        use EssenceType::*;
        matches!(
            self.essence_type,
            IecDv25 | DvBasedDv25 | Dv50 | D10_30 | D10_40 | D10_50 | UncSd
        )
    }

    fn stored_dimensions(&self) -> (u32, u32) {
        use EssenceType::*;
        let ntsc = self.sample_rate == Rational::FPS_2997 || self.sample_rate == Rational::FPS_5994;
        match self.essence_type {
            Dv100_720p | Avci100_720p | Avci50_720p | UncHd720p => (1280, 720),
            Dv100_1080i | Avci100_1080i | Avci100_1080p | Avci50_1080i | Avci50_1080p
            | UncHd1080i | UncHd1080p | Mpeg2lg422pHl | Mpeg2lgMpHl | Mpeg2lgMpH14 => {
                (1920, 1080)
            }
            WavePcm => (0, 0),
            _ => {
                if ntsc {
                    (720, 480)
                } else {
                    (720, 576)
                }
            }
        }
    }

    fn frame_layout(&self) -> u8 {
        use EssenceType::*;
        match self.essence_type {
            Dv100_720p | Avci100_1080p | Avci100_720p | Avci50_1080p | Avci50_720p
            | UncHd1080p | UncHd720p => 0x00,
            _ => 0x01,
        }
    }

    fn component_depth(&self) -> u32 {
        if self.essence_type.is_avc_intra() {
            10
        } else {
            8
        }
    }

    fn horizontal_subsampling(&self) -> u32 {
        use EssenceType::*;
        match self.essence_type {
            IecDv25 => 2,
            DvBasedDv25 => 4,
            _ => 2,
        }
    }

    fn vertical_subsampling(&self) -> u32 {
        // 4:2:0 for IEC DV25, 4:2:2 and 4:1:1 otherwise
        if self.essence_type == EssenceType::IecDv25 {
            2
        } else {
            1
        }
    }

    fn video_line_map(&self) -> Vec<i32> {
        use EssenceType::*;
        let ntsc = self.sample_rate == Rational::FPS_2997 || self.sample_rate == Rational::FPS_5994;
        match self.essence_type {
            Dv100_720p | Avci100_720p | Avci50_720p | UncHd720p => vec![26, 0],
            WavePcm => Vec::new(),
            _ if self.is_sd() => {
                if ntsc {
                    vec![20, 283]
                } else {
                    vec![23, 336]
                }
            }
            _ => vec![21, 584],
        }
    }

    fn picture_essence_coding(&self) -> UL {
        use EssenceType::*;
        match self.essence_type {
            IecDv25 => labels::CODING_IEC_DV25,
            DvBasedDv25 => labels::CODING_DVBASED_DV25,
            Dv50 => labels::CODING_DV50,
            Dv100_1080i | Dv100_720p => labels::CODING_DV100,
            D10_30 | D10_40 | D10_50 => labels::CODING_D10,
            Avci100_1080i | Avci100_1080p | Avci100_720p | Avci50_1080i | Avci50_1080p
            | Avci50_720p => labels::CODING_AVCI,
            Mpeg2lg422pHl | Mpeg2lgMpHl | Mpeg2lgMpH14 => labels::CODING_MPEG2LG,
            UncSd | UncHd1080i | UncHd1080p | UncHd720p => labels::CODING_UNC,
            WavePcm => labels::CODING_PCM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sample_rate_support() {
        let config = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25);
        assert!(config.validate().is_ok());

        let config = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_50);
        assert!(matches!(
            config.validate(),
            Err(MxfError::UnsupportedSampleRate { .. })
        ));

        let config = EssenceConfig::new(EssenceType::UncHd720p, Rational::FPS_5994);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dv25_sample_size() {
        let config = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25);
        assert_eq!(config.sample_size(), 144_000);

        let config = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_2997);
        assert_eq!(config.sample_size(), 120_000);
    }

    #[test]
    fn test_mpeg2lg_is_vbe() {
        let config = EssenceConfig::new(EssenceType::Mpeg2lg422pHl, Rational::FPS_25);
        assert_eq!(config.sample_size(), 0);
        assert!(!config.essence_type.is_cbe());
        assert!(config.essence_type.apply_temporal_reordering());
    }

    #[test]
    fn test_pcm_block_align() {
        let config = EssenceConfig::pcm(1, 16);
        assert_eq!(config.block_align(), 2);
        assert_eq!(config.sample_size(), 2);

        let config = EssenceConfig::pcm(2, 24);
        assert_eq!(config.block_align(), 6);

        assert!(EssenceConfig::pcm(0, 16).validate().is_err());
    }

    #[test]
    fn test_element_keys() {
        let pcm = EssenceConfig::pcm(1, 16);
        let key = pcm.element_key(1);
        assert_eq!(key[12], 0x16);
        assert_eq!(key[15], 0x01);

        let dv = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25);
        assert_eq!(dv.element_key(1)[12], 0x18);

        let mpeg = EssenceConfig::new(EssenceType::Mpeg2lgMpHl, Rational::FPS_25);
        assert_eq!(mpeg.element_key(2)[14], 0x05);
        assert_eq!(mpeg.element_key(2)[15], 0x02);
    }

    #[test]
    fn test_container_ul_wrapping() {
        let pcm = EssenceConfig::pcm(1, 16);
        assert_ne!(
            pcm.essence_container_ul(true),
            pcm.essence_container_ul(false)
        );

        let dv = EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25);
        assert_eq!(
            dv.essence_container_ul(true),
            dv.essence_container_ul(false)
        );
    }

    #[test]
    fn test_build_pcm_descriptor() {
        let mut hm = HeaderMetadata::new();
        let config = EssenceConfig::pcm(2, 24);
        let id = config.build_descriptor(&mut hm, 2001, true);

        let Some(Descriptor::WaveAudio(descriptor)) = hm.descriptor(id) else {
            panic!("expected a wave audio descriptor");
        };
        assert_eq!(descriptor.channel_count, 2);
        assert_eq!(descriptor.block_align, 6);
        assert_eq!(descriptor.common.container_duration, -1);
        assert_eq!(descriptor.avg_bps, 48_000 * 6);
    }

    #[test]
    fn test_build_picture_descriptor() {
        let mut hm = HeaderMetadata::new();
        let config = EssenceConfig::new(EssenceType::Avci100_1080i, Rational::FPS_25);
        let id = config.build_descriptor(&mut hm, 1001, false);

        let Some(Descriptor::Cdci(descriptor)) = hm.descriptor(id) else {
            panic!("expected a CDCI descriptor");
        };
        assert_eq!(descriptor.stored_width, 1920);
        assert_eq!(descriptor.component_depth, 10);
        assert_eq!(descriptor.frame_layout, 0x01);
    }

    #[test]
    fn test_avc_intra_header_size() {
        assert!(EssenceType::Avci100_1080i.is_avc_intra());
        assert!(!EssenceType::Dv50.is_avc_intra());
        assert_eq!(AVCI_HEADER_SIZE, 512);
    }
}
