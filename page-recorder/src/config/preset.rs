//! Named capture/encode presets.

use serde::Deserialize;

use super::model::{CaptureSettings, EncodeSettings};

/// Resolution and rate bundles selectable with `"preset"` in the override.
///
/// A preset replaces the built-in capture and encode defaults; individual
/// fields in the override still win over the preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Preset {
    #[serde(rename = "HD_30")]
    #[strum(serialize = "HD_30")]
    Hd30,
    #[serde(rename = "HD_60")]
    #[strum(serialize = "HD_60")]
    Hd60,
    #[serde(rename = "FULL_HD_30")]
    #[strum(serialize = "FULL_HD_30")]
    FullHd30,
    #[serde(rename = "FULL_HD_60")]
    #[strum(serialize = "FULL_HD_60")]
    FullHd60,
}

impl Preset {
    /// Capture geometry of the preset.
    pub fn capture(self) -> CaptureSettings {
        let (width, height, frame_rate) = match self {
            Self::Hd30 => (1280, 720, 30),
            Self::Hd60 => (1280, 720, 60),
            Self::FullHd30 => (1920, 1080, 30),
            Self::FullHd60 => (1920, 1080, 60),
        };
        CaptureSettings {
            width,
            height,
            color_depth: 24,
            frame_rate,
        }
    }

    /// Encode settings of the preset.
    pub fn encode(self) -> EncodeSettings {
        let video_bitrate = match self {
            Self::Hd30 => 3000,
            Self::Hd60 | Self::FullHd30 => 4500,
            Self::FullHd60 => 6000,
        };
        EncodeSettings {
            audio_bitrate: 128,
            audio_sample_rate: 44100,
            video_bitrate,
            video_buffer_size: video_bitrate * 2,
            ..EncodeSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_names() {
        let preset: Preset = serde_json::from_str(r#""FULL_HD_60""#).unwrap();
        assert_eq!(preset, Preset::FullHd60);
        assert_eq!(preset.to_string(), "FULL_HD_60");
        assert!(serde_json::from_str::<Preset>(r#""4K""#).is_err());
    }

    #[test]
    fn hd_presets_scale_bitrate_with_frame_rate() {
        assert_eq!(Preset::Hd30.capture().width, 1280);
        assert_eq!(Preset::Hd60.capture().frame_rate, 60);
        assert!(Preset::Hd60.encode().video_bitrate > Preset::Hd30.encode().video_bitrate);
        assert_eq!(Preset::FullHd60.encode().video_buffer_size, 12000);
    }
}
