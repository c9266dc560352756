//! The structured JSON override and how it merges over the defaults.
//!
//! Every field is optional. A present field replaces the matching default,
//! an absent one keeps it, so the merge happens per field rather than per
//! section.

use serde::Deserialize;
use std::path::PathBuf;

use super::model::{
    BinaryPaths, DEFAULT_TEMPLATE_BASE, DEFAULT_TEMPLATE_KIND, DisplaySettings, EncodeSettings,
    H264Profile, OutputTarget, RoomAuth, S3Credentials, S3Target, SessionConfig, Source,
    TemplatedRoom, Timeouts,
};
use super::preset::Preset;
use super::{API_KEY_ENV, API_SECRET_ENV, CONFIG_ENV, Environment, ROOM_NAME_ENV, WS_URL_ENV};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverride {
    pub preset: Option<Preset>,
    #[serde(default)]
    pub capture: CaptureOverride,
    #[serde(default)]
    pub source: SourceOverride,
    #[serde(default)]
    pub output: OutputOverride,
    #[serde(default)]
    pub encode: EncodeOverride,
    #[serde(default)]
    pub display: DisplayOverride,
    #[serde(default)]
    pub binaries: BinariesOverride,
    #[serde(default)]
    pub timeouts: TimeoutsOverride,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureOverride {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub color_depth: Option<u32>,
    pub frame_rate: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceOverride {
    pub url: Option<String>,
    pub template: Option<TemplateOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplateOverride {
    pub kind: Option<String>,
    pub ws_url: Option<String>,
    pub base: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputOverride {
    pub file: Option<PathBuf>,
    pub rtmp: Option<String>,
    pub s3: Option<S3Override>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct S3Override {
    pub bucket: String,
    pub key: String,
    pub access_key: Option<String>,
    pub secret: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncodeOverride {
    pub audio_bitrate: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub video_bitrate: Option<u32>,
    pub video_buffer_size: Option<u32>,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub profile: Option<H264Profile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisplayOverride {
    pub name: Option<String>,
    pub audio_sink: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BinariesOverride {
    pub ffmpeg: Option<String>,
    pub xvfb: Option<String>,
    pub chrome: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutsOverride {
    pub display_ready_secs: Option<u64>,
    pub navigation_secs: Option<u64>,
    pub encoder_stop_secs: Option<u64>,
}

impl ConfigOverride {
    /// Parse the structured override.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::config(format!("invalid {CONFIG_ENV}: {e}")))
    }

    /// Merge this override over the built-in defaults.
    ///
    /// `env` supplies credentials a template may leave out.
    pub fn into_config(self, env: &dyn Environment) -> Result<SessionConfig> {
        let (mut capture, base_encode) = match self.preset {
            Some(preset) => (preset.capture(), preset.encode()),
            None => Default::default(),
        };

        let c = self.capture;
        capture.width = c.width.unwrap_or(capture.width);
        capture.height = c.height.unwrap_or(capture.height);
        capture.color_depth = c.color_depth.unwrap_or(capture.color_depth);
        capture.frame_rate = c.frame_rate.unwrap_or(capture.frame_rate);

        let encode = self.encode.merge(base_encode);

        let defaults = DisplaySettings::default();
        let display = DisplaySettings {
            name: self.display.name.filter(|n| !n.is_empty()),
            audio_sink: self.display.audio_sink.unwrap_or(defaults.audio_sink),
        };

        let defaults = BinaryPaths::default();
        let binaries = BinaryPaths {
            ffmpeg: self.binaries.ffmpeg.unwrap_or(defaults.ffmpeg),
            xvfb: self.binaries.xvfb.unwrap_or(defaults.xvfb),
            chrome: self.binaries.chrome.or(defaults.chrome),
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            display_ready_secs: self
                .timeouts
                .display_ready_secs
                .unwrap_or(defaults.display_ready_secs),
            navigation_secs: self.timeouts.navigation_secs.or(defaults.navigation_secs),
            encoder_stop_secs: self.timeouts.encoder_stop_secs.or(defaults.encoder_stop_secs),
        };

        let config = SessionConfig {
            capture,
            source: self.source.resolve(env)?,
            output: self.output.resolve()?,
            encode,
            display,
            binaries,
            timeouts,
        };
        config.validate()?;
        Ok(config)
    }
}

impl EncodeOverride {
    fn merge(self, base: EncodeSettings) -> EncodeSettings {
        let video_bitrate = self.video_bitrate.unwrap_or(base.video_bitrate);
        EncodeSettings {
            audio_bitrate: self.audio_bitrate.unwrap_or(base.audio_bitrate),
            audio_sample_rate: self.audio_sample_rate.unwrap_or(base.audio_sample_rate),
            video_bitrate,
            // Tracks the resolved bitrate unless pinned explicitly.
            video_buffer_size: self
                .video_buffer_size
                .unwrap_or_else(|| video_bitrate.saturating_mul(2)),
            output_width: self.output_width.or(base.output_width),
            output_height: self.output_height.or(base.output_height),
            profile: self.profile.unwrap_or(base.profile),
        }
    }
}

impl SourceOverride {
    fn resolve(self, env: &dyn Environment) -> Result<Source> {
        let url = self.url.filter(|u| !u.is_empty());
        match (url, self.template) {
            (Some(url), None) => Ok(Source::DirectUrl(url)),
            (None, Some(template)) => Ok(Source::TemplatedRoom(template.resolve(env)?)),
            (Some(_), Some(_)) => Err(Error::config(
                "source.url and source.template are mutually exclusive",
            )),
            (None, None) => Err(Error::config(super::NOTHING_TO_RECORD)),
        }
    }
}

impl TemplateOverride {
    fn resolve(self, env: &dyn Environment) -> Result<TemplatedRoom> {
        let ws_url = self
            .ws_url
            .or_else(|| env.var(WS_URL_ENV))
            .ok_or_else(|| Error::config("source.template requires a wsUrl"))?;

        let auth = match self.token.filter(|t| !t.is_empty()) {
            Some(token) => RoomAuth::Token(token),
            None => {
                let api_key = self.api_key.or_else(|| env.var(API_KEY_ENV));
                let api_secret = self.api_secret.or_else(|| env.var(API_SECRET_ENV));
                let room_name = self.room_name.or_else(|| env.var(ROOM_NAME_ENV));
                match (api_key, api_secret, room_name) {
                    (Some(api_key), Some(api_secret), Some(room_name)) => RoomAuth::Credentials {
                        api_key,
                        api_secret,
                        room_name,
                    },
                    _ => {
                        return Err(Error::config(
                            "templated room requires a token, or a room name with api key and secret",
                        ));
                    }
                }
            }
        };

        Ok(TemplatedRoom {
            kind: self
                .kind
                .unwrap_or_else(|| DEFAULT_TEMPLATE_KIND.to_string()),
            ws_url,
            base: self
                .base
                .unwrap_or_else(|| DEFAULT_TEMPLATE_BASE.to_string()),
            auth,
        })
    }
}

impl OutputOverride {
    fn resolve(self) -> Result<OutputTarget> {
        let set = [
            self.file.is_some(),
            self.rtmp.is_some(),
            self.s3.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if set > 1 {
            return Err(Error::config(
                "only one of output.file, output.rtmp and output.s3 may be set",
            ));
        }

        if let Some(file) = self.file {
            return Ok(OutputTarget::LocalFile(file));
        }
        if let Some(rtmp) = self.rtmp {
            return Ok(OutputTarget::Rtmp(rtmp));
        }
        if let Some(s3) = self.s3 {
            let credentials = match (s3.access_key, s3.secret) {
                (Some(access_key), Some(secret)) => Some(S3Credentials { access_key, secret }),
                (None, None) => None,
                _ => {
                    return Err(Error::config(
                        "output.s3 accessKey and secret must be set together",
                    ));
                }
            };
            return Ok(OutputTarget::StagedUpload(S3Target {
                bucket: s3.bucket,
                key: s3.key,
                credentials,
                region: s3.region,
                endpoint: s3.endpoint,
            }));
        }

        Ok(OutputTarget::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{CaptureSettings, DEFAULT_OUTPUT_FILE};
    use std::collections::HashMap;

    fn no_env() -> HashMap<&'static str, &'static str> {
        HashMap::new()
    }

    fn resolve(json: &str) -> Result<SessionConfig> {
        ConfigOverride::from_json(json)?.into_config(&no_env())
    }

    #[test]
    fn present_fields_win_absent_fields_keep_defaults() {
        let config = resolve(
            r#"{
                "capture": {"width": 1280, "frameRate": 30},
                "source": {"url": "https://example.com"},
                "encode": {"audioBitrate": 96, "outputWidth": 640, "outputHeight": 360}
            }"#,
        )
        .unwrap();

        let defaults = CaptureSettings::default();
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.frame_rate, 30);
        assert_eq!(config.capture.height, defaults.height);
        assert_eq!(config.capture.color_depth, defaults.color_depth);

        let defaults = EncodeSettings::default();
        assert_eq!(config.encode.audio_bitrate, 96);
        assert_eq!(config.encode.audio_sample_rate, defaults.audio_sample_rate);
        assert_eq!(config.encode.video_bitrate, defaults.video_bitrate);
        assert_eq!(config.encode.video_buffer_size, defaults.video_buffer_size);
        assert_eq!(config.encode.output_size(), Some((640, 360)));
        assert_eq!(config.encode.profile, H264Profile::Main);
        assert_eq!(config.timeouts, Timeouts::default());
    }

    #[test]
    fn buffer_size_follows_bitrate_unless_pinned() {
        let config =
            resolve(r#"{"source": {"url": "https://x"}, "encode": {"videoBitrate": 4000}}"#)
                .unwrap();
        assert_eq!(config.encode.video_buffer_size, 8000);

        let config = resolve(
            r#"{"source": {"url": "https://x"}, "encode": {"videoBitrate": 4000, "videoBufferSize": 5000}}"#,
        )
        .unwrap();
        assert_eq!(config.encode.video_buffer_size, 5000);
    }

    #[test]
    fn preset_replaces_defaults_but_fields_still_win() {
        let config = resolve(
            r#"{"preset": "HD_60", "capture": {"width": 1000}, "source": {"url": "https://x"}}"#,
        )
        .unwrap();
        assert_eq!(config.capture.width, 1000);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.frame_rate, 60);
        assert_eq!(config.encode.video_bitrate, 4500);
    }

    #[test]
    fn missing_output_defaults_to_local_file() {
        let config = resolve(r#"{"source": {"url": "https://x"}}"#).unwrap();
        assert_eq!(
            config.output,
            OutputTarget::LocalFile(PathBuf::from(DEFAULT_OUTPUT_FILE))
        );
    }

    #[test]
    fn two_outputs_are_contradictory() {
        let err = resolve(
            r#"{"source": {"url": "https://x"}, "output": {"file": "a.mp4", "rtmp": "rtmp://h/a"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn override_without_source_has_nothing_to_record() {
        let err = resolve(r#"{"output": {"file": "a.mp4"}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn url_and_template_are_contradictory() {
        let err = resolve(
            r#"{"source": {"url": "https://x", "template": {"wsUrl": "wss://h", "token": "t"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn template_with_token_needs_no_credentials() {
        let config =
            resolve(r#"{"source": {"template": {"kind": "speaker", "wsUrl": "wss://h", "token": "abc"}}}"#)
                .unwrap();
        let Source::TemplatedRoom(room) = config.source else {
            panic!("expected templated room");
        };
        assert_eq!(room.kind, "speaker");
        assert_eq!(room.base, DEFAULT_TEMPLATE_BASE);
        assert_eq!(room.auth, RoomAuth::Token("abc".to_string()));
    }

    #[test]
    fn template_credentials_fall_back_to_environment() {
        let env: HashMap<&str, &str> = [
            (API_KEY_ENV, "key"),
            (API_SECRET_ENV, "secret"),
            (ROOM_NAME_ENV, "room"),
        ]
        .into_iter()
        .collect();
        let config = ConfigOverride::from_json(r#"{"source": {"template": {"wsUrl": "wss://h"}}}"#)
            .unwrap()
            .into_config(&env)
            .unwrap();
        let Source::TemplatedRoom(room) = config.source else {
            panic!("expected templated room");
        };
        assert_eq!(room.kind, DEFAULT_TEMPLATE_KIND);
        assert!(matches!(room.auth, RoomAuth::Credentials { ref room_name, .. } if room_name == "room"));
    }

    #[test]
    fn template_without_token_or_credentials_fails() {
        let err = resolve(
            r#"{"source": {"template": {"wsUrl": "wss://h", "apiKey": "k", "roomName": "r"}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn s3_credentials_are_optional_but_paired() {
        let config = resolve(
            r#"{"source": {"url": "https://x"}, "output": {"s3": {"bucket": "b", "key": "k"}}}"#,
        )
        .unwrap();
        let OutputTarget::StagedUpload(target) = config.output else {
            panic!("expected staged upload");
        };
        assert_eq!(target.bucket, "b");
        assert!(target.credentials.is_none());

        assert!(resolve(
            r#"{"source": {"url": "https://x"}, "output": {"s3": {"bucket": "b", "key": "k", "accessKey": "id"}}}"#,
        )
        .is_err());
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(resolve(r#"{"source": {"url": "https://x"}, "capture": {"width": 0}}"#).is_err());
        assert!(resolve(r#"{"source": {"url": "https://x"}, "encode": {"videoBitrate": 0}}"#).is_err());
    }

    #[test]
    fn unknown_fields_and_bad_json_are_config_errors() {
        assert!(matches!(
            ConfigOverride::from_json(r#"{"sauce": {}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConfigOverride::from_json("{not json"),
            Err(Error::Config(_))
        ));
    }
}
