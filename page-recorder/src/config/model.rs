//! Resolved, immutable session configuration.
//!
//! A [`SessionConfig`] is produced once by the resolver and then shared by
//! reference (usually behind an `Arc`) with every component. Nothing mutates
//! it after [`SessionConfig::validate`] has accepted it.

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::{Error, Result};

/// Output file used when no output is configured.
pub const DEFAULT_OUTPUT_FILE: &str = "recording.mp4";

/// Local file the encoder writes to before a staged upload.
pub const STAGING_FILE: &str = "staging.mp4";

/// Address the templated room URL is built from.
pub const DEFAULT_TEMPLATE_BASE: &str = "https://recorder.livekit.io/#";

/// Layout used for templated rooms when none is given.
pub const DEFAULT_TEMPLATE_KIND: &str = "gallery";

/// PulseAudio monitor source paired with the virtual display.
pub const DEFAULT_AUDIO_SINK: &str = "grab.monitor";

/// Fully resolved configuration of one recording session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub capture: CaptureSettings,
    pub source: Source,
    pub output: OutputTarget,
    pub encode: EncodeSettings,
    pub display: DisplaySettings,
    pub binaries: BinaryPaths,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Check the invariants every component relies on.
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        positive("capture.width", capture.width)?;
        positive("capture.height", capture.height)?;
        positive("capture.colorDepth", capture.color_depth)?;
        positive("capture.frameRate", capture.frame_rate)?;

        let encode = &self.encode;
        positive("encode.audioBitrate", encode.audio_bitrate)?;
        positive("encode.audioSampleRate", encode.audio_sample_rate)?;
        positive("encode.videoBitrate", encode.video_bitrate)?;
        positive("encode.videoBufferSize", encode.video_buffer_size)?;
        match (encode.output_width, encode.output_height) {
            (Some(w), Some(h)) => {
                positive("encode.outputWidth", w)?;
                positive("encode.outputHeight", h)?;
            }
            (None, None) => {}
            _ => {
                return Err(Error::config(
                    "encode.outputWidth and encode.outputHeight must be set together",
                ));
            }
        }

        match &self.source {
            Source::DirectUrl(url) => {
                url::Url::parse(url)
                    .map_err(|e| Error::config(format!("invalid source url {url:?}: {e}")))?;
            }
            Source::TemplatedRoom(room) => room.validate()?,
        }

        match &self.output {
            OutputTarget::LocalFile(path) if path.as_os_str().is_empty() => {
                return Err(Error::config("output.file must not be empty"));
            }
            OutputTarget::Rtmp(url) => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| Error::config(format!("invalid rtmp url {url:?}: {e}")))?;
                if !matches!(parsed.scheme(), "rtmp" | "rtmps") {
                    return Err(Error::config(format!(
                        "rtmp output must use rtmp:// or rtmps://, got {url:?}"
                    )));
                }
            }
            OutputTarget::StagedUpload(target) => {
                if target.bucket.is_empty() || target.key.is_empty() {
                    return Err(Error::config("output.s3 requires a bucket and a key"));
                }
            }
            OutputTarget::LocalFile(_) => {}
        }

        if self.timeouts.display_ready_secs == 0 {
            return Err(Error::config("timeouts.displayReadySecs must be positive"));
        }

        Ok(())
    }
}

fn positive(field: &str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(Error::config(format!("{field} must be positive")));
    }
    Ok(())
}

/// Geometry and rate of the captured surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    pub frame_rate: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            color_depth: 24,
            frame_rate: 25,
        }
    }
}

/// What the browser should load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    /// Page loaded as-is.
    DirectUrl(String),
    /// Room page composed from a template address.
    TemplatedRoom(TemplatedRoom),
}

/// A room descriptor the page driver turns into a recorder URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatedRoom {
    /// Layout name, appended to the base address.
    pub kind: String,
    /// Websocket URL of the room server, passed to the page.
    pub ws_url: String,
    /// Template address, e.g. `https://recorder.livekit.io/#`.
    pub base: String,
    pub auth: RoomAuth,
}

impl TemplatedRoom {
    fn validate(&self) -> Result<()> {
        if self.kind.is_empty() {
            return Err(Error::config("source.template.kind must not be empty"));
        }
        url::Url::parse(&self.ws_url).map_err(|e| {
            Error::config(format!("invalid template ws url {:?}: {e}", self.ws_url))
        })?;
        url::Url::parse(&self.base).map_err(|e| {
            Error::config(format!("invalid template base {:?}: {e}", self.base))
        })?;
        Ok(())
    }
}

/// How the recorder authenticates to a templated room.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomAuth {
    /// A pre-issued access token.
    Token(#[serde(serialize_with = "redacted")] String),
    /// API credentials used to mint a recorder token for `room_name`.
    #[serde(rename_all = "camelCase")]
    Credentials {
        api_key: String,
        #[serde(serialize_with = "redacted")]
        api_secret: String,
        room_name: String,
    },
}

impl fmt::Debug for RoomAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            Self::Credentials {
                api_key, room_name, ..
            } => f
                .debug_struct("Credentials")
                .field("api_key", api_key)
                .field("api_secret", &"<redacted>")
                .field("room_name", room_name)
                .finish(),
        }
    }
}

/// Where the encoder's output ends up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputTarget {
    LocalFile(PathBuf),
    Rtmp(String),
    /// Encoded to [`STAGING_FILE`], then uploaded after the encoder exits.
    StagedUpload(S3Target),
}

impl OutputTarget {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalFile(_) => "file",
            Self::Rtmp(_) => "rtmp",
            Self::StagedUpload(_) => "s3",
        }
    }
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self::LocalFile(PathBuf::from(DEFAULT_OUTPUT_FILE))
    }
}

/// Object storage destination of a staged upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Target {
    pub bucket: String,
    pub key: String,
    /// Static credentials; the ambient provider chain is used when absent.
    pub credentials: Option<S3Credentials>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
}

#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    pub access_key: String,
    #[serde(serialize_with = "redacted")]
    pub secret: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn redacted<S: Serializer>(_: &String, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str("<redacted>")
}

/// H.264 profile passed to the encoder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum H264Profile {
    Baseline,
    #[default]
    Main,
    High,
}

/// Encoder rate settings. Bitrates are in kbit/s, the sample rate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSettings {
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
    pub video_bitrate: u32,
    pub video_buffer_size: u32,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub profile: H264Profile,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            audio_bitrate: 128,
            audio_sample_rate: 44100,
            video_bitrate: 2976,
            video_buffer_size: 2976 * 2,
            output_width: None,
            output_height: None,
            profile: H264Profile::Main,
        }
    }
}

impl EncodeSettings {
    /// Output scale override, when both dimensions are configured.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_width.zip(self.output_height)
    }
}

/// Virtual display options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Fixed display name such as `:99`; allocated when `None`.
    pub name: Option<String>,
    pub audio_sink: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            name: None,
            audio_sink: DEFAULT_AUDIO_SINK.to_string(),
        }
    }
}

/// Paths of the external programs the recorder drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryPaths {
    pub ffmpeg: String,
    pub xvfb: String,
    /// Chrome/Chromium executable; auto-detected when `None`.
    pub chrome: Option<PathBuf>,
}

impl Default for BinaryPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            xvfb: "Xvfb".to_string(),
            chrome: None,
        }
    }
}

/// Bounded waits around the external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    pub display_ready_secs: u64,
    /// Unbounded when `None`.
    pub navigation_secs: Option<u64>,
    /// Force-kill the encoder this long after the stop request; never when `None`.
    pub encoder_stop_secs: Option<u64>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            display_ready_secs: 10,
            navigation_secs: None,
            encoder_stop_secs: None,
        }
    }
}
