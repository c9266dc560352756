//! Session configuration: defaults, the structured override and resolution
//! from the process environment.

mod model;
mod overrides;
mod preset;
mod resolver;

pub use model::{
    BinaryPaths, CaptureSettings, DEFAULT_AUDIO_SINK, DEFAULT_OUTPUT_FILE, DEFAULT_TEMPLATE_BASE,
    DEFAULT_TEMPLATE_KIND, DisplaySettings, EncodeSettings, H264Profile, OutputTarget, RoomAuth,
    S3Credentials, S3Target, STAGING_FILE, SessionConfig, Source, TemplatedRoom, Timeouts,
};
pub use overrides::ConfigOverride;
pub use preset::Preset;
pub use resolver::resolve;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Structured JSON override.
pub const CONFIG_ENV: &str = "RECORDER_CONFIG";
/// Bare page URL.
pub const URL_ENV: &str = "RECORDER_URL";
/// Websocket URL of a templated room.
pub const WS_URL_ENV: &str = "RECORDER_WS_URL";
pub const API_KEY_ENV: &str = "RECORDER_API_KEY";
pub const API_SECRET_ENV: &str = "RECORDER_API_SECRET";
pub const ROOM_NAME_ENV: &str = "RECORDER_ROOM_NAME";
/// Template layout, e.g. `gallery` or `speaker`.
pub const TEMPLATE_ENV: &str = "RECORDER_TEMPLATE";
pub const TEMPLATE_BASE_ENV: &str = "RECORDER_TEMPLATE_BASE";

pub(crate) const NOTHING_TO_RECORD: &str = "nothing to record: set RECORDER_CONFIG, RECORDER_URL, \
     or RECORDER_WS_URL with RECORDER_ROOM_NAME, RECORDER_API_KEY and RECORDER_API_SECRET";

/// Read-only view of configuration variables.
///
/// Empty values are reported as unset.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl<K, V> Environment for HashMap<K, V>
where
    K: Borrow<str> + Eq + Hash,
    V: AsRef<str>,
{
    fn var(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.as_ref().to_string())
            .filter(|v| !v.is_empty())
    }
}
