//! page-recorder library crate.
//!
//! Records the audio and video of a rendered web page: a virtual display,
//! a browser on it, an ffmpeg capture of both, and an output sink, run as
//! one session with a single coordinated shutdown.

pub mod config;
pub mod display;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod output;
pub mod page;
pub mod panic_hook;
pub mod session;

pub use error::{Error, Result};
