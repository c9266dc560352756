//! Encoder command line construction.

use crate::config::{OutputTarget, STAGING_FILE, SessionConfig};
use crate::display::DisplayHandle;

/// Build the ffmpeg argument vector for one session.
///
/// Blocks are emitted in a fixed order: input flags, audio source, video
/// source, encoding, then exactly one output block chosen by the target.
pub fn build_encoder_args(config: &SessionConfig, display: &DisplayHandle) -> Vec<String> {
    let capture = &config.capture;
    let encode = &config.encode;
    let mut args: Vec<String> = Vec::with_capacity(64);

    // Low-latency input handling
    push(&mut args, &["-fflags", "nobuffer+igndts", "-y"]);

    // Audio: the display's paired pulse monitor
    push(
        &mut args,
        &["-thread_queue_size", "1024", "-ac", "2", "-f", "pulse", "-i"],
    );
    args.push(display.audio_sink.clone());

    // Video: the virtual framebuffer
    push(
        &mut args,
        &[
            "-draw_mouse",
            "0",
            "-thread_queue_size",
            "1024",
            "-probesize",
            "42M",
            "-s",
        ],
    );
    args.push(format!("{}x{}", capture.width, capture.height));
    args.push("-r".to_string());
    args.push(capture.frame_rate.to_string());
    push(&mut args, &["-f", "x11grab", "-i"]);
    args.push(display.screen());

    // Encoding
    push(&mut args, &["-c:a", "aac", "-b:a"]);
    args.push(format!("{}k", encode.audio_bitrate));
    args.push("-ar".to_string());
    args.push(encode.audio_sample_rate.to_string());
    push(
        &mut args,
        &[
            "-ac",
            "2",
            "-af",
            "aresample=async=1",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-tune",
            "zerolatency",
            "-profile:v",
        ],
    );
    args.push(encode.profile.to_string());
    args.push("-b:v".to_string());
    args.push(format!("{}k", encode.video_bitrate));
    if let Some((width, height)) = encode.output_size() {
        args.push("-s".to_string());
        args.push(format!("{width}x{height}"));
    }

    match &config.output {
        OutputTarget::LocalFile(path) => args.push(path.to_string_lossy().into_owned()),
        OutputTarget::Rtmp(url) => {
            args.push("-maxrate".to_string());
            args.push(format!("{}k", encode.video_bitrate));
            args.push("-bufsize".to_string());
            args.push(format!("{}k", encode.video_buffer_size));
            push(&mut args, &["-f", "flv"]);
            args.push(url.clone());
        }
        OutputTarget::StagedUpload(_) => args.push(STAGING_FILE.to_string()),
    }

    args
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{H264Profile, S3Target, Source};
    use std::path::PathBuf;

    fn config(output: OutputTarget) -> SessionConfig {
        SessionConfig {
            capture: Default::default(),
            source: Source::DirectUrl("https://x/room".to_string()),
            output,
            encode: Default::default(),
            display: Default::default(),
            binaries: Default::default(),
            timeouts: Default::default(),
        }
    }

    fn display() -> DisplayHandle {
        DisplayHandle {
            name: ":99".to_string(),
            audio_sink: "grab.monitor".to_string(),
            width: 1920,
            height: 1080,
        }
    }

    fn position(args: &[String], window: &[&str]) -> usize {
        args.windows(window.len())
            .position(|w| w.iter().zip(window).all(|(a, b)| a == b))
            .unwrap_or_else(|| panic!("{window:?} not found in {args:?}"))
    }

    #[test]
    fn local_file_is_last_token() {
        let args = build_encoder_args(
            &config(OutputTarget::LocalFile(PathBuf::from("/tmp/out.mp4"))),
            &display(),
        );
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        assert!(!args.iter().any(|a| a == "flv"));
        assert!(!args.iter().any(|a| a == "-maxrate"));
    }

    #[test]
    fn blocks_are_in_fixed_order() {
        let args = build_encoder_args(&config(OutputTarget::default()), &display());

        assert_eq!(&args[..3], &["-fflags", "nobuffer+igndts", "-y"]);
        assert_eq!(args.iter().filter(|a| *a == "-fflags").count(), 1);
        let audio = position(&args, &["-f", "pulse", "-i", "grab.monitor"]);
        let video = position(&args, &["-f", "x11grab", "-i", ":99.0"]);
        let audio_codec = position(&args, &["-c:a", "aac"]);
        let video_codec = position(&args, &["-c:v", "libx264"]);

        assert!(audio < video);
        assert!(video < audio_codec);
        assert!(audio_codec < video_codec);
        assert_eq!(args.last().map(String::as_str), Some("recording.mp4"));
    }

    #[test]
    fn video_source_uses_capture_geometry() {
        let args = build_encoder_args(&config(OutputTarget::default()), &display());
        let size = position(&args, &["-s", "1920x1080", "-r", "25"]);
        assert!(size > position(&args, &["-draw_mouse", "0"]));
        assert!(args.contains(&"42M".to_string()));
    }

    #[test]
    fn encoding_block_reflects_settings() {
        let mut cfg = config(OutputTarget::default());
        cfg.encode.audio_bitrate = 96;
        cfg.encode.audio_sample_rate = 48000;
        cfg.encode.video_bitrate = 4500;
        cfg.encode.profile = H264Profile::High;
        let args = build_encoder_args(&cfg, &display());

        position(&args, &["-b:a", "96k", "-ar", "48000"]);
        position(&args, &["-af", "aresample=async=1"]);
        position(&args, &["-tune", "zerolatency", "-profile:v", "high", "-b:v", "4500k"]);
    }

    #[test]
    fn output_scale_is_optional() {
        let mut cfg = config(OutputTarget::default());
        let args = build_encoder_args(&cfg, &display());
        assert_eq!(args.iter().filter(|a| *a == "-s").count(), 1);

        cfg.encode.output_width = Some(1280);
        cfg.encode.output_height = Some(720);
        let args = build_encoder_args(&cfg, &display());
        let scale = position(&args, &["-s", "1280x720"]);
        assert!(scale > position(&args, &["-c:v", "libx264"]));
    }

    #[test]
    fn rtmp_gets_rate_ceiling_and_flv() {
        let mut cfg = config(OutputTarget::Rtmp("rtmp://host/app/key".to_string()));
        cfg.encode.video_bitrate = 3000;
        cfg.encode.video_buffer_size = 6000;
        let args = build_encoder_args(&cfg, &display());

        let n = args.len();
        assert_eq!(&args[n - 3..], &["-f", "flv", "rtmp://host/app/key"]);
        position(&args, &["-maxrate", "3000k", "-bufsize", "6000k"]);
    }

    #[test]
    fn staged_upload_encodes_to_staging_file() {
        let cfg = config(OutputTarget::StagedUpload(S3Target {
            bucket: "b".to_string(),
            key: "k".to_string(),
            credentials: None,
            region: None,
            endpoint: None,
        }));
        let args = build_encoder_args(&cfg, &display());
        assert_eq!(args.last().map(String::as_str), Some(STAGING_FILE));
        assert!(!args.iter().any(|a| a == "b" || a == "k"));
    }

    #[test]
    fn same_input_gives_same_args() {
        let cfg = config(OutputTarget::default());
        assert_eq!(
            build_encoder_args(&cfg, &display()),
            build_encoder_args(&cfg, &display())
        );
    }
}
