//! FFmpeg/FFprobe shared utilities.
//!
//! Holds the ffprobe JSON model and parsing helpers, the normalized
//! transcoding profiles, and the one async `probe_media` call every prober
//! adapter goes through.

use std::path::Path;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

/// The subset of probe output the pipelines persist or compute with.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub width: i32,
    pub height: i32,
    pub duration_secs: f64,
    pub video_codec: String,
    pub audio_codec: Option<String>,
    pub frame_rate: f64,
    pub total_frames: i64,
    /// Extension of the probed file including the dot, e.g. `".mkv"`.
    pub file_extension: String,
}

impl MediaMetadata {
    /// Collect metadata from a parsed probe of the file at `path`.
    ///
    /// Fails when the probe has no video stream or the stream carries no
    /// dimensions.
    pub fn from_probe(probe: &FfprobeOutput, path: &Path) -> Result<Self, FfmpegError> {
        let stream = first_stream(probe, "video").ok_or_else(|| {
            FfmpegError::ParseError(format!("no video stream in {}", path.display()))
        })?;
        let (Some(width), Some(height)) = (stream.width, stream.height) else {
            return Err(FfmpegError::ParseError(format!(
                "video stream of {} has no dimensions",
                path.display()
            )));
        };
        Ok(Self {
            width,
            height,
            duration_secs: parse_duration(probe),
            video_codec: parse_video_codec(probe),
            audio_codec: parse_audio_codec(probe),
            frame_rate: parse_framerate(probe),
            total_frames: parse_total_frames(probe),
            file_extension: crate::naming::file_extension(&path.to_string_lossy()),
        })
    }
}

// ---------------------------------------------------------------------------
// Transcoding profiles
// ---------------------------------------------------------------------------

/// Audio half of a [`TranscodeProfile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioProfile {
    pub codec: &'static str,
    pub bitrate: &'static str,
}

/// Fixed output profile handed to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub video_codec: &'static str,
    pub video_profile: &'static str,
    pub pixel_format: &'static str,
    /// `None` drops audio entirely.
    pub audio: Option<AudioProfile>,
    pub faststart: bool,
    /// Output container extension including the dot.
    pub extension: &'static str,
}

impl TranscodeProfile {
    /// Browser-friendly MP4: H.264 high/yuv420p with AAC audio.
    pub fn web_mp4() -> Self {
        Self {
            video_codec: "libx264",
            video_profile: "high",
            pixel_format: "yuv420p",
            audio: Some(AudioProfile {
                codec: "aac",
                bitrate: "128k",
            }),
            faststart: true,
            extension: ".mp4",
        }
    }

    /// H.264 re-encode of a silent annotated video.
    pub fn annotated_mp4() -> Self {
        Self {
            audio: None,
            faststart: false,
            ..Self::web_mp4()
        }
    }

    /// Encoder arguments placed between `-i <src>` and the output path.
    pub fn output_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-profile:v".to_string(),
            self.video_profile.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.to_string(),
        ];
        match &self.audio {
            Some(audio) => args.extend([
                "-c:a".to_string(),
                audio.codec.to_string(),
                "-b:a".to_string(),
                audio.bitrate.to_string(),
            ]),
            None => args.push("-an".to_string()),
        }
        if self.faststart {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe_media(ffprobe: &Path, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn first_stream<'a>(probe: &'a FfprobeOutput, codec_type: &str) -> Option<&'a FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(codec_type))
}

/// Parse the media duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Try format-level duration first.
    if let Some(secs) = probe.format.duration.as_deref().and_then(|d| d.parse::<f64>().ok()) {
        return secs;
    }
    // Fall back to the first video stream's duration.
    first_stream(probe, "video")
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse the video framerate from ffprobe output.
///
/// The `r_frame_rate` field is a fraction like `"30/1"` or `"24000/1001"`.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_stream(probe, "video")
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let num = num.parse::<f64>().unwrap_or(0.0);
        let den = den.parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Count total frames, estimating from duration * framerate when the
/// container does not report `nb_frames`.
pub fn parse_total_frames(probe: &FfprobeOutput) -> i64 {
    if let Some(n) = first_stream(probe, "video")
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|nb| nb.parse::<i64>().ok())
    {
        return n;
    }
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

/// Find the first video stream's codec name.
pub fn parse_video_codec(probe: &FfprobeOutput) -> String {
    first_stream(probe, "video")
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_default()
}

/// Find the first audio stream's codec name, if there is an audio stream.
pub fn parse_audio_codec(probe: &FfprobeOutput) -> Option<String> {
    first_stream(probe, "audio").and_then(|s| s.codec_name.clone())
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_stream(probe, "video")
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(codec: &str) -> FfprobeStream {
        FfprobeStream {
            index: 0,
            codec_name: Some(codec.into()),
            codec_type: Some("video".into()),
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: Some("30/1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_fraction_standard() {
        assert!((parse_fraction("30/1") - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_fraction_ntsc() {
        let fps = parse_fraction("24000/1001");
        assert!((fps - 23.976).abs() < 0.01);
    }

    #[test]
    fn test_parse_fraction_zero_denominator() {
        assert!((parse_fraction("30/0") - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_prefers_format() {
        let probe = FfprobeOutput {
            streams: vec![FfprobeStream {
                duration: Some("9.0".into()),
                ..video_stream("h264")
            }],
            format: FfprobeFormat {
                duration: Some("10.0".into()),
                format_name: None,
            },
        };
        assert!((parse_duration(&probe) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_from_stream() {
        let probe = FfprobeOutput {
            streams: vec![FfprobeStream {
                duration: Some("60.0".into()),
                ..video_stream("h264")
            }],
            format: FfprobeFormat::default(),
        };
        assert!((parse_duration(&probe) - 60.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_total_frames_estimated() {
        let probe = FfprobeOutput {
            streams: vec![video_stream("h264")],
            format: FfprobeFormat {
                duration: Some("10.0".into()),
                format_name: None,
            },
        };
        assert_eq!(parse_total_frames(&probe), 300);
    }

    #[test]
    fn test_parse_total_frames_from_nb_frames() {
        let probe = FfprobeOutput {
            streams: vec![FfprobeStream {
                nb_frames: Some("250".into()),
                ..video_stream("h264")
            }],
            format: FfprobeFormat {
                duration: Some("10.0".into()),
                format_name: None,
            },
        };
        assert_eq!(parse_total_frames(&probe), 250);
    }

    #[test]
    fn test_metadata_from_probe_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "mpeg4",
                 "width": 640, "height": 360, "r_frame_rate": "25/1"},
                {"index": 1, "codec_type": "audio", "codec_name": "mp3"}
            ],
            "format": {"duration": "10.000000", "format_name": "avi"}
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let meta = MediaMetadata::from_probe(&probe, Path::new("/tmp/abc.avi")).unwrap();
        assert_eq!((meta.width, meta.height), (640, 360));
        assert_eq!(meta.video_codec, "mpeg4");
        assert_eq!(meta.audio_codec.as_deref(), Some("mp3"));
        assert_eq!(meta.total_frames, 250);
        assert_eq!(meta.file_extension, ".avi");
        assert!((meta.duration_secs - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_metadata_requires_video_stream() {
        let json = r#"{
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "aac"}],
            "format": {"duration": "10.0"}
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let err = MediaMetadata::from_probe(&probe, Path::new("/tmp/song.m4a")).unwrap_err();
        assert!(matches!(err, FfmpegError::ParseError(_)));
    }

    #[test]
    fn test_metadata_requires_dimensions() {
        let json = r#"{
            "streams": [{"index": 0, "codec_type": "video", "codec_name": "h264"}],
            "format": {"duration": "3.0"}
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let err = MediaMetadata::from_probe(&probe, Path::new("/tmp/broken.mp4")).unwrap_err();
        assert!(matches!(err, FfmpegError::ParseError(_)));
    }

    #[test]
    fn test_web_profile_args() {
        let args = TranscodeProfile::web_mp4().output_args();
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-c:v libx264 -profile:v high -pix_fmt yuv420p -c:a aac -b:a 128k -movflags +faststart"
        );
    }

    #[test]
    fn test_annotated_profile_drops_audio() {
        let profile = TranscodeProfile::annotated_mp4();
        assert!(profile.audio.is_none());
        assert_eq!(profile.extension, ".mp4");
        assert!(profile.output_args().contains(&"-an".to_string()));
    }
}
