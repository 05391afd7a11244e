//! Transcoder output parsing.
//!
//! Turns the raw, irregular text a transcoder writes to its output streams
//! into structured data: the declared input duration, running progress
//! lines, error lines, and input stream metadata. One parser instance is
//! owned per task; the only mutable state is the total duration captured
//! from the stream header, which later progress lines are measured against.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Failure keywords scanned for by [`ProgressParser::parse_error`].
/// Matching is case-sensitive.
const ERROR_KEYWORDS: [&str; 4] = ["Error", "Invalid", "failed", "could not"];

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
});

static VIDEO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Video:\s*([A-Za-z0-9_]+)").expect("valid video regex"));

static AUDIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Audio:\s*([A-Za-z0-9_]+)").expect("valid audio regex"));

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2,5}x\d{2,5})\b").expect("valid resolution regex"));

static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*fps").expect("valid fps regex"));

/// The structured result of parsing one progress-bearing output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Encoded frame count.
    pub frame: u64,
    /// Encoding rate in frames per second.
    pub fps: f64,
    /// Bitrate as reported (e.g. "2097.2kbits/s").
    pub bitrate: String,
    /// Output written so far, in kilobytes.
    pub size_kb: u64,
    /// Elapsed media time in seconds.
    pub time_secs: f64,
    /// Encoding speed as a multiple of realtime.
    pub speed: f64,
    /// Percent of the total duration covered, clamped to [0, 100].
    pub percent: f64,
}

/// Input stream metadata, best-effort. Only matched fields are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

impl InputInfo {
    fn is_empty(&self) -> bool {
        self.video_codec.is_none()
            && self.resolution.is_none()
            && self.audio_codec.is_none()
            && self.fps.is_none()
    }
}

/// Per-task output parser.
///
/// `total_duration` is the single piece of mutable state: it is captured
/// once from the input duration declaration and used to turn elapsed media
/// time into a percentage.
#[derive(Debug, Default)]
pub struct ProgressParser {
    total_duration: f64,
}

impl ProgressParser {
    /// Create a new parser with no known duration.
    pub fn new() -> Self {
        Self::default()
    }

    /// The total duration captured so far, in seconds (0 when unknown).
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Parse a `Duration: HH:MM:SS[.frac]` declaration.
    ///
    /// A positive duration is stored for later percent computation and
    /// returned; anything else leaves the parser untouched.
    pub fn parse_duration(&mut self, text: &str) -> Option<f64> {
        let caps = DURATION_RE.captures(text)?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;

        let total = hours * 3600.0 + minutes * 60.0 + seconds;
        if total > 0.0 {
            self.total_duration = total;
            Some(total)
        } else {
            None
        }
    }

    /// Parse a progress line.
    ///
    /// Transcoder progress format:
    /// `frame=X fps=X q=X size=XkB time=HH:MM:SS.ms bitrate=Xkbits/s speed=Xx`
    ///
    /// A `time=` field is required; every other field is optional and falls
    /// back to its default independently. Percent is derived from the stored
    /// total duration and clamped to [0, 100]; without a known duration it
    /// is 0.
    pub fn parse_progress(&self, text: &str) -> Option<ProgressSnapshot> {
        let time_secs = field_token(text, "time=").and_then(parse_clock)?;

        let frame = field_token(text, "frame=")
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(0);
        let fps = field_token(text, "fps=")
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0);
        let bitrate = field_token(text, "bitrate=")
            .unwrap_or("0")
            .to_string();
        let size_kb = field_token(text, "size=")
            .and_then(parse_leading_digits)
            .unwrap_or(0);
        let speed = field_token(text, "speed=")
            .and_then(|t| t.strip_suffix('x').unwrap_or(t).parse::<f64>().ok())
            .unwrap_or(1.0);

        let percent = if self.total_duration > 0.0 {
            (time_secs / self.total_duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Some(ProgressSnapshot {
            frame,
            fps,
            bitrate,
            size_kb,
            time_secs,
            speed,
            percent,
        })
    }

    /// Scan for a failure line.
    ///
    /// Returns the first line containing one of the failure keywords,
    /// trimmed. When the keywords only match across line boundaries the
    /// whole trimmed text is returned instead. `None` when nothing matches.
    pub fn parse_error(text: &str) -> Option<String> {
        for line in text.lines() {
            if ERROR_KEYWORDS.iter().any(|kw| line.contains(kw)) {
                return Some(line.trim().to_string());
            }
        }

        if ERROR_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            return Some(text.trim().to_string());
        }

        None
    }

    /// Best-effort extraction of input stream metadata.
    ///
    /// Every field is matched independently; `None` when nothing matched.
    pub fn parse_input_info(text: &str) -> Option<InputInfo> {
        let info = InputInfo {
            video_codec: VIDEO_RE.captures(text).map(|c| c[1].to_string()),
            resolution: RESOLUTION_RE.captures(text).map(|c| c[1].to_string()),
            audio_codec: AUDIO_RE.captures(text).map(|c| c[1].to_string()),
            fps: FPS_RE.captures(text).and_then(|c| c[1].parse().ok()),
        };

        if info.is_empty() { None } else { Some(info) }
    }
}

/// Parse a clock string in HH:MM:SS[.frac] format to seconds.
pub fn parse_clock(clock: &str) -> Option<f64> {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extract the value token following `key` in a progress line.
///
/// Transcoders pad some values with spaces after the `=` (e.g.
/// `frame=  100`), so leading whitespace is skipped before the token is
/// taken up to the next whitespace.
fn field_token<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = &rest[..end];
    if token.is_empty() { None } else { Some(token) }
}

/// Parse the leading decimal digits of a token (e.g. "1024kB" -> 1024).
fn parse_leading_digits(token: &str) -> Option<u64> {
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    token[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_valid() {
        assert_eq!(parse_clock("00:00:10.50"), Some(10.5));
        assert_eq!(parse_clock("01:30:00.00"), Some(5400.0));
        assert_eq!(parse_clock("00:01:30.50"), Some(90.5));
        assert_eq!(parse_clock("10:00:00.00"), Some(36000.0));
    }

    #[test]
    fn test_parse_clock_invalid() {
        assert_eq!(parse_clock("invalid"), None);
        assert_eq!(parse_clock("00:00"), None);
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("00:00:00:00"), None);
    }

    #[test]
    fn test_parse_duration_stores_total() {
        let mut parser = ProgressParser::new();
        let line = "  Duration: 00:01:00.00, start: 0.000000, bitrate: 850 kb/s";
        assert_eq!(parser.parse_duration(line), Some(60.0));
        assert_eq!(parser.total_duration(), 60.0);
    }

    #[test]
    fn test_parse_duration_fractional() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.parse_duration("Duration: 01:02:03.50"), Some(3723.5));
    }

    #[test]
    fn test_parse_duration_zero_is_ignored() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.parse_duration("Duration: 00:00:00.00"), None);
        assert_eq!(parser.total_duration(), 0.0);
    }

    #[test]
    fn test_parse_duration_absent() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.parse_duration("frame=100 fps=25"), None);
        assert_eq!(parser.parse_duration("Duration: N/A"), None);
    }

    #[test]
    fn test_parse_progress_complete_line() {
        let mut parser = ProgressParser::new();
        parser.parse_duration("Duration: 00:00:08.00");

        let line = "frame=  100 fps=25 q=-1.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s speed=1.00x";
        let p = parser.parse_progress(line).unwrap();
        assert_eq!(p.frame, 100);
        assert_eq!(p.fps, 25.0);
        assert_eq!(p.bitrate, "2097.2kbits/s");
        assert_eq!(p.size_kb, 1024);
        assert_eq!(p.time_secs, 4.0);
        assert_eq!(p.speed, 1.0);
        assert_eq!(p.percent, 50.0);
    }

    #[test]
    fn test_parse_progress_requires_time() {
        let parser = ProgressParser::new();
        assert!(parser.parse_progress("frame=100 fps=25 q=-1.0 size=512kB").is_none());
        assert!(parser.parse_progress("nothing to see here").is_none());
    }

    #[test]
    fn test_parse_progress_defaults() {
        let parser = ProgressParser::new();
        let p = parser.parse_progress("time=00:00:10.00").unwrap();
        assert_eq!(p.frame, 0);
        assert_eq!(p.fps, 0.0);
        assert_eq!(p.bitrate, "0");
        assert_eq!(p.size_kb, 0);
        assert_eq!(p.speed, 1.0);
        assert_eq!(p.percent, 0.0);
    }

    #[test]
    fn test_parse_progress_final_lsize_line() {
        let parser = ProgressParser::new();
        let line = "frame=  240 fps=0.0 q=-1.0 Lsize=    2048kB time=00:00:09.96 bitrate=1684.3kbits/s speed=12.3x";
        let p = parser.parse_progress(line).unwrap();
        assert_eq!(p.size_kb, 2048);
        assert_eq!(p.speed, 12.3);
    }

    #[test]
    fn test_percent_math() {
        let mut parser = ProgressParser::new();
        parser.parse_duration("Duration: 00:01:00.00");
        let p = parser.parse_progress("time=00:00:15.20").unwrap();
        assert_eq!(p.time_secs, 15.2);
        assert!((p.percent - 25.3333).abs() < 0.01);
    }

    #[test]
    fn test_percent_clamps_to_100() {
        let mut parser = ProgressParser::new();
        parser.parse_duration("Duration: 00:00:10.00");
        let p = parser.parse_progress("time=00:00:15.00").unwrap();
        assert_eq!(p.percent, 100.0);
    }

    #[test]
    fn test_percent_without_duration_is_zero() {
        let parser = ProgressParser::new();
        let p = parser.parse_progress("time=00:59:00.00").unwrap();
        assert_eq!(p.percent, 0.0);
    }

    #[test]
    fn test_parse_error_keywords() {
        assert_eq!(
            ProgressParser::parse_error("Error opening input file missing.mp4"),
            Some("Error opening input file missing.mp4".to_string())
        );
        assert_eq!(
            ProgressParser::parse_error("Invalid data found when processing input"),
            Some("Invalid data found when processing input".to_string())
        );
        assert_eq!(
            ProgressParser::parse_error("Conversion failed!"),
            Some("Conversion failed!".to_string())
        );
        assert_eq!(
            ProgressParser::parse_error("could not find codec parameters"),
            Some("could not find codec parameters".to_string())
        );
    }

    #[test]
    fn test_parse_error_is_case_sensitive() {
        assert_eq!(ProgressParser::parse_error("an error occurred"), None);
        assert_eq!(ProgressParser::parse_error("INVALID INPUT"), None);
    }

    #[test]
    fn test_parse_error_returns_first_matching_line() {
        let blob = "frame=10 fps=5\n  Error while decoding stream #0:0  \nframe=11 fps=5";
        assert_eq!(
            ProgressParser::parse_error(blob),
            Some("Error while decoding stream #0:0".to_string())
        );
    }

    #[test]
    fn test_parse_error_no_match() {
        assert_eq!(ProgressParser::parse_error("frame=100 fps=25"), None);
        assert_eq!(ProgressParser::parse_error(""), None);
    }

    #[test]
    fn test_parse_input_info_video_line() {
        let line = "  Stream #0:0: Video: h264 (High), yuv420p, 1920x1080, 25 fps, 25 tbr";
        let info = ProgressParser::parse_input_info(line).unwrap();
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(info.fps, Some(25.0));
        assert_eq!(info.audio_codec, None);
    }

    #[test]
    fn test_parse_input_info_audio_line() {
        let line = "  Stream #0:1: Audio: aac (LC), 48000 Hz, stereo, fltp";
        let info = ProgressParser::parse_input_info(line).unwrap();
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.video_codec, None);
    }

    #[test]
    fn test_parse_input_info_no_match() {
        assert_eq!(ProgressParser::parse_input_info("Press [q] to stop"), None);
        assert_eq!(ProgressParser::parse_input_info(""), None);
    }

    #[test]
    fn test_snapshot_serialization_skips_absent_input_fields() {
        let info = InputInfo {
            video_codec: Some("hevc".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();
        let map = json.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("video_codec"));
    }
}
