use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, TelopError};

const WELL_KNOWN_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/snap/bin", "/opt/homebrew/bin"];

static DURATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d+):(\d+)\.(\d+)").expect("duration pattern is valid")
});

/// Resolved media tool locations. Built once at startup and passed around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: Option<PathBuf>,
}

impl Toolchain {
    pub fn detect() -> Self {
        let ffmpeg = find_binary("ffmpeg").unwrap_or_else(|| {
            warn!("ffmpeg not found on PATH or in well-known locations; relying on bare name");
            PathBuf::from("ffmpeg")
        });
        let ffprobe = find_binary("ffprobe").or_else(|| {
            let sibling = ffmpeg.parent()?.join(exe_name("ffprobe"));
            sibling.is_file().then_some(sibling)
        });
        if ffprobe.is_none() {
            warn!("ffprobe not found; durations will be read from ffmpeg diagnostics");
        }
        info!(
            "Media tools: ffmpeg={} ffprobe={}",
            ffmpeg.display(),
            ffprobe
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Self { ffmpeg, ffprobe }
    }

    /// Runs ffmpeg to completion. A non-zero exit is reported with its stderr.
    pub fn run_ffmpeg<S: AsRef<OsStr>>(&self, args: &[S], action: &str) -> Result<()> {
        debug!(
            "ffmpeg {}",
            args.iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .map_err(|e| TelopError::toolchain("ffmpeg", action, e.to_string()))?;
        if !output.status.success() {
            return Err(TelopError::toolchain(
                "ffmpeg",
                action,
                format!(
                    "exit status {:?}: {}",
                    output.status.code(),
                    tail(&String::from_utf8_lossy(&output.stderr))
                ),
            ));
        }
        Ok(())
    }

    /// Container duration in seconds, from ffprobe when present, otherwise
    /// from the `Duration:` line ffmpeg prints for its input.
    pub fn probe_duration(&self, path: &Path) -> Result<f64> {
        let action = format!("probing duration of {}", path.display());
        match &self.ffprobe {
            Some(ffprobe) => {
                let output = Command::new(ffprobe)
                    .args([
                        "-v",
                        "error",
                        "-show_entries",
                        "format=duration",
                        "-of",
                        "default=noprint_wrappers=1:nokey=1",
                    ])
                    .arg(path)
                    .output()
                    .map_err(|e| TelopError::toolchain("ffprobe", &action, e.to_string()))?;
                if !output.status.success() {
                    return Err(TelopError::toolchain(
                        "ffprobe",
                        &action,
                        tail(&String::from_utf8_lossy(&output.stderr)),
                    ));
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                stdout.trim().parse::<f64>().map_err(|_| {
                    TelopError::toolchain(
                        "ffprobe",
                        &action,
                        format!("unparseable duration {:?}", stdout.trim()),
                    )
                })
            }
            None => {
                let output = Command::new(&self.ffmpeg)
                    .arg("-i")
                    .arg(path)
                    .args(["-f", "null", "-"])
                    .output()
                    .map_err(|e| TelopError::toolchain("ffmpeg", &action, e.to_string()))?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                parse_duration_line(&stderr).ok_or_else(|| {
                    TelopError::toolchain("ffmpeg", &action, tail(&stderr))
                })
            }
        }
    }
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn find_binary(name: &str) -> Option<PathBuf> {
    if let Ok(path) = which::which(name) {
        return Some(path);
    }
    WELL_KNOWN_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.is_file())
}

pub(crate) fn parse_duration_line(diagnostics: &str) -> Option<f64> {
    let caps = DURATION_LINE.captures(diagnostics)?;
    let h: f64 = caps[1].parse().ok()?;
    let m: f64 = caps[2].parse().ok()?;
    let s: f64 = caps[3].parse().ok()?;
    let frac = &caps[4];
    let fraction: f64 = frac.parse::<f64>().ok()? / 10f64.powi(frac.len() as i32);
    Some(h * 3600.0 + m * 60.0 + s + fraction)
}

/// The last few lines of a tool's stderr, which is where ffmpeg puts the reason.
fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(8);
    lines[start..].join("\n")
}

#[cfg(test)]
pub(crate) fn available() -> Option<Toolchain> {
    let ffmpeg = which::which("ffmpeg").ok()?;
    let ffprobe = which::which("ffprobe").ok()?;
    Some(Toolchain {
        ffmpeg,
        ffprobe: Some(ffprobe),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffmpeg_duration_line() {
        let stderr = "Input #0, wav, from 'a.wav':\n  Duration: 00:01:02.50, bitrate: 768 kb/s\n";
        assert_eq!(parse_duration_line(stderr), Some(62.5));
        assert_eq!(parse_duration_line("Duration: 01:00:00.125"), Some(3600.125));
        assert_eq!(parse_duration_line("Duration: N/A"), None);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text: String = (0..20).map(|i| format!("line {}\n", i)).collect();
        let t = tail(&text);
        assert!(t.starts_with("line 12"));
        assert!(t.ends_with("line 19"));
    }

    #[test]
    fn missing_binary_is_a_toolchain_error() {
        let tools = Toolchain {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: None,
        };
        let err = tools.run_ffmpeg(&["-version"], "checking version").unwrap_err();
        assert!(matches!(err, TelopError::Toolchain { .. }));
    }

    #[test]
    fn measures_wav_duration() {
        let Some(tools) = available() else {
            eprintln!("ffmpeg/ffprobe not installed; skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, crate::audio::sine_wav(1.5, 24000, 1)).unwrap();
        assert!((tools.probe_duration(&path).unwrap() - 1.5).abs() < 0.01);

        let without_ffprobe = Toolchain {
            ffprobe: None,
            ..tools
        };
        assert!((without_ffprobe.probe_duration(&path).unwrap() - 1.5).abs() < 0.01);
    }
}
