//! Single-pass image-sequence assembly.
//!
//! Every frame image is listed once in a concat manifest with its exact
//! display time and the whole list is encoded in one ffmpeg run. Frame
//! boundaries are only rounded once, by the constant-frame-rate resampler,
//! so the result stays within one frame of the summed durations no matter
//! how many segments there are.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, TelopError};
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProfile {
    /// ProRes 4444, 10-bit 4:4:4 with alpha. Transparent master.
    AlphaMaster,
    /// H.264 yuv420p. Previews and opaque delivery.
    Standard,
}

impl VideoProfile {
    pub fn extension(self) -> &'static str {
        match self {
            VideoProfile::AlphaMaster => "mov",
            VideoProfile::Standard => "mp4",
        }
    }

    pub fn video_codec_args(self) -> &'static [&'static str] {
        match self {
            VideoProfile::AlphaMaster => &[
                "-c:v",
                "prores_ks",
                "-profile:v",
                "4444",
                "-pix_fmt",
                "yuva444p10le",
            ],
            VideoProfile::Standard => &[
                "-c:v",
                "libx264",
                "-tune",
                "stillimage",
                "-pix_fmt",
                "yuv420p",
            ],
        }
    }

    pub fn audio_codec_args(self) -> &'static [&'static str] {
        match self {
            VideoProfile::AlphaMaster => &["-c:a", "pcm_s16le"],
            VideoProfile::Standard => &["-c:a", "aac", "-b:a", "192k"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntry {
    pub image: PathBuf,
    pub duration: f64,
}

/// Manifest body for ffmpeg's concat demuxer. The final image is listed a
/// second time without a duration so the encoder does not drop it at end of stream.
pub fn concat_manifest(entries: &[FrameEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("file '{}'\n", escape_manifest_path(&entry.image)));
        out.push_str(&format!("duration {:.6}\n", entry.duration));
    }
    if let Some(last) = entries.last() {
        out.push_str(&format!("file '{}'\n", escape_manifest_path(&last.image)));
    }
    out
}

fn escape_manifest_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

pub fn total_duration(entries: &[FrameEntry]) -> f64 {
    entries.iter().map(|e| e.duration).sum()
}

/// ffmpeg arguments encoding `manifest` at `fps`, cut to exactly `total` seconds.
pub fn assemble_args(
    manifest: &Path,
    output: &Path,
    fps: u32,
    total: f64,
    profile: VideoProfile,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(manifest.to_string_lossy().into_owned());
    args.extend(["-vsync".to_string(), "cfr".to_string()]);
    args.extend(["-r".to_string(), fps.to_string()]);
    args.extend(["-t".to_string(), format!("{:.6}", total)]);
    args.extend(profile.video_codec_args().iter().map(|s| s.to_string()));
    args.push("-an".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Encodes the frames into one silent video at `output`.
pub fn assemble(
    tools: &Toolchain,
    entries: &[FrameEntry],
    fps: u32,
    profile: VideoProfile,
    output: &Path,
) -> Result<()> {
    if entries.is_empty() {
        return Err(TelopError::input("no frames to assemble"));
    }
    let manifest_path = output.with_extension("concat.txt");
    fs::write(&manifest_path, concat_manifest(entries))?;

    let total = total_duration(entries);
    info!(
        "Assembling {} frames ({:.3}s) into {} [{:?}]",
        entries.len(),
        total,
        output.display(),
        profile
    );
    let args = assemble_args(&manifest_path, output, fps, total, profile);
    tools.run_ffmpeg(&args, "assembling caption video")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Background, FrameGeometry, compose};
    use crate::font::BuiltinGlyphs;
    use crate::glyph::GlyphLayoutEngine;

    fn entries(durations: &[f64]) -> Vec<FrameEntry> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| FrameEntry {
                image: PathBuf::from(format!("/tmp/work/frame_{}.png", i)),
                duration: d,
            })
            .collect()
    }

    #[test]
    fn manifest_lists_durations_and_repeats_last_image() {
        let manifest = concat_manifest(&entries(&[1.2, 2.0]));
        assert_eq!(
            manifest,
            "file '/tmp/work/frame_0.png'\nduration 1.200000\n\
             file '/tmp/work/frame_1.png'\nduration 2.000000\n\
             file '/tmp/work/frame_1.png'\n"
        );
    }

    #[test]
    fn manifest_escapes_quotes() {
        let manifest = concat_manifest(&[FrameEntry {
            image: PathBuf::from("/tmp/it's/f.png"),
            duration: 1.0,
        }]);
        assert!(manifest.starts_with(r"file '/tmp/it'\''s/f.png'"));
    }

    #[test]
    fn args_resample_to_cfr_and_bound_length() {
        let args = assemble_args(
            Path::new("list.txt"),
            Path::new("out.mov"),
            30,
            3.2,
            VideoProfile::AlphaMaster,
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -f concat -safe 0 -i list.txt"));
        assert!(joined.contains("-vsync cfr -r 30 -t 3.200000"));
        assert!(joined.contains("-c:v prores_ks -profile:v 4444 -pix_fmt yuva444p10le"));
        assert!(joined.contains("-an"));
        assert_eq!(args.last().unwrap(), "out.mov");
    }

    #[test]
    fn standard_profile_has_no_alpha() {
        let args = assemble_args(
            Path::new("l.txt"),
            Path::new("o.mp4"),
            30,
            1.0,
            VideoProfile::Standard,
        );
        assert!(args.iter().any(|a| a == "yuv420p"));
        assert!(!args.iter().any(|a| a.contains("yuva")));
    }

    #[test]
    fn empty_frame_list_is_rejected() {
        let tools = Toolchain {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let err = assemble(&tools, &[], 30, VideoProfile::Standard, &dir.path().join("o.mp4"));
        assert!(matches!(err, Err(TelopError::Input(_))));
    }

    fn drift_for(segment_count: usize) -> Option<f64> {
        let tools = crate::toolchain::available()?;
        let dir = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry {
            width: 64,
            height: 128,
            card_top: 4,
        };
        let mut engine = GlyphLayoutEngine::new(Box::new(BuiltinGlyphs), 16);
        let images: Vec<PathBuf> = ["あ", "い", "う"]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let path = dir.path().join(format!("f{}.png", i));
                compose(&engine.layout(text), geometry, Background::Checkerboard)
                    .save_png(&path)
                    .unwrap();
                path
            })
            .collect();

        // Durations deliberately off the 30 fps grid.
        let frames: Vec<FrameEntry> = (0..segment_count)
            .map(|i| FrameEntry {
                image: images[i % images.len()].clone(),
                duration: 0.1 + (i % 7) as f64 * 0.013,
            })
            .collect();
        let expected = total_duration(&frames);
        let out = dir.path().join("out.mov");
        assemble(&tools, &frames, 30, VideoProfile::AlphaMaster, &out).unwrap();
        let actual = tools.probe_duration(&out).unwrap();
        Some((actual - expected).abs())
    }

    #[test]
    fn drift_stays_within_one_frame_regardless_of_segment_count() {
        let frame = 1.0 / 30.0;
        let Some(small) = drift_for(5) else {
            eprintln!("ffmpeg/ffprobe not installed; skipping");
            return;
        };
        let large = drift_for(500).unwrap();
        assert!(small <= frame + 1e-3, "5 segments drifted {}s", small);
        assert!(large <= frame + 1e-3, "500 segments drifted {}s", large);
    }
}
