use std::path::Path;

use tracing::info;

use crate::assemble::VideoProfile;
use crate::error::Result;
use crate::toolchain::Toolchain;

/// Stream-copies the video, encodes the audio for the profile and stops at
/// whichever input ends first.
pub fn mux_args(video: &Path, audio: &Path, output: &Path, profile: VideoProfile) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
        "-i".to_string(),
        audio.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        "copy".to_string(),
    ];
    args.extend(profile.audio_codec_args().iter().map(|s| s.to_string()));
    args.extend(
        ["-map", "0:v:0", "-map", "1:a:0", "-shortest"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

pub fn mux(
    tools: &Toolchain,
    video: &Path,
    audio: &Path,
    output: &Path,
    profile: VideoProfile,
) -> Result<()> {
    info!(
        "Muxing {} with {} into {}",
        video.display(),
        audio.display(),
        output.display()
    );
    let args = mux_args(video, audio, output, profile);
    tools.run_ffmpeg(&args, "muxing audio")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{FrameEntry, assemble};
    use crate::font::BuiltinGlyphs;
    use crate::frame::{Background, FrameGeometry, compose};
    use crate::glyph::GlyphLayoutEngine;

    #[test]
    fn video_is_copied_and_audio_reencoded() {
        let args = mux_args(
            Path::new("v.mov"),
            Path::new("a.wav"),
            Path::new("o.mov"),
            VideoProfile::AlphaMaster,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy -c:a pcm_s16le"));
        assert!(joined.contains("-map 0:v:0 -map 1:a:0 -shortest"));

        let args = mux_args(
            Path::new("v.mp4"),
            Path::new("a.wav"),
            Path::new("o.mp4"),
            VideoProfile::Standard,
        );
        assert!(args.join(" ").contains("-c:a aac -b:a 192k"));
    }

    fn muxed_duration(video_seconds: f64, audio_seconds: f64) -> Option<f64> {
        let tools = crate::toolchain::available()?;
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("f.png");
        let mut engine = GlyphLayoutEngine::new(Box::new(BuiltinGlyphs), 16);
        compose(
            &engine.layout("あ"),
            FrameGeometry {
                width: 64,
                height: 128,
                card_top: 4,
            },
            Background::Transparent,
        )
        .save_png(&image)
        .unwrap();

        let video = dir.path().join("silent.mov");
        assemble(
            &tools,
            &[FrameEntry {
                image,
                duration: video_seconds,
            }],
            30,
            VideoProfile::AlphaMaster,
            &video,
        )
        .unwrap();
        let audio = dir.path().join("a.wav");
        std::fs::write(&audio, crate::audio::sine_wav(audio_seconds, 24000, 1)).unwrap();

        let out = dir.path().join("out.mov");
        mux(&tools, &video, &audio, &out, VideoProfile::AlphaMaster).unwrap();
        Some(tools.probe_duration(&out).unwrap())
    }

    #[test]
    fn output_is_clamped_to_the_shorter_stream() {
        let tolerance = 1.0 / 30.0 + 0.1;
        let Some(audio_longer) = muxed_duration(2.0, 3.0) else {
            eprintln!("ffmpeg/ffprobe not installed; skipping");
            return;
        };
        assert!((audio_longer - 2.0).abs() <= tolerance, "got {}", audio_longer);
        let video_longer = muxed_duration(3.0, 2.0).unwrap();
        assert!((video_longer - 2.0).abs() <= tolerance, "got {}", video_longer);
    }
}
