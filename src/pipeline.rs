use std::fs;
use std::path::{Path, PathBuf};

use image::Rgb;
use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::assemble::{FrameEntry, VideoProfile, assemble};
use crate::audio::{concat_wav, wav_bytes_duration_seconds};
use crate::error::{Result, TelopError, TimingWarning};
use crate::font::GlyphSource;
use crate::frame::{Background, FrameGeometry, compose};
use crate::glyph::GlyphLayoutEngine;
use crate::mux::mux;
use crate::text::{
    SEGMENT_DISPLAY_PUNCTUATION, display_form, pair_sources, split_script, strip_punctuation,
};
use crate::timeline::{TimedSegment, align_words_to_lines, display_durations, sequential_segments};
use crate::toolchain::Toolchain;
use crate::transcribe::Word;
use crate::tts::{SpeechSynthesizer, VoiceSettings};

/// Called after each rendered line with (completed, total, message).
pub type Progress<'a> = Option<&'a dyn Fn(usize, usize, &str)>;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub font_size: u32,
    pub card_top: u32,
    /// Alpha master plus checkerboard preview when set, a single opaque video otherwise.
    pub transparent: bool,
    pub background_color: Rgb<u8>,
    pub scratch_root: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            font_size: 100,
            card_top: 288,
            transparent: true,
            background_color: Rgb([0, 255, 0]),
            scratch_root: None,
        }
    }
}

impl RenderSettings {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.width,
            height: self.height,
            card_top: self.card_top,
        }
    }

    pub fn master_background(&self) -> Background {
        if self.transparent {
            Background::Transparent
        } else {
            Background::Solid(self.background_color)
        }
    }

    pub fn master_profile(&self) -> VideoProfile {
        if self.transparent {
            VideoProfile::AlphaMaster
        } else {
            VideoProfile::Standard
        }
    }
}

/// Final encoded outputs, held in memory. The scratch workspace is gone by now.
#[derive(Debug)]
pub struct GeneratedVideos {
    pub master: Vec<u8>,
    pub master_profile: VideoProfile,
    pub preview: Option<Vec<u8>>,
    pub segments: Vec<TimedSegment>,
    pub warnings: Vec<TimingWarning>,
}

/// One pre-synthesized line: its caption text and WAV bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentClip {
    pub text: String,
    pub wav: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ClipManifestEntry {
    text: String,
    audio: PathBuf,
}

/// Reads a JSON list of `{"text", "audio"}` entries. Relative audio paths
/// resolve against the manifest's directory.
pub fn load_clip_manifest(path: &Path) -> Result<Vec<SegmentClip>> {
    let entries: Vec<ClipManifestEntry> = serde_json::from_str(&fs::read_to_string(path)?)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    entries
        .into_iter()
        .map(|entry| {
            let audio = if entry.audio.is_absolute() {
                entry.audio
            } else {
                base.join(entry.audio)
            };
            let wav = fs::read(&audio).map_err(|e| {
                TelopError::input(format!("cannot read clip {}: {}", audio.display(), e))
            })?;
            Ok(SegmentClip {
                text: entry.text,
                wav,
            })
        })
        .collect()
}

fn report(progress: Progress<'_>, done: usize, total: usize, message: &str) {
    if let Some(cb) = progress {
        cb(done, total, message);
    }
}

pub struct Generator {
    tools: Toolchain,
    engine: GlyphLayoutEngine,
    settings: RenderSettings,
}

impl Generator {
    pub fn new(tools: Toolchain, source: Box<dyn GlyphSource>, settings: RenderSettings) -> Self {
        let engine = GlyphLayoutEngine::new(source, settings.font_size);
        info!(
            "Caption font: {} at {}px, frames {}x{} @ {} fps",
            engine.font_name(),
            engine.font_size(),
            settings.width,
            settings.height,
            settings.fps
        );
        Self {
            tools,
            engine,
            settings,
        }
    }

    /// Synthesizes every line and times each caption to its own clip.
    ///
    /// `display_text`, when given, supplies the caption lines separately
    /// from the spoken ones; the two are paired index for index.
    pub async fn from_synthesis(
        &mut self,
        synthesizer: &dyn SpeechSynthesizer,
        voice: &VoiceSettings,
        audio_text: &str,
        display_text: Option<&str>,
        progress: Progress<'_>,
    ) -> Result<GeneratedVideos> {
        let (lines, warning) = match display_text {
            Some(display) => pair_sources(audio_text, display)?,
            None => (split_script(audio_text)?, None),
        };
        let mut warnings: Vec<TimingWarning> = warning.into_iter().collect();
        info!(
            "Synthesizing {} lines with {} (speaker {})",
            lines.len(),
            synthesizer.name(),
            voice.speaker
        );

        let mut clips = Vec::with_capacity(lines.len());
        for (i, (spoken, display)) in lines.pairs().enumerate() {
            debug!("Line {}/{}: {}", i + 1, lines.len(), spoken);
            let wav = synthesizer
                .synthesize(spoken, voice)
                .await
                .map_err(|e| {
                    TelopError::collaborator(synthesizer.name(), format!("line {}: {}", i + 1, e))
                })?;
            clips.push(SegmentClip {
                text: display.to_string(),
                wav,
            });
        }
        self.render_clips(clips, &mut warnings, progress)
    }

    /// Same as synthesis mode for audio that was produced elsewhere. Caption
    /// text loses its clause and sentence marks before rendering.
    pub fn from_clips(&mut self, clips: Vec<SegmentClip>, progress: Progress<'_>) -> Result<GeneratedVideos> {
        let clips = clips
            .into_iter()
            .map(|clip| SegmentClip {
                text: strip_punctuation(clip.text.trim(), SEGMENT_DISPLAY_PUNCTUATION),
                wav: clip.wav,
            })
            .collect();
        self.render_clips(clips, &mut Vec::new(), progress)
    }

    /// Captions an existing narration track from word timestamps. The track
    /// is muxed as-is.
    pub fn from_timestamps(
        &mut self,
        audio: &Path,
        transcript: &str,
        words: &[Word],
        progress: Progress<'_>,
    ) -> Result<GeneratedVideos> {
        let script = split_script(transcript)?;
        if !audio.is_file() {
            return Err(TelopError::input(format!("audio file not found: {}", audio.display())));
        }

        let total = self.tools.probe_duration(audio)?;
        info!(
            "Aligning {} lines against {} words over {:.3}s",
            script.len(),
            words.len(),
            total
        );
        let (segments, mut warnings) = align_words_to_lines(&script.audio, words, total);
        if segments.is_empty() {
            return Err(TelopError::input("no transcript line contains speakable text"));
        }
        let segments = segments
            .into_iter()
            .map(|s| TimedSegment {
                text: display_form(&s.text),
                ..s
            })
            .collect();

        let workspace = self.workspace()?;
        self.render(workspace.path(), segments, audio, &mut warnings, progress)
    }

    fn workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("telopgen-");
        let dir = match &self.settings.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!("Workspace {}", dir.path().display());
        Ok(dir)
    }

    fn clip_duration(&self, wav: &[u8], path: &Path) -> Result<f64> {
        match wav_bytes_duration_seconds(wav) {
            Ok(d) => Ok(d),
            Err(e) => {
                warn!("Could not read WAV header of {} ({}); probing container", path.display(), e);
                self.tools.probe_duration(path)
            }
        }
    }

    fn render_clips(
        &mut self,
        clips: Vec<SegmentClip>,
        warnings: &mut Vec<TimingWarning>,
        progress: Progress<'_>,
    ) -> Result<GeneratedVideos> {
        if clips.is_empty() {
            return Err(TelopError::input("no audio segments"));
        }
        let workspace = self.workspace()?;
        let dir = workspace.path();

        let mut durations = Vec::with_capacity(clips.len());
        for (i, clip) in clips.iter().enumerate() {
            let path = dir.join(format!("audio_{:03}.wav", i));
            fs::write(&path, &clip.wav)?;
            let duration = self.clip_duration(&clip.wav, &path)?;
            debug!("Clip {} lasts {:.3}s", i + 1, duration);
            durations.push(duration);
        }

        let wavs: Vec<Vec<u8>> = clips.iter().map(|c| c.wav.clone()).collect();
        let (combined, concat_warnings) = concat_wav(&wavs)?;
        warnings.extend(concat_warnings);
        let combined_path = dir.join("combined.wav");
        fs::write(&combined_path, combined)?;

        let texts: Vec<String> = clips.into_iter().map(|c| c.text).collect();
        let segments = sequential_segments(&texts, &durations);
        self.render(dir, segments, &combined_path, warnings, progress)
    }

    fn render(
        &mut self,
        dir: &Path,
        segments: Vec<TimedSegment>,
        audio: &Path,
        warnings: &mut Vec<TimingWarning>,
        progress: Progress<'_>,
    ) -> Result<GeneratedVideos> {
        let settings = self.settings.clone();
        let geometry = settings.geometry();
        let background = settings.master_background();
        let durations = display_durations(&segments, settings.fps);
        let total = segments.len();

        let mut master_frames = Vec::with_capacity(total);
        let mut preview_frames = Vec::new();
        for (i, (segment, &duration)) in segments.iter().zip(&durations).enumerate() {
            let layout = self.engine.layout(&segment.text);
            let (_, _, _, bottom) = layout.extent();
            if settings.card_top as i64 + bottom as i64 > settings.height as i64 {
                warn!(
                    "Line {} ({}px column at {}px pitch) runs past the bottom of the frame",
                    i + 1,
                    layout.column_height(),
                    layout.pitch
                );
            }

            let image = dir.join(format!("frame_{:04}.png", i));
            compose(&layout, geometry, background).save_png(&image)?;
            master_frames.push(FrameEntry { image, duration });

            if settings.transparent {
                let image = dir.join(format!("preview_{:04}.png", i));
                compose(&layout, geometry, Background::Checkerboard).save_png(&image)?;
                preview_frames.push(FrameEntry { image, duration });
            }

            report(
                progress,
                i + 1,
                total,
                &format!("{:.2}s-{:.2}s {}", segment.start, segment.end, segment.text),
            );
        }

        let profile = settings.master_profile();
        let master = self.encode(dir, "master", &master_frames, audio, profile)?;
        let preview = if settings.transparent {
            Some(self.encode(dir, "preview", &preview_frames, audio, VideoProfile::Standard)?)
        } else {
            None
        };

        info!(
            "Generated {} captions ({} warnings)",
            segments.len(),
            warnings.len()
        );
        Ok(GeneratedVideos {
            master,
            master_profile: profile,
            preview,
            segments,
            warnings: std::mem::take(warnings),
        })
    }

    fn encode(
        &self,
        dir: &Path,
        name: &str,
        frames: &[FrameEntry],
        audio: &Path,
        profile: VideoProfile,
    ) -> Result<Vec<u8>> {
        let silent = dir.join(format!("{}_silent.{}", name, profile.extension()));
        assemble(&self.tools, frames, self.settings.fps, profile, &silent)?;
        let output = dir.join(format!("{}.{}", name, profile.extension()));
        mux(&self.tools, &silent, audio, &output, profile)?;
        Ok(fs::read(&output)?)
    }
}
