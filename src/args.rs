use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use image::Rgb;

use crate::format::DEFAULT_GEMINI_MODEL;
use crate::pipeline::RenderSettings;
use crate::tts::{DEFAULT_STYLE, VoiceSettings};

#[derive(Parser, Debug)]
#[clap(about = "Vertical Japanese caption video generator")]
pub struct Args {
    /// Debug logging (overrides RUST_LOG)
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize each line with VOICEVOX and time captions to the clips
    Synth(SynthArgs),
    /// Render captions for pre-synthesized clips listed in a JSON manifest
    Clips(ClipsArgs),
    /// Caption an existing narration from word timestamps
    Timed(TimedArgs),
    /// Transcribe audio with Gladia and store the timestamps as JSON
    Transcribe(TranscribeArgs),
}

#[derive(ClapArgs, Debug)]
pub struct SynthArgs {
    /// Spoken text, one caption per line
    #[clap(long)]
    pub text: PathBuf,

    /// Caption text paired line by line with --text
    #[clap(long)]
    pub display_text: Option<PathBuf>,

    #[clap(long, default_value_t = 3)]
    pub speaker: u32,

    /// Look the style id up by voice name instead of using --speaker
    #[clap(long)]
    pub speaker_name: Option<String>,

    #[clap(long, default_value = DEFAULT_STYLE)]
    pub style: String,

    #[clap(long, default_value_t = 1.0)]
    pub speed: f32,

    #[clap(long, default_value_t = 1.0)]
    pub pause_scale: f32,

    #[clap(long, env = "VOICEVOX_URL", default_value = "http://localhost:50021")]
    pub voicevox_url: String,

    /// Speak the hiragana reading of the formatted text while showing the text itself
    #[clap(long)]
    pub hiragana: bool,

    #[clap(flatten)]
    pub format: FormatArgs,

    #[clap(flatten)]
    pub render: RenderArgs,
}

impl SynthArgs {
    pub fn voice(&self) -> VoiceSettings {
        VoiceSettings {
            speaker: self.speaker,
            speed: self.speed,
            pause_scale: self.pause_scale,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ClipsArgs {
    /// JSON list of {"text": ..., "audio": "clip.wav"}
    #[clap(long)]
    pub manifest: PathBuf,

    #[clap(flatten)]
    pub render: RenderArgs,
}

#[derive(ClapArgs, Debug)]
pub struct TimedArgs {
    #[clap(long)]
    pub audio: PathBuf,

    /// Transcript, one caption per line
    #[clap(long)]
    pub text: PathBuf,

    /// Stored transcription result; transcribed with Gladia when absent
    #[clap(long)]
    pub words: Option<PathBuf>,

    #[clap(long, env = "GLADIA_API_KEY", hide_env_values = true)]
    pub gladia_key: Option<String>,

    #[clap(long, default_value = "ja")]
    pub language: String,

    #[clap(flatten)]
    pub format: FormatArgs,

    #[clap(flatten)]
    pub render: RenderArgs,
}

/// Script formatting before line splitting; without a key the text is used as written.
#[derive(ClapArgs, Debug)]
pub struct FormatArgs {
    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_key: Option<String>,

    #[clap(long, default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,
}

#[derive(ClapArgs, Debug)]
pub struct TranscribeArgs {
    #[clap(long)]
    pub audio: PathBuf,

    #[clap(long, env = "GLADIA_API_KEY", hide_env_values = true)]
    pub gladia_key: String,

    #[clap(long, default_value = "ja")]
    pub language: String,

    #[clap(long, default_value = "words.json")]
    pub out: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    #[clap(long, default_value_t = 1080)]
    pub width: u32,

    #[clap(long, default_value_t = 1920)]
    pub height: u32,

    #[clap(long, default_value_t = 30)]
    pub fps: u32,

    #[clap(long, default_value_t = 100)]
    pub font_size: u32,

    /// Offset of the caption card from the top of the frame
    #[clap(long, default_value_t = 288)]
    pub card_top: u32,

    /// Font tried before the bundled and system fonts
    #[clap(long)]
    pub font: Option<PathBuf>,

    /// One opaque video on --background-color instead of an alpha master
    #[clap(long)]
    pub green_screen: bool,

    #[clap(long, default_value = "00ff00", value_parser = parse_hex_color)]
    pub background_color: Rgb<u8>,

    /// Output path without extension
    #[clap(long, default_value = "telop")]
    pub out: PathBuf,

    /// Also write the caption timeline as SRT
    #[clap(long)]
    pub srt: bool,

    /// Where the per-run scratch directory is created
    #[clap(long)]
    pub work_dir: Option<PathBuf>,
}

impl RenderArgs {
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
            font_size: self.font_size,
            card_top: self.card_top,
            transparent: !self.green_screen,
            background_color: self.background_color,
            scratch_root: self.work_dir.clone(),
        }
    }
}

fn parse_hex_color(s: &str) -> Result<Rgb<u8>, String> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected RRGGBB, got {:?}", s));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
