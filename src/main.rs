mod args;
mod assemble;
mod audio;
mod error;
mod font;
mod format;
mod frame;
mod glyph;
mod mux;
mod pipeline;
mod text;
mod timeline;
mod toolchain;
mod transcribe;
mod tts;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command, FormatArgs, RenderArgs};
use crate::font::{default_candidates, load_glyph_source};
use crate::format::{Gemini, Passthrough, TextFormatter, prepare_script};
use crate::pipeline::{GeneratedVideos, Generator, load_clip_manifest};
use crate::toolchain::Toolchain;
use crate::transcribe::{Gladia, TranscriptionResult};
use crate::tts::Voicevox;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args.command).await {
        error!("{:#}", e);
        return Err(e);
    }
    info!("Process complete.");
    Ok(())
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Transcribe(t) => {
            let result = Gladia::new(&t.gladia_key)
                .transcribe_file(&t.audio, &t.language)
                .await?;
            result.save(&t.out)?;
            info!(
                "Wrote {} segments / {} words to {}",
                result.segments.len(),
                result.words.len(),
                t.out.display()
            );
            info!("Transcript: {:.200}", result.full_text());
        }
        Command::Synth(s) => {
            let formatter = build_formatter(&s.format);
            let script = prepare_script(formatter.as_ref(), &read_text(&s.text)?).await?;
            let display_text = match &s.display_text {
                Some(path) => Some(read_text(path)?),
                None if s.hiragana => Some(script.clone()),
                None => None,
            };
            let audio_text = if s.hiragana {
                formatter.to_reading(&script).await?
            } else {
                script
            };

            let engine = Voicevox::new(&s.voicevox_url);
            let mut voice = s.voice();
            if let Some(name) = &s.speaker_name {
                voice.speaker = engine.resolve_speaker(name, &s.style).await?;
            }
            let mut generator = build_generator(&s.render);
            let videos = generator
                .from_synthesis(
                    &engine,
                    &voice,
                    &audio_text,
                    display_text.as_deref(),
                    Some(&log_progress),
                )
                .await?;
            write_outputs(&s.render, &videos)?;
        }
        Command::Clips(c) => {
            let clips = load_clip_manifest(&c.manifest)
                .with_context(|| format!("reading clip manifest {}", c.manifest.display()))?;
            let mut generator = build_generator(&c.render);
            let videos = generator.from_clips(clips, Some(&log_progress))?;
            write_outputs(&c.render, &videos)?;
        }
        Command::Timed(t) => {
            let formatter = build_formatter(&t.format);
            let transcript = prepare_script(formatter.as_ref(), &read_text(&t.text)?).await?;
            let words = match (&t.words, &t.gladia_key) {
                (Some(path), _) => TranscriptionResult::load(path)
                    .with_context(|| format!("reading word timestamps {}", path.display()))?,
                (None, Some(key)) => {
                    Gladia::new(key)
                        .transcribe_file(&t.audio, &t.language)
                        .await?
                }
                (None, None) => anyhow::bail!("timed mode needs --words or --gladia-key"),
            };
            let mut generator = build_generator(&t.render);
            let videos =
                generator.from_timestamps(&t.audio, &transcript, &words.all_words(), Some(&log_progress))?;
            write_outputs(&t.render, &videos)?;
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn build_formatter(format: &FormatArgs) -> Box<dyn TextFormatter> {
    match &format.gemini_key {
        Some(key) => Box::new(Gemini::new(key, &format.gemini_model)),
        None => Box::new(Passthrough),
    }
}

fn build_generator(render: &RenderArgs) -> Generator {
    let tools = Toolchain::detect();
    let source = load_glyph_source(&default_candidates(render.font.as_deref()));
    Generator::new(tools, source, render.settings())
}

fn log_progress(done: usize, total: usize, message: &str) {
    info!("[{}/{}] {}", done, total, message);
}

/// `<stem><suffix>.<ext>` next to the output stem.
fn sibling(stem: &Path, suffix: &str, ext: &str) -> PathBuf {
    let name = stem
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "telop".to_string());
    stem.with_file_name(format!("{}{}.{}", name, suffix, ext))
}

fn write_outputs(render: &RenderArgs, videos: &GeneratedVideos) -> anyhow::Result<()> {
    if let Some(parent) = render.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let master = sibling(&render.out, "", videos.master_profile.extension());
    fs::write(&master, &videos.master)?;
    info!("Video written to {} ({} bytes)", master.display(), videos.master.len());

    if let Some(preview) = &videos.preview {
        let path = sibling(&render.out, "_preview", "mp4");
        fs::write(&path, preview)?;
        info!("Preview written to {}", path.display());
    }

    if render.srt {
        let path = sibling(&render.out, "", "srt");
        timeline::write_srt(&path, &videos.segments)?;
        info!("Subtitles written to {}", path.display());
    }

    for w in &videos.warnings {
        warn!("{}", w);
    }
    Ok(())
}
