use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, TimingWarning};
use crate::text::normalize_for_alignment;
use crate::transcribe::Word;

#[derive(Debug, Clone, PartialEq)]
pub struct TimedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TimedSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Strategy A: each line's synthesized clip length is its slot, back to back.
pub fn sequential_segments(lines: &[String], durations: &[f64]) -> Vec<TimedSegment> {
    let mut cumulative = 0.0_f64;
    lines
        .iter()
        .zip(durations)
        .map(|(text, &dur)| {
            let start = cumulative;
            cumulative += dur;
            TimedSegment {
                start,
                end: cumulative,
                text: text.clone(),
            }
        })
        .collect()
}

/// Strategy B: matches transcript lines against recognized words by
/// normalized character count, then stretches the result over the whole
/// audio track.
///
/// Line *i* starts at the first word it consumed; the first line is pulled
/// back to 0 and the last one runs to `total_duration`. Every interior line
/// ends where the next one begins, so captions tile the track with no gaps.
pub fn align_words_to_lines(
    lines: &[String],
    words: &[Word],
    total_duration: f64,
) -> (Vec<TimedSegment>, Vec<TimingWarning>) {
    let mut warnings = Vec::new();

    if words.is_empty() {
        let w = TimingWarning::NoWordTimestamps { lines: lines.len() };
        warn!("{}", w);
        warnings.push(w);
        return (equal_subdivision(lines, total_duration), warnings);
    }

    let slot = total_duration / lines.len().max(1) as f64;
    let mut starts: Vec<(f64, String)> = Vec::with_capacity(lines.len());
    let mut word_index = 0usize;
    let mut exhausted_reported = false;

    for (line_idx, line) in lines.iter().enumerate() {
        let target = normalize_for_alignment(line).chars().count();
        if target == 0 {
            let w = TimingWarning::EmptyLineSkipped { line: line_idx + 1 };
            warn!("{}", w);
            warnings.push(w);
            continue;
        }

        let first_word = word_index;
        let mut matched = 0usize;
        while word_index < words.len() && matched < target {
            matched += normalize_for_alignment(&words[word_index].word).chars().count();
            word_index += 1;
        }

        let mut start = if first_word < words.len() {
            words[first_word].start
        } else {
            if !exhausted_reported {
                let w = TimingWarning::WordsExhausted { line: line_idx + 1 };
                warn!("{}", w);
                warnings.push(w);
                exhausted_reported = true;
            }
            line_idx as f64 * slot
        };
        if let Some((prev, _)) = starts.last() {
            start = start.max(*prev);
        }
        debug!(
            "Line {} matched words {}..{} starting at {:.3}s",
            line_idx + 1,
            first_word,
            word_index,
            start
        );
        starts.push((start, line.clone()));
    }

    (cover_track(starts, total_duration), warnings)
}

fn equal_subdivision(lines: &[String], total_duration: f64) -> Vec<TimedSegment> {
    let slot = total_duration / lines.len().max(1) as f64;
    let starts = lines
        .iter()
        .enumerate()
        .map(|(i, line)| (i as f64 * slot, line.clone()))
        .collect();
    cover_track(starts, total_duration)
}

fn cover_track(starts: Vec<(f64, String)>, total_duration: f64) -> Vec<TimedSegment> {
    let count = starts.len();
    let next_starts: Vec<f64> = starts.iter().skip(1).map(|(s, _)| *s).collect();
    starts
        .into_iter()
        .enumerate()
        .map(|(i, (start, text))| {
            let start = if i == 0 { 0.0 } else { start };
            let end = if i + 1 < count {
                next_starts[i]
            } else {
                total_duration
            };
            TimedSegment { start, end, text }
        })
        .collect()
}

/// How long each frame is shown, never less than one frame interval.
pub fn display_durations(segments: &[TimedSegment], fps: u32) -> Vec<f64> {
    let floor = 1.0 / fps.max(1) as f64;
    segments.iter().map(|s| s.duration().max(floor)).collect()
}

pub fn write_srt(path: &Path, segments: &[TimedSegment]) -> Result<()> {
    let mut f = File::create(path)?;
    for (i, segment) in segments.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(
            f,
            "{} --> {}",
            format_srt_time(segment.start),
            format_srt_time(segment.end)
        )?;
        writeln!(f, "{}", segment.text)?;
        writeln!(f)?;
    }
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}
