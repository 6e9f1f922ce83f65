use tracing::{debug, warn};

use crate::error::{Result, TelopError, TimingWarning};

/// Stripped from caption text before rendering.
pub const DISPLAY_PUNCTUATION: &[char] = &['、', '。', '，', '．'];

/// Pre-synthesized clips arrive with exclamation and question marks still attached.
pub const SEGMENT_DISPLAY_PUNCTUATION: &[char] = &['、', '。', '！', '？'];

/// Ignored (together with all whitespace) when matching lines against recognized words.
const ALIGNMENT_PUNCTUATION: &[char] = &['、', '。', ',', '.'];

/// Audio lines and the caption form of each, index for index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLines {
    pub audio: Vec<String>,
    pub display: Vec<String>,
}

impl ScriptLines {
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.audio
            .iter()
            .zip(self.display.iter())
            .map(|(a, d)| (a.as_str(), d.as_str()))
    }
}

pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn strip_punctuation(line: &str, set: &[char]) -> String {
    line.chars().filter(|c| !set.contains(c)).collect()
}

pub fn display_form(line: &str) -> String {
    strip_punctuation(line, DISPLAY_PUNCTUATION)
}

/// Splits one text into audio lines plus their punctuation-free captions.
pub fn split_script(text: &str) -> Result<ScriptLines> {
    let audio = split_lines(text);
    if audio.is_empty() {
        return Err(TelopError::input("text is empty"));
    }
    let display = audio.iter().map(|line| display_form(line)).collect();
    Ok(ScriptLines { audio, display })
}

/// Pairs independently edited audio and display texts line by line.
///
/// Differing line counts truncate both sides to the shorter one and yield a
/// warning rather than an error.
pub fn pair_sources(
    audio_text: &str,
    display_text: &str,
) -> Result<(ScriptLines, Option<TimingWarning>)> {
    let mut audio = split_lines(audio_text);
    let mut display: Vec<String> = split_lines(display_text)
        .iter()
        .map(|line| display_form(line))
        .collect();

    let mut warning = None;
    if audio.len() != display.len() {
        let w = TimingWarning::LineCountMismatch {
            first: "audio text",
            first_count: audio.len(),
            second: "display text",
            second_count: display.len(),
        };
        warn!("{}", w);
        let keep = audio.len().min(display.len());
        audio.truncate(keep);
        display.truncate(keep);
        warning = Some(w);
    }

    if audio.is_empty() {
        return Err(TelopError::input("text is empty"));
    }
    debug!("Paired {} audio/display lines", audio.len());
    Ok((ScriptLines { audio, display }, warning))
}

pub fn normalize_for_alignment(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !ALIGNMENT_PUNCTUATION.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_count_matches_non_blank_input_lines() {
        let text = "  一行目、\n\n二行目。  \n   \n三行目\n";
        let lines = split_script(text).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.audio, vec!["一行目、", "二行目。", "三行目"]);
        assert_eq!(lines.display, vec!["一行目", "二行目", "三行目"]);
    }

    #[test]
    fn display_form_strips_full_width_forms_too() {
        assert_eq!(display_form("はい，そうです．"), "はいそうです");
    }

    #[test]
    fn blank_text_is_an_input_error() {
        assert!(matches!(split_script(" \n\t\n"), Err(TelopError::Input(_))));
    }

    #[test]
    fn mismatched_sources_truncate_to_shorter() {
        let (lines, warning) = pair_sources("あ。\nい。\nう。", "ア、\nイ。").unwrap();
        assert_eq!(lines.audio, vec!["あ。", "い。"]);
        assert_eq!(lines.display, vec!["ア", "イ"]);
        assert_eq!(
            warning,
            Some(TimingWarning::LineCountMismatch {
                first: "audio text",
                first_count: 3,
                second: "display text",
                second_count: 2,
            })
        );
    }

    #[test]
    fn pairing_with_an_empty_side_fails() {
        assert!(matches!(
            pair_sources("あ。", ""),
            Err(TelopError::Input(_))
        ));
    }

    #[test]
    fn alignment_normalization_drops_spaces_and_ascii_punctuation() {
        assert_eq!(normalize_for_alignment("あり がとう。\u{3000}Hi, there."), "ありがとうHithere");
        assert_eq!(normalize_for_alignment("ありがとう。").chars().count(), 5);
    }
}
