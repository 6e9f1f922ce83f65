use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Result, TelopError};
use crate::text::split_lines;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const SERVICE: &str = "Gemini formatting";

/// Caption lines are broken at this many characters.
pub const LINE_CHARS: usize = 14;

const LINE_ENDINGS: &[char] = &['。', '、'];

/// Prepares a raw script before it is split into caption lines.
#[async_trait]
pub trait TextFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Breaks the text into caption-sized lines without changing its wording.
    async fn format(&self, text: &str) -> Result<String>;

    /// Spoken reading of already formatted text, one output line per input line.
    async fn to_reading(&self, text: &str) -> Result<String>;
}

/// For scripts that are already one caption per line.
pub struct Passthrough;

#[async_trait]
impl TextFormatter for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn format(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    async fn to_reading(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

fn format_prompt(text: &str) -> String {
    format!(
        "あなたは厳格な校正者です。以下のテキストを整形してください。\n\
         \n\
         【ルール】\n\
         1. 元のテキストの単語や表現を1文字も変更しないこと\n\
         2. 1行は{LINE_CHARS}文字以内\n\
         3. 各行は必ず句点（。）または読点（、）で終わること\n\
         4. 文の途中で改行する場合は読点（、）、文末で改行する場合は句点（。）を付けること\n\
         5. 単語の途中で改行しないこと\n\
         6. 要約や言い換えは禁止\n\
         \n\
         【入力テキスト】\n\
         {text}\n\
         \n\
         【出力】\n\
         整形後のテキストのみを出力してください。"
    )
}

fn reading_prompt(text: &str) -> String {
    format!(
        "以下のテキストを音声合成用にひらがなに変換してください。\n\
         \n\
         【ルール】\n\
         1. 漢字、カタカナ、数字、アルファベットをひらがなの読みに変換すること\n\
         2. 元の句読点（。、）は維持すること\n\
         3. 9文字以上の行には、最初の意味のまとまりの後に読点（、）を1つだけ追加してよい\n\
         4. 行数と改行位置は入力と完全に同じにすること\n\
         \n\
         【入力テキスト】\n\
         {text}\n\
         \n\
         【出力】\n\
         ひらがな変換後のテキストのみを出力してください。"
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentPart {
    text: Option<String>,
}

/// Text of the first candidate; a blocked or empty answer is a collaborator error.
fn extract_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        let reason = match response.prompt_feedback {
            Some(feedback) => format!("empty response (feedback: {})", feedback),
            None => "empty response".to_string(),
        };
        return Err(TelopError::collaborator(SERVICE, reason));
    }
    Ok(text.to_string())
}

fn transport(e: reqwest::Error) -> TelopError {
    TelopError::collaborator(SERVICE, e.to_string())
}

/// Gemini `generateContent` over REST.
pub struct Gemini {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl Gemini {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: GEMINI_URL.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("POST {} ({} prompt chars)", url, prompt.chars().count());
        let response: GenerateResponse = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        extract_text(response)
    }
}

#[async_trait]
impl TextFormatter for Gemini {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn format(&self, text: &str) -> Result<String> {
        info!("Formatting {} chars with {}", text.chars().count(), self.model);
        self.generate(&format_prompt(text)).await
    }

    async fn to_reading(&self, text: &str) -> Result<String> {
        info!("Converting {} lines to their reading", split_lines(text).len());
        self.generate(&reading_prompt(text)).await
    }
}

/// 1-based numbers of lines that end without `。` or `、`.
pub fn unterminated_lines(text: &str) -> Vec<usize> {
    split_lines(text)
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.ends_with(LINE_ENDINGS))
        .map(|(i, _)| i + 1)
        .collect()
}

/// Runs the formatter over a raw script and reports lines it left unterminated.
pub async fn prepare_script(formatter: &dyn TextFormatter, text: &str) -> Result<String> {
    let formatted = formatter.format(text).await?;
    let open = unterminated_lines(&formatted);
    if !open.is_empty() {
        warn!(
            "{}: {} line(s) do not end in 。 or 、: {:?}",
            formatter.name(),
            open.len(),
            open
        );
    }
    let long = split_lines(&formatted)
        .iter()
        .filter(|l| l.chars().count() > LINE_CHARS)
        .count();
    if long > 0 {
        debug!("{} line(s) longer than {} chars", long, LINE_CHARS);
    }
    Ok(formatted)
}
