use std::fs;
use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use tracing::{debug, info, warn};

use crate::glyph::GlyphClass;

const BUNDLED_FONT: &str = "fonts/NotoSansJP-Bold.otf";

/// A single glyph's coverage bitmap, positioned relative to the pen origin on
/// the baseline. `ymin` is the offset of the bitmap's bottom row above the
/// baseline (negative for descenders).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGlyph {
    pub width: u32,
    pub height: u32,
    pub xmin: i32,
    pub ymin: i32,
    pub advance: f32,
    pub coverage: Vec<u8>,
}

impl RasterGlyph {
    pub fn is_blank(&self) -> bool {
        self.width == 0 || self.height == 0 || self.coverage.iter().all(|&c| c == 0)
    }

    /// Bitmap top measured downward from a pen whose baseline sits `ascent` px below it.
    pub fn top_below(&self, ascent: f32) -> i32 {
        ascent.round() as i32 - (self.height as i32 + self.ymin)
    }
}

pub trait GlyphSource: Send + Sync {
    fn name(&self) -> &str;
    fn ascent(&self, px: f32) -> f32;
    /// Distance of the descender line below the baseline, as a negative number.
    fn descent(&self, px: f32) -> f32;
    fn rasterize(&self, ch: char, px: f32) -> RasterGlyph;
}

pub struct FontdueSource {
    name: String,
    font: Font,
}

impl FontdueSource {
    pub fn load(path: &Path) -> Result<Self, String> {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        let settings = FontSettings {
            collection_index: 0,
            ..FontSettings::default()
        };
        let font = Font::from_bytes(bytes, settings).map_err(|e| e.to_string())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, font })
    }
}

impl GlyphSource for FontdueSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ascent(&self, px: f32) -> f32 {
        self.font
            .horizontal_line_metrics(px)
            .map(|m| m.ascent)
            .unwrap_or(px * 0.88)
    }

    fn descent(&self, px: f32) -> f32 {
        self.font
            .horizontal_line_metrics(px)
            .map(|m| m.descent)
            .unwrap_or(-px * 0.12)
    }

    fn rasterize(&self, ch: char, px: f32) -> RasterGlyph {
        let (metrics, coverage) = self.font.rasterize(ch, px);
        RasterGlyph {
            width: metrics.width as u32,
            height: metrics.height as u32,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            advance: metrics.advance_width,
            coverage,
        }
    }
}

/// Last-resort glyphs drawn from simple shapes: an outlined box per visible
/// character, a flat bar for dash-like ones, nothing for whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinGlyphs;

impl GlyphSource for BuiltinGlyphs {
    fn name(&self) -> &str {
        "builtin"
    }

    fn ascent(&self, px: f32) -> f32 {
        px * 0.88
    }

    fn descent(&self, px: f32) -> f32 {
        -px * 0.12
    }

    fn rasterize(&self, ch: char, px: f32) -> RasterGlyph {
        let advance = px;
        if ch.is_whitespace() {
            return RasterGlyph {
                width: 0,
                height: 0,
                xmin: 0,
                ymin: 0,
                advance,
                coverage: Vec::new(),
            };
        }

        let stroke = ((px / 12.0).round() as u32).max(1);
        match GlyphClass::of(ch) {
            GlyphClass::Rotated => {
                let width = ((px * 0.8).round() as u32).max(1);
                RasterGlyph {
                    width,
                    height: stroke,
                    xmin: ((px - width as f32) / 2.0).round() as i32,
                    ymin: (px * 0.3).round() as i32,
                    advance,
                    coverage: vec![255; (width * stroke) as usize],
                }
            }
            class => {
                let scale = if class == GlyphClass::Small { 0.55 } else { 0.8 };
                let side = ((px * scale).round() as u32).max(stroke * 2 + 1);
                let mut coverage = vec![0u8; (side * side) as usize];
                for y in 0..side {
                    for x in 0..side {
                        let edge = x < stroke || y < stroke || x >= side - stroke || y >= side - stroke;
                        if edge {
                            coverage[(y * side + x) as usize] = 255;
                        }
                    }
                }
                RasterGlyph {
                    width: side,
                    height: side,
                    xmin: ((px - side as f32) / 2.0).round() as i32,
                    ymin: 0,
                    advance,
                    coverage,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FontCandidate {
    File(PathBuf),
    Builtin,
}

/// Bundled font first, then the platform's usual CJK fonts, then the built-in shapes.
pub fn default_candidates(preferred: Option<&Path>) -> Vec<FontCandidate> {
    let mut candidates = Vec::new();
    if let Some(path) = preferred {
        candidates.push(FontCandidate::File(path.to_path_buf()));
    }
    candidates.push(FontCandidate::File(PathBuf::from(BUNDLED_FONT)));
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(FontCandidate::File(dir.join(BUNDLED_FONT)));
    }

    let system: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/System/Library/Fonts/ヒラギノ角ゴシック W6.ttc",
            "/System/Library/Fonts/ヒラギノ角ゴ ProN W6.otf",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:/Windows/Fonts/YuGothB.ttc",
            "C:/Windows/Fonts/YuGothM.ttc",
            "C:/Windows/Fonts/meiryo.ttc",
        ]
    } else {
        &[
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJKjp-Bold.otf",
        ]
    };
    candidates.extend(system.iter().map(|p| FontCandidate::File(PathBuf::from(p))));
    candidates.push(FontCandidate::Builtin);
    candidates
}

/// Tries each candidate in order and keeps the first that loads. Never fails:
/// an exhausted chain yields the built-in glyphs.
pub fn load_glyph_source(candidates: &[FontCandidate]) -> Box<dyn GlyphSource> {
    for candidate in candidates {
        match candidate {
            FontCandidate::File(path) => {
                if !path.exists() {
                    debug!("Font candidate not present: {}", path.display());
                    continue;
                }
                match FontdueSource::load(path) {
                    Ok(source) => {
                        info!("Loaded font {}", path.display());
                        return Box::new(source);
                    }
                    Err(e) => warn!("Failed to load font {}: {}", path.display(), e),
                }
            }
            FontCandidate::Builtin => break,
        }
    }
    warn!("No CJK font could be loaded; falling back to built-in glyphs");
    Box::new(BuiltinGlyphs)
}
