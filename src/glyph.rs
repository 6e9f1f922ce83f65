//! Vertical caption layout.
//!
//! A line is stacked top to bottom on a fixed pitch equal to the font size.
//! Dash-like characters are turned a quarter turn so they run along the
//! column, and small kana tuck up into the slot of the glyph above them.

use std::collections::HashMap;

use image::{GrayImage, Rgba, RgbaImage, imageops};

use crate::font::{GlyphSource, RasterGlyph};

/// Characters drawn rotated 90° in vertical text.
pub const ROTATE_SET: &[char] = &[
    'ー', '〜', '～', '－', '-', '―', '‐', '–', '—', '=', '＝', '+', '＋', '<', '>', '＜', '＞',
];

/// Sokuon, youon and the small ke/ka forms.
pub const SMALL_SET: &[char] = &[
    'っ', 'ぁ', 'ぃ', 'ぅ', 'ぇ', 'ぉ', 'ゃ', 'ゅ', 'ょ', 'ゎ', 'ッ', 'ァ', 'ィ', 'ゥ', 'ェ', 'ォ',
    'ャ', 'ュ', 'ョ', 'ヮ', 'ヶ', 'ヵ',
];

/// Combined horizontal and vertical padding of the white card.
pub const CARD_MARGIN: u32 = 60;
const TOP_INSET: i32 = 5;
const SMALL_SHIFT_X: i32 = 10;
const SMALL_OVERLAP_AFTER_REGULAR: i32 = 20;
const SMALL_OVERLAP_AFTER_SMALL: i32 = 10;

const CARD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: [u8; 3] = [0, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphClass {
    Regular,
    Rotated,
    Small,
}

impl GlyphClass {
    pub fn of(ch: char) -> Self {
        if ROTATE_SET.contains(&ch) {
            GlyphClass::Rotated
        } else if SMALL_SET.contains(&ch) {
            GlyphClass::Small
        } else {
            GlyphClass::Regular
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphRecord {
    pub ch: char,
    pub class: GlyphClass,
}

impl GlyphRecord {
    pub fn new(ch: char) -> Self {
        Self {
            ch,
            class: GlyphClass::of(ch),
        }
    }

    pub fn is_small(&self) -> bool {
        self.class == GlyphClass::Small
    }
}

pub fn classify(text: &str) -> Vec<GlyphRecord> {
    text.chars().map(GlyphRecord::new).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyph {
    pub record: GlyphRecord,
    /// Top of the pitch slot this glyph was set into, after any overlap.
    pub slot_top: i32,
    /// Top-left of `bitmap`, in card coordinates.
    pub x: i32,
    pub y: i32,
    pub bitmap: GrayImage,
}

impl PlacedGlyph {
    pub fn center_x(&self) -> f32 {
        self.x as f32 + self.bitmap.width() as f32 / 2.0
    }
}

/// One laid-out caption: a white card plus the glyphs set on it. Glyph
/// positions are relative to the card's top-left corner and may fall outside it.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphLayout {
    pub card_width: u32,
    pub card_height: u32,
    pub center_x: i32,
    pub pitch: u32,
    pub glyphs: Vec<PlacedGlyph>,
}

impl GlyphLayout {
    pub fn column_height(&self) -> u32 {
        self.card_height - CARD_MARGIN
    }

    /// Bounds of everything this layout paints, as (left, top, right, bottom).
    pub fn extent(&self) -> (i32, i32, i32, i32) {
        self.glyphs.iter().fold(
            (0, 0, self.card_width as i32, self.card_height as i32),
            |(l, t, r, b), g| {
                (
                    l.min(g.x),
                    t.min(g.y),
                    r.max(g.x + g.bitmap.width() as i32),
                    b.max(g.y + g.bitmap.height() as i32),
                )
            },
        )
    }

    /// Paints the card and its glyphs with the card's corner at (`left`, `top`).
    /// Anything falling outside the canvas is dropped.
    pub fn draw_onto(&self, canvas: &mut RgbaImage, left: i64, top: i64) {
        fill_rect(canvas, left, top, self.card_width, self.card_height, CARD_COLOR);
        for glyph in &self.glyphs {
            blend_coverage(
                canvas,
                left + glyph.x as i64,
                top + glyph.y as i64,
                &glyph.bitmap,
                INK,
            );
        }
    }
}

pub struct GlyphLayoutEngine {
    source: Box<dyn GlyphSource>,
    font_size: u32,
    cache: HashMap<char, RasterGlyph>,
}

impl GlyphLayoutEngine {
    pub fn new(source: Box<dyn GlyphSource>, font_size: u32) -> Self {
        Self {
            source,
            font_size: font_size.max(1),
            cache: HashMap::new(),
        }
    }

    pub fn font_name(&self) -> &str {
        self.source.name()
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    fn glyph(&mut self, ch: char) -> &RasterGlyph {
        let px = self.font_size as f32;
        let source = &self.source;
        self.cache.entry(ch).or_insert_with(|| source.rasterize(ch, px))
    }

    pub fn layout(&mut self, text: &str) -> GlyphLayout {
        let records = classify(text);
        let pitch = self.font_size as i32;
        let ascent = self.source.ascent(self.font_size as f32);

        let card_width = self.font_size + CARD_MARGIN;
        let card_height = self.font_size * records.len() as u32 + CARD_MARGIN;
        let center_x = (card_width / 2) as i32;

        let mut glyphs = Vec::with_capacity(records.len());
        let mut cursor = TOP_INSET;

        for (i, record) in records.iter().enumerate() {
            match record.class {
                GlyphClass::Rotated => {
                    if let Some(bitmap) = self.rotated(record.ch) {
                        let x = center_x - (bitmap.width() / 2) as i32;
                        let y = cursor + pitch / 2 - (bitmap.height() / 2) as i32 + pitch / 4;
                        glyphs.push(PlacedGlyph {
                            record: *record,
                            slot_top: cursor,
                            x,
                            y,
                            bitmap,
                        });
                    }
                    cursor += pitch;
                }
                GlyphClass::Small => {
                    let overlap = match i {
                        0 => 0,
                        _ if records[i - 1].is_small() => SMALL_OVERLAP_AFTER_SMALL,
                        _ => SMALL_OVERLAP_AFTER_REGULAR,
                    };
                    let slot_top = cursor - overlap;
                    let glyph = self.glyph(record.ch).clone();
                    glyphs.push(PlacedGlyph {
                        record: *record,
                        slot_top,
                        x: center_x - (glyph.width / 2) as i32 + SMALL_SHIFT_X,
                        y: slot_top + glyph.top_below(ascent),
                        bitmap: to_gray(&glyph),
                    });
                    cursor += pitch - overlap;
                }
                GlyphClass::Regular => {
                    let glyph = self.glyph(record.ch).clone();
                    glyphs.push(PlacedGlyph {
                        record: *record,
                        slot_top: cursor,
                        x: center_x - (glyph.width / 2) as i32,
                        y: cursor + glyph.top_below(ascent),
                        bitmap: to_gray(&glyph),
                    });
                    cursor += pitch;
                }
            }
        }

        GlyphLayout {
            card_width,
            card_height,
            center_x,
            pitch: self.font_size,
            glyphs,
        }
    }

    /// Draws `ch` centred in a square scratch buffer, turns it 90°
    /// counter-clockwise and crops to the inked area.
    fn rotated(&mut self, ch: char) -> Option<GrayImage> {
        let px = self.font_size as f32;
        let ascent = self.source.ascent(px);
        let descent = self.source.descent(px);
        let glyph = self.glyph(ch).clone();
        if glyph.is_blank() {
            return None;
        }

        let side = self.font_size * 2;
        let half = side as f32 / 2.0;
        let mut scratch = GrayImage::new(side, side);
        let baseline = half + (ascent + descent) / 2.0;
        let left = (half - glyph.advance / 2.0).round() as i64 + glyph.xmin as i64;
        let top = baseline.round() as i64 - (glyph.height as i64 + glyph.ymin as i64);
        copy_coverage(&mut scratch, left, top, &glyph);

        let turned = imageops::rotate270(&scratch);
        let (x0, y0, x1, y1) = inked_bounds(&turned)?;
        Some(imageops::crop_imm(&turned, x0, y0, x1 - x0, y1 - y0).to_image())
    }
}

fn to_gray(glyph: &RasterGlyph) -> GrayImage {
    GrayImage::from_raw(glyph.width, glyph.height, glyph.coverage.clone())
        .unwrap_or_else(|| GrayImage::new(0, 0))
}

fn copy_coverage(target: &mut GrayImage, left: i64, top: i64, glyph: &RasterGlyph) {
    for gy in 0..glyph.height {
        for gx in 0..glyph.width {
            let x = left + gx as i64;
            let y = top + gy as i64;
            if x < 0 || y < 0 || x >= target.width() as i64 || y >= target.height() as i64 {
                continue;
            }
            let value = glyph.coverage[(gy * glyph.width + gx) as usize];
            target.put_pixel(x as u32, y as u32, image::Luma([value]));
        }
    }
}

/// Exclusive bounds of non-zero pixels.
fn inked_bounds(img: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x + 1, y + 1),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)),
        });
    }
    bounds
}

pub(crate) fn fill_rect(canvas: &mut RgbaImage, left: i64, top: i64, w: u32, h: u32, color: Rgba<u8>) {
    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + w as i64).min(canvas.width() as i64);
    let y1 = (top + h as i64).min(canvas.height() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Source-over composite of a solid colour masked by `coverage`.
fn blend_coverage(canvas: &mut RgbaImage, left: i64, top: i64, coverage: &GrayImage, color: [u8; 3]) {
    for (gx, gy, c) in coverage.enumerate_pixels() {
        let a = c.0[0] as f32 / 255.0;
        if a == 0.0 {
            continue;
        }
        let x = left + gx as i64;
        let y = top + gy as i64;
        if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
            continue;
        }
        let dst = canvas.get_pixel_mut(x as u32, y as u32);
        let da = dst.0[3] as f32 / 255.0;
        let out_a = a + da * (1.0 - a);
        for i in 0..3 {
            let blended = (color[i] as f32 * a + dst.0[i] as f32 * da * (1.0 - a)) / out_a;
            dst.0[i] = blended.round().clamp(0.0, 255.0) as u8;
        }
        dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::BuiltinGlyphs;

    fn engine() -> GlyphLayoutEngine {
        GlyphLayoutEngine::new(Box::new(BuiltinGlyphs), 100)
    }

    /// The layout alone on a transparent canvas sized to its extent.
    fn rasterize(layout: &GlyphLayout) -> RgbaImage {
        let (l, t, r, b) = layout.extent();
        let mut canvas = RgbaImage::new((r - l) as u32, (b - t) as u32);
        layout.draw_onto(&mut canvas, -l as i64, -t as i64);
        canvas
    }

    fn advances(layout: &GlyphLayout) -> Vec<i32> {
        layout
            .glyphs
            .windows(2)
            .map(|w| w[1].slot_top - w[0].slot_top)
            .collect()
    }

    #[test]
    fn classification_uses_fixed_sets() {
        assert_eq!(GlyphRecord::new('ー').class, GlyphClass::Rotated);
        assert_eq!(GlyphRecord::new('＞').class, GlyphClass::Rotated);
        assert!(GlyphRecord::new('ょ').is_small());
        assert!(GlyphRecord::new('ヶ').is_small());
        let plain = GlyphRecord::new('あ');
        assert_eq!(plain.class, GlyphClass::Regular);
    }

    #[test]
    fn rotated_glyphs_sit_on_the_centerline() {
        let mut engine = engine();
        for &ch in ROTATE_SET {
            let layout = engine.layout(&format!("あ{}い", ch));
            let placed = layout
                .glyphs
                .iter()
                .find(|g| g.record.ch == ch)
                .unwrap_or_else(|| panic!("{} was not placed", ch));
            assert!(
                (placed.center_x() - layout.center_x as f32).abs() <= 2.0,
                "{} centred at {} instead of {}",
                ch,
                placed.center_x(),
                layout.center_x
            );
            // A horizontal bar comes out vertical.
            assert!(placed.bitmap.height() > placed.bitmap.width());
        }
    }

    #[test]
    fn regular_glyphs_advance_by_full_pitch() {
        let layout = engine().layout("あいう");
        assert_eq!(advances(&layout), vec![100, 100]);
        assert_eq!(layout.glyphs[0].slot_top, TOP_INSET);
    }

    #[test]
    fn small_kana_overlap_the_previous_slot() {
        let layout = engine().layout("きょう");
        assert_eq!(advances(&layout), vec![80, 100]);
        assert!(layout.glyphs[1].x > layout.glyphs[0].x);
    }

    #[test]
    fn consecutive_small_kana_overlap_less() {
        let layout = engine().layout("きっゃ");
        assert_eq!(advances(&layout), vec![80, 90]);
    }

    #[test]
    fn leading_small_kana_gets_no_overlap() {
        let layout = engine().layout("ょう");
        assert_eq!(layout.glyphs[0].slot_top, TOP_INSET);
        assert_eq!(advances(&layout), vec![100]);
    }

    #[test]
    fn card_wraps_the_column_with_margins() {
        let layout = engine().layout("あいう");
        assert_eq!(layout.card_width, 160);
        assert_eq!(layout.card_height, 360);
        assert_eq!(layout.column_height(), 300);
    }

    #[test]
    fn empty_line_yields_bare_card() {
        let layout = engine().layout("");
        assert!(layout.glyphs.is_empty());
        assert_eq!((layout.card_width, layout.card_height), (160, 60));
        let img = rasterize(&layout);
        assert_eq!(img.dimensions(), (160, 60));
    }

    #[test]
    fn rasterization_is_deterministic() {
        let text = "ラーメンを食べちゃった＝すごい";
        let first = rasterize(&engine().layout(text));
        let mut reused = engine();
        let _ = reused.layout("別の行");
        let second = rasterize(&reused.layout(text));
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn glyphs_are_black_on_the_white_card() {
        let layout = engine().layout("あ");
        let img = rasterize(&layout);
        let g = &layout.glyphs[0];
        let inked = img.get_pixel(g.x as u32, (g.y as u32) + g.bitmap.height() / 2);
        assert_eq!(inked.0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn long_lines_are_not_clipped() {
        let text: String = std::iter::repeat('あ').take(30).collect();
        let layout = engine().layout(&text);
        assert_eq!(layout.card_height, 3060);
        assert_eq!(layout.glyphs.len(), 30);
    }
}
