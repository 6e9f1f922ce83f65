use std::path::Path;

use image::{DynamicImage, Rgb, Rgba, RgbaImage};

use crate::error::Result;
use crate::glyph::{GlyphLayout, fill_rect};

pub const CHECKER_CELL: u32 = 20;
const CHECKER_LIGHT: Rgba<u8> = Rgba([200, 200, 200, 255]);
const CHECKER_DARK: Rgba<u8> = Rgba([150, 150, 150, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Transparent,
    Solid(Rgb<u8>),
    Checkerboard,
}

impl Background {
    pub fn is_opaque(&self) -> bool {
        !matches!(self, Background::Transparent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Distance from the frame top to the top edge of the caption card.
    pub card_top: u32,
}

pub struct FrameImage {
    pub background: Background,
    pub pixels: RgbaImage,
}

impl FrameImage {
    /// Transparent frames keep their alpha channel; opaque ones are written as RGB.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        if self.background.is_opaque() {
            DynamicImage::ImageRgba8(self.pixels.clone())
                .to_rgb8()
                .save(path)?;
        } else {
            self.pixels.save(path)?;
        }
        Ok(())
    }
}

fn canvas(geometry: FrameGeometry, background: Background) -> RgbaImage {
    match background {
        Background::Transparent => RgbaImage::new(geometry.width, geometry.height),
        Background::Solid(Rgb([r, g, b])) => {
            RgbaImage::from_pixel(geometry.width, geometry.height, Rgba([r, g, b, 255]))
        }
        Background::Checkerboard => {
            let mut img = RgbaImage::new(geometry.width, geometry.height);
            for y in (0..geometry.height).step_by(CHECKER_CELL as usize) {
                for x in (0..geometry.width).step_by(CHECKER_CELL as usize) {
                    let color = if (x / CHECKER_CELL + y / CHECKER_CELL) % 2 == 0 {
                        CHECKER_LIGHT
                    } else {
                        CHECKER_DARK
                    };
                    fill_rect(&mut img, x as i64, y as i64, CHECKER_CELL, CHECKER_CELL, color);
                }
            }
            img
        }
    }
}

/// Puts a caption layout on a full-size frame, card centred horizontally at
/// the configured offset from the top.
pub fn compose(layout: &GlyphLayout, geometry: FrameGeometry, background: Background) -> FrameImage {
    let mut pixels = canvas(geometry, background);
    let left = (geometry.width as i64 - layout.card_width as i64) / 2;
    layout.draw_onto(&mut pixels, left, geometry.card_top as i64);
    FrameImage { background, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::BuiltinGlyphs;
    use crate::glyph::GlyphLayoutEngine;

    const GEOMETRY: FrameGeometry = FrameGeometry {
        width: 1080,
        height: 1920,
        card_top: 288,
    };

    fn layout(text: &str) -> GlyphLayout {
        GlyphLayoutEngine::new(Box::new(BuiltinGlyphs), 100).layout(text)
    }

    #[test]
    fn transparent_frame_is_clear_outside_the_card() {
        let frame = compose(&layout("あい"), GEOMETRY, Background::Transparent);
        assert_eq!(frame.pixels.dimensions(), (1080, 1920));
        assert_eq!(frame.pixels.get_pixel(0, 0).0[3], 0);
        assert_eq!(frame.pixels.get_pixel(1079, 1919).0[3], 0);
        // Card spans x 460..620 and starts at y 288.
        assert_eq!(frame.pixels.get_pixel(461, 289).0, [255, 255, 255, 255]);
        assert_eq!(frame.pixels.get_pixel(459, 289).0[3], 0);
        assert_eq!(frame.pixels.get_pixel(461, 287).0[3], 0);
    }

    #[test]
    fn green_screen_is_fully_opaque() {
        let frame = compose(&layout("あ"), GEOMETRY, Background::Solid(Rgb([0, 255, 0])));
        assert!(frame.pixels.pixels().all(|p| p.0[3] == 255));
        assert_eq!(frame.pixels.get_pixel(5, 5).0, [0, 255, 0, 255]);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let frame = compose(&layout("あ"), GEOMETRY, Background::Checkerboard);
        assert_eq!(frame.pixels.get_pixel(0, 0).0, CHECKER_LIGHT.0);
        assert_eq!(frame.pixels.get_pixel(CHECKER_CELL, 0).0, CHECKER_DARK.0);
        assert_eq!(frame.pixels.get_pixel(CHECKER_CELL, CHECKER_CELL).0, CHECKER_LIGHT.0);
    }

    #[test]
    fn background_does_not_move_glyphs() {
        let l = layout("ちょっと");
        let clear = compose(&l, GEOMETRY, Background::Transparent);
        let green = compose(&l, GEOMETRY, Background::Solid(Rgb([0, 255, 0])));
        let card_left = (1080 - l.card_width) / 2;
        for x in card_left..card_left + l.card_width {
            for y in 288..288 + l.card_height {
                assert_eq!(clear.pixels.get_pixel(x, y), green.pixels.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn overflowing_column_is_cut_at_the_frame_edge() {
        let text: String = std::iter::repeat('あ').take(30).collect();
        let frame = compose(&layout(&text), GEOMETRY, Background::Transparent);
        assert_eq!(frame.pixels.dimensions(), (1080, 1920));
        assert_eq!(frame.pixels.get_pixel(540, 1919).0[3], 255);
    }

    #[test]
    fn opaque_frames_are_saved_without_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let frame = compose(&layout("あ"), FrameGeometry { width: 200, height: 400, card_top: 20 }, Background::Checkerboard);
        frame.save_png(&path).unwrap();
        let loaded = image::open(&path).unwrap();
        assert!(!loaded.color().has_alpha());

        let clear = compose(&layout("あ"), FrameGeometry { width: 200, height: 400, card_top: 20 }, Background::Transparent);
        clear.save_png(&path).unwrap();
        assert!(image::open(&path).unwrap().color().has_alpha());
    }
}
