use frame_dream_common::config::PreviewConfig;
use frame_dream_common::frame::Frame;
use image::imageops::{self, FilterType};
use image::Rgb;
use ab_glyph::InvalidFont;
use std::borrow::Cow;

use crate::overlay::TextOverlay;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_ORIGIN: (u32, u32) = (10, 30);
const TEXT_SIZE: f32 = 32.0;

/// Builds the preview image from the live frame, the last snapshot and
/// the last remote result. Holds only rendering options and the font;
/// `render` is pure.
#[derive(Debug, Clone)]
pub struct Compositor {
    onionskin: bool,
    countdown: bool,
    text: TextOverlay,
}

impl Compositor {
    pub fn new(onionskin: bool, countdown: bool) -> Result<Self, InvalidFont> {
        Ok(Self {
            onionskin,
            countdown,
            text: TextOverlay::new()?,
        })
    }

    pub fn from_config(config: &PreviewConfig) -> Result<Self, InvalidFont> {
        Self::new(config.onionskin, config.countdown)
    }

    /// Left half: live feed (onion-skinned with the snapshot when enabled)
    /// plus the countdown. Right half, once a result exists: the result
    /// resized to the left half's height.
    pub fn render(
        &self,
        live: &Frame,
        snapshot: Option<&Frame>,
        result: Option<&Frame>,
        seconds_remaining: u64,
    ) -> Frame {
        let mut left = match snapshot {
            Some(snapshot) if self.onionskin => blend_half(live, snapshot),
            _ => live.clone(),
        };

        if self.countdown {
            let text = format!("Next capture in: {seconds_remaining}s");
            self.text.draw(
                &mut left,
                &text,
                TEXT_ORIGIN.0,
                TEXT_ORIGIN.1,
                TEXT_SIZE,
                TEXT_COLOR,
            );
        }

        match result {
            Some(result) => side_by_side(&left, &match_height(result, &left)),
            None => left,
        }
    }
}

/// Per-pixel `0.5 * live + 0.5 * snapshot`, rounded; the snapshot is
/// first resized to the live frame's dimensions if they differ.
pub fn blend_half(live: &Frame, snapshot: &Frame) -> Frame {
    let snapshot = resize_to(snapshot, live.width(), live.height());
    let mut out = live.clone();
    for (dst, src) in out.pixels_mut().zip(snapshot.pixels()) {
        for (d, s) in dst.0.iter_mut().zip(src.0) {
            *d = ((u16::from(*d) + u16::from(s) + 1) / 2) as u8;
        }
    }
    out
}

/// A result whose height differs from `left` is stretched to exactly
/// `left`'s width and height; a result of equal height is used as is.
pub fn match_height<'a>(result: &'a Frame, left: &Frame) -> Cow<'a, Frame> {
    if result.height() == left.height() {
        Cow::Borrowed(result)
    } else {
        resize_to(result, left.width(), left.height())
    }
}

/// Concatenate two frames of equal height horizontally.
pub fn side_by_side(left: &Frame, right: &Frame) -> Frame {
    debug_assert_eq!(left.height(), right.height());
    let mut out = Frame::new(left.width() + right.width(), left.height());
    imageops::replace(&mut out, left, 0, 0);
    imageops::replace(&mut out, right, i64::from(left.width()), 0);
    out
}

fn resize_to(frame: &Frame, width: u32, height: u32) -> Cow<'_, Frame> {
    if frame.dimensions() == (width, height) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(imageops::resize(frame, width, height, FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid;

    #[test]
    fn live_only_without_overlays() {
        let live = solid(32, 24, [10, 20, 30]);
        let out = Compositor::new(false, false).unwrap().render(&live, None, None, 7);
        assert_eq!(out, live);
    }

    #[test]
    fn snapshot_ignored_unless_onionskin() {
        let live = solid(32, 24, [10, 20, 30]);
        let snap = solid(32, 24, [200, 200, 200]);
        let out = Compositor::new(false, false).unwrap().render(&live, Some(&snap), None, 7);
        assert_eq!(out, live);
    }

    #[test]
    fn onionskin_blends_half_and_half() {
        let live = solid(32, 24, [100, 0, 255]);
        let snap = solid(32, 24, [200, 50, 0]);
        let out = Compositor::new(true, false).unwrap().render(&live, Some(&snap), None, 7);
        assert_eq!(out.dimensions(), (32, 24));
        assert_eq!(out.get_pixel(5, 5), &Rgb([150, 25, 128]));
    }

    #[test]
    fn onionskin_resizes_mismatched_snapshot() {
        let live = solid(32, 24, [0, 0, 0]);
        let snap = solid(64, 48, [200, 200, 200]);
        let out = blend_half(&live, &snap);
        assert_eq!(out.dimensions(), (32, 24));
        assert_eq!(out.get_pixel(16, 12), &Rgb([100, 100, 100]));
    }

    #[test]
    fn mismatched_result_height_is_forced_to_left_size() {
        let live = solid(40, 30, [0, 0, 0]);
        let result = solid(64, 64, [255, 0, 0]);
        let out = Compositor::new(false, false).unwrap().render(&live, None, Some(&result), 0);
        assert_eq!(out.dimensions(), (40 + 40, 30));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(60, 15), &Rgb([255, 0, 0]));
    }

    #[test]
    fn equal_height_result_keeps_its_width() {
        let live = solid(40, 30, [0, 0, 0]);
        let result = solid(25, 30, [0, 255, 0]);
        let out = Compositor::new(false, false).unwrap().render(&live, None, Some(&result), 0);
        assert_eq!(out.dimensions(), (65, 30));
        assert_eq!(out.get_pixel(64, 29), &Rgb([0, 255, 0]));
    }

    #[test]
    fn countdown_only_touches_left_half() {
        let live = solid(600, 60, [0, 0, 0]);
        let result = solid(600, 60, [0, 0, 0]);
        let out = Compositor::new(false, true)
            .unwrap()
            .render(&live, None, Some(&result), 9);
        let inked: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != Rgb([0, 0, 0]))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!inked.is_empty());
        assert!(inked.iter().all(|&(x, _)| (10..600).contains(&x)));
        // Line box around the y=30 baseline, descender of 'p' included.
        assert!(inked.iter().all(|&(_, y)| y < 40));
    }

    #[test]
    fn countdown_text_changes_with_seconds() {
        let live = solid(600, 60, [0, 0, 0]);
        let c = Compositor::new(false, true).unwrap();
        assert_ne!(c.render(&live, None, None, 9), c.render(&live, None, None, 4));
    }

    #[test]
    fn render_is_deterministic() {
        let live = solid(50, 40, [12, 34, 56]);
        let snap = solid(50, 40, [98, 76, 54]);
        let result = solid(20, 20, [1, 2, 3]);
        let c = Compositor::new(true, true).unwrap();
        assert_eq!(
            c.render(&live, Some(&snap), Some(&result), 3),
            c.render(&live, Some(&snap), Some(&result), 3)
        );
    }
}
