use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont};
use frame_dream_common::frame::Frame;
use image::Rgb;
use imageproc::drawing::draw_text_mut;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Text renderer over the bundled DejaVu Sans face.
#[derive(Debug, Clone)]
pub struct TextOverlay {
    font: FontRef<'static>,
}

impl TextOverlay {
    pub fn new() -> Result<Self, InvalidFont> {
        Ok(Self {
            font: FontRef::try_from_slice(FONT_DATA)?,
        })
    }

    /// Draw `text` with its baseline at (`x`, `baseline`) and a pixel
    /// height of `size`. Glyph pixels outside the frame are clipped.
    pub fn draw(
        &self,
        frame: &mut Frame,
        text: &str,
        x: u32,
        baseline: u32,
        size: f32,
        color: Rgb<u8>,
    ) {
        let scale = PxScale::from(size);
        // draw_text_mut positions by the top of the line box.
        let ascent = self.font.as_scaled(scale).ascent();
        let top = baseline as f32 - ascent;
        draw_text_mut(frame, color, x as i32, top.round() as i32, scale, &self.font, text);
    }
}
