//! Burns alarm annotations into captured frames.
//!
//! Text is rendered with `embedded-graphics` mono fonts through a small
//! [`DrawTarget`] adapter over an `image::RgbaImage`.

use embedded_graphics::{
    mono_font::MonoTextStyle,
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    text::Text,
};
use image::{Rgba, RgbaImage};
use profont::PROFONT_24_POINT;
use std::convert::Infallible;

/// Red 24pt overlay text.
pub const OVERLAY_STYLE: MonoTextStyle<'static, Rgb888> =
    MonoTextStyle::new(&PROFONT_24_POINT, Rgb888::RED);

/// Baseline of the `ALERT:` line
pub const ALERT_ORIGIN: Point = Point::new(20, 40);
/// Baseline of the `TIME:` line
pub const TIME_ORIGIN: Point = Point::new(20, 70);

/// Draw target writing straight into an RGBA raster. Off-canvas pixels are dropped.
struct Canvas<'a> {
    image: &'a mut RgbaImage,
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.image.dimensions();
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x < width && y < height {
                self.image
                    .put_pixel(x, y, Rgba([color.r(), color.g(), color.b(), 255]));
            }
        }
        Ok(())
    }
}

/// Stamp `ALERT: <tag>` and `TIME: <time>` in the top-left corner.
pub fn annotate(frame: &mut RgbaImage, tag: &str, time: &str) {
    let mut canvas = Canvas { image: frame };
    let alert = format!("ALERT: {}", tag);
    let stamp = format!("TIME: {}", time);

    // Infallible target.
    let _ = Text::new(&alert, ALERT_ORIGIN, OVERLAY_STYLE).draw(&mut canvas);
    let _ = Text::new(&stamp, TIME_ORIGIN, OVERLAY_STYLE).draw(&mut canvas);
}
