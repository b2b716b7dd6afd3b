use image::GrayImage;

use super::{Alternative, BubbleCoordinate};

pub(crate) const DEFAULT_WINDOW_HALF_SIZE: u32 = 5;
const DEFAULT_BLACK_LUMA_THRESHOLD: u8 = 128;

/// Thresholded scan. A pixel counts as ink when its luma is below the threshold.
#[derive(Debug, Clone)]
pub(crate) struct BinaryRaster {
    pixels: GrayImage,
    black_below: u8,
}

impl BinaryRaster {
    pub(crate) fn new(pixels: GrayImage) -> Self {
        Self::with_threshold(pixels, DEFAULT_BLACK_LUMA_THRESHOLD)
    }

    pub(crate) fn with_threshold(pixels: GrayImage, black_below: u8) -> Self {
        Self { pixels, black_below }
    }

    /// Decodes an encoded PNG/JPEG scan and converts it to luma.
    pub(crate) fn decode(bytes: &[u8], black_below: u8) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::with_threshold(decoded.to_luma8(), black_below))
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[cfg(test)]
    pub(crate) fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    fn is_black(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y)[0] < self.black_below
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawMark {
    pub(crate) question_id: String,
    pub(crate) question_number: u32,
    pub(crate) alternative: Alternative,
    pub(crate) darkness_ratio: f64,
    pub(crate) out_of_bounds: bool,
}

/// Fraction of ink pixels in the square window around one bubble.
///
/// The window is clipped to the image. A window that misses the image entirely
/// yields ratio 0 with `out_of_bounds` set.
pub(crate) fn sample_mark(
    raster: &BinaryRaster,
    coordinate: &BubbleCoordinate,
    half_size: u32,
) -> RawMark {
    let mut mark = RawMark {
        question_id: coordinate.question_id.clone(),
        question_number: coordinate.question_number,
        alternative: coordinate.alternative,
        darkness_ratio: 0.0,
        out_of_bounds: true,
    };

    let Some((x0, x1, y0, y1)) = clipped_window(raster.dimensions(), coordinate, half_size) else {
        return mark;
    };

    let mut black = 0u64;
    let mut sampled = 0u64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            sampled += 1;
            if raster.is_black(x, y) {
                black += 1;
            }
        }
    }

    mark.darkness_ratio = black as f64 / sampled as f64;
    mark.out_of_bounds = false;
    mark
}

fn clipped_window(
    (width, height): (u32, u32),
    coordinate: &BubbleCoordinate,
    half_size: u32,
) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 || !coordinate.x.is_finite() || !coordinate.y.is_finite() {
        return None;
    }

    let half = i64::from(half_size);
    let cx = coordinate.x.round() as i64;
    let cy = coordinate.y.round() as i64;

    let x0 = cx.saturating_sub(half).max(0);
    let x1 = cx.saturating_add(half).min(i64::from(width) - 1);
    let y0 = cy.saturating_sub(half).max(0);
    let y1 = cy.saturating_add(half).min(i64::from(height) - 1);

    if x0 > x1 || y0 > y1 {
        return None;
    }

    Some((x0 as u32, x1 as u32, y0 as u32, y1 as u32))
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn coordinate(x: f64, y: f64) -> BubbleCoordinate {
        BubbleCoordinate {
            question_id: "Q1".to_string(),
            question_number: 1,
            alternative: Alternative::parse("A").expect("letter"),
            x,
            y,
        }
    }

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    #[test]
    fn fully_inked_window_has_ratio_one() {
        let mut pixels = white(40, 40);
        for y in 5..=15 {
            for x in 5..=15 {
                pixels.put_pixel(x, y, Luma([0]));
            }
        }
        let raster = BinaryRaster::new(pixels);

        let mark = sample_mark(&raster, &coordinate(10.0, 10.0), 5);

        assert_eq!(mark.darkness_ratio, 1.0);
        assert!(!mark.out_of_bounds);
    }

    #[test]
    fn half_inked_window_reports_fraction() {
        let mut pixels = white(20, 20);
        // Columns 5..=9 black, 10..=15 white inside an 11x11 window centred at x=10.
        for y in 0..20 {
            for x in 0..10 {
                pixels.put_pixel(x, y, Luma([10]));
            }
        }
        let raster = BinaryRaster::new(pixels);

        let mark = sample_mark(&raster, &coordinate(10.0, 10.0), 5);

        assert!((mark.darkness_ratio - 5.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn window_is_clipped_at_the_border() {
        let mut pixels = white(10, 10);
        pixels.put_pixel(0, 0, Luma([0]));
        let raster = BinaryRaster::new(pixels);

        // Centre on the corner: only the 6x6 in-image quadrant is sampled.
        let mark = sample_mark(&raster, &coordinate(0.0, 0.0), 5);

        assert!(!mark.out_of_bounds);
        assert!((mark.darkness_ratio - 1.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn window_outside_image_degrades_to_zero() {
        let raster = BinaryRaster::new(white(10, 10));

        let far_away = [(1e19, 5.0), (5.0, -1e19), (f64::MAX, f64::MIN)];
        let cases = [(100.0, 5.0), (5.0, -40.0), (f64::NAN, 5.0), (-6.0, -6.0)];
        for (x, y) in cases.into_iter().chain(far_away) {
            let mark = sample_mark(&raster, &coordinate(x, y), 5);
            assert!(mark.out_of_bounds, "expected out of bounds at ({x}, {y})");
            assert_eq!(mark.darkness_ratio, 0.0);
        }
    }

    #[test]
    fn luma_threshold_decides_ink() {
        let raster = BinaryRaster::with_threshold(GrayImage::from_pixel(5, 5, Luma([100])), 90);
        let mark = sample_mark(&raster, &coordinate(2.0, 2.0), 1);
        assert_eq!(mark.darkness_ratio, 0.0);

        let raster = BinaryRaster::with_threshold(GrayImage::from_pixel(5, 5, Luma([100])), 128);
        let mark = sample_mark(&raster, &coordinate(2.0, 2.0), 1);
        assert_eq!(mark.darkness_ratio, 1.0);
    }
}
