//! Photo normalization ahead of OCR.
//!
//! Classroom photos have uneven lighting and sensor noise. The pipeline here is
//! grayscale → local contrast equalization → optional median filter →
//! binarization, producing a black-on-white image Tesseract reads reliably.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// How the equalized image is turned into black and white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binarization {
    /// One global threshold picked by Otsu's method.
    #[default]
    Otsu,
    /// Per-pixel threshold against a Gaussian-weighted neighbourhood mean.
    AdaptiveGaussian,
    /// Otsu unless the quadrants differ too much in brightness.
    Auto,
}

/// Local contrast equalization settings (CLAHE).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastOptions {
    pub enabled: bool,
    /// Histogram bins are clipped at `clip_limit * tile_area / 256`.
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub tile_grid: u32,
}

impl Default for ContrastOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_limit: 2.0,
            tile_grid: 8,
        }
    }
}

/// Preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    pub contrast: ContrastOptions,
    /// Median filtering. Thin strokes erode when this is too strong.
    pub denoise: bool,
    /// Median filter radius (1 = 3x3 window)
    pub denoise_radius: u32,
    pub binarization: Binarization,
    /// Adaptive threshold neighbourhood radius (5 = 11x11 block)
    pub adaptive_block_radius: u32,
    /// Subtracted from the neighbourhood mean before comparing
    pub adaptive_offset: i16,
    /// Spread of quadrant mean brightness above which `Auto` goes adaptive
    pub uneven_lighting_threshold: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            contrast: ContrastOptions::default(),
            denoise: true,
            denoise_radius: 1,
            binarization: Binarization::Otsu,
            adaptive_block_radius: 5,
            adaptive_offset: 2,
            uneven_lighting_threshold: 40.0,
        }
    }
}

/// A binarized image ready for OCR.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: GrayImage,
    /// Strategy actually applied (never `Auto`)
    pub binarization: Binarization,
    /// Global threshold when Otsu was applied
    pub threshold: Option<u8>,
}

/// Decodes raw photo bytes and normalizes them for OCR.
///
/// Fails with [`Error::InvalidImage`] when the bytes are not a decodable image
/// or the image has a zero dimension.
pub fn preprocess(raw: &[u8], options: &PreprocessOptions) -> Result<NormalizedImage> {
    let decoded = decode_image(raw)?;
    Ok(normalize(&decoded.to_luma8(), options))
}

/// Decodes an image from memory, rejecting empty images.
pub fn decode_image(raw: &[u8]) -> Result<DynamicImage> {
    if raw.is_empty() {
        return Err(Error::InvalidImage("empty input".to_string()));
    }

    let img = image::load_from_memory(raw).map_err(|e| Error::InvalidImage(e.to_string()))?;

    if img.width() == 0 || img.height() == 0 {
        return Err(Error::InvalidImage(format!(
            "zero dimensions ({}x{})",
            img.width(),
            img.height()
        )));
    }

    Ok(img)
}

/// Runs the normalization steps on an already-decoded grayscale image.
pub fn normalize(gray: &GrayImage, options: &PreprocessOptions) -> NormalizedImage {
    // Decide on the raw image; equalization hides the lighting gradient.
    let binarization = match options.binarization {
        Binarization::Auto => {
            let spread = quadrant_brightness_spread(gray);
            if spread > options.uneven_lighting_threshold {
                debug!("Uneven lighting (spread {:.1}), using adaptive threshold", spread);
                Binarization::AdaptiveGaussian
            } else {
                Binarization::Otsu
            }
        }
        other => other,
    };

    let mut working = if options.contrast.enabled {
        equalize_adaptive(gray, options.contrast.clip_limit, options.contrast.tile_grid)
    } else {
        gray.clone()
    };

    if options.denoise && options.denoise_radius > 0 {
        working = median_filter(&working, options.denoise_radius, options.denoise_radius);
    }

    let (image, threshold) = match binarization {
        Binarization::AdaptiveGaussian => (
            threshold_adaptive_gaussian(
                &working,
                options.adaptive_block_radius,
                options.adaptive_offset,
            ),
            None,
        ),
        _ => {
            let level = otsu_level(&working);
            (threshold(&working, level, ThresholdType::Binary), Some(level))
        }
    };

    NormalizedImage {
        image,
        binarization,
        threshold,
    }
}

/// Compares each pixel against its Gaussian-weighted neighbourhood mean minus `offset`.
pub fn threshold_adaptive_gaussian(gray: &GrayImage, block_radius: u32, offset: i16) -> GrayImage {
    let block_size = (2 * block_radius.max(1) + 1) as f32;
    // Same sigma the usual Gaussian-kernel construction derives from the block size
    let sigma = 0.3 * ((block_size - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(gray, sigma);

    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as i32;
        let cutoff = local_mean.get_pixel(x, y)[0] as i32 - offset as i32;
        if value > cutoff {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Difference between the brightest and darkest quadrant means.
pub fn quadrant_brightness_spread(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    if width < 2 || height < 2 {
        return 0.0;
    }

    let (mid_x, mid_y) = (width / 2, height / 2);
    let quadrants = [
        (0, 0, mid_x, mid_y),
        (mid_x, 0, width, mid_y),
        (0, mid_y, mid_x, height),
        (mid_x, mid_y, width, height),
    ];

    let means: Vec<f32> = quadrants
        .iter()
        .map(|&(x0, y0, x1, y1)| {
            let mut sum = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += gray.get_pixel(x, y)[0] as u64;
                }
            }
            let count = ((x1 - x0) * (y1 - y0)).max(1) as f32;
            sum as f32 / count
        })
        .collect();

    let max = means.iter().cloned().fold(f32::MIN, f32::max);
    let min = means.iter().cloned().fold(f32::MAX, f32::min);
    max - min
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tile_grid` x `tile_grid` grid, each tile gets a
/// clipped-histogram lookup table, and every pixel is mapped through a
/// bilinear blend of the four nearest tile tables.
pub fn equalize_adaptive(gray: &GrayImage, clip_limit: f32, tile_grid: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(tile_grid.clamp(1, width));
    let tile_h = height.div_ceil(tile_grid.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w) as usize;
    let tiles_y = height.div_ceil(tile_h) as usize;

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y as u32 {
        for tx in 0..tiles_x as u32 {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(gray, (x0, y0, x1, y1), clip_limit));
        }
    }

    let axis = |pos: u32, tile: u32, tiles: usize| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let lo = (f.floor().max(0.0) as usize).min(tiles - 1);
        let hi = (lo + 1).min(tiles - 1);
        let weight = (f - lo as f32).clamp(0.0, 1.0);
        (lo, hi, weight)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as usize;
        let (x0, x1, ax) = axis(x, tile_w, tiles_x);
        let (y0, y1, ay) = axis(y, tile_h, tiles_y);

        let top = luts[y0 * tiles_x + x0][value] as f32 * (1.0 - ax)
            + luts[y0 * tiles_x + x1][value] as f32 * ax;
        let bottom = luts[y1 * tiles_x + x0][value] as f32 * (1.0 - ax)
            + luts[y1 * tiles_x + x1][value] as f32 * ax;
        let mapped = top * (1.0 - ay) + bottom * ay;

        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(gray: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        let share = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += share;
            if i < remainder {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut cdf = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// White page with a dark block roughly where text would be.
    fn page_with_block(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (10..30).contains(&x) && (10..20).contains(&y) {
                Luma([20])
            } else {
                Luma([230])
            }
        })
    }

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p[0] == 0 || p[0] == 255)
    }

    #[test]
    fn test_preprocess_rejects_garbage() {
        let result = preprocess(b"definitely not an image", &PreprocessOptions::default());
        assert!(matches!(result, Err(Error::InvalidImage(_))));
    }

    #[test]
    fn test_preprocess_rejects_empty_input() {
        let result = preprocess(&[], &PreprocessOptions::default());
        assert!(matches!(result, Err(Error::InvalidImage(_))));
    }

    #[test]
    fn test_preprocess_color_png() {
        let rgb: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(40, 30, |x, _| {
            if x < 20 { Rgb([10, 10, 10]) } else { Rgb([240, 240, 240]) }
        });
        let bytes = encode_png(&DynamicImage::ImageRgb8(rgb));

        let result = preprocess(&bytes, &PreprocessOptions::default()).unwrap();
        assert_eq!(result.image.dimensions(), (40, 30));
        assert_eq!(result.binarization, Binarization::Otsu);
        assert!(result.threshold.is_some());
        assert!(is_binary(&result.image));
    }

    #[test]
    fn test_preprocess_does_not_touch_input() {
        let bytes = encode_png(&DynamicImage::ImageLuma8(page_with_block(40, 30)));
        let copy = bytes.clone();
        preprocess(&bytes, &PreprocessOptions::default()).unwrap();
        assert_eq!(bytes, copy);
    }

    #[test]
    fn test_normalize_keeps_dark_text_black() {
        let page = page_with_block(40, 30);
        let options = PreprocessOptions {
            contrast: ContrastOptions {
                enabled: false,
                ..Default::default()
            },
            denoise: false,
            ..Default::default()
        };

        let result = normalize(&page, &options);
        assert_eq!(result.image.get_pixel(15, 15)[0], 0);
        assert_eq!(result.image.get_pixel(35, 25)[0], 255);
    }

    #[test]
    fn test_denoise_toggle_removes_speck() {
        let mut page = GrayImage::from_pixel(20, 20, Luma([230]));
        page.put_pixel(10, 10, Luma([0]));
        let mut options = PreprocessOptions {
            contrast: ContrastOptions {
                enabled: false,
                ..Default::default()
            },
            binarization: Binarization::AdaptiveGaussian,
            ..Default::default()
        };

        options.denoise = true;
        let cleaned = normalize(&page, &options);
        assert_eq!(cleaned.image.get_pixel(10, 10)[0], 255, "Speck should be filtered");

        options.denoise = false;
        let raw = normalize(&page, &options);
        assert_eq!(raw.image.get_pixel(10, 10)[0], 0, "Speck should survive without denoise");
    }

    #[test]
    fn test_auto_picks_adaptive_for_gradient() {
        // Left half in shadow, right half brightly lit
        let gradient = GrayImage::from_fn(40, 40, |x, _| {
            if x < 20 { Luma([40]) } else { Luma([220]) }
        });
        let options = PreprocessOptions {
            binarization: Binarization::Auto,
            ..Default::default()
        };
        let result = normalize(&gradient, &options);
        assert_eq!(result.binarization, Binarization::AdaptiveGaussian);
        assert!(result.threshold.is_none());
    }

    #[test]
    fn test_auto_picks_otsu_for_even_lighting() {
        let options = PreprocessOptions {
            binarization: Binarization::Auto,
            ..Default::default()
        };
        let result = normalize(&GrayImage::from_pixel(40, 40, Luma([200])), &options);
        assert_eq!(result.binarization, Binarization::Otsu);
    }

    #[test]
    fn test_quadrant_spread() {
        let uniform = GrayImage::from_pixel(10, 10, Luma([128]));
        assert_eq!(quadrant_brightness_spread(&uniform), 0.0);

        let split = GrayImage::from_fn(10, 10, |_, y| if y < 5 { Luma([0]) } else { Luma([100]) });
        assert!((quadrant_brightness_spread(&split) - 100.0).abs() < 0.01);

        let tiny = GrayImage::from_pixel(1, 5, Luma([50]));
        assert_eq!(quadrant_brightness_spread(&tiny), 0.0);
    }

    #[test]
    fn test_otsu_output_is_binary() {
        let gray = GrayImage::from_fn(32, 32, |x, y| Luma([((x + y) * 4) as u8]));
        let options = PreprocessOptions {
            binarization: Binarization::Otsu,
            ..Default::default()
        };

        let result = normalize(&gray, &options);
        assert!(result.threshold.is_some());
        assert!(result.image.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_equalize_adaptive_preserves_dimensions_and_order() {
        let ramp = GrayImage::from_fn(64, 48, |x, _| Luma([(x * 2) as u8 + 60]));
        let result = equalize_adaptive(&ramp, 2.0, 8);
        assert_eq!(result.dimensions(), (64, 48));
        // Equalization is monotonic within a row
        assert!(result.get_pixel(0, 10)[0] <= result.get_pixel(63, 10)[0]);
    }

    #[test]
    fn test_equalize_adaptive_small_image() {
        let img = GrayImage::from_pixel(3, 2, Luma([90]));
        let result = equalize_adaptive(&img, 2.0, 8);
        assert_eq!(result.dimensions(), (3, 2));
    }
}
