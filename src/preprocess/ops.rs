use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::{contrast::otsu_level, filter::gaussian_blur_f32, filter::median_filter};

use crate::error::OcrError;

/// PIL's `ImageFilter.SHARPEN` kernel.
const SHARPEN_KERNEL: [f32; 9] = [
    -2.0 / 16.0, -2.0 / 16.0, -2.0 / 16.0,
    -2.0 / 16.0, 32.0 / 16.0, -2.0 / 16.0,
    -2.0 / 16.0, -2.0 / 16.0, -2.0 / 16.0,
];

const FIXED_LEVEL: u8 = 127;

/// Largest raster `resize` will produce (about 10k × 10k).
const MAX_PIXELS: u64 = 100_000_000;

/// Coerce any decoded raster to the two layouts the steps understand:
/// 8-bit luma (one plane) or 8-bit RGB (three planes). Alpha is dropped.
pub(crate) fn normalize(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

pub(crate) fn grayscale(img: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(img.to_luma8())
}

/// OpenCV's sigma for a Gaussian kernel of size `k` when none is given.
fn kernel_sigma(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn check_odd(step: &str, what: &str, k: u32, min: u32) -> Result<(), OcrError> {
    if k < min || k % 2 == 0 {
        return Err(OcrError::step(
            step,
            format!("{what} must be odd and >= {min}, got {k}"),
        ));
    }
    Ok(())
}

pub(crate) fn blur(img: &DynamicImage, kernel_size: u32) -> Result<DynamicImage, OcrError> {
    check_odd("blur", "kernel size", kernel_size, 1)?;
    if kernel_size == 1 {
        return Ok(img.clone());
    }
    let sigma = kernel_sigma(kernel_size);
    Ok(match img {
        DynamicImage::ImageLuma8(g) => DynamicImage::ImageLuma8(gaussian_blur_f32(g, sigma)),
        other => DynamicImage::ImageRgb8(gaussian_blur_f32(&other.to_rgb8(), sigma)),
    })
}

/// 3×3 median per channel.
pub(crate) fn denoise(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(g) => DynamicImage::ImageLuma8(median_filter(g, 1, 1)),
        other => DynamicImage::ImageRgb8(median_filter(&other.to_rgb8(), 1, 1)),
    }
}

/// Mean luminance rounded to the nearest level, as PIL's contrast enhancer does.
fn mean_luma(img: &DynamicImage) -> f32 {
    let gray = img.to_luma8();
    let n = (gray.width() as u64 * gray.height() as u64).max(1);
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    (sum as f64 / n as f64 + 0.5).floor() as f32
}

pub(crate) fn contrast(img: &DynamicImage, factor: f32) -> Result<DynamicImage, OcrError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(OcrError::step(
            "contrast",
            format!("factor must be a finite non-negative number, got {factor}"),
        ));
    }
    let mean = mean_luma(img);
    let stretch = |v: u8| -> u8 { (mean + factor * (v as f32 - mean)).round().clamp(0.0, 255.0) as u8 };

    Ok(match img {
        DynamicImage::ImageLuma8(g) => {
            let mut out = g.clone();
            for p in out.pixels_mut() {
                p[0] = stretch(p[0]);
            }
            DynamicImage::ImageLuma8(out)
        }
        other => {
            let mut out = other.to_rgb8();
            for p in out.pixels_mut() {
                for c in p.0.iter_mut() {
                    *c = stretch(*c);
                }
            }
            DynamicImage::ImageRgb8(out)
        }
    })
}

pub(crate) fn sharpen(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) => img.filter3x3(&SHARPEN_KERNEL),
        other => DynamicImage::ImageRgb8(other.to_rgb8()).filter3x3(&SHARPEN_KERNEL),
    }
}

pub(crate) fn resize(img: &DynamicImage, scale_factor: f32) -> Result<DynamicImage, OcrError> {
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        return Err(OcrError::step(
            "resize",
            format!("scale factor must be positive, got {scale_factor}"),
        ));
    }
    let (w, h) = img.dimensions();
    let nw = (w as f64 * scale_factor as f64).floor();
    let nh = (h as f64 * scale_factor as f64).floor();
    if nw < 1.0 || nh < 1.0 {
        return Err(OcrError::step(
            "resize",
            format!("scaling {w}x{h} by {scale_factor} yields an empty image"),
        ));
    }
    if nw > u32::MAX as f64 || nh > u32::MAX as f64 || nw * nh > MAX_PIXELS as f64 {
        return Err(OcrError::step(
            "resize",
            format!("scaling {w}x{h} by {scale_factor} exceeds {MAX_PIXELS} pixels"),
        ));
    }
    Ok(img.resize_exact(nw as u32, nh as u32, FilterType::CatmullRom))
}

fn binarize(gray: &GrayImage, keep: impl Fn(u32, u32, u8) -> bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Luma([if keep(x, y, v) { 255 } else { 0 }])
    })
}

pub(crate) fn threshold_fixed(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    DynamicImage::ImageLuma8(binarize(&gray, |_, _, v| v > FIXED_LEVEL))
}

pub(crate) fn threshold_otsu(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    let level = otsu_level(&gray);
    DynamicImage::ImageLuma8(binarize(&gray, |_, _, v| v > level))
}

/// Gaussian-weighted local threshold: a pixel is white when it is brighter
/// than its neighbourhood mean minus `c`.
pub(crate) fn threshold_adaptive(
    img: &DynamicImage,
    block_size: u32,
    c: i32,
) -> Result<DynamicImage, OcrError> {
    check_odd("threshold", "block size", block_size, 3)?;
    let gray = img.to_luma8();
    let local = gaussian_blur_f32(&gray, kernel_sigma(block_size));
    Ok(DynamicImage::ImageLuma8(binarize(&gray, |x, y, v| {
        v as i32 > local.get_pixel(x, y)[0] as i32 - c
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, RgbaImage};

    fn split_rgb(w: u32, h: u32) -> DynamicImage {
        // left half dark, right half bright
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 { Rgb([30, 40, 50]) } else { Rgb([220, 210, 200]) }
        }))
    }

    fn is_binary(img: &DynamicImage) -> bool {
        img.to_luma8().pixels().all(|p| p[0] == 0 || p[0] == 255)
    }

    #[test]
    fn normalize_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        assert!(matches!(normalize(&rgba), DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn grayscale_is_single_plane() {
        let out = grayscale(&split_rgb(8, 8));
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn blur_rejects_even_kernels() {
        let img = split_rgb(8, 8);
        assert!(blur(&img, 4).is_err());
        assert!(blur(&img, 0).is_err());
        assert!(blur(&img, 3).is_ok());
    }

    #[test]
    fn contrast_of_one_is_identity() {
        let img = grayscale(&split_rgb(10, 4));
        let out = contrast(&img, 1.0).unwrap();
        assert_eq!(out.to_luma8(), img.to_luma8());
    }

    #[test]
    fn contrast_pushes_values_away_from_mean() {
        let img = grayscale(&split_rgb(10, 4));
        let before = img.to_luma8();
        let after = contrast(&img, 2.0).unwrap().to_luma8();
        assert!(after.get_pixel(0, 0)[0] < before.get_pixel(0, 0)[0]);
        assert!(after.get_pixel(9, 0)[0] > before.get_pixel(9, 0)[0]);
    }

    #[test]
    fn contrast_rejects_negative_factor() {
        assert!(contrast(&split_rgb(4, 4), -1.0).is_err());
    }

    #[test]
    fn resize_scales_dimensions() {
        let out = resize(&split_rgb(10, 6), 2.0).unwrap();
        assert_eq!(out.dimensions(), (20, 12));
        assert!(resize(&split_rgb(10, 6), 0.0).is_err());
        assert!(resize(&split_rgb(10, 6), 0.01).is_err());
    }

    #[test]
    fn resize_rejects_oversized_output() {
        let img = split_rgb(20, 12);
        assert!(resize(&img, 100_000.0).is_err());
        assert!(resize(&img, f32::MAX).is_err());
        assert!(resize(&split_rgb(1, 1), 10_001.0).is_err());
    }

    #[test]
    fn thresholds_are_binary_single_plane() {
        let img = split_rgb(16, 16);
        for out in [
            threshold_fixed(&img),
            threshold_otsu(&img),
            threshold_adaptive(&img, 11, 2).unwrap(),
        ] {
            assert!(matches!(out, DynamicImage::ImageLuma8(_)));
            assert!(is_binary(&out));
        }
    }

    #[test]
    fn otsu_separates_two_levels() {
        let out = threshold_otsu(&split_rgb(16, 4)).to_luma8();
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(15, 0)[0], 255);
    }

    #[test]
    fn adaptive_rejects_small_blocks() {
        assert!(threshold_adaptive(&split_rgb(8, 8), 1, 2).is_err());
        assert!(threshold_adaptive(&split_rgb(8, 8), 10, 2).is_err());
    }

    #[test]
    fn sharpen_keeps_layout() {
        let g = grayscale(&split_rgb(8, 8));
        assert!(matches!(sharpen(&g), DynamicImage::ImageLuma8(_)));
        assert!(matches!(sharpen(&split_rgb(8, 8)), DynamicImage::ImageRgb8(_)));
    }
}
