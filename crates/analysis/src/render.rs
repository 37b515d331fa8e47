use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::{ImageFormat, Rgb, Rgb32FImage, RgbImage, imageops};
use ppnet_align_config::RenderSettings;
use ppnet_align_core::{ActivationMap, BoundingBox, find_high_activation_crop};

/// Control points of the 64-step JET map, per channel.
fn jet_control(index: usize) -> [f32; 3] {
    // Piecewise ramp of 47 samples, shifted per channel.
    let ramp = |i: isize| -> f32 {
        match i {
            0..=15 => (i + 1) as f32 / 16.0,
            16..=30 => 1.0,
            31..=46 => (47 - i) as f32 / 16.0,
            _ => 0.0,
        }
    };
    let i = index as isize;
    [ramp(i - 24), ramp(i - 8), ramp(i + 8)]
}

/// RGB colour of the JET colour map for an 8-bit intensity.
pub fn jet_color(value: u8) -> [u8; 3] {
    let position = value as f32 / 255.0 * 63.0;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(63);
    let frac = position - lower as f32;
    let (a, b) = (jet_control(lower), jet_control(upper));
    let mut rgb = [0u8; 3];
    for channel in 0..3 {
        let v = a[channel] + (b[channel] - a[channel]) * frac;
        rgb[channel] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    rgb
}

/// Quantises a float image to 8 bits by clamping to `[0, 1]` and truncating.
pub fn to_rgb8(image: &Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb(px) = *image.get_pixel(x, y);
        Rgb(px.map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8))
    })
}

pub fn save_rgb8(path: &Path, image: &RgbImage) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn save_rgb32f(path: &Path, image: &Rgb32FImage) -> Result<()> {
    save_rgb8(path, &to_rgb8(image))
}

/// Decodes `src` and writes it back out as PNG.
pub fn copy_as_png(src: &Path, dst: &Path) -> Result<()> {
    let image = image::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    image
        .save_with_format(dst, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", dst.display()))
}

/// Draws a rectangle outline through `(w_start, h_start)` and
/// `(w_end - 1, h_end - 1)`, clipped to the image.
pub fn draw_bbox(image: &mut RgbImage, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
    if bbox.is_empty() || thickness == 0 {
        return;
    }
    let (width, height) = (image.width() as i64, image.height() as i64);
    let before = thickness as i64 / 2;
    let after = (thickness as i64 - 1) / 2;
    let (top, bottom) = (bbox.h_start as i64, bbox.h_end as i64 - 1);
    let (left, right) = (bbox.w_start as i64, bbox.w_end as i64 - 1);

    let mut paint = |x: i64, y: i64| {
        if (0..width).contains(&x) && (0..height).contains(&y) {
            image.put_pixel(x as u32, y as u32, Rgb(color));
        }
    };
    for offset in -before..=after {
        for x in left - before..=right + after {
            paint(x, top + offset);
            paint(x, bottom + offset);
        }
        for y in top - before..=bottom + after {
            paint(left + offset, y);
            paint(right + offset, y);
        }
    }
}

/// Sub-image covered by `bbox`, clipped to the image bounds.
pub fn crop(image: &Rgb32FImage, bbox: &BoundingBox) -> Result<Rgb32FImage> {
    let clipped = bbox.clamp_to(image.height() as usize, image.width() as usize);
    ensure!(!clipped.is_empty(), "crop {bbox} lies outside the image");
    Ok(imageops::crop_imm(
        image,
        clipped.w_start as u32,
        clipped.h_start as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    )
    .to_image())
}

/// Colour-maps `activation` and blends it over `image`.
pub fn heatmap_overlay(
    image: &Rgb32FImage,
    activation: &ActivationMap,
    settings: &RenderSettings,
) -> Result<Rgb32FImage> {
    ensure!(
        activation.height() == image.height() as usize
            && activation.width() == image.width() as usize,
        "activation map {}x{} does not match image {}x{}",
        activation.height(),
        activation.width(),
        image.height(),
        image.width()
    );
    let normalized = activation.normalized();
    Ok(Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
        let level = (normalized.get(y as usize, x as usize) * 255.0) as u8;
        let heat = jet_color(level);
        let Rgb(px) = *image.get_pixel(x, y);
        let mut out = [0f32; 3];
        for channel in 0..3 {
            out[channel] = settings.image_weight * px[channel]
                + settings.heatmap_weight * heat[channel] as f32 / 255.0;
        }
        Rgb(out)
    }))
}

/// Writes the stored prototype images for one prototype into `dir`.
pub fn save_prototype_images(
    patch: &Path,
    original: &Path,
    self_activation: &Path,
    bbox: &BoundingBox,
    settings: &RenderSettings,
    dir: &Path,
) -> Result<()> {
    copy_as_png(patch, &dir.join("prototype_patch.png"))?;

    let mut source = image::open(original)
        .with_context(|| format!("failed to open {}", original.display()))?
        .to_rgb8();
    draw_bbox(&mut source, bbox, settings.bbox_color, settings.bbox_thickness);
    save_rgb8(&dir.join("prototype_bbox.png"), &source)?;

    copy_as_png(self_activation, &dir.join("prototype_activation.png"))
}

/// Writes `target_patch.png`, `target_bbox.png` and the heatmap overlay
/// (`overlay_name`) for an upsampled activation map. Returns the crop.
pub fn save_target_images(
    image: &Rgb32FImage,
    activation: &ActivationMap,
    percentile: f32,
    settings: &RenderSettings,
    dir: &Path,
    overlay_name: &str,
) -> Result<BoundingBox> {
    let bbox = find_high_activation_crop(activation, percentile);
    save_rgb32f(&dir.join("target_patch.png"), &crop(image, &bbox)?)?;

    let mut boxed = to_rgb8(image);
    draw_bbox(&mut boxed, &bbox, settings.bbox_color, settings.bbox_thickness);
    save_rgb8(&dir.join("target_bbox.png"), &boxed)?;

    let overlay = heatmap_overlay(image, activation, settings)?;
    save_rgb32f(&dir.join(overlay_name), &overlay)?;
    Ok(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jet_endpoints() {
        assert_eq!(jet_color(0), [0, 0, 143]);
        assert_eq!(jet_color(255), [128, 0, 0]);
        let mid = jet_color(128);
        assert!(mid[1] > 200, "{mid:?}");
    }

    #[test]
    fn quantisation_truncates() {
        let image = Rgb32FImage::from_pixel(1, 1, Rgb([0.999, 1.5, -0.2]));
        assert_eq!(to_rgb8(&image).get_pixel(0, 0).0, [254, 255, 0]);
    }

    #[test]
    fn bbox_outline_is_clipped() {
        let mut image = RgbImage::new(8, 8);
        draw_bbox(&mut image, &BoundingBox::new(0, 8, 0, 8), [255, 255, 0], 2);
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 0]);
        assert_eq!(image.get_pixel(7, 7).0, [255, 255, 0]);
        assert_eq!(image.get_pixel(6, 6).0, [255, 255, 0]);
        assert_eq!(image.get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn overlay_weights_image_and_heat() {
        let image = Rgb32FImage::from_pixel(2, 1, Rgb([1.0, 1.0, 1.0]));
        let map = ActivationMap::new(1, 2, vec![0.0, 1.0]).unwrap();
        let overlay = heatmap_overlay(&image, &map, &RenderSettings::default()).unwrap();
        let cold = overlay.get_pixel(0, 0).0;
        let hot = overlay.get_pixel(1, 0).0;
        assert!((cold[0] - 0.5).abs() < 1e-6);
        assert!((cold[2] - (0.5 + 0.3 * 143.0 / 255.0)).abs() < 1e-5);
        assert!((hot[0] - (0.5 + 0.3 * 128.0 / 255.0)).abs() < 1e-5);
    }
}
