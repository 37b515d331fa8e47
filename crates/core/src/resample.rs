use anyhow::{Result, ensure};
use image::RgbImage;

/// Separable filters with Pillow's semantics (antialiased when downscaling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleFilter {
    #[default]
    Bilinear,
    Bicubic,
}

impl ResampleFilter {
    fn support(self) -> f64 {
        match self {
            Self::Bilinear => 1.0,
            Self::Bicubic => 2.0,
        }
    }

    #[inline]
    fn weight(self, x: f64) -> f64 {
        match self {
            Self::Bilinear => pillow_bilinear_filter(x),
            Self::Bicubic => pillow_bicubic_filter(x),
        }
    }
}

const PILLOW_RESAMPLE_PRECISION_BITS: usize = 22;

#[derive(Debug, Clone)]
struct PillowResampleCoeffs {
    ksize: usize,
    bounds: Vec<(usize, usize)>,
    coeffs: Vec<i32>,
}

#[inline]
fn pillow_bilinear_filter(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 { 1.0 - x } else { 0.0 }
}

#[inline]
fn pillow_bicubic_filter(mut x: f64) -> f64 {
    const A: f64 = -0.5;
    if x < 0.0 {
        x = -x;
    }
    if x < 1.0 {
        return ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0;
    }
    if x < 2.0 {
        return (((x - 5.0) * x + 8.0) * x - 4.0) * A;
    }
    0.0
}

fn precompute_pillow_coeffs(
    filter: ResampleFilter,
    in_size: usize,
    out_size: usize,
) -> PillowResampleCoeffs {
    let scale = in_size as f64 / out_size as f64;
    let filterscale = scale.max(1.0);
    let support = filter.support() * filterscale;
    let ksize = support.ceil() as usize * 2 + 1;

    let scale_int = (1i64 << PILLOW_RESAMPLE_PRECISION_BITS) as f64;
    let mut bounds = Vec::with_capacity(out_size);
    let mut coeffs = vec![0i32; out_size * ksize];

    for xx in 0..out_size {
        let center = (xx as f64 + 0.5) * scale;
        let ss = 1.0 / filterscale;

        let xmin = ((center - support + 0.5).trunc() as isize).max(0);
        let xmax = ((center + support + 0.5).trunc() as isize).min(in_size as isize);

        let count = (xmax - xmin).max(0) as usize;
        let mut norm = 0.0f64;
        let mut row_weights = vec![0.0f64; count];
        for (x, row_weight) in row_weights.iter_mut().enumerate() {
            let weight = filter.weight((x as f64 + xmin as f64 - center + 0.5) * ss);
            *row_weight = weight;
            norm += weight;
        }

        let row = &mut coeffs[xx * ksize..(xx + 1) * ksize];
        for (i, w) in row_weights.into_iter().enumerate() {
            let normalized = if norm != 0.0 { w / norm } else { 0.0 };
            row[i] = if normalized < 0.0 {
                (-0.5 + normalized * scale_int).trunc() as i32
            } else {
                (0.5 + normalized * scale_int).trunc() as i32
            };
        }
        bounds.push((xmin as usize, count));
    }

    PillowResampleCoeffs {
        ksize,
        bounds,
        coeffs,
    }
}

#[inline]
fn clip8(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Resizes an 8-bit RGB image the way Pillow's `Image.resize` does.
pub fn resize_rgb(
    image: &RgbImage,
    width: u32,
    height: u32,
    filter: ResampleFilter,
) -> Result<RgbImage> {
    ensure!(
        width > 0 && height > 0,
        "target dimensions must be positive"
    );
    ensure!(
        image.width() > 0 && image.height() > 0,
        "source image must be non-empty"
    );
    if image.width() == width && image.height() == height {
        return Ok(image.clone());
    }

    let src_w = image.width() as usize;
    let src_h = image.height() as usize;
    let dst_w = width as usize;
    let dst_h = height as usize;
    let src = image.as_raw();

    let horiz = precompute_pillow_coeffs(filter, src_w, dst_w);
    let vert = precompute_pillow_coeffs(filter, src_h, dst_h);

    let rounding = 1i64 << (PILLOW_RESAMPLE_PRECISION_BITS - 1);

    let mut temp = vec![0u8; src_h * dst_w * 3];
    for y in 0..src_h {
        for x in 0..dst_w {
            let (xmin, count) = horiz.bounds[x];
            let k = &horiz.coeffs[x * horiz.ksize..(x + 1) * horiz.ksize];

            let mut acc = [rounding; 3];
            for (tap, &coeff) in k.iter().enumerate().take(count) {
                let coeff = i64::from(coeff);
                let src_idx = (y * src_w + xmin + tap) * 3;
                for (channel, sum) in acc.iter_mut().enumerate() {
                    *sum += i64::from(src[src_idx + channel]) * coeff;
                }
            }

            let dst_idx = (y * dst_w + x) * 3;
            for (channel, sum) in acc.into_iter().enumerate() {
                temp[dst_idx + channel] = clip8(sum >> PILLOW_RESAMPLE_PRECISION_BITS);
            }
        }
    }

    let mut out = vec![0u8; dst_h * dst_w * 3];
    for y in 0..dst_h {
        let (ymin, count) = vert.bounds[y];
        let k = &vert.coeffs[y * vert.ksize..(y + 1) * vert.ksize];

        for x in 0..dst_w {
            let mut acc = [rounding; 3];
            for (tap, &coeff) in k.iter().enumerate().take(count) {
                let coeff = i64::from(coeff);
                let src_idx = ((ymin + tap) * dst_w + x) * 3;
                for (channel, sum) in acc.iter_mut().enumerate() {
                    *sum += i64::from(temp[src_idx + channel]) * coeff;
                }
            }

            let dst_idx = (y * dst_w + x) * 3;
            for (channel, sum) in acc.into_iter().enumerate() {
                out[dst_idx + channel] = clip8(sum >> PILLOW_RESAMPLE_PRECISION_BITS);
            }
        }
    }

    RgbImage::from_raw(width, height, out)
        .ok_or_else(|| anyhow::anyhow!("resized buffer does not match {width}x{height}"))
}

const OPENCV_CUBIC_A: f32 = -0.75;

#[inline]
fn opencv_cubic_coeffs(x: f32) -> [f32; 4] {
    const A: f32 = OPENCV_CUBIC_A;
    let w0 = ((A * (x + 1.0) - 5.0 * A) * (x + 1.0) + 8.0 * A) * (x + 1.0) - 4.0 * A;
    let w1 = ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0;
    let w2 = ((A + 2.0) * (1.0 - x) - (A + 3.0)) * (1.0 - x) * (1.0 - x) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Per output index: first source tap (may be negative) and its four weights.
fn cubic_taps(in_size: usize, out_size: usize) -> Vec<(isize, [f32; 4])> {
    let scale = in_size as f64 / out_size as f64;
    (0..out_size)
        .map(|dst| {
            let f = (dst as f64 + 0.5) * scale - 0.5;
            let base = f.floor();
            let frac = (f - base) as f32;
            (base as isize - 1, opencv_cubic_coeffs(frac))
        })
        .collect()
}

#[inline]
fn clamp_index(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}

/// Bicubic resize of a single-channel float grid with OpenCV's `INTER_CUBIC`
/// conventions (half-pixel centres, `a = -0.75`, replicated borders).
pub fn resize_cubic_f32(
    src: &[f32],
    src_h: usize,
    src_w: usize,
    dst_h: usize,
    dst_w: usize,
) -> Result<Vec<f32>> {
    ensure!(
        src_h > 0 && src_w > 0 && dst_h > 0 && dst_w > 0,
        "resize dimensions must be positive ({src_h}x{src_w} -> {dst_h}x{dst_w})"
    );
    ensure!(
        src.len() == src_h * src_w,
        "source grid has {} values, expected {}",
        src.len(),
        src_h * src_w
    );
    if src_h == dst_h && src_w == dst_w {
        return Ok(src.to_vec());
    }

    let horiz = cubic_taps(src_w, dst_w);
    let vert = cubic_taps(src_h, dst_h);

    let mut temp = vec![0f32; src_h * dst_w];
    for y in 0..src_h {
        let row = &src[y * src_w..(y + 1) * src_w];
        for (x, (start, weights)) in horiz.iter().enumerate() {
            temp[y * dst_w + x] = weights
                .iter()
                .enumerate()
                .map(|(tap, w)| w * row[clamp_index(start + tap as isize, src_w)])
                .sum();
        }
    }

    let mut out = vec![0f32; dst_h * dst_w];
    for (y, (start, weights)) in vert.iter().enumerate() {
        for x in 0..dst_w {
            out[y * dst_w + x] = weights
                .iter()
                .enumerate()
                .map(|(tap, w)| w * temp[clamp_index(start + tap as isize, src_h) * dst_w + x])
                .sum();
        }
    }
    Ok(out)
}
