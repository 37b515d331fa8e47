use std::fmt;

use crate::map::ActivationMap;

pub const DEFAULT_CROP_PERCENTILE: f32 = 95.0;

/// Half-open pixel rectangle `[h_start, h_end) x [w_start, w_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub h_start: usize,
    pub h_end: usize,
    pub w_start: usize,
    pub w_end: usize,
}

impl BoundingBox {
    pub fn new(h_start: usize, h_end: usize, w_start: usize, w_end: usize) -> Self {
        Self {
            h_start,
            h_end,
            w_start,
            w_end,
        }
    }

    pub fn height(&self) -> usize {
        self.h_end.saturating_sub(self.h_start)
    }

    pub fn width(&self) -> usize {
        self.w_end.saturating_sub(self.w_start)
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    /// Clips the box to an image of `height x width`.
    pub fn clamp_to(&self, height: usize, width: usize) -> Self {
        let h_end = self.h_end.min(height);
        let w_end = self.w_end.min(width);
        Self {
            h_start: self.h_start.min(h_end),
            h_end,
            w_start: self.w_start.min(w_end),
            w_end,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "h[{}..{}) w[{}..{})",
            self.h_start, self.h_end, self.w_start, self.w_end
        )
    }
}

/// Linearly interpolated percentile of `values` (`q` in `[0, 100]`).
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let rank = (q.clamp(0.0, 100.0) as f64 / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Tightest box around every cell at or above the `q`-th percentile.
pub fn find_high_activation_crop(map: &ActivationMap, q: f32) -> BoundingBox {
    let threshold = percentile(map.values(), q);
    let (height, width) = (map.height(), map.width());
    let hot = |row: usize, col: usize| map.get(row, col) >= threshold;

    let row_hot = |row: usize| (0..width).any(|col| hot(row, col));
    let col_hot = |col: usize| (0..height).any(|row| hot(row, col));

    let lower_y = (0..height).find(|&row| row_hot(row)).unwrap_or(0);
    let upper_y = (0..height).rev().find(|&row| row_hot(row)).unwrap_or(0);
    let lower_x = (0..width).find(|&col| col_hot(col)).unwrap_or(0);
    let upper_x = (0..width).rev().find(|&col| col_hot(col)).unwrap_or(0);

    BoundingBox::new(lower_y, upper_y + 1, lower_x, upper_x + 1)
}
