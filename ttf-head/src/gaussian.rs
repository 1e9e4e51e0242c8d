//! Truncated anisotropic gaussian splatting.

use crate::common::*;

/// Build a `(2 * h_radius + 1) x (2 * w_radius + 1)` gaussian kernel peaking at 1.
///
/// The standard deviations are a sixth of the kernel height and width. Values
/// smaller than `f64::EPSILON` times the peak are truncated to zero.
pub fn gaussian_2d(h_radius: usize, w_radius: usize) -> Array2<f64> {
    let kernel_h = 2 * h_radius + 1;
    let kernel_w = 2 * w_radius + 1;
    let sigma_y = kernel_h as f64 / 6.0;
    let sigma_x = kernel_w as f64 / 6.0;

    let mut kernel = Array2::from_shape_fn((kernel_h, kernel_w), |(row, col)| {
        let y = row as f64 - h_radius as f64;
        let x = col as f64 - w_radius as f64;
        (-(x * x / (2.0 * sigma_x * sigma_x) + y * y / (2.0 * sigma_y * sigma_y))).exp()
    });

    let max = kernel.fold(0f64, |max, &value| max.max(value));
    let threshold = f64::EPSILON * max;
    kernel.mapv_inplace(|value| if value < threshold { 0.0 } else { value });
    kernel
}

/// Splat a gaussian centered at `(x, y)` onto a `[height, width]` grid.
///
/// The kernel is scaled by `k` and merged by elementwise maximum. Parts of the
/// kernel falling outside the grid are clipped. Returns false if nothing was drawn.
pub fn draw_truncate_gaussian(
    heatmap: &mut ArrayViewMut2<f32>,
    center: [i64; 2],
    h_radius: usize,
    w_radius: usize,
    k: f32,
) -> bool {
    let [x, y] = center;
    let (height, width) = heatmap.dim();

    let (grid_cols, kernel_cols) = match overlap(x, w_radius, width) {
        Some(ranges) => ranges,
        None => return false,
    };
    let (grid_rows, kernel_rows) = match overlap(y, h_radius, height) {
        Some(ranges) => ranges,
        None => return false,
    };

    let kernel = gaussian_2d(h_radius, w_radius);
    Zip::from(heatmap.slice_mut(s![grid_rows, grid_cols]))
        .and(kernel.slice(s![kernel_rows, kernel_cols]))
        .for_each(|value, &gaussian| {
            *value = value.max(gaussian as f32 * k);
        });

    true
}

/// Intersect the kernel span around `center` with `[0, len)`.
///
/// Returns the grid range and the matching kernel range.
fn overlap(center: i64, radius: usize, len: usize) -> Option<(Range<usize>, Range<usize>)> {
    let radius = radius as i64;
    let begin = (center - radius).max(0);
    let end = (center + radius + 1).min(len as i64);
    if begin >= end {
        return None;
    }

    let offset = center - radius;
    let grid = (begin as usize)..(end as usize);
    let kernel = ((begin - offset) as usize)..((end - offset) as usize);
    Some((grid, kernel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gaussian_kernel_shape_and_peak() {
        let kernel = gaussian_2d(2, 3);
        assert_eq!(kernel.dim(), (5, 7));
        assert_abs_diff_eq!(kernel[[2, 3]], 1.0);

        // sigma_x = 7 / 6
        let sigma_x = 7.0 / 6.0;
        let expect = (-1.0 / (2.0 * sigma_x * sigma_x)).exp();
        assert_abs_diff_eq!(kernel[[2, 4]], expect, epsilon = 1e-12);

        let zero_radius = gaussian_2d(0, 0);
        assert_eq!(zero_radius.dim(), (1, 1));
        assert_abs_diff_eq!(zero_radius[[0, 0]], 1.0);
    }

    #[test]
    fn gaussian_kernel_is_symmetric() {
        let kernel = gaussian_2d(4, 6);
        let (h, w) = kernel.dim();
        for row in 0..h {
            for col in 0..w {
                let value = kernel[[row, col]];
                assert_abs_diff_eq!(value, kernel[[h - 1 - row, col]], epsilon = 1e-15);
                assert_abs_diff_eq!(value, kernel[[row, w - 1 - col]], epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn draw_clips_at_boundaries() {
        let mut heatmap = Array2::<f32>::zeros((6, 8));
        let drawn = draw_truncate_gaussian(&mut heatmap.view_mut(), [0, 5], 2, 2, 1.0);
        assert!(drawn);
        assert_abs_diff_eq!(heatmap[[5, 0]], 1.0);

        let kernel = gaussian_2d(2, 2);
        assert_abs_diff_eq!(heatmap[[4, 1]], kernel[[1, 3]] as f32);
        assert_abs_diff_eq!(heatmap[[3, 2]], kernel[[0, 4]] as f32);
        assert_abs_diff_eq!(heatmap[[2, 0]], 0.0);
        assert_abs_diff_eq!(heatmap[[5, 3]], 0.0);
    }

    #[test]
    fn draw_outside_grid_is_noop() {
        let mut heatmap = Array2::<f32>::zeros((4, 4));
        assert!(!draw_truncate_gaussian(&mut heatmap.view_mut(), [4, 1], 0, 0, 1.0));
        assert!(!draw_truncate_gaussian(&mut heatmap.view_mut(), [1, -3], 1, 1, 1.0));
        assert!(heatmap.iter().all(|&value| value == 0.0));

        // partially visible kernels are still drawn
        assert!(draw_truncate_gaussian(&mut heatmap.view_mut(), [5, 1], 1, 2, 1.0));
        assert!(heatmap[[1, 3]] > 0.0);
    }

    #[test]
    fn draw_merges_by_maximum() {
        let mut heatmap = Array2::<f32>::from_elem((5, 5), 0.5);
        draw_truncate_gaussian(&mut heatmap.view_mut(), [2, 2], 1, 1, 0.8);
        assert_abs_diff_eq!(heatmap[[2, 2]], 0.8);
        assert!(heatmap.iter().all(|&value| value >= 0.5));
        assert_abs_diff_eq!(heatmap[[0, 0]], 0.5);
    }
}
