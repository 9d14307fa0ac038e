//! Peak detection over sampled 1D signals.
//!
//! Peaks are local maxima (flat tops resolve to their midpoint). Each peak
//! carries its prominence and its width measured at half prominence, with
//! the crossing positions linearly interpolated between samples. A minimum
//! width filters out narrow peaks.

/// A detected peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Sample index of the peak.
    pub index: usize,
    /// Height above the higher of the two surrounding bases.
    pub prominence: f64,
    /// Width in samples at half prominence.
    pub width: f64,
    /// Interpolated left crossing position.
    pub left_ip: f64,
    /// Interpolated right crossing position.
    pub right_ip: f64,
}

/// Relative height at which peak widths are measured.
pub const REL_HEIGHT: f64 = 0.5;

/// Indices of local maxima, left to right.
///
/// Samples on the boundary are never maxima. A plateau counts once, at
/// `(left_edge + right_edge) / 2`.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    if x.len() < 3 {
        return out;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                out.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Prominence of the peak at `peak`, with its left and right bases.
///
/// Bases are the minima reached walking outward until a higher sample or
/// the signal end.
pub fn prominence(x: &[f64], peak: usize) -> (f64, usize, usize) {
    let height = x[peak];

    let mut left_base = peak;
    let mut left_min = height;
    let mut i = peak as isize;
    while i >= 0 && x[i as usize] <= height {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_base = peak;
    let mut right_min = height;
    let mut i = peak;
    while i < x.len() && x[i] <= height {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    (height - left_min.max(right_min), left_base, right_base)
}

/// Width of a peak at `rel_height` of its prominence.
///
/// Returns `(width, left_ip, right_ip)`.
pub fn width_at(
    x: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
    rel_height: f64,
) -> (f64, f64, f64) {
    let height = x[peak] - prominence * rel_height;

    let mut i = peak;
    while left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left_ip = i as f64;
    if x[i] < height {
        left_ip += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < right_base && height < x[i] {
        i += 1;
    }
    let mut right_ip = i as f64;
    if x[i] < height {
        right_ip -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    (right_ip - left_ip, left_ip, right_ip)
}

/// Find peaks whose width at half prominence is at least `min_width`.
pub fn find_peaks(x: &[f64], min_width: f64) -> Vec<Peak> {
    local_maxima(x)
        .into_iter()
        .filter_map(|index| {
            let (prom, left_base, right_base) = prominence(x, index);
            let (width, left_ip, right_ip) =
                width_at(x, index, prom, left_base, right_base, REL_HEIGHT);
            (width >= min_width).then_some(Peak {
                index,
                prominence: prom,
                width,
                left_ip,
                right_ip,
            })
        })
        .collect()
}
