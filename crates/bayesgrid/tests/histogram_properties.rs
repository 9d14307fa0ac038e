//! Property tests for histogram accumulation and summaries.

use approx::assert_abs_diff_eq;
use bayesgrid::testing::bimodal_histogram;
use bayesgrid::{Histogram1D, LogBase};
use rand::prelude::*;
use rstest::rstest;

fn edges(start: f64, stop: f64, n: usize) -> Vec<f64> {
    (0..=n).map(|i| start + (stop - start) * i as f64 / n as f64).collect()
}

fn random_values(n: usize, low: f64, high: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(low..high)).collect()
}

#[test]
fn concrete_counts_and_pdf() {
    let mut h = Histogram1D::from_edges(&[0.0, 1.0, 2.0, 3.0, 4.0], None, 0.0).unwrap();
    h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
    assert_eq!(h.counts(), &[1, 2, 0, 1]);
    assert_eq!(h.estimate_pdf().unwrap(), vec![0.25, 0.5, 0.0, 0.25]);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn clip_keeps_every_value(#[case] n_calls: usize) {
    let mut h = Histogram1D::from_edges(&edges(0.0, 1.0, 8), None, 0.0).unwrap();
    let mut total = 0;
    for call in 0..n_calls {
        // half of each batch falls outside the axis
        let values = random_values(50 + call, -0.5, 1.5, call as u64);
        total += values.len() as i64;
        h.update(&values, true, false).unwrap();
    }
    assert_eq!(h.n_samples(), total);
}

#[rstest]
#[case(false)]
#[case(true)]
fn trim_counts_only_in_range_values(#[case] clip: bool) {
    let mut h = Histogram1D::from_edges(&edges(0.0, 1.0, 8), None, 0.0).unwrap();
    let values = random_values(500, -0.5, 1.5, 42);
    let in_range = values.iter().filter(|v| (0.0..=1.0).contains(*v)).count() as i64;
    h.update(&values, clip, true).unwrap();
    assert_eq!(h.n_samples(), in_range);
}

#[test]
fn values_outside_without_clip_or_trim_are_rejected() {
    let mut h = Histogram1D::from_edges(&edges(0.0, 1.0, 4), None, 0.0).unwrap();
    assert!(h.update(&[0.5, 2.0], false, false).is_err());
    assert_eq!(h.n_samples(), 0);
}

#[rstest]
#[case(5.0)]
#[case(30.0)]
#[case(50.0)]
#[case(68.0)]
#[case(95.0)]
#[case(99.9)]
fn median_lies_inside_credible_interval(#[case] percent: f64) {
    let h = bimodal_histogram(&edges(-10.0, 10.0, 80), [(-3.0, 1.0), (4.0, 2.0)], 5000, 9).unwrap();
    let ci = h.credible_intervals(percent, None).unwrap();
    let (lo, hi) = (ci.low.min(ci.high), ci.low.max(ci.high));
    assert!(lo <= ci.median && ci.median <= hi, "{ci:?}");
}

#[test]
fn credible_interval_in_log_frame() {
    let mut h = Histogram1D::from_edges(&[1.0, 10.0, 100.0, 1000.0], Some(LogBase::TEN), 0.0).unwrap();
    h.update(&[5.0, 50.0, 60.0, 500.0], true, false).unwrap();
    let ci = h.credible_intervals(90.0, None).unwrap();
    // edges are held in log10 space
    assert_abs_diff_eq!(ci.median, 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ci.low, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ci.high, 3.0, epsilon = 1e-12);
}

#[test]
fn resampling_reproduces_shape() {
    let bins = edges(-10.0, 10.0, 40);
    let h = bimodal_histogram(&bins, [(-4.0, 1.5), (3.0, 1.0)], 20_000, 1).unwrap();
    let target = h.estimate_pdf().unwrap();

    let mut rng = StdRng::seed_from_u64(2);
    let mut rebinned = Histogram1D::from_edges(&bins, None, 0.0).unwrap();
    rebinned.update(&h.sample(200_000, &mut rng).unwrap(), true, false).unwrap();

    for (a, b) in rebinned.estimate_pdf().unwrap().iter().zip(&target) {
        assert_abs_diff_eq!(*a, *b, epsilon = 5e-3);
    }
}

#[test]
fn combine_with_self_doubles_counts() {
    let h = bimodal_histogram(&edges(-10.0, 10.0, 20), [(-2.0, 1.0), (2.0, 1.0)], 1000, 4).unwrap();
    let mut doubled = h.clone();
    doubled.combine(&h).unwrap();
    for (d, c) in doubled.counts().iter().zip(h.counts()) {
        assert_eq!(*d, 2 * c);
    }
}

#[test]
fn slice_keeps_counts_of_selected_bins() {
    let mut h = Histogram1D::from_edges(&[0.0, 1.0, 2.0, 3.0, 4.0], None, 0.0).unwrap();
    h.update(&[0.5, 1.5, 1.5, 3.5], true, false).unwrap();
    let s = h.slice(1..3).unwrap();
    assert_eq!(s.bins(), &[1.0, 2.0, 3.0]);
    assert_eq!(s.counts(), &[2, 0]);
}
