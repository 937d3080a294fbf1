//! Whole-run comparison pipeline.
//!
//! Wires the components in a fixed order: axis correction, offset
//! removal, temporal alignment, offset removal, calibration, offset
//! removal, then a final deviation pass with collected per-marker
//! series. Offsets are re-removed after every step that can shift the
//! candidate stream relative to the reference.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::info;

use crate::align::{ResolvedOffsets, align_frames};
use crate::calibrate::{ResolvedCalibration, apply_scale_rotation, correspondence_centers};
use crate::config::CompareConfig;
use crate::deviation::{
    DeviationSample, DeviationStats, MergeOptions, compute_deviations, remove_average_offset,
};
use crate::marker::Marker;
use crate::stream::TrajectoryStream;
use crate::transform::apply_axis_correction;

/// Everything the reporting layer needs from one comparison run.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    /// Leading-frame counts dropped during temporal alignment.
    pub offsets: ResolvedOffsets,
    /// Rotation and stretch actually applied.
    pub calibration: ResolvedCalibration,
    /// Mean per-marker deviation statistics of the final pass.
    pub per_marker: BTreeMap<Marker, DeviationStats>,
    /// Mean statistics across all corresponded markers.
    pub aggregate: DeviationStats,
    /// Full per-marker deviation series, for distribution and derivative
    /// plots.
    pub series: BTreeMap<Marker, Vec<DeviationSample>>,
    /// Number of merge steps in the final pass.
    pub merge_steps: usize,
}

/// Run a full comparison of two parsed streams under the given
/// configuration. Both streams are consumed destructively: corrections
/// are applied in place and leading frames are dropped.
pub fn run_comparison(
    base: &mut TrajectoryStream,
    diff: &mut TrajectoryStream,
    config: &CompareConfig,
) -> Result<ComparisonReport> {
    base.validate(&config.base_label)?;
    diff.validate(&config.diff_label)?;
    info!(
        base_frames = base.len(),
        diff_frames = diff.len(),
        "starting comparison run"
    );

    apply_axis_correction(&mut diff.frames, &config.axes);
    remove_average_offset(
        &base.frames,
        &mut diff.frames,
        &config.mapping,
        config.dominant_rate,
    )?;

    let offsets = align_frames(base, diff, config)?;
    remove_average_offset(
        &base.frames,
        &mut diff.frames,
        &config.mapping,
        config.dominant_rate,
    )?;

    let calibration = apply_scale_rotation(base, diff, config)?;
    remove_average_offset(
        &base.frames,
        &mut diff.frames,
        &config.mapping,
        config.dominant_rate,
    )?;

    let centers = correspondence_centers(diff, &config.mapping);
    let opts = MergeOptions {
        dominant: config.dominant_rate,
        centers: Some(&centers),
        noise_threshold: config.noise_threshold,
        collect: true,
        ..MergeOptions::default()
    };
    let outcome = compute_deviations(&base.frames, &diff.frames, &config.mapping, &opts)?;

    let aggregate = outcome.aggregate();
    info!(
        merge_steps = outcome.merge_steps,
        euclidean = aggregate.euclidean,
        "comparison run finished"
    );

    Ok(ComparisonReport {
        offsets,
        calibration,
        per_marker: outcome.per_marker,
        aggregate,
        series: outcome.series,
        merge_steps: outcome.merge_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;
    use crate::marker::MarkerSample;
    use crate::stream::Frame;
    use crate::transform::AxisCorrection;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn motion(i: usize) -> Vector3<f64> {
        let t = i as f64 * 0.2;
        Vector3::new(t.sin() * 60.0, t.cos() * 45.0, (0.5 * t).sin() * 80.0)
    }

    fn stream_of<F: Fn(usize) -> Vector3<f64>>(len: usize, f: F) -> TrajectoryStream {
        let frames = (0..len)
            .map(|i| {
                let mut frame = Frame::new(i as f64 * 10.0, i);
                frame
                    .markers
                    .insert(Marker::LeftWrist, MarkerSample::at(f(i)));
                frame
            })
            .collect();
        TrajectoryStream::new(frames)
    }

    fn wrist_config() -> CompareConfig {
        CompareConfig {
            base_frame_offset: Param::Fixed(0),
            diff_frame_offset: Param::Fixed(0),
            rotation_degrees: Param::Fixed(0.0),
            stretch: Param::Fixed([1.0, 1.0, 1.0]),
            mapping: [(Marker::LeftWrist, Marker::LeftWrist)].into_iter().collect(),
            ..CompareConfig::default()
        }
    }

    #[test]
    fn identical_streams_compare_to_zero() {
        let mut base = stream_of(30, motion);
        let mut diff = base.clone();
        let config = CompareConfig {
            axes: AxisCorrection {
                reorder: false,
                flip: [false, false, false],
                offset: [0.0, 0.0, 0.0],
            },
            ..wrist_config()
        };

        let report = run_comparison(&mut base, &mut diff, &config).unwrap();
        assert_abs_diff_eq!(report.aggregate.euclidean, 0.0, epsilon = 1e-9);
        assert_eq!(report.offsets.base, 0);
        assert_eq!(report.offsets.diff, 0);
        assert_eq!(report.series[&Marker::LeftWrist].len(), report.merge_steps);
    }

    #[test]
    fn axis_convention_and_translation_are_corrected_away() {
        let mut base = stream_of(30, motion);
        // candidate stream in the foreign axis convention, translated;
        // the default correction must map it back: with reorder and
        // flip (x, z) the raw position q satisfies
        // corrected = (-q.z, q.x, -q.y)
        let shift = Vector3::new(12.0, -7.0, 3.0);
        let mut diff = stream_of(30, |i| {
            let p = motion(i) + shift;
            Vector3::new(p.y, -p.z, -p.x)
        });
        let config = wrist_config();

        let report = run_comparison(&mut base, &mut diff, &config).unwrap();
        // the translation ends up in the removed average offset, not in
        // the reported deviation
        assert_abs_diff_eq!(report.aggregate.euclidean, 0.0, epsilon = 1e-9);
    }
}
