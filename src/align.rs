//! Temporal alignment of the two streams.
//!
//! Resolves the leading-frame count to drop from each stream (given, or
//! found by a linear scan) and re-bases both clocks so their first
//! retained frames sit at zero.
//!
//! The scan anchors on a single well-tracked, high-amplitude marker pair
//! rather than the full marker set: a pragmatic proxy that keeps the
//! search linear in `max_offset`. The objective is not assumed unimodal
//! over the scan range, so every candidate offset is evaluated.

use std::collections::BTreeMap;

use anyhow::{Result, ensure};
use tracing::{debug, info};

use crate::config::{CompareConfig, DominantRate, Param};
use crate::deviation::{MergeOptions, compute_deviations};
use crate::marker::Marker;
use crate::stream::{Frame, TrajectoryStream};

/// Leading-frame counts actually dropped from each stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOffsets {
    pub base: usize,
    pub diff: usize,
}

/// Resolve frame offsets, truncate both streams and re-base their clocks.
///
/// Fails if neither offset is fixed: alignment needs at least one
/// anchored side.
pub fn align_frames(
    base: &mut TrajectoryStream,
    diff: &mut TrajectoryStream,
    config: &CompareConfig,
) -> Result<ResolvedOffsets> {
    ensure!(
        !(config.base_frame_offset.is_search() && config.diff_frame_offset.is_search()),
        "neither base nor diff frame offset is fixed; at least one side must anchor the alignment"
    );

    let base_offset = match config.base_frame_offset {
        Param::Fixed(offset) => offset,
        Param::Search => find_base_offset(
            &base.frames,
            &diff.frames,
            config.anchor,
            config.max_frame_offset,
        )?,
    };
    base.drop_leading(base_offset);
    ensure!(
        !base.is_empty(),
        "base frame offset {base_offset} leaves no frames"
    );

    let diff_offset = match config.diff_frame_offset {
        Param::Fixed(offset) => offset,
        Param::Search => find_diff_offset(
            &base.frames,
            &diff.frames,
            config.anchor,
            config.max_frame_offset,
        )?,
    };
    diff.drop_leading(diff_offset);
    ensure!(
        !diff.is_empty(),
        "diff frame offset {diff_offset} leaves no frames"
    );

    base.rebase_clock();
    diff.rebase_clock();

    info!(base_offset, diff_offset, "frame offsets resolved");
    Ok(ResolvedOffsets {
        base: base_offset,
        diff: diff_offset,
    })
}

/// Scan leading base offsets for the one minimizing the anchor pair's
/// mean absolute z deviation. Ties keep the lowest offset.
fn find_base_offset(
    base: &[Frame],
    diff: &[Frame],
    anchor: (Marker, Marker),
    max_offset: usize,
) -> Result<usize> {
    let mapping = anchor_mapping(anchor);
    let mut best = 0usize;
    let mut lowest = f64::INFINITY;
    for offset in 0..base.len().saturating_sub(2).min(max_offset) {
        let opts = MergeOptions {
            dominant: DominantRate::Base,
            base_time_origin: base[offset].time_ms,
            diff_time_origin: diff[0].time_ms,
            ..MergeOptions::default()
        };
        let outcome = compute_deviations(&base[offset..], diff, &mapping, &opts)?;
        let deviation = outcome.per_marker[&anchor.0].absolute.z;
        if deviation < lowest {
            debug!(offset, deviation, "base offset improved");
            lowest = deviation;
            best = offset;
        }
    }
    Ok(best)
}

/// Symmetric scan over leading diff offsets.
fn find_diff_offset(
    base: &[Frame],
    diff: &[Frame],
    anchor: (Marker, Marker),
    max_offset: usize,
) -> Result<usize> {
    let mapping = anchor_mapping(anchor);
    let mut best = 0usize;
    let mut lowest = f64::INFINITY;
    for offset in 0..diff.len().saturating_sub(2).min(max_offset) {
        let opts = MergeOptions {
            dominant: DominantRate::Diff,
            base_time_origin: base[0].time_ms,
            diff_time_origin: diff[offset].time_ms,
            ..MergeOptions::default()
        };
        let outcome = compute_deviations(base, &diff[offset..], &mapping, &opts)?;
        let deviation = outcome.per_marker[&anchor.0].absolute.z;
        if deviation < lowest {
            debug!(offset, deviation, "diff offset improved");
            lowest = deviation;
            best = offset;
        }
    }
    Ok(best)
}

fn anchor_mapping(anchor: (Marker, Marker)) -> BTreeMap<Marker, Marker> {
    [(anchor.0, anchor.1)].into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerSample;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn ramp_stream(len: usize, time_step: f64, start_time: f64, z_of: impl Fn(f64) -> f64) -> TrajectoryStream {
        let frames = (0..len)
            .map(|i| {
                let time_ms = start_time + i as f64 * time_step;
                let mut frame = Frame::new(time_ms, i);
                frame.markers.insert(
                    Marker::LeftWrist,
                    MarkerSample::at(Vector3::new(0.0, 0.0, z_of(i as f64 * time_step))),
                );
                frame
            })
            .collect();
        TrajectoryStream::new(frames)
    }

    #[test]
    fn both_offsets_unset_is_a_configuration_error() {
        let mut base = ramp_stream(10, 10.0, 0.0, |t| t);
        let mut diff = ramp_stream(10, 10.0, 0.0, |t| t);
        let config = CompareConfig::default();
        assert!(config.base_frame_offset.is_search());
        assert!(config.diff_frame_offset.is_search());
        assert!(align_frames(&mut base, &mut diff, &config).is_err());
    }

    #[test]
    fn fixed_offsets_truncate_and_rebase() {
        let mut base = ramp_stream(10, 10.0, 500.0, |t| t);
        let mut diff = ramp_stream(12, 8.0, 900.0, |t| t);
        let config = CompareConfig {
            base_frame_offset: Param::Fixed(3),
            diff_frame_offset: Param::Fixed(5),
            ..CompareConfig::default()
        };

        let resolved = align_frames(&mut base, &mut diff, &config).unwrap();
        assert_eq!(resolved, ResolvedOffsets { base: 3, diff: 5 });
        assert_eq!(base.len(), 7);
        assert_eq!(diff.len(), 7);
        assert_relative_eq!(base.frames[0].time_ms, 0.0);
        assert_relative_eq!(diff.frames[0].time_ms, 0.0);
        assert_relative_eq!(base.frames[1].time_ms, 10.0);
        assert_relative_eq!(diff.frames[1].time_ms, 8.0);
    }

    #[test]
    fn diff_offset_of_fifteen_frames_is_recovered() {
        // the candidate recording started 15 frames before the event;
        // its z ramp lags the reference by exactly that much
        let mut base = ramp_stream(120, 10.0, 0.0, |t| 0.5 * t);
        let mut diff = ramp_stream(135, 10.0, 0.0, |t| 0.5 * (t - 150.0));
        let config = CompareConfig {
            base_frame_offset: Param::Fixed(0),
            diff_frame_offset: Param::Search,
            ..CompareConfig::default()
        };

        let resolved = align_frames(&mut base, &mut diff, &config).unwrap();
        assert_eq!(resolved.diff, 15);
    }

    #[test]
    fn base_offset_search_is_symmetric() {
        let mut base = ramp_stream(87, 10.0, 0.0, |t| 0.5 * (t - 70.0));
        let mut diff = ramp_stream(80, 10.0, 0.0, |t| 0.5 * t);
        let config = CompareConfig {
            base_frame_offset: Param::Search,
            diff_frame_offset: Param::Fixed(0),
            ..CompareConfig::default()
        };

        let resolved = align_frames(&mut base, &mut diff, &config).unwrap();
        assert_eq!(resolved.base, 7);
    }
}
