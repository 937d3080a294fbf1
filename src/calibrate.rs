//! Golden-section calibration of rotation and per-axis stretch.
//!
//! Both searches minimize the deviation calculator's mean absolute
//! deviation as a function of a pending transform parameter, assuming the
//! objective is unimodal over the initial bracket. Termination is purely
//! by bracket width, so a search always converges to *some* fixed point;
//! whether it is the global optimum is not guaranteed on pathological
//! multi-modal deviation landscapes, and not detected.
//!
//! The three stretch axes share one bracket-shrink loop but are judged
//! independently per iteration. This is an axis-separable approximation
//! of a true multivariate search and can miss the joint optimum when the
//! axes are coupled.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::config::{CompareConfig, DominantRate, Param};
use crate::deviation::{MergeOptions, compute_deviations};
use crate::marker::Marker;
use crate::stream::{Frame, TrajectoryStream};
use crate::transform::{ProbeTransform, apply_rotation, apply_stretch};

/// Rotation search bracket, degrees about the vertical axis.
pub const ROTATION_BRACKET_DEG: (f64, f64) = (-180.0, 180.0);
/// Rotation bracket width below which the search stops.
pub const ROTATION_EPSILON_DEG: f64 = 0.1;
/// Stretch search bracket per axis; factors outside this range are not
/// physically expected.
pub const STRETCH_BRACKET: (f64, f64) = (0.0, 10.0);
/// Stretch bracket width below which the search stops.
pub const STRETCH_EPSILON: f64 = 0.01;

/// Correction parameters actually applied, echoed back for the run
/// report.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCalibration {
    /// Rotation applied to the base stream, degrees about z.
    pub rotation_degrees: f64,
    /// Per-axis stretch applied to the diff stream.
    pub stretch: Vector3<f64>,
}

/// Golden-section minimization of a unimodal objective on
/// `[left, right]`.
///
/// Interior probes sit at the inverse-golden-ratio positions; the probe
/// kept after each shrink reuses its already-computed objective value.
/// Returns the midpoint of the final bracket.
pub fn golden_section_min<F>(mut f: F, mut left: f64, mut right: f64, epsilon: f64) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let inv_phi = ((5.0f64).sqrt() - 1.0) / 2.0;
    let mut x1 = right - inv_phi * (right - left);
    let mut x2 = left + inv_phi * (right - left);
    let mut f1 = f(x1)?;
    let mut f2 = f(x2)?;

    while right - left > epsilon {
        if f1 < f2 {
            right = x2;
            x2 = x1;
            f2 = f1;
            x1 = right - inv_phi * (right - left);
            f1 = f(x1)?;
        } else {
            left = x1;
            x1 = x2;
            f1 = f2;
            x2 = left + inv_phi * (right - left);
            f2 = f(x2)?;
        }
    }
    Ok(0.5 * (left + right))
}

/// Three-axis golden-section minimization with a shared shrink loop.
///
/// Probes are computed jointly; each axis shrinks its own bracket by its
/// own objective component. The loop runs until every bracket is below
/// `epsilon`.
pub fn golden_section_min3<F>(
    mut f: F,
    left: f64,
    right: f64,
    epsilon: f64,
) -> Result<Vector3<f64>>
where
    F: FnMut(&Vector3<f64>) -> Result<Vector3<f64>>,
{
    let inv_phi = ((5.0f64).sqrt() - 1.0) / 2.0;
    let mut lo = Vector3::from_element(left);
    let mut hi = Vector3::from_element(right);

    let mut iteration = 0usize;
    while (hi - lo).amax() > epsilon {
        iteration += 1;
        let x1 = hi - inv_phi * (hi - lo);
        let x2 = lo + inv_phi * (hi - lo);
        let f1 = f(&x1)?;
        let f2 = f(&x2)?;
        for axis in 0..3 {
            if f1[axis] < f2[axis] {
                hi[axis] = x2[axis];
            } else {
                lo[axis] = x1[axis];
            }
        }
        debug!(iteration, lo = ?lo.as_slice(), hi = ?hi.as_slice(), "stretch bracket shrunk");
    }
    Ok((lo + hi) / 2.0)
}

/// Search the base rotation minimizing the mean absolute x/y deviation.
///
/// Rotation about the vertical axis cannot affect z, so z is left out of
/// the objective. `pending_stretch` is threaded through every probe when
/// a stretch candidate is already known.
pub fn find_optimal_rotation(
    base: &[Frame],
    diff: &[Frame],
    mapping: &BTreeMap<Marker, Marker>,
    centers: &HashMap<Marker, Vector3<f64>>,
    pending_stretch: Option<Vector3<f64>>,
    dominant: DominantRate,
) -> Result<f64> {
    let rotation = golden_section_min(
        |degrees| {
            let mut probe = ProbeTransform::identity().with_base_rotation(degrees);
            if let Some(stretch) = pending_stretch {
                probe = probe.with_diff_stretch(stretch);
            }
            let opts = MergeOptions {
                dominant,
                probe,
                centers: Some(centers),
                ..MergeOptions::default()
            };
            let aggregate = compute_deviations(base, diff, mapping, &opts)?.aggregate();
            debug!(degrees, deviation = aggregate.absolute.x + aggregate.absolute.y, "rotation probe");
            Ok(aggregate.absolute.x + aggregate.absolute.y)
        },
        ROTATION_BRACKET_DEG.0,
        ROTATION_BRACKET_DEG.1,
        ROTATION_EPSILON_DEG,
    )?;
    info!(rotation, "optimal base rotation found");
    Ok(rotation)
}

/// Search the per-axis diff stretch minimizing the mean absolute
/// deviation, anchored at the given per-marker centers.
pub fn find_optimal_stretch(
    base: &[Frame],
    diff: &[Frame],
    mapping: &BTreeMap<Marker, Marker>,
    centers: &HashMap<Marker, Vector3<f64>>,
    pending_rotation: Option<f64>,
    dominant: DominantRate,
) -> Result<Vector3<f64>> {
    let stretch = golden_section_min3(
        |candidate| {
            let mut probe = ProbeTransform::identity().with_diff_stretch(*candidate);
            if let Some(degrees) = pending_rotation {
                probe = probe.with_base_rotation(degrees);
            }
            let opts = MergeOptions {
                dominant,
                probe,
                centers: Some(centers),
                ..MergeOptions::default()
            };
            Ok(compute_deviations(base, diff, mapping, &opts)?.aggregate().absolute)
        },
        STRETCH_BRACKET.0,
        STRETCH_BRACKET.1,
        STRETCH_EPSILON,
    )?;
    info!(stretch = ?stretch.as_slice(), "optimal diff stretch found");
    Ok(stretch)
}

/// Resolve and apply the rotation and stretch corrections.
///
/// Fixed parameters are applied as given. When both are searched, the
/// rotation found first seeds the stretch search and is then refined once
/// against the found stretch; a fixed two-pass refinement, not a
/// convergence loop.
pub fn apply_scale_rotation(
    base: &mut TrajectoryStream,
    diff: &mut TrajectoryStream,
    config: &CompareConfig,
) -> Result<ResolvedCalibration> {
    let mapping = &config.mapping;
    let dominant = config.dominant_rate;
    let centers = correspondence_centers(diff, mapping);

    let resolved = match (config.rotation_degrees, config.stretch) {
        (Param::Fixed(rotation), Param::Fixed(stretch)) => {
            let stretch = Vector3::from(stretch);
            apply_rotation(&mut base.frames, rotation);
            apply_stretch(&mut diff.frames, stretch, &centers);
            ResolvedCalibration {
                rotation_degrees: rotation,
                stretch,
            }
        }
        (Param::Fixed(rotation), Param::Search) => {
            apply_rotation(&mut base.frames, rotation);
            let stretch = find_optimal_stretch(
                &base.frames,
                &diff.frames,
                mapping,
                &centers,
                None,
                dominant,
            )?;
            apply_stretch(&mut diff.frames, stretch, &centers);
            ResolvedCalibration {
                rotation_degrees: rotation,
                stretch,
            }
        }
        (Param::Search, Param::Fixed(stretch)) => {
            let stretch = Vector3::from(stretch);
            apply_stretch(&mut diff.frames, stretch, &centers);
            let rotation = find_optimal_rotation(
                &base.frames,
                &diff.frames,
                mapping,
                &centers,
                None,
                dominant,
            )?;
            apply_rotation(&mut base.frames, rotation);
            ResolvedCalibration {
                rotation_degrees: rotation,
                stretch,
            }
        }
        (Param::Search, Param::Search) => {
            let first_rotation = find_optimal_rotation(
                &base.frames,
                &diff.frames,
                mapping,
                &centers,
                None,
                dominant,
            )?;
            let stretch = find_optimal_stretch(
                &base.frames,
                &diff.frames,
                mapping,
                &centers,
                Some(first_rotation),
                dominant,
            )?;
            // the optimal rotation depends weakly on stretch; refine once
            let rotation = find_optimal_rotation(
                &base.frames,
                &diff.frames,
                mapping,
                &centers,
                Some(stretch),
                dominant,
            )?;
            apply_rotation(&mut base.frames, rotation);
            apply_stretch(&mut diff.frames, stretch, &centers);
            ResolvedCalibration {
                rotation_degrees: rotation,
                stretch,
            }
        }
    };

    Ok(resolved)
}

/// Per-marker centers of the diff stream, keyed by the corresponding base
/// marker as the deviation calculator expects.
pub fn correspondence_centers(
    diff: &TrajectoryStream,
    mapping: &BTreeMap<Marker, Marker>,
) -> HashMap<Marker, Vector3<f64>> {
    let diff_markers: Vec<Marker> = mapping.values().copied().collect();
    let raw = diff.marker_centers(&diff_markers);
    mapping
        .iter()
        .filter_map(|(&base_marker, &diff_marker)| {
            raw.get(&diff_marker).map(|&center| (base_marker, center))
        })
        .collect()
}
