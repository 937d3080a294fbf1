//! Geometric corrections applied to a trajectory stream.
//!
//! Two flavors exist on purpose. The destructive appliers mutate marker
//! positions in place and are used once a correction is final. The
//! [`ProbeTransform`] carries a *pending* correction through deviation
//! evaluation without touching the streams, so repeated calibration probes
//! cannot compound transforms.
//!
//! The full per-sample application order is fixed: axis reorder, axis
//! flip, axis offset, stretch about a center, rotation about the vertical
//! axis. Malformed parameters (NaN stretch and the like) are not checked
//! here; they propagate into the deviation statistics where they are
//! caught as degeneracies.

use std::collections::HashMap;

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::marker::Marker;
use crate::stream::Frame;

/// Static axis convention correction: reordering, per-axis sign flips and
/// per-axis additive offsets.
///
/// Defaults reflect the reference use case of an optical marker system
/// compared against a video pose estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisCorrection {
    /// Cyclic permutation x,y,z -> z,x,y.
    pub reorder: bool,
    /// Per-axis sign flip, applied after reordering.
    pub flip: [bool; 3],
    /// Per-axis additive offset in millimeters.
    pub offset: [f64; 3],
}

impl Default for AxisCorrection {
    fn default() -> Self {
        Self {
            reorder: true,
            flip: [true, false, true],
            offset: [0.0, 0.0, 0.0],
        }
    }
}

impl AxisCorrection {
    fn apply_to(&self, p: &mut Vector3<f64>) {
        if self.reorder {
            *p = Vector3::new(p.z, p.x, p.y);
        }
        for axis in 0..3 {
            if self.flip[axis] {
                p[axis] = -p[axis];
            }
            p[axis] += self.offset[axis];
        }
    }
}

/// Apply an axis convention correction to every sample, in place.
pub fn apply_axis_correction(frames: &mut [Frame], correction: &AxisCorrection) {
    for frame in frames {
        for sample in frame.markers.values_mut() {
            correction.apply_to(&mut sample.position);
        }
    }
}

/// Stretch every sample per axis about its marker's center, in place.
///
/// `new = (old - center) * stretch + center`; a stretch of 1 is a no-op,
/// a stretch of 0 collapses the axis onto the center. Markers without a
/// center entry stretch about the origin.
pub fn apply_stretch(
    frames: &mut [Frame],
    stretch: Vector3<f64>,
    centers: &HashMap<Marker, Vector3<f64>>,
) {
    for frame in frames {
        for (marker, sample) in frame.markers.iter_mut() {
            let center = centers.get(marker).copied().unwrap_or_else(Vector3::zeros);
            sample.position = stretch_about(&sample.position, &stretch, &center);
        }
    }
}

/// Rotate every sample about the vertical (z) axis, in place.
pub fn apply_rotation(frames: &mut [Frame], degrees: f64) {
    let rotation = vertical_rotation(degrees);
    for frame in frames {
        for sample in frame.markers.values_mut() {
            sample.position = rotation * sample.position;
        }
    }
}

/// Full correction parameter set, applied in the fixed order.
#[derive(Debug, Clone, Default)]
pub struct TransformParams {
    pub axes: AxisCorrection,
    /// Per-axis stretch; `None` is the identity.
    pub stretch: Option<Vector3<f64>>,
    /// Rotation about the vertical axis, degrees. Applied last so that
    /// translation and stretch happen in the pre-rotation frame.
    pub rotation_degrees: f64,
}

/// Apply a full parameter set to every sample, in place.
pub fn apply_transform(
    frames: &mut [Frame],
    params: &TransformParams,
    centers: &HashMap<Marker, Vector3<f64>>,
) {
    apply_axis_correction(frames, &params.axes);
    if let Some(stretch) = params.stretch {
        apply_stretch(frames, stretch, centers);
    }
    if params.rotation_degrees != 0.0 {
        apply_rotation(frames, params.rotation_degrees);
    }
}

fn vertical_rotation(degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians())
}

fn stretch_about(
    p: &Vector3<f64>,
    stretch: &Vector3<f64>,
    center: &Vector3<f64>,
) -> Vector3<f64> {
    Vector3::new(
        (p.x - center.x) * stretch.x + center.x,
        (p.y - center.y) * stretch.y + center.y,
        (p.z - center.z) * stretch.z + center.z,
    )
}

/// A pending correction evaluated on the fly during calibration probes.
///
/// The rotation candidate applies to the base stream, the stretch
/// candidate to the diff stream; neither stream is mutated. Committing a
/// converged correction goes through [`apply_rotation`] / [`apply_stretch`].
#[derive(Debug, Clone, Default)]
pub struct ProbeTransform {
    rotation: Option<Rotation3<f64>>,
    stretch: Option<Vector3<f64>>,
}

impl ProbeTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Pending rotation (degrees about z) for base positions.
    pub fn with_base_rotation(mut self, degrees: f64) -> Self {
        self.rotation = Some(vertical_rotation(degrees));
        self
    }

    /// Pending per-axis stretch for diff positions.
    pub fn with_diff_stretch(mut self, stretch: Vector3<f64>) -> Self {
        self.stretch = Some(stretch);
        self
    }

    /// Base-stream position under the pending rotation.
    pub fn base_position(&self, p: &Vector3<f64>) -> Vector3<f64> {
        match &self.rotation {
            Some(rotation) => rotation * p,
            None => *p,
        }
    }

    /// Diff-stream position under the pending stretch about `center`.
    pub fn diff_position(&self, p: &Vector3<f64>, center: &Vector3<f64>) -> Vector3<f64> {
        match &self.stretch {
            Some(stretch) => stretch_about(p, stretch, center),
            None => *p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerSample;
    use approx::assert_relative_eq;

    fn single_marker_frames(positions: &[Vector3<f64>]) -> Vec<Frame> {
        positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut frame = Frame::new(i as f64 * 10.0, i);
                frame.markers.insert(Marker::LeftWrist, MarkerSample::at(*p));
                frame
            })
            .collect()
    }

    #[test]
    fn reorder_is_a_cyclic_permutation() {
        let mut frames = single_marker_frames(&[Vector3::new(1.0, 2.0, 3.0)]);
        let correction = AxisCorrection {
            reorder: true,
            flip: [false, false, false],
            offset: [0.0, 0.0, 0.0],
        };
        apply_axis_correction(&mut frames, &correction);
        let p = frames[0].position(Marker::LeftWrist).unwrap();
        assert_relative_eq!(p, Vector3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn flip_and_offset_follow_reorder() {
        let mut frames = single_marker_frames(&[Vector3::new(1.0, 2.0, 3.0)]);
        let correction = AxisCorrection {
            reorder: false,
            flip: [true, false, true],
            offset: [10.0, 20.0, 30.0],
        };
        apply_axis_correction(&mut frames, &correction);
        let p = frames[0].position(Marker::LeftWrist).unwrap();
        assert_relative_eq!(p, Vector3::new(9.0, 22.0, 27.0));
    }

    #[test]
    fn stretch_then_inverse_stretch_is_identity() {
        let original = Vector3::new(12.5, -40.0, 7.25);
        let mut frames = single_marker_frames(&[original]);
        let mut centers = HashMap::new();
        centers.insert(Marker::LeftWrist, Vector3::new(3.0, -1.0, 2.0));

        for s in [0.25, 0.9, 1.0, 2.5, 7.0] {
            let stretch = Vector3::new(s, s * 1.5, s * 0.5);
            apply_stretch(&mut frames, stretch, &centers);
            let inverse = Vector3::new(1.0 / stretch.x, 1.0 / stretch.y, 1.0 / stretch.z);
            apply_stretch(&mut frames, inverse, &centers);
            let p = frames[0].position(Marker::LeftWrist).unwrap();
            assert_relative_eq!(p, original, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_stretch_collapses_onto_center() {
        let mut frames = single_marker_frames(&[Vector3::new(100.0, 100.0, 100.0)]);
        let mut centers = HashMap::new();
        centers.insert(Marker::LeftWrist, Vector3::new(1.0, 2.0, 3.0));
        apply_stretch(&mut frames, Vector3::zeros(), &centers);
        let p = frames[0].position(Marker::LeftWrist).unwrap();
        assert_relative_eq!(p, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn rotation_preserves_pairwise_distances() {
        let a = Vector3::new(10.0, -4.0, 2.0);
        let b = Vector3::new(-3.0, 8.0, 5.0);
        for degrees in [-180.0, -37.0, 0.1, 45.0, 90.0, 179.5] {
            let mut frame = Frame::new(0.0, 0);
            frame.markers.insert(Marker::LeftWrist, MarkerSample::at(a));
            frame.markers.insert(Marker::RightWrist, MarkerSample::at(b));
            let mut frames = vec![frame];
            apply_rotation(&mut frames, degrees);
            let ra = frames[0].position(Marker::LeftWrist).unwrap();
            let rb = frames[0].position(Marker::RightWrist).unwrap();
            assert_relative_eq!((ra - rb).norm(), (a - b).norm(), epsilon = 1e-9);
            // z is the rotation axis and must be untouched
            assert_relative_eq!(ra.z, a.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn full_transform_applies_rotation_last() {
        let mut frames = single_marker_frames(&[Vector3::new(1.0, 0.0, 0.0)]);
        let params = TransformParams {
            axes: AxisCorrection {
                reorder: false,
                flip: [false, false, false],
                offset: [1.0, 0.0, 0.0],
            },
            stretch: Some(Vector3::new(2.0, 1.0, 1.0)),
            rotation_degrees: 90.0,
        };
        apply_transform(&mut frames, &params, &HashMap::new());
        // offset then stretch about the origin gives (4, 0, 0); applying
        // the rotation last lands it on the y axis
        let p = frames[0].position(Marker::LeftWrist).unwrap();
        assert_relative_eq!(p, Vector3::new(0.0, 4.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn probe_matches_destructive_application() {
        let position = Vector3::new(5.0, -2.0, 9.0);
        let center = Vector3::new(1.0, 1.0, 1.0);
        let stretch = Vector3::new(1.5, 0.5, 2.0);
        let degrees = 28.0;

        let probe = ProbeTransform::identity()
            .with_base_rotation(degrees)
            .with_diff_stretch(stretch);

        let mut base_frames = single_marker_frames(&[position]);
        apply_rotation(&mut base_frames, degrees);
        assert_relative_eq!(
            probe.base_position(&position),
            base_frames[0].position(Marker::LeftWrist).unwrap(),
            epsilon = 1e-12
        );

        let mut diff_frames = single_marker_frames(&[position]);
        let mut centers = HashMap::new();
        centers.insert(Marker::LeftWrist, center);
        apply_stretch(&mut diff_frames, stretch, &centers);
        assert_relative_eq!(
            probe.diff_position(&position, &center),
            diff_frames[0].position(Marker::LeftWrist).unwrap(),
            epsilon = 1e-12
        );
    }
}
