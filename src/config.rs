//! Configuration surface of a comparison run.
//!
//! Every field has a default reflecting the reference use case (optical
//! marker system as base, video pose estimation as diff); all are
//! overridable, typically from a YAML file next to the recordings.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::marker::{ALL_MARKERS, Marker};
use crate::transform::AxisCorrection;

/// A calibration parameter that is either pinned by configuration or
/// searched for during the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param<T> {
    Fixed(T),
    Search,
}

impl<T> Param<T> {
    pub fn is_search(&self) -> bool {
        matches!(self, Param::Search)
    }

    pub fn fixed(&self) -> Option<&T> {
        match self {
            Param::Fixed(value) => Some(value),
            Param::Search => None,
        }
    }
}

impl<T> Default for Param<T> {
    fn default() -> Self {
        Param::Search
    }
}

/// Which stream's sampling cadence drives cursor advancement in the
/// nearest-timestamp merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantRate {
    Base,
    #[default]
    Diff,
    /// No privileged rate: advance whichever stream's next timestamp is
    /// closer.
    Closest,
}

/// Configuration of one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Path of the reference recording (QTM TSV export).
    pub base_recording: String,
    /// Path of the candidate recording (trajectory CSV).
    pub diff_recording: String,
    pub base_label: String,
    pub diff_label: String,

    /// Scalar applied to candidate positions at parse time, e.g. 1000 to
    /// convert meters to millimeters. The engine always works in mm.
    pub unit_conversion: f64,
    /// Axis convention correction applied to the candidate stream.
    pub axes: AxisCorrection,

    pub base_frame_offset: Param<usize>,
    pub diff_frame_offset: Param<usize>,
    /// Upper bound of the frame-offset scan.
    pub max_frame_offset: usize,
    /// Base/diff marker pair anchoring the offset search.
    pub anchor: (Marker, Marker),

    /// Rotation of the base stream about the vertical axis, degrees.
    pub rotation_degrees: Param<f64>,
    /// Per-axis stretch of the diff stream about per-marker centers.
    pub stretch: Param<[f64; 3]>,

    pub dominant_rate: DominantRate,
    /// Diff axis values within this distance of their marker center are
    /// clamped to the center before differencing, to suppress jitter
    /// around a calibrated rest position. Zero disables the clamp.
    pub noise_threshold: f64,

    /// Base-to-diff marker correspondence; all per-marker operations
    /// iterate this map.
    pub mapping: BTreeMap<Marker, Marker>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            base_recording: String::new(),
            diff_recording: String::new(),
            base_label: "base".to_string(),
            diff_label: "diff".to_string(),
            unit_conversion: 1.0,
            axes: AxisCorrection::default(),
            base_frame_offset: Param::Search,
            diff_frame_offset: Param::Search,
            max_frame_offset: 200,
            anchor: (Marker::LeftWrist, Marker::LeftWrist),
            rotation_degrees: Param::Search,
            stretch: Param::Search,
            dominant_rate: DominantRate::Diff,
            noise_threshold: 0.0,
            mapping: identity_mapping(&ALL_MARKERS),
        }
    }
}

impl CompareConfig {
    /// Load a run configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Identity correspondence over the given markers.
pub fn identity_mapping(markers: &[Marker]) -> BTreeMap<Marker, Marker> {
    markers.iter().map(|&m| (m, m)).collect()
}
