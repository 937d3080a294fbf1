//! Marker identities and per-instant samples.
//!
//! Both recordings are keyed by the same [`Marker`] enum so that only
//! anatomically corresponding points are ever compared. The candidate
//! stream addresses markers by the pose-landmark index of its tracker;
//! the reference stream carries free-form labels that are mapped onto the
//! same enum at parse time.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A tracked anatomical landmark.
///
/// Discriminants follow the MediaPipe pose-landmark numbering so candidate
/// rows can be decoded straight from their index column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

/// All markers in landmark-index order.
pub const ALL_MARKERS: [Marker; 33] = [
    Marker::Nose,
    Marker::LeftEyeInner,
    Marker::LeftEye,
    Marker::LeftEyeOuter,
    Marker::RightEyeInner,
    Marker::RightEye,
    Marker::RightEyeOuter,
    Marker::LeftEar,
    Marker::RightEar,
    Marker::MouthLeft,
    Marker::MouthRight,
    Marker::LeftShoulder,
    Marker::RightShoulder,
    Marker::LeftElbow,
    Marker::RightElbow,
    Marker::LeftWrist,
    Marker::RightWrist,
    Marker::LeftPinky,
    Marker::RightPinky,
    Marker::LeftIndex,
    Marker::RightIndex,
    Marker::LeftThumb,
    Marker::RightThumb,
    Marker::LeftHip,
    Marker::RightHip,
    Marker::LeftKnee,
    Marker::RightKnee,
    Marker::LeftAnkle,
    Marker::RightAnkle,
    Marker::LeftHeel,
    Marker::RightHeel,
    Marker::LeftFootIndex,
    Marker::RightFootIndex,
];

impl Marker {
    /// Look up a marker by its pose-landmark index.
    pub fn from_index(index: usize) -> Option<Marker> {
        ALL_MARKERS.get(index).copied()
    }

    /// Pose-landmark index of this marker.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Map a marker label from a QTM export onto the shared enum.
    ///
    /// Labels vary between capture setups ("LeftWrist", "L_WRIST",
    /// "l-wrist", ...); matching is case-insensitive and ignores
    /// separators. Returns `None` for labels with no pose counterpart,
    /// which callers are expected to skip.
    pub fn from_qtm_label(label: &str) -> Option<Marker> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let key = match normalized.as_str() {
            "nose" | "head" => Marker::Nose,
            "leftear" | "lear" => Marker::LeftEar,
            "rightear" | "rear" => Marker::RightEar,
            "leftshoulder" | "lshoulder" => Marker::LeftShoulder,
            "rightshoulder" | "rshoulder" => Marker::RightShoulder,
            "leftelbow" | "lelbow" => Marker::LeftElbow,
            "rightelbow" | "relbow" => Marker::RightElbow,
            "leftwrist" | "lwrist" => Marker::LeftWrist,
            "rightwrist" | "rwrist" => Marker::RightWrist,
            "leftindex" | "lindex" | "lefthand" | "lhand" => Marker::LeftIndex,
            "rightindex" | "rindex" | "righthand" | "rhand" => Marker::RightIndex,
            "leftthumb" | "lthumb" => Marker::LeftThumb,
            "rightthumb" | "rthumb" => Marker::RightThumb,
            "lefthip" | "lhip" => Marker::LeftHip,
            "righthip" | "rhip" => Marker::RightHip,
            "leftknee" | "lknee" => Marker::LeftKnee,
            "rightknee" | "rknee" => Marker::RightKnee,
            "leftankle" | "lankle" => Marker::LeftAnkle,
            "rightankle" | "rankle" => Marker::RightAnkle,
            "leftheel" | "lheel" => Marker::LeftHeel,
            "rightheel" | "rheel" => Marker::RightHeel,
            "leftfootindex" | "lfoot" | "lefttoe" | "ltoe" => Marker::LeftFootIndex,
            "rightfootindex" | "rfoot" | "righttoe" | "rtoe" => Marker::RightFootIndex,
            _ => return None,
        };
        Some(key)
    }

    /// Stable snake_case name, matching the configuration spelling.
    pub fn name(self) -> &'static str {
        match self {
            Marker::Nose => "nose",
            Marker::LeftEyeInner => "left_eye_inner",
            Marker::LeftEye => "left_eye",
            Marker::LeftEyeOuter => "left_eye_outer",
            Marker::RightEyeInner => "right_eye_inner",
            Marker::RightEye => "right_eye",
            Marker::RightEyeOuter => "right_eye_outer",
            Marker::LeftEar => "left_ear",
            Marker::RightEar => "right_ear",
            Marker::MouthLeft => "mouth_left",
            Marker::MouthRight => "mouth_right",
            Marker::LeftShoulder => "left_shoulder",
            Marker::RightShoulder => "right_shoulder",
            Marker::LeftElbow => "left_elbow",
            Marker::RightElbow => "right_elbow",
            Marker::LeftWrist => "left_wrist",
            Marker::RightWrist => "right_wrist",
            Marker::LeftPinky => "left_pinky",
            Marker::RightPinky => "right_pinky",
            Marker::LeftIndex => "left_index",
            Marker::RightIndex => "right_index",
            Marker::LeftThumb => "left_thumb",
            Marker::RightThumb => "right_thumb",
            Marker::LeftHip => "left_hip",
            Marker::RightHip => "right_hip",
            Marker::LeftKnee => "left_knee",
            Marker::RightKnee => "right_knee",
            Marker::LeftAnkle => "left_ankle",
            Marker::RightAnkle => "right_ankle",
            Marker::LeftHeel => "left_heel",
            Marker::RightHeel => "right_heel",
            Marker::LeftFootIndex => "left_foot_index",
            Marker::RightFootIndex => "right_foot_index",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tracked point at one instant. Position is millimeters.
#[derive(Debug, Clone, Copy)]
pub struct MarkerSample {
    pub position: Vector3<f64>,
    /// Tracker confidence that the landmark was visible in the camera
    /// image. Candidate stream only; `None` for the reference stream.
    pub visibility: Option<f64>,
    /// Tracker confidence that the landmark exists at all. Candidate
    /// stream only.
    pub presence: Option<f64>,
}

impl MarkerSample {
    /// Sample without confidence fields, as produced for reference data.
    pub fn at(position: Vector3<f64>) -> Self {
        Self {
            position,
            visibility: None,
            presence: None,
        }
    }
}
