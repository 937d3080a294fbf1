//! Candidate-stream trajectory CSV parsing.
//!
//! One row per tracked landmark per frame: `frame, time, index, x, y, z,
//! visibility, presence`. Rows sharing a frame number collapse into one
//! [`Frame`]; the landmark index column maps onto [`Marker`] and rows
//! with no pose counterpart are dropped with a warning.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::warn;

use crate::marker::{Marker, MarkerSample};
use crate::stream::{Frame, TrajectoryStream};

#[derive(Debug, Deserialize)]
struct TrajectoryRow {
    frame: usize,
    time: f64,
    index: usize,
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    presence: Option<f64>,
}

/// Parse a trajectory CSV, scaling positions by `unit_conversion`
/// (e.g. 1000 for a recording in meters).
pub fn read_trajectory_csv<R: Read>(reader: R, unit_conversion: f64) -> Result<TrajectoryStream> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut frames: Vec<Frame> = Vec::new();
    for (line, row) in rdr.deserialize::<TrajectoryRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to parse trajectory row {}", line + 1))?;
        let Some(marker) = Marker::from_index(row.index) else {
            warn!(index = row.index, "unknown landmark index, dropping row");
            continue;
        };

        if frames.last().map_or(true, |f| f.index != row.frame) {
            frames.push(Frame::new(row.time, row.frame));
        }
        if let Some(frame) = frames.last_mut() {
            frame.markers.insert(
                marker,
                MarkerSample {
                    position: Vector3::new(row.x, row.y, row.z) * unit_conversion,
                    visibility: row.visibility,
                    presence: row.presence,
                },
            );
        }
    }
    ensure!(!frames.is_empty(), "trajectory CSV contains no rows");
    Ok(TrajectoryStream::new(frames))
}

/// Parse a trajectory CSV from a file path.
pub fn load_trajectory_csv<P: AsRef<Path>>(
    path: P,
    unit_conversion: f64,
) -> Result<TrajectoryStream> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_trajectory_csv(file, unit_conversion)
        .with_context(|| format!("Failed to read trajectory CSV {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FIXTURE: &str = "\
frame,time,index,x,y,z,visibility,presence
0,0,15,0.1,0.2,0.3,0.9,0.95
0,0,16,0.4,0.5,0.6,0.8,0.9
1,33,15,0.11,0.21,0.31,0.9,0.95
1,33,16,0.41,0.51,0.61,0.8,0.9
";

    #[test]
    fn rows_group_into_frames_and_scale() {
        let stream = read_trajectory_csv(FIXTURE.as_bytes(), 1000.0).unwrap();
        assert_eq!(stream.len(), 2);
        assert_relative_eq!(stream.frames[0].time_ms, 0.0);
        assert_relative_eq!(stream.frames[1].time_ms, 33.0);

        let wrist = stream.frames[0].markers[&Marker::LeftWrist];
        assert_relative_eq!(wrist.position, Vector3::new(100.0, 200.0, 300.0));
        assert_eq!(wrist.visibility, Some(0.9));
        assert_eq!(wrist.presence, Some(0.95));
        assert!(stream.frames[0].markers.contains_key(&Marker::RightWrist));
    }

    #[test]
    fn unknown_landmark_indices_are_dropped() {
        let fixture = "\
frame,time,index,x,y,z,visibility,presence
0,0,15,0.1,0.2,0.3,0.9,0.95
0,0,99,1.0,1.0,1.0,0.5,0.5
";
        let stream = read_trajectory_csv(fixture.as_bytes(), 1.0).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.frames[0].markers.len(), 1);
    }

    #[test]
    fn empty_input_is_an_error() {
        let fixture = "frame,time,index,x,y,z,visibility,presence\n";
        assert!(read_trajectory_csv(fixture.as_bytes(), 1.0).is_err());
    }
}
