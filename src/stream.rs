//! Trajectory frame store: ordered per-instant marker samples for one
//! recording.

use std::collections::HashMap;

use anyhow::{Result, ensure};
use nalgebra::Vector3;

use crate::marker::{Marker, MarkerSample};

/// All marker samples captured at one sampling instant.
///
/// A marker absent from this instant is simply absent from the map.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Timestamp in milliseconds, monotonically non-decreasing across the
    /// owning stream.
    pub time_ms: f64,
    /// Frame number in the source recording.
    pub index: usize,
    pub markers: HashMap<Marker, MarkerSample>,
}

impl Frame {
    pub fn new(time_ms: f64, index: usize) -> Self {
        Self {
            time_ms,
            index,
            markers: HashMap::new(),
        }
    }

    /// Position of a marker in this frame, if tracked.
    pub fn position(&self, marker: Marker) -> Option<Vector3<f64>> {
        self.markers.get(&marker).map(|s| s.position)
    }
}

/// Ordered sequence of frames for one recording.
///
/// Timestamps increase strictly after clock re-basing; the stream is never
/// empty when handed to the deviation calculator.
#[derive(Debug, Clone)]
pub struct TrajectoryStream {
    pub frames: Vec<Frame>,
}

impl TrajectoryStream {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop `count` leading frames. Used when resolving frame offsets.
    pub fn drop_leading(&mut self, count: usize) {
        let count = count.min(self.frames.len());
        self.frames.drain(..count);
    }

    /// Re-base the clock so the first retained frame sits at zero.
    pub fn rebase_clock(&mut self) {
        let Some(origin) = self.frames.first().map(|f| f.time_ms) else {
            return;
        };
        for frame in &mut self.frames {
            frame.time_ms -= origin;
        }
    }

    /// Check the invariants required by the deviation calculator.
    pub fn validate(&self, label: &str) -> Result<()> {
        ensure!(!self.frames.is_empty(), "{label} stream is empty");
        for pair in self.frames.windows(2) {
            ensure!(
                pair[0].time_ms <= pair[1].time_ms,
                "{label} stream timestamps decrease at frame {}",
                pair[1].index
            );
        }
        Ok(())
    }

    /// Mean position of each requested marker over the frames that track
    /// it. Markers never tracked are absent from the result.
    pub fn marker_centers<'a>(
        &self,
        markers: impl IntoIterator<Item = &'a Marker>,
    ) -> HashMap<Marker, Vector3<f64>> {
        let mut centers = HashMap::new();
        for &marker in markers {
            let mut sum = Vector3::zeros();
            let mut count = 0usize;
            for frame in &self.frames {
                if let Some(sample) = frame.markers.get(&marker) {
                    sum += sample.position;
                    count += 1;
                }
            }
            if count > 0 {
                centers.insert(marker, sum / count as f64);
            }
        }
        centers
    }
}
