//! Parsing of the two source recording formats into trajectory streams.
//!
//! The engine itself has no format dependency; anything that produces a
//! [`crate::stream::TrajectoryStream`] works. These parsers cover the
//! reference setup: a QTM tab-separated export for the base recording and
//! a per-landmark trajectory CSV for the candidate recording. Unit
//! conversion to millimeters happens here, once — the engine always
//! operates in millimeters.

pub mod qtm;
pub mod trajectory_csv;

pub use qtm::{load_qtm_tsv, read_qtm_tsv};
pub use trajectory_csv::{load_trajectory_csv, read_trajectory_csv};
