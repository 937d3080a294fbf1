//! Reference-stream parsing of QTM tab-separated exports.
//!
//! The export opens with an eleven-line header (frame count, camera
//! count, marker count, capture frequency, marker names, ...) followed by
//! one row of `3 * n_markers` coordinates per frame. QTM does not write
//! per-frame timestamps; they are synthesized from the capture frequency.
//! Positions are already in millimeters.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use nalgebra::Vector3;
use tracing::warn;

use crate::marker::{Marker, MarkerSample};
use crate::stream::{Frame, TrajectoryStream};

fn next_header<R: Read>(
    records: &mut csv::StringRecordsIter<'_, R>,
    key: &str,
) -> Result<csv::StringRecord> {
    let record = records
        .next()
        .with_context(|| format!("QTM export is missing the {key} header line"))?;
    let record = record.with_context(|| format!("Malformed {key} header line"))?;
    ensure!(
        record.get(0) == Some(key),
        "expected {key} header line, found {:?}",
        record.get(0)
    );
    Ok(record)
}

fn header_value(record: &csv::StringRecord, key: &str) -> Result<String> {
    Ok(record
        .get(1)
        .with_context(|| format!("{key} header line has no value"))?
        .trim()
        .to_string())
}

fn coordinate(record: &csv::StringRecord, field: usize, row: usize) -> Result<f64> {
    record
        .get(field)
        .with_context(|| format!("QTM data row {row} is missing field {field}"))?
        .trim()
        .parse()
        .with_context(|| format!("QTM data row {row} field {field} is not a number"))
}

/// Parse a QTM tab-separated export.
///
/// Marker columns whose label has no pose counterpart are dropped with a
/// warning; everything else about the header is validated strictly.
pub fn read_qtm_tsv<R: Read>(reader: R) -> Result<TrajectoryStream> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records();

    next_header(&mut records, "NO_OF_FRAMES")?;
    next_header(&mut records, "NO_OF_CAMERAS")?;
    let markers_line = next_header(&mut records, "NO_OF_MARKERS")?;
    let no_of_markers: usize = header_value(&markers_line, "NO_OF_MARKERS")?
        .parse()
        .context("NO_OF_MARKERS is not a count")?;
    let frequency_line = next_header(&mut records, "FREQUENCY")?;
    let frequency: f64 = header_value(&frequency_line, "FREQUENCY")?
        .parse()
        .context("FREQUENCY is not a number")?;
    ensure!(frequency > 0.0, "capture frequency must be positive");
    next_header(&mut records, "NO_OF_ANALOG")?;
    next_header(&mut records, "ANALOG_FREQUENCY")?;
    next_header(&mut records, "DESCRIPTION")?;
    next_header(&mut records, "TIME_STAMP")?;
    let data_line = next_header(&mut records, "DATA_INCLUDED")?;
    ensure!(
        data_line.get(1).map(str::trim) == Some("3D"),
        "only 3D QTM exports are supported"
    );
    let names_line = next_header(&mut records, "MARKER_NAMES")?;
    let labels: Vec<String> = names_line
        .iter()
        .skip(1)
        .map(|label| label.trim().to_string())
        .collect();
    ensure!(
        labels.len() == no_of_markers,
        "MARKER_NAMES lists {} markers, NO_OF_MARKERS says {no_of_markers}",
        labels.len()
    );
    next_header(&mut records, "TRAJECTORY_TYPES")?;

    // resolve labels once; unmapped columns are dropped for every frame
    let columns: Vec<Option<Marker>> = labels
        .iter()
        .map(|label| {
            let marker = Marker::from_qtm_label(label);
            if marker.is_none() {
                warn!(label = %label, "no pose counterpart for QTM marker, dropping column");
            }
            marker
        })
        .collect();

    let time_delta = 1000.0 / frequency;
    let mut frames = Vec::new();
    for (row, record) in records.enumerate() {
        let record = record.with_context(|| format!("Malformed QTM data row {row}"))?;
        ensure!(
            record.len() == no_of_markers * 3,
            "QTM data row {row} has {} fields, expected {}",
            record.len(),
            no_of_markers * 3
        );
        let mut frame = Frame::new(row as f64 * time_delta, row);
        for (column, marker) in columns.iter().enumerate() {
            let Some(marker) = marker else { continue };
            let position = Vector3::new(
                coordinate(&record, column * 3, row)?,
                coordinate(&record, column * 3 + 1, row)?,
                coordinate(&record, column * 3 + 2, row)?,
            );
            frame.markers.insert(*marker, MarkerSample::at(position));
        }
        frames.push(frame);
    }
    ensure!(!frames.is_empty(), "QTM export contains no data rows");
    Ok(TrajectoryStream::new(frames))
}

/// Parse a QTM export from a file path.
pub fn load_qtm_tsv<P: AsRef<Path>>(path: P) -> Result<TrajectoryStream> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_qtm_tsv(file).with_context(|| format!("Failed to read QTM export {}", path.display()))
}
