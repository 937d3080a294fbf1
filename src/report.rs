//! Human-readable run report.
//!
//! Renders the resolved alignment, calibration, per-marker and aggregate
//! statistics of a finished comparison to any writer. Charting is done
//! elsewhere; this is the textual companion saved next to the plots.

use std::io::Write;

use anyhow::Result;
use nalgebra::Vector3;

use crate::compare::ComparisonReport;
use crate::config::CompareConfig;
use crate::deviation::{DeviationSample, DeviationStats};

/// Mean absolute first difference of a deviation series per axis; a
/// jitter measure of the candidate signal around the reference.
pub fn stability(series: &[DeviationSample]) -> Vector3<f64> {
    if series.len() < 2 {
        return Vector3::zeros();
    }
    let mut sum = Vector3::zeros();
    for pair in series.windows(2) {
        sum += (pair[1].signed - pair[0].signed).abs();
    }
    sum / (series.len() - 1) as f64
}

fn write_stats<W: Write>(w: &mut W, indent: &str, stats: &DeviationStats) -> Result<()> {
    writeln!(
        w,
        "{indent}offset:    ({:+.3}, {:+.3}, {:+.3})",
        stats.offset.x, stats.offset.y, stats.offset.z
    )?;
    writeln!(
        w,
        "{indent}absolute:  ({:.3}, {:.3}, {:.3})",
        stats.absolute.x, stats.absolute.y, stats.absolute.z
    )?;
    writeln!(w, "{indent}euclidean: {:.3}", stats.euclidean)?;
    Ok(())
}

/// Write the full run report.
pub fn write_report<W: Write>(
    w: &mut W,
    config: &CompareConfig,
    report: &ComparisonReport,
) -> Result<()> {
    writeln!(
        w,
        "Comparison of {} against {}",
        config.diff_label, config.base_label
    )?;
    writeln!(w, "  base recording: {}", config.base_recording)?;
    writeln!(w, "  diff recording: {}", config.diff_recording)?;
    writeln!(w)?;

    writeln!(w, "Resolved alignment")?;
    writeln!(w, "  base frame offset: {}", report.offsets.base)?;
    writeln!(w, "  diff frame offset: {}", report.offsets.diff)?;
    writeln!(
        w,
        "  base rotation: {:.3} deg",
        report.calibration.rotation_degrees
    )?;
    let stretch = report.calibration.stretch;
    writeln!(
        w,
        "  diff stretch: ({:.4}, {:.4}, {:.4})",
        stretch.x, stretch.y, stretch.z
    )?;
    writeln!(w, "  merge steps: {}", report.merge_steps)?;
    writeln!(w)?;

    writeln!(w, "Per-marker mean deviation (mm)")?;
    for (marker, stats) in &report.per_marker {
        writeln!(w, "  {marker}")?;
        write_stats(w, "    ", stats)?;
        if let Some(series) = report.series.get(marker) {
            let jitter = stability(series);
            writeln!(
                w,
                "    stability: ({:.3}, {:.3}, {:.3})",
                jitter.x, jitter.y, jitter.z
            )?;
        }
    }
    writeln!(w)?;

    writeln!(w, "Aggregate over {} markers", report.per_marker.len())?;
    write_stats(w, "  ", &report.aggregate)?;
    Ok(())
}
