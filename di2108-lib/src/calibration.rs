//! Linear calibration of one analog channel against a physical quantity.
//!
//! Calibration files are two-column CSV without a header: the known
//! reference value (e.g. distance in mm) followed by the measured voltage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// One operator-supplied reference pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub distance: f64,
    pub volts: f64,
}

impl CalibrationPoint {
    pub fn new(distance: f64, volts: f64) -> Self {
        Self { distance, volts }
    }
}

/// `distance = volts * slope + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl CalibrationModel {
    /// Ordinary least squares fit of distance on volts.
    pub fn fit(points: &[CalibrationPoint]) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::Calibration(format!(
                "need at least two points to fit a line, got {}",
                points.len()
            )));
        }

        let n = points.len() as f64;
        let mean_v = points.iter().map(|p| p.volts).sum::<f64>() / n;
        let mean_d = points.iter().map(|p| p.distance).sum::<f64>() / n;

        let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
            let dv = p.volts - mean_v;
            (sxx + dv * dv, sxy + dv * (p.distance - mean_d))
        });

        if sxx <= f64::EPSILON {
            return Err(Error::Calibration("all points share the same voltage".to_string()));
        }

        let slope = sxy / sxx;
        let intercept = mean_d - slope * mean_v;
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(Error::Calibration("fit did not converge to finite values".to_string()));
        }
        Ok(Self { slope, intercept })
    }

    pub fn volts_to_distance(&self, volts: f64) -> f64 {
        volts * self.slope + self.intercept
    }

    /// Fit the points stored in a calibration file.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let points = read_points(&path)?;
        let model = Self::fit(&points)?;
        info!(
            path = %path.as_ref().display(),
            points = points.len(),
            slope = model.slope,
            intercept = model.intercept,
            "Loaded calibration"
        );
        Ok(model)
    }
}

/// Read every (distance, volts) row of a calibration file.
pub fn read_points(path: impl AsRef<Path>) -> Result<Vec<CalibrationPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let points = reader.deserialize().collect::<Result<Vec<CalibrationPoint>, csv::Error>>()?;
    Ok(points)
}

/// Appends calibration rows as they are taken.
pub struct CalibrationRecorder<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CalibrationRecorder<File> {
    /// Create (or truncate) a calibration file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        Ok(Self { writer, rows: 0 })
    }
}

impl<W: Write> CalibrationRecorder<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(writer),
            rows: 0,
        }
    }

    pub fn record(&mut self, point: CalibrationPoint) -> Result<()> {
        self.writer.serialize(point)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| Error::Io(err.into_error()))
    }
}
