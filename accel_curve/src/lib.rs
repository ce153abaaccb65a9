//! Core acceleration-log measurement library implemented in Rust.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod crossing;
mod dyno;
mod interval;

pub use crossing::{locate, Crossing, Direction, LocateMode};
pub use dyno::{
    compute_dyno_curve, DriveType, DynoCurve, DynoParams, DynoPoint, PeakPoint, PowerType,
};
pub use interval::{
    measure_distance_from_speed, measure_rpm_range, measure_speed_range,
    DistanceFromSpeedResult, RpmRangeResult, SpeedRangeResult,
};

/// Fixed conversion factor between km/h and m/s.
pub const KMH_PER_MPS: f64 = 3.6;

/// Required CSV column holding the sample timestamp in milliseconds.
pub const TIME_COLUMN: &str = "Time [ms]";
/// Required CSV column holding vehicle speed in km/h.
pub const SPEED_COLUMN: &str = "Vehicle Speed [km/h]";
/// Required CSV column holding engine speed in RPM.
pub const RPM_COLUMN: &str = "Engine Speed (RPM) [1/min]";

#[derive(Error, Debug)]
pub enum AccelError {
    #[error("failed to parse CSV log: {0}")]
    CsvParse(String),
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error("insufficient data in log")]
    InsufficientData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Which per-sample value channel a measurement tracks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Channel {
    Speed,
    Rpm,
}

/// A time-sorted telemetry log as parallel equal-length channels.
///
/// Times are seconds from log start and must be monotonically increasing;
/// `from_columns` sorts on construction, and no measurement mutates the
/// series afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Series {
    pub time_s: Vec<f64>,
    pub speed_kmh: Vec<f64>,
    pub rpm: Vec<f64>,
}

impl Series {
    /// Build a series from raw columns, sorting samples by time.
    pub fn from_columns(
        time_s: Vec<f64>,
        speed_kmh: Vec<f64>,
        rpm: Vec<f64>,
    ) -> Result<Self, AccelError> {
        if time_s.len() != speed_kmh.len() || time_s.len() != rpm.len() {
            return Err(AccelError::InvalidParameter(
                "channel lengths do not match".to_string(),
            ));
        }
        if time_s.is_empty() {
            return Err(AccelError::InsufficientData);
        }
        let sorted = time_s.windows(2).all(|w| w[0] <= w[1]);
        if sorted {
            return Ok(Self {
                time_s,
                speed_kmh,
                rpm,
            });
        }
        let mut order: Vec<usize> = (0..time_s.len()).collect();
        order.sort_by(|&a, &b| {
            time_s[a]
                .partial_cmp(&time_s[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(Self {
            time_s: order.iter().map(|&i| time_s[i]).collect(),
            speed_kmh: order.iter().map(|&i| speed_kmh[i]).collect(),
            rpm: order.iter().map(|&i| rpm[i]).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }

    /// The selected value channel as a slice parallel to `time_s`.
    pub fn channel(&self, channel: Channel) -> &[f64] {
        match channel {
            Channel::Speed => &self.speed_kmh,
            Channel::Rpm => &self.rpm,
        }
    }
}

/// Parse a CSV telemetry log into a [`Series`].
///
/// Expects the `Time [ms]`, `Vehicle Speed [km/h]` and
/// `Engine Speed (RPM) [1/min]` columns; extra columns are ignored and rows
/// with missing or non-numeric cells in the required columns are dropped.
pub fn parse_log_csv(input: &[u8]) -> Result<Series, AccelError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| AccelError::CsvParse(e.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AccelError::MissingColumn(name.to_string()))
    };
    let time_idx = column(TIME_COLUMN)?;
    let speed_idx = column(SPEED_COLUMN)?;
    let rpm_idx = column(RPM_COLUMN)?;

    let mut time_s = Vec::new();
    let mut speed_kmh = Vec::new();
    let mut rpm = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AccelError::CsvParse(e.to_string()))?;
        let cell = |idx: usize| {
            record
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        if let (Some(t_ms), Some(v), Some(r)) = (cell(time_idx), cell(speed_idx), cell(rpm_idx)) {
            time_s.push(t_ms / 1000.0);
            speed_kmh.push(v);
            rpm.push(r);
        }
    }

    Series::from_columns(time_s, speed_kmh, rpm)
}

/// Linear interpolation of `values` at time `t`, clamped at both ends.
pub fn interp_at(times: &[f64], values: &[f64], t: f64) -> f64 {
    match times.len() {
        0 => 0.0,
        1 => values[0],
        n => {
            if t <= times[0] {
                return values[0];
            }
            if t >= times[n - 1] {
                return values[n - 1];
            }
            let hi = times.partition_point(|&x| x < t);
            let lo = hi - 1;
            let span = times[hi] - times[lo];
            if span <= f64::EPSILON {
                return values[lo];
            }
            let frac = (t - times[lo]) / span;
            values[lo] + frac * (values[hi] - values[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Time [ms],Engine Speed (RPM) [1/min],Vehicle Speed [km/h]
0,1000,10
500,1500,20
1000,2000,30
";

    #[test]
    fn test_parse_log_csv() {
        let series = parse_log_csv(LOG.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.time_s, vec![0.0, 0.5, 1.0]);
        assert_eq!(series.speed_kmh, vec![10.0, 20.0, 30.0]);
        assert_eq!(series.rpm, vec![1000.0, 1500.0, 2000.0]);
    }

    #[test]
    fn test_parse_log_csv_drops_incomplete_rows() {
        let log = "\
Time [ms],Engine Speed (RPM) [1/min],Vehicle Speed [km/h]
0,1000,10
500,,20
1000,2000,abc
1500,2500,40
";
        let series = parse_log_csv(log.as_bytes()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.speed_kmh, vec![10.0, 40.0]);
    }

    #[test]
    fn test_parse_log_csv_missing_column() {
        let log = "Time [ms],Vehicle Speed [km/h]\n0,10\n";
        match parse_log_csv(log.as_bytes()) {
            Err(AccelError::MissingColumn(name)) => assert_eq!(name, RPM_COLUMN),
            other => panic!("expected missing column error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_from_columns_sorts_by_time() {
        let series = Series::from_columns(
            vec![2.0, 0.0, 1.0],
            vec![30.0, 10.0, 20.0],
            vec![3000.0, 1000.0, 2000.0],
        )
        .unwrap();
        assert_eq!(series.time_s, vec![0.0, 1.0, 2.0]);
        assert_eq!(series.speed_kmh, vec![10.0, 20.0, 30.0]);
        assert_eq!(series.rpm, vec![1000.0, 2000.0, 3000.0]);
    }

    #[test]
    fn test_interp_at_clamps_and_interpolates() {
        let times = [0.0, 1.0, 2.0];
        let values = [10.0, 20.0, 40.0];
        assert_eq!(interp_at(&times, &values, -1.0), 10.0);
        assert_eq!(interp_at(&times, &values, 5.0), 40.0);
        assert!((interp_at(&times, &values, 0.5) - 15.0).abs() < 1e-12);
        assert!((interp_at(&times, &values, 1.5) - 30.0).abs() < 1e-12);
        assert_eq!(interp_at(&times, &values, 1.0), 20.0);
    }
}
