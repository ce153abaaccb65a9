// Dyno-style power/torque estimation from an acceleration log. Wheel force
// is reconstructed from a fixed longitudinal model (rolling resistance +
// aerodynamic drag + inertia) and converted to power and torque per sample.

use serde::{Deserialize, Serialize};

use crate::{AccelError, Series, KMH_PER_MPS};

const DRAG_COEFFICIENT: f64 = 0.32;
const FRONTAL_AREA_M2: f64 = 2.2;
const AIR_DENSITY_KG_M3: f64 = 1.225;
const ROLLING_RESISTANCE: f64 = 0.015;
const GRAVITY_MPS2: f64 = 9.81;
const WATTS_PER_HP: f64 = 735.5;

/// Drivetrain layout, fixing the assumed transmission loss.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriveType {
    Fwd,
    Rwd,
    Awd,
}

impl DriveType {
    pub fn loss_fraction(self) -> f64 {
        match self {
            DriveType::Fwd => 0.10,
            DriveType::Rwd => 0.15,
            DriveType::Awd => 0.20,
        }
    }
}

/// Whether to report wheel figures or scale up to crank figures.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerType {
    Wheel,
    Crank,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DynoParams {
    pub car_mass_kg: f64,
    pub drive: DriveType,
    pub power: PowerType,
}

impl Default for DynoParams {
    fn default() -> Self {
        Self {
            car_mass_kg: 1500.0,
            drive: DriveType::Fwd,
            power: PowerType::Wheel,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DynoPoint {
    pub rpm: f64,
    pub power_hp: f64,
    pub torque_nm: f64,
}

/// A peak value and the engine speed at which it occurs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PeakPoint {
    pub value: f64,
    pub rpm: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynoCurve {
    pub points: Vec<DynoPoint>,
    pub peak_power: PeakPoint,
    pub peak_torque: PeakPoint,
}

/// Compute per-sample power/torque and the curve peaks for one log.
///
/// Samples with rpm <= 0 are skipped; the torque formula divides by rpm.
pub fn compute_dyno_curve(series: &Series, params: &DynoParams) -> Result<DynoCurve, AccelError> {
    if params.car_mass_kg <= 0.0 {
        return Err(AccelError::InvalidParameter(
            "car mass must be positive".to_string(),
        ));
    }
    if series.len() < 2 {
        return Err(AccelError::InsufficientData);
    }

    let speeds_mps: Vec<f64> = series.speed_kmh.iter().map(|v| v / KMH_PER_MPS).collect();
    let accel = gradient(&speeds_mps, &series.time_s);
    let f_roll = ROLLING_RESISTANCE * params.car_mass_kg * GRAVITY_MPS2;
    let loss_scale = match params.power {
        PowerType::Wheel => 1.0,
        PowerType::Crank => 1.0 / (1.0 - params.drive.loss_fraction()),
    };

    let mut points = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let rpm = series.rpm[i];
        if rpm <= 0.0 {
            continue;
        }
        let v = speeds_mps[i];
        let f_aero = 0.5 * AIR_DENSITY_KG_M3 * DRAG_COEFFICIENT * FRONTAL_AREA_M2 * v * v;
        let f_acc = params.car_mass_kg * accel[i];
        let power_watt = (f_roll + f_aero + f_acc) * v;
        let power_hp = power_watt / WATTS_PER_HP * loss_scale;
        let torque_nm = power_watt * 60.0 / (2.0 * std::f64::consts::PI * rpm) * loss_scale;
        points.push(DynoPoint {
            rpm,
            power_hp,
            torque_nm,
        });
    }
    if points.is_empty() {
        return Err(AccelError::InsufficientData);
    }

    let peak_power = peak_by(&points, |p| p.power_hp);
    let peak_torque = peak_by(&points, |p| p.torque_nm);
    Ok(DynoCurve {
        points,
        peak_power,
        peak_torque,
    })
}

fn peak_by<F: Fn(&DynoPoint) -> f64>(points: &[DynoPoint], metric: F) -> PeakPoint {
    let mut best = &points[0];
    for point in points.iter().skip(1) {
        if metric(point) > metric(best) {
            best = point;
        }
    }
    PeakPoint {
        value: metric(best),
        rpm: best.rpm,
    }
}

/// Second-order finite-difference gradient over a possibly non-uniform
/// coordinate grid: central differences inside, one-sided at the ends.
fn gradient(values: &[f64], coords: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = vec![0.0; n];
    out[0] = (values[1] - values[0]) / (coords[1] - coords[0]);
    out[n - 1] = (values[n - 1] - values[n - 2]) / (coords[n - 1] - coords[n - 2]);
    for i in 1..n - 1 {
        let hs = coords[i] - coords[i - 1];
        let hd = coords[i + 1] - coords[i];
        out[i] = (hs * hs * values[i + 1] + (hd * hd - hs * hs) * values[i]
            - hd * hd * values[i - 1])
            / (hs * hd * (hd + hs));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Series;

    fn pull_series() -> Series {
        let time_s: Vec<f64> = (0..=100).map(|i| i as f64 / 10.0).collect();
        // 3 m/s^2 pull from 10 m/s.
        let speed_kmh: Vec<f64> = time_s.iter().map(|t| (10.0 + 3.0 * t) * KMH_PER_MPS).collect();
        let rpm: Vec<f64> = time_s.iter().map(|t| 2000.0 + 400.0 * t).collect();
        Series::from_columns(time_s, speed_kmh, rpm).unwrap()
    }

    #[test]
    fn test_gradient_linear_profile() {
        let coords: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let values: Vec<f64> = coords.iter().map(|t| 3.0 * t + 1.0).collect();
        for g in gradient(&values, &coords) {
            assert!((g - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gradient_non_uniform_grid() {
        let coords = [0.0, 1.0, 3.0, 4.0];
        let values: Vec<f64> = coords.iter().map(|t| t * t).collect();
        let grad = gradient(&values, &coords);
        // Quadratics are differentiated exactly by the interior stencil.
        assert!((grad[1] - 2.0).abs() < 1e-9);
        assert!((grad[2] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_dyno_wheel_power_matches_model() {
        let series = pull_series();
        let curve = compute_dyno_curve(&series, &DynoParams::default()).unwrap();
        assert_eq!(curve.points.len(), series.len());
        // Check one interior sample against the closed-form model.
        let i = 50;
        let v = series.speed_kmh[i] / KMH_PER_MPS;
        let f_total = 0.015 * 1500.0 * 9.81
            + 0.5 * 1.225 * 0.32 * 2.2 * v * v
            + 1500.0 * 3.0;
        let expected_hp = f_total * v / 735.5;
        assert!((curve.points[i].power_hp - expected_hp).abs() < expected_hp * 1e-3);
    }

    #[test]
    fn test_dyno_crank_scales_by_drive_loss() {
        let series = pull_series();
        let wheel = compute_dyno_curve(&series, &DynoParams::default()).unwrap();
        let crank = compute_dyno_curve(
            &series,
            &DynoParams {
                power: PowerType::Crank,
                drive: DriveType::Rwd,
                ..DynoParams::default()
            },
        )
        .unwrap();
        let ratio = crank.peak_power.value / wheel.peak_power.value;
        assert!((ratio - 1.0 / 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_dyno_skips_zero_rpm_samples() {
        let time_s = vec![0.0, 1.0, 2.0, 3.0];
        let speed_kmh = vec![36.0, 72.0, 108.0, 144.0];
        let rpm = vec![0.0, 2000.0, 3000.0, 4000.0];
        let series = Series::from_columns(time_s, speed_kmh, rpm).unwrap();
        let curve = compute_dyno_curve(&series, &DynoParams::default()).unwrap();
        assert_eq!(curve.points.len(), 3);
        assert!(curve.points.iter().all(|p| p.rpm > 0.0));
    }

    #[test]
    fn test_dyno_peaks_match_pointwise_maxima() {
        let series = pull_series();
        let curve = compute_dyno_curve(&series, &DynoParams::default()).unwrap();
        let max_hp = curve
            .points
            .iter()
            .fold(f64::NEG_INFINITY, |m, p| m.max(p.power_hp));
        let max_tq = curve
            .points
            .iter()
            .fold(f64::NEG_INFINITY, |m, p| m.max(p.torque_nm));
        assert_eq!(curve.peak_power.value, max_hp);
        assert_eq!(curve.peak_torque.value, max_tq);
        assert!(curve
            .points
            .iter()
            .any(|p| p.power_hp == max_hp && p.rpm == curve.peak_power.rpm));
        assert!(curve
            .points
            .iter()
            .any(|p| p.torque_nm == max_tq && p.rpm == curve.peak_torque.rpm));
    }

    #[test]
    fn test_dyno_rejects_bad_input() {
        let series = pull_series();
        let params = DynoParams {
            car_mass_kg: 0.0,
            ..DynoParams::default()
        };
        assert!(matches!(
            compute_dyno_curve(&series, &params),
            Err(AccelError::InvalidParameter(_))
        ));
        let short = Series::from_columns(vec![0.0], vec![10.0], vec![1000.0]).unwrap();
        assert!(matches!(
            compute_dyno_curve(&short, &DynoParams::default()),
            Err(AccelError::InsufficientData)
        ));
    }
}
