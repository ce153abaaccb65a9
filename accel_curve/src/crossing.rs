// Threshold-crossing search over a sampled channel. Finds the first instant
// at which a value channel satisfies a target comparison, either by linear
// interpolation between the bracketing samples or by snapping to the nearest
// sample.

use serde::{Deserialize, Serialize};

/// Search direction for the threshold comparison.
///
/// `Up` matches the first sample with `value >= target`; `Down` matches the
/// first sample with `value <= target`. Comparisons are literal, with no
/// epsilon tolerance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Precision mode for locating the crossing instant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocateMode {
    /// Linearly interpolate the crossing time between bracketing samples.
    Interpolated,
    /// Snap to whichever bracketing sample is closer in value to the target.
    Nearest,
}

/// A located threshold crossing.
///
/// `value_before`/`value_after` are the channel values bracketing the
/// crossing; in nearest mode both hold the chosen sample's value.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Crossing {
    pub time: f64,
    pub value_before: f64,
    pub value_after: f64,
}

impl Crossing {
    fn at_sample(times: &[f64], values: &[f64], idx: usize) -> Self {
        Self {
            time: times[idx],
            value_before: values[idx],
            value_after: values[idx],
        }
    }
}

/// Find the first time `values` crosses `target` in the given direction.
///
/// `values` and `times` are parallel equal-length channels sorted ascending
/// by time. Returns `None` when the threshold is never reached; this is the
/// NotFound outcome, not an error. Exception: in nearest mode the search
/// never fully fails on a non-empty series: an `Up` search with no
/// qualifying sample clamps to the last sample and a `Down` search clamps
/// to the first. That asymmetry matters near series boundaries and is kept
/// deliberately.
pub fn locate(
    values: &[f64],
    times: &[f64],
    target: f64,
    direction: Direction,
    mode: LocateMode,
) -> Option<Crossing> {
    let satisfied = |v: f64| match direction {
        Direction::Up => v >= target,
        Direction::Down => v <= target,
    };
    let first_idx = values.iter().position(|&v| satisfied(v));

    match mode {
        LocateMode::Interpolated => {
            let idx = first_idx?;
            if idx == 0 {
                // Condition already true at the series start; there is no
                // "before" sample to interpolate against.
                return Some(Crossing::at_sample(times, values, 0));
            }
            let value_before = values[idx - 1];
            let value_after = values[idx];
            let time_before = times[idx - 1];
            if value_after == value_before {
                // Flat segment; keep the earlier time instead of dividing by zero.
                return Some(Crossing {
                    time: time_before,
                    value_before,
                    value_after,
                });
            }
            let fraction = (target - value_before) / (value_after - value_before);
            Some(Crossing {
                time: time_before + fraction * (times[idx] - time_before),
                value_before,
                value_after,
            })
        }
        LocateMode::Nearest => {
            if values.is_empty() {
                return None;
            }
            let idx = match first_idx {
                Some(idx) => idx,
                None => {
                    let clamp = match direction {
                        Direction::Up => values.len() - 1,
                        Direction::Down => 0,
                    };
                    return Some(Crossing::at_sample(times, values, clamp));
                }
            };
            if idx > 0 {
                let dist_prev = (values[idx - 1] - target).abs();
                let dist_curr = (values[idx] - target).abs();
                // Ties favor the crossing-index sample.
                if dist_prev < dist_curr {
                    return Some(Crossing::at_sample(times, values, idx - 1));
                }
            }
            Some(Crossing::at_sample(times, values, idx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> (Vec<f64>, Vec<f64>) {
        let times: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let values: Vec<f64> = (0..=10).map(|i| (i * 10) as f64).collect();
        (values, times)
    }

    #[test]
    fn test_interpolated_crossing_up() {
        let (values, times) = ramp();
        let crossing =
            locate(&values, &times, 25.0, Direction::Up, LocateMode::Interpolated).unwrap();
        assert!((crossing.time - 2.5).abs() < 1e-12);
        assert_eq!(crossing.value_before, 20.0);
        assert_eq!(crossing.value_after, 30.0);
    }

    #[test]
    fn test_interpolated_crossing_down() {
        let (mut values, times) = ramp();
        values.reverse();
        let crossing =
            locate(&values, &times, 25.0, Direction::Down, LocateMode::Interpolated).unwrap();
        assert!((crossing.time - 7.5).abs() < 1e-12);
        assert_eq!(crossing.value_before, 30.0);
        assert_eq!(crossing.value_after, 20.0);
    }

    #[test]
    fn test_interpolated_condition_true_at_start() {
        let (values, times) = ramp();
        let crossing =
            locate(&values, &times, -5.0, Direction::Up, LocateMode::Interpolated).unwrap();
        assert_eq!(crossing.time, 0.0);
        assert_eq!(crossing.value_before, 0.0);
        assert_eq!(crossing.value_after, 0.0);
    }

    #[test]
    fn test_interpolated_exact_sample_hit() {
        let values = [0.0, 50.0, 50.0, 100.0];
        let times = [0.0, 1.0, 2.0, 3.0];
        // Target sits exactly on the first qualifying sample; the fraction is
        // 1.0 and the crossing lands on that sample's own time.
        let crossing =
            locate(&values, &times, 50.0, Direction::Up, LocateMode::Interpolated).unwrap();
        assert!((crossing.time - 1.0).abs() < 1e-12);
        assert_eq!(crossing.value_before, 0.0);
        assert_eq!(crossing.value_after, 50.0);
    }

    #[test]
    fn test_interpolated_constant_series_returns_first_time() {
        let flat = [50.0, 50.0, 50.0];
        let times = [4.0, 5.0, 6.0];
        let crossing =
            locate(&flat, &times, 50.0, Direction::Up, LocateMode::Interpolated).unwrap();
        assert_eq!(crossing.time, 4.0);
        assert_eq!(crossing.value_before, 50.0);
        assert_eq!(crossing.value_after, 50.0);
    }

    #[test]
    fn test_interpolated_unreachable_target_is_not_found() {
        let (values, times) = ramp();
        assert!(locate(&values, &times, 250.0, Direction::Up, LocateMode::Interpolated).is_none());
        assert!(locate(&values, &times, -10.0, Direction::Down, LocateMode::Interpolated).is_none());
    }

    #[test]
    fn test_nearest_picks_closer_sample() {
        let (values, times) = ramp();
        let crossing = locate(&values, &times, 24.0, Direction::Up, LocateMode::Nearest).unwrap();
        assert_eq!(crossing.value_after, 20.0);
        assert_eq!(crossing.time, 2.0);
        let crossing = locate(&values, &times, 26.0, Direction::Up, LocateMode::Nearest).unwrap();
        assert_eq!(crossing.value_after, 30.0);
        assert_eq!(crossing.time, 3.0);
    }

    #[test]
    fn test_nearest_tie_favors_crossing_sample() {
        let (values, times) = ramp();
        let crossing = locate(&values, &times, 25.0, Direction::Up, LocateMode::Nearest).unwrap();
        assert_eq!(crossing.value_after, 30.0);
    }

    #[test]
    fn test_nearest_up_clamps_to_last_sample() {
        let (values, times) = ramp();
        let crossing = locate(&values, &times, 250.0, Direction::Up, LocateMode::Nearest).unwrap();
        assert_eq!(crossing.time, 10.0);
        assert_eq!(crossing.value_after, 100.0);
    }

    #[test]
    fn test_nearest_down_clamps_to_first_sample() {
        let (values, times) = ramp();
        let crossing =
            locate(&values, &times, -10.0, Direction::Down, LocateMode::Nearest).unwrap();
        assert_eq!(crossing.time, 0.0);
        assert_eq!(crossing.value_after, 0.0);
    }

    #[test]
    fn test_locate_is_deterministic() {
        let (values, times) = ramp();
        let a = locate(&values, &times, 37.0, Direction::Up, LocateMode::Interpolated).unwrap();
        let b = locate(&values, &times, 37.0, Direction::Up, LocateMode::Interpolated).unwrap();
        assert_eq!(a, b);
    }
}
