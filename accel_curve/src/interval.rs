// Interval measurements over a telemetry series: speed-range timing,
// RPM-band pull timing, and distance-from-speed timing. All three share the
// same bound-finding (two Up crossings) and trapezoidal distance
// integration; they differ only in which channel bounds the interval and
// which derived quantities are reported.

use serde::{Deserialize, Serialize};

use crate::crossing::{locate, Crossing, Direction, LocateMode};
use crate::{interp_at, Channel, Series, KMH_PER_MPS};

/// Result of a speed-to-speed acceleration measurement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpeedRangeResult {
    /// Speed actually achieved at the start boundary (km/h).
    pub start_speed_kmh: f64,
    /// Speed actually achieved at the end boundary (km/h).
    pub end_speed_kmh: f64,
    pub elapsed_s: f64,
    pub distance_m: f64,
    pub avg_acceleration_mps2: f64,
    pub start_time_s: f64,
    pub end_time_s: f64,
}

/// Result of an RPM-band pull measurement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RpmRangeResult {
    pub start_rpm: f64,
    pub end_rpm: f64,
    /// Vehicle speed at the start boundary, looked up against the full
    /// series (km/h).
    pub start_speed_kmh: f64,
    /// Vehicle speed at the end boundary, looked up against the full
    /// series (km/h).
    pub end_speed_kmh: f64,
    pub elapsed_s: f64,
    pub distance_m: f64,
    pub start_time_s: f64,
    pub end_time_s: f64,
}

/// Result of a distance-from-speed measurement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DistanceFromSpeedResult {
    pub start_speed_kmh: f64,
    pub end_speed_kmh: f64,
    /// The requested target distance (m).
    pub distance_m: f64,
    pub elapsed_s: f64,
    pub avg_speed_kmh: f64,
    pub start_time_s: f64,
    pub end_time_s: f64,
}

struct IntervalBounds {
    start: Crossing,
    end: Crossing,
}

/// Locate start and end crossings on the tracked channel, both searched
/// upward. The end search runs on the suffix at/after the start instant so
/// an already-satisfied end condition is detected at the start sample.
fn locate_bounds(
    series: &Series,
    channel: Channel,
    from_value: f64,
    to_value: f64,
    mode: LocateMode,
) -> Option<IntervalBounds> {
    let values = series.channel(channel);
    let times = &series.time_s;
    let start = locate(values, times, from_value, Direction::Up, mode)?;
    let begin = times.iter().position(|&t| t >= start.time)?;
    let end = locate(
        &values[begin..],
        &times[begin..],
        to_value,
        Direction::Up,
        mode,
    )?;
    Some(IntervalBounds { start, end })
}

/// Trapezoidal integral of a speed channel (m/s) over its time base.
fn trapezoid_distance(times: &[f64], speeds_mps: &[f64]) -> f64 {
    let mut distance = 0.0;
    for i in 1..times.len() {
        distance += (speeds_mps[i - 1] + speeds_mps[i]) / 2.0 * (times[i] - times[i - 1]);
    }
    distance
}

struct SliceIntegral {
    distance_m: f64,
    first_speed_mps: f64,
    last_speed_mps: f64,
}

/// Integrate the speed channel over the inclusive [start, end] time slice.
///
/// Requires at least two samples in the slice, with one exception: an
/// equal-boundary interval (start and end at the same instant) is defined
/// as a zero-length, zero-distance measurement rather than NotFound.
fn integrate_between(series: &Series, start_time: f64, end_time: f64) -> Option<SliceIntegral> {
    let first = series.time_s.iter().position(|&t| t >= start_time)?;
    let last = series.time_s.iter().rposition(|&t| t <= end_time)?;
    if last < first {
        return None;
    }
    let speeds_mps: Vec<f64> = series.speed_kmh[first..=last]
        .iter()
        .map(|v| v / KMH_PER_MPS)
        .collect();
    if speeds_mps.len() < 2 {
        if end_time - start_time == 0.0 {
            return Some(SliceIntegral {
                distance_m: 0.0,
                first_speed_mps: speeds_mps[0],
                last_speed_mps: speeds_mps[0],
            });
        }
        return None;
    }
    let distance_m = trapezoid_distance(&series.time_s[first..=last], &speeds_mps);
    Some(SliceIntegral {
        distance_m,
        first_speed_mps: speeds_mps[0],
        last_speed_mps: speeds_mps[speeds_mps.len() - 1],
    })
}

/// Reported boundary value: the requested target when interpolating (the
/// signal passes exactly through it), the sampled value otherwise. The mode
/// flag governs threshold detection only, never derived-value lookups.
fn achieved_value(requested: f64, crossing: &Crossing, mode: LocateMode) -> f64 {
    match mode {
        LocateMode::Interpolated => requested,
        LocateMode::Nearest => crossing.value_after,
    }
}

/// Measure elapsed time, distance and average acceleration between two
/// vehicle speeds (km/h). Returns `None` when either threshold is never
/// reached or the bounded slice cannot be integrated.
pub fn measure_speed_range(
    series: &Series,
    from_kmh: f64,
    to_kmh: f64,
    mode: LocateMode,
) -> Option<SpeedRangeResult> {
    let bounds = locate_bounds(series, Channel::Speed, from_kmh, to_kmh, mode)?;
    let integral = integrate_between(series, bounds.start.time, bounds.end.time)?;
    let elapsed_s = bounds.end.time - bounds.start.time;
    let avg_acceleration_mps2 = if elapsed_s > 0.0 {
        (integral.last_speed_mps - integral.first_speed_mps) / elapsed_s
    } else {
        0.0
    };
    Some(SpeedRangeResult {
        start_speed_kmh: achieved_value(from_kmh, &bounds.start, mode),
        end_speed_kmh: achieved_value(to_kmh, &bounds.end, mode),
        elapsed_s,
        distance_m: integral.distance_m,
        avg_acceleration_mps2,
        start_time_s: bounds.start.time,
        end_time_s: bounds.end.time,
    })
}

/// Measure elapsed time and distance between two engine speeds (RPM).
///
/// Boundary vehicle speeds are always looked up by linear interpolation
/// against the full series, even in nearest mode.
pub fn measure_rpm_range(
    series: &Series,
    from_rpm: f64,
    to_rpm: f64,
    mode: LocateMode,
) -> Option<RpmRangeResult> {
    let bounds = locate_bounds(series, Channel::Rpm, from_rpm, to_rpm, mode)?;
    let integral = integrate_between(series, bounds.start.time, bounds.end.time)?;
    let elapsed_s = bounds.end.time - bounds.start.time;
    Some(RpmRangeResult {
        start_rpm: achieved_value(from_rpm, &bounds.start, mode),
        end_rpm: achieved_value(to_rpm, &bounds.end, mode),
        start_speed_kmh: interp_at(&series.time_s, &series.speed_kmh, bounds.start.time),
        end_speed_kmh: interp_at(&series.time_s, &series.speed_kmh, bounds.end.time),
        elapsed_s,
        distance_m: integral.distance_m,
        start_time_s: bounds.start.time,
        end_time_s: bounds.end.time,
    })
}

/// Measure the time to cover `target_distance_m` starting from the instant
/// the vehicle first reaches `start_kmh`.
pub fn measure_distance_from_speed(
    series: &Series,
    start_kmh: f64,
    target_distance_m: f64,
    mode: LocateMode,
) -> Option<DistanceFromSpeedResult> {
    let start = locate(
        &series.speed_kmh,
        &series.time_s,
        start_kmh,
        Direction::Up,
        mode,
    )?;
    let begin = series.time_s.iter().position(|&t| t >= start.time)?;
    let times = &series.time_s[begin..];
    if times.len() < 2 {
        return None;
    }
    let speeds_mps: Vec<f64> = series.speed_kmh[begin..]
        .iter()
        .map(|v| v / KMH_PER_MPS)
        .collect();

    // Cumulative distance per consecutive-pair boundary; cumulative[i] is
    // the distance covered up to sample i + 1 of the suffix.
    let mut cumulative = Vec::with_capacity(times.len() - 1);
    let mut total = 0.0;
    for i in 1..times.len() {
        total += (speeds_mps[i - 1] + speeds_mps[i]) / 2.0 * (times[i] - times[i - 1]);
        cumulative.push(total);
    }

    let idx = cumulative.iter().position(|&d| d >= target_distance_m)?;
    if idx == 0 {
        // The very first interval already exceeds the target; there is no
        // preceding pair boundary to interpolate from.
        return None;
    }
    let dist_before = cumulative[idx - 1];
    let dist_after = cumulative[idx];
    let time_before = times[idx];
    let time_after = times[idx + 1];
    let end_time = if dist_after == dist_before {
        time_before
    } else {
        let fraction = (target_distance_m - dist_before) / (dist_after - dist_before);
        time_before + fraction * (time_after - time_before)
    };

    let elapsed_s = end_time - start.time;
    let avg_speed_kmh = if elapsed_s > 0.0 {
        target_distance_m / elapsed_s * KMH_PER_MPS
    } else {
        0.0
    };
    Some(DistanceFromSpeedResult {
        start_speed_kmh: achieved_value(start_kmh, &start, mode),
        end_speed_kmh: interp_at(&series.time_s, &series.speed_kmh, end_time),
        distance_m: target_distance_m,
        elapsed_s,
        avg_speed_kmh,
        start_time_s: start.time,
        end_time_s: end_time,
    })
}
