// ─────────────────────────────────────────────────────────────────────
// OPBE Closure Kernel — Output Schedule
// ─────────────────────────────────────────────────────────────────────
//! Ascending list of output times, always ending at the end time.
//!
//! - linear:      start, start+Δ, …, snapping onto `end` once less than
//!                half a step remains
//! - logarithmic: the same rule in log10 space from log10(0.1) to
//!                log10(end−start), mapped back with start + 10^s
//! - explicit:    caller-given times, `end` appended if missing
//! - neither:     just `[end]`

use opbe_types::config::{OutputConfig, ScheduleMode};
use opbe_types::{OpbeError, OpbeResult};

/// First exponent of a logarithmic schedule, log10(0.1).
const LOG_SCHEDULE_ORIGIN: f64 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchedule {
    times: Vec<f64>,
}

impl OutputSchedule {
    pub fn from_config(output: &OutputConfig, start: f64, end: f64) -> OpbeResult<Self> {
        if end < start {
            return Err(OpbeError::Config(format!(
                "schedule: end time {end} is before start time {start}"
            )));
        }
        if let Some(times) = &output.times {
            return Self::explicit(times, start, end);
        }
        match (output.schedule, output.time_step) {
            (_, None) => Ok(Self { times: vec![end] }),
            (ScheduleMode::Linear, Some(step)) => Self::linear(start, end, step),
            (ScheduleMode::Logarithmic, Some(mult)) => Self::logarithmic(start, end, mult),
        }
    }

    pub fn linear(start: f64, end: f64, step: f64) -> OpbeResult<Self> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(OpbeError::Config(format!(
                "schedule: linear time step must be > 0, got {step}"
            )));
        }
        Ok(Self {
            times: linear_points(start, end, step),
        })
    }

    pub fn logarithmic(start: f64, end: f64, multiplier: f64) -> OpbeResult<Self> {
        if !(multiplier > 1.0) || !multiplier.is_finite() {
            return Err(OpbeError::Config(format!(
                "schedule: logarithmic multiplier must be > 1, got {multiplier}"
            )));
        }
        let span = end - start;
        if !(span > 0.1) {
            return Err(OpbeError::Config(format!(
                "schedule: logarithmic spacing needs end - start > 0.1, got {span}"
            )));
        }
        let exponents = linear_points(LOG_SCHEDULE_ORIGIN, span.log10(), multiplier.log10());
        let last = exponents.len() - 1;
        let times = exponents
            .iter()
            .enumerate()
            .map(|(i, s)| if i == last { end } else { start + 10f64.powf(*s) })
            .collect();
        Ok(Self { times })
    }

    pub fn explicit(times: &[f64], start: f64, end: f64) -> OpbeResult<Self> {
        if times.is_empty() {
            return Err(OpbeError::Config("schedule: empty time list".to_string()));
        }
        for pair in times.windows(2) {
            if !(pair[1] > pair[0]) {
                return Err(OpbeError::Config(format!(
                    "schedule: times must be strictly ascending, got {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(bad) = times.iter().find(|t| !(**t >= start && **t <= end)) {
            return Err(OpbeError::Config(format!(
                "schedule: time {bad} outside [{start}, {end}]"
            )));
        }
        let mut times = times.to_vec();
        if times.last().copied() != Some(end) {
            times.push(end);
        }
        Ok(Self { times })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn end(&self) -> f64 {
        self.times.last().copied().unwrap_or(f64::NAN)
    }
}

fn linear_points(start: f64, end: f64, step: f64) -> Vec<f64> {
    let mut points = vec![start];
    if end <= start {
        return points;
    }
    let mut t = start;
    loop {
        let next = t + step;
        if next <= t || end - next < 0.5 * step {
            points.push(end);
            return points;
        }
        points.push(next);
        t = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_includes_both_ends() {
        let s = OutputSchedule::linear(0.0, 1.0, 0.25).unwrap();
        assert_eq!(s.times(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_linear_snaps_short_remainder() {
        let s = OutputSchedule::linear(0.0, 1.04, 0.25).unwrap();
        assert_eq!(s.len(), 5);
        assert_eq!(s.end(), 1.04);
        let s = OutputSchedule::linear(0.0, 1.2, 0.25).unwrap();
        assert_eq!(s.times().last().copied(), Some(1.2));
        assert!((s.times()[4] - 1.0).abs() < 1e-12, "got {:?}", s.times());
    }

    #[test]
    fn test_linear_degenerate_span() {
        let s = OutputSchedule::linear(2.0, 2.0, 0.1).unwrap();
        assert_eq!(s.times(), &[2.0]);
    }

    #[test]
    fn test_linear_rejects_bad_step() {
        assert!(OutputSchedule::linear(0.0, 1.0, 0.0).is_err());
        assert!(OutputSchedule::linear(0.0, 1.0, -0.1).is_err());
    }

    #[test]
    fn test_logarithmic_ascending_to_end() {
        let s = OutputSchedule::logarithmic(1.0, 11.0, 10.0).unwrap();
        let t = s.times();
        assert_eq!(t.len(), 3, "got {t:?}");
        assert!((t[0] - 1.1).abs() < 1e-12);
        assert!((t[1] - 2.0).abs() < 1e-12);
        assert_eq!(t[2], 11.0);
        assert!(t.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_logarithmic_rejects_short_span() {
        assert!(OutputSchedule::logarithmic(0.0, 0.05, 1.1).is_err());
        assert!(OutputSchedule::logarithmic(0.0, 5.0, 1.0).is_err());
    }

    #[test]
    fn test_explicit_appends_end() {
        let s = OutputSchedule::explicit(&[0.1, 0.5], 0.0, 1.0).unwrap();
        assert_eq!(s.times(), &[0.1, 0.5, 1.0]);
        let s = OutputSchedule::explicit(&[0.1, 1.0], 0.0, 1.0).unwrap();
        assert_eq!(s.times(), &[0.1, 1.0]);
    }

    #[test]
    fn test_explicit_validation() {
        assert!(OutputSchedule::explicit(&[0.5, 0.2], 0.0, 1.0).is_err());
        assert!(OutputSchedule::explicit(&[0.5, 0.5], 0.0, 1.0).is_err());
        assert!(OutputSchedule::explicit(&[1.5], 0.0, 1.0).is_err());
        assert!(OutputSchedule::explicit(&[], 0.0, 1.0).is_err());
    }

    #[test]
    fn test_no_step_means_end_only() {
        let s = OutputSchedule::from_config(&OutputConfig::default(), 0.0, 3.0).unwrap();
        assert_eq!(s.times(), &[3.0]);
    }

    #[test]
    fn test_from_config_dispatch() {
        let out = OutputConfig {
            schedule: ScheduleMode::Linear,
            time_step: Some(0.5),
            ..OutputConfig::default()
        };
        let s = OutputSchedule::from_config(&out, 0.0, 1.0).unwrap();
        assert_eq!(s.times(), &[0.0, 0.5, 1.0]);
        let out = OutputConfig {
            times: Some(vec![0.25]),
            ..out
        };
        let s = OutputSchedule::from_config(&out, 0.0, 1.0).unwrap();
        assert_eq!(s.times(), &[0.25, 1.0]);
    }
}
