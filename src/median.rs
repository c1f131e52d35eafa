//! Batch reduction: collapse a batch into one representative reading.
//!
//! Used when the uplink has given up on a batch — instead of dropping
//! thirty samples, the sensor node keeps one median sample in its flash
//! log. The median (not the mean) is deliberate: a single stuck-sensor
//! spike must not drag the preserved value.

use crate::reading::{ErrorKind, Reading};

/// Sensor id stamped on the result when the input is empty.
const DEFAULT_SENSOR_ID: u8 = 1;

fn median_f32(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 != 0 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

fn median_u32(values: &mut [u32]) -> u32 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 != 0 {
        values[mid]
    } else {
        // Average without overflowing the u32 sum.
        let lo = u64::from(values[mid - 1]);
        let hi = u64::from(values[mid]);
        ((lo + hi) / 2) as u32
    }
}

/// Reduce a batch to its median reading.
///
/// Readings flagged `SensorFailure` carry no data and are excluded from
/// the statistics; threshold violations (`TooLow`/`TooHigh`) still
/// count — they are real measurements. If nothing survives, the result
/// is itself a `SensorFailure` with NaN fields, so "no data" propagates
/// instead of a misleading zero.
///
/// Order-independent: the same multiset of readings always reduces to
/// the same result.
pub fn reduce_batch(readings: &[Reading]) -> Reading {
    let mut timestamps: Vec<u32> = Vec::new();
    let mut temps: Vec<f32> = Vec::new();
    let mut hums: Vec<f32> = Vec::new();

    for r in readings {
        if r.error_kind != ErrorKind::SensorFailure {
            timestamps.push(r.timestamp);
            temps.push(r.temperature);
            hums.push(r.humidity);
        }
    }

    let sensor_id = readings.first().map_or(DEFAULT_SENSOR_ID, |r| r.sensor_id);
    let no_data = temps.is_empty();

    Reading {
        sensor_id,
        timestamp: median_u32(&mut timestamps),
        temperature: median_f32(&mut temps),
        humidity: median_f32(&mut hums),
        is_error: no_data,
        error_kind: if no_data {
            ErrorKind::SensorFailure
        } else {
            ErrorKind::None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(ts: u32, t: f32, h: f32) -> Reading {
        Reading::ok(1, ts, t, h)
    }

    #[test]
    fn odd_count_takes_middle() {
        let batch = [ok(1, 20.0, 40.0), ok(2, 22.0, 50.0), ok(3, 24.0, 60.0)];
        let m = reduce_batch(&batch);
        assert_eq!(m.temperature, 22.0);
        assert_eq!(m.humidity, 50.0);
        assert_eq!(m.timestamp, 2);
        assert!(!m.is_error);
    }

    #[test]
    fn even_count_averages_middles() {
        let batch = [
            ok(1, 10.0, 30.0),
            ok(2, 20.0, 40.0),
            ok(3, 30.0, 50.0),
            ok(4, 40.0, 60.0),
        ];
        let m = reduce_batch(&batch);
        assert_eq!(m.temperature, 25.0);
        assert_eq!(m.humidity, 45.0);
    }

    #[test]
    fn order_independent() {
        let sorted = [ok(1, 18.0, 35.0), ok(2, 21.0, 45.0), ok(3, 24.0, 55.0)];
        let shuffled = [sorted[2], sorted[0], sorted[1]];
        assert_eq!(
            reduce_batch(&sorted).temperature,
            reduce_batch(&shuffled).temperature
        );
        assert_eq!(
            reduce_batch(&sorted).humidity,
            reduce_batch(&shuffled).humidity
        );
    }

    #[test]
    fn sensor_failures_excluded() {
        let batch = [
            ok(1, 20.0, 40.0),
            Reading::failed(1, 2, ErrorKind::SensorFailure),
            ok(3, 24.0, 60.0),
        ];
        let m = reduce_batch(&batch);
        assert_eq!(m.temperature, 22.0);
        assert_eq!(m.humidity, 50.0);
        assert!(!m.is_error);
    }

    #[test]
    fn threshold_errors_still_count() {
        let mut hot = ok(2, 40.0, 50.0);
        hot.mark_error(ErrorKind::TooHigh);
        let batch = [ok(1, 20.0, 50.0), hot, ok(3, 24.0, 50.0)];
        assert_eq!(reduce_batch(&batch).temperature, 24.0);
    }

    #[test]
    fn all_failures_yield_nan_failure() {
        let batch = [
            Reading::failed(1, 1, ErrorKind::SensorFailure),
            Reading::failed(1, 2, ErrorKind::SensorFailure),
        ];
        let m = reduce_batch(&batch);
        assert!(m.is_error);
        assert_eq!(m.error_kind, ErrorKind::SensorFailure);
        assert!(m.temperature.is_nan());
        assert!(m.humidity.is_nan());
        assert_eq!(m.timestamp, 0);
    }

    #[test]
    fn empty_input_uses_default_id() {
        let m = reduce_batch(&[]);
        assert_eq!(m.sensor_id, DEFAULT_SENSOR_ID);
        assert!(m.is_error);
        assert_eq!(m.error_kind, ErrorKind::SensorFailure);
    }

    #[test]
    fn sensor_id_taken_from_first_input() {
        let batch = [Reading::ok(7, 1, 20.0, 50.0)];
        assert_eq!(reduce_batch(&batch).sensor_id, 7);
    }
}
