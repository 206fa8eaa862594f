//! CSV report parsing for probe hosts.
//!
//! Pure functions over the text served at `/cgi-bin/state.cgi` — no HTTP
//! here. One line per sensor, comma-separated:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | 0 | display name |
//! | 4 | reading — Fahrenheit, or relative humidity when the name says so |
//!
//! The other fields (firmware, uptime, color hints) are ignored. Line
//! position is identity: records are keyed `{host}/{line-index}` counted
//! over the raw newline split, so a skipped line never shifts the keys of
//! the lines after it.

use lanbridge_domain::record::{DeviceRecord, DeviceState};

/// Parse a full report body into one record per usable line.
///
/// Skipped lines: empty, no comma, fewer than five fields, or a field 4
/// that does not parse as a float after trimming. A name containing
/// `humidity` (any case) makes the line a humidity sensor with the value
/// taken verbatim; every other line is a thermometer reporting Fahrenheit,
/// converted to Celsius.
#[must_use]
pub fn parse_report(host: &str, body: &str) -> Vec<DeviceRecord> {
    let mut records = Vec::new();
    for (index, line) in body.split('\n').enumerate() {
        if line.is_empty() || !line.contains(',') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let name = fields[0];
        let Some(raw) = fields.get(4).and_then(|field| field.trim().parse::<f64>().ok()) else {
            tracing::debug!(host, index, "report line without a usable value skipped");
            continue;
        };

        let state = if name.to_uppercase().contains("HUMIDITY") {
            DeviceState::Humidity { percent: raw }
        } else {
            DeviceState::Thermometer {
                celsius: fahrenheit_to_celsius(raw),
            }
        };
        records.push(DeviceRecord::new(format!("{host}/{index}"), name, state));
    }
    records
}

#[must_use]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const GARAGE_LINE: &str = "Garage,0.9.7,8,42M, 53.2616, 1 wk 2 days,v1,#ff2600\n";

    #[test]
    fn should_parse_thermometer_line_as_celsius() {
        let records = parse_report("192.168.1.77", GARAGE_LINE);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.key.as_str(), "192.168.1.77/0");
        assert_eq!(record.name, "Garage");
        let celsius = record.state.reading().unwrap();
        assert!((celsius - 11.812).abs() < 0.001);
    }

    #[test]
    fn should_keep_humidity_value_verbatim() {
        for name in ["Crawlspace humidity", "CRAWLSPACE HUMIDITY", "Humidity 2"] {
            let body = format!("{name},0.9.7,8,42M, 61.5, 1 wk,v1,#00ff00");
            let records = parse_report("192.168.1.77", &body);
            assert_eq!(records.len(), 1, "line {name:?} should parse");
            assert_eq!(
                records[0].state,
                DeviceState::Humidity { percent: 61.5 },
                "line {name:?} should stay verbatim"
            );
        }
    }

    #[test]
    fn should_keep_line_indices_across_skipped_lines() {
        let body = "Attic,0.9.7,8,42M, 68.0, 1 wk,v1,#ff0000\n\nBasement,0.9.7,9,42M, 50.0, 1 wk,v1,#0000ff";
        let records = parse_report("192.168.1.77", body);
        let keys: Vec<_> = records.iter().map(|record| record.key.as_str()).collect();
        assert_eq!(keys, vec!["192.168.1.77/0", "192.168.1.77/2"]);
    }

    #[test]
    fn should_skip_lines_without_commas() {
        let body = "banner text\nGarage,0.9.7,8,42M, 53.2616, 1 wk,v1,#ff2600";
        let records = parse_report("h", body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_str(), "h/1");
    }

    #[test]
    fn should_skip_lines_with_unparseable_values() {
        let body = "Garage,0.9.7,8,42M, n/a, 1 wk,v1,#ff2600";
        assert!(parse_report("h", body).is_empty());
    }

    #[test]
    fn should_skip_short_lines_missing_the_value_field() {
        let body = "Garage,0.9.7,8";
        assert!(parse_report("h", body).is_empty());
    }

    #[test]
    fn should_convert_freezing_point() {
        let records = parse_report("h", "Outside,0,0,0,32.0,0,0,0");
        assert!(records[0].state.reading().unwrap().abs() < 1e-9);
    }

    #[test]
    fn should_convert_negative_fahrenheit() {
        let records = parse_report("h", "Freezer,0,0,0, -4.0 ,0,0,0");
        let celsius = records[0].state.reading().unwrap();
        assert!((celsius - (-20.0)).abs() < 1e-9);
    }
}
