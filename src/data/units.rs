//! Engineering-unit helpers: the 1-2-5 series used for scale selection and
//! compact SI formatting for log lines and notifications.

const SERIES: [f64; 3] = [1.0, 2.0, 5.0];

/// Smallest value of the 1-2-5 series that is `>= value`.
///
/// Non-positive or non-finite input is returned unchanged.
///
/// ```
/// # use panoscope::data::units::nice_ceil;
/// assert_eq!(nice_ceil(0.33), 0.5);
/// assert_eq!(nice_ceil(2.0), 2.0);
/// assert_eq!(nice_ceil(7.0), 10.0);
/// ```
pub fn nice_ceil(value: f64) -> f64 {
    if !(value.is_finite() && value > 0.0) {
        return value;
    }
    let mut decade = 10f64.powf(value.log10().floor());
    loop {
        for m in SERIES {
            let candidate = m * decade;
            // tolerate representation error, e.g. 0.2 stored as 0.2000000001
            if candidate >= value * (1.0 - 1e-9) {
                return candidate;
            }
        }
        decade *= 10.0;
    }
}

fn format_si(value: f64, unit: &str) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value} {unit}");
    }
    const PREFIXES: [(f64, &str); 6] = [
        (1.0, ""),
        (1e-3, "m"),
        (1e-6, "µ"),
        (1e-9, "n"),
        (1e-12, "p"),
        (1e3, "k"),
    ];
    let abs = value.abs();
    let (scale, prefix) = if abs >= 1e3 {
        PREFIXES[5]
    } else {
        PREFIXES[..5]
            .iter()
            .copied()
            .find(|(scale, _)| abs >= *scale)
            .unwrap_or(PREFIXES[4])
    };
    let scaled = value / scale;
    let txt = format!("{scaled:.3}");
    let txt = txt.trim_end_matches('0').trim_end_matches('.');
    format!("{txt} {prefix}{unit}")
}

/// `1.5e-3` → `"1.5 ms"`.
pub fn format_seconds(value: f64) -> String {
    format_si(value, "s")
}

/// `0.12` → `"120 mV"`.
pub fn format_volts(value: f64) -> String {
    format_si(value, "V")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nice_ceil_handles_decades() {
        assert_eq!(nice_ceil(1.0), 1.0);
        assert_eq!(nice_ceil(1.01), 2.0);
        assert_eq!(nice_ceil(4.9), 5.0);
        assert!((nice_ceil(0.0011) - 0.002).abs() < 1e-15);
        assert_eq!(nice_ceil(-1.0), -1.0);
    }

    #[test]
    fn formats_with_prefix() {
        assert_eq!(format_seconds(1.5e-3), "1.5 ms");
        assert_eq!(format_seconds(2.0), "2 s");
        assert_eq!(format_volts(0.12), "120 mV");
        assert_eq!(format_seconds(-5e-9), "-5 ns");
        assert_eq!(format_volts(1500.0), "1.5 kV");
    }
}
