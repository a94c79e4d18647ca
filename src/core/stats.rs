use serde::Serialize;

/// Canonical percentile levels reported everywhere.
pub const BAND_LEVELS: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];
pub const BAND_LABELS: [&str; 5] = ["P5", "P25", "P50", "P75", "P95"];

/// Five-band summary of one distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandSummary {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl BandSummary {
    pub fn from_samples(values: &mut [f64]) -> Self {
        let [p5, p25, p50, p75, p95] = percentiles(values, BAND_LEVELS);
        Self {
            p5,
            p25,
            p50,
            p75,
            p95,
        }
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.p5, self.p25, self.p50, self.p75, self.p95]
    }

    pub fn is_ordered(&self) -> bool {
        self.as_array().windows(2).all(|w| w[0] <= w[1])
    }
}

/// Per-year five-band series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BandSeries {
    pub p5: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p95: Vec<f64>,
}

impl BandSeries {
    pub fn with_capacity(years: usize) -> Self {
        Self {
            p5: Vec::with_capacity(years),
            p25: Vec::with_capacity(years),
            p50: Vec::with_capacity(years),
            p75: Vec::with_capacity(years),
            p95: Vec::with_capacity(years),
        }
    }

    pub fn push(&mut self, bands: BandSummary) {
        self.p5.push(bands.p5);
        self.p25.push(bands.p25);
        self.p50.push(bands.p50);
        self.p75.push(bands.p75);
        self.p95.push(bands.p95);
    }

    pub fn len(&self) -> usize {
        self.p50.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p50.is_empty()
    }

    pub fn at(&self, year: usize) -> Option<BandSummary> {
        Some(BandSummary {
            p5: *self.p5.get(year)?,
            p25: *self.p25.get(year)?,
            p50: *self.p50.get(year)?,
            p75: *self.p75.get(year)?,
            p95: *self.p95.get(year)?,
        })
    }
}

/// Sorts once and reads every requested level with linear interpolation.
pub fn percentiles<const N: usize>(values: &mut [f64], levels: [f64; N]) -> [f64; N] {
    values.sort_by(|a, b| a.total_cmp(b));
    levels.map(|p| sorted_percentile(values, p))
}

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    sorted_percentile(values, p)
}

fn sorted_percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let (lo, hi) = (values[lower], values[upper]);
        let w = rank - lower as f64;
        (lo + (hi - lo) * w).clamp(lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, proptest};

    #[test]
    fn percentile_interpolates_between_points() {
        let mut values = vec![40.0, 10.0, 30.0, 20.0];
        assert!((percentile(&mut values, 50.0) - 25.0).abs() < 1e-12);
        assert!((percentile(&mut values, 0.0) - 10.0).abs() < 1e-12);
        assert!((percentile(&mut values, 100.0) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_single_samples() {
        assert_eq!(percentile(&mut [], 50.0), 0.0);
        assert_eq!(BandSummary::from_samples(&mut [7.0]).as_array(), [7.0; 5]);
    }

    #[test]
    fn band_series_reads_back_per_year() {
        let mut series = BandSeries::with_capacity(2);
        series.push(BandSummary::from_samples(&mut [1.0, 2.0, 3.0]));
        series.push(BandSummary::from_samples(&mut [4.0, 5.0, 6.0]));
        assert_eq!(series.len(), 2);
        assert_eq!(series.at(1).map(|b| b.p50), Some(5.0));
        assert!(series.at(2).is_none());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_band_summary_is_ordered(mut samples in vec(-1.0e6f64..1.0e6, 1..200)) {
            let bands = BandSummary::from_samples(&mut samples);
            prop_assert!(bands.is_ordered());
        }
    }
}
