use serde::{Deserialize, Serialize};

use crate::error::{FireError, FireResult};

/// First calendar year of the bundled series.
pub const SP500_START_YEAR: u32 = 1928;

/// S&P 500 annual total returns (dividends reinvested), 1928 onwards.
const SP500_TOTAL_RETURNS: &[f64] = &[
    0.4381, -0.0830, -0.2512, -0.4384, -0.0864, 0.4998, -0.0119, 0.4674, 0.3194, -0.3534, // 1928
    0.2928, -0.0110, -0.1067, -0.1277, 0.1917, 0.2506, 0.1903, 0.3582, -0.0843, 0.0520, // 1938
    0.0570, 0.1830, 0.3081, 0.2368, 0.1815, -0.0121, 0.5256, 0.3260, 0.0744, -0.1046, // 1948
    0.4372, 0.1206, 0.0034, 0.2664, -0.0881, 0.2261, 0.1642, 0.1240, -0.0997, 0.2380, // 1958
    0.1081, -0.0824, 0.0356, 0.1422, 0.1876, -0.1431, -0.2590, 0.3700, 0.2383, -0.0698, // 1968
    0.0651, 0.1852, 0.3174, -0.0470, 0.2042, 0.2234, 0.0615, 0.3124, 0.1849, 0.0581, // 1978
    0.1654, 0.3148, -0.0306, 0.3023, 0.0749, 0.0997, 0.0133, 0.3720, 0.2268, 0.3310, // 1988
    0.2834, 0.2089, -0.0903, -0.1185, -0.2197, 0.2836, 0.1074, 0.0483, 0.1561, 0.0548, // 1998
    -0.3655, 0.2594, 0.1482, 0.0210, 0.1589, 0.3215, 0.1352, 0.0138, 0.1177, 0.2161, // 2008
    -0.0423, 0.3121, 0.1802, 0.2847, -0.1804, 0.2606, 0.2488, // 2018
];

/// Ordered annual total-return fractions. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnSeries {
    start_year: u32,
    returns: Vec<f64>,
    /// Months observed in the last year; 12 when the year is complete.
    final_year_months: u8,
}

impl ReturnSeries {
    pub fn new(start_year: u32, returns: Vec<f64>, final_year_months: u8) -> FireResult<Self> {
        if let Some(idx) = returns.iter().position(|r| !r.is_finite()) {
            return Err(FireError::invalid(
                "returns",
                format!("value at index {idx} is not finite"),
            ));
        }
        if !(1..=12).contains(&final_year_months) {
            return Err(FireError::invalid(
                "final_year_months",
                "must be between 1 and 12",
            ));
        }
        Ok(Self {
            start_year,
            returns: returns.into_iter().map(|r| r.max(-1.0)).collect(),
            final_year_months,
        })
    }

    pub fn sp500_total_return() -> Self {
        Self {
            start_year: SP500_START_YEAR,
            returns: SP500_TOTAL_RETURNS.to_vec(),
            final_year_months: 12,
        }
    }

    pub fn from_json(json: &str) -> FireResult<Self> {
        let raw: ReturnSeries = serde_json::from_str(json)
            .map_err(|e| FireError::invalid("return_series", e.to_string()))?;
        Self::new(raw.start_year, raw.returns, raw.final_year_months)
    }

    pub fn start_year(&self) -> u32 {
        self.start_year
    }

    pub fn end_year(&self) -> u32 {
        self.year_at(self.returns.len().saturating_sub(1))
    }

    pub fn final_year_months(&self) -> u8 {
        self.final_year_months
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn year_at(&self, index: usize) -> u32 {
        let offset = u32::try_from(index).unwrap_or(u32::MAX);
        self.start_year.saturating_add(offset)
    }

    /// Returns in chronological order for the window starting at `start`.
    pub fn window(&self, start: usize, years: usize) -> Option<&[f64]> {
        let end = start.checked_add(years)?;
        self.returns.get(start..end)
    }
}

impl Default for ReturnSeries {
    fn default() -> Self {
        Self::sp500_total_return()
    }
}
