use serde::{Deserialize, Serialize};

use super::stats::{BandSeries, BandSummary};

/// Which trial generator produced a result.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationStrategy {
    Normal,
    Bootstrap,
    Backtest,
}

/// Household inputs shared by every accumulation strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationInputs {
    pub initial_wealth: f64,
    pub monthly_contribution: f64,
    /// Year-on-year growth of the contribution (pay rises).
    pub contribution_growth_rate: f64,
    pub years: u32,
    pub inflation_rate: f64,
    /// Spending need in today's money.
    pub annual_spending: f64,
    pub safe_withdrawal_rate: f64,
}

impl Default for AccumulationInputs {
    fn default() -> Self {
        Self {
            initial_wealth: 100_000.0,
            monthly_contribution: 1_000.0,
            contribution_growth_rate: 0.0,
            years: 20,
            inflation_rate: 0.02,
            annual_spending: 30_000.0,
            safe_withdrawal_rate: 0.04,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub num_simulations: u32,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1_000,
            seed: 42,
        }
    }
}

/// Trials x (years + 1) wealth values, row-major. Column 0 is the starting
/// wealth, column k the wealth at the end of year k.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathMatrix {
    trials: usize,
    columns: usize,
    values: Vec<f64>,
}

impl PathMatrix {
    pub(crate) fn zeros(trials: usize, columns: usize) -> Self {
        Self {
            trials,
            columns,
            values: vec![0.0; trials * columns],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.trials, self.columns)
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn get(&self, trial: usize, column: usize) -> Option<f64> {
        if trial >= self.trials || column >= self.columns {
            return None;
        }
        Some(self.values[trial * self.columns + column])
    }

    pub fn row(&self, trial: usize) -> &[f64] {
        let start = trial * self.columns;
        &self.values[start..start + self.columns]
    }

    pub(crate) fn row_mut(&mut self, trial: usize) -> &mut [f64] {
        let start = trial * self.columns;
        &mut self.values[start..start + self.columns]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.columns.max(1))
    }

    pub fn column(&self, column: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(column)
            .step_by(self.columns.max(1))
            .copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PercentileBundle {
    pub nominal: BandSeries,
    /// Nominal bands divided by the cumulative inflation factor.
    pub real: BandSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestDiagnostics {
    pub windows_count: usize,
    pub data_start_year: u32,
    pub data_end_year: u32,
    pub window_start_years: Vec<u32>,
    pub final_year_months: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub strategy: SimulationStrategy,
    #[serde(skip)]
    pub paths: PathMatrix,
    /// Annual returns applied per trial, trials x years.
    #[serde(skip)]
    pub trial_returns: Vec<Vec<f64>>,
    pub percentiles: PercentileBundle,
    /// Percent of trials with positive wealth, per year.
    pub yearly_success: Vec<f64>,
    pub success_rate_final: f64,
    pub depleted_trials: usize,
    /// Inflation-adjusted spending need per year, never negative.
    pub annual_withdrawals: Vec<f64>,
    /// Wealth needed per year to fund the withdrawal at the safe rate.
    pub fire_targets: Vec<f64>,
    /// Percent of trials at or above the FIRE target, per year.
    pub yearly_target_reached: Vec<f64>,
    pub median_years_to_target: Option<f64>,
    /// Geometric annualised return per trial, summarised.
    pub annualized_returns: BandSummary,
    pub backtest: Option<BacktestDiagnostics>,
}
