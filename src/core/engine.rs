use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use tracing::debug;

use super::history::ReturnSeries;
use super::stats::{BandSeries, BandSummary, percentile};
use super::types::{
    AccumulationInputs, BacktestDiagnostics, PathMatrix, PercentileBundle, SamplingConfig,
    SimulationResult, SimulationStrategy,
};
use crate::error::{FireError, FireResult};

/// A sampled or historical annual return never loses more than everything.
pub const RETURN_FLOOR: f64 = -1.0;
/// Growth and inflation rates are floored here so compounding factors stay positive.
pub const RATE_FLOOR: f64 = -0.99;

const NORMAL_STREAM: u64 = 1;
const BOOTSTRAP_STREAM: u64 = 2;

/// Produces the annual return sequence for each trial.
trait TrialReturns {
    fn trial_count(&self) -> usize;
    fn fill(&self, trial: usize, out: &mut [f64]);
}

struct NormalReturns {
    mean: f64,
    normal: Option<Normal>,
    trials: usize,
    seed: u64,
}

impl TrialReturns for NormalReturns {
    fn trial_count(&self) -> usize {
        self.trials
    }

    fn fill(&self, trial: usize, out: &mut [f64]) {
        let Some(normal) = &self.normal else {
            out.fill(self.mean.max(RETURN_FLOOR));
            return;
        };
        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, NORMAL_STREAM, trial));
        for slot in out.iter_mut() {
            *slot = rng.sample(normal).max(RETURN_FLOOR);
        }
    }
}

struct BootstrapReturns<'a> {
    history: &'a [f64],
    trials: usize,
    seed: u64,
}

impl TrialReturns for BootstrapReturns<'_> {
    fn trial_count(&self) -> usize {
        self.trials
    }

    fn fill(&self, trial: usize, out: &mut [f64]) {
        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, BOOTSTRAP_STREAM, trial));
        for slot in out.iter_mut() {
            let idx = rng.gen_range(0..self.history.len());
            *slot = self.history[idx].max(RETURN_FLOOR);
        }
    }
}

struct RollingWindows<'a> {
    history: &'a [f64],
    windows: usize,
}

impl TrialReturns for RollingWindows<'_> {
    fn trial_count(&self) -> usize {
        self.windows
    }

    fn fill(&self, trial: usize, out: &mut [f64]) {
        let window = &self.history[trial..trial + out.len()];
        for (slot, r) in out.iter_mut().zip(window) {
            *slot = r.max(RETURN_FLOOR);
        }
    }
}

/// Parametric Monte Carlo with i.i.d. normal annual returns.
pub fn monte_carlo_normal(
    inputs: &AccumulationInputs,
    mean_return: f64,
    volatility: f64,
    sampling: SamplingConfig,
) -> FireResult<SimulationResult> {
    validate_inputs(inputs)?;
    validate_sampling(sampling)?;
    if !mean_return.is_finite() {
        return Err(FireError::invalid("mean_return", "must be finite"));
    }
    if !volatility.is_finite() {
        return Err(FireError::invalid("volatility", "must be finite"));
    }

    let volatility = volatility.max(0.0);
    let normal = if volatility > 0.0 {
        Some(
            Normal::new(mean_return, volatility)
                .map_err(|e| FireError::invalid("volatility", e.to_string()))?,
        )
    } else {
        None
    };
    let source = NormalReturns {
        mean: mean_return,
        normal,
        trials: sampling.num_simulations as usize,
        seed: sampling.seed,
    };
    Ok(run_strategy(inputs, SimulationStrategy::Normal, &source, None))
}

/// Monte Carlo resampling historical annual returns with replacement.
pub fn monte_carlo_bootstrap(
    inputs: &AccumulationInputs,
    history: &ReturnSeries,
    sampling: SamplingConfig,
) -> FireResult<SimulationResult> {
    validate_inputs(inputs)?;
    validate_sampling(sampling)?;
    if history.is_empty() {
        return Err(FireError::EmptyHistory);
    }

    let source = BootstrapReturns {
        history: history.returns(),
        trials: sampling.num_simulations as usize,
        seed: sampling.seed,
    };
    Ok(run_strategy(inputs, SimulationStrategy::Bootstrap, &source, None))
}

/// Replays every contiguous `years`-long window of history as one trial.
pub fn backtest_rolling_windows(
    inputs: &AccumulationInputs,
    history: &ReturnSeries,
) -> FireResult<SimulationResult> {
    validate_inputs(inputs)?;
    if history.is_empty() {
        return Err(FireError::EmptyHistory);
    }
    let years = inputs.years as usize;
    let windows = rolling_window_count(history.len(), years)?;

    let window_start_years = (0..windows).map(|i| history.year_at(i)).collect::<Vec<_>>();
    let diagnostics = BacktestDiagnostics {
        windows_count: windows,
        data_start_year: history.year_at(0),
        data_end_year: history.year_at(windows - 1 + years - 1),
        window_start_years,
        final_year_months: history.final_year_months(),
    };
    let source = RollingWindows {
        history: history.returns(),
        windows,
    };
    Ok(run_strategy(
        inputs,
        SimulationStrategy::Backtest,
        &source,
        Some(diagnostics),
    ))
}

/// Number of full windows of `years` inside `available` years of history.
pub fn rolling_window_count(available: usize, years: usize) -> FireResult<usize> {
    if years == 0 {
        return Err(FireError::invalid("years", "must be > 0"));
    }
    if years > available {
        return Err(FireError::InsufficientHistory { years, available });
    }
    Ok(available - years + 1)
}

fn validate_inputs(inputs: &AccumulationInputs) -> FireResult<()> {
    if inputs.years == 0 {
        return Err(FireError::invalid("years", "must be > 0"));
    }
    for (field, value) in [
        ("initial_wealth", inputs.initial_wealth),
        ("monthly_contribution", inputs.monthly_contribution),
        ("contribution_growth_rate", inputs.contribution_growth_rate),
        ("inflation_rate", inputs.inflation_rate),
        ("annual_spending", inputs.annual_spending),
    ] {
        if !value.is_finite() {
            return Err(FireError::invalid(field, "must be finite"));
        }
    }
    if !inputs.safe_withdrawal_rate.is_finite() || inputs.safe_withdrawal_rate <= 0.0 {
        return Err(FireError::invalid("safe_withdrawal_rate", "must be > 0"));
    }
    Ok(())
}

fn validate_sampling(sampling: SamplingConfig) -> FireResult<()> {
    if sampling.num_simulations == 0 {
        return Err(FireError::invalid("num_simulations", "must be > 0"));
    }
    Ok(())
}

fn run_strategy(
    inputs: &AccumulationInputs,
    strategy: SimulationStrategy,
    source: &dyn TrialReturns,
    backtest: Option<BacktestDiagnostics>,
) -> SimulationResult {
    let (paths, trial_returns, depleted_trials) = simulate_paths(inputs, source);
    let result = summarise(inputs, strategy, paths, trial_returns, depleted_trials, backtest);
    debug!(
        ?strategy,
        trials = result.paths.trials(),
        years = inputs.years,
        success_rate_final = result.success_rate_final,
        median_final = result.percentiles.nominal.p50.last().copied().unwrap_or(0.0),
        "accumulation run complete"
    );
    result
}

fn simulate_paths(
    inputs: &AccumulationInputs,
    source: &dyn TrialReturns,
) -> (PathMatrix, Vec<Vec<f64>>, usize) {
    let years = inputs.years as usize;
    let trials = source.trial_count();
    let contributions = contribution_schedule(inputs);
    let start = inputs.initial_wealth.max(0.0);

    let mut paths = PathMatrix::zeros(trials, years + 1);
    let mut trial_returns = Vec::with_capacity(trials);
    let mut depleted_trials = 0;

    for trial in 0..trials {
        let mut returns = vec![0.0; years];
        source.fill(trial, &mut returns);
        if compound_path(start, &returns, &contributions, paths.row_mut(trial)) {
            depleted_trials += 1;
        }
        trial_returns.push(returns);
    }

    (paths, trial_returns, depleted_trials)
}

/// Contribution paid at the end of each year, growing year on year.
fn contribution_schedule(inputs: &AccumulationInputs) -> Vec<f64> {
    let annual = (inputs.monthly_contribution * 12.0).max(0.0);
    let growth = inputs.contribution_growth_rate.max(RATE_FLOOR);
    let mut contribution = annual;
    (0..inputs.years)
        .map(|_| {
            let current = contribution;
            contribution *= 1.0 + growth;
            current
        })
        .collect()
}

/// Fills one row and reports whether the trial was ruined. Ruin is
/// absorbing: once wealth reaches zero it stays there.
fn compound_path(start: f64, returns: &[f64], contributions: &[f64], row: &mut [f64]) -> bool {
    row[0] = start;
    let mut wealth = start;
    let mut depleted = false;
    for (year, (r, contribution)) in returns.iter().zip(contributions).enumerate() {
        if !depleted {
            wealth = (wealth * (1.0 + r) + contribution).max(0.0);
            if wealth <= 0.0 {
                depleted = true;
                wealth = 0.0;
            }
        }
        row[year + 1] = wealth;
    }
    depleted
}

fn summarise(
    inputs: &AccumulationInputs,
    strategy: SimulationStrategy,
    paths: PathMatrix,
    trial_returns: Vec<Vec<f64>>,
    depleted_trials: usize,
    backtest: Option<BacktestDiagnostics>,
) -> SimulationResult {
    let (trials, columns) = paths.shape();
    let inflation = inputs.inflation_rate.max(RATE_FLOOR);

    let mut nominal = BandSeries::with_capacity(columns);
    let mut real = BandSeries::with_capacity(columns);
    let mut yearly_success = Vec::with_capacity(columns);
    let mut annual_withdrawals = Vec::with_capacity(columns);
    let mut fire_targets = Vec::with_capacity(columns);
    let mut yearly_target_reached = Vec::with_capacity(columns);
    let mut scratch = Vec::with_capacity(trials);
    let mut deflator = 1.0_f64;

    for year in 0..columns {
        scratch.clear();
        scratch.extend(paths.column(year));

        let withdrawal = (inputs.annual_spending * deflator).max(0.0);
        let target = withdrawal / inputs.safe_withdrawal_rate;
        let solvent = scratch.iter().filter(|w| **w > 0.0).count();
        let reached = scratch.iter().filter(|w| **w >= target).count();
        yearly_success.push(share_pct(solvent, trials));
        yearly_target_reached.push(share_pct(reached, trials));
        annual_withdrawals.push(withdrawal);
        fire_targets.push(target);

        let bands = BandSummary::from_samples(&mut scratch);
        nominal.push(bands);
        real.push(BandSummary {
            p5: bands.p5 / deflator,
            p25: bands.p25 / deflator,
            p50: bands.p50 / deflator,
            p75: bands.p75 / deflator,
            p95: bands.p95 / deflator,
        });

        deflator *= 1.0 + inflation;
    }

    let mut years_to_target = (0..trials)
        .filter_map(|trial| {
            paths
                .row(trial)
                .iter()
                .zip(&fire_targets)
                .position(|(wealth, target)| wealth >= target)
                .map(|year| year as f64)
        })
        .collect::<Vec<_>>();
    let median_years_to_target = if years_to_target.is_empty() {
        None
    } else {
        Some(percentile(&mut years_to_target, 50.0))
    };

    let mut annualized = trial_returns
        .iter()
        .map(|returns| geometric_annualized_return(returns))
        .collect::<Vec<_>>();
    let annualized_returns = BandSummary::from_samples(&mut annualized);

    let success_rate_final = yearly_success.last().copied().unwrap_or(0.0);

    SimulationResult {
        strategy,
        paths,
        trial_returns,
        percentiles: PercentileBundle { nominal, real },
        yearly_success,
        success_rate_final,
        depleted_trials,
        annual_withdrawals,
        fire_targets,
        yearly_target_reached,
        median_years_to_target,
        annualized_returns,
        backtest,
    }
}

fn share_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn geometric_annualized_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth = returns
        .iter()
        .fold(1.0_f64, |acc, r| acc * (1.0 + r.max(RETURN_FLOOR)));
    if growth <= 0.0 {
        return RETURN_FLOOR;
    }
    growth.powf(1.0 / returns.len() as f64) - 1.0
}

fn derive_seed(base_seed: u64, stream: u64, trial: usize) -> u64 {
    let mixed = base_seed ^ (stream << 32) ^ trial as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> AccumulationInputs {
        AccumulationInputs {
            initial_wealth: 100_000.0,
            monthly_contribution: 1_000.0,
            contribution_growth_rate: 0.0,
            years: 20,
            inflation_rate: 0.02,
            annual_spending: 30_000.0,
            safe_withdrawal_rate: 0.04,
        }
    }

    fn short_history() -> ReturnSeries {
        ReturnSeries::new(
            1990,
            vec![0.10, -0.05, 0.20, 0.03, -0.30, 0.15, 0.08, 0.12, -0.02, 0.25],
            12,
        )
        .expect("valid series")
    }

    fn assert_result_invariants(result: &SimulationResult, inflation_positive: bool) {
        let (_, columns) = result.paths.shape();
        for value in result.paths.values() {
            assert!(value.is_finite() && *value >= 0.0, "bad path value {value}");
        }
        for series in [&result.percentiles.nominal, &result.percentiles.real] {
            assert_eq!(series.len(), columns);
            for year in 0..columns {
                let bands = series.at(year).expect("band year");
                assert!(bands.is_ordered(), "unordered bands {bands:?} at {year}");
                for v in bands.as_array() {
                    assert!(v.is_finite() && v >= 0.0);
                }
            }
        }
        if inflation_positive {
            for year in 0..columns {
                let n = result.percentiles.nominal.at(year).expect("nominal");
                let r = result.percentiles.real.at(year).expect("real");
                for (real, nominal) in r.as_array().iter().zip(n.as_array()) {
                    assert!(*real <= nominal + 1e-9);
                }
            }
        }
        for s in &result.yearly_success {
            assert!((0.0..=100.0).contains(s));
        }
        assert_eq!(
            Some(result.success_rate_final),
            result.yearly_success.last().copied()
        );
        assert!(result.annualized_returns.is_ordered());
    }

    #[test]
    fn monte_carlo_normal_example_scenario_shape() {
        let result = monte_carlo_normal(
            &sample_inputs(),
            0.06,
            0.15,
            SamplingConfig {
                num_simulations: 500,
                seed: 42,
            },
        )
        .expect("must simulate");
        assert_eq!(result.paths.shape(), (500, 21));
        assert!((0.0..=100.0).contains(&result.success_rate_final));
        assert_eq!(result.strategy, SimulationStrategy::Normal);
        assert!(result.backtest.is_none());
        assert_result_invariants(&result, true);
    }

    #[test]
    fn fixed_seed_reruns_are_identical() {
        let sampling = SamplingConfig {
            num_simulations: 64,
            seed: 7,
        };
        let a = monte_carlo_normal(&sample_inputs(), 0.05, 0.2, sampling).expect("run a");
        let b = monte_carlo_normal(&sample_inputs(), 0.05, 0.2, sampling).expect("run b");
        assert_eq!(a.paths, b.paths);
        assert_eq!(a.percentiles, b.percentiles);

        let c = monte_carlo_normal(
            &sample_inputs(),
            0.05,
            0.2,
            SamplingConfig { seed: 8, ..sampling },
        )
        .expect("run c");
        assert_ne!(a.paths, c.paths);
    }

    #[test]
    fn bootstrap_fixed_seed_reruns_are_identical() {
        let history = short_history();
        let sampling = SamplingConfig {
            num_simulations: 64,
            seed: 11,
        };
        let a = monte_carlo_bootstrap(&sample_inputs(), &history, sampling).expect("run a");
        let b = monte_carlo_bootstrap(&sample_inputs(), &history, sampling).expect("run b");
        assert_eq!(a.paths, b.paths);
        assert_eq!(a.trial_returns, b.trial_returns);
        assert_eq!(a.percentiles, b.percentiles);

        let c = monte_carlo_bootstrap(
            &sample_inputs(),
            &history,
            SamplingConfig { seed: 12, ..sampling },
        )
        .expect("run c");
        assert_ne!(a.paths, c.paths);
        assert_ne!(a.trial_returns, c.trial_returns);
    }

    #[test]
    fn zero_volatility_matches_hand_calculation() {
        let inputs = AccumulationInputs {
            initial_wealth: 100.0,
            monthly_contribution: 10.0 / 12.0,
            contribution_growth_rate: 0.0,
            years: 3,
            inflation_rate: 0.0,
            annual_spending: 4.0,
            safe_withdrawal_rate: 0.04,
        };
        let result = monte_carlo_normal(
            &inputs,
            0.10,
            0.0,
            SamplingConfig {
                num_simulations: 3,
                seed: 1,
            },
        )
        .expect("must simulate");

        // ((100*1.1+10)*1.1+10)*1.1+10 = 166.2
        for trial in 0..3 {
            let row = result.paths.row(trial);
            assert_approx(row[0], 100.0);
            assert_approx(row[1], 120.0);
            assert_approx(row[2], 142.0);
            assert_approx(row[3], 166.2);
        }
        assert_approx(result.annualized_returns.p50, 0.10);
        // target is 4 / 0.04 = 100, reached from year 0
        assert_eq!(result.median_years_to_target, Some(0.0));
        assert_approx(result.yearly_target_reached[3], 100.0);
    }

    #[test]
    fn contributions_grow_year_on_year() {
        let inputs = AccumulationInputs {
            initial_wealth: 0.0,
            monthly_contribution: 100.0,
            contribution_growth_rate: 0.10,
            years: 3,
            inflation_rate: 0.0,
            annual_spending: 0.0,
            safe_withdrawal_rate: 0.04,
        };
        let contributions = contribution_schedule(&inputs);
        assert_approx(contributions[0], 1_200.0);
        assert_approx(contributions[1], 1_320.0);
        assert_approx(contributions[2], 1_452.0);
    }

    #[test]
    fn total_loss_is_absorbing() {
        let mut row = vec![0.0; 4];
        let depleted = compound_path(1_000.0, &[-1.0, 0.5, 0.5], &[0.0, 100.0, 100.0], &mut row);
        assert!(depleted);
        assert_eq!(row, vec![1_000.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn withdrawals_and_targets_inflate() {
        let mut inputs = sample_inputs();
        inputs.years = 2;
        inputs.inflation_rate = 0.10;
        let result = monte_carlo_normal(
            &inputs,
            0.05,
            0.1,
            SamplingConfig {
                num_simulations: 10,
                seed: 3,
            },
        )
        .expect("must simulate");
        assert_approx(result.annual_withdrawals[0], 30_000.0);
        assert_approx(result.annual_withdrawals[2], 36_300.0);
        assert_approx(result.fire_targets[2], 907_500.0);
    }

    #[test]
    fn bootstrap_example_scenario_shape() {
        let history = ReturnSeries::sp500_total_return();
        let result = monte_carlo_bootstrap(
            &sample_inputs(),
            &history,
            SamplingConfig {
                num_simulations: 500,
                seed: 42,
            },
        )
        .expect("must simulate");
        assert_eq!(result.paths.shape(), (500, 21));
        assert!((0.0..=100.0).contains(&result.success_rate_final));
        assert_result_invariants(&result, true);
    }

    #[test]
    fn bootstrap_only_draws_historical_values() {
        let history = short_history();
        let result = monte_carlo_bootstrap(
            &sample_inputs(),
            &history,
            SamplingConfig {
                num_simulations: 50,
                seed: 9,
            },
        )
        .expect("must simulate");
        for returns in &result.trial_returns {
            for r in returns {
                assert!(history.returns().contains(r));
            }
        }
    }

    #[test]
    fn bootstrap_rejects_empty_history() {
        let empty = ReturnSeries::new(2000, Vec::new(), 12).expect("empty is constructible");
        let err = monte_carlo_bootstrap(&sample_inputs(), &empty, SamplingConfig::default());
        assert!(matches!(err, Err(FireError::EmptyHistory)));
    }

    #[test]
    fn backtest_windows_cover_history() {
        let history = ReturnSeries::sp500_total_return();
        let result = backtest_rolling_windows(&sample_inputs(), &history).expect("backtest");
        let expected = history.len() - 20 + 1;
        assert_eq!(result.paths.shape(), (expected, 21));
        let diag = result.backtest.as_ref().expect("diagnostics");
        assert_eq!(diag.windows_count, expected);
        assert_eq!(diag.data_start_year, history.start_year());
        assert_eq!(diag.data_end_year, history.end_year());
        assert!(diag.data_start_year <= diag.data_end_year);
        assert_eq!(diag.window_start_years.len(), expected);
        assert_result_invariants(&result, true);
    }

    #[test]
    fn backtest_replays_windows_in_order() {
        let history = short_history();
        let mut inputs = sample_inputs();
        inputs.years = 3;
        let result = backtest_rolling_windows(&inputs, &history).expect("backtest");
        assert_eq!(result.paths.trials(), 8);
        assert_eq!(result.trial_returns[2], vec![0.20, 0.03, -0.30]);
        assert_eq!(
            result.backtest.as_ref().map(|d| d.window_start_years[7]),
            Some(1997)
        );
    }

    #[test]
    fn backtest_rejects_windows_longer_than_history() {
        let history = short_history();
        let mut inputs = sample_inputs();
        inputs.years = 11;
        assert!(matches!(
            backtest_rolling_windows(&inputs, &history),
            Err(FireError::InsufficientHistory {
                years: 11,
                available: 10
            })
        ));
        inputs.years = 10;
        let result = backtest_rolling_windows(&inputs, &history).expect("single window");
        assert_eq!(result.paths.trials(), 1);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut inputs = sample_inputs();
        inputs.safe_withdrawal_rate = 0.0;
        assert!(monte_carlo_normal(&inputs, 0.05, 0.1, SamplingConfig::default()).is_err());

        let inputs = sample_inputs();
        let none = SamplingConfig {
            num_simulations: 0,
            seed: 1,
        };
        assert!(monte_carlo_normal(&inputs, 0.05, 0.1, none).is_err());
        assert!(monte_carlo_normal(&inputs, f64::NAN, 0.1, SamplingConfig::default()).is_err());
    }

    #[test]
    fn geometric_return_handles_total_loss() {
        assert_approx(geometric_annualized_return(&[0.21, 0.0]), 0.1);
        assert_approx(geometric_annualized_return(&[0.5, -1.0]), -1.0);
        assert_approx(geometric_annualized_return(&[]), 0.0);
    }

    #[test]
    fn derive_seed_changes_per_stream_and_trial() {
        let base = derive_seed(42, NORMAL_STREAM, 0);
        assert_ne!(base, derive_seed(42, NORMAL_STREAM, 1));
        assert_ne!(base, derive_seed(42, BOOTSTRAP_STREAM, 0));
        assert_ne!(base, derive_seed(43, NORMAL_STREAM, 0));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_normal_runs_satisfy_invariants(
            seed in any::<u64>(),
            years in 1u32..30,
            simulations in 1u32..60,
            initial in 0u32..2_000_000,
            monthly in 0u32..5_000,
            mean_bp in -500i32..1500,
            vol_bp in 0u32..6000,
            inflation_bp in 1u32..800
        ) {
            let inputs = AccumulationInputs {
                initial_wealth: initial as f64,
                monthly_contribution: monthly as f64,
                contribution_growth_rate: 0.02,
                years,
                inflation_rate: inflation_bp as f64 / 10_000.0,
                annual_spending: 30_000.0,
                safe_withdrawal_rate: 0.04,
            };
            let result = monte_carlo_normal(
                &inputs,
                mean_bp as f64 / 10_000.0,
                vol_bp as f64 / 10_000.0,
                SamplingConfig { num_simulations: simulations, seed },
            ).expect("valid run");
            prop_assert_eq!(result.paths.shape(), (simulations as usize, years as usize + 1));
            assert_result_invariants(&result, true);

            for trial in 0..result.paths.trials() {
                let row = result.paths.row(trial);
                if let Some(first_zero) = row.iter().skip(1).position(|w| *w <= 0.0) {
                    prop_assert!(row[first_zero + 1..].iter().all(|w| *w == 0.0));
                }
            }
        }

        #[test]
        fn prop_backtest_window_count(len in 1usize..60, years in 1u32..60) {
            let history = ReturnSeries::new(1950, vec![0.05; len], 12).expect("series");
            let inputs = AccumulationInputs { years, ..sample_inputs() };
            match backtest_rolling_windows(&inputs, &history) {
                Ok(result) => {
                    prop_assert_eq!(result.paths.trials(), len - years as usize + 1);
                    let diag = result.backtest.expect("diagnostics");
                    prop_assert!(diag.data_start_year <= diag.data_end_year);
                }
                Err(_) => prop_assert!(years as usize > len),
            }
        }
    }
}
