mod decumulation;
mod engine;
mod history;
mod records;
mod retirement;
mod stats;
mod types;
mod windows;

pub use decumulation::{
    DecumulationAdjustments, DecumulationParams, DecumulationRow, DecumulationSchedule,
    DecumulationSummary, IncomeSchedulePolicy, MAX_RETIREMENT_YEARS, PropertySale, Tranche,
    TwoPhasePolicy, WithdrawalPolicy, YearPlan, YearSchedule, build_decumulation,
};
pub use engine::{
    RATE_FLOOR, RETURN_FLOOR, backtest_rolling_windows, geometric_annualized_return,
    monte_carlo_bootstrap, monte_carlo_normal, rolling_window_count,
};
pub use history::{ReturnSeries, SP500_START_YEAR};
pub use records::{
    CellValue, JsonTableRenderer, RowRecord, TableRenderer, column_names, render_rows,
};
pub use retirement::{
    INNER_TOLERANCE, MAX_INNER_ITERATIONS, MAX_OUTER_ITERATIONS, OUTER_TOLERANCE, SolverConfig,
    TaxContextIteration, TaxContextResult, effective_public_pension,
    estimate_taxable_withdrawal_ratio, solve_retirement_tax_context,
};
pub use stats::{BAND_LABELS, BAND_LEVELS, BandSeries, BandSummary, percentile, percentiles};
pub use types::{
    AccumulationInputs, BacktestDiagnostics, PathMatrix, PercentileBundle, SamplingConfig,
    SimulationResult, SimulationStrategy,
};
pub use windows::{
    WINDOW_TEMPLATES, WindowSelection, WindowTemplate, backtest_window_rows, find_template,
    manual_window_indices, template_window_indices, valid_start_years, window_returns,
};
