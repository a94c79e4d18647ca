use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::engine::RATE_FLOOR;
use crate::error::{FireError, FireResult};
use crate::tax::RegionalTax;

pub const INNER_TOLERANCE: f64 = 0.01;
pub const OUTER_TOLERANCE: f64 = 1.0;
pub const MAX_INNER_ITERATIONS: u32 = 30;
pub const MAX_OUTER_ITERATIONS: u32 = 30;

/// Tolerances are in currency units: the inner loop compares gross
/// withdrawals, the outer loop compares portfolio targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverConfig {
    pub inner_tolerance: f64,
    pub outer_tolerance: f64,
    pub max_inner_iterations: u32,
    pub max_outer_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            inner_tolerance: INNER_TOLERANCE,
            outer_tolerance: OUTER_TOLERANCE,
            max_inner_iterations: MAX_INNER_ITERATIONS,
            max_outer_iterations: MAX_OUTER_ITERATIONS,
        }
    }
}

impl SolverConfig {
    fn validate(&self) -> FireResult<()> {
        if !self.inner_tolerance.is_finite() || self.inner_tolerance <= 0.0 {
            return Err(FireError::invalid("inner_tolerance", "must be > 0"));
        }
        if !self.outer_tolerance.is_finite() || self.outer_tolerance <= 0.0 {
            return Err(FireError::invalid("outer_tolerance", "must be > 0"));
        }
        if self.max_inner_iterations == 0 {
            return Err(FireError::invalid("max_inner_iterations", "must be > 0"));
        }
        if self.max_outer_iterations == 0 {
            return Err(FireError::invalid("max_outer_iterations", "must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxContextIteration {
    pub iteration: u32,
    /// Portfolio target the wealth tax was computed on.
    pub portfolio_target: f64,
    pub wealth_tax: f64,
    pub savings_tax: f64,
    pub gross_withdrawal: f64,
    pub inner_iterations: u32,
    pub inner_converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxContextResult {
    /// Untaxed target: net spending over the withdrawal rate.
    pub base_target: f64,
    pub gross_withdrawal_required: f64,
    pub annual_savings_tax: f64,
    pub annual_wealth_tax: f64,
    pub total_annual_tax: f64,
    pub target_portfolio_gross: f64,
    pub taxable_withdrawal_ratio: f64,
    pub converged: bool,
    pub iterations: u32,
    pub trace: Vec<TaxContextIteration>,
    pub message: String,
}

/// Finds the gross withdrawal that pays for net spending plus the savings
/// tax on its taxable share plus the wealth tax on the portfolio that
/// funds it at `safe_withdrawal_rate`.
///
/// Without a tax context the answer is untaxed and no iteration runs.
/// Exhausting the iteration budget is not an error: the last estimate is
/// returned with `converged = false`.
pub fn solve_retirement_tax_context(
    net_spending: f64,
    safe_withdrawal_rate: f64,
    taxable_withdrawal_ratio: f64,
    tax: Option<RegionalTax<'_>>,
    config: &SolverConfig,
) -> FireResult<TaxContextResult> {
    if !net_spending.is_finite() {
        return Err(FireError::invalid("net_spending", "must be finite"));
    }
    if !safe_withdrawal_rate.is_finite() || safe_withdrawal_rate <= 0.0 {
        return Err(FireError::invalid("safe_withdrawal_rate", "must be > 0"));
    }
    config.validate()?;

    let net = net_spending.max(0.0);
    let ratio = if taxable_withdrawal_ratio.is_finite() {
        taxable_withdrawal_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let base_target = net / safe_withdrawal_rate;

    let Some(tax) = tax else {
        return Ok(TaxContextResult {
            base_target,
            gross_withdrawal_required: net,
            annual_savings_tax: 0.0,
            annual_wealth_tax: 0.0,
            total_annual_tax: 0.0,
            target_portfolio_gross: base_target,
            taxable_withdrawal_ratio: ratio,
            converged: true,
            iterations: 0,
            trace: Vec::new(),
            message: "No tax pack or region supplied; gross withdrawal equals net spending."
                .to_string(),
        });
    };

    let mut portfolio_target = base_target;
    let mut gross_withdrawal = net;
    let mut annual_savings_tax = 0.0;
    let mut annual_wealth_tax = 0.0;
    let mut converged = false;
    let mut iterations = 0;
    let mut trace = Vec::with_capacity(config.max_outer_iterations as usize);

    while iterations < config.max_outer_iterations {
        iterations += 1;
        annual_wealth_tax = tax.wealth_tax(portfolio_target).total_wealth_tax;

        let mut candidate = net + annual_wealth_tax;
        let mut inner_iterations = 0;
        let mut inner_converged = false;
        while inner_iterations < config.max_inner_iterations {
            inner_iterations += 1;
            annual_savings_tax = tax.savings_tax((candidate * ratio).max(0.0));
            let updated = net + annual_wealth_tax + annual_savings_tax;
            let delta = (updated - candidate).abs();
            candidate = updated;
            if delta <= config.inner_tolerance {
                inner_converged = true;
                break;
            }
        }

        trace.push(TaxContextIteration {
            iteration: iterations,
            portfolio_target,
            wealth_tax: annual_wealth_tax,
            savings_tax: annual_savings_tax,
            gross_withdrawal: candidate,
            inner_iterations,
            inner_converged,
        });

        let new_target = candidate / safe_withdrawal_rate;
        let delta = (new_target - portfolio_target).abs();
        portfolio_target = new_target;
        gross_withdrawal = candidate;
        if delta <= config.outer_tolerance {
            converged = true;
            break;
        }
    }

    let message = if converged {
        format!("Converged after {iterations} iterations.")
    } else {
        warn!(
            region = tax.region(),
            iterations,
            gross_withdrawal,
            portfolio_target,
            "retirement tax context did not converge"
        );
        "Reached max iterations before tolerance was met; returning best estimate.".to_string()
    };
    debug!(
        region = tax.region(),
        iterations,
        converged,
        gross_withdrawal,
        portfolio_target,
        "retirement tax context solved"
    );

    Ok(TaxContextResult {
        base_target,
        gross_withdrawal_required: gross_withdrawal,
        annual_savings_tax,
        annual_wealth_tax,
        total_annual_tax: annual_savings_tax + annual_wealth_tax,
        target_portfolio_gross: portfolio_target,
        taxable_withdrawal_ratio: ratio,
        converged,
        iterations,
        trace,
        message,
    })
}

/// Share of a portfolio that is unrealised gain after compounding the
/// accumulation phase at a fixed return, clamped to [0, 1].
pub fn estimate_taxable_withdrawal_ratio(
    initial_wealth: f64,
    monthly_contribution: f64,
    years: u32,
    expected_return: f64,
    contribution_growth_rate: f64,
) -> f64 {
    let mut portfolio = initial_wealth.max(0.0);
    let mut principal = portfolio;
    let annual = (monthly_contribution * 12.0).max(0.0);
    let r = expected_return.max(RATE_FLOOR);
    let g = contribution_growth_rate.max(RATE_FLOOR);

    let mut contribution = annual;
    for _ in 0..years {
        portfolio = portfolio * (1.0 + r) + contribution;
        principal += contribution;
        contribution *= 1.0 + g;
    }

    if !portfolio.is_finite() || portfolio <= 0.0 {
        return 0.0;
    }
    ((portfolio - principal).max(0.0) / portfolio).clamp(0.0, 1.0)
}

/// Public pension after the signed per-year adjustment for starting before
/// or after the official age. Never negative.
pub fn effective_public_pension(
    annual_pension: f64,
    official_age: u32,
    start_age: u32,
    adjustment_per_year: f64,
) -> f64 {
    let years_delta = i64::from(start_age) - i64::from(official_age);
    (annual_pension * (1.0 + adjustment_per_year * years_delta as f64)).max(0.0)
}
