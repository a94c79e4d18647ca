use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::RATE_FLOOR;
use super::records::RowRecord;
use crate::error::{FireError, FireResult};

/// Longest retirement the builder will lay out.
pub const MAX_RETIREMENT_YEARS: u32 = 150;

/// Year-indexed schedule (index 0 is the first retirement year). Years past
/// the end read as the default value, so an empty schedule is inert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearSchedule<T>(Vec<T>);

impl<T: Copy + Default> YearSchedule<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self(values)
    }

    /// Value for 1-based retirement `year`.
    pub fn at(&self, year: u32) -> T {
        year.checked_sub(1)
            .and_then(|idx| self.0.get(idx as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySale {
    /// 1-based retirement year in which the proceeds arrive.
    pub year: u32,
    /// Sale value in retirement-start money.
    pub amount: f64,
}

/// Externally supplied cash adjustments. The default has no effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecumulationAdjustments {
    /// Nominal mortgage payments still due.
    pub mortgage: YearSchedule<f64>,
    /// Nominal ad-hoc withdrawals (sale or rental adjustments).
    pub extra_withdrawal: YearSchedule<f64>,
    /// Outstanding mortgage installments at each year end.
    pub pending_installments: YearSchedule<u32>,
    pub property_sale: Option<PropertySale>,
}

impl DecumulationAdjustments {
    fn sale_today(&self, year: u32) -> f64 {
        match self.property_sale {
            Some(sale) if sale.year == year => sale.amount.max(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tranche {
    #[serde(rename = "Pre-pensión")]
    PrePension,
    #[serde(rename = "Post-pensión")]
    PostPension,
}

impl Tranche {
    pub fn label(self) -> &'static str {
        match self {
            Tranche::PrePension => "Pre-pensión",
            Tranche::PostPension => "Post-pensión",
        }
    }
}

/// Common parameters of a decumulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecumulationParams {
    pub starting_portfolio: f64,
    pub fire_age: u32,
    pub years_in_retirement: u32,
    pub inflation_rate: f64,
    /// Tax charged on positive growth only.
    pub tax_rate_on_gains: f64,
}

/// One year of a policy, in retirement-start money.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearPlan {
    pub tranche: Tranche,
    pub base_need: f64,
    pub implied_income: Option<f64>,
    pub public_pension: f64,
    pub private_plan: f64,
    pub other_income: f64,
    pub pre_pension_extra_cost: f64,
    /// What the portfolio has to pay before mortgage and extra withdrawals.
    pub portfolio_need: f64,
    pub annual_return: f64,
}

/// Decides each retirement year's need and return.
pub trait WithdrawalPolicy {
    /// `year` is 1-based; `age` is the retiree's age during that year.
    fn plan_year(&self, year: u32, age: u32) -> YearPlan;
}

/// Spending base offset by public pension, private plan and other income.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSchedulePolicy {
    pub annual_spending_base: f64,
    pub public_pension_start_age: u32,
    pub public_pension_annual: f64,
    pub private_plan_start_age: u32,
    pub private_plan_duration_years: u32,
    pub private_plan_annual: f64,
    /// Other income received from the public pension age onwards.
    pub other_income_annual: f64,
    pub pre_pension_extra_cost: f64,
    pub expected_return: f64,
}

impl IncomeSchedulePolicy {
    fn private_plan_active(&self, age: u32) -> bool {
        if self.private_plan_duration_years == 0 {
            return false;
        }
        let end_age = self
            .private_plan_start_age
            .saturating_add(self.private_plan_duration_years - 1);
        (self.private_plan_start_age..=end_age).contains(&age)
    }

    /// Collapses the schedule into two net withdrawal stages split at the
    /// public pension age.
    pub fn derive_two_phase(&self) -> TwoPhasePolicy {
        let bridge_age = self.public_pension_start_age.saturating_sub(1);
        let private_before = if self.public_pension_start_age > self.private_plan_start_age
            && self.private_plan_active(bridge_age)
        {
            self.private_plan_annual.max(0.0)
        } else {
            0.0
        };
        let private_after = if self.private_plan_active(self.public_pension_start_age) {
            self.private_plan_annual.max(0.0)
        } else {
            0.0
        };
        let post_pension_income =
            self.public_pension_annual.max(0.0) + self.other_income_annual.max(0.0) + private_after;

        TwoPhasePolicy {
            phase2_start_age: self.public_pension_start_age,
            stage1_net_withdrawal: (self.annual_spending_base + self.pre_pension_extra_cost
                - private_before)
                .max(0.0),
            stage2_net_withdrawal: (self.annual_spending_base - post_pension_income).max(0.0),
            stage2_non_portfolio_income: post_pension_income,
            expected_return: self.expected_return,
            returns_override: None,
        }
    }
}

impl WithdrawalPolicy for IncomeSchedulePolicy {
    fn plan_year(&self, _year: u32, age: u32) -> YearPlan {
        let post_pension = age >= self.public_pension_start_age;
        let public_pension = if post_pension { self.public_pension_annual } else { 0.0 };
        let other_income = if post_pension { self.other_income_annual } else { 0.0 };
        let private_plan = if self.private_plan_active(age) {
            self.private_plan_annual
        } else {
            0.0
        };
        let pre_pension_extra_cost = if post_pension { 0.0 } else { self.pre_pension_extra_cost };
        let portfolio_need = (self.annual_spending_base + pre_pension_extra_cost
            - public_pension
            - private_plan
            - other_income)
            .max(0.0);

        YearPlan {
            tranche: if post_pension {
                Tranche::PostPension
            } else {
                Tranche::PrePension
            },
            base_need: self.annual_spending_base,
            implied_income: None,
            public_pension,
            private_plan,
            other_income,
            pre_pension_extra_cost,
            portfolio_need,
            annual_return: self.expected_return,
        }
    }
}

/// Net withdrawals given directly for the bridge and post-pension stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoPhasePolicy {
    pub phase2_start_age: u32,
    pub stage1_net_withdrawal: f64,
    pub stage2_net_withdrawal: f64,
    /// Used as the implied stage-2 income when positive; otherwise the
    /// stage-1 minus stage-2 gap is used.
    #[serde(default)]
    pub stage2_non_portfolio_income: f64,
    #[serde(default)]
    pub expected_return: f64,
    /// Per-year returns; years past its end use `expected_return`.
    #[serde(default)]
    pub returns_override: Option<Vec<f64>>,
}

impl WithdrawalPolicy for TwoPhasePolicy {
    fn plan_year(&self, year: u32, age: u32) -> YearPlan {
        let stage2 = age >= self.phase2_start_age;
        let implied_income = if !stage2 {
            0.0
        } else if self.stage2_non_portfolio_income > 0.0 {
            self.stage2_non_portfolio_income
        } else {
            (self.stage1_net_withdrawal - self.stage2_net_withdrawal).max(0.0)
        };
        let need = if stage2 {
            self.stage2_net_withdrawal
        } else {
            self.stage1_net_withdrawal
        }
        .max(0.0);
        let annual_return = year
            .checked_sub(1)
            .and_then(|idx| self.returns_override.as_ref()?.get(idx as usize).copied())
            .unwrap_or(self.expected_return);

        YearPlan {
            tranche: if stage2 {
                Tranche::PostPension
            } else {
                Tranche::PrePension
            },
            base_need: need,
            implied_income: Some(implied_income),
            public_pension: 0.0,
            private_plan: 0.0,
            other_income: 0.0,
            pre_pension_extra_cost: 0.0,
            portfolio_need: need,
            annual_return,
        }
    }
}

/// One retirement year. Amounts are nominal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecumulationRow {
    pub year: u32,
    pub age: u32,
    pub tranche: Tranche,
    pub base_need: f64,
    pub implied_income: Option<f64>,
    pub public_pension: f64,
    pub private_plan: f64,
    pub other_income: f64,
    pub total_income: f64,
    pub pre_pension_extra_cost: f64,
    pub extra_withdrawal: f64,
    pub property_sale: f64,
    pub mortgage_payment: f64,
    pub pending_installments: u32,
    /// Capital carried over from the previous year's end.
    pub starting_capital: f64,
    pub withdrawal: f64,
    pub gross_growth: f64,
    pub growth_tax: f64,
    pub net_growth: f64,
    pub ending_capital: f64,
    pub depleted: bool,
}

impl DecumulationRow {
    pub fn to_record(&self) -> RowRecord {
        let mut record = RowRecord::new()
            .with("Año jubilación", self.year)
            .with("Edad", self.age)
            .with("Tramo", self.tranche.label())
            .with("Necesidad base cartera (€)", self.base_need);
        if let Some(implied) = self.implied_income {
            record.set("Ingreso no cartera implícito (€)", implied);
        }
        record
            .with("Ingreso pensión pública (€)", self.public_pension)
            .with("Ingreso plan privado (€)", self.private_plan)
            .with("Otras rentas (€)", self.other_income)
            .with("Ingresos totales (€)", self.total_income)
            .with("Coste extra pre-pensión (€)", self.pre_pension_extra_cost)
            .with("Ajuste venta/alquiler (€)", self.extra_withdrawal)
            .with("Venta inmueble (€)", self.property_sale)
            .with("Cuota hipoteca pendiente (€)", self.mortgage_payment)
            .with("Cuotas pendientes fin año", self.pending_installments)
            .with("Capital inicial (€)", self.starting_capital + self.property_sale)
            .with("Retirada anual (€)", self.withdrawal)
            .with("Crecimiento neto (€)", self.net_growth)
            .with("Capital final (€)", self.ending_capital)
            .with("Capital agotado", self.depleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecumulationSummary {
    pub years: u32,
    pub depletion_year: Option<u32>,
    pub depletion_age: Option<u32>,
    pub final_capital: f64,
    pub total_withdrawn: f64,
    pub total_growth_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecumulationSchedule {
    pub rows: Vec<DecumulationRow>,
    pub summary: DecumulationSummary,
}

impl DecumulationSchedule {
    pub fn records(&self) -> Vec<RowRecord> {
        self.rows.iter().map(DecumulationRow::to_record).collect()
    }
}

fn validate_params(params: &DecumulationParams) -> FireResult<()> {
    for (field, value) in [
        ("starting_portfolio", params.starting_portfolio),
        ("inflation_rate", params.inflation_rate),
        ("tax_rate_on_gains", params.tax_rate_on_gains),
    ] {
        if !value.is_finite() {
            return Err(FireError::invalid(field, "must be finite"));
        }
    }
    if params.years_in_retirement > MAX_RETIREMENT_YEARS {
        return Err(FireError::invalid(
            "years_in_retirement",
            format!("must be at most {MAX_RETIREMENT_YEARS}"),
        ));
    }
    Ok(())
}

/// Builds the year-by-year table. Each row's ending capital is the next
/// row's starting capital; ending capital never goes below zero.
pub fn build_decumulation(
    params: &DecumulationParams,
    policy: &dyn WithdrawalPolicy,
    adjustments: &DecumulationAdjustments,
) -> FireResult<DecumulationSchedule> {
    validate_params(params)?;

    let inflation = params.inflation_rate.max(RATE_FLOOR);
    let tax_rate = params.tax_rate_on_gains.max(0.0);
    let mut portfolio = params.starting_portfolio.max(0.0);
    let mut inflation_factor = 1.0_f64;
    let mut rows = Vec::with_capacity(params.years_in_retirement as usize);

    for year in 1..=params.years_in_retirement {
        let age = params.fire_age.saturating_add(year - 1);
        let plan = policy.plan_year(year, age);

        let mortgage_payment = adjustments.mortgage.at(year).max(0.0);
        let extra_withdrawal = adjustments.extra_withdrawal.at(year).max(0.0);
        let property_sale = adjustments.sale_today(year) * inflation_factor;

        let capital = portfolio + property_sale;
        let withdrawal = plan.portfolio_need * inflation_factor + mortgage_payment + extra_withdrawal;
        let gross_growth = capital * plan.annual_return;
        let growth_tax = gross_growth.max(0.0) * tax_rate;
        let net_growth = gross_growth - growth_tax;
        let ending_capital = (capital + net_growth - withdrawal).max(0.0);

        let total_income = plan.public_pension + plan.private_plan + plan.other_income;
        rows.push(DecumulationRow {
            year,
            age,
            tranche: plan.tranche,
            base_need: plan.base_need * inflation_factor,
            implied_income: plan.implied_income.map(|v| v * inflation_factor),
            public_pension: plan.public_pension * inflation_factor,
            private_plan: plan.private_plan * inflation_factor,
            other_income: plan.other_income * inflation_factor,
            total_income: total_income * inflation_factor,
            pre_pension_extra_cost: plan.pre_pension_extra_cost * inflation_factor,
            extra_withdrawal,
            property_sale,
            mortgage_payment,
            pending_installments: adjustments.pending_installments.at(year),
            starting_capital: portfolio,
            withdrawal,
            gross_growth,
            growth_tax,
            net_growth,
            ending_capital,
            depleted: ending_capital <= 0.0,
        });

        portfolio = ending_capital;
        inflation_factor *= 1.0 + inflation;
    }

    let summary = summarise(params, &rows);
    debug!(
        years = summary.years,
        depletion_age = ?summary.depletion_age,
        final_capital = summary.final_capital,
        "decumulation schedule built"
    );
    Ok(DecumulationSchedule { rows, summary })
}

fn summarise(params: &DecumulationParams, rows: &[DecumulationRow]) -> DecumulationSummary {
    let depleted = rows.iter().find(|row| row.depleted);
    DecumulationSummary {
        years: params.years_in_retirement,
        depletion_year: depleted.map(|row| row.year),
        depletion_age: depleted.map(|row| row.age),
        final_capital: rows
            .last()
            .map_or(params.starting_portfolio.max(0.0), |row| row.ending_capital),
        total_withdrawn: rows.iter().map(|row| row.withdrawal).sum(),
        total_growth_tax: rows.iter().map(|row| row.growth_tax).sum(),
    }
}
