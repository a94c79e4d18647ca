use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AccumulationInputs, DecumulationAdjustments, DecumulationParams, DecumulationSummary,
    IncomeSchedulePolicy, JsonTableRenderer, ReturnSeries, RowRecord, SamplingConfig,
    SimulationResult, SimulationStrategy, SolverConfig, TableRenderer, TaxContextResult,
    TwoPhasePolicy, WithdrawalPolicy, backtest_rolling_windows, backtest_window_rows,
    build_decumulation, column_names, estimate_taxable_withdrawal_ratio, find_template,
    manual_window_indices, monte_carlo_bootstrap, monte_carlo_normal, render_rows,
    solve_retirement_tax_context, template_window_indices, valid_start_years, window_returns,
};
use crate::error::{FireError, FireResult};
use crate::tax::{FsTaxPackRepository, RegionOption, RegionalTax, TaxPackRepository};

pub const DEFAULT_COUNTRY: &str = "es";
const DEFAULT_MEAN_RETURN: f64 = 0.07;
const DEFAULT_VOLATILITY: f64 = 0.15;
const DEFAULT_TAXABLE_RATIO: f64 = 0.5;
const DEFAULT_BAND: &str = "P50";

#[derive(Parser, Debug)]
#[command(
    name = "fire-es",
    about = "FIRE planner for Spanish households: return simulation, regional taxes and decumulation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log filter used when FIRE_LOG is not set"
    )]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(
        long,
        default_value = "data/taxpacks",
        help = "Directory holding <country>-<year>.json tax packs"
    )]
    pub taxpack_dir: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TaxPackRepository>,
    pub history: Arc<ReturnSeries>,
    /// Backs the `/table` routes; `None` makes them fail with 500.
    pub renderer: Option<Arc<dyn TableRenderer>>,
}

impl AppState {
    pub fn new(repository: Arc<dyn TaxPackRepository>, history: ReturnSeries) -> Self {
        Self {
            repository,
            history: Arc::new(history),
            renderer: Some(Arc::new(JsonTableRenderer::default())),
        }
    }

    pub fn with_renderer(mut self, renderer: Option<Arc<dyn TableRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    strategy: Option<SimulationStrategy>,
    initial_wealth: Option<f64>,
    monthly_contribution: Option<f64>,
    contribution_growth_rate: Option<f64>,
    years: Option<u32>,
    inflation_rate: Option<f64>,
    annual_spending: Option<f64>,
    safe_withdrawal_rate: Option<f64>,
    mean_return: Option<f64>,
    volatility: Option<f64>,
    num_simulations: Option<u32>,
    seed: Option<u64>,
    include_paths: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    #[serde(flatten)]
    result: SimulationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    window_rows: Vec<RowRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoRatioPayload {
    initial_wealth: f64,
    monthly_contribution: f64,
    years: u32,
    expected_return: f64,
    #[serde(default)]
    contribution_growth_rate: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxContextPayload {
    net_spending: Option<f64>,
    safe_withdrawal_rate: Option<f64>,
    taxable_withdrawal_ratio: Option<f64>,
    auto_ratio: Option<AutoRatioPayload>,
    country: Option<String>,
    year: Option<u32>,
    region: Option<String>,
    solver: Option<SolverConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
enum PolicyPayload {
    IncomeSchedule(IncomeSchedulePolicy),
    TwoPhase(TwoPhasePolicy),
    /// Two-phase withdrawals derived from an income schedule.
    DerivedTwoPhase(IncomeSchedulePolicy),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WindowChoice {
    template: Option<String>,
    start_year: Option<u32>,
    shift_years: i32,
    band: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecumulationPayload {
    #[serde(flatten)]
    params: DecumulationParams,
    policy: PolicyPayload,
    #[serde(default)]
    adjustments: DecumulationAdjustments,
    #[serde(default)]
    backtest_window: Option<WindowChoice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecumulationResponse {
    columns: Vec<String>,
    rows: Vec<RowRecord>,
    summary: DecumulationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_start_year: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableResponse {
    renderer: Option<String>,
    columns: Vec<String>,
    table: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct YearsResponse {
    country: String,
    years: Vec<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionsResponse {
    country: String,
    year: u32,
    regions: Vec<RegionOption>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/taxpacks/:country", get(years_handler))
        .route("/api/taxpacks/:country/:year/regions", get(regions_handler))
        .route("/api/retirement/tax-context", post(tax_context_handler))
        .route("/api/decumulation", post(decumulation_handler))
        .route("/api/decumulation/table", post(decumulation_table_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(args: ServeArgs) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let repository = Arc::new(FsTaxPackRepository::new(args.taxpack_dir.clone()));
    let state = AppState::new(repository, ReturnSeries::sp500_total_return());

    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        taxpack_dir = %args.taxpack_dir.display(),
        "FIRE HTTP API listening"
    );

    axum::serve(listener, router(state)).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    respond(run_simulation(&state.history, payload))
}

async fn years_handler(State(state): State<AppState>, Path(country): Path<String>) -> Response {
    let years = state.repository.list_years(&country);
    respond(years.map(|years| YearsResponse { country, years }))
}

async fn regions_handler(
    State(state): State<AppState>,
    Path((country, year)): Path<(String, u32)>,
) -> Response {
    respond(region_directory(state.repository.as_ref(), &country, year))
}

async fn tax_context_handler(
    State(state): State<AppState>,
    Json(payload): Json<TaxContextPayload>,
) -> Response {
    respond(run_tax_context(state.repository.as_ref(), payload))
}

async fn decumulation_handler(
    State(state): State<AppState>,
    Json(payload): Json<DecumulationPayload>,
) -> Response {
    respond(run_decumulation(&state.history, payload))
}

async fn decumulation_table_handler(
    State(state): State<AppState>,
    Json(payload): Json<DecumulationPayload>,
) -> Response {
    let table = run_decumulation(&state.history, payload)
        .and_then(|response| render_table(&response.rows, state.renderer.as_deref()));
    respond(table)
}

fn respond<T: Serialize>(result: FireResult<T>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => fire_error_response(&err),
    }
}

fn status_for(err: &FireError) -> StatusCode {
    match err {
        FireError::InvalidInput { .. }
        | FireError::InsufficientHistory { .. }
        | FireError::EmptyHistory => StatusCode::BAD_REQUEST,
        FireError::TaxPackNotFound { .. } => StatusCode::NOT_FOUND,
        FireError::TaxPackParse { .. } | FireError::Io(_) | FireError::RendererUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn fire_error_response(err: &FireError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn render_table(
    rows: &[RowRecord],
    renderer: Option<&dyn TableRenderer>,
) -> FireResult<TableResponse> {
    let table = render_rows(rows, renderer)?;
    Ok(TableResponse {
        renderer: renderer.map(|r| r.name().to_string()),
        columns: column_names(rows),
        table,
    })
}

fn accumulation_inputs(payload: &SimulatePayload) -> AccumulationInputs {
    let defaults = AccumulationInputs::default();
    AccumulationInputs {
        initial_wealth: payload.initial_wealth.unwrap_or(defaults.initial_wealth),
        monthly_contribution: payload
            .monthly_contribution
            .unwrap_or(defaults.monthly_contribution),
        contribution_growth_rate: payload
            .contribution_growth_rate
            .unwrap_or(defaults.contribution_growth_rate),
        years: payload.years.unwrap_or(defaults.years),
        inflation_rate: payload.inflation_rate.unwrap_or(defaults.inflation_rate),
        annual_spending: payload.annual_spending.unwrap_or(defaults.annual_spending),
        safe_withdrawal_rate: payload
            .safe_withdrawal_rate
            .unwrap_or(defaults.safe_withdrawal_rate),
    }
}

fn run_simulation(history: &ReturnSeries, payload: SimulatePayload) -> FireResult<SimulateResponse> {
    let inputs = accumulation_inputs(&payload);
    let defaults = SamplingConfig::default();
    let sampling = SamplingConfig {
        num_simulations: payload.num_simulations.unwrap_or(defaults.num_simulations),
        seed: payload.seed.unwrap_or(defaults.seed),
    };

    let result = match payload.strategy.unwrap_or(SimulationStrategy::Normal) {
        SimulationStrategy::Normal => monte_carlo_normal(
            &inputs,
            payload.mean_return.unwrap_or(DEFAULT_MEAN_RETURN),
            payload.volatility.unwrap_or(DEFAULT_VOLATILITY),
            sampling,
        )?,
        SimulationStrategy::Bootstrap => monte_carlo_bootstrap(&inputs, history, sampling)?,
        SimulationStrategy::Backtest => backtest_rolling_windows(&inputs, history)?,
    };

    let paths = payload
        .include_paths
        .then(|| result.paths.rows().map(<[f64]>::to_vec).collect());
    let window_rows = backtest_window_rows(&result);
    Ok(SimulateResponse {
        result,
        paths,
        window_rows,
    })
}

fn region_directory(
    repository: &dyn TaxPackRepository,
    country: &str,
    year: u32,
) -> FireResult<RegionsResponse> {
    let pack = repository.load(country, year)?;
    Ok(RegionsResponse {
        country: country.to_string(),
        year,
        regions: pack.region_options(),
        warnings: pack.validate(),
    })
}

fn run_tax_context(
    repository: &dyn TaxPackRepository,
    payload: TaxContextPayload,
) -> FireResult<TaxContextResult> {
    let net_spending = payload
        .net_spending
        .ok_or_else(|| FireError::invalid("netSpending", "is required"))?;
    let safe_withdrawal_rate = payload
        .safe_withdrawal_rate
        .ok_or_else(|| FireError::invalid("safeWithdrawalRate", "is required"))?;

    let ratio = match &payload.auto_ratio {
        Some(auto) => estimate_taxable_withdrawal_ratio(
            auto.initial_wealth,
            auto.monthly_contribution,
            auto.years,
            auto.expected_return,
            auto.contribution_growth_rate,
        ),
        None => payload
            .taxable_withdrawal_ratio
            .unwrap_or(DEFAULT_TAXABLE_RATIO),
    };

    let country = payload.country.as_deref().unwrap_or(DEFAULT_COUNTRY);
    let pack = payload
        .year
        .map(|year| repository.load(country, year))
        .transpose()?;
    let region = payload.region.as_deref().filter(|r| !r.is_empty());
    let tax = match (&pack, region) {
        (Some(pack), Some(region)) => Some(RegionalTax::new(pack, region)),
        _ => None,
    };

    solve_retirement_tax_context(
        net_spending,
        safe_withdrawal_rate,
        ratio,
        tax,
        &payload.solver.unwrap_or_default(),
    )
}

/// Picks one historical window for the decumulation horizon and returns its
/// start year and returns.
fn resolve_window(
    history: &ReturnSeries,
    years: u32,
    choice: &WindowChoice,
) -> FireResult<(u32, Vec<f64>)> {
    let years = years as usize;
    let starts = valid_start_years(history, years);
    if starts.is_empty() {
        return Err(FireError::InsufficientHistory {
            years,
            available: history.len(),
        });
    }
    let band = choice.band.as_deref().unwrap_or(DEFAULT_BAND);

    let selection = match (&choice.template, choice.start_year) {
        (Some(name), _) => {
            let template = find_template(name)
                .ok_or_else(|| FireError::invalid("template", format!("unknown template {name}")))?;
            template_window_indices(&starts, template, choice.shift_years)
        }
        (None, Some(start_year)) => {
            manual_window_indices(&starts, &BTreeMap::from([(band.to_string(), start_year)]))
        }
        (None, None) => {
            return Err(FireError::invalid(
                "backtestWindow",
                "needs a template or a startYear",
            ));
        }
    };
    let index = *selection
        .get(band)
        .ok_or_else(|| FireError::invalid("band", format!("unknown band {band}")))?;

    Ok((starts[index], window_returns(history, index, years)?))
}

fn run_decumulation(
    history: &ReturnSeries,
    payload: DecumulationPayload,
) -> FireResult<DecumulationResponse> {
    let mut window_start_year = None;
    let policy: Box<dyn WithdrawalPolicy> = match payload.policy {
        PolicyPayload::IncomeSchedule(policy) => {
            if payload.backtest_window.is_some() {
                return Err(FireError::invalid(
                    "backtestWindow",
                    "only applies to two-phase policies",
                ));
            }
            Box::new(policy)
        }
        PolicyPayload::TwoPhase(mut policy) => {
            if let Some(choice) = &payload.backtest_window {
                let (start, returns) =
                    resolve_window(history, payload.params.years_in_retirement, choice)?;
                window_start_year = Some(start);
                policy.returns_override = Some(returns);
            }
            Box::new(policy)
        }
        PolicyPayload::DerivedTwoPhase(schedule) => {
            let mut policy = schedule.derive_two_phase();
            if let Some(choice) = &payload.backtest_window {
                let (start, returns) =
                    resolve_window(history, payload.params.years_in_retirement, choice)?;
                window_start_year = Some(start);
                policy.returns_override = Some(returns);
            }
            Box::new(policy)
        }
    };

    let schedule = build_decumulation(&payload.params, policy.as_ref(), &payload.adjustments)?;
    let rows = schedule.records();
    Ok(DecumulationResponse {
        columns: column_names(&rows),
        rows,
        summary: schedule.summary,
        window_start_year,
    })
}
