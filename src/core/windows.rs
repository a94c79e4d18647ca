use std::collections::BTreeMap;

use serde::Serialize;

use super::engine::geometric_annualized_return;
use super::history::ReturnSeries;
use super::records::RowRecord;
use super::stats::BAND_LABELS;
use super::types::SimulationResult;
use crate::error::{FireError, FireResult};

/// Band label -> backtest window index.
pub type WindowSelection = BTreeMap<String, usize>;

/// Stress scenario: an anchor start year plus per-band offsets in windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub anchor_year: u32,
    /// Offsets for P5, P25, P50, P75, P95.
    pub offsets: [i32; 5],
}

pub static WINDOW_TEMPLATES: [WindowTemplate; 6] = [
    WindowTemplate {
        name: "Choque temprano (estilo 1929)",
        description: "Arranca en tramo histórico duro y mejora progresivamente.",
        anchor_year: 1929,
        offsets: [0, 8, 16, 28, 40],
    },
    WindowTemplate {
        name: "Estanflación (estilo 1973)",
        description: "Prioriza décadas con inflación alta y retorno real débil.",
        anchor_year: 1973,
        offsets: [0, 5, 10, 16, 24],
    },
    WindowTemplate {
        name: "Ciclo mixto (estilo 2000)",
        description: "Incluye burbuja tecnológica, crisis financiera y recuperación.",
        anchor_year: 2000,
        offsets: [-6, -2, 0, 5, 10],
    },
    WindowTemplate {
        name: "Régimen favorable (estilo 1982)",
        description: "Sesgo hacia ciclos de expansión prolongada.",
        anchor_year: 1982,
        offsets: [-10, -4, 0, 8, 16],
    },
    WindowTemplate {
        name: "Puente pre-pensión estresado (7-9%)",
        description: "Prioriza secuencias con choque temprano para tensionar el puente \
                      pre-pensión y evaluar si la cartera soporta retiradas altas iniciales.",
        anchor_year: 1929,
        offsets: [0, 3, 8, 15, 24],
    },
    WindowTemplate {
        name: "Recuperación tardía (drawdown prolongado)",
        description: "Modela un arranque flojo y recuperación más lenta para probar \
                      resiliencia en los primeros años de retirada.",
        anchor_year: 1966,
        offsets: [0, 4, 10, 18, 28],
    },
];

pub fn find_template(name: &str) -> Option<&'static WindowTemplate> {
    WINDOW_TEMPLATES.iter().find(|t| t.name == name)
}

/// Calendar years at which a full window of `years` can start.
pub fn valid_start_years(history: &ReturnSeries, years: usize) -> Vec<u32> {
    if years == 0 || years > history.len() {
        return Vec::new();
    }
    (0..=history.len() - years).map(|i| history.year_at(i)).collect()
}

fn clamp_window_index(index: i64, windows: usize) -> usize {
    if windows == 0 {
        return 0;
    }
    index.clamp(0, windows as i64 - 1) as usize
}

/// Index of the start year closest to `target`; ties go to the earliest.
fn nearest_start_index(start_years: &[u32], target: i64) -> usize {
    start_years
        .iter()
        .enumerate()
        .min_by_key(|(_, year)| (i64::from(**year) - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Resolves a template to one window per band, shifting the anchor by
/// `shift_years` and clamping to the available windows.
pub fn template_window_indices(
    start_years: &[u32],
    template: &WindowTemplate,
    shift_years: i32,
) -> WindowSelection {
    let windows = start_years.len();
    let base = nearest_start_index(
        start_years,
        i64::from(template.anchor_year) + i64::from(shift_years),
    );
    BAND_LABELS
        .iter()
        .zip(template.offsets)
        .map(|(label, offset)| {
            let index = clamp_window_index(base as i64 + i64::from(offset), windows);
            (label.to_string(), index)
        })
        .collect()
}

/// Maps hand-picked start years to the nearest available window. Bands
/// without a choice use the first window.
pub fn manual_window_indices(
    start_years: &[u32],
    chosen: &BTreeMap<String, u32>,
) -> WindowSelection {
    let fallback = start_years.first().copied().unwrap_or(0);
    BAND_LABELS
        .iter()
        .map(|label| {
            let target = chosen.get(*label).copied().unwrap_or(fallback);
            (
                label.to_string(),
                nearest_start_index(start_years, i64::from(target)),
            )
        })
        .collect()
}

/// Chronological returns of the window starting at `index`.
pub fn window_returns(history: &ReturnSeries, index: usize, years: usize) -> FireResult<Vec<f64>> {
    if years == 0 {
        return Err(FireError::invalid("years", "must be > 0"));
    }
    history
        .window(index, years)
        .map(<[f64]>::to_vec)
        .ok_or_else(|| FireError::InsufficientHistory {
            years: index.saturating_add(years),
            available: history.len(),
        })
}

/// One row record per backtest window.
pub fn backtest_window_rows(result: &SimulationResult) -> Vec<RowRecord> {
    let Some(diag) = &result.backtest else {
        return Vec::new();
    };
    let (_, columns) = result.paths.shape();
    let years = columns.saturating_sub(1) as u32;

    diag.window_start_years
        .iter()
        .enumerate()
        .map(|(trial, start)| {
            let row = result.paths.row(trial);
            let final_wealth = row.last().copied().unwrap_or(0.0);
            let annualized = result
                .trial_returns
                .get(trial)
                .map(|r| geometric_annualized_return(r))
                .unwrap_or(0.0);
            RowRecord::new()
                .with("Ventana", trial + 1)
                .with("Año inicio", *start)
                .with("Año fin", start.saturating_add(years.saturating_sub(1)))
                .with("Capital final (€)", final_wealth)
                .with("Rentabilidad anualizada (%)", annualized * 100.0)
                .with("Capital agotado", final_wealth <= 0.0)
        })
        .collect()
}
