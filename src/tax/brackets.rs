use serde::{Deserialize, Serialize};

/// One progressive band. `up_to == None` marks the open-ended top band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    #[serde(default)]
    pub up_to: Option<f64>,
    #[serde(default)]
    pub rate: f64,
}

impl Bracket {
    pub fn bounded(up_to: f64, rate: f64) -> Self {
        Self {
            up_to: Some(up_to),
            rate,
        }
    }

    pub fn open(rate: f64) -> Self {
        Self { up_to: None, rate }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketLine {
    pub step: usize,
    pub lower: f64,
    pub upper: Option<f64>,
    pub rate: f64,
    pub taxable_in_bracket: f64,
    pub quota: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketBreakdown {
    pub taxable_base: f64,
    pub lines: Vec<BracketLine>,
    pub tax: f64,
}

impl BracketBreakdown {
    pub fn empty() -> Self {
        Self {
            taxable_base: 0.0,
            lines: Vec::new(),
            tax: 0.0,
        }
    }
}

pub fn progressive_tax(base: f64, brackets: &[Bracket]) -> f64 {
    progressive_tax_breakdown(base, brackets).tax
}

/// Walks the bands in order, taxing the slice of `base` that falls inside
/// each one. Stops at the first band whose upper edge covers the base.
pub fn progressive_tax_breakdown(base: f64, brackets: &[Bracket]) -> BracketBreakdown {
    let taxable = if base.is_finite() { base.max(0.0) } else { 0.0 };
    let mut lower = 0.0_f64;
    let mut total = 0.0_f64;
    let mut lines = Vec::with_capacity(brackets.len());

    for (idx, bracket) in brackets.iter().enumerate() {
        let rate = bracket.rate.max(0.0);
        let Some(upper) = bracket.up_to else {
            let span = (taxable - lower).max(0.0);
            let quota = span * rate;
            lines.push(BracketLine {
                step: idx + 1,
                lower,
                upper: None,
                rate,
                taxable_in_bracket: span,
                quota,
            });
            total += quota;
            break;
        };

        let span = (taxable.min(upper) - lower).max(0.0);
        let quota = span * rate;
        lines.push(BracketLine {
            step: idx + 1,
            lower,
            upper: Some(upper),
            rate,
            taxable_in_bracket: span,
            quota,
        });
        total += quota;
        lower = upper;
        if taxable <= lower {
            break;
        }
    }

    BracketBreakdown {
        taxable_base: taxable,
        lines,
        tax: total.max(0.0),
    }
}

/// Structural problems in a bracket table, one message per issue.
pub fn bracket_issues(label: &str, brackets: &[Bracket]) -> Vec<String> {
    let mut issues = Vec::new();
    if brackets.is_empty() {
        return issues;
    }

    let mut previous: Option<f64> = None;
    for (idx, bracket) in brackets.iter().enumerate() {
        if !bracket.rate.is_finite() || bracket.rate < 0.0 {
            issues.push(format!("{label}: bracket {} has a negative rate", idx + 1));
        }
        match bracket.up_to {
            Some(upper) => {
                if let Some(prev) = previous {
                    if upper <= prev {
                        issues.push(format!(
                            "{label}: bracket {} upper bound {upper} is not above {prev}",
                            idx + 1
                        ));
                    }
                }
                previous = Some(upper);
            }
            None if idx + 1 != brackets.len() => {
                issues.push(format!(
                    "{label}: open-ended bracket {} is not the last one",
                    idx + 1
                ));
            }
            None => {}
        }
    }

    if brackets.last().is_some_and(|b| b.up_to.is_some()) {
        issues.push(format!("{label}: last bracket must be open-ended"));
    }
    issues
}
