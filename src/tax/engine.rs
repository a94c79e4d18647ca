use serde::Serialize;

use super::brackets::{BracketBreakdown, progressive_tax, progressive_tax_breakdown};
use super::pack::{TaxPack, WealthBonus};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SavingsTaxSystem {
    Common,
    Foral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsTaxDetail {
    pub system: SavingsTaxSystem,
    pub region: String,
    #[serde(flatten)]
    pub breakdown: BracketBreakdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WealthTax {
    pub ip_tax: f64,
    pub isgf_tax: f64,
    pub total_wealth_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WealthTaxDetail {
    pub region: String,
    pub wealth: f64,
    pub ip_base: f64,
    pub ip_breakdown: BracketBreakdown,
    pub ip_tax_before_bonus: f64,
    pub ip_bonus_pct: f64,
    pub ip_tax: f64,
    pub isgf_base: f64,
    pub isgf_breakdown: BracketBreakdown,
    pub isgf_tax_gross: f64,
    pub isgf_tax_net: f64,
    pub total_wealth_tax: f64,
}

impl WealthTaxDetail {
    fn uncovered(region: &str, wealth: f64) -> Self {
        Self {
            region: region.to_string(),
            wealth,
            ip_base: 0.0,
            ip_breakdown: BracketBreakdown::empty(),
            ip_tax_before_bonus: 0.0,
            ip_bonus_pct: 0.0,
            ip_tax: 0.0,
            isgf_base: 0.0,
            isgf_breakdown: BracketBreakdown::empty(),
            isgf_tax_gross: 0.0,
            isgf_tax_net: 0.0,
            total_wealth_tax: 0.0,
        }
    }

    pub fn summary(&self) -> WealthTax {
        WealthTax {
            ip_tax: self.ip_tax,
            isgf_tax: self.isgf_tax_net,
            total_wealth_tax: self.total_wealth_tax,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Annual savings tax (base del ahorro). A foral override for the region
/// replaces the common table entirely.
pub fn savings_tax(savings_base: f64, pack: &TaxPack, region: &str) -> f64 {
    let base = non_negative(savings_base);
    match pack.foral_savings_brackets(region) {
        Some(brackets) => progressive_tax(base, brackets),
        None => progressive_tax(base, &pack.irpf.savings.brackets),
    }
}

pub fn savings_tax_detailed(savings_base: f64, pack: &TaxPack, region: &str) -> SavingsTaxDetail {
    let base = non_negative(savings_base);
    let (system, breakdown) = match pack.foral_savings_brackets(region) {
        Some(brackets) => (
            SavingsTaxSystem::Foral,
            progressive_tax_breakdown(base, brackets),
        ),
        None => (
            SavingsTaxSystem::Common,
            progressive_tax_breakdown(base, &pack.irpf.savings.brackets),
        ),
    };
    SavingsTaxDetail {
        system,
        region: region.to_string(),
        breakdown,
    }
}

pub fn wealth_tax(investable_wealth: f64, pack: &TaxPack, region: &str) -> WealthTax {
    wealth_tax_detailed(investable_wealth, pack, region).summary()
}

/// Regional wealth tax (IP) after its rebate, plus the national ISGF
/// overlay net of the regional tax. Regions without rules yield zeros.
pub fn wealth_tax_detailed(investable_wealth: f64, pack: &TaxPack, region: &str) -> WealthTaxDetail {
    let wealth = non_negative(investable_wealth);
    let Some(rules) = pack.region_wealth_rules(region) else {
        return WealthTaxDetail::uncovered(region, wealth);
    };

    let ip_base = (wealth - non_negative(rules.min_exempt)).max(0.0);
    let ip_breakdown = progressive_tax_breakdown(ip_base, &rules.brackets);
    let ip_tax_before_bonus = ip_breakdown.tax;
    let ip_bonus_pct = rules.bonus.as_ref().map(WealthBonus::rebate_pct).unwrap_or(0.0);
    let ip_tax = ip_tax_before_bonus * (1.0 - ip_bonus_pct);

    let isgf = &pack.wealth.isgf;
    let (isgf_base, isgf_breakdown) = if wealth <= isgf.threshold {
        (0.0, BracketBreakdown::empty())
    } else {
        let base = (wealth - non_negative(isgf.min_exempt)).max(0.0);
        (base, progressive_tax_breakdown(base, &isgf.brackets))
    };
    let isgf_tax_gross = isgf_breakdown.tax;
    let isgf_tax_net = (isgf_tax_gross - ip_tax).max(0.0);

    WealthTaxDetail {
        region: region.to_string(),
        wealth,
        ip_base,
        ip_breakdown,
        ip_tax_before_bonus,
        ip_bonus_pct,
        ip_tax,
        isgf_base,
        isgf_breakdown,
        isgf_tax_gross,
        isgf_tax_net,
        total_wealth_tax: (ip_tax + isgf_tax_net).max(0.0),
    }
}

/// A tax pack bound to one region: the handle the retirement solver uses.
#[derive(Debug, Clone, Copy)]
pub struct RegionalTax<'a> {
    pack: &'a TaxPack,
    region: &'a str,
}

impl<'a> RegionalTax<'a> {
    pub fn new(pack: &'a TaxPack, region: &'a str) -> Self {
        Self { pack, region }
    }

    pub fn region(&self) -> &str {
        self.region
    }

    pub fn savings_tax(&self, base: f64) -> f64 {
        savings_tax(base, self.pack, self.region)
    }

    pub fn wealth_tax(&self, wealth: f64) -> WealthTax {
        wealth_tax(wealth, self.pack, self.region)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tax::brackets::Bracket;
    use crate::tax::pack::{IsgfRules, RegionWealthRules, WealthBonus};
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    pub(crate) fn sample_pack() -> TaxPack {
        let mut pack = TaxPack::default();
        pack.irpf.savings.brackets = vec![
            Bracket::bounded(6_000.0, 0.19),
            Bracket::bounded(50_000.0, 0.21),
            Bracket::bounded(200_000.0, 0.23),
            Bracket::bounded(300_000.0, 0.27),
            Bracket::open(0.30),
        ];
        pack.irpf.foral.savings_brackets_by_region.insert(
            "navarra".to_string(),
            vec![Bracket::bounded(6_000.0, 0.20), Bracket::open(0.28)],
        );

        let wealth_brackets = vec![
            Bracket::bounded(1_000_000.0, 0.01),
            Bracket::bounded(2_000_000.0, 0.015),
            Bracket::open(0.02),
        ];
        pack.wealth.regions.insert(
            "madrid".to_string(),
            RegionWealthRules {
                min_exempt: 700_000.0,
                brackets: wealth_brackets.clone(),
                bonus: Some(WealthBonus::fixed_pct(1.0)),
            },
        );
        pack.wealth.regions.insert(
            "cataluna".to_string(),
            RegionWealthRules {
                min_exempt: 500_000.0,
                brackets: wealth_brackets.clone(),
                bonus: None,
            },
        );
        pack.wealth.regions.insert(
            "andalucia".to_string(),
            RegionWealthRules {
                min_exempt: 700_000.0,
                brackets: wealth_brackets,
                bonus: Some(WealthBonus::fixed_pct(0.5)),
            },
        );
        pack.wealth.isgf = IsgfRules {
            threshold: 3_000_000.0,
            min_exempt: 700_000.0,
            brackets: vec![Bracket::bounded(3_000_000.0, 0.0), Bracket::open(0.017)],
        };
        pack
    }

    #[test]
    fn savings_tax_uses_common_table_without_foral_override() {
        let pack = sample_pack();
        let detail = savings_tax_detailed(10_000.0, &pack, "madrid");
        assert_eq!(detail.system, SavingsTaxSystem::Common);
        assert_approx(detail.breakdown.tax, 1_980.0);
        assert_approx(savings_tax(10_000.0, &pack, "madrid"), 1_980.0);
    }

    #[test]
    fn foral_override_replaces_common_table() {
        let pack = sample_pack();
        let detail = savings_tax_detailed(10_000.0, &pack, "navarra");
        assert_eq!(detail.system, SavingsTaxSystem::Foral);
        assert_eq!(detail.region, "navarra");
        assert_approx(detail.breakdown.tax, 6_000.0 * 0.20 + 4_000.0 * 0.28);
    }

    #[test]
    fn unsupported_wealth_region_returns_zeros() {
        let pack = sample_pack();
        let tax = wealth_tax(50_000_000.0, &pack, "atlantis");
        assert_eq!(tax, WealthTax::default());
        let detail = wealth_tax_detailed(50_000_000.0, &pack, "atlantis");
        assert!(detail.ip_breakdown.lines.is_empty());
        assert_approx(detail.wealth, 50_000_000.0);
    }

    #[test]
    fn regional_tax_below_isgf_threshold_has_no_overlay() {
        let pack = sample_pack();
        let tax = wealth_tax(1_500_000.0, &pack, "cataluna");
        // base 1_000_000 at 1%
        assert_approx(tax.ip_tax, 10_000.0);
        assert_approx(tax.isgf_tax, 0.0);
        assert_approx(tax.total_wealth_tax, 10_000.0);
    }

    #[test]
    fn full_rebate_region_pays_isgf_above_threshold() {
        let pack = sample_pack();
        let detail = wealth_tax_detailed(4_000_000.0, &pack, "madrid");
        assert_approx(detail.ip_bonus_pct, 1.0);
        assert_approx(detail.ip_tax, 0.0);
        // isgf base 3_300_000: 300_000 above the zero band at 1.7%
        assert_approx(detail.isgf_base, 3_300_000.0);
        assert_approx(detail.isgf_tax_gross, 5_100.0);
        assert_approx(detail.isgf_tax_net, 5_100.0);
        assert_approx(detail.total_wealth_tax, 5_100.0);
    }

    #[test]
    fn isgf_is_net_of_regional_tax() {
        let pack = sample_pack();
        let detail = wealth_tax_detailed(4_000_000.0, &pack, "cataluna");
        // IP base 3_500_000 = 10_000 + 15_000 + 30_000
        assert_approx(detail.ip_tax, 55_000.0);
        assert_approx(detail.isgf_tax_gross, 5_100.0);
        assert_approx(detail.isgf_tax_net, 0.0);
        assert_approx(detail.total_wealth_tax, 55_000.0);
    }

    #[test]
    fn partial_rebate_scales_regional_tax() {
        let pack = sample_pack();
        let tax = wealth_tax(1_700_000.0, &pack, "andalucia");
        assert_approx(tax.ip_tax, 5_000.0);
    }

    #[test]
    fn regional_tax_handle_delegates_to_pack() {
        let pack = sample_pack();
        let tax = RegionalTax::new(&pack, "cataluna");
        assert_eq!(tax.region(), "cataluna");
        assert_approx(tax.savings_tax(10_000.0), 1_980.0);
        assert_approx(tax.wealth_tax(1_500_000.0).total_wealth_tax, 10_000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_wealth_tax_is_non_negative_and_at_least_regional(
            wealth in 0u64..20_000_000,
            region_idx in 0usize..4
        ) {
            let pack = sample_pack();
            let region = ["madrid", "cataluna", "andalucia", "ceuta"][region_idx];
            let detail = wealth_tax_detailed(wealth as f64, &pack, region);
            prop_assert!(detail.ip_tax >= 0.0);
            prop_assert!(detail.isgf_tax_net >= 0.0);
            prop_assert!(detail.total_wealth_tax + 1e-9 >= detail.ip_tax);
            prop_assert!(detail.total_wealth_tax + 1e-9 >= detail.isgf_tax_gross);
            if wealth as f64 <= pack.wealth.isgf.threshold {
                prop_assert!(detail.isgf_tax_net == 0.0);
            }
        }
    }
}
