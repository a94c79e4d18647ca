use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::brackets::{Bracket, bracket_issues};

/// Region keys understood by the engine and their display labels.
pub const REGION_LABELS: &[(&str, &str)] = &[
    ("andalucia", "Andalucía"),
    ("aragon", "Aragón"),
    ("asturias", "Asturias"),
    ("illes-balears", "Illes Balears"),
    ("canarias", "Canarias"),
    ("cantabria", "Cantabria"),
    ("castilla-la-mancha", "Castilla-La Mancha"),
    ("castilla-y-leon", "Castilla y León"),
    ("cataluna", "Cataluña"),
    ("comunitat-valenciana", "Comunitat Valenciana"),
    ("extremadura", "Extremadura"),
    ("galicia", "Galicia"),
    ("madrid", "Madrid"),
    ("murcia", "Región de Murcia"),
    ("la-rioja", "La Rioja"),
    ("ceuta", "Ceuta"),
    ("melilla", "Melilla"),
    ("navarra", "Navarra"),
    ("pais-vasco-alava", "País Vasco (Álava)"),
    ("pais-vasco-bizkaia", "País Vasco (Bizkaia)"),
    ("pais-vasco-gipuzkoa", "País Vasco (Gipuzkoa)"),
];

pub fn region_label(key: &str) -> &str {
    REGION_LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOption {
    pub key: String,
    pub label: String,
}

/// Descriptive fields stay raw JSON; type problems surface through
/// `TaxPack::validate_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaxPackMeta {
    pub country: Option<Value>,
    pub year: Option<Value>,
    pub version: Option<Value>,
    pub generated_at: Option<Value>,
    pub last_reviewed: Option<Value>,
    pub sources: Option<Value>,
}

impl TaxPackMeta {
    pub fn country(&self) -> Option<&str> {
        self.country.as_ref().and_then(Value::as_str)
    }

    pub fn year(&self) -> Option<u32> {
        self.year
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|y| u32::try_from(y).ok())
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_ref().and_then(Value::as_str)
    }

    pub fn sources(&self) -> Vec<&str> {
        self.sources
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralIncomeRules {
    pub autonomous_brackets_by_region: BTreeMap<String, Vec<Bracket>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForalRules {
    pub savings_brackets_by_region: BTreeMap<String, Vec<Bracket>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavingsRules {
    pub brackets: Vec<Bracket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeTaxRules {
    pub general: GeneralIncomeRules,
    pub foral: ForalRules,
    pub savings: SavingsRules,
}

pub const FIXED_PCT_BONUS: &str = "fixedPct";

/// Rebate applied on top of the computed regional wealth tax. Only the
/// `fixedPct` mode rebates anything; a missing or unknown mode is inert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WealthBonus {
    pub mode: Option<String>,
    pub pct: f64,
}

impl WealthBonus {
    pub fn fixed_pct(pct: f64) -> Self {
        Self {
            mode: Some(FIXED_PCT_BONUS.to_string()),
            pct,
        }
    }

    pub fn rebate_pct(&self) -> f64 {
        match self.mode.as_deref() {
            Some(FIXED_PCT_BONUS) if self.pct.is_finite() => self.pct.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegionWealthRules {
    pub min_exempt: f64,
    pub brackets: Vec<Bracket>,
    pub bonus: Option<WealthBonus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IsgfRules {
    pub threshold: f64,
    pub min_exempt: f64,
    pub brackets: Vec<Bracket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WealthRules {
    pub regions: BTreeMap<String, RegionWealthRules>,
    pub isgf: IsgfRules,
}

/// One country/year tax document. Built once at load time and then shared
/// read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxPack {
    pub meta: TaxPackMeta,
    pub irpf: IncomeTaxRules,
    pub wealth: WealthRules,
}

impl TaxPack {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Missing or mistyped descriptive fields, all reported together.
    pub fn validate_metadata(&self) -> Vec<String> {
        let meta = &self.meta;
        let is_text: fn(&Value) -> bool = Value::is_string;
        let is_year: fn(&Value) -> bool = |v| v.as_u64().is_some_and(|y| y <= u64::from(u32::MAX));
        let is_list: fn(&Value) -> bool = Value::is_array;

        let mut errors = Vec::new();
        for (field, value, well_typed, kind) in [
            ("country", &meta.country, is_text, "a string"),
            ("year", &meta.year, is_year, "a non-negative integer"),
            ("version", &meta.version, is_text, "a string"),
            ("generatedAt", &meta.generated_at, is_text, "a string"),
            ("lastReviewed", &meta.last_reviewed, is_text, "a string"),
            ("sources", &meta.sources, is_list, "a list"),
        ] {
            match value {
                None => errors.push(format!("Missing meta.{field}")),
                Some(v) if !well_typed(v) => errors.push(format!("meta.{field} must be {kind}")),
                Some(_) => {}
            }
        }
        let has_sources = meta
            .sources
            .as_ref()
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        if !has_sources {
            errors.push("meta.sources must be a non-empty list".to_string());
        }
        errors
    }

    /// Metadata problems plus any bracket table that breaks ordering rules.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.validate_metadata();
        warnings.extend(bracket_issues("irpf.savings", &self.irpf.savings.brackets));
        for (region, brackets) in &self.irpf.foral.savings_brackets_by_region {
            warnings.extend(bracket_issues(&format!("irpf.foral.{region}"), brackets));
        }
        for (region, rules) in &self.wealth.regions {
            warnings.extend(bracket_issues(&format!("wealth.regions.{region}"), &rules.brackets));
            if rules.min_exempt < 0.0 {
                warnings.push(format!("wealth.regions.{region}: minExempt is negative"));
            }
        }
        warnings.extend(bracket_issues("wealth.isgf", &self.wealth.isgf.brackets));
        warnings
    }

    pub fn foral_savings_brackets(&self, region: &str) -> Option<&[Bracket]> {
        self.irpf
            .foral
            .savings_brackets_by_region
            .get(region)
            .filter(|b| !b.is_empty())
            .map(Vec::as_slice)
    }

    pub fn region_wealth_rules(&self, region: &str) -> Option<&RegionWealthRules> {
        self.wealth.regions.get(region)
    }

    /// Regions this pack defines anywhere, labelled and sorted by label.
    pub fn region_options(&self) -> Vec<RegionOption> {
        let keys: BTreeSet<&String> = self
            .irpf
            .general
            .autonomous_brackets_by_region
            .keys()
            .chain(self.irpf.foral.savings_brackets_by_region.keys())
            .chain(self.wealth.regions.keys())
            .collect();

        let mut options = keys
            .into_iter()
            .map(|key| RegionOption {
                key: key.clone(),
                label: region_label(key).to_string(),
            })
            .collect::<Vec<_>>();
        options.sort_by(|a, b| a.label.cmp(&b.label));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "meta": {
            "country": "es",
            "year": 2025,
            "version": "1.0.0",
            "generatedAt": "2025-01-15T00:00:00Z",
            "lastReviewed": "2025-01-15",
            "sources": ["BOE"]
        },
        "irpf": {
            "general": { "autonomousBracketsByRegion": { "madrid": [], "cataluna": [] } },
            "foral": { "savingsBracketsByRegion": { "navarra": [{ "upTo": 6000, "rate": 0.19 }, { "upTo": null, "rate": 0.26 }] } },
            "savings": { "brackets": [{ "upTo": 6000, "rate": 0.19 }, { "rate": 0.21 }] }
        },
        "wealth": {
            "regions": {
                "madrid": { "minExempt": 700000, "brackets": [{ "rate": 0.01 }], "bonus": { "mode": "fixedPct", "pct": 1.0 } },
                "galicia": { "minExempt": 700000, "brackets": [{ "rate": 0.01 }], "bonus": { "mode": "progressive" } }
            },
            "isgf": { "threshold": 3000000, "minExempt": 700000, "brackets": [{ "rate": 0.017 }] }
        }
    }"#;

    #[test]
    fn parses_typed_document() {
        let pack = TaxPack::from_json(SAMPLE).expect("sample must parse");
        assert_eq!(pack.meta.year(), Some(2025));
        assert_eq!(pack.meta.country(), Some("es"));
        assert_eq!(pack.meta.sources(), vec!["BOE"]);
        assert_eq!(pack.irpf.savings.brackets.len(), 2);
        assert_eq!(pack.irpf.savings.brackets[1].up_to, None);
        assert!(pack.foral_savings_brackets("navarra").is_some());
        assert!(pack.foral_savings_brackets("madrid").is_none());

        let madrid = pack.region_wealth_rules("madrid").expect("madrid rules");
        assert_eq!(madrid.bonus.as_ref().map(WealthBonus::rebate_pct), Some(1.0));
        let galicia = pack.region_wealth_rules("galicia").expect("galicia rules");
        assert_eq!(galicia.bonus.as_ref().map(WealthBonus::rebate_pct), Some(0.0));
        assert!(pack.validate().is_empty(), "{:?}", pack.validate());
    }

    #[test]
    fn metadata_validation_collects_every_missing_field() {
        let pack = TaxPack::from_json(r#"{ "meta": { "country": "es", "sources": [] } }"#)
            .expect("partial pack must parse");
        let errors = pack.validate_metadata();
        assert_eq!(
            errors,
            vec![
                "Missing meta.year".to_string(),
                "Missing meta.version".to_string(),
                "Missing meta.generatedAt".to_string(),
                "Missing meta.lastReviewed".to_string(),
                "meta.sources must be a non-empty list".to_string(),
            ]
        );

        let empty = TaxPack::default().validate_metadata();
        assert_eq!(empty.len(), 7);
    }

    #[test]
    fn partial_bonus_objects_parse_as_inert_or_zero_rebate() {
        let pack = TaxPack::from_json(
            r#"{ "wealth": { "regions": {
                "asturias": { "minExempt": 700000, "brackets": [{ "rate": 0.01 }], "bonus": {} },
                "aragon": { "minExempt": 400000, "brackets": [{ "rate": 0.01 }], "bonus": { "mode": "fixedPct" } },
                "canarias": { "minExempt": 700000, "brackets": [{ "rate": 0.01 }], "bonus": { "pct": 0.5 } }
            } } }"#,
        )
        .expect("partial bonuses must parse");

        let asturias = pack.region_wealth_rules("asturias").expect("asturias rules");
        assert_eq!(asturias.bonus, Some(WealthBonus::default()));
        assert_eq!(asturias.bonus.as_ref().map(WealthBonus::rebate_pct), Some(0.0));

        let aragon = pack.region_wealth_rules("aragon").expect("aragon rules");
        assert_eq!(aragon.bonus, Some(WealthBonus::fixed_pct(0.0)));
        assert_eq!(aragon.bonus.as_ref().map(WealthBonus::rebate_pct), Some(0.0));

        let canarias = pack.region_wealth_rules("canarias").expect("canarias rules");
        assert_eq!(canarias.bonus.as_ref().map(WealthBonus::rebate_pct), Some(0.0));
    }

    #[test]
    fn mistyped_metadata_is_a_warning_not_a_parse_failure() {
        let pack = TaxPack::from_json(
            r#"{ "meta": {
                "country": "es", "year": "2025", "version": 3,
                "generatedAt": "x", "lastReviewed": "y", "sources": "BOE"
            } }"#,
        )
        .expect("mistyped metadata must still parse");

        assert_eq!(pack.meta.year(), None);
        assert_eq!(
            pack.validate_metadata(),
            vec![
                "meta.year must be a non-negative integer".to_string(),
                "meta.version must be a string".to_string(),
                "meta.sources must be a list".to_string(),
                "meta.sources must be a non-empty list".to_string(),
            ]
        );
    }

    #[test]
    fn region_options_are_sorted_by_label() {
        let pack = TaxPack::from_json(SAMPLE).expect("sample must parse");
        let labels = pack
            .region_options()
            .into_iter()
            .map(|o| o.label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Cataluña", "Galicia", "Madrid", "Navarra"]);
    }

    #[test]
    fn unknown_region_key_labels_as_itself() {
        assert_eq!(region_label("atlantis"), "atlantis");
        assert_eq!(region_label("pais-vasco-bizkaia"), "País Vasco (Bizkaia)");
    }
}
