mod brackets;
mod engine;
mod pack;
mod repository;

pub use brackets::{
    Bracket, BracketBreakdown, BracketLine, bracket_issues, progressive_tax,
    progressive_tax_breakdown,
};
pub use engine::{
    RegionalTax, SavingsTaxDetail, SavingsTaxSystem, WealthTax, WealthTaxDetail, savings_tax,
    savings_tax_detailed, wealth_tax, wealth_tax_detailed,
};
pub use pack::{
    FIXED_PCT_BONUS, ForalRules, GeneralIncomeRules, IncomeTaxRules, IsgfRules, REGION_LABELS,
    RegionOption, RegionWealthRules, SavingsRules, TaxPack, TaxPackMeta, WealthBonus, WealthRules,
    region_label,
};
pub use repository::{FsTaxPackRepository, InMemoryTaxPackRepository, TaxPackRepository};

#[cfg(test)]
pub(crate) use engine::tests::sample_pack;
