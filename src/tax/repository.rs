use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::pack::TaxPack;
use crate::error::{FireError, FireResult};

/// Source of tax packs, keyed by country and year.
pub trait TaxPackRepository: Send + Sync {
    fn load(&self, country: &str, year: u32) -> FireResult<TaxPack>;
    fn list_years(&self, country: &str) -> FireResult<Vec<u32>>;
}

/// Reads `<dir>/<country>-<year>.json` documents.
#[derive(Debug, Clone)]
pub struct FsTaxPackRepository {
    dir: PathBuf,
}

impl FsTaxPackRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pack_path(&self, country: &str, year: u32) -> PathBuf {
        self.dir
            .join(format!("{}-{year}.json", country.to_lowercase()))
    }
}

impl TaxPackRepository for FsTaxPackRepository {
    fn load(&self, country: &str, year: u32) -> FireResult<TaxPack> {
        let path = self.pack_path(country, year);
        if !path.exists() {
            return Err(FireError::TaxPackNotFound {
                path: path.display().to_string(),
            });
        }

        let raw = fs::read_to_string(&path)?;
        let pack = TaxPack::from_json(&raw).map_err(|e| FireError::TaxPackParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let warnings = pack.validate();
        for warning in &warnings {
            warn!(path = %path.display(), "{warning}");
        }
        info!(
            path = %path.display(),
            warnings = warnings.len(),
            "loaded tax pack"
        );
        Ok(pack)
    }

    fn list_years(&self, country: &str) -> FireResult<Vec<u32>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-", country.to_lowercase());
        let mut years = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(year) = stem.strip_prefix(&prefix) else {
                continue;
            };
            if !year.is_empty() && year.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(year) = year.parse::<u32>() {
                    years.push(year);
                }
            }
        }
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }
}

/// Packs held in memory; used by tests and embedding hosts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaxPackRepository {
    packs: BTreeMap<(String, u32), TaxPack>,
}

impl InMemoryTaxPackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pack(mut self, country: &str, year: u32, pack: TaxPack) -> Self {
        self.insert(country, year, pack);
        self
    }

    pub fn insert(&mut self, country: &str, year: u32, pack: TaxPack) {
        self.packs.insert((country.to_lowercase(), year), pack);
    }
}

impl TaxPackRepository for InMemoryTaxPackRepository {
    fn load(&self, country: &str, year: u32) -> FireResult<TaxPack> {
        let country = country.to_lowercase();
        self.packs
            .get(&(country.clone(), year))
            .cloned()
            .ok_or_else(|| FireError::TaxPackNotFound {
                path: format!("memory://{country}-{year}"),
            })
    }

    fn list_years(&self, country: &str) -> FireResult<Vec<u32>> {
        let country = country.to_lowercase();
        Ok(self
            .packs
            .keys()
            .filter(|(c, _)| *c == country)
            .map(|(_, year)| *year)
            .collect())
    }
}
