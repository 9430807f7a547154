use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    /// Return on equity in percent. `None` when the fundamentals source had no value.
    pub roe: Option<f64>,
}

/// Immutable view of the screenable universe.
///
/// Built once per process (or per test) and handed to each screening run, so a run never sees
/// the universe change underneath it.
#[derive(Debug, Clone, Default)]
pub struct UniverseSnapshot {
    constituents: Vec<Constituent>,
    index: BTreeMap<String, usize>,
}

impl UniverseSnapshot {
    pub fn try_new(constituents: Vec<Constituent>) -> anyhow::Result<Self> {
        let mut index = BTreeMap::new();
        for (i, c) in constituents.iter().enumerate() {
            let symbol = c.symbol.trim();
            ensure!(!symbol.is_empty(), "constituent #{i} has an empty symbol");
            ensure!(
                symbol == c.symbol,
                "constituent symbol has surrounding whitespace: {:?}",
                c.symbol
            );
            ensure!(
                index.insert(c.symbol.clone(), i).is_none(),
                "duplicate constituent symbol: {}",
                c.symbol
            );
        }

        Ok(Self {
            constituents,
            index,
        })
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let constituents = serde_json::from_str::<Vec<Constituent>>(s)
            .context("universe file is not a JSON array of constituents")?;
        Self::try_new(constituents)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read universe file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("failed to load universe from {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.constituents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }

    pub fn constituents(&self) -> &[Constituent] {
        &self.constituents
    }

    pub fn get(&self, symbol: &str) -> Option<&Constituent> {
        self.index.get(symbol).map(|&i| &self.constituents[i])
    }

    /// Symbols whose ROE is known and at least `min_roe`, in universe order.
    ///
    /// Unknown ROE never passes, whatever the threshold.
    pub fn roe_passers(&self, min_roe: f64) -> Vec<String> {
        self.constituents
            .iter()
            .filter(|c| matches!(c.roe, Some(roe) if roe >= min_roe))
            .map(|c| c.symbol.clone())
            .collect()
    }
}
