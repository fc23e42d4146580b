//! Purchase Ledger
//!
//! Durable mint -> holding mapping. Every mutation is followed by a full
//! snapshot overwrite of the JSON file; there is no incremental log and no
//! atomic replace, so a crash mid-write can leave a corrupt snapshot.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::types::{AgentError, Coin};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub bonding_curve: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_bonding_curve: Option<String>,
    /// Whole-token units.
    pub amount: f64,
}

#[derive(Debug)]
pub struct PurchaseLedger {
    path: PathBuf,
    entries: BTreeMap<String, Holding>,
}

impl PurchaseLedger {
    /// Load the snapshot at `path`; a missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AgentError::Persistence(format!("corrupt ledger {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(AgentError::Persistence(format!("failed to read {}: {}", path.display(), e)));
            }
        };

        let ledger = Self { path, entries };
        info!("Loaded ledger with {} holdings", ledger.entries.len());
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, mint: &str) -> Option<&Holding> {
        self.entries.get(mint)
    }

    pub fn holdings(&self) -> &BTreeMap<String, Holding> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `amount` to the coin's holding and persist.
    pub fn credit(&mut self, coin: &Coin, amount: f64) -> Result<f64, AgentError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(AgentError::Validation(format!("cannot credit {} tokens of {}", amount, coin.mint)));
        }
        let holding = self.entries.entry(coin.key()).or_insert_with(|| Holding {
            bonding_curve: coin.bonding_curve.to_string(),
            associated_bonding_curve: None,
            amount: 0.0,
        });
        holding.amount += amount;
        if let Some(abc) = coin.associated_bonding_curve {
            holding.associated_bonding_curve = Some(abc.to_string());
        }
        let total = holding.amount;

        self.save()?;
        Ok(total)
    }

    /// Remove `amount` from the holding; the entry is dropped once it reaches
    /// zero. Returns what remains.
    pub fn debit(&mut self, mint: &str, amount: f64) -> Result<f64, AgentError> {
        let current = self
            .entries
            .get(mint)
            .map(|h| h.amount)
            .ok_or_else(|| AgentError::NotHolding(mint.to_string()))?;

        let remaining = current - amount;
        if remaining <= 0.0 {
            self.entries.remove(mint);
        } else if let Some(holding) = self.entries.get_mut(mint) {
            holding.amount = remaining;
        }

        self.save()?;
        Ok(remaining.max(0.0))
    }

    /// Overwrite a holding's amount (reconciliation), dropping it at zero.
    pub fn set_amount(&mut self, mint: &str, amount: f64) -> Result<(), AgentError> {
        if amount <= 0.0 {
            self.entries.remove(mint);
        } else if let Some(holding) = self.entries.get_mut(mint) {
            holding.amount = amount;
        }
        self.save()
    }

    /// Write the full snapshot.
    pub fn save(&self) -> Result<(), AgentError> {
        let data = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&self.path, data)
            .map_err(|e| AgentError::Persistence(format!("failed to write {}: {}", self.path.display(), e)))?;
        debug!("Ledger snapshot written ({} holdings)", self.entries.len());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_ledger_path() -> PathBuf {
    std::env::temp_dir().join(format!("pump-trader-ledger-{}.json", uuid::Uuid::new_v4()))
}
