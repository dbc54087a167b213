//! Which constraints apply to which (level, mode).
//!
//! The table is plain data. The built-in default can be replaced wholesale
//! from `[settings.registry]` in `cogbench.toml`; whatever is loaded is
//! validated once and the per-(level, mode) lists are precomputed.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintId;
use crate::error::RegistryError;
use crate::model::{CognitiveLevel, Mode};
use crate::settings::PerLevel;

/// Version stamped on records computed with the built-in table.
pub const REGISTRY_VERSION: &str = "bloom-2025.1";

/// Serializable registry table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub version: String,
    /// Prefixed to every level, in order.
    pub universal: Vec<ConstraintId>,
    /// Level-specific constraints, in order.
    pub levels: PerLevel<Vec<ConstraintId>>,
    /// Removed from a level's list in adversarial mode.
    pub vocabulary: Vec<ConstraintId>,
    /// Appended to every level's list in adversarial mode.
    pub adversarial: Vec<ConstraintId>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        use ConstraintId::*;
        Self {
            version: REGISTRY_VERSION.to_string(),
            universal: vec![U1, U2, U3, U4],
            levels: PerLevel {
                remember: vec![R1, R2, R3, R4],
                understand: vec![D1, D2, D3, D4],
                apply: vec![P1, P2, P3, P4],
                analyze: vec![A1, A2, A3, A4],
                evaluate: vec![E1, E2, E3, E4],
                create: vec![C1, C2, C3, C4],
            },
            vocabulary: vec![R1, D1, P1, A1, E1, C1],
            adversarial: vec![AV, AN],
        }
    }
}

/// A validated registry with the applicable lists precomputed.
#[derive(Debug, Clone)]
pub struct Registry {
    config: RegistryConfig,
    standard: PerLevel<Vec<ConstraintId>>,
    adversarial: PerLevel<Vec<ConstraintId>>,
}

impl Registry {
    /// The built-in table.
    pub fn builtin() -> Self {
        Self::from_config(RegistryConfig::default())
            .unwrap_or_else(|e| unreachable!("built-in registry is invalid: {e}"))
    }

    /// Check a table without keeping the result, including duplicates in
    /// the composed lists.
    pub fn validate(config: &RegistryConfig) -> Result<(), RegistryError> {
        Self::from_config(config.clone()).map(|_| ())
    }

    pub fn from_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        check_table(&config)?;
        let standard: PerLevel<Vec<ConstraintId>> = PerLevel::from_fn(|level| {
            config
                .universal
                .iter()
                .chain(config.levels.get(level))
                .copied()
                .collect()
        });
        let adversarial: PerLevel<Vec<ConstraintId>> = PerLevel::from_fn(|level| {
            config
                .universal
                .iter()
                .chain(
                    config
                        .levels
                        .get(level)
                        .iter()
                        .filter(|id| !config.vocabulary.contains(id)),
                )
                .chain(&config.adversarial)
                .copied()
                .collect()
        });

        for (mode, table) in [(Mode::Standard, &standard), (Mode::Adversarial, &adversarial)] {
            for (level, ids) in table.iter() {
                if let Some(id) = first_duplicate(ids) {
                    tracing::debug!(%level, %mode, %id, "duplicate in composed registry list");
                    return Err(RegistryError::Duplicate { id, level });
                }
            }
        }

        Ok(Self {
            config,
            standard,
            adversarial,
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The exact, ordered constraint list for a (level, mode).
    pub fn constraints_for(&self, level: CognitiveLevel, mode: Mode) -> &[ConstraintId] {
        match mode {
            Mode::Standard => self.standard.get(level),
            Mode::Adversarial => self.adversarial.get(level),
        }
    }

    pub fn count(&self, level: CognitiveLevel, mode: Mode) -> usize {
        self.constraints_for(level, mode).len()
    }

    pub fn is_vocabulary(&self, id: ConstraintId) -> bool {
        self.config.vocabulary.contains(&id)
    }

    /// Plain-text table of the constraints applied to one (level, mode).
    pub fn describe(&self, level: CognitiveLevel, mode: Mode) -> String {
        let ids = self.constraints_for(level, mode);
        let mut out = format!(
            "{level} / {mode}: {} constraints (registry {})\n",
            ids.len(),
            self.version()
        );
        let _ = writeln!(out, "{:<4} {:<12} {:<24} DESCRIPTION", "ID", "TIER", "NAME");
        for id in ids {
            let _ = writeln!(
                out,
                "{:<4} {:<12} {:<24} {}",
                id.as_str(),
                id.tier().to_string(),
                id.name(),
                id.description()
            );
        }
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn check_table(config: &RegistryConfig) -> Result<(), RegistryError> {
    if config.version.trim().is_empty() {
        return Err(RegistryError::MissingVersion);
    }
    if let Some(id) = config.universal.iter().find(|id| id.is_adversarial()) {
        return Err(RegistryError::MisplacedAdversarial(*id));
    }
    for (level, ids) in config.levels.iter() {
        if ids.is_empty() {
            return Err(RegistryError::EmptyLevel(level));
        }
        if let Some(id) = ids.iter().find(|id| id.is_adversarial()) {
            return Err(RegistryError::MisplacedAdversarial(*id));
        }
    }
    if let Some(id) = config
        .vocabulary
        .iter()
        .find(|id| id.is_adversarial() || config.universal.contains(id))
    {
        return Err(RegistryError::InvalidVocabulary(*id));
    }
    Ok(())
}

fn first_duplicate(ids: &[ConstraintId]) -> Option<ConstraintId> {
    ids.iter()
        .enumerate()
        .find(|(i, id)| ids[..*i].contains(id))
        .map(|(_, id)| *id)
}
