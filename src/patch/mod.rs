//! Idempotent text patching of installed dependency sources.
//!
//! A [`PatchRule`] pairs a legacy fragment with its corrected form. Rules are
//! applied in order against the file contents; every branch except a failed
//! write is a warning, so a dependency that drifted upstream never breaks the
//! surrounding install.

pub mod rules;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchRule {
    pub name: String,
    pub legacy: String,
    pub fixed: String,
}

impl PatchRule {
    pub fn new(name: &str, legacy: &str, fixed: &str) -> Self {
        Self {
            name: name.to_string(),
            legacy: legacy.to_string(),
            fixed: fixed.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied { occurrences: usize },
    AlreadyApplied,
    PatternNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    FileMissing,
    Unreadable,
    PatternNotFound,
    AlreadyPatched,
    Patched,
}

#[derive(Debug, Clone)]
pub struct PatchReport {
    pub target: PathBuf,
    pub status: PatchStatus,
    pub rules: Vec<(String, RuleOutcome)>,
}

impl PatchReport {
    pub fn changed(&self) -> bool {
        self.status == PatchStatus::Patched
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            PatchStatus::FileMissing => write!(f, "File not found: {}", self.target.display()),
            PatchStatus::Unreadable => write!(f, "Could not read: {}", self.target.display()),
            PatchStatus::PatternNotFound => write!(f, "Pattern not found. No changes applied."),
            PatchStatus::AlreadyPatched => write!(f, "Already patched."),
            PatchStatus::Patched => {
                let applied = self
                    .rules
                    .iter()
                    .filter(|(_, o)| matches!(o, RuleOutcome::Applied { .. }))
                    .count();
                write!(
                    f,
                    "Patch applied successfully ({applied}/{} rules).",
                    self.rules.len()
                )
            }
        }
    }
}

/// Apply `rules` in order to `text`. Returns the rewritten text and one
/// outcome per rule.
pub fn apply_rules(text: &str, rules: &[PatchRule]) -> (String, Vec<RuleOutcome>) {
    let mut current = text.to_string();
    let mut outcomes = Vec::with_capacity(rules.len());

    for rule in rules {
        if rule.legacy.is_empty() {
            outcomes.push(RuleOutcome::PatternNotFound);
            continue;
        }
        // A text that already holds the corrected fragment is never rewritten.
        if current.contains(&rule.fixed) {
            outcomes.push(RuleOutcome::AlreadyApplied);
            continue;
        }
        let occurrences = current.matches(rule.legacy.as_str()).count();
        if occurrences == 0 {
            outcomes.push(RuleOutcome::PatternNotFound);
            continue;
        }
        current = current.replace(rule.legacy.as_str(), &rule.fixed);
        outcomes.push(RuleOutcome::Applied { occurrences });
    }

    (current, outcomes)
}

fn overall_status(outcomes: &[RuleOutcome]) -> PatchStatus {
    if outcomes
        .iter()
        .any(|o| matches!(o, RuleOutcome::Applied { .. }))
    {
        PatchStatus::Patched
    } else if !outcomes.is_empty()
        && outcomes.iter().all(|o| *o == RuleOutcome::AlreadyApplied)
    {
        PatchStatus::AlreadyPatched
    } else {
        PatchStatus::PatternNotFound
    }
}

/// Patch `target` in place. Only a failed write is returned as an error.
pub fn patch_file(target: &Path, rules: &[PatchRule]) -> Result<PatchReport> {
    let report = |status, rules: Vec<(String, RuleOutcome)>| PatchReport {
        target: target.to_path_buf(),
        status,
        rules,
    };

    if !target.exists() {
        warn!("File not found: {}", target.display());
        return Ok(report(PatchStatus::FileMissing, Vec::new()));
    }

    let source = match std::fs::read_to_string(target) {
        Ok(source) => source,
        Err(e) => {
            warn!("Failed to read {}: {}", target.display(), e);
            return Ok(report(PatchStatus::Unreadable, Vec::new()));
        }
    };

    let (patched, outcomes) = apply_rules(&source, rules);

    let mut named = Vec::with_capacity(rules.len());
    for (rule, outcome) in rules.iter().zip(outcomes.iter().copied()) {
        match outcome {
            RuleOutcome::Applied { occurrences } => info!(
                "Rule '{}' replaced {} occurrence(s)",
                rule.name, occurrences
            ),
            RuleOutcome::AlreadyApplied => info!("Rule '{}' already applied", rule.name),
            RuleOutcome::PatternNotFound => warn!(
                "Rule '{}': expected pattern not found in {} (dependency version changed?)",
                rule.name,
                target.display()
            ),
        }
        named.push((rule.name.clone(), outcome));
    }

    let status = overall_status(&outcomes);
    if status == PatchStatus::Patched {
        std::fs::write(target, patched)
            .with_context(|| format!("Failed to write patched file: {}", target.display()))?;
    }

    Ok(report(status, named))
}
