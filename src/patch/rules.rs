use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::PatchRule;

/// Outgoing message source inside the installed `baileys` package.
pub const BAILEYS_MESSAGES_SEND: &str = "node_modules/baileys/lib/Socket/messages-send.js";

/// Newsletter media stanzas must carry the caller's extra attributes on the
/// `plaintext` node; the stock build drops them.
pub fn baileys_newsletter_media() -> Vec<PatchRule> {
    vec![PatchRule::new(
        "plaintext-extra-attrs",
        "tag: 'plaintext',\n                    attrs: {},\n                    content: bytes",
        "tag: 'plaintext',\n                    attrs: { ...extraAttrs },\n                    content: bytes",
    )]
}

/// A rule set read from TOML:
///
/// ```toml
/// target = "node_modules/pkg/lib/file.js"   # optional
///
/// [[rules]]
/// name = "fix-attrs"
/// legacy = "attrs: {}"
/// fixed = "attrs: { ...extraAttrs }"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub target: Option<PathBuf>,
    pub rules: Vec<PatchRule>,
}

impl RuleSet {
    pub fn parse(content: &str) -> Result<Self> {
        let set: RuleSet = toml::from_str(content)?;
        if set.rules.is_empty() {
            anyhow::bail!("Rule file defines no rules");
        }
        for rule in &set.rules {
            if rule.legacy.is_empty() {
                anyhow::bail!("Rule '{}' has an empty legacy fragment", rule.name);
            }
            if rule.legacy == rule.fixed {
                anyhow::bail!("Rule '{}' replaces a fragment with itself", rule.name);
            }
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse rule file: {}", path.display()))
    }
}
