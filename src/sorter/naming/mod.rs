//! Naming Policy
//!
//! Decides the final file name through a fallback chain:
//! 1. external renamer (optional, untrusted)
//! 2. local heuristic over extracted text
//! 3. financial date stamp
//! 4. the original name
//!
//! Every tier keeps the original extension and never yields an empty name.

pub mod heuristic;

use crate::sorter::classifier::RuleMatch;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Longest excerpt sent to an external renamer
pub const MAX_EXCERPT_CHARS: usize = 300;

/// Longest name accepted from any tier (stem, in chars)
const MAX_STEM_CHARS: usize = 120;

/// Error type for external renamers
#[derive(Debug, Error)]
pub enum RenamerError {
    #[error("renamer request failed: {0}")]
    Request(String),
    #[error("renamer rate limited")]
    RateLimited,
    #[error("renamer timed out after {0:?}")]
    Timeout(Duration),
    #[error("renamer returned an unusable name: {0:?}")]
    Unusable(String),
}

/// A service that proposes a file name from a text excerpt
#[async_trait]
pub trait ExternalRenamer: Send + Sync {
    /// Propose a new name for `original_name`. The answer is untrusted.
    async fn propose_name(&self, excerpt: &str, original_name: &str) -> Result<String, RenamerError>;
}

/// Inputs to the naming chain
#[derive(Debug, Clone)]
pub struct NamingContext {
    pub original_name: String,
    pub extracted_text: String,
    pub rule_matched: RuleMatch,
}

/// Which tier produced the name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingTier {
    External,
    Heuristic,
    DateStamp,
    Unchanged,
}

/// Enabled tiers
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingOptions {
    pub ai_renaming: bool,
    pub heuristic_renaming: bool,
    pub financial_date_stamp: bool,
}

impl From<&crate::config::AppConfig> for NamingOptions {
    fn from(config: &crate::config::AppConfig) -> Self {
        Self {
            ai_renaming: config.ai_renaming,
            heuristic_renaming: config.heuristic_renaming,
            financial_date_stamp: config.financial_date_stamp,
        }
    }
}

/// The naming fallback chain
#[derive(Clone)]
pub struct NamingPolicy {
    renamer: Option<Arc<dyn ExternalRenamer>>,
    renamer_timeout: Duration,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NamingPolicy {
    pub fn new(renamer: Option<Arc<dyn ExternalRenamer>>) -> Self {
        Self {
            renamer,
            renamer_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.renamer_timeout = timeout;
        self
    }

    /// Derive the final name. Never fails.
    pub async fn derive(&self, ctx: &NamingContext, options: NamingOptions) -> String {
        self.derive_with_tier(ctx, options).await.0
    }

    pub async fn derive_with_tier(&self, ctx: &NamingContext, options: NamingOptions) -> (String, NamingTier) {
        let ext = extension_with_dot(&ctx.original_name);

        if options.ai_renaming {
            if let Some(renamer) = &self.renamer {
                match self.ask_renamer(renamer.as_ref(), ctx, &ext).await {
                    Ok(name) => return (name, NamingTier::External),
                    Err(e) => {
                        tracing::warn!(file = %ctx.original_name, error = %e, "External renamer failed, falling back");
                    }
                }
            }
        }

        if options.heuristic_renaming {
            if let Some(name) = heuristic::heuristic_name(&ctx.extracted_text, &ext) {
                if let Some(name) = sanitize_name(&name, &ext) {
                    return (name, NamingTier::Heuristic);
                }
            }
        }

        if options.financial_date_stamp {
            if let RuleMatch::Semantic { keyword, .. } = &ctx.rule_matched {
                if ctx.rule_matched.is_financial() {
                    let today = Local::now().date_naive();
                    if let Some(name) = date_stamp(&ctx.original_name, keyword, today) {
                        return (name, NamingTier::DateStamp);
                    }
                }
            }
        }

        (ctx.original_name.clone(), NamingTier::Unchanged)
    }

    async fn ask_renamer(
        &self,
        renamer: &dyn ExternalRenamer,
        ctx: &NamingContext,
        ext: &str,
    ) -> Result<String, RenamerError> {
        let excerpt: String = ctx.extracted_text.chars().take(MAX_EXCERPT_CHARS).collect();

        let proposed = tokio::time::timeout(
            self.renamer_timeout,
            renamer.propose_name(&excerpt, &ctx.original_name),
        )
        .await
        .map_err(|_| RenamerError::Timeout(self.renamer_timeout))??;

        sanitize_name(&proposed, ext).ok_or(RenamerError::Unusable(proposed))
    }
}

/// `{Keyword}_{date}_{stem}{ext}`, or None if the name already carries that date
pub fn date_stamp(name: &str, keyword: &str, date: NaiveDate) -> Option<String> {
    let date = date.format("%Y-%m-%d").to_string();
    if name.contains(&date) {
        return None;
    }
    let ext = extension_with_dot(name);
    let stem = name.strip_suffix(&ext).unwrap_or(name);
    Some(format!("{}_{}_{}{}", title_case(keyword), date, stem, ext))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// ".pdf" for "a.pdf", "" for names without an extension (or dotfiles)
pub fn extension_with_dot(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Turn an untrusted proposal into a safe file name that ends in `ext`.
/// Returns None if nothing usable remains.
pub fn sanitize_name(proposed: &str, ext: &str) -> Option<String> {
    let line = proposed.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`');

    // Keep only the last path component of whatever came back
    let last = line.rsplit(['/', '\\']).next().unwrap_or(line);

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ':' | '*' | '?' | '<' | '>' | '|' | '"' => '_',
            other => other,
        })
        .collect();

    if !ext.is_empty() && cleaned.trim().eq_ignore_ascii_case(ext) {
        return None;
    }

    let proposed_ext = extension_with_dot(&cleaned);
    let stem = if !ext.is_empty() && proposed_ext.eq_ignore_ascii_case(ext) {
        &cleaned[..cleaned.len() - proposed_ext.len()]
    } else if !proposed_ext.is_empty() && ext.is_empty() {
        // A new extension on an extension-less file is dropped
        &cleaned[..cleaned.len() - proposed_ext.len()]
    } else {
        cleaned.as_str()
    };

    let stem: String = stem
        .trim()
        .trim_matches('.')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if stem.is_empty() {
        return None;
    }

    Some(format!("{}{}", stem, ext))
}
