use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::HistoryId;

/// Preview length used by [`ConversionHistoryEntry::preview`].
pub const PREVIEW_CHARS: usize = 100;

//
// ─── OPTIONS ──────────────────────────────────────────────────────────────────
//

/// Toggles sent along with every conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionOptions {
    pub preserve_comments: bool,
    pub include_type_hints: bool,
    pub optimize_for_readability: bool,
    pub handle_exceptions: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            preserve_comments: true,
            include_type_hints: true,
            optimize_for_readability: true,
            handle_exceptions: true,
        }
    }
}

/// Partial options update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsPatch {
    pub preserve_comments: Option<bool>,
    pub include_type_hints: Option<bool>,
    pub optimize_for_readability: Option<bool>,
    pub handle_exceptions: Option<bool>,
}

impl ConversionOptions {
    /// Shallow merge of a patch.
    #[must_use]
    pub fn merged(self, patch: OptionsPatch) -> Self {
        Self {
            preserve_comments: patch.preserve_comments.unwrap_or(self.preserve_comments),
            include_type_hints: patch.include_type_hints.unwrap_or(self.include_type_hints),
            optimize_for_readability: patch
                .optimize_for_readability
                .unwrap_or(self.optimize_for_readability),
            handle_exceptions: patch.handle_exceptions.unwrap_or(self.handle_exceptions),
        }
    }
}

//
// ─── TAGS ─────────────────────────────────────────────────────────────────────
//

/// Keyword-presence flags derived from a conversion's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionTag {
    Class,
    Interface,
    Inheritance,
    AccessModifiers,
    Static,
    Final,
    Exception,
    Loop,
    Condition,
}

const TAG_KEYWORDS: &[(ConversionTag, &[&str])] = &[
    (ConversionTag::Class, &["class"]),
    (ConversionTag::Interface, &["interface", "implements"]),
    (ConversionTag::Inheritance, &["extends"]),
    (
        ConversionTag::AccessModifiers,
        &["public", "private", "protected"],
    ),
    (ConversionTag::Static, &["static"]),
    (ConversionTag::Final, &["final"]),
    (ConversionTag::Exception, &["try", "catch", "throw"]),
    (ConversionTag::Loop, &["for", "while"]),
    (ConversionTag::Condition, &["if", "else", "switch"]),
];

/// Scan source text for keyword presence. This is a substring scan, not a
/// tokenizer, so `format` counts as a loop keyword.
#[must_use]
pub fn extract_tags(source: &str) -> BTreeSet<ConversionTag> {
    TAG_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| source.contains(kw)))
        .map(|(tag, _)| *tag)
        .collect()
}

//
// ─── HISTORY ──────────────────────────────────────────────────────────────────
//

/// Where a conversion's output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    #[default]
    Server,
    LocalApproximation,
}

/// One attempted conversion and its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionHistoryEntry {
    pub id: HistoryId,
    #[serde(alias = "javaCode")]
    pub source: String,
    #[serde(alias = "pythonCode")]
    pub target: String,
    /// Wall-clock milliseconds measured around the conversion call.
    #[serde(alias = "conversionTime")]
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<ConversionTag>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl ConversionHistoryEntry {
    #[must_use]
    pub fn new(
        source: String,
        target: String,
        duration_ms: u64,
        created_at: DateTime<Utc>,
        provenance: Provenance,
    ) -> Self {
        let tags = extract_tags(&source);
        Self {
            id: HistoryId::generate(),
            source,
            target,
            duration_ms,
            created_at,
            tags,
            provenance,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.target.is_empty()
    }

    /// Truncated copy for list views.
    #[must_use]
    pub fn preview(&self) -> RecentConversion {
        RecentConversion {
            id: self.id.clone(),
            source: truncate(&self.source, PREVIEW_CHARS),
            target: truncate(&self.target, PREVIEW_CHARS),
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }
}

/// Preview row produced for "recent conversions" lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentConversion {
    pub id: HistoryId,
    pub source: String,
    pub target: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate figures over the whole history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub total_conversions: usize,
    pub successful_conversions: usize,
    pub success_rate: f64,
    pub average_ms: f64,
}

impl ConversionStats {
    #[must_use]
    pub fn from_history(history: &[ConversionHistoryEntry]) -> Self {
        let total = history.len();
        let successful = history.iter().filter(|e| e.succeeded()).count();
        if total == 0 {
            return Self {
                total_conversions: 0,
                successful_conversions: 0,
                success_rate: 0.0,
                average_ms: 0.0,
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let (total_f, successful_f, sum_ms) = (
            total as f64,
            successful as f64,
            history.iter().map(|e| e.duration_ms as f64).sum::<f64>(),
        );
        Self {
            total_conversions: total,
            successful_conversions: successful,
            success_rate: successful_f / total_f * 100.0,
            average_ms: (sum_ms / total_f * 100.0).round() / 100.0,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
