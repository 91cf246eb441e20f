//! Rule-based destination classifier. First match wins; there is no scoring.

use crate::config::{RuleSet, FALLBACK_FOLDER};
use std::path::{Path, PathBuf};

/// Everything the classifier looks at for one file
#[derive(Debug, Clone)]
pub struct ClassificationInput<'a> {
    pub path: PathBuf,
    pub file_name: String,
    /// Lower-case, with leading dot; empty when the file has none
    pub extension: String,
    pub extracted_text: String,
    pub rules: &'a RuleSet,
}

impl<'a> ClassificationInput<'a> {
    pub fn new(path: &Path, extracted_text: String, rules: &'a RuleSet) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: file_name_of(path),
            extension: extension_of(path),
            extracted_text,
            rules,
        }
    }
}

/// Which rule decided the folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    Semantic { keyword: String, folder: String },
    Extension { folder: String },
    Fallback,
}

impl RuleMatch {
    /// Semantic match into a folder whose name mentions "financial"
    pub fn is_financial(&self) -> bool {
        match self {
            RuleMatch::Semantic { folder, .. } => folder.to_lowercase().contains("financial"),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub destination_folder: String,
    /// Always the original file name; renaming happens in the naming policy
    pub candidate_name: String,
    pub matched: RuleMatch,
}

/// Decide the destination folder for a file
pub fn classify(input: &ClassificationInput<'_>) -> ClassificationResult {
    let text = input.extracted_text.to_lowercase();
    let name = input.file_name.to_lowercase();

    let matched = input
        .rules
        .semantic_rules
        .iter()
        .find(|rule| {
            let keyword = rule.keyword.to_lowercase();
            !keyword.is_empty() && (text.contains(&keyword) || name.contains(&keyword))
        })
        .map(|rule| RuleMatch::Semantic {
            keyword: rule.keyword.clone(),
            folder: rule.folder.clone(),
        })
        .or_else(|| {
            let ext = input.extension.to_lowercase();
            input
                .rules
                .extension_rules
                .iter()
                .find(|rule| rule.matches(&ext))
                .map(|rule| RuleMatch::Extension {
                    folder: rule.folder.clone(),
                })
        })
        .unwrap_or(RuleMatch::Fallback);

    let destination_folder = match &matched {
        RuleMatch::Semantic { folder, .. } | RuleMatch::Extension { folder } if !folder.is_empty() => {
            folder.clone()
        }
        _ => FALLBACK_FOLDER.to_string(),
    };

    ClassificationResult {
        destination_folder,
        candidate_name: input.file_name.clone(),
        matched,
    }
}

/// Final path component as a string
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Lower-case extension with leading dot, or "" if none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
