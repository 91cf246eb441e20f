//! The per-file pipeline: stability -> extraction -> classification -> naming ->
//! destination -> move.

use super::classifier::{classify, extension_of, ClassificationInput};
use super::extractor;
use super::naming::{NamingContext, NamingOptions, NamingPolicy};
use super::path_lock::PathLocks;
use super::relocation::{self, RelocationError};
use super::stability::{Stability, StabilityDetector};
use super::stats::SortStats;
use crate::config::AppConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Relocated {
        source: PathBuf,
        destination: PathBuf,
        folder: String,
    },
    /// The file never settled within the attempt budget; left in place
    Unstable,
    /// The file disappeared before it could be moved
    Vanished,
    Failed {
        reason: String,
    },
}

/// Resolutions tried when the chosen destination is taken before the move
const MAX_PLACEMENT_ATTEMPTS: u32 = 8;

/// Runs files through the sorting stages
pub struct Pipeline {
    naming: NamingPolicy,
    stats: Arc<SortStats>,
    /// Destination folder locks, held from resolution until the move is done
    placement: PathLocks,
}

impl Pipeline {
    pub fn new(naming: NamingPolicy, stats: Arc<SortStats>) -> Self {
        Self {
            naming,
            stats,
            placement: PathLocks::new(),
        }
    }

    pub fn stats(&self) -> &Arc<SortStats> {
        &self.stats
    }

    /// Process one file against a configuration snapshot. Never panics on I/O
    /// problems; every failure is reported in the outcome.
    pub async fn process(&self, path: &Path, config: &AppConfig) -> ProcessOutcome {
        let outcome = self.run(path, config).await;

        match &outcome {
            ProcessOutcome::Relocated { destination, folder, .. } => {
                self.stats.record_sorted();
                tracing::info!(
                    source = %path.display(),
                    destination = %destination.display(),
                    folder = %folder,
                    "Sorted file"
                );
            }
            ProcessOutcome::Failed { reason } => {
                self.stats.record_failed();
                tracing::warn!(source = %path.display(), reason = %reason, "Failed to sort file");
            }
            ProcessOutcome::Unstable => {
                self.stats.record_skipped();
                tracing::info!(source = %path.display(), "File never settled, leaving it in place");
            }
            ProcessOutcome::Vanished => {
                self.stats.record_skipped();
                tracing::debug!(source = %path.display(), "File vanished before sorting");
            }
        }
        outcome
    }

    async fn run(&self, path: &Path, config: &AppConfig) -> ProcessOutcome {
        let detector = StabilityDetector::new(config.poll_interval(), config.stability_max_attempts);
        match detector.wait(path).await {
            Stability::Stable(_) => {}
            Stability::Vanished => return ProcessOutcome::Vanished,
            Stability::Unsettled => return ProcessOutcome::Unstable,
        }

        let extension = extension_of(path);
        let text = if config.deep_scan {
            extractor::extract(path, &extension, config.max_text_bytes)
                .await
                .into_string()
        } else {
            String::new()
        };

        let rules = config.rule_set();
        let input = ClassificationInput::new(path, text, &rules);
        let classification = classify(&input);

        let context = NamingContext {
            original_name: classification.candidate_name.clone(),
            extracted_text: input.extracted_text,
            rule_matched: classification.matched.clone(),
        };
        let name = self.naming.derive(&context, NamingOptions::from(config)).await;

        let folder = classification.destination_folder;
        let _placement = self.placement.acquire(&config.target_dir.join(folder.trim())).await;

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let destination = match relocation::resolve(&config.target_dir, &folder, &name) {
                Ok(destination) => destination,
                Err(e) => return failure(e),
            };

            match relocation::relocate_async(path, &destination).await {
                Ok(outcome) if outcome.source_removed => {
                    return ProcessOutcome::Relocated {
                        source: path.to_path_buf(),
                        destination: outcome.final_path,
                        folder,
                    }
                }
                Ok(outcome) => {
                    return ProcessOutcome::Failed {
                        reason: format!(
                            "copied to {} but the source could not be removed",
                            outcome.final_path.display()
                        ),
                    }
                }
                Err(RelocationError::DestinationTaken(taken)) => {
                    tracing::debug!(destination = %taken.display(), "Destination taken, resolving again");
                }
                Err(e) => return failure(e),
            }
        }

        ProcessOutcome::Failed {
            reason: format!("no free destination for {} in {}", name, folder),
        }
    }
}

fn failure(e: RelocationError) -> ProcessOutcome {
    match e {
        RelocationError::SourceVanished(_) => ProcessOutcome::Vanished,
        other => ProcessOutcome::Failed {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtensionRule, SemanticRule};
    use std::fs;
    use tempfile::tempdir;

    fn test_config(target: &Path) -> AppConfig {
        AppConfig {
            target_dir: target.to_path_buf(),
            watch_dirs: vec![],
            stability_poll_ms: 5,
            stability_max_attempts: 5,
            financial_date_stamp: false,
            semantic_rules: vec![SemanticRule {
                keyword: "invoice".into(),
                folder: "Financial/Invoices".into(),
            }],
            extension_rules: vec![ExtensionRule {
                folder: "Images".into(),
                extensions: vec![".png".into(), ".jpg".into()],
            }],
            ..AppConfig::default()
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(NamingPolicy::default(), Arc::new(SortStats::new()))
    }

    #[tokio::test]
    async fn test_semantic_match_from_text() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("scan_0042.txt");
        fs::write(&source, "Invoice #42\nAmount due: 10 EUR").unwrap();

        let pipeline = pipeline();
        let outcome = pipeline.process(&source, &test_config(vault.path())).await;

        let expected = vault.path().join("Financial/Invoices/scan_0042.txt");
        assert_eq!(
            outcome,
            ProcessOutcome::Relocated {
                source: source.clone(),
                destination: expected.clone(),
                folder: "Financial/Invoices".into(),
            }
        );
        assert!(expected.exists());
        assert!(!source.exists());
        assert_eq!(pipeline.stats().snapshot().files_sorted, 1);
    }

    #[tokio::test]
    async fn test_invoice_pdf_matches_by_name() {
        // Not a real PDF: extraction yields nothing and the name decides
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("invoice_march.pdf");
        fs::write(&source, b"%PDF-garbage").unwrap();

        let outcome = pipeline().process(&source, &test_config(vault.path())).await;

        assert!(matches!(outcome, ProcessOutcome::Relocated { .. }));
        assert!(vault.path().join("Financial/Invoices/invoice_march.pdf").exists());
    }

    #[tokio::test]
    async fn test_financial_date_stamp_applied() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("invoice_march.pdf");
        fs::write(&source, b"%PDF-garbage").unwrap();

        let mut config = test_config(vault.path());
        config.financial_date_stamp = true;
        let outcome = pipeline().process(&source, &config).await;

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        let expected = vault
            .path()
            .join("Financial/Invoices")
            .join(format!("Invoice_{}_invoice_march.pdf", today));
        assert!(matches!(outcome, ProcessOutcome::Relocated { destination, .. } if destination == expected));
    }

    #[tokio::test]
    async fn test_extension_rule() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("photo.png");
        fs::write(&source, [0x89u8, b'P', b'N', b'G']).unwrap();

        pipeline().process(&source, &test_config(vault.path())).await;
        assert!(vault.path().join("Images/photo.png").exists());
    }

    #[tokio::test]
    async fn test_collision_gets_suffix() {
        let inbox_a = tempdir().unwrap();
        let inbox_b = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let first = inbox_a.path().join("notes.txt");
        let second = inbox_b.path().join("notes.txt");
        fs::write(&first, "first").unwrap();
        fs::write(&second, "second").unwrap();

        let pipeline = pipeline();
        let config = test_config(vault.path());
        pipeline.process(&first, &config).await;
        pipeline.process(&second, &config).await;

        let others = vault.path().join("Others");
        assert_eq!(fs::read_to_string(others.join("notes.txt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(others.join("notes_1.txt")).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_concurrent_same_name_files_are_both_kept() {
        let vault = tempdir().unwrap();
        let pipeline = pipeline();
        let config = test_config(vault.path());

        for round in 0..10 {
            let inbox_a = tempdir().unwrap();
            let inbox_b = tempdir().unwrap();
            let first = inbox_a.path().join("notes.txt");
            let second = inbox_b.path().join("notes.txt");
            fs::write(&first, format!("a{}", round)).unwrap();
            fs::write(&second, format!("b{}", round)).unwrap();

            let (x, y) = tokio::join!(pipeline.process(&first, &config), pipeline.process(&second, &config));
            assert!(matches!(x, ProcessOutcome::Relocated { .. }));
            assert!(matches!(y, ProcessOutcome::Relocated { .. }));
        }

        let mut contents: Vec<String> = fs::read_dir(vault.path().join("Others"))
            .unwrap()
            .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        contents.sort();
        let mut expected: Vec<String> = (0..10).flat_map(|r| [format!("a{}", r), format!("b{}", r)]).collect();
        expected.sort();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_pdf_content_decides_folder() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("scan.pdf");
        fs::write(&source, extractor::fixtures::pdf(&["Invoice 2024-03-01 total due 10 EUR"])).unwrap();

        let outcome = pipeline().process(&source, &test_config(vault.path())).await;

        assert!(matches!(outcome, ProcessOutcome::Relocated { ref folder, .. } if folder == "Financial/Invoices"));
        assert!(vault.path().join("Financial/Invoices/scan.pdf").exists());
    }

    #[tokio::test]
    async fn test_docx_content_decides_folder() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("letter.docx");
        fs::write(&source, extractor::fixtures::docx(&["Dear customer", "Your invoice is attached"])).unwrap();

        pipeline().process(&source, &test_config(vault.path())).await;

        assert!(vault.path().join("Financial/Invoices/letter.docx").exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_never_moved() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("empty.txt");
        fs::write(&source, "").unwrap();

        let pipeline = pipeline();
        let outcome = pipeline.process(&source, &test_config(vault.path())).await;

        assert_eq!(outcome, ProcessOutcome::Unstable);
        assert!(source.exists());
        assert!(!vault.path().join("Others").exists());
        assert_eq!(pipeline.stats().snapshot().files_skipped, 1);
    }

    #[tokio::test]
    async fn test_missing_file_vanishes() {
        let vault = tempdir().unwrap();
        let outcome = pipeline()
            .process(&vault.path().join("ghost.txt"), &test_config(vault.path()))
            .await;
        assert_eq!(outcome, ProcessOutcome::Vanished);
    }

    #[tokio::test]
    async fn test_deep_scan_off_ignores_content() {
        let inbox = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let source = inbox.path().join("scan.txt");
        fs::write(&source, "invoice").unwrap();

        let mut config = test_config(vault.path());
        config.deep_scan = false;
        pipeline().process(&source, &config).await;

        assert!(vault.path().join("Others/scan.txt").exists());
    }
}
