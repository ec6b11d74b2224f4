//! Verification of an exported chain file.

use anyhow::{Context, Result};
use credguard_evidence::{ChainExport, ChainVerifier};
use serde::Serialize;
use std::path::Path;

/// What was checked and what failed.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub public_key: String,
    pub entry_count: usize,
    pub entries_checked: usize,
    pub valid: bool,
    /// Only signatures were checked, not links.
    pub signatures_only: bool,
    pub errors: Vec<String>,
}

impl VerifyReport {
    pub fn render(&self) -> String {
        let mut out = format!(
            "public key:      {}\nentries:         {}\nchecked:         {}\nmode:            {}\nresult:          {}\n",
            self.public_key,
            self.entry_count,
            self.entries_checked,
            if self.signatures_only { "signatures" } else { "full chain" },
            if self.valid { "VALID" } else { "INVALID" },
        );
        for error in &self.errors {
            out.push_str(&format!("  - {}\n", error));
        }
        out
    }
}

pub fn load_export(path: &Path) -> Result<ChainExport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading export {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing export {}", path.display()))
}

/// Verify `export` against `public_key`, or the key it carries.
///
/// A filtered export is not a contiguous chain; `signatures_only` checks each
/// entry on its own for that case.
pub fn verify(
    export: &ChainExport,
    public_key: Option<&str>,
    signatures_only: bool,
) -> Result<VerifyReport> {
    let public_key = public_key.unwrap_or(&export.public_key).trim().to_string();
    let verifier = ChainVerifier::from_public_key_hex(&public_key)
        .with_context(|| format!("loading public key {}", public_key))?;

    let (entries_checked, errors) = if signatures_only {
        let errors = export
            .entries
            .iter()
            .filter(|entry| !verifier.verify(entry))
            .map(|entry| format!("{}: signature verification failed", entry.id))
            .collect::<Vec<_>>();
        (export.entries.len(), errors)
    } else {
        let report = verifier.verify_export(export);
        (report.entries_checked, report.errors)
    };

    tracing::debug!(
        entries = export.entries.len(),
        errors = errors.len(),
        signatures_only,
        "Export verified"
    );

    Ok(VerifyReport {
        public_key,
        entry_count: export.entry_count,
        entries_checked,
        valid: errors.is_empty(),
        signatures_only,
        errors,
    })
}
