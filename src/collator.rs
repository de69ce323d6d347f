use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::error::CollateError;
use crate::fs_util;
use crate::history::HistoryMerger;
use crate::ingest::FileIngestor;
use crate::metadata::{ALL_XTALS_FILENAME, InputMetadata, METADATA_FILENAME, NEW_XTALS_FILENAME};
use crate::report::StageReport;
use crate::validator::{CrystalReader, Validator};
use crate::version::VersionResolver;

#[derive(Debug, Clone, Serialize)]
pub struct CollationSummary {
    pub target_name: String,
    pub version: u32,
    pub version_dir: Utf8PathBuf,
    pub crystals: usize,
    pub total_crystals: usize,
    pub new_or_updated: usize,
    pub report: StageReport,
}

pub struct Collator<'a, R: CrystalReader> {
    config: &'a ResolvedConfig,
    reader: &'a R,
}

impl<'a, R: CrystalReader> Collator<'a, R> {
    pub fn new(config: &'a ResolvedConfig, reader: &'a R) -> Self {
        Self { config, reader }
    }

    pub fn validate(&self) -> (Option<InputMetadata>, StageReport) {
        Validator::new(self.config, self.reader).validate_all()
    }

    pub fn run(&self, mut meta: InputMetadata) -> Result<CollationSummary, CollateError> {
        let output_root = &self.config.output_dir;
        let version = VersionResolver::resolve(output_root)?;
        let mut report = StageReport::new();

        let ingestor = FileIngestor::new(self.config.base_dir.as_deref(), output_root, version.number);
        report.merge(ingestor.ingest(&mut meta.crystals)?);

        let outcome = HistoryMerger::new(&self.config.deprecations).merge(&version.history, &mut meta.crystals);
        report.merge(outcome.report);

        fs_util::write_json_atomic(&version.dir.join(METADATA_FILENAME), &meta)?;
        fs_util::write_json_atomic(&version.dir.join(ALL_XTALS_FILENAME), &outcome.all_xtals)?;
        fs_util::write_json_atomic(&version.dir.join(NEW_XTALS_FILENAME), &outcome.new_xtals)?;

        if let Some(config_path) = &self.config.config_path {
            if let Some(name) = config_path.file_name() {
                fs_util::copy_file_hashed(config_path, &version.dir.join(name))?;
            }
        }

        info!(
            "collated {} crystals into {}, {} are new or updated",
            meta.crystals.len(),
            version.dir,
            outcome.new_xtals.len()
        );

        Ok(CollationSummary {
            target_name: self.config.target_name.as_str().to_string(),
            version: version.number,
            version_dir: version.dir,
            crystals: meta.crystals.len(),
            total_crystals: outcome.all_xtals.len(),
            new_or_updated: outcome.new_xtals.len(),
            report,
        })
    }
}
