use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ResolvedConfig;
use crate::domain::{TIMESTAMP_FORMAT, XtalFileKind, parse_timestamp};
use crate::error::CollateError;
use crate::metadata::{BindingEvent, CrystalFiles, CrystalRecord, FileRef, InputMetadata};
use crate::report::StageReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrystalRow {
    pub crystal_name: String,
    #[serde(default)]
    pub pdb: Option<Utf8PathBuf>,
    #[serde(default)]
    pub mtz: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cif: Option<Utf8PathBuf>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub refinement_outcome: Option<String>,
    #[serde(default)]
    pub binding_events: Vec<RowBindingEvent>,
}

impl CrystalRow {
    fn file(&self, kind: XtalFileKind) -> Option<&Utf8PathBuf> {
        match kind {
            XtalFileKind::Structure => self.pdb.as_ref(),
            XtalFileKind::Reflections => self.mtz.as_ref(),
            XtalFileKind::LigandDescription => self.cif.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBindingEvent {
    pub chain: String,
    pub residue: String,
    pub file: Utf8PathBuf,
}

pub trait CrystalReader {
    fn read_rows(&self, manifest: &Utf8Path) -> Result<Vec<CrystalRow>, CollateError>;
}

/// Reads a JSON array of [`CrystalRow`] exported from the tracking database.
/// Only rows whose refinement reached outcome 4, 5 or 6 are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestReader;

impl CrystalReader for ManifestReader {
    fn read_rows(&self, manifest: &Utf8Path) -> Result<Vec<CrystalRow>, CollateError> {
        let content = fs::read_to_string(manifest.as_std_path())
            .map_err(|err| CollateError::Filesystem(format!("read {manifest}: {err}")))?;
        let rows: Vec<CrystalRow> =
            serde_json::from_str(&content).map_err(|err| CollateError::MetadataParse {
                path: manifest.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.refinement_outcome
                    .as_deref()
                    .is_some_and(|outcome| outcome.starts_with(['4', '5', '6']))
            })
            .collect())
    }
}

pub fn xtal_dir(input_dir: &Utf8Path, crystal_name: &str) -> Utf8PathBuf {
    input_dir
        .join("processing")
        .join("analysis")
        .join("model_building")
        .join(crystal_name)
}

pub fn resolve_input_path(path: &Utf8Path, xtal_dir: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        xtal_dir.join(path)
    }
}

pub struct Validator<'a, R: CrystalReader> {
    config: &'a ResolvedConfig,
    reader: &'a R,
}

impl<'a, R: CrystalReader> Validator<'a, R> {
    pub fn new(config: &'a ResolvedConfig, reader: &'a R) -> Self {
        Self { config, reader }
    }

    pub fn validate_all(&self) -> (Option<InputMetadata>, StageReport) {
        let mut report = self.validate_paths();
        if report.has_errors() {
            report.error(format!(
                "path validation failed with {} errors",
                report.errors.len()
            ));
            return (None, report);
        }
        match self.validate_metadata() {
            Ok((meta, metadata_report)) => {
                report.merge(metadata_report);
                (Some(meta), report)
            }
            Err(err) => {
                report.error(err.to_string());
                (None, report)
            }
        }
    }

    pub fn validate_paths(&self) -> StageReport {
        let mut report = StageReport::new();
        for input in &self.config.inputs {
            let dir = self.config.expand(&input.dir);
            if !dir.as_std_path().exists() {
                report.error(format!("input dir does not exist: {dir}"));
            } else if !dir.as_std_path().is_dir() {
                report.error(format!("input dir is not a directory: {dir}"));
            } else {
                let manifest = self.config.expand(&input.manifest);
                if !manifest.as_std_path().is_file() {
                    report.error(format!("crystal manifest not found: {manifest}"));
                }
            }
        }

        let output_dir = &self.config.output_dir;
        if !output_dir.as_std_path().exists() {
            report.error(format!("output dir does not exist: {output_dir}"));
        } else if !output_dir.as_std_path().is_dir() {
            report.error(format!("output dir is not a directory: {output_dir}"));
        }

        info!(
            "path validation encountered {} errors and {} warnings",
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    pub fn validate_metadata(&self) -> Result<(InputMetadata, StageReport), CollateError> {
        let mut report = StageReport::new();
        let mut meta = InputMetadata {
            run_on: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            input_dirs: self.config.inputs.iter().map(|input| input.dir.clone()).collect(),
            output_dir: self.config.output_dir.clone(),
            crystals: Default::default(),
        };

        for input in &self.config.inputs {
            let manifest = self.config.expand(&input.manifest);
            info!("opening crystal manifest {manifest}");
            let rows = self.reader.read_rows(&manifest)?;
            let mut processed = 0;
            for (index, row) in rows.iter().enumerate() {
                let name = row.crystal_name.trim();
                if name.is_empty() {
                    report.error(format!("crystal name not defined, cannot process row {}", index + 1));
                    continue;
                }
                if name.contains(['/', '\\']) || name == "." || name == ".." {
                    report.error(CollateError::InvalidTag(name.to_string()).to_string());
                    continue;
                }
                debug!("processing crystal {} {name}", index + 1);
                if let Some(record) = self.validate_row(&input.dir, name, row, &mut report) {
                    processed += 1;
                    if meta.crystals.insert(name.to_string(), record).is_some() {
                        report.warn(format!(
                            "crystal {name} already exists, its data will be overridden"
                        ));
                    }
                }
            }
            info!(
                "validator handled {} rows from {manifest}, {processed} were valid",
                rows.len()
            );
        }

        Ok((meta, report))
    }

    fn validate_row(
        &self,
        input_dir: &Utf8Path,
        name: &str,
        row: &CrystalRow,
        report: &mut StageReport,
    ) -> Option<CrystalRecord> {
        let xtal_dir = xtal_dir(input_dir, name);
        let mut files = CrystalFiles::default();
        let mut missing = 0;

        for kind in XtalFileKind::ALL {
            match row.file(kind) {
                Some(path) => {
                    let input_path = resolve_input_path(path, &xtal_dir);
                    if self.config.expand(&input_path).as_std_path().is_file() {
                        files.set(kind, Some(FileRef::Source(input_path)));
                    } else {
                        missing += 1;
                        report.warn(format!(
                            "file {} for {name} not found: {path}",
                            kind.field_name()
                        ));
                    }
                }
                None => report.warn(format!(
                    "entry {} for {name} not defined in the database",
                    kind.field_name()
                )),
            }
        }

        for event in &row.binding_events {
            let input_path = resolve_input_path(&event.file, &xtal_dir);
            if self.config.expand(&input_path).as_std_path().is_file() {
                files.ligand_binding_events.push(BindingEvent {
                    chain: event.chain.clone(),
                    residue: event.residue.clone(),
                    file: FileRef::Source(input_path),
                });
            } else {
                missing += 1;
                report.warn(format!("event map for {name} not found: {}", event.file));
            }
        }

        if missing > 0 {
            report.warn(format!("{missing} files for {name} missing, will not process"));
            return None;
        }

        let last_updated = row.last_updated.as_deref().map(|value| {
            parse_timestamp(value)
                .map(|parsed| parsed.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_else(|| value.to_string())
        });

        Some(CrystalRecord {
            last_updated,
            crystallographic_files: files,
            ..CrystalRecord::default()
        })
    }
}
