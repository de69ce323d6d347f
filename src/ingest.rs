use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use tracing::{debug, info};

use crate::domain::XtalFileKind;
use crate::error::CollateError;
use crate::fs_util;
use crate::metadata::{CrystalMap, FileRef, XTAL_FILES_DIR};
use crate::report::StageReport;
use crate::version::VersionResolver;

pub struct FileIngestor<'a> {
    base_dir: Option<&'a Utf8Path>,
    output_root: &'a Utf8Path,
    version: u32,
}

impl<'a> FileIngestor<'a> {
    pub fn new(base_dir: Option<&'a Utf8Path>, output_root: &'a Utf8Path, version: u32) -> Self {
        Self {
            base_dir,
            output_root,
            version,
        }
    }

    pub fn crystal_dir(&self, tag: &str) -> Utf8PathBuf {
        let version_dir = VersionResolver::version_dir(Utf8Path::new(""), self.version);
        version_dir.join(XTAL_FILES_DIR).join(tag)
    }

    /// Replaces every file entry of `crystals` with its ingested copy. Files
    /// are copied into a staging directory that replaces this version's
    /// crystallographic tree only once every crystal succeeded.
    pub fn ingest(&self, crystals: &mut CrystalMap) -> Result<StageReport, CollateError> {
        let mut report = StageReport::new();
        let version_dir = VersionResolver::version_dir(self.output_root, self.version);
        fs_util::ensure_dir(&version_dir)?;
        let staging = Builder::new()
            .prefix(".xtal-collate-ingest")
            .tempdir_in(version_dir.as_std_path())
            .map_err(|err| CollateError::Filesystem(format!("create staging dir in {version_dir}: {err}")))?;
        let staging_root = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
            .map_err(|_| CollateError::Filesystem("staging dir is not UTF-8".to_string()))?;

        let mut copied = 0;
        for (tag, record) in crystals.iter_mut() {
            let relative_dir = self.crystal_dir(tag);
            let staged_dir = staging_root.join(tag);
            let files = &mut record.crystallographic_files;

            for kind in XtalFileKind::ALL {
                let Some(entry) = files.get(kind) else {
                    report.warn(format!("{} entry missing for {tag}", kind.field_name()));
                    continue;
                };
                let name = format!("{tag}.{}", kind.extension());
                let target = Target {
                    staged: staged_dir.join(&name),
                    recorded: relative_dir.join(&name),
                };
                let ingested = self.ingest_one(tag, entry.path(), &target, &mut report)?;
                copied += usize::from(ingested.is_some());
                files.set(kind, ingested);
            }

            let events = std::mem::take(&mut files.ligand_binding_events);
            for mut event in events {
                let name = format!("{tag}_event_{}_{}.ccp4", event.chain, event.residue);
                let source = event.file.path().clone();
                let target = Target {
                    staged: staged_dir.join(&name),
                    recorded: relative_dir.join(&name),
                };
                if let Some(ingested) = self.ingest_one(tag, &source, &target, &mut report)? {
                    copied += 1;
                    event.file = ingested;
                    files.ligand_binding_events.push(event);
                }
            }
        }

        let xtal_root = version_dir.join(XTAL_FILES_DIR);
        if xtal_root.as_std_path().exists() {
            info!("replacing old {xtal_root}");
        }
        fs_util::replace_dir(&staging_root, &xtal_root)?;
        info!("copied {copied} files for {} crystals", crystals.len());
        Ok(report)
    }

    fn ingest_one(
        &self,
        tag: &str,
        source: &Utf8Path,
        target: &Target,
        report: &mut StageReport,
    ) -> Result<Option<FileRef>, CollateError> {
        let full_source = fs_util::prepend_base(self.base_dir, source);
        if !full_source.as_std_path().is_file() {
            report.warn(format!("file {full_source} for {tag} not found, recording it as absent"));
            return Ok(None);
        }
        debug!("copying {full_source} to {}", target.recorded);
        let sha256 = fs_util::copy_file_hashed(&full_source, &target.staged).map_err(|err| {
            CollateError::Ingestion {
                tag: tag.to_string(),
                source_path: full_source.clone(),
                reason: err.to_string(),
            }
        })?;
        Ok(Some(FileRef::Ingested {
            file: target.recorded.clone(),
            sha256,
        }))
    }
}

struct Target {
    staged: Utf8PathBuf,
    recorded: Utf8PathBuf,
}
