use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::assembler::MetadataAssembler;
use crate::domain::{LigandId, XtalStatus};
use crate::error::CollateError;
use crate::extract::StructureTools;
use crate::fs_util;
use crate::metadata::{
    ALIGNED_FILES_DIR, ALIGNED_METADATA_FILENAME, ALL_XTALS_FILENAME, CrystalMap, InputMetadata,
    METADATA_FILENAME,
};
use crate::report::StageReport;
use crate::state::{AlignmentStore, XtalForm};
use crate::version::VersionResolver;

pub const DEFAULT_XTALFORMS_FILENAME: &str = "xtalforms.json";
pub const DEFAULT_ASSEMBLIES_FILENAME: &str = "assemblies.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub tag: String,
    pub status: XtalStatus,
    pub structure: Utf8PathBuf,
    pub reflections: Option<Utf8PathBuf>,
    pub ligand_description: Option<Utf8PathBuf>,
    pub events: BTreeMap<LigandId, Utf8PathBuf>,
    pub reference: bool,
}

pub trait AlignmentUpdater {
    fn update(
        &self,
        store: &mut AlignmentStore,
        datasets: &BTreeMap<String, Dataset>,
    ) -> Result<(), CollateError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOnlyUpdater;

impl AlignmentUpdater for LinkOnlyUpdater {
    fn update(
        &self,
        _store: &mut AlignmentStore,
        _datasets: &BTreeMap<String, Dataset>,
    ) -> Result<(), CollateError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AlignerOptions {
    pub version_dir: Utf8PathBuf,
    pub metadata_file: Option<String>,
    pub xtalforms: Option<Utf8PathBuf>,
    pub assemblies: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignmentSummary {
    pub version: u32,
    pub datasets: usize,
    pub candidates: usize,
    pub linked: usize,
    pub invalidated: usize,
    pub reused: usize,
    pub recompute: usize,
    pub aligned: usize,
    pub extraction_errors: usize,
    pub output: Utf8PathBuf,
    pub report: StageReport,
}

pub struct Aligner {
    version_dir: Utf8PathBuf,
    metadata_file: Utf8PathBuf,
    xtalforms_file: Utf8PathBuf,
    assemblies_file: Utf8PathBuf,
}

impl Aligner {
    pub fn new(options: AlignerOptions) -> Self {
        let version_dir = options.version_dir;
        let output_root = version_dir
            .parent()
            .map(Utf8Path::to_owned)
            .unwrap_or_default();
        let metadata_file =
            version_dir.join(options.metadata_file.as_deref().unwrap_or(METADATA_FILENAME));
        let xtalforms_file = options
            .xtalforms
            .unwrap_or_else(|| output_root.join(DEFAULT_XTALFORMS_FILENAME));
        let assemblies_file = options
            .assemblies
            .unwrap_or_else(|| output_root.join(DEFAULT_ASSEMBLIES_FILENAME));
        Self {
            version_dir,
            metadata_file,
            xtalforms_file,
            assemblies_file,
        }
    }

    pub fn version_dir(&self) -> &Utf8Path {
        &self.version_dir
    }

    pub fn validate(&self) -> StageReport {
        let mut report = StageReport::new();
        let dir = self.version_dir.as_std_path();
        if !dir.exists() {
            report.error(format!("version dir {} does not exist", self.version_dir));
        } else if !dir.is_dir() {
            report.error(format!("version dir {} is not a directory", self.version_dir));
        } else if VersionResolver::parse_version(&self.version_dir).is_none() {
            report.error(format!("{} is not named upload_<N>", self.version_dir));
        }
        if !self.metadata_file.as_std_path().is_file() {
            report.error(format!("metadata file {} does not exist", self.metadata_file));
        }
        if !self.xtalforms_file.as_std_path().is_file() {
            report.error(format!("crystal forms file {} does not exist", self.xtalforms_file));
        }
        if !self.assemblies_file.as_std_path().is_file() {
            report.warn(format!(
                "assemblies file {} does not exist, keeping the stored assemblies",
                self.assemblies_file
            ));
        }
        report
    }

    pub fn run<U: AlignmentUpdater, T: StructureTools>(
        &self,
        updater: &U,
        tools: &T,
    ) -> Result<AlignmentSummary, CollateError> {
        let mut report = StageReport::new();

        let collated: InputMetadata = fs_util::read_json(&self.metadata_file)?.ok_or_else(|| {
            CollateError::Filesystem(format!("metadata file {} not found", self.metadata_file))
        })?;
        let mut known: CrystalMap =
            fs_util::read_json(&self.version_dir.join(ALL_XTALS_FILENAME))?.unwrap_or_default();
        known.extend(collated.crystals.clone());

        let previous = VersionResolver::previous_dir(&self.version_dir);
        let mut store = AlignmentStore::load(&self.version_dir, previous.as_deref())?;
        self.overlay_operator_files(&mut store)?;

        let datasets = build_datasets(&known, &mut report);
        let candidates: BTreeSet<String> = collated
            .crystals
            .iter()
            .filter(|(tag, record)| {
                record.status.is_some_and(XtalStatus::needs_alignment) && datasets.contains_key(*tag)
            })
            .map(|(tag, _)| tag.clone())
            .collect();
        info!(
            "{} datasets known, {} are new or updated",
            datasets.len(),
            candidates.len()
        );

        let link = store.link_previous(candidates.clone());
        let (reused, recompute) = store.partition(datasets.keys().map(String::as_str));
        info!(
            "{} datasets reuse an earlier alignment, {} need one",
            reused.len(),
            recompute.len()
        );
        let (reused, recompute) = (reused.len(), recompute.len());
        fs_util::ensure_dir(&self.version_dir.join(ALIGNED_FILES_DIR))?;

        updater.update(&mut store, &datasets)?;
        let mut aligned = 0;
        for tag in &candidates {
            match store.state().alignment(tag) {
                Some(alignment) if alignment.version == store.version() => aligned += 1,
                _ => report.warn(format!("no alignment backend produced output for {tag}")),
            }
        }

        store.persist()?;

        let outcome = MetadataAssembler::new(&store, tools, &known).assemble(collated)?;
        report.merge(outcome.report);
        let output = self.version_dir.join(ALIGNED_METADATA_FILENAME);
        fs_util::write_json_atomic(&output, &outcome.document)?;
        info!("wrote {output}");

        Ok(AlignmentSummary {
            version: store.version(),
            datasets: datasets.len(),
            candidates: candidates.len(),
            linked: link.linked.len(),
            invalidated: link.invalidated.len(),
            reused,
            recompute,
            aligned,
            extraction_errors: outcome.extraction_errors,
            output,
            report,
        })
    }

    fn overlay_operator_files(&self, store: &mut AlignmentStore) -> Result<(), CollateError> {
        if let Some(xtalforms) =
            fs_util::read_json::<BTreeMap<String, XtalForm>>(&self.xtalforms_file)?
        {
            info!("using {} crystal forms from {}", xtalforms.len(), self.xtalforms_file);
            store.state_mut().xtalforms.extend(xtalforms);
        }
        if let Some(assemblies) = fs_util::read_json::<BTreeMap<String, Value>>(&self.assemblies_file)? {
            info!("using {} assemblies from {}", assemblies.len(), self.assemblies_file);
            store.state_mut().assemblies.extend(assemblies);
        }
        Ok(())
    }
}

fn build_datasets(known: &CrystalMap, report: &mut StageReport) -> BTreeMap<String, Dataset> {
    let mut datasets = BTreeMap::new();
    for (tag, record) in known {
        let status = record.status.unwrap_or(XtalStatus::Unchanged);
        if status == XtalStatus::Deprecated {
            continue;
        }
        let files = &record.crystallographic_files;
        let Some(structure) = files.xtal_pdb.as_ref() else {
            report.warn(format!("crystal {tag} has no structure file, not aligned"));
            continue;
        };
        let events = files
            .ligand_binding_events
            .iter()
            .map(|event| {
                (
                    LigandId::new(tag, &event.chain, &event.residue),
                    event.file.path().clone(),
                )
            })
            .collect();
        datasets.insert(
            tag.clone(),
            Dataset {
                tag: tag.clone(),
                status,
                structure: structure.path().clone(),
                reflections: files.xtal_mtz.as_ref().map(|file| file.path().clone()),
                ligand_description: files.ligand_cif.as_ref().map(|file| file.path().clone()),
                events,
                reference: record.is_reference(),
            },
        );
    }
    datasets
}
