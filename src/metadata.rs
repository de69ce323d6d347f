use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{XtalFileKind, XtalStatus};

pub const METADATA_FILENAME: &str = "metadata.json";
pub const ALL_XTALS_FILENAME: &str = "all_xtals.json";
pub const NEW_XTALS_FILENAME: &str = "new_xtals.json";
pub const ALIGNED_METADATA_FILENAME: &str = "metadata_aligned.json";
pub const XTAL_FILES_DIR: &str = "crystallographic_files";
pub const ALIGNED_FILES_DIR: &str = "aligned_files";

pub type CrystalMap = BTreeMap<String, CrystalRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMetadata {
    pub run_on: String,
    #[serde(default)]
    pub input_dirs: Vec<Utf8PathBuf>,
    pub output_dir: Utf8PathBuf,
    #[serde(default)]
    pub crystals: CrystalMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrystalRecord {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub crystallographic_files: CrystalFiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<XtalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_xtalform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_files: Option<AlignedFiles>,
}

impl CrystalRecord {
    pub fn is_reference(&self) -> bool {
        self.reference.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrystalFiles {
    #[serde(default)]
    pub xtal_pdb: Option<FileRef>,
    #[serde(default)]
    pub xtal_mtz: Option<FileRef>,
    #[serde(default)]
    pub ligand_cif: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ligand_binding_events: Vec<BindingEvent>,
}

impl CrystalFiles {
    pub fn get(&self, kind: XtalFileKind) -> Option<&FileRef> {
        match kind {
            XtalFileKind::Structure => self.xtal_pdb.as_ref(),
            XtalFileKind::Reflections => self.xtal_mtz.as_ref(),
            XtalFileKind::LigandDescription => self.ligand_cif.as_ref(),
        }
    }

    pub fn set(&mut self, kind: XtalFileKind, value: Option<FileRef>) {
        match kind {
            XtalFileKind::Structure => self.xtal_pdb = value,
            XtalFileKind::Reflections => self.xtal_mtz = value,
            XtalFileKind::LigandDescription => self.ligand_cif = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    Ingested { file: Utf8PathBuf, sha256: String },
    Source(Utf8PathBuf),
}

impl FileRef {
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            FileRef::Ingested { file, .. } => file,
            FileRef::Source(path) => path,
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        match self {
            FileRef::Ingested { sha256, .. } => Some(sha256),
            FileRef::Source(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEvent {
    pub chain: String,
    pub residue: String,
    pub file: FileRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutput {
    pub aligned_structure: Utf8PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_artefacts: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_event_map: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_xmap: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apo: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apo_solv: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apo_desolv: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ligand_mol: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ligand_pdb: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ligand_smiles: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LigandOutput {
    pub sites: BTreeMap<String, SiteOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainOutput {
    pub ligands: BTreeMap<String, LigandOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignedFiles {
    pub chains: BTreeMap<String, ChainOutput>,
}

impl AlignedFiles {
    pub fn insert(&mut self, chain: &str, ligand: &str, site: &str, output: SiteOutput) {
        self.chains
            .entry(chain.to_string())
            .or_default()
            .ligands
            .entry(ligand.to_string())
            .or_default()
            .sites
            .insert(site.to_string(), output);
    }
}
