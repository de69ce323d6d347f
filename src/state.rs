use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::domain::LigandId;
use crate::error::CollateError;
use crate::fs_util;
use crate::metadata::{ALIGNED_FILES_DIR, AlignedFiles};
use crate::version::VersionResolver;

pub const STATE_DIR: &str = "alignment_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    LigandNeighbourhoods,
    AlignabilityGraph,
    NeighbourhoodTransforms,
    ConformerSites,
    ConformerSiteTransforms,
    CanonicalSites,
    CanonicalSiteTransforms,
    XtalformSites,
    Xtalforms,
    Assemblies,
    DatasetAssignments,
    ReferenceStructureTransforms,
    Alignments,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::LigandNeighbourhoods,
        Category::AlignabilityGraph,
        Category::NeighbourhoodTransforms,
        Category::ConformerSites,
        Category::ConformerSiteTransforms,
        Category::CanonicalSites,
        Category::CanonicalSiteTransforms,
        Category::XtalformSites,
        Category::Xtalforms,
        Category::Assemblies,
        Category::DatasetAssignments,
        Category::ReferenceStructureTransforms,
        Category::Alignments,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::LigandNeighbourhoods => "ligand_neighbourhoods",
            Category::AlignabilityGraph => "alignability_graph",
            Category::NeighbourhoodTransforms => "neighbourhood_transforms",
            Category::ConformerSites => "conformer_sites",
            Category::ConformerSiteTransforms => "conformer_site_transforms",
            Category::CanonicalSites => "canonical_sites",
            Category::CanonicalSiteTransforms => "canonical_site_transforms",
            Category::XtalformSites => "xtalform_sites",
            Category::Xtalforms => "xtalforms",
            Category::Assemblies => "assemblies",
            Category::DatasetAssignments => "dataset_assignments",
            Category::ReferenceStructureTransforms => "reference_structure_transforms",
            Category::Alignments => "alignments",
        }
    }

    pub fn path(self, version_dir: &Utf8Path) -> Utf8PathBuf {
        version_dir
            .join(STATE_DIR)
            .join(format!("{}.json", self.name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub vec: [f64; 3],
    pub mat: [[f64; 3]; 3],
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            vec: [0.0; 3],
            mat: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformerSite {
    pub reference_ligand_id: LigandId,
    #[serde(default)]
    pub members: BTreeSet<LigandId>,
    #[serde(default)]
    pub canonical_site_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSite {
    pub reference_conformer_site_id: String,
    #[serde(default)]
    pub conformer_site_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XtalformSite {
    pub xtalform_id: String,
    pub canonical_site_id: String,
    #[serde(default)]
    pub crystallographic_chain: Option<String>,
    #[serde(default)]
    pub members: BTreeSet<LigandId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XtalForm {
    pub reference: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: LigandId,
    pub to: LigandId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAlignment {
    pub version: u32,
    pub files: AlignedFiles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable<K: Ord, V>(pub BTreeMap<K, V>);

impl<K: Ord, V> Default for KeyedTable<K, V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord + Serialize, V: Serialize> Serialize for KeyedTable<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Entry<'a, K, V> {
            key: &'a K,
            value: &'a V,
        }
        serializer.collect_seq(self.0.iter().map(|(key, value)| Entry { key, value }))
    }
}

impl<'de, K: Ord + Deserialize<'de>, V: Deserialize<'de>> Deserialize<'de> for KeyedTable<K, V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Entry<K, V> {
            key: K,
            value: V,
        }
        let entries = Vec::<Entry<K, V>>::deserialize(deserializer)?;
        Ok(Self(entries.into_iter().map(|entry| (entry.key, entry.value)).collect()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformTable<K: Ord>(pub BTreeMap<(K, K), Transform>);

impl<K: Ord> Default for TransformTable<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord> TransformTable<K> {
    pub fn insert(&mut self, from: K, to: K, transform: Transform) {
        self.0.insert((from, to), transform);
    }
}

impl<K: Ord + Serialize> Serialize for TransformTable<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Record<'a, K> {
            from: &'a K,
            to: &'a K,
            transform: &'a Transform,
        }
        serializer.collect_seq(
            self.0
                .iter()
                .map(|((from, to), transform)| Record { from, to, transform }),
        )
    }
}

impl<'de, K: Ord + Deserialize<'de>> Deserialize<'de> for TransformTable<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Record<K> {
            from: K,
            to: K,
            transform: Transform,
        }
        let records = Vec::<Record<K>>::deserialize(deserializer)?;
        Ok(Self(
            records
                .into_iter()
                .map(|record| ((record.from, record.to), record.transform))
                .collect(),
        ))
    }
}

/// The alignment reference index is only writable through
/// [`AlignmentStore::record_alignment`], which enforces the reuse partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentState {
    pub ligand_neighbourhoods: KeyedTable<LigandId, Value>,
    pub alignability_graph: BTreeSet<GraphEdge>,
    pub neighbourhood_transforms: TransformTable<LigandId>,
    pub conformer_sites: BTreeMap<String, ConformerSite>,
    pub conformer_site_transforms: TransformTable<String>,
    pub canonical_sites: BTreeMap<String, CanonicalSite>,
    pub canonical_site_transforms: TransformTable<String>,
    pub xtalform_sites: BTreeMap<String, XtalformSite>,
    pub xtalforms: BTreeMap<String, XtalForm>,
    pub assemblies: BTreeMap<String, Value>,
    pub dataset_assignments: BTreeMap<String, String>,
    pub reference_structure_transforms: TransformTable<String>,
    alignments: BTreeMap<String, DatasetAlignment>,
}

impl AlignmentState {
    pub fn read_dir(version_dir: &Utf8Path) -> Result<Self, CollateError> {
        Ok(Self {
            ligand_neighbourhoods: read_category(version_dir, Category::LigandNeighbourhoods)?,
            alignability_graph: read_category(version_dir, Category::AlignabilityGraph)?,
            neighbourhood_transforms: read_category(version_dir, Category::NeighbourhoodTransforms)?,
            conformer_sites: read_category(version_dir, Category::ConformerSites)?,
            conformer_site_transforms: read_category(version_dir, Category::ConformerSiteTransforms)?,
            canonical_sites: read_category(version_dir, Category::CanonicalSites)?,
            canonical_site_transforms: read_category(version_dir, Category::CanonicalSiteTransforms)?,
            xtalform_sites: read_category(version_dir, Category::XtalformSites)?,
            xtalforms: read_category(version_dir, Category::Xtalforms)?,
            assemblies: read_category(version_dir, Category::Assemblies)?,
            dataset_assignments: read_category(version_dir, Category::DatasetAssignments)?,
            reference_structure_transforms: read_category(
                version_dir,
                Category::ReferenceStructureTransforms,
            )?,
            alignments: read_category(version_dir, Category::Alignments)?,
        })
    }

    pub fn overlay(&mut self, other: AlignmentState) {
        self.ligand_neighbourhoods.0.extend(other.ligand_neighbourhoods.0);
        self.alignability_graph.extend(other.alignability_graph);
        self.neighbourhood_transforms.0.extend(other.neighbourhood_transforms.0);
        self.conformer_sites.extend(other.conformer_sites);
        self.conformer_site_transforms.0.extend(other.conformer_site_transforms.0);
        self.canonical_sites.extend(other.canonical_sites);
        self.canonical_site_transforms.0.extend(other.canonical_site_transforms.0);
        self.xtalform_sites.extend(other.xtalform_sites);
        self.xtalforms.extend(other.xtalforms);
        self.assemblies.extend(other.assemblies);
        self.dataset_assignments.extend(other.dataset_assignments);
        self.reference_structure_transforms
            .0
            .extend(other.reference_structure_transforms.0);
        self.alignments.extend(other.alignments);
    }

    pub fn alignments(&self) -> &BTreeMap<String, DatasetAlignment> {
        &self.alignments
    }

    pub fn alignment(&self, tag: &str) -> Option<&DatasetAlignment> {
        self.alignments.get(tag)
    }

    pub fn check_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (from, to) in self.neighbourhood_transforms.0.keys() {
            for end in [from, to] {
                if !self.ligand_neighbourhoods.0.contains_key(end) {
                    problems.push(format!(
                        "observation transform {from} -> {to} references unknown ligand {end}"
                    ));
                }
            }
        }

        for (from, to) in self.conformer_site_transforms.0.keys() {
            if !self.conformer_sites.contains_key(from) {
                problems.push(format!(
                    "conformer site transform {from} -> {to} references unknown conformer site {from}"
                ));
            }
            if !self.canonical_sites.contains_key(to) {
                problems.push(format!(
                    "conformer site transform {from} -> {to} references unknown canonical site {to}"
                ));
            }
        }

        for (from, to) in self.canonical_site_transforms.0.keys() {
            for end in [from, to] {
                if !self.canonical_sites.contains_key(end) {
                    problems.push(format!(
                        "canonical site transform {from} -> {to} references unknown canonical site {end}"
                    ));
                }
            }
        }

        for (canonical_id, canonical) in &self.canonical_sites {
            let listed: BTreeSet<&String> = canonical
                .conformer_site_ids
                .iter()
                .chain(std::iter::once(&canonical.reference_conformer_site_id))
                .collect();
            for conformer_id in listed {
                match self.conformer_sites.get(conformer_id) {
                    None => problems.push(format!(
                        "canonical site {canonical_id} lists unknown conformer site {conformer_id}"
                    )),
                    Some(conformer) if conformer.canonical_site_id.as_deref() != Some(canonical_id.as_str()) => {
                        problems.push(format!(
                            "conformer site {conformer_id} does not point back to canonical site {canonical_id}"
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        for (site_id, site) in &self.xtalform_sites {
            if !self.canonical_sites.contains_key(&site.canonical_site_id) {
                problems.push(format!(
                    "crystal form site {site_id} references unknown canonical site {}",
                    site.canonical_site_id
                ));
            }
        }

        problems
    }
}

fn read_category<T: DeserializeOwned + Default>(
    version_dir: &Utf8Path,
    category: Category,
) -> Result<T, CollateError> {
    let path = category.path(version_dir);
    fs_util::read_json::<T>(&path)
        .map_err(|err| match err {
            CollateError::MetadataParse { path, reason } => CollateError::StateParse { path, reason },
            other => other,
        })
        .map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub linked: Vec<String>,
    pub invalidated: Vec<String>,
}

#[derive(Debug)]
pub struct AlignmentStore {
    output_root: Utf8PathBuf,
    version: u32,
    state: AlignmentState,
    candidates: BTreeSet<String>,
}

impl AlignmentStore {
    pub fn load(current: &Utf8Path, previous: Option<&Utf8Path>) -> Result<Self, CollateError> {
        let version = VersionResolver::parse_version(current).ok_or_else(|| {
            CollateError::Filesystem(format!("{current} is not a version directory"))
        })?;
        let output_root = current
            .parent()
            .map(Utf8Path::to_owned)
            .unwrap_or_default();

        let mut state = match previous {
            Some(previous) => {
                info!("loading alignment state from previous version {previous}");
                AlignmentState::read_dir(previous)?
            }
            None => AlignmentState::default(),
        };
        state.overlay(AlignmentState::read_dir(current)?);

        Ok(Self {
            output_root,
            version,
            state,
            candidates: BTreeSet::new(),
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn version_dir(&self) -> Utf8PathBuf {
        VersionResolver::version_dir(&self.output_root, self.version)
    }

    pub fn state(&self) -> &AlignmentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AlignmentState {
        &mut self.state
    }

    pub fn candidates(&self) -> &BTreeSet<String> {
        &self.candidates
    }

    pub fn link_previous(&mut self, candidates: BTreeSet<String>) -> LinkSummary {
        let mut summary = LinkSummary::default();
        let version = self.version;
        self.state.alignments.retain(|tag, alignment| {
            if alignment.version >= version {
                return true;
            }
            if candidates.contains(tag) {
                summary.invalidated.push(tag.clone());
                false
            } else {
                debug!("linking {tag} from version {}", alignment.version);
                summary.linked.push(tag.clone());
                true
            }
        });
        self.candidates = candidates;
        info!(
            "linked {} alignments from earlier versions, {} will be recomputed",
            summary.linked.len(),
            summary.invalidated.len()
        );
        summary
    }

    pub fn partition<'t>(&self, tags: impl IntoIterator<Item = &'t str>) -> (Vec<&'t str>, Vec<&'t str>) {
        tags.into_iter().partition(|tag| {
            !self.candidates.contains(*tag) && self.state.alignments.contains_key(*tag)
        })
    }

    pub fn aligned_dir(&self, tag: &str) -> Utf8PathBuf {
        VersionResolver::version_dir(Utf8Path::new(""), self.version)
            .join(ALIGNED_FILES_DIR)
            .join(tag)
    }

    /// Records the freshly computed output files of `tag`. A crystal whose
    /// earlier alignment was linked into this version cannot be overwritten
    /// unless it is a candidate.
    pub fn record_alignment(&mut self, tag: &str, files: AlignedFiles) -> Result<(), CollateError> {
        let linked = self
            .state
            .alignments
            .get(tag)
            .is_some_and(|existing| existing.version < self.version);
        if linked && !self.candidates.contains(tag) {
            return Err(CollateError::ReuseViolation(tag.to_string()));
        }
        self.state.alignments.insert(
            tag.to_string(),
            DatasetAlignment {
                version: self.version,
                files,
            },
        );
        Ok(())
    }

    pub fn persist(&self) -> Result<(), CollateError> {
        let problems = self.state.check_consistency();
        if !problems.is_empty() {
            return Err(CollateError::InconsistentState(problems));
        }
        let dir = self.version_dir();
        let state = &self.state;
        write_category(&dir, Category::LigandNeighbourhoods, &state.ligand_neighbourhoods)?;
        write_category(&dir, Category::AlignabilityGraph, &state.alignability_graph)?;
        write_category(&dir, Category::NeighbourhoodTransforms, &state.neighbourhood_transforms)?;
        write_category(&dir, Category::ConformerSites, &state.conformer_sites)?;
        write_category(&dir, Category::ConformerSiteTransforms, &state.conformer_site_transforms)?;
        write_category(&dir, Category::CanonicalSites, &state.canonical_sites)?;
        write_category(&dir, Category::CanonicalSiteTransforms, &state.canonical_site_transforms)?;
        write_category(&dir, Category::XtalformSites, &state.xtalform_sites)?;
        write_category(&dir, Category::Xtalforms, &state.xtalforms)?;
        write_category(&dir, Category::Assemblies, &state.assemblies)?;
        write_category(&dir, Category::DatasetAssignments, &state.dataset_assignments)?;
        write_category(
            &dir,
            Category::ReferenceStructureTransforms,
            &state.reference_structure_transforms,
        )?;
        write_category(&dir, Category::Alignments, &state.alignments)?;
        info!("persisted alignment state to {}", dir.join(STATE_DIR));
        Ok(())
    }
}

fn write_category<T: Serialize>(
    version_dir: &Utf8Path,
    category: Category,
    value: &T,
) -> Result<(), CollateError> {
    fs_util::write_json_atomic(&category.path(version_dir), value)
}
