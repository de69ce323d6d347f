use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::XtalStatus;
use crate::error::CollateError;
use crate::extract::{ExtractionRequest, StructureTools, UnitCell};
use crate::fs_util;
use crate::metadata::{CrystalMap, InputMetadata, SiteOutput};
use crate::report::StageReport;
use crate::state::AlignmentStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XtalformSummary {
    pub reference: String,
    pub spacegroup: String,
    pub cell: UnitCell,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformTables {
    pub observation_to_conformer: Value,
    pub conformer_to_canonical: Value,
    pub canonical_to_global: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedMetadata {
    #[serde(flatten)]
    pub collated: InputMetadata,
    pub xtalforms: BTreeMap<String, XtalformSummary>,
    pub conformer_sites: Value,
    pub canonical_sites: Value,
    pub xtalform_sites: Value,
    pub transforms: TransformTables,
}

#[derive(Debug, Clone)]
pub struct AssemblyOutcome {
    pub document: AlignedMetadata,
    pub extraction_errors: usize,
    pub report: StageReport,
}

pub struct MetadataAssembler<'a, T: StructureTools> {
    store: &'a AlignmentStore,
    tools: &'a T,
    known: &'a CrystalMap,
}

impl<'a, T: StructureTools> MetadataAssembler<'a, T> {
    pub fn new(store: &'a AlignmentStore, tools: &'a T, known: &'a CrystalMap) -> Self {
        Self {
            store,
            tools,
            known,
        }
    }

    pub fn assemble(&self, mut collated: InputMetadata) -> Result<AssemblyOutcome, CollateError> {
        let mut report = StageReport::new();
        let state = self.store.state();

        let xtalforms = self.xtalform_summaries(&mut report);
        let conformer_sites = to_value(&state.conformer_sites)?;
        let canonical_sites = to_value(&state.canonical_sites)?;
        let xtalform_sites = to_value(&state.xtalform_sites)?;
        let transforms = TransformTables {
            observation_to_conformer: to_value(&state.neighbourhood_transforms)?,
            conformer_to_canonical: to_value(&state.conformer_site_transforms)?,
            canonical_to_global: to_value(&state.canonical_site_transforms)?,
        };

        for (tag, alignment) in state.alignments() {
            let Some(record) = collated.crystals.get_mut(tag) else {
                report.warn(format!("aligned crystal {tag} not found in input metadata"));
                continue;
            };
            if record.status == Some(XtalStatus::Deprecated) {
                debug!("crystal {tag} is deprecated, leaving out its alignment");
                continue;
            }
            record.assigned_xtalform = state.dataset_assignments.get(tag).cloned();
            record.aligned_files = Some(alignment.files.clone());
        }

        let extraction_errors = self.extract_all(&mut collated, &mut report);
        info!(
            "assembled {} crystal forms, extraction encountered {extraction_errors} errors",
            xtalforms.len()
        );

        Ok(AssemblyOutcome {
            document: AlignedMetadata {
                collated,
                xtalforms,
                conformer_sites,
                canonical_sites,
                xtalform_sites,
                transforms,
            },
            extraction_errors,
            report,
        })
    }

    fn xtalform_summaries(&self, report: &mut StageReport) -> BTreeMap<String, XtalformSummary> {
        let mut summaries = BTreeMap::new();
        for (id, form) in &self.store.state().xtalforms {
            let structure = self
                .known
                .get(&form.reference)
                .and_then(|record| record.crystallographic_files.xtal_pdb.as_ref());
            let Some(structure) = structure else {
                report.error(format!(
                    "reference {} of crystal form {id} has no structure file",
                    form.reference
                ));
                continue;
            };
            let path = self.store.output_root().join(structure.path());
            match self.tools.crystal_symmetry(&path) {
                Ok(symmetry) => {
                    summaries.insert(
                        id.clone(),
                        XtalformSummary {
                            reference: form.reference.clone(),
                            spacegroup: symmetry.space_group,
                            cell: symmetry.cell,
                        },
                    );
                }
                Err(err) => report.error(format!("crystal form {id}: {err}")),
            }
        }
        summaries
    }

    fn extract_all(&self, collated: &mut InputMetadata, report: &mut StageReport) -> usize {
        let root = self.store.output_root();
        let mut errors = 0;

        for (tag, record) in collated.crystals.iter_mut() {
            let ligand_cif = record
                .crystallographic_files
                .ligand_cif
                .as_ref()
                .map(|cif| root.join(cif.path()));
            let Some(aligned) = record.aligned_files.as_mut() else {
                continue;
            };
            let out_dir = root.join(self.store.aligned_dir(tag));

            for (chain, chain_output) in aligned.chains.iter_mut() {
                for (residue, ligand_output) in chain_output.ligands.iter_mut() {
                    for (site, output) in ligand_output.sites.iter_mut() {
                        let structure = root.join(&output.aligned_structure);
                        if !structure.as_std_path().is_file() {
                            errors += 1;
                            report.error(format!(
                                "aligned structure for {tag} {chain}/{residue} site {site} not found: {structure}"
                            ));
                            continue;
                        }
                        if let Err(err) = fs_util::ensure_dir(&out_dir) {
                            errors += 1;
                            report.error(err.to_string());
                            continue;
                        }
                        let request = ExtractionRequest {
                            aligned_structure: &structure,
                            out_dir: &out_dir,
                            chain,
                            residue,
                            ligand_cif: ligand_cif.as_deref(),
                        };
                        match self.tools.extract_components(&request) {
                            Ok(components) => {
                                debug!("extracted components of {structure}");
                                output.apo = Some(relative_to(root, &components.apo));
                                output.apo_solv = Some(relative_to(root, &components.apo_solv));
                                output.apo_desolv = Some(relative_to(root, &components.apo_desolv));
                                output.ligand_pdb =
                                    components.ligand_pdb.map(|path| relative_to(root, &path));
                                output.ligand_mol =
                                    components.ligand_mol.map(|path| relative_to(root, &path));
                                output.ligand_smiles = components.ligand_smiles;
                            }
                            Err(err) => {
                                errors += 1;
                                clear_derived(output);
                                report.error(format!("extraction failed for {tag} {chain}/{residue}: {err}"));
                            }
                        }
                    }
                }
            }
        }
        errors
    }
}

fn clear_derived(output: &mut SiteOutput) {
    output.apo = None;
    output.apo_solv = None;
    output.apo_desolv = None;
    output.ligand_pdb = None;
    output.ligand_mol = None;
    output.ligand_smiles = None;
}

fn relative_to(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    path.strip_prefix(root)
        .map(Utf8Path::to_owned)
        .unwrap_or_else(|_| path.to_owned())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CollateError> {
    serde_json::to_value(value).map_err(|err| CollateError::Filesystem(format!("serialize state: {err}")))
}
