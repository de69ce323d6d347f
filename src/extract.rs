use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CollateError;
use crate::fs_util;

pub const LIGAND_NAMES: [&str; 2] = ["LIG", "XXX"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrystalSymmetry {
    pub space_group: String,
    pub cell: UnitCell,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub aligned_structure: &'a Utf8Path,
    pub out_dir: &'a Utf8Path,
    pub chain: &'a str,
    pub residue: &'a str,
    pub ligand_cif: Option<&'a Utf8Path>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedComponents {
    pub apo: Utf8PathBuf,
    pub apo_solv: Utf8PathBuf,
    pub apo_desolv: Utf8PathBuf,
    pub ligand_pdb: Option<Utf8PathBuf>,
    pub ligand_mol: Option<Utf8PathBuf>,
    pub ligand_smiles: Option<String>,
}

pub trait StructureTools {
    fn crystal_symmetry(&self, structure: &Utf8Path) -> Result<CrystalSymmetry, CollateError>;

    fn extract_components(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ExtractedComponents, CollateError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdbTextTools;

impl PdbTextTools {
    fn read(path: &Utf8Path) -> Result<String, CollateError> {
        fs::read_to_string(path.as_std_path())
            .map_err(|err| CollateError::Extraction(format!("read {path}: {err}")))
    }
}

fn column<'l>(line: &'l str, start: usize, end: usize) -> &'l str {
    let end = end.min(line.len());
    line.get(start.min(end)..end).unwrap_or("").trim()
}

fn is_ligand(line: &str) -> bool {
    line.starts_with("HETATM") && LIGAND_NAMES.contains(&column(line, 17, 20))
}

fn parse_cell_value(line: &str, start: usize, end: usize) -> Result<f64, CollateError> {
    column(line, start, end)
        .parse()
        .map_err(|_| CollateError::Extraction(format!("malformed CRYST1 record: {line}")))
}

impl StructureTools for PdbTextTools {
    fn crystal_symmetry(&self, structure: &Utf8Path) -> Result<CrystalSymmetry, CollateError> {
        let content = Self::read(structure)?;
        let line = content
            .lines()
            .find(|line| line.starts_with("CRYST1"))
            .ok_or_else(|| CollateError::Extraction(format!("no CRYST1 record in {structure}")))?;
        Ok(CrystalSymmetry {
            space_group: column(line, 55, 66).to_string(),
            cell: UnitCell {
                a: parse_cell_value(line, 6, 15)?,
                b: parse_cell_value(line, 15, 24)?,
                c: parse_cell_value(line, 24, 33)?,
                alpha: parse_cell_value(line, 33, 40)?,
                beta: parse_cell_value(line, 40, 47)?,
                gamma: parse_cell_value(line, 47, 54)?,
            },
        })
    }

    fn extract_components(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ExtractedComponents, CollateError> {
        let content = Self::read(request.aligned_structure)?;
        if !content
            .lines()
            .any(|line| line.starts_with("ATOM") || line.starts_with("HETATM"))
        {
            return Err(CollateError::Extraction(format!(
                "{} contains no coordinates",
                request.aligned_structure
            )));
        }

        let stem = request
            .aligned_structure
            .file_stem()
            .ok_or_else(|| CollateError::Extraction("aligned structure has no file name".to_string()))?;
        let out = |suffix: &str| request.out_dir.join(format!("{stem}_{suffix}.pdb"));

        let mut apo = String::new();
        let mut solv = String::new();
        let mut desolv = String::new();
        let mut ligand = String::new();
        for line in content.lines() {
            if is_ligand(line) {
                if column(line, 21, 22) == request.chain && column(line, 22, 26) == request.residue {
                    ligand.push_str(line);
                    ligand.push('\n');
                }
                continue;
            }
            apo.push_str(line);
            apo.push('\n');
            let target = if line.starts_with("HETATM") {
                &mut solv
            } else {
                &mut desolv
            };
            target.push_str(line);
            target.push('\n');
        }

        let components = ExtractedComponents {
            apo: out("apo"),
            apo_solv: out("apo-solv"),
            apo_desolv: out("apo-desolv"),
            ligand_pdb: (!ligand.is_empty()).then(|| out("ligand")),
            ligand_mol: None,
            ligand_smiles: None,
        };
        fs_util::write_bytes_atomic(&components.apo, apo.as_bytes())?;
        fs_util::write_bytes_atomic(&components.apo_solv, solv.as_bytes())?;
        fs_util::write_bytes_atomic(&components.apo_desolv, desolv.as_bytes())?;
        if let Some(path) = &components.ligand_pdb {
            ligand.push_str("END\n");
            fs_util::write_bytes_atomic(path, ligand.as_bytes())?;
        }
        Ok(components)
    }
}
