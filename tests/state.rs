use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, json};
use xtal_collate::domain::LigandId;
use xtal_collate::error::CollateError;
use xtal_collate::metadata::{AlignedFiles, SiteOutput};
use xtal_collate::state::{
    AlignmentState, AlignmentStore, CanonicalSite, Category, ConformerSite, Transform, XtalForm,
};

fn root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn version_dir(root: &Utf8Path, version: u32) -> Utf8PathBuf {
    let dir = root.join(format!("upload_{version}"));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn xtalform(reference: &str) -> XtalForm {
    XtalForm {
        reference: reference.to_string(),
        extra: Map::new(),
    }
}

fn aligned(structure: &str) -> AlignedFiles {
    let mut files = AlignedFiles::default();
    files.insert(
        "A",
        "501",
        "c1",
        SiteOutput {
            aligned_structure: structure.into(),
            ..SiteOutput::default()
        },
    );
    files
}

fn candidates(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|tag| tag.to_string()).collect()
}

fn populate_first(root: &Utf8Path) -> Utf8PathBuf {
    let first = version_dir(root, 1);
    let mut store = AlignmentStore::load(&first, None).unwrap();
    store.link_previous(candidates(&["x0001", "x0002"]));

    let ligand = LigandId::new("x0001", "A", "501");
    let state = store.state_mut();
    state.xtalforms.insert("xf1".to_string(), xtalform("x0001"));
    state.ligand_neighbourhoods.0.insert(ligand.clone(), json!({"atoms": 12}));
    state.conformer_sites.insert(
        "c1".to_string(),
        ConformerSite {
            reference_ligand_id: ligand.clone(),
            members: BTreeSet::from([ligand]),
            canonical_site_id: Some("s1".to_string()),
            extra: Map::new(),
        },
    );
    state.canonical_sites.insert(
        "s1".to_string(),
        CanonicalSite {
            reference_conformer_site_id: "c1".to_string(),
            conformer_site_ids: vec!["c1".to_string()],
            extra: Map::new(),
        },
    );
    state
        .conformer_site_transforms
        .insert("c1".to_string(), "s1".to_string(), Transform::identity());
    state.dataset_assignments.insert("x0001".to_string(), "xf1".to_string());

    store
        .record_alignment("x0001", aligned("upload_1/aligned_files/x0001/x0001_A_501_c1.pdb"))
        .unwrap();
    store
        .record_alignment("x0002", aligned("upload_1/aligned_files/x0002/x0002_A_501_c1.pdb"))
        .unwrap();
    store.persist().unwrap();
    first
}

#[test]
fn empty_current_yields_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = populate_first(&root);
    let second = version_dir(&root, 2);

    let store = AlignmentStore::load(&second, Some(&first)).unwrap();
    assert_eq!(store.version(), 2);
    assert_eq!(store.state(), &AlignmentState::read_dir(&first).unwrap());
    assert_eq!(store.state().alignment("x0001").unwrap().version, 1);
}

#[test]
fn current_entries_win_on_collision() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = populate_first(&root);
    let second = version_dir(&root, 2);

    let state_dir = second.join("alignment_state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(
        Category::Xtalforms.path(&second),
        r#"{"xf1": {"reference": "x0002"}, "xf2": {"reference": "x0003"}}"#,
    )
    .unwrap();

    let store = AlignmentStore::load(&second, Some(&first)).unwrap();
    let xtalforms = &store.state().xtalforms;
    assert_eq!(xtalforms["xf1"].reference, "x0002");
    assert_eq!(xtalforms["xf2"].reference, "x0003");
    // categories absent from the current version come from the previous one
    assert_eq!(store.state().conformer_sites.len(), 1);
}

#[test]
fn link_previous_partitions_reuse_and_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = populate_first(&root);
    let second = version_dir(&root, 2);

    let mut store = AlignmentStore::load(&second, Some(&first)).unwrap();
    let summary = store.link_previous(candidates(&["x0002", "x0003"]));
    assert_eq!(summary.linked, ["x0001"]);
    assert_eq!(summary.invalidated, ["x0002"]);
    assert!(store.state().alignment("x0002").is_none());

    let (reuse, recompute) = store.partition(["x0001", "x0002", "x0003"]);
    assert_eq!(reuse, ["x0001"]);
    assert_eq!(recompute, ["x0002", "x0003"]);

    assert_matches!(
        store.record_alignment("x0001", aligned("upload_2/aligned_files/x0001/new.pdb")),
        Err(CollateError::ReuseViolation(tag)) if tag == "x0001"
    );
    store
        .record_alignment("x0002", aligned("upload_2/aligned_files/x0002/x0002_A_501_c1.pdb"))
        .unwrap();
    assert_eq!(store.state().alignment("x0002").unwrap().version, 2);
    assert_eq!(store.aligned_dir("x0002"), Utf8PathBuf::from("upload_2/aligned_files/x0002"));
}

#[test]
fn persist_leaves_previous_version_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = populate_first(&root);
    let second = version_dir(&root, 2);
    let before: Vec<Vec<u8>> = Category::ALL
        .iter()
        .map(|category| fs::read(category.path(&first)).unwrap())
        .collect();

    let mut store = AlignmentStore::load(&second, Some(&first)).unwrap();
    store.link_previous(candidates(&["x0002"]));
    store.state_mut().xtalforms.insert("xf2".to_string(), xtalform("x0002"));
    store.persist().unwrap();

    let after: Vec<Vec<u8>> = Category::ALL
        .iter()
        .map(|category| fs::read(category.path(&first)).unwrap())
        .collect();
    assert_eq!(before, after);

    let reloaded = AlignmentState::read_dir(&second).unwrap();
    assert_eq!(&reloaded, store.state());
    assert!(reloaded.alignment("x0002").is_none());
    assert_eq!(reloaded.alignment("x0001").unwrap().version, 1);
}

#[test]
fn inconsistent_state_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = version_dir(&root, 1);

    let mut store = AlignmentStore::load(&first, None).unwrap();
    store
        .state_mut()
        .canonical_site_transforms
        .insert("s1".to_string(), "global".to_string(), Transform::identity());

    assert_matches!(store.persist(), Err(CollateError::InconsistentState(problems)) if problems.len() == 2);
    assert!(!Category::CanonicalSiteTransforms.path(&first).as_std_path().exists());
}

#[test]
fn malformed_category_document() {
    let dir = tempfile::tempdir().unwrap();
    let root = root(&dir);
    let first = version_dir(&root, 1);
    fs::create_dir_all(first.join("alignment_state")).unwrap();
    fs::write(Category::ConformerSites.path(&first), "[1, 2").unwrap();

    assert_matches!(
        AlignmentStore::load(&first, None),
        Err(CollateError::StateParse { .. })
    );
}
