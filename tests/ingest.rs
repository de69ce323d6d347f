use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use xtal_collate::error::CollateError;
use xtal_collate::fs_util;
use xtal_collate::ingest::FileIngestor;
use xtal_collate::metadata::{BindingEvent, CrystalFiles, CrystalMap, CrystalRecord, FileRef};

fn root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn source(dir: &Utf8Path, name: &str, content: &str) -> FileRef {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    FileRef::Source(path)
}

#[test]
fn ingested_hash_matches_copied_bytes() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let (src, out) = (root(&src), root(&out));
    fs::create_dir_all(out.join("upload_1")).unwrap();

    let mut crystals = CrystalMap::new();
    crystals.insert(
        "Mpro-x0001".to_string(),
        CrystalRecord {
            crystallographic_files: CrystalFiles {
                xtal_pdb: Some(source(&src, "refine.pdb", "ATOM      1  N   ALA A   1\n")),
                xtal_mtz: Some(source(&src, "refine.mtz", "reflections")),
                ligand_cif: None,
                ligand_binding_events: vec![BindingEvent {
                    chain: "A".to_string(),
                    residue: "501".to_string(),
                    file: source(&src, "event.ccp4", "density"),
                }],
            },
            ..CrystalRecord::default()
        },
    );

    let report = FileIngestor::new(None, &out, 1).ingest(&mut crystals).unwrap();
    assert_eq!(report.warnings.len(), 1);

    let files = &crystals["Mpro-x0001"].crystallographic_files;
    let pdb = files.xtal_pdb.as_ref().unwrap();
    assert_eq!(
        pdb.path(),
        &Utf8PathBuf::from("upload_1/crystallographic_files/Mpro-x0001/Mpro-x0001.pdb")
    );
    let recomputed = fs_util::sha256_file(&out.join(pdb.path())).unwrap();
    assert_eq!(pdb.sha256(), Some(recomputed.as_str()));
    assert!(files.ligand_cif.is_none());

    let event = &files.ligand_binding_events[0];
    assert!(event.file.path().ends_with("Mpro-x0001_event_A_501.ccp4"));
    assert!(event.file.sha256().is_some());
}

#[test]
fn missing_source_is_recorded_absent() {
    let out = tempfile::tempdir().unwrap();
    let out = root(&out);
    fs::create_dir_all(out.join("upload_1")).unwrap();

    let mut crystals = CrystalMap::new();
    crystals.insert(
        "Mpro-x0002".to_string(),
        CrystalRecord {
            crystallographic_files: CrystalFiles {
                xtal_pdb: Some(FileRef::Source(out.join("nowhere.pdb"))),
                ..CrystalFiles::default()
            },
            ..CrystalRecord::default()
        },
    );

    let report = FileIngestor::new(None, &out, 1).ingest(&mut crystals).unwrap();
    assert!(!report.has_errors());
    assert!(crystals["Mpro-x0002"].crystallographic_files.xtal_pdb.is_none());
}

#[test]
fn reingestion_replaces_previous_tree() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let (src, out) = (root(&src), root(&out));
    let stale = out.join("upload_1/crystallographic_files/gone/gone.pdb");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "stale").unwrap();

    let mut crystals = CrystalMap::new();
    crystals.insert(
        "Mpro-x0003".to_string(),
        CrystalRecord {
            crystallographic_files: CrystalFiles {
                xtal_pdb: Some(source(&src, "a.pdb", "ATOM")),
                ..CrystalFiles::default()
            },
            ..CrystalRecord::default()
        },
    );
    FileIngestor::new(None, &out, 1).ingest(&mut crystals).unwrap();
    assert!(!stale.as_std_path().exists());
}

#[test]
fn unwritable_version_tree_aborts_ingestion() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let (src, out) = (root(&src), root(&out));
    fs::create_dir_all(out.join("upload_1")).unwrap();
    fs::write(out.join("upload_1/crystallographic_files"), "not a directory").unwrap();

    let mut crystals = CrystalMap::new();
    crystals.insert(
        "Mpro-x0004".to_string(),
        CrystalRecord {
            crystallographic_files: CrystalFiles {
                xtal_pdb: Some(source(&src, "a.pdb", "ATOM")),
                ..CrystalFiles::default()
            },
            ..CrystalRecord::default()
        },
    );

    assert_matches!(
        FileIngestor::new(None, &out, 1).ingest(&mut crystals),
        Err(CollateError::Filesystem(_))
    );
}

fn crystal(pdb: FileRef) -> CrystalRecord {
    CrystalRecord {
        crystallographic_files: CrystalFiles {
            xtal_pdb: Some(pdb),
            ..CrystalFiles::default()
        },
        ..CrystalRecord::default()
    }
}

#[cfg(target_os = "linux")]
#[test]
fn failed_copy_keeps_previous_ingestion() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let (src, out) = (root(&src), root(&out));
    fs::create_dir_all(out.join("upload_1")).unwrap();

    let mut first = CrystalMap::new();
    first.insert("A".to_string(), crystal(source(&src, "a.pdb", "ATOM A")));
    first.insert("B".to_string(), crystal(source(&src, "b.pdb", "ATOM B")));
    FileIngestor::new(None, &out, 1).ingest(&mut first).unwrap();
    let previous_b = first["B"].crystallographic_files.xtal_pdb.clone().unwrap();

    // listed as a regular file but every read fails
    let mut second = CrystalMap::new();
    second.insert("A".to_string(), crystal(source(&src, "a.pdb", "ATOM A v2")));
    second.insert("B".to_string(), crystal(FileRef::Source("/proc/self/mem".into())));

    assert_matches!(
        FileIngestor::new(None, &out, 1).ingest(&mut second),
        Err(CollateError::Ingestion { tag, source_path, .. })
            if tag == "B" && source_path.as_str() == "/proc/self/mem"
    );

    let kept = out.join(previous_b.path());
    assert_eq!(fs::read_to_string(&kept).unwrap(), "ATOM B");
    assert_eq!(fs_util::sha256_file(&kept).unwrap(), previous_b.sha256().unwrap());
    assert_eq!(
        fs::read_to_string(out.join("upload_1/crystallographic_files/A/A.pdb")).unwrap(),
        "ATOM A"
    );
    let entries: Vec<String> = fs::read_dir(out.join("upload_1"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, ["crystallographic_files"]);
}
