use std::collections::BTreeMap;

use xtal_collate::domain::XtalStatus;
use xtal_collate::history::HistoryMerger;
use xtal_collate::metadata::{CrystalMap, CrystalRecord, InputMetadata};

fn crystals(entries: &[(&str, Option<&str>)]) -> CrystalMap {
    entries
        .iter()
        .map(|(tag, updated)| {
            (
                tag.to_string(),
                CrystalRecord {
                    last_updated: updated.map(str::to_string),
                    ..CrystalRecord::default()
                },
            )
        })
        .collect()
}

fn upload(entries: &[(&str, Option<&str>)]) -> InputMetadata {
    InputMetadata {
        run_on: "2024-01-01 00:00:00".to_string(),
        input_dirs: Vec::new(),
        output_dir: "out".into(),
        crystals: crystals(entries),
    }
}

#[test]
fn unseen_crystal_is_new() {
    let history = vec![upload(&[("A0001", Some("2024-01-01"))])];
    let mut current = crystals(&[("B0001", Some("2024-01-01"))]);
    let outcome = HistoryMerger::new(&BTreeMap::new()).merge(&history, &mut current);

    assert_eq!(outcome.all_xtals.len(), 2);
    assert_eq!(outcome.all_xtals["B0001"].status, Some(XtalStatus::New));
    assert!(outcome.new_xtals.contains_key("B0001"));
    assert!(!outcome.new_xtals.contains_key("A0001"));
}

#[test]
fn newer_timestamp_supersedes() {
    let history = vec![upload(&[("ABC123", Some("2024-01-01"))])];
    let mut current = crystals(&[("ABC123", Some("2024-02-01"))]);
    let outcome = HistoryMerger::new(&BTreeMap::new()).merge(&history, &mut current);

    assert_eq!(outcome.all_xtals["ABC123"].status, Some(XtalStatus::Supersedes));
    assert!(outcome.new_xtals.contains_key("ABC123"));
    assert_eq!(current["ABC123"].status, Some(XtalStatus::Supersedes));
}

#[test]
fn missing_timestamp_supersedes_with_warning() {
    let history = vec![upload(&[("A0001", None), ("A0002", Some("2024-01-01"))])];
    let mut current = crystals(&[("A0001", Some("2024-01-01")), ("A0002", None)]);
    let outcome = HistoryMerger::new(&BTreeMap::new()).merge(&history, &mut current);

    assert_eq!(outcome.all_xtals["A0001"].status, Some(XtalStatus::Supersedes));
    assert_eq!(outcome.all_xtals["A0002"].status, Some(XtalStatus::Supersedes));
    assert_eq!(outcome.report.warnings.len(), 2);
    assert_eq!(outcome.new_xtals.len(), 2);
}

#[test]
fn deprecation_overrides_status_and_keeps_reason() {
    let deprecations = BTreeMap::from([("XYZ999".to_string(), "low resolution".to_string())]);
    let history = vec![upload(&[("XYZ999", Some("2024-01-01"))])];
    let mut current = crystals(&[("XYZ999", Some("2024-01-01")), ("NEW0001", None)]);
    let outcome = HistoryMerger::new(&deprecations).merge(&history, &mut current);

    let record = &outcome.all_xtals["XYZ999"];
    assert_eq!(record.status, Some(XtalStatus::Deprecated));
    assert_eq!(record.reason.as_deref(), Some("low resolution"));
    assert_eq!(current["XYZ999"].status, Some(XtalStatus::Deprecated));
    assert!(!outcome.new_xtals.contains_key("XYZ999"));
    assert!(outcome.new_xtals.contains_key("NEW0001"));
}

#[test]
fn deprecation_keeps_historical_crystal() {
    let deprecations = BTreeMap::from([("OLD0001".to_string(), "wrong ligand".to_string())]);
    let history = vec![upload(&[("OLD0001", Some("2024-01-01"))])];
    let mut current = crystals(&[("NEW0001", Some("2024-02-01"))]);
    let outcome = HistoryMerger::new(&deprecations).merge(&history, &mut current);

    assert_eq!(outcome.all_xtals["OLD0001"].status, Some(XtalStatus::Deprecated));
    assert_eq!(outcome.all_xtals.len(), 2);
}

#[test]
fn unknown_deprecation_is_a_warning() {
    let deprecations = BTreeMap::from([("GHOST".to_string(), "typo".to_string())]);
    let mut current = crystals(&[("A0001", None)]);
    let outcome = HistoryMerger::new(&deprecations).merge(&[], &mut current);

    assert_eq!(outcome.report.warnings.len(), 1);
    assert!(!outcome.all_xtals.contains_key("GHOST"));
}
