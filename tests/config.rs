use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use xtal_collate::config::{
    Config, ConfigLoader, DEFAULT_MANIFEST_PATH, InputEntry, InputEntryObject, Overrides,
};
use xtal_collate::error::CollateError;

fn config(inputs: Vec<InputEntry>) -> Config {
    Config {
        base_dir: None,
        output_dir: Some("out".into()),
        target_name: Some("Mpro".to_string()),
        inputs,
        overrides: Overrides::default(),
    }
}

#[test]
fn parse_config_shorthand() {
    let resolved = ConfigLoader::resolve_config(config(vec![InputEntry::Shorthand("lb1".into())])).unwrap();
    assert_eq!(resolved.target_name.as_str(), "Mpro");
    assert_eq!(resolved.inputs.len(), 1);
    assert_eq!(resolved.inputs[0].dir, Utf8PathBuf::from("lb1"));
    assert_eq!(resolved.inputs[0].manifest, Utf8Path::new("lb1").join(DEFAULT_MANIFEST_PATH));
}

#[test]
fn parse_config_detailed() {
    let resolved = ConfigLoader::resolve_config(config(vec![
        InputEntry::Detailed(InputEntryObject {
            dir: "lb2".into(),
            manifest: Some("export/rows.json".into()),
        }),
        InputEntry::Detailed(InputEntryObject {
            dir: "lb3".into(),
            manifest: Some("/data/rows.json".into()),
        }),
    ]))
    .unwrap();
    assert_eq!(resolved.inputs[0].manifest, Utf8PathBuf::from("lb2/export/rows.json"));
    assert_eq!(resolved.inputs[1].manifest, Utf8PathBuf::from("/data/rows.json"));
}

#[test]
fn required_fields() {
    let mut missing_output = config(vec![InputEntry::Shorthand("lb1".into())]);
    missing_output.output_dir = None;
    assert_matches!(ConfigLoader::resolve_config(missing_output), Err(CollateError::ConfigParse(_)));

    assert_matches!(ConfigLoader::resolve_config(config(Vec::new())), Err(CollateError::ConfigParse(_)));

    let mut bad_target = config(vec![InputEntry::Shorthand("lb1".into())]);
    bad_target.target_name = Some("ab".to_string());
    assert_matches!(
        ConfigLoader::resolve_config(bad_target),
        Err(CollateError::InvalidTargetName(_))
    );
}

#[test]
fn resolve_reads_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("config.json")).unwrap();
    fs::write(
        &path,
        r#"{
            "base_dir": "/mnt",
            "output_dir": "out",
            "target_name": "Mpro",
            "inputs": ["lb1", {"dir": "lb2"}],
            "overrides": {"deprecations": {"XYZ999": "low resolution"}}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.inputs.len(), 2);
    assert_eq!(resolved.deprecations["XYZ999"], "low resolution");
    assert_eq!(resolved.expand(Utf8Path::new("/lb1/x.pdb")), Utf8PathBuf::from("/mnt/lb1/x.pdb"));
}

#[test]
fn missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.json")).unwrap();
    assert_matches!(ConfigLoader::resolve(Some(&path)), Err(CollateError::MissingConfig(_)));
}
