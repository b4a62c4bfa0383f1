use milkwarp::catalog::{PresetCatalog, load_curated};
use milkwarp::error::CatalogError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

const SMALL: &str = r#"{
  "version": 1,
  "count": 3,
  "presets": [
    { "name": "Alpha", "baseVals": { "decay": 0.9, "Zoom": "1.02", "bogus": null } },
    { "name": "Beta", "baseVals": { "wave_mode": 2 }, "shapes": null, "waves": [
      { "baseVals": { "enabled": 1, "samples": 64 }, "point_eqs_str": "x = sample;" },
      { "baseVals": { "enabled": 0 } }
    ] },
    { "name": "Gamma", "frame_eqs_str": "zoom = 1.01;" }
  ]
}"#;

// ── Parsing ─────────────────────────────────────────────────────────────────

#[test]
fn builtin_catalog_loads() {
    let c = PresetCatalog::builtin().unwrap();
    assert_eq!(c.len(), 8);
    assert!(c.names().any(|n| n == "Slow Tunnel"));
    assert!(c.presets.iter().all(|p| !p.name.is_empty()));
}

#[test]
fn base_values_are_lenient() {
    let c = PresetCatalog::from_json_str(SMALL).unwrap();
    let alpha = c.get(0).unwrap();
    assert_eq!(alpha.base_vals.get("decay"), Some(&0.9));
    assert_eq!(alpha.base_vals.get("zoom"), Some(&1.02));
    assert!(!alpha.base_vals.contains_key("bogus"));
}

#[test]
fn null_lists_read_as_empty() {
    let c = PresetCatalog::from_json_str(SMALL).unwrap();
    let beta = c.get(1).unwrap();
    assert!(beta.shapes.is_empty());
    assert_eq!(beta.waves.len(), 2);
    assert!(beta.waves[0].enabled());
    assert!(!beta.waves[1].enabled());
    assert_eq!(beta.waves[0].point_eqs_str.as_deref(), Some("x = sample;"));
}

#[test]
fn empty_catalog_is_an_error() {
    let err = PresetCatalog::from_json_str(r#"{ "presets": [] }"#).unwrap_err();
    assert!(matches!(err, CatalogError::Empty));
}

#[test]
fn malformed_json_is_an_error() {
    let err = PresetCatalog::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, CatalogError::Json(_)));
}

#[test]
fn mismatched_count_still_loads() {
    let c = PresetCatalog::from_json_str(r#"{ "count": 5, "presets": [ { "name": "Only" } ] }"#)
        .unwrap();
    assert_eq!(c.len(), 1);
}

// ── Lookup ──────────────────────────────────────────────────────────────────

#[test]
fn position_prefers_exact_then_case_insensitive() {
    let c = PresetCatalog::from_json_str(SMALL).unwrap();
    assert_eq!(c.position("Beta"), Some(1));
    assert_eq!(c.position("gamma"), Some(2));
    assert_eq!(c.position("Delta"), None);
}

#[test]
fn curated_list_filters_and_orders() {
    let mut c = PresetCatalog::from_json_str(SMALL).unwrap();
    let names = ["Gamma", "missing", "alpha", "Gamma"].map(String::from);
    c.apply_curated(&names).unwrap();
    assert_eq!(c.names().collect::<Vec<_>>(), vec!["Gamma", "Alpha"]);
    assert_eq!(c.count, 2);
}

#[test]
fn curated_list_with_no_matches_is_an_error() {
    let mut c = PresetCatalog::from_json_str(SMALL).unwrap();
    let err = c.apply_curated(&["nope".to_string()]).unwrap_err();
    assert!(matches!(err, CatalogError::Empty));
    assert_eq!(c.len(), 3);
}

// ── Files ───────────────────────────────────────────────────────────────────

#[test]
fn load_reads_a_file() {
    let f = write_temp(SMALL);
    let c = PresetCatalog::load(f.path()).unwrap();
    assert_eq!(c.len(), 3);
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = PresetCatalog::load(&path).unwrap_err();
    match err {
        CatalogError::Io { path: p, .. } => assert_eq!(p, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_applies_the_curated_file() {
    let catalog = write_temp(SMALL);
    let curated = write_temp(r#"["Beta"]"#);
    let c = PresetCatalog::open(Some(catalog.path()), Some(curated.path())).unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(0).unwrap().name, "Beta");
}

#[test]
fn open_without_a_path_uses_the_builtin_catalog() {
    let c = PresetCatalog::open(None, None).unwrap();
    assert_eq!(c.len(), PresetCatalog::builtin().unwrap().len());
}

#[test]
fn curated_file_must_be_a_name_list() {
    let f = write_temp(r#"{ "names": [] }"#);
    assert!(load_curated(f.path()).is_err());
}
