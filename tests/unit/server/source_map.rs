use super::*;

#[test]
fn loads_and_caches_maps() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bundle.js.map"), r#"{"version":3}"#).unwrap();

    let provider = SourceMapProvider::for_root(dir.path());
    let map = provider.load("bundle.js").unwrap().unwrap();
    assert_eq!(map.as_str(), r#"{"version":3}"#);

    std::fs::remove_file(dir.path().join("bundle.js.map")).unwrap();
    assert!(provider.load("bundle.js").unwrap().is_some());
    assert_eq!(provider.cached_len(), 1);
}

#[test]
fn missing_map_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SourceMapProvider::for_root(dir.path());
    assert!(provider.load("vendor.js").unwrap().is_none());
}

#[test]
fn remote_bundles_have_no_maps() {
    assert!(SourceMapProvider::empty().load("bundle.js").unwrap().is_none());
}

#[test]
fn rejects_escaping_paths() {
    let dir = tempfile::tempdir().unwrap();
    let provider = SourceMapProvider::for_root(dir.path());
    assert!(provider.load("../bundle.js").is_err());
}
