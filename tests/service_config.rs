use std::sync::Mutex;

use tempfile::NamedTempFile;

use waste_sorter::config::ServiceConfig;
use waste_sorter::{MatchPolicy, WasteCategory};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WASTE_CONFIG",
        "WASTE_API_ADDR",
        "WASTE_MAX_BODY_BYTES",
        "WASTE_BACKEND",
        "WASTE_MODEL_PATH",
        "WASTE_LABELS_PATH",
        "WASTE_CONFIDENCE",
        "WASTE_MULTI_CONFIDENCE",
        "WASTE_CATEGORIES_PATH",
        "WASTE_MATCH_POLICY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "0.0.0.0:5001");
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.confidence, 0.25);
    assert_eq!(cfg.detector.multi_confidence, 0.3);
    assert_eq!(cfg.detector.input_size, 640);
    assert_eq!(cfg.categories.match_policy, MatchPolicy::TableOrder);
    assert!(cfg.categories.path.is_none());

    let resolver = cfg.build_resolver().expect("builtin resolver");
    assert_eq!(resolver.table().len(), 23);
    let registry = cfg.detector.build_registry().expect("stub registry");
    assert_eq!(registry.list(), vec!["stub".to_string()]);
    let default = registry.default_backend().expect("stub is the default");
    assert_eq!(default.lock().unwrap().name(), "stub");
    assert_eq!(registry.labels("stub").unwrap(), vec!["bottle"]);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut table = NamedTempFile::new().expect("temp table");
    std::io::Write::write_all(
        &mut table,
        br#"
[[entry]]
label = "pizza box"
category = "Check Material"
recommendation = "Recycle only if free of grease."

[[entry]]
label = "box"
category = "recyclable"
recommendation = "Flatten and recycle."
"#,
    )
    .expect("write table");

    let mut file = NamedTempFile::new().expect("temp config");
    let json = format!(
        r#"{{
            "api": {{ "addr": "127.0.0.1:9000", "max_body_bytes": 2048 }},
            "detector": {{ "backend": "none", "confidence": 0.4, "input_size": 320 }},
            "categories": {{ "path": "{}", "match_policy": "table_order" }}
        }}"#,
        table.path().display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WASTE_CONFIG", file.path());
    std::env::set_var("WASTE_MULTI_CONFIDENCE", "0.5");
    std::env::set_var("WASTE_MATCH_POLICY", "longest_key");

    let cfg = ServiceConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:9000");
    assert_eq!(cfg.max_body_bytes, 2048);
    assert_eq!(cfg.detector.backend, "none");
    assert_eq!(cfg.detector.confidence, 0.4);
    assert_eq!(cfg.detector.multi_confidence, 0.5);
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.categories.match_policy, MatchPolicy::LongestKey);

    let api = cfg.api_config();
    assert_eq!(api.detect_confidence, 0.4);
    assert_eq!(api.multi_confidence, 0.5);

    let resolver = cfg.build_resolver().expect("file resolver");
    assert_eq!(resolver.table().labels(), vec!["pizza box", "box"]);
    let entry = resolver.resolve("greasy pizza box");
    assert_eq!(entry.canonical_label, "pizza box");
    assert_eq!(entry.category, WasteCategory::CheckMaterial);
    assert_eq!(resolver.resolve("shoebox").category, WasteCategory::Recyclable);

    assert!(cfg.detector.build_registry().expect("empty registry").default_backend().is_none());

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("WASTE_CONFIDENCE", "1.5"),
        ("WASTE_API_ADDR", "not-an-address"),
        ("WASTE_BACKEND", "cuda"),
        ("WASTE_BACKEND", "tract"),
        ("WASTE_MATCH_POLICY", "random"),
        ("WASTE_MAX_BODY_BYTES", "lots"),
    ] {
        clear_env();
        std::env::set_var(key, value);
        assert!(ServiceConfig::load().is_err(), "{key}={value} should be rejected");
    }

    clear_env();
}
