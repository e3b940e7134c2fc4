use pcg_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigScope, UnusedKeyPolicy};

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
allocation:
  max_position_weight: 0.3
governance:
  limit_reduction_alert_ratio: 0.75
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();

    let report = report_unused_keys(
        ConfigScope::Allocate,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/governance/limit_reduction_alert_ratio".to_string()]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
risk:
  confidence: 0.95
typo_section:
  foo: 1
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(ConfigScope::Risk, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    assert!(format!("{err:#}").contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn nested_band_tables_are_consumed_by_governance() {
    let yaml = r#"
governance:
  volatility_bands:
    bands:
      - label: low
        upper_bound: 12.0
        multiplier: 1.2
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(
        ConfigScope::Governance,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap();
    assert!(report.is_clean());
}
