use super::*;

#[test]
fn code_mapping() {
    assert_eq!(AppError::unsupported("decimal").code_str(), "unsupported_type");
    assert_eq!(AppError::materialization("disk full").code_str(), "materialization_error");
    assert_eq!(AppError::validation("function not allowed").code_str(), "validation_error");
    assert_eq!(AppError::execution("exit status: 1").code_str(), "execution_error");
    assert_eq!(AppError::decode("eof").code_str(), "decode_error");
    assert_eq!(AppError::config("bad format").code_str(), "config_error");
}

#[test]
fn display_carries_code_and_detail() {
    let err = AppError::SchemaConflict {
        group: "A".into(),
        column: "v".into(),
        left: "float64".into(),
        right: "string".into(),
    };
    let text = err.to_string();
    assert!(text.starts_with("schema_conflict:"));
    assert!(text.contains("'v'"));
    assert!(text.contains("float64"));
    assert_eq!(err.message(), "column 'v' in group 'A' is float64 in one frame and string in another");
}

#[test]
fn fatal_classification() {
    assert!(AppError::unsupported("x").is_fatal());
    assert!(AppError::validation("x").is_fatal());
    assert!(!AppError::execution("x").is_fatal());
    assert!(!AppError::materialization("x").is_fatal());
}

#[test]
fn anyhow_roundtrip_keeps_variant() {
    let wrapped: anyhow::Error = AppError::validation("table names with . not allowed: main.t").into();
    let back: AppError = wrapped.into();
    assert_eq!(back, AppError::validation("table names with . not allowed: main.t"));

    let plain: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(plain.code_str(), "execution_error");
}

#[test]
fn serializes_with_type_tag() {
    let v = serde_json::to_value(AppError::execution("Parser Error")).unwrap();
    assert_eq!(v["type"], "execution");
    assert_eq!(v["message"], "Parser Error");
}
