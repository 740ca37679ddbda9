//! Validator - 권한/역할 이름과 config payload 검증
//!
//! 이름 규칙:
//! - `^[a-z0-9._-]+$`, 최대 255자
//! - 예약어 금지 (`null`, `undefined`, `true`, `false`, `yes`, `no`, `all`, `none`, `any`)
//! - 구분자(`.` `-` `_`) 연속 사용, 앞/뒤 구분자 금지
//!
//! config 규칙:
//! - object 또는 null
//! - 금지 키 (`__proto__`, `constructor`, `prototype`)
//! - 최대 깊이 5, 직렬화 크기 최대 65535 bytes
//! - schema 가 주어지면 required / properties.*.type 검사

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use warden_foundation::{Error, Result};

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_CONFIG_DEPTH: usize = 5;
pub const MAX_CONFIG_BYTES: usize = 65535;

pub const RESERVED_NAMES: &[&str] = &[
    "null",
    "undefined",
    "true",
    "false",
    "yes",
    "no",
    "all",
    "none",
    "any",
];

pub const FORBIDDEN_CONFIG_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

const SEPARATORS: &[char] = &['.', '-', '_'];

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static DISALLOWED_CHARS: OnceLock<Regex> = OnceLock::new();
static SEPARATOR_RUN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9._-]+$").expect("name pattern is valid"))
}

fn disallowed_chars() -> &'static Regex {
    DISALLOWED_CHARS.get_or_init(|| Regex::new(r"[^a-z0-9._-]").expect("char class is valid"))
}

fn separator_run() -> &'static Regex {
    SEPARATOR_RUN.get_or_init(|| Regex::new(r"[._-]{2,}").expect("separator run is valid"))
}

// ============================================================================
// Names
// ============================================================================

/// 이름 검증 대상
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Permission,
    Role,
}

impl NameKind {
    pub fn label(&self) -> &'static str {
        match self {
            NameKind::Permission => "Permission",
            NameKind::Role => "Role",
        }
    }
}

pub fn validate_name(name: &str, kind: NameKind) -> Result<()> {
    let label = kind.label();

    if name.is_empty() {
        return Err(name_error(format!("{} name cannot be empty.", label)));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(name_error(format!(
            "{} name cannot exceed {} characters.",
            label, MAX_NAME_LENGTH
        )));
    }

    if !name_pattern().is_match(name) {
        return Err(name_error(format!(
            "{} name can only contain lowercase letters, numbers, dots, dashes, and underscores. Given: '{}'",
            label, name
        )));
    }

    let lowered = name.to_ascii_lowercase();
    if RESERVED_NAMES.contains(&lowered.as_str()) {
        return Err(name_error(format!(
            "{} name '{}' is reserved and cannot be used.",
            label, name
        )));
    }

    if separator_run().is_match(name) {
        return Err(name_error(format!(
            "{} name cannot contain consecutive special characters.",
            label
        )));
    }

    if name.starts_with(SEPARATORS) || name.ends_with(SEPARATORS) {
        return Err(name_error(format!(
            "{} name cannot start or end with special characters.",
            label
        )));
    }

    Ok(())
}

pub fn validate_permission_name(name: &str) -> Result<()> {
    validate_name(name, NameKind::Permission)
}

pub fn validate_role_name(name: &str) -> Result<()> {
    validate_name(name, NameKind::Role)
}

/// 임의 문자열을 이름 규칙에 맞게 정리 (결과가 비어 있을 수 있음)
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.to_lowercase().replace(' ', "-");
    let stripped = disallowed_chars().replace_all(&lowered, "");
    let collapsed = separator_run().replace_all(&stripped, "-");
    collapsed.trim_matches(SEPARATORS).to_string()
}

fn name_error(reason: String) -> Error {
    Error::validation("name", reason)
}

// ============================================================================
// Config
// ============================================================================

/// config schema 의 필드 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// integer/number 는 JSON 숫자 전체를 허용
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Integer | FieldType::Number => value.is_number(),
            FieldType::String => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array | FieldType::Object => value.is_array() || value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// 단순 config schema (`required`, `properties.*.type`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn property(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.properties
            .insert(field.into(), FieldSchema { field_type });
        self
    }

    fn check(&self, config: &Map<String, Value>) -> Result<()> {
        for field in &self.required {
            if config.get(field).map_or(true, Value::is_null) {
                return Err(config_error(format!(
                    "Configuration missing required field: '{}'",
                    field
                )));
            }
        }

        for (key, value) in config {
            if let Some(schema) = self.properties.get(key) {
                if !schema.field_type.accepts(value) {
                    return Err(config_error(format!(
                        "Configuration field '{}' must be of type '{}', got '{}'",
                        key,
                        schema.field_type.as_str(),
                        json_type(value)
                    )));
                }
            }
        }

        Ok(())
    }
}

pub fn validate_config(config: &Value, schema: Option<&ConfigSchema>) -> Result<()> {
    let map = match config {
        Value::Null => return Ok(()),
        Value::Object(map) => map,
        _ => {
            return Err(config_error(
                "Configuration must be an object or null.".to_string(),
            ))
        }
    };

    if map.is_empty() {
        return Ok(());
    }

    if let Some(key) = map
        .keys()
        .find(|key| FORBIDDEN_CONFIG_KEYS.contains(&key.as_str()))
    {
        return Err(config_error(format!(
            "Configuration contains dangerous key: '{}'",
            key
        )));
    }

    if let Some(schema) = schema {
        schema.check(map)?;
    }

    if depth(config) > MAX_CONFIG_DEPTH {
        return Err(config_error(format!(
            "Configuration depth cannot exceed {} levels.",
            MAX_CONFIG_DEPTH
        )));
    }

    let size = serde_json::to_vec(config)?.len();
    if size > MAX_CONFIG_BYTES {
        return Err(config_error("Configuration size cannot exceed 64KB.".to_string()));
    }

    Ok(())
}

/// Option<Value> 용 편의 함수
pub fn validate_optional_config(config: Option<&Value>, schema: Option<&ConfigSchema>) -> Result<()> {
    match config {
        Some(config) => validate_config(config, schema),
        None => Ok(()),
    }
}

/// 컨테이너 깊이 (최상위 컨테이너 = 1, 스칼라 = 0)
fn depth(value: &Value) -> usize {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return 0,
    };
    1 + children.map(depth).max().unwrap_or(0)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn config_error(reason: String) -> Error {
    Error::validation("config", reason)
}
