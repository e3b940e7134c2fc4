//! pcg-config
//!
//! Layered YAML configuration:
//! - documents merge in order (earlier = base, later = override)
//! - the merged tree is rendered as canonical JSON and SHA-256 hashed so every
//!   allocation / report can carry the exact config it was computed with
//! - unused leaf keys are reported per command scope
//! - typed sections are extracted with serde; absent sections use defaults

mod consumption;

pub use consumption::{
    consumed_pointers_for_scope, report_unused_keys, ConfigScope, UnusedKeyPolicy,
    UnusedKeyReport,
};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Empty config (every section falls back to its defaults).
    pub fn empty() -> Result<Self> {
        load_layered_yaml_from_strings(&[])
    }

    /// Deserialize the subtree at `pointer` (e.g. `/allocation`).
    ///
    /// A missing subtree yields `T::default()`. Present-but-partial subtrees
    /// rely on `#[serde(default)]` on `T` for the missing fields.
    pub fn section<T>(&self, pointer: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.config_json.pointer(pointer) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(v) => serde_json::from_value(v.clone())
                .with_context(|| format!("invalid config section at {pointer}")),
        }
    }
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; it must not wipe the base layers.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default Map is BTreeMap-backed: keys serialize sorted.
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
