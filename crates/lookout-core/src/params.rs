//! Typed check parameters.
//!
//! Every check module declares a [`ParamSchema`]: the parameter names it
//! accepts, the type each one must have, and optional defaults. Values
//! coming from the checks file or from a request query string are cast
//! against that schema once, when the check is built, so a check body only
//! ever sees values of the declared type.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Expected type of a check parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    StrList,
    IntList,
    /// Object whose values are all strings (e.g. HTTP headers).
    StrMap,
    /// Any JSON value, passed through untouched.
    Json,
}

impl ParamKind {
    /// Human-readable name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ParamKind::Str => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "float",
            ParamKind::Bool => "boolean",
            ParamKind::StrList => "list of strings",
            ParamKind::IntList => "list of integers",
            ParamKind::StrMap => "map of strings",
            ParamKind::Json => "json",
        }
    }

    /// Cast a value to this kind, or `None` if it is not convertible.
    ///
    /// Strings are parsed into numbers and booleans, and comma-separated
    /// strings are split into lists, so that query-string overrides can
    /// target any parameter type.
    pub fn cast(&self, value: &Value) -> Option<Value> {
        match self {
            ParamKind::Str => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            ParamKind::Int => match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(Value::from(i))
                    } else {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| Value::from(f as i64))
                    }
                }
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            ParamKind::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
                _ => None,
            },
            ParamKind::Bool => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(Value::Bool(false)),
                    Some(1) => Some(Value::Bool(true)),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                    "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ParamKind::StrList => cast_list(value, ParamKind::Str),
            ParamKind::IntList => cast_list(value, ParamKind::Int),
            ParamKind::StrMap => match value {
                Value::Object(map) => {
                    let mut out = Map::new();
                    for (k, v) in map {
                        out.insert(k.clone(), ParamKind::Str.cast(v)?);
                    }
                    Some(Value::Object(out))
                }
                Value::String(s) => {
                    let parsed: Value = serde_json::from_str(s).ok()?;
                    match parsed {
                        Value::Object(_) => ParamKind::StrMap.cast(&parsed),
                        _ => None,
                    }
                }
                _ => None,
            },
            ParamKind::Json => Some(value.clone()),
        }
    }
}

fn cast_list(value: &Value, item: ParamKind) -> Option<Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| item.cast(v))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| item.cast(&Value::String(part.to_string())))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        _ => None,
    }
}

/// Declaration of a single parameter accepted by a check module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Value used when configuration does not provide one. `None` means required.
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, default: impl Into<Value>) -> Self {
        Self {
            name,
            kind,
            default: Some(default.into()),
        }
    }
}

/// The full set of parameters a check module accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Cast a single value against the declared type of `name`.
    pub fn cast(&self, module: &str, name: &str, value: &Value) -> ConfigResult<Value> {
        let spec = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownParameter {
                module: module.to_string(),
                param: name.to_string(),
            })?;
        spec.kind
            .cast(value)
            .ok_or_else(|| ConfigError::InvalidValue {
                param: name.to_string(),
                expected: spec.kind.label(),
                value: value.to_string(),
            })
    }

    /// Validate supplied values and fill in defaults.
    ///
    /// Unknown names, uncastable values and missing required parameters are
    /// all errors.
    pub fn resolve(&self, module: &str, supplied: &BTreeMap<String, Value>) -> ConfigResult<Params> {
        let mut params = Params::default();
        for (name, value) in supplied {
            let cast = self.cast(module, name, value)?;
            params.insert(name.clone(), cast);
        }
        for spec in &self.specs {
            if params.get(spec.name).is_some() {
                continue;
            }
            match &spec.default {
                Some(default) => params.insert(spec.name.to_string(), default.clone()),
                None => {
                    return Err(ConfigError::MissingParameter {
                        module: module.to_string(),
                        param: spec.name.to_string(),
                    });
                }
            }
        }
        Ok(params)
    }
}

/// Resolved, typed parameter values of a check, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: String, value: Value) {
        self.0.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Keep only the named parameters.
    pub fn subset(&self, names: &[&str]) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(k, _)| names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// `name:value` pairs joined with commas, in name order. Values are
    /// JSON-encoded so distinct parameter sets never share a fingerprint.
    pub fn fingerprint(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn str(&self, name: &str) -> ConfigResult<&str> {
        self.typed(name, ParamKind::Str, Value::as_str)
    }

    pub fn int(&self, name: &str) -> ConfigResult<i64> {
        self.typed(name, ParamKind::Int, Value::as_i64)
    }

    pub fn float(&self, name: &str) -> ConfigResult<f64> {
        self.typed(name, ParamKind::Float, Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> ConfigResult<bool> {
        self.typed(name, ParamKind::Bool, Value::as_bool)
    }

    pub fn str_list(&self, name: &str) -> ConfigResult<Vec<String>> {
        self.typed(name, ParamKind::StrList, |v| {
            v.as_array()?
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    pub fn str_map(&self, name: &str) -> ConfigResult<BTreeMap<String, String>> {
        self.typed(name, ParamKind::StrMap, |v| {
            v.as_object()?
                .iter()
                .map(|(k, item)| item.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        kind: ParamKind,
        read: impl Fn(&'a Value) -> Option<T>,
    ) -> ConfigResult<T> {
        let value = self.0.get(name).ok_or_else(|| ConfigError::MissingParameter {
            module: String::new(),
            param: name.to_string(),
        })?;
        read(value).ok_or_else(|| ConfigError::InvalidValue {
            param: name.to_string(),
            expected: kind.label(),
            value: value.to_string(),
        })
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Params(iter.into_iter().collect())
    }
}
