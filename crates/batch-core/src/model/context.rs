use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mapa clave/valor que sobrevive entre commits (contexto de step) o entre
/// steps de una misma ejecución (contexto de job). Se pasa explícitamente,
/// nunca vive en estado global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    entries: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Falla si el valor no es un objeto JSON.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn put<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        let v = serde_json::to_value(value).unwrap_or(Value::Null);
        self.entries.insert(key.into(), v);
    }

    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.entries.get(key).and_then(Value::as_u64)
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Copia en `target` las claves indicadas que existan en este contexto.
    pub fn promote_into(&self, keys: &[String], target: &mut ExecutionContext) {
        for k in keys {
            if let Some(v) = self.entries.get(k) {
                target.entries.insert(k.clone(), v.clone());
            }
        }
    }
}
