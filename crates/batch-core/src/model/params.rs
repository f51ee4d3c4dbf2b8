//! Parámetros de job.
//!
//! `JobParameters` es un mapa ordenado (orden de inserción) nombre -> valor
//! tipado. La igualdad compara todos los pares sin importar el orden. La
//! identidad de una `JobInstance` usa sólo los parámetros marcados como
//! identificadores, reducidos a un `job_key` estable (hash del JSON
//! canónico).

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::BatchError;
use crate::hashing::hash_value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::String(s) => f.write_str(s),
            ParameterValue::Long(l) => write!(f, "{l}"),
            ParameterValue::Double(d) => write!(f, "{d}"),
            ParameterValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub value: ParameterValue,
    pub identifying: bool,
}

impl JobParameter {
    pub fn identifying(value: ParameterValue) -> Self {
        Self { value, identifying: true }
    }

    pub fn non_identifying(value: ParameterValue) -> Self {
        Self { value, identifying: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    params: IndexMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, parameter: JobParameter) -> Self {
        self.params.insert(name.into(), parameter);
        self
    }

    pub fn with_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, JobParameter::identifying(ParameterValue::String(value.into())))
    }

    pub fn with_long(self, name: impl Into<String>, value: i64) -> Self {
        self.with(name, JobParameter::identifying(ParameterValue::Long(value)))
    }

    pub fn with_double(self, name: impl Into<String>, value: f64) -> Self {
        self.with(name, JobParameter::identifying(ParameterValue::Double(value)))
    }

    pub fn with_date(self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.with(name, JobParameter::identifying(ParameterValue::Date(value)))
    }

    pub fn insert(&mut self, name: impl Into<String>, parameter: JobParameter) {
        self.params.insert(name.into(), parameter);
    }

    pub fn get(&self, name: &str) -> Option<&JobParameter> {
        self.params.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.params.get(name).map(|p| &p.value) {
            Some(ParameterValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        match self.params.get(name).map(|p| &p.value) {
            Some(ParameterValue::Long(l)) => Some(*l),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.params.get(name).map(|p| &p.value) {
            Some(ParameterValue::Double(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn get_date(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.params.get(name).map(|p| &p.value) {
            Some(ParameterValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobParameter)> {
        self.params.iter()
    }

    /// Subconjunto de parámetros identificadores (define la `JobInstance`).
    pub fn identifying(&self) -> JobParameters {
        let params = self.params
                         .iter()
                         .filter(|(_, p)| p.identifying)
                         .map(|(k, p)| (k.clone(), p.clone()))
                         .collect();
        JobParameters { params }
    }

    /// Clave estable de la instancia: hash del JSON canónico de los
    /// parámetros identificadores. Independiente del orden de inserción.
    pub fn job_key(&self) -> String {
        let mut map = Map::new();
        for (name, p) in self.params.iter().filter(|(_, p)| p.identifying) {
            map.insert(name.clone(), json!(p.value));
        }
        hash_value(&Value::Object(map))
    }

    /// Parsea pares `nombre(tipo)=valor`; un `-` inicial marca el parámetro
    /// como no identificador. Tipos: string (defecto), long, double, date.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<JobParameters, BatchError> {
        let mut out = JobParameters::new();
        for raw in pairs {
            let (name, parameter) = parse_pair(raw.as_ref())?;
            out.insert(name, parameter);
        }
        Ok(out)
    }
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.params.iter().map(|(k, p)| format!("{k}={}", p.value)).collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}

fn parse_pair(raw: &str) -> Result<(String, JobParameter), BatchError> {
    let invalid = |why: &str| BatchError::Configuration(format!("invalid job parameter '{raw}': {why}"));
    let (lhs, value) = raw.split_once('=').ok_or_else(|| invalid("expected name=value"))?;
    let (identifying, lhs) = match lhs.strip_prefix('-') {
        Some(rest) => (false, rest),
        None => (true, lhs),
    };
    let (name, kind) = match lhs.split_once('(') {
        Some((name, rest)) => (name, rest.strip_suffix(')').ok_or_else(|| invalid("unclosed type"))?),
        None => (lhs, "string"),
    };
    if name.trim().is_empty() {
        return Err(invalid("empty name"));
    }
    let value = match kind.to_ascii_lowercase().as_str() {
        "string" => ParameterValue::String(value.to_string()),
        "long" => ParameterValue::Long(value.parse().map_err(|_| invalid("not a long"))?),
        "double" => ParameterValue::Double(value.parse().map_err(|_| invalid("not a double"))?),
        "date" => ParameterValue::Date(parse_date(value).ok_or_else(|| invalid("not a date"))?),
        other => return Err(invalid(&format!("unknown type {other}"))),
    };
    Ok((name.trim().to_string(), JobParameter { value, identifying }))
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
}
