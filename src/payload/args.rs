//! Call arguments and Runner identity

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::PayloadError;
use remora_manifest::SHORT_ID_LEN;

/// One binding of a payload's declared parameters to values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallArguments(BTreeMap<String, Value>);

impl CallArguments {
    /// Bind `params` from `values`, taking each matched key out of `values`.
    /// Parameters with no value are bound to null.
    pub fn bind(params: &[String], values: &mut Map<String, Value>) -> Self {
        let bound = params
            .iter()
            .map(|param| (param.clone(), values.remove(param).unwrap_or(Value::Null)))
            .collect();
        Self(bound)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runner identity: SHA-256 hex of the RFC 8785 canonical JSON of the
    /// bindings, so key order never matters.
    pub fn identity(&self) -> Result<String, PayloadError> {
        let jcs = serde_json_canonicalizer::to_vec(&self.0)
            .map_err(|e| PayloadError::Canonicalization(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&jcs)))
    }

    pub fn short_identity(&self) -> Result<String, PayloadError> {
        let mut id = self.identity()?;
        id.truncate(SHORT_ID_LEN);
        Ok(id)
    }

    /// Positional shell arguments in declared order
    pub fn positional(&self, params: &[String]) -> Vec<String> {
        params
            .iter()
            .map(|p| self.0.get(p).map(shell_argument).unwrap_or_default())
            .collect()
    }
}

impl From<BTreeMap<String, Value>> for CallArguments {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Text passed to the shell for one argument value: strings verbatim, null
/// as the empty string, anything else as compact JSON.
pub fn shell_argument(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
