//! Shell function payloads

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::{Payload, PayloadError, RESERVED_NAMES};
use crate::shell::is_identifier;

/// A named shell function whose declared parameters are bound, in order,
/// from its positional arguments.
///
/// Whatever the body prints on stdout (trailing newlines trimmed) is its
/// return value; a nonzero exit status is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellFunction {
    name: String,
    params: Vec<String>,
    body: String,
}

impl ShellFunction {
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        body: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(PayloadError::InvalidName(name));
        }

        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for param in &params {
            if !is_identifier(param) {
                return Err(PayloadError::InvalidParam(param.clone()));
            }
            if RESERVED_NAMES.contains(&param.as_str()) {
                return Err(PayloadError::ReservedParam(param.clone()));
            }
            if !seen.insert(param.as_str()) {
                return Err(PayloadError::DuplicateParam(param.clone()));
            }
        }

        Ok(Self {
            name,
            params,
            body: body.into(),
        })
    }

    /// Read the function body from a file
    pub fn from_file(
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        path: &Path,
    ) -> Result<Self, PayloadError> {
        let body = fs::read_to_string(path)?;
        Self::new(name, params, body)
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Payload for ShellFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> String {
        let mut source = format!("{}() {{\n", self.name);
        for (idx, param) in self.params.iter().enumerate() {
            source.push_str(&format!("    local {}=\"${{{}}}\"\n", param, idx + 1));
        }
        source.push_str(&self.body);
        if !self.body.ends_with('\n') {
            source.push('\n');
        }
        source.push_str("}\n");
        source
    }

    fn declared_params(&self) -> &[String] {
        &self.params
    }
}
