//! Declarative request validation specs for command handlers.
//!
//! A handler publishes an [`RpcSpec`]: per-field requirement lists checked
//! against the parsed request body before the handler runs. Deprecated
//! fields are accepted and reported as warnings; admin-only fields are
//! rejected with their fixed error message.

use serde_json::Value;

use crate::error::{Error, Result};

/// XRPL base58 alphabet used by classic account addresses.
const ACCOUNT_ALPHABET: &str = "rpshnaf39wBUDNEGHJKLM4PQRST7VWXYZ2bcdeCg65jkm8oFqi1tuvAxyz";

/// A single requirement on one request field.
#[derive(Debug, Clone)]
pub enum Requirement {
    /// The field must be present.
    Required,
    /// The field, when present, must be a JSON string.
    TypeString,
    /// The field, when present, must be an unsigned 32-bit integer.
    TypeU32,
    /// The field, when present, must be a boolean.
    TypeBool,
    /// The field must hold a classic account address.
    AccountAddress,
    /// The field must hold a 256-bit value as 64 hex characters.
    Hex256,
    /// The field must hold a ledger index: an integer or `"validated"`.
    LedgerIndex,
    /// The field is obsolete: accepted, ignored, and reported as a warning.
    Deprecated,
    /// The field belongs to an admin-only surface this service does not
    /// expose; its presence is rejected with the fixed message.
    NotSupported {
        /// The fixed rejection message.
        message: &'static str,
    },
}

/// Requirements for one field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    field: &'static str,
    requirements: Vec<Requirement>,
}

impl FieldSpec {
    /// Creates a field spec.
    pub fn new(field: &'static str, requirements: impl Into<Vec<Requirement>>) -> Self {
        Self { field, requirements: requirements.into() }
    }
}

/// The full request spec of one command.
#[derive(Debug, Clone, Default)]
pub struct RpcSpec {
    fields: Vec<FieldSpec>,
}

impl RpcSpec {
    /// Creates a spec from field entries.
    pub fn new(fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        Self { fields: fields.into_iter().collect() }
    }

    /// Validates a parsed request body.
    ///
    /// Returns warnings for deprecated fields on success, or the first
    /// violation as a [`Error::Validation`].
    pub fn validate(&self, request: &Value) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for spec in &self.fields {
            let value = request.get(spec.field);
            for requirement in &spec.requirements {
                check(spec.field, requirement, value, &mut warnings)?;
            }
        }

        Ok(warnings)
    }
}

fn check(
    field: &str,
    requirement: &Requirement,
    value: Option<&Value>,
    warnings: &mut Vec<String>,
) -> Result<()> {
    // Apart from Required, requirements only constrain present fields.
    let Some(value) = value else {
        if matches!(requirement, Requirement::Required) {
            return fail(field, "is required");
        }
        return Ok(());
    };

    match requirement {
        Requirement::Required => Ok(()),
        Requirement::TypeString => {
            if value.is_string() { Ok(()) } else { fail(field, "must be a string") }
        },
        Requirement::TypeU32 => {
            match value.as_u64() {
                Some(n) if u32::try_from(n).is_ok() => Ok(()),
                _ => fail(field, "must be an unsigned 32-bit integer"),
            }
        },
        Requirement::TypeBool => {
            if value.is_boolean() { Ok(()) } else { fail(field, "must be a boolean") }
        },
        Requirement::AccountAddress => {
            let valid = value.as_str().is_some_and(|address| {
                (25..=35).contains(&address.len())
                    && address.starts_with('r')
                    && address.chars().all(|c| ACCOUNT_ALPHABET.contains(c))
            });
            if valid { Ok(()) } else { fail(field, "is not a valid account address") }
        },
        Requirement::Hex256 => {
            let valid = value
                .as_str()
                .is_some_and(|s| s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()));
            if valid { Ok(()) } else { fail(field, "is not a 256-bit hex string") }
        },
        Requirement::LedgerIndex => {
            let valid = match value {
                Value::Number(n) => n.as_u64().is_some_and(|n| u32::try_from(n).is_ok()),
                Value::String(s) => s == "validated",
                _ => false,
            };
            if valid { Ok(()) } else { fail(field, "is not a valid ledger index") }
        },
        Requirement::Deprecated => {
            warnings.push(format!("Field '{field}' is deprecated and ignored"));
            Ok(())
        },
        Requirement::NotSupported { message } => {
            Err(Error::Validation { message: (*message).to_owned() })
        },
    }
}

fn fail(field: &str, reason: &str) -> Result<()> {
    Err(Error::Validation { message: format!("Field '{field}' {reason}") })
}
