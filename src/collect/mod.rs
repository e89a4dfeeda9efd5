//! Parameter collection
//!
//! Builds the [`ParameterSet`] for a tool call along one of two paths:
//! - direct: a single JSON object supplied up front (`--params`)
//! - guided: one prompt per schema property, values coerced by declared type
//!
//! Collection is all-or-nothing. Any coercion failure, or a required property
//! left empty twice, aborts the whole attempt.

pub mod input;

use crate::core::classify::{ClassifiedError, ErrorCategory};
use crate::core::schema::{PropertySchema, PropertyType, SchemaNode};
use crate::core::ParameterSet;
use input::InputSource;
use serde_json::{Map, Number, Value as JsonValue};
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

/// Every message names the word "parameter" so message-based
/// classification agrees with [`CollectError::category`].
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Invalid parameters JSON '{input}': {reason}")]
    InvalidJson { input: String, reason: String },

    #[error("Invalid number for parameter '{name}': {input}")]
    InvalidNumber { name: String, input: String },

    #[error("Invalid JSON object for parameter '{name}': {reason}")]
    InvalidObject { name: String, reason: String },

    #[error("Invalid value for parameter '{name}': {input} (allowed: {allowed})")]
    NotInEnum {
        name: String,
        input: String,
        allowed: String,
    },

    #[error("Missing value for required parameter '{0}'")]
    RequiredMissing(String),

    #[error("Input closed before parameter collection finished")]
    InputClosed,

    #[error("I/O error while collecting parameters: {0}")]
    Io(#[from] io::Error),
}

impl CollectError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CollectError::RequiredMissing(_) => ErrorCategory::ParameterValidationRequiredMissing,
            _ => ErrorCategory::ParameterValidation,
        }
    }

    pub fn classified(&self) -> ClassifiedError {
        ClassifiedError::new(self.category(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;

/// Parse the direct-path JSON blob.
///
/// Empty input and `{}` mean "no parameters"; anything else must be a JSON
/// object, with no partial acceptance.
pub fn parse_direct(raw: &str) -> Result<ParameterSet> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        return Ok(ParameterSet::new());
    }

    serde_json::from_str::<ParameterSet>(trimmed).map_err(|e| CollectError::InvalidJson {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })
}

/// How a value was obtained, for the confirmation line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Typed,
    JsonArray,
    CommaSeparated,
}

/// Coerce one non-empty input line by the property's declared type
pub fn coerce(property: &PropertySchema, input: &str) -> Result<JsonValue> {
    coerce_with_origin(property, input).map(|(value, _)| value)
}

fn coerce_with_origin(property: &PropertySchema, input: &str) -> Result<(JsonValue, Origin)> {
    let invalid_number = || CollectError::InvalidNumber {
        name: property.name.clone(),
        input: input.to_string(),
    };

    let (value, origin) = match property.property_type {
        PropertyType::Number | PropertyType::Integer => {
            let num: f64 = input.trim().parse().map_err(|_| invalid_number())?;
            if !num.is_finite() {
                return Err(invalid_number());
            }
            let value = if property.property_type == PropertyType::Integer {
                let whole = num.trunc();
                // i64::MAX as f64 rounds up to 2^63, which is out of range
                if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
                    return Err(invalid_number());
                }
                JsonValue::from(whole as i64)
            } else {
                Number::from_f64(num)
                    .map(JsonValue::Number)
                    .ok_or_else(invalid_number)?
            };
            (value, Origin::Typed)
        }
        PropertyType::Boolean => {
            let truthy = matches!(
                input.trim().to_lowercase().as_str(),
                "true" | "yes" | "y" | "1"
            );
            (JsonValue::Bool(truthy), Origin::Typed)
        }
        PropertyType::Array => match serde_json::from_str::<Vec<JsonValue>>(input) {
            Ok(items) => (JsonValue::Array(items), Origin::JsonArray),
            Err(_) => {
                let pieces = input
                    .split(',')
                    .map(|piece| JsonValue::String(piece.trim().to_string()))
                    .collect();
                (JsonValue::Array(pieces), Origin::CommaSeparated)
            }
        },
        PropertyType::Object => {
            let obj = serde_json::from_str::<Map<String, JsonValue>>(input).map_err(|e| {
                CollectError::InvalidObject {
                    name: property.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            (JsonValue::Object(obj), Origin::Typed)
        }
        PropertyType::String => (JsonValue::String(input.to_string()), Origin::Typed),
    };

    check_enum(property, input, &value)?;
    Ok((value, origin))
}

fn check_enum(property: &PropertySchema, input: &str, value: &JsonValue) -> Result<()> {
    let Some(allowed) = property.enum_values.as_ref().filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    if allowed.iter().any(|candidate| enum_matches(candidate, value)) {
        return Ok(());
    }

    Err(CollectError::NotInEnum {
        name: property.name.clone(),
        input: input.to_string(),
        allowed: join_values(allowed),
    })
}

/// Numbers compare by value so `1` matches an enum entry of `1.0`
fn enum_matches(candidate: &JsonValue, value: &JsonValue) -> bool {
    match (candidate, value) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        _ => candidate == value,
    }
}

fn join_values(values: &[JsonValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prompt shown for one property: `name (description) [required] (type: T): `
pub fn prompt_text(property: &PropertySchema, required: bool) -> String {
    let description = property
        .description
        .as_ref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default();
    let marker = if required { "[required]" } else { "[optional]" };
    format!(
        "{}{} {} (type: {}): ",
        property.name, description, marker, property.property_type
    )
}

fn read_trimmed(
    input: &mut dyn InputSource,
    out: &mut dyn Write,
    prompt: &str,
) -> Result<String> {
    match input.read_line(prompt, out)? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(CollectError::InputClosed),
    }
}

/// Collect a parameter set interactively.
///
/// Properties are prompted in declaration order. A schema with no properties
/// falls back to a single free-form JSON entry.
pub fn collect_guided(
    schema: &SchemaNode,
    input: &mut dyn InputSource,
    out: &mut dyn Write,
) -> Result<ParameterSet> {
    if schema.has_no_properties() {
        return collect_free_form(input, out);
    }

    if schema.required.is_empty() {
        writeln!(out, "Schema indicates no required parameters")?;
    } else {
        writeln!(
            out,
            "Schema indicates required parameters: {}",
            schema.required.join(", ")
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Parameter input:")?;
    writeln!(out, "• Required parameters must have a value")?;
    writeln!(out, "• Optional parameters can be skipped by pressing Enter")?;
    writeln!(out)?;

    let mut params = ParameterSet::new();
    for property in &schema.properties {
        let required = schema.is_required(&property.name);

        if let Some(allowed) = property.enum_values.as_ref().filter(|v| !v.is_empty()) {
            writeln!(out, "    Allowed values: {}", join_values(allowed))?;
        }
        if let Some(default) = &property.default {
            writeln!(out, "    Default: {}", default)?;
        }

        let prompt = prompt_text(property, required);
        let mut line = read_trimmed(input, out, &prompt)?;

        if line.is_empty() {
            if !required {
                writeln!(out, "    ✓ Skipped (optional)")?;
                continue;
            }

            // exactly one second chance
            writeln!(out, "    This parameter is required. Please enter a value.")?;
            line = read_trimmed(input, out, &prompt)?;
            if line.is_empty() {
                return Err(CollectError::RequiredMissing(property.name.clone()));
            }
        }

        let (value, origin) = coerce_with_origin(property, &line)?;
        match origin {
            Origin::CommaSeparated => writeln!(out, "    ✓ Set to: {} (comma-separated)", value)?,
            Origin::JsonArray => writeln!(out, "    ✓ Set to: {} (JSON array)", value)?,
            Origin::Typed => writeln!(out, "    ✓ Set to: {}", value)?,
        }
        params.insert(property.name.clone(), value);
    }

    write_summary(&params, out)?;
    debug!("Collected {} parameters", params.len());
    Ok(params)
}

fn collect_free_form(input: &mut dyn InputSource, out: &mut dyn Write) -> Result<ParameterSet> {
    writeln!(out, "No structured parameters declared for this tool.")?;
    let line = read_trimmed(
        input,
        out,
        "Enter parameters as JSON (or press Enter for no parameters): ",
    )?;
    let params = parse_direct(&line)?;
    write_summary(&params, out)?;
    Ok(params)
}

fn write_summary(params: &ParameterSet, out: &mut dyn Write) -> io::Result<()> {
    if params.is_empty() {
        writeln!(out, "\n📋 No parameters provided")?;
        return Ok(());
    }

    writeln!(out, "\n📋 Parameter summary:")?;
    for (key, value) in params {
        writeln!(out, "  • {}: {}", key, value)?;
    }
    Ok(())
}
