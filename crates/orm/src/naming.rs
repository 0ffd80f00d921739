//! Naming policy - entity types to tables, fields to columns
//!
//! Pure functions with no state. Every table carries the same canonical row
//! key column, `_id`, independent of how the entity names its identifier.

use crate::entity::{EntityDescriptor, EntityRegistry, FieldDescriptor, FieldRole};
use crate::error::{ModelError, ModelResult};

/// Canonical identifier column shared by every entity table
pub const ID_COLUMN: &str = "_id";

/// Suffix appended to foreign-key columns
pub const FOREIGN_KEY_SUFFIX: &str = "_id";

/// Table name for an entity: explicit override, else the snake_cased type name
pub fn table_name(descriptor: &EntityDescriptor) -> ModelResult<String> {
    if let Some(table) = descriptor.table_override() {
        return Ok(table.to_string());
    }
    if descriptor.name().is_empty() {
        return Err(ModelError::NameResolve(
            "entity descriptor carries no type name".to_string(),
        ));
    }
    Ok(camel_to_snake(descriptor.name()))
}

/// Table name for a registered entity, looked up by type name
pub fn table_name_of(registry: &EntityRegistry, entity: &str) -> ModelResult<String> {
    let descriptor = registry.get(entity).ok_or_else(|| {
        ModelError::NameResolve(format!("'{}' is not a registered entity", entity))
    })?;
    table_name(descriptor)
}

/// Column name for a field
///
/// An explicit override wins; the identifier always maps to `_id`; relation
/// fields get the `_id` suffix; everything else is snake_cased.
pub fn column_name(field: &FieldDescriptor) -> String {
    if let Some(column) = field.column_override() {
        return column.to_string();
    }
    match field.role() {
        FieldRole::Identifier => ID_COLUMN.to_string(),
        FieldRole::Relation(_) => foreign_key_column(field.name()),
        FieldRole::Column | FieldRole::Transient => camel_to_snake(field.name()),
    }
}

/// Identifier column of an entity, failing when it declares no identifier
pub fn id_column_name(descriptor: &EntityDescriptor) -> ModelResult<String> {
    match descriptor.identifier() {
        Some(_) => Ok(ID_COLUMN.to_string()),
        None => Err(ModelError::NameResolve(format!(
            "entity '{}' declares no identifier field",
            descriptor.name()
        ))),
    }
}

/// `<snake_name>_id`
pub fn foreign_key_column(name: &str) -> String {
    format!("{}{}", camel_to_snake(name), FOREIGN_KEY_SUFFIX)
}

/// Convert camelCase or PascalCase to snake_case, first character lowercased
pub fn camel_to_snake(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut previous: Option<char> = None;
    for (i, c) in value.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && previous != Some('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        previous = Some(c);
    }
    out
}

/// Convert snake_case back to camelCase
///
/// A trailing `_id` is stripped first, so foreign-key columns map back to
/// their relation field name. The identifier suffix is never restored.
pub fn snake_to_camel(value: &str) -> String {
    let stripped = match value.strip_suffix(FOREIGN_KEY_SUFFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => value,
    };

    let mut out = String::with_capacity(stripped.len());
    let mut upper_next = false;
    for (i, c) in stripped.chars().enumerate() {
        if c == '_' {
            upper_next = i > 0;
            continue;
        }
        if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
