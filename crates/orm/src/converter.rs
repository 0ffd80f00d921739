//! Row <-> entity conversion
//!
//! Rows come back from the executor as [`DatabaseRow`]s and are turned into
//! [`ResultSet`]s keyed by column name. Entities travel as JSON object bags
//! keyed by field name; [`EntityConverter`] moves values between the two,
//! coercing per declared [`FieldType`].

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::backends::{DatabaseRow, DatabaseValue};
use crate::entity::{Entity, EntityDescriptor, FieldRole, FieldType};
use crate::error::{ModelError, ModelResult};
use crate::naming::{self, ID_COLUMN};

/// Separator between a join alias and a column in eager SELECT lists
pub const ALIAS_SEPARATOR: &str = "__";

/// One column of a materialized row
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    /// Insertion index within the owning result set
    pub index: usize,
    pub declared_type: Option<FieldType>,
    pub value: DatabaseValue,
    /// Field the column was read for, if any
    pub field: Option<String>,
}

/// Columns of one row, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: HashMap<String, ResultColumn>,
    next_index: usize,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every column of a row, untyped
    pub fn from_row(row: &DatabaseRow) -> Self {
        let mut result = Self::new();
        for (column, value) in row.iter() {
            result.insert(column, None, value.clone(), None);
        }
        result
    }

    /// Insert a column; re-inserting a name keeps its original position
    pub fn insert(
        &mut self,
        column: impl Into<String>,
        declared_type: Option<FieldType>,
        value: DatabaseValue,
        field: Option<String>,
    ) {
        let column = column.into();
        let index = match self.columns.get(&column) {
            Some(existing) => existing.index,
            None => {
                self.next_index += 1;
                self.next_index
            }
        };
        self.columns.insert(
            column,
            ResultColumn {
                index,
                declared_type,
                value,
                field,
            },
        );
    }

    pub fn get(&self, column: &str) -> Option<&ResultColumn> {
        self.columns.get(column)
    }

    pub fn value(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns.get(column).map(|c| &c.value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResultColumn)> {
        let mut columns: Vec<(&str, &ResultColumn)> = self
            .columns
            .iter()
            .map(|(name, column)| (name.as_str(), column))
            .collect();
        columns.sort_by_key(|(_, column)| column.index);
        columns.into_iter()
    }

    /// Row identifier, when present and assigned
    pub fn id(&self) -> Option<i64> {
        self.value(ID_COLUMN)
            .and_then(DatabaseValue::as_i64)
            .filter(|id| *id > 0)
    }

    /// Raw column bag as a JSON object
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(name, column)| (name.to_string(), column.value.to_json()))
                .collect(),
        )
    }
}

/// Converts between rows, result sets and entity objects
pub struct EntityConverter;

impl EntityConverter {
    /// Pick an entity's persisted columns out of a row
    ///
    /// With a `prefix`, columns are looked up as `<prefix>__<column>`.
    pub fn to_result_set(descriptor: &EntityDescriptor, row: &DatabaseRow, prefix: Option<&str>) -> ResultSet {
        let mut result = ResultSet::new();
        for field in descriptor.fields().iter().filter(|f| f.is_persisted()) {
            let column = naming::column_name(field);
            let key = match prefix {
                Some(prefix) => format!("{}{}{}", prefix, ALIAS_SEPARATOR, column),
                None => column.clone(),
            };
            if let Some(value) = row.get(&key) {
                result.insert(
                    column,
                    Some(field.field_type()),
                    value.clone(),
                    Some(field.name().to_string()),
                );
            }
        }
        result
    }

    /// Build the scalar part of an entity object from a result set
    ///
    /// Relation fields are left for the caller to populate.
    pub fn to_entity_map(descriptor: &EntityDescriptor, result: &ResultSet) -> ModelResult<Map<String, JsonValue>> {
        let mut object = Map::new();
        for field in descriptor.fields() {
            match field.role() {
                FieldRole::Identifier => {
                    let id = result.id().map(JsonValue::from).unwrap_or(JsonValue::Null);
                    object.insert(field.name().to_string(), id);
                }
                FieldRole::Column => {
                    let column = naming::column_name(field);
                    if let Some(value) = result.value(&column) {
                        let json = Self::coerce_to_json(field.field_type(), field.name(), value)?;
                        object.insert(field.name().to_string(), json);
                    }
                }
                FieldRole::Transient | FieldRole::Relation(_) => {}
            }
        }
        Ok(object)
    }

    /// Column values for the identifier and scalar fields of an object
    ///
    /// The identifier is only included when assigned; owning relation keys
    /// are supplied by the store cascade.
    pub fn to_column_values(
        descriptor: &EntityDescriptor,
        object: &Map<String, JsonValue>,
    ) -> ModelResult<Vec<(String, DatabaseValue)>> {
        let mut values = Vec::new();
        for field in descriptor.fields() {
            match field.role() {
                FieldRole::Identifier => {
                    if let Some(id) = Self::identifier_of(descriptor, object) {
                        values.push((ID_COLUMN.to_string(), DatabaseValue::Integer(id)));
                    }
                }
                FieldRole::Column => {
                    let value = object.get(field.name()).unwrap_or(&JsonValue::Null);
                    values.push((
                        naming::column_name(field),
                        Self::coerce_to_db(field.field_type(), field.name(), value)?,
                    ));
                }
                FieldRole::Transient | FieldRole::Relation(_) => {}
            }
        }
        Ok(values)
    }

    /// Assigned identifier of an object; zero and null mean unassigned
    pub fn identifier_of(descriptor: &EntityDescriptor, object: &Map<String, JsonValue>) -> Option<i64> {
        let field = descriptor.identifier()?;
        object
            .get(field.name())
            .and_then(json_i64)
            .filter(|id| *id > 0)
    }

    pub fn set_identifier(descriptor: &EntityDescriptor, object: &mut Map<String, JsonValue>, id: i64) {
        if let Some(field) = descriptor.identifier() {
            object.insert(field.name().to_string(), JsonValue::from(id));
        }
    }

    /// An object carrying only the identifier
    pub fn stub(descriptor: &EntityDescriptor, id: i64) -> JsonValue {
        let mut object = Map::new();
        Self::set_identifier(descriptor, &mut object, id);
        JsonValue::Object(object)
    }

    /// Coerce a field value to its column representation
    pub fn coerce_to_db(field_type: FieldType, field: &str, value: &JsonValue) -> ModelResult<DatabaseValue> {
        if value.is_null() {
            return Ok(DatabaseValue::Null);
        }
        let mismatch = || ModelError::conversion(field, format!("cannot store {} as {:?}", value, field_type));

        match field_type {
            FieldType::Integer | FieldType::Entity => json_i64(value).map(DatabaseValue::Integer).ok_or_else(mismatch),
            FieldType::Real => value.as_f64().map(DatabaseValue::Real).ok_or_else(mismatch),
            FieldType::Boolean => match value {
                JsonValue::Bool(b) => Ok(DatabaseValue::from(*b)),
                JsonValue::Number(n) => n.as_i64().map(|i| DatabaseValue::from(i != 0)).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            FieldType::Decimal => match value {
                JsonValue::Number(n) => Ok(match n.as_i64() {
                    Some(i) => DatabaseValue::Integer(i),
                    None => DatabaseValue::Real(n.as_f64().unwrap_or_default()),
                }),
                JsonValue::String(s) if s.trim().parse::<f64>().is_ok() => Ok(DatabaseValue::Text(s.trim().to_string())),
                _ => Err(mismatch()),
            },
            FieldType::Text => match value {
                JsonValue::String(s) => Ok(DatabaseValue::Text(s.clone())),
                JsonValue::Number(n) => Ok(DatabaseValue::Text(n.to_string())),
                JsonValue::Bool(b) => Ok(DatabaseValue::Text(b.to_string())),
                _ => Err(mismatch()),
            },
            FieldType::Enum => value
                .as_str()
                .map(|s| DatabaseValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::DateTime => {
                let parsed = match value {
                    JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok(),
                    JsonValue::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
                    _ => None,
                };
                parsed
                    .map(|dt| DatabaseValue::Text(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                    .ok_or_else(mismatch)
            }
            FieldType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(|d| DatabaseValue::Text(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(mismatch),
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(|u| DatabaseValue::Text(u.to_string()))
                .ok_or_else(mismatch),
            FieldType::Blob => match value {
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .map(DatabaseValue::Blob)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
        }
    }

    /// Coerce a column value back to its field representation
    pub fn coerce_to_json(field_type: FieldType, field: &str, value: &DatabaseValue) -> ModelResult<JsonValue> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }
        let mismatch = || ModelError::conversion(field, format!("cannot read {:?} as {:?}", value, field_type));

        match field_type {
            FieldType::Integer | FieldType::Entity => value.as_i64().map(JsonValue::from).ok_or_else(mismatch),
            FieldType::Real => value
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(mismatch),
            FieldType::Boolean => match value {
                DatabaseValue::Text(s) if s.eq_ignore_ascii_case("true") => Ok(JsonValue::Bool(true)),
                DatabaseValue::Text(s) if s.eq_ignore_ascii_case("false") => Ok(JsonValue::Bool(false)),
                other => other.as_i64().map(|i| JsonValue::Bool(i != 0)).ok_or_else(mismatch),
            },
            FieldType::Decimal => match value {
                DatabaseValue::Text(s) => Ok(JsonValue::String(s.clone())),
                other => Ok(other.to_json()),
            },
            FieldType::Text | FieldType::Enum => match value {
                DatabaseValue::Text(s) => Ok(JsonValue::String(s.clone())),
                DatabaseValue::Integer(_) | DatabaseValue::Real(_) => Ok(JsonValue::String(value.to_arg())),
                _ => Err(mismatch()),
            },
            FieldType::DateTime => match value {
                DatabaseValue::Text(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| {
                        JsonValue::String(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    })
                    .map_err(|e| ModelError::conversion(field, e.to_string())),
                DatabaseValue::Integer(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
                    .map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            FieldType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(mismatch),
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(|u| JsonValue::String(u.to_string()))
                .ok_or_else(mismatch),
            FieldType::Blob => match value {
                DatabaseValue::Blob(_) => Ok(value.to_json()),
                _ => Err(mismatch()),
            },
        }
    }

    /// Serialize a typed entity into its object bag
    pub fn to_json<T: Entity>(entity: &T) -> ModelResult<Map<String, JsonValue>> {
        match serde_json::to_value(entity) {
            Ok(JsonValue::Object(object)) => Ok(object),
            Ok(other) => Err(ModelError::Mapping(format!(
                "entity '{}' serialized to {} instead of an object",
                T::NAME,
                other
            ))),
            Err(e) => Err(ModelError::Mapping(format!("cannot serialize '{}': {}", T::NAME, e))),
        }
    }

    /// Materialize a typed entity from its object bag
    pub fn from_json<T: Entity>(value: JsonValue) -> ModelResult<T> {
        serde_json::from_value(value)
            .map_err(|e| ModelError::Mapping(format!("cannot materialize '{}': {}", T::NAME, e)))
    }
}

fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
