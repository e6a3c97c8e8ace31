//! Mapping between kernel values and SQLite storage
//!
//! UUIDs are stored as hyphenated TEXT (the form `get_tenant()` returns),
//! booleans as INTEGER 0/1.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use tenantry_core::model::{ColumnKind, EntityType, Row, Value};

use crate::errors::{DecodeError, Result};

/// Borrowed `Value` bindable as a statement parameter
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Uuid(u) => ToSqlOutput::from(u.hyphenated().to_string()),
        })
    }
}

fn type_name(value: ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

/// Decode one stored value as a column of `kind`
pub fn decode(
    entity: &str,
    column: &str,
    kind: ColumnKind,
    raw: ValueRef<'_>,
) -> std::result::Result<Value, DecodeError> {
    let mismatch = |expected: &'static str| DecodeError::UnexpectedType {
        entity: entity.to_string(),
        column: column.to_string(),
        expected,
        found: type_name(raw),
    };

    match (kind, raw) {
        (_, ValueRef::Null) => Ok(Value::Null),
        (ColumnKind::Integer, ValueRef::Integer(i)) => Ok(Value::Integer(i)),
        (ColumnKind::Bool, ValueRef::Integer(i)) => Ok(Value::Bool(i != 0)),
        (ColumnKind::Text, ValueRef::Text(bytes)) => Ok(Value::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        (ColumnKind::Uuid, ValueRef::Text(bytes)) => {
            let text = String::from_utf8_lossy(bytes);
            uuid::Uuid::parse_str(&text)
                .map(Value::Uuid)
                .map_err(|_| DecodeError::InvalidUuid {
                    entity: entity.to_string(),
                    column: column.to_string(),
                    value: text.into_owned(),
                })
        }
        (ColumnKind::Integer, _) => Err(mismatch("INTEGER")),
        (ColumnKind::Bool, _) => Err(mismatch("INTEGER")),
        (ColumnKind::Text, _) | (ColumnKind::Uuid, _) => Err(mismatch("TEXT")),
    }
}

/// Decode `columns` of a result row, in order, into a `Row`
pub fn decode_row(entity: &EntityType, columns: &[&str], row: &rusqlite::Row<'_>) -> Result<Row> {
    let mut out = Row::new();
    for (i, name) in columns.iter().enumerate() {
        let kind = entity
            .column(name)
            .map(|c| c.kind)
            .unwrap_or(ColumnKind::Text);
        let raw = row.get_ref(i).map_err(crate::errors::from_rusqlite)?;
        out.set(*name, decode(entity.name(), name, kind, raw)?);
    }
    Ok(out)
}

/// Quote an identifier for SQLite
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_decode_uuid_text() {
        let id = Uuid::new_v4();
        let text = id.hyphenated().to_string();
        let value = decode("vehicles", "id", ColumnKind::Uuid, ValueRef::Text(text.as_bytes())).unwrap();
        assert_eq!(value, Value::Uuid(id));
    }

    #[test]
    fn test_decode_bool_and_null() {
        assert_eq!(
            decode("t", "c", ColumnKind::Bool, ValueRef::Integer(1)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode("t", "c", ColumnKind::Uuid, ValueRef::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_rejects_wrong_storage() {
        assert!(matches!(
            decode("t", "c", ColumnKind::Integer, ValueRef::Text(b"x")),
            Err(DecodeError::UnexpectedType { found: "TEXT", .. })
        ));
        assert!(matches!(
            decode("t", "c", ColumnKind::Uuid, ValueRef::Text(b"acme")),
            Err(DecodeError::InvalidUuid { .. })
        ));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("parts_orders"), "\"parts_orders\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }
}
