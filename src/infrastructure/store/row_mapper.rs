use crate::domain::error::{EngineError, Result};
use crate::domain::ports::RawRow;
use crate::domain::record::{FieldMap, Record};
use crate::domain::schema::SheetSchema;
use crate::domain::value_objects::RowIndex;

/// Header row for `schema`.
pub fn header_row(schema: &SheetSchema) -> RawRow {
    schema.columns.iter().map(|c| c.to_string()).collect()
}

/// Convert raw sheet rows (header first) into records.
///
/// The header must start with the schema's columns in order; extra trailing
/// header columns are ignored. Short data rows are padded with empty cells.
/// An empty sheet yields no records.
pub fn rows_to_records(schema: &SheetSchema, rows: &[RawRow]) -> Result<Vec<Record>> {
    let Some((header, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };
    check_header(schema, header)?;

    Ok(data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let fields: FieldMap = schema
                .columns
                .iter()
                .enumerate()
                .map(|(col, name)| (name.to_string(), row.get(col).cloned().unwrap_or_default()))
                .collect();
            Record::at(RowIndex::of_data(i), fields)
        })
        .collect())
}

/// Lay out `fields` in schema column order. Unknown fields are dropped.
pub fn record_to_row(schema: &SheetSchema, fields: &FieldMap) -> RawRow {
    schema
        .columns
        .iter()
        .map(|c| fields.get(*c).cloned().unwrap_or_default())
        .collect()
}

/// Restrict `fields` to the schema's columns, filling absent ones with "".
pub fn normalize(schema: &SheetSchema, fields: &FieldMap) -> FieldMap {
    schema
        .columns
        .iter()
        .map(|c| (c.to_string(), fields.get(*c).cloned().unwrap_or_default()))
        .collect()
}

fn check_header(schema: &SheetSchema, header: &RawRow) -> Result<()> {
    let n = schema.columns.len();
    let matches = header.len() >= n
        && header
            .iter()
            .zip(schema.columns.iter())
            .all(|(found, expected)| found.trim() == *expected);
    if matches {
        return Ok(());
    }
    Err(EngineError::SchemaMismatch {
        sheet: schema.sheet.to_string(),
        expected: schema.columns.join(", "),
        found: header.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::EntityKind;

    fn raw(cells: &[&str]) -> RawRow {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn maps_rows_positionally_with_row_numbers() {
        let schema = EntityKind::Brands.schema();
        let rows = vec![
            header_row(schema),
            raw(&["bra_1", "Acme"]),
            raw(&["bra_2", "Bolt", "imported"]),
        ];
        let records = rows_to_records(schema, &rows).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row, Some(RowIndex(2)));
        assert_eq!(records[0].get("notes"), "");
        assert_eq!(records[1].row, Some(RowIndex(3)));
        assert_eq!(records[1].get("name"), "Bolt");
    }

    #[test]
    fn header_must_match_schema() {
        let schema = EntityKind::Brands.schema();
        let rows = vec![raw(&["local_id", "title", "notes"])];
        let err = rows_to_records(schema, &rows).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn extra_header_columns_are_tolerated() {
        let schema = EntityKind::Brands.schema();
        let rows = vec![raw(&["local_id", "name", "notes", "legacy"])];
        assert!(rows_to_records(schema, &rows).unwrap().is_empty());
    }

    #[test]
    fn record_to_row_follows_column_order() {
        let schema = EntityKind::Brands.schema();
        let rec = Record::from_pairs(&[("name", "Acme"), ("local_id", "bra_1"), ("bogus", "x")]);
        assert_eq!(record_to_row(schema, &rec.fields), raw(&["bra_1", "Acme", ""]));
    }
}
