//! CSV variable source

use std::io::Read;

use serde_json::{Map, Value as JsonValue};

/// How the first record and the column names are chosen
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    pub fields: Vec<String>,
    pub skip_header: bool,
    pub header_as_fields: bool,
}

/// Read every record into a map of `field -> cell`.
///
/// With `skip_header`, the first record is dropped; it names the columns when
/// `header_as_fields` is set or no `fields` were given. Without `skip_header`
/// and without `fields`, the first record names the columns and is also kept
/// as a row. Records shorter than the field list are padded with `""`.
pub fn read_csv<R: Read>(reader: R, opts: &CsvOptions) -> Result<Vec<JsonValue>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut fields = opts.fields.clone();
    let mut skip_header = opts.skip_header;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        if skip_header {
            skip_header = false;
            if opts.header_as_fields || fields.is_empty() {
                fields = record.iter().map(str::to_string).collect();
            }
            continue;
        }
        if fields.is_empty() {
            fields = record.iter().map(str::to_string).collect();
        }

        let mut row = Map::new();
        for (i, field) in fields.iter().enumerate() {
            let cell = record.get(i).unwrap_or("");
            row.insert(field.clone(), JsonValue::String(cell.to_string()));
        }
        rows.push(JsonValue::Object(row));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DATA: &str = "id,name\n1,alice\n2,bob\n3\n";

    #[test]
    fn test_explicit_fields_with_skipped_header() {
        let opts = CsvOptions {
            fields: vec!["uid".into(), "login".into()],
            skip_header: true,
            header_as_fields: false,
        };
        let rows = read_csv(DATA.as_bytes(), &opts).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], json!({"uid": "1", "login": "alice"}));
        // short record is padded
        assert_eq!(rows[2], json!({"uid": "3", "login": ""}));
    }

    #[test]
    fn test_header_as_fields() {
        let opts = CsvOptions {
            fields: vec!["ignored".into()],
            skip_header: true,
            header_as_fields: true,
        };
        let rows = read_csv(DATA.as_bytes(), &opts).unwrap();
        assert_eq!(rows[1], json!({"id": "2", "name": "bob"}));
    }

    #[test]
    fn test_no_fields_no_skip_keeps_first_record() {
        let rows = read_csv(DATA.as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], json!({"id": "id", "name": "name"}));
        assert_eq!(rows[1], json!({"id": "1", "name": "alice"}));
    }

    #[test]
    fn test_explicit_fields_without_header() {
        let opts = CsvOptions {
            fields: vec!["a".into(), "b".into(), "c".into()],
            ..Default::default()
        };
        let rows = read_csv("x,y\n".as_bytes(), &opts).unwrap();
        assert_eq!(rows, vec![json!({"a": "x", "b": "y", "c": ""})]);
    }
}
