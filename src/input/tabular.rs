//! CSV upload identifier resolution.

use crate::error::AppError;

use super::{is_numeric_id, ParsedInput, RecordRef, RejectedToken};

/// Resolves an uploaded CSV into record references.
///
/// The file must carry a header row with an `id` column (case-insensitive,
/// trimmed). An optional `status` column switches the upload into
/// mixed-status mode: non-empty cells are taken verbatim for their row, an
/// empty cell means the session default applies. Rows whose id cell is not
/// numeric go to the rejects list.
///
/// A UTF-8 BOM at the start of the file is tolerated; spreadsheet exports
/// commonly carry one.
///
/// # Errors
///
/// `AppError::MalformedInput` when the file is not parseable CSV or the
/// header has no `id` column.
pub fn parse_tabular(bytes: &[u8]) -> Result<ParsedInput, AppError> {
    let bytes = strip_bom(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| AppError::MalformedInput(format!("unreadable CSV header: {}", e)))?
        .clone();

    let id_col = find_column(&headers, "id").ok_or_else(|| {
        AppError::MalformedInput("CSV is missing a required 'id' column".to_string())
    })?;
    let status_col = find_column(&headers, "status");

    let mut parsed = ParsedInput::default();

    for (index, row) in reader.records().enumerate() {
        let row =
            row.map_err(|e| AppError::MalformedInput(format!("unreadable CSV row: {}", e)))?;

        let id = row.get(id_col).unwrap_or("").trim();
        if id.is_empty() {
            // Trailing blank rows from spreadsheet exports are not worth a reject.
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            parsed.rejects.push(RejectedToken {
                token: format!("row {}", index + 2),
                reason: "empty id cell".to_string(),
            });
            continue;
        }

        if !is_numeric_id(id) {
            parsed.rejects.push(RejectedToken {
                token: id.to_string(),
                reason: "not a numeric record id".to_string(),
            });
            continue;
        }

        let status = status_col
            .and_then(|col| row.get(col))
            .map(str::trim)
            .filter(|s| !s.is_empty());

        parsed.records.push(match status {
            Some(status) => RecordRef::with_status(id, status),
            None => RecordRef::new(id),
        });
    }

    Ok(parsed)
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes)
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_file_yields_default_status_records() {
        let parsed = parse_tabular(b"id\n1001\n1002\n").unwrap();

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0], RecordRef::new("1001"));
        assert_eq!(parsed.records[1].target_status, None);
        assert!(parsed.rejects.is_empty());
    }

    #[test]
    fn id_header_match_is_case_insensitive_and_trimmed() {
        let parsed = parse_tabular(b" ID \n1001\n").unwrap();

        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn missing_id_column_is_malformed_input() {
        let result = parse_tabular(b"record,name\n1001,Alice\n");

        match result {
            Err(AppError::MalformedInput(msg)) => assert!(msg.contains("'id'")),
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn status_column_enables_mixed_mode() {
        let parsed =
            parse_tabular(b"id,status\n1001,Junk Lead\n1002,Closed Lost\n").unwrap();

        assert_eq!(
            parsed.records[0],
            RecordRef::with_status("1001", "Junk Lead")
        );
        assert_eq!(
            parsed.records[1],
            RecordRef::with_status("1002", "Closed Lost")
        );
    }

    #[test]
    fn empty_status_cell_falls_back_to_default() {
        let parsed = parse_tabular(b"id,status\n1001,Junk Lead\n1002,\n").unwrap();

        assert_eq!(parsed.records[0].target_status.as_deref(), Some("Junk Lead"));
        assert_eq!(parsed.records[1].target_status, None);
    }

    #[test]
    fn non_numeric_id_rows_are_rejected_not_fatal() {
        let parsed = parse_tabular(b"id\n1001\nabc123\n1002\n").unwrap();

        let ids: Vec<&str> = parsed.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1002"]);
        assert_eq!(parsed.rejects.len(), 1);
        assert_eq!(parsed.rejects[0].token, "abc123");
    }

    #[test]
    fn utf8_bom_is_tolerated() {
        let parsed = parse_tabular(b"\xef\xbb\xbfid\n1001\n").unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].id, "1001");
    }

    #[test]
    fn blank_trailing_rows_are_ignored() {
        let parsed = parse_tabular(b"id,status\n1001,\n,\n").unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.rejects.is_empty());
    }

    #[test]
    fn extra_columns_are_ignored() {
        let parsed =
            parse_tabular(b"name,id,owner\nAlice,1001,Bob\n").unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].id, "1001");
    }

    #[test]
    fn non_utf8_rows_are_malformed_input() {
        let result = parse_tabular(b"id\n\xff\xfe\xfd\n");

        assert!(matches!(result, Err(AppError::MalformedInput(_))));
    }
}
