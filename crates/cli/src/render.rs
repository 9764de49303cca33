//! Plain-text rendering of the core view models.

use prm_core::views::{CustomFieldTable, PatientDetailView, PatientTable};
use prm_core::RecordError;

/// Aligns `rows` under `headers`, columns separated by two spaces.
fn aligned(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers)];
    out.extend(rows.iter().map(|r| line(r.as_slice())));
    out.join("\n")
}

pub fn patient_table(table: &PatientTable) -> String {
    let mut headers = vec!["ID".to_string()];
    headers.extend(table.columns.iter().map(|c| c.header.clone()));
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.id.clone()];
            cells.extend(row.cells.iter().cloned());
            cells
        })
        .collect();

    let mut out = if table.rows.is_empty() {
        "No patients found.".to_string()
    } else {
        aligned(&headers, &rows)
    };
    out.push_str(&format!(
        "\nPage {} of {} ({} patients, {} per page)",
        table.page + 1,
        table.page_count,
        table.total,
        table.page_size
    ));
    out
}

pub fn patient_detail(view: &PatientDetailView) -> String {
    let mut out = vec![
        view.name.clone(),
        format!("ID: {}", view.id),
        format!("DOB: {}", view.dob),
        format!("Status: {}", view.status),
        String::new(),
        "Addresses".to_string(),
    ];
    match &view.addresses_message {
        Some(message) => out.push(format!("  {message}")),
        None => {
            for address in &view.addresses {
                out.push(format!("  {}", address.address_line1));
                if let Some(line2) = &address.address_line2 {
                    out.push(format!("  {line2}"));
                }
                out.push(format!("  {}", address.locality));
            }
        }
    }
    if !view.custom_fields.is_empty() {
        out.push(String::new());
        out.push("Custom fields".to_string());
        out.extend(
            view.custom_fields
                .iter()
                .map(|f| format!("  {}: {}", f.label, f.value)),
        );
    }
    out.join("\n")
}

pub fn field_table(table: &CustomFieldTable) -> String {
    if let Some(message) = &table.empty_message {
        return message.clone();
    }
    let headers = ["ID", "Label", "Type", "Required"].map(String::from);
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.label.clone(),
                r.field_type.clone(),
                r.required.clone(),
            ]
        })
        .collect();
    aligned(&headers, &rows)
}

/// The user-facing message, followed by one line per field error.
pub fn error(err: &RecordError) -> String {
    let mut out = vec![format!("Error: {}", err.user_message())];
    out.extend(
        err.field_errors()
            .iter()
            .map(|e| format!("  {}: {}", e.field, e.message)),
    );
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use prm_core::validation::FieldError;
    use prm_core::views::{Column, PatientRow};

    #[test]
    fn test_patient_table_alignment() {
        let table = PatientTable {
            columns: vec![
                Column {
                    key: "firstName".into(),
                    header: "First".into(),
                    field_type: None,
                },
                Column {
                    key: "lastName".into(),
                    header: "Last".into(),
                    field_type: None,
                },
            ],
            rows: vec![PatientRow {
                id: "p1".into(),
                cells: vec!["Jane".into(), "Doe".into()],
            }],
            page: 0,
            page_size: 10,
            total: 1,
            page_count: 1,
        };
        assert_eq!(
            patient_table(&table),
            "ID  First  Last\np1  Jane   Doe\nPage 1 of 1 (1 patients, 10 per page)"
        );
    }

    #[test]
    fn test_error_lists_field_errors() {
        let err = RecordError::Validation(vec![FieldError::new("firstName", "First Name is required")]);
        assert_eq!(
            error(&err),
            "Error: Please correct the highlighted fields.\n  firstName: First Name is required"
        );
    }
}
