//! Tabular export of admissions.
//!
//! Applications are projected into an Arrow record batch (one Utf8 column
//! per form field) and written out as CSV with a header row, which every
//! spreadsheet program opens directly.

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::SecondsFormat;
use thiserror::Error;

use crate::models::Admission;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// Column order of the export. Reference and submission time lead so the
/// sheet sorts sensibly.
const HEADERS: [&str; 23] = [
    "reference",
    "submittedAt",
    "firstName",
    "lastName",
    "email",
    "phone",
    "dob",
    "gender",
    "address",
    "city",
    "state",
    "pincode",
    "program",
    "qualification",
    "school",
    "board",
    "passingYear",
    "percentage",
    "hostelRequired",
    "howDidYouHear",
    "questions",
    "agreeToTerms",
    "confirmInformation",
];

fn row(a: &Admission) -> [Option<String>; 23] {
    [
        Some(a.unique_key.clone()),
        Some(a.submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        Some(a.first_name.clone()),
        Some(a.last_name.clone()),
        Some(a.email.clone()),
        Some(a.phone.clone()),
        a.dob.clone(),
        a.gender.clone(),
        a.address.clone(),
        a.city.clone(),
        a.state.clone(),
        a.pincode.clone(),
        a.program.clone(),
        a.qualification.clone(),
        a.school.clone(),
        a.board.clone(),
        a.passing_year.clone(),
        a.percentage.clone(),
        a.hostel_required.clone(),
        a.how_did_you_hear.clone(),
        a.questions.clone(),
        a.agree_to_terms.clone(),
        a.confirm_information.clone(),
    ]
}

/// Project admissions into a record batch, preserving input order.
pub fn admissions_batch(admissions: &[Admission]) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(Schema::new(
        HEADERS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let rows: Vec<[Option<String>; 23]> = admissions.iter().map(row).collect();
    let arrays: Vec<ArrayRef> = (0..HEADERS.len())
        .map(|col| {
            let values: StringArray = rows.iter().map(|r| r[col].as_deref()).collect();
            Arc::new(values) as ArrayRef
        })
        .collect();

    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// CSV bytes with a header row.
pub fn admissions_csv(admissions: &[Admission]) -> Result<Vec<u8>, ExportError> {
    let batch = admissions_batch(admissions)?;
    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(&batch)?;
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdmissionForm;
    use arrow::array::Array;
    use chrono::{TimeZone, Utc};

    fn admission(first_name: &str, program: Option<&str>) -> Admission {
        let form = AdmissionForm {
            first_name: first_name.into(),
            last_name: "Rao".into(),
            email: "a@example.com".into(),
            phone: "12345".into(),
            program: program.map(str::to_string),
            ..Default::default()
        };
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap();
        Admission::from_form(form, "MNI-654321".into(), at)
    }

    #[test]
    fn test_batch_shape() {
        let batch = admissions_batch(&[admission("Asha", Some("BSc")), admission("Ravi", None)]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), HEADERS.len());
        assert_eq!(batch.schema().field(0).name(), "reference");

        let program = batch
            .column_by_name("program")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(program.value(0), "BSc");
        assert!(program.is_null(1));
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let csv = admissions_csv(&[admission("Asha", Some("BSc, Physics"))]).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("reference,submittedAt,firstName,lastName"));

        let row = lines.next().unwrap();
        assert!(row.starts_with("MNI-654321,2025-06-01T10:30:00Z,Asha,Rao"));
        // embedded comma must be quoted
        assert!(row.contains("\"BSc, Physics\""));
        assert!(lines.next().is_none());
    }
}
