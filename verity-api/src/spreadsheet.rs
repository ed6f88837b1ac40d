//! Spreadsheet reading and template generation for bulk import.
//!
//! Workbooks are read with `calamine`. The first worksheet's first non-empty
//! row is the header; each header label maps to a [`DiplomaField`] through
//! [`DiplomaField::from_column_label`], and unknown columns are ignored.
//! The downloadable template is written with `rust_xlsxwriter` from the same
//! labels, so it always maps back cleanly.

use std::io::Cursor;

use calamine::{Data, Ods, Range, Reader, Xls, Xlsx};
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{Color, Format, FormatBorder, Note, Workbook, XlsxError};
use verity_core::{DiplomaField, DiplomaInput, ValidationError};

/// File name offered for the template download.
pub const TEMPLATE_FILE_NAME: &str = "mau_nhap_van_bang.xlsx";

/// MIME type of `.xlsx` files.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const TEMPLATE_SHEET_NAME: &str = "Danh sách văn bằng";
const DATE_DISPLAY_FORMAT: &str = "%d/%m/%Y";

// ============================================================================
// FORMAT DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    Xlsx,
    Xlsm,
    Xls,
    Ods,
}

impl WorkbookFormat {
    /// Detect the format from the uploaded file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.trim().rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "xlsx" => Some(WorkbookFormat::Xlsx),
            "xlsm" => Some(WorkbookFormat::Xlsm),
            "xls" => Some(WorkbookFormat::Xls),
            "ods" => Some(WorkbookFormat::Ods),
            _ => None,
        }
    }
}

// ============================================================================
// CELLS
// ============================================================================

/// A cell reduced to what the column mapping cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// A cell that could not be converted for its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCell {
    pub field: DiplomaField,
    pub value: String,
}

/// Excel serial day 0 (the 1900 date system, after the leap-year bug).
fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let days = serial.trunc() as i64;
    excel_epoch()?.checked_add_signed(chrono::Duration::days(days))
}

/// `dd/mm/yyyy`, `yyyy-mm-dd`, or an ISO timestamp.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, DATE_DISPLAY_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .ok()
        .or_else(|| {
            text.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

fn number_text(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

impl CellValue {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(trimmed.to_string())
                }
            }
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Text(b.to_string()),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                serial_to_date(serial)
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Number(serial))
            }
            Data::Error(e) => CellValue::Text(e.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Display form, as used in row error reports.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => number_text(*n),
            CellValue::Date(d) => d.format(DATE_DISPLAY_FORMAT).to_string(),
        }
    }

    fn as_date(&self, field: DiplomaField) -> Result<NaiveDate, InvalidCell> {
        let parsed = match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Number(serial) => serial_to_date(*serial),
            CellValue::Text(s) => parse_date_text(s),
            CellValue::Empty => None,
        };
        parsed.ok_or_else(|| self.invalid(field))
    }

    fn as_integer(&self, field: DiplomaField) -> Result<i32, InvalidCell> {
        let parsed = match self {
            CellValue::Number(n) if n.fract() == 0.0 => i32::try_from(*n as i64).ok(),
            CellValue::Text(s) => s.trim().parse::<i32>().ok(),
            CellValue::Date(d) if field == DiplomaField::GraduationYear => Some(d.year()),
            _ => None,
        };
        parsed.ok_or_else(|| self.invalid(field))
    }

    fn invalid(&self, field: DiplomaField) -> InvalidCell {
        InvalidCell {
            field,
            value: self.display(),
        }
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// One non-blank data row.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based spreadsheet row number.
    pub row: usize,
    pub cells: Vec<(DiplomaField, CellValue)>,
}

impl SheetRow {
    pub fn cell(&self, field: DiplomaField) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| value)
    }

    /// Trimmed text of a cell, `None` when blank or absent.
    pub fn text(&self, field: DiplomaField) -> Option<String> {
        self.cell(field)
            .map(CellValue::display)
            .filter(|s| !s.is_empty())
    }

    /// Map cells onto a submission. The first unconvertible cell wins.
    pub fn to_input(&self) -> Result<DiplomaInput, InvalidCell> {
        let mut input = DiplomaInput::default();
        for (field, value) in &self.cells {
            assign(&mut input, *field, value)?;
        }
        Ok(input)
    }
}

fn assign(input: &mut DiplomaInput, field: DiplomaField, cell: &CellValue) -> Result<(), InvalidCell> {
    use DiplomaField as F;

    if cell.is_empty() {
        return Ok(());
    }
    let text = || Some(cell.display());

    match field {
        F::DocumentNumber => input.document_number = text(),
        F::RegistryNumber => input.registry_number = text(),
        F::StudentCode => input.student_code = text(),
        F::NationalId => input.national_id = text(),
        F::FullName => input.full_name = text(),
        F::BirthDate => input.birth_date = Some(cell.as_date(field)?),
        F::BirthPlace => input.birth_place = text(),
        F::Sex => input.sex = text(),
        F::Ethnicity => input.ethnicity = text(),
        F::Nationality => input.nationality = text(),
        F::DiplomaType => input.diploma_type = text(),
        F::Program => input.program = text(),
        F::ProgramCode => input.program_code = text(),
        F::Specialization => input.specialization = text(),
        F::Classification => input.classification = text(),
        F::GraduationYear => input.graduation_year = Some(cell.as_integer(field)?),
        F::TotalCredits => input.total_credits = Some(cell.as_integer(field)?),
        F::TrainingFormat => input.training_format = text(),
        F::TrainingLanguage => input.training_language = text(),
        F::TrainingDuration => input.training_duration = text(),
        F::GraduationDecisionNumber => input.graduation_decision_number = text(),
        F::GraduationDecisionDate => {
            input.graduation_decision_date = Some(cell.as_date(field)?)
        }
        F::IssueDecisionNumber => input.issue_decision_number = text(),
        F::IssueDecisionDate => input.issue_decision_date = Some(cell.as_date(field)?),
        F::IssuingUnit => input.issuing_unit = text(),
        F::IssuingUnitCode => input.issuing_unit_code = text(),
        F::SignerName => input.signer_name = text(),
        F::SignerNationalId => input.signer_national_id = text(),
        F::SignerTitle => input.signer_title = text(),
        F::IssuePlace => input.issue_place = text(),
        F::IssueDate => input.issue_date = Some(cell.as_date(field)?),
    }
    Ok(())
}

/// Cells for a submission, in column order. Dates are written as
/// `dd/mm/yyyy` text and integers as numbers.
pub fn cells_for(input: &DiplomaInput) -> Vec<(DiplomaField, CellValue)> {
    use DiplomaField as F;

    let text = |value: &Option<String>| {
        value
            .as_deref()
            .map(|s| CellValue::Text(s.to_string()))
            .unwrap_or(CellValue::Empty)
    };
    let date = |value: Option<NaiveDate>| {
        value
            .map(|d| CellValue::Text(d.format(DATE_DISPLAY_FORMAT).to_string()))
            .unwrap_or(CellValue::Empty)
    };
    let number = |value: Option<i32>| {
        value
            .map(|n| CellValue::Number(f64::from(n)))
            .unwrap_or(CellValue::Empty)
    };

    DiplomaField::ALL
        .iter()
        .map(|field| {
            let value = match field {
                F::DocumentNumber => text(&input.document_number),
                F::RegistryNumber => text(&input.registry_number),
                F::StudentCode => text(&input.student_code),
                F::NationalId => text(&input.national_id),
                F::FullName => text(&input.full_name),
                F::BirthDate => date(input.birth_date),
                F::BirthPlace => text(&input.birth_place),
                F::Sex => text(&input.sex),
                F::Ethnicity => text(&input.ethnicity),
                F::Nationality => text(&input.nationality),
                F::DiplomaType => text(&input.diploma_type),
                F::Program => text(&input.program),
                F::ProgramCode => text(&input.program_code),
                F::Specialization => text(&input.specialization),
                F::Classification => text(&input.classification),
                F::GraduationYear => number(input.graduation_year),
                F::TotalCredits => number(input.total_credits),
                F::TrainingFormat => text(&input.training_format),
                F::TrainingLanguage => text(&input.training_language),
                F::TrainingDuration => text(&input.training_duration),
                F::GraduationDecisionNumber => text(&input.graduation_decision_number),
                F::GraduationDecisionDate => date(input.graduation_decision_date),
                F::IssueDecisionNumber => text(&input.issue_decision_number),
                F::IssueDecisionDate => date(input.issue_decision_date),
                F::IssuingUnit => text(&input.issuing_unit),
                F::IssuingUnitCode => text(&input.issuing_unit_code),
                F::SignerName => text(&input.signer_name),
                F::SignerNationalId => text(&input.signer_national_id),
                F::SignerTitle => text(&input.signer_title),
                F::IssuePlace => text(&input.issue_place),
                F::IssueDate => date(input.issue_date),
            };
            (*field, value)
        })
        .collect()
}

// ============================================================================
// READING
// ============================================================================

/// Header mapping plus the non-blank data rows of the first worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    /// Field per column; `None` for unrecognized headers.
    pub columns: Vec<Option<DiplomaField>>,
    pub rows: Vec<SheetRow>,
}

fn unsupported(reason: impl Into<String>) -> ValidationError {
    ValidationError::UnsupportedFile {
        reason: reason.into(),
    }
}

fn open<R>(bytes: Vec<u8>) -> Result<R, ValidationError>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    R::new(Cursor::new(bytes)).map_err(|e| unsupported(format!("cannot open workbook: {e}")))
}

fn first_sheet<R>(mut workbook: R) -> Result<Range<Data>, ValidationError>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    match workbook.worksheet_range_at(0) {
        None => Err(unsupported("workbook has no worksheet")),
        Some(Err(e)) => Err(unsupported(format!("cannot read worksheet: {e}"))),
        Some(Ok(range)) => Ok(range),
    }
}

/// Read the first worksheet of an uploaded workbook.
///
/// Blank rows are skipped and do not count toward `max_rows`.
pub fn read_sheet(file_name: &str, bytes: Vec<u8>, max_rows: usize) -> Result<Sheet, ValidationError> {
    let format = WorkbookFormat::from_file_name(file_name)
        .ok_or_else(|| unsupported("expected an .xlsx, .xls, .xlsm or .ods file"))?;

    let range = match format {
        WorkbookFormat::Xlsx | WorkbookFormat::Xlsm => first_sheet(open::<Xlsx<_>>(bytes)?)?,
        WorkbookFormat::Xls => first_sheet(open::<Xls<_>>(bytes)?)?,
        WorkbookFormat::Ods => first_sheet(open::<Ods<_>>(bytes)?)?,
    };

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let first_col = range.start().map(|(_, col)| col as usize).unwrap_or(0);
    let mut rows = range.rows().enumerate();

    let Some((_, header)) = rows.next() else {
        return Err(unsupported("missing header row"));
    };
    // Leading empty columns are not part of the range.
    let mut columns: Vec<Option<DiplomaField>> = vec![None; first_col];
    for cell in header {
        let field = match cell {
            Data::String(label) => DiplomaField::from_column_label(label)
                .filter(|field| !columns.contains(&Some(*field))),
            _ => None,
        };
        columns.push(field);
    }
    if columns.iter().all(Option::is_none) {
        return Err(unsupported("missing header row"));
    }

    let mut data_rows = Vec::new();
    for (index, row) in rows {
        let cells: Vec<(DiplomaField, CellValue)> = row
            .iter()
            .enumerate()
            .filter_map(|(offset, data)| {
                let field = columns.get(first_col + offset).copied().flatten()?;
                Some((field, CellValue::from_data(data)))
            })
            .collect();
        if cells.iter().all(|(_, value)| value.is_empty()) {
            continue;
        }
        data_rows.push(SheetRow {
            row: first_row + index + 1,
            cells,
        });
    }

    if data_rows.len() > max_rows {
        return Err(ValidationError::TooManyRows {
            rows: data_rows.len(),
            max: max_rows,
        });
    }
    if data_rows.is_empty() {
        return Err(ValidationError::NoDataRows);
    }

    Ok(Sheet {
        columns,
        rows: data_rows,
    })
}

// ============================================================================
// TEMPLATE
// ============================================================================

/// Example row written under the header. Passes import validation.
pub fn template_example() -> DiplomaInput {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
    DiplomaInput {
        document_number: Some("QH-2023-000123".to_string()),
        registry_number: Some("SV-2023-0456".to_string()),
        student_code: Some("20IT001".to_string()),
        national_id: Some("001201000123".to_string()),
        full_name: Some("Nguyễn Văn An".to_string()),
        birth_date: date(2001, 6, 15),
        birth_place: Some("Hà Nội".to_string()),
        sex: Some("Nam".to_string()),
        ethnicity: Some("Kinh".to_string()),
        nationality: Some("Việt Nam".to_string()),
        diploma_type: Some("Bằng Cử nhân".to_string()),
        program: Some("Công nghệ thông tin".to_string()),
        program_code: Some("7480201".to_string()),
        specialization: Some("Kỹ thuật phần mềm".to_string()),
        classification: Some("Giỏi".to_string()),
        graduation_year: Some(2023),
        total_credits: Some(130),
        training_format: Some("Chính quy".to_string()),
        training_language: Some("Tiếng Việt".to_string()),
        training_duration: Some("4 năm".to_string()),
        graduation_decision_number: Some("1234/QĐ-ĐHQG".to_string()),
        graduation_decision_date: date(2023, 6, 30),
        issue_decision_number: Some("1250/QĐ-ĐHQG".to_string()),
        issue_decision_date: date(2023, 7, 10),
        issuing_unit: Some("Đại học Quốc gia Hà Nội".to_string()),
        issuing_unit_code: Some("DHQG".to_string()),
        signer_name: Some("Trần Thị Bình".to_string()),
        signer_national_id: Some("001080000456".to_string()),
        signer_title: Some("Giám đốc".to_string()),
        issue_place: Some("Hà Nội".to_string()),
        issue_date: date(2023, 7, 15),
        attachment_name: None,
        attachment_content: None,
    }
}

fn column_width(field: DiplomaField) -> f64 {
    use DiplomaField as F;
    match field {
        F::FullName
        | F::Program
        | F::Specialization
        | F::IssuingUnit
        | F::GraduationDecisionNumber
        | F::GraduationDecisionDate
        | F::IssueDecisionNumber => 32.0,
        F::Sex | F::Ethnicity | F::GraduationYear | F::TotalCredits => 12.0,
        _ if field.is_date() => 16.0,
        _ => 20.0,
    }
}

fn column_note(field: DiplomaField) -> Option<&'static str> {
    match field {
        DiplomaField::DocumentNumber => {
            Some("Bắt buộc. Không được trùng với số hiệu văn bằng đã có trong hệ thống.")
        }
        DiplomaField::BirthDate => Some("Định dạng ngày: dd/mm/yyyy, ví dụ 15/06/2001."),
        DiplomaField::DiplomaType => Some(
            "Ví dụ: Bằng Cử nhân, Bằng Kỹ sư, Bằng Thạc sĩ, Bằng Tiến sĩ. Để trống sẽ dùng Bằng Cử nhân.",
        ),
        _ => None,
    }
}

/// Build the import template workbook.
pub fn build_template() -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(TEMPLATE_SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
        .set_border(FormatBorder::Thin)
        .set_text_wrap();

    for (index, (field, value)) in cells_for(&template_example()).into_iter().enumerate() {
        let col = u16::try_from(index).map_err(|_| XlsxError::ParameterError(
            "too many template columns".to_string(),
        ))?;
        worksheet.write_string_with_format(0, col, field.column_label(), &header_format)?;
        worksheet.set_column_width(col, column_width(field))?;
        if let Some(note) = column_note(field) {
            worksheet.insert_note(0, col, &Note::new(note).set_author("Verity"))?;
        }
        match value {
            CellValue::Number(n) => {
                worksheet.write_number(1, col, n)?;
            }
            CellValue::Empty => {}
            other => {
                worksheet.write_string(1, col, other.display())?;
            }
        }
    }
    worksheet.set_freeze_panes(1, 0)?;

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use verity_core::IMPORT_REQUIRED;
    use verity_test_utils::generators::arb_diploma_input;

    fn row_of(input: &DiplomaInput) -> SheetRow {
        SheetRow {
            row: 2,
            cells: cells_for(input),
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            WorkbookFormat::from_file_name("ds.XLSX"),
            Some(WorkbookFormat::Xlsx)
        );
        assert_eq!(WorkbookFormat::from_file_name("a.b.ods"), Some(WorkbookFormat::Ods));
        assert_eq!(WorkbookFormat::from_file_name("data.csv"), None);
        assert_eq!(WorkbookFormat::from_file_name("noextension"), None);
    }

    #[test]
    fn test_date_parsing() {
        let expected = NaiveDate::from_ymd_opt(2001, 6, 15);
        assert_eq!(parse_date_text("15/06/2001"), expected);
        assert_eq!(parse_date_text("2001-06-15"), expected);
        assert_eq!(parse_date_text("2001-06-15T00:00:00"), expected);
        assert_eq!(parse_date_text("June 15"), None);
        // 37057 is 2001-06-15 in the 1900 date system.
        assert_eq!(serial_to_date(37057.0), expected);
        assert_eq!(serial_to_date(-3.0), None);
    }

    #[test]
    fn test_numeric_text_cells_drop_trailing_zero() {
        assert_eq!(CellValue::Number(7480201.0).display(), "7480201");
        assert_eq!(CellValue::Number(3.5).display(), "3.5");
    }

    #[test]
    fn test_invalid_date_names_field() {
        let mut input = DiplomaInput::default();
        let err = assign(
            &mut input,
            DiplomaField::BirthDate,
            &CellValue::Text("not a date".to_string()),
        )
        .unwrap_err();
        assert_eq!(err.field, DiplomaField::BirthDate);
        assert_eq!(err.value, "not a date");
    }

    #[test]
    fn test_rejects_unknown_extension_before_parsing() {
        let err = read_sheet("data.csv", b"a,b".to_vec(), 10).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFile { .. }));

        let err = read_sheet("data.xlsx", b"not a zip".to_vec(), 10).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFile { .. }));
    }

    #[test]
    fn test_template_round_trips_through_import_mapping() {
        let bytes = build_template().unwrap();
        let sheet = read_sheet(TEMPLATE_FILE_NAME, bytes, 1000).unwrap();

        let mapped: Vec<DiplomaField> = sheet.columns.iter().flatten().copied().collect();
        assert_eq!(mapped, DiplomaField::ALL.to_vec());

        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].row, 2);
        let input = sheet.rows[0].to_input().unwrap();
        assert_eq!(input, template_example().normalized());
        assert!(input.validate(IMPORT_REQUIRED).is_ok());
    }

    proptest! {
        #[test]
        fn prop_cells_map_back_to_input(input in arb_diploma_input()) {
            let mapped = row_of(&input).to_input().unwrap();
            prop_assert_eq!(mapped, input.normalized());
        }

        #[test]
        fn prop_labels_resolve_to_their_field(index in 0usize..DiplomaField::ALL.len()) {
            let field = DiplomaField::ALL[index];
            let padded = format!("  {}  ", field.column_label());
            prop_assert_eq!(DiplomaField::from_column_label(&padded), Some(field));
        }
    }
}
