//! Workbook reader seam, schema descriptors and per-source row mappers.
//!
//! Readers turn a workbook on disk (or in memory) into [`SheetTable`]s of
//! [`CellValue`]s. A [`SourceSchema`] says which column feeds which field and
//! how the cell should be read; binding it to a table resolves header names to
//! positions and rejects sheets narrower than the schema requires. The
//! `map_*_row` functions then turn one bound row into a flat record, or skip
//! it when the row has no name.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dealflow_core::{
    clean_text, normalize, normalize_email, resolve_id, CellValue, Company, Contact, Deal,
    EntityId, MarketingParticipant,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("workbook {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read workbook {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("sheet '{sheet}' missing from {}", .path.display())]
    MissingSheet { path: PathBuf, sheet: String },
    #[error("sheet '{sheet}' is {observed} columns wide but its schema needs at least {required}")]
    SchemaWidth {
        sheet: String,
        required: usize,
        observed: usize,
    },
}

/// One sheet split into its header row and the data rows below it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetTable {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    /// Build a table from `(absolute_row_index, cells)` pairs. Rows above
    /// `header_row` are discarded, the header row supplies column names.
    pub fn from_grid(
        sheet_name: impl Into<String>,
        grid: impl IntoIterator<Item = (usize, Vec<CellValue>)>,
        header_row: usize,
    ) -> Self {
        let mut table = SheetTable {
            sheet_name: sheet_name.into(),
            ..Default::default()
        };
        for (index, cells) in grid {
            if index < header_row {
                continue;
            }
            if index == header_row {
                table.headers = cells
                    .iter()
                    .map(|c| c.as_text().unwrap_or_default())
                    .collect();
            } else {
                table.rows.push(cells);
            }
        }
        table
    }

    /// Widest of the header row and every data row.
    pub fn width(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        let wanted = header.trim();
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetSelection {
    First,
    Named(Vec<String>),
    All,
}

/// The external spreadsheet capability. Implementations must report every
/// problem opening the file or finding a requested sheet as a [`SourceError`].
pub trait WorkbookReader {
    fn read(
        &self,
        path: &Path,
        header_row: Option<usize>,
        sheets: &SheetSelection,
    ) -> Result<Vec<SheetTable>, SourceError>;
}

fn select_sheets(
    path: &Path,
    available: &[String],
    selection: &SheetSelection,
) -> Result<Vec<String>, SourceError> {
    match selection {
        SheetSelection::First => available
            .first()
            .cloned()
            .map(|name| vec![name])
            .ok_or_else(|| SourceError::Unreadable {
                path: path.to_path_buf(),
                reason: "workbook has no sheets".to_string(),
            }),
        SheetSelection::Named(names) => names
            .iter()
            .map(|name| {
                if available.iter().any(|a| a == name) {
                    Ok(name.clone())
                } else {
                    Err(SourceError::MissingSheet {
                        path: path.to_path_buf(),
                        sheet: name.clone(),
                    })
                }
            })
            .collect(),
        SheetSelection::All => Ok(available.to_vec()),
    }
}

/// Reads xlsx/xls/xlsb/ods files through calamine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineReader;

impl WorkbookReader for CalamineReader {
    fn read(
        &self,
        path: &Path,
        header_row: Option<usize>,
        sheets: &SheetSelection,
    ) -> Result<Vec<SheetTable>, SourceError> {
        if !path.exists() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }
        let mut workbook = open_workbook_auto(path).map_err(|e| SourceError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let available = workbook.sheet_names().to_vec();
        let selected = select_sheets(path, &available, sheets)?;

        let mut tables = Vec::with_capacity(selected.len());
        for name in selected {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| SourceError::Unreadable {
                    path: path.to_path_buf(),
                    reason: format!("sheet '{name}': {e}"),
                })?;
            let table = range_to_table(&name, &range, header_row.unwrap_or(0));
            debug!(
                path = %path.display(),
                sheet = %name,
                rows = table.rows.len(),
                "read worksheet"
            );
            tables.push(table);
        }
        Ok(tables)
    }
}

fn range_to_table(name: &str, range: &Range<Data>, header_row: usize) -> SheetTable {
    // calamine ranges start at the first used cell, not at A1
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let grid = range.rows().enumerate().map(|(offset, row)| {
        let cells = std::iter::repeat(CellValue::Empty)
            .take(start_col as usize)
            .chain(row.iter().map(cell_value))
            .collect::<Vec<_>>();
        (start_row as usize + offset, cells)
    });
    SheetTable::from_grid(name, grid, header_row)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::Error(_) => CellValue::Empty,
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(CellValue::Date)
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Workbooks held in memory as raw cell grids, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    workbooks: HashMap<PathBuf, Vec<(String, Vec<Vec<CellValue>>)>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet to the workbook at `path`. Row 0 of `grid` is sheet row 0.
    pub fn with_sheet(
        mut self,
        path: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        grid: Vec<Vec<CellValue>>,
    ) -> Self {
        self.workbooks
            .entry(path.into())
            .or_default()
            .push((sheet_name.into(), grid));
        self
    }
}

impl WorkbookReader for MemoryReader {
    fn read(
        &self,
        path: &Path,
        header_row: Option<usize>,
        sheets: &SheetSelection,
    ) -> Result<Vec<SheetTable>, SourceError> {
        let workbook = self
            .workbooks
            .get(path)
            .ok_or_else(|| SourceError::NotFound(path.to_path_buf()))?;
        let available = workbook.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
        let selected = select_sheets(path, &available, sheets)?;
        Ok(selected
            .iter()
            .filter_map(|name| workbook.iter().find(|(n, _)| n == name))
            .map(|(name, grid)| {
                SheetTable::from_grid(
                    name.clone(),
                    grid.iter().cloned().enumerate(),
                    header_row.unwrap_or(0),
                )
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRef {
    Header(String),
    Position(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec<F> {
    pub field: F,
    pub column: ColumnRef,
    #[serde(default)]
    pub kind: FieldKind,
}

impl<F> FieldSpec<F> {
    pub fn header(field: F, header: &str, kind: FieldKind) -> Self {
        Self {
            field,
            column: ColumnRef::Header(header.to_string()),
            kind,
        }
    }

    pub fn position(field: F, position: usize, kind: FieldKind) -> Self {
        Self {
            field,
            column: ColumnRef::Position(position),
            kind,
        }
    }
}

/// Ordered `(column, field, kind)` descriptor for one source layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema<F> {
    /// Rows with no value in this field are skipped.
    pub name_field: F,
    pub fields: Vec<FieldSpec<F>>,
}

impl<F: Copy + Eq + Hash> SourceSchema<F> {
    /// Narrowest sheet this schema accepts: only the name column is required.
    pub fn min_width(&self) -> usize {
        self.fields
            .iter()
            .filter(|spec| spec.field == self.name_field)
            .filter_map(|spec| match spec.column {
                ColumnRef::Position(p) => Some(p + 1),
                ColumnRef::Header(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Resolve header names against `table` and check its width.
    pub fn bind(&self, table: &SheetTable) -> Result<BoundSchema<F>, SourceError> {
        let required = self.min_width();
        let observed = table.width();
        if observed < required {
            return Err(SourceError::SchemaWidth {
                sheet: table.sheet_name.clone(),
                required,
                observed,
            });
        }
        let columns = self
            .fields
            .iter()
            .map(|spec| {
                let index = match &spec.column {
                    ColumnRef::Position(p) => Some(*p),
                    ColumnRef::Header(h) => table.column_index(h),
                };
                (spec.field, index, spec.kind)
            })
            .collect();
        Ok(BoundSchema {
            name_field: self.name_field,
            columns,
        })
    }
}

/// A schema resolved against one sheet's header row.
#[derive(Debug, Clone)]
pub struct BoundSchema<F> {
    name_field: F,
    columns: Vec<(F, Option<usize>, FieldKind)>,
}

impl<F: Copy + Eq + Hash> BoundSchema<F> {
    /// Read every field of `row`. Missing columns and short rows give absent values.
    pub fn row(&self, row: &[CellValue]) -> RowFields<F> {
        let mut values = HashMap::new();
        for (field, index, kind) in &self.columns {
            let Some(cell) = index.and_then(|i| row.get(i)) else {
                continue;
            };
            let value = match kind {
                FieldKind::Text => cell.as_text().map(FieldValue::Text),
                FieldKind::Number => cell.as_number().map(FieldValue::Number),
                FieldKind::Date => cell.as_date().map(FieldValue::Date),
            };
            if let Some(value) = value {
                values.entry(*field).or_insert(value);
            }
        }
        RowFields {
            name_field: self.name_field,
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// Typed field values read from one row.
#[derive(Debug, Clone)]
pub struct RowFields<F> {
    name_field: F,
    values: HashMap<F, FieldValue>,
}

impl<F: Copy + Eq + Hash> RowFields<F> {
    pub fn text(&self, field: F) -> Option<&str> {
        match self.values.get(&field)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn number(&self, field: F) -> Option<f64> {
        match self.values.get(&field)? {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn date(&self, field: F) -> Option<NaiveDate> {
        match self.values.get(&field)? {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn normalized(&self, field: F) -> Option<String> {
        normalize(self.text(field))
    }

    pub fn cleaned(&self, field: F) -> Option<String> {
        clean_text(self.text(field))
    }

    /// Raw text of the designated name field, `None` when blank.
    pub fn name(&self) -> Option<&str> {
        self.text(self.name_field)
    }
}

/// Where a mapped row came from and when it was extracted.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub source_file: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineField {
    CompanyName,
    Vertical,
    SubVertical,
    Description,
    DealStatus,
    SourcingType,
    TransactionType,
    DealLead,
    Intermediary,
    Revenue,
    Ebitda,
    EnterpriseValue,
    DateAdded,
    Notes,
}

/// One pipeline row, normalized. Feeds both a Company and a Deal.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub raw_name: String,
    pub company_name: String,
    pub vertical: Option<String>,
    pub sub_vertical: Option<String>,
    pub description: Option<String>,
    pub deal_status: Option<String>,
    pub sourcing_type: Option<String>,
    pub transaction_type: Option<String>,
    pub deal_lead: Option<String>,
    pub intermediary: Option<String>,
    pub revenue: Option<f64>,
    pub ebitda: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub date_added: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub fn map_pipeline_row(
    schema: &BoundSchema<PipelineField>,
    row: &[CellValue],
    default_vertical: Option<&str>,
) -> Option<PipelineRecord> {
    use PipelineField as P;

    let fields = schema.row(row);
    let raw_name = fields.name()?.to_string();
    Some(PipelineRecord {
        company_name: normalize(Some(&raw_name))?,
        vertical: fields
            .normalized(P::Vertical)
            .or_else(|| normalize(default_vertical)),
        sub_vertical: fields.normalized(P::SubVertical),
        description: fields.cleaned(P::Description),
        deal_status: fields.normalized(P::DealStatus),
        sourcing_type: fields.normalized(P::SourcingType),
        transaction_type: fields.normalized(P::TransactionType),
        deal_lead: fields.normalized(P::DealLead),
        intermediary: fields.normalized(P::Intermediary),
        revenue: fields.number(P::Revenue),
        ebitda: fields.number(P::Ebitda),
        enterprise_value: fields.number(P::EnterpriseValue),
        date_added: fields.date(P::DateAdded),
        notes: fields.cleaned(P::Notes),
        raw_name,
    })
}

impl PipelineRecord {
    pub fn company_id(&self) -> EntityId {
        resolve_id(&self.raw_name, "")
    }

    pub fn company(&self, ctx: &RowContext<'_>) -> Company {
        Company {
            company_id: self.company_id(),
            company_name: self.company_name.clone(),
            company_type: None,
            vertical: self.vertical.clone(),
            sub_vertical: self.sub_vertical.clone(),
            description: self.description.clone(),
            owner: self.deal_lead.clone(),
            aum: None,
            sector_focus: Vec::new(),
            portfolio_companies: Vec::new(),
            headquarters: None,
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }

    pub fn deal(&self, ctx: &RowContext<'_>, deal_id: Uuid) -> Deal {
        Deal {
            deal_id,
            company_id: self.company_id(),
            company_name: self.company_name.clone(),
            deal_status: self.deal_status.clone(),
            sourcing_type: self.sourcing_type.clone(),
            transaction_type: self.transaction_type.clone(),
            vertical: self.vertical.clone(),
            sub_vertical: self.sub_vertical.clone(),
            deal_lead: self.deal_lead.clone(),
            intermediary: self.intermediary.clone(),
            revenue: self.revenue,
            ebitda: self.ebitda,
            enterprise_value: self.enterprise_value,
            date_added: self.date_added,
            notes: self.notes.clone(),
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompsField {
    FirmType,
    FirmName,
    Aum,
    SectorFocus,
    PortfolioCompanies,
    Headquarters,
    Notes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompsRecord {
    pub raw_name: String,
    pub firm_name: String,
    pub firm_type: Option<String>,
    pub aum: Option<String>,
    pub sector_focus: Vec<String>,
    pub portfolio_companies: Vec<String>,
    pub headquarters: Option<String>,
    pub notes: Option<String>,
}

pub fn map_comps_row(schema: &BoundSchema<CompsField>, row: &[CellValue]) -> Option<CompsRecord> {
    use CompsField as C;

    let fields = schema.row(row);
    let raw_name = fields.name()?.to_string();
    Some(CompsRecord {
        firm_name: normalize(Some(&raw_name))?,
        firm_type: fields.normalized(C::FirmType),
        aum: fields.cleaned(C::Aum),
        sector_focus: split_list(fields.text(C::SectorFocus)),
        portfolio_companies: split_list(fields.text(C::PortfolioCompanies)),
        headquarters: fields.normalized(C::Headquarters),
        notes: fields.cleaned(C::Notes),
        raw_name,
    })
}

impl CompsRecord {
    pub fn company_id(&self) -> EntityId {
        resolve_id(&self.raw_name, "")
    }

    pub fn company(&self, ctx: &RowContext<'_>) -> Company {
        Company {
            company_id: self.company_id(),
            company_name: self.firm_name.clone(),
            company_type: self.firm_type.clone(),
            vertical: None,
            sub_vertical: None,
            description: self.notes.clone(),
            owner: None,
            aum: self.aum.clone(),
            sector_focus: self.sector_focus.clone(),
            portfolio_companies: self.portfolio_companies.clone(),
            headquarters: self.headquarters.clone(),
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }
}

/// Split a delimited cell (`,`, `;` or newline) into normalized entries.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|text| {
            text.split([',', ';', '\n'])
                .filter_map(|part| normalize(Some(part)))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Firm,
    Title,
    Email,
    Phone,
    City,
    Owner,
    Notes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub raw_name: String,
    pub raw_firm: Option<String>,
    pub full_name: String,
    pub firm: Option<String>,
    pub tier: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
}

pub fn map_contact_row(
    schema: &BoundSchema<ContactField>,
    row: &[CellValue],
    tier: Option<&str>,
) -> Option<ContactRecord> {
    use ContactField as C;

    let fields = schema.row(row);
    let raw_name = fields.name()?.to_string();
    Some(ContactRecord {
        full_name: normalize(Some(&raw_name))?,
        raw_firm: fields.text(C::Firm).map(ToString::to_string),
        firm: fields.normalized(C::Firm),
        tier: clean_text(tier),
        title: fields.normalized(C::Title),
        email: normalize_email(fields.text(C::Email)),
        phone: fields.cleaned(C::Phone),
        city: fields.normalized(C::City),
        owner: fields.normalized(C::Owner),
        notes: fields.cleaned(C::Notes),
        raw_name,
    })
}

impl ContactRecord {
    pub fn contact_id(&self) -> EntityId {
        resolve_id(&self.raw_name, self.raw_firm.as_deref().unwrap_or(""))
    }

    pub fn contact(&self, ctx: &RowContext<'_>) -> Contact {
        Contact {
            contact_id: self.contact_id(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            firm: self.firm.clone(),
            tier: self.tier.clone(),
            title: self.title.clone(),
            phone: self.phone.clone(),
            city: self.city.clone(),
            owner: self.owner.clone(),
            notes: self.notes.clone(),
            last_event_attended: None,
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeField {
    Name,
    Email,
    Status,
    Firm,
}

/// One attendee row from an event sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeRecord {
    pub raw_name: String,
    pub raw_email: Option<String>,
    pub attendee_name: String,
    pub email: Option<String>,
    pub firm: Option<String>,
    pub attendance_status: Option<String>,
    pub event_name: String,
}

pub fn map_attendee_row(
    schema: &BoundSchema<AttendeeField>,
    row: &[CellValue],
    sheet_name: &str,
) -> Option<AttendeeRecord> {
    use AttendeeField as A;

    let fields = schema.row(row);
    let raw_name = fields.name()?.to_string();
    let raw_email = fields.text(A::Email).map(ToString::to_string);
    let firm = fields
        .normalized(A::Firm)
        .or_else(|| raw_email.as_deref().and_then(firm_from_email));
    Some(AttendeeRecord {
        attendee_name: normalize(Some(&raw_name))?,
        email: normalize_email(raw_email.as_deref()),
        firm,
        attendance_status: fields.normalized(A::Status),
        event_name: clean_text(Some(sheet_name)).unwrap_or_default(),
        raw_email,
        raw_name,
    })
}

impl AttendeeRecord {
    pub fn contact_id(&self) -> EntityId {
        resolve_id(self.raw_email.as_deref().unwrap_or(""), &self.raw_name)
    }

    pub fn contact(&self, ctx: &RowContext<'_>) -> Contact {
        Contact {
            contact_id: self.contact_id(),
            full_name: self.attendee_name.clone(),
            email: self.email.clone(),
            firm: self.firm.clone(),
            tier: None,
            title: None,
            phone: None,
            city: None,
            owner: None,
            notes: None,
            last_event_attended: Some(self.event_name.clone()),
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }

    pub fn participant(&self, ctx: &RowContext<'_>, participant_id: Uuid) -> MarketingParticipant {
        MarketingParticipant {
            participant_id,
            contact_id: self.contact_id(),
            event_name: self.event_name.clone(),
            attendee_name: self.attendee_name.clone(),
            email: self.email.clone(),
            firm: self.firm.clone(),
            attendance_status: self.attendance_status.clone(),
            source_file: ctx.source_file.to_string(),
            created_at: ctx.created_at,
        }
    }
}

/// `jane@acme.com` -> `Acme`; `bob@north.star.com` -> `North Star`.
pub fn firm_from_email(email: &str) -> Option<String> {
    let (_, domain) = email.trim().split_once('@')?;
    let domain = domain.trim().to_lowercase();
    let domain = domain.strip_suffix(".com").unwrap_or(&domain);
    normalize(Some(&domain.replace('.', " ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::text(*c)
                }
            })
            .collect()
    }

    fn table(headers: &[&str], rows: Vec<Vec<CellValue>>) -> SheetTable {
        SheetTable {
            sheet_name: "Sheet1".to_string(),
            headers: headers.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    fn named_pipeline_schema() -> SourceSchema<PipelineField> {
        SourceSchema {
            name_field: PipelineField::CompanyName,
            fields: vec![
                FieldSpec::header(PipelineField::CompanyName, "Company", FieldKind::Text),
                FieldSpec::header(PipelineField::Description, "Description", FieldKind::Text),
                FieldSpec::header(PipelineField::DealStatus, "Status", FieldKind::Text),
                FieldSpec::header(PipelineField::Revenue, "Revenue", FieldKind::Number),
                FieldSpec::header(PipelineField::Vertical, "Vertical", FieldKind::Text),
            ],
        }
    }

    fn positional_pipeline_schema() -> SourceSchema<PipelineField> {
        SourceSchema {
            name_field: PipelineField::CompanyName,
            fields: vec![
                FieldSpec::position(PipelineField::CompanyName, 0, FieldKind::Text),
                FieldSpec::position(PipelineField::SubVertical, 1, FieldKind::Text),
                FieldSpec::position(PipelineField::DealStatus, 3, FieldKind::Text),
                FieldSpec::position(PipelineField::DateAdded, 10, FieldKind::Date),
            ],
        }
    }

    #[test]
    fn from_grid_skips_rows_above_header() {
        let grid = vec![
            text_row(&["Pipeline report"]),
            text_row(&[""]),
            text_row(&["Company", "Status"]),
            text_row(&["Acme", "Active"]),
        ];
        let table = SheetTable::from_grid("Sheet1", grid.into_iter().enumerate(), 2);
        assert_eq!(table.headers, vec!["Company", "Status"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn named_mapper_reads_by_header_and_tolerates_missing_headers() {
        let t = table(
            &["company ", "Description", "Status", "Revenue"],
            vec![text_row(&[" acme CORP", "Widgets", "active", "$1,200"])],
        );
        let bound = named_pipeline_schema().bind(&t).unwrap();
        let rec = map_pipeline_row(&bound, &t.rows[0], Some("business services")).unwrap();
        assert_eq!(rec.company_name, "Acme Corp");
        assert_eq!(rec.description.as_deref(), Some("Widgets"));
        assert_eq!(rec.deal_status.as_deref(), Some("Active"));
        assert_eq!(rec.revenue, Some(1200.0));
        // no "Vertical" header: falls back to the source default
        assert_eq!(rec.vertical.as_deref(), Some("Business Services"));
        assert_eq!(rec.company_id(), resolve_id("Acme Corp", ""));
    }

    #[test]
    fn rows_without_name_are_skipped() {
        let t = table(
            &["Company", "Description"],
            vec![text_row(&["", "orphan"]), text_row(&["   ", "blank"])],
        );
        let bound = named_pipeline_schema().bind(&t).unwrap();
        assert!(t
            .rows
            .iter()
            .all(|row| map_pipeline_row(&bound, row, None).is_none()));
    }

    #[test]
    fn positional_mapper_degrades_short_rows() {
        let mut wide = text_row(&["Zeta Retail", "apparel", "", "Passed"]);
        wide.resize(11, CellValue::Empty);
        wide[10] = CellValue::text("2024-01-05");
        let t = table(&["A", "B", "C", "D"], vec![wide, text_row(&["Short Co", "food"])]);
        let bound = positional_pipeline_schema().bind(&t).unwrap();

        let full = map_pipeline_row(&bound, &t.rows[0], Some("Consumer / Retail")).unwrap();
        assert_eq!(full.sub_vertical.as_deref(), Some("Apparel"));
        assert_eq!(full.deal_status.as_deref(), Some("Passed"));
        assert_eq!(full.date_added, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(full.vertical.as_deref(), Some("Consumer / Retail"));

        let short = map_pipeline_row(&bound, &t.rows[1], None).unwrap();
        assert_eq!(short.company_name, "Short Co");
        assert_eq!(short.deal_status, None);
        assert_eq!(short.date_added, None);
    }

    #[test]
    fn bind_rejects_sheets_narrower_than_name_column() {
        let schema = SourceSchema {
            name_field: CompsField::FirmName,
            fields: vec![
                FieldSpec::position(CompsField::FirmType, 0, FieldKind::Text),
                FieldSpec::position(CompsField::FirmName, 1, FieldKind::Text),
            ],
        };
        assert_eq!(schema.min_width(), 2);
        let narrow = table(&["Type"], vec![text_row(&["PE Firm"])]);
        let err = schema.bind(&narrow).unwrap_err();
        assert!(matches!(
            err,
            SourceError::SchemaWidth { required: 2, observed: 1, .. }
        ));
    }

    #[test]
    fn comps_mapper_splits_lists() {
        let schema = SourceSchema {
            name_field: CompsField::FirmName,
            fields: vec![
                FieldSpec::position(CompsField::FirmType, 0, FieldKind::Text),
                FieldSpec::position(CompsField::FirmName, 1, FieldKind::Text),
                FieldSpec::position(CompsField::Aum, 2, FieldKind::Text),
                FieldSpec::position(CompsField::SectorFocus, 3, FieldKind::Text),
                FieldSpec::position(CompsField::PortfolioCompanies, 4, FieldKind::Text),
            ],
        };
        let t = table(
            &["Type", "Firm", "AUM", "Sectors", "Portfolio"],
            vec![text_row(&["pe firm", "Summit Peak", "$2.5B", "healthcare; SOFTWARE", "Alpha, Beta,"])],
        );
        let bound = schema.bind(&t).unwrap();
        let rec = map_comps_row(&bound, &t.rows[0]).unwrap();
        assert_eq!(rec.firm_type.as_deref(), Some("Pe Firm"));
        assert_eq!(rec.aum.as_deref(), Some("$2.5B"));
        assert_eq!(rec.sector_focus, vec!["Healthcare", "Software"]);
        assert_eq!(rec.portfolio_companies, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn contact_id_uses_name_and_firm() {
        let schema = SourceSchema {
            name_field: ContactField::Name,
            fields: vec![
                FieldSpec::header(ContactField::Name, "Name", FieldKind::Text),
                FieldSpec::header(ContactField::Firm, "Firm", FieldKind::Text),
                FieldSpec::header(ContactField::Email, "Email", FieldKind::Text),
            ],
        };
        let t = table(
            &["Name", "Firm", "Email"],
            vec![text_row(&["Jane Doe", "Acme", "JANE@ACME.COM"])],
        );
        let bound = schema.bind(&t).unwrap();
        let rec = map_contact_row(&bound, &t.rows[0], Some("Tier 1")).unwrap();
        assert_eq!(rec.contact_id().as_str(), "d96492467553");
        assert_eq!(rec.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(rec.tier.as_deref(), Some("Tier 1"));
    }

    #[test]
    fn attendee_firm_derived_from_email() {
        assert_eq!(firm_from_email("jane@acme.com").as_deref(), Some("Acme"));
        assert_eq!(
            firm_from_email("bob@north.star.com").as_deref(),
            Some("North Star")
        );
        assert_eq!(firm_from_email("nobody"), None);

        let schema = SourceSchema {
            name_field: AttendeeField::Name,
            fields: vec![
                FieldSpec::header(AttendeeField::Name, "Name", FieldKind::Text),
                FieldSpec::header(AttendeeField::Email, "Email", FieldKind::Text),
                FieldSpec::header(AttendeeField::Status, "Status", FieldKind::Text),
                FieldSpec::header(AttendeeField::Firm, "Firm", FieldKind::Text),
            ],
        };
        let t = table(
            &["Name", "Email", "Status"],
            vec![text_row(&["jane doe", "jane@acme.com", "attended"])],
        );
        let bound = schema.bind(&t).unwrap();
        let rec = map_attendee_row(&bound, &t.rows[0], " Spring Summit 2024 ").unwrap();
        assert_eq!(rec.firm.as_deref(), Some("Acme"));
        assert_eq!(rec.event_name, "Spring Summit 2024");
        assert_eq!(rec.contact_id(), resolve_id("jane@acme.com", "jane doe"));
        let contact = rec.contact(&RowContext {
            source_file: "Events.xlsx",
            created_at: Utc::now(),
        });
        assert_eq!(contact.last_event_attended.as_deref(), Some("Spring Summit 2024"));
    }

    #[test]
    fn memory_reader_reports_missing_workbooks_and_sheets() {
        let reader = MemoryReader::new().with_sheet(
            "contacts.xlsx",
            "Tier 1's",
            vec![text_row(&["Name"]), text_row(&["Jane"])],
        );
        let err = reader
            .read(Path::new("missing.xlsx"), None, &SheetSelection::First)
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));

        let err = reader
            .read(
                Path::new("contacts.xlsx"),
                None,
                &SheetSelection::Named(vec!["Tier 2's".to_string()]),
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingSheet { .. }));

        let tables = reader
            .read(Path::new("contacts.xlsx"), None, &SheetSelection::All)
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 1);
    }

    #[test]
    fn schema_descriptor_deserializes_from_yaml() {
        let yaml = r#"
name_field: company_name
fields:
  - field: company_name
    column: { position: 0 }
  - field: revenue
    column: { header: Revenue }
    kind: number
"#;
        let schema: SourceSchema<PipelineField> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.fields[0].kind, FieldKind::Text);
        assert_eq!(schema.fields[1].column, ColumnRef::Header("Revenue".into()));
        assert_eq!(schema.min_width(), 1);
    }
}
