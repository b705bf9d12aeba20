//! Extraction orchestration: source configuration, the four table
//! extractions, and parquet/JSON snapshot export.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use dealflow_core::{
    AuditAction, AuditEntry, AuditLog, ChoiceDomain, ChoiceFields, Company, Contact, Deal,
    EntityMap, MarketingParticipant,
};
use dealflow_sources::{
    map_attendee_row, map_comps_row, map_contact_row, map_pipeline_row, AttendeeField,
    BoundSchema, CompsField, ContactField, FieldKind, FieldSpec, PipelineField, RowContext,
    SheetSelection, SheetTable, SourceSchema, WorkbookReader,
};
use dealflow_storage::{OutputStore, StoredOutput};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};
use uuid::Uuid;

pub const COMPANIES_TABLE: &str = "Companies";
pub const CONTACTS_TABLE: &str = "Contacts";
pub const DEALS_TABLE: &str = "Deals";
pub const PARTICIPANTS_TABLE: &str = "Marketing Participants";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSourceConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub header_row: Option<usize>,
    /// Used when a row has no vertical of its own.
    #[serde(default)]
    pub default_vertical: Option<String>,
    pub schema: SourceSchema<PipelineField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompsSourceConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub header_row: Option<usize>,
    pub schema: SourceSchema<CompsField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSheet {
    pub sheet: String,
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactsSourceConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub header_row: Option<usize>,
    /// Processed in order; earlier tiers win identifier collisions.
    pub tiers: Vec<TierSheet>,
    pub schema: SourceSchema<ContactField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsSourceConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub header_row: Option<usize>,
    pub schema: SourceSchema<AttendeeField>,
}

/// Which workbooks to read and how each one is laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub business_services: PipelineSourceConfig,
    pub consumer_retail: PipelineSourceConfig,
    pub competitor_comps: CompsSourceConfig,
    pub contacts: ContactsSourceConfig,
    pub events: EventsSourceConfig,
}

impl ExtractConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        use FieldKind::{Date, Number, Text};

        let business_services = {
            use PipelineField as P;
            SourceSchema {
                name_field: P::CompanyName,
                fields: vec![
                    FieldSpec::header(P::CompanyName, "Company", Text),
                    FieldSpec::header(P::Vertical, "Vertical", Text),
                    FieldSpec::header(P::SubVertical, "Sub-Vertical", Text),
                    FieldSpec::header(P::Description, "Description", Text),
                    FieldSpec::header(P::DealStatus, "Status", Text),
                    FieldSpec::header(P::SourcingType, "Sourcing", Text),
                    FieldSpec::header(P::TransactionType, "Transaction Type", Text),
                    FieldSpec::header(P::DealLead, "Deal Lead", Text),
                    FieldSpec::header(P::Intermediary, "Banker", Text),
                    FieldSpec::header(P::Revenue, "Revenue", Number),
                    FieldSpec::header(P::Ebitda, "EBITDA", Number),
                    FieldSpec::header(P::EnterpriseValue, "EV", Number),
                    FieldSpec::header(P::DateAdded, "Date Added", Date),
                    FieldSpec::header(P::Notes, "Notes", Text),
                ],
            }
        };

        let consumer_retail = {
            use PipelineField as P;
            SourceSchema {
                name_field: P::CompanyName,
                fields: vec![
                    FieldSpec::position(P::CompanyName, 0, Text),
                    FieldSpec::position(P::SubVertical, 1, Text),
                    FieldSpec::position(P::Description, 2, Text),
                    FieldSpec::position(P::DealStatus, 3, Text),
                    FieldSpec::position(P::SourcingType, 4, Text),
                    FieldSpec::position(P::TransactionType, 5, Text),
                    FieldSpec::position(P::Revenue, 6, Number),
                    FieldSpec::position(P::Ebitda, 7, Number),
                    FieldSpec::position(P::DealLead, 8, Text),
                    FieldSpec::position(P::Intermediary, 9, Text),
                    FieldSpec::position(P::DateAdded, 10, Date),
                    FieldSpec::position(P::Notes, 11, Text),
                ],
            }
        };

        let comps = {
            use CompsField as C;
            SourceSchema {
                name_field: C::FirmName,
                fields: vec![
                    FieldSpec::position(C::FirmType, 0, Text),
                    FieldSpec::position(C::FirmName, 1, Text),
                    FieldSpec::position(C::Aum, 2, Text),
                    FieldSpec::position(C::SectorFocus, 3, Text),
                    FieldSpec::position(C::PortfolioCompanies, 4, Text),
                    FieldSpec::position(C::Headquarters, 5, Text),
                    FieldSpec::position(C::Notes, 6, Text),
                ],
            }
        };

        let contacts = {
            use ContactField as C;
            SourceSchema {
                name_field: C::Name,
                fields: vec![
                    FieldSpec::header(C::Name, "Name", Text),
                    FieldSpec::header(C::Firm, "Firm", Text),
                    FieldSpec::header(C::Title, "Title", Text),
                    FieldSpec::header(C::Email, "Email", Text),
                    FieldSpec::header(C::Phone, "Phone", Text),
                    FieldSpec::header(C::City, "City", Text),
                    FieldSpec::header(C::Owner, "Relationship Owner", Text),
                    FieldSpec::header(C::Notes, "Notes", Text),
                ],
            }
        };

        let events = {
            use AttendeeField as A;
            SourceSchema {
                name_field: A::Name,
                fields: vec![
                    FieldSpec::header(A::Name, "Name", Text),
                    FieldSpec::header(A::Email, "Email", Text),
                    FieldSpec::header(A::Status, "Status", Text),
                    FieldSpec::header(A::Firm, "Firm", Text),
                ],
            }
        };

        Self {
            business_services: PipelineSourceConfig {
                file: PathBuf::from("Business_Services_Pipeline.xlsx"),
                header_row: Some(5),
                default_vertical: Some("Business Services".to_string()),
                schema: business_services,
            },
            consumer_retail: PipelineSourceConfig {
                file: PathBuf::from("Consumer_Retail_Pipeline.xlsx"),
                header_row: Some(7),
                default_vertical: Some("Consumer / Retail".to_string()),
                schema: consumer_retail,
            },
            competitor_comps: CompsSourceConfig {
                file: PathBuf::from("Competitor_Comps.xlsx"),
                header_row: Some(1),
                schema: comps,
            },
            contacts: ContactsSourceConfig {
                file: PathBuf::from("Contacts.xlsx"),
                header_row: None,
                tiers: vec![
                    TierSheet {
                        sheet: "Tier 1's".to_string(),
                        tier: "Tier 1".to_string(),
                    },
                    TierSheet {
                        sheet: "Tier 2's".to_string(),
                        tier: "Tier 2".to_string(),
                    },
                ],
                schema: contacts,
            },
            events: EventsSourceConfig {
                file: PathBuf::from("Events.xlsx"),
                header_row: None,
                schema: events,
            },
        }
    }
}

/// Everything one full extraction run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub companies: Vec<Company>,
    pub contacts: Vec<Contact>,
    pub deals: Vec<Deal>,
    pub marketing_participants: Vec<MarketingParticipant>,
    pub choice_fields: ChoiceFields,
    pub audit_trail: Vec<AuditEntry>,
}

impl ExtractionOutput {
    pub fn error_count(&self) -> usize {
        self.audit_trail
            .iter()
            .filter(|e| e.action == AuditAction::Error)
            .count()
    }

    pub fn table_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            (COMPANIES_TABLE, self.companies.len()),
            (CONTACTS_TABLE, self.contacts.len()),
            (DEALS_TABLE, self.deals.len()),
            (PARTICIPANTS_TABLE, self.marketing_participants.len()),
        ])
    }
}

/// Runs the extractions for one set of workbooks.
///
/// Lifecycle: build one extractor per run, call the extractions in any order,
/// read the results, drop it. The company and contact maps accumulate across
/// calls and only ever grow; the first record stored under an id is kept.
pub struct Extractor<R> {
    reader: R,
    config: ExtractConfig,
    input_dir: PathBuf,
    companies: EntityMap<Company>,
    contacts: EntityMap<Contact>,
    choice_fields: ChoiceFields,
    audit: AuditLog,
}

impl<R: WorkbookReader> Extractor<R> {
    pub fn new(reader: R, config: ExtractConfig, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            config,
            input_dir: input_dir.into(),
            companies: EntityMap::new(),
            contacts: EntityMap::new(),
            choice_fields: ChoiceFields::default(),
            audit: AuditLog::new(),
        }
    }

    pub fn companies(&self) -> &EntityMap<Company> {
        &self.companies
    }

    pub fn contacts(&self) -> &EntityMap<Contact> {
        &self.contacts
    }

    pub fn choice_fields(&self) -> &ChoiceFields {
        &self.choice_fields
    }

    pub fn audit_trail(&self) -> &[AuditEntry] {
        self.audit.entries()
    }

    /// Load one workbook and bind `schema` to each of its sheets. Any failure
    /// is logged as an `ERROR` entry and the failing source (or sheet)
    /// contributes no rows.
    fn load<F: Copy + Eq + Hash>(
        &mut self,
        file: &Path,
        header_row: Option<usize>,
        sheets: &SheetSelection,
        schema: &SourceSchema<F>,
    ) -> Vec<(SheetTable, BoundSchema<F>)> {
        let source = source_name(file);
        let path = self.input_dir.join(file);
        let tables = match self.reader.read(&path, header_row, sheets) {
            Ok(tables) => tables,
            Err(err) => {
                self.audit.record(&source, AuditAction::Error, 0, err.to_string());
                return Vec::new();
            }
        };

        let mut bound = Vec::with_capacity(tables.len());
        for table in tables {
            match schema.bind(&table) {
                Ok(schema) => bound.push((table, schema)),
                Err(err) => {
                    let sheet_source = format!("{source} [{}]", table.sheet_name);
                    self.audit
                        .record(sheet_source, AuditAction::Error, 0, err.to_string());
                }
            }
        }
        if !bound.is_empty() {
            let rows = bound.iter().map(|(t, _)| t.rows.len()).sum();
            let sheets = bound
                .iter()
                .map(|(t, _)| t.sheet_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.audit
                .record(&source, AuditAction::Loaded, rows, format!("sheets: {sheets}"));
        }
        bound
    }

    fn pipeline_sources(&self) -> [PipelineSourceConfig; 2] {
        [
            self.config.business_services.clone(),
            self.config.consumer_retail.clone(),
        ]
    }

    fn fold_company(&mut self, company: Company) -> bool {
        let id = company.company_id.clone();
        let inserted = self.companies.upsert_if_absent(id.clone(), company);
        if !inserted {
            debug!(company_id = %id, "company already present, later record dropped");
        }
        inserted
    }

    fn fold_contact(&mut self, contact: Contact) -> bool {
        let id = contact.contact_id.clone();
        let inserted = self.contacts.upsert_if_absent(id.clone(), contact);
        if !inserted {
            debug!(contact_id = %id, "contact already present, later record dropped");
        }
        inserted
    }

    /// Business-services pipeline, then consumer/retail pipeline, then comps.
    pub fn extract_companies(&mut self) -> Vec<Company> {
        let span = info_span!("extract_companies");
        let _guard = span.enter();
        let created_at = Utc::now();
        let mut added = 0usize;
        let mut dropped = 0usize;

        for cfg in self.pipeline_sources() {
            let source_file = source_name(&cfg.file);
            let ctx = RowContext {
                source_file: &source_file,
                created_at,
            };
            let loaded = self.load(
                &cfg.file,
                cfg.header_row,
                &SheetSelection::First,
                &cfg.schema,
            );
            for (table, schema) in &loaded {
                for row in &table.rows {
                    let Some(record) =
                        map_pipeline_row(schema, row, cfg.default_vertical.as_deref())
                    else {
                        continue;
                    };
                    if self.fold_company(record.company(&ctx)) {
                        added += 1;
                    } else {
                        dropped += 1;
                    }
                }
            }
        }

        let cfg = self.config.competitor_comps.clone();
        let source_file = source_name(&cfg.file);
        let ctx = RowContext {
            source_file: &source_file,
            created_at,
        };
        let loaded = self.load(
            &cfg.file,
            cfg.header_row,
            &SheetSelection::First,
            &cfg.schema,
        );
        for (table, schema) in &loaded {
            for row in &table.rows {
                let Some(record) = map_comps_row(schema, row) else {
                    continue;
                };
                if self.fold_company(record.company(&ctx)) {
                    added += 1;
                } else {
                    dropped += 1;
                }
            }
        }

        if self.companies.is_empty() {
            warn!("no companies extracted from any source");
        }
        self.audit.record(
            COMPANIES_TABLE,
            AuditAction::Extracted,
            self.companies.len(),
            format!("{added} added, {dropped} duplicates dropped"),
        );
        self.companies.values().to_vec()
    }

    /// Tier sheets in configured order, then contacts derived from event attendees.
    pub fn extract_contacts(&mut self) -> Vec<Contact> {
        let span = info_span!("extract_contacts");
        let _guard = span.enter();
        let created_at = Utc::now();
        let mut added = 0usize;
        let mut dropped = 0usize;

        let cfg = self.config.contacts.clone();
        let source_file = source_name(&cfg.file);
        let ctx = RowContext {
            source_file: &source_file,
            created_at,
        };
        let tier_sheets = SheetSelection::Named(cfg.tiers.iter().map(|t| t.sheet.clone()).collect());
        let loaded = self.load(&cfg.file, cfg.header_row, &tier_sheets, &cfg.schema);
        for (table, schema) in &loaded {
            let tier = cfg
                .tiers
                .iter()
                .find(|t| t.sheet == table.sheet_name)
                .map(|t| t.tier.as_str());
            for row in &table.rows {
                let Some(record) = map_contact_row(schema, row, tier) else {
                    continue;
                };
                if self.fold_contact(record.contact(&ctx)) {
                    added += 1;
                } else {
                    dropped += 1;
                }
            }
        }

        let cfg = self.config.events.clone();
        let source_file = source_name(&cfg.file);
        let ctx = RowContext {
            source_file: &source_file,
            created_at,
        };
        let loaded = self.load(&cfg.file, cfg.header_row, &SheetSelection::All, &cfg.schema);
        for (table, schema) in &loaded {
            for row in &table.rows {
                let Some(record) = map_attendee_row(schema, row, &table.sheet_name) else {
                    continue;
                };
                if self.fold_contact(record.contact(&ctx)) {
                    added += 1;
                } else {
                    dropped += 1;
                }
            }
        }

        if self.contacts.is_empty() {
            warn!("no contacts extracted from any source");
        }
        self.audit.record(
            CONTACTS_TABLE,
            AuditAction::Extracted,
            self.contacts.len(),
            format!("{added} added, {dropped} duplicates dropped"),
        );
        self.contacts.values().to_vec()
    }

    /// One deal per named pipeline row; also feeds the choice-field sets.
    pub fn extract_deals(&mut self) -> Vec<Deal> {
        let span = info_span!("extract_deals");
        let _guard = span.enter();
        let created_at = Utc::now();
        let mut deals = Vec::new();

        for cfg in self.pipeline_sources() {
            let source_file = source_name(&cfg.file);
            let ctx = RowContext {
                source_file: &source_file,
                created_at,
            };
            let loaded = self.load(
                &cfg.file,
                cfg.header_row,
                &SheetSelection::First,
                &cfg.schema,
            );
            for (table, schema) in &loaded {
                for row in &table.rows {
                    let Some(record) =
                        map_pipeline_row(schema, row, cfg.default_vertical.as_deref())
                    else {
                        continue;
                    };
                    let deal = record.deal(&ctx, Uuid::new_v4());
                    self.observe_choices(&deal);
                    deals.push(deal);
                }
            }
        }

        self.audit
            .record(DEALS_TABLE, AuditAction::Extracted, deals.len(), "");
        deals
    }

    fn observe_choices(&mut self, deal: &Deal) {
        let choices = &mut self.choice_fields;
        choices.observe(ChoiceDomain::DealStatus, deal.deal_status.as_deref());
        choices.observe(ChoiceDomain::SourcingType, deal.sourcing_type.as_deref());
        choices.observe(ChoiceDomain::TransactionType, deal.transaction_type.as_deref());
        choices.observe(ChoiceDomain::Verticals, deal.vertical.as_deref());
        choices.observe(ChoiceDomain::SubVerticals, deal.sub_vertical.as_deref());
    }

    /// One participant per attendee row of every event sheet.
    pub fn extract_marketing_participants(&mut self) -> Vec<MarketingParticipant> {
        let span = info_span!("extract_marketing_participants");
        let _guard = span.enter();
        let created_at = Utc::now();
        let mut participants = Vec::new();

        let cfg = self.config.events.clone();
        let source_file = source_name(&cfg.file);
        let ctx = RowContext {
            source_file: &source_file,
            created_at,
        };
        let loaded = self.load(&cfg.file, cfg.header_row, &SheetSelection::All, &cfg.schema);
        for (table, schema) in &loaded {
            for row in &table.rows {
                if let Some(record) = map_attendee_row(schema, row, &table.sheet_name) {
                    participants.push(record.participant(&ctx, Uuid::new_v4()));
                }
            }
        }

        self.audit.record(
            PARTICIPANTS_TABLE,
            AuditAction::Extracted,
            participants.len(),
            "",
        );
        participants
    }

    /// Run all four extractions and collect the results.
    pub fn run_all(mut self) -> ExtractionOutput {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("extraction_run", %run_id);
        let _guard = span.enter();

        let companies = self.extract_companies();
        let contacts = self.extract_contacts();
        let deals = self.extract_deals();
        let marketing_participants = self.extract_marketing_participants();

        ExtractionOutput {
            run_id,
            started_at,
            finished_at: Utc::now(),
            companies,
            contacts,
            deals,
            marketing_participants,
            choice_fields: self.choice_fields,
            audit_trail: self.audit.entries().to_vec(),
        }
    }
}

fn source_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub files: Vec<SnapshotManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Write every table, the audit trail and the choice-field sets under
/// `<store root>/<run_id>/`, followed by a manifest. Returns the manifest path.
pub fn export_snapshots(output: &ExtractionOutput, store: &OutputStore) -> Result<PathBuf> {
    let run_dir = PathBuf::from(output.run_id.to_string());
    let mut files = Vec::new();

    let mut put = |name: &str, file: &str, bytes: Vec<u8>| -> Result<()> {
        let stored = store.write_bytes(run_dir.join(file), &bytes)?;
        files.push(manifest_entry(name, &stored));
        Ok(())
    };

    put("companies", "companies.parquet", companies_parquet(&output.companies)?)?;
    put("contacts", "contacts.parquet", contacts_parquet(&output.contacts)?)?;
    put("deals", "deals.parquet", deals_parquet(&output.deals)?)?;
    put(
        "marketing_participants",
        "marketing_participants.parquet",
        participants_parquet(&output.marketing_participants)?,
    )?;
    put(
        "audit_trail",
        "audit_trail.json",
        serde_json::to_vec_pretty(&output.audit_trail).context("serializing audit trail")?,
    )?;
    put(
        "choice_fields",
        "choice_fields.json",
        serde_json::to_vec_pretty(&output.choice_fields).context("serializing choice fields")?,
    )?;
    put(
        "summary",
        "extraction_summary.md",
        summary_markdown(output).into_bytes(),
    )?;

    let manifest = SnapshotManifest {
        schema_version: 1,
        run_id: output.run_id,
        files,
    };
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing snapshot manifest")?;
    let stored = store.write_bytes(run_dir.join("manifest.json"), &bytes)?;
    Ok(stored.absolute_path)
}

fn manifest_entry(name: &str, stored: &StoredOutput) -> SnapshotManifestFile {
    SnapshotManifestFile {
        name: name.to_string(),
        path: stored.relative_path.display().to_string(),
        sha256: stored.content_hash.clone(),
        bytes: stored.byte_size as u64,
    }
}

pub fn summary_markdown(output: &ExtractionOutput) -> String {
    let counts = output
        .table_counts()
        .iter()
        .map(|(table, count)| format!("- {table}: {count}"))
        .collect::<Vec<_>>()
        .join("\n");
    let choices = ChoiceDomain::ALL
        .iter()
        .map(|d| format!("- {}: {}", d.as_str(), output.choice_fields.count(*d)))
        .collect::<Vec<_>>()
        .join("\n");
    let errors = output
        .audit_trail
        .iter()
        .filter(|e| e.action == AuditAction::Error)
        .map(|e| format!("- {}: {}", e.source, e.note))
        .collect::<Vec<_>>();
    let errors = if errors.is_empty() {
        "- none".to_string()
    } else {
        errors.join("\n")
    };
    format!(
        "# Extraction Summary\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n\n## Tables\n{}\n\n## Choice Fields\n{}\n\n## Source Errors\n{}\n",
        output.run_id, output.started_at, output.finished_at, counts, choices, errors
    )
}

fn text_column(values: Vec<Option<String>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn float_column(values: Vec<Option<f64>>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

fn join_list(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

fn parquet_bytes(name: &str, fields: Vec<ArrowField>, columns: Vec<ArrayRef>) -> Result<Vec<u8>> {
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("building {name} record batch"))?;
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)
        .with_context(|| format!("opening parquet writer for {name}"))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing {name} record batch"))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer for {name}"))?;
    Ok(buf)
}

fn utf8(name: &str, nullable: bool) -> ArrowField {
    ArrowField::new(name, DataType::Utf8, nullable)
}

fn float64(name: &str) -> ArrowField {
    ArrowField::new(name, DataType::Float64, true)
}

fn companies_parquet(rows: &[Company]) -> Result<Vec<u8>> {
    let fields = vec![
        utf8("company_id", false),
        utf8("company_name", false),
        utf8("company_type", true),
        utf8("vertical", true),
        utf8("sub_vertical", true),
        utf8("description", true),
        utf8("owner", true),
        utf8("aum", true),
        utf8("sector_focus", true),
        utf8("portfolio_companies", true),
        utf8("headquarters", true),
        utf8("source_file", false),
        utf8("created_at", false),
    ];
    let columns = vec![
        text_column(rows.iter().map(|r| Some(r.company_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.company_name.clone())).collect()),
        text_column(rows.iter().map(|r| r.company_type.clone()).collect()),
        text_column(rows.iter().map(|r| r.vertical.clone()).collect()),
        text_column(rows.iter().map(|r| r.sub_vertical.clone()).collect()),
        text_column(rows.iter().map(|r| r.description.clone()).collect()),
        text_column(rows.iter().map(|r| r.owner.clone()).collect()),
        text_column(rows.iter().map(|r| r.aum.clone()).collect()),
        text_column(rows.iter().map(|r| join_list(&r.sector_focus)).collect()),
        text_column(rows.iter().map(|r| join_list(&r.portfolio_companies)).collect()),
        text_column(rows.iter().map(|r| r.headquarters.clone()).collect()),
        text_column(rows.iter().map(|r| Some(r.source_file.clone())).collect()),
        text_column(rows.iter().map(|r| Some(r.created_at.to_rfc3339())).collect()),
    ];
    parquet_bytes("companies", fields, columns)
}

fn contacts_parquet(rows: &[Contact]) -> Result<Vec<u8>> {
    let fields = vec![
        utf8("contact_id", false),
        utf8("full_name", false),
        utf8("email", true),
        utf8("firm", true),
        utf8("tier", true),
        utf8("title", true),
        utf8("phone", true),
        utf8("city", true),
        utf8("owner", true),
        utf8("notes", true),
        utf8("last_event_attended", true),
        utf8("source_file", false),
        utf8("created_at", false),
    ];
    let columns = vec![
        text_column(rows.iter().map(|r| Some(r.contact_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.full_name.clone())).collect()),
        text_column(rows.iter().map(|r| r.email.clone()).collect()),
        text_column(rows.iter().map(|r| r.firm.clone()).collect()),
        text_column(rows.iter().map(|r| r.tier.clone()).collect()),
        text_column(rows.iter().map(|r| r.title.clone()).collect()),
        text_column(rows.iter().map(|r| r.phone.clone()).collect()),
        text_column(rows.iter().map(|r| r.city.clone()).collect()),
        text_column(rows.iter().map(|r| r.owner.clone()).collect()),
        text_column(rows.iter().map(|r| r.notes.clone()).collect()),
        text_column(rows.iter().map(|r| r.last_event_attended.clone()).collect()),
        text_column(rows.iter().map(|r| Some(r.source_file.clone())).collect()),
        text_column(rows.iter().map(|r| Some(r.created_at.to_rfc3339())).collect()),
    ];
    parquet_bytes("contacts", fields, columns)
}

fn deals_parquet(rows: &[Deal]) -> Result<Vec<u8>> {
    let fields = vec![
        utf8("deal_id", false),
        utf8("company_id", false),
        utf8("company_name", false),
        utf8("deal_status", true),
        utf8("sourcing_type", true),
        utf8("transaction_type", true),
        utf8("vertical", true),
        utf8("sub_vertical", true),
        utf8("deal_lead", true),
        utf8("intermediary", true),
        float64("revenue"),
        float64("ebitda"),
        float64("enterprise_value"),
        utf8("date_added", true),
        utf8("notes", true),
        utf8("source_file", false),
        utf8("created_at", false),
    ];
    let columns = vec![
        text_column(rows.iter().map(|r| Some(r.deal_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.company_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.company_name.clone())).collect()),
        text_column(rows.iter().map(|r| r.deal_status.clone()).collect()),
        text_column(rows.iter().map(|r| r.sourcing_type.clone()).collect()),
        text_column(rows.iter().map(|r| r.transaction_type.clone()).collect()),
        text_column(rows.iter().map(|r| r.vertical.clone()).collect()),
        text_column(rows.iter().map(|r| r.sub_vertical.clone()).collect()),
        text_column(rows.iter().map(|r| r.deal_lead.clone()).collect()),
        text_column(rows.iter().map(|r| r.intermediary.clone()).collect()),
        float_column(rows.iter().map(|r| r.revenue).collect()),
        float_column(rows.iter().map(|r| r.ebitda).collect()),
        float_column(rows.iter().map(|r| r.enterprise_value).collect()),
        text_column(
            rows.iter()
                .map(|r| r.date_added.map(|d| d.format("%Y-%m-%d").to_string()))
                .collect(),
        ),
        text_column(rows.iter().map(|r| r.notes.clone()).collect()),
        text_column(rows.iter().map(|r| Some(r.source_file.clone())).collect()),
        text_column(rows.iter().map(|r| Some(r.created_at.to_rfc3339())).collect()),
    ];
    parquet_bytes("deals", fields, columns)
}

fn participants_parquet(rows: &[MarketingParticipant]) -> Result<Vec<u8>> {
    let fields = vec![
        utf8("participant_id", false),
        utf8("contact_id", false),
        utf8("event_name", false),
        utf8("attendee_name", false),
        utf8("email", true),
        utf8("firm", true),
        utf8("attendance_status", true),
        utf8("source_file", false),
        utf8("created_at", false),
    ];
    let columns = vec![
        text_column(rows.iter().map(|r| Some(r.participant_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.contact_id.to_string())).collect()),
        text_column(rows.iter().map(|r| Some(r.event_name.clone())).collect()),
        text_column(rows.iter().map(|r| Some(r.attendee_name.clone())).collect()),
        text_column(rows.iter().map(|r| r.email.clone()).collect()),
        text_column(rows.iter().map(|r| r.firm.clone()).collect()),
        text_column(rows.iter().map(|r| r.attendance_status.clone()).collect()),
        text_column(rows.iter().map(|r| Some(r.source_file.clone())).collect()),
        text_column(rows.iter().map(|r| Some(r.created_at.to_rfc3339())).collect()),
    ];
    parquet_bytes("marketing_participants", fields, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_sources_yaml_matches_default_layout() {
        let text = include_str!("../../../sources.yaml");
        let parsed: ExtractConfig = serde_yaml::from_str(text).expect("parse sources.yaml");
        assert_eq!(parsed, ExtractConfig::default());
    }

    #[test]
    fn default_layout_matches_reference_header_rows() {
        let config = ExtractConfig::default();
        assert_eq!(config.business_services.header_row, Some(5));
        assert_eq!(config.consumer_retail.header_row, Some(7));
        assert_eq!(config.competitor_comps.header_row, Some(1));
        assert_eq!(config.consumer_retail.schema.min_width(), 1);
        assert_eq!(config.competitor_comps.schema.min_width(), 2);
        assert_eq!(config.contacts.tiers[0].sheet, "Tier 1's");
    }

    #[test]
    fn empty_tables_still_produce_valid_parquet() {
        let bytes = companies_parquet(&[]).expect("parquet");
        assert_eq!(&bytes[..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
    }

    #[test]
    fn list_columns_join_with_semicolons() {
        assert_eq!(join_list(&[]), None);
        assert_eq!(
            join_list(&["Alpha".to_string(), "Beta".to_string()]).as_deref(),
            Some("Alpha; Beta")
        );
    }
}
