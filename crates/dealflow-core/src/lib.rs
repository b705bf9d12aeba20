//! Core domain model for dealflow: identity keys, text normalization, the
//! first-write-wins entity map, choice-field tracking and the audit trail.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

/// Number of hex characters kept from the identity digest (48 bits).
pub const ID_HEX_LEN: usize = 12;

const ID_KEY_SEPARATOR: char = '_';

/// Stable short identifier for Company and Contact records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive an [`EntityId`] from one or two natural-key strings.
///
/// Both parts are trimmed and lowercased, joined with `_`, hashed with
/// SHA-256 and truncated to [`ID_HEX_LEN`] hex characters. Two different keys
/// can collide once record volumes approach 2^24; that is accepted for the
/// sizes these workbooks reach.
pub fn resolve_id(primary: &str, secondary: &str) -> EntityId {
    let key = format!(
        "{}{}{}",
        primary.trim().to_lowercase(),
        ID_KEY_SEPARATOR,
        secondary.trim().to_lowercase()
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(ID_HEX_LEN);
    EntityId(digest)
}

/// Canonical display form: trimmed and title-cased, `None` when blank.
pub fn normalize(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(title_case(trimmed))
}

/// Trim only; case is preserved. Used for prose and free-form values.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_email(value: Option<&str>) -> Option<String> {
    clean_text(value).map(|email| email.to_lowercase())
}

/// Uppercase every letter that does not follow another letter, lowercase the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

/// One spreadsheet cell as it crosses the reader boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
    #[default]
    Empty,
}

const TEXT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => clean_text(Some(s)),
            Self::Number(n) => Some(format_number(*n)),
            Self::Date(dt) => Some(dt.date().format("%Y-%m-%d").to_string()),
            Self::Empty => None,
        }
    }

    /// Numbers pass through; text such as `"$1,250.5"` is parsed leniently.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => {
                let digits: String = s
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | ' '))
                    .collect();
                digits.parse::<f64>().ok()
            }
            _ => None,
        }
    }

    /// `%Y` also accepts two digits, so a year below 100 means the text
    /// was `03/15/24` and the short-year format must handle it.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(dt) => Some(dt.date()),
            Self::Text(s) => {
                let s = s.trim();
                TEXT_DATE_FORMATS.iter().find_map(|fmt| {
                    NaiveDate::parse_from_str(s, fmt)
                        .ok()
                        .filter(|d| d.year() >= 100)
                })
            }
            _ => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: EntityId,
    pub company_name: String,
    pub company_type: Option<String>,
    pub vertical: Option<String>,
    pub sub_vertical: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub aum: Option<String>,
    pub sector_focus: Vec<String>,
    pub portfolio_companies: Vec<String>,
    pub headquarters: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: EntityId,
    pub full_name: String,
    pub email: Option<String>,
    pub firm: Option<String>,
    pub tier: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub last_event_attended: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// One pipeline row. Never deduplicated; `company_id` may not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: Uuid,
    pub company_id: EntityId,
    pub company_name: String,
    pub deal_status: Option<String>,
    pub sourcing_type: Option<String>,
    pub transaction_type: Option<String>,
    pub vertical: Option<String>,
    pub sub_vertical: Option<String>,
    pub deal_lead: Option<String>,
    pub intermediary: Option<String>,
    pub revenue: Option<f64>,
    pub ebitda: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub date_added: Option<NaiveDate>,
    pub notes: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// One (event, attendee) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingParticipant {
    pub participant_id: Uuid,
    pub contact_id: EntityId,
    pub event_name: String,
    pub attendee_name: String,
    pub email: Option<String>,
    pub firm: Option<String>,
    pub attendance_status: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// Insertion-ordered map where the first record stored for an id wins.
#[derive(Debug, Clone)]
pub struct EntityMap<T> {
    index: HashMap<EntityId, usize>,
    records: Vec<T>,
}

impl<T> Default for EntityMap<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            records: Vec::new(),
        }
    }
}

impl<T> EntityMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under `id` unless the id is already taken.
    /// Returns `false` (and drops `record`) when the id was present.
    pub fn upsert_if_absent(&mut self, id: EntityId, record: T) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.records.len());
        self.records.push(record);
        true
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceDomain {
    DealStatus,
    SourcingType,
    TransactionType,
    Verticals,
    SubVerticals,
}

impl ChoiceDomain {
    pub const ALL: [ChoiceDomain; 5] = [
        ChoiceDomain::DealStatus,
        ChoiceDomain::SourcingType,
        ChoiceDomain::TransactionType,
        ChoiceDomain::Verticals,
        ChoiceDomain::SubVerticals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChoiceDomain::DealStatus => "deal_status",
            ChoiceDomain::SourcingType => "sourcing_type",
            ChoiceDomain::TransactionType => "transaction_type",
            ChoiceDomain::Verticals => "verticals",
            ChoiceDomain::SubVerticals => "sub_verticals",
        }
    }
}

/// Distinct normalized values seen per categorical domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceFields {
    domains: BTreeMap<ChoiceDomain, BTreeSet<String>>,
}

impl Default for ChoiceFields {
    fn default() -> Self {
        Self {
            domains: ChoiceDomain::ALL
                .into_iter()
                .map(|d| (d, BTreeSet::new()))
                .collect(),
        }
    }
}

impl ChoiceFields {
    pub fn observe(&mut self, domain: ChoiceDomain, value: Option<&str>) {
        if let Some(value) = value {
            self.domains
                .entry(domain)
                .or_default()
                .insert(value.to_string());
        }
    }

    pub fn values(&self, domain: ChoiceDomain) -> impl Iterator<Item = &str> {
        self.domains
            .get(&domain)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn count(&self, domain: ChoiceDomain) -> usize {
        self.domains.get(&domain).map_or(0, BTreeSet::len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "loaded")]
    Loaded,
    #[serde(rename = "extracted")]
    Extracted,
    #[serde(rename = "ERROR")]
    Error,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Loaded => "loaded",
            AuditAction::Extracted => "extracted",
            AuditAction::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub action: AuditAction,
    pub record_count: usize,
    pub note: String,
}

/// Append-only transformation history for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        source: impl Into<String>,
        action: AuditAction,
        record_count: usize,
        note: impl Into<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            source: source.into(),
            action,
            record_count,
            note: note.into(),
        };
        match entry.action {
            AuditAction::Error => error!(
                source = %entry.source,
                note = %entry.note,
                "{} {}", entry.action, entry.source
            ),
            _ => info!(
                source = %entry.source,
                record_count = entry.record_count,
                note = %entry.note,
                "{} {} records from {}", entry.action, entry.record_count, entry.source
            ),
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.action == AuditAction::Error)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_id_is_stable_and_pinned() {
        let id = resolve_id("Acme Corp", "");
        assert_eq!(id.as_str(), "ed5d09f109b6");
        assert_eq!(id.as_str().len(), ID_HEX_LEN);
        assert_eq!(resolve_id("  ACME corp ", "   "), id);
    }

    #[test]
    fn resolve_id_uses_both_parts() {
        assert_eq!(resolve_id("Jane Doe", "Acme").as_str(), "d96492467553");
        assert_ne!(resolve_id("Jane Doe", "Acme"), resolve_id("Jane Doe", "Beta"));
        assert_ne!(resolve_id("a", "b_c"), resolve_id("a", "bc"));
    }

    #[test]
    fn resolve_id_is_collision_free_on_small_corpus() {
        let names = [
            "Acme Corp", "Acme Corporation", "Beta Holdings", "Gamma Partners",
            "Delta Logistics", "Epsilon Foods", "Zeta Retail", "Eta Services",
            "Theta Capital", "Iota Brands",
        ];
        let ids: BTreeSet<_> = names.iter().map(|n| resolve_id(n, "")).collect();
        assert_eq!(ids.len(), names.len());
    }

    #[test]
    fn normalize_handles_missing_and_case() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(Some("   ")), None);
        assert_eq!(
            normalize(Some("  business SERVICES ")).as_deref(),
            Some("Business Services")
        );
        assert_eq!(normalize(Some("o'neil-smith")).as_deref(), Some("O'Neil-Smith"));
    }

    #[test]
    fn clean_text_and_email_preserve_content() {
        assert_eq!(clean_text(Some("  Keep THIS ")).as_deref(), Some("Keep THIS"));
        assert_eq!(
            normalize_email(Some(" Jane@Acme.COM ")).as_deref(),
            Some("jane@acme.com")
        );
        assert_eq!(normalize_email(Some("")), None);
    }

    #[test]
    fn cell_values_convert_leniently() {
        assert_eq!(CellValue::Number(42.0).as_text().as_deref(), Some("42"));
        assert_eq!(CellValue::Number(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(CellValue::text(" $1,250.5 ").as_number(), Some(1250.5));
        assert_eq!(CellValue::text("n/a").as_number(), None);
        assert_eq!(
            CellValue::text("03/15/2024").as_date(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            CellValue::text("03/15/24").as_date(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            CellValue::text(" 2024-03-15 ").as_date(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(CellValue::text("Q3").as_date(), None);
    }

    #[test]
    fn entity_map_keeps_first_record() {
        let mut map = EntityMap::new();
        assert!(map.is_empty());
        let id = resolve_id("Acme Corp", "");
        assert!(map.upsert_if_absent(id.clone(), "first"));
        assert!(!map.upsert_if_absent(id.clone(), "second"));
        assert!(map.upsert_if_absent(resolve_id("Beta", ""), "third"));
        assert_eq!(map.get(&id), Some(&"first"));
        assert_eq!(map.values(), &["first", "third"]);
    }

    #[test]
    fn choice_fields_collapse_duplicates_and_skip_absent() {
        let mut choices = ChoiceFields::default();
        choices.observe(ChoiceDomain::DealStatus, Some("Active"));
        choices.observe(ChoiceDomain::DealStatus, Some("Active"));
        choices.observe(ChoiceDomain::DealStatus, None);
        choices.observe(ChoiceDomain::Verticals, Some("Business Services"));
        assert_eq!(choices.count(ChoiceDomain::DealStatus), 1);
        assert_eq!(choices.count(ChoiceDomain::SourcingType), 0);
        assert_eq!(
            choices.values(ChoiceDomain::Verticals).collect::<Vec<_>>(),
            vec!["Business Services"]
        );
    }

    #[test]
    fn audit_log_appends_and_counts_errors() {
        let mut log = AuditLog::new();
        log.record("pipeline.xlsx", AuditAction::Loaded, 3, "");
        log.record("comps.xlsx", AuditAction::Error, 0, "file not found");
        log.record("Companies", AuditAction::Extracted, 3, "");
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.entries()[1].note, "file not found");
        let json = serde_json::to_value(&log.entries()[1]).unwrap();
        assert_eq!(json["action"], "ERROR");
    }
}
