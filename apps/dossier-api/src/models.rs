//! Data models for the Dossier API
//!
//! `*Row` structs mirror database rows; the rest are request and response
//! bodies. Enums are stored as text and parsed on the way out.

use chrono::{DateTime, Utc};
use dossier_core::activity::{ActivityEntry, ChainReport, Entity};
use dossier_core::case::{CaseNumber, CasePriority, CaseStatus, ParticipantRole};
use dossier_core::confiscation::{DrugType, Quantity, QuantityUnit, SummaryLine};
use dossier_core::evidence::EvidenceKind;
use dossier_core::kompendium::{CategoryGroup, Indexed};
use dossier_core::report::{ReportAction, ReportStatus, EXCERPT_CHARS};
use dossier_core::tactical_map::{MapColor, TacticalMap};
use dossier_core::text;
use dossier_core::{Rank, SystemRole};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::parse_column;
use crate::error::ApiResult;

// ============================================================
// Users
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub badge_number: Option<String>,
    pub password_hash: String,
    pub rank: String,
    pub system_role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn to_public(&self) -> ApiResult<UserPublic> {
        let rank: Rank = parse_column("rank", &self.rank)?;
        Ok(UserPublic {
            id: self.id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            badge_number: self.badge_number.clone(),
            rank,
            rank_label: rank.label().to_string(),
            role: parse_column("system_role", &self.system_role)?,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
        })
    }

    pub fn to_ref(&self) -> ApiResult<UserRef> {
        Ok(UserRef {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            rank: parse_column("rank", &self.rank)?,
        })
    }
}

/// Public user info (safe to send to client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub badge_number: Option<String>,
    pub rank: Rank,
    pub rank_label: String,
    pub role: SystemRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Short reference to a user embedded in other records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub display_name: String,
    pub rank: Rank,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserPublic,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    #[serde(default)]
    pub rank: Rank,
    #[serde(default)]
    pub role: SystemRole,
    pub badge_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub rank: Option<Rank>,
    pub role: Option<SystemRole>,
    pub badge_number: Option<String>,
    pub active: Option<bool>,
    /// Admin password reset
    pub password: Option<String>,
}

// ============================================================
// Reports
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub id: String,
    pub title: String,
    pub narrative: String,
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
    pub status: String,
    pub author_id: String,
    pub reviewer_id: Option<String>,
    pub review_comment: Option<String>,
    pub case_id: Option<String>,
    pub map_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ReportRow {
    pub fn status(&self) -> ApiResult<ReportStatus> {
        parse_column("status", &self.status)
    }

    pub fn map(&self) -> ApiResult<TacticalMap> {
        serde_json::from_str(&self.map_json)
            .map_err(|e| anyhow::anyhow!("Corrupt map of report {}: {}", self.id, e).into())
    }
}

/// Row of the report list, joined with the author
#[derive(Debug, Clone, FromRow)]
pub struct ReportListRow {
    pub id: String,
    pub title: String,
    pub narrative: String,
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
    pub status: String,
    pub author_id: String,
    pub author_name: String,
    pub author_rank: String,
    pub case_id: Option<String>,
    pub evidence_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl ReportListRow {
    pub fn to_summary(&self) -> ApiResult<ReportSummary> {
        Ok(ReportSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            excerpt: text::narrative_excerpt(&self.narrative, EXCERPT_CHARS),
            location: self.location.clone(),
            incident_at: self.incident_at,
            status: parse_column("status", &self.status)?,
            author: UserRef {
                id: self.author_id.clone(),
                display_name: self.author_name.clone(),
                rank: parse_column("rank", &self.author_rank)?,
            },
            case_id: self.case_id.clone(),
            evidence_count: self.evidence_count,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
    pub status: ReportStatus,
    pub author: UserRef,
    pub case_id: Option<String>,
    pub evidence_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapWarnings {
    pub unlabelled_colors: Vec<MapColor>,
    pub unused_legend_colors: Vec<MapColor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRef {
    pub id: String,
    pub case_number: CaseNumber,
    pub title: String,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDetail {
    pub id: String,
    pub title: String,
    pub narrative: String,
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
    pub status: ReportStatus,
    pub status_label: String,
    pub author: UserRef,
    pub reviewer: Option<UserRef>,
    pub review_comment: Option<String>,
    pub case: Option<CaseRef>,
    pub map: TacticalMap,
    pub map_warnings: MapWarnings,
    pub evidence: Vec<EvidenceMeta>,
    pub confiscation_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub title: String,
    #[serde(default)]
    pub narrative: String,
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
    pub map: Option<TacticalMap>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReportRequest {
    pub title: Option<String>,
    pub narrative: Option<String>,
    /// Empty string clears the location
    pub location: Option<String>,
    pub incident_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: ReportAction,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportListQuery {
    pub status: Option<ReportStatus>,
    pub author: Option<String>,
    #[serde(default)]
    pub mine: bool,
    pub case: Option<String>,
}

// ============================================================
// Evidence
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct EvidenceRow {
    pub id: String,
    pub report_id: String,
    pub kind: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub caption: Option<String>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

impl EvidenceRow {
    pub fn to_meta(&self) -> ApiResult<EvidenceMeta> {
        Ok(EvidenceMeta {
            id: self.id.clone(),
            report_id: self.report_id.clone(),
            kind: parse_column("kind", &self.kind)?,
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
            sha256: self.sha256.clone(),
            caption: self.caption.clone(),
            uploaded_by: self.uploaded_by.clone(),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMeta {
    pub id: String,
    pub report_id: String,
    pub kind: EvidenceKind,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub caption: Option<String>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UploadEvidenceRequest {
    pub file_name: String,
    pub mime_type: String,
    pub data_base64: String,
    pub caption: Option<String>,
}

// ============================================================
// Cases
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct CaseRow {
    pub id: String,
    pub case_number: String,
    pub title: String,
    pub summary: String,
    pub status: String,
    pub priority: String,
    pub reporting_officer_id: String,
    pub lead_investigator_id: String,
    pub closing_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CaseRow {
    pub fn status(&self) -> ApiResult<CaseStatus> {
        parse_column("status", &self.status)
    }

    pub fn to_ref(&self) -> ApiResult<CaseRef> {
        Ok(CaseRef {
            id: self.id.clone(),
            case_number: parse_column("case_number", &self.case_number)?,
            title: self.title.clone(),
            status: self.status()?,
        })
    }
}

/// Row of the case list, joined with the lead investigator
#[derive(Debug, Clone, FromRow)]
pub struct CaseListRow {
    pub id: String,
    pub case_number: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub lead_investigator_id: String,
    pub lead_name: String,
    pub lead_rank: String,
    pub report_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl CaseListRow {
    pub fn to_summary(&self) -> ApiResult<CaseSummary> {
        Ok(CaseSummary {
            id: self.id.clone(),
            case_number: parse_column("case_number", &self.case_number)?,
            title: self.title.clone(),
            status: parse_column("status", &self.status)?,
            priority: parse_column("priority", &self.priority)?,
            lead_investigator: UserRef {
                id: self.lead_investigator_id.clone(),
                display_name: self.lead_name.clone(),
                rank: parse_column("rank", &self.lead_rank)?,
            },
            report_count: self.report_count,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: String,
    pub case_number: CaseNumber,
    pub title: String,
    pub status: CaseStatus,
    pub priority: CasePriority,
    pub lead_investigator: UserRef,
    pub report_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantRow {
    pub user_id: String,
    pub display_name: String,
    pub rank: String,
    pub role: String,
    pub added_at: DateTime<Utc>,
}

impl ParticipantRow {
    pub fn to_participant(&self) -> ApiResult<Participant> {
        Ok(Participant {
            user: UserRef {
                id: self.user_id.clone(),
                display_name: self.display_name.clone(),
                rank: parse_column("rank", &self.rank)?,
            },
            role: parse_column("role", &self.role)?,
            added_at: self.added_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user: UserRef,
    pub role: ParticipantRole,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDetail {
    pub id: String,
    pub case_number: CaseNumber,
    pub title: String,
    pub summary: String,
    pub status: CaseStatus,
    pub status_label: String,
    pub priority: CasePriority,
    pub reporting_officer: UserRef,
    pub lead_investigator: UserRef,
    pub participants: Vec<Participant>,
    pub reports: Vec<ReportSummary>,
    pub closing_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub priority: CasePriority,
    pub lead_investigator_id: String,
    #[serde(default)]
    pub report_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EscalateRequest {
    pub title: Option<String>,
    pub lead_investigator_id: Option<String>,
    pub priority: Option<CasePriority>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCaseRequest {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub priority: Option<CasePriority>,
    pub lead_investigator_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdvanceCaseRequest {
    pub closing_note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParticipantRequest {
    #[serde(default)]
    pub role: ParticipantRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaseListQuery {
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub mine: bool,
}

// ============================================================
// Confiscations
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct ConfiscationRow {
    pub id: String,
    pub drug_type: String,
    pub description: Option<String>,
    pub amount: f64,
    pub unit: String,
    pub location: Option<String>,
    pub seized_at: DateTime<Utc>,
    pub report_id: Option<String>,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfiscationRow {
    pub fn drug_type(&self) -> ApiResult<DrugType> {
        parse_column("drug_type", &self.drug_type)
    }

    pub fn quantity(&self) -> ApiResult<Quantity> {
        let unit: QuantityUnit = parse_column("unit", &self.unit)?;
        Ok(Quantity {
            amount: self.amount,
            unit,
        })
    }

    pub fn to_response(&self) -> ApiResult<ConfiscationResponse> {
        Ok(ConfiscationResponse {
            id: self.id.clone(),
            drug_type: self.drug_type()?,
            description: self.description.clone(),
            quantity: self.quantity()?,
            location: self.location.clone(),
            seized_at: self.seized_at,
            report_id: self.report_id.clone(),
            recorded_by: self.recorded_by.clone(),
            notes: self.notes.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiscationResponse {
    pub id: String,
    pub drug_type: DrugType,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub location: Option<String>,
    pub seized_at: DateTime<Utc>,
    pub report_id: Option<String>,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConfiscationRequest {
    pub drug_type: DrugType,
    pub description: Option<String>,
    pub amount: f64,
    pub unit: QuantityUnit,
    pub location: Option<String>,
    pub seized_at: Option<DateTime<Utc>>,
    pub report_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConfiscationRequest {
    pub drug_type: Option<DrugType>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<QuantityUnit>,
    pub location: Option<String>,
    pub seized_at: Option<DateTime<Utc>>,
    /// Empty string unlinks the report
    pub report_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfiscationListQuery {
    pub drug_type: Option<DrugType>,
    pub report: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiscationSummary {
    pub lines: Vec<SummaryLine>,
    pub total_records: u32,
}

// ============================================================
// Kompendium
// ============================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KompendiumDoc {
    pub id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub position: i64,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Indexed for KompendiumDoc {
    fn category(&self) -> &str {
        &self.category
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Index entry without the article body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KompendiumEntry {
    pub id: String,
    pub title: String,
    pub position: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<KompendiumDoc> for KompendiumEntry {
    fn from(doc: KompendiumDoc) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            position: doc.position,
            updated_at: doc.updated_at,
        }
    }
}

pub type KompendiumIndex = Vec<CategoryGroup<KompendiumEntry>>;

#[derive(Debug, Deserialize)]
pub struct CreateKompendiumRequest {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateKompendiumRequest {
    pub title: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub position: Option<i64>,
}

// ============================================================
// Dashboard and activity
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount<S> {
    pub status: S,
    pub count: i64,
}

/// Unit-wide part of the dashboard (cached)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOverview {
    pub reports: Vec<StatusCount<ReportStatus>>,
    pub cases: Vec<StatusCount<CaseStatus>>,
    pub confiscations: ConfiscationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub overview: UnitOverview,
    pub my_drafts: Vec<ReportSummary>,
    pub my_returned: Vec<ReportSummary>,
    pub awaiting_review: Vec<ReportSummary>,
    pub my_open_cases: Vec<CaseSummary>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: String,
    pub timestamp: String,
    pub actor_id: String,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub details: Option<String>,
    pub previous_hash: Option<String>,
}

impl ActivityRow {
    pub fn to_entry(&self) -> ApiResult<ActivityEntry> {
        Ok(ActivityEntry {
            id: self.id.clone(),
            timestamp: self.timestamp.clone(),
            actor_id: self.actor_id.clone(),
            entity: parse_column("entity", &self.entity)?,
            entity_id: self.entity_id.clone(),
            action: self.action.clone(),
            details: self.details.clone(),
            previous_hash: self.previous_hash.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityResponse {
    pub chain: ChainReport,
    pub entries: Vec<ActivityEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub entity: Option<Entity>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
}
