//! Report status lifecycle and field validation
//!
//! ```text
//! Draft ──submit──▶ Submitted ──start_review──▶ UnderReview ──approve──▶ Approved
//!   ▲                  │                            │
//!   └────withdraw──────┘                          return
//!                      ▲                            ▼
//!                      └─────────submit──────── Returned
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::text;

pub const TITLE_MAX_CHARS: usize = 200;
pub const LOCATION_MAX_CHARS: usize = 200;
pub const NARRATIVE_MAX_BYTES: usize = 200_000;
pub const EXCERPT_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Returned,
}

text_enum!(ReportStatus {
    Draft => "draft",
    Submitted => "submitted",
    UnderReview => "under_review",
    Approved => "approved",
    Returned => "returned",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Submit,
    Withdraw,
    StartReview,
    Approve,
    Return,
}

text_enum!(ReportAction {
    Submit => "submit",
    Withdraw => "withdraw",
    StartReview => "start_review",
    Approve => "approve",
    Return => "return",
});

impl ReportAction {
    /// Review actions are performed by a reviewer, the rest by the author
    pub fn is_review_action(&self) -> bool {
        matches!(
            self,
            ReportAction::StartReview | ReportAction::Approve | ReportAction::Return
        )
    }
}

impl ReportStatus {
    /// Status reached by applying `action`, or an error if not allowed here
    pub fn apply(self, action: ReportAction) -> DomainResult<ReportStatus> {
        use ReportAction as A;
        use ReportStatus as S;

        match (self, action) {
            (S::Draft | S::Returned, A::Submit) => Ok(S::Submitted),
            (S::Submitted, A::Withdraw) => Ok(S::Draft),
            (S::Submitted, A::StartReview) => Ok(S::UnderReview),
            (S::UnderReview, A::Approve) => Ok(S::Approved),
            (S::UnderReview, A::Return) => Ok(S::Returned),
            (from, action) => Err(DomainError::InvalidTransition {
                from: from.to_string(),
                action: action.to_string(),
            }),
        }
    }

    /// Content (narrative, map, evidence) may only change in these states
    pub fn is_editable(&self) -> bool {
        matches!(self, ReportStatus::Draft | ReportStatus::Returned)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Approved)
    }

    /// Reports in these states may be attached to a case
    pub fn is_linkable(&self) -> bool {
        matches!(self, ReportStatus::UnderReview | ReportStatus::Approved)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "Entwurf",
            ReportStatus::Submitted => "Eingereicht",
            ReportStatus::UnderReview => "In Prüfung",
            ReportStatus::Approved => "Freigegeben",
            ReportStatus::Returned => "Zurückgewiesen",
        }
    }
}

/// Validated editable fields of a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContent {
    pub title: String,
    pub narrative: String,
    pub location: Option<String>,
}

impl ReportContent {
    pub fn new(title: &str, narrative: &str, location: Option<&str>) -> DomainResult<Self> {
        let title = text::required_line("Title", title, TITLE_MAX_CHARS)?;
        if narrative.len() > NARRATIVE_MAX_BYTES {
            return Err(DomainError::validation(format!(
                "Narrative must be at most {NARRATIVE_MAX_BYTES} bytes"
            )));
        }
        let location = text::optional_line("Location", location, LOCATION_MAX_CHARS)?;
        Ok(Self {
            title,
            narrative: narrative.to_string(),
            location,
        })
    }
}

/// Facts needed to decide a lifecycle transition
#[derive(Debug, Clone)]
pub struct TransitionRequest<'a> {
    pub action: ReportAction,
    pub narrative: &'a str,
    pub comment: Option<&'a str>,
}

/// Check everything besides permissions for a transition and return the new
/// status plus the review comment to store
pub fn plan_transition(
    current: ReportStatus,
    req: &TransitionRequest<'_>,
) -> DomainResult<(ReportStatus, Option<String>)> {
    let next = current.apply(req.action)?;

    match req.action {
        ReportAction::Submit if !text::has_visible_text(req.narrative) => Err(
            DomainError::validation("A report needs a narrative before it can be submitted"),
        ),
        ReportAction::Return => {
            let comment = req.comment.map(str::trim).unwrap_or_default();
            if comment.is_empty() {
                return Err(DomainError::validation(
                    "Returning a report requires a comment",
                ));
            }
            Ok((next, Some(comment.to_string())))
        }
        _ => Ok((
            next,
            req.comment
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        )),
    }
}
