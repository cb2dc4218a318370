//! Case lifecycle, numbering and participant rules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::report::ReportStatus;
use crate::text;

pub const TITLE_MAX_CHARS: usize = 200;
pub const SUMMARY_MAX_CHARS: usize = 20_000;
pub const CLOSING_NOTE_MAX_CHARS: usize = 5_000;

/// Strictly linear: Open → Investigating → InReview → Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Investigating,
    InReview,
    Closed,
}

text_enum!(CaseStatus {
    Open => "open",
    Investigating => "investigating",
    InReview => "in_review",
    Closed => "closed",
});

impl CaseStatus {
    pub fn next(&self) -> Option<CaseStatus> {
        match self {
            CaseStatus::Open => Some(CaseStatus::Investigating),
            CaseStatus::Investigating => Some(CaseStatus::InReview),
            CaseStatus::InReview => Some(CaseStatus::Closed),
            CaseStatus::Closed => None,
        }
    }

    /// Move one step forward. Closing needs a non-empty note, which is
    /// returned trimmed.
    pub fn advance(&self, closing_note: Option<&str>) -> DomainResult<(CaseStatus, Option<String>)> {
        let next = self.next().ok_or_else(|| DomainError::InvalidTransition {
            from: self.to_string(),
            action: "advance".into(),
        })?;

        if next == CaseStatus::Closed {
            let note = closing_note.map(str::trim).unwrap_or_default();
            if note.is_empty() {
                return Err(DomainError::validation("Closing a case requires a closing note"));
            }
            if note.chars().count() > CLOSING_NOTE_MAX_CHARS {
                return Err(DomainError::validation(format!(
                    "Closing note must be at most {CLOSING_NOTE_MAX_CHARS} characters"
                )));
            }
            return Ok((next, Some(note.to_string())));
        }

        Ok((next, None))
    }

    pub fn is_closed(&self) -> bool {
        *self == CaseStatus::Closed
    }

    /// Closed cases reject every mutation
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.is_closed() {
            Err(DomainError::InvalidTransition {
                from: self.to_string(),
                action: "modify case".into(),
            })
        } else {
            Ok(())
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CaseStatus::Open => "Offen",
            CaseStatus::Investigating => "In Ermittlung",
            CaseStatus::InReview => "In Prüfung",
            CaseStatus::Closed => "Abgeschlossen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    Low,
    Normal,
    High,
    Critical,
}

text_enum!(CasePriority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

impl Default for CasePriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Investigator,
    Observer,
    Support,
}

text_enum!(ParticipantRole {
    Investigator => "investigator",
    Observer => "observer",
    Support => "support",
});

impl Default for ParticipantRole {
    fn default() -> Self {
        Self::Investigator
    }
}

/// File number of a case, `AZ-2026-0042`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaseNumber {
    pub year: i32,
    pub sequence: u32,
}

impl CaseNumber {
    pub const PREFIX: &'static str = "AZ";

    pub fn new(year: i32, sequence: u32) -> Self {
        Self { year, sequence }
    }

    /// Next number in `year` given the numbers already issued
    pub fn next_in_year<'a>(year: i32, existing: impl IntoIterator<Item = &'a str>) -> Self {
        let max = existing
            .into_iter()
            .filter_map(|s| s.parse::<CaseNumber>().ok())
            .filter(|n| n.year == year)
            .map(|n| n.sequence)
            .max()
            .unwrap_or(0);
        Self::new(year, max + 1)
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:04}", Self::PREFIX, self.year, self.sequence)
    }
}

impl FromStr for CaseNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("Invalid case number '{s}'"));
        let mut parts = s.split('-');
        let (Some(prefix), Some(year), Some(seq), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if prefix != Self::PREFIX || year.len() != 4 || seq.len() < 4 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let sequence: u32 = seq.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(Self { year, sequence })
    }
}

impl Serialize for CaseNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CaseNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Validated editable fields of a case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseContent {
    pub title: String,
    pub summary: String,
}

impl CaseContent {
    pub fn new(title: &str, summary: &str) -> DomainResult<Self> {
        let title = text::required_line("Title", title, TITLE_MAX_CHARS)?;
        let summary = summary.trim();
        if summary.chars().count() > SUMMARY_MAX_CHARS {
            return Err(DomainError::validation(format!(
                "Summary must be at most {SUMMARY_MAX_CHARS} characters"
            )));
        }
        Ok(Self {
            title,
            summary: summary.to_string(),
        })
    }
}

/// Check that a user may be added as participant
pub fn check_participant(
    lead_investigator_id: &str,
    current_participants: &[&str],
    user_id: &str,
) -> DomainResult<()> {
    if user_id == lead_investigator_id {
        return Err(DomainError::validation(
            "The lead investigator is already part of the case",
        ));
    }
    if current_participants.contains(&user_id) {
        return Err(DomainError::validation("User is already a participant"));
    }
    Ok(())
}

/// Check that a report may be linked to a case
pub fn check_report_link(
    status: ReportStatus,
    linked_case: Option<&str>,
    case_id: &str,
) -> DomainResult<()> {
    if !status.is_linkable() {
        return Err(DomainError::validation(format!(
            "Only reports under review or approved can be linked, this one is {status}"
        )));
    }
    match linked_case {
        Some(existing) if existing == case_id => {
            Err(DomainError::validation("Report is already linked to this case"))
        }
        Some(_) => Err(DomainError::validation(
            "Report is already linked to another case",
        )),
        None => Ok(()),
    }
}
