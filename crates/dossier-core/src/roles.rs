//! Ranks, system roles and permission checks
//!
//! Every mutating procedure calls one of the `ensure_*` helpers before it
//! touches the store. The checks only compare roles, ranks and ownership;
//! loading the facts they need is the caller's job.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Hierarchical title of an officer, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Kommissaranwaerter,
    Kommissar,
    Oberkommissar,
    Hauptkommissar,
    ErsterHauptkommissar,
    Kriminalrat,
    Kriminaloberrat,
    Kriminaldirektor,
}

text_enum!(Rank {
    Kommissaranwaerter => "kommissaranwaerter",
    Kommissar => "kommissar",
    Oberkommissar => "oberkommissar",
    Hauptkommissar => "hauptkommissar",
    ErsterHauptkommissar => "erster_hauptkommissar",
    Kriminalrat => "kriminalrat",
    Kriminaloberrat => "kriminaloberrat",
    Kriminaldirektor => "kriminaldirektor",
});

impl Rank {
    /// Display title
    pub fn label(&self) -> &'static str {
        match self {
            Rank::Kommissaranwaerter => "Kriminalkommissaranwärter",
            Rank::Kommissar => "Kriminalkommissar",
            Rank::Oberkommissar => "Kriminaloberkommissar",
            Rank::Hauptkommissar => "Kriminalhauptkommissar",
            Rank::ErsterHauptkommissar => "Erster Kriminalhauptkommissar",
            Rank::Kriminalrat => "Kriminalrat",
            Rank::Kriminaloberrat => "Kriminaloberrat",
            Rank::Kriminaldirektor => "Kriminaldirektor",
        }
    }
}

impl Default for Rank {
    fn default() -> Self {
        Self::Kommissar
    }
}

/// Coarse authorization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    Admin,
    Lead,
    Member,
}

text_enum!(SystemRole {
    Admin => "admin",
    Lead => "lead",
    Member => "member",
});

impl Default for SystemRole {
    fn default() -> Self {
        Self::Member
    }
}

/// Lowest rank that may review reports without a Lead or Admin role
pub const REVIEW_RANK: Rank = Rank::Hauptkommissar;

/// The authenticated principal as seen by permission checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub rank: Rank,
    pub role: SystemRole,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, rank: Rank, role: SystemRole) -> Self {
        Self {
            user_id: user_id.into(),
            rank,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == SystemRole::Admin
    }

    fn is_lead_or_admin(&self) -> bool {
        matches!(self.role, SystemRole::Admin | SystemRole::Lead)
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    pub fn can_edit_kompendium(&self) -> bool {
        self.is_admin()
    }

    /// Whether this actor may review the report written by `author_id`
    pub fn can_review_report(&self, author_id: &str) -> bool {
        if self.user_id == author_id {
            return false;
        }
        self.is_lead_or_admin() || self.rank >= REVIEW_RANK
    }

    /// Reviewer rights in general, independent of a specific report
    pub fn is_reviewer(&self) -> bool {
        self.is_lead_or_admin() || self.rank >= REVIEW_RANK
    }

    pub fn can_edit_report(&self, author_id: &str, editable: bool) -> bool {
        self.is_admin() || (self.user_id == author_id && editable)
    }

    pub fn can_delete_report(&self, author_id: &str, is_draft: bool) -> bool {
        self.is_admin() || (self.user_id == author_id && is_draft)
    }

    pub fn can_manage_case(&self, lead_investigator_id: &str) -> bool {
        self.is_lead_or_admin() || self.user_id == lead_investigator_id
    }

    pub fn can_close_case(&self, lead_investigator_id: &str) -> bool {
        self.is_admin() || self.user_id == lead_investigator_id
    }

    pub fn can_edit_confiscation(&self, recorded_by: &str) -> bool {
        self.is_admin() || self.user_id == recorded_by
    }
}

/// Turn a permission predicate into a `Forbidden` error naming the operation
pub fn ensure(allowed: bool, operation: &str) -> DomainResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(DomainError::forbidden(operation))
    }
}
