//! Tamper-evident activity log
//!
//! Each entry stores the hash of its predecessor, so editing or dropping a
//! row in the middle of the log breaks verification from that row on.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    User,
    Session,
    Report,
    Evidence,
    Case,
    Confiscation,
    Kompendium,
}

text_enum!(Entity {
    User => "user",
    Session => "session",
    Report => "report",
    Evidence => "evidence",
    Case => "case",
    Confiscation => "confiscation",
    Kompendium => "kompendium",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub timestamp: String,
    pub actor_id: String,
    pub entity: Entity,
    pub entity_id: String,
    pub action: String,
    pub details: Option<String>,
    pub previous_hash: Option<String>,
}

impl ActivityEntry {
    pub fn new(
        actor_id: &str,
        entity: Entity,
        entity_id: &str,
        action: &str,
        details: Option<String>,
        previous_hash: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            actor_id: actor_id.to_string(),
            entity,
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            details,
            previous_hash,
        }
    }

    /// Hash over every field, used as the next entry's `previous_hash`
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.id.as_str(),
            self.timestamp.as_str(),
            self.actor_id.as_str(),
            self.entity.as_str(),
            self.entity_id.as_str(),
            self.action.as_str(),
            self.details.as_deref().unwrap_or(""),
            self.previous_hash.as_deref().unwrap_or(""),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Outcome of [`verify_chain`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub entries: usize,
    pub valid: bool,
    /// Id of the first entry whose link does not match
    pub broken_at: Option<String>,
}

/// Walk entries oldest first and check every back-link
pub fn verify_chain(entries: &[ActivityEntry]) -> ChainReport {
    let mut expected: Option<String> = None;
    for entry in entries {
        if entry.previous_hash != expected {
            return ChainReport {
                entries: entries.len(),
                valid: false,
                broken_at: Some(entry.id.clone()),
            };
        }
        expected = Some(entry.compute_hash());
    }
    ChainReport {
        entries: entries.len(),
        valid: true,
        broken_at: None,
    }
}
