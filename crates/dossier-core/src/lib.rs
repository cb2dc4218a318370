//! Dossier domain core
//!
//! Pure domain logic for the unit's record system, free of I/O:
//!
//! - Ranks, system roles and the permission checks every procedure runs
//! - Report and case status lifecycles
//! - Confiscation quantities and summaries
//! - Kompendium grouping
//! - The tactical map model (pan/zoom transform, markers, shapes, legend)
//! - Evidence validation and the hash-chained activity log
//!
//! The HTTP server in `apps/dossier-api` persists these types and calls the
//! checks here before every mutation.

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// text form is also its serde representation.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::DomainError::Validation(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod activity;
pub mod case;
pub mod confiscation;
pub mod error;
pub mod evidence;
pub mod kompendium;
pub mod report;
pub mod roles;
pub mod tactical_map;
pub mod text;

pub use error::{DomainError, DomainResult};
pub use roles::{Actor, Rank, SystemRole};
