//! Query admission control.
//!
//! Classifies untrusted SQL text by caller privilege and rewrites accepted
//! SELECT statements with a forced row limit before anything reaches the
//! database.

mod validator;

pub use validator::{split_explain, SqlValidator, TableAllowList, DEFAULT_ALLOWED_TABLES};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Privilege level of the caller submitting SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// May run any statement that is not on the forbidden list.
    Admin,
    /// Restricted to SELECT over the sample table allow-list.
    #[default]
    Standard,
}

impl Privilege {
    /// Maps the auth layer's admin flag to a privilege level.
    pub fn from_admin_flag(is_admin: bool) -> Self {
        if is_admin {
            Self::Admin
        } else {
            Self::Standard
        }
    }

    /// Returns true for admin callers.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// Outcome of validating a SQL statement.
///
/// A rejected outcome never carries executable SQL; an accepted outcome's SQL
/// has passed every check, including the forced row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The statement may run as `processed_sql`.
    Accepted { processed_sql: String },
    /// The statement was refused before touching the database.
    Rejected { reason: String },
}

impl ValidationOutcome {
    /// Creates an accepted outcome.
    pub fn accepted(processed_sql: impl Into<String>) -> Self {
        Self::Accepted {
            processed_sql: processed_sql.into(),
        }
    }

    /// Creates a rejected outcome.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns true if the statement was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Returns the SQL to execute, if accepted.
    pub fn processed_sql(&self) -> Option<&str> {
        match self {
            Self::Accepted { processed_sql } => Some(processed_sql),
            Self::Rejected { .. } => None,
        }
    }

    /// Returns the rejection reason, if rejected.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}
