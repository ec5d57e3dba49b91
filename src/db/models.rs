// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Refinement records and the text encodings used in the database

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RefineError;

/// A user's verdict on one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Yes,
    No,
    Skip,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Yes => "yes",
            Rating::No => "no",
            Rating::Skip => "skip",
        }
    }
}

impl FromStr for Rating {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Rating::Yes),
            "no" => Ok(Rating::No),
            "skip" => Ok(Rating::Skip),
            _ => Err(RefineError::InvalidInput(format!(
                "rating must be yes, no or skip, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a refinement; `Complete` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinementStatus {
    Active,
    Complete,
}

impl RefinementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefinementStatus::Active => "active",
            RefinementStatus::Complete => "complete",
        }
    }
}

impl FromStr for RefinementStatus {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RefinementStatus::Active),
            "complete" | "completed" => Ok(RefinementStatus::Complete),
            _ => Err(RefineError::InvalidInput(format!("unknown status {:?}", s))),
        }
    }
}

/// Column tag for where a refinement's images came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Folder,
    Refinement,
}

impl SourceKind {
    /// Stored value; folders are "collection" in the schema
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Folder => "collection",
            SourceKind::Refinement => "refinement",
        }
    }
}

impl FromStr for SourceKind {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collection" | "folder" => Ok(SourceKind::Folder),
            "refinement" => Ok(SourceKind::Refinement),
            _ => Err(RefineError::InvalidInput(format!(
                "source type must be collection or refinement, got {:?}",
                s
            ))),
        }
    }
}

/// Where a refinement's snapshot was taken from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "lowercase")]
pub enum SourceRef {
    Folder(String),
    Refinement(i64),
}

impl SourceRef {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRef::Folder(_) => SourceKind::Folder,
            SourceRef::Refinement(_) => SourceKind::Refinement,
        }
    }

    /// Text stored in `source_key`
    pub fn key(&self) -> String {
        match self {
            SourceRef::Folder(name) => name.clone(),
            SourceRef::Refinement(id) => id.to_string(),
        }
    }

    /// Parse the two loosely typed columns. `None` when a refinement key is not an id.
    pub fn from_parts(kind: SourceKind, key: &str) -> Option<Self> {
        match kind {
            SourceKind::Folder => Some(SourceRef::Folder(key.to_string())),
            SourceKind::Refinement => key.trim().parse().ok().map(SourceRef::Refinement),
        }
    }

    /// Human-readable label, also used to name refinements left unnamed
    pub fn label(&self) -> String {
        match self {
            SourceRef::Folder(name) => name.clone(),
            SourceRef::Refinement(id) => format!("refinement #{}", id),
        }
    }
}

/// A rating session over a fixed snapshot of images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    pub id: i64,
    pub name: String,
    pub source: SourceRef,
    pub status: RefinementStatus,
    pub created_at: DateTime<Utc>,
}

impl Refinement {
    pub fn is_complete(&self) -> bool {
        self.status == RefinementStatus::Complete
    }
}

/// One image in a refinement snapshot; `rating == None` means pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementItem {
    pub id: i64,
    pub refinement_id: i64,
    pub relpath: String,
    pub rating: Option<Rating>,
}

/// Rating counts for one refinement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: i64,
    pub pending: i64,
    pub skipped: i64,
    pub yes: i64,
    pub no: i64,
}

impl Progress {
    pub fn decided(&self) -> i64 {
        self.yes + self.no
    }
}

// SQL encodings

fn from_sql_text<T: FromStr>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .as_str()?
        .parse()
        .map_err(|e| FromSqlError::Other(Box::new(e)))
}

impl ToSql for Rating {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Rating {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        from_sql_text(value)
    }
}

impl ToSql for RefinementStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RefinementStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        from_sql_text(value)
    }
}

impl ToSql for SourceKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SourceKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        from_sql_text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_parse() {
        assert_eq!(" YES ".parse::<Rating>().unwrap(), Rating::Yes);
        assert_eq!("skip".parse::<Rating>().unwrap(), Rating::Skip);
        assert!(matches!("maybe".parse::<Rating>(), Err(RefineError::InvalidInput(_))));
        assert!(matches!("".parse::<Rating>(), Err(RefineError::InvalidInput(_))));
    }

    #[test]
    fn test_source_ref_parts() {
        assert_eq!(
            SourceRef::from_parts(SourceKind::Folder, "beach"),
            Some(SourceRef::Folder("beach".to_string()))
        );
        assert_eq!(
            SourceRef::from_parts(SourceKind::Refinement, "12"),
            Some(SourceRef::Refinement(12))
        );
        assert_eq!(SourceRef::from_parts(SourceKind::Refinement, "beach"), None);
        assert_eq!(SourceRef::Refinement(7).key(), "7");
        assert_eq!(SourceRef::Refinement(7).kind().as_str(), "refinement");
        assert_eq!(SourceRef::Folder("x".into()).kind().as_str(), "collection");
    }

    #[test]
    fn test_source_kind_accepts_folder_alias() {
        assert_eq!("folder".parse::<SourceKind>().unwrap(), SourceKind::Folder);
        assert_eq!("Collection".parse::<SourceKind>().unwrap(), SourceKind::Folder);
        assert!("album".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_source_ref_json_shape() {
        let json = serde_json::to_value(SourceRef::Refinement(3)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "refinement", "key": 3}));
    }
}
