//! Core type definitions for svnharvest
//!
//! These are the decode targets for `svn list --xml` and `svn log --xml`.
//! Deserialization uses the XML attribute/text naming of the reports
//! (`@kind`, `$text`, ...); serialization uses the plain field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Node kind as reported by the tool (`kind="file|dir"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    File,
    Dir,
    /// Any other value, kept verbatim
    Other(String),
}

impl Default for NodeKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "file" => Self::File,
            "dir" => Self::Dir,
            _ => Self::Other(s),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.to_string()
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Change action of a path within a revision (`action="A|M|D|R"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Added,
    Modified,
    Deleted,
    Replaced,
    /// Any other value, kept verbatim
    Other(String),
}

impl Default for Action {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.as_str() {
            "A" => Self::Added,
            "M" => Self::Modified,
            "D" => Self::Deleted,
            "R" => Self::Replaced,
            _ => Self::Other(s),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.to_string()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "A"),
            Self::Modified => write!(f, "M"),
            Self::Deleted => write!(f, "D"),
            Self::Replaced => write!(f, "R"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Top-level `<lists>` element of `svn list --xml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListElement {
    #[serde(rename(deserialize = "list"), default)]
    pub lists: Vec<List>,
}

impl ListElement {
    /// All entries of all `<list>` blocks, in document order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lists.iter().flat_map(|l| l.entries.iter())
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.lists.into_iter().flat_map(|l| l.entries).collect()
    }
}

/// One `<list path="...">` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    #[serde(rename(deserialize = "@path"), default)]
    pub path: String,
    #[serde(rename(deserialize = "entry"), default)]
    pub entries: Vec<Entry>,
}

/// A listed file or directory with its latest commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename(deserialize = "@kind"), default)]
    pub kind: NodeKind,
    pub name: String,
    /// Size in bytes, reported for files only
    #[serde(default)]
    pub size: Option<u64>,
    pub commit: Commit,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Last commit of a listed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Kept as text to preserve the tool's formatting
    #[serde(rename(deserialize = "@revision"))]
    pub revision: String,
    #[serde(default)]
    pub author: String,
    pub date: DateTime<Utc>,
}

/// Top-level `<log>` element of `svn log --xml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogElement {
    #[serde(rename(deserialize = "logentry"), default)]
    pub entries: Vec<LogEntry>,
}

/// One revision of a log report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename(deserialize = "@revision"))]
    pub revision: String,
    #[serde(default)]
    pub author: String,
    /// Opaque date text, not parsed
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "unwrap_paths")]
    pub paths: Vec<ChangedPath>,
    /// Commit message; absent for quiet logs
    #[serde(default)]
    pub msg: Option<String>,
}

/// A path touched by a revision (`<path>` inside `<paths>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    #[serde(rename(deserialize = "$text"), default)]
    pub path: String,
    #[serde(rename(deserialize = "@kind"), default)]
    pub kind: NodeKind,
    #[serde(rename(deserialize = "@action"), default)]
    pub action: Action,
    #[serde(rename(deserialize = "@text-mods"), default)]
    pub text_mods: String,
    #[serde(rename(deserialize = "@prop-mods"), default)]
    pub prop_mods: String,
    #[serde(rename(deserialize = "@copyfrom-path"), default)]
    pub copyfrom_path: Option<String>,
    #[serde(rename(deserialize = "@copyfrom-rev"), default)]
    pub copyfrom_rev: Option<String>,
}

fn unwrap_paths<'de, D>(deserializer: D) -> Result<Vec<ChangedPath>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Paths {
        #[serde(default)]
        path: Vec<ChangedPath>,
    }

    Ok(Paths::deserialize(deserializer)?.path)
}

/// Outcome of a successful export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Number of `A <path>` notifications published
    pub files: usize,
    /// Revision from the trailing `Exported revision N.` line
    pub revision: Option<String>,
}
