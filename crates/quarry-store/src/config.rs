//! Table layout configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hash key of the job and trigger tables.
pub const ATTR_GROUP: &str = "Group";

/// Range key of the job and trigger tables; hash key of the group and
/// calendar tables.
pub const ATTR_NAME: &str = "Name";

/// Hash key of the scheduler instance table.
pub const ATTR_INSTANCE_ID: &str = "InstanceId";

/// The six tables the job store persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    Job,
    JobGroup,
    Trigger,
    TriggerGroup,
    Scheduler,
    Calendar,
}

impl TableKind {
    /// Every table, in provisioning order.
    pub const ALL: [TableKind; 6] = [
        TableKind::Job,
        TableKind::JobGroup,
        TableKind::Trigger,
        TableKind::TriggerGroup,
        TableKind::Scheduler,
        TableKind::Calendar,
    ];

    /// Table name before any deployment prefix is applied.
    pub fn base_name(self) -> &'static str {
        match self {
            TableKind::Job => "Job",
            TableKind::JobGroup => "JobGroup",
            TableKind::Trigger => "Trigger",
            TableKind::TriggerGroup => "TriggerGroup",
            TableKind::Scheduler => "Scheduler",
            TableKind::Calendar => "Calendar",
        }
    }

    /// Key schema the table is created with.
    pub fn key_schema(self) -> KeySchema {
        match self {
            TableKind::Job | TableKind::Trigger => KeySchema::composite(ATTR_GROUP, ATTR_NAME),
            TableKind::JobGroup | TableKind::TriggerGroup | TableKind::Calendar => {
                KeySchema::hash(ATTR_NAME)
            }
            TableKind::Scheduler => KeySchema::hash(ATTR_INSTANCE_ID),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

/// Hash key and optional range key of a table. All key attributes are strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub hash: String,
    pub range: Option<String>,
}

impl KeySchema {
    pub fn hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            range: None,
        }
    }

    pub fn composite(hash: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            range: Some(range.into()),
        }
    }

    /// Key attribute names, hash first.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash.as_str()).chain(self.range.as_deref())
    }
}

/// Resolved names of the six tables.
///
/// Passed explicitly to the bootstrapper and every repository so that
/// isolated stores (one per test, one per deployment) can coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
    names: [String; 6],
}

impl TableNames {
    /// Unprefixed names: `Job`, `JobGroup`, `Trigger`, ...
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Names prefixed with `prefix`, e.g. `qrtz_Job`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let names = TableKind::ALL.map(|kind| format!("{}{}", prefix, kind.base_name()));
        Self { prefix, names }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, kind: TableKind) -> &str {
        &self.names[kind.index()]
    }

    /// Find which table a resolved name belongs to.
    pub fn kind_of(&self, name: &str) -> Option<TableKind> {
        TableKind::ALL
            .into_iter()
            .find(|kind| self.name(*kind) == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableKind, &str)> {
        TableKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.name(kind)))
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::new()
    }
}

/// Provisioned capacity for newly created tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            read_capacity_units: 1,
            write_capacity_units: 1,
        }
    }
}
