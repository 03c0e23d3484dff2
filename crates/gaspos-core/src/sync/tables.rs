//! Registry of the tables taking part in replication

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("Invalid regex"));

/// Capabilities of one synced table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSpec {
    name: String,
    record_type: String,
    authoritative: bool,
    critical: bool,
}

impl TableSpec {
    /// Describe an ordinary last-writer-wins table.
    ///
    /// The name becomes a SQL identifier, so it is restricted to lowercase
    /// ASCII letters, digits and underscores.
    pub fn new(name: &str, record_type: &str) -> Result<Self> {
        let name = name.trim();
        if !TABLE_NAME.is_match(name) {
            return Err(Error::InvalidInput(format!("invalid table name: {name}")));
        }

        let record_type = record_type.trim();
        if record_type.is_empty() {
            return Err(Error::InvalidInput(format!(
                "table {name} needs a record type"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            record_type: record_type.to_string(),
            authoritative: false,
            critical: false,
        })
    }

    /// Resolved by full replacement from master instead of per-record merge.
    #[must_use]
    pub const fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }

    /// Zero rows in this table means the replica needs recovery.
    #[must_use]
    pub const fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub const fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub const fn is_critical(&self) -> bool {
        self.critical
    }
}

/// Ordered set of synced tables. Processing order is registration order.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: Vec<TableSpec>,
}

impl TableRegistry {
    pub const fn empty() -> Self {
        Self { tables: Vec::new() }
    }

    /// The point-of-sale table set.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        let standard = [
            ("stock", "StockItem", true, true),
            ("transactions", "SaleTransaction", false, true),
            ("stock_adjustments", "StockAdjustment", false, true),
            ("company_settings", "CompanySetting", false, true),
            ("users", "User", false, true),
            ("discount_types", "DiscountType", false, false),
        ];
        for (name, record_type, authoritative, critical) in standard {
            let Ok(mut spec) = TableSpec::new(name, record_type) else {
                continue;
            };
            spec.authoritative = authoritative;
            spec.critical = critical;
            registry.tables.push(spec);
        }
        registry
    }

    /// Add a table.
    ///
    /// Fails when the name is already taken or when a second authoritative
    /// table is registered.
    pub fn register(&mut self, spec: TableSpec) -> Result<()> {
        if self.get(spec.name()).is_some() {
            return Err(Error::InvalidInput(format!(
                "table {} is already registered",
                spec.name()
            )));
        }
        if spec.is_authoritative() {
            if let Some(existing) = self.authoritative() {
                return Err(Error::InvalidInput(format!(
                    "table {} is already the authoritative table",
                    existing.name()
                )));
            }
        }
        self.tables.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|spec| spec.name == name)
    }

    /// Look up a table, failing with [`Error::UnknownTable`].
    pub fn require(&self, name: &str) -> Result<&TableSpec> {
        self.get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn authoritative(&self) -> Option<&TableSpec> {
        self.tables.iter().find(|spec| spec.authoritative)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(TableSpec::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
