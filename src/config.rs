//! Configuration loaded once at process start
//!
//! Everything has a default, so an empty TOML document is a valid configuration.
//!
//! ```toml
//! [ledger]
//! path = "/var/lib/edoc-ledger"
//!
//! [reference]
//! version = 1
//! suffix_width = 3
//! persist_on_ledger = true
//!
//! [log]
//! level = "edoc_ledger=debug,info"
//! ```
use super::contract::Operation;
use super::error::ConfigError;
use super::record::Status;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub reference: ReferenceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory of the sled database.
    pub path: PathBuf,
    /// Open a throwaway database instead of `path`.
    pub temporary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub version: u32,
    pub api_prefix: String,
    pub op_code_prefix: String,
    /// Digits of the zero-padded index appended to a table prefix.
    pub suffix_width: usize,
    /// Whether `init-ledger` writes the tables to the ledger.
    pub persist_on_ledger: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("edoc-ledger.db"),
            temporary: false,
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            api_prefix: "API".into(),
            op_code_prefix: "OPCode".into(),
            suffix_width: 3,
            persist_on_ledger: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            with_target: true,
            ansi: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.reference.validate()?;
        Ok(config)
    }
}

impl ReferenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9).contains(&self.suffix_width) {
            return Err(ConfigError::Validation(format!(
                "reference.suffix_width must be between 1 and 9, got {}",
                self.suffix_width
            )));
        }
        for (field, prefix) in [
            ("api_prefix", &self.api_prefix),
            ("op_code_prefix", &self.op_code_prefix),
        ] {
            if prefix.is_empty() || prefix.contains('\0') {
                return Err(ConfigError::Validation(format!(
                    "reference.{field} must be non-empty and free of NUL characters"
                )));
            }
        }
        // one prefix nested in the other would make their ranges overlap
        if self.api_prefix.starts_with(&self.op_code_prefix)
            || self.op_code_prefix.starts_with(&self.api_prefix)
        {
            return Err(ConfigError::Validation(
                "reference.api_prefix and reference.op_code_prefix must not prefix each other"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// The static reference tables: supported API names and legal operation codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTables {
    pub version: u32,
    pub persist_on_ledger: bool,
    suffix_width: usize,
    apis: Table,
    op_codes: Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub prefix: String,
    pub entries: Vec<String>,
}

impl ReferenceTables {
    pub fn from_config(config: &ReferenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let tables = Self {
            version: config.version,
            persist_on_ledger: config.persist_on_ledger,
            suffix_width: config.suffix_width,
            apis: Table {
                name: "apis",
                prefix: config.api_prefix.clone(),
                entries: Operation::ALL.iter().map(|op| op.name().to_owned()).collect(),
            },
            op_codes: Table {
                name: "op-codes",
                prefix: config.op_code_prefix.clone(),
                entries: Status::ALL.iter().map(|s| s.op_code().to_owned()).collect(),
            },
        };

        // the largest suffix is the exclusive upper bound of a table scan
        let capacity = 10usize.pow(config.suffix_width as u32) - 1;
        for table in tables.tables() {
            if table.entries.len() > capacity {
                return Err(ConfigError::Validation(format!(
                    "table '{}' has {} entries but suffix_width {} addresses only {capacity}",
                    table.name,
                    table.entries.len(),
                    config.suffix_width
                )));
            }
        }

        Ok(tables)
    }

    pub fn apis(&self) -> &Table {
        &self.apis
    }

    pub fn op_codes(&self) -> &Table {
        &self.op_codes
    }

    pub fn tables(&self) -> [&Table; 2] {
        [&self.apis, &self.op_codes]
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables().into_iter().find(|t| t.name == name)
    }

    /// `API000`, `API001`, ...
    pub fn entry_key(&self, table: &Table, index: usize) -> String {
        format!("{}{:0width$}", table.prefix, index, width = self.suffix_width)
    }

    /// Position of `key` in `table` under the current layout.
    ///
    /// `None` for keys written by an earlier layout: another suffix width, or an index
    /// past the end of a table that has since shrunk.
    pub fn entry_index(&self, table: &Table, key: &str) -> Option<usize> {
        let suffix = key.strip_prefix(table.prefix.as_str())?;
        if suffix.len() != self.suffix_width || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok().filter(|index| *index < table.entries.len())
    }

    /// Start and exclusive end suffix covering every addressable entry.
    pub fn suffix_bounds(&self) -> (String, String) {
        ("0".to_owned(), "9".repeat(self.suffix_width))
    }
}

impl Default for ReferenceTables {
    fn default() -> Self {
        // the default config always validates
        Self::from_config(&ReferenceConfig::default())
            .unwrap_or_else(|e| unreachable!("default reference config rejected: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.ledger.path, PathBuf::from("edoc-ledger.db"));
        assert_eq!(config.reference.suffix_width, 3);
        assert_eq!(config.reference.api_prefix, "API");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [ledger]
            path = "/tmp/edocs"

            [reference]
            version = 2
            suffix_width = 4
            persist_on_ledger = false

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.path, PathBuf::from("/tmp/edocs"));
        assert_eq!(config.reference.version, 2);
        assert_eq!(config.reference.suffix_width, 4);
        assert!(!config.reference.persist_on_ledger);
        assert_eq!(config.reference.op_code_prefix, "OPCode");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn rejects_bad_reference_config() {
        assert!(matches!(
            Config::from_toml("[reference]\nsuffix_width = 0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml("[reference]\napi_prefix = \"OP\""),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml("[ledger]\npath = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn tables_reject_too_narrow_suffix() {
        // eleven api names do not fit in a single digit
        let config = ReferenceConfig {
            suffix_width: 1,
            ..ReferenceConfig::default()
        };
        assert!(matches!(
            ReferenceTables::from_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn entry_keys_are_zero_padded() {
        let tables = ReferenceTables::default();

        assert_eq!(tables.entry_key(tables.apis(), 0), "API000");
        assert_eq!(tables.entry_key(tables.op_codes(), 12), "OPCode012");
        assert_eq!(
            tables.suffix_bounds(),
            ("0".to_owned(), "999".to_owned())
        );
        assert_eq!(
            tables.op_codes().entries,
            vec!["create", "modify", "archive", "delete"]
        );
        assert!(tables.table("apis").is_some());
        assert!(tables.table("cars").is_none());
    }

    #[test]
    fn entry_index_only_matches_current_layout() {
        let tables = ReferenceTables::default();
        let op_codes = tables.op_codes();

        assert_eq!(tables.entry_index(op_codes, "OPCode003"), Some(3));
        // past the end of the table
        assert_eq!(tables.entry_index(op_codes, "OPCode004"), None);
        // another suffix width
        assert_eq!(tables.entry_index(op_codes, "OPCode00003"), None);
        assert_eq!(tables.entry_index(op_codes, "OPCode0x3"), None);
        assert_eq!(tables.entry_index(op_codes, "API003"), None);
    }
}
