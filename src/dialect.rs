//! Vendor dialect tables.
//!
//! A [`Dialect`] is immutable per-vendor data injected into the generic
//! engine: error/ignore patterns, config-mode wrapper commands, prompt
//! patterns and pagination control. The engine itself never hardwires a
//! vendor command string; everything vendor-specific lives here or in the
//! translation units built on top.

use regex::RegexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Builtin dialect names supported by this crate.
pub const BUILTIN_DIALECTS: &[&str] = &["cisco", "huawei", "h3c", "juniper", "brocade"];

/// High-level command classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Read-only command; safe to issue outside config mode.
    Show,
    /// Mutating command; issued inside the dialect's config-mode wrapper.
    Config,
}

/// Descriptive metadata for a dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DialectMetadata {
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub dialect_version: String,
}

/// Raw dialect definition. All fields are plain data so dialects can be
/// loaded from external sources as well as from the builtin catalog.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DialectSpec {
    pub name: String,
    pub vendor: String,
    pub family: String,
    /// Regex patterns that mark a command as rejected by the device.
    pub error_patterns: Vec<String>,
    /// Error patterns that are benign for this vendor and must not fail a
    /// command (e.g. deleting an object that is already gone).
    pub ignore_patterns: Vec<String>,
    /// Prompt patterns marking end-of-output on an interactive session.
    pub prompt_patterns: Vec<String>,
    /// Commands entering configuration mode, in order.
    pub config_enter: Vec<String>,
    /// Commands leaving configuration mode, in order.
    pub config_exit: Vec<String>,
    /// Command prefixes classified as read-only.
    pub show_prefixes: Vec<String>,
    /// Command disabling output pagination, issued once per session.
    pub pagination_disable: Option<String>,
}

/// A compiled, validated vendor dialect.
#[derive(Debug, Clone)]
pub struct Dialect {
    spec: DialectSpec,
    error_set: RegexSet,
    ignore_set: Option<RegexSet>,
}

impl Dialect {
    /// Compiles a dialect spec, validating its regex patterns and wrapper
    /// commands.
    pub fn compile(spec: DialectSpec) -> Result<Dialect, TranslateError> {
        if spec.name.trim().is_empty() {
            return Err(TranslateError::InvalidDialect(
                "dialect name is empty".to_string(),
            ));
        }
        for cmd in spec.config_enter.iter().chain(&spec.config_exit) {
            if cmd.trim().is_empty() {
                return Err(TranslateError::InvalidDialect(format!(
                    "dialect '{}' has an empty config wrapper command",
                    spec.name
                )));
            }
        }
        let error_set = RegexSet::new(&spec.error_patterns).map_err(|err| {
            TranslateError::InvalidDialect(format!(
                "dialect '{}': invalid error pattern: {err}",
                spec.name
            ))
        })?;
        let ignore_set = if spec.ignore_patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(&spec.ignore_patterns).map_err(|err| {
                TranslateError::InvalidDialect(format!(
                    "dialect '{}': invalid ignore pattern: {err}",
                    spec.name
                ))
            })?)
        };
        Ok(Dialect {
            spec,
            error_set,
            ignore_set,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn metadata(&self) -> DialectMetadata {
        DialectMetadata {
            name: self.spec.name.clone(),
            vendor: self.spec.vendor.clone(),
            family: self.spec.family.clone(),
            dialect_version: "1.0.0".to_string(),
        }
    }

    pub fn prompt_patterns(&self) -> &[String] {
        &self.spec.prompt_patterns
    }

    pub fn config_enter(&self) -> &[String] {
        &self.spec.config_enter
    }

    pub fn config_exit(&self) -> &[String] {
        &self.spec.config_exit
    }

    pub fn pagination_disable(&self) -> Option<&str> {
        self.spec.pagination_disable.as_deref()
    }

    /// Finds the first line of `output` the device marked as an error,
    /// skipping lines matched by the ignore patterns.
    pub fn first_error_line<'a>(&self, output: &'a str) -> Option<&'a str> {
        for line in output.lines().map(str::trim_end) {
            if self.error_set.is_match(line) {
                let ignorable = self
                    .ignore_set
                    .as_ref()
                    .map(|set| set.is_match(line))
                    .unwrap_or(false);
                if !ignorable {
                    return Some(line);
                }
            }
        }
        None
    }

    /// Classifies a command as read-only or mutating.
    ///
    /// Current rule is intentionally simple: commands starting with one of
    /// the dialect's show prefixes are read-only, everything else mutates.
    pub fn classify_command(&self, command: &str) -> CommandKind {
        let cmd = command.trim().to_ascii_lowercase();
        if self
            .spec
            .show_prefixes
            .iter()
            .any(|prefix| cmd.starts_with(prefix.as_str()))
        {
            return CommandKind::Show;
        }
        CommandKind::Config
    }
}

/// Returns a builtin dialect by name (case-insensitive).
pub fn by_name(name: &str) -> Result<Dialect, TranslateError> {
    match name.to_ascii_lowercase().as_str() {
        "cisco" => cisco(),
        "huawei" => huawei(),
        "h3c" => h3c(),
        "juniper" => juniper(),
        "brocade" => brocade(),
        _ => Err(TranslateError::DialectNotFound(name.to_string())),
    }
}

/// Metadata for all builtin dialects.
pub fn catalog() -> Vec<DialectMetadata> {
    BUILTIN_DIALECTS
        .iter()
        .filter_map(|name| by_name(name).ok())
        .map(|d| d.metadata())
        .collect()
}

/// Exports the builtin catalog as pretty JSON.
pub fn catalog_json() -> Result<String, TranslateError> {
    serde_json::to_string_pretty(&catalog())
        .map_err(|e| TranslateError::InternalError(format!("encode dialect catalog: {e}")))
}

/// Cisco IOS/IOS-XE dialect.
pub fn cisco() -> Result<Dialect, TranslateError> {
    Dialect::compile(DialectSpec {
        name: "cisco".to_string(),
        vendor: "Cisco".to_string(),
        family: "IOS/IOS-XE".to_string(),
        error_patterns: vec![
            r"% Invalid command at '\^' marker\.".to_string(),
            r"% Invalid parameter detected at '\^' marker\.".to_string(),
            r"^%.+".to_string(),
            r"^Command rejected:.*".to_string(),
            r"^Command authorization failed.*".to_string(),
            r"ERROR:.+".to_string(),
        ],
        ignore_patterns: vec![r"ERROR: object \(.+\) does not exist.".to_string()],
        prompt_patterns: vec![
            r"^\S+\(\S+\)#\s*$".to_string(),
            r"^[^\s#]+#\s*$".to_string(),
            r"^[^\s<]+>\s*$".to_string(),
        ],
        config_enter: vec!["configure terminal".to_string()],
        config_exit: vec!["end".to_string()],
        show_prefixes: vec![
            "show ".to_string(),
            "ping ".to_string(),
            "traceroute ".to_string(),
        ],
        pagination_disable: Some("terminal length 0".to_string()),
    })
}

/// Huawei VRP dialect.
pub fn huawei() -> Result<Dialect, TranslateError> {
    Dialect::compile(DialectSpec {
        name: "huawei".to_string(),
        vendor: "Huawei".to_string(),
        family: "VRP".to_string(),
        error_patterns: vec![r"Error: .+$".to_string(), r"\^$".to_string()],
        ignore_patterns: vec![
            r"Error: The delete configuration does not exist.".to_string(),
            r"Error: The specified rule does not exist yet.".to_string(),
            r"This condition has already been configured".to_string(),
        ],
        prompt_patterns: vec![
            r"^(HRP_M|HRP_S)?\[.+]+\s*$".to_string(),
            r"^(RBM_P|RBM_S)?<.+>\s*$".to_string(),
        ],
        config_enter: vec!["system-view".to_string()],
        config_exit: vec!["return".to_string()],
        show_prefixes: vec![
            "display ".to_string(),
            "ping ".to_string(),
            "tracert ".to_string(),
        ],
        pagination_disable: Some("screen-length 0 temporary".to_string()),
    })
}

/// H3C Comware dialect.
pub fn h3c() -> Result<Dialect, TranslateError> {
    Dialect::compile(DialectSpec {
        name: "h3c".to_string(),
        vendor: "H3C".to_string(),
        family: "Comware".to_string(),
        error_patterns: vec![
            r".+\^.+".to_string(),
            r".+%.+".to_string(),
            r".+does not exist.+".to_string(),
        ],
        ignore_patterns: vec![],
        prompt_patterns: vec![
            r"^(RBM_P|RBM_S)?\[.+\]\s*$".to_string(),
            r"^(RBM_P|RBM_S)?<.+>\s*$".to_string(),
        ],
        config_enter: vec!["system-view".to_string()],
        config_exit: vec!["return".to_string()],
        show_prefixes: vec!["display ".to_string(), "ping ".to_string()],
        pagination_disable: Some("screen-length disable".to_string()),
    })
}

/// Juniper JunOS dialect.
pub fn juniper() -> Result<Dialect, TranslateError> {
    Dialect::compile(DialectSpec {
        name: "juniper".to_string(),
        vendor: "Juniper".to_string(),
        family: "JunOS".to_string(),
        error_patterns: vec![
            r"syntax error.*".to_string(),
            r"error:.+".to_string(),
            r".*unknown command.*".to_string(),
            r"invalid value .+".to_string(),
        ],
        ignore_patterns: vec![
            r"warning: statement not found".to_string(),
            r"warning: element \S+ not found".to_string(),
        ],
        prompt_patterns: vec![r"^\S+@\S+#\s*$".to_string(), r"^\S+@\S+>\s*$".to_string()],
        config_enter: vec!["configure".to_string()],
        config_exit: vec!["commit and-quit".to_string()],
        show_prefixes: vec!["show ".to_string(), "ping ".to_string()],
        pagination_disable: Some("set cli screen-length 0".to_string()),
    })
}

/// Brocade/Ruckus Ironware dialect.
pub fn brocade() -> Result<Dialect, TranslateError> {
    Dialect::compile(DialectSpec {
        name: "brocade".to_string(),
        vendor: "Brocade".to_string(),
        family: "Ironware".to_string(),
        error_patterns: vec![
            r"^Invalid input ->.*".to_string(),
            r"^Error - .+".to_string(),
            r"^Error: .+".to_string(),
            r"^Ambiguous input ->.*".to_string(),
        ],
        ignore_patterns: vec![r"^Error - .+ is not configured$".to_string()],
        prompt_patterns: vec![
            r"^\S+\(config[^)]*\)#\s*$".to_string(),
            r"^[^\s#]+#\s*$".to_string(),
            r"^[^\s<]+>\s*$".to_string(),
        ],
        config_enter: vec!["configure terminal".to_string()],
        config_exit: vec!["end".to_string()],
        show_prefixes: vec!["show ".to_string(), "ping ".to_string()],
        pagination_disable: Some("skip-page-display".to_string()),
    })
}
