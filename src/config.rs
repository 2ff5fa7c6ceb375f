// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that homesync uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! There are two kinds of configuration. The __settings__ file is a TOML
//! document that tells homesync where the source tree and home directory
//! live. A __permission manifest__ is a YAML document that can sit in any
//! directory of the source tree, and describes which mode bits its entries
//! should receive once they have been linked.

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_yaml::Value;
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Default name of the whole-directory sentinel marker.
pub const DEFAULT_SENTINEL: &str = ".linkdir";

/// Default name of the permission manifest file.
pub const DEFAULT_MANIFEST: &str = ".permissions.yaml";

/// Operating system housekeeping files that are never mirrored.
pub const HOUSEKEEPING: &[&str] = &[".DS_Store"];

/// Settings file layout.
///
/// Every field is optional. Anything left out falls back to a default that
/// is resolved from the environment by the caller.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Source and target settings for home directory mirroring.
    #[serde(default)]
    pub settings: SyncSettings,

    /// Settings for the Dropbox merge.
    #[serde(default)]
    pub dropbox: DropboxSettings,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.settings.source = settings.settings.source.map(expand_path).transpose()?;
        settings.settings.target = settings.settings.target.map(expand_path).transpose()?;
        settings.dropbox.dir = settings.dropbox.dir.map(expand_path).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Home directory mirroring settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    /// Source tree to mirror.
    pub source: Option<PathBuf>,

    /// Target directory to mirror source tree into.
    pub target: Option<PathBuf>,

    /// Name of the whole-directory sentinel marker.
    pub sentinel: Option<String>,

    /// Name of permission manifest files.
    pub manifest: Option<String>,

    /// Extra file names to never mirror.
    pub exclude: Option<Vec<String>>,
}

impl SyncSettings {
    /// Sentinel marker name in effect.
    pub fn sentinel_name(&self) -> &str {
        self.sentinel.as_deref().unwrap_or(DEFAULT_SENTINEL)
    }

    /// Permission manifest name in effect.
    pub fn manifest_name(&self) -> &str {
        self.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST)
    }
}

/// Dropbox merge settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DropboxSettings {
    /// Path to Dropbox folder.
    pub dir: Option<PathBuf>,
}

/// Permission manifest layout.
///
/// The `chmod` table is kept as raw YAML values so that a single bad rule can
/// be reported and skipped without failing the whole document. Use
/// [`PermissionManifest::rules`] to obtain the typed rules.
///
/// ```yaml
/// chmod:
///   "600": ["**/*"]
///   "700": "**/"
/// ```
#[derive(Default, Debug, PartialEq, Clone, Deserialize)]
pub struct PermissionManifest {
    /// Octal mode to glob pattern listing.
    pub chmod: Option<ModeTable>,
}

impl PermissionManifest {
    /// Validate every rule in document order.
    ///
    /// Each entry of the `chmod` table yields either a typed rule, or the
    /// reason why that entry alone must be skipped.
    pub fn rules(&self) -> Vec<Result<PermissionRule, RuleError>> {
        let Some(chmod) = &self.chmod else {
            return Vec::new();
        };

        chmod
            .0
            .iter()
            .map(|(spec, value)| -> Result<PermissionRule, RuleError> {
                let mode = parse_mode(spec)?;
                let patterns = match value {
                    Value::String(pattern) => vec![pattern.clone()],
                    Value::Sequence(patterns) => patterns
                        .iter()
                        .map(|pattern| match pattern {
                            Value::String(pattern) => Ok(pattern.clone()),
                            _ => Err(RuleError::InvalidPatterns(spec.clone())),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(RuleError::InvalidPatterns(spec.clone())),
                };

                Ok(PermissionRule { mode, patterns })
            })
            .collect()
    }
}

impl FromStr for PermissionManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        // INVARIANT: An empty document is a manifest without rules.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(data).map_err(ConfigError::Yaml)
    }
}

/// Entries of a `chmod` table in document order.
///
/// Keys keep their literal spelling. YAML would otherwise resolve an unquoted
/// `0o644` to the integer 420, and `600` to six hundred, before anyone gets
/// to read them as octal.
#[derive(Default, Debug, PartialEq, Clone)]
pub struct ModeTable(pub Vec<(String, Value)>);

impl<'de> Deserialize<'de> for ModeTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ModeTableVisitor;

        impl<'de> Visitor<'de> for ModeTableVisitor {
            type Value = ModeTable;

            fn expecting(&self, fmt: &mut Formatter<'_>) -> FmtResult {
                fmt.write_str("a table of octal modes to glob patterns")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, Value>()? {
                    entries.push(entry);
                }

                Ok(ModeTable(entries))
            }
        }

        deserializer.deserialize_map(ModeTableVisitor)
    }
}

/// Mode bits paired with the glob patterns they apply to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PermissionRule {
    /// Permission bits to apply.
    pub mode: u32,

    /// Glob patterns relative to the manifest's directory.
    pub patterns: Vec<String>,
}

/// Parse an octal mode specification like "600" or "0o755".
///
/// # Errors
///
/// - Return [`RuleError::InvalidMode`] if specification is not base 8, or
///   exceeds `0o7777`.
pub fn parse_mode(spec: &str) -> Result<u32, RuleError> {
    let trimmed = spec.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);

    match u32::from_str_radix(digits, 8) {
        Ok(mode) if !digits.starts_with('+') && mode <= 0o7777 => Ok(mode),
        _ => Err(RuleError::InvalidMode(spec.to_string())),
    }
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Invalid permission manifest rule.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Mode specification is not a valid octal number.
    #[error("invalid mode {0}")]
    InvalidMode(String),

    /// Patterns are neither a string nor a list of strings.
    #[error("patterns for mode {0} must be a string or list of strings")]
    InvalidPatterns(String),
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to deserialize permission manifest.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("BLAH", "/home/blah/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [settings]
            source = "$BLAH/home"
            target = "/tmp/target"
            sentinel = ".atomic"
            exclude = ["Thumbs.db"]

            [dropbox]
            dir = "$BLAH/Dropbox"
        "#
        .parse()?;

        let expect = Settings {
            settings: SyncSettings {
                source: Some("/home/blah/blah/home".into()),
                target: Some("/tmp/target".into()),
                sentinel: Some(".atomic".into()),
                manifest: None,
                exclude: Some(vec!["Thumbs.db".into()]),
            },
            dropbox: DropboxSettings {
                dir: Some("/home/blah/blah/Dropbox".into()),
            },
        };

        assert_eq!(result, expect);
        assert_eq!(result.settings.sentinel_name(), ".atomic");
        assert_eq!(result.settings.manifest_name(), DEFAULT_MANIFEST);

        Ok(())
    }

    #[test]
    fn deserialize_empty_settings() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());
        assert_eq!(result.settings.sentinel_name(), DEFAULT_SENTINEL);
        Ok(())
    }

    #[test]
    fn serialize_settings() {
        let result = Settings {
            settings: SyncSettings {
                source: Some("/home/blah/.dotfiles/home".into()),
                target: Some("/home/blah".into()),
                ..Default::default()
            },
            dropbox: DropboxSettings {
                dir: Some("/home/blah/Dropbox".into()),
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            source = "/home/blah/.dotfiles/home"
            target = "/home/blah"

            [dropbox]
            dir = "/home/blah/Dropbox"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn manifest_rules_keep_document_order() -> anyhow::Result<()> {
        let manifest: PermissionManifest = indoc! {r#"
            chmod:
              "700": "**/"
              600:
                - "**/*"
                - "."
        "#}
        .parse()?;

        let result = manifest.rules();
        let expect = vec![
            Ok(PermissionRule {
                mode: 0o700,
                patterns: vec!["**/".into()],
            }),
            Ok(PermissionRule {
                mode: 0o600,
                patterns: vec!["**/*".into(), ".".into()],
            }),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case("600:", 0o600; "plain digits")]
    #[test_case("0755:", 0o755; "leading zero")]
    #[test_case("0o644:", 0o644; "rust prefix")]
    #[test_case("\"0o700\":", 0o700; "quoted prefix")]
    #[test]
    fn mode_keys_keep_their_spelling(key: &str, expect: u32) {
        let manifest: PermissionManifest = format!("chmod:\n  {key} key\n").parse().unwrap();
        let result = manifest.rules();
        let expect = vec![Ok(PermissionRule {
            mode: expect,
            patterns: vec!["key".into()],
        })];
        pretty_assertions::assert_eq!(result, expect);
    }

    #[test]
    fn manifest_bad_rule_does_not_spoil_others() -> anyhow::Result<()> {
        let manifest: PermissionManifest = indoc! {r#"
            chmod:
              "9xx": ["*"]
              "644": ["*.pub"]
              "755": { nested: true }
        "#}
        .parse()?;

        let result = manifest.rules();
        let expect = vec![
            Err(RuleError::InvalidMode("9xx".into())),
            Ok(PermissionRule {
                mode: 0o644,
                patterns: vec!["*.pub".into()],
            }),
            Err(RuleError::InvalidPatterns("755".into())),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn manifest_without_chmod_has_no_rules() -> anyhow::Result<()> {
        let manifest: PermissionManifest = "".parse()?;
        assert!(manifest.rules().is_empty());

        let manifest: PermissionManifest = "other: 1\n".parse()?;
        assert!(manifest.rules().is_empty());

        Ok(())
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let result = "chmod: [unclosed".parse::<PermissionManifest>();
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test_case("600", Some(0o600); "plain octal")]
    #[test_case("0755", Some(0o755); "leading zero")]
    #[test_case("0o700", Some(0o700); "rust prefix")]
    #[test_case("4755", Some(0o4755); "setuid")]
    #[test_case("800", None; "digit out of base")]
    #[test_case("77777", None; "too many bits")]
    #[test_case("+600", None; "signed")]
    #[test_case("rwx", None; "symbolic")]
    #[test]
    fn mode_parsing(spec: &str, expect: Option<u32>) {
        pretty_assertions::assert_eq!(parse_mode(spec).ok(), expect);
    }
}
