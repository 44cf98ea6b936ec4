// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Section loading for `iqduo.toml`.
//!
//! One file holds a `[<section>]` table per program. Errors name the file
//! and, once the TOML itself parses, the section that was rejected.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_NAME: &str = "iqduo.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid TOML: {source}", .path.display())]
    Syntax {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{}: missing [{section}] section", .path.display())]
    MissingSection { path: PathBuf, section: &'static str },

    #[error("{}: [{section}]: {message}", .path.display())]
    Section {
        path: PathBuf,
        section: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Section the error refers to, when it got that far.
    pub fn section(&self) -> Option<&'static str> {
        match self {
            Self::MissingSection { section, .. } | Self::Section { section, .. } => {
                Some(*section)
            }
            Self::Read { .. } | Self::Syntax { .. } => None,
        }
    }
}

/// Default search paths, current directory first, then XDG config, then /etc.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("iqduo").join(FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/iqduo").join(FILE_NAME));
    paths
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    section: &'static str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_section(path, &content, section)
}

/// `Ok(None)` when the file has no `[section]` table.
fn parse_section<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    section: &'static str,
) -> Result<Option<T>, ConfigError> {
    let mut table: toml::Table = toml::from_str(content).map_err(|source| ConfigError::Syntax {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(value) = table.remove(section) else {
        return Ok(None);
    };
    let section_error = |message: String| ConfigError::Section {
        path: path.to_path_buf(),
        section,
        message,
    };
    if !value.is_table() {
        return Err(section_error(format!("expected a table, found {}", value.type_str())));
    }
    value
        .try_into::<T>()
        .map(Some)
        .map_err(|e| section_error(e.message().to_string()))
}

/// Trait for loading configuration from an `iqduo.toml` section.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `iqduo.toml` (e.g. `"iqduo-server"`).
    fn section_key() -> &'static str;

    /// Load the section from a specific file path.
    ///
    /// Fails if the file cannot be read, is not valid TOML, lacks the
    /// `[<section_key>]` table, or the table does not deserialize.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::MissingSection {
                path: path.to_path_buf(),
                section: Self::section_key(),
            }
        })
    }

    /// Search default paths (`iqduo.toml` in CWD → XDG → /etc) and load
    /// the first file that contains the expected section.
    ///
    /// Returns `(config, path_where_found)` or `(Default::default(), None)`
    /// when no config file is found.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        rate: u32,
        name: String,
    }

    impl ConfigFile for Sample {
        fn section_key() -> &'static str {
            "sample"
        }
    }

    fn parse(content: &str) -> Result<Option<Sample>, ConfigError> {
        parse_section(Path::new("iqduo.toml"), content, "sample")
    }

    #[test]
    fn test_parse_section_applies_defaults() {
        let parsed = parse("[sample]\nrate = 96000\n").unwrap();
        assert_eq!(
            parsed,
            Some(Sample {
                rate: 96000,
                name: String::new()
            })
        );
    }

    #[test]
    fn test_parse_section_missing_key() {
        assert!(parse("[other]\nrate = 1\n").unwrap().is_none());
    }

    #[test]
    fn test_bad_field_names_section() {
        let err = parse("[sample]\nrate = \"fast\"\n").unwrap_err();
        assert_eq!(err.section(), Some("sample"));
        let msg = err.to_string();
        assert!(msg.starts_with("iqduo.toml: [sample]:"), "{msg}");
    }

    #[test]
    fn test_section_must_be_table() {
        let err = parse("sample = 3\n").unwrap_err();
        assert!(err.to_string().contains("expected a table"), "{err}");
    }

    #[test]
    fn test_syntax_error_has_no_section() {
        let err = parse("[sample\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { .. }));
        assert_eq!(err.section(), None);
    }

    #[test]
    fn test_load_from_file_missing_section() {
        let path = std::env::temp_dir().join(format!("iqduo-cfg-{}.toml", std::process::id()));
        std::fs::write(&path, "[other]\nrate = 1\n").unwrap();
        let err = Sample::load_from_file(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(err.to_string().contains("missing [sample] section"));
        assert_eq!(err.section(), Some("sample"));
    }

    #[test]
    fn test_load_from_file_unreadable() {
        let err = Sample::load_from_file(Path::new("/nonexistent/iqduo.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
