//! Discovery and parsing of the project's build-info file.
//!
//! The file may be a property list, JSON or YAML document; each is reduced to
//! the same [`RawSettings`] mapping before resolution.

use super::resolver::RawSettings;
use crate::bundler::error::{Context, Error, ErrorExt, Result};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};

/// Base name of the build-info file inside a project.
pub const BUILD_INFO_FILE: &str = "build-info";

/// Build-info serialisation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildInfoFormat {
    /// `build-info.plist`
    Plist,
    /// `build-info.json`
    Json,
    /// `build-info.yaml` or `build-info.yml`
    Yaml,
}

impl BuildInfoFormat {
    /// Extensions probed for this format, in order.
    fn extensions(self) -> &'static [&'static str] {
        match self {
            BuildInfoFormat::Plist => &["plist"],
            BuildInfoFormat::Json => &["json"],
            BuildInfoFormat::Yaml => &["yaml", "yml"],
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "plist" => Some(BuildInfoFormat::Plist),
            "json" => Some(BuildInfoFormat::Json),
            "yaml" | "yml" => Some(BuildInfoFormat::Yaml),
            _ => None,
        }
    }
}

/// Finds the build-info file of `project_dir`.
///
/// With `format` set only that format is considered. Otherwise every
/// supported extension is probed and more than one match is an error.
pub fn find_build_info(project_dir: &Path, format: Option<BuildInfoFormat>) -> Result<Option<PathBuf>> {
    let extensions: Vec<&str> = match format {
        Some(format) => format.extensions().to_vec(),
        None => vec!["plist", "json", "yaml", "yml"],
    };

    let mut found: Option<PathBuf> = None;
    for ext in extensions {
        let candidate = project_dir.join(format!("{BUILD_INFO_FILE}.{ext}"));
        if !candidate.is_file() {
            continue;
        }
        if let Some(existing) = &found {
            return Err(Error::GenericError(format!(
                "multiple build-info files found: {} and {}",
                existing.display(),
                candidate.display()
            )));
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Reads and parses `path` according to its extension.
pub fn read_build_info(path: &Path) -> Result<RawSettings> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(BuildInfoFormat::from_extension)
        .with_context(|| format!("{} has no recognised build-info extension", path.display()))?;

    let value: Value = match format {
        BuildInfoFormat::Plist => {
            let plist = plist::Value::from_file(path)
                .map_err(Error::from)
                .with_context(|| format!("{} is not a valid plist file", path.display()))?;
            plist_to_json(plist)
        }
        BuildInfoFormat::Json => {
            let text = std::fs::read_to_string(path).fs_context("reading build-info", path)?;
            serde_json::from_str(&text)
                .map_err(Error::from)
                .with_context(|| format!("{} is not a valid json file", path.display()))?
        }
        BuildInfoFormat::Yaml => {
            let text = std::fs::read_to_string(path).fs_context("reading build-info", path)?;
            serde_yaml::from_str(&text)
                .map_err(Error::from)
                .with_context(|| format!("{} is not a valid yaml file", path.display()))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::GenericError(format!(
            "{} must contain a dictionary at its top level",
            path.display()
        ))),
    }
}

/// Locates and reads the build-info file, returning its path and contents.
pub fn load_build_info(
    project_dir: &Path,
    format: Option<BuildInfoFormat>,
) -> Result<Option<(PathBuf, RawSettings)>> {
    let Some(path) = find_build_info(project_dir, format)? else {
        return Ok(None);
    };
    log::debug!("Reading build-info from {}", path.display());
    let raw = read_build_info(&path)?;
    Ok(Some((path, raw)))
}

/// Converts a plist value into the JSON value model.
///
/// Dates become ISO 8601 strings; binary data and UIDs have no settings
/// meaning and become null.
fn plist_to_json(value: plist::Value) -> Value {
    match value {
        plist::Value::Array(items) => Value::Array(items.into_iter().map(plist_to_json).collect()),
        plist::Value::Dictionary(dict) => Value::Object(
            dict.into_iter()
                .map(|(k, v)| (k, plist_to_json(v)))
                .collect(),
        ),
        plist::Value::Boolean(b) => Value::Bool(b),
        plist::Value::String(s) => Value::String(s),
        plist::Value::Integer(i) => match (i.as_signed(), i.as_unsigned()) {
            (Some(n), _) => Value::Number(n.into()),
            (None, Some(n)) => Value::Number(n.into()),
            (None, None) => Value::Null,
        },
        plist::Value::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        plist::Value::Date(date) => Value::String(date.to_xml_format()),
        _ => Value::Null,
    }
}
