//! Merges a parsed build-info mapping over the defaults.

use super::core::{BuildConfig, NotarizationInfo, SigningInfo};
use crate::bundler::error::ConfigError;
use serde_json::Value;
use std::{str::FromStr, time::Duration};

/// Parsed build-info contents, independent of the file format.
pub type RawSettings = serde_json::Map<String, Value>;

/// Builds a [`BuildConfig`] from `raw`, filling every omitted key with its
/// default.
///
/// Unknown keys are ignored. A value of the wrong type, or outside the legal
/// set of an enumerated key, is reported as a [`ConfigError`] naming the key.
pub fn resolve(raw: Option<&RawSettings>, project_name: &str) -> Result<BuildConfig, ConfigError> {
    let mut config = BuildConfig::defaults(project_name);
    let Some(raw) = raw else {
        return Ok(config);
    };
    let fields = Fields::root(raw);

    if let Some(name) = fields.string("name")? {
        config.name = name;
    }
    if let Some(identifier) = fields.string("identifier")? {
        config.identifier = identifier;
    }
    if let Some(version) = fields.text("version")? {
        config.version = version;
    }
    if let Some(location) = fields.string("install_location")? {
        config.install_location = location;
    }
    if let Some(ownership) = fields.choice("ownership", &["recommended", "preserve", "preserve-other"])? {
        config.ownership = ownership;
    }
    if let Some(action) = fields.choice("postinstall_action", &["none", "logout", "restart"])? {
        config.postinstall_action = action;
    }
    if let Some(flag) = fields.boolean("distribution_style")? {
        config.distribution_style = flag;
    }
    if let Some(flag) = fields.boolean("suppress_bundle_relocation")? {
        config.suppress_bundle_relocation = flag;
    }
    if let Some(flag) = fields.boolean("preserve_xattr")? {
        config.preserve_xattr = flag;
    }
    config.compression = fields.choice("compression", &["legacy", "latest"])?;
    config.min_os_version = fields.text("min_os_version")?;
    config.product_id = fields.string("product_id")?;

    if let Some(signing) = fields.table("signing_info")? {
        config.signing_info = Some(resolve_signing(&signing)?);
    }
    if let Some(notarization) = fields.table("notarization_info")? {
        config.notarization_info = Some(resolve_notarization(&notarization)?);
    }

    Ok(config)
}

fn resolve_signing(fields: &Fields<'_>) -> Result<SigningInfo, ConfigError> {
    let identity = fields
        .string("identity")?
        .ok_or_else(|| ConfigError::new(fields.key("identity"), "is required for signing"))?;

    Ok(SigningInfo {
        identity,
        keychain: fields.string("keychain")?,
        additional_cert_names: fields.string_list("additional_cert_names")?.unwrap_or_default(),
        timestamp: fields.boolean("timestamp")?,
    })
}

fn resolve_notarization(fields: &Fields<'_>) -> Result<NotarizationInfo, ConfigError> {
    let defaults = NotarizationInfo::default();
    let apple_id = match fields.string("apple_id")? {
        Some(id) => Some(id),
        None => fields.string("username")?,
    };

    Ok(NotarizationInfo {
        apple_id,
        team_id: fields.string("team_id")?,
        password: fields.string("password")?,
        api_key: fields.string("api_key")?,
        api_key_path: fields.string("api_key_path")?,
        api_issuer: fields.string("api_issuer")?,
        keychain_profile: fields.string("keychain_profile")?,
        asc_provider: fields.string("asc_provider")?,
        primary_bundle_id: fields.string("primary_bundle_id")?,
        staple_timeout: fields
            .seconds("staple_timeout")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.staple_timeout),
    })
}

/// Typed view over one level of the mapping.
struct Fields<'a> {
    map: &'a RawSettings,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn root(map: &'a RawSettings) -> Self {
        Self {
            map,
            prefix: String::new(),
        }
    }

    fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    /// Value for `name`; an explicit null counts as absent.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> ConfigError {
        ConfigError::new(
            self.key(name),
            format!("must be {expected}, found {}", describe(found)),
        )
    }

    fn string(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.mismatch(name, "a string", other)),
        }
    }

    /// String, or a number rendered as written (`1.0` stays `"1.0"`).
    fn text(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.mismatch(name, "a string or number", other)),
        }
    }

    fn boolean(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(name, "a boolean", other)),
        }
    }

    fn seconds(&self, name: &str) -> Result<Option<u64>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| ConfigError::new(self.key(name), "must be a whole number of seconds")),
            Some(other) => Err(self.mismatch(name, "a number of seconds", other)),
        }
    }

    fn choice<T: FromStr>(&self, name: &str, legal: &[&str]) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.string(name)? else {
            return Ok(None);
        };
        value.parse().map(Some).map_err(|_| {
            ConfigError::new(
                self.key(name),
                format!("has illegal value {value:?}; legal values are {}", legal.join(", ")),
            )
        })
    }

    /// A list of strings; a lone string is accepted as a one-element list.
    fn string_list(&self, name: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.mismatch(name, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(self.mismatch(name, "a string or list of strings", other)),
        }
    }

    fn table(&self, name: &str) -> Result<Option<Fields<'a>>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Fields {
                map,
                prefix: self.key(name),
            })),
            Some(other) => Err(self.mismatch(name, "a dictionary", other)),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a dictionary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::settings::{Compression, Ownership, PostinstallAction};
    use serde_json::json;

    fn raw(value: Value) -> RawSettings {
        match value {
            Value::Object(map) => map,
            _ => panic!("test settings must be an object"),
        }
    }

    #[test]
    fn absent_settings_yield_defaults() {
        let config = resolve(None, "Munki Tools").unwrap();
        assert_eq!(config, BuildConfig::defaults("Munki Tools"));
        assert_eq!(config.install_location, "/");
        assert!(config.suppress_bundle_relocation);
        assert!(!config.distribution_style);
        assert_eq!(config.ownership, Ownership::Recommended);
        assert_eq!(config.postinstall_action, PostinstallAction::None);
        assert!(config.signing_info.is_none());
    }

    #[test]
    fn every_single_key_subset_resolves() {
        let full = raw(json!({
            "name": "Tool-${version}.pkg",
            "identifier": "com.example.tool",
            "version": "4.1",
            "install_location": "/usr/local",
            "ownership": "preserve",
            "postinstall_action": "restart",
            "distribution_style": true,
            "suppress_bundle_relocation": false,
            "preserve_xattr": true,
            "compression": "latest",
            "min_os_version": "12.0",
            "product_id": "com.example.product",
        }));
        let defaults = BuildConfig::defaults("tool");
        for (key, value) in &full {
            let mut subset = RawSettings::new();
            subset.insert(key.clone(), value.clone());
            let config = resolve(Some(&subset), "tool").unwrap();
            if key != "name" {
                assert_eq!(config.name, defaults.name, "key {key} changed name");
            }
            if key != "version" {
                assert_eq!(config.version, defaults.version, "key {key} changed version");
            }
        }

        let config = resolve(Some(&full), "tool").unwrap();
        assert_eq!(config.output_name(), "Tool-4.1.pkg");
        assert_eq!(config.ownership, Ownership::Preserve);
        assert_eq!(config.postinstall_action, PostinstallAction::Restart);
        assert_eq!(config.compression, Some(Compression::Latest));
        assert_eq!(config.product_id(), "com.example.product");
        assert!(config.preserve_xattr);
    }

    #[test]
    fn name_template_uses_version() {
        let settings = raw(json!({"name": "X-${version}.pkg", "version": "2.3"}));
        let config = resolve(Some(&settings), "X").unwrap();
        assert_eq!(config.output_name(), "X-2.3.pkg");
    }

    #[test]
    fn numeric_version_is_kept_as_text() {
        let settings = raw(json!({"version": 2}));
        assert_eq!(resolve(Some(&settings), "X").unwrap().version, "2");
        let settings = raw(json!({"version": 1.5}));
        assert_eq!(resolve(Some(&settings), "X").unwrap().version, "1.5");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = raw(json!({"future_option": {"nested": [1, 2]}}));
        assert!(resolve(Some(&settings), "X").is_ok());
    }

    #[test]
    fn type_mismatch_names_the_key() {
        let settings = raw(json!({"distribution_style": "yes"}));
        let err = resolve(Some(&settings), "X").unwrap_err();
        assert_eq!(err.key, "distribution_style");
        assert!(err.reason.contains("boolean"));

        let settings = raw(json!({"signing_info": {"identity": "A", "timestamp": 1}}));
        let err = resolve(Some(&settings), "X").unwrap_err();
        assert_eq!(err.key, "signing_info.timestamp");
    }

    #[test]
    fn illegal_enum_value_is_rejected() {
        let settings = raw(json!({"ownership": "everyone"}));
        let err = resolve(Some(&settings), "X").unwrap_err();
        assert_eq!(err.key, "ownership");
        assert!(err.reason.contains("preserve-other"));
    }

    #[test]
    fn signing_info_keeps_certificate_order() {
        let settings = raw(json!({
            "signing_info": {
                "identity": "Developer ID Installer: Example (ABCDE12345)",
                "keychain": "/Users/me/Library/Keychains/build.keychain",
                "additional_cert_names": ["Intermediate B", "Intermediate A"],
                "timestamp": true
            }
        }));
        let signing = resolve(Some(&settings), "X").unwrap().signing_info.unwrap();
        assert_eq!(signing.additional_cert_names, ["Intermediate B", "Intermediate A"]);
        assert_eq!(signing.timestamp, Some(true));
    }

    #[test]
    fn single_cert_name_becomes_list() {
        let settings = raw(json!({
            "signing_info": {"identity": "A", "additional_cert_names": "Only One"}
        }));
        let signing = resolve(Some(&settings), "X").unwrap().signing_info.unwrap();
        assert_eq!(signing.additional_cert_names, ["Only One"]);
        assert_eq!(signing.timestamp, None);
    }

    #[test]
    fn signing_without_identity_is_an_error() {
        let settings = raw(json!({"signing_info": {"keychain": "k"}}));
        let err = resolve(Some(&settings), "X").unwrap_err();
        assert_eq!(err.key, "signing_info.identity");
    }

    #[test]
    fn notarization_defaults_and_legacy_username() {
        let settings = raw(json!({
            "notarization_info": {"username": "dev@example.com", "password": "@keychain:AC_PASSWORD"}
        }));
        let info = resolve(Some(&settings), "X").unwrap().notarization_info.unwrap();
        assert_eq!(info.apple_id.as_deref(), Some("dev@example.com"));
        assert_eq!(info.staple_timeout, Duration::from_secs(300));

        let settings = raw(json!({"notarization_info": {"staple_timeout": 12}}));
        let info = resolve(Some(&settings), "X").unwrap().notarization_info.unwrap();
        assert_eq!(info.staple_timeout, Duration::from_secs(12));

        let settings = raw(json!({
            "notarization_info": {
                "api_key": "KEYID12345",
                "api_key_path": "/keys/AuthKey_KEYID12345.p8",
                "api_issuer": "69a6de7e-0000-47e3-e053-5b8c7c11a4d1"
            }
        }));
        let info = resolve(Some(&settings), "X").unwrap().notarization_info.unwrap();
        assert_eq!(info.api_key.as_deref(), Some("KEYID12345"));
        assert_eq!(info.api_key_path.as_deref(), Some("/keys/AuthKey_KEYID12345.p8"));
        assert!(info.api_issuer.is_some());

        let settings = raw(json!({"notarization_info": {"staple_timeout": -1}}));
        let err = resolve(Some(&settings), "X").unwrap_err();
        assert_eq!(err.key, "notarization_info.staple_timeout");
    }
}
