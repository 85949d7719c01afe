//! Resolved build configuration.

use std::{fmt, str::FromStr, time::Duration};

/// Placeholder in `name` replaced by the package version.
pub const VERSION_PLACEHOLDER: &str = "${version}";

/// Default identifier prefix; the project directory name is appended.
pub const DEFAULT_IDENTIFIER_PREFIX: &str = "com.github.munki.pkg.";

/// Default notarization wait in seconds.
pub const DEFAULT_STAPLE_TIMEOUT: u64 = 300;

/// Ownership mode handed to `pkgbuild --ownership`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    /// Installed files are owned by root:wheel (or admin).
    #[default]
    Recommended,
    /// Keep the payload's owner and group.
    Preserve,
    /// Keep owner and group except for the building user's files.
    PreserveOther,
}

impl Ownership {
    /// Value as spelled on the command line and in build-info.
    pub fn as_str(self) -> &'static str {
        match self {
            Ownership::Recommended => "recommended",
            Ownership::Preserve => "preserve",
            Ownership::PreserveOther => "preserve-other",
        }
    }

    /// True for modes that copy payload ownership into the package.
    pub fn preserves_ownership(self) -> bool {
        !matches!(self, Ownership::Recommended)
    }
}

impl FromStr for Ownership {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recommended" => Ok(Ownership::Recommended),
            "preserve" => Ok(Ownership::Preserve),
            "preserve-other" => Ok(Ownership::PreserveOther),
            _ => Err(()),
        }
    }
}

/// Action requested from Installer once the package is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostinstallAction {
    /// Nothing.
    #[default]
    None,
    /// Log the user out.
    Logout,
    /// Restart the machine.
    Restart,
}

impl PostinstallAction {
    /// Value as written into `PackageInfo`.
    pub fn as_str(self) -> &'static str {
        match self {
            PostinstallAction::None => "none",
            PostinstallAction::Logout => "logout",
            PostinstallAction::Restart => "restart",
        }
    }
}

impl FromStr for PostinstallAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PostinstallAction::None),
            "logout" => Ok(PostinstallAction::Logout),
            "restart" => Ok(PostinstallAction::Restart),
            _ => Err(()),
        }
    }
}

/// Payload compression accepted by `pkgbuild --compression`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Compatible with every Installer version.
    Legacy,
    /// Newest algorithm supported by the host.
    Latest,
}

impl Compression {
    /// Command-line spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Legacy => "legacy",
            Compression::Latest => "latest",
        }
    }
}

impl FromStr for Compression {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Compression::Legacy),
            "latest" => Ok(Compression::Latest),
            _ => Err(()),
        }
    }
}

/// Package signing parameters.
///
/// Keychain selection is left to `pkgbuild`/`productbuild`; when `keychain`
/// is absent the tools search the user's default keychain list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInfo {
    /// Certificate common name or SHA-1 of the signing identity.
    pub identity: String,
    /// Keychain to search for the identity.
    pub keychain: Option<String>,
    /// Intermediate certificates, in chain order.
    pub additional_cert_names: Vec<String>,
    /// `Some(true)` requests a secure timestamp, `Some(false)` disables it,
    /// `None` leaves the tool default.
    pub timestamp: Option<bool>,
}

/// Apple notary service parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct NotarizationInfo {
    /// Apple ID used with an app-specific password.
    pub apple_id: Option<String>,
    /// Developer team identifier.
    pub team_id: Option<String>,
    /// App-specific password (or `@keychain:` reference).
    pub password: Option<String>,
    /// App Store Connect API key ID.
    pub api_key: Option<String>,
    /// Path of the `AuthKey_<id>.p8` private key.
    pub api_key_path: Option<String>,
    /// App Store Connect API issuer UUID.
    pub api_issuer: Option<String>,
    /// Profile stored with `notarytool store-credentials`.
    pub keychain_profile: Option<String>,
    /// Provider short name; used as team id when `team_id` is absent.
    pub asc_provider: Option<String>,
    /// Accepted for older settings files; notarytool does not use it.
    pub primary_bundle_id: Option<String>,
    /// Upper bound on accumulated polling wait.
    pub staple_timeout: Duration,
}

impl fmt::Debug for NotarizationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotarizationInfo")
            .field("apple_id", &self.apple_id)
            .field("team_id", &self.team_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key)
            .field("api_key_path", &self.api_key_path)
            .field("api_issuer", &self.api_issuer)
            .field("keychain_profile", &self.keychain_profile)
            .field("asc_provider", &self.asc_provider)
            .field("primary_bundle_id", &self.primary_bundle_id)
            .field("staple_timeout", &self.staple_timeout)
            .finish()
    }
}

impl Default for NotarizationInfo {
    fn default() -> Self {
        Self {
            apple_id: None,
            team_id: None,
            password: None,
            api_key: None,
            api_key_path: None,
            api_issuer: None,
            keychain_profile: None,
            asc_provider: None,
            primary_bundle_id: None,
            staple_timeout: Duration::from_secs(DEFAULT_STAPLE_TIMEOUT),
        }
    }
}

/// Fully resolved settings for one build.
///
/// Produced by [`resolve`](super::resolve); every field has a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Package identifier.
    pub identifier: String,
    /// Output file name; may contain `${version}`.
    pub name: String,
    /// Package version, kept as an opaque string.
    pub version: String,
    /// Install location of the payload root.
    pub install_location: String,
    /// `pkgbuild --ownership` mode.
    pub ownership: Ownership,
    /// Installer action after installation.
    pub postinstall_action: PostinstallAction,
    /// Wrap the component package in a distribution package.
    pub distribution_style: bool,
    /// Turn off bundle relocation for every bundle in the payload.
    pub suppress_bundle_relocation: bool,
    /// Keep extended attributes of payload files.
    pub preserve_xattr: bool,
    /// Payload compression.
    pub compression: Option<Compression>,
    /// Minimum macOS version.
    pub min_os_version: Option<String>,
    /// Product identifier of a distribution package.
    pub product_id: Option<String>,
    /// Signing parameters.
    pub signing_info: Option<SigningInfo>,
    /// Notarization parameters.
    pub notarization_info: Option<NotarizationInfo>,
}

impl BuildConfig {
    /// Defaults for a project directory called `project_name`.
    ///
    /// Spaces are dropped from the name before it is used in the identifier
    /// and the package name.
    pub fn defaults(project_name: &str) -> Self {
        let basename: String = project_name.chars().filter(|c| *c != ' ').collect();
        Self {
            identifier: format!("{DEFAULT_IDENTIFIER_PREFIX}{basename}"),
            name: format!("{basename}-{VERSION_PLACEHOLDER}.pkg"),
            version: "1.0".to_string(),
            install_location: "/".to_string(),
            ownership: Ownership::Recommended,
            postinstall_action: PostinstallAction::None,
            distribution_style: false,
            suppress_bundle_relocation: true,
            preserve_xattr: false,
            compression: None,
            min_os_version: None,
            product_id: None,
            signing_info: None,
            notarization_info: None,
        }
    }

    /// File name of the final package, with `${version}` substituted.
    pub fn output_name(&self) -> String {
        self.name.replace(VERSION_PLACEHOLDER, &self.version)
    }

    /// Product identifier for distribution packages.
    pub fn product_id(&self) -> &str {
        self.product_id.as_deref().unwrap_or(&self.identifier)
    }

    /// Notarization settings that can take effect.
    ///
    /// Unsigned packages cannot be notarized, so this is `None` without
    /// `signing_info`.
    pub fn notarization(&self) -> Option<&NotarizationInfo> {
        match (&self.signing_info, &self.notarization_info) {
            (Some(_), Some(info)) => Some(info),
            (None, Some(_)) => {
                log::warn!("notarization_info ignored: the package is not signed");
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_substitutes_version() {
        let config = BuildConfig {
            name: "X-${version}.pkg".into(),
            version: "2.3".into(),
            ..BuildConfig::defaults("X")
        };
        assert_eq!(config.output_name(), "X-2.3.pkg");
    }

    #[test]
    fn output_name_without_placeholder_is_literal() {
        let config = BuildConfig {
            name: "Fixed.pkg".into(),
            version: "9.9".into(),
            ..BuildConfig::defaults("X")
        };
        assert_eq!(config.output_name(), "Fixed.pkg");
    }

    #[test]
    fn defaults_strip_spaces_from_project_name() {
        let config = BuildConfig::defaults("My Tool");
        assert_eq!(config.identifier, "com.github.munki.pkg.MyTool");
        assert_eq!(config.output_name(), "MyTool-1.0.pkg");
        assert_eq!(config.product_id(), "com.github.munki.pkg.MyTool");
    }

    #[test]
    fn notarization_requires_signing() {
        let unsigned = BuildConfig {
            notarization_info: Some(NotarizationInfo::default()),
            ..BuildConfig::defaults("tool")
        };
        assert!(unsigned.notarization().is_none());

        let signed = BuildConfig {
            signing_info: Some(SigningInfo {
                identity: "Developer ID Installer: Example".into(),
                keychain: None,
                additional_cert_names: vec![],
                timestamp: None,
            }),
            ..unsigned
        };
        assert!(signed.notarization().is_some());
    }

    #[test]
    fn debug_redacts_password() {
        let info = NotarizationInfo {
            password: Some("secret".into()),
            ..Default::default()
        };
        assert!(!format!("{info:?}").contains("secret"));
    }
}
