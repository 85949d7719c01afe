//! Construction of packaging tool invocations.
//!
//! Everything here is pure: a [`BuildConfig`] and some paths in, a
//! [`CommandSpec`] out. Execution and sequencing live in the orchestrator.

use super::{signing::signing_args, tool_detection::HostInfo};
use crate::bundler::{
    process::CommandSpec,
    settings::{BuildConfig, PayloadState},
};
use std::path::Path;

/// Absolute paths of the external tools.
pub mod tools {
    /// Flat component package builder.
    pub const PKGBUILD: &str = "/usr/bin/pkgbuild";
    /// Distribution package builder.
    pub const PRODUCTBUILD: &str = "/usr/bin/productbuild";
    /// Package inspection (`--bom`).
    pub const PKGUTIL: &str = "/usr/sbin/pkgutil";
    /// Bom listing.
    pub const LSBOM: &str = "/usr/bin/lsbom";
    /// Developer tool launcher (`notarytool`, `stapler`).
    pub const XCRUN: &str = "/usr/bin/xcrun";
    /// OS version query.
    pub const SW_VERS: &str = "/usr/bin/sw_vers";
}

/// Paths the component package build reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct ComponentPaths<'a> {
    /// `payload/` directory of the project.
    pub payload_dir: &'a Path,
    /// Scripts directory, when it should be included.
    pub scripts_dir: Option<&'a Path>,
    /// Component property list with relocation turned off.
    pub component_plist: Option<&'a Path>,
    /// `PackageInfo` stub.
    pub package_info: &'a Path,
    /// Package to create.
    pub output: &'a Path,
}

/// `pkgbuild --analyze`, which writes a component property list describing
/// every bundle in the payload.
pub fn analyze_command(payload_dir: &Path, component_plist: &Path) -> CommandSpec {
    CommandSpec::new(tools::PKGBUILD)
        .arg("--analyze")
        .arg("--root")
        .path_arg(payload_dir)
        .path_arg(component_plist)
}

/// `pkgbuild` invocation for the component package.
///
/// The package is signed here unless it is going to be wrapped in a
/// distribution package, which is then signed instead.
pub fn component_command(
    config: &BuildConfig,
    host: &HostInfo,
    payload: PayloadState,
    paths: ComponentPaths<'_>,
) -> CommandSpec {
    let mut cmd = CommandSpec::new(tools::PKGBUILD)
        .arg("--ownership")
        .arg(config.ownership.as_str())
        .arg("--identifier")
        .arg(config.identifier.as_str())
        .arg("--version")
        .arg(config.version.as_str())
        .arg("--info")
        .path_arg(paths.package_info);

    match payload {
        PayloadState::Absent => {
            cmd = cmd.arg("--nopayload");
        }
        PayloadState::Empty | PayloadState::Populated => {
            cmd = cmd.arg("--root").path_arg(paths.payload_dir);
            if !config.install_location.is_empty() {
                cmd = cmd
                    .arg("--install-location")
                    .arg(config.install_location.as_str());
            }
        }
    }

    if let Some(component_plist) = paths.component_plist {
        cmd = cmd.arg("--component-plist").path_arg(component_plist);
    }
    if let Some(scripts) = paths.scripts_dir {
        cmd = cmd.arg("--scripts").path_arg(scripts);
    }

    if host.supports_compression() {
        if let Some(compression) = config.compression {
            cmd = cmd.arg("--compression").arg(compression.as_str());
        }
        if let Some(min_os) = &config.min_os_version {
            cmd = cmd.arg("--min-os-version").arg(min_os.as_str());
        }
    }

    if !config.distribution_style {
        if let Some(signing) = &config.signing_info {
            cmd = cmd.args(signing_args(signing));
        }
    }

    cmd.path_arg(paths.output)
}

/// `productbuild --synthesize`, producing a Distribution description for
/// the component package.
pub fn synthesize_command(
    component_pkg: &Path,
    requirements: Option<&Path>,
    distribution: &Path,
) -> CommandSpec {
    let mut cmd = CommandSpec::new(tools::PRODUCTBUILD).arg("--synthesize");
    if let Some(requirements) = requirements {
        cmd = cmd.arg("--product").path_arg(requirements);
    }
    cmd.arg("--package")
        .path_arg(component_pkg)
        .path_arg(distribution)
}

/// `productbuild --distribution`, producing the final distribution package.
pub fn distribution_command(
    config: &BuildConfig,
    distribution: &Path,
    package_path: &Path,
    output: &Path,
) -> CommandSpec {
    let mut cmd = CommandSpec::new(tools::PRODUCTBUILD)
        .arg("--distribution")
        .path_arg(distribution)
        .arg("--package-path")
        .path_arg(package_path)
        .arg("--identifier")
        .arg(config.product_id())
        .arg("--version")
        .arg(config.version.as_str());

    if let Some(signing) = &config.signing_info {
        cmd = cmd.args(signing_args(signing));
    }

    cmd.path_arg(output)
}

/// Contents of the `PackageInfo` stub handed to `pkgbuild --info`.
pub fn package_info_xml(config: &BuildConfig) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>\
         <pkg-info postinstall-action=\"{}\" preserve-xattr=\"{}\"/>",
        config.postinstall_action.as_str(),
        config.preserve_xattr
    )
}
