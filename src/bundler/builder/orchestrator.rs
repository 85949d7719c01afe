//! Package assembly.
//!
//! [`PackageAssembler`] runs the packaging tools in order for one project:
//! relocation analysis, the component package, and, for distribution-style
//! builds, the synthesized distribution package. Intermediates live in a
//! hidden scratch directory under `build/` that disappears with the
//! assembler call; the final package is renamed into place only once every
//! step has succeeded.

use super::{
    checksum::calculate_sha256,
    commands::{
        ComponentPaths, analyze_command, component_command, distribution_command,
        package_info_xml, synthesize_command,
    },
    tool_detection::HostInfo,
};
use crate::bundler::{
    error::{Error, ErrorExt, Result, Stage},
    process::{CommandSpec, ProcessOutput, ProcessRunner},
    settings::{BuildConfig, PayloadState, ProjectLayout, REQUIREMENTS_PLIST},
    utils::{fs as fs_utils, running_as_root},
};
use std::path::{Path, PathBuf};

const COMPONENT_PLIST: &str = "component.plist";
const PACKAGE_INFO: &str = "PackageInfo";
const DISTRIBUTION: &str = "Distribution";
const COMPONENT_DIR: &str = "component";
const RELOCATABLE_KEY: &str = "BundleIsRelocatable";
const SCRATCH_PREFIX: &str = ".pkgproject.";

/// A package published under the project's `build/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPackage {
    /// Final location.
    pub path: PathBuf,
    /// Hex SHA-256 of the package.
    pub checksum: String,
}

/// Builds the package for one project.
#[derive(Debug)]
pub struct PackageAssembler<'a, R> {
    runner: &'a R,
    layout: &'a ProjectLayout,
    config: &'a BuildConfig,
    host: HostInfo,
}

impl<'a, R: ProcessRunner> PackageAssembler<'a, R> {
    /// Creates an assembler for `layout` using `config`.
    pub fn new(
        runner: &'a R,
        layout: &'a ProjectLayout,
        config: &'a BuildConfig,
        host: HostInfo,
    ) -> Self {
        Self {
            runner,
            layout,
            config,
            host,
        }
    }

    /// Where the package will be published.
    pub fn output_path(&self) -> PathBuf {
        self.layout.build_dir().join(self.config.output_name())
    }

    /// Runs the whole packaging sequence and publishes the result.
    ///
    /// On failure nothing is published and any package previously built
    /// under the same name is left in place.
    pub async fn assemble(&self) -> Result<AssembledPackage> {
        let payload = self.layout.payload_state().await?;
        let scripts = self.layout.prepare_scripts().await?;
        if payload == PayloadState::Absent && scripts.is_none() {
            return Err(Error::build(
                Stage::Prepare,
                format!(
                    "{} has neither a payload directory nor a preinstall or postinstall script",
                    self.layout.root().display()
                ),
            ));
        }
        if payload == PayloadState::Absent {
            log::info!("No payload directory; building a payload-free package");
        }

        let build_dir = self.layout.build_dir();
        fs_utils::ensure_dir(&build_dir)
            .await
            .map_err(|e| Error::build(Stage::Prepare, e.to_string()))?;

        self.warn_about_settings();

        // Inside build/ so publishing is a rename on the same file system.
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&build_dir)
            .fs_context("creating scratch directory", &build_dir)?;
        log::debug!("Scratch directory: {}", scratch.path().display());

        let component_plist = if self.config.suppress_bundle_relocation
            && payload == PayloadState::Populated
        {
            Some(self.analyze(scratch.path()).await?)
        } else {
            None
        };

        let package_info = scratch.path().join(PACKAGE_INFO);
        tokio::fs::write(&package_info, package_info_xml(self.config))
            .await
            .fs_context("writing PackageInfo", &package_info)?;

        let output_name = self.config.output_name();
        let component_dir = scratch.path().join(COMPONENT_DIR);
        tokio::fs::create_dir(&component_dir)
            .await
            .fs_context("creating component directory", &component_dir)?;
        let component_pkg = component_dir.join(&output_name);

        let payload_dir = self.layout.payload_dir();
        let paths = ComponentPaths {
            payload_dir: &payload_dir,
            scripts_dir: scripts.as_deref(),
            component_plist: component_plist.as_deref(),
            package_info: &package_info,
            output: &component_pkg,
        };
        log::info!("Building component package {}", output_name);
        let command = component_command(self.config, &self.host, payload, paths);
        self.run_stage(Stage::ComponentPackage, &command).await?;

        let built = if self.config.distribution_style {
            self.wrap_in_distribution(scratch.path(), &component_dir, &component_pkg, &output_name)
                .await?
        } else {
            component_pkg
        };

        let output = self.output_path();
        fs_utils::move_file(&built, &output)
            .await
            .map_err(|e| Error::build(Stage::Publish, e.to_string()))?;
        let checksum = calculate_sha256(&output).await?;
        log::info!("✓ Created {}", output.display());

        Ok(AssembledPackage {
            path: output,
            checksum,
        })
    }

    /// Writes a component plist with relocation turned off for every bundle.
    async fn analyze(&self, scratch: &Path) -> Result<PathBuf> {
        let plist_path = scratch.join(COMPONENT_PLIST);
        log::info!("Analyzing payload bundles");
        let command = analyze_command(&self.layout.payload_dir(), &plist_path);
        self.run_stage(Stage::Analyze, &command).await?;

        let mut components = plist::Value::from_file(&plist_path)?;
        let disabled = disable_relocation(&mut components);
        if disabled > 0 {
            log::debug!("Disabled relocation for {} bundle(s)", disabled);
        }
        components.to_file_xml(&plist_path)?;
        Ok(plist_path)
    }

    async fn wrap_in_distribution(
        &self,
        scratch: &Path,
        component_dir: &Path,
        component_pkg: &Path,
        output_name: &str,
    ) -> Result<PathBuf> {
        let requirements = self.requirements_plist(scratch).await?;
        let distribution = scratch.join(DISTRIBUTION);

        log::info!("Synthesizing distribution");
        let command = synthesize_command(component_pkg, requirements.as_deref(), &distribution);
        self.run_stage(Stage::Synthesize, &command).await?;

        let final_pkg = scratch.join(output_name);
        log::info!("Building distribution package {}", output_name);
        let command = distribution_command(self.config, &distribution, component_dir, &final_pkg);
        self.run_stage(Stage::Distribution, &command).await?;
        Ok(final_pkg)
    }

    /// The project's requirements plist, or one generated from
    /// `min_os_version`.
    async fn requirements_plist(&self, scratch: &Path) -> Result<Option<PathBuf>> {
        let project_plist = self.layout.requirements_plist();
        if project_plist.is_file() {
            log::info!("Using {}", REQUIREMENTS_PLIST);
            return Ok(Some(project_plist));
        }
        let Some(min_os) = &self.config.min_os_version else {
            return Ok(None);
        };

        let mut dict = plist::Dictionary::new();
        dict.insert(
            "os".to_string(),
            plist::Value::Array(vec![plist::Value::String(min_os.clone())]),
        );
        let generated = scratch.join(REQUIREMENTS_PLIST);
        plist::Value::Dictionary(dict).to_file_xml(&generated)?;
        Ok(Some(generated))
    }

    fn warn_about_settings(&self) {
        if self.config.ownership.preserves_ownership() && !running_as_root() {
            log::warn!(
                "ownership '{}' without root privileges; the package may not have the intended owners",
                self.config.ownership.as_str()
            );
        }
        let wants_new_flags =
            self.config.compression.is_some() || self.config.min_os_version.is_some();
        if wants_new_flags && !self.host.supports_compression() {
            log::warn!(
                "compression and min_os_version need macOS 12 or later (host: {}); not passing them to pkgbuild",
                self.host.os_version.as_deref().unwrap_or("unknown")
            );
        }
    }

    async fn run_stage(&self, stage: Stage, command: &CommandSpec) -> Result<ProcessOutput> {
        log::debug!("{} stage: {}", stage, command);
        let output = self.runner.run(command).await?;
        if !output.success() {
            return Err(Error::build(stage, output.diagnostics()));
        }
        Ok(output)
    }
}

/// Sets every `BundleIsRelocatable` in a component plist to false.
///
/// Returns how many entries changed.
fn disable_relocation(components: &mut plist::Value) -> usize {
    let Some(entries) = components.as_array_mut() else {
        return 0;
    };
    let mut changed = 0;
    for entry in entries {
        let Some(dict) = entry.as_dictionary_mut() else {
            continue;
        };
        if let Some(value) = dict.get_mut(RELOCATABLE_KEY) {
            if value.as_boolean() == Some(true) {
                *value = plist::Value::Boolean(false);
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        process::testing::ScriptedRunner,
        settings::{Compression, SigningInfo},
    };
    use std::{cell::RefCell, rc::Rc};

    const ANALYZED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<array>
  <dict>
    <key>BundleIsRelocatable</key><true/>
    <key>RootRelativeBundlePath</key><string>Applications/Tool.app</string>
  </dict>
</array>
</plist>
"#;

    /// Runner that behaves like the packaging tools: the last argument is
    /// the file they produce.
    fn fake_tools(component_plist: Rc<RefCell<Option<String>>>) -> ScriptedRunner {
        ScriptedRunner::new(move |cmd| {
            let Some(out) = cmd.args.last() else {
                return ProcessOutput::failed(2, "no arguments");
            };
            if cmd.has_arg("--analyze") {
                std::fs::write(out, ANALYZED).unwrap();
            } else {
                if let Some(plist) = cmd.value_of("--component-plist") {
                    *component_plist.borrow_mut() = Some(std::fs::read_to_string(plist).unwrap());
                }
                std::fs::write(out, format!("built by {}", cmd.name())).unwrap();
            }
            ProcessOutput::ok("")
        })
    }

    fn project(payload: bool, postinstall: bool) -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Tool");
        std::fs::create_dir(&root).unwrap();
        if payload {
            std::fs::create_dir_all(root.join("payload/Applications/Tool.app")).unwrap();
        }
        if postinstall {
            std::fs::create_dir(root.join("scripts")).unwrap();
            std::fs::write(root.join("scripts/postinstall"), "#!/bin/sh\n").unwrap();
        }
        (dir, ProjectLayout::new(root))
    }

    fn signing() -> SigningInfo {
        SigningInfo {
            identity: "Developer ID Installer: Example".into(),
            keychain: None,
            additional_cert_names: vec![],
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn builds_flat_package_with_relocation_disabled() {
        let (_dir, layout) = project(true, false);
        let config = BuildConfig::defaults("Tool");
        let seen_plist = Rc::new(RefCell::new(None));
        let runner = fake_tools(seen_plist.clone());

        let assembler = PackageAssembler::new(&runner, &layout, &config, HostInfo::default());
        let package = assembler.assemble().await.unwrap();

        assert_eq!(package.path, layout.build_dir().join("Tool-1.0.pkg"));
        assert_eq!(
            std::fs::read_to_string(&package.path).unwrap(),
            "built by pkgbuild"
        );
        assert_eq!(package.checksum.len(), 64);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].has_arg("--analyze"));
        assert_eq!(calls[1].value_of("--identifier"), Some("com.github.munki.pkg.Tool"));

        let rewritten = seen_plist.borrow().clone().unwrap();
        assert!(!rewritten.contains("<true/>"));
        assert!(rewritten.contains("<false/>"));
    }

    #[tokio::test]
    async fn scripts_only_project_builds_without_payload() {
        let (_dir, layout) = project(false, true);
        let config = BuildConfig::defaults("Tool");
        let runner = fake_tools(Rc::default());

        PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].has_arg("--nopayload"));
        assert_eq!(
            calls[0].value_of("--scripts"),
            Some(layout.scripts_dir().to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn empty_payload_skips_analysis() {
        let (_dir, layout) = project(false, false);
        std::fs::create_dir(layout.payload_dir()).unwrap();
        let config = BuildConfig::defaults("Tool");
        let runner = fake_tools(Rc::default());

        PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].has_arg("--root"));
        assert!(!calls[0].has_arg("--component-plist"));
    }

    #[tokio::test]
    async fn nothing_to_package_is_a_prepare_error() {
        let (_dir, layout) = project(false, false);
        let config = BuildConfig::defaults("Tool");
        let runner = ScriptedRunner::succeeding();

        let err = PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Build { stage: Stage::Prepare, .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn build_path_that_is_a_file_is_a_prepare_error() {
        let (_dir, layout) = project(true, false);
        std::fs::write(layout.build_dir(), "").unwrap();
        let config = BuildConfig::defaults("Tool");
        let runner = ScriptedRunner::succeeding();

        let err = PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Build { stage: Stage::Prepare, .. }));
    }

    #[tokio::test]
    async fn failed_pkgbuild_publishes_nothing() {
        let (_dir, layout) = project(true, false);
        let config = BuildConfig {
            suppress_bundle_relocation: false,
            ..BuildConfig::defaults("Tool")
        };
        std::fs::create_dir(layout.build_dir()).unwrap();
        let previous = layout.build_dir().join("Tool-1.0.pkg");
        std::fs::write(&previous, "previous build").unwrap();

        let runner = ScriptedRunner::new(|_| ProcessOutput::failed(1, "pkgbuild: boom"));
        let err = PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap_err();

        match err {
            Error::Build { stage, output } => {
                assert_eq!(stage, Stage::ComponentPackage);
                assert_eq!(output, "pkgbuild: boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_to_string(&previous).unwrap(), "previous build");
        assert_eq!(build_dir_names(&layout), ["Tool-1.0.pkg"]);
    }

    fn build_dir_names(layout: &ProjectLayout) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(layout.build_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn intermediates_stay_next_to_the_published_package() {
        let (_dir, layout) = project(true, false);
        std::fs::create_dir(layout.build_dir()).unwrap();
        std::fs::write(layout.build_dir().join("Tool-1.0.pkg"), "previous build").unwrap();
        let config = BuildConfig::defaults("Tool");
        let runner = fake_tools(Rc::default());

        let package = PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap();

        for call in runner.calls() {
            let out = std::path::PathBuf::from(call.args.last().unwrap());
            assert!(out.starts_with(layout.build_dir()), "{}", out.display());
        }
        assert_eq!(
            std::fs::read_to_string(&package.path).unwrap(),
            "built by pkgbuild"
        );
        assert_eq!(build_dir_names(&layout), ["Tool-1.0.pkg"]);
    }

    #[tokio::test]
    async fn distribution_build_signs_only_the_final_package() {
        let (_dir, layout) = project(true, false);
        let config = BuildConfig {
            version: "2.0".into(),
            distribution_style: true,
            suppress_bundle_relocation: false,
            min_os_version: Some("12.0".into()),
            compression: Some(Compression::Latest),
            signing_info: Some(signing()),
            ..BuildConfig::defaults("Tool")
        };
        let runner = fake_tools(Rc::default());

        let package = PackageAssembler::new(
            &runner,
            &layout,
            &config,
            HostInfo::with_os_version("14.0"),
        )
        .assemble()
        .await
        .unwrap();

        assert_eq!(package.path, layout.build_dir().join("Tool-2.0.pkg"));
        assert_eq!(
            std::fs::read_to_string(&package.path).unwrap(),
            "built by productbuild"
        );

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        let component = &calls[0];
        assert!(!component.has_arg("--sign"));
        assert_eq!(component.value_of("--compression"), Some("latest"));

        let synthesize = &calls[1];
        assert!(synthesize.has_arg("--synthesize"));
        let requirements = synthesize.value_of("--product").unwrap();
        assert!(requirements.ends_with(REQUIREMENTS_PLIST));

        let distribution = &calls[2];
        assert!(distribution.has_arg("--distribution"));
        assert_eq!(
            distribution.value_of("--sign"),
            Some("Developer ID Installer: Example")
        );
        assert_eq!(distribution.value_of("--version"), Some("2.0"));
    }

    #[tokio::test]
    async fn distribution_prefers_project_requirements() {
        let (_dir, layout) = project(true, false);
        plist::Value::Dictionary(plist::Dictionary::new())
            .to_file_xml(layout.requirements_plist())
            .unwrap();
        let config = BuildConfig {
            distribution_style: true,
            suppress_bundle_relocation: false,
            ..BuildConfig::defaults("Tool")
        };
        let runner = fake_tools(Rc::default());

        PackageAssembler::new(&runner, &layout, &config, HostInfo::default())
            .assemble()
            .await
            .unwrap();

        let synthesize = &runner.calls_named("productbuild")[0];
        assert_eq!(
            synthesize.value_of("--product"),
            Some(layout.requirements_plist().to_string_lossy().as_ref())
        );
    }

    #[test]
    fn disable_relocation_rewrites_true_entries() {
        let mut value = plist::Value::from_reader_xml(ANALYZED.as_bytes()).unwrap();
        assert_eq!(disable_relocation(&mut value), 1);
        assert_eq!(disable_relocation(&mut value), 0);
    }
}
