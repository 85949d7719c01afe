//! Signing arguments for `pkgbuild` and `productbuild`.
//!
//! Both tools take the same flags. Which keychain actually supplies the
//! identity is left entirely to them.

use crate::bundler::settings::SigningInfo;

/// Flags that sign the artifact produced by the final builder.
///
/// Additional certificates are emitted in the configured order; they form the
/// intermediate chain embedded in the package.
pub fn signing_args(info: &SigningInfo) -> Vec<String> {
    let mut args = vec!["--sign".to_string(), info.identity.clone()];

    if let Some(keychain) = &info.keychain {
        args.push("--keychain".to_string());
        args.push(keychain.clone());
    }

    for cert in &info.additional_cert_names {
        args.push("--cert".to_string());
        args.push(cert.clone());
    }

    match info.timestamp {
        Some(true) => args.push("--timestamp".to_string()),
        Some(false) => args.push("--timestamp=none".to_string()),
        None => {}
    }

    args
}
