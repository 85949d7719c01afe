//! macOS installer services that run after, or independently of, package
//! assembly.
//!
//! - [`notarization`] - notarytool submission, polling and stapling
//! - [`bom`] - `Bom.txt` export and payload metadata sync

pub mod bom;
pub mod notarization;
