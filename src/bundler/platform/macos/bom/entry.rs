//! `Bom.txt` entries.
//!
//! One line per payload item in the layout `lsbom` prints:
//!
//! ```text
//! ./Applications/Tool.app	40755	0/80
//! ./Applications/Tool.app/Contents/Info.plist	100644	0/80	1032	3387157453
//! ```
//!
//! Columns after owner/group (size, checksum, link target) are carried
//! through untouched.

use crate::bundler::error::{Error, Result};
use std::{
    cmp::Ordering,
    fmt,
    path::{Component, Path},
};

const TYPE_MASK: u32 = 0o170000;
const TYPE_DIRECTORY: u32 = 0o040000;
const TYPE_SYMLINK: u32 = 0o120000;

/// Permission bits including setuid, setgid and sticky.
pub const PERMISSION_MASK: u32 = 0o7777;

/// File type recorded in an entry's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file (or anything that is not a directory or symlink).
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// One payload item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomEntry {
    /// Path relative to the payload root, `.`-rooted.
    pub path: String,
    /// Full `st_mode`, type bits included.
    pub mode: u32,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Remaining columns, verbatim.
    pub extra: Vec<String>,
}

impl BomEntry {
    /// Parses one line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut columns = line.split('\t');
        let path = columns.next().unwrap_or_default();
        if path.is_empty() {
            return Err(Error::GenericError("entry has no path".to_string()));
        }
        let confined = Path::new(path)
            .components()
            .all(|c| matches!(c, Component::CurDir | Component::Normal(_)));
        if !confined {
            return Err(Error::GenericError(format!(
                "{path}: path leaves the payload root"
            )));
        }

        let mode = columns
            .next()
            .ok_or_else(|| Error::GenericError(format!("{path}: missing mode")))?;
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| Error::GenericError(format!("{path}: mode `{mode}` is not octal")))?;

        let owner = columns
            .next()
            .ok_or_else(|| Error::GenericError(format!("{path}: missing uid/gid")))?;
        let (uid, gid) = owner
            .split_once('/')
            .and_then(|(u, g)| Some((u.parse().ok()?, g.parse().ok()?)))
            .ok_or_else(|| Error::GenericError(format!("{path}: bad uid/gid `{owner}`")))?;

        Ok(Self {
            path: path.to_string(),
            mode,
            uid,
            gid,
            extra: columns.map(str::to_string).collect(),
        })
    }

    /// Type derived from the mode's type bits.
    pub fn kind(&self) -> EntryKind {
        match self.mode & TYPE_MASK {
            TYPE_DIRECTORY => EntryKind::Directory,
            TYPE_SYMLINK => EntryKind::Symlink,
            _ => EntryKind::File,
        }
    }

    /// Permission bits.
    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    /// Path relative to the payload root without the leading `./`.
    ///
    /// The root entry `.` yields an empty string.
    pub fn relative_path(&self) -> &str {
        match self.path.as_str() {
            "." => "",
            p => p.strip_prefix("./").unwrap_or(p),
        }
    }

    /// Whether this is an AppleDouble (`._name`) file.
    pub fn is_apple_double(&self) -> bool {
        Path::new(&self.path)
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("._"))
    }

    /// Component-wise path order: a directory sorts before its contents.
    pub fn path_order(&self, other: &Self) -> Ordering {
        Path::new(&self.path).cmp(Path::new(&other.path))
    }
}

impl fmt::Display for BomEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{:o}\t{}/{}", self.path, self.mode, self.uid, self.gid)?;
        for column in &self.extra {
            write!(f, "\t{column}")?;
        }
        Ok(())
    }
}

/// Parses a whole listing, skipping blank lines.
pub fn parse_listing(text: &str) -> Result<Vec<BomEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            BomEntry::parse(line)
                .map_err(|e| Error::GenericError(format!("{} line {}: {}", super::BOM_TEXT_FILE, i + 1, e)))
        })
        .collect()
}

/// Sorts entries and renders them one per line.
pub fn render_listing(mut entries: Vec<BomEntry>) -> String {
    entries.sort_by(BomEntry::path_order);
    let mut out = String::new();
    for entry in &entries {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_line_with_extra_columns() {
        let entry = BomEntry::parse("./usr/local/bin/tool\t100755\t0/0\t5120\t1234567").unwrap();
        assert_eq!(entry.relative_path(), "usr/local/bin/tool");
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.permissions(), 0o755);
        assert_eq!((entry.uid, entry.gid), (0, 0));
        assert_eq!(entry.extra, ["5120", "1234567"]);
        assert_eq!(
            entry.to_string(),
            "./usr/local/bin/tool\t100755\t0/0\t5120\t1234567"
        );
    }

    #[test]
    fn kinds_and_special_bits() {
        let dir = BomEntry::parse(".\t41775\t0/80").unwrap();
        assert_eq!(dir.kind(), EntryKind::Directory);
        assert_eq!(dir.permissions(), 0o1775);
        assert_eq!(dir.relative_path(), "");

        let link = BomEntry::parse("./lib/current\t120755\t0/0\t4\t0\tv2").unwrap();
        assert_eq!(link.kind(), EntryKind::Symlink);
        assert_eq!(link.extra.last().map(String::as_str), Some("v2"));

        let setuid = BomEntry::parse("./bin/helper\t104755\t0/0").unwrap();
        assert_eq!(setuid.permissions(), 0o4755);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(BomEntry::parse("./a").is_err());
        assert!(BomEntry::parse("./a\t10x644\t0/0").is_err());
        assert!(BomEntry::parse("./a\t100644\t0").is_err());
        let err = parse_listing(".\t40755\t0/0\n\n./b\tnope\t0/0\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn rejects_paths_outside_payload() {
        for line in [
            "./../../secret\t100777\t0/0",
            "./a/../../b\t40755\t0/0",
            "/etc/passwd\t100644\t0/0",
            "..\t40755\t0/0",
        ] {
            let err = BomEntry::parse(line).unwrap_err();
            assert!(err.to_string().contains("leaves the payload root"), "{line}");
        }
        assert!(BomEntry::parse("./a/./b\t100644\t0/0").is_ok());
    }

    #[test]
    fn directories_sort_before_contents() {
        let listing = "./a b\t40755\t0/0\n./a/z\t100644\t0/0\n.\t40755\t0/0\n./a\t40755\t0/0\n";
        let rendered = render_listing(parse_listing(listing).unwrap());
        let paths: Vec<_> = rendered
            .lines()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(paths, [".", "./a", "./a/z", "./a b"]);
    }

    #[test]
    fn detects_apple_double_files() {
        let entry = BomEntry::parse("./Applications/._Tool.app\t100644\t0/0").unwrap();
        assert!(entry.is_apple_double());
        let entry = BomEntry::parse("./Applications/Tool.app\t40755\t0/0").unwrap();
        assert!(!entry.is_apple_double());
    }
}
