//! Entry name validation.
//!
//! Names written to an archive are relative, `/` separated and never leave
//! the extraction root. The same rules are applied when reading, so a hostile
//! archive cannot write outside the destination directory.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Why a name was refused.
pub type PathRejection = &'static str;

/// Check `name` and return its normalized form.
///
/// Empty and `.` segments are dropped and a trailing `/` is kept. Absolute
/// names, drive prefixes and `..` segments are refused. A backslash is an
/// ordinary character here.
pub fn validate_entry_name(name: &str) -> Result<String, PathRejection> {
    if name.contains('\0') {
        return Err("name contains a NUL byte");
    }
    if name.starts_with('/') {
        return Err("absolute path");
    }
    if has_drive_prefix(name) {
        return Err("path has a drive prefix");
    }

    let mut segments = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err("path escapes the archive root"),
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err("empty name");
    }

    let mut normalized = segments.join("/");
    if name.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve an entry name below `destination`.
///
/// With `backslash_is_separator`, as for archives made on DOS or Windows, a
/// `\` splits the name like a `/`.
pub fn enclosed_path(
    destination: &Path,
    name: &str,
    backslash_is_separator: bool,
) -> Result<PathBuf, PathRejection> {
    let name = if backslash_is_separator {
        Cow::Owned(name.replace('\\', "/"))
    } else {
        Cow::Borrowed(name)
    };
    let normalized = validate_entry_name(&name)?;
    let mut path = destination.to_path_buf();
    for segment in normalized.split('/').filter(|segment| !segment.is_empty()) {
        path.push(segment);
    }
    Ok(path)
}

/// Archive name of a source path given relative to the working directory.
///
/// The path is kept as given, so `a/x.txt` and `b/x.txt` stay apart. Absolute
/// paths and `..` components are refused.
pub fn source_archive_name(source: &Path) -> Result<String, PathRejection> {
    let mut name = String::new();
    for component in source.components() {
        match component {
            Component::Normal(segment) => {
                if !name.is_empty() {
                    name.push('/');
                }
                name.push_str(&segment.to_string_lossy());
            }
            Component::CurDir => continue,
            Component::ParentDir => return Err("path escapes the archive root"),
            Component::RootDir | Component::Prefix(_) => return Err("absolute path"),
        }
    }
    validate_entry_name(&name)
}

/// Archive name for a path found while walking `source_root`, rooted at `archive_root`.
pub(crate) fn join_archive_name(archive_root: &str, relative: &Path) -> String {
    let mut name = archive_root.trim_end_matches('/').to_owned();
    for component in relative.components() {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}
