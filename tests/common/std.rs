#![allow(dead_code)]

use std::{
    fs::{self, create_dir_all},
    path::{Path, PathBuf},
};

use tempfile::TempDir;

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap_or_else(|error| {
        panic!("creating temporary dir failed, because {:?}", error);
    })
}

/// Write `content` at `root/relative`, creating the parent directories.
pub fn write_file(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        create_dir_all(parent).unwrap_or_else(|error| {
            panic!("creating dir {:?} failed, because {:?}", parent, error);
        });
    }
    fs::write(&path, content).unwrap_or_else(|error| {
        panic!("writing file {:?} failed, because {:?}", &path, error);
    });
    path
}

/// A small tree with text, binary and empty files and an empty directory.
pub fn sample_tree(root: &Path) {
    write_file(root, "readme.txt", &b"Lorem ipsum dolor sit amet. ".repeat(200));
    write_file(root, "empty.txt", b"");
    write_file(root, "data/noise.bin", &pseudo_random_bytes(70_000, 7));
    write_file(root, "data/nested/deep/notes.md", b"# notes\n\n- one\n- two\n");
    create_dir_all(root.join("data/empty_dir")).unwrap();
}

/// Incompressible bytes from a xorshift generator.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Relative paths and contents of every file below `root`, sorted. Directories
/// appear with a trailing `/` and no content.
pub fn tree_listing(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut listing: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().is_dir() {
                (format!("{}/", relative), Vec::new())
            } else {
                (relative, fs::read(entry.path()).unwrap())
            }
        })
        .collect();
    listing.sort();
    listing
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}
