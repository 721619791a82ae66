use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub modified: Option<SystemTime>,
}

/// Source of directory contents for the watcher.
pub trait DirectoryListing {
    fn list(&self, dir: &Path) -> io::Result<Vec<DirEntry>>;
}

/// Lists regular files on the local filesystem; subdirectories are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsListing;

impl DirectoryListing for FsListing {
    fn list(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            // Entries can vanish mid-listing (temp file renamed on completion).
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: metadata.modified().ok(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fs_listing_skips_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.zip"), b"b").unwrap();
        fs::write(dir.path().join("a.zip"), b"a").unwrap();
        fs::create_dir(dir.path().join("provenance")).unwrap();

        let names: Vec<String> = FsListing
            .list(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.zip", "b.zip"]);
    }

    #[test]
    fn test_fs_listing_missing_dir_is_error() {
        let dir = tempdir().unwrap();
        assert!(FsListing.list(&dir.path().join("nope")).is_err());
    }
}
