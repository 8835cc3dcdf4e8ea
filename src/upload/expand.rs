//! Expansion of local inputs into a flat list of files
//!
//! A file input lands directly under the destination directory. A directory
//! input has its contents mirrored under the destination, depth-first and in
//! file-name order. Anything that cannot be read is logged and skipped.

use crate::path::RemotePath;
use log::warn;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalFile {
    pub target: RemotePath,
    pub content: PathBuf,
    pub size: u64,
}

pub(crate) fn expand(inputs: &[PathBuf], directory: &RemotePath) -> Vec<LocalFile> {
    let mut files = Vec::new();
    for input in inputs {
        let metadata = match std::fs::metadata(input) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", input.display(), e);
                continue;
            }
        };

        if metadata.is_dir() {
            expand_directory(input, directory, &mut files);
            continue;
        }

        match input.file_name() {
            Some(name) => files.push(LocalFile {
                target: directory.child(name.to_string_lossy()),
                content: input.clone(),
                size: metadata.len(),
            }),
            None => warn!("Skipping {}: no file name", input.display()),
        }
    }
    files
}

fn expand_directory(root: &Path, directory: &RemotePath, files: &mut Vec<LocalFile>) {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to enumerate {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry
            .path()
            .strip_prefix(root)
            .map_err(|e| e.to_string())
            .and_then(|rel| RemotePath::from_relative(rel).map_err(|e| e.to_string()))
        {
            Ok(relative) => relative,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        files.push(LocalFile {
            target: directory.join(&relative),
            content: entry.into_path(),
            size,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn targets(files: &[LocalFile]) -> Vec<String> {
        files.iter().map(|f| f.target.to_string()).collect()
    }

    #[test]
    fn test_directory_contents_are_mirrored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), b"xx").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("y.txt"), b"yyy").unwrap();

        let up = RemotePath::parse("up/").unwrap();
        let files = expand(&[dir.path().to_path_buf()], &up);

        assert_eq!(targets(&files), vec!["up/sub/y.txt", "up/x.txt"]);
        assert_eq!(files[0].size, 3);
        assert_eq!(files[1].size, 2);
        assert_eq!(files[1].content, dir.path().join("x.txt"));
    }

    #[test]
    fn test_file_input_uses_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, vec![0u8; 1000]).unwrap();

        let files = expand(&[path], &RemotePath::parse("docs").unwrap());
        assert_eq!(targets(&files), vec!["docs/a.txt"]);
        assert_eq!(files[0].size, 1000);
    }

    #[test]
    fn test_missing_inputs_are_skipped() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.bin");
        fs::write(&good, b"1").unwrap();

        let files = expand(
            &[dir.path().join("missing.bin"), good],
            &RemotePath::root(),
        );
        assert_eq!(targets(&files), vec!["good.bin"]);
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let files = expand(&[dir.path().join("empty")], &RemotePath::root());
        assert!(files.is_empty());
    }
}
