//! Merging of server listings with uploads the server has not confirmed yet

use crate::upload::types::FileInfo;
use std::collections::HashSet;

/// Server names first, in server order, then tracked names the server did
/// not report. Duplicates are dropped by name.
pub(crate) fn merge_directories(server: &[String], tracked: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(server.len() + tracked.len());
    for name in server.iter().cloned().chain(tracked) {
        if seen.insert(name.clone()) {
            merged.push(name);
        }
    }
    merged
}

/// Like `merge_directories`, with tracked files shown as provisional entries
pub(crate) fn merge_files(server: &[FileInfo], tracked: Vec<String>) -> Vec<FileInfo> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(server.len() + tracked.len());
    let provisional = tracked.into_iter().map(FileInfo::provisional);
    for info in server.iter().cloned().chain(provisional) {
        if seen.insert(info.name.clone()) {
            merged.push(info);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_directories() {
        let server = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let merged = merge_directories(&server, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(merged, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_merge_files_prefers_server_metadata() {
        let server = vec![FileInfo::new("x.txt", 12)];
        let merged = merge_files(&server, vec!["x.txt".to_string(), "y.txt".to_string()]);
        assert_eq!(
            merged,
            vec![FileInfo::new("x.txt", 12), FileInfo::provisional("y.txt")]
        );
    }

    #[test]
    fn test_merge_with_nothing_tracked() {
        let server = vec![FileInfo::new("x.txt", 12)];
        assert_eq!(merge_files(&server, Vec::new()), server);
        assert!(merge_directories(&[], Vec::new()).is_empty());
    }
}
