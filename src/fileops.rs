//! File operations executed on behalf of clients.
//!
//! Provides the two command implementations:
//! - Signature scanning: offsets of every occurrence of a literal substring
//! - Quarantine: atomic relocation of a file into the quarantine directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Why a file could not be scanned
#[derive(Debug)]
pub enum ScanError {
    /// The path does not exist
    NotFound(PathBuf),
    /// The file exists but could not be read or is not UTF-8 text
    Unreadable(PathBuf, io::Error),
    /// The file has no content
    Empty(PathBuf),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::NotFound(path) => write!(f, "File not found: {}", path.display()),
            ScanError::Unreadable(path, e) => {
                write!(f, "Cannot read file '{}': {}", path.display(), e)
            }
            ScanError::Empty(path) => write!(f, "File is empty: {}", path.display()),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Unreadable(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Why a file could not be quarantined. The source file is untouched.
#[derive(Debug)]
pub struct QuarantineError {
    /// The file that was to be moved
    pub source_path: PathBuf,
    /// Underlying filesystem error
    pub error: io::Error,
}

impl std::fmt::Display for QuarantineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for QuarantineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Read a file and return the character offsets of every `signature` match.
pub fn scan(filepath: impl AsRef<Path>, signature: &str) -> Result<Vec<usize>, ScanError> {
    let filepath = filepath.as_ref();
    let text = read_text(filepath)?;
    let offsets = find_signature(&text, signature);

    info!(
        path = %filepath.display(),
        signature,
        ?offsets,
        "Scanned file"
    );

    Ok(offsets)
}

/// Find non-overlapping occurrences of `signature` in `text`.
///
/// Offsets are counted in characters, not bytes, and are ascending.
pub fn find_signature(text: &str, signature: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;

    for (byte_offset, _) in text.match_indices(signature) {
        chars_before += text[last_byte..byte_offset].chars().count();
        last_byte = byte_offset;
        offsets.push(chars_before);
    }

    offsets
}

fn read_text(filepath: &Path) -> Result<String, ScanError> {
    let bytes = fs::read(filepath).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            error!(path = %filepath.display(), "File not found");
            ScanError::NotFound(filepath.to_path_buf())
        } else {
            error!(path = %filepath.display(), error = %e, "Cannot read file");
            ScanError::Unreadable(filepath.to_path_buf(), e)
        }
    })?;

    let text = String::from_utf8(bytes).map_err(|e| {
        error!(path = %filepath.display(), error = %e, "File is not UTF-8 text");
        ScanError::Unreadable(
            filepath.to_path_buf(),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    })?;

    if text.is_empty() {
        return Err(ScanError::Empty(filepath.to_path_buf()));
    }

    Ok(text)
}

/// Final path component, splitting on both `/` and `\`.
pub fn quarantine_file_name(filepath: &str) -> &str {
    filepath.rsplit(['/', '\\']).next().unwrap_or(filepath)
}

/// Move `filepath` into `quarantine_dir` with a single rename.
///
/// The directory is created first if needed. Returns the destination path.
pub fn quarantine(filepath: &str, quarantine_dir: &Path) -> Result<PathBuf, QuarantineError> {
    let fail = |error: io::Error| {
        error!(
            path = filepath,
            directory = %quarantine_dir.display(),
            error = %error,
            "Cant move file to quarantine"
        );
        QuarantineError {
            source_path: PathBuf::from(filepath),
            error,
        }
    };

    let file_name = quarantine_file_name(filepath);
    if file_name.is_empty() {
        return Err(fail(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no file name in path '{}'", filepath),
        )));
    }

    fs::create_dir_all(quarantine_dir).map_err(fail)?;
    debug!(directory = %quarantine_dir.display(), "Quarantine directory exists");

    let destination = quarantine_dir.join(file_name);
    fs::rename(filepath, &destination).map_err(fail)?;

    info!(
        path = filepath,
        destination = %destination.display(),
        "File has been moved to quarantine"
    );

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOREM: [&str; 6] = [
        "Lorem ipsum dolor sit amet, consectetur adipiscing elit. Sed libero enim, ",
        "varius nec dapibus eget, vestibulum sit amet tellus. Integer varius, nunc ",
        "ornare porta tincidunt, orci neque vulputate nulla, non aliquam erat justo ",
        "in ipsum. Interdum et malesuada fames ac ante ipsum primis in faucibus. ",
        "Praesent sit amet leo pulvinar dui fermentum varius a vitae dolor. ",
        "Suspendisse scelerisque lobortis tellus, sit amet blandit elit ultricies quis.",
    ];

    #[test]
    fn test_scan_lorem_ipsum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_check_local_file.txt");
        fs::write(&path, LOREM.join("\r\n")).unwrap();

        assert_eq!(scan(&path, "ipsum").unwrap(), vec![6, 232, 275]);
    }

    #[test]
    fn test_scan_lorem_ipsum_lf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lf.txt");
        fs::write(&path, LOREM.join("\n")).unwrap();

        assert_eq!(scan(&path, "ipsum").unwrap(), vec![6, 229, 272]);
    }

    #[test]
    fn test_scan_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, "nothing to see here").unwrap();

        assert!(scan(&path, "virus").unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(dir.path().join("absent.txt"), "x");
        assert!(matches!(result, Err(ScanError::NotFound(_))));
    }

    #[test]
    fn test_scan_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        assert!(matches!(scan(&path, "x"), Err(ScanError::Empty(_))));
    }

    #[test]
    fn test_scan_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [0xff, 0x00, 0xfe]).unwrap();

        assert!(matches!(scan(&path, "x"), Err(ScanError::Unreadable(_, _))));
    }

    #[test]
    fn test_find_signature_non_overlapping() {
        assert_eq!(find_signature("aaaa", "aa"), vec![0, 2]);
        assert_eq!(find_signature("abcabc", "abc"), vec![0, 3]);
    }

    #[test]
    fn test_find_signature_counts_characters() {
        // "é" is two bytes in UTF-8 but one character
        assert_eq!(find_signature("éé sig é sig", "sig"), vec![3, 9]);
    }

    #[test]
    fn test_quarantine_file_name() {
        assert_eq!(quarantine_file_name("test_dir/file.txt"), "file.txt");
        assert_eq!(quarantine_file_name(r"C:\data\file.txt"), "file.txt");
        assert_eq!(quarantine_file_name(r"mixed/dir\file.txt"), "file.txt");
        assert_eq!(quarantine_file_name("file.txt"), "file.txt");
        assert_eq!(quarantine_file_name("dir/"), "");
    }

    #[test]
    fn test_quarantine_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("file.txt");
        let quarantine_dir = dir.path().join("quarantine_dir");
        fs::write(&source, "test_quarantine_local_file").unwrap();

        let destination = quarantine(source.to_str().unwrap(), &quarantine_dir).unwrap();

        assert_eq!(destination, quarantine_dir.join("file.txt"));
        assert!(!source.exists());
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "test_quarantine_local_file"
        );
    }

    #[test]
    fn test_quarantine_into_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine_dir = dir.path().join("q");
        fs::create_dir_all(&quarantine_dir).unwrap();

        for name in ["one.txt", "two.txt"] {
            let source = dir.path().join(name);
            fs::write(&source, name).unwrap();
            quarantine(source.to_str().unwrap(), &quarantine_dir).unwrap();
            assert!(quarantine_dir.join(name).is_file());
        }
    }

    #[test]
    fn test_quarantine_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("absent.txt");
        let quarantine_dir = dir.path().join("q");

        let err = quarantine(source.to_str().unwrap(), &quarantine_dir).unwrap_err();

        assert_eq!(err.error.kind(), io::ErrorKind::NotFound);
        assert!(!quarantine_dir.join("absent.txt").exists());
        // The directory is created before the rename is attempted
        assert!(quarantine_dir.is_dir());
    }

    #[test]
    fn test_quarantine_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine_dir = dir.path().join("q");
        fs::create_dir_all(&quarantine_dir).unwrap();
        fs::write(quarantine_dir.join("file.txt"), "old").unwrap();
        let source = dir.path().join("file.txt");
        fs::write(&source, "new").unwrap();

        let destination = quarantine(source.to_str().unwrap(), &quarantine_dir).unwrap();

        assert_eq!(destination, quarantine_dir.join("file.txt"));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "new");
        assert!(!source.exists());
    }

    #[test]
    fn test_quarantine_trailing_separator() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine_dir = dir.path().join("q");
        let filepath = format!("{}/", dir.path().display());

        let err = quarantine(&filepath, &quarantine_dir).unwrap_err();

        assert_eq!(err.error.kind(), io::ErrorKind::InvalidInput);
        assert!(!quarantine_dir.exists());
    }
}
