//! Label-based renaming.
//!
//! A classified file becomes `<Label><ext>` in its own directory. When that
//! name is taken the counter form `<Label> (1)<ext>`, `<Label> (2)<ext>`, …
//! is tried. Each target is claimed with a hard link, which fails atomically
//! if the name exists, so a concurrent writer can never be overwritten.

use crate::error::RenameError;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest file name accepted, in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Give up after this many collisions.
const MAX_COUNTER: u32 = 10_000;

/// Check a candidate file name (not a path).
pub fn validate_file_name(name: &str) -> Result<(), RenameError> {
    if name.trim().is_empty() {
        return Err(RenameError::Empty);
    }
    let len = name.chars().count();
    if len > MAX_FILE_NAME_LEN {
        return Err(RenameError::TooLong { len });
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(RenameError::InvalidCharacter { ch });
    }
    if Path::new(name).extension().is_none() {
        return Err(RenameError::MissingExtension {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Rename `path` to `<base_name><original ext>` in the same directory.
///
/// Returns the new path. If the file already carries that exact name it is
/// left alone.
pub fn rename_with_label(path: &Path, base_name: &str) -> Result<PathBuf, RenameError> {
    if !path.is_file() {
        return Err(RenameError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    for counter in 0..=MAX_COUNTER {
        let name = if counter == 0 {
            format!("{base_name}{ext}")
        } else {
            format!("{base_name} ({counter}){ext}")
        };
        validate_file_name(&name)?;

        let target = dir.join(&name);
        if path.file_name() == Some(OsStr::new(&name)) {
            debug!("{} already has the target name", path.display());
            return Ok(path.to_path_buf());
        }

        match claim(path, &target) {
            Ok(true) => {
                info!("Renamed {} → {}", path.display(), target.display());
                return Ok(target);
            }
            Ok(false) => debug!("{} exists, trying next counter", target.display()),
            Err(source) => {
                return Err(RenameError::Io {
                    from: path.to_path_buf(),
                    to: target,
                    source,
                })
            }
        }
    }

    Err(RenameError::Io {
        from: path.to_path_buf(),
        to: dir.join(base_name),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
    })
}

/// Move `from` to `to` unless `to` exists. `Ok(false)` means taken.
fn claim(from: &Path, to: &Path) -> io::Result<bool> {
    match std::fs::hard_link(from, to) {
        Ok(()) => {
            std::fs::remove_file(from)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        // Filesystems without hard links: check-then-rename.
        Err(_) if to.exists() => Ok(false),
        Err(_) => std::fs::rename(from, to).map(|()| true),
    }
}
