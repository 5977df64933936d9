//! Filesystem operations
//!
//! Handles file and directory operations. Every generated file goes through
//! [`write_file`] or [`write_script`] so permissions stay consistent.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Mode for generated scripts
pub const SCRIPT_MODE: u32 = 0o755;

/// Mode for generated configuration files
pub const CONFIG_MODE: u32 = 0o644;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Remove a single file if it exists
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Remove and recreate a directory, leaving it empty with mode 0755
pub fn recreate_dir(path: &Path) -> Result<(), FilesystemError> {
    remove_dir_all(path)?;
    create_dir_all(path)?;
    set_mode(path, SCRIPT_MODE)
}

/// Write content to a file with mode 0644
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    write_with_mode(path, content, CONFIG_MODE)
}

/// Write content to a file with mode 0755
pub fn write_script(path: &Path, content: &str) -> Result<(), FilesystemError> {
    write_with_mode(path, content, SCRIPT_MODE)
}

fn write_with_mode(path: &Path, content: &str, mode: u32) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    set_mode(path, mode)
}

/// Append content to an existing file
pub fn append_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Set the permission bits of a path
pub fn set_mode(path: &Path, mode: u32) -> Result<(), FilesystemError> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        FilesystemError::Permissions {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    })
}

/// Copy a single file, preserving its permission bits
pub fn copy_file(from: &Path, to: &Path) -> Result<u64, FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|e| FilesystemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// Recursively copy a directory tree
///
/// Symlinks are recreated rather than followed and permission bits are
/// preserved, matching `cp -a` for the purposes of profile staging.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    let copy_err = |error: String| FilesystemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error,
    };

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| copy_err(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| copy_err(e.to_string()))?;
        let target = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            create_dir_all(&target)?;
            let mode = entry
                .metadata()
                .map_err(|e| copy_err(e.to_string()))?
                .permissions()
                .mode();
            set_mode(&target, mode)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| copy_err(e.to_string()))?;
            if target.symlink_metadata().is_ok() {
                remove_file(&target)?;
            }
            symlink(&link, &target).map_err(|e| FilesystemError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                error: e.to_string(),
            })?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}
