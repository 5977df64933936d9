//! Artifact verification
//!
//! Decides whether a build produced a usable image, independent of the
//! builder's exit code.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::core::build_config::Thresholds;
use crate::core::report::{BuildWarning, ImageSignature, PayloadStatus};
use crate::error::{FilesystemError, PipelineError};

/// Offset of the first ISO 9660 volume descriptor identifier (sector 16 + 1)
const ISO9660_MAGIC_OFFSET: u64 = 0x8001;
const ISO9660_MAGIC: &[u8] = b"CD001";
const MBR_SIGNATURE_OFFSET: u64 = 510;
const MBR_SIGNATURE: &[u8] = &[0x55, 0xAA];

/// A verified image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Image path
    pub image: PathBuf,
    /// Image size in bytes
    pub image_size: u64,
    /// Payload location
    pub payload: PayloadStatus,
    /// Image signature
    pub signature: ImageSignature,
    /// Non-fatal findings
    pub warnings: Vec<BuildWarning>,
}

/// First `*.iso` in `output_dir`, by file name
pub fn find_image(output_dir: &Path) -> Option<PathBuf> {
    let mut images: Vec<PathBuf> = fs::read_dir(output_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &["iso"]))
        .collect();
    images.sort();
    images.into_iter().next()
}

/// First squashfs payload under `build_dir`, then under `<output_dir>/arch`
pub fn find_payload(build_dir: &Path, output_dir: &Path) -> Option<PathBuf> {
    [build_dir.to_path_buf(), output_dir.join("arch")]
        .iter()
        .filter(|dir| dir.is_dir())
        .find_map(|dir| {
            WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .find(|entry| entry.file_type().is_file() && has_extension(entry.path(), &["squashfs", "sfs"]))
                .map(walkdir::DirEntry::into_path)
        })
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Identify the image by its magic bytes
pub fn read_signature(image: &Path) -> ImageSignature {
    let Ok(mut file) = File::open(image) else {
        return ImageSignature::Unknown;
    };
    if bytes_at(&mut file, ISO9660_MAGIC_OFFSET, ISO9660_MAGIC.len()).as_deref() == Some(ISO9660_MAGIC) {
        return ImageSignature::Iso9660;
    }
    if bytes_at(&mut file, MBR_SIGNATURE_OFFSET, MBR_SIGNATURE.len()).as_deref() == Some(MBR_SIGNATURE) {
        return ImageSignature::BootSector;
    }
    ImageSignature::Unknown
}

fn bytes_at(file: &mut File, offset: u64, len: usize) -> Option<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).ok()?;
    let mut buf = vec![0; len];
    file.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Verify the output of a finished builder run
///
/// * no image: [`PipelineError::ArtifactMissing`] after a clean exit,
///   [`PipelineError::SubprocessFailed`] otherwise
/// * no payload and a small image: [`PipelineError::PayloadMissing`]
/// * a non-zero exit with a passing image succeeds with a warning
pub fn verify_artifact(
    build_dir: &Path,
    output_dir: &Path,
    exit_code: Option<i32>,
    fatal_signals: &[String],
    thresholds: &Thresholds,
) -> Result<Verification, PipelineError> {
    let Some(image) = find_image(output_dir) else {
        return Err(if exit_code == Some(0) {
            PipelineError::ArtifactMissing {
                output_dir: output_dir.to_path_buf(),
            }
        } else {
            PipelineError::SubprocessFailed { code: exit_code }
        });
    };

    let image_size = fs::metadata(&image)
        .map_err(|e| FilesystemError::ReadFile {
            path: image.clone(),
            error: e.to_string(),
        })?
        .len();

    let mut warnings = Vec::new();
    let payload = match find_payload(build_dir, output_dir) {
        Some(path) => {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if size < thresholds.min_payload_bytes {
                warnings.push(BuildWarning::SuspiciouslySmallPayload {
                    path: path.clone(),
                    size,
                });
            }
            PayloadStatus::Found { path, size }
        }
        None if image_size > thresholds.min_image_bytes => PayloadStatus::PresumedEmbedded,
        None => {
            return Err(PipelineError::PayloadMissing {
                size: image_size,
                fatal_signals: fatal_signals.to_vec(),
            })
        }
    };

    if exit_code != Some(0) {
        warnings.push(BuildWarning::NonZeroExit { code: exit_code });
    }

    let signature = read_signature(&image);
    Ok(Verification {
        image,
        image_size,
        payload,
        signature,
        warnings,
    })
}

/// Write `<image>.sha256` in `sha256sum` format and return its path
pub fn write_checksum(image: &Path) -> Result<PathBuf, FilesystemError> {
    let read_err = |e: io::Error| FilesystemError::ReadFile {
        path: image.to_path_buf(),
        error: e.to_string(),
    };

    let mut file = File::open(image).map_err(read_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_err)?;
    let checksum = hex::encode(hasher.finalize());

    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut sidecar = image.as_os_str().to_owned();
    sidecar.push(".sha256");
    let sidecar = PathBuf::from(sidecar);

    crate::infra::filesystem::write_file(&sidecar, &format!("{checksum}  {file_name}\n"))?;
    Ok(sidecar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn sparse(path: &Path, size: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().set_len(size).unwrap();
    }

    #[test]
    fn test_missing_image_after_clean_exit() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();

        let err = verify_artifact(&temp.path().join("build"), &out, Some(0), &[], &Thresholds::default())
            .unwrap_err();

        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));
    }

    #[test]
    fn test_missing_image_after_failed_exit() {
        let temp = TempDir::new().unwrap();

        let err = verify_artifact(temp.path(), temp.path(), Some(2), &[], &Thresholds::default()).unwrap_err();

        assert!(matches!(err, PipelineError::SubprocessFailed { code: Some(2) }));
    }

    #[test]
    fn test_large_image_without_payload_is_embedded() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        sparse(&out.join("custom-arch-2024.06.01-x86_64.iso"), 2 * GIB);

        let v = verify_artifact(&temp.path().join("build"), &out, Some(0), &[], &Thresholds::default()).unwrap();

        assert_eq!(v.payload, PayloadStatus::PresumedEmbedded);
        assert!(v.warnings.is_empty());
        assert_eq!(v.image_size, 2 * GIB);
    }

    #[test]
    fn test_small_image_without_payload_fails() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        sparse(&out.join("custom-arch.iso"), GIB / 20);
        let signals = vec!["error: failed to install linux".to_string()];

        let err = verify_artifact(&temp.path().join("build"), &out, Some(0), &signals, &Thresholds::default())
            .unwrap_err();

        match err {
            PipelineError::PayloadMissing { size, fatal_signals } => {
                assert_eq!(size, GIB / 20);
                assert_eq!(fatal_signals, signals);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_payload_found_in_build_dir_and_small_warning() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("build");
        let out = temp.path().join("out");
        sparse(&out.join("custom-arch.iso"), GIB / 2);
        sparse(&build.join("iso/arch/x86_64/airootfs.sfs"), 1024);

        let v = verify_artifact(&build, &out, Some(1), &[], &Thresholds::default()).unwrap();

        assert!(matches!(v.payload, PayloadStatus::Found { size: 1024, .. }));
        assert!(v.warnings.iter().any(|w| matches!(w, BuildWarning::SuspiciouslySmallPayload { .. })));
        assert!(v.warnings.contains(&BuildWarning::NonZeroExit { code: Some(1) }));
    }

    #[test]
    fn test_payload_falls_back_to_output_arch_dir() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        sparse(&out.join("arch/x86_64/airootfs.squashfs"), 10);

        assert_eq!(
            find_payload(&temp.path().join("build"), &out),
            Some(out.join("arch/x86_64/airootfs.squashfs"))
        );
    }

    #[test]
    fn test_read_signature() {
        let temp = TempDir::new().unwrap();

        let iso = temp.path().join("a.iso");
        let mut file = File::create(&iso).unwrap();
        file.set_len(0x9000).unwrap();
        file.seek(SeekFrom::Start(0x8001)).unwrap();
        file.write_all(b"CD001").unwrap();
        assert_eq!(read_signature(&iso), ImageSignature::Iso9660);

        let mbr = temp.path().join("b.img");
        let mut file = File::create(&mbr).unwrap();
        file.set_len(1024).unwrap();
        file.seek(SeekFrom::Start(510)).unwrap();
        file.write_all(&[0x55, 0xAA]).unwrap();
        assert_eq!(read_signature(&mbr), ImageSignature::BootSector);

        let empty = temp.path().join("c.iso");
        File::create(&empty).unwrap();
        assert_eq!(read_signature(&empty), ImageSignature::Unknown);
    }

    #[test]
    fn test_write_checksum() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("x.iso");
        fs::write(&image, "abc").unwrap();

        let sidecar = write_checksum(&image).unwrap();

        assert_eq!(sidecar, temp.path().join("x.iso.sha256"));
        assert_eq!(
            fs::read_to_string(sidecar).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  x.iso\n"
        );
    }
}
