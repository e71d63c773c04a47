//! Release archive extraction.
//!
//! Zip archives and gzip-compressed tarballs are unpacked into a scratch
//! directory; anything else is treated as a bare executable by the caller.
//! Entries whose paths would escape the destination are skipped.

use crate::error::{PurrError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the archive format from a file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Unpack `archive_path` into `dest_dir` and return every regular file
/// extracted, sorted by path.
pub fn extract_archive(
    archive_path: &Path,
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| PurrError::fs(format!("Failed to create {}", dest_dir.display()), e))?;
    tracing::debug!(
        "extracting {} to {}",
        archive_path.display(),
        dest_dir.display()
    );

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir)?,
    }

    list_files(dest_dir)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| PurrError::fs(format!("Failed to open {}", archive_path.display()), e))?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)
            .map_err(|e| PurrError::fs(format!("Failed to create {}", out_path.display()), e))?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| PurrError::fs(format!("Failed to open {}", archive_path.display()), e))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    // unpack() refuses entries that would land outside dest_dir
    archive
        .unpack(dest_dir)
        .map_err(|e| PurrError::Archive(format!("{}: {}", archive_path.display(), e)))
}

/// Every regular file below `dir`, sorted
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry =
            entry.map_err(|e| anyhow::anyhow!("Failed to walk {}: {}", dir.display(), e))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                .unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let encoder =
            flate2::write::GzEncoder::new(File::create(path).unwrap(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("a-linux.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("a.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("a.tgz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("a-linux-x64")), None);
        assert_eq!(ArchiveFormat::detect(Path::new("a.exe")), None);
    }

    #[test]
    fn test_extract_zip_lists_nested_files() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("tool.zip");
        write_zip(&zip_path, &[("tool/bin/tool", "bin"), ("tool/README.md", "docs")]);

        let out = dir.path().join("out");
        let files = extract_archive(&zip_path, ArchiveFormat::Zip, &out).unwrap();
        assert_eq!(files, vec![out.join("tool/README.md"), out.join("tool/bin/tool")]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(out.join("tool/bin/tool")).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        write_tar_gz(&archive, &[("tool", "bin"), ("LICENSE", "mit")]);

        let out = dir.path().join("out");
        let files = extract_archive(&archive, ArchiveFormat::TarGz, &out).unwrap();
        assert_eq!(files, vec![out.join("LICENSE"), out.join("tool")]);
    }

    #[test]
    fn test_corrupt_zip_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("broken.zip");
        fs::write(&zip_path, b"definitely not a zip").unwrap();

        let err =
            extract_archive(&zip_path, ArchiveFormat::Zip, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, PurrError::Archive(_)));
    }
}
