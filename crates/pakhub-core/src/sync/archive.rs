use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use super::lock::replace_locked;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("unrecognized archive format: {}", path.display())]
    UnknownFormat { path: PathBuf },
}

impl ArchiveError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

/// Sniff the archive format from its leading bytes.
///
/// # Errors
/// Returns an error if the file cannot be read or the magic bytes match no
/// supported format.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat, ArchiveError> {
    let mut header = [0_u8; 4];
    let mut file =
        File::open(path).map_err(|error| ArchiveError::io("failed to open archive", path, error))?;
    let read = file
        .read(&mut header)
        .map_err(|error| ArchiveError::io("failed to read archive header", path, error))?;

    if read >= 2 && header[..2] == GZIP_MAGIC {
        Ok(ArchiveFormat::TarGz)
    } else if read == 4 && header == ZIP_MAGIC {
        Ok(ArchiveFormat::Zip)
    } else {
        Err(ArchiveError::UnknownFormat {
            path: path.to_path_buf(),
        })
    }
}

/// Extract `archive` and move every extracted file into `dest_dir`, each
/// under its own database lock. Returns the number of files installed.
///
/// Extraction happens in a hidden temporary directory inside `dest_dir` so
/// the final moves are same-filesystem renames.
///
/// # Errors
/// Returns an error if the archive cannot be read or a file cannot be moved
/// into place. Files moved before the failure stay installed.
pub fn install_archive(archive: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    std::fs::create_dir_all(dest_dir)
        .map_err(|error| ArchiveError::io("failed to create database directory", dest_dir, error))?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(dest_dir)
        .map_err(|error| {
            ArchiveError::io("failed to create extraction directory", dest_dir, error)
        })?;

    match detect_format(archive)? {
        ArchiveFormat::TarGz => extract_tar_gz(archive, staging.path())?,
        ArchiveFormat::Zip => extract_zip(archive, staging.path())?,
    }

    let installed = move_into_place(staging.path(), staging.path(), dest_dir)?;
    debug!("Installed {installed} files into {}", dest_dir.display());
    Ok(installed)
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path)
        .map_err(|error| ArchiveError::io("failed to open tar.gz archive", archive_path, error))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));

    let entries = archive
        .entries()
        .map_err(|error| ArchiveError::io("failed to read tar.gz archive", archive_path, error))?;
    for entry in entries {
        let mut entry = entry
            .map_err(|error| ArchiveError::io("failed to read tar.gz entry", archive_path, error))?;
        // `unpack_in` refuses entries escaping `dest` and reports them as
        // `Ok(false)`.
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|error| ArchiveError::io("failed to extract tar.gz entry", dest, error))?;
        if !unpacked {
            warn!("Skipping tar entry with unsafe path");
        }
    }
    Ok(())
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(zip_path)
        .map_err(|error| ArchiveError::io("failed to open zip file", zip_path, error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io("failed to create extraction directory", &out_path, error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io("failed to create extraction parent directory", parent, error)
            })?;
        }
        let mut outfile = File::create(&out_path).map_err(|error| {
            ArchiveError::io("failed to create extracted file", &out_path, error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            ArchiveError::io("failed to extract archive entry", &out_path, error)
        })?;
    }
    Ok(())
}

fn move_into_place(root: &Path, dir: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let mut installed = 0;
    let entries = std::fs::read_dir(dir)
        .map_err(|error| ArchiveError::io("failed to read extraction directory", dir, error))?;

    for entry in entries {
        let entry =
            entry.map_err(|error| ArchiveError::io("failed to read extraction entry", dir, error))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|error| ArchiveError::io("failed to inspect extracted entry", &path, error))?;

        if file_type.is_dir() {
            installed += move_into_place(root, &path, dest_dir)?;
            continue;
        }
        if !file_type.is_file() {
            warn!("Skipping non-regular archive entry {}", path.display());
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let target = dest_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io("failed to create database subdirectory", parent, error)
            })?;
        }
        replace_locked(&path, &target)
            .map_err(|error| ArchiveError::io("failed to move extracted file", &target, error))?;
        installed += 1;
    }

    Ok(installed)
}
