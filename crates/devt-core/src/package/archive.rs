//! Zip export and extraction of package directories.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

use crate::error::{Error, IoContext, Result};

fn archive_error(path: &Path, message: impl std::fmt::Display) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Write `src_dir` into a new zip at `zip_path`, keeping relative paths.
pub fn create_zip(src_dir: &Path, zip_path: &Path) -> Result<()> {
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(zip_path)
        .io_context(|| format!("Failed to create archive: {}", zip_path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut pending = vec![src_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = std::fs::read_dir(&dir)
            .io_context(|| format!("Failed to read dir: {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .io_context(|| format!("Failed to read dir entry: {}", dir.display()))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            if entry.file_name() == ".git" {
                continue;
            }
            let name = entry_name(src_dir, &path);
            if path.is_dir() {
                writer
                    .add_directory(format!("{}/", name), options)
                    .map_err(|e| archive_error(zip_path, e))?;
                pending.push(path);
                continue;
            }

            let mut file_options = options;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = entry.metadata() {
                    file_options = file_options.unix_permissions(meta.permissions().mode());
                }
            }
            writer
                .start_file(name, file_options)
                .map_err(|e| archive_error(zip_path, e))?;
            let mut buffer = Vec::new();
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut buffer))
                .io_context(|| format!("Failed to read file: {}", path.display()))?;
            writer
                .write_all(&buffer)
                .io_context(|| format!("Failed to write archive: {}", zip_path.display()))?;
        }
    }

    writer.finish().map_err(|e| archive_error(zip_path, e))?;
    Ok(())
}

/// Archive entry name: `/`-separated path relative to `root`.
fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract `zip_path` into `dest`, skipping entries that escape it.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest)
        .io_context(|| format!("Failed to create extract directory: {}", dest.display()))?;

    let file = File::open(zip_path)
        .io_context(|| format!("Failed to open archive: {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(zip_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(zip_path, e))?;

        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .io_context(|| format!("Failed to create directory: {}", outpath.display()))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut buffer = Vec::new();
        entry
            .read_to_end(&mut buffer)
            .map_err(|e| archive_error(zip_path, e))?;
        std::fs::write(&outpath, &buffer)
            .io_context(|| format!("Failed to write file: {}", outpath.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zip_round_trip_preserves_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("pkg");
        std::fs::create_dir_all(src.join("bin/nested")).unwrap();
        std::fs::create_dir_all(src.join(".git")).unwrap();
        std::fs::write(src.join("manifest.yaml"), "name: x").unwrap();
        std::fs::write(src.join("bin/nested/run.sh"), "#!/bin/sh\necho hi\n").unwrap();
        std::fs::write(src.join(".git/HEAD"), "ref").unwrap();

        let zip_path = temp.path().join("out/pkg.zip");
        create_zip(&src, &zip_path).unwrap();

        let dest = temp.path().join("unpacked");
        extract_zip(&zip_path, &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("manifest.yaml")).unwrap(),
            "name: x"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("bin/nested/run.sh")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
        assert!(!dest.join(".git").exists());
    }

    #[test]
    fn extract_skips_escaping_entries() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("evil.zip");
        {
            let file = File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file("../escape.txt", options).unwrap();
            zip.write_all(b"nope").unwrap();
            zip.start_file("ok.txt", options).unwrap();
            zip.write_all(b"fine").unwrap();
            zip.finish().unwrap();
        }

        let dest = temp.path().join("dest");
        extract_zip(&zip_path, &dest).unwrap();
        assert!(dest.join("ok.txt").is_file());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn invalid_archive_is_reported() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("bad.zip");
        std::fs::write(&zip_path, b"not a zip").unwrap();
        let err = extract_zip(&zip_path, &temp.path().join("d")).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
