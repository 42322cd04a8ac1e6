//! Extension staging and archive extraction.
//!
//! Bundles arrive as a directory or as a `.zip`, `.tar`, `.tar.gz` or
//! `.tgz` archive. Archives are unpacked into a scratch directory that is
//! removed when the [`StagedExtension`] is dropped.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;

use super::ExtensionError;

/// An extension bundle ready to be installed.
#[derive(Debug)]
pub struct StagedExtension {
    root: PathBuf,
    /// Keeps the extraction directory alive; removed on drop.
    scratch: Option<TempDir>,
}

impl StagedExtension {
    /// Stages the extension at `source`.
    ///
    /// Directories are used in place. Archives are extracted below
    /// `scratch_parent` and the bundle root is the top-level directory every
    /// member shares.
    pub fn stage(source: &Path, scratch_parent: &Path) -> Result<Self, ExtensionError> {
        if source.is_dir() {
            return Ok(Self {
                root: source.to_path_buf(),
                scratch: None,
            });
        }
        if !source.is_file() {
            return Err(ExtensionError::NotFound(source.to_path_buf()));
        }

        fs::create_dir_all(scratch_parent)?;
        let scratch = tempfile::Builder::new()
            .prefix("weext-")
            .tempdir_in(scratch_parent)?;

        let members = extract_archive(source, scratch.path())?;
        let relative =
            common_root(&members).ok_or_else(|| ExtensionError::NoCommonRoot(source.to_path_buf()))?;

        let mut root = scratch.path().join(relative);
        // A single-file archive shares its whole path; the bundle is its directory.
        if !root.is_dir() {
            root.pop();
        }
        if root == scratch.path() {
            return Err(ExtensionError::NoCommonRoot(source.to_path_buf()));
        }

        tracing::debug!(
            "Staged '{}' in {}",
            source.display(),
            scratch.path().display()
        );
        Ok(Self {
            root,
            scratch: Some(scratch),
        })
    }

    /// Returns the bundle root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes the extraction directory, if any, reporting a failure that
    /// dropping would swallow.
    pub fn cleanup(self) -> io::Result<()> {
        match self.scratch {
            Some(scratch) => scratch.close(),
            None => Ok(()),
        }
    }
}

/// Archive formats recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Extracts `archive` into `dest` and returns the member paths, relative to `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtensionError> {
    let kind = ArchiveKind::detect(archive).ok_or_else(|| {
        ExtensionError::Archive(format!("Unsupported archive type '{}'", archive.display()))
    })?;
    let file = File::open(archive)?;

    match kind {
        ArchiveKind::Zip => extract_zip(file, dest),
        ArchiveKind::Tar => extract_tar(file, dest),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), dest),
    }
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<Vec<PathBuf>, ExtensionError> {
    let archive_error = |e: io::Error| ExtensionError::Archive(format!("Failed to read tar archive: {}", e));

    let mut archive = tar::Archive::new(reader);
    let mut members = Vec::new();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let path = entry.path().map_err(archive_error)?.into_owned();
        let relative = checked_member(&path)?;

        if !entry.unpack_in(dest).map_err(archive_error)? {
            return Err(ExtensionError::Archive(format!(
                "Refusing to extract '{}'",
                path.display()
            )));
        }
        members.push(relative);
    }

    Ok(members)
}

fn extract_zip(file: File, dest: &Path) -> Result<Vec<PathBuf>, ExtensionError> {
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ExtensionError::Archive(format!("Failed to open archive: {}", e)))?;
    let mut members = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            ExtensionError::Archive(format!("Failed to read archive entry: {}", e))
        })?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            ExtensionError::Archive(format!("Refusing to extract '{}'", entry.name()))
        })?;
        let relative = checked_member(&relative)?;
        let outpath = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
        }
        members.push(relative);
    }

    Ok(members)
}

/// Normalizes a member path, rejecting anything that could leave the
/// extraction directory.
fn checked_member(path: &Path) -> Result<PathBuf, ExtensionError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ExtensionError::Archive(format!(
                    "Refusing to extract '{}'",
                    path.display()
                )));
            }
        }
    }
    Ok(clean)
}

/// Returns the longest leading path shared by every member, if any.
#[must_use]
pub fn common_root(members: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = members.iter().filter(|m| !m.as_os_str().is_empty());
    let first = iter.next()?;
    let mut prefix: Vec<Component<'_>> = first.components().collect();

    for member in iter {
        let shared = prefix
            .iter()
            .zip(member.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
    }

    if prefix.is_empty() {
        None
    } else {
        Some(prefix.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_common_root() {
        let members = paths(&["pmon", "pmon/install.toml", "pmon/bin/user/pmon.py"]);
        assert_eq!(common_root(&members), Some(PathBuf::from("pmon")));

        let members = paths(&["pmon/install.toml", "other/readme"]);
        assert_eq!(common_root(&members), None);

        // Component-wise, not character-wise.
        let members = paths(&["pmonx/a", "pmony/b"]);
        assert_eq!(common_root(&members), None);

        assert_eq!(common_root(&[]), None);
    }

    #[test]
    fn test_checked_member_rejects_escape() {
        assert!(checked_member(Path::new("../evil")).is_err());
        assert!(checked_member(Path::new("/etc/passwd")).is_err());
        assert_eq!(
            checked_member(Path::new("./pmon/install.toml")).unwrap(),
            PathBuf::from("pmon/install.toml")
        );
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(ArchiveKind::detect(Path::new("pmon.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("pmon.TAR.GZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("pmon.tgz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("pmon.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect(Path::new("pmon.rar")), None);
    }

    #[test]
    fn test_stage_directory_in_place() {
        let dir = TempDir::new().unwrap();
        let staged = StagedExtension::stage(dir.path(), dir.path()).unwrap();
        assert_eq!(staged.root(), dir.path());
        assert!(staged.scratch.is_none());
        staged.cleanup().unwrap();
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_stage_missing() {
        let dir = TempDir::new().unwrap();
        let result = StagedExtension::stage(&dir.path().join("nope.tar.gz"), dir.path());
        assert!(matches!(result, Err(ExtensionError::NotFound(_))));
    }

    #[test]
    fn test_stage_zip_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pmon.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("pmon/install.toml", options).unwrap();
            zip.write_all(b"name = \"pmon\"\n").unwrap();
            zip.start_file("pmon/bin/user/pmon.py", options).unwrap();
            zip.write_all(b"# pmon\n").unwrap();
            zip.finish().unwrap();
        }

        let scratch = dir.path().join("scratch");
        let staged = StagedExtension::stage(&archive, &scratch).unwrap();
        assert!(staged.root().starts_with(&scratch));
        assert!(staged.root().ends_with("pmon"));
        assert!(staged.root().join("bin/user/pmon.py").is_file());

        staged.cleanup().unwrap();
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_stage_without_common_root_cleans_up() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("flat.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("install.toml", options).unwrap();
            zip.write_all(b"name = \"flat\"\n").unwrap();
            zip.start_file("other.py", options).unwrap();
            zip.write_all(b"\n").unwrap();
            zip.finish().unwrap();
        }

        let scratch = dir.path().join("scratch");
        let result = StagedExtension::stage(&archive, &scratch);
        assert!(matches!(result, Err(ExtensionError::NoCommonRoot(_))));
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
