use std::{
    fs, io,
    path::{Component, Path},
};

use tempfile::NamedTempFile;

/// Checks whether the path is simply a filename, i.e., a normal part of a path.
pub fn is_basename(path: impl AsRef<Path>) -> bool {
    let mut components = path.as_ref().components();
    let Some(Component::Normal(_)) = components.next() else {
        return false;
    };
    components.next().is_none()
}

/// Try to read the file, return None if it doesn't exist
pub fn read_optional_file(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
        Ok(s) => Ok(Some(s)),
    }
}

/// Number of entries directly inside `dir`, of any kind.
pub fn count_entries(dir: impl AsRef<Path>) -> io::Result<usize> {
    fs::read_dir(dir)?.try_fold(0, |acc, entry| entry.map(|_| acc + 1))
}

/// Creates the directory, and its parents, unless it already exists. Returns whether it
/// was created.
pub fn ensure_dir(dir: impl AsRef<Path>) -> io::Result<bool> {
    let dir = dir.as_ref();
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    Ok(true)
}

/// Replaces the contents of `path` with whatever `writer` writes. The new contents are
/// written to a temporary file next to `path` that is then renamed over it, so readers
/// see either the old or the new file, never a half written one. The permissions of
/// `path` carry over to the new file.
pub fn replace_file<F, E>(path: impl AsRef<Path>, writer: F) -> Result<(), E>
where
    F: FnOnce(&mut fs::File) -> Result<(), E>,
    E: From<io::Error>,
{
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the path does not refer to a file",
            )
            .into())
        }
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    match fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
        Err(e) => return Err(e.into()),
    }
    writer(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
