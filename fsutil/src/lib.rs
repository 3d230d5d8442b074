use serde::Serialize;
use std::{
    ffi::OsStr,
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Refusing to overwrite existing file '{0}'")]
        AlreadyExists(PathBuf),

        #[error("'{0}' is not a plain file name")]
        NotAFileName(String),

        #[error("Cannot serialize to JSON (dest='{0}'): {1}")]
        SerializeToJson(PathBuf, #[source] serde_json::Error),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

/// Removes `dir` with all of its contents. A missing `dir` is not an error.
#[must_use]
pub fn remove_dir_all_if_exists(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::SingleIO("Cannot remove dir", dir.to_owned(), e)),
    }
}

/// Removes `dir` if it exists and creates it again empty.
#[must_use]
pub fn recreate_dir(dir: impl AsRef<Path>) -> Result<()> {
    self::remove_dir_all_if_exists(&dir)?;
    self::mkdir_all(dir)
}

#[must_use]
pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if let Some(dir) = filepath.as_ref().parent() {
        self::mkdir_all(dir)?;
    }
    self::write(filepath, contents)
}

/// Like [`write_with_mkdir`], but fails with [`Error::AlreadyExists`] instead of
/// clobbering an existing file.
#[must_use]
pub fn write_new_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    let filepath = filepath.as_ref();
    if filepath.exists() {
        return Err(Error::AlreadyExists(filepath.to_owned()));
    }
    self::write_with_mkdir(filepath, contents)
}

#[must_use]
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    fs::read_to_string(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_json_with_mkdir<P, T>(filepath: P, data: &T) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let s = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SerializeToJson(filepath.as_ref().to_owned(), e))?;
    write_with_mkdir(filepath, &s)
}

/// Joins `path` onto `base` unless `path` is already absolute.
/// A leading `./` in `path` is dropped so the result stays tidy.
/// ```
/// use fsutil::resolve_relative_to;
/// use std::path::Path;
///
/// assert_eq!(resolve_relative_to("/work", "./bin/gen"), Path::new("/work/bin/gen"));
/// assert_eq!(resolve_relative_to("/work", "/usr/bin/true"), Path::new("/usr/bin/true"));
/// assert_eq!(resolve_relative_to("/work", "logs"), Path::new("/work/logs"));
/// ```
pub fn resolve_relative_to(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return path.to_owned();
    }
    base.as_ref().join(path.strip_prefix(".").unwrap_or(path))
}

/// `true` when `name` is a single normal path component: not empty, not `.`/`..`, and
/// without separators or a root.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    match (comps.next(), comps.next()) {
        (Some(Component::Normal(c)), None) => c == OsStr::new(name),
        _ => false,
    }
}

/// `dir/name`, refusing any `name` that would point outside of `dir` or at `dir` itself.
pub fn child_path(dir: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
    if !self::is_plain_file_name(name) {
        return Err(Error::NotAFileName(name.to_owned()));
    }
    Ok(dir.as_ref().join(name))
}
