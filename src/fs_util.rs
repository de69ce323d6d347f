use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tempfile::Builder;

use crate::error::CollateError;

fn fs_err(context: impl std::fmt::Display, err: impl std::fmt::Display) -> CollateError {
    CollateError::Filesystem(format!("{context}: {err}"))
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), CollateError> {
    fs::create_dir_all(path.as_std_path()).map_err(|err| fs_err(format!("create {path}"), err))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CollateError> {
    let parent = path
        .parent()
        .ok_or_else(|| CollateError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    let mut temp = Builder::new()
        .prefix(".xtal-collate")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| fs_err(format!("create temp file in {parent}"), err))?;
    temp.write_all(content)
        .map_err(|err| fs_err(format!("write temp file for {path}"), err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| fs_err(format!("sync temp file for {path}"), err))?;
    temp.persist(path.as_std_path())
        .map_err(|err| fs_err(format!("rename into {path}"), err))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), CollateError> {
    let mut content =
        serde_json::to_vec_pretty(value).map_err(|err| fs_err(format!("serialize {path}"), err))?;
    content.push(b'\n');
    write_bytes_atomic(path, &content)
}

pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, CollateError> {
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(fs_err(format!("read {path}"), err)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| CollateError::MetadataParse {
            path: path.to_owned(),
            reason: err.to_string(),
        })
}

pub fn copy_file_hashed(source: &Utf8Path, dest: &Utf8Path) -> Result<String, CollateError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CollateError::Filesystem(format!("invalid destination path {dest}")))?;
    ensure_dir(parent)?;
    let mut input = fs::File::open(source.as_std_path())
        .map_err(|err| fs_err(format!("open {source}"), err))?;
    let temp = Builder::new()
        .prefix(".xtal-collate-copy")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| fs_err(format!("create temp file in {parent}"), err))?;
    let mut writer = HashingWriter {
        inner: temp.as_file(),
        hasher: Sha256::new(),
    };
    io::copy(&mut input, &mut writer).map_err(|err| fs_err(format!("copy {source}"), err))?;
    let digest = format!("{:x}", writer.hasher.finalize());
    temp.as_file()
        .sync_all()
        .map_err(|err| fs_err(format!("sync copy of {source}"), err))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| fs_err(format!("rename into {dest}"), err))?;
    Ok(digest)
}

pub fn sha256_file(path: &Utf8Path) -> Result<String, CollateError> {
    let mut file =
        fs::File::open(path.as_std_path()).map_err(|err| fs_err(format!("open {path}"), err))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|err| fs_err(format!("hash {path}"), err))?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn remove_dir_if_exists(path: &Utf8Path) -> Result<(), CollateError> {
    if path.as_std_path().exists() {
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| fs_err(format!("remove {path}"), err))?;
    }
    Ok(())
}

pub fn replace_dir(staged: &Utf8Path, dest: &Utf8Path) -> Result<(), CollateError> {
    remove_dir_if_exists(dest)?;
    fs::rename(staged.as_std_path(), dest.as_std_path())
        .map_err(|err| fs_err(format!("rename {staged} to {dest}"), err))
}

/// Joins `path` onto `base`, dropping a leading `/` so absolute database paths
/// land below the base directory.
pub fn prepend_base(base: Option<&Utf8Path>, path: &Utf8Path) -> Utf8PathBuf {
    match base {
        Some(base) => base.join(path.as_str().trim_start_matches('/')),
        None => path.to_owned(),
    }
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
