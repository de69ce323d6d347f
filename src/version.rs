use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::error::CollateError;
use crate::fs_util;
use crate::metadata::{InputMetadata, METADATA_FILENAME};

pub const VERSION_DIR_PREFIX: &str = "upload_";

#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub number: u32,
    pub dir: Utf8PathBuf,
    pub history: Vec<InputMetadata>,
}

pub struct VersionResolver;

impl VersionResolver {
    pub fn version_dir(output_root: &Utf8Path, version: u32) -> Utf8PathBuf {
        output_root.join(format!("{VERSION_DIR_PREFIX}{version}"))
    }

    pub fn parse_version(dir: &Utf8Path) -> Option<u32> {
        dir.file_name()?
            .strip_prefix(VERSION_DIR_PREFIX)?
            .parse()
            .ok()
            .filter(|version| *version > 0)
    }

    pub fn current_version(output_root: &Utf8Path) -> Result<u32, CollateError> {
        let mut version = 0;
        while Self::version_dir(output_root, version + 1).as_std_path().is_dir() {
            version += 1;
        }
        if version == 0 {
            return Err(CollateError::VersionNotFound(output_root.to_owned()));
        }
        Ok(version)
    }

    pub fn previous_dir(version_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let version = Self::parse_version(version_dir)?;
        if version < 2 {
            return None;
        }
        let parent = version_dir.parent()?;
        let previous = Self::version_dir(parent, version - 1);
        previous.as_std_path().is_dir().then_some(previous)
    }

    pub fn load_history(
        output_root: &Utf8Path,
        current: u32,
    ) -> Result<Vec<InputMetadata>, CollateError> {
        let mut history = Vec::with_capacity(current.saturating_sub(1) as usize);
        for version in 1..current {
            let path = Self::version_dir(output_root, version).join(METADATA_FILENAME);
            info!("reading metadata for version {version}");
            let meta = fs_util::read_json::<InputMetadata>(&path)
                .map_err(|err| match err {
                    CollateError::MetadataParse { reason, .. } | CollateError::Filesystem(reason) => {
                        CollateError::HistoryParse {
                            version,
                            path: path.clone(),
                            reason,
                        }
                    }
                    other => other,
                })?
                .ok_or_else(|| CollateError::HistoryMissing {
                    version,
                    path: path.clone(),
                })?;
            history.push(meta);
        }
        if !history.is_empty() {
            info!(
                "found {} metadata files from previous versions",
                history.len()
            );
        }
        Ok(history)
    }

    pub fn resolve(output_root: &Utf8Path) -> Result<ResolvedVersion, CollateError> {
        let number = Self::current_version(output_root)?;
        info!("version is {number}");
        let history = Self::load_history(output_root, number)?;
        Ok(ResolvedVersion {
            number,
            dir: Self::version_dir(output_root, number),
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_names() {
        assert_eq!(VersionResolver::parse_version(Utf8Path::new("out/upload_12")), Some(12));
        assert_eq!(VersionResolver::parse_version(Utf8Path::new("out/upload_0")), None);
        assert_eq!(VersionResolver::parse_version(Utf8Path::new("out/upload_x")), None);
        assert_eq!(VersionResolver::parse_version(Utf8Path::new("out/version_1")), None);
    }
}
