use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CollateError {
    #[error("invalid target name: {0}")]
    InvalidTargetName(String),

    #[error("invalid crystal tag: {0:?}")]
    InvalidTag(String),

    #[error("missing config file {0}")]
    MissingConfig(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("validation failed with {errors} error(s)")]
    #[diagnostic(help("run with --validate to list the problems without touching the output tree"))]
    Validation { errors: usize },

    #[error("no version directory found in {0}")]
    #[diagnostic(help("create the first version directory named upload_1"))]
    VersionNotFound(Utf8PathBuf),

    #[error("metadata for version {version} not found at {path}")]
    HistoryMissing { version: u32, path: Utf8PathBuf },

    #[error("metadata for version {version} at {path} is unreadable: {reason}")]
    HistoryParse {
        version: u32,
        path: Utf8PathBuf,
        reason: String,
    },

    #[error("failed to ingest {source_path} for {tag}: {reason}")]
    Ingestion {
        tag: String,
        source_path: Utf8PathBuf,
        reason: String,
    },

    #[error("failed to parse metadata document {path}: {reason}")]
    MetadataParse { path: Utf8PathBuf, reason: String },

    #[error("failed to parse alignment state document {path}: {reason}")]
    StateParse { path: Utf8PathBuf, reason: String },

    #[error("alignment state is inconsistent: {}", .0.join("; "))]
    InconsistentState(Vec<String>),

    #[error("dataset {0} is not new or updated in this version; its previous alignment must be reused")]
    ReuseViolation(String),

    #[error("component extraction failed: {0}")]
    Extraction(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
