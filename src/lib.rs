pub mod aligner;
pub mod assembler;
pub mod collator;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod history;
pub mod ingest;
pub mod metadata;
pub mod output;
pub mod report;
pub mod state;
pub mod validator;
pub mod version;
