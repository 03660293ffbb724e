use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid archive {filename}: {reason}")]
    InvalidArchive { filename: String, reason: String },
    #[error("missing required files: {}", missing.join(", "))]
    MissingRequiredFiles { missing: Vec<String> },
    #[error("archive holds {0} more than once")]
    DuplicateEntry(String),
    #[error("archive entry escapes the bundle root: {0}")]
    UnsafePath(String),
    #[error("archive expands to more than {max} bytes")]
    ArchiveTooLarge { max: u64 },
    #[error("archive has more than {max} entries")]
    TooManyEntries { max: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
