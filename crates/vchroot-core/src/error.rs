use libc::c_int;

/// Recoverable failures introduced by translation or root activation.
///
/// Each maps onto the errno the wrapped call would have used for an
/// equivalent native failure, so callers need no new error handling.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("path too long after translation: {len} bytes exceeds {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("path contains an interior NUL byte")]
    InteriorNul,

    #[error("a virtual root is already active at {root}")]
    AlreadyActive { root: String },

    #[error("a cross root is required but none is configured")]
    CrossRootMissing,

    #[error("library search path too long: {len} bytes exceeds {max}")]
    LibraryPathTooLong { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    /// errno to report through the wrapped call's error channel.
    pub fn errno(&self) -> c_int {
        match self {
            TranslateError::NameTooLong { .. } => libc::ENAMETOOLONG,
            TranslateError::InteriorNul => libc::EINVAL,
            TranslateError::AlreadyActive { .. } => libc::EFAULT,
            TranslateError::CrossRootMissing => libc::EFAULT,
            TranslateError::LibraryPathTooLong { .. } => libc::ENAMETOOLONG,
            TranslateError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// The real implementation of an intercepted name could not be found.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot resolve real symbol `{name}`")]
    Missing { name: String },

    #[error("`{name}` is not an intercepted call")]
    Unknown { name: String },
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
