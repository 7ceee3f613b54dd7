//! # vchroot-core
//!
//! Path virtualization engine behind the vchroot inception layer.
//!
//! - [`root`]: the process-wide virtual root and its one-shot activation
//! - [`path`]: `expand` / `narrow` between virtual and real paths
//! - [`shadow`]: synthetic ownership and device attributes
//! - [`resolver`]: cached next-in-scope symbol lookup
//! - [`facade`]: the call-signature table and the generic adapter
//! - [`context`]: the process context tying them together
//!
//! Nothing here is `extern "C"`; the inception layer owns the ABI surface.

pub mod context;
pub mod error;
pub mod facade;
pub mod path;
pub mod resolver;
pub mod root;
pub mod shadow;

pub use context::Context;
pub use error::{ResolveError, TranslateError};
pub use facade::{
    signature, CallShape, CallSignature, Facade, FailureReturn, PathArg, PathResult, Prepared,
    Privileged, ShadowEffect, ShadowRequest, CALL_TABLE,
};
pub use path::{clean, normalize, CwdSource, PathBuffer, PathPolicy, Translator, MAX_PATH};
pub use root::{Environ, ProcessEnviron, RootConfig, RootState};
pub use shadow::{ShadowAttributeEntry, ShadowStore, StatFields};
