use std::fmt;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! internal_error {
    ($msg:expr) => {
        crate::Error::Internal {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Internal {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Position of an offending instruction inside the method being translated.
///
/// Renders as an empty string when the position is unknown, so it can be embedded
/// directly into error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location(pub Option<u32>);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(offset) => write!(f, " at offset {offset}"),
            None => Ok(()),
        }
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every error produced by the pipeline is fatal for the method being compiled. Soft
/// conditions, such as exception dispatchers that turn out to be unreachable, are never
/// reported through this type; they end up in the session's
/// [`crate::generator::EventLog`] instead.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The basic-block input graph is structurally broken
/// - [`Error::Translation`] - An instruction could not be translated
///
/// ## Compiler-internal Errors
/// - [`Error::Internal`] - An internal invariant was violated
/// - [`Error::Verification`] - The verifier rejected the graph after a stage
/// - [`Error::Folding`] - A method declared foldable could not be folded
///
/// ## Concurrency Errors
/// - [`Error::LockError`] - A method cache lock was poisoned
///
/// # Examples
///
/// ```rust
/// use cirgen::Error;
///
/// fn report(error: &Error) -> String {
///     match error {
///         Error::Translation { method, location, message } => {
///             format!("{method}{location}: {message}")
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input graph is damaged and could not be translated.
    ///
    /// This error indicates that the basic-block graph handed over by the decoding
    /// collaborator violates its contract, for example a successor index that points
    /// outside the block list. The error includes the source location where the
    /// malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A compiler-internal invariant was violated.
    ///
    /// Never user-recoverable: it signals a bug in one of the passes rather than
    /// a problem with the method being compiled.
    #[error("Internal - {file}:{line}: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Translating the stack-machine code of a method failed.
    ///
    /// Raised by the block translator for stack underflow, kind mismatches,
    /// control falling off the end of the method and inconsistent operand stacks
    /// at join points.
    #[error("Translation of {method} failed{location}: {message}")]
    Translation {
        /// Identity of the method being translated
        method: String,
        /// Offset of the offending instruction, if known
        location: Location,
        /// What went wrong
        message: String,
    },

    /// The verifier rejected the graph produced by a pipeline stage.
    #[error("Verification of {method} failed after {stage}: {message}")]
    Verification {
        /// Identity of the method being compiled
        method: String,
        /// Name of the stage whose output was rejected
        stage: String,
        /// The violated invariant
        message: String,
    },

    /// A method declared foldable could not be evaluated at compile time.
    #[error("Folding of {method} failed: {message}")]
    Folding {
        /// Identity of the foldable method
        method: String,
        /// Why folding failed
        message: String,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when a method cache lock was poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,
}
