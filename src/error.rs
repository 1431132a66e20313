use thiserror::Error;

use crate::program::InstructionId;

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

macro_rules! contract_violation {
    ($msg:expr) => {
        crate::Error::ContractViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::ContractViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// All of these are local-analysis failures. None of them is transient, so callers never
/// retry: a failing method is either skipped (when the engine is configured to continue)
/// or the whole run is aborted.
///
/// # Error Categories
///
/// ## Analysis Errors
/// - [`Error::StackUnderflow`] - An instruction popped from an empty simulated stack
/// - [`Error::Unsupported`] - A stack shape the engine does not model
///
/// ## Protocol Errors
/// - [`Error::ContractViolation`] - A duplication query was made with a foreign value
/// - [`Error::IllegalRemoval`] - An instruction with live results was about to be deleted
/// - [`Error::BranchTarget`] - A jump destination was about to be deleted
///
/// ## Model Errors
/// - [`Error::Malformed`] - An invalid type or method descriptor
/// - [`Error::InstructionNotFound`] - An instruction id that is not part of the method
/// - [`Error::ClassNotFound`] - A class name that is not part of the program
///
/// # Examples
///
/// ```rust
/// use classdeob::{analysis::MethodExecution, program::{CodeAssembler, Method, MethodAccessFlags}, Error};
///
/// let mut asm = CodeAssembler::new();
/// asm.pop();
/// let method = Method::new("broken", "()V", MethodAccessFlags::STATIC)?
///     .with_code(asm.finish()?);
///
/// match MethodExecution::run(&method) {
///     Err(Error::StackUnderflow { pc, mnemonic }) => println!("{mnemonic} at {pc} underflowed"),
///     Err(e) => println!("Other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// # Ok::<(), classdeob::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An instruction tried to pop from an empty simulated stack.
    ///
    /// The instruction sequence is inconsistent (or relies on control flow the linear
    /// walk does not follow). Fatal to the analysis of the current method.
    #[error("Stack underflow executing '{mnemonic}' at pc {pc}")]
    StackUnderflow {
        /// Program counter of the failing instruction
        pc: u32,
        /// Mnemonic of the failing instruction
        mnemonic: &'static str,
    },

    /// A duplication capability was used outside of its contract.
    ///
    /// Raised when `original`/`other_branch` receive a value that was not pushed by
    /// the queried instruction, or when the producing context did not push exactly two
    /// values. This is a bug in the calling pass, which must stop immediately.
    #[error("Contract violation - {file}:{line}: {message}")]
    ContractViolation {
        /// Description of the violated precondition
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An instruction whose pushed values are still consumed was about to be deleted.
    #[error("Illegal removal of '{mnemonic}' at pc {pc}: {live_consumers} live consumer(s)")]
    IllegalRemoval {
        /// Program counter of the instruction
        pc: u32,
        /// Mnemonic of the instruction
        mnemonic: &'static str,
        /// Number of contexts still consuming the instruction's results
        live_consumers: usize,
    },

    /// An instruction some branch jumps to was about to be deleted.
    #[error("Refusing to remove '{mnemonic}' at pc {pc}: it is a branch target")]
    BranchTarget {
        /// Program counter of the instruction
        pc: u32,
        /// Mnemonic of the instruction
        mnemonic: &'static str,
    },

    /// A descriptor or model structure is damaged and could not be interpreted.
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

    /// The stack shape is valid bytecode but not modelled by the engine.
    #[error("Unsupported - {0}")]
    Unsupported(String),

    /// The instruction id does not belong to the method being transformed.
    #[error("Instruction {0} not found")]
    InstructionNotFound(InstructionId),

    /// The class is not part of the program.
    #[error("Class '{0}' not found")]
    ClassNotFound(String),
}
