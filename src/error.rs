use thiserror::Error;

/// Failures that can occur while scanning, assembling, or executing a Brainfuck program.
///
/// Every leaf operation that the spec calls out as having no local recovery path
/// (syntax errors, buffer overflow, allocation failure) gets its own variant so a
/// caller embedding this crate can match on failure kind instead of parsing a string;
/// the binary crate is the one that turns these into a printed message and a process exit.
#[derive(Debug, Error)]
pub enum Error {
    /// A `]` was scanned with no corresponding open `[` on the bracket stack.
    #[error("unmatched ']' at line {line}")]
    UnmatchedCloseBracket { line: u32 },

    /// Scanning finished with unresolved `[` still on the bracket stack.
    #[error("unmatched '[' at line {line}")]
    UnmatchedOpenBracket { line: u32 },

    /// JIT emission would have written past the end of the executable buffer.
    #[error(
        "code buffer overflow: emission requires at least {minimum} bytes, buffer holds {capacity}"
    )]
    CodeBufferOverflow { minimum: usize, capacity: usize },

    /// The host refused to map an executable page.
    #[error("failed to map executable memory: {0}")]
    Mmap(#[source] std::io::Error),

    /// The host refused to flip a mapped page's protection bits.
    #[error("failed to change memory protection: {0}")]
    Mprotect(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
