/// A single lowered Brainfuck instruction.
///
/// The scanner coalesces runs of `+`/`-`/`>`/`<` into one opcode each, so `num` carries
/// a run length rather than a single-step count. `Jf`/`Jt` carry the opcode index of
/// their matching bracket instead of a byte offset — the interpreter and the virtual
/// machine both index directly into the opcode slice, and the JIT re-derives an x86-64
/// branch displacement from the bracket nesting as it emits, not from these indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// `tape[p] += n` (mod 256). Run-length is pre-reduced mod 256 by the scanner.
    Add(u8),
    /// `tape[p] -= n` (mod 256). Run-length is pre-reduced mod 256 by the scanner.
    Sub(u8),
    /// `p += n`. Unbounded 32-bit run length.
    AddP(u32),
    /// `p -= n`. Unbounded 32-bit run length.
    SubP(u32),
    /// `tape[p] = 0`. Peephole for the `[-]` idiom.
    SetZ,
    /// `if tape[p] == 0 { ip = num }` — the index of the matching `Jt`.
    Jf(u32),
    /// `if tape[p] != 0 { ip = num }` — the index of the matching `Jf`.
    Jt(u32),
    /// Read one byte from the configured input into `tape[p]`.
    In,
    /// Write `tape[p]` to the configured output.
    Out,
}

/// A parsed, bracket-resolved opcode stream.
///
/// Invariant: for every index `i` where `program[i]` is `Jf(t)`, `program[t]` is
/// `Jt(i)`, and vice versa. The scanner is the only producer of this invariant; nothing
/// downstream may construct a [`Program`] that violates it.
pub type Program = Vec<Opcode>;
