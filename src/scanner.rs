use crate::error::{Error, Result};
use crate::opcode::{Opcode, Program};

/// Lowers Brainfuck source text into a bracket-resolved [`Program`].
///
/// A single linear scan coalesces runs of `+ - > <` into one opcode each and resolves
/// `[ ]` pairs through a LIFO bracket stack, so no second pass over the source is
/// needed: by the time a `]` is scanned, the index of its matching `[` is already
/// known, and the reverse link is patched in immediately.
pub struct Scanner<'a> {
    code: &'a [u8],
    setz_peephole: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over `code` with the `[-]` → `SetZ` peephole enabled.
    pub fn new(code: &'a str) -> Self {
        Self {
            code: code.as_bytes(),
            setz_peephole: true,
        }
    }

    /// Controls whether the literal substring `[-]` is folded into a single `SetZ`
    /// opcode. Disabling this is useful for exercising the bracket-branch path of the
    /// interpreter/JIT on what would otherwise be peephole-eliminated loops.
    pub fn with_setz_peephole(mut self, enabled: bool) -> Self {
        self.setz_peephole = enabled;
        self
    }

    /// Scans the source, returning the resolved opcode program or the first syntax
    /// error encountered (unmatched `]`) / detected (unmatched `[`, only knowable once
    /// the whole source has been consumed).
    pub fn scan(mut self) -> Result<Program> {
        let mut program = Program::new();
        let mut brackets: Vec<(usize, u32)> = Vec::new();
        let mut line: u32 = 0;
        let mut i = 0;

        while i < self.code.len() {
            match self.code[i] {
                b'+' => {
                    let n = self.consume_run(&mut i, b'+');
                    program.push(Opcode::Add((n % 256) as u8));
                }
                b'-' => {
                    let n = self.consume_run(&mut i, b'-');
                    program.push(Opcode::Sub((n % 256) as u8));
                }
                b'>' => {
                    let n = self.consume_run(&mut i, b'>');
                    program.push(Opcode::AddP(n));
                }
                b'<' => {
                    let n = self.consume_run(&mut i, b'<');
                    program.push(Opcode::SubP(n));
                }
                b'[' => {
                    if self.setz_peephole
                        && self.code.get(i + 1) == Some(&b'-')
                        && self.code.get(i + 2) == Some(&b']')
                    {
                        program.push(Opcode::SetZ);
                        i += 3;
                    } else {
                        brackets.push((program.len(), line));
                        program.push(Opcode::Jf(0));
                        i += 1;
                    }
                }
                b']' => {
                    let (open, _) = brackets
                        .pop()
                        .ok_or(Error::UnmatchedCloseBracket { line })?;
                    let jt_index = program.len() as u32;
                    program[open] = Opcode::Jf(jt_index);
                    program.push(Opcode::Jt(open as u32));
                    i += 1;
                }
                b',' => {
                    program.push(Opcode::In);
                    i += 1;
                }
                b'.' => {
                    program.push(Opcode::Out);
                    i += 1;
                }
                b'\n' => {
                    line += 1;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        if let Some(&(_, open_line)) = brackets.first() {
            return Err(Error::UnmatchedOpenBracket { line: open_line });
        }

        Ok(program)
    }

    /// Advances `i` past a maximal run of `ch`, returning the run length.
    fn consume_run(&self, i: &mut usize, ch: u8) -> u32 {
        let mut n: u32 = 0;
        while self.code.get(*i) == Some(&ch) {
            n = n.wrapping_add(1);
            *i += 1;
        }
        n
    }
}
