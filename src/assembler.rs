use crate::error::{Error, Result};

/// An append-only byte writer over a fixed-size buffer, with one semantic helper for
/// the bracket-branch pattern Brainfuck needs.
///
/// The JIT uses this directly over the executable region it has mapped (see
/// [`crate::mmap`]), so instructions land in their final, position-independent home as
/// they are emitted — there is no separate relocation pass.
pub struct Assembler<'a> {
    buf: &'a mut [u8],
    cursor: usize,
    brackets: Vec<usize>,
}

impl<'a> Assembler<'a> {
    /// Wraps `buf` for emission starting at offset 0.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            brackets: Vec::new(),
        }
    }

    /// Number of bytes emitted so far.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Appends a literal byte sequence, failing if it would overrun the buffer.
    pub fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self
            .cursor
            .checked_add(bytes.len())
            .expect("code buffer cursor overflowed usize");

        if end > self.buf.len() {
            return Err(Error::CodeBufferOverflow {
                minimum: end,
                capacity: self.buf.len(),
            });
        }

        self.buf[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    pub fn emit_u8(&mut self, value: u8) -> Result<()> {
        self.emit(&value.to_le_bytes())
    }

    pub fn emit_u16(&mut self, value: u16) -> Result<()> {
        self.emit(&value.to_le_bytes())
    }

    pub fn emit_u32(&mut self, value: u32) -> Result<()> {
        self.emit(&value.to_le_bytes())
    }

    pub fn emit_u64(&mut self, value: u64) -> Result<()> {
        self.emit(&value.to_le_bytes())
    }

    /// `je` (`0F 84`) — jump if equal (`ZF=1`). Appends the opcode plus a 32-bit
    /// relative-displacement placeholder and pushes the address just past it onto the
    /// bracket stack, to be patched by the matching [`Assembler::jne`].
    pub fn je(&mut self) -> Result<()> {
        self.emit(&[0x0f, 0x84, 0x00, 0x00, 0x00, 0x00])?;
        self.brackets.push(self.cursor);
        Ok(())
    }

    /// `jne` (`0F 85`) — jump if not equal (`ZF=0`). Pops the matching `je` cursor and
    /// patches both placeholders: `je` jumps forward, past this `jne`, to skip the loop
    /// body; `jne` jumps backward, past the matching `je`, to re-enter it.
    ///
    /// Brainfuck brackets are always properly nested and the scanner only ever emits a
    /// `Jf`/`Jt` pair it has itself balanced, so a `jne` with nothing on the bracket
    /// stack is a bug in the emitter, not a malformed Brainfuck program — this panics
    /// rather than returning a [`crate::error::Error`].
    pub fn jne(&mut self) -> Result<()> {
        self.emit(&[0x0f, 0x85, 0x00, 0x00, 0x00, 0x00])?;
        let je_next = self.brackets.pop().expect("jne with no matching je");
        let jne_next = self.cursor;

        let forward = (jne_next - je_next) as i32;
        let backward = -(forward);

        self.buf[je_next - 4..je_next].copy_from_slice(&forward.to_le_bytes());
        self.buf[jne_next - 4..jne_next].copy_from_slice(&backward.to_le_bytes());
        Ok(())
    }
}
