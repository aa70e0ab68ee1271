use std::io::{self, Read, Write};

use crate::opcode::Opcode;
use crate::FlushBehavior;

/// Cell count of the Brainfuck tape: 0x20000, matching the reference implementation.
pub const TAPE_SIZE: usize = 0x20000;

/// Executes an opcode program directly, without compiling it.
///
/// This is the semantic reference the JIT is validated against: for any legal program
/// and any input byte stream, [`Interpreter::execute`] and the JIT must produce
/// identical output. It is also the portable fallback on non-x86-64 hosts.
pub struct Interpreter<'a, R, W> {
    program: &'a [Opcode],
    ip: usize,
    tape: Box<[u8; TAPE_SIZE]>,
    dp: usize,
    reader: &'a mut R,
    writer: &'a mut W,
}

impl<'a, R, W> Interpreter<'a, R, W>
where
    R: Read,
    W: Write,
{
    /// Creates an interpreter over `program`, reading input from `reader` and writing
    /// output to `writer`. The tape is zero-initialized.
    pub fn new(program: &'a [Opcode], reader: &'a mut R, writer: &'a mut W) -> Self {
        Self {
            program,
            ip: 0,
            tape: Box::new([0; TAPE_SIZE]),
            dp: 0,
            reader,
            writer,
        }
    }

    /// Runs the program to completion, returning an error if reading from `reader` or
    /// writing to `writer` fails.
    pub fn execute(&mut self, flush: FlushBehavior) -> io::Result<()> {
        while self.ip < self.program.len() {
            match self.program[self.ip] {
                Opcode::Add(n) => self.tape[self.dp] = self.tape[self.dp].wrapping_add(n),
                Opcode::Sub(n) => self.tape[self.dp] = self.tape[self.dp].wrapping_sub(n),
                Opcode::AddP(n) => self.dp = self.dp.wrapping_add(n as usize),
                Opcode::SubP(n) => self.dp = self.dp.wrapping_sub(n as usize),
                Opcode::SetZ => self.tape[self.dp] = 0,
                Opcode::Jf(idx) => {
                    if self.tape[self.dp] == 0 {
                        self.ip = idx as usize;
                    }
                }
                Opcode::Jt(idx) => {
                    if self.tape[self.dp] != 0 {
                        self.ip = idx as usize;
                    }
                }
                Opcode::In => self.tape[self.dp] = read_byte(self.reader)?,
                Opcode::Out => {
                    self.writer.write_all(&self.tape[self.dp..self.dp + 1])?;
                    if flush == FlushBehavior::OnWrite {
                        self.writer.flush()?;
                    }
                }
            }

            self.ip += 1;
        }

        if flush == FlushBehavior::OnEnd {
            self.writer.flush()
        } else {
            Ok(())
        }
    }
}

/// Reads one byte, matching the `getchar` contract: on EOF the sentinel `-1`
/// (truncated to a byte, `0xFF`) is returned rather than an error.
pub(crate) fn read_byte<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    match reader.read(&mut buf)? {
        0 => Ok(0xFF),
        _ => Ok(buf[0]),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use crate::scanner::Scanner;
    use crate::FlushBehavior;

    use super::Interpreter;

    fn run(source: &str, input: &[u8]) -> Vec<u8> {
        let program = Scanner::new(source).scan().unwrap();
        let mut reader = Cursor::new(input.to_vec());
        let mut writer = Vec::new();
        Interpreter::new(&program, &mut reader, &mut writer)
            .execute(FlushBehavior::OnEnd)
            .unwrap();
        writer
    }

    #[test]
    fn pointer_and_cell_arithmetic() {
        let program = Scanner::new(">>><<+++--").scan().unwrap();
        let mut reader = io::empty();
        let mut writer = Vec::new();
        let mut interp = Interpreter::new(&program, &mut reader, &mut writer);
        interp.execute(FlushBehavior::OnEnd).unwrap();
        assert_eq!(interp.dp, 1);
        assert_eq!(interp.tape[1], 1);
    }

    #[test]
    fn cell_arithmetic_wraps() {
        let program = Scanner::new("-").scan().unwrap();
        let mut reader = io::empty();
        let mut writer = Vec::new();
        let mut interp = Interpreter::new(&program, &mut reader, &mut writer);
        interp.execute(FlushBehavior::OnEnd).unwrap();
        assert_eq!(interp.tape[0], 255);
    }

    #[test]
    fn eof_stores_sentinel_byte() {
        let out = run(",.", &[]);
        assert_eq!(out, vec![0xFF]);
    }

    #[test]
    fn loop_skipped_when_cell_is_zero() {
        let out = run("[+]", &[]);
        assert_eq!(out, Vec::<u8>::new());
    }

    #[test]
    fn loop_reenters_while_cell_nonzero() {
        assert_eq!(run("++[.-]", &[]), vec![2, 1]);
    }

    #[test]
    fn setz_peephole_clears_cell() {
        assert_eq!(run("+[-]+.", &[]), vec![1]);
    }

    #[test]
    fn scenario_multiply_by_constant() {
        assert_eq!(run("++++++++[>++++++++<-]>+.", &[]), vec![b'A']);
    }

    #[test]
    fn scenario_nested_multiply() {
        assert_eq!(run("+++++[>+++++[>++<-]<-]>>.", &[]), vec![b'2']);
    }

    #[test]
    fn scenario_echo_input() {
        assert_eq!(run(",.", b"Z"), vec![b'Z']);
    }

    #[test]
    fn scenario_move_accumulate() {
        assert_eq!(run("++>+++<[->+<]>.", &[]), vec![5]);
    }

    #[test]
    fn hello_world_program() {
        let out = run(include_str!("../programs/hello_world.b"), &[]);
        assert_eq!(String::from_utf8(out).unwrap(), "Hello World!\n");
    }

    #[test]
    fn bitwidth_program() {
        let out = run(include_str!("../programs/bitwidth.b"), &[]);
        assert_eq!(String::from_utf8(out).unwrap(), "Hello World! 255\n");
    }

    #[test]
    fn setz_peephole_independence() {
        let program_with = Scanner::new("+[-]+.").scan().unwrap();
        let program_without = Scanner::new("+[-]+.")
            .with_setz_peephole(false)
            .scan()
            .unwrap();

        for program in [program_with, program_without] {
            let mut reader = io::empty();
            let mut writer = Vec::new();
            Interpreter::new(&program, &mut reader, &mut writer)
                .execute(FlushBehavior::OnEnd)
                .unwrap();
            assert_eq!(writer, vec![1]);
        }
    }
}
