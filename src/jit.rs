use crate::assembler::Assembler;
use crate::error::Result;
use crate::interpreter::TAPE_SIZE;
use crate::mmap::MemoryMap;
use crate::opcode::Opcode;

/// Default size of the executable code buffer, matching the reference implementation.
pub const DEFAULT_BUFFER_SIZE: usize = 65_536;

/// Compiles an opcode program straight to x86-64 machine code and runs it in-process.
///
/// Unlike the interpreter and virtual machine, the JIT never walks the opcode slice at
/// run time: every opcode is lowered once, during [`JitCompiler::execute`], into a
/// fixed instruction sequence that operates on `rbx` as the tape pointer. Loop bodies
/// become native `je`/`jne` branches emitted by [`Assembler`], whose own bracket stack
/// resolves nesting — the compiler does not need to pre-scan for matching brackets the
/// way a two-pass assembler would, because `Jf` always precedes its `Jt` in program
/// order.
pub struct JitCompiler<'a> {
    program: &'a [Opcode],
    buffer_size: usize,
}

impl<'a> JitCompiler<'a> {
    /// Creates a JIT compiler for `program` with the default code buffer size.
    pub fn new(program: &'a [Opcode]) -> Self {
        Self {
            program,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Overrides the code buffer size. Useful for programs long enough to overflow the
    /// default, or for exercising the overflow error path in tests.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Emits machine code for the program and runs it against `tape`, which must
    /// already be in whatever state the caller wants it to start in (the driver zeroes
    /// it before every run).
    pub fn execute(self, tape: &mut [u8; TAPE_SIZE]) -> Result<()> {
        let mut writable = MemoryMap::new(self.buffer_size)?;

        {
            let mut asm = Assembler::new(writable.get_mut());
            emit_prologue(&mut asm, tape.as_mut_ptr())?;
            for opcode in self.program {
                emit_opcode(&mut asm, *opcode)?;
            }
            emit_epilogue(&mut asm)?;
        }

        let executable = writable.set_executable()?;

        // SAFETY: the bytes just written are a self-contained function starting with a
        // standard prologue and ending in `ret`; it clobbers only registers it first
        // pushed and restores them before returning, so the caller's register state is
        // preserved across the call.
        unsafe { executable.execute() };

        Ok(())
    }
}

/// `push rbp; mov rbp, rsp`, saves the registers the body clobbers, and loads the
/// tape's address into `rbx`.
fn emit_prologue(asm: &mut Assembler, tape: *mut u8) -> Result<()> {
    asm.emit(&[0x55])?; // push rbp
    asm.emit(&[0x48, 0x89, 0xe5])?; // mov rbp, rsp

    asm.emit(&[0x57])?; // push rdi
    asm.emit(&[0x56])?; // push rsi
    asm.emit(&[0x53])?; // push rbx
    asm.emit(&[0x52])?; // push rdx
    asm.emit(&[0x51])?; // push rcx
    asm.emit(&[0x50])?; // push rax

    asm.emit(&[0x48, 0xbb])?; // movabs $tape, %rbx
    asm.emit_u64(tape as u64)
}

/// Restores the registers [`emit_prologue`] saved, tears down the frame, and returns.
fn emit_epilogue(asm: &mut Assembler) -> Result<()> {
    asm.emit(&[0x58])?; // pop rax
    asm.emit(&[0x59])?; // pop rcx
    asm.emit(&[0x5a])?; // pop rdx
    asm.emit(&[0x5b])?; // pop rbx
    asm.emit(&[0x5e])?; // pop rsi
    asm.emit(&[0x5f])?; // pop rdi
    asm.emit(&[0x5d])?; // pop rbp
    asm.emit(&[0xc3]) // ret
}

/// Lowers one opcode to its native instruction sequence. `rbx` always holds the tape
/// pointer coming in and going out of this call.
fn emit_opcode(asm: &mut Assembler, opcode: Opcode) -> Result<()> {
    match opcode {
        Opcode::Add(n) => {
            if n != 0 {
                asm.emit(&[0x80, 0x03, n])?; // addb $n, (%rbx)
            }
        }
        Opcode::Sub(n) => {
            if n != 0 {
                asm.emit(&[0x80, 0x2b, n])?; // subb $n, (%rbx)
            }
        }
        Opcode::AddP(n) => {
            asm.emit(&[0x48, 0x81, 0xc3])?; // add $n, %rbx
            asm.emit_u32(n)?;
        }
        Opcode::SubP(n) => {
            asm.emit(&[0x48, 0x81, 0xeb])?; // sub $n, %rbx
            asm.emit_u32(n)?;
        }
        Opcode::SetZ => {
            asm.emit(&[0xc6, 0x03, 0x00])?; // movb $0, (%rbx)
        }
        Opcode::Jf(_) => {
            asm.emit(&[0x8a, 0x03])?; // mov (%rbx), %al
            asm.emit(&[0x84, 0xc0])?; // test %al, %al
            asm.je()?;
        }
        Opcode::Jt(_) => {
            asm.emit(&[0x8a, 0x03])?; // mov (%rbx), %al
            asm.emit(&[0x84, 0xc0])?; // test %al, %al
            asm.jne()?;
        }
        Opcode::In => {
            asm.emit(&[0x48, 0xb8])?; // movabs $getchar, %rax
            asm.emit_u64(libc::getchar as usize as u64)?;
            asm.emit(&[0xff, 0xd0])?; // callq *%rax
            asm.emit(&[0x88, 0x03])?; // mov %al, (%rbx)
        }
        Opcode::Out => {
            asm.emit(&[0x48, 0xb8])?; // movabs $putchar, %rax
            asm.emit_u64(libc::putchar as usize as u64)?;
            #[cfg(windows)]
            asm.emit(&[0x0f, 0xbe, 0x0b])?; // movsbl (%rbx), %ecx
            #[cfg(not(windows))]
            asm.emit(&[0x0f, 0xbe, 0x3b])?; // movsbl (%rbx), %edi
            asm.emit(&[0xff, 0xd0])?; // callq *%rax
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::io::FromRawFd;
    use std::sync::Mutex;

    use crate::interpreter::TAPE_SIZE;
    use crate::scanner::Scanner;

    use super::JitCompiler;

    // Brainfuck programs write directly to the process's stdout file descriptor via
    // `putchar`, bypassing Rust's `io::stdout()`, so capturing output means swapping
    // the raw fd rather than anything `std::io` exposes. Serialized because it mutates
    // process-global file descriptor state.
    static STDOUT_REDIRECT: Mutex<()> = Mutex::new(());

    fn run(source: &str) -> Vec<u8> {
        let _guard = STDOUT_REDIRECT.lock().unwrap();

        let program = Scanner::new(source).scan().unwrap();
        let mut tape = [0u8; TAPE_SIZE];

        let mut pipe_fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(pipe_fds.as_mut_ptr()) }, 0);
        let (read_fd, write_fd) = (pipe_fds[0], pipe_fds[1]);

        let saved_stdout = unsafe { libc::dup(1) };
        assert!(saved_stdout >= 0);
        assert_eq!(unsafe { libc::dup2(write_fd, 1) }, 1);
        unsafe { libc::close(write_fd) };

        JitCompiler::new(&program).execute(&mut tape).unwrap();

        unsafe {
            libc::fflush(std::ptr::null_mut());
            libc::dup2(saved_stdout, 1);
            libc::close(saved_stdout);
        }

        let mut captured = Vec::new();
        let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
        file.read_to_end(&mut captured).unwrap();
        captured
    }

    #[test]
    fn scenario_multiply_by_constant() {
        assert_eq!(run("++++++++[>++++++++<-]>+."), vec![b'A']);
    }

    #[test]
    fn scenario_nested_multiply() {
        assert_eq!(run("+++++[>+++++[>++<-]<-]>>."), vec![b'2']);
    }

    #[test]
    fn scenario_move_accumulate() {
        assert_eq!(run("++>+++<[->+<]>."), vec![5]);
    }

    #[test]
    fn setz_peephole_clears_cell() {
        assert_eq!(run("+[-]+."), vec![1]);
    }

    #[test]
    fn hello_world_program() {
        let out = run(include_str!("../programs/hello_world.b"));
        assert_eq!(String::from_utf8(out).unwrap(), "Hello World!\n");
    }

    #[test]
    fn bitwidth_program() {
        let out = run(include_str!("../programs/bitwidth.b"));
        assert_eq!(String::from_utf8(out).unwrap(), "Hello World! 255\n");
    }

    #[test]
    fn agrees_with_interpreter_and_virtual_machine() {
        use std::io;

        use crate::interpreter::Interpreter;
        use crate::virtual_machine::VirtualMachine;
        use crate::FlushBehavior;

        for source in [
            "++++++++[>++++++++<-]>+.",
            "+++++[>+++++[>++<-]<-]>>.",
            "++>+++<[->+<]>.",
            "+[-]+.",
            include_str!("../programs/hello_world.b"),
            include_str!("../programs/bitwidth.b"),
        ] {
            let program = Scanner::new(source).scan().unwrap();

            let mut reader = io::empty();
            let mut interpreter_out = Vec::new();
            Interpreter::new(&program, &mut reader, &mut interpreter_out)
                .execute(FlushBehavior::OnEnd)
                .unwrap();

            let mut reader = io::empty();
            let mut vm_out = Vec::new();
            VirtualMachine::new(&program, &mut reader, &mut vm_out)
                .execute(FlushBehavior::OnEnd)
                .unwrap();

            let jit_out = run(source);

            assert_eq!(interpreter_out, vm_out, "source: {source}");
            assert_eq!(interpreter_out, jit_out, "source: {source}");
        }
    }

    #[test]
    fn undersized_buffer_reports_overflow() {
        let program = Scanner::new(include_str!("../programs/hello_world.b"))
            .scan()
            .unwrap();
        let mut tape = [0u8; TAPE_SIZE];
        let err = JitCompiler::new(&program)
            .with_buffer_size(16)
            .execute(&mut tape)
            .unwrap_err();
        assert!(err.to_string().starts_with("code buffer overflow"));
    }
}
