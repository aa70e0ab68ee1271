use std::fs::File;
use std::io::{self, Read};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use argh::FromArgs;

use bfjit::interpreter::{Interpreter, TAPE_SIZE};
use bfjit::jit::JitCompiler;
use bfjit::scanner::Scanner;
use bfjit::virtual_machine::VirtualMachine;
use bfjit::FlushBehavior;

/// Execute a Brainfuck source file with the interpreter, the JIT compiler, or both.
#[derive(FromArgs, Debug)]
struct Args {
    /// run the interpreter
    #[argh(switch, short = 'i')]
    interpreter: bool,

    /// run the JIT compiler
    #[argh(switch, short = 'j')]
    jit: bool,

    /// run the bytecode virtual machine (`vm`) instead of, or alongside, -i/-j
    #[argh(option)]
    env: Option<Environment>,

    /// print wall-clock time usage for each backend that ran
    #[argh(switch, short = 't')]
    time: bool,

    /// the brainfuck program to execute
    #[argh(positional)]
    file: String,
}

#[derive(Debug)]
enum Environment {
    VirtualMachine,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(Environment::VirtualMachine),
            _ => Err(r#"valid values: `vm`"#.to_string()),
        }
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    if !args.interpreter && !args.jit && args.env.is_none() {
        bail!("please choose at least one of -i, -j, or --env vm\n\nusage:\n  bfjit [-i] [-j] [--env vm] [-t] <filename>");
    }

    let mut source = String::new();
    File::open(&args.file)
        .with_context(|| format!("failed to open file {}", args.file))?
        .read_to_string(&mut source)
        .with_context(|| format!("failed to read file {}", args.file))?;

    let program = Scanner::new(&source)
        .scan()
        .with_context(|| format!("syntax error in {}", args.file))?;

    if args.interpreter {
        run_timed("interpreter", args.time, || run_interpreter(&program))?;
    }

    if matches!(args.env, Some(Environment::VirtualMachine)) {
        run_timed("vm", args.time, || run_virtual_machine(&program))?;
    }

    if args.jit {
        run_timed("jit", args.time, || run_jit_compiler(&program))?;
    }

    Ok(())
}

/// Runs `f`, optionally reporting its wall-clock duration the way the reference
/// implementation prints a `"... time usage: ...s"` line. Purely informational: it is
/// never load-bearing for correctness and never affects the exit status.
fn run_timed(label: &str, time: bool, f: impl FnOnce() -> Result<()>) -> Result<()> {
    let start = Instant::now();
    f()?;
    if time {
        eprintln!("{label} time usage: {:.6}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn run_interpreter(program: &[bfjit::opcode::Opcode]) -> Result<()> {
    Interpreter::new(program, &mut io::stdin().lock(), &mut io::stdout().lock())
        .execute(FlushBehavior::OnWrite)
        .context("failed to execute the program with the interpreter")
}

fn run_virtual_machine(program: &[bfjit::opcode::Opcode]) -> Result<()> {
    VirtualMachine::new(program, &mut io::stdin().lock(), &mut io::stdout().lock())
        .execute(FlushBehavior::OnWrite)
        .context("failed to execute the program on the virtual machine")
}

fn run_jit_compiler(program: &[bfjit::opcode::Opcode]) -> Result<()> {
    let mut tape = Box::new([0u8; TAPE_SIZE]);
    JitCompiler::new(program)
        .execute(&mut tape)
        .context("failed to execute the program with the jit compiler")
}
