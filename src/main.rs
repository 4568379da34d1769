//! Universal Machine Emulator - CLI Entry Point
//!
//! Commands:
//! - `um-emu <image>` - Run a program image to completion
//! - `um-emu run <image>` - Run with tracing / limits / state dump
//! - `um-emu debug <image>` - Interactive debugger
//! - `um-emu asm <source>` - Assemble to a `.um` image
//! - `um-emu disasm <image>` - Disassemble an image

use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Parser)]
#[command(name = "um-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator for the 32-bit segmented Universal Machine")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Program image to run until it halts
    program: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the `.um` image (or `.asm` source) to execute
        program: PathBuf,
        /// Print every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Write a JSON snapshot of the final machine state to this path
        #[arg(long)]
        dump_state: Option<PathBuf>,
    },
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the `.um` image (or `.asm` source) to debug
        program: PathBuf,
        /// File whose bytes feed the program's Input instructions
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Assemble source to a `.um` image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the `.um` image
        image: PathBuf,
    },
    /// Run the built-in self-test
    Test,
}

/// Options for a single run.
#[derive(Default)]
struct RunOptions {
    trace: bool,
    max_cycles: Option<u64>,
    dump_state: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    match (cli.command, cli.program) {
        (Some(Commands::Run { program, trace, max_cycles, dump_state }), _) => {
            run_program(&program, RunOptions { trace, max_cycles, dump_state });
        }
        #[cfg(feature = "tui")]
        (Some(Commands::Debug { program, input }), _) => {
            debug_program(&program, input.as_deref());
        }
        (Some(Commands::Asm { source, output }), _) => {
            assemble_file(&source, output);
        }
        (Some(Commands::Disasm { image }), _) => {
            disassemble_file(&image);
        }
        (Some(Commands::Test), _) => {
            run_self_test();
        }
        (None, Some(program)) => {
            run_program(&program, RunOptions::default());
        }
        (None, None) => {
            eprintln!("um-emu: expected exactly one program image");
            eprintln!("{}", Cli::command().render_usage());
            exit(1);
        }
    }
}

/// Read a program as words, assembling `.asm` sources on the fly.
fn load_words(path: &Path) -> Vec<um::Word> {
    use um::{assemble, load_image};

    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("um-emu: failed to read {}: {}", path.display(), e);
                exit(1);
            }
        };
        match assemble(&source) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("um-emu: assembly error: {}", e);
                exit(1);
            }
        }
    } else {
        match load_image(path) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("um-emu: failed to load {}: {}", path.display(), e);
                exit(1);
            }
        }
    }
}

fn run_program(path: &Path, options: RunOptions) {
    use um::{Console, IoConsole, Machine};
    use um::asm::disasm::disassemble_instruction;

    let mut machine = Machine::new(load_words(path));
    let mut console = IoConsole::stdio();
    let limit = options.max_cycles.unwrap_or(u64::MAX);

    let result = if options.trace {
        let mut outcome = Ok(());
        while machine.is_running() && machine.cycles < limit {
            let pc = machine.pc;
            if let Ok(word) = machine.mem.read(0, pc) {
                eprintln!("{:08x}: {:08x}  {}", pc, word, disassemble_instruction(word));
            }
            if let Err(e) = machine.step(&mut console) {
                outcome = Err(e);
                break;
            }
        }
        outcome
    } else {
        machine.run_limited(&mut console, limit).map(|_| ())
    };

    if let Err(e) = console.flush() {
        eprintln!("um-emu: failed to flush output: {}", e);
    }

    if let Some(dump_path) = &options.dump_state {
        write_snapshot(dump_path, &machine);
    }

    if let Err(e) = result {
        eprintln!("um-emu: fatal fault after {} instructions: {}", machine.cycles, e);
        exit(1);
    }

    if machine.is_running() {
        eprintln!("um-emu: stopped after {} instructions (--max-cycles)", machine.cycles);
    }
}

fn write_snapshot(path: &Path, machine: &um::Machine) {
    let json = match serde_json::to_string_pretty(&machine.snapshot()) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("um-emu: failed to serialize state: {}", e);
            return;
        }
    };
    if let Err(e) = std::fs::write(path, json) {
        eprintln!("um-emu: failed to write {}: {}", path.display(), e);
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, input: Option<&Path>) {
    use um::run_debugger;

    let words = load_words(path);
    let input = match input.map(std::fs::read).transpose() {
        Ok(bytes) => bytes.unwrap_or_default(),
        Err(e) => {
            eprintln!("um-emu: failed to read input: {}", e);
            exit(1);
        }
    };

    if let Err(e) = run_debugger(words, input) {
        eprintln!("um-emu: debugger error: {}", e);
        exit(1);
    }
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>) {
    use um::{assemble, save_image};

    let out_path = output.unwrap_or_else(|| source_path.with_extension("um"));

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("um-emu: failed to read {}: {}", source_path.display(), e);
            exit(1);
        }
    };

    let words = match assemble(&source) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("um-emu: assembly error: {}", e);
            exit(1);
        }
    };

    if let Err(e) = save_image(&out_path, &words) {
        eprintln!("um-emu: failed to save image: {}", e);
        exit(1);
    }

    println!("Assembled {} words → {}", words.len(), out_path.display());
}

fn disassemble_file(image_path: &Path) {
    use um::{disassemble, load_image};

    let words = match load_image(image_path) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("um-emu: failed to load {}: {}", image_path.display(), e);
            exit(1);
        }
    };

    print!("{}", disassemble(&words));
}

fn run_self_test() {
    use um::{assemble, BufferConsole, Machine, MachineError};

    println!("━━━ Universal Machine Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    let run = |source: &str| {
        let program = assemble(source).expect("self-test program assembles");
        let mut machine = Machine::new(program);
        let mut console = BufferConsole::new();
        let result = machine.run(&mut console);
        (machine, console, result)
    };

    let (_, console, result) = run("lv r0, 72\nlv r1, 10\nout r0\nout r1\nhalt\nout r0");
    check("Output then halt", result.is_ok() && console.output() == b"H\n");

    let (machine, _, result) = run("lv r2, 3\nmap r1, r2\nlv r3, 2\nlv r4, 99\n\
                                    sstore r1, r3, r4\nsload r5, r1, r3\nhalt");
    check("Segment store/load", result.is_ok() && machine.regs.get(um::Reg::new(5)) == 99);

    let (machine, console, result) = run("lv r1, 1\ndiv r0, r1, r2\nout r1\nhalt");
    check(
        "Division by zero faults",
        result == Err(MachineError::DivisionByZero) && machine.is_halted() && console.output().is_empty(),
    );

    let mut machine = Machine::new(
        assemble("lv r2, 4\nmap r1, r2\nunmap r1\nmap r3, r2\nhalt").expect("assembles"),
    );
    let reused = machine.run_limited(&mut BufferConsole::new(), 4).is_ok()
        && machine.regs.get(um::Reg::new(1)) == machine.regs.get(um::Reg::new(3));
    check("Segment identifier reuse", reused);

    let (machine, _, result) = run(".word 0xE0000000");
    check("Illegal opcode halts", result == Ok(1) && machine.is_halted());

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        exit(1);
    }
}
