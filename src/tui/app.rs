//! Debugger application state and logic.

use crate::{BufferConsole, Machine, Word};
use crate::asm::disasm::disassemble_instruction;
use std::collections::HashSet;

/// Instructions executed per tick while running continuously.
const STEPS_PER_TICK: usize = 1000;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Original program for reset.
    pub program: Vec<Word>,
    /// Input bytes handed to the program on reset.
    pub input: Vec<u8>,
    /// Console capturing program output.
    pub console: BufferConsole,
    /// Breakpoints (by program counter).
    pub breakpoints: HashSet<Word>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Segment table scroll offset.
    pub seg_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program and its input.
    pub fn new(program: Vec<Word>, input: Vec<u8>) -> Self {
        Self {
            machine: Machine::new(program.clone()),
            console: BufferConsole::with_input(&input),
            program,
            input,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            seg_scroll: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.machine.is_running() {
            self.status = format!("Machine halted after {} cycles", self.machine.cycles);
            self.running = false;
            return;
        }

        let pc = self.machine.pc;
        match self.machine.step(&mut self.console) {
            Ok(instr) => {
                let text = crate::asm::disasm::format_instruction(&instr);
                self.status = format!("PC={:08x}: {}", pc, text);
            }
            Err(e) => {
                self.status = format!("Fault at PC={:08x}: {}", pc, e);
                self.running = false;
            }
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }

            if !self.machine.is_running() {
                self.running = false;
                self.status = format!("Halted after {} cycles", self.machine.cycles);
                return;
            }

            if self.breakpoints.contains(&self.machine.pc) {
                self.running = false;
                self.status = format!("Breakpoint at PC={:08x}", self.machine.pc);
                return;
            }

            self.step();
        }
    }

    /// Step past a breakpoint and keep running.
    pub fn resume(&mut self) {
        self.step();
        self.run();
    }

    /// Toggle breakpoint at the current program counter.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.machine.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:08x}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:08x}", pc);
        }
    }

    /// Reset the machine to its initial state.
    pub fn reset(&mut self) {
        self.machine = Machine::new(self.program.clone());
        self.console = BufferConsole::with_input(&self.input);
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Disassembly of segment 0 around the program counter.
    ///
    /// Each entry is `(offset, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Word, String, bool)> {
        let program = self.machine.mem.program();
        let pc = self.machine.pc as usize;
        let start = pc.saturating_sub(lines / 2);

        program
            .iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(offset, &word)| {
                (offset as Word, disassemble_instruction(word), offset == pc)
            })
            .collect()
    }

    /// Program output so far, lossily decoded.
    pub fn output_text(&self) -> String {
        self.console.output_string()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<Word>, input: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program, input);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('c') => app.resume(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.seg_scroll = app.seg_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.seg_scroll + 1 < app.machine.mem.table_len() {
                                app.seg_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
