//! WebAssembly bindings for the Universal Machine emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::{BufferConsole, Machine, Reg, Word};
use crate::asm::assembler::assemble;
use crate::asm::disasm::disassemble_instruction;
use crate::asm::image::parse_image;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine,
    console: BufferConsole,
    program: Vec<Word>,
    fault: Option<String>,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create an empty machine.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            machine: Machine::default(),
            console: BufferConsole::new(),
            program: Vec::new(),
            fault: None,
        }
    }

    /// Load a program from `.um` image bytes. Returns the word count.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<usize, JsError> {
        let words = parse_image(bytes)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.load_words(words))
    }

    /// Load a program from assembly source code.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let words = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.load_words(words))
    }

    fn load_words(&mut self, words: Vec<Word>) -> usize {
        let len = words.len();
        self.program = words.clone();
        self.machine = Machine::new(words);
        self.console = BufferConsole::new();
        self.fault = None;
        len
    }

    /// Queue input for Input instructions.
    #[wasm_bindgen]
    pub fn feed_input(&mut self, text: &str) {
        self.console.feed(text);
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.machine.step(&mut self.console)
            .map_err(|e| {
                self.fault = Some(e.to_string());
                JsError::new(&format!("{}", e))
            })?;

        Ok(crate::asm::disasm::format_instruction(&instr))
    }

    /// Run until halt, fault or `max_cycles`. Returns total cycles.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> u64 {
        if let Err(e) = self.machine.run_limited(&mut self.console, max_cycles as u64) {
            self.fault = Some(e.to_string());
        }
        self.machine.cycles
    }

    /// Reset to the initial state with the loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.machine = Machine::new(self.program.clone());
        self.console = BufferConsole::new();
        self.fault = None;
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.machine.is_halted()
    }

    /// Fault message, if the machine stopped on a fault.
    #[wasm_bindgen]
    pub fn fault(&self) -> Option<String> {
        self.fault.clone()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.machine.cycles
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u32 {
        self.machine.pc
    }

    /// Value of register `index` (masked to 0-7).
    #[wasm_bindgen]
    pub fn register(&self, index: u8) -> u32 {
        self.machine.regs.get(Reg::new(index))
    }

    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.machine.state)
    }

    /// Number of live segments.
    #[wasm_bindgen]
    pub fn segment_count(&self) -> usize {
        self.machine.mem.mapped_count()
    }

    /// Take output produced since the last call, as bytes.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> js_sys::Uint8Array {
        let bytes = self.console.take_output();
        js_sys::Uint8Array::from(bytes.as_slice())
    }

    /// Output produced so far, decoded lossily.
    #[wasm_bindgen]
    pub fn output_text(&self) -> String {
        self.console.output_string()
    }

    /// Machine snapshot as a JSON string.
    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.machine.snapshot())
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the image bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u8>, JsError> {
    let words = assemble(source)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(crate::asm::image::encode_image(&words))
}

/// Disassemble a single word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u32) -> String {
    disassemble_instruction(word)
}
