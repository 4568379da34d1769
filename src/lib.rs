//! # Universal Machine Emulator
//!
//! An emulator for a small 32-bit machine with eight registers, fourteen
//! instructions and a table of dynamically mapped memory segments. The
//! running program lives in segment 0 and may replace itself wholesale
//! while executing.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{
    BufferConsole, Console, Instruction, IoConsole, Machine, MachineError, MachineSnapshot,
    MachineState, Memory, MemoryError, Opcode, Reg, Registers, Segment, SegmentId, Word,
};
pub use asm::{assemble, disassemble, load_image, parse_image, save_image, AssemblerError, ImageError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
