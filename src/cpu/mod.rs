//! The Universal Machine core.
//!
//! - 8 general-purpose 32-bit registers
//! - A growable table of word-addressed segments; segment 0 is the program
//! - 14 instructions in a fixed 32-bit encoding

pub mod memory;
pub mod registers;
pub mod decode;
pub mod console;
pub mod execute;

pub use memory::{Memory, MemoryError, Segment, SegmentId};
pub use registers::Registers;
pub use decode::{Instruction, Opcode, Reg, Word};
pub use console::{BufferConsole, Console, IoConsole};
pub use execute::{Machine, MachineError, MachineSnapshot, MachineState};
