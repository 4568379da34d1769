//! Program images, assembler and disassembler.
//!
//! This module provides:
//! - The `.um` binary image format (big-endian words)
//! - A simple two-pass assembler (text → words)
//! - A disassembler (words → assembler text)

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use image::{encode_image, load_image, parse_image, save_image, ImageError};
