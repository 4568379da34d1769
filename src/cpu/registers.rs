//! The Universal Machine register bank.
//!
//! Eight general-purpose 32-bit registers, `r0` through `r7`, all zero
//! at machine start. Register fields in an instruction are three bits
//! wide, so every decoded [`Reg`] names a valid slot.

use crate::cpu::decode::{Reg, Word};
use serde::{Serialize, Deserialize};
use std::fmt;

/// The register file.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    slots: [Word; Reg::COUNT],
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self { slots: [0; Reg::COUNT] }
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> Word {
        self.slots[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: Word) {
        self.slots[reg.index()] = value;
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        self.slots = [0; Reg::COUNT];
    }

    /// All eight values in register order.
    pub fn values(&self) -> [Word; Reg::COUNT] {
        self.slots
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (i, value) in self.slots.iter().enumerate() {
            list.entry(&format_args!("r{}", i), &format_args!("{:#010x}", value));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_start_zeroed() {
        let regs = Registers::new();
        assert_eq!(regs.values(), [0; 8]);
    }

    #[test]
    fn test_register_read_write() {
        let mut regs = Registers::new();
        regs.set(Reg::new(3), 0xDEAD_BEEF);
        regs.set(Reg::new(7), 1);

        assert_eq!(regs.get(Reg::new(3)), 0xDEAD_BEEF);
        assert_eq!(regs.get(Reg::new(7)), 1);
        assert_eq!(regs.get(Reg::new(0)), 0);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.set(Reg::new(5), 42);
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
