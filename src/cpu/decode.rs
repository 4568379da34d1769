//! Instruction codec for the Universal Machine.
//!
//! Every instruction is a single 32-bit word. The top four bits select
//! the opcode; the remaining bits are either three 3-bit register fields
//! in the low nine bits, or (for load-immediate) a 3-bit register field
//! followed by a 25-bit unsigned value.

use serde::{Serialize, Deserialize};
use std::fmt;

/// The machine's only value type.
pub type Word = u32;

const OPCODE_SHIFT: u32 = 28;
const REG_MASK: Word = 0b111;
const REG_A_SHIFT: u32 = 6;
const REG_B_SHIFT: u32 = 3;
const REG_C_SHIFT: u32 = 0;
const IMM_REG_SHIFT: u32 = 25;

/// Largest value a load-immediate instruction can carry.
pub const IMMEDIATE_MAX: Word = (1 << 25) - 1;

/// A register index in `0..8`.
///
/// Construction masks to three bits, so a `Reg` can never name a
/// register outside the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    /// Number of registers addressable by a 3-bit field.
    pub const COUNT: usize = 8;

    /// Create from any value; only the low three bits are kept.
    pub const fn new(index: u8) -> Self {
        Reg(index & REG_MASK as u8)
    }

    /// Index into the register bank.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    fn from_field(word: Word, shift: u32) -> Self {
        Reg(((word >> shift) & REG_MASK) as u8)
    }

    fn to_field(self, shift: u32) -> Word {
        (self.0 as Word) << shift
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The fourteen defined operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    ConditionalMove = 0,
    SegmentLoad = 1,
    SegmentStore = 2,
    Add = 3,
    Multiply = 4,
    Divide = 5,
    Nand = 6,
    Halt = 7,
    MapSegment = 8,
    UnmapSegment = 9,
    Output = 10,
    Input = 11,
    LoadProgram = 12,
    LoadImmediate = 13,
}

impl Opcode {
    /// All defined opcodes in numeric order.
    pub const ALL: [Opcode; 14] = [
        Opcode::ConditionalMove,
        Opcode::SegmentLoad,
        Opcode::SegmentStore,
        Opcode::Add,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Nand,
        Opcode::Halt,
        Opcode::MapSegment,
        Opcode::UnmapSegment,
        Opcode::Output,
        Opcode::Input,
        Opcode::LoadProgram,
        Opcode::LoadImmediate,
    ];

    /// Look up a 4-bit opcode field. Codes 14 and 15 have no operation.
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::ConditionalMove => "cmov",
            Opcode::SegmentLoad => "sload",
            Opcode::SegmentStore => "sstore",
            Opcode::Add => "add",
            Opcode::Multiply => "mul",
            Opcode::Divide => "div",
            Opcode::Nand => "nand",
            Opcode::Halt => "halt",
            Opcode::MapSegment => "map",
            Opcode::UnmapSegment => "unmap",
            Opcode::Output => "out",
            Opcode::Input => "in",
            Opcode::LoadProgram => "loadp",
            Opcode::LoadImmediate => "lv",
        }
    }

    /// Reverse of [`Opcode::mnemonic`], case-insensitive.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|op| op.mnemonic() == lower)
    }
}

/// Raw fields of the three-register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    /// 4-bit opcode, possibly undefined.
    pub opcode: u8,
    pub a: Reg,
    pub b: Reg,
    pub c: Reg,
}

/// Extract opcode and the A/B/C register fields. Total over all words.
pub fn fields(word: Word) -> Fields {
    Fields {
        opcode: (word >> OPCODE_SHIFT) as u8,
        a: Reg::from_field(word, REG_A_SHIFT),
        b: Reg::from_field(word, REG_B_SHIFT),
        c: Reg::from_field(word, REG_C_SHIFT),
    }
}

/// Pack fields back into a word; the don't-care bits 27..9 are zero.
pub fn pack_fields(fields: Fields) -> Word {
    ((fields.opcode as Word & 0xF) << OPCODE_SHIFT)
        | fields.a.to_field(REG_A_SHIFT)
        | fields.b.to_field(REG_B_SHIFT)
        | fields.c.to_field(REG_C_SHIFT)
}

/// Extract the load-immediate layout: destination register and 25-bit value.
pub fn immediate(word: Word) -> (Reg, Word) {
    (Reg::from_field(word, IMM_REG_SHIFT), word & IMMEDIATE_MAX)
}

/// Pack a load-immediate instruction. Bits above 25 of `value` are dropped.
pub fn pack_immediate(reg: Reg, value: Word) -> Word {
    ((Opcode::LoadImmediate as Word) << OPCODE_SHIFT)
        | reg.to_field(IMM_REG_SHIFT)
        | (value & IMMEDIATE_MAX)
}

/// Decoded instruction.
///
/// Only the operand fields an operation actually reads are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// if C != 0 then A := B
    ConditionalMove { a: Reg, b: Reg, c: Reg },
    /// A := segment[B][C]
    SegmentLoad { a: Reg, b: Reg, c: Reg },
    /// segment[A][B] := C
    SegmentStore { a: Reg, b: Reg, c: Reg },
    /// A := B + C (mod 2^32)
    Add { a: Reg, b: Reg, c: Reg },
    /// A := B * C (mod 2^32)
    Multiply { a: Reg, b: Reg, c: Reg },
    /// A := B / C, unsigned
    Divide { a: Reg, b: Reg, c: Reg },
    /// A := !(B & C)
    Nand { a: Reg, b: Reg, c: Reg },
    Halt,
    /// B := new segment of C words
    MapSegment { b: Reg, c: Reg },
    /// free segment C
    UnmapSegment { c: Reg },
    /// emit C as a byte
    Output { c: Reg },
    /// C := next input byte or all ones
    Input { c: Reg },
    /// segment 0 := copy of segment B; pc := C
    LoadProgram { b: Reg, c: Reg },
    /// A := value
    LoadImmediate { a: Reg, value: Word },
    /// Opcode 14 or 15. Executes as a halt.
    Illegal { opcode: u8 },
}

impl Instruction {
    /// The operation, or `None` for an illegal opcode.
    pub fn opcode(&self) -> Option<Opcode> {
        let op = match self {
            Instruction::ConditionalMove { .. } => Opcode::ConditionalMove,
            Instruction::SegmentLoad { .. } => Opcode::SegmentLoad,
            Instruction::SegmentStore { .. } => Opcode::SegmentStore,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Multiply { .. } => Opcode::Multiply,
            Instruction::Divide { .. } => Opcode::Divide,
            Instruction::Nand { .. } => Opcode::Nand,
            Instruction::Halt => Opcode::Halt,
            Instruction::MapSegment { .. } => Opcode::MapSegment,
            Instruction::UnmapSegment { .. } => Opcode::UnmapSegment,
            Instruction::Output { .. } => Opcode::Output,
            Instruction::Input { .. } => Opcode::Input,
            Instruction::LoadProgram { .. } => Opcode::LoadProgram,
            Instruction::LoadImmediate { .. } => Opcode::LoadImmediate,
            Instruction::Illegal { .. } => return None,
        };
        Some(op)
    }
}

/// Decode a word. Every bit pattern decodes; undefined opcodes become
/// [`Instruction::Illegal`].
pub fn decode(word: Word) -> Instruction {
    let Fields { opcode, a, b, c } = fields(word);

    let Some(op) = Opcode::from_bits(opcode) else {
        return Instruction::Illegal { opcode };
    };

    match op {
        Opcode::ConditionalMove => Instruction::ConditionalMove { a, b, c },
        Opcode::SegmentLoad => Instruction::SegmentLoad { a, b, c },
        Opcode::SegmentStore => Instruction::SegmentStore { a, b, c },
        Opcode::Add => Instruction::Add { a, b, c },
        Opcode::Multiply => Instruction::Multiply { a, b, c },
        Opcode::Divide => Instruction::Divide { a, b, c },
        Opcode::Nand => Instruction::Nand { a, b, c },
        Opcode::Halt => Instruction::Halt,
        Opcode::MapSegment => Instruction::MapSegment { b, c },
        Opcode::UnmapSegment => Instruction::UnmapSegment { c },
        Opcode::Output => Instruction::Output { c },
        Opcode::Input => Instruction::Input { c },
        Opcode::LoadProgram => Instruction::LoadProgram { b, c },
        Opcode::LoadImmediate => {
            let (a, value) = immediate(word);
            Instruction::LoadImmediate { a, value }
        }
    }
}

/// Encode an instruction. Unused register fields are written as zero.
pub fn encode(instr: &Instruction) -> Word {
    let r0 = Reg::new(0);
    let three = |op: Opcode, a: Reg, b: Reg, c: Reg| {
        pack_fields(Fields { opcode: op as u8, a, b, c })
    };

    match *instr {
        Instruction::ConditionalMove { a, b, c } => three(Opcode::ConditionalMove, a, b, c),
        Instruction::SegmentLoad { a, b, c } => three(Opcode::SegmentLoad, a, b, c),
        Instruction::SegmentStore { a, b, c } => three(Opcode::SegmentStore, a, b, c),
        Instruction::Add { a, b, c } => three(Opcode::Add, a, b, c),
        Instruction::Multiply { a, b, c } => three(Opcode::Multiply, a, b, c),
        Instruction::Divide { a, b, c } => three(Opcode::Divide, a, b, c),
        Instruction::Nand { a, b, c } => three(Opcode::Nand, a, b, c),
        Instruction::Halt => three(Opcode::Halt, r0, r0, r0),
        Instruction::MapSegment { b, c } => three(Opcode::MapSegment, r0, b, c),
        Instruction::UnmapSegment { c } => three(Opcode::UnmapSegment, r0, r0, c),
        Instruction::Output { c } => three(Opcode::Output, r0, r0, c),
        Instruction::Input { c } => three(Opcode::Input, r0, r0, c),
        Instruction::LoadProgram { b, c } => three(Opcode::LoadProgram, r0, b, c),
        Instruction::LoadImmediate { a, value } => pack_immediate(a, value),
        Instruction::Illegal { opcode } => ((opcode as Word) & 0xF) << OPCODE_SHIFT,
    }
}
