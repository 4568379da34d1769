//! Disassembler for Universal Machine programs.
//!
//! Output uses the assembler's syntax, so a listing assembles back to
//! the same words. Words whose unused bits are not zero, or whose
//! opcode is undefined, are printed as `.word` data.

use crate::cpu::decode::{decode, encode, Instruction, Word};

/// Disassemble a single word to text.
pub fn disassemble_instruction(word: Word) -> String {
    let decoded = decode(word);
    if encode(&decoded) != word || decoded.opcode().is_none() {
        return format!(".word {:#010x}", word);
    }
    format_instruction(&decoded)
}

/// Disassemble a slice of words, one line each, offsets in comments.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    output.push_str("; Universal Machine disassembly\n");
    output.push_str(&format!("; {} words\n\n", words.len()));

    for (offset, word) in words.iter().enumerate() {
        let line = disassemble_instruction(*word);
        output.push_str(&format!("    {:<28} ; {:08x}: {:08x}\n", line, offset, word));
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    let name = match instr.opcode() {
        Some(op) => op.mnemonic(),
        None => "???",
    };

    match instr {
        Instruction::ConditionalMove { a, b, c }
        | Instruction::SegmentLoad { a, b, c }
        | Instruction::SegmentStore { a, b, c }
        | Instruction::Add { a, b, c }
        | Instruction::Multiply { a, b, c }
        | Instruction::Divide { a, b, c }
        | Instruction::Nand { a, b, c } => format!("{} {}, {}, {}", name, a, b, c),

        Instruction::Halt => name.to_string(),

        Instruction::MapSegment { b, c } | Instruction::LoadProgram { b, c } => {
            format!("{} {}, {}", name, b, c)
        }

        Instruction::UnmapSegment { c }
        | Instruction::Output { c }
        | Instruction::Input { c } => format!("{} {}", name, c),

        Instruction::LoadImmediate { a, value } => format!("{} {}, {}", name, a, value),

        Instruction::Illegal { opcode } => format!(".word {:#010x}", (*opcode as Word) << 28),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{pack_immediate, Reg};

    #[test]
    fn test_disassemble_halt() {
        assert_eq!(disassemble_instruction(encode(&Instruction::Halt)), "halt");
    }

    #[test]
    fn test_disassemble_three_register() {
        let add = encode(&Instruction::Add { a: Reg::new(1), b: Reg::new(2), c: Reg::new(3) });
        assert_eq!(disassemble_instruction(add), "add r1, r2, r3");
    }

    #[test]
    fn test_disassemble_partial_operands() {
        let map = encode(&Instruction::MapSegment { b: Reg::new(4), c: Reg::new(5) });
        let out = encode(&Instruction::Output { c: Reg::new(6) });
        assert_eq!(disassemble_instruction(map), "map r4, r5");
        assert_eq!(disassemble_instruction(out), "out r6");
    }

    #[test]
    fn test_disassemble_immediate() {
        assert_eq!(disassemble_instruction(pack_immediate(Reg::new(0), 72)), "lv r0, 72");
    }

    #[test]
    fn test_noisy_and_illegal_words_are_data() {
        assert_eq!(disassemble_instruction(0x7000_0001), ".word 0x70000001");
        assert_eq!(disassemble_instruction(0xE000_0000), ".word 0xe0000000");
    }

    #[test]
    fn test_listing_has_offsets() {
        let listing = disassemble(&[encode(&Instruction::Halt)]);
        assert!(listing.contains("halt"));
        assert!(listing.contains("00000000: 70000000"));
    }
}
