//! Simple assembler for Universal Machine programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! start:              ; Define a label (its word offset)
//!     lv r0, 'H'      ; Load immediate: decimal, 0x hex, char or label
//!     out r0          ; Output register C
//!     add r1, r2, r3  ; Three-register form: A, B, C
//!     map r1, r2      ; B := new segment of C words
//!     loadp r0, r4    ; Jump within segment 0
//!     halt
//! msg:
//!     .word 0x48      ; Raw data word
//! ```

use crate::cpu::decode::{encode, Instruction, Opcode, Reg, Word, IMMEDIATE_MAX};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a list of words.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// An operand value that may still name a label.
#[derive(Debug, Clone)]
enum Value {
    Number(u64),
    Label(String),
}

/// One output word before label resolution.
#[derive(Debug, Clone)]
enum Item {
    Ready(Word),
    Immediate { reg: Reg, value: Value },
    Data(Value),
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> word offset).
    symbols: HashMap<String, Word>,
    /// Emitted items with their source line.
    items: Vec<(Item, usize)>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            items: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        // Pass 1: collect labels and emit items
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve label references
        self.items
            .iter()
            .map(|(item, line)| self.resolve(item, *line))
            .collect()
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some((head, rest)) = line.split_once(':') {
            let label = head.trim();
            if is_identifier(label) {
                let offset = self.items.len() as Word;
                if self.symbols.insert(label.to_string(), offset).is_some() {
                    return Err(AssemblerError::DuplicateLabel {
                        line: line_num,
                        label: label.to_string(),
                    });
                }
                let rest = rest.trim();
                if !rest.is_empty() {
                    return self.process_instruction(rest, line_num);
                }
                return Ok(());
            }
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m, rest.trim()),
            None => (line, ""),
        };
        let operands = split_operands(rest);

        if mnemonic.eq_ignore_ascii_case(".word") {
            expect_operands(&operands, 1, mnemonic, line_num)?;
            let value = parse_value(operands[0], line_num)?;
            self.items.push((Item::Data(value), line_num));
            return Ok(());
        }

        let op = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: mnemonic.to_string(),
        })?;

        let item = match op {
            Opcode::LoadImmediate => {
                expect_operands(&operands, 2, mnemonic, line_num)?;
                Item::Immediate {
                    reg: parse_reg(operands[0], line_num)?,
                    value: parse_value(operands[1], line_num)?,
                }
            }
            _ => Item::Ready(encode(&parse_register_form(op, &operands, mnemonic, line_num)?)),
        };

        self.items.push((item, line_num));
        Ok(())
    }

    fn resolve(&self, item: &Item, line: usize) -> Result<Word, AssemblerError> {
        match item {
            Item::Ready(word) => Ok(*word),
            Item::Immediate { reg, value } => {
                let value = self.resolve_value(value, line)?;
                if value > IMMEDIATE_MAX as u64 {
                    return Err(AssemblerError::ValueOutOfRange { line, value });
                }
                Ok(encode(&Instruction::LoadImmediate { a: *reg, value: value as Word }))
            }
            Item::Data(value) => {
                let value = self.resolve_value(value, line)?;
                Word::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line, value })
            }
        }
    }

    fn resolve_value(&self, value: &Value, line: usize) -> Result<u64, AssemblerError> {
        match value {
            Value::Number(n) => Ok(*n),
            Value::Label(label) => self.symbols
                .get(label)
                .map(|&offset| offset as u64)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line,
                    label: label.clone(),
                }),
        }
    }
}

/// Build an instruction whose operands are all registers.
fn parse_register_form(
    op: Opcode,
    operands: &[&str],
    mnemonic: &str,
    line_num: usize,
) -> Result<Instruction, AssemblerError> {
    let count = match op {
        Opcode::Halt => 0,
        Opcode::UnmapSegment | Opcode::Output | Opcode::Input => 1,
        Opcode::MapSegment | Opcode::LoadProgram => 2,
        _ => 3,
    };
    expect_operands(operands, count, mnemonic, line_num)?;

    let regs = operands
        .iter()
        .map(|o| parse_reg(o, line_num))
        .collect::<Result<Vec<_>, _>>()?;

    let instr = match (op, regs.as_slice()) {
        (Opcode::ConditionalMove, &[a, b, c]) => Instruction::ConditionalMove { a, b, c },
        (Opcode::SegmentLoad, &[a, b, c]) => Instruction::SegmentLoad { a, b, c },
        (Opcode::SegmentStore, &[a, b, c]) => Instruction::SegmentStore { a, b, c },
        (Opcode::Add, &[a, b, c]) => Instruction::Add { a, b, c },
        (Opcode::Multiply, &[a, b, c]) => Instruction::Multiply { a, b, c },
        (Opcode::Divide, &[a, b, c]) => Instruction::Divide { a, b, c },
        (Opcode::Nand, &[a, b, c]) => Instruction::Nand { a, b, c },
        (Opcode::Halt, &[]) => Instruction::Halt,
        (Opcode::MapSegment, &[b, c]) => Instruction::MapSegment { b, c },
        (Opcode::UnmapSegment, &[c]) => Instruction::UnmapSegment { c },
        (Opcode::Output, &[c]) => Instruction::Output { c },
        (Opcode::Input, &[c]) => Instruction::Input { c },
        (Opcode::LoadProgram, &[b, c]) => Instruction::LoadProgram { b, c },
        _ => {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("malformed {} instruction", mnemonic),
            })
        }
    };
    Ok(instr)
}

fn expect_operands(
    operands: &[&str],
    count: usize,
    mnemonic: &str,
    line_num: usize,
) -> Result<(), AssemblerError> {
    if operands.len() != count {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("{} takes {} operand(s), found {}", mnemonic, count, operands.len()),
        });
    }
    Ok(())
}

fn parse_reg(operand: &str, line_num: usize) -> Result<Reg, AssemblerError> {
    let invalid = || AssemblerError::InvalidRegister {
        line: line_num,
        operand: operand.to_string(),
    };
    let digits = operand
        .strip_prefix('r')
        .or_else(|| operand.strip_prefix('R'))
        .ok_or_else(invalid)?;
    match digits.parse::<u8>() {
        Ok(n) if (n as usize) < Reg::COUNT => Ok(Reg::new(n)),
        _ => Err(invalid()),
    }
}

fn parse_value(operand: &str, line_num: usize) -> Result<Value, AssemblerError> {
    let syntax = |message: String| AssemblerError::SyntaxError { line: line_num, message };

    if let Some(hex) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(Value::Number)
            .map_err(|_| syntax(format!("invalid hex literal: {}", operand)));
    }

    if let Some(body) = operand.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return parse_char(body)
            .map(|b| Value::Number(b as u64))
            .ok_or_else(|| syntax(format!("invalid character literal: {}", operand)));
    }

    if operand.starts_with(|c: char| c.is_ascii_digit()) {
        return operand
            .parse::<u64>()
            .map(Value::Number)
            .map_err(|_| syntax(format!("invalid number: {}", operand)));
    }

    if is_identifier(operand) {
        return Ok(Value::Label(operand.to_string()));
    }

    Err(syntax(format!("invalid operand: {}", operand)))
}

/// A single byte character, with the usual backslash escapes.
fn parse_char(body: &str) -> Option<u8> {
    let bytes = body.as_bytes();
    match bytes {
        [b'\\', esc] => match esc {
            b'n' => Some(b'\n'),
            b't' => Some(b'\t'),
            b'r' => Some(b'\r'),
            b'0' => Some(0),
            b'\\' => Some(b'\\'),
            b'\'' => Some(b'\''),
            _ => None,
        },
        [c] if c.is_ascii() => Some(*c),
        _ => None,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on commas outside character literals.
fn split_operands(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_char = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_char => escaped = true,
            '\'' => in_char = !in_char,
            ',' if !in_char => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Drop everything from the first `;` outside a character literal.
fn strip_comment(line: &str) -> &str {
    let mut in_char = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_char => escaped = true,
            '\'' => in_char = !in_char,
            ';' if !in_char => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: {operand}")]
    InvalidRegister { line: usize, operand: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: u64 },
}
