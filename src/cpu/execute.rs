//! Execution engine for the Universal Machine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::{Memory, Registers};
use crate::cpu::console::Console;
use crate::cpu::decode::{self, Instruction, Reg, Word};
use crate::cpu::memory::{MemoryError, Segment, PROGRAM_SEGMENT};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Value stored by Input at end of input.
pub const END_OF_INPUT: Word = 0xFFFF_FFFF;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Fetching and executing instructions.
    Running,
    /// Stopped by a halt, an illegal opcode or a fault. Terminal.
    Halted,
}

/// The Universal Machine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Machine {
    pub regs: Registers,
    pub mem: Memory,
    /// Offset into segment 0 of the next instruction.
    pub pc: Word,
    pub state: MachineState,
    /// Instructions executed so far.
    pub cycles: u64,
    last_instr: Option<Instruction>,
}

impl Machine {
    /// Create a machine with `program` as segment 0.
    pub fn new(program: Vec<Word>) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::with_program(program),
            pc: 0,
            state: MachineState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Create a machine from a big-endian program image.
    pub fn from_image(bytes: &[u8]) -> Result<Self, crate::asm::ImageError> {
        Ok(Self::new(crate::asm::parse_image(bytes)?))
    }

    /// Execute a single instruction.
    ///
    /// A fault tears memory down, halts the machine and is returned as
    /// the error; no further instruction will run.
    pub fn step<C: Console>(&mut self, console: &mut C) -> Result<Instruction, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }

        match self.fetch_and_execute(console) {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                Ok(instr)
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Run until halt or fault.
    ///
    /// Returns the number of instructions executed.
    pub fn run<C: Console>(&mut self, console: &mut C) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;

        while self.state == MachineState::Running {
            self.step(console)?;
        }
        console.flush().map_err(|e| MachineError::Io(e.to_string()))?;

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited<C: Console>(&mut self, console: &mut C, max_cycles: u64) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == MachineState::Running && self.cycles < limit {
            self.step(console)?;
        }
        console.flush().map_err(|e| MachineError::Io(e.to_string()))?;

        Ok(self.cycles - start_cycles)
    }

    /// Decode the instruction at the program counter without executing it.
    pub fn peek(&self) -> Option<Instruction> {
        self.mem.read(PROGRAM_SEGMENT, self.pc).ok().map(decode::decode)
    }

    fn fetch_and_execute<C: Console>(&mut self, console: &mut C) -> Result<Instruction, MachineError> {
        let raw = self.mem.read(PROGRAM_SEGMENT, self.pc)?;
        self.pc = self.pc.wrapping_add(1);

        let instr = decode::decode(raw);
        self.execute(instr, console)?;
        Ok(instr)
    }

    /// Execute a decoded instruction.
    fn execute<C: Console>(&mut self, instr: Instruction, console: &mut C) -> Result<(), MachineError> {
        match instr {
            Instruction::ConditionalMove { a, b, c } => {
                if self.reg(c) != 0 {
                    self.regs.set(a, self.reg(b));
                }
            }

            Instruction::SegmentLoad { a, b, c } => {
                let value = self.mem.read(self.reg(b), self.reg(c))?;
                self.regs.set(a, value);
            }

            Instruction::SegmentStore { a, b, c } => {
                self.mem.write(self.reg(a), self.reg(b), self.reg(c))?;
            }

            Instruction::Add { a, b, c } => {
                self.regs.set(a, self.reg(b).wrapping_add(self.reg(c)));
            }

            Instruction::Multiply { a, b, c } => {
                self.regs.set(a, self.reg(b).wrapping_mul(self.reg(c)));
            }

            Instruction::Divide { a, b, c } => {
                let quotient = self.reg(b)
                    .checked_div(self.reg(c))
                    .ok_or(MachineError::DivisionByZero)?;
                self.regs.set(a, quotient);
            }

            Instruction::Nand { a, b, c } => {
                self.regs.set(a, !(self.reg(b) & self.reg(c)));
            }

            Instruction::Halt | Instruction::Illegal { .. } => {
                self.stop();
            }

            Instruction::MapSegment { b, c } => {
                let id = self.mem.allocate(self.reg(c));
                self.regs.set(b, id);
            }

            Instruction::UnmapSegment { c } => {
                self.mem.deallocate(self.reg(c))?;
            }

            Instruction::Output { c } => {
                if let Ok(byte) = u8::try_from(self.reg(c)) {
                    console.write_byte(byte).map_err(|e| MachineError::Io(e.to_string()))?;
                }
            }

            Instruction::Input { c } => {
                let value = match console.read_byte().map_err(|e| MachineError::Io(e.to_string()))? {
                    Some(byte) => byte as Word,
                    None => END_OF_INPUT,
                };
                self.regs.set(c, value);
            }

            Instruction::LoadProgram { b, c } => {
                let source = self.reg(b);
                let target = self.reg(c);
                if source == PROGRAM_SEGMENT {
                    self.pc = target;
                } else {
                    let program = self.mem.duplicate(source)?;
                    self.replace_program(program, target);
                }
            }

            Instruction::LoadImmediate { a, value } => {
                self.regs.set(a, value);
            }
        }

        Ok(())
    }

    #[inline]
    fn reg(&self, reg: Reg) -> Word {
        self.regs.get(reg)
    }

    /// Swap in a new program and jump into it as one step.
    fn replace_program(&mut self, program: Segment, pc: Word) {
        self.mem.replace_program(program);
        self.pc = pc;
    }

    /// Enter the terminal state and release all segments.
    fn stop(&mut self) {
        self.mem.teardown();
        self.state = MachineState::Halted;
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the machine is halted.
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    /// Summary of the machine suitable for serialization.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            state: self.state,
            pc: self.pc,
            cycles: self.cycles,
            registers: self.regs.values(),
            program_len: self.mem.program().len(),
            table_len: self.mem.table_len(),
            mapped_segments: self.mem.mapped_count(),
            free_ids: self.mem.free_ids().collect(),
            last_instruction: self.last_instr,
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Point-in-time summary of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub state: MachineState,
    pub pc: Word,
    pub cycles: u64,
    pub registers: [Word; Reg::COUNT],
    pub program_len: usize,
    pub table_len: usize,
    pub mapped_segments: usize,
    pub free_ids: Vec<Word>,
    pub last_instruction: Option<Instruction>,
}

/// Errors that can occur during execution. All of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("memory fault: {0}")]
    Memory(#[from] MemoryError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("console I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::console::BufferConsole;
    use crate::cpu::decode::{encode, pack_immediate};

    fn r(i: u8) -> Reg {
        Reg::new(i)
    }

    fn lv(reg: u8, value: Word) -> Word {
        pack_immediate(r(reg), value)
    }

    fn make_program(instructions: &[Instruction]) -> Vec<Word> {
        instructions.iter().map(encode).collect()
    }

    fn run(program: Vec<Word>, input: &str) -> (Machine, BufferConsole, Result<u64, MachineError>) {
        let mut machine = Machine::new(program);
        let mut console = BufferConsole::with_input(input);
        let result = machine.run(&mut console);
        (machine, console, result)
    }

    #[test]
    fn test_halt() {
        let (machine, console, result) = run(make_program(&[Instruction::Halt]), "");

        assert_eq!(result, Ok(1));
        assert!(machine.is_halted());
        assert!(console.output().is_empty());
        assert_eq!(machine.mem.table_len(), 0);
    }

    #[test]
    fn test_hello_newline() {
        let program = vec![
            lv(0, 72),
            lv(1, 10),
            encode(&Instruction::Output { c: r(0) }),
            encode(&Instruction::Output { c: r(1) }),
            encode(&Instruction::Halt),
            encode(&Instruction::Output { c: r(0) }),
        ];
        let (machine, console, result) = run(program, "");

        assert_eq!(result, Ok(5));
        assert_eq!(console.output(), &[72, 10]);
        assert!(machine.is_halted());
    }

    #[test]
    fn test_map_store_load() {
        let program = vec![
            lv(2, 3),
            encode(&Instruction::MapSegment { b: r(1), c: r(2) }),
            lv(3, 2),
            lv(4, 99),
            encode(&Instruction::SegmentStore { a: r(1), b: r(3), c: r(4) }),
            encode(&Instruction::SegmentLoad { a: r(5), b: r(1), c: r(3) }),
            encode(&Instruction::Halt),
        ];
        let mut machine = Machine::new(program);
        let mut console = BufferConsole::new();
        machine.run_limited(&mut console, 6).unwrap();

        assert_eq!(machine.regs.get(r(1)), 1);
        assert_eq!(machine.regs.get(r(5)), 99);
        assert_eq!(machine.mem.segment(1).unwrap().as_slice(), &[0, 0, 99]);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let program = vec![
            lv(1, 10),
            encode(&Instruction::Divide { a: r(0), b: r(1), c: r(2) }),
            encode(&Instruction::Output { c: r(1) }),
            encode(&Instruction::Halt),
        ];
        let (machine, console, result) = run(program, "");

        assert_eq!(result, Err(MachineError::DivisionByZero));
        assert!(machine.is_halted());
        assert_eq!(machine.cycles, 1);
        assert!(console.output().is_empty());
        assert_eq!(machine.mem.table_len(), 0);
    }

    #[test]
    fn test_unsigned_division() {
        let program = vec![
            lv(1, 7),
            lv(2, 2),
            encode(&Instruction::Divide { a: r(0), b: r(1), c: r(2) }),
            encode(&Instruction::Halt),
        ];
        let mut machine = Machine::new(program);
        machine.run_limited(&mut BufferConsole::new(), 3).unwrap();
        assert_eq!(machine.regs.get(r(0)), 3);

        // 0xFFFFFFFF / 2 must not be treated as signed.
        machine.regs.set(r(1), 0xFFFF_FFFF);
        machine.pc = 2;
        machine.step(&mut BufferConsole::new()).unwrap();
        assert_eq!(machine.regs.get(r(0)), 0x7FFF_FFFF);
    }

    #[test]
    fn test_unmap_then_map_reuses_id() {
        let program = vec![
            lv(2, 4),
            encode(&Instruction::MapSegment { b: r(1), c: r(2) }),
            encode(&Instruction::UnmapSegment { c: r(1) }),
            encode(&Instruction::MapSegment { b: r(3), c: r(2) }),
            encode(&Instruction::Halt),
        ];
        let mut machine = Machine::new(program);
        machine.run_limited(&mut BufferConsole::new(), 4).unwrap();

        assert_eq!(machine.regs.get(r(1)), machine.regs.get(r(3)));
        assert_eq!(machine.mem.table_len(), 2);
    }

    #[test]
    fn test_arithmetic_wraps() {
        let mut machine = Machine::new(make_program(&[
            Instruction::Add { a: r(0), b: r(1), c: r(2) },
            Instruction::Multiply { a: r(3), b: r(1), c: r(2) },
            Instruction::Nand { a: r(4), b: r(1), c: r(1) },
            Instruction::Halt,
        ]));
        machine.regs.set(r(1), 0xFFFF_FFFF);
        machine.regs.set(r(2), 2);
        machine.run_limited(&mut BufferConsole::new(), 3).unwrap();

        assert_eq!(machine.regs.get(r(0)), 1);
        assert_eq!(machine.regs.get(r(3)), 0xFFFF_FFFE);
        assert_eq!(machine.regs.get(r(4)), 0);
    }

    #[test]
    fn test_conditional_move() {
        let mut machine = Machine::new(make_program(&[
            Instruction::ConditionalMove { a: r(0), b: r(1), c: r(2) },
            Instruction::ConditionalMove { a: r(3), b: r(1), c: r(4) },
            Instruction::Halt,
        ]));
        machine.regs.set(r(1), 55);
        machine.regs.set(r(2), 1);
        machine.run_limited(&mut BufferConsole::new(), 2).unwrap();

        assert_eq!(machine.regs.get(r(0)), 55);
        assert_eq!(machine.regs.get(r(3)), 0);
    }

    #[test]
    fn test_output_above_255_is_ignored() {
        let program = vec![
            lv(0, 256),
            encode(&Instruction::Output { c: r(0) }),
            lv(0, 255),
            encode(&Instruction::Output { c: r(0) }),
            encode(&Instruction::Halt),
        ];
        let (_, console, result) = run(program, "");

        assert!(result.is_ok());
        assert_eq!(console.output(), &[255]);
    }

    #[test]
    fn test_input_and_end_of_input() {
        let program = make_program(&[
            Instruction::Input { c: r(0) },
            Instruction::Input { c: r(1) },
            Instruction::Halt,
        ]);
        let mut machine = Machine::new(program);
        machine.run_limited(&mut BufferConsole::with_input("A"), 2).unwrap();

        assert_eq!(machine.regs.get(r(0)), 65);
        assert_eq!(machine.regs.get(r(1)), END_OF_INPUT);
    }

    #[test]
    fn test_load_program_jump_within_segment_zero() {
        let program = vec![
            lv(1, 3),
            encode(&Instruction::LoadProgram { b: r(0), c: r(1) }),
            encode(&Instruction::Output { c: r(1) }),
            encode(&Instruction::Halt),
        ];
        let (machine, console, result) = run(program, "");

        assert_eq!(result, Ok(3));
        assert!(console.output().is_empty());
        assert!(machine.is_halted());
    }

    #[test]
    fn test_load_program_replaces_segment_zero() {
        // Build [out r7; halt] in a fresh segment, then jump into it.
        let out = encode(&Instruction::Output { c: r(7) });
        let halt = encode(&Instruction::Halt);
        let mut machine = Machine::new(make_program(&[
            Instruction::MapSegment { b: r(1), c: r(2) },
            Instruction::SegmentStore { a: r(1), b: r(0), c: r(3) },
            Instruction::SegmentStore { a: r(1), b: r(4), c: r(5) },
            Instruction::LoadProgram { b: r(1), c: r(0) },
            Instruction::Halt,
        ]));
        machine.regs.set(r(2), 2);
        machine.regs.set(r(3), out);
        machine.regs.set(r(4), 1);
        machine.regs.set(r(5), halt);
        machine.regs.set(r(7), b'!' as Word);

        let mut console = BufferConsole::new();
        machine.run_limited(&mut console, 4).unwrap();

        assert_eq!(machine.pc, 0);
        assert_eq!(machine.mem.program(), &[out, halt]);
        // Source segment is untouched and still mapped.
        assert_eq!(machine.mem.segment(1).unwrap().as_slice(), &[out, halt]);

        machine.run(&mut console).unwrap();
        assert_eq!(console.output(), b"!");
    }

    #[test]
    fn test_copy_is_independent_of_source() {
        let mut machine = Machine::new(make_program(&[
            Instruction::LoadProgram { b: r(1), c: r(0) },
        ]));
        let id = machine.mem.allocate(1);
        machine.mem.write(id, 0, encode(&Instruction::Halt)).unwrap();
        machine.regs.set(r(1), id);

        machine.step(&mut BufferConsole::new()).unwrap();
        machine.mem.write(id, 0, 0xE000_0000).unwrap();

        assert_eq!(machine.mem.program(), &[encode(&Instruction::Halt)]);
    }

    #[test]
    fn test_illegal_opcode_halts() {
        let program = vec![0xF000_0000, lv(0, 1)];
        let (machine, _, result) = run(program, "");

        assert_eq!(result, Ok(1));
        assert!(machine.is_halted());
        assert_eq!(machine.regs.get(r(0)), 0);
    }

    #[test]
    fn test_memory_faults() {
        let unmapped = make_program(&[Instruction::SegmentLoad { a: r(0), b: r(1), c: r(0) }]);
        let mut machine = Machine::new(unmapped);
        machine.regs.set(r(1), 9);
        let result = machine.run(&mut BufferConsole::new());
        assert_eq!(result, Err(MachineError::Memory(MemoryError::UnmappedSegment(9))));
        assert!(machine.is_halted());

        let unmap_zero = make_program(&[Instruction::UnmapSegment { c: r(0) }]);
        let (_, _, result) = run(unmap_zero, "");
        assert_eq!(result, Err(MachineError::Memory(MemoryError::ProgramSegmentUnmap)));

        let bad_load = make_program(&[Instruction::LoadProgram { b: r(1), c: r(0) }]);
        let mut machine = Machine::new(bad_load);
        machine.regs.set(r(1), 3);
        assert!(machine.run(&mut BufferConsole::new()).is_err());
    }

    #[test]
    fn test_running_off_the_end_faults() {
        let (machine, _, result) = run(vec![lv(0, 1)], "");

        assert_eq!(
            result,
            Err(MachineError::Memory(MemoryError::OffsetOutOfBounds {
                segment: 0,
                offset: 1,
                len: 1,
            }))
        );
        assert_eq!(machine.cycles, 1);
    }

    #[test]
    fn test_step_after_halt() {
        let mut machine = Machine::new(make_program(&[Instruction::Halt]));
        let mut console = BufferConsole::new();
        machine.run(&mut console).unwrap();

        assert_eq!(
            machine.step(&mut console),
            Err(MachineError::NotRunning(MachineState::Halted))
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut machine = Machine::new(vec![lv(3, 7), encode(&Instruction::Halt)]);
        machine.run_limited(&mut BufferConsole::new(), 1).unwrap();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.registers[3], 7);
        assert_eq!(snapshot.program_len, 2);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MachineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_from_image() {
        let machine = Machine::from_image(&[0x70, 0, 0, 0]).unwrap();
        assert_eq!(machine.peek(), Some(Instruction::Halt));
        assert!(Machine::from_image(&[0x70, 0, 0]).is_err());
    }
}
