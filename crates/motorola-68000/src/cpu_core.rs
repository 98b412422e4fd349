//! The narrow boundary between the frame loop and a 68000 decoder.
//!
//! A real decoder lives outside this workspace; [`CpuCore`] is the
//! contract it must satisfy. Six operations: reset, run for a cycle
//! budget, read/write a register, set the IPL input, and force a
//! supervisor-mode transition on bus-error injection. Everything else
//! — interrupt acknowledge and bus-error scheduling — is modeled as
//! plain methods rather than trait objects so a decoder can batch work
//! however it likes between calls.

use crate::Registers;

/// One of the eight data or seven general address registers, or PC/SR.
/// `A7` is intentionally absent: callers read/write the active stack
/// pointer through [`Registers::a`]/[`Registers::set_a`] instead, since
/// its identity depends on the current privilege mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuRegister {
    D(u8),
    A(u8),
    Pc,
    Sr,
    Usp,
    Ssp,
}

/// 68000 function code lines, asserted on every bus cycle. Bus-error
/// injection needs these to build an accurate group-0 exception frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    UserData,
    UserProgram,
    SupervisorData,
    SupervisorProgram,
    InterruptAck,
}

/// A pending bus error, recorded by a memory callback and consumed by
/// the core at the next safe boundary (see the distilled spec's
/// bus-error protocol: the callback returns a dummy value and the core
/// checks this flag before committing the instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusErrorFrame {
    pub address: u32,
    pub function_code: FunctionCode,
    pub is_write: bool,
    pub is_word: bool,
    pub instruction_register: u16,
}

/// Result of an interrupt-acknowledge cycle: either an autovector
/// number or a user-supplied vector number (from a peripheral that
/// vectors itself, e.g. the MFP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqAck {
    Autovector(u8),
    Vector(u8),
    /// No interrupt source claimed the acknowledge cycle (spurious).
    Spurious,
}

/// The boundary a frame loop drives a 68000 decoder through.
///
/// Implementations must guarantee that `execute_for` returns within one
/// instruction's worth of overshoot past the requested budget, and that
/// side effects of a batch (register writes, bus accesses) are fully
/// committed before the next call — the frame loop interleaves other
/// devices between calls and depends on this ordering.
pub trait CpuCore {
    /// Reset vectors are fetched from the bus at addresses 0 and 4;
    /// supervisor mode is entered and the interrupt mask set to 7.
    fn reset(&mut self);

    /// Execute instructions until at least `cycles` have elapsed.
    /// Returns the number of cycles actually consumed (>= `cycles`).
    fn execute_for(&mut self, cycles: u32) -> u32;

    fn read_register(&self, reg: CpuRegister) -> u32;
    fn write_register(&mut self, reg: CpuRegister, value: u32);

    /// Set the interrupt priority level (0..7) presented on IPL2-0.
    fn set_ipl(&mut self, level: u8);

    /// Force supervisor mode, independent of any instruction in flight.
    /// Used when bus-error injection must raise privilege before laying
    /// down the exception stack frame.
    fn set_supervisor(&mut self, supervisor: bool);

    /// Record a bus error for the core to raise at the next safe point.
    fn schedule_bus_error(&mut self, frame: BusErrorFrame);

    /// Whether a bus error is currently pending and not yet serviced.
    fn has_pending_bus_error(&self) -> bool;

    /// True once the core has halted (double bus fault, STOP with all
    /// interrupts masked below the pending level, etc).
    fn is_halted(&self) -> bool;
}

/// A placeholder [`CpuCore`] used to exercise the orchestration loop
/// and bus wiring in tests without a real decoder. It does not decode
/// instructions: each call to `execute_for` advances PC by 2 and
/// consumes 4 cycles per "instruction", repeating until the budget is
/// met. Not suitable for running actual TOS code.
#[derive(Debug, Clone, Default)]
pub struct NullCpu {
    pub registers: Registers,
    pub ipl: u8,
    pending_bus_error: Option<BusErrorFrame>,
    halted: bool,
}

impl NullCpu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: Registers::new(),
            ipl: 0,
            pending_bus_error: None,
            halted: false,
        }
    }
}

impl CpuCore for NullCpu {
    fn reset(&mut self) {
        self.registers = Registers::new();
        self.ipl = 0;
        self.pending_bus_error = None;
        self.halted = false;
    }

    fn execute_for(&mut self, cycles: u32) -> u32 {
        if self.halted {
            return cycles;
        }
        let mut consumed = 0u32;
        while consumed < cycles {
            self.registers.pc = self.registers.pc.wrapping_add(2);
            consumed += 4;
        }
        consumed
    }

    fn read_register(&self, reg: CpuRegister) -> u32 {
        match reg {
            CpuRegister::D(n) => self.registers.d[n as usize],
            CpuRegister::A(n) => self.registers.a(n as usize),
            CpuRegister::Pc => self.registers.pc,
            CpuRegister::Sr => u32::from(self.registers.sr),
            CpuRegister::Usp => self.registers.usp,
            CpuRegister::Ssp => self.registers.ssp,
        }
    }

    fn write_register(&mut self, reg: CpuRegister, value: u32) {
        match reg {
            CpuRegister::D(n) => self.registers.d[n as usize] = value,
            CpuRegister::A(n) => self.registers.set_a(n as usize, value),
            CpuRegister::Pc => self.registers.pc = value,
            CpuRegister::Sr => self.registers.sr = value as u16,
            CpuRegister::Usp => self.registers.usp = value,
            CpuRegister::Ssp => self.registers.ssp = value,
        }
    }

    fn set_ipl(&mut self, level: u8) {
        self.ipl = level & 0x07;
    }

    fn set_supervisor(&mut self, supervisor: bool) {
        self.registers.set_supervisor(supervisor);
    }

    fn schedule_bus_error(&mut self, frame: BusErrorFrame) {
        self.pending_bus_error = Some(frame);
    }

    fn has_pending_bus_error(&self) -> bool {
        self.pending_bus_error.is_some()
    }

    fn is_halted(&self) -> bool {
        self.halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cpu_advances_pc_and_reports_consumed_cycles() {
        let mut cpu = NullCpu::new();
        let consumed = cpu.execute_for(10);
        assert!(consumed >= 10);
        assert_eq!(cpu.read_register(CpuRegister::Pc), consumed / 4 * 2);
    }

    #[test]
    fn reset_clears_pending_bus_error() {
        let mut cpu = NullCpu::new();
        cpu.schedule_bus_error(BusErrorFrame {
            address: 0,
            function_code: FunctionCode::SupervisorData,
            is_write: false,
            is_word: true,
            instruction_register: 0,
        });
        assert!(cpu.has_pending_bus_error());
        cpu.reset();
        assert!(!cpu.has_pending_bus_error());
    }
}
