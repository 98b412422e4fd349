//! Motorola 68000 register file and the narrow cycle-budget interface a
//! host orchestration loop drives a decoder/executor through.
//!
//! This crate does not decode or execute instructions. The instruction
//! decoder is treated as an external, swappable collaborator: anything
//! implementing [`CpuCore`] can sit behind a frame loop. What lives here
//! is the register layout every 68000-family decoder needs to agree on,
//! and the six-operation boundary described by [`CpuCore`].

mod cpu_core;
mod model;
mod registers;

pub use cpu_core::{BusErrorFrame, CpuCore, FunctionCode, IrqAck, NullCpu};
pub use model::{CpuCapabilities, CpuModel};
pub use registers::Registers;
