//! 24-bit address decode, big-endian RAM/ROM/I-O routing, and the
//! group-0 bus-error protocol.
//!
//! [`Bus`] owns the RAM and TOS ROM buffers directly and holds every
//! peripheral device so I/O dispatch (`io_bus.rs`) can reach them
//! without a second layer of indirection — matching
//! `machine-amiga::memory::Memory`'s single-struct-owns-everything
//! shape, generalized from Amiga's fixed custom-chip range to the ST's
//! per-device table.

use atari_video_shifter::VideoShifter;
use general_instrument_ym2149::Ym2149;
use motorola_68000::{BusErrorFrame, CpuCore, CpuRegister, FunctionCode};
use peripheral_atari_ikbd::AciaIkbd;
use western_digital_wd1772::Wd1772;

use motorola_mfp_68901::Mfp68901;

/// TOS ROM size variants this bus accepts.
pub const TOS_SIZE_STF: usize = 192 * 1024;
pub const TOS_SIZE_STE: usize = 256 * 1024;

/// TOS base address for the 192KiB (STF/FM) ROM.
pub const TOS_BASE_STF: u32 = 0x00FC_0000;
/// TOS base address for the 256KiB (STE) ROM.
pub const TOS_BASE_STE: u32 = 0x00E0_0000;

fn mask24(addr: u32) -> u32 {
    addr & 0x00FF_FFFF
}

fn fault_info_word(fault: BusErrorFrame) -> u16 {
    let fc = match fault.function_code {
        FunctionCode::UserData => 1,
        FunctionCode::UserProgram => 2,
        FunctionCode::SupervisorData => 5,
        FunctionCode::SupervisorProgram => 6,
        FunctionCode::InterruptAck => 7,
    };
    let rw = u16::from(!fault.is_write) << 3; // 1 = read, 0 = write
    let in_out = u16::from(!fault.is_word) << 4; // byte access flag
    fc | rw | in_out
}

/// Everything the CPU's bus accesses can reach: RAM, TOS ROM, and the
/// full device set, behind a single 24-bit-address read/write surface.
pub struct Bus {
    ram: Vec<u8>,
    rom: Vec<u8>,
    tos_base: u32,

    pub(crate) mmu_config: u8,
    pub(crate) video_base: [u8; 2],
    pub(crate) video_counter: [u8; 3],
    pub(crate) sync_mode: u8,
    pub(crate) resolution: u8,
    pub(crate) dma_mode_hi_pending: u8,

    pub shifter: VideoShifter,
    pub mfp: Mfp68901,
    pub ym: Ym2149,
    pub wd: Wd1772,
    pub acia: AciaIkbd,

    pending_fault: Option<BusErrorFrame>,
}

impl Bus {
    #[must_use]
    pub fn new(ram_size: usize, rom: Vec<u8>, tos_base: u32, host_sample_rate: u32) -> Self {
        Self {
            ram: vec![0; ram_size],
            rom,
            tos_base,
            mmu_config: 0,
            video_base: [0, 0],
            video_counter: [0, 0, 0],
            sync_mode: 0,
            resolution: 0,
            dma_mode_hi_pending: 0,
            shifter: VideoShifter::new(),
            mfp: Mfp68901::new(),
            ym: Ym2149::new(host_sample_rate),
            wd: Wd1772::new(),
            acia: AciaIkbd::default(),
            pending_fault: None,
        }
    }

    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.mmu_config = 0;
        self.video_base = [0, 0];
        self.video_counter = [0, 0, 0];
        self.sync_mode = 0;
        self.resolution = 0;
        self.shifter.reset();
        self.mfp.reset();
        self.ym.reset();
        self.wd.reset();
        self.acia.reset();
        self.pending_fault = None;
    }

    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    #[must_use]
    pub fn video_base_addr(&self) -> u32 {
        (u32::from(self.video_base[0]) << 16) | (u32::from(self.video_base[1]) << 8)
    }

    #[must_use]
    pub fn video_counter_addr(&self) -> u32 {
        (u32::from(self.video_counter[0]) << 16)
            | (u32::from(self.video_counter[1]) << 8)
            | u32::from(self.video_counter[2])
    }

    pub fn set_video_counter_addr(&mut self, addr: u32) {
        let addr = addr & 0x00FF_FFFF;
        self.video_counter = [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
    }

    fn record_fault(&mut self, address: u32, is_write: bool, is_word: bool) {
        self.pending_fault = Some(BusErrorFrame {
            address,
            function_code: FunctionCode::SupervisorData,
            is_write,
            is_word,
            instruction_register: 0,
        });
    }

    /// Byte read, masked to 24 bits, decoded in the order: first 8
    /// bytes -> ROM mirror, `[0, ram_size)` -> RAM, TOS window -> ROM,
    /// `[0xFF8000, 0xFFFFFF]` -> I/O dispatcher, else 0xFF.
    #[must_use]
    pub fn read8(&mut self, addr: u32) -> u8 {
        let addr = mask24(addr);
        if addr < 8 {
            return self.rom.get(addr as usize).copied().unwrap_or(0xFF);
        }
        if (addr as usize) < self.ram.len() {
            return self.ram[addr as usize];
        }
        if addr >= self.tos_base && (addr - self.tos_base) < self.rom.len() as u32 {
            return self.rom[(addr - self.tos_base) as usize];
        }
        if (0xFF_8000..=0xFF_FFFF).contains(&addr) {
            return self.io_read8(addr);
        }
        0xFF
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        let addr = mask24(addr);
        if addr < 8 {
            return; // ROM mirror: writes ignored
        }
        if (addr as usize) < self.ram.len() {
            self.ram[addr as usize] = value;
            return;
        }
        if addr >= self.tos_base && (addr - self.tos_base) < self.rom.len() as u32 {
            log::debug!("ignored write to TOS ROM at {addr:#08X}");
            return; // ROM: writes ignored
        }
        if (0xFF_8000..=0xFF_FFFF).contains(&addr) {
            self.io_write8(addr, value);
            return;
        }
        log::trace!("write to unmapped address {addr:#08X}");
    }

    #[must_use]
    pub fn read16(&mut self, addr: u32) -> u16 {
        (u16::from(self.read8(addr)) << 8) | u16::from(self.read8(addr.wrapping_add(1)))
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        self.write8(addr, (value >> 8) as u8);
        self.write8(addr.wrapping_add(1), value as u8);
    }

    #[must_use]
    pub fn read32(&mut self, addr: u32) -> u32 {
        (u32::from(self.read16(addr)) << 16) | u32::from(self.read16(addr.wrapping_add(2)))
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        self.write16(addr, (value >> 16) as u16);
        self.write16(addr.wrapping_add(2), value as u16);
    }

    /// Record that `addr` fell into a restricted (bus-error) region.
    /// Called from `io_bus`'s dispatch for regions with no handler.
    pub(crate) fn trigger_bus_error(&mut self, addr: u32, is_write: bool) {
        self.record_fault(addr, is_write, false);
    }

    #[must_use]
    pub fn has_pending_fault(&self) -> bool {
        self.pending_fault.is_some()
    }

    /// 68000 bus-error protocol: read the vector-2 handler address from
    /// bus offset 8; if zero (uninitialized), log and consume the fault
    /// without raising anything (guarded skip). Otherwise force
    /// supervisor mode, lay down the 14-byte group-0 frame on SSP, and
    /// redirect PC to the handler.
    pub fn service_bus_error<C: CpuCore>(&mut self, cpu: &mut C) -> Option<u32> {
        let fault = self.pending_fault.take()?;
        let handler = self.read32(8);
        if handler == 0 {
            log::warn!("bus error at {:#08X} with uninitialized vector 2; skipping", fault.address);
            return None;
        }
        cpu.set_supervisor(true);
        let sr = cpu.read_register(CpuRegister::Sr) as u16;
        let pc = cpu.read_register(CpuRegister::Pc);
        let ssp = cpu.read_register(CpuRegister::Ssp);
        let sp = ssp.wrapping_sub(14);

        self.write16(sp, fault_info_word(fault));
        self.write32(sp.wrapping_add(2), fault.address);
        self.write16(sp.wrapping_add(6), fault.instruction_register);
        self.write16(sp.wrapping_add(8), sr);
        self.write32(sp.wrapping_add(10), pc);

        cpu.write_register(CpuRegister::Ssp, sp);
        cpu.write_register(CpuRegister::Pc, handler);
        cpu.write_register(CpuRegister::Sr, u32::from(sr));
        Some(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorola_68000::NullCpu;

    fn test_bus() -> Bus {
        let mut rom = vec![0u8; TOS_SIZE_STF];
        rom[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes()); // initial SSP
        rom[4..8].copy_from_slice(&TOS_BASE_STF.to_be_bytes()); // initial PC
        Bus::new(512 * 1024, rom, TOS_BASE_STF, 48_000)
    }

    #[test]
    fn addresses_mask_to_24_bits() {
        let mut bus = test_bus();
        bus.write8(0x1000, 0x42);
        assert_eq!(bus.read8(0x0100_1000), bus.read8(0x1000));
        assert_eq!(bus.read8(0xFF00_1000), bus.read8(0x1000));
    }

    #[test]
    fn first_eight_bytes_mirror_rom() {
        let mut bus = test_bus();
        for a in 0..8u32 {
            assert_eq!(bus.read8(a), bus.rom[a as usize]);
        }
    }

    #[test]
    fn writes_to_tos_window_are_ignored() {
        let mut bus = test_bus();
        let before = bus.read8(TOS_BASE_STF + 0x100);
        bus.write8(TOS_BASE_STF + 0x100, before.wrapping_add(1));
        assert_eq!(bus.read8(TOS_BASE_STF + 0x100), before);
    }

    #[test]
    fn ram_read_write_round_trips_big_endian_words() {
        let mut bus = test_bus();
        bus.write16(0x2000, 0xABCD);
        assert_eq!(bus.read8(0x2000), 0xAB);
        assert_eq!(bus.read8(0x2001), 0xCD);
        assert_eq!(bus.read16(0x2000), 0xABCD);
    }

    #[test]
    fn ram_read_write_round_trips_big_endian_longs() {
        let mut bus = test_bus();
        bus.write32(0x3000, 0xDEAD_BEEF);
        assert_eq!(bus.read32(0x3000), 0xDEAD_BEEF);
    }

    #[test]
    fn unmapped_region_reads_as_all_ones() {
        let mut bus = test_bus();
        assert_eq!(bus.read8(0x00A0_0000), 0xFF);
    }

    #[test]
    fn bus_error_pushes_group_zero_frame_and_redirects_pc() {
        let mut bus = test_bus();
        bus.write32(8, 0x0000_1000); // vector 2 handler
        let mut cpu = NullCpu::new();
        cpu.write_register(CpuRegister::Ssp, 0x4000);
        cpu.write_register(CpuRegister::Pc, 0x8000);

        bus.trigger_bus_error(0x00FF_8900, false);
        assert!(bus.has_pending_fault());
        let handler = bus.service_bus_error(&mut cpu).expect("handler present");
        assert_eq!(handler, 0x1000);
        assert_eq!(cpu.read_register(CpuRegister::Pc), 0x1000);
        assert_eq!(cpu.read_register(CpuRegister::Ssp), 0x4000 - 14);
        assert!(!bus.has_pending_fault());
    }

    #[test]
    fn bus_error_with_uninitialized_vector_is_silently_skipped() {
        let mut bus = test_bus();
        // vector 2 left as zero
        let mut cpu = NullCpu::new();
        cpu.write_register(CpuRegister::Ssp, 0x4000);
        bus.trigger_bus_error(0x00FF_8A00, false);
        let handler = bus.service_bus_error(&mut cpu);
        assert!(handler.is_none());
        assert_eq!(cpu.read_register(CpuRegister::Ssp), 0x4000); // untouched
    }
}
