//! Motorola MC68901 Multi-Function Peripheral: four timers, a two-bank
//! interrupt controller, and an edge-sensitive GPIO port.
//!
//! Timing runs at 2 457 600 Hz while the host CPU runs at 8 000 000 Hz;
//! `update_timers` is fed a CPU cycle count each time the caller advances
//! the master clock and converts it through a 64-bit rational accumulator
//! so long runs never drift.

/// MFP internal clock, in Hz.
pub const MFP_HZ: u64 = 2_457_600;
/// Host CPU clock this MFP is synchronized against, in Hz.
pub const CPU_HZ: u64 = 8_000_000;

/// Which interrupt bank (A or B) a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    A,
    B,
}

/// One of the sixteen interrupt channels, identified by bank and bit.
/// `channel_index()` gives the 0..15 priority/vector index: bank A bits
/// occupy 8..15 (bit n -> 8+n), bank B bits occupy 0..7 (bit n -> n),
/// matching the real MFP's vector assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub bank: Bank,
    pub bit: u8,
}

impl Channel {
    pub const GPIP7: Self = Self { bank: Bank::A, bit: 7 };
    pub const GPIP6: Self = Self { bank: Bank::A, bit: 6 };
    pub const TIMER_A: Self = Self { bank: Bank::A, bit: 5 };
    pub const RX_FULL: Self = Self { bank: Bank::A, bit: 4 };
    pub const RX_ERROR: Self = Self { bank: Bank::A, bit: 3 };
    pub const TX_EMPTY: Self = Self { bank: Bank::A, bit: 2 };
    pub const TX_ERROR: Self = Self { bank: Bank::A, bit: 1 };
    pub const TIMER_B: Self = Self { bank: Bank::A, bit: 0 };
    pub const FDC: Self = Self { bank: Bank::B, bit: 7 };
    pub const ACIA: Self = Self { bank: Bank::B, bit: 6 };
    pub const TIMER_C: Self = Self { bank: Bank::B, bit: 5 };
    pub const TIMER_D: Self = Self { bank: Bank::B, bit: 4 };
    pub const BLITTER: Self = Self { bank: Bank::B, bit: 3 };
    pub const GPIP2: Self = Self { bank: Bank::B, bit: 2 };
    pub const GPIP1: Self = Self { bank: Bank::B, bit: 1 };
    pub const GPIP0: Self = Self { bank: Bank::B, bit: 0 };

    #[must_use]
    pub const fn channel_index(self) -> u8 {
        match self.bank {
            Bank::A => 8 + self.bit,
            Bank::B => self.bit,
        }
    }
}

/// Result of an interrupt-acknowledge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    /// A channel won arbitration; carries the full vector byte.
    Channel(u8),
    /// No channel qualified: spurious vector 0x18.
    Spurious,
}

fn reload(value: u8) -> u16 {
    if value == 0 { 256 } else { u16::from(value) }
}

fn prescaler_divisor(mode: u8) -> Option<u32> {
    match mode & 0x0F {
        1 => Some(4),
        2 => Some(10),
        3 => Some(16),
        4 => Some(50),
        5 => Some(64),
        6 => Some(100),
        7 => Some(200),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Timer {
    counter: i32,
    phase_acc: u64,
    /// Set on a stopped-to-counting control-register transition; the
    /// counter is loaded from the data register on the first tick after,
    /// not at the control-register write itself, so a data-register
    /// write that follows the mode change still takes effect.
    needs_reload: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self { counter: 0, phase_acc: 0, needs_reload: true }
    }
}

/// Motorola MC68901 Multi-Function Peripheral.
#[derive(Debug, Clone)]
pub struct Mfp68901 {
    gpip: u8,
    aer: u8,
    ddr: u8,
    iera: u8,
    ierb: u8,
    ipra: u8,
    iprb: u8,
    isra: u8,
    isrb: u8,
    imra: u8,
    imrb: u8,
    vr: u8,
    tacr: u8,
    tbcr: u8,
    tcdcr: u8,
    tadr: u8,
    tbdr: u8,
    tcdr: u8,
    tddr: u8,
    timer_a: Timer,
    timer_b: Timer,
    timer_c: Timer,
    timer_d: Timer,
    mfp_acc: u64,
}

impl Default for Mfp68901 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mfp68901 {
    #[must_use]
    pub fn new() -> Self {
        let mut mfp = Self {
            gpip: 0,
            aer: 0,
            ddr: 0,
            iera: 0,
            ierb: 0,
            ipra: 0,
            iprb: 0,
            isra: 0,
            isrb: 0,
            imra: 0,
            imrb: 0,
            vr: 0,
            tacr: 0,
            tbcr: 0,
            tcdcr: 0,
            tadr: 0,
            tbdr: 0,
            tcdr: 0,
            tddr: 0,
            timer_a: Timer::default(),
            timer_b: Timer::default(),
            timer_c: Timer::default(),
            timer_d: Timer::default(),
            mfp_acc: 0,
        };
        mfp.reset();
        mfp
    }

    pub fn reset(&mut self) {
        self.gpip = 0xFF;
        self.aer = 0;
        self.ddr = 0;
        self.iera = 0;
        self.ierb = 0;
        self.ipra = 0;
        self.iprb = 0;
        self.isra = 0;
        self.isrb = 0;
        self.imra = 0;
        self.imrb = 0;
        self.vr = 0x40;
        self.tacr = 0;
        self.tbcr = 0;
        self.tcdcr = 0;
        self.tadr = 0;
        self.tbdr = 0;
        self.tcdr = 0;
        self.tddr = 0;
        self.timer_a = Timer::default();
        self.timer_b = Timer::default();
        self.timer_c = Timer::default();
        self.timer_d = Timer::default();
        self.mfp_acc = 0;
    }

    fn set_ipr(&mut self, ch: Channel) {
        match ch.bank {
            Bank::A => self.ipra |= 1 << ch.bit,
            Bank::B => self.iprb |= 1 << ch.bit,
        }
    }

    fn clear_ipr(&mut self, ch: Channel) {
        match ch.bank {
            Bank::A => self.ipra &= !(1 << ch.bit),
            Bank::B => self.iprb &= !(1 << ch.bit),
        }
    }

    fn isr_bit(&self, ch: Channel) -> bool {
        match ch.bank {
            Bank::A => self.isra & (1 << ch.bit) != 0,
            Bank::B => self.isrb & (1 << ch.bit) != 0,
        }
    }

    fn set_isr(&mut self, ch: Channel) {
        match ch.bank {
            Bank::A => self.isra |= 1 << ch.bit,
            Bank::B => self.isrb |= 1 << ch.bit,
        }
    }

    fn software_eoi(&self) -> bool {
        self.vr & 0x08 != 0
    }

    /// True iff `ch` is active: `IPRx & IERx & IMRx` set and, under
    /// software end-of-interrupt, its ISR bit is clear.
    fn channel_active(&self, ch: Channel) -> bool {
        let bit = 1u8 << ch.bit;
        let (ipr, ier, imr) = match ch.bank {
            Bank::A => (self.ipra, self.iera, self.imra),
            Bank::B => (self.iprb, self.ierb, self.imrb),
        };
        let gated = ipr & ier & imr & bit != 0;
        gated && !(self.software_eoi() && self.isr_bit(ch))
    }

    fn all_channels() -> [Channel; 16] {
        [
            Channel::GPIP7,
            Channel::GPIP6,
            Channel::TIMER_A,
            Channel::RX_FULL,
            Channel::RX_ERROR,
            Channel::TX_EMPTY,
            Channel::TX_ERROR,
            Channel::TIMER_B,
            Channel::FDC,
            Channel::ACIA,
            Channel::TIMER_C,
            Channel::TIMER_D,
            Channel::BLITTER,
            Channel::GPIP2,
            Channel::GPIP1,
            Channel::GPIP0,
        ]
    }

    /// True iff any channel is currently active; drives the
    /// InterruptArbiter's MFP flag (IPL >= 6 while this holds).
    #[must_use]
    pub fn pending(&self) -> bool {
        Self::all_channels().iter().any(|&ch| self.channel_active(ch))
    }

    fn highest_isr_channel_index(&self) -> Option<u8> {
        let combined = (u16::from(self.isra) << 8) | u16::from(self.isrb);
        if combined == 0 { None } else { Some(15 - combined.leading_zeros() as u8) }
    }

    /// Interrupt-acknowledge: select the highest-priority active channel
    /// whose priority exceeds the highest in-service channel, clear its
    /// IPR bit, set its ISR bit under software-EOI, and emit its vector.
    pub fn acknowledge(&mut self) -> Vector {
        let floor = self.highest_isr_channel_index();
        let winner = Self::all_channels()
            .into_iter()
            .filter(|&ch| self.channel_active(ch))
            .filter(|&ch| floor.is_none_or(|f| ch.channel_index() > f))
            .max_by_key(|ch| ch.channel_index());

        let Some(ch) = winner else {
            return Vector::Spurious;
        };
        self.clear_ipr(ch);
        if self.software_eoi() {
            self.set_isr(ch);
        }
        Vector::Channel((self.vr & 0xF0) | ch.channel_index())
    }

    /// Software end-of-interrupt: clear an in-service ISR bit manually.
    /// (Writing a 1 to an ISR bit position clears it, per the 68901.)
    pub fn clear_in_service(&mut self, ch: Channel) {
        match ch.bank {
            Bank::A => self.isra &= !(1 << ch.bit),
            Bank::B => self.isrb &= !(1 << ch.bit),
        }
    }

    fn tick_timer(timer: &mut Timer, mfp_ticks: u64, div: u32, reload_reg: u8) -> u32 {
        if timer.needs_reload {
            timer.counter = i32::from(reload(reload_reg));
            timer.needs_reload = false;
        }
        timer.phase_acc += mfp_ticks;
        let div = u64::from(div);
        let dec = timer.phase_acc / div;
        timer.phase_acc %= div;
        if dec == 0 {
            return 0;
        }
        timer.counter -= dec as i32;
        let mut fires = 0u32;
        while timer.counter <= 0 {
            timer.counter += i32::from(reload(reload_reg));
            fires += 1;
        }
        fires
    }

    /// Advance timers A-D (in delay/prescaler mode) by `cpu_cycles` host
    /// cycles, converted through the rational MFP/CPU clock ratio.
    pub fn update_timers(&mut self, cpu_cycles: u32) {
        self.mfp_acc += u64::from(cpu_cycles) * MFP_HZ;
        let mfp_ticks = self.mfp_acc / CPU_HZ;
        self.mfp_acc %= CPU_HZ;
        if mfp_ticks == 0 {
            return;
        }

        if let Some(div) = prescaler_divisor(self.tacr) {
            let tadr = self.tadr;
            let fires = Self::tick_timer(&mut self.timer_a, mfp_ticks, div, tadr);
            if fires > 0 {
                self.set_ipr(Channel::TIMER_A);
            }
        }
        if let Some(div) = prescaler_divisor(self.tbcr) {
            let tbdr = self.tbdr;
            let fires = Self::tick_timer(&mut self.timer_b, mfp_ticks, div, tbdr);
            if fires > 0 {
                self.set_ipr(Channel::TIMER_B);
            }
        }
        if let Some(div) = prescaler_divisor(self.tcdcr >> 4) {
            let tcdr = self.tcdr;
            let fires = Self::tick_timer(&mut self.timer_c, mfp_ticks, div, tcdr);
            if fires > 0 {
                self.set_ipr(Channel::TIMER_C);
            }
        }
        if let Some(div) = prescaler_divisor(self.tcdcr) {
            let tddr = self.tddr;
            let fires = Self::tick_timer(&mut self.timer_d, mfp_ticks, div, tddr);
            if fires > 0 {
                self.set_ipr(Channel::TIMER_D);
            }
        }
    }

    /// Timer A in event-count mode advances once per GPIP bit 4 edge,
    /// which the frame loop pulses once per visible scanline.
    pub fn tick_event_count_a(&mut self) {
        if self.tacr & 0x0F == 8 {
            if self.timer_a.needs_reload {
                self.timer_a.counter = i32::from(reload(self.tadr));
                self.timer_a.needs_reload = false;
            }
            self.timer_a.counter -= 1;
            if self.timer_a.counter <= 0 {
                self.timer_a.counter = i32::from(reload(self.tadr));
                self.set_ipr(Channel::TIMER_A);
            }
        }
    }

    /// Timer B in event-count mode advances once per visible scanline.
    pub fn tick_event_count_b(&mut self) {
        if self.tbcr & 0x0F == 8 {
            if self.timer_b.needs_reload {
                self.timer_b.counter = i32::from(reload(self.tbdr));
                self.timer_b.needs_reload = false;
            }
            self.timer_b.counter -= 1;
            if self.timer_b.counter <= 0 {
                self.timer_b.counter = i32::from(reload(self.tbdr));
                self.set_ipr(Channel::TIMER_B);
            }
        }
    }

    /// Drive a GPIP input bit to a new level. Computes the edge against
    /// AER and, for bits 4/5, latches the ACIA/FDC interrupt request.
    pub fn set_gpip(&mut self, bit: u8, level: bool) {
        let mask = 1u8 << bit;
        let was = self.gpip & mask != 0;
        if was == level {
            return;
        }
        self.gpip = if level { self.gpip | mask } else { self.gpip & !mask };
        let rising_triggers = self.aer & mask != 0;
        let edge_matches = level == rising_triggers;
        if !edge_matches {
            return;
        }
        match bit {
            4 => self.set_ipr(Channel::ACIA),
            5 => self.set_ipr(Channel::FDC),
            _ => {}
        }
    }

    #[must_use]
    pub fn gpip(&self) -> u8 {
        self.gpip
    }

    /// Read a register by its byte offset from 0xFFFA00 (odd offsets
    /// only carry a register; even offsets read back 0xFF).
    #[must_use]
    pub fn read(&mut self, offset: u8) -> u8 {
        match offset {
            0x01 => self.gpip,
            0x03 => self.aer,
            0x05 => self.ddr,
            0x07 => self.iera,
            0x09 => self.ierb,
            0x0B => self.ipra,
            0x0D => self.iprb,
            0x0F => self.isra,
            0x11 => self.isrb,
            0x13 => self.imra,
            0x15 => self.imrb,
            0x17 => self.vr,
            0x19 => self.tacr,
            0x1B => self.tbcr,
            0x1D => self.tcdcr,
            0x1F => self.tadr,
            0x21 => self.tbdr,
            0x23 => self.tcdr,
            0x25 => self.tddr,
            _ => 0xFF,
        }
    }

    /// Write a register by its byte offset from 0xFFFA00.
    pub fn write(&mut self, offset: u8, value: u8) {
        match offset {
            0x01 => self.gpip = value,
            0x03 => self.aer = value,
            0x05 => self.ddr = value,
            0x07 => self.iera = value,
            0x09 => self.ierb = value,
            // Writing a 0 to an IPR bit clears it; writing 1 is a no-op.
            0x0B => self.ipra &= value,
            0x0D => self.iprb &= value,
            0x0F => self.isra &= value,
            0x11 => self.isrb &= value,
            0x13 => self.imra = value,
            0x15 => self.imrb = value,
            0x17 => self.vr = value,
            0x19 => {
                let was_active = self.tacr & 0x0F != 0;
                self.tacr = value;
                if !was_active && self.tacr & 0x0F != 0 {
                    self.timer_a.needs_reload = true;
                }
            }
            0x1B => {
                let was_active = self.tbcr & 0x0F != 0;
                self.tbcr = value;
                if !was_active && self.tbcr & 0x0F != 0 {
                    self.timer_b.needs_reload = true;
                }
            }
            0x1D => {
                let was_c_active = self.tcdcr & 0xF0 != 0;
                let was_d_active = self.tcdcr & 0x0F != 0;
                self.tcdcr = value;
                if !was_c_active && self.tcdcr & 0xF0 != 0 {
                    self.timer_c.needs_reload = true;
                }
                if !was_d_active && self.tcdcr & 0x0F != 0 {
                    self.timer_d.needs_reload = true;
                }
            }
            0x1F => self.tadr = value,
            0x21 => self.tbdr = value,
            0x23 => self.tcdr = value,
            0x25 => self.tddr = value,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state_matches_spec() {
        let mfp = Mfp68901::new();
        assert_eq!(mfp.gpip, 0xFF);
        assert_eq!(mfp.aer, 0);
        assert_eq!(mfp.vr, 0x40);
        assert_eq!(mfp.ipra, 0);
        assert_eq!(mfp.imra, 0);
    }

    #[test]
    fn timer_d_one_shot_fires_after_expected_cycles() {
        let mut mfp = Mfp68901::new();
        mfp.write(0x1D, 7); // TCDCR low nibble: timer D prescaler mode 7 (/200)
        mfp.write(0x25, 246); // TDDR reload
        mfp.write(0x15, 0xFF); // IMRB: unmask all of bank B
        mfp.write(0x09, 0xFF); // IERB: enable all of bank B

        // ~20ms at 8MHz = 160_000 cycles.
        let mut fired_at = None;
        for cycles_done in (0..200_000u32).step_by(1000) {
            mfp.update_timers(1000);
            if mfp.iprb & (1 << Channel::TIMER_D.bit) != 0 {
                fired_at = Some(cycles_done + 1000);
                break;
            }
        }
        let fired_at = fired_at.expect("timer D never fired");
        assert!((155_000..=165_000).contains(&fired_at), "fired at {fired_at}");
    }

    #[test]
    fn mfp_pending_requires_ipl_6_per_spec_invariant() {
        let mut mfp = Mfp68901::new();
        mfp.write(0x09, 1 << Channel::ACIA.bit); // IERB
        mfp.write(0x15, 1 << Channel::ACIA.bit); // IMRB
        assert!(!mfp.pending());
        mfp.set_gpip(4, false); // falling edge, AER bit4 clear -> ACIA latches
        assert!(mfp.pending());
    }

    #[test]
    fn software_eoi_masks_channel_until_isr_cleared() {
        let mut mfp = Mfp68901::new();
        mfp.write(0x17, 0x08); // VR bit3: software EOI
        mfp.write(0x09, 1 << Channel::ACIA.bit);
        mfp.write(0x15, 1 << Channel::ACIA.bit);
        mfp.set_gpip(4, false);
        assert!(mfp.pending());
        let vector = mfp.acknowledge();
        assert!(matches!(vector, Vector::Channel(_)));
        // ISR bit now set for ACIA; IPR was cleared by acknowledge, so
        // pending should be false regardless of EOI gating.
        assert!(!mfp.pending());
        mfp.clear_in_service(Channel::ACIA);
        mfp.set_gpip(4, true);
        mfp.set_gpip(4, false);
        assert!(mfp.pending());
    }

    #[test]
    fn acknowledge_returns_spurious_when_nothing_active() {
        let mut mfp = Mfp68901::new();
        assert_eq!(mfp.acknowledge(), Vector::Spurious);
    }

    #[test]
    fn acknowledge_prefers_higher_priority_bank_a_channel() {
        let mut mfp = Mfp68901::new();
        mfp.write(0x07, 0xFF); // IERA
        mfp.write(0x13, 0xFF); // IMRA
        mfp.write(0x09, 0xFF); // IERB
        mfp.write(0x15, 0xFF); // IMRB

        // Latch both Timer A (bank A, channel 13) and ACIA (bank B,
        // channel 6) pending at once; Timer A must win arbitration.
        mfp.write(0x19, 8); // TACR: event-count mode
        mfp.write(0x1F, 1); // TADR reload = 1
        mfp.tick_event_count_a();
        mfp.set_gpip(4, false);

        match mfp.acknowledge() {
            Vector::Channel(v) => assert_eq!(v & 0x0F, Channel::TIMER_A.channel_index()),
            Vector::Spurious => panic!("expected Timer A to win arbitration"),
        }
    }
}
