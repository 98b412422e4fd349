//! Top-level machine: owns the CPU core, the bus, and the interrupt
//! arbiter, and drives the per-scanline master loop described by the
//! distilled PAL frame timing.

use std::thread;
use std::time::{Duration, Instant};

use atari_video_shifter::Mode as VideoMode;
use motorola_68000::CpuCore;
use motorola_mfp_68901::Vector as MfpVector;

use crate::interrupt::InterruptArbiter;
use crate::memory::Bus;

/// CPU cycles spent on the "visible" portion of a scanline before HBL.
pub const SCANLINE_HBL_CYCLES: u32 = 448;
/// CPU cycles spent on the horizontal blanking tail of a scanline.
pub const SCANLINE_BLANK_CYCLES: u32 = 64;
/// Total CPU cycles per scanline.
pub const SCANLINE_TOTAL_CYCLES: u32 = SCANLINE_HBL_CYCLES + SCANLINE_BLANK_CYCLES;
/// Scanlines per PAL frame.
pub const SCANLINES_PER_FRAME: u32 = 313;
/// First scanline of the visible (rendered) region.
pub const VISIBLE_SCANLINE_START: u32 = 63;
/// One past the last visible scanline.
pub const VISIBLE_SCANLINE_END: u32 = 263;
/// Frame height once visible scanlines are rendered.
pub const FRAME_HEIGHT_PAL: usize = (VISIBLE_SCANLINE_END - VISIBLE_SCANLINE_START) as usize;

const FRAME_PERIOD: Duration = Duration::from_nanos(20_000_000); // 1/50 s
const COARSE_WAIT_THRESHOLD: Duration = Duration::from_millis(2);
const MAX_SLIP: Duration = Duration::from_millis(100);

/// Owns a CPU core, the bus (RAM/ROM/devices), and the interrupt
/// arbiter; drives one PAL frame per `run_frame` call.
pub struct AtariSt<C: CpuCore> {
    pub cpu: C,
    pub bus: Bus,
    pub interrupt: InterruptArbiter,
    pub framebuffer: Vec<u32>,
    pub frame_ready: bool,
    max_speed: bool,
    pace_anchor: Option<Instant>,
}

impl<C: CpuCore> AtariSt<C> {
    pub fn new(cpu: C, bus: Bus, max_speed: bool) -> Self {
        Self {
            cpu,
            bus,
            interrupt: InterruptArbiter::new(),
            framebuffer: vec![0; atari_video_shifter::FB_WIDTH * atari_video_shifter::FB_HEIGHT],
            frame_ready: false,
            max_speed,
            pace_anchor: None,
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.interrupt.reset();
        self.frame_ready = false;
        self.pace_anchor = None;
    }

    /// Interrupt-acknowledge callback a CPU core invokes when it honors
    /// an IPL request: clears the matching pending flag and returns the
    /// vector number (autovector, or an MFP-supplied user vector).
    pub fn irq_ack(&mut self, level: u8) -> u8 {
        match level {
            2 => {
                self.interrupt.clear_hbl();
                26
            }
            4 => {
                self.interrupt.clear_vbl();
                28
            }
            6 => match self.bus.mfp.acknowledge() {
                MfpVector::Channel(v) => v,
                MfpVector::Spurious => 0x18,
            },
            other => 24 + other,
        }
    }

    fn service_interrupts(&mut self) {
        let ipl = self.interrupt.ipl(self.bus.mfp.pending());
        self.cpu.set_ipl(ipl);
        if self.bus.has_pending_fault() {
            self.bus.service_bus_error(&mut self.cpu);
        }
    }

    /// Run exactly one PAL frame: 313 scanlines, each driving the CPU
    /// in two batches interleaved with the YM and MFP, followed by HBL
    /// and an ACIA sync; scanlines 63..263 additionally render one row
    /// and tick the MFP's event-count inputs. Ends by raising VBL.
    pub fn run_frame(&mut self) {
        let resolution = self.bus.read8(0xFF_8260);
        let mode = VideoMode::from_register(resolution).unwrap_or(VideoMode::Low);

        let base = self.bus.video_base_addr();
        self.bus.set_video_counter_addr(base);

        for scanline in 0..SCANLINES_PER_FRAME {
            self.cpu.execute_for(SCANLINE_HBL_CYCLES);
            self.bus.ym.sync(SCANLINE_HBL_CYCLES);
            self.bus.mfp.update_timers(SCANLINE_HBL_CYCLES);
            self.service_interrupts();

            self.cpu.execute_for(SCANLINE_BLANK_CYCLES);
            self.bus.ym.sync(SCANLINE_BLANK_CYCLES);
            self.bus.mfp.update_timers(SCANLINE_BLANK_CYCLES);
            self.service_interrupts();

            self.interrupt.raise_hbl();
            self.bus.acia.sync(SCANLINE_TOTAL_CYCLES);
            self.service_interrupts();

            if (VISIBLE_SCANLINE_START..VISIBLE_SCANLINE_END).contains(&scanline) {
                let counter = self.bus.video_counter_addr();
                self.bus.set_video_counter_addr(counter);
                let row = (scanline - VISIBLE_SCANLINE_START) as usize;
                if self
                    .bus
                    .shifter
                    .blit_line(self.bus.ram(), counter, row, mode, &mut self.framebuffer)
                    .is_err()
                {
                    log::warn!("video shifter rejected resolution register {resolution:#04X}");
                }
                self.bus.set_video_counter_addr((counter + 160) & 0x00FF_FFFF);
                self.bus.mfp.tick_event_count_a();
                self.bus.mfp.tick_event_count_b();
            }
        }

        self.interrupt.raise_vbl();
        self.service_interrupts();
        self.frame_ready = true;
        self.pace();
    }

    /// Hybrid coarse-sleep/busy-wait pacing to 50 Hz, skipped entirely
    /// when `max_speed` is configured. A slip over 100ms resets the
    /// schedule anchor instead of trying to catch up.
    fn pace(&mut self) {
        if self.max_speed {
            return;
        }
        let now = Instant::now();
        let anchor = self.pace_anchor.unwrap_or(now);
        let deadline = anchor + FRAME_PERIOD;

        if deadline > now {
            let mut remaining = deadline - now;
            if remaining > COARSE_WAIT_THRESHOLD {
                thread::sleep(remaining - COARSE_WAIT_THRESHOLD);
                remaining = deadline.saturating_duration_since(Instant::now());
            }
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
            let _ = remaining;
            self.pace_anchor = Some(deadline);
        } else if now.saturating_duration_since(deadline) > MAX_SLIP {
            self.pace_anchor = Some(now);
        } else {
            self.pace_anchor = Some(deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{TOS_BASE_STF, TOS_SIZE_STF};
    use motorola_68000::NullCpu;

    fn test_machine() -> AtariSt<NullCpu> {
        let rom = vec![0u8; TOS_SIZE_STF];
        let bus = Bus::new(512 * 1024, rom, TOS_BASE_STF, 48_000);
        AtariSt::new(NullCpu::new(), bus, true)
    }

    #[test]
    fn run_frame_renders_full_visible_height_and_raises_vbl() {
        let mut machine = test_machine();
        machine.run_frame();
        assert!(machine.frame_ready);
        assert_eq!(machine.framebuffer.len(), atari_video_shifter::FB_WIDTH * atari_video_shifter::FB_HEIGHT);
    }

    #[test]
    fn irq_ack_hbl_clears_pending_and_returns_autovector_26() {
        let mut machine = test_machine();
        machine.interrupt.raise_hbl();
        assert_eq!(machine.irq_ack(2), 26);
        assert_eq!(machine.interrupt.ipl(false), 0);
    }

    #[test]
    fn irq_ack_vbl_clears_pending_and_returns_autovector_28() {
        let mut machine = test_machine();
        machine.interrupt.raise_vbl();
        assert_eq!(machine.irq_ack(4), 28);
        assert_eq!(machine.interrupt.ipl(false), 0);
    }

    #[test]
    fn irq_ack_other_levels_return_autovector_24_plus_level() {
        let mut machine = test_machine();
        assert_eq!(machine.irq_ack(3), 27);
    }

    #[test]
    fn reset_clears_frame_ready_and_interrupts() {
        let mut machine = test_machine();
        machine.run_frame();
        machine.interrupt.raise_hbl();
        machine.reset();
        assert!(!machine.frame_ready);
        assert_eq!(machine.interrupt.ipl(false), 0);
    }
}
