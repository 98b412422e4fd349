//! General Instrument YM2149 Programmable Sound Generator.
//!
//! Three square-wave tone channels, a shared 17-bit LFSR noise source, a
//! shared 32-step/3-block envelope generator, a mixer with a logarithmic
//! DAC, and a 16.16 fixed-point resampler feeding a capped, DC-filtered
//! mono ring buffer.
//!
//! # Register map (16 registers, active 0-13)
//!
//! | Reg | Name | Bits |
//! |-----|------|------|
//! | R0/R1 | A period | fine 7-0 / coarse 3-0 |
//! | R2/R3 | B period | fine 7-0 / coarse 3-0 |
//! | R4/R5 | C period | fine 7-0 / coarse 3-0 |
//! | R6 | Noise period | 4-0 |
//! | R7 | Mixer | 7-0 |
//! | R8/R9/R10 | A/B/C volume | 4-0 (bit 4 = envelope mode) |
//! | R11/R12 | Envelope period | fine 7-0 / coarse 7-0 |
//! | R13 | Envelope shape | 3-0 |
//! | R14 | I/O port A (drive select) | 7-0 |
//! | R15 | I/O port B | 7-0 |

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;

const INTERNAL_HZ: u32 = 250_000;
const CPU_CYCLES_PER_TICK: u32 = 32;

#[derive(Debug, Clone, Default)]
struct Tone {
    period: u16,
    counter: u16,
    square: bool,
}

impl Tone {
    fn clock(&mut self) {
        self.counter += 1;
        if self.counter >= self.period.max(1) {
            self.counter = 0;
            self.square = !self.square;
        }
    }
}

#[derive(Debug, Clone)]
struct Noise {
    period: u8,
    counter: u16,
    lfsr: u32,
    output: bool,
}

impl Default for Noise {
    fn default() -> Self {
        Self { period: 0, counter: 0, lfsr: 1, output: false }
    }
}

impl Noise {
    fn clock(&mut self) {
        self.counter += 1;
        let effective_period = 2 * u16::from(self.period.max(1));
        if self.counter >= effective_period {
            self.counter = 0;
            if self.lfsr & 1 != 0 {
                self.lfsr = (self.lfsr >> 1) ^ 0x1_2000;
                self.output = true;
            } else {
                self.lfsr >>= 1;
                self.output = false;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Envelope {
    period: u16,
    counter: i32,
    position: u8,
    shape: u8,
}

impl Envelope {
    fn clock(&mut self) {
        self.counter -= 1;
        if self.counter <= 0 {
            self.counter = i32::from(self.period.max(1));
            self.position += 1;
            if self.position == 96 {
                self.position = 64;
            }
        }
    }

    fn reset_phase(&mut self) {
        self.position = 0;
        self.counter = 0;
    }

    /// Output level 0..31 for the current position and shape, generated
    /// from the four control bits (hold/alternate/attack/continue)
    /// rather than a hand-transcribed 16x96 table.
    fn value(&self) -> u8 {
        let hold = self.shape & 0x01 != 0;
        let alternate = self.shape & 0x02 != 0;
        let attack = self.shape & 0x04 != 0;
        let cont = self.shape & 0x08 != 0;

        let block = (self.position / 32).min(2);
        let step = self.position % 32;

        if !cont {
            if block == 0 {
                return if attack { step } else { 31 - step };
            }
            return if attack { 31 } else { 0 };
        }

        if hold && block >= 1 {
            return if attack { 31 } else { 0 };
        }

        let block_attack = if alternate && block % 2 == 1 { !attack } else { attack };
        if block_attack { step } else { 31 - step }
    }
}

/// A bounded, drop-oldest ring of mono PCM samples. Single producer (the
/// YM sync call), consumed by a host audio callback via [`Self::pull`].
#[derive(Debug, Clone)]
pub struct AudioRing {
    samples: VecDeque<f32>,
    cap: usize,
    last: f32,
}

impl AudioRing {
    fn new(cap: usize) -> Self {
        Self { samples: VecDeque::with_capacity(cap), cap: cap.max(1), last: 0.0 }
    }

    fn push(&mut self, sample: f32) {
        if self.samples.len() >= self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.last = sample;
    }

    /// Pull up to `n` samples; underrun is padded by repeating the last
    /// emitted sample (or silence before any sample has been produced).
    pub fn pull(&mut self, n: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.samples.pop_front().unwrap_or(self.last));
        }
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// General Instrument YM2149 sound generator.
#[derive(Debug, Clone)]
pub struct Ym2149 {
    regs: [u8; 16],
    selected_reg: u8,
    tones: [Tone; 3],
    noise: Noise,
    envelope: Envelope,
    volume_table: [f32; 32],
    resample_ratio: u32,
    resample_acc: u32,
    host_rate: u32,
    dc_filter_prev_x: f32,
    dc_filter_prev_y: f32,
    ring: AudioRing,
}

impl Ym2149 {
    #[must_use]
    pub fn new(host_rate: u32) -> Self {
        let mut volume_table = [0.0f32; 32];
        for (i, slot) in volume_table.iter_mut().enumerate() {
            // Logarithmic DAC curve, ~1.5 dB per step, normalized to 1.0.
            *slot = if i == 0 { 0.0 } else { 10f32.powf((i as f32 - 31.0) * 1.5 / 20.0) };
        }
        let resample_ratio = ((u64::from(INTERNAL_HZ) << 16) / u64::from(host_rate.max(1))) as u32;
        let mut ym = Self {
            regs: [0; 16],
            selected_reg: 0,
            tones: [Tone::default(), Tone::default(), Tone::default()],
            noise: Noise::default(),
            envelope: Envelope::default(),
            volume_table,
            resample_ratio,
            resample_acc: 0,
            host_rate: host_rate.max(1),
            dc_filter_prev_x: 0.0,
            dc_filter_prev_y: 0.0,
            ring: AudioRing::new((host_rate / 4).max(1) as usize),
        };
        ym.reset();
        ym
    }

    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.regs[7] = 0xFF; // mixer: all tone/noise disabled
        self.selected_reg = 0;
        self.tones = [Tone::default(), Tone::default(), Tone::default()];
        self.noise = Noise::default();
        self.envelope = Envelope::default();
        self.resample_acc = 0;
    }

    pub fn select_register(&mut self, reg: u8) {
        self.selected_reg = reg & 0x0F;
    }

    pub fn write_data(&mut self, value: u8) {
        let reg = self.selected_reg;
        self.regs[reg as usize] = value;
        match reg {
            0 | 1 => self.tones[0].period = self.period(0),
            2 | 3 => self.tones[1].period = self.period(1),
            4 | 5 => self.tones[2].period = self.period(2),
            6 => self.noise.period = value & 0x1F,
            11 | 12 => self.envelope.period = (u16::from(self.regs[12]) << 8) | u16::from(self.regs[11]),
            13 => {
                self.envelope.shape = value & 0x0F;
                self.envelope.reset_phase();
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn read_data(&self) -> u8 {
        self.regs[self.selected_reg as usize]
    }

    fn period(&self, channel: usize) -> u16 {
        let fine = u16::from(self.regs[channel * 2]);
        let coarse = u16::from(self.regs[channel * 2 + 1] & 0x0F);
        (coarse << 8) | fine
    }

    /// Decoded state of R14 (I/O port A): `(side, drive_a_select,
    /// drive_b_select)`. Drive-select bits are active low.
    #[must_use]
    pub fn drive_select(&self) -> (bool, bool, bool) {
        let port = self.regs[14];
        (port & 0x01 != 0, port & 0x02 == 0, port & 0x04 == 0)
    }

    fn mix_sample(&self) -> f32 {
        let mixer = self.regs[7];
        let mut sum = 0.0f32;
        for x in 0..3 {
            let tone_enabled = mixer & (1 << x) == 0;
            let noise_enabled = mixer & (1 << (x + 3)) == 0;
            let mut out = true;
            if tone_enabled {
                out &= self.tones[x].square;
            }
            if noise_enabled {
                out &= self.noise.output;
            }
            let vol_reg = self.regs[8 + x];
            let level = if !out {
                0
            } else if vol_reg & 0x10 != 0 {
                self.envelope.value()
            } else {
                let v4 = vol_reg & 0x0F;
                (v4 << 1) | 1
            };
            sum += self.volume_table[level as usize];
        }
        sum / 3.5
    }

    /// Advance the chip by `cpu_cycles` CPU cycles (32 CPU cycles per
    /// 250 kHz internal tick), clocking tone/noise/envelope generators,
    /// resampling to the host rate, and pushing filtered samples onto
    /// the audio ring.
    pub fn sync(&mut self, cpu_cycles: u32) {
        let ticks = cpu_cycles / CPU_CYCLES_PER_TICK;
        for _ in 0..ticks {
            for tone in &mut self.tones {
                tone.clock();
            }
            self.noise.clock();
            self.envelope.clock();

            self.resample_acc = self.resample_acc.wrapping_add(0x1_0000);
            while self.resample_acc >= self.resample_ratio {
                self.resample_acc -= self.resample_ratio;
                let raw = self.mix_sample();
                let filtered = raw - self.dc_filter_prev_x + 0.995 * self.dc_filter_prev_y;
                self.dc_filter_prev_x = raw;
                self.dc_filter_prev_y = filtered;
                self.ring.push(filtered);
            }
        }
    }

    /// Pull `n` host-rate samples from the audio ring.
    pub fn pull_samples(&mut self, n: usize) -> Vec<f32> {
        self.ring.pull(n)
    }

    #[must_use]
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn host_rate(&self) -> u32 {
        self.host_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(ym: &mut Ym2149, reg: u8, value: u8) {
        ym.select_register(reg);
        ym.write_data(value);
    }

    #[test]
    fn tone_period_zero_and_one_are_indistinguishable() {
        let mut zero = Ym2149::new(48_000);
        write(&mut zero, 0, 0);
        write(&mut zero, 1, 0);
        write(&mut zero, 7, 0xFE); // enable tone A, disable B/C and all noise

        let mut one = Ym2149::new(48_000);
        write(&mut one, 0, 1);
        write(&mut one, 1, 0);
        write(&mut one, 7, 0xFE);

        for _ in 0..64 {
            zero.sync(32);
            one.sync(32);
            assert_eq!(zero.tones[0].square, one.tones[0].square);
        }
    }

    #[test]
    fn envelope_position_stays_in_bounds() {
        let mut ym = Ym2149::new(48_000);
        write(&mut ym, 11, 1);
        write(&mut ym, 12, 0);
        write(&mut ym, 13, 0x0E); // continuing sawtooth
        for _ in 0..10_000 {
            ym.sync(32);
            assert!(ym.envelope.position <= 95);
        }
    }

    #[test]
    fn lfsr_never_reaches_zero() {
        let mut ym = Ym2149::new(48_000);
        write(&mut ym, 6, 1);
        write(&mut ym, 7, 0xF7); // enable noise A only
        for _ in 0..5_000 {
            ym.sync(32);
            assert_ne!(ym.noise.lfsr, 0);
        }
    }

    #[test]
    fn mixer_disabling_both_tone_and_noise_silences_channel() {
        let mut ym = Ym2149::new(48_000);
        write(&mut ym, 0, 50);
        write(&mut ym, 1, 0);
        write(&mut ym, 8, 0x0F); // full fixed volume, if gated on
        write(&mut ym, 7, 0xFF); // all tone/noise disabled
        for _ in 0..256 {
            ym.sync(32);
        }
        let samples = ym.pull_samples(4);
        for s in samples {
            assert!(s.abs() < 0.01, "expected near-silence, got {s}");
        }
    }

    #[test]
    fn ring_drops_oldest_samples_under_backpressure() {
        let mut ym = Ym2149::new(8_000); // small cap to force overflow quickly
        write(&mut ym, 7, 0xFF);
        for _ in 0..1_000_000 {
            ym.sync(32);
        }
        assert!(ym.ring_len() <= (8_000 / 4) as usize);
    }

    #[test]
    fn register_14_drive_select_decodes_side_and_drive_bits() {
        let mut ym = Ym2149::new(48_000);
        write(&mut ym, 14, 0b0000_0011); // side=1, drive A active (bit1=1 -> not selected)
        let (side, drive_a, drive_b) = ym.drive_select();
        assert!(side);
        assert!(!drive_a);
        assert!(drive_b);
    }
}
