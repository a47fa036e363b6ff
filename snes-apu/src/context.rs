//! Owns one CPU + DSP + RAM instance and exposes the host surface: load a
//! snapshot, produce audio, and shuttle bytes through the four ports.
//!
//! The run loop is grounded on the cycle-accounting pattern used to drive the
//! APU from the main SNES bus loop: a running cycle product compared against
//! a fixed per-sample divisor, generalized here into a standalone
//! buffer/cycle-bounded entry point since this crate has no bigger bus loop
//! to be driven from.

use crate::error::FormatError;
use crate::snapshot;
use crate::ChannelMask;
use spc700_emu::traits::BusInterface;
use spc700_emu::{Registers, Spc700, StatusRegister};

use crate::bus::SpcBus;

/// SPC CPU cycles between consecutive output samples: 1.024 MHz / 32 kHz.
pub const TS_CYC: u32 = 32;

pub struct Context {
    cpu: Spc700,
    bus: SpcBus,
    /// SPC cycles remaining until the next DSP tick. Always `0 <= mix_left < TS_CYC`.
    mix_left: u32,
}

impl Context {
    pub fn new() -> Self {
        Self { cpu: Spc700::new(), bus: SpcBus::new(), mix_left: 0 }
    }

    pub fn init(&mut self, state_bytes: &[u8]) -> Result<(), FormatError> {
        let loaded = snapshot::parse(state_bytes)?;

        self.bus.reset();
        self.bus.ram_mut().load(loaded.ram.as_slice());

        for addr in 0..128u8 {
            self.bus.dsp_mut().write_address(addr);
            self.bus.dsp_mut().write_register(loaded.dsp_registers[addr as usize]);
        }
        if loaded.restart_voices_mask != 0 {
            self.bus.dsp_mut().write_address(0x4C);
            self.bus.dsp_mut().write_register(loaded.restart_voices_mask);
        }

        self.cpu.set_registers(Registers {
            a: loaded.a,
            x: loaded.x,
            y: loaded.y,
            sp: loaded.sp,
            pc: loaded.pc,
            psw: StatusRegister::from(loaded.psw),
        });

        // Most snapshot writers leave stale bytes in the echo buffer, which
        // audibly pops at playback start. Zero it now unless echo writes were
        // disabled at snapshot time, in which case the stale bytes were never
        // meant to play back anyway.
        if self.bus.dsp().echo_writes_enabled_at_load() {
            let start = self.bus.dsp().echo_buffer_start();
            let len = self.bus.dsp().echo_buffer_len_bytes();
            self.bus.ram_mut().clear_region(start, len);
        }

        self.mix_left = 0;

        log::debug!("Snapshot loaded, PC={:04X}", loaded.pc);

        Ok(())
    }

    pub fn write_port(&mut self, port: usize, value: u8) {
        self.bus.write_port(port, value);
    }

    pub fn read_port(&self, port: usize) -> u8 {
        self.bus.read_port(port)
    }

    pub fn set_channel_mask(&mut self, mask: ChannelMask) {
        self.bus.dsp_mut().set_channel_mask(mask.bits());
    }

    pub fn channel_mask(&self) -> ChannelMask {
        ChannelMask::new(self.bus.dsp().channel_mask())
    }

    fn run_cpu_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.cpu.tick(&mut self.bus);
        }
    }

    fn emit_sample(&mut self, buf: &mut Option<&mut [u8]>, offset: usize) {
        let (l, r) = self.bus.clock_dsp();
        if let Some(buf) = buf {
            if offset + 4 <= buf.len() {
                let [l_lo, l_hi] = l.to_le_bytes();
                let [r_lo, r_hi] = r.to_le_bytes();
                buf[offset] = l_lo;
                buf[offset + 1] = l_hi;
                buf[offset + 2] = r_lo;
                buf[offset + 3] = r_hi;
            }
        }
    }

    /// Produces audio and advances simulation. `cycle_limit < 0` means "run
    /// until `buf` is full". Returns the number of bytes written (or that
    /// would have been written, if `buf` is `None`).
    pub fn run(&mut self, cycle_limit: i64, mut buf: Option<&mut [u8]>) -> usize {
        let buf_size = buf.as_ref().map_or(0, |b| b.len());
        let buf_slots = buf_size / 4;
        let buf_size_rounded = buf_slots * 4;

        let buffer_bounds_run = cycle_limit < 0
            || (buf.is_some()
                && cycle_limit as u64 >= (buf_slots as u64) * u64::from(TS_CYC) + u64::from(self.mix_left));

        if buffer_bounds_run {
            if self.mix_left > 0 {
                self.run_cpu_cycles(self.mix_left);
            }

            for slot in 0..buf_slots {
                self.emit_sample(&mut buf, slot * 4);
                self.run_cpu_cycles(TS_CYC);
            }

            self.mix_left = 0;
            return buf_size_rounded;
        }

        // Cycles bound the run.
        let cycle_limit = cycle_limit as u32;
        if cycle_limit < self.mix_left {
            self.run_cpu_cycles(cycle_limit);
            self.mix_left -= cycle_limit;
            return 0;
        }

        self.run_cpu_cycles(self.mix_left);
        let mut remaining = cycle_limit - self.mix_left;
        self.mix_left = 0;

        let mut bytes_written = 0;
        let mut offset = 0;
        while remaining >= TS_CYC {
            self.emit_sample(&mut buf, offset);
            offset += 4;
            bytes_written += 4;
            self.run_cpu_cycles(TS_CYC);
            remaining -= TS_CYC;
        }

        if remaining > 0 {
            self.emit_sample(&mut buf, offset);
            bytes_written += 4;
            self.run_cpu_cycles(remaining);
            self.mix_left = TS_CYC - remaining;
        }

        bytes_written
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spc_with_pc(pc: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 65_920];
        bytes[..28].copy_from_slice(b"SNES-SPC700 Sound File Data");
        let [lo, hi] = pc.to_le_bytes();
        bytes[37] = lo;
        bytes[38] = hi;
        bytes
    }

    #[test]
    fn shortest_run_produces_nothing() {
        let mut ctx = Context::new();
        ctx.init(&spc_with_pc(0)).unwrap();
        let written = ctx.run(0, None);
        assert_eq!(written, 0);
        assert_eq!(ctx.mix_left, 0);
    }

    #[test]
    fn exact_boundary_buffer_produces_one_frame() {
        let mut ctx = Context::new();
        ctx.init(&spc_with_pc(0)).unwrap();
        let mut buf = [0u8; 4];
        let written = ctx.run(-1, Some(&mut buf));
        assert_eq!(written, 4);
        assert_eq!(ctx.mix_left, 0);
    }

    #[test]
    fn partial_slot_carries_across_calls() {
        let mut ctx = Context::new();
        ctx.init(&spc_with_pc(0)).unwrap();

        let written = ctx.run(i64::from(TS_CYC / 2), None);
        assert_eq!(written, 0);
        assert_eq!(ctx.mix_left, TS_CYC - TS_CYC / 2);

        let mut buf = [0u8; 4];
        let written = ctx.run(-1, Some(&mut buf));
        assert_eq!(written, 4);
        assert_eq!(ctx.mix_left, 0);
    }

    #[test]
    fn port_write_is_visible_to_cpu_side_read() {
        let mut ctx = Context::new();
        ctx.init(&spc_with_pc(0)).unwrap();
        ctx.write_port(2, 0x42);
        assert_eq!(ctx.bus.input_port(2), 0x42);
    }

    #[test]
    fn format_rejection_on_garbage_buffer() {
        let mut ctx = Context::new();
        let bytes = vec![0u8; 100];
        assert!(ctx.init(&bytes).is_err());
    }
}
