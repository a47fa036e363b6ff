//! Memory-mapped register overlay ($F0-$FF) plus the IPL ROM window, wired
//! into a [`BusInterface`] the CPU core drives every cycle.
//!
//! Reads/writes to addresses outside the overlaid ranges fall straight
//! through to [`Ram`]. Port-clear-latch edge behavior on CONTROL ($F1) bits
//! 4/5 follows the one-cycle discard pattern documented on
//! [`SpcBus::port01_write_guarded`]/[`SpcBus::port23_write_guarded`].

use crate::bootrom::IPL_ROM;
use crate::dsp::AudioDsp;
use crate::memory::Ram;
use crate::timer::{FastTimer, SlowTimer};
use spc700_emu::traits::BusInterface;

const CONTROL: u16 = 0x00F1;
const DSP_ADDR: u16 = 0x00F2;
const DSP_DATA: u16 = 0x00F3;
const PORT_BASE: u16 = 0x00F4;
const TIMER_TARGET_BASE: u16 = 0x00FA;
const TIMER_OUTPUT_BASE: u16 = 0x00FD;
const ROM_START: u16 = 0xFFC0;

pub struct SpcBus {
    ram: Ram,
    dsp: AudioDsp,
    timers_slow: [SlowTimer; 2],
    timer_fast: FastTimer,
    /// Bytes written by the host, observed by the CPU reading $F4-$F7.
    input_ports: [u8; 4],
    /// Bytes written by the CPU to $F4-$F7, observed by the host.
    output_ports: [u8; 4],
    boot_rom_mapped: bool,
    port01_guard: bool,
    port23_guard: bool,
}

impl SpcBus {
    pub fn new() -> Self {
        Self {
            ram: Ram::new(),
            dsp: AudioDsp::new(),
            timers_slow: [SlowTimer::new(), SlowTimer::new()],
            timer_fast: FastTimer::new(),
            input_ports: [0; 4],
            output_ports: [0; 4],
            boot_rom_mapped: true,
            port01_guard: false,
            port23_guard: false,
        }
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    pub fn dsp(&self) -> &AudioDsp {
        &self.dsp
    }

    pub fn dsp_mut(&mut self) -> &mut AudioDsp {
        &mut self.dsp
    }

    /// Advances the DSP by one tick (`TS_CYC` CPU cycles) and mixes a stereo sample.
    #[must_use]
    pub fn clock_dsp(&mut self) -> (i16, i16) {
        self.dsp.clock(&mut self.ram)
    }

    /// Host-side write into input port `i`; observed by the CPU reading $F4+i.
    ///
    /// Discarded if it lands in the one-cycle window right after the SPC700
    /// cleared this port pair via a CONTROL register write, mirroring the
    /// documented fix for the host/CPU port-clear livelock.
    pub fn write_port(&mut self, port: usize, value: u8) {
        let guarded = if port < 2 { self.port01_guard } else { self.port23_guard };
        if guarded {
            log::debug!("Discarding host write to port {port} during clear-latch window");
            return;
        }
        self.input_ports[port] = value;
    }

    pub fn read_port(&self, port: usize) -> u8 {
        self.output_ports[port]
    }

    /// The byte the CPU would observe reading $F4+`port`, i.e. the host's
    /// last non-discarded `write_port`. Exposed for testing the host/CPU
    /// port-echo contract without driving the CPU through an actual `MOV` read.
    pub fn input_port(&self, port: usize) -> u8 {
        self.input_ports[port]
    }

    pub fn reset(&mut self) {
        self.ram = Ram::new();
        self.dsp.reset();
        self.timers_slow = [SlowTimer::new(), SlowTimer::new()];
        self.timer_fast = FastTimer::new();
        self.input_ports = [0; 4];
        self.output_ports = [0; 4];
        self.boot_rom_mapped = true;
        self.port01_guard = false;
        self.port23_guard = false;
    }

    fn begin_cycle(&mut self) {
        self.port01_guard = false;
        self.port23_guard = false;
        for timer in &mut self.timers_slow {
            timer.tick();
        }
        self.timer_fast.tick();
    }

    fn write_control(&mut self, value: u8) {
        use spc_common::num::GetBit;

        self.timers_slow[0].set_enabled(value.bit(0));
        self.timers_slow[1].set_enabled(value.bit(1));
        self.timer_fast.set_enabled(value.bit(2));

        if value.bit(4) {
            self.input_ports[0] = 0;
            self.input_ports[1] = 0;
            self.port01_guard = true;
        }
        if value.bit(5) {
            self.input_ports[2] = 0;
            self.input_ports[3] = 0;
            self.port23_guard = true;
        }

        self.boot_rom_mapped = value.bit(7);
    }
}

impl Default for SpcBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusInterface for SpcBus {
    fn read(&mut self, address: u16) -> u8 {
        self.begin_cycle();

        if self.boot_rom_mapped && address >= ROM_START {
            return IPL_ROM[(address - ROM_START) as usize];
        }

        match address {
            DSP_DATA => {
                self.dsp.write_address(self.ram[usize::from(DSP_ADDR)]);
                self.dsp.read_register()
            }
            PORT_BASE..=0x00F7 => self.input_ports[usize::from(address - PORT_BASE)],
            TIMER_OUTPUT_BASE..=0x00FF => {
                let idx = usize::from(address - TIMER_OUTPUT_BASE);
                if idx < 2 { self.timers_slow[idx].read_output() } else { self.timer_fast.read_output() }
            }
            _ => self.ram[usize::from(address)],
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        self.begin_cycle();

        // Writes always land in RAM, even within the IPL ROM overlay window.
        self.ram[usize::from(address)] = value;

        match address {
            CONTROL => self.write_control(value),
            DSP_DATA => {
                self.dsp.write_address(self.ram[usize::from(DSP_ADDR)]);
                self.dsp.write_register(value);
            }
            PORT_BASE..=0x00F7 => self.output_ports[usize::from(address - PORT_BASE)] = value,
            TIMER_TARGET_BASE..=0x00FC => {
                let idx = usize::from(address - TIMER_TARGET_BASE);
                if idx < 2 { self.timers_slow[idx].set_divider(value) } else { self.timer_fast.set_divider(value) }
            }
            _ => {}
        }
    }

    fn idle(&mut self) {
        self.begin_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_overlay_gates_high_reads_but_not_writes() {
        let mut bus = SpcBus::new();
        bus.write(0xFFC0, 0x42);
        assert_eq!(bus.read(0xFFC0), IPL_ROM[0]);

        bus.write(CONTROL, 0x00);
        assert_eq!(bus.read(0xFFC0), 0x42);
    }

    #[test]
    fn port_clear_latch_discards_same_cycle_write() {
        let mut bus = SpcBus::new();
        bus.write_port(0, 0xAA);
        bus.write(CONTROL, 0x10);
        // Guard is active for exactly this cycle.
        bus.write_port(0, 0xBB);
        assert_eq!(bus.read(PORT_BASE), 0);
        // Next cycle the guard has expired.
        bus.idle();
        bus.write_port(0, 0xCC);
        assert_eq!(bus.read(PORT_BASE), 0xCC);
    }

    #[test]
    fn timer_output_read_clears_counter() {
        let mut bus = SpcBus::new();
        bus.write(TIMER_TARGET_BASE, 1);
        bus.write(CONTROL, 0x01);
        for _ in 0..300 {
            bus.idle();
        }
        assert_ne!(bus.read(TIMER_OUTPUT_BASE), 0);
        assert_eq!(bus.read(TIMER_OUTPUT_BASE), 0);
    }
}
