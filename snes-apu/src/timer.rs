//! The three hardware timers clocked off the APU's master clock.
//!
//! Timers 0 and 1 divide by 128 (a ~8 kHz tick rate); timer 2 divides by 16
//! (a ~64 kHz tick rate). Each one further divides by a programmable 8-bit
//! value before incrementing its externally-visible 4-bit output counter.

#[derive(Debug, Clone)]
pub struct Timer<const MCLK_DIVIDER: u8> {
    enabled: bool,
    mclk_divider: u8,
    timer_divider: u16,
    counter: u16,
    output: u8,
}

impl<const MCLK_DIVIDER: u8> Timer<MCLK_DIVIDER> {
    pub fn new() -> Self {
        Self {
            enabled: false,
            mclk_divider: MCLK_DIVIDER,
            timer_divider: 255,
            counter: 0,
            output: 0,
        }
    }

    pub fn tick(&mut self) {
        self.mclk_divider -= 1;
        if self.mclk_divider == 0 {
            self.mclk_divider = MCLK_DIVIDER;
            self.clock();
        }
    }

    fn clock(&mut self) {
        self.counter += 1;
        if self.counter >= self.timer_divider {
            self.counter = 0;
            self.output = self.output.wrapping_add(1);
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.counter = 0;
            self.output = 0;
        }
    }

    pub fn divider(&self) -> u8 {
        if self.timer_divider == 256 { 0 } else { self.timer_divider as u8 }
    }

    pub fn set_divider(&mut self, divider: u8) {
        self.timer_divider = if divider == 0 { 256 } else { divider.into() };
    }

    pub fn read_output(&mut self) -> u8 {
        let output = self.output & 0x0F;
        self.output = 0;
        output
    }
}

impl<const MCLK_DIVIDER: u8> Default for Timer<MCLK_DIVIDER> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SlowTimer = Timer<128>;
pub type FastTimer = Timer<16>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_timer_wraps_output_at_16() {
        let mut timer: SlowTimer = Timer::new();
        timer.set_divider(1);
        timer.set_enabled(true);
        for _ in 0..(128 * 256) {
            timer.tick();
        }
        assert_eq!(timer.read_output(), 0);
    }

    #[test]
    fn disabling_resets_counter_and_output() {
        let mut timer: FastTimer = Timer::new();
        timer.set_divider(4);
        timer.set_enabled(true);
        for _ in 0..16 {
            timer.tick();
        }
        timer.set_enabled(false);
        assert_eq!(timer.read_output(), 0);
    }

    #[test]
    fn tick_clocks_even_when_disabled() {
        let mut timer: FastTimer = Timer::new();
        timer.set_divider(1);
        for _ in 0..16 {
            timer.tick();
        }
        assert_eq!(timer.read_output(), 1);
    }
}
