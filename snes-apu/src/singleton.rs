//! Process-wide convenience wrapper around a single [`Context`], kept only
//! for source compatibility with the external CLI player. Nothing in this
//! crate uses it internally; new embedders should hold their own
//! [`Context`] instead.

use std::sync::{Mutex, OnceLock};

use crate::{ChannelMask, Context, FormatError};

fn global() -> &'static Mutex<Context> {
    static CONTEXT: OnceLock<Mutex<Context>> = OnceLock::new();
    CONTEXT.get_or_init(|| Mutex::new(Context::new()))
}

/// Replaces the singleton's state with a freshly loaded snapshot.
pub fn init(buf: &[u8]) -> Result<(), FormatError> {
    global().lock().unwrap().init(buf)
}

/// See [`Context::run`].
pub fn run(cycles: i64, buf: Option<&mut [u8]>) -> usize {
    global().lock().unwrap().run(cycles, buf)
}

pub fn write_port_i(i: usize, data: u8) {
    global().lock().unwrap().write_port(i, data);
}

pub fn read_port_i(i: usize) -> u8 {
    global().lock().unwrap().read_port(i)
}

pub fn set_channel_mask(mask: ChannelMask) {
    global().lock().unwrap().set_channel_mask(mask);
}

pub fn get_channel_mask() -> ChannelMask {
    global().lock().unwrap().channel_mask()
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
    fn roundtrips_through_the_global_context() {
        init(&spc_with_pc(0x200)).unwrap();
        write_port_i(1, 0x99);
        assert_eq!(read_port_i(1), 0);
        set_channel_mask(ChannelMask::new(0x03));
        assert_eq!(get_channel_mask().bits(), 0x03);
    }
}
