//! The 64-byte IPL ROM mapped at $FFC0-$FFFF when boot ROM overlay is enabled.
//!
//! This is the well-known SPC-700 bootstrap program that every SNES game's
//! audio driver is loaded through: it waits for the host to signal readiness
//! via the communication ports, reads a transfer address and length, and
//! copies the uploaded program into RAM before jumping to it.
#[rustfmt::skip]
pub const IPL_ROM: [u8; 64] = [
    0xCD, 0xEF, 0xBD, 0xE8, 0x00, 0xC6, 0x1D, 0xD0,
    0xFC, 0x8F, 0xAA, 0xF4, 0x8F, 0xBB, 0xF5, 0x78,
    0xCC, 0xF4, 0xD0, 0xFB, 0x2F, 0x19, 0xEB, 0xF4,
    0xD0, 0xFC, 0x7E, 0xF4, 0xD0, 0x0B, 0xE4, 0xF5,
    0xCB, 0xF4, 0xD7, 0x00, 0xFC, 0xD0, 0xF3, 0xAB,
    0x01, 0x10, 0xEF, 0x7E, 0xF4, 0x10, 0xEB, 0xBA,
    0xF6, 0xDA, 0x00, 0xBA, 0xF4, 0xC4, 0xF4, 0xDD,
    0x5D, 0xD0, 0xDB, 0x1F, 0x00, 0x00, 0xC0, 0xFF,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_vector_points_into_rom() {
        let reset_vector = u16::from_le_bytes([IPL_ROM[62], IPL_ROM[63]]);
        assert_eq!(reset_vector, 0xFFC0);
    }
}
