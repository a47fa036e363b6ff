//! Snapshot format parsing: SPC (required) and ZST (recommended), dispatched
//! by magic-byte sniffing. Both layouts are reproduced bit-exact from the
//! original C loader this crate is grounded on; see the offset constants
//! below for each field's provenance.

use crate::error::FormatError;
use spc_common::num::GetBit;

const SPC_MAGIC: &[u8] = b"SNES-SPC700 Sound File Data";
const SPC_RAM_OFFSET: usize = 256;
const SPC_DSP_OFFSET: usize = SPC_RAM_OFFSET + 0x10000;
const SPC_MIN_LEN: usize = SPC_DSP_OFFSET + 128;

const ZST_MAGIC: &[u8] = b"ZSNES Save State File";
const ZST_RAM_OFFSET: usize = 199_699;
const ZST_PC_OFFSET: usize = ZST_RAM_OFFSET + 0x10000 + 16;
const ZST_VOICE_ON_OFFSET: usize = ZST_PC_OFFSET + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 420;
const ZST_DSP_OFFSET: usize = ZST_VOICE_ON_OFFSET + 8 + 916;
const ZST_MIN_LEN: usize = ZST_DSP_OFFSET + 256;

/// CPU + DSP + RAM state recovered from a snapshot, ready to be loaded into
/// a [`crate::Context`].
pub struct LoadedState {
    pub ram: Box<[u8; 0x10000]>,
    pub dsp_registers: [u8; 128],
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub psw: u8,
    /// ZST only: voices that were playing when the state was saved.
    /// The loader doesn't restore full per-voice decoder state, so instead
    /// these are re-keyed-on from their sample start to approximate playback
    /// resuming, matching the source loader's approach.
    pub restart_voices_mask: u8,
}

pub fn parse(bytes: &[u8]) -> Result<LoadedState, FormatError> {
    if bytes.starts_with(SPC_MAGIC) {
        parse_spc(bytes)
    } else if bytes.starts_with(ZST_MAGIC) {
        parse_zst(bytes)
    } else if bytes.len() < SPC_MIN_LEN.min(ZST_MIN_LEN) {
        Err(FormatError::TooShort { len: bytes.len() })
    } else {
        Err(FormatError::UnrecognizedMagic)
    }
}

fn parse_spc(bytes: &[u8]) -> Result<LoadedState, FormatError> {
    if bytes.len() < SPC_MIN_LEN {
        return Err(FormatError::TooShort { len: bytes.len() });
    }

    let pc = u16::from_le_bytes([bytes[37], bytes[38]]);
    let a = bytes[39];
    let x = bytes[40];
    let y = bytes[41];
    let psw = bytes[42];
    let sp = bytes[43];

    let mut ram = Box::new([0u8; 0x10000]);
    ram.copy_from_slice(&bytes[SPC_RAM_OFFSET..SPC_RAM_OFFSET + 0x10000]);

    let mut dsp_registers = [0u8; 128];
    dsp_registers.copy_from_slice(&bytes[SPC_DSP_OFFSET..SPC_DSP_OFFSET + 128]);

    log::debug!("Detected SPC snapshot, PC={pc:04X}");

    Ok(LoadedState { ram, dsp_registers, pc, a, x, y, sp, psw, restart_voices_mask: 0 })
}

fn parse_zst(bytes: &[u8]) -> Result<LoadedState, FormatError> {
    if bytes.len() < ZST_MIN_LEN {
        return Err(FormatError::TooShort { len: bytes.len() });
    }

    let mut ram = Box::new([0u8; 0x10000]);
    ram.copy_from_slice(&bytes[ZST_RAM_OFFSET..ZST_RAM_OFFSET + 0x10000]);

    let pc = u16::from_le_bytes([bytes[ZST_PC_OFFSET], bytes[ZST_PC_OFFSET + 1]]);
    let a = bytes[ZST_PC_OFFSET + 4];
    let x = bytes[ZST_PC_OFFSET + 8];
    let y = bytes[ZST_PC_OFFSET + 12];
    let mut psw = bytes[ZST_PC_OFFSET + 16];
    let p2 = &bytes[ZST_PC_OFFSET + 20..ZST_PC_OFFSET + 24];
    let sp = bytes[ZST_PC_OFFSET + 24];

    // P2 reconstruction quirks from the original loader: P2 all zero means Z
    // was set; P2's low byte's high bit mirrors N.
    if p2 == [0, 0, 0, 0] {
        psw |= 0x02;
    } else {
        psw &= !0x02;
    }
    if p2[0].bit(7) {
        psw |= 0x80;
    } else {
        psw &= !0x80;
    }

    let voice_on = &bytes[ZST_VOICE_ON_OFFSET..ZST_VOICE_ON_OFFSET + 8];
    let mut restart_voices_mask = 0u8;
    for (voice, &on) in voice_on.iter().enumerate() {
        if on != 0 {
            restart_voices_mask |= 1 << voice;
        }
    }

    let mut dsp_registers = [0u8; 128];
    dsp_registers.copy_from_slice(&bytes[ZST_DSP_OFFSET..ZST_DSP_OFFSET + 128]);
    // ZST restarts rather than fully restoring voice decoder state, so clear
    // KON here; Context::init ORs restart_voices_mask back in afterward.
    dsp_registers[0x4C] = 0;

    log::debug!("Detected ZST snapshot, PC={pc:04X}");

    Ok(LoadedState { ram, dsp_registers, pc, a, x, y, sp, psw, restart_voices_mask })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spc() -> Vec<u8> {
        let mut bytes = vec![0u8; SPC_MIN_LEN];
        bytes[..SPC_MAGIC.len()].copy_from_slice(SPC_MAGIC);
        bytes[37] = 0x34;
        bytes[38] = 0x12;
        bytes
    }

    #[test]
    fn parses_spc_pc() {
        let bytes = minimal_spc();
        let state = parse(&bytes).unwrap();
        assert_eq!(state.pc, 0x1234);
    }

    #[test]
    fn rejects_unrecognized_short_buffer() {
        let bytes = vec![0u8; 100];
        assert!(matches!(parse(&bytes), Err(FormatError::TooShort { .. })));
    }

    #[test]
    fn rejects_unrecognized_magic_with_sufficient_length() {
        let bytes = vec![0u8; SPC_MIN_LEN];
        assert!(matches!(parse(&bytes), Err(FormatError::UnrecognizedMagic)));
    }
}
