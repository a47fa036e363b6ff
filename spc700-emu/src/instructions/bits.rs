#[allow(clippy::wildcard_imports)]
use super::*;

fn set_nz(registers: &mut crate::Registers, value: u8) {
    registers.psw.zero = value == 0;
    registers.psw.negative = value.bit(7);
}

impl_modify_op!(
    [accumulator -> asl_a, direct_page -> asl_dp, direct_page_x -> asl_dpx, absolute -> asl_abs]
    (|registers, value| {
        registers.psw.carry = value.bit(7);
        let result = value << 1;
        set_nz(registers, result);
        result
    })
);

impl_modify_op!(
    [accumulator -> rol_a, direct_page -> rol_dp, direct_page_x -> rol_dpx, absolute -> rol_abs]
    (|registers, value| {
        let carry_in = u8::from(registers.psw.carry);
        registers.psw.carry = value.bit(7);
        let result = (value << 1) | carry_in;
        set_nz(registers, result);
        result
    })
);

impl_modify_op!(
    [accumulator -> lsr_a, direct_page -> lsr_dp, direct_page_x -> lsr_dpx, absolute -> lsr_abs]
    (|registers, value| {
        registers.psw.carry = value.bit(0);
        let result = value >> 1;
        set_nz(registers, result);
        result
    })
);

impl_modify_op!(
    [accumulator -> ror_a, direct_page -> ror_dp, direct_page_x -> ror_dpx, absolute -> ror_abs]
    (|registers, value| {
        let carry_in = u8::from(registers.psw.carry);
        registers.psw.carry = value.bit(0);
        let result = (value >> 1) | (carry_in << 7);
        set_nz(registers, result);
        result
    })
);

pub(crate) fn xcn<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 | 2 | 3 => {
            bus.idle();
        }
        4 => {
            cpu.final_cycle();
            bus.idle();

            let a = cpu.registers.a;
            let result = (a << 4) | (a >> 4);
            set_nz(&mut cpu.registers, result);
            cpu.registers.a = result;
        }
        _ => invalid_cycle!(cpu),
    }
}

/// `SET1 dp.bit` / `CLR1 dp.bit`: fixed bit number encoded in the opcode byte itself.
pub(crate) fn set1<B: BusInterface>(cpu: &mut Spc700, bus: &mut B, bit: u8) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            cpu.state.t1 = bus.read(address);
        }
        3 => {
            cpu.final_cycle();

            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            bus.write(address, cpu.state.t1 | (1 << bit));
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn clr1<B: BusInterface>(cpu: &mut Spc700, bus: &mut B, bit: u8) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            cpu.state.t1 = bus.read(address);
        }
        3 => {
            cpu.final_cycle();

            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            bus.write(address, cpu.state.t1 & !(1 << bit));
        }
        _ => invalid_cycle!(cpu),
    }
}

macro_rules! impl_membit_carry_op {
    ($name:ident, (|$carry:ident, $bit:ident| $body:block)) => {
        pub(crate) fn $name<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
            match cpu.state.cycle {
                1 => {
                    cpu.state.t0 = fetch_operand(cpu, bus);
                }
                2 => {
                    cpu.state.t1 = fetch_operand(cpu, bus);
                }
                3 => {
                    cpu.final_cycle();

                    let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
                    let address = word & 0x1FFF;
                    let bit_index = (word >> 13) as u8;
                    let value = bus.read(address);
                    let $bit = value.bit(bit_index);
                    let $carry = cpu.registers.psw.carry;
                    cpu.registers.psw.carry = $body;
                }
                _ => invalid_cycle!(cpu),
            }
        }
    };
}

impl_membit_carry_op!(or1, (|carry, bit| { carry | bit }));
impl_membit_carry_op!(or1_cpl, (|carry, bit| { carry | !bit }));
impl_membit_carry_op!(and1, (|carry, bit| { carry & bit }));
impl_membit_carry_op!(and1_cpl, (|carry, bit| { carry & !bit }));
impl_membit_carry_op!(eor1, (|carry, bit| { carry ^ bit }));

pub(crate) fn mov1_c_bit<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            cpu.final_cycle();

            let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            let address = word & 0x1FFF;
            let bit_index = (word >> 13) as u8;
            let value = bus.read(address);
            cpu.registers.psw.carry = value.bit(bit_index);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn mov1_bit_c<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            let address = word & 0x1FFF;
            cpu.state.t2 = bus.read(address);
        }
        4 => {
            cpu.final_cycle();

            let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            let address = word & 0x1FFF;
            let bit_index = (word >> 13) as u8;
            let value = if cpu.registers.psw.carry {
                cpu.state.t2 | (1 << bit_index)
            } else {
                cpu.state.t2 & !(1 << bit_index)
            };
            bus.write(address, value);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn not1<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            let address = word & 0x1FFF;
            cpu.state.t2 = bus.read(address);
        }
        4 => {
            cpu.final_cycle();

            let word = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            let address = word & 0x1FFF;
            let bit_index = (word >> 13) as u8;
            bus.write(address, cpu.state.t2 ^ (1 << bit_index));
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn tset1<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            cpu.state.t2 = bus.read(address);
        }
        4 => {
            bus.idle();
        }
        5 => {
            cpu.final_cycle();

            let a = cpu.registers.a;
            set_nz(&mut cpu.registers, cpu.state.t2 & a);

            let address = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            bus.write(address, cpu.state.t2 | a);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn tclr1<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            cpu.state.t2 = bus.read(address);
        }
        4 => {
            bus.idle();
        }
        5 => {
            cpu.final_cycle();

            let a = cpu.registers.a;
            set_nz(&mut cpu.registers, cpu.state.t2 & a);

            let address = u16::from_le_bytes([cpu.state.t0, cpu.state.t1]);
            bus.write(address, cpu.state.t2 & !a);
        }
        _ => invalid_cycle!(cpu),
    }
}
