#[allow(clippy::wildcard_imports)]
use super::*;
use crate::Registers;

fn set_nz(registers: &mut Registers, value: u8) {
    registers.psw.zero = value == 0;
    registers.psw.negative = value.bit(7);
}

impl_read_op!(
    [
        immediate -> mov_a_imm,
        direct_page -> mov_a_dp,
        absolute -> mov_a_abs,
        x_indirect -> mov_a_xind,
        x_indirect_postinc -> mov_a_xind_postinc,
        indirect_x -> mov_a_indx,
        direct_page_x -> mov_a_dpx,
        absolute_x -> mov_a_absx,
        absolute_y -> mov_a_absy,
        indirect_y -> mov_a_indy,
    ]
    (|registers, value| {
        registers.a = value;
        set_nz(registers, registers.a);
    })
);

impl_read_op!(
    [immediate -> mov_x_imm, direct_page -> mov_x_dp, absolute -> mov_x_abs, direct_page_y -> mov_x_dpy]
    (|registers, value| {
        registers.x = value;
        set_nz(registers, registers.x);
    })
);

impl_read_op!(
    [immediate -> mov_y_imm, direct_page -> mov_y_dp, absolute -> mov_y_abs, direct_page_x -> mov_y_dpx]
    (|registers, value| {
        registers.y = value;
        set_nz(registers, registers.y);
    })
);

impl_write_op!(
    [
        direct_page -> mov_dp_a,
        absolute -> mov_abs_a,
        x_indirect -> mov_xind_a,
        x_indirect_postinc -> mov_xind_postinc_a,
        indirect_x -> mov_indx_a,
        direct_page_x -> mov_dpx_a,
        absolute_x -> mov_absx_a,
        absolute_y -> mov_absy_a,
        indirect_y -> mov_indy_a,
    ]
    (|registers| { registers.a })
);

impl_write_op!(
    [direct_page -> mov_dp_x, absolute -> mov_abs_x, direct_page_y -> mov_dpy_x]
    (|registers| { registers.x })
);

impl_write_op!(
    [direct_page -> mov_dp_y, absolute -> mov_abs_y, direct_page_x -> mov_dpx_y]
    (|registers| { registers.y })
);

impl_registers_op!(mov_x_a, |registers| {
    registers.x = registers.a;
    set_nz(registers, registers.x);
});

impl_registers_op!(mov_a_x, |registers| {
    registers.a = registers.x;
    set_nz(registers, registers.a);
});

impl_registers_op!(mov_a_y, |registers| {
    registers.a = registers.y;
    set_nz(registers, registers.a);
});

impl_registers_op!(mov_y_a, |registers| {
    registers.y = registers.a;
    set_nz(registers, registers.y);
});

impl_registers_op!(mov_x_sp, |registers| {
    registers.x = registers.sp;
    set_nz(registers, registers.x);
});

impl_registers_op!(mov_sp_x, |registers| {
    registers.sp = registers.x;
});

pub(crate) fn mov_dp_imm<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let address = u16::from_le_bytes([cpu.state.t1, cpu.direct_page_msb()]);
            bus.read(address);
        }
        4 => {
            cpu.final_cycle();

            let address = u16::from_le_bytes([cpu.state.t1, cpu.direct_page_msb()]);
            bus.write(address, cpu.state.t0);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn mov_dp_dp<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            cpu.state.t1 = fetch_operand(cpu, bus);
        }
        3 => {
            let src_address = u16::from_le_bytes([cpu.state.t1, cpu.direct_page_msb()]);
            cpu.state.t2 = bus.read(src_address);
        }
        4 => {
            cpu.final_cycle();

            let dest_address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            bus.write(dest_address, cpu.state.t2);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn movw_ya_dp<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            cpu.state.t1 = bus.read(address);
        }
        3 => {
            let address = u16::from_le_bytes([cpu.state.t0.wrapping_add(1), cpu.direct_page_msb()]);
            cpu.state.t2 = bus.read(address);
        }
        4 => {
            cpu.final_cycle();
            bus.idle();

            cpu.registers.set_ya(u16::from_le_bytes([cpu.state.t1, cpu.state.t2]));
            let ya = cpu.registers.ya();
            cpu.registers.psw.zero = ya == 0;
            cpu.registers.psw.negative = ya.bit(15);
        }
        _ => invalid_cycle!(cpu),
    }
}

pub(crate) fn movw_dp_ya<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
    match cpu.state.cycle {
        1 => {
            cpu.state.t0 = fetch_operand(cpu, bus);
        }
        2 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            bus.read(address);
        }
        3 => {
            let address = u16::from_le_bytes([cpu.state.t0, cpu.direct_page_msb()]);
            bus.write(address, cpu.registers.a);
        }
        4 => {
            cpu.final_cycle();

            let address = u16::from_le_bytes([cpu.state.t0.wrapping_add(1), cpu.direct_page_msb()]);
            bus.write(address, cpu.registers.y);
        }
        _ => invalid_cycle!(cpu),
    }
}

macro_rules! impl_push {
    ($name:ident, |$registers:ident| $value:expr) => {
        pub(crate) fn $name<B: BusInterface>(cpu: &mut Spc700, bus: &mut B) {
            match cpu.state.cycle {
                1 => {
                    bus.idle();
                }
                2 => {
                    cpu.final_cycle();

                    let $registers = &cpu.registers;
                    let value = $value;
                    bus.write(cpu.stack_pointer(), value);
                    cpu.registers.sp = cpu.registers.sp.wrapping_sub(1);
                }
                _ => invalid_cycle!(cpu),
            }
        }
    };
}

impl_push!(push_a, |registers| registers.a);
impl_push!(push_x, |registers| registers.x);
impl_push!(push_y, |registers| registers.y);
impl_push!(push_psw, |registers| registers.psw.into());

macro_rules! impl_pop {
    ($name:ident, |$cpu:ident, $value:ident| $body:block) => {
        pub(crate) fn $name<B: BusInterface>($cpu: &mut Spc700, bus: &mut B) {
            match $cpu.state.cycle {
                1 | 2 => {
                    bus.idle();
                }
                3 => {
                    $cpu.final_cycle();

                    $cpu.registers.sp = $cpu.registers.sp.wrapping_add(1);
                    let $value = bus.read($cpu.stack_pointer());
                    $body
                }
                _ => invalid_cycle!($cpu),
            }
        }
    };
}

impl_pop!(pop_a, |cpu, value| {
    cpu.registers.a = value;
});

impl_pop!(pop_x, |cpu, value| {
    cpu.registers.x = value;
});

impl_pop!(pop_y, |cpu, value| {
    cpu.registers.y = value;
});

impl_pop!(pop_psw, |cpu, value| {
    cpu.registers.psw = value.into();
});
