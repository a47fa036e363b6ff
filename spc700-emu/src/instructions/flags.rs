#[allow(clippy::wildcard_imports)]
use super::*;

impl_registers_op!(clrp, |registers| {
    registers.psw.direct_page = false;
});

impl_registers_op!(setp, |registers| {
    registers.psw.direct_page = true;
});

impl_registers_op!(clrc, |registers| {
    registers.psw.carry = false;
});

impl_registers_op!(setc, |registers| {
    registers.psw.carry = true;
});

impl_registers_op!(clrv, |registers| {
    registers.psw.overflow = false;
    registers.psw.half_carry = false;
});

impl_registers_op!(notc, |registers| {
    registers.psw.carry = !registers.psw.carry;
});

impl_long_registers_op!(ei, |registers| {
    registers.psw.interrupt_enabled = true;
});

impl_long_registers_op!(di, |registers| {
    registers.psw.interrupt_enabled = false;
});
