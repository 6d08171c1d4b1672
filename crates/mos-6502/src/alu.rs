//! Instruction semantics on the register file.
//!
//! Everything here happens inside a single cycle: the bus work is done by
//! the addressing-mode sequencer in `cpu.rs`, which hands the fetched byte
//! to one of these and, for read-modify-write instructions, stores what
//! comes back.

use crate::Registers;
use crate::flags::{C, D, N, V, Z};

/// Read instructions: consume an operand.
pub(crate) type ReadOp = fn(&mut Registers, u8);

/// Read-modify-write instructions: return the byte to write back.
pub(crate) type ModifyOp = fn(&mut Registers, u8) -> u8;

impl Registers {
    fn carry(&self) -> u8 {
        u8::from(self.p.is_set(C))
    }

    /// Set A and the N/Z flags.
    fn set_a(&mut self, value: u8) {
        self.a = value;
        self.p.update_nz(value);
    }

    fn set_x(&mut self, value: u8) {
        self.x = value;
        self.p.update_nz(value);
    }

    // Loads and logic

    pub(crate) fn nop(&mut self, _: u8) {}

    pub(crate) fn lda(&mut self, value: u8) {
        self.set_a(value);
    }

    pub(crate) fn ldx(&mut self, value: u8) {
        self.set_x(value);
    }

    pub(crate) fn ldy(&mut self, value: u8) {
        self.y = value;
        self.p.update_nz(value);
    }

    pub(crate) fn ora(&mut self, value: u8) {
        self.set_a(self.a | value);
    }

    pub(crate) fn and(&mut self, value: u8) {
        self.set_a(self.a & value);
    }

    pub(crate) fn eor(&mut self, value: u8) {
        self.set_a(self.a ^ value);
    }

    pub(crate) fn bit(&mut self, value: u8) {
        self.p.set_if(N, value & 0x80 != 0);
        self.p.set_if(V, value & 0x40 != 0);
        self.p.set_if(Z, self.a & value == 0);
    }

    // Arithmetic

    pub(crate) fn adc(&mut self, value: u8) {
        if self.p.is_set(D) {
            self.adc_bcd(value);
        } else {
            self.add(value);
        }
    }

    /// Binary add with carry. SBC is this with the operand complemented.
    fn add(&mut self, value: u8) {
        let wide = u16::from(self.a) + u16::from(value) + u16::from(self.carry());
        let sum = wide as u8;
        let overflow = (self.a ^ sum) & (value ^ sum) & 0x80 != 0;
        self.p.set_if(C, wide > 0xFF);
        self.p.set_if(V, overflow);
        self.set_a(sum);
    }

    /// NMOS BCD add. Z reflects the binary sum; N and V are taken before
    /// the high digit is adjusted.
    fn adc_bcd(&mut self, value: u8) {
        let a = self.a;
        let carry = self.carry();

        let mut low = (a & 0x0F) + (value & 0x0F) + carry;
        if low > 0x09 {
            low += 0x06;
        }
        let mut high = (a >> 4) + (value >> 4) + u8::from(low > 0x0F);

        let unadjusted = high << 4;
        self.p.set_if(Z, a.wrapping_add(value).wrapping_add(carry) == 0);
        self.p.set_if(N, unadjusted & 0x80 != 0);
        self.p.set_if(V, (a ^ unadjusted) & !(a ^ value) & 0x80 != 0);

        if high > 0x09 {
            high += 0x06;
        }
        self.p.set_if(C, high > 0x0F);
        self.a = (high << 4) | (low & 0x0F);
    }

    pub(crate) fn sbc(&mut self, value: u8) {
        if self.p.is_set(D) {
            self.sbc_bcd(value);
        } else {
            self.add(!value);
        }
    }

    /// NMOS BCD subtract. Flags are those of the binary subtraction; only
    /// A gets the decimal result.
    fn sbc_bcd(&mut self, value: u8) {
        let a = self.a;
        let borrow = i16::from(1 - self.carry());

        self.add(!value);

        let mut low = i16::from(a & 0x0F) - i16::from(value & 0x0F) - borrow;
        let mut high = i16::from(a >> 4) - i16::from(value >> 4);
        if low < 0 {
            low -= 0x06;
            high -= 1;
        }
        if high < 0 {
            high -= 0x06;
        }
        self.a = ((high << 4) as u8) | (low as u8 & 0x0F);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.p.set_if(C, register >= value);
        self.p.update_nz(register.wrapping_sub(value));
    }

    pub(crate) fn cmp(&mut self, value: u8) {
        self.compare(self.a, value);
    }

    pub(crate) fn cpx(&mut self, value: u8) {
        self.compare(self.x, value);
    }

    pub(crate) fn cpy(&mut self, value: u8) {
        self.compare(self.y, value);
    }

    // Shifts and increments

    /// Store the bit shifted out in C and return `result` with N/Z set.
    fn shifted(&mut self, result: u8, out: bool) -> u8 {
        self.p.set_if(C, out);
        self.p.update_nz(result);
        result
    }

    pub(crate) fn asl(&mut self, value: u8) -> u8 {
        self.shifted(value << 1, value & 0x80 != 0)
    }

    pub(crate) fn lsr(&mut self, value: u8) -> u8 {
        self.shifted(value >> 1, value & 0x01 != 0)
    }

    pub(crate) fn rol(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.carry();
        self.shifted(result, value & 0x80 != 0)
    }

    pub(crate) fn ror(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (self.carry() << 7);
        self.shifted(result, value & 0x01 != 0)
    }

    pub(crate) fn inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.p.update_nz(result);
        result
    }

    pub(crate) fn dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.p.update_nz(result);
        result
    }

    // Undocumented read-modify-write: a shift or step, then an ALU op on
    // the result

    pub(crate) fn slo(&mut self, value: u8) -> u8 {
        let result = self.asl(value);
        self.ora(result);
        result
    }

    pub(crate) fn rla(&mut self, value: u8) -> u8 {
        let result = self.rol(value);
        self.and(result);
        result
    }

    pub(crate) fn sre(&mut self, value: u8) -> u8 {
        let result = self.lsr(value);
        self.eor(result);
        result
    }

    pub(crate) fn rra(&mut self, value: u8) -> u8 {
        let result = self.ror(value);
        self.adc(result);
        result
    }

    pub(crate) fn dcp(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.cmp(result);
        result
    }

    pub(crate) fn isc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.sbc(result);
        result
    }

    // Undocumented reads

    pub(crate) fn lax(&mut self, value: u8) {
        self.a = value;
        self.set_x(value);
    }

    pub(crate) fn las(&mut self, value: u8) {
        let result = value & self.s;
        self.s = result;
        self.lax(result);
    }

    pub(crate) fn anc(&mut self, value: u8) {
        self.and(value);
        self.p.set_if(C, self.a & 0x80 != 0);
    }

    pub(crate) fn alr(&mut self, value: u8) {
        let masked = self.a & value;
        self.a = self.lsr(masked);
    }

    /// AND then ROR. C comes from bit 6 of the result, V from bit 6 XOR
    /// bit 5.
    pub(crate) fn arr(&mut self, value: u8) {
        let result = ((self.a & value) >> 1) | (self.carry() << 7);
        self.set_a(result);
        self.p.set_if(C, result & 0x40 != 0);
        self.p.set_if(V, (result ^ (result << 1)) & 0x40 != 0);
    }

    pub(crate) fn sbx(&mut self, value: u8) {
        let masked = self.a & self.x;
        self.p.set_if(C, masked >= value);
        self.set_x(masked.wrapping_sub(value));
    }

    /// Unstable on silicon. Uses the usual $EE constant.
    pub(crate) fn ane(&mut self, value: u8) {
        self.set_a((self.a | 0xEE) & self.x & value);
    }

    /// Unstable on silicon. Uses the usual $EE constant.
    pub(crate) fn lxa(&mut self, value: u8) {
        self.lax((self.a | 0xEE) & value);
    }
}
