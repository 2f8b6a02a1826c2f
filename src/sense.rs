/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    sense.rs

    The 8-bit sense byte shared by the reader and the line units. Bit
    positions follow the command's §3/§7 taxonomy; Sequence (async) and
    Receiving (BSC) alias the same bit since no unit uses both meanings.
*/

pub const SNS_CMD_REJECT: u8 = 0x80;
pub const SNS_INTERVENTION_REQUIRED: u8 = 0x40;
pub const SNS_BUS_CHECK: u8 = 0x20;
pub const SNS_EQUIPMENT_CHECK: u8 = 0x10;
pub const SNS_DATA_CHECK: u8 = 0x08;
pub const SNS_OVERRUN: u8 = 0x04;
pub const SNS_SEQUENCE: u8 = 0x02;
pub const SNS_RECEIVING: u8 = 0x02;
pub const SNS_CHANNEL9: u8 = 0x01;
pub const SNS_TIMEOUT: u8 = 0x01;

/// Sense bits cleared once a Sense command has delivered them (§7: "soft
/// sense bits ... cleared after Sense returns them").
pub const SNS_SOFT_MASK: u8 = SNS_CMD_REJECT | SNS_INTERVENTION_REQUIRED;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Sense(pub u8);

impl Sense {
    pub fn new() -> Self {
        Sense(0)
    }

    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn is_set(&self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    /// Byte returned by a Sense command, with the soft bits cleared as a
    /// side effect (§4.1 step 1, §7).
    pub fn take(&mut self) -> u8 {
        let byte = self.0;
        self.clear(SNS_SOFT_MASK);
        byte
    }
}
