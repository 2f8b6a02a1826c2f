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

    device_types::bsc.rs

    BSC (Binary Synchronous Communications) control-character constants and
    the three-submode receive state, per the design note in §9 replacing the
    source's nested-conditional receive switch with an explicit enum.
*/

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const HT: u8 = 0x05;
pub const DLE: u8 = 0x10;
pub const EOM: u8 = 0x19;
pub const IBC: u8 = 0x1f;
pub const ETB: u8 = 0x26;
pub const ESC: u8 = 0x27;
pub const ENQ: u8 = 0x2d;
pub const SYN: u8 = 0x32;
pub const EOT: u8 = 0x37;
pub const NAK: u8 = 0x3d;
pub const ACK0: u8 = 0x61;
pub const ACK1: u8 = 0x70;

/// The BSC line's protocol submode, derived from the `BscText`/`BscTransparent`
/// line flags. Replaces the source's deep nested `if` chain with a single
/// three-way match driven by `(submode, gotdle, byte)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BscSubMode {
    /// Not in a text block: `!BscText`.
    Idle,
    /// In a text block, not in transparent mode: `BscText && !BscTransparent`.
    Text,
    /// In a text block, in transparent mode: `BscText && BscTransparent`.
    TextTransparent,
}

impl BscSubMode {
    pub fn from_flags(bsc_text: bool, bsc_transparent: bool) -> Self {
        match (bsc_text, bsc_transparent) {
            (false, _) => BscSubMode::Idle,
            (true, false) => BscSubMode::Text,
            (true, true) => BscSubMode::TextTransparent,
        }
    }
}

/// Terminator chosen by the receive state machine; ACK1 implies UnitException
/// on the read command's completion status (§4.3 Finalization).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BscTerminator {
    Ack0,
    Ack1,
}

impl BscTerminator {
    pub fn byte(self) -> u8 {
        match self {
            BscTerminator::Ack0 => ACK0,
            BscTerminator::Ack1 => ACK1,
        }
    }
}
