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

    channel.rs

    Defines the command/status handshake between a device unit and the
    host channel subsystem, and the device address type.
*/

use std::fmt;

/// 11-bit device address assigned to a unit at construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(pub u16);

impl DeviceAddress {
    pub const MASK: u16 = 0x7FF;

    pub fn new(addr: u16) -> Self {
        DeviceAddress(addr & Self::MASK)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:03X}", self.0)
    }
}

pub const CHANNEL_END: u8 = 0b0000_0001;
pub const DEVICE_END: u8 = 0b0000_0010;
pub const UNIT_CHECK: u8 = 0b0000_0100;
pub const UNIT_EXCEPTION: u8 = 0b0000_1000;
pub const ATTENTION: u8 = 0b0001_0000;

/// Status mask passed to `chan_end` / `set_devattn`. A plain bitmask wrapper,
/// not a bitflags type, to match the sense/status byte idiom used elsewhere.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChanStatus(pub u8);

impl ChanStatus {
    pub const fn new(bits: u8) -> Self {
        ChanStatus(bits)
    }

    pub const fn ce_de() -> Self {
        ChanStatus(CHANNEL_END | DEVICE_END)
    }
    pub const fn ce_de_uc() -> Self {
        ChanStatus(CHANNEL_END | DEVICE_END | UNIT_CHECK)
    }
    pub const fn ce_de_ue() -> Self {
        ChanStatus(CHANNEL_END | DEVICE_END | UNIT_EXCEPTION)
    }

    pub fn with(mut self, bits: u8) -> Self {
        self.0 |= bits;
        self
    }

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }
}

impl std::ops::BitOr for ChanStatus {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        ChanStatus(self.0 | rhs.0)
    }
}

/// Outcome of a `chan_read_byte`/`chan_write_byte` call: whether the channel
/// program wants no further bytes this tick.
pub type ChanDone = bool;

/// The host channel subsystem, external to this crate (§6). A unit holds a
/// handle to one of these (or a mock, in tests) and drives it from its
/// service-tick logic.
pub trait ChannelOps {
    /// Write one byte toward the channel program. Returns true when the
    /// program no longer wants more bytes.
    fn chan_write_byte(&mut self, da: DeviceAddress, byte: u8) -> ChanDone;

    /// Read one byte from the channel program. Returns (byte, done); done is
    /// true when no more bytes are available this command.
    fn chan_read_byte(&mut self, da: DeviceAddress) -> (u8, ChanDone);

    /// Signal command completion with a status mask.
    fn chan_end(&mut self, da: DeviceAddress, status: ChanStatus);

    /// Raise an asynchronous attention, independent of any in-progress command.
    fn set_devattn(&mut self, da: DeviceAddress, status: ChanStatus);

    /// Invoked by the reader's boot entry point.
    fn chan_boot(&mut self, da: DeviceAddress) {
        let _ = da;
    }
}

/// The discrete-event scheduler, external to this crate (§5/§6). A unit never
/// sleeps mid-byte; it calls `schedule` with a tick delay and returns.
pub trait Scheduler {
    fn schedule(&mut self, da: DeviceAddress, ticks: u32);
}
