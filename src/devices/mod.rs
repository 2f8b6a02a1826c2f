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

    devices::mod.rs

    The four device participants (§2/§9): the card reader, the async and
    BSC line units, and the line scanner that drives both kinds of line.
*/

pub mod async_line;
pub mod bsc_line;
pub mod card_reader;
pub mod scanner;

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler};
use crate::devices::scanner::LineTransport;
use crate::unit::UnitState;
use async_line::AsyncLineUnit;
use bsc_line::BscLineUnit;
use card_reader::CardReaderUnit;

/// A channel-addressable device participant, dispatched by device address.
/// Owns its state; the channel/scheduler collaborators are borrowed per call
/// (§9 Design Notes: "the channel collaborator holds references").
pub enum Unit {
    Reader(CardReaderUnit),
    AsyncLine(AsyncLineUnit),
    BscLine(BscLineUnit),
}

impl Unit {
    pub fn da(&self) -> DeviceAddress {
        match self {
            Unit::Reader(u) => u.da(),
            Unit::AsyncLine(u) => u.da(),
            Unit::BscLine(u) => u.da(),
        }
    }

    /// `transport` is only consulted by the line variants (§5 Resource
    /// ownership: the scanner owns it, lines borrow it by index); the reader
    /// never touches it.
    pub fn start_command(
        &mut self,
        cmd: u8,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) -> StartResult {
        match self {
            Unit::Reader(u) => u.start_command(cmd, chan, sched),
            Unit::AsyncLine(u) => u.start_command(cmd, chan, sched, transport),
            Unit::BscLine(u) => u.start_command(cmd, chan, sched, transport),
        }
    }

    pub fn service_tick(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler, transport: &mut dyn LineTransport) {
        match self {
            Unit::Reader(u) => u.service_tick(chan, sched),
            Unit::AsyncLine(u) => u.service_tick(chan, sched, transport),
            Unit::BscLine(u) => u.service_tick(chan, sched, transport),
        }
    }

    pub fn halt_io(&mut self, chan: &mut dyn ChannelOps, transport: &mut dyn LineTransport) -> ChanStatus {
        match self {
            Unit::Reader(_) => ChanStatus::ce_de(), // §5: the reader has no HaltIO
            Unit::AsyncLine(u) => u.halt_io(chan, transport),
            Unit::BscLine(u) => u.halt_io(chan, transport),
        }
    }

    pub fn state(&self) -> UnitState {
        match self {
            Unit::Reader(u) => u.state(),
            Unit::AsyncLine(u) => u.state(),
            Unit::BscLine(u) => u.state(),
        }
    }
}

/// Outcome of `StartCommand`. `Busy` is the synchronous condition a second
/// command sees while one is already in progress; every other outcome
/// (including immediate completions) is signalled asynchronously through
/// `ChannelOps::chan_end` from inside `start_command`/`service_tick` and is
/// reported here only as `Accepted`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartResult {
    Busy,
    Accepted,
}
