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

    registry.rs

    Owned device registry keyed by device address (§9 Design Notes: "model
    each device as an owned instance within a device registry keyed by DA").
    Replaces the source's static `cdr_unit[]`/`coml_unit[]` arrays. The reader
    is held directly; lines live inside the scanner, which exclusively owns
    the multiplexer transport they borrow by index (§5).
*/

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler};
use crate::devices::card_reader::CardReaderUnit;
use crate::devices::scanner::{LineScanner, LineTransport};
use crate::devices::StartResult;

pub struct Registry {
    reader: CardReaderUnit,
    scanner: LineScanner,
}

impl Registry {
    pub fn new(reader: CardReaderUnit, scanner: LineScanner) -> Self {
        Registry { reader, scanner }
    }

    pub fn reader(&self) -> &CardReaderUnit {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut CardReaderUnit {
        &mut self.reader
    }

    pub fn scanner_mut(&mut self) -> &mut LineScanner {
        &mut self.scanner
    }

    fn line_by_da(&mut self, da: DeviceAddress) -> Option<&mut crate::devices::scanner::ScannedLine> {
        self.scanner.lines_mut().iter_mut().find(|l| l.da() == da)
    }

    /// Dispatch a channel `StartCommand` to whichever unit holds `da`.
    /// Returns `None` if no device is registered at that address.
    pub fn start_command(
        &mut self,
        da: DeviceAddress,
        cmd: u8,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) -> Option<StartResult> {
        if da == self.reader.da() {
            return Some(self.reader.start_command(cmd, chan, sched));
        }
        self.line_by_da(da).map(|line| line.start_command(cmd, chan, sched, transport))
    }

    pub fn service_tick(
        &mut self,
        da: DeviceAddress,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) {
        if da == self.reader.da() {
            self.reader.service_tick(chan, sched);
            return;
        }
        if let Some(line) = self.line_by_da(da) {
            line.service_tick(chan, sched, transport);
        }
    }

    pub fn halt_io(
        &mut self,
        da: DeviceAddress,
        chan: &mut dyn ChannelOps,
        transport: &mut dyn LineTransport,
    ) -> Option<ChanStatus> {
        if da == self.reader.da() {
            return Some(ChanStatus::ce_de()); // §5: the reader has no HaltIO
        }
        self.line_by_da(da).map(|line| line.halt_io(chan, transport))
    }
}
