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

    devices::scanner.rs

    Line Scanner (LS): the periodic task that accepts new line connections,
    delivers input bytes into the right line's buffer, and drains transmit
    output (§4.4). Owns the multiplexer collaborator exclusively; lines
    borrow it via their line index (§5 Resource ownership).
*/

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler};
use crate::devices::{async_line::AsyncLineUnit, bsc_line::BscLineUnit, StartResult, Unit};
use crate::unit::UnitState;
use log::debug;

/// External multiplexer collaborator (§6): TCP line I/O and modem bits.
/// Out of scope: the socket implementation itself.
pub trait LineTransport {
    /// A pending inbound connection, if any, consumed on accept.
    fn poll_conn(&mut self) -> Option<usize>;
    fn getc_ln(&mut self, line: usize) -> Option<u8>;
    fn putc_ln(&mut self, line: usize, byte: u8);
    fn set_modem_bits(&mut self, line: usize, dtr: bool);
    fn reset_ln(&mut self, line: usize);
    fn rqln(&self, line: usize) -> usize;
    fn send_buffered_data(&mut self, line: usize);
}

/// One scanner-managed line: either an async (2741) or BSC line unit, paired
/// with the multiplexer line index the scanner uses to reach its transport.
pub enum ScannedLine {
    Async(AsyncLineUnit),
    Bsc(BscLineUnit),
}

impl ScannedLine {
    pub fn da(&self) -> DeviceAddress {
        match self {
            ScannedLine::Async(l) => l.da(),
            ScannedLine::Bsc(l) => l.da(),
        }
    }

    pub fn line_index(&self) -> usize {
        match self {
            ScannedLine::Async(l) => l.line_index(),
            ScannedLine::Bsc(l) => l.line_index(),
        }
    }

    pub fn is_dialup(&self) -> bool {
        match self {
            ScannedLine::Async(l) => l.dialup,
            ScannedLine::Bsc(l) => l.dialup,
        }
    }

    fn mark_connected(&mut self, chan: &mut dyn ChannelOps) {
        match self {
            ScannedLine::Async(l) => l.on_connected(chan),
            ScannedLine::Bsc(l) => l.on_connected(chan),
        }
    }

    fn post_attention_enter(&mut self) {
        match self {
            ScannedLine::Async(l) => {
                l.enabled = true;
                l.addr_req = true;
            }
            ScannedLine::Bsc(l) => {
                l.enabled = true;
            }
        }
    }

    fn is_enabled_and_not_recv(&self) -> bool {
        match self {
            ScannedLine::Async(l) => l.enabled && !l.recv,
            ScannedLine::Bsc(l) => l.enabled && !l.recv,
        }
    }

    fn deliver_byte(&mut self, chan: &mut dyn ChannelOps, byte: u8, transport: &mut dyn LineTransport) {
        match self {
            ScannedLine::Async(l) => l.deliver_byte(chan, byte, transport),
            ScannedLine::Bsc(l) => l.deliver_byte(chan, byte, transport),
        }
    }

    /// Dispatch entry points for a device registry keyed by DA (§9 Design
    /// Notes): a line is channel-addressable the same way the reader is.
    pub fn start_command(
        &mut self,
        cmd: u8,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) -> StartResult {
        match self {
            ScannedLine::Async(l) => l.start_command(cmd, chan, sched, transport),
            ScannedLine::Bsc(l) => l.start_command(cmd, chan, sched, transport),
        }
    }

    pub fn service_tick(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler, transport: &mut dyn LineTransport) {
        match self {
            ScannedLine::Async(l) => l.service_tick(chan, sched, transport),
            ScannedLine::Bsc(l) => l.service_tick(chan, sched, transport),
        }
    }

    pub fn halt_io(&mut self, chan: &mut dyn ChannelOps, transport: &mut dyn LineTransport) -> ChanStatus {
        match self {
            ScannedLine::Async(l) => l.halt_io(chan, transport),
            ScannedLine::Bsc(l) => l.halt_io(chan, transport),
        }
    }

    pub fn state(&self) -> UnitState {
        match self {
            ScannedLine::Async(l) => l.state(),
            ScannedLine::Bsc(l) => l.state(),
        }
    }
}

impl From<ScannedLine> for Unit {
    fn from(line: ScannedLine) -> Unit {
        match line {
            ScannedLine::Async(l) => Unit::AsyncLine(l),
            ScannedLine::Bsc(l) => Unit::BscLine(l),
        }
    }
}

pub struct LineScanner {
    lines: Vec<ScannedLine>,
}

impl LineScanner {
    pub fn new(lines: Vec<ScannedLine>) -> Self {
        LineScanner { lines }
    }

    pub fn lines_mut(&mut self) -> &mut [ScannedLine] {
        &mut self.lines
    }

    /// One scanner poll cycle (§4.4). `transport` is the multiplexer
    /// collaborator; `chan` delivers attention through the channel.
    pub fn tick(&mut self, chan: &mut dyn ChannelOps, transport: &mut dyn LineTransport) {
        // Step 1: accept one pending connection, bind to the lowest unused line.
        if let Some(conn_idx) = transport.poll_conn() {
            if let Some(line) = self.lines.iter_mut().find(|l| l.line_index() == conn_idx) {
                let was_polling = match line {
                    ScannedLine::Async(l) => l.polling,
                    ScannedLine::Bsc(l) => l.polling,
                };
                if was_polling {
                    line.mark_connected(chan);
                    debug!("scanner: line {} connected, Enable completes", line.da());
                } else if line.is_dialup() {
                    line.post_attention_enter();
                    chan.set_devattn(line.da(), ChanStatus::new(crate::channel::ATTENTION));
                    debug!("scanner: dialup line {} posts attention", line.da());
                } else {
                    transport.set_modem_bits(conn_idx, false);
                    transport.reset_ln(conn_idx);
                    debug!("scanner: direct line {} rejects unsolicited connect", line.da());
                }
            }
        }

        // Step 2: raise attention for enabled, non-Recv lines with pending input.
        for line in self.lines.iter() {
            if line.is_enabled_and_not_recv() && transport.rqln(line.line_index()) > 0 {
                chan.set_devattn(line.da(), ChanStatus::new(crate::channel::ATTENTION));
            }
        }

        // Step 3: flush transmit, drain receive into each line's buffer.
        for line in self.lines.iter_mut() {
            let idx = line.line_index();
            transport.send_buffered_data(idx);
            while let Some(byte) = transport.getc_ln(idx) {
                line.deliver_byte(chan, byte, transport);
            }
        }
    }
}
