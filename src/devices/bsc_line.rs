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

    devices::bsc_line.rs

    BSC Line Unit (BLU): one synchronous line framed with SYN/STX/DLE/ETX
    control characters (§4.3). Shares command dispatch shape with the async
    line but speaks framed blocks instead of edited text.
*/

#![allow(dead_code)]

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler, UNIT_EXCEPTION};
use crate::device_types::bsc::{BscSubMode, BscTerminator, DLE, ENQ, EOT, ETB, ETX, IBC, NAK, SOH, STX, SYN};
use crate::devices::scanner::LineTransport;
use crate::devices::StartResult;
use crate::sense::{Sense, SNS_CMD_REJECT, SNS_INTERVENTION_REQUIRED};
use crate::unit::UnitState;
use log::{debug, trace};

const BUF_LEN: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BscCommand {
    Read,
    Write,
    Sense,
    Break,
    Prepare,
    Search,
    Enable,
    SetMode,
}

/// Outcome of feeding one byte through the receive state machine (§4.3).
enum Ingest {
    Continue,
    Finalize(BscTerminator),
}

pub struct BscLineUnit {
    da: DeviceAddress,
    line_index: usize,
    state: UnitState,
    current_command: Option<BscCommand>,
    sense: Sense,

    pub(crate) recv: bool,
    send: bool,
    pub(crate) enabled: bool,
    pub(crate) polling: bool,
    input_ready: bool,
    brk: bool,

    bsc_dle: bool,
    bsc_transparent: bool,
    bsc_text: bool,
    eib_mode: bool,
    pending_bcc: u8,
    pending_terminator: Option<BscTerminator>,

    buffer: [u8; BUF_LEN],
    bptr: usize,
    iptr: usize,

    pub dialup: bool,
    connected: bool,
}

impl BscLineUnit {
    pub fn new(da: DeviceAddress, line_index: usize, dialup: bool) -> Self {
        BscLineUnit {
            da,
            line_index,
            state: UnitState::Idle,
            current_command: None,
            sense: Sense::new(),
            recv: false,
            send: false,
            enabled: false,
            polling: false,
            input_ready: false,
            brk: false,
            bsc_dle: false,
            bsc_transparent: false,
            bsc_text: false,
            eib_mode: false,
            pending_bcc: 0,
            pending_terminator: None,
            buffer: [0; BUF_LEN],
            bptr: 0,
            iptr: 0,
            dialup,
            connected: false,
        }
    }

    pub fn da(&self) -> DeviceAddress {
        self.da
    }
    pub fn line_index(&self) -> usize {
        self.line_index
    }
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Invoked by the scanner when a previously-`Polling` line connects (§4.4
    /// step 1, shared with the async unit's Enable completion).
    pub fn on_connected(&mut self, chan: &mut dyn ChannelOps) {
        self.connected = true;
        self.polling = false;
        self.enabled = true;
        if self.current_command == Some(BscCommand::Enable) {
            self.current_command = None;
            self.state = UnitState::Idle;
            chan.chan_end(self.da, ChanStatus::ce_de());
        }
    }

    pub fn start_command(
        &mut self,
        cmd: u8,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) -> StartResult {
        if self.current_command.is_some() {
            return StartResult::Busy;
        }

        self.sense.clear_all();
        match cmd {
            0x04 => {
                self.current_command = Some(BscCommand::Sense);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
            }
            0x23 => {
                let (byte, _done) = chan.chan_read_byte(self.da);
                self.eib_mode = byte & 0x40 != 0;
                if self.enabled {
                    transport.putc_ln(self.line_index, SYN);
                    transport.putc_ln(self.line_index, EOT);
                    debug!("line {}: Set Mode restarts with SYN EOT", self.da);
                }
                chan.chan_end(self.da, ChanStatus::ce_de());
            }
            0x29 => {
                self.sense.set(SNS_CMD_REJECT);
                chan.chan_end(self.da, ChanStatus::ce_de_uc());
            }
            0x02 | 0x0A => {
                if !self.enabled {
                    chan.chan_end(self.da, ChanStatus::ce_de_ue());
                    return StartResult::Accepted;
                }
                self.current_command = Some(BscCommand::Read);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
            }
            0x01 | 0x09 => {
                if !self.enabled {
                    chan.chan_end(self.da, ChanStatus::ce_de_ue());
                    return StartResult::Accepted;
                }
                self.current_command = Some(BscCommand::Write);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
            }
            0x0D => {
                self.current_command = None;
                self.state = UnitState::Idle;
                chan.chan_end(self.da, ChanStatus::ce_de());
            }
            0x06 => {
                self.recv = true;
                if self.input_ready || self.brk {
                    chan.chan_end(self.da, ChanStatus::ce_de());
                } else {
                    self.current_command = Some(BscCommand::Prepare);
                    self.state = UnitState::AwaitingService;
                }
            }
            0x0E => {
                chan.chan_end(self.da, ChanStatus::ce_de());
            }
            0x27 => {
                if self.enabled && !self.polling {
                    chan.chan_end(self.da, ChanStatus::ce_de());
                } else if !self.polling {
                    transport.set_modem_bits(self.line_index, true);
                    self.polling = true;
                    self.current_command = Some(BscCommand::Enable);
                    self.state = UnitState::AwaitingService;
                    debug!("line {}: Enable asserts DTR, awaiting connect", self.da);
                }
            }
            0x2F => {
                transport.set_modem_bits(self.line_index, false);
                self.reset_line();
                chan.chan_end(self.da, ChanStatus::ce_de());
            }
            _ => {
                self.sense.set(SNS_CMD_REJECT);
                chan.chan_end(self.da, ChanStatus::ce_de_uc());
            }
        }
        StartResult::Accepted
    }

    fn reset_line(&mut self) {
        self.enabled = false;
        self.polling = false;
        self.recv = false;
        self.send = false;
        self.input_ready = false;
        self.brk = false;
        self.bsc_dle = false;
        self.bsc_transparent = false;
        self.bsc_text = false;
        self.pending_bcc = 0;
        self.pending_terminator = None;
        self.bptr = 0;
        self.iptr = 0;
        self.connected = false;
    }

    pub fn halt_io(&mut self, chan: &mut dyn ChannelOps, transport: &mut dyn LineTransport) -> ChanStatus {
        let status = match self.current_command {
            None => return ChanStatus::default(),
            Some(BscCommand::Sense) => ChanStatus::default(),
            Some(BscCommand::Prepare) => {
                self.reset_line();
                ChanStatus::ce_de_ue()
            }
            Some(BscCommand::Enable) => {
                transport.set_modem_bits(self.line_index, false);
                self.reset_line();
                ChanStatus::ce_de_ue()
            }
            Some(_) => ChanStatus::ce_de(),
        };
        self.current_command = None;
        self.state = UnitState::Idle;
        if status != ChanStatus::default() {
            chan.chan_end(self.da, status);
        }
        status
    }

    pub fn service_tick(
        &mut self,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
        transport: &mut dyn LineTransport,
    ) {
        match self.current_command {
            Some(BscCommand::Sense) => self.service_sense(chan),
            Some(BscCommand::Read) => self.service_read(chan, sched),
            Some(BscCommand::Write) => self.service_write(chan, sched, transport),
            _ => {}
        }
    }

    fn service_sense(&mut self, chan: &mut dyn ChannelOps) {
        let byte = self.sense.take();
        chan.chan_write_byte(self.da, byte);
        chan.chan_end(self.da, ChanStatus::ce_de());
        self.current_command = None;
        self.state = UnitState::Idle;
    }

    fn service_read(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler) {
        if !self.connected {
            self.reset_line();
            self.sense.set(SNS_INTERVENTION_REQUIRED);
            chan.chan_end(self.da, ChanStatus::ce_de_ue());
            self.current_command = None;
            self.state = UnitState::Idle;
            return;
        }
        if self.brk {
            self.reset_line();
            self.sense.set(SNS_INTERVENTION_REQUIRED);
            chan.chan_end(self.da, ChanStatus::ce_de_uc().with(UNIT_EXCEPTION));
            self.current_command = None;
            self.state = UnitState::Idle;
            return;
        }
        if self.input_ready {
            if self.iptr < self.bptr {
                let byte = self.buffer[self.iptr];
                self.iptr += 1;
                chan.chan_write_byte(self.da, byte);
            }
            if self.iptr == self.bptr {
                let status = match self.pending_terminator.take() {
                    Some(BscTerminator::Ack1) => ChanStatus::ce_de_ue(),
                    _ => ChanStatus::ce_de(),
                };
                chan.chan_end(self.da, status);
                self.current_command = None;
                self.state = UnitState::Idle;
                self.input_ready = false;
                return;
            }
        }
        sched.schedule(self.da, 200);
    }

    fn service_write(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler, transport: &mut dyn LineTransport) {
        let (byte, done) = chan.chan_read_byte(self.da);
        if done {
            chan.chan_end(self.da, ChanStatus::ce_de());
            self.current_command = None;
            self.state = UnitState::Idle;
            return;
        }

        if self.bsc_transparent && byte == DLE {
            transport.putc_ln(self.line_index, DLE);
        } else if byte == DLE {
            self.bsc_dle = true;
        } else if self.bsc_dle && byte == ETX {
            self.bsc_transparent = true;
            self.bsc_dle = false;
        }
        transport.putc_ln(self.line_index, byte);
        trace!("line {}: write byte {:#04x}", self.da, byte);
        sched.schedule(self.da, 2000);
    }

    /// Invoked by the scanner for every byte arriving on this line while
    /// `Recv` (§4.3 Receive path, §9 "deliver_byte").
    pub fn deliver_byte(&mut self, _chan: &mut dyn ChannelOps, byte: u8, _transport: &mut dyn LineTransport) {
        if !self.recv {
            return;
        }
        if self.pending_bcc > 0 {
            self.pending_bcc -= 1;
            return;
        }
        if byte == SYN {
            return;
        }
        let submode = BscSubMode::from_flags(self.bsc_text, self.bsc_transparent);
        let outcome = match submode {
            BscSubMode::TextTransparent => self.ingest_text_transparent(byte),
            BscSubMode::Text => self.ingest_text(byte),
            BscSubMode::Idle => self.ingest_idle(byte),
        };
        if let Ingest::Finalize(terminator) = outcome {
            self.pending_terminator = Some(terminator);
            self.input_ready = true;
            self.recv = false;
            self.iptr = 0;
        }
    }

    fn gotdle(&self) -> bool {
        self.bptr > 0 && self.buffer[self.bptr - 1] == DLE
    }

    fn append(&mut self, byte: u8) {
        if self.bptr < BUF_LEN {
            self.buffer[self.bptr] = byte;
            self.bptr += 1;
        }
    }

    fn ingest_idle(&mut self, byte: u8) -> Ingest {
        let gotdle = self.gotdle();
        if gotdle {
            if matches!(byte, 0x60..=0x7F) {
                self.append(byte);
                return Ingest::Finalize(BscTerminator::Ack0);
            }
            if byte == STX {
                self.append(byte);
                self.bsc_text = true;
                self.bsc_transparent = true;
                return Ingest::Continue;
            }
            self.append(byte);
            return Ingest::Continue;
        }
        match byte {
            EOT => {
                self.append(byte);
                Ingest::Finalize(BscTerminator::Ack1)
            }
            ENQ | ETX | NAK => {
                self.append(byte);
                Ingest::Finalize(BscTerminator::Ack0)
            }
            SOH => {
                self.append(byte);
                self.bsc_text = true;
                Ingest::Continue
            }
            STX => {
                self.append(byte);
                self.bsc_text = true;
                Ingest::Continue
            }
            _ => {
                self.append(byte);
                Ingest::Continue
            }
        }
    }

    fn ingest_text(&mut self, byte: u8) -> Ingest {
        let gotdle = self.gotdle();
        if gotdle && byte == STX {
            self.append(byte);
            self.bsc_transparent = true;
            return Ingest::Continue;
        }
        if gotdle && matches!(byte, 0x60 | 0x61 | 0x70) {
            self.append(byte);
            return Ingest::Finalize(BscTerminator::Ack0);
        }
        self.append(byte);
        match byte {
            ETB => {
                self.pending_bcc = 2;
                Ingest::Continue
            }
            EOT | ETX | ENQ => {
                if self.eib_mode {
                    self.append(0);
                }
                Ingest::Finalize(BscTerminator::Ack0)
            }
            IBC => {
                if self.eib_mode {
                    self.append(0);
                }
                Ingest::Continue
            }
            _ => Ingest::Continue,
        }
    }

    fn ingest_text_transparent(&mut self, byte: u8) -> Ingest {
        let gotdle = self.gotdle();
        if gotdle {
            match byte {
                DLE => Ingest::Continue,
                ETB => {
                    self.pending_bcc = 2;
                    Ingest::Continue
                }
                EOT | ETX => {
                    self.bsc_transparent = false;
                    self.append(byte);
                    if self.eib_mode {
                        self.append(0);
                    }
                    Ingest::Finalize(BscTerminator::Ack0)
                }
                IBC => {
                    self.bsc_transparent = false;
                    self.append(byte);
                    if self.eib_mode {
                        self.append(0);
                    }
                    Ingest::Continue
                }
                ENQ => {
                    self.bsc_transparent = false;
                    self.bsc_text = false;
                    self.append(byte);
                    Ingest::Finalize(BscTerminator::Ack0)
                }
                _ => {
                    self.append(byte);
                    Ingest::Continue
                }
            }
        } else {
            match byte {
                DLE => {
                    self.append(byte);
                    Ingest::Continue
                }
                ETB => {
                    self.pending_bcc = 2;
                    Ingest::Continue
                }
                EOT | ETX | ENQ => {
                    self.append(byte);
                    if self.eib_mode {
                        self.append(0);
                    }
                    if byte == ENQ {
                        self.bsc_transparent = false;
                        self.bsc_text = false;
                    }
                    Ingest::Finalize(BscTerminator::Ack0)
                }
                IBC => {
                    self.append(byte);
                    if self.eib_mode {
                        self.append(0);
                    }
                    Ingest::Continue
                }
                _ => {
                    self.append(byte);
                    Ingest::Continue
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockChannel {
        written: Vec<u8>,
        ends: Vec<ChanStatus>,
    }

    impl MockChannel {
        fn new() -> Self {
            MockChannel { written: Vec::new(), ends: Vec::new() }
        }
    }

    impl ChannelOps for MockChannel {
        fn chan_write_byte(&mut self, _da: DeviceAddress, byte: u8) -> bool {
            self.written.push(byte);
            false
        }
        fn chan_read_byte(&mut self, _da: DeviceAddress) -> (u8, bool) {
            (0, true)
        }
        fn chan_end(&mut self, _da: DeviceAddress, status: ChanStatus) {
            self.ends.push(status);
        }
        fn set_devattn(&mut self, _da: DeviceAddress, _status: ChanStatus) {}
    }

    #[derive(Default)]
    struct MockScheduler;
    impl Scheduler for MockScheduler {
        fn schedule(&mut self, _da: DeviceAddress, _ticks: u32) {}
    }

    struct MockTransport {
        out: Vec<u8>,
    }
    impl MockTransport {
        fn new() -> Self {
            MockTransport { out: Vec::new() }
        }
    }
    impl LineTransport for MockTransport {
        fn poll_conn(&mut self) -> Option<usize> {
            None
        }
        fn getc_ln(&mut self, _line: usize) -> Option<u8> {
            None
        }
        fn putc_ln(&mut self, _line: usize, byte: u8) {
            self.out.push(byte);
        }
        fn set_modem_bits(&mut self, _line: usize, _dtr: bool) {}
        fn reset_ln(&mut self, _line: usize) {}
        fn rqln(&self, _line: usize) -> usize {
            0
        }
        fn send_buffered_data(&mut self, _line: usize) {}
    }

    fn feed(line: &mut BscLineUnit, chan: &mut MockChannel, transport: &mut MockTransport, bytes: &[u8]) {
        for &b in bytes {
            line.deliver_byte(chan, b, transport);
        }
    }

    #[test]
    fn s5_bsc_ack_idle_block() {
        let mut line = BscLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(&mut line, &mut chan, &mut transport, &[SYN, SYN, STX, 0x41, 0x42, ETX]);

        assert!(line.input_ready);
        assert_eq!(&line.buffer[..line.bptr], &[STX, 0x41, 0x42, ETX]);
        assert_eq!(line.pending_terminator, Some(BscTerminator::Ack0));

        let mut sched = MockScheduler;
        line.connected = true;
        line.current_command = Some(BscCommand::Read);
        line.service_read(&mut chan, &mut sched);
        run_read(&mut line, &mut chan, &mut sched);
        assert_eq!(chan.written, vec![STX, 0x41, 0x42, ETX]);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de());
    }

    #[test]
    fn s6_bsc_transparent_dle_doubling() {
        let mut line = BscLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(
            &mut line,
            &mut chan,
            &mut transport,
            &[SYN, STX, DLE, STX, 0x41, DLE, DLE, 0x42, DLE, ETX],
        );

        assert!(line.input_ready);
        assert_eq!(
            &line.buffer[..line.bptr],
            &[STX, DLE, STX, 0x41, DLE, 0x42, DLE, ETX]
        );

        let mut sched = MockScheduler;
        line.connected = true;
        line.current_command = Some(BscCommand::Read);
        run_read(&mut line, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de());
    }

    fn run_read(line: &mut BscLineUnit, chan: &mut MockChannel, sched: &mut MockScheduler) {
        let mut guard = 0;
        while line.current_command.is_some() {
            line.service_read(chan, sched);
            guard += 1;
            assert!(guard < 1000, "runaway service loop");
        }
    }

    #[test]
    fn transparent_write_doubles_embedded_dle() {
        let mut line = BscLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut transport = MockTransport::new();
        line.bsc_transparent = true;

        let mut chan = PayloadChannel { payload: vec![0x41, DLE, 0x42].into(), ends: Vec::new() };
        line.enabled = true;
        line.current_command = Some(BscCommand::Write);
        let mut sched = MockScheduler;
        for _ in 0..3 {
            line.service_write(&mut chan, &mut sched, &mut transport);
        }
        assert_eq!(transport.out, vec![0x41, DLE, DLE, 0x42]);
    }

    struct PayloadChannel {
        payload: std::collections::VecDeque<u8>,
        ends: Vec<ChanStatus>,
    }
    impl ChannelOps for PayloadChannel {
        fn chan_write_byte(&mut self, _da: DeviceAddress, _byte: u8) -> bool {
            false
        }
        fn chan_read_byte(&mut self, _da: DeviceAddress) -> (u8, bool) {
            match self.payload.pop_front() {
                Some(b) => (b, false),
                None => (0, true),
            }
        }
        fn chan_end(&mut self, _da: DeviceAddress, status: ChanStatus) {
            self.ends.push(status);
        }
        fn set_devattn(&mut self, _da: DeviceAddress, _status: ChanStatus) {}
    }

    #[test]
    fn ingest_text_ack_preserves_data_byte() {
        let mut line = BscLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;
        line.bsc_text = true;

        feed(&mut line, &mut chan, &mut transport, &[DLE, 0x60]);

        assert!(line.input_ready);
        assert_eq!(line.pending_terminator, Some(BscTerminator::Ack0));
        assert_eq!(&line.buffer[..line.bptr], &[DLE, 0x60]);
    }

    #[test]
    fn serialization_busy_rejects_second_start() {
        let mut line = BscLineUnit::new(DeviceAddress::new(0x030), 0, true);
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler;
        let mut transport = MockTransport::new();
        line.start_command(0x04, &mut chan, &mut sched, &mut transport);
        assert_eq!(line.start_command(0x04, &mut chan, &mut sched, &mut transport), StartResult::Busy);
    }
}
