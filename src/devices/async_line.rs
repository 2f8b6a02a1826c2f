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

    devices::async_line.rs

    Async Line Unit (ALU): one 2741-style terminal line. Shares command
    dispatch shape with the BSC line but speaks line-edited ASCII-ish text
    with echo, not BSC framing (§4.2).
*/

#![allow(dead_code)]

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler};
use crate::device_types::translation::{
    COM_2741_IN, COM_2741_OUT, OUT_NO_CHAR, OUT_TOK_ADDR, OUT_TOK_ADDR9, OUT_TOK_ADDR_ACK,
    OUT_TOK_BYPASS, OUT_TOK_RESTORE, OUT_TOK_UTF8_CENT, OUT_TOK_UTF8_NOT,
};
use crate::devices::scanner::LineTransport;
use crate::devices::StartResult;
use crate::sense::{Sense, SNS_CMD_REJECT, SNS_INTERVENTION_REQUIRED};
use crate::unit::UnitState;
use log::{debug, trace};

const ADDR_BYTE: u8 = 0x16;
const LINE_END: [u8; 2] = [0x5B, 0x1F];
const BUF_LEN: usize = 256;
const FORCE_FLUSH_AT: usize = 253;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AsyncCommand {
    Read,
    Write,
    Sense,
    Break,
    Prepare,
    Search,
    Enable,
}

pub struct AsyncLineUnit {
    da: DeviceAddress,
    line_index: usize,
    state: UnitState,
    current_command: Option<AsyncCommand>,
    sense: Sense,

    pub(crate) recv: bool,
    send: bool,
    pub(crate) enabled: bool,
    pub(crate) polling: bool,
    input_ready: bool,
    brk: bool,
    bypass: bool,
    pub(crate) addr_req: bool,
    addr9: bool,

    buffer: [u8; BUF_LEN],
    bptr: usize,
    iptr: usize,

    pub dialup: bool,
    connected: bool,
}

impl AsyncLineUnit {
    pub fn new(da: DeviceAddress, line_index: usize, dialup: bool) -> Self {
        AsyncLineUnit {
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
            bypass: false,
            addr_req: false,
            addr9: false,
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

    /// Invoked by the scanner when a previously-`Polling` line connects;
    /// completes a deferred Enable (§4.2 Enable, §4.4 step 1, property 7).
    pub fn on_connected(&mut self, chan: &mut dyn ChannelOps) {
        self.connected = true;
        self.polling = false;
        self.enabled = true;
        if self.current_command == Some(AsyncCommand::Enable) {
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
                self.current_command = Some(AsyncCommand::Sense);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
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
                self.current_command = Some(AsyncCommand::Read);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
            }
            0x01 | 0x09 => {
                if !self.enabled {
                    chan.chan_end(self.da, ChanStatus::ce_de_ue());
                    return StartResult::Accepted;
                }
                self.current_command = Some(AsyncCommand::Write);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 200);
            }
            0x0D => {
                self.current_command = None;
                self.addr_req = true;
                self.state = UnitState::Idle;
                chan.chan_end(self.da, ChanStatus::ce_de());
            }
            0x06 => {
                self.recv = true;
                if self.input_ready || self.brk {
                    chan.chan_end(self.da, ChanStatus::ce_de());
                } else {
                    self.current_command = Some(AsyncCommand::Prepare);
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
                    self.current_command = Some(AsyncCommand::Enable);
                    self.state = UnitState::AwaitingService;
                    debug!("line {}: Enable asserts DTR, awaiting connect", self.da);
                }
                // already Polling: nothing to do, the prior Enable is still pending.
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
        self.bypass = false;
        self.addr_req = false;
        self.addr9 = false;
        self.bptr = 0;
        self.iptr = 0;
        self.connected = false;
    }

    pub fn halt_io(&mut self, chan: &mut dyn ChannelOps, transport: &mut dyn LineTransport) -> ChanStatus {
        let status = match self.current_command {
            None => return ChanStatus::default(),
            Some(AsyncCommand::Sense) => ChanStatus::default(),
            Some(AsyncCommand::Prepare) => {
                self.reset_line();
                ChanStatus::ce_de_ue()
            }
            Some(AsyncCommand::Enable) => {
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
            Some(AsyncCommand::Sense) => self.service_sense(chan),
            Some(AsyncCommand::Read) => self.service_read(chan, sched),
            Some(AsyncCommand::Write) => self.service_write(chan, sched, transport),
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
        if self.addr_req && self.bptr == 0 {
            chan.chan_write_byte(self.da, ADDR_BYTE);
            self.addr_req = false;
            if self.addr9 {
                self.finish_read(chan);
                return;
            }
        }
        if self.brk {
            self.reset_line();
            self.sense.set(SNS_INTERVENTION_REQUIRED);
            chan.chan_end(self.da, ChanStatus::ce_de_uc().with(crate::channel::UNIT_EXCEPTION));
            self.current_command = None;
            self.state = UnitState::Idle;
            return;
        }
        if self.input_ready {
            if self.iptr < self.bptr {
                let byte = self.buffer[self.iptr];
                self.iptr += 1;
                if byte == 0x1F {
                    self.addr_req = true;
                }
                chan.chan_write_byte(self.da, byte);
            }
            if self.iptr == self.bptr {
                self.finish_read(chan);
                return;
            }
        }
        sched.schedule(self.da, 200);
    }

    fn finish_read(&mut self, chan: &mut dyn ChannelOps) {
        chan.chan_end(self.da, ChanStatus::ce_de());
        self.current_command = None;
        self.state = UnitState::Idle;
    }

    fn service_write(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler, transport: &mut dyn LineTransport) {
        let (byte, done) = chan.chan_read_byte(self.da);
        if done {
            chan.chan_end(self.da, ChanStatus::ce_de());
            self.current_command = None;
            self.state = UnitState::Idle;
            return;
        }

        let out = COM_2741_OUT[byte as usize];
        // Dispatch on the raw channel byte, not its translation: the control
        // tokens below (address sequence, bypass, restore) never appear as a
        // COM_2741_OUT value, so matching `out` made every arm but the last
        // unreachable. The UTF-8 substitutions and plain-character fallback
        // only apply outside an address sequence, matching the C source's
        // `(uptr->CMD & ADDR) == 0` guard.
        match byte {
            OUT_TOK_ADDR => self.addr_req = true,
            OUT_TOK_ADDR_ACK if self.addr_req => self.addr_req = false,
            OUT_TOK_BYPASS => self.bypass = true,
            OUT_TOK_RESTORE => {
                self.bypass = false;
                self.addr_req = false;
                self.addr9 = false;
            }
            OUT_TOK_ADDR9 if self.addr_req => self.addr9 = true,
            _ if self.addr_req => {}
            OUT_TOK_UTF8_NOT => {
                transport.putc_ln(self.line_index, 0xC2);
                transport.putc_ln(self.line_index, 0xAC);
            }
            OUT_TOK_UTF8_CENT => {
                transport.putc_ln(self.line_index, 0xC2);
                transport.putc_ln(self.line_index, 0xA2);
            }
            ch => {
                if out != OUT_NO_CHAR {
                    transport.putc_ln(self.line_index, out);
                }
                if ch == 0x5B || ch == 0xDB {
                    transport.putc_ln(self.line_index, b'\r');
                }
            }
        }
        trace!("line {}: write byte {:#04x} -> out {:#04x}", self.da, byte, out);
        sched.schedule(self.da, 2000);
    }

    /// Invoked by the scanner for every byte arriving on this line, whether
    /// solicited (Enabled+Recv) or not (§4.2 Receive path, §9 "deliver_byte").
    pub fn deliver_byte(&mut self, _chan: &mut dyn ChannelOps, byte: u8, transport: &mut dyn LineTransport) {
        if !self.recv {
            return;
        }
        match byte {
            0x0D | 0x0A => {
                self.append(LINE_END[0]);
                self.append(LINE_END[1]);
                self.input_ready = true;
                self.recv = false;
                self.iptr = 0;
                self.echo(transport, b"\r\n");
            }
            0x7F | 0x08 => {
                self.retract();
                self.echo(transport, &[0x08, b' ', 0x08]);
            }
            0x15 => {
                while self.bptr > 0 {
                    self.retract();
                    self.echo(transport, &[0x08, b' ', 0x08]);
                }
            }
            0x03 => {
                self.brk = true;
                self.recv = false;
            }
            _ => {
                let translated = if (byte as usize) < COM_2741_IN.len() { COM_2741_IN[byte as usize] } else { 0 };
                if translated == 0 {
                    self.echo(transport, &[0x07]); // bell
                } else {
                    self.append(translated);
                    if !self.bypass {
                        self.echo(transport, &[byte]);
                    }
                }
            }
        }

        if self.bptr == FORCE_FLUSH_AT {
            self.append(LINE_END[0]);
            self.append(LINE_END[1]);
            self.input_ready = true;
            self.recv = false;
            self.iptr = 0;
        }
    }

    fn append(&mut self, byte: u8) {
        if self.bptr < BUF_LEN {
            self.buffer[self.bptr] = byte;
            self.bptr += 1;
        }
    }

    fn retract(&mut self) {
        if self.bptr > 0 {
            self.bptr -= 1;
        }
    }

    fn echo(&self, transport: &mut dyn LineTransport, bytes: &[u8]) {
        for &b in bytes {
            transport.putc_ln(self.line_index, b);
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

    /// A byte queue `chan_read_byte` drains in order, used to drive `service_write`.
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

    fn feed(line: &mut AsyncLineUnit, chan: &mut MockChannel, transport: &mut MockTransport, bytes: &[u8]) {
        for &b in bytes {
            line.deliver_byte(chan, b, transport);
        }
    }

    fn write_bytes(line: &mut AsyncLineUnit, bytes: &[u8]) -> Vec<u8> {
        let mut chan = PayloadChannel { payload: bytes.iter().copied().collect(), ends: Vec::new() };
        let mut sched = MockScheduler;
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.current_command = Some(AsyncCommand::Write);
        // one extra tick to observe the `done` chan_end after the payload drains
        for _ in 0..=bytes.len() {
            line.service_write(&mut chan, &mut sched, &mut transport);
        }
        transport.out
    }

    #[test]
    fn s4_async_echo() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(&mut line, &mut chan, &mut transport, b"HI\r");

        assert!(line.input_ready);
        assert_eq!(transport.out, b"HI\r\n");
        assert_eq!(
            &line.buffer[..line.bptr],
            &[COM_2741_IN[b'H' as usize], COM_2741_IN[b'I' as usize], LINE_END[0], LINE_END[1]]
        );
    }

    #[test]
    fn echo_is_idempotent_across_repeated_lines() {
        // Property 5: echoing the same input line twice produces the same
        // transcript and leaves the same buffered bytes behind.
        let mut line_a = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan_a = MockChannel::new();
        let mut transport_a = MockTransport::new();
        line_a.enabled = true;
        line_a.recv = true;
        feed(&mut line_a, &mut chan_a, &mut transport_a, b"HI\r");

        let mut line_b = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan_b = MockChannel::new();
        let mut transport_b = MockTransport::new();
        line_b.enabled = true;
        line_b.recv = true;
        feed(&mut line_b, &mut chan_b, &mut transport_b, b"HI\r");

        assert_eq!(transport_a.out, transport_b.out);
        assert_eq!(&line_a.buffer[..line_a.bptr], &line_b.buffer[..line_b.bptr]);
    }

    #[test]
    fn backspace_retracts_buffer_and_echoes_erase_sequence() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(&mut line, &mut chan, &mut transport, &[b'H', b'I', 0x7F]);

        assert_eq!(line.bptr, 1);
        assert_eq!(&line.buffer[..line.bptr], &[COM_2741_IN[b'H' as usize]]);
        assert_eq!(transport.out, vec![b'H', b'I', 0x08, b' ', 0x08]);
    }

    #[test]
    fn nak_retracts_entire_buffer() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(&mut line, &mut chan, &mut transport, &[b'H', b'I', 0x15]);

        assert_eq!(line.bptr, 0);
    }

    #[test]
    fn ctrl_c_sets_break_and_stops_receiving() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let mut chan = MockChannel::new();
        let mut transport = MockTransport::new();
        line.enabled = true;
        line.recv = true;

        feed(&mut line, &mut chan, &mut transport, &[b'H', 0x03]);

        assert!(line.brk);
        assert!(!line.recv);
    }

    #[test]
    fn write_address_sequence_is_consumed_silently() {
        // OUT_TOK_ADDR (0x1F) opens an address sequence; OUT_TOK_ADDR_ACK
        // (0x16, which otherwise translates to '#') closes it and must never
        // reach the terminal as output (Bug: previously dispatched on the
        // translated byte, so this token was unreachable and 0x16 echoed '#').
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let out = write_bytes(&mut line, &[OUT_TOK_ADDR, OUT_TOK_ADDR_ACK]);
        assert!(out.is_empty());
        assert!(!line.addr_req);
    }

    #[test]
    fn write_bypass_then_restore_clears_flags() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        write_bytes(&mut line, &[OUT_TOK_BYPASS]);
        assert!(line.bypass);
        write_bytes(&mut line, &[OUT_TOK_RESTORE]);
        assert!(!line.bypass);
        assert!(!line.addr_req);
        assert!(!line.addr9);
    }

    #[test]
    fn write_utf8_substitutions_emit_two_bytes() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let out = write_bytes(&mut line, &[OUT_TOK_UTF8_NOT, OUT_TOK_UTF8_CENT]);
        assert_eq!(out, vec![0xC2, 0xAC, 0xC2, 0xA2]);
    }

    #[test]
    fn write_line_end_byte_appends_cr() {
        let mut line = AsyncLineUnit::new(DeviceAddress::new(0x030), 0, false);
        let out = write_bytes(&mut line, &[0x5B]);
        assert_eq!(out, vec![COM_2741_OUT[0x5B], b'\r']);
    }
}
