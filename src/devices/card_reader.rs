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

    devices::card_reader.rs

    Card Reader Unit (CRU): emulates an IBM 2540R, one 80-column Hollerith
    card at a time, translated to EBCDIC as it streams to the channel.
*/

use crate::channel::{ChanStatus, ChannelOps, DeviceAddress, Scheduler, CHANNEL_END, DEVICE_END, UNIT_CHECK};
use crate::device_types::translation::{hol_to_ebcdic, HolColumn};
use crate::devices::StartResult;
use crate::sense::{Sense, SNS_CMD_REJECT, SNS_DATA_CHECK, SNS_INTERVENTION_REQUIRED};
use crate::unit::UnitState;
use log::{debug, trace, warn};

/// External collaborator providing card images (§6: "external module
/// provides `read_card`/`card_eof`"). Out of scope: the codec itself.
pub trait CardSource {
    fn read_card(&mut self) -> CardReadOutcome;
    fn card_eof(&self) -> bool;
}

pub enum CardReadOutcome {
    Ok([HolColumn; 80]),
    EmptyHopper,
    EofMarker,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReaderCommand {
    Read,
    Feed,
    Sense,
}

pub struct CardReaderUnit {
    da: DeviceAddress,
    state: UnitState,
    current_command: Option<ReaderCommand>,
    sense: Sense,
    card_in_buffer: bool,
    eof_pending: bool,
    buffer: [HolColumn; 80],
    col: usize,
    source: Option<Box<dyn CardSource>>,
}

impl CardReaderUnit {
    pub fn new(da: DeviceAddress) -> Self {
        CardReaderUnit {
            da,
            state: UnitState::Idle,
            current_command: None,
            sense: Sense::new(),
            card_in_buffer: false,
            eof_pending: false,
            buffer: [0; 80],
            col: 0,
            source: None,
        }
    }

    pub fn da(&self) -> DeviceAddress {
        self.da
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn attached(&self) -> bool {
        self.source.is_some()
    }

    /// Bind a card source; allocates the buffer's backing. Released by `detach`.
    pub fn attach(&mut self, source: Box<dyn CardSource>) {
        self.source = Some(source);
        self.eof_pending = false;
    }

    pub fn detach(&mut self) {
        self.source = None;
        self.card_in_buffer = false;
    }

    /// Equivalent to issuing Read at boot (§4.1 Boot). Fails if unattached.
    pub fn boot(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler) -> Result<(), anyhow::Error> {
        if !self.attached() {
            return Err(anyhow::anyhow!("card reader {} not attached", self.da));
        }
        self.start_command(0x02, chan, sched);
        chan.chan_boot(self.da);
        Ok(())
    }

    pub fn start_command(
        &mut self,
        cmd: u8,
        chan: &mut dyn ChannelOps,
        sched: &mut dyn Scheduler,
    ) -> StartResult {
        if self.current_command.is_some() {
            if self.attached() {
                trace!("reader {}: busy, rejecting cmd {:#04x}", self.da, cmd);
                return StartResult::Busy;
            }
            chan.chan_end(self.da, ChanStatus::new(DEVICE_END));
            return StartResult::Accepted;
        }

        if cmd != 0x04 && self.source.as_deref().is_some_and(|s| s.card_eof()) {
            self.sense.set(SNS_INTERVENTION_REQUIRED);
            chan.chan_end(self.da, ChanStatus::ce_de_uc());
            return StartResult::Accepted;
        }
        if cmd != 0x04 && !self.attached() {
            self.sense.set(SNS_INTERVENTION_REQUIRED);
            chan.chan_end(self.da, ChanStatus::ce_de_uc());
            return StartResult::Accepted;
        }

        debug!("reader {}: start cmd {:#04x}", self.da, cmd);
        match cmd & 0x07 {
            0x02 => {
                if (cmd & 0xc0) != 0xc0 {
                    self.card_in_buffer = false;
                }
                if self.eof_pending {
                    self.eof_pending = false;
                    self.sense.clear(SNS_INTERVENTION_REQUIRED);
                    chan.chan_end(self.da, ChanStatus::ce_de_ue());
                    return StartResult::Accepted;
                }
                self.sense.clear_all();
                self.col = 0;
                self.current_command = Some(ReaderCommand::Read);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 1000);
                StartResult::Accepted
            }
            0x03 => {
                self.sense.clear_all();
                self.current_command = None;
                self.card_in_buffer = false;
                if cmd == 0x03 {
                    chan.chan_end(self.da, ChanStatus::ce_de());
                    return StartResult::Accepted;
                }
                if (cmd & 0x30) != 0x20 || (cmd & 0xc0) == 0xc0 {
                    warn!("reader {}: rejecting control modifier {:#04x}", self.da, cmd);
                    self.sense.set(SNS_CMD_REJECT);
                    chan.chan_end(self.da, ChanStatus::ce_de_uc());
                    return StartResult::Accepted;
                }
                self.col = 0;
                self.current_command = Some(ReaderCommand::Feed);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 1000);
                StartResult::Accepted
            }
            0x04 => {
                self.current_command = Some(ReaderCommand::Sense);
                self.state = UnitState::AwaitingService;
                sched.schedule(self.da, 10);
                StartResult::Accepted
            }
            0x00 => {
                let status = if self.sense.0 != 0 { ChanStatus::ce_de_uc() } else { ChanStatus::ce_de() };
                chan.chan_end(self.da, status);
                StartResult::Accepted
            }
            _ => {
                self.sense.set(SNS_CMD_REJECT);
                chan.chan_end(self.da, ChanStatus::ce_de_uc());
                StartResult::Accepted
            }
        }
    }

    pub fn service_tick(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler) {
        match self.current_command {
            Some(ReaderCommand::Sense) => self.service_sense(chan),
            Some(ReaderCommand::Read) | Some(ReaderCommand::Feed) => {
                if !self.card_in_buffer {
                    self.load_next_card(chan, sched);
                } else {
                    self.transfer_column(chan, sched);
                }
            }
            None => {}
        }
    }

    fn service_sense(&mut self, chan: &mut dyn ChannelOps) {
        let mut byte = self.sense.0;
        if !self.attached() || self.eof_pending {
            byte |= SNS_INTERVENTION_REQUIRED;
        }
        chan.chan_write_byte(self.da, byte);
        chan.chan_end(self.da, ChanStatus::ce_de());
        self.sense.clear(crate::sense::SNS_SOFT_MASK);
        self.current_command = None;
        self.state = UnitState::Idle;
    }

    fn load_next_card(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler) {
        let was_read = self.current_command == Some(ReaderCommand::Read);
        let outcome = match self.source.as_mut() {
            Some(s) => s.read_card(),
            None => CardReadOutcome::Error,
        };
        match outcome {
            CardReadOutcome::EmptyHopper => {
                self.eof_pending = true;
                self.current_command = None;
                self.state = UnitState::Idle;
                let status = if was_read { ChanStatus::ce_de_ue() } else { ChanStatus::ce_de() };
                chan.chan_end(self.da, status);
            }
            CardReadOutcome::EofMarker => {
                self.current_command = None;
                self.state = UnitState::Idle;
                let status = if was_read { ChanStatus::ce_de_ue() } else { ChanStatus::ce_de() };
                chan.chan_end(self.da, status);
            }
            CardReadOutcome::Error => {
                self.sense.set(SNS_INTERVENTION_REQUIRED);
                self.current_command = None;
                self.state = UnitState::Idle;
                chan.chan_end(self.da, ChanStatus::ce_de_uc());
            }
            CardReadOutcome::Ok(card) => {
                self.buffer = card;
                self.card_in_buffer = true;
                if !was_read {
                    chan.chan_end(self.da, ChanStatus::ce_de());
                    self.current_command = None;
                    self.state = UnitState::Idle;
                } else {
                    sched.schedule(self.da, 10000);
                }
            }
        }
    }

    fn transfer_column(&mut self, chan: &mut dyn ChannelOps, sched: &mut dyn Scheduler) {
        let byte = match hol_to_ebcdic(self.buffer[self.col]) {
            Some(b) => b,
            None => {
                self.sense.set(SNS_DATA_CHECK);
                0x00
            }
        };
        trace!("reader {}: col {} -> {:#04x}", self.da, self.col, byte);
        let done = chan.chan_write_byte(self.da, byte);
        if done {
            self.terminate_read(chan);
            return;
        }
        self.col += 1;
        if self.col == 80 {
            self.terminate_read(chan);
        } else {
            sched.schedule(self.da, 100);
        }
    }

    fn terminate_read(&mut self, chan: &mut dyn ChannelOps) {
        let mut status = ChanStatus::new(CHANNEL_END | DEVICE_END);
        if self.sense.0 != 0 {
            status = status.with(UNIT_CHECK);
        }
        chan.chan_end(self.da, status);
        self.current_command = None;
        self.state = UnitState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockChannel {
        written: Vec<u8>,
        ends: Vec<ChanStatus>,
        attns: Vec<ChanStatus>,
    }

    impl MockChannel {
        fn new() -> Self {
            MockChannel { written: Vec::new(), ends: Vec::new(), attns: Vec::new() }
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
        fn set_devattn(&mut self, _da: DeviceAddress, status: ChanStatus) {
            self.attns.push(status);
        }
    }

    #[derive(Default)]
    struct MockScheduler {
        scheduled: Vec<(DeviceAddress, u32)>,
    }

    impl Scheduler for MockScheduler {
        fn schedule(&mut self, da: DeviceAddress, ticks: u32) {
            self.scheduled.push((da, ticks));
        }
    }

    fn col_for_letter(c: char) -> HolColumn {
        use crate::device_types::translation::{ROW_0, ROW_11, ROW_12};
        fn digit_row(d: u16) -> u16 {
            1 << (9 - d)
        }
        match c {
            'A'..='I' => ROW_12 | digit_row(1 + (c as u16 - 'A' as u16)),
            'J'..='R' => ROW_11 | digit_row(1 + (c as u16 - 'J' as u16)),
            'S'..='Z' => ROW_0 | digit_row(2 + (c as u16 - 'S' as u16)),
            _ => panic!("not a letter"),
        }
    }

    fn card_with(text: &str) -> [HolColumn; 80] {
        let mut card = [0u16; 80];
        for (i, c) in text.chars().enumerate() {
            card[i] = col_for_letter(c);
        }
        card
    }

    struct DeckSource {
        cards: VecDeque<[HolColumn; 80]>,
    }

    impl CardSource for DeckSource {
        fn read_card(&mut self) -> CardReadOutcome {
            match self.cards.pop_front() {
                Some(c) => CardReadOutcome::Ok(c),
                None => CardReadOutcome::EmptyHopper,
            }
        }
        fn card_eof(&self) -> bool {
            false
        }
    }

    fn run_to_completion(
        reader: &mut CardReaderUnit,
        chan: &mut MockChannel,
        sched: &mut MockScheduler,
    ) {
        let mut guard = 0;
        while reader.current_command.is_some() {
            reader.service_tick(chan, sched);
            guard += 1;
            assert!(guard < 1000, "runaway service loop");
        }
    }

    #[test]
    fn s1_card_read_hello() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(DeckSource { cards: VecDeque::from([card_with("HELLO")]) }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();

        assert_eq!(reader.start_command(0x02, &mut chan, &mut sched), StartResult::Accepted);
        run_to_completion(&mut reader, &mut chan, &mut sched);

        let mut expect = vec![0xC8u8, 0xC5, 0xD3, 0xD3, 0xD6];
        expect.extend(std::iter::repeat(0x40u8).take(75));
        assert_eq!(chan.written, expect);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de());

        chan.written.clear();
        reader.start_command(0x04, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written, vec![0x00]);
    }

    #[test]
    fn s2_card_eof_latches() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(DeckSource { cards: VecDeque::new() }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();

        reader.start_command(0x02, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de_ue());

        chan.written.clear();
        reader.start_command(0x04, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written, vec![SNS_INTERVENTION_REQUIRED]);

        chan.ends.clear();
        reader.start_command(0x02, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de_ue());

        chan.written.clear();
        reader.start_command(0x04, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written, vec![0x00]);
    }

    #[test]
    fn s3_feed_then_read_keeps_buffered_card() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(DeckSource {
            cards: VecDeque::from([card_with("FIRST"), card_with("SECOND")]),
        }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();

        // Feed: stacker-select modifier bits + feed mode bit 0x20.
        reader.start_command(0x23, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de());

        chan.written.clear();
        // Plain Read, no stacker-hold: discards Feed's buffered card and loads the next one.
        reader.start_command(0x02, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written[0], 0xE2); // 'S' of "SECOND"
    }

    #[test]
    fn column_round_trip_no_datacheck() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(DeckSource { cards: VecDeque::from([card_with("HELLOWORLD")]) }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();
        reader.start_command(0x02, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written.len(), 80);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de());
    }

    #[test]
    fn invalid_punch_sets_datacheck() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        let mut card = [0u16; 80];
        card[0] = (1 << 11) | (1 << 10); // both zone 12 and 11 punched: invalid
        reader.attach(Box::new(DeckSource { cards: VecDeque::from([card]) }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();
        reader.start_command(0x02, &mut chan, &mut sched);
        run_to_completion(&mut reader, &mut chan, &mut sched);
        assert_eq!(chan.written[0], 0x00);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de_uc());
    }

    #[test]
    fn serialization_busy_rejects_second_start() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(DeckSource { cards: VecDeque::from([card_with("HELLO")]) }));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();
        reader.start_command(0x02, &mut chan, &mut sched);
        assert_eq!(reader.start_command(0x02, &mut chan, &mut sched), StartResult::Busy);
        assert_eq!(reader.current_command, Some(ReaderCommand::Read));
    }

    struct EofFlaggedSource;

    impl CardSource for EofFlaggedSource {
        fn read_card(&mut self) -> CardReadOutcome {
            CardReadOutcome::EmptyHopper
        }
        fn card_eof(&self) -> bool {
            true
        }
    }

    #[test]
    fn card_eof_flag_short_circuits_with_unit_check() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        reader.attach(Box::new(EofFlaggedSource));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();

        reader.start_command(0x02, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de_uc());
        assert!(reader.sense.is_set(SNS_INTERVENTION_REQUIRED));
        assert!(sched.scheduled.is_empty());
    }

    #[test]
    fn unattached_read_is_rejected() {
        let mut reader = CardReaderUnit::new(DeviceAddress::new(0x00C));
        let mut chan = MockChannel::new();
        let mut sched = MockScheduler::default();
        reader.start_command(0x02, &mut chan, &mut sched);
        assert_eq!(*chan.ends.last().unwrap(), ChanStatus::ce_de_uc());
        assert!(reader.sense.is_set(SNS_INTERVENTION_REQUIRED));
    }
}
