//! Outbound frame scheduling: jittered pacing, per-entry retry, and
//! fragmentation of application messages larger than `MAX_PW`.

use std::collections::VecDeque;

use crate::clock::MonotonicClock;
use crate::frame::{FrameCodec, LinkFrame, MsgType};
use crate::radio::{RadioPort, SendOutcome};
use crate::rng::JitterSource;
use crate::settings::GatewaySettings;

/// A queued outbound message, possibly spanning several on-air frames.
pub struct OutFrame {
    pub pipe: u8,
    pub net_addr: u16,
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
    offset: usize,
    offset_retry: usize,
    retry_budget: u32,
}

impl OutFrame {
    pub fn new(pipe: u8, net_addr: u16, msg_type: MsgType, payload: Vec<u8>, retry_budget: u32) -> Self {
        OutFrame { pipe, net_addr, msg_type, payload, offset: 0, offset_retry: 0, retry_budget }
    }
}

enum Phase {
    Fire,
    Gap { start_ms: u64, delay_ms: u64 },
}

/// Drives the `Fire -> Gap -> Transmit -> Fire` pacing cycle over a FIFO of
/// `OutFrame`s.
pub struct TxScheduler {
    queue: VecDeque<OutFrame>,
    phase: Phase,
}

impl TxScheduler {
    pub fn new() -> Self {
        TxScheduler { queue: VecDeque::new(), phase: Phase::Fire }
    }

    pub fn enqueue(&mut self, frame: OutFrame) {
        self.queue.push_back(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Advances the scheduler by one tick; sends at most one on-air frame.
    pub fn tick(
        &mut self,
        settings: &GatewaySettings,
        jitter: &mut JitterSource,
        clock: &dyn MonotonicClock,
        radio: &mut dyn RadioPort,
    ) {
        match self.phase {
            Phase::Fire => {
                let delay_ms = jitter.send_delay(settings.send_delay_ms, settings.send_interval);
                self.phase = Phase::Gap { start_ms: clock.now_ms(), delay_ms };
            }
            Phase::Gap { start_ms, delay_ms } => {
                if clock.elapsed_at_least(start_ms, delay_ms) {
                    self.transmit_head(settings, radio);
                    self.phase = Phase::Fire;
                }
            }
        }
    }

    fn transmit_head(&mut self, settings: &GatewaySettings, radio: &mut dyn RadioPort) {
        let Some(mut entry) = self.queue.pop_front() else { return };

        let remaining = entry.payload.len() - entry.offset;
        let (msg_type, take) = if entry.msg_type == MsgType::App && entry.payload.len() > settings.max_pw {
            if entry.offset == 0 {
                (MsgType::AppFirst, settings.max_pw.min(remaining))
            } else if remaining > settings.max_pw {
                (MsgType::AppFrag, settings.max_pw)
            } else {
                (MsgType::App, remaining)
            }
        } else {
            (entry.msg_type, remaining)
        };

        let chunk = entry.payload[entry.offset..entry.offset + take].to_vec();
        entry.offset_retry = entry.offset;
        let next_offset = entry.offset + take;

        let codec = FrameCodec::new(settings.max_pw);
        let frame = LinkFrame { msg_type, net_addr: entry.net_addr, payload: chunk };
        let require_ack = entry.pipe != crate::frame::BROADCAST_PIPE;

        radio.set_ptx(entry.pipe);
        let outcome = match codec.encode(&frame) {
            Ok(bytes) => {
                let handle = radio.ptx_write(&bytes, require_ack);
                radio.ptx_wait_sent(handle)
            }
            Err(_) => SendOutcome::Failed,
        };
        radio.set_prx();

        match outcome {
            SendOutcome::Failed => {
                entry.offset = entry.offset_retry;
                entry.retry_budget = entry.retry_budget.saturating_sub(1);
                if entry.retry_budget == 0 {
                    log::warn!("dropping frame to pipe {} after exhausting retries", entry.pipe);
                } else {
                    self.queue.push_back(entry);
                }
            }
            SendOutcome::Sent => {
                entry.offset = next_offset;
                if entry.offset < entry.payload.len() {
                    self.queue.push_back(entry);
                }
            }
        }
    }
}

impl Default for TxScheduler {
    fn default() -> Self {
        TxScheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::radio::MockRadioPort;

    fn settings() -> GatewaySettings {
        let mut s = GatewaySettings::default();
        s.max_pw = 22;
        s.send_retry = 2;
        s
    }

    fn run_ticks(
        scheduler: &mut TxScheduler,
        settings: &GatewaySettings,
        jitter: &mut JitterSource,
        clock: &FakeClock,
        radio: &mut MockRadioPort,
        ticks: usize,
    ) {
        for _ in 0..ticks {
            clock.advance(300);
            scheduler.tick(settings, jitter, clock, radio);
        }
    }

    #[test]
    fn small_message_sends_as_single_frame() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(1);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        let mut scheduler = TxScheduler::new();
        scheduler.enqueue(OutFrame::new(1, 0xA001, MsgType::App, vec![1, 2, 3], settings.send_retry));

        run_ticks(&mut scheduler, &settings, &mut jitter, &clock, &mut radio, 2);

        let sent = radio.drain_sent();
        assert_eq!(sent.len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn large_message_fragments_in_order() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(2);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        let mut scheduler = TxScheduler::new();
        let payload: Vec<u8> = (0..50u8).collect();
        scheduler.enqueue(OutFrame::new(1, 0xA001, MsgType::App, payload.clone(), settings.send_retry));

        run_ticks(&mut scheduler, &settings, &mut jitter, &clock, &mut radio, 6);

        let sent = radio.drain_sent();
        assert_eq!(sent.len(), 3);
        let codec = FrameCodec::new(settings.max_pw);
        let mut reassembled = Vec::new();
        for (_, bytes, _) in &sent {
            reassembled.extend_from_slice(&codec.decode(bytes).unwrap().payload);
        }
        assert_eq!(reassembled, payload);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn retries_on_failure_then_succeeds() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(3);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        radio.deliver = false;
        let mut scheduler = TxScheduler::new();
        scheduler.enqueue(OutFrame::new(1, 0xA001, MsgType::App, vec![9, 9], settings.send_retry));

        run_ticks(&mut scheduler, &settings, &mut jitter, &clock, &mut radio, 2);
        assert!(!scheduler.is_empty());

        radio.deliver = true;
        run_ticks(&mut scheduler, &settings, &mut jitter, &clock, &mut radio, 2);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn drops_frame_after_exhausting_retries() {
        let mut settings = settings();
        settings.send_retry = 1;
        let mut jitter = JitterSource::from_seed(4);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        radio.deliver = false;
        let mut scheduler = TxScheduler::new();
        scheduler.enqueue(OutFrame::new(1, 0xA001, MsgType::App, vec![1], settings.send_retry));

        run_ticks(&mut scheduler, &settings, &mut jitter, &clock, &mut radio, 6);
        assert!(scheduler.is_empty());
        // send_retry = 1: dropped after exactly one failed attempt, never two.
        assert_eq!(radio.drain_sent().len(), 1);
    }
}
