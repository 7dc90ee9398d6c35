//! Channel-acquisition handshake: probe each channel in the scan band on
//! the broadcast pipe; silence means the channel is free and this gateway
//! claims it, a `JOIN_RESULT` reply means another gateway already holds it.

use crate::clock::MonotonicClock;
use crate::frame::{FrameCodec, JoinOutcome, JoinProbe, LinkFrame, MsgType, BROADCAST_PIPE};
use crate::radio::RadioPort;
use crate::rng::JitterSource;
use crate::settings::GatewaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    Probing,
    Joined(u8),
    ChannelBusy,
}

/// Drives the join handshake across one tick-by-tick run. Owns no radio or
/// clock; both are borrowed per call so the same machine can be driven by a
/// `ServerLoop` that also needs them for other work.
pub struct JoinMachine {
    hashid: u32,
    net_addr: u16,
    current_channel: u8,
    starting_channel: u8,
    retries_left: u32,
    probe_start_ms: u64,
    probe_delay_ms: u64,
}

impl JoinMachine {
    /// `start_channel` is the channel the handshake probes first (the
    /// `channel` argument to `Gateway::open`); the scan then proceeds
    /// through `settings.ch_min..=settings.ch_max` from there.
    pub fn start(
        start_channel: u8,
        settings: &GatewaySettings,
        jitter: &mut JitterSource,
        clock: &dyn MonotonicClock,
        radio: &mut dyn RadioPort,
    ) -> Self {
        let hashid = jitter.hashid();
        let net_addr = ((hashid >> 16) ^ hashid) as u16;
        let mut machine = JoinMachine {
            hashid,
            net_addr,
            current_channel: start_channel,
            starting_channel: start_channel,
            retries_left: jitter.join_retry_budget(settings.join_retry),
            probe_start_ms: 0,
            probe_delay_ms: 0,
        };
        machine.begin_probe(settings, jitter, clock, radio);
        machine
    }

    pub fn net_addr(&self) -> u16 {
        self.net_addr
    }

    pub fn hashid(&self) -> u32 {
        self.hashid
    }

    fn begin_probe(
        &mut self,
        settings: &GatewaySettings,
        jitter: &mut JitterSource,
        clock: &dyn MonotonicClock,
        radio: &mut dyn RadioPort,
    ) {
        radio.set_standby();
        radio.set_channel(self.current_channel);
        let codec = FrameCodec::new(settings.max_pw);
        let probe = JoinProbe {
            maj_version: settings.protocol_major,
            min_version: settings.protocol_minor,
            hashid: self.hashid,
            data: self.retries_left.min(u8::MAX as u32) as u8,
            result: JoinOutcome::Success,
        };
        let frame = LinkFrame { msg_type: MsgType::JoinGateway, net_addr: self.net_addr, payload: probe.encode().to_vec() };
        if let Ok(bytes) = codec.encode(&frame) {
            let handle = radio.ptx_write(&bytes, false);
            let _ = radio.ptx_wait_sent(handle);
        }
        radio.set_prx();
        self.probe_start_ms = clock.now_ms();
        self.probe_delay_ms = jitter.send_delay(settings.send_delay_ms, settings.send_interval);
    }

    fn advance_channel(&mut self, settings: &GatewaySettings) -> bool {
        let next = self.current_channel.checked_add(2).filter(|&c| c <= settings.ch_max);
        self.current_channel = next.unwrap_or(settings.ch_min);
        self.current_channel == self.starting_channel
    }

    /// Steps the handshake forward. A channel occupied by another gateway
    /// advances immediately to the next channel and begins probing again
    /// within the same call, matching the original's inline retry loop.
    pub fn tick(
        &mut self,
        settings: &GatewaySettings,
        jitter: &mut JitterSource,
        clock: &dyn MonotonicClock,
        radio: &mut dyn RadioPort,
    ) -> JoinStep {
        loop {
            if let Some(pipe) = radio.prx_pipe_available() {
                if pipe == BROADCAST_PIPE {
                    let bytes = radio.prx_read();
                    let codec = FrameCodec::new(settings.max_pw);
                    if let Ok(frame) = codec.decode(&bytes) {
                        if frame.msg_type == MsgType::JoinResult {
                            if JoinProbe::decode(&frame.payload).is_ok() {
                                if self.advance_channel(settings) {
                                    return JoinStep::ChannelBusy;
                                }
                                self.retries_left = jitter.join_retry_budget(settings.join_retry);
                                self.begin_probe(settings, jitter, clock, radio);
                                continue;
                            }
                        }
                    }
                } else {
                    let _ = radio.prx_read();
                }
            }

            if clock.elapsed_at_least(self.probe_start_ms, self.probe_delay_ms) {
                if self.retries_left == 0 {
                    return JoinStep::Joined(self.current_channel);
                }
                self.retries_left -= 1;
                self.begin_probe(settings, jitter, clock, radio);
                continue;
            }

            return JoinStep::Probing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::radio::MockRadioPort;

    fn settings() -> GatewaySettings {
        let mut s = GatewaySettings::default();
        s.ch_min = 76;
        s.ch_max = 78;
        s.join_retry = 3;
        s
    }

    #[test]
    fn joins_silent_channel() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(1);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        radio.open_pipe(0, 0);

        let mut machine = JoinMachine::start(settings.ch_min, &settings, &mut jitter, &clock, &mut radio);
        let mut step = JoinStep::Probing;
        for _ in 0..50 {
            clock.advance(260);
            step = machine.tick(&settings, &mut jitter, &clock, &mut radio);
            if !matches!(step, JoinStep::Probing) {
                break;
            }
        }
        assert_eq!(step, JoinStep::Joined(76));
    }

    #[test]
    fn advances_past_busy_channel() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(2);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        radio.open_pipe(0, 0);

        let mut machine = JoinMachine::start(settings.ch_min, &settings, &mut jitter, &clock, &mut radio);
        // Another gateway replies ECONNREFUSED on the first probe.
        let codec = FrameCodec::new(settings.max_pw);
        let reply = LinkFrame {
            msg_type: MsgType::JoinResult,
            net_addr: 0,
            payload: JoinProbe { maj_version: 1, min_version: 0, hashid: 0, data: 0, result: JoinOutcome::ConnRefused }
                .encode()
                .to_vec(),
        };
        radio.inject(0, codec.encode(&reply).unwrap());

        let mut step = machine.tick(&settings, &mut jitter, &clock, &mut radio);
        assert!(matches!(step, JoinStep::Probing));
        assert_eq!(machine.current_channel, 78);

        for _ in 0..50 {
            clock.advance(260);
            step = machine.tick(&settings, &mut jitter, &clock, &mut radio);
            if !matches!(step, JoinStep::Probing) {
                break;
            }
        }
        assert_eq!(step, JoinStep::Joined(78));
    }

    #[test]
    fn all_channels_busy_reports_channel_busy() {
        let settings = settings();
        let mut jitter = JitterSource::from_seed(3);
        let clock = FakeClock::new();
        let mut radio = MockRadioPort::new();
        radio.open_pipe(0, 0);
        let codec = FrameCodec::new(settings.max_pw);

        let mut machine = JoinMachine::start(settings.ch_min, &settings, &mut jitter, &clock, &mut radio);
        let mut step = JoinStep::Probing;
        for _ in 0..10 {
            let reply = LinkFrame {
                msg_type: MsgType::JoinResult,
                net_addr: 0,
                payload: JoinProbe {
                    maj_version: 1,
                    min_version: 0,
                    hashid: 0,
                    data: 0,
                    result: JoinOutcome::ConnRefused,
                }
                .encode()
                .to_vec(),
            };
            radio.inject(0, codec.encode(&reply).unwrap());
            step = machine.tick(&settings, &mut jitter, &clock, &mut radio);
            if step == JoinStep::ChannelBusy {
                break;
            }
        }
        assert_eq!(step, JoinStep::ChannelBusy);
    }
}
