//! Inbound frame demultiplexing: join/heartbeat admission replies,
//! per-pipe application message reassembly, and heartbeat-timeout eviction.

use crate::client::ClientTable;
use crate::clock::MonotonicClock;
use crate::frame::{FrameCodec, JoinOutcome, JoinProbe, LinkFrame, MsgType, BROADCAST_PIPE};
use crate::radio::RadioPort;
use crate::rendezvous::endpoint_pair;
use crate::settings::GatewaySettings;
use crate::txsched::{OutFrame, TxScheduler};

/// A newly admitted client, handed off by `RxDispatcher::drain` to whoever
/// is driving the server loop so it can be offered to `accept`.
pub struct AdmittedClient {
    pub pipe: u8,
    pub endpoint: crate::rendezvous::ClientEndpoint,
}

pub struct RxDispatcher {
    codec: FrameCodec,
}

impl RxDispatcher {
    pub fn new(settings: &GatewaySettings) -> Self {
        RxDispatcher { codec: FrameCodec::new(settings.max_pw) }
    }

    /// Admits any client whose protocol version is at most the one this
    /// gateway supports; only a newer major version is refused.
    fn version_ok(settings: &GatewaySettings, probe: &JoinProbe) -> bool {
        probe.maj_version <= settings.protocol_major && probe.min_version <= settings.protocol_minor
    }

    /// Drains every pending frame this tick, updates `clients`, enqueues any
    /// replies on `tx`, and returns clients admitted this tick.
    pub fn drain(
        &self,
        settings: &GatewaySettings,
        clock: &dyn MonotonicClock,
        radio: &mut dyn RadioPort,
        clients: &mut ClientTable,
        tx: &mut TxScheduler,
    ) -> Vec<AdmittedClient> {
        let mut admitted = Vec::new();
        while let Some(pipe) = radio.prx_pipe_available() {
            let bytes = radio.prx_read();
            let Ok(frame) = self.codec.decode(&bytes) else { continue };
            match frame.msg_type {
                MsgType::JoinLocal if pipe == BROADCAST_PIPE => {
                    self.handle_join_local(settings, clock, &frame, tx, clients, &mut admitted);
                }
                MsgType::JoinGateway if pipe == BROADCAST_PIPE => {
                    self.handle_join_gateway(settings, &frame, tx);
                }
                MsgType::Heartbeat if pipe != BROADCAST_PIPE => {
                    self.handle_heartbeat(settings, clock, pipe, &frame, clients, tx);
                }
                MsgType::App | MsgType::AppFirst | MsgType::AppFrag if pipe != BROADCAST_PIPE => {
                    self.handle_app(pipe, frame.msg_type, frame.payload, clients);
                }
                _ => {
                    log::debug!("dropping unhandled frame: type={:?} pipe={}", frame.msg_type, pipe);
                }
            }
        }

        let sweep_timeout = settings.heartbeat_timeout_s;
        for pipe in clients.sweep_heartbeats(clock.now_s(), sweep_timeout) {
            log::info!("evicting pipe {} for heartbeat timeout", pipe);
        }

        admitted
    }

    fn handle_join_local(
        &self,
        settings: &GatewaySettings,
        clock: &dyn MonotonicClock,
        frame: &LinkFrame,
        tx: &mut TxScheduler,
        clients: &mut ClientTable,
        admitted: &mut Vec<AdmittedClient>,
    ) {
        let Ok(probe) = JoinProbe::decode(&frame.payload) else { return };
        if !Self::version_ok(settings, &probe) {
            return;
        }

        let (loop_end, client_end) = endpoint_pair();
        let reply = match clients.try_admit(frame.net_addr, probe.hashid, clock.now_s(), loop_end) {
            Ok(pipe) => {
                admitted.push(AdmittedClient { pipe, endpoint: client_end });
                JoinProbe { data: pipe, result: JoinOutcome::Success, ..probe }
            }
            Err(_) => JoinProbe { data: 0, result: JoinOutcome::ConnRefused, ..probe },
        };

        tx.enqueue(OutFrame::new(
            BROADCAST_PIPE,
            frame.net_addr,
            MsgType::JoinResult,
            reply.encode().to_vec(),
            settings.send_retry,
        ));
    }

    fn handle_join_gateway(&self, settings: &GatewaySettings, frame: &LinkFrame, tx: &mut TxScheduler) {
        let Ok(probe) = JoinProbe::decode(&frame.payload) else { return };
        let reply = JoinProbe { data: 0, result: JoinOutcome::ConnRefused, ..probe };
        tx.enqueue(OutFrame::new(
            BROADCAST_PIPE,
            frame.net_addr,
            MsgType::JoinResult,
            reply.encode().to_vec(),
            settings.send_retry,
        ));
    }

    fn handle_heartbeat(
        &self,
        settings: &GatewaySettings,
        clock: &dyn MonotonicClock,
        pipe: u8,
        frame: &LinkFrame,
        clients: &mut ClientTable,
        tx: &mut TxScheduler,
    ) {
        let Ok(probe) = JoinProbe::decode(&frame.payload) else { return };
        let matched = Self::version_ok(settings, &probe)
            && clients.touch_heartbeat(pipe, frame.net_addr, probe.hashid, clock.now_s());
        let reply = JoinProbe {
            data: pipe,
            result: if matched { JoinOutcome::Success } else { JoinOutcome::ConnRefused },
            ..probe
        };
        tx.enqueue(OutFrame::new(
            pipe,
            frame.net_addr,
            MsgType::JoinResult,
            reply.encode().to_vec(),
            settings.send_retry,
        ));
    }

    fn handle_app(&self, pipe: u8, msg_type: MsgType, payload: Vec<u8>, clients: &mut ClientTable) {
        let Some(session) = clients.get_mut(pipe) else { return };
        match msg_type {
            MsgType::AppFirst => session.rx_reassembly = Some(payload),
            MsgType::AppFrag => {
                if let Some(buf) = session.rx_reassembly.as_mut() {
                    buf.extend_from_slice(&payload);
                }
            }
            MsgType::App => {
                let message = match session.rx_reassembly.take() {
                    Some(mut buf) => {
                        buf.extend_from_slice(&payload);
                        buf
                    }
                    None => payload,
                };
                session.endpoint.deliver(message);
            }
            _ => unreachable!(),
        }
    }
}
