//! Tunable policy constants for the gateway, collected behind a single
//! `Default`-backed struct in the same spirit as the driver's own
//! `RXConfig`/`TXConfig`.

/// Gateway policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Tick period of the server loop, in milliseconds.
    pub polltime_ms: u64,
    /// Base jitter delay for the join probe and the transmit pacer, in milliseconds.
    pub send_delay_ms: u64,
    /// Jitter is drawn from `[send_delay_ms, send_interval * send_delay_ms]`.
    pub send_interval: u64,
    /// Per-`OutFrame` retry budget before it is dropped.
    pub send_retry: u32,
    /// Base retry budget for a join probe; the actual budget is drawn from
    /// `[join_retry, 2 * join_retry)`.
    pub join_retry: u32,
    /// Seconds of heartbeat silence before a session is evicted.
    pub heartbeat_timeout_s: u64,
    /// Maximum application payload carried by a single on-air frame.
    pub max_pw: usize,
    /// Supported protocol major version.
    pub protocol_major: u8,
    /// Supported protocol minor version.
    pub protocol_minor: u8,
    /// Lower bound (inclusive) of the channel-scan band.
    pub ch_min: u8,
    /// Upper bound (inclusive) of the channel-scan band.
    pub ch_max: u8,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            polltime_ms: 10,
            send_delay_ms: 1,
            send_interval: 250,
            send_retry: 20,
            join_retry: 15,
            heartbeat_timeout_s: 60,
            max_pw: 29,
            protocol_major: 1,
            protocol_minor: 0,
            ch_min: 76,
            ch_max: 78,
        }
    }
}

impl GatewaySettings {
    /// `true` when the scan band is well-formed and fits within the
    /// hardware's absolute channel range.
    pub fn is_valid(&self) -> bool {
        self.ch_min <= self.ch_max
            && self.ch_max <= crate::radio::RADIO_CH_MAX
            && self.ch_min >= crate::radio::RADIO_CH_MIN
    }
}
