//! The public control surface: `Gateway::open/close/accept/cancel/available`,
//! backed by a dedicated server-loop thread that owns the radio and every
//! protocol state machine exclusively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::SystemClock;
use crate::client::ClientTable;
use crate::error::GatewayError;
use crate::join::{JoinMachine, JoinStep};
use crate::radio::{RadioPort, RADIO_CH_MAX, RADIO_CH_MIN};
use crate::rendezvous::{ClientEndpoint, Mailbox, MailboxClosed};
use crate::rng::JitterSource;
use crate::rxdispatch::RxDispatcher;
use crate::settings::GatewaySettings;
use crate::txsched::TxScheduler;

/// Guards against more than one `Gateway` being open at a time, matching the
/// original driver's single `m_fd != SOCKET_INVALID` socket check.
static GATEWAY_OPEN: AtomicBool = AtomicBool::new(false);

struct SharedState {
    /// Channel actually acquired, once joined.
    joined_channel: Mutex<Option<u8>>,
    loop_failed: AtomicBool,
    stop: AtomicBool,
}

/// An open gateway: owns the server-loop thread for as long as it is open.
pub struct Gateway {
    shared: Arc<SharedState>,
    mailbox: Arc<Mailbox<(u8, ClientEndpoint)>>,
    prx_tx: mpsc::Sender<u8>,
    handle: Option<JoinHandle<()>>,
    settings: GatewaySettings,
    holds_singleton: bool,
}

impl Gateway {
    /// Opens the gateway on `channel`, spawning its server-loop thread with
    /// `radio` as the exclusive transport and `settings` as its policy.
    /// `channel` must lie within the hardware's absolute range; it is the
    /// channel the join handshake probes first before scanning the rest of
    /// `settings`'s band.
    pub fn open<R>(
        radio: R,
        settings: GatewaySettings,
        channel: u8,
        seed: Option<u64>,
    ) -> Result<Self, GatewayError>
    where
        R: RadioPort + Send + 'static,
    {
        if !settings.is_valid() || channel < RADIO_CH_MIN || channel > RADIO_CH_MAX {
            return Err(GatewayError::Einval);
        }
        if GATEWAY_OPEN.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(GatewayError::Emfile);
        }

        let shared = Arc::new(SharedState {
            joined_channel: Mutex::new(None),
            loop_failed: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });
        let mailbox = Arc::new(Mailbox::new());
        let (prx_tx, prx_rx) = mpsc::channel();

        let loop_shared = shared.clone();
        let loop_mailbox = mailbox.clone();
        let loop_settings = settings;
        let seed = seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
        });

        let handle = thread::Builder::new()
            .name("nrf24-gateway".into())
            .spawn(move || run_server_loop(radio, loop_settings, channel, seed, loop_shared, loop_mailbox, prx_rx));

        let handle = match handle {
            Ok(handle) => handle,
            Err(_) => {
                GATEWAY_OPEN.store(false, Ordering::SeqCst);
                return Err(GatewayError::Enomem);
            }
        };

        Ok(Gateway { shared, mailbox, prx_tx, handle: Some(handle), settings, holds_singleton: true })
    }

    /// Blocks until a client is admitted and accepted, the loop reports
    /// `EUSERS` (channel acquisition failed), or `cancel` is observed.
    /// On success, flips the admitted client's session to PRX.
    pub fn accept(&self) -> Result<ClientEndpoint, GatewayError> {
        if self.handle.is_none() {
            return Err(GatewayError::Ebadf);
        }
        match self.mailbox.pop_blocking() {
            Ok((pipe, endpoint)) => {
                let _ = self.prx_tx.send(pipe);
                Ok(endpoint)
            }
            Err(MailboxClosed::Closed) => {
                if self.shared.loop_failed.load(Ordering::SeqCst) {
                    Err(GatewayError::Eusers)
                } else {
                    Err(GatewayError::Ebadf)
                }
            }
            Err(MailboxClosed::Cancelled) => Err(GatewayError::Ecanceled),
        }
    }

    /// Causes a currently-blocked (or the next) `accept` to return
    /// `Ecanceled` exactly once.
    pub fn cancel(&self) {
        self.mailbox.cancel_one();
    }

    /// `true` if a client is waiting to be accepted within `timeout`.
    pub fn available(&self, timeout: Duration) -> Result<bool, GatewayError> {
        if self.handle.is_none() {
            return Err(GatewayError::Ebadf);
        }
        Ok(self.mailbox.available(timeout))
    }

    /// Channel actually acquired by the join handshake, once known.
    pub fn channel(&self) -> Option<u8> {
        *self.shared.joined_channel.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Idempotent: stops the server loop, joins its thread, and releases the
    /// single-open-gateway guard. A blocked `accept` racing this call always
    /// observes `Ebadf`, never `Ecanceled`.
    pub fn close(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.mailbox.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if self.holds_singleton {
            GATEWAY_OPEN.store(false, Ordering::SeqCst);
            self.holds_singleton = false;
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_server_loop<R: RadioPort>(
    mut radio: R,
    settings: GatewaySettings,
    channel: u8,
    seed: u64,
    shared: Arc<SharedState>,
    mailbox: Arc<Mailbox<(u8, ClientEndpoint)>>,
    prx_rx: mpsc::Receiver<u8>,
) {
    let clock = SystemClock::new();
    let mut jitter = JitterSource::from_seed(seed);

    for pipe in 0..=5u8 {
        radio.open_pipe(pipe, pipe as u16);
    }

    let mut join_machine = JoinMachine::start(channel, &settings, &mut jitter, &clock, &mut radio);
    let acquired = loop {
        if shared.stop.load(Ordering::SeqCst) {
            close_down(&mut radio);
            return;
        }
        match join_machine.tick(&settings, &mut jitter, &clock, &mut radio) {
            JoinStep::Joined(channel) => break channel,
            JoinStep::ChannelBusy => {
                shared.loop_failed.store(true, Ordering::SeqCst);
                mailbox.close();
                close_down(&mut radio);
                return;
            }
            JoinStep::Probing => thread::sleep(Duration::from_millis(settings.polltime_ms)),
        }
    };
    *shared.joined_channel.lock().unwrap_or_else(|e| e.into_inner()) = Some(acquired);
    log::info!("gateway joined channel {}", acquired);

    let dispatcher = RxDispatcher::new(&settings);
    let mut clients = ClientTable::new();
    let mut tx = TxScheduler::new();

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        while let Ok(pipe) = prx_rx.try_recv() {
            clients.mark_prx(pipe);
        }
        let admitted = dispatcher.drain(&settings, &clock, &mut radio, &mut clients, &mut tx);
        for client in admitted {
            mailbox.push((client.pipe, client.endpoint));
        }
        tx.tick(&settings, &mut jitter, &clock, &mut radio);
        thread::sleep(Duration::from_millis(settings.polltime_ms));
    }

    close_down(&mut radio);
}

fn close_down<R: RadioPort>(radio: &mut R) {
    radio.set_standby();
    for pipe in (0..=5u8).rev() {
        radio.close_pipe(pipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MockRadioPort;

    fn init_logging() {
        let _ = env_logger::try_init();
    }

    #[test]
    fn open_and_close_round_trips_twice() {
        init_logging();
        for _ in 0..2 {
            let mut gateway = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(1)).unwrap();
            gateway.close();
            gateway.close();
        }
    }

    #[test]
    fn second_concurrent_open_is_emfile() {
        let _first = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(1)).unwrap();
        let second = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(2));
        assert_eq!(second.err(), Some(GatewayError::Emfile));
    }

    #[test]
    fn open_after_close_succeeds() {
        let mut first = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(1)).unwrap();
        first.close();
        let second = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(2));
        assert!(second.is_ok());
    }

    #[test]
    fn cancel_before_accept_is_consumed_once() {
        let gateway = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(1)).unwrap();
        gateway.cancel();
        let result = gateway.accept();
        assert!(matches!(result, Err(GatewayError::Ecanceled) | Err(GatewayError::Eusers)));
    }

    #[test]
    fn accept_after_close_reports_ebadf_not_cancelled() {
        let mut gateway = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 76, Some(1)).unwrap();
        gateway.close();
        assert_eq!(gateway.accept().err(), Some(GatewayError::Ebadf));
    }

    #[test]
    fn invalid_scan_band_is_rejected() {
        let mut settings = GatewaySettings::default();
        settings.ch_min = 200;
        let result = Gateway::open(MockRadioPort::new(), settings, 76, Some(1));
        assert_eq!(result.err(), Some(GatewayError::Einval));
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let result = Gateway::open(MockRadioPort::new(), GatewaySettings::default(), 255, Some(1));
        assert_eq!(result.err(), Some(GatewayError::Einval));
    }
}
