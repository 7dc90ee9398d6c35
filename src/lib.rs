// Copyright 2017, Romuald Texier-Marcadé <romualdtm@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! A link-layer gateway server for nRF24L01(+)-class transceivers.
//!
//! This crate drives the handshake, admission and transmission policy that
//! sits on top of a raw nRF24L01(+) transport: a gateway claims a free
//! channel out of a small scan band, admits up to five clients (one per
//! hardware pipe), fragments and retries outbound application messages, and
//! reassembles and demultiplexes inbound ones — all from a single
//! dedicated server-loop thread.
//!
//! Talking to the physical radio is out of scope for this crate: it depends
//! only on the [`RadioPort`] trait, so it can run against real hardware or,
//! as in its own test suite, against [`MockRadioPort`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use nrf24_gateway::{Gateway, GatewaySettings, MockRadioPort};
//!
//! let radio = MockRadioPort::new();
//! let mut gateway = Gateway::open(radio, GatewaySettings::default(), 76, None).unwrap();
//! if gateway.available(Duration::from_secs(1)).unwrap() {
//!     let client = gateway.accept().unwrap();
//!     if let Some(message) = client.recv() {
//!         println!("received {} bytes", message.len());
//!     }
//! }
//! gateway.close();
//! ```

pub mod client;
pub mod clock;
pub mod error;
pub mod frame;
pub mod identity;
pub mod join;
pub mod radio;
pub mod rendezvous;
pub mod rng;
pub mod rxdispatch;
pub mod server;
pub mod settings;
pub mod txsched;

pub use client::{AdmitError, ClientSession, ClientTable, SessionState};
pub use error::GatewayError;
pub use frame::{FrameCodec, JoinOutcome, JoinProbe, LinkFrame, MsgType};
pub use identity::{IdentityStore, InMemoryMedium, PersistentMedium, SlotId};
pub use radio::{MockRadioPort, RadioPort};
pub use rendezvous::ClientEndpoint;
pub use server::Gateway;
pub use settings::GatewaySettings;
