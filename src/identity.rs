//! Persistent identity storage: a fixed-slot layout (UUID, TOKEN, MAC, keys,
//! and a variable-length CONFIG region) recovered across reboots, built atop
//! a narrow `PersistentMedium` capability trait so the actual EEPROM/flash
//! backend stays an external collaborator.

use crate::error::GatewayError;

pub const UUID_SIZE: usize = 36;
pub const TOKEN_SIZE: usize = 40;
pub const MAC_SIZE: usize = 8;
pub const SCHEMA_FLAG_SIZE: usize = 1;
pub const PRIVATE_KEY_SIZE: usize = 32;
pub const PUBLIC_KEY_SIZE: usize = 64;
pub const CONFIG_SIZE_HDR_LEN: usize = 2;

/// Addressable slot in the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    Uuid,
    Token,
    Mac,
    SchemaFlag,
    PrivateKey,
    PublicKey,
}

impl SlotId {
    fn size(self) -> usize {
        match self {
            SlotId::Uuid => UUID_SIZE,
            SlotId::Token => TOKEN_SIZE,
            SlotId::Mac => MAC_SIZE,
            SlotId::SchemaFlag => SCHEMA_FLAG_SIZE,
            SlotId::PrivateKey => PRIVATE_KEY_SIZE,
            SlotId::PublicKey => PUBLIC_KEY_SIZE,
        }
    }
}

/// A byte-addressable persistent medium: the external collaborator behind
/// `IdentityStore`. Out of scope for this crate to implement against real
/// hardware — only the contract is specified.
pub trait PersistentMedium {
    /// Total addressable size of the medium, in bytes.
    fn size(&self) -> usize;
    fn read(&self, addr: usize, len: usize) -> Vec<u8>;
    fn write(&mut self, addr: usize, bytes: &[u8]);
}

/// An in-memory `PersistentMedium`, for tests.
#[derive(Debug, Clone)]
pub struct InMemoryMedium {
    bytes: Vec<u8>,
}

impl InMemoryMedium {
    pub fn new(size: usize) -> Self {
        InMemoryMedium { bytes: vec![0u8; size] }
    }
}

impl PersistentMedium for InMemoryMedium {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        if addr + len > self.bytes.len() {
            return Vec::new();
        }
        self.bytes[addr..addr + len].to_vec()
    }

    fn write(&mut self, addr: usize, bytes: &[u8]) {
        if addr + bytes.len() > self.bytes.len() {
            return;
        }
        self.bytes[addr..addr + bytes.len()].copy_from_slice(bytes);
    }
}

/// Fixed-slot persistent store, laid out from the end of the medium's
/// addressable region downward: `UUID | TOKEN | MAC | SCHEMA_FLAG |
/// PRIVATE_KEY | PUBLIC_KEY | CONFIG_SIZE_HDR | CONFIG`.
pub struct IdentityStore<M: PersistentMedium> {
    medium: M,
    addr_uuid: usize,
    addr_token: usize,
    addr_mac: usize,
    addr_schema: usize,
    addr_priv: usize,
    addr_pub: usize,
    config_hdr: usize,
}

impl<M: PersistentMedium> IdentityStore<M> {
    pub fn new(medium: M) -> Self {
        let region = medium.size();
        let addr_uuid = region - UUID_SIZE;
        let addr_token = addr_uuid - TOKEN_SIZE;
        let addr_mac = addr_token - MAC_SIZE;
        let addr_schema = addr_mac - SCHEMA_FLAG_SIZE;
        let addr_priv = addr_schema - PRIVATE_KEY_SIZE;
        let addr_pub = addr_priv - PUBLIC_KEY_SIZE;
        let config_hdr = addr_pub - CONFIG_SIZE_HDR_LEN;
        IdentityStore { medium, addr_uuid, addr_token, addr_mac, addr_schema, addr_priv, addr_pub, config_hdr }
    }

    fn slot_addr(&self, id: SlotId) -> usize {
        match id {
            SlotId::Uuid => self.addr_uuid,
            SlotId::Token => self.addr_token,
            SlotId::Mac => self.addr_mac,
            SlotId::SchemaFlag => self.addr_schema,
            SlotId::PrivateKey => self.addr_priv,
            SlotId::PublicKey => self.addr_pub,
        }
    }

    pub fn read_slot(&self, id: SlotId) -> Vec<u8> {
        self.medium.read(self.slot_addr(id), id.size())
    }

    pub fn write_slot(&mut self, id: SlotId, bytes: &[u8]) -> Result<(), GatewayError> {
        if bytes.len() != id.size() {
            return Err(GatewayError::Einval);
        }
        self.medium.write(self.slot_addr(id), bytes);
        Ok(())
    }

    /// Size of the CONFIG region, in bytes. Any header value larger than the
    /// free region below it is treated as "no config" rather than an error.
    pub fn config_size(&self) -> u16 {
        let raw = self.medium.read(self.config_hdr, CONFIG_SIZE_HDR_LEN);
        if raw.len() != CONFIG_SIZE_HDR_LEN {
            return 0;
        }
        let size = u16::from_le_bytes([raw[0], raw[1]]);
        if size as usize > self.config_hdr {
            0
        } else {
            size
        }
    }

    /// Base address of the CONFIG region.
    pub fn config_base(&self) -> usize {
        self.config_hdr - self.config_size() as usize
    }

    pub fn read_config(&self) -> Vec<u8> {
        let size = self.config_size() as usize;
        self.medium.read(self.config_base(), size)
    }

    pub fn write_config(&mut self, bytes: &[u8]) -> Result<(), GatewayError> {
        if bytes.len() > self.config_hdr {
            return Err(GatewayError::Einval);
        }
        let base = self.config_hdr - bytes.len();
        self.medium.write(base, bytes);
        self.medium.write(self.config_hdr, &(bytes.len() as u16).to_le_bytes());
        Ok(())
    }

    /// Raw access to the free region below the CONFIG slot. Any request that
    /// touches the protected tail returns no bytes / is dropped silently.
    pub fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        if addr + len > self.config_base() {
            return Vec::new();
        }
        self.medium.read(addr, len)
    }

    pub fn write(&mut self, addr: usize, bytes: &[u8]) {
        if addr + bytes.len() > self.config_base() {
            return;
        }
        self.medium.write(addr, bytes);
    }

    /// Zeroes every slot and clears the CONFIG header.
    pub fn reset(&mut self) {
        let region = self.medium.size();
        self.medium.write(0, &vec![0u8; region]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IdentityStore<InMemoryMedium> {
        IdentityStore::new(InMemoryMedium::new(4096))
    }

    #[test]
    fn slot_round_trips() {
        let mut store = store();
        let mac = [1, 2, 3, 4, 5, 6, 7, 8];
        store.write_slot(SlotId::Mac, &mac).unwrap();
        assert_eq!(store.read_slot(SlotId::Mac), mac);
    }

    #[test]
    fn slot_rejects_wrong_length() {
        let mut store = store();
        assert_eq!(store.write_slot(SlotId::Mac, &[0u8; 3]), Err(GatewayError::Einval));
    }

    #[test]
    fn config_round_trips_and_resizes() {
        let mut store = store();
        store.write_config(b"hello").unwrap();
        assert_eq!(store.read_config(), b"hello");
        assert_eq!(store.config_size(), 5);
        store.write_config(b"hi").unwrap();
        assert_eq!(store.read_config(), b"hi");
    }

    #[test]
    fn raw_access_below_config_base_only() {
        let mut store = store();
        store.write_config(b"cfg").unwrap();
        let base = store.config_base();
        store.write(base - 4, b"data");
        assert_eq!(store.read(base - 4, 4), b"data");
        // Touching the protected tail is silently dropped.
        store.write(base, b"nope");
        assert_eq!(store.read(base, 4), Vec::<u8>::new());
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = store();
        store.write_slot(SlotId::Uuid, &[7u8; UUID_SIZE]).unwrap();
        store.write_config(b"cfg").unwrap();
        store.reset();
        assert_eq!(store.read_slot(SlotId::Uuid), vec![0u8; UUID_SIZE]);
        assert_eq!(store.config_size(), 0);
    }

    #[test]
    fn corrupt_header_reads_as_no_config() {
        let mut store = store();
        let hdr_addr = store.config_hdr;
        store.medium.write(hdr_addr, &u16::MAX.to_le_bytes());
        assert_eq!(store.config_size(), 0);
    }
}
