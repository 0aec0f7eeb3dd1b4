//! 128-bit random serial numbers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use rcgen::SerialNumber;

/// A positive serial in minimal big-endian form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Serial {
    bytes: Vec<u8>,
}

impl Serial {
    /// A non-zero random serial.
    pub fn random() -> Self {
        loop {
            let value: u128 = rand::random();
            if value != 0 {
                return Self::from_bytes(&value.to_be_bytes());
            }
        }
    }

    /// Leading zero bytes are dropped; the DER sign byte is rcgen's concern.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Self {
            bytes: bytes[skip..].to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex, the form persisted in `serial_number`.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub(crate) fn to_rcgen(&self) -> SerialNumber {
        SerialNumber::from(self.bytes.clone())
    }
}

/// Recent draws remembered per registry. Older serials are long persisted,
/// where the store's own uniqueness check catches them.
pub const SERIAL_WINDOW: usize = 65_536;

#[derive(Debug, Default)]
struct Issued {
    seen: HashSet<Vec<u8>>,
    order: VecDeque<Vec<u8>>,
}

/// Serials recently handed out by this process, so concurrent issuances
/// never race each other onto the same value before either is persisted.
/// Holds at most `capacity` entries, forgetting the oldest first.
#[derive(Debug)]
pub struct SerialRegistry {
    issued: Mutex<Issued>,
    capacity: usize,
}

impl Default for SerialRegistry {
    fn default() -> Self {
        Self::with_capacity(SERIAL_WINDOW)
    }
}

impl SerialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            issued: Mutex::new(Issued::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Issued> {
        match self.issued.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Draw a serial no other recent caller of this registry has received.
    pub fn draw(&self) -> Serial {
        let mut issued = self.lock();
        loop {
            let serial = Serial::random();
            if issued.seen.insert(serial.bytes.clone()) {
                issued.order.push_back(serial.bytes.clone());
                while issued.order.len() > self.capacity {
                    if let Some(oldest) = issued.order.pop_front() {
                        issued.seen.remove(&oldest);
                    }
                }
                return serial;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
