//! In-memory transport used by the unit tests.

use crate::error::ErrorDescriptor;
use crate::transport::Transport;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    remote_addr: Option<SocketAddr>,
    writes: Mutex<Vec<Vec<u8>>>,
    closes: Mutex<Vec<ErrorDescriptor>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn from_addr(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            remote_addr: Some(addr.parse().expect("test address should parse")),
            ..Self::default()
        })
    }

    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> Vec<ErrorDescriptor> {
        self.closes.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn write(&self, payload: &[u8]) {
        self.writes.lock().unwrap().push(payload.to_vec());
    }

    fn close(&self, error: &ErrorDescriptor) {
        self.closes.lock().unwrap().push(error.clone());
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}
