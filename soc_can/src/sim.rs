//! In-process bus shared by any number of nodes.
//!
//! Every send is broadcast to all other nodes. Each node applies its bound
//! [`AddressFilter`] on receive and silently skips frames of the other shape,
//! mirroring what a raw CAN socket with a single filter does.
use crossbeam_channel as xch;
use soc_traits::{AddressFilter, Bus, NarrowFrame, WideFrame};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::BusError;

/// How often a blocked receive checks whether any peer is still attached.
const PEER_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Narrow(NarrowFrame),
    Wide(WideFrame),
}

impl Frame {
    pub fn id(&self) -> u32 {
        match self {
            Frame::Narrow(f) => f.id,
            Frame::Wide(f) => f.id,
        }
    }
}

#[derive(Default)]
struct Hub {
    next_id: usize,
    peers: Vec<(usize, xch::Sender<Frame>)>,
}

/// Handle to the shared medium. Cheap to clone; create nodes with [`VirtualBus::node`].
#[derive(Clone, Default)]
pub struct VirtualBus {
    hub: Arc<Mutex<Hub>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint. It starts with an accept-all filter.
    pub fn node(&self) -> VirtualNode {
        let (tx, rx) = xch::unbounded();
        let mut hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        let id = hub.next_id;
        hub.next_id += 1;
        hub.peers.push((id, tx));
        tracing::trace!(node = id, "virtual bus node attached");
        VirtualNode {
            id,
            rx,
            hub: Arc::clone(&self.hub),
            filter: AddressFilter::any(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.hub
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peers
            .len()
    }
}

/// One endpoint on a [`VirtualBus`].
///
/// Receives block until a matching frame arrives. They only give up with
/// [`BusError::Disconnected`] once every other node has been dropped and the
/// queue is drained.
pub struct VirtualNode {
    id: usize,
    rx: xch::Receiver<Frame>,
    hub: Arc<Mutex<Hub>>,
    filter: AddressFilter,
}

impl VirtualNode {
    pub fn filter(&self) -> AddressFilter {
        self.filter
    }

    fn broadcast(&self, frame: Frame) {
        let hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, tx) in &hub.peers {
            if *id != self.id {
                // A dropped peer detaches itself; a failed send just means it is gone.
                let _ = tx.send(frame);
            }
        }
    }

    fn has_peers(&self) -> bool {
        let hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        hub.peers.iter().any(|(id, _)| *id != self.id)
    }

    fn next_frame(&self) -> Result<Frame, BusError> {
        loop {
            match self.rx.recv_timeout(PEER_POLL) {
                Ok(frame) => return Ok(frame),
                Err(xch::RecvTimeoutError::Timeout) => {
                    if !self.has_peers() {
                        return Err(BusError::Disconnected);
                    }
                }
                Err(xch::RecvTimeoutError::Disconnected) => return Err(BusError::Disconnected),
            }
        }
    }

    /// Next frame that passes the bound filter, of either shape.
    pub fn recv_any(&mut self) -> Result<Frame, BusError> {
        loop {
            let frame = self.next_frame()?;
            if self.filter.matches(frame.id()) {
                return Ok(frame);
            }
            tracing::trace!(node = self.id, id = frame.id(), "frame filtered out");
        }
    }
}

impl Drop for VirtualNode {
    fn drop(&mut self) {
        let mut hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        hub.peers.retain(|(id, _)| *id != self.id);
        tracing::trace!(node = self.id, "virtual bus node detached");
    }
}

impl Bus for VirtualNode {
    fn bind(
        &mut self,
        filter: AddressFilter,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.filter = filter;
        Ok(())
    }

    fn send_narrow(
        &mut self,
        frame: &NarrowFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::trace!(id = frame.id, len = frame.len, "tx narrow");
        self.broadcast(Frame::Narrow(*frame));
        Ok(())
    }

    fn recv_narrow(&mut self) -> Result<NarrowFrame, Box<dyn std::error::Error + Send + Sync>> {
        loop {
            if let Frame::Narrow(f) = self.recv_any()? {
                return Ok(f);
            }
        }
    }

    fn send_wide(
        &mut self,
        frame: &WideFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::trace!(id = frame.id, data = frame.data, "tx wide");
        self.broadcast(Frame::Wide(*frame));
        Ok(())
    }

    fn recv_wide(&mut self) -> Result<WideFrame, Box<dyn std::error::Error + Send + Sync>> {
        loop {
            if let Frame::Wide(f) = self.recv_any()? {
                return Ok(f);
            }
        }
    }
}
