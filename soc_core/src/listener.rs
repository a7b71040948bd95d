//! End-of-test listener.
//!
//! Runs on its own thread, blocks for the slave's termination frame and
//! raises the shared shutdown flag. The estimator loop notices the flag at the
//! top of its next period.
use soc_traits::frame::CLASS_MASK;
use soc_traits::{Address, AddressFilter, Bus};
use std::thread::JoinHandle;

use crate::error::{Report, Result, SocError};
use crate::shutdown::ShutdownFlag;

/// Block until the end-of-test frame from `slave` arrives, then raise `shutdown`.
/// Returns the frame's sequence number.
pub fn await_end_of_test<B: Bus>(bus: &mut B, slave: u8, shutdown: &ShutdownFlag) -> Result<u16> {
    let filter = AddressFilter {
        id: Address::end_of_test(slave).pack(),
        mask: CLASS_MASK,
    };
    bus.bind(filter)
        .map_err(|e| Report::new(SocError::Bus(e.to_string())))?;
    let frame = bus
        .recv_narrow()
        .map_err(|e| Report::new(SocError::Bus(e.to_string())))?;
    let sequence = frame.data[0];
    tracing::info!(sequence, id = frame.id, "end of test received");
    shutdown.raise();
    Ok(sequence)
}

pub struct EndListener {
    join_handle: Option<JoinHandle<Result<u16>>>,
}

impl EndListener {
    pub fn spawn<B: Bus + Send + 'static>(mut bus: B, slave: u8, shutdown: ShutdownFlag) -> Self {
        let join_handle = std::thread::spawn(move || {
            let res = await_end_of_test(&mut bus, slave, &shutdown);
            if let Err(e) = &res {
                tracing::error!(error = %e, "end-of-test listener stopped");
            }
            res
        });
        Self {
            join_handle: Some(join_handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the listener thread; returns the received sequence number.
    pub fn join(mut self) -> Result<u16> {
        match self.join_handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| Report::new(SocError::State("listener thread panicked".to_string())))?,
            None => Err(Report::new(SocError::State(
                "listener already joined".to_string(),
            ))),
        }
    }
}

impl Drop for EndListener {
    fn drop(&mut self) {
        // A listener still blocked on the bus is detached; it exits once its bus closes.
        if let Some(h) = self.join_handle.take() {
            if h.is_finished() {
                let _ = h.join();
            }
        }
    }
}
