//! Trace-driven stand-in for a sensing slave node.
//!
//! Spawns a thread that owns one bus endpoint and answers the master's
//! request/response cycle from a recorded trace, one trace row per cycle.
//! The first row answers the bootstrap acquisition and is not followed by a
//! balancing frame; every later row is. Once the trace is exhausted the slave
//! sends a single end-of-test frame and exits.
use soc_traits::frame::SubType;
use soc_traits::{Address, AddressFilter, Bus, NarrowFrame};
use std::thread::JoinHandle;

/// Sequence number carried by the end-of-test frame.
pub const END_SEQUENCE: u16 = 0x400;

/// One recorded step: every channel reports the same current and voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    pub current: f32,
    pub voltage: f32,
    pub temperature: i32,
}

/// What the slave observed while replaying its trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlaveSummary {
    pub rows_served: usize,
    pub masks: Vec<u64>,
}

pub struct SimulatedSlave {
    address: u8,
    channels: usize,
    trace: Vec<TraceSample>,
}

impl SimulatedSlave {
    pub fn new(address: u8, channels: usize, trace: Vec<TraceSample>) -> Self {
        Self {
            address,
            channels,
            trace,
        }
    }

    /// Replay the whole trace on `bus`, then announce the end of the test.
    pub fn run<B: Bus>(
        &self,
        bus: &mut B,
    ) -> Result<SlaveSummary, Box<dyn std::error::Error + Send + Sync>> {
        bus.bind(AddressFilter::class(Address::master_data(self.address)))?;
        let mut summary = SlaveSummary::default();

        for (row, sample) in self.trace.iter().enumerate() {
            self.await_request(bus)?;
            bus.send_narrow(&NarrowFrame::empty(
                Address::clear_to_send(self.address).pack(),
            ))?;

            // Sample frames keep the CTS identifier so the master's filter passes them.
            let id = Address::clear_to_send(self.address).pack();
            for ch in 0..self.channels {
                bus.send_narrow(&NarrowFrame::channel_current(
                    id,
                    ch as u32,
                    sample.current,
                ))?;
                bus.send_narrow(&NarrowFrame::voltage_temperature(
                    id,
                    sample.voltage,
                    sample.temperature,
                ))?;
            }

            if row > 0 {
                let mask = bus.recv_wide()?;
                tracing::trace!(row, mask = mask.data, "balancing mask received");
                summary.masks.push(mask.data);
            }
            summary.rows_served += 1;
        }

        let mut end = NarrowFrame::empty(Address::end_of_test(self.address).pack());
        end.len = 2;
        end.data[0] = END_SEQUENCE;
        bus.send_narrow(&end)?;
        tracing::info!(rows = summary.rows_served, "simulated slave finished trace");
        Ok(summary)
    }

    fn await_request<B: Bus>(
        &self,
        bus: &mut B,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            let frame = bus.recv_narrow()?;
            match Address::unpack(frame.id) {
                Ok(a) if a.subtype == SubType::RequestToSend => return Ok(()),
                _ => tracing::debug!(id = frame.id, "slave ignoring unexpected frame"),
            }
        }
    }

    /// Run on a dedicated thread that owns `bus`.
    pub fn spawn<B: Bus + Send + 'static>(self, mut bus: B) -> SlaveHandle {
        let join_handle = std::thread::spawn(move || {
            self.run(&mut bus).map_err(|e| e.to_string())
        });
        SlaveHandle {
            join_handle: Some(join_handle),
        }
    }
}

pub struct SlaveHandle {
    join_handle: Option<JoinHandle<Result<SlaveSummary, String>>>,
}

impl SlaveHandle {
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the slave thread and return its summary.
    pub fn join(mut self) -> Result<SlaveSummary, String> {
        match self.join_handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| "simulated slave thread panicked".to_string())?,
            None => Err("simulated slave already joined".to_string()),
        }
    }
}

impl Drop for SlaveHandle {
    fn drop(&mut self) {
        // Detach: the thread ends on its own once its bus peers go away.
        if let Some(h) = self.join_handle.take() {
            if h.is_finished() {
                let _ = h.join();
            }
        }
    }
}
