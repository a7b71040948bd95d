//! Master side of the request/response exchange with one slave group.
//!
//! One cycle:
//! 1. bind the slave's CTS address with the full mask and send RTS;
//! 2. on a well-formed CTS pull two narrow frames per channel
//!    (`index, current` then `voltage, temperature`);
//! 3. run the filter's predict and update steps;
//! 4. broadcast the balancing bitmask in one wide frame.
//!
//! A malformed CTS is logged and the cycle continues on the previous samples.
use soc_traits::{Address, AddressFilter, Bus, NarrowFrame, WideFrame};

use crate::ekf::{EkfTuning, Kalman, Topology};
use crate::error::{Report, Result, SocError};
use crate::model::CellModel;

/// Whether a cycle ran on freshly received samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Fresh,
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub mask: u64,
    pub soc: Vec<f32>,
    pub soc_variance: Vec<f32>,
    pub gated: usize,
}

/// Latest readings, indexed by channel (voltage by series group).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    pub current: Vec<f32>,
    pub voltage: Vec<f32>,
    pub temperature: Vec<i32>,
}

impl Samples {
    fn new(topo: Topology) -> Self {
        Self {
            current: vec![0.0; topo.channels()],
            voltage: vec![0.0; topo.ser],
            temperature: vec![0; topo.channels()],
        }
    }

    /// Temperature that drives the cell model (channel 0).
    pub fn model_temperature(&self) -> f32 {
        self.temperature.first().copied().unwrap_or_default() as f32
    }
}

/// Bit `c` set for every channel with `soc[c] > min(soc) + range`.
pub fn balancing_mask(soc: &[f32], range: f32) -> u64 {
    let min = soc.iter().copied().fold(f32::INFINITY, f32::min);
    soc.iter()
        .take(64)
        .enumerate()
        .filter(|(_, s)| **s > min + range)
        .fold(0u64, |mask, (c, _)| mask | (1u64 << c))
}

fn bus_err(e: Box<dyn std::error::Error + Send + Sync>) -> Report {
    Report::new(SocError::Bus(e.to_string()))
}

pub struct Orchestrator<B: Bus> {
    bus: B,
    slave: u8,
    topo: Topology,
    soc_range: f32,
    samples: Samples,
}

impl<B: Bus> Orchestrator<B> {
    pub fn new(bus: B, slave: u8, topo: Topology, soc_range: f32) -> Self {
        Self {
            bus,
            slave,
            topo,
            soc_range,
            samples: Samples::new(topo),
        }
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn topology(&self) -> Topology {
        self.topo
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Handshake with the slave and pull one sample pair per channel.
    pub fn acquire(&mut self) -> Result<CycleOutcome> {
        let cts = Address::clear_to_send(self.slave);
        self.bus.bind(AddressFilter::exact(cts)).map_err(bus_err)?;
        self.bus
            .send_narrow(&NarrowFrame::empty(
                Address::request_to_send(self.slave).pack(),
            ))
            .map_err(bus_err)?;

        let reply = self.bus.recv_narrow().map_err(bus_err)?;
        if reply.len != 0 || reply.id != cts.pack() {
            tracing::warn!(
                id = reply.id,
                len = reply.len,
                "malformed clear-to-send; keeping previous samples"
            );
            return Ok(CycleOutcome::Stale);
        }

        let n = self.topo.channels();
        for _ in 0..n {
            let first = self.bus.recv_narrow().map_err(bus_err)?;
            let second = self.bus.recv_narrow().map_err(bus_err)?;
            for f in [&first, &second] {
                if f.len != soc_traits::frame::NARROW_DATA_LEN {
                    tracing::warn!(id = f.id, len = f.len, "unexpected data frame length");
                }
            }

            let idx = first.word32(0) as usize;
            if idx >= n {
                tracing::warn!(
                    channel = idx,
                    channels = n,
                    "channel index out of range; pair ignored"
                );
                continue;
            }
            self.samples.current[idx] = first.f32_at(1);
            if idx % self.topo.par == 0 {
                self.samples.voltage[self.topo.group_of(idx)] = second.f32_at(0);
            }
            self.samples.temperature[idx] = second.i32_at(1);
            tracing::trace!(
                channel = idx,
                current = self.samples.current[idx],
                temperature = self.samples.temperature[idx],
                "sample pair"
            );
        }
        Ok(CycleOutcome::Fresh)
    }

    /// First acquisition; its voltages and temperature seed the filter.
    pub fn bootstrap(&mut self, tuning: EkfTuning, model: CellModel) -> Result<Kalman> {
        if self.acquire()? == CycleOutcome::Stale {
            return Err(Report::new(SocError::Bus(
                "initial acquisition failed: no valid clear-to-send".to_string(),
            )));
        }
        let t0 = self.samples.model_temperature();
        let kalman = Kalman::setup(self.topo, tuning, model, t0, &self.samples.voltage)?;
        tracing::info!(
            t0,
            voltage = ?self.samples.voltage,
            soc = ?kalman.soc(),
            "estimator bootstrapped"
        );
        Ok(kalman)
    }

    /// One full acquisition + estimation + balancing cycle.
    pub fn cycle(&mut self, kalman: &mut Kalman) -> Result<CycleReport> {
        let outcome = self.acquire()?;
        let t = self.samples.model_temperature();
        kalman.predict(&self.samples.current, t)?;
        kalman.update(&self.samples.voltage, t)?;

        let soc = kalman.soc();
        let mask = balancing_mask(&soc, self.soc_range);
        self.bus
            .send_wide(&WideFrame::new(
                Address::master_data(self.slave).pack(),
                mask,
            ))
            .map_err(bus_err)?;

        Ok(CycleReport {
            outcome,
            mask,
            soc,
            soc_variance: kalman.soc_variance(),
            gated: kalman.gated().iter().filter(|g| **g).count(),
        })
    }
}
