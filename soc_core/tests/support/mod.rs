//! Shared fixtures for soc_core integration tests.
#![allow(dead_code)]

use soc_core::{CellModel, EkfTuning, Kalman, Topology};
use soc_traits::{AddressFilter, Bus, NarrowFrame, WideFrame};
use std::collections::VecDeque;

/// Two temperature columns, four OCV breakpoints, no temperature slope.
pub fn cell_model() -> CellModel {
    let params = vec![
        vec![2.5, 2.5],     // Q
        vec![100.0, 100.0], // G
        vec![0.01, 0.01],   // M
        vec![0.005, 0.005], // M0
        vec![10.0, 10.0],   // RC
        vec![0.01, 0.01],   // R
        vec![0.02, 0.02],   // R0
        vec![0.99, 0.99],   // eta
        vec![0.0, 40.0],    // temperatures
    ];
    let ocv = vec![
        vec![3.0, 3.4, 3.7, 4.2],   // OCV
        vec![3.0, 3.4, 3.7, 4.2],   // OCV0
        vec![0.0, 0.0, 0.0, 0.0],   // OCVrel
        vec![0.0, 0.2, 0.6, 1.0],   // SOC
        vec![0.0, 0.2, 0.6, 1.0],   // SOC0
        vec![0.0, 0.0, 0.0, 0.0],   // SOCrel
        vec![2.0, 1.5, 0.75, 1.25], // dOCV0
        vec![0.0, 0.0, 0.0, 0.0],   // dOCVrel
    ];
    CellModel::from_rows(&params, &ocv).unwrap()
}

pub fn single_cell(ocv: f32) -> Kalman {
    Kalman::setup(
        Topology::new(1, 1).unwrap(),
        EkfTuning::default(),
        cell_model(),
        25.0,
        &[ocv],
    )
    .unwrap()
}

/// In-memory bus that replays queued narrow frames and records everything sent.
#[derive(Default)]
pub struct ScriptedBus {
    pub inbox: VecDeque<NarrowFrame>,
    pub sent_narrow: Vec<NarrowFrame>,
    pub sent_wide: Vec<WideFrame>,
    pub binds: Vec<AddressFilter>,
}

impl ScriptedBus {
    pub fn push(&mut self, f: NarrowFrame) {
        self.inbox.push_back(f);
    }
}

impl Bus for ScriptedBus {
    fn bind(
        &mut self,
        filter: AddressFilter,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.binds.push(filter);
        Ok(())
    }
    fn send_narrow(
        &mut self,
        frame: &NarrowFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent_narrow.push(*frame);
        Ok(())
    }
    fn recv_narrow(&mut self) -> Result<NarrowFrame, Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.binds.last().copied().unwrap_or(AddressFilter::any());
        while let Some(f) = self.inbox.pop_front() {
            if filter.matches(f.id) {
                return Ok(f);
            }
        }
        Err("script exhausted".into())
    }
    fn send_wide(
        &mut self,
        frame: &WideFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent_wide.push(*frame);
        Ok(())
    }
    fn recv_wide(&mut self) -> Result<WideFrame, Box<dyn std::error::Error + Send + Sync>> {
        Err("master never receives wide frames".into())
    }
}
