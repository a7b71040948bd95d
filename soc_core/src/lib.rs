#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Battery-pack state-of-charge estimation (bus-agnostic).
//!
//! All bus traffic goes through `soc_traits::Bus` and all timing through
//! `soc_traits::Clock`, so the whole pipeline runs against simulated
//! backends in tests.
//!
//! ## Architecture
//!
//! - **Matrix**: dense `f32` matrix with the operations the filter needs (`matrix`)
//! - **Cell model**: temperature-indexed parameter and OCV/SoC tables (`model`)
//! - **EKF**: predict/update over current, hysteresis and SoC states (`ekf`)
//! - **Protocol**: RTS/CTS acquisition and balancing broadcast (`protocol`)
//! - **Scheduler**: absolute-deadline periodic loop (`scheduler`)
//! - **Listener**: end-of-test frame raises the shutdown flag (`listener`)
//! - **Runner**: bootstrap + periodic loop (`runner`)

pub mod config;
pub mod conversions;
pub mod ekf;
pub mod error;
pub mod listener;
pub mod matrix;
pub mod mocks;
pub mod model;
pub mod protocol;
pub mod runner;
pub mod scheduler;
pub mod shutdown;
pub mod util;

pub use config::{RunConfig, load_cell_model};
pub use ekf::{EkfPhase, EkfTuning, Kalman, Topology};
pub use error::{Report, Result, SocError};
pub use listener::{EndListener, await_end_of_test};
pub use matrix::{Matrix, MatrixError};
pub use model::{CellModel, CellParams, OcvTable, ParamTable};
pub use protocol::{CycleOutcome, CycleReport, Orchestrator, Samples, balancing_mask};
pub use runner::{RunSummary, estimate, run_loop};
pub use scheduler::{LatencyStats, PeriodInfo, PeriodicScheduler, SchedulerState};
pub use shutdown::ShutdownFlag;
