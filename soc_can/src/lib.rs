//! Bus backends for the estimator.
//!
//! - [`VirtualBus`]: in-process broadcast medium for simulation and tests.
//! - [`SimulatedSlave`]: replays a recorded trace as a sensing slave node.
//! - `SocketCanBus` (feature `socketcan`, Linux): raw `PF_CAN` socket.
pub mod error;
pub mod sim;
pub mod slave;
#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub mod socketcan;

pub use error::BusError;
pub use sim::{Frame, VirtualBus, VirtualNode};
pub use slave::{SimulatedSlave, SlaveHandle, SlaveSummary, TraceSample};
#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub use socketcan::SocketCanBus;
