pub mod clock;
pub mod frame;

pub use clock::{Clock, MonotonicClock};
pub use frame::{Address, AddressFilter, NarrowFrame, WideFrame};

/// Blocking, address-filtered access to the CAN-style bus.
///
/// Receives block until a frame matching the bound filter arrives; there is
/// no timeout at this layer.
pub trait Bus {
    fn bind(
        &mut self,
        filter: AddressFilter,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn send_narrow(
        &mut self,
        frame: &NarrowFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn recv_narrow(&mut self) -> Result<NarrowFrame, Box<dyn std::error::Error + Send + Sync>>;
    fn send_wide(
        &mut self,
        frame: &WideFrame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn recv_wide(&mut self) -> Result<WideFrame, Box<dyn std::error::Error + Send + Sync>>;
}
