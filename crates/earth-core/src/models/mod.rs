//! Shared data models for EarthOS devices and updates

mod app;
mod device;
mod package;
mod session;

pub use app::*;
pub use device::*;
pub use package::*;
pub use session::*;
