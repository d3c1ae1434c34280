//! Worker process handles, the supervisor monitor loop, and the control
//! file bridge (spec.md §4.6, §4.7, §4.9).

pub mod control_bridge;
pub mod handle;
pub mod supervisor;
pub mod system_info;

pub use control_bridge::ControlFileBridge;
pub use handle::WorkerHandle;
pub use supervisor::Supervisor;
