//! Application services for the torrent gateway.

pub mod alerts;
pub mod gateway;
pub mod reaper;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod stream_reader;
pub mod transmuxer;

pub use alerts::AlertLoop;
pub use gateway::Gateway;
pub use reaper::Reaper;
pub use registry::Registry;
pub use session::SessionFacade;
pub use transmuxer::TransmuxerSupervisor;
