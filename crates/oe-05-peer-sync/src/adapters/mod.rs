//! Transports: TCP for real nodes, an in-process network for tests.

mod memory;
mod tcp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::{read_frame, serve, write_frame, TcpTransport, MAX_FRAME_BYTES};
