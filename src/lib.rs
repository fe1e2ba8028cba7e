//! A pooled writer for little-endian binary packets.
//!
//! ```
//! use pktwriter::{BufferPool, PacketWriter};
//!
//! # fn main() -> pktwriter::Result<()> {
//! let pool = BufferPool::new();
//! let mut writer = PacketWriter::with_id(&pool, 0x0001)?;
//! writer.write_u8(0xFF)?;
//! assert_eq!(writer.finish_framed()?, [0x01, 0x00, 0x01, 0x00, 0xFF]);
//! # Ok(())
//! # }
//! ```

mod buffer;
mod error;
mod writer;

pub use buffer::{BuffMut, BufferPool, PoolConfig, PoolStats};
pub use error::{EncodeError, Result};
pub use writer::{PacketField, PacketWriter};
