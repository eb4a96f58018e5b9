//! Storage seams for Scribe.
//!
//! The real durable store sits behind two narrow interfaces: the [`Backend`]
//! read API the subscription manager needs, and the [`WritePool`] /
//! [`WriteConnection`] pair the ingestion writer commits through. A
//! production deployment implements both over a pooled SQL driver; the
//! bundled [`MemoryBackend`] implements them in memory for tests and
//! embedding demos.

pub mod memory;
pub mod pool;
pub mod read;

pub use memory::MemoryBackend;
pub use pool::{SqlValue, WriteConnection, WritePool};
pub use read::Backend;
