pub mod file;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod traits;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use store::MetricStore;
pub use traits::Backend;
