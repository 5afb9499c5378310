//! Identity registry
//!
//! Maps each registered identity to the [`ClientHandle`] of its connection.
//! A single mutex guards every operation, so the uniqueness check and the
//! insertion happen atomically and snapshots are consistent.
//!
//! ```text
//!                  Arc<Registry>
//!            ┌──────────────────────────┐
//!            │ Mutex<HashMap<identity,  │
//!            │            ClientHandle>>│
//!            └────────────┬─────────────┘
//!         register ───────┤
//!         unregister ─────┤
//!                         ▼
//!                     snapshot()
//!                ┌────────┴────────┐
//!                ▼                 ▼
//!        BroadcastEngine      DatagramRelay
//! ```

pub mod entry;
pub mod store;

pub use entry::ClientHandle;
pub use store::Registry;
