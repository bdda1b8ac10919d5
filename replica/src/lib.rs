//! Replicated document core for the collaborative canvas.
//!
//! This crate owns everything both sides of the wire must agree on: the
//! conflict-free document model (`DocState`), the serialized object record
//! and its tagged fill variant, the update codec, and the ephemeral command
//! message contract. The `server` crate merges and rebroadcasts updates;
//! the `client` crate wraps `DocState` in an observable
//! [`ReplicatedDocument`] and bridges it to a live scene.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`clock`] | Lamport clock and the `Stamp` total order |
//! | [`record`] | Serialized object snapshots and fill variants |
//! | [`document`] | The two-table LWW document and its transactions |
//! | [`update`] | Wire codec for update deltas and snapshots |
//! | [`command`] | Ephemeral command message contract |
//! | [`observable`] | Client-side observable document wrapper |

pub mod clock;
pub mod command;
pub mod document;
pub mod observable;
pub mod record;
pub mod update;

pub use clock::{LamportClock, Stamp};
pub use command::CommandMessage;
pub use document::{Change, ChangeKind, DocState, Table, ORIGIN_LOCAL, ORIGIN_REMOTE};
pub use observable::{ReplicatedDocument, Subscription};
pub use record::{Fill, ObjectRecord, ShapeKind};
pub use update::{CodecError, Update};
