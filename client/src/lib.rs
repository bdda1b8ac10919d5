//! Client-side synchronization engine for the collaborative canvas.
//!
//! This crate keeps a local mutable scene graph consistent with the
//! shared replicated document without infinite echo, and owns the one
//! durable connection to the synchronization endpoint. Rendering and
//! tool code live elsewhere: they mutate the scene through
//! [`scene::SceneHandle`] and neither know nor care that the scene is
//! replicated.
//!
//! The client runs on a single cooperative event loop — handlers run to
//! completion between scene and document events — so the shared state
//! here is `Rc`-based and must stay on one thread.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`scene`] | Local mutable scene graph with explicit event subscriptions |
//! | [`bridge`] | Loop-free bidirectional scene ↔ document sync |
//! | [`transport`] | WebSocket connection with bounded reconnect |
//! | [`session`] | Wires document, bridge, and transport together |

pub mod bridge;
pub mod scene;
pub mod session;
pub mod transport;

pub use bridge::SceneBridge;
pub use scene::{Scene, SceneEvent, SceneHandle, SceneKey, SceneObject};
pub use session::CollabSession;
pub use transport::{ConnectionState, Transport, TransportConfig, TransportError};
