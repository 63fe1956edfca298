//! Protocol-bridging action gateway.
//!
//! Turns a loosely-typed `(action_name, action_type, goal)` request into a
//! call against a dynamically-typed remote actuation bridge and waits for a
//! terminal result under explicit time bounds. Type tags resolve through a
//! startup-validated registry; the wire transport sits behind the
//! [`ActionTransport`] seam so tests and alternate bridges plug in without
//! touching the gateway logic.

mod bridge;
mod error;
mod gateway;
pub mod mock;
mod registry;
mod transport;

pub use bridge::BridgeTransport;
pub use error::GatewayError;
pub use gateway::{ActionGateway, GatewayOptions};
pub use registry::{ActionTypeDescriptor, ActionTypeRegistry, RegistryError};
pub use transport::{ActionTransport, GoalOutcome, TransportError};
