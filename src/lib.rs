/*!
 * Remote Desk Server Library
 *
 * Screen capture with change-only delivery, input injection with
 * auto-release of held inputs, and a command registry served over HTTP
 * and WebSocket.
 */

pub mod agent;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod metrics;
pub mod provider;
pub mod server;
pub mod shutdown;
pub mod streaming;
pub mod validation;
pub mod video;

// Re-export commonly used types
pub use agent::DeskAgent;
pub use dispatch::{CommandRegistry, CommandResult, Reply, Request, Route};
pub use error::DispatchError;
pub use provider::{CapabilityProvider, HeadlessProvider};
pub use server::{router, AppState};
pub use video::EncodedFrame;
