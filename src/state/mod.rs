//! Sans-I/O state machines for the extended query protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod close;
pub mod portal;

pub use action::{Action, AsyncMessage};
pub use close::CloseStateMachine;
pub use portal::PortalStateMachine;
