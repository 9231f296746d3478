//! Network I/O for tracking messages
//!
//! Provides the outbound sender connection and blocking/async receivers.

pub mod async_receiver;
pub mod client;
pub mod receiver;

pub use async_receiver::{AsyncReceiverConnection, AsyncTrackingReceiver};
pub use client::{CloseHandle, TrackingClient};
pub use receiver::{ReceiverConnection, TrackingReceiver};
