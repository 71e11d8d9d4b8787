// UI module - front-end logic and event loop bridge
//
// This module contains:
// - EventLoopBridge: Carries worker events from the tokio runtime to the front-end tick
// - AppController: Wires user input to state management, jobs and self-update

pub mod bridge;
pub mod controller;

pub use bridge::{AppEvent, EventLoopBridge, EventLoopBridgeHandle};
pub use controller::{AppController, MANUAL_UPDATE_MESSAGE};
