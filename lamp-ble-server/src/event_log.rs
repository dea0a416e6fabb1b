//! Structured log lines for peripheral state changes

use crate::peripheral::{ControllerState, PeripheralBackend, PeripheralController};

pub struct ConnectionEventLog;

impl ConnectionEventLog {
    /// Human readable line for a transition
    pub fn describe(state: ControllerState) -> &'static str {
        match state {
            ControllerState::Idle => "peripheral stopped",
            ControllerState::Advertising => "advertising, waiting for a central",
            ControllerState::Connected => "central connected",
            ControllerState::Disconnected => "central disconnected",
            ControllerState::AdvertisingFailed => "failed to advertise services",
        }
    }

    pub fn observe(state: ControllerState) {
        let message = Self::describe(state);
        match state {
            ControllerState::AdvertisingFailed => tracing::warn!(%state, "{message}"),
            _ => tracing::info!(%state, "{message}"),
        }
    }

    /// Log every transition of `controller`
    pub fn attach<B: PeripheralBackend>(controller: &mut PeripheralController<B>) {
        controller.on_state_changed(Self::observe);
    }
}
