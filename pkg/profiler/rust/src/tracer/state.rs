// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// Configured, not spawned yet.
    Idle,
    /// Spawned, waiting for the grace period before reporting ready.
    TracerStarting,
    /// Attached to the workload and writing its log.
    Capturing,
    /// Killed, exited, or failed to start.
    Stopped,
}

impl TracerState {
    pub fn is_active(self) -> bool {
        matches!(self, TracerState::TracerStarting | TracerState::Capturing)
    }

    pub(crate) fn can_transition_to(self, next: TracerState) -> bool {
        use TracerState::*;
        matches!(
            (self, next),
            (Idle, TracerStarting)
                | (TracerStarting, Capturing)
                | (TracerStarting, Stopped)
                | (Capturing, Stopped)
        )
    }
}

impl fmt::Display for TracerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracerState::Idle => write!(f, "idle"),
            TracerState::TracerStarting => write!(f, "starting"),
            TracerState::Capturing => write!(f, "capturing"),
            TracerState::Stopped => write!(f, "stopped"),
        }
    }
}
