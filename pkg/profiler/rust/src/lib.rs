// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

mod cmdline;
mod errors;
mod filter;
mod layout;
mod os_release;
mod ports;
mod procfs;
mod resources;
mod snapshot;
mod sockets;
mod supervisor;
mod tracer;

// Re-export the public API
pub use cmdline::FlagArgument;
pub use errors::Error;
pub use filter::{DependencySet, filter, filter_file};
pub use layout::{DEFAULT_OUTPUT_DIR, OutputLayout};
pub use os_release::DEFAULT_IMAGE;
pub use resources::ResourceUsage;
pub use snapshot::{Assembled, ProcessSnapshot};
pub use supervisor::{Capture, restart_under_trace, terminate};
pub use tracer::state::TracerState;
pub use tracer::{Launch, SupervisedTracer, TracerSettings};
