// Copyright (c) 2026 Relaymail, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Mesh network core
//!
//! Coordinates a small set of cooperating specialist agents over a shared,
//! fault-tolerant key-value store.
//!
//! # Architecture
//!
//! - **domain**: entities, ports (traits), domain errors
//! - **application**: NetworkManager, Coordinator, HealthMonitor services
//! - **infrastructure**: SharedStore backends, circuit breaker, registries

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
