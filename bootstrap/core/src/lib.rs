// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Workspace bootstrap core
//!
//! Exchanges the workspace user's identity for scoped storage credentials,
//! mounts the private and common volumes, then launches and supervises the
//! desktop daemons until a termination signal arrives.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain, application services and infrastructure adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
