// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Domain types and the traits at every external seam.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Credentials, volumes, managed processes and configuration

pub mod bootstrap_config;
pub mod credential;
pub mod identity;
pub mod process;
pub mod volume;
