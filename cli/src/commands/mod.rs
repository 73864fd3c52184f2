// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the workspace init CLI

pub mod config;
pub mod run;
pub mod storage;

pub use self::config::ConfigCommand;
