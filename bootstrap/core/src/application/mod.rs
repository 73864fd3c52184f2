// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

pub mod bootstrap;
pub mod mount_manager;
pub mod supervisor;
pub mod token_broker;

pub use bootstrap::WorkspaceBootstrap;
pub use mount_manager::{MountManager, MountReport};
pub use supervisor::Supervisor;
pub use token_broker::{CredentialResolution, RetryPolicy, TokenBroker};
