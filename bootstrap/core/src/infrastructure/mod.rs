// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

pub mod keycloak;
pub mod minio_sts;
pub mod mount_table;
pub mod process;
pub mod s3fs;

pub use keycloak::KeycloakClient;
pub use minio_sts::MinioStsClient;
pub use process::{ChildProcess, CommandLauncher};
pub use s3fs::S3fsMounter;
