// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Mount manager driving the s3fs backend with a stand-in mount program.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use bootstrap_core::application::mount_manager::MountManager;
use bootstrap_core::domain::bootstrap_config::MountsConfig;
use bootstrap_core::domain::credential::{CredentialVariant, DelegatedCredential, StorageCredential};
use bootstrap_core::domain::volume::{MountEntry, MountOwner, VolumeKind};
use bootstrap_core::infrastructure::S3fsMounter;

/// Records `<bucket> <path> <access key> <session token>` per invocation.
fn write_fake_s3fs(dir: &Path) -> std::path::PathBuf {
    let script = dir.join("fake-s3fs");
    let log = dir.join("s3fs.log");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$1 $2 $AWS_ACCESS_KEY_ID $AWS_SESSION_TOKEN\" >> {}\n",
            log.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn invocations(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("s3fs.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn current_owner() -> MountOwner {
    MountOwner {
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
    }
}

fn credential() -> StorageCredential {
    StorageCredential::Delegated(DelegatedCredential {
        access_key: "DELEGATEDKEY".to_string(),
        secret_key: "secret".to_string(),
        session_token: "session".to_string(),
        expires_at: None,
    })
}

#[tokio::test]
async fn test_mount_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mount_table = dir.path().join("mountinfo");
    std::fs::write(&mount_table, "22 1 0:21 / / rw,relatime - overlay overlay rw\n").unwrap();

    let config = MountsConfig {
        program: write_fake_s3fs(dir.path()).display().to_string(),
        mount_table: mount_table.clone(),
        ..MountsConfig::default()
    };
    let backend = Arc::new(S3fsMounter::new(&config, "http://minio:9000"));
    let private = dir.path().join("persistent").join("private");
    let common = dir.path().join("persistent").join("common");
    let desktop = dir.path().join("Desktop");
    let mut manager = MountManager::new(
        backend,
        vec![
            MountEntry::new(VolumeKind::Private, "user1", &private),
            MountEntry::new(VolumeKind::Common, "common", &common),
        ],
        current_owner(),
    )
    .with_desktop_dir(Some(desktop.clone()));

    let report = manager.mount_volumes(Some(&credential())).await;
    assert_eq!(report.mounted().count(), 2);
    assert_eq!(
        invocations(dir.path()),
        vec![
            format!("user1 {} DELEGATEDKEY session", private.display()),
            format!("common {} DELEGATEDKEY session", common.display()),
        ]
    );
    for path in [&private, &common] {
        let metadata = std::fs::metadata(path).unwrap();
        assert_eq!(metadata.uid(), current_owner().uid);
        assert_eq!(metadata.gid(), current_owner().gid);
    }

    // The kernel now reports both mounts
    let mut table = std::fs::read_to_string(&mount_table).unwrap();
    for (id, path) in [(98, &private), (99, &common)] {
        table.push_str(&format!(
            "{} 22 0:5{} / {} rw,nosuid,nodev - fuse.s3fs s3fs rw\n",
            id,
            id - 90,
            path.display()
        ));
    }
    std::fs::write(&mount_table, table).unwrap();

    let report = manager.mount_volumes(Some(&credential())).await;
    assert_eq!(report.mounted().count(), 2);
    assert_eq!(report.credential, Some(CredentialVariant::Delegated));
    assert_eq!(invocations(dir.path()).len(), 2);
    assert_eq!(std::fs::read_dir(&desktop).unwrap().count(), 2);
}
