// Copyright (c) 2026 DTaaS Workspace Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Kernel mount table reader (`/proc/self/mountinfo`).

use std::path::{Path, PathBuf};

pub struct MountTable {
    path: PathBuf,
}

impl MountTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn mountpoints(&self) -> std::io::Result<Vec<PathBuf>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_mountinfo(&content))
    }

    pub async fn contains(&self, target: &Path) -> std::io::Result<bool> {
        Ok(self.mountpoints().await?.iter().any(|p| p == target))
    }
}

/// Mount points from mountinfo content (fifth field of each line).
pub fn parse_mountinfo(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape(field)))
        .collect()
}

// The kernel escapes space, tab, newline and backslash as \ooo.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
