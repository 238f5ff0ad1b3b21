// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use anyhow::bail;

/// Escapes a path the way `systemd-escape --path` does: slashes become
/// dashes, everything outside `[A-Za-z0-9:_.]` (and a leading dot) becomes
/// `\xNN`. The root directory escapes to `-`.
pub fn escape_path(path: &Path) -> String {
    let bytes = path.as_os_str().as_bytes();
    let parts: Vec<&[u8]> = bytes
        .split(|b| *b == b'/')
        .filter(|part| !part.is_empty() && *part != b".")
        .collect();
    if parts.is_empty() {
        return "-".to_string();
    }

    let mut escaped = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            escaped.push('-');
        }
        for (j, byte) in part.iter().enumerate() {
            let plain =
                byte.is_ascii_alphanumeric() || *byte == b':' || *byte == b'_' || *byte == b'.';
            let leading_dot = i == 0 && j == 0 && *byte == b'.';
            if plain && !leading_dot {
                escaped.push(*byte as char);
            } else {
                escaped.push_str(&format!("\\x{:02x}", byte));
            }
        }
    }
    escaped
}

/// Instantiates a template unit like `xfs_scrub@.service` for a mountpoint.
/// The mountpoint is taken as its own argument and only ever escaped, never
/// spliced into the template verbatim.
pub fn instance_for_path(template: &str, path: &Path) -> anyhow::Result<String> {
    let Some((prefix, suffix)) = template.split_once("@.") else {
        bail!("{template} is not a template unit name");
    };
    Ok(format!("{prefix}@{}.{suffix}", escape_path(path)))
}
