// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Assembles the container runtime CLI invocation (§4.6 step 2).

use crate::mounts::Mount;

/// Builds the argument vector for the container runtime binary (e.g.
/// `docker` or `podman`): `run -i --rm`, one mount flag per [`Mount`], one
/// `-e KEY=VALUE` per environment variable, then the image name.
///
/// Read-only mounts use `--mount type=bind,...,readonly`; writable mounts
/// use the shorter `-v host:container` form, matching how read-write binds
/// are the common case and read-only binds are the exception worth calling
/// out explicitly.
pub fn build_args(image: &str, mounts: &[Mount], env: &[(String, String)]) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];

    for mount in mounts {
        if mount.read_only {
            args.push("--mount".to_string());
            args.push(format!(
                "type=bind,source={},target={},readonly",
                mount.host_path.display(),
                mount.container_path
            ));
        } else {
            args.push("-v".to_string());
            args.push(format!("{}:{}", mount.host_path.display(), mount.container_path));
        }
    }

    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={}", sanitize_env_value(value)));
    }

    args.push(image.to_string());
    args
}

/// Collapses newlines in an environment variable's value so it cannot break
/// out of the single `-e KEY=VALUE` argument it's carried in.
fn sanitize_env_value(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}
