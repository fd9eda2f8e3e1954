// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client version helpers used when identifying the tracer to the agent.

/// Converts a version string into `(major, minor, micro)`.
///
/// Only the first whitespace-separated token is considered, missing release
/// components default to zero and anything unparseable yields `(0, 0, 0)`.
///
/// ```
/// use remote_config_pubsub::version::parse_version;
///
/// assert_eq!(parse_version("1.2.3"), (1, 2, 3));
/// assert_eq!(parse_version("1.2"), (1, 2, 0));
/// assert_eq!(parse_version("1.0.0-beta1"), (1, 0, 0));
/// assert_eq!(parse_version("10.5.0 extra"), (10, 5, 0));
/// assert_eq!(parse_version("malformed"), (0, 0, 0));
/// ```
pub fn parse_version(version: &str) -> (u64, u64, u64) {
    let Some(token) = version.split_whitespace().next() else {
        return (0, 0, 0);
    };
    let token = token.strip_prefix(['v', 'V']).unwrap_or(token);

    let release_end = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (release, suffix) = token.split_at(release_end);
    let release = release.strip_suffix('.').unwrap_or(release);
    if release.is_empty() || !valid_suffix(suffix) {
        return (0, 0, 0);
    }

    let mut parts = Vec::with_capacity(3);
    for part in release.split('.') {
        match part.parse::<u64>() {
            Ok(value) => parts.push(value),
            Err(_) => return (0, 0, 0),
        }
    }
    (
        parts.first().copied().unwrap_or(0),
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    )
}

/// Pre-release, post-release, dev and local labels are accepted after the
/// release segment; anything else makes the version malformed.
fn valid_suffix(suffix: &str) -> bool {
    match suffix.chars().next() {
        None => true,
        Some(c) => c.is_ascii_alphabetic() || matches!(c, '-' | '+' | '_'),
    }
}

/// Rewrites a PEP 440 style version into a SemVer-compatible one.
///
/// Only the first `rc` (or, failing that, `.dev`) marker is rewritten, which
/// is enough for versions such as `1.7.1rc2.dev3+gf258c7d9`.
///
/// ```
/// use remote_config_pubsub::version::version_agent_format;
///
/// assert_eq!(version_agent_format("1.7.1rc2.dev3+gf258c7d9"), "1.7.1-rc2.dev3+gf258c7d9");
/// assert_eq!(version_agent_format("1.7.1.dev3+gf258c7d9"), "1.7.1-dev3+gf258c7d9");
/// assert_eq!(version_agent_format("1.7.1"), "1.7.1");
/// ```
pub fn version_agent_format(version: &str) -> String {
    if version.contains("rc") {
        version.replacen("rc", "-rc", 1)
    } else if version.contains(".dev") {
        version.replacen(".dev", "-dev", 1)
    } else {
        version.to_string()
    }
}
