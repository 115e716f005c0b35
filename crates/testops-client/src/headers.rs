//! `X-Client` and `X-Platform` telemetry headers.

use crate::config::ClientInfo;
use regex::Regex;
use std::sync::LazyLock;

static LEADING_NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^0-9]*").expect("valid regex"));
static SEMVER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex"));

/// Reduces a version constraint or tag to `major.minor.patch`.
///
/// `^1.2.3` → `1.2.3`, `v2.1` → `2.1.0`, `3` → `3.0.0`, `dev-main` → empty.
pub fn normalize_version(version: &str) -> String {
    let trimmed = LEADING_NON_DIGITS.replace(version.trim(), "");
    let Some(caps) = SEMVER_PREFIX.captures(&trimmed) else {
        return String::new();
    };
    let part = |i: usize| caps.get(i).map_or("0", |m| m.as_str()).to_string();
    format!("{}.{}.{}", part(1), part(2), part(3))
}

fn versioned(key: &str, version: Option<&String>) -> Option<String> {
    let normalized = normalize_version(version?);
    (!normalized.is_empty()).then(|| format!("{}=v{}", key, normalized))
}

/// Builds the `X-Client` value, or `None` when nothing is known.
pub fn x_client(info: &ClientInfo) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(name) = info.reporter_name.as_ref().filter(|s| !s.is_empty()) {
        parts.push(format!("reporter={}", name));
    }
    parts.extend(versioned("reporter_version", info.reporter_version.as_ref()));
    if let Some(framework) = info.framework.as_ref().filter(|s| !s.is_empty()) {
        parts.push(format!("framework={}", framework));
    }
    parts.extend(versioned("framework_version", info.framework_version.as_ref()));
    parts.extend(versioned("core_version", info.core_version.as_ref()));

    (!parts.is_empty()).then(|| parts.join(";"))
}

/// Builds the `X-Platform` value from the compile-time target.
pub fn x_platform() -> String {
    let os = std::env::consts::OS;
    let mut os_name = os.to_string();
    if let Some(first) = os_name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    format!("os={};arch={}", os_name, std::env::consts::ARCH)
}
