//! Locator derivation and backend naming rules.
//!
//! Operator-provided overrides are taken verbatim (after provider-specific
//! normalization); sanitization applies only to default-composed names.

/// Default KV-v2 mount on Vault-style backends. Paths under this mount carry
/// the `/data/` API infix; other mounts are addressed KV-v1 style.
pub const DEFAULT_KV_MOUNT: &str = "secret";

/// Fallback when Key-Vault sanitization consumes the whole name.
const KEY_VAULT_FALLBACK: &str = "default-secret";

/// Compose a KV locator from mount, optional override path, service, and name.
pub fn kv_locator(
    mount: &str,
    custom_path: Option<&str>,
    service: Option<&str>,
    name: &str,
) -> String {
    if let Some(path) = custom_path {
        return if mount == DEFAULT_KV_MOUNT {
            format!("{}/data/{}", mount, path)
        } else {
            format!("{}/{}", mount, path)
        };
    }

    match (mount == DEFAULT_KV_MOUNT, service) {
        (true, Some(service)) => format!("{}/data/{}/{}", mount, service, name),
        (true, None) => format!("{}/data/{}", mount, name),
        (false, Some(service)) => format!("{}/{}/{}", mount, service, name),
        (false, None) => format!("{}/{}", mount, name),
    }
}

/// Strip the mount (and the `/data/` infix on the default mount) from a KV
/// locator, yielding the path the KV API expects.
pub fn kv_relative_path<'a>(locator: &'a str, mount: &str) -> &'a str {
    let rest = locator
        .strip_prefix(mount)
        .and_then(|r| r.strip_prefix('/'))
        .unwrap_or(locator);
    if mount == DEFAULT_KV_MOUNT {
        rest.strip_prefix("data/").unwrap_or(rest)
    } else {
        rest
    }
}

/// Flat slash-joined locator (AWS Secrets Manager).
pub fn flat_locator(custom_name: Option<&str>, service: Option<&str>, name: &str) -> String {
    if let Some(custom) = custom_name {
        return custom.to_string();
    }
    match service {
        Some(service) => format!("{}/{}", service, name),
        None => name.to_string(),
    }
}

/// Join service and secret name with `-` for naming-constrained backends.
pub fn hyphen_join(service: Option<&str>, name: &str) -> String {
    match service {
        Some(service) => format!("{}-{}", service, name),
        None => name.to_string(),
    }
}

/// Sanitize a name for Azure Key Vault (`^[0-9A-Za-z-]+$`): replace every
/// disallowed rune with `-`, collapse runs of `-`, trim the ends.
pub fn sanitize_key_vault_name(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    let mut previous_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            collapsed.push(c);
            previous_dash = false;
        } else if !previous_dash {
            collapsed.push('-');
            previous_dash = true;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        KEY_VAULT_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize a name for resource-ID backends (GCP Secret Manager,
/// `[a-zA-Z][a-zA-Z0-9_-]*`): prepend `s` when the first rune is not a
/// letter, replace every other disallowed rune with `_`.
pub fn sanitize_resource_name(name: &str) -> String {
    if name.is_empty() {
        return "s".to_string();
    }

    let mut out = String::with_capacity(name.len() + 1);
    for (i, c) in name.chars().enumerate() {
        if i == 0 && !c.is_ascii_alphabetic() {
            out.push('s');
        }
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}
