//! Path normalization for values stored under "path"-like keys.
//!
//! Any key containing the substring `path` (case-sensitive) marks its string
//! value as a filesystem location. Such values are home-expanded, made
//! absolute, resolved through symlinks one component at a time and rendered
//! with forward slashes. Normalizing an already normalized path is a no-op.

use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use serde_json::Value as JsonValue;

use crate::node::Value;
use crate::transcode::{Mapping, ValueProcessor};

pub const PATH_MARKER: &str = "path";

/// Default value processor used by decode, `update` and the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathNormalizer;

impl ValueProcessor for PathNormalizer {
    fn process(&self, key: &str, value: &Value) -> Option<Value> {
        process_path(key, value)
    }
}

pub fn is_path_key(key: &str) -> bool {
    key.contains(PATH_MARKER)
}

/// Normalized replacement for `value`, or `None` when the key is not a path
/// key or the value is not a string.
pub fn process_path(key: &str, value: &Value) -> Option<Value> {
    if !is_path_key(key) {
        return None;
    }
    value.as_str().map(|raw| Value::String(normalize_path(raw)))
}

/// Returns a copy of `mapping` with every path value normalized, descending
/// into nested mappings and mappings held in sequences.
pub fn resolve_paths(mapping: &Mapping) -> Mapping {
    mapping
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(key, value)))
        .collect()
}

fn resolve_value(key: &str, value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(mapping) => JsonValue::Object(resolve_paths(mapping)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(resolve_item).collect()),
        JsonValue::String(raw) if is_path_key(key) => JsonValue::String(normalize_path(raw)),
        other => other.clone(),
    }
}

/// Sequence items are never path values themselves, only their mappings are searched.
fn resolve_item(item: &JsonValue) -> JsonValue {
    match item {
        JsonValue::Object(mapping) => JsonValue::Object(resolve_paths(mapping)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(resolve_item).collect()),
        other => other.clone(),
    }
}

/// Expands `~`, absolutizes against the working directory, resolves symlinks
/// and `..` in path order and renders the result posix-style.
pub fn normalize_path(raw: &str) -> String {
    let expanded = expand_home(raw);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };
    to_posix(&resolve(&absolute))
}

fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
            .or_else(|| raw.strip_prefix(&format!("~{MAIN_SEPARATOR}")))
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

/// Walks `path` one component at a time. Each component that exists is
/// canonicalized before the next one is applied, so `..` after a symlink
/// climbs out of the link target. Components that do not exist are kept
/// as written and `..` removes them lexically.
fn resolve(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                resolved = fs::canonicalize(&candidate).unwrap_or(candidate);
            }
        }
    }
    resolved
}

fn to_posix(path: &Path) -> String {
    let text = path.to_string_lossy();
    if MAIN_SEPARATOR == '\\' {
        let text = text.strip_prefix(r"\\?\").unwrap_or(&text);
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::{is_path_key, normalize_path, process_path, resolve_paths};
    use crate::node::Value;
    use proptest::prelude::*;
    use serde_json::json;
    use std::path::Path;

    fn home() -> std::path::PathBuf {
        dirs::home_dir().expect("tests need a home directory")
    }

    #[test]
    fn matches_path_keys_by_substring() {
        assert!(is_path_key("path"));
        assert!(is_path_key("key_path"));
        assert!(is_path_key("pathname"));
        assert!(!is_path_key("Path"));
        assert!(!is_path_key("name"));
    }

    #[test]
    fn expands_home_marker() {
        let normalized = normalize_path("~/configurator-missing-dir/p");
        let explicit = home().join("configurator-missing-dir").join("p");

        assert_eq!(normalized, normalize_path(&explicit.to_string_lossy()));
        assert!(Path::new(&normalized).is_absolute());
        assert!(!normalized.contains('~'));
        assert!(normalized.ends_with("/configurator-missing-dir/p"));
    }

    #[test]
    fn resolves_relative_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().to_string_lossy().into_owned();

        let messy = normalize_path(&format!("{base}/a/./b/../c"));
        let clean = normalize_path(&format!("{base}/a/c"));
        assert_eq!(messy, clean);
        assert!(!messy.contains("/./"));
        assert!(!messy.contains("/../"));
    }

    #[test]
    fn resolves_symlinked_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real");
        std::fs::create_dir(&real).expect("mkdir");
        #[cfg(unix)]
        {
            let link = dir.path().join("link");
            std::os::unix::fs::symlink(&real, &link).expect("symlink");
            assert_eq!(
                normalize_path(&link.join("file.toml").to_string_lossy()),
                normalize_path(&real.join("file.toml").to_string_lossy())
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn parent_segment_applies_after_following_a_symlink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real");
        let sub = real.join("sub");
        std::fs::create_dir_all(&sub).expect("mkdir");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&sub, &link).expect("symlink");

        let through_link = normalize_path(&format!("{}/..", link.to_string_lossy()));
        assert_eq!(through_link, normalize_path(&real.to_string_lossy()));
        assert_ne!(through_link, normalize_path(&dir.path().to_string_lossy()));

        let missing_tail = normalize_path(&format!("{}/../new/./file", link.to_string_lossy()));
        assert_eq!(
            missing_tail,
            format!("{}/new/file", normalize_path(&real.to_string_lossy()))
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["~", "~/p", ".", "..", "some/rel/../path", "/tmp/./x/y"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once, "input {raw}");
        }
    }

    #[test]
    fn processor_only_rewrites_strings_under_path_keys() {
        let raw = Value::from("~/p");
        assert_eq!(process_path("name", &raw), None);
        assert_eq!(
            process_path("project_path", &raw),
            Some(Value::String(normalize_path("~/p")))
        );
        assert_eq!(process_path("path", &Value::from(10)), None);
    }

    #[test]
    fn resolve_paths_walks_nested_mappings() {
        let raw = json!({
            "project": {"path": "~/p", "name": "~/not-a-path"},
            "mounts": [{"source_path": "~/m"}],
            "path": "~"
        });
        let raw = raw.as_object().expect("object").clone();
        let resolved = resolve_paths(&raw);

        assert_eq!(resolved["project"]["path"], json!(normalize_path("~/p")));
        assert_eq!(resolved["project"]["name"], json!("~/not-a-path"));
        assert_eq!(resolved["mounts"][0]["source_path"], json!(normalize_path("~/m")));
        assert_eq!(resolved["path"], json!(normalize_path("~")));
        assert_eq!(raw["project"]["path"], json!("~/p"));
    }

    proptest! {
        #[test]
        fn normalize_twice_equals_once(
            prefix in prop_oneof![Just(""), Just("~/"), Just("./"), Just("../"), Just("/")],
            segments in prop::collection::vec("[a-z.]{1,6}", 0..5),
        ) {
            let raw = format!("{prefix}{}", segments.join("/"));
            let once = normalize_path(&raw);
            prop_assert_eq!(normalize_path(&once), once);
        }
    }
}
