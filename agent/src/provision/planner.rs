//! Diff desired state against observed state.
//!
//! Both planners are pure: they keep the server supplied order and never touch
//! the platform, so planning twice against an unchanged device is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::config::{AppSource, ApplicationSpec, FileSpec};
use crate::platform::FileRecord;

/// Installed packages and their versions, when known
pub type InstalledPackages = BTreeMap<String, Option<String>>;

/// When an already installed application is fetched again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinstallPolicy {
    #[default]
    Never,
    VersionMismatch,
    Always,
}

/// Plan file operations.
///
/// With `prune_orphans`, recorded files missing from the desired set are
/// appended as removals.
pub fn plan_files(
    desired: &[FileSpec],
    recorded: &BTreeMap<String, FileRecord>,
    prune_orphans: bool,
) -> Vec<FileSpec> {
    let mut plan: Vec<FileSpec> = desired
        .iter()
        .filter(|spec| file_needs_work(spec, recorded.get(&spec.path)))
        .cloned()
        .collect();

    if prune_orphans {
        let wanted: BTreeSet<&str> = desired.iter().map(|spec| spec.path.as_str()).collect();
        plan.extend(
            recorded
                .keys()
                .filter(|path| !wanted.contains(path.as_str()))
                .map(FileSpec::removal),
        );
    }
    plan
}

fn file_needs_work(spec: &FileSpec, record: Option<&FileRecord>) -> bool {
    if spec.remove {
        // removal is attempted even without a record so the filesystem converges
        return true;
    }
    if spec.url.is_none() {
        return false;
    }
    let Some(record) = record else {
        return true;
    };
    if record.url != spec.url {
        return true;
    }
    match &spec.checksum {
        Some(checksum) => record.checksum.as_deref() != Some(checksum.as_str()),
        None => false,
    }
}

/// Plan application operations
pub fn plan_applications(
    desired: &[ApplicationSpec],
    installed: &InstalledPackages,
    policy: ReinstallPolicy,
) -> Vec<ApplicationSpec> {
    desired
        .iter()
        .filter(|spec| app_needs_work(spec, installed, policy))
        .cloned()
        .collect()
}

fn app_needs_work(spec: &ApplicationSpec, installed: &InstalledPackages, policy: ReinstallPolicy) -> bool {
    let current = installed.get(&spec.pkg);

    if spec.remove {
        return current.is_some();
    }
    if spec.source() == AppSource::None {
        return false;
    }

    let Some(current_version) = current else {
        return true;
    };
    match policy {
        ReinstallPolicy::Never => false,
        ReinstallPolicy::Always => true,
        ReinstallPolicy::VersionMismatch => match (&spec.version, current_version) {
            (Some(wanted), Some(have)) => wanted != have,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, url: Option<&str>) -> FileSpec {
        FileSpec {
            path: path.to_string(),
            url: url.map(str::to_string),
            ..Default::default()
        }
    }

    fn record(url: &str, checksum: Option<&str>) -> FileRecord {
        FileRecord {
            url: Some(url.to_string()),
            checksum: checksum.map(str::to_string),
            installed_at: 1,
        }
    }

    fn app(pkg: &str, url: Option<&str>) -> ApplicationSpec {
        ApplicationSpec {
            pkg: pkg.to_string(),
            url: url.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_file_is_installed() {
        let plan = plan_files(&[file("a.txt", Some("http://x/a"))], &BTreeMap::new(), true);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].path, "a.txt");
        assert!(!plan[0].remove);
    }

    #[test]
    fn test_removal_without_record() {
        let mut spec = file("gone.txt", None);
        spec.remove = true;
        let plan = plan_files(&[spec], &BTreeMap::new(), false);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].remove);
    }

    #[test]
    fn test_file_mismatch_detection() {
        let mut recorded = BTreeMap::new();
        recorded.insert("a.txt".to_string(), record("http://x/a", Some("aaa")));
        recorded.insert("b.txt".to_string(), record("http://x/b-old", None));
        recorded.insert("c.txt".to_string(), record("http://x/c", None));

        let mut a = file("a.txt", Some("http://x/a"));
        a.checksum = Some("bbb".to_string());
        let b = file("b.txt", Some("http://x/b"));
        let c = file("c.txt", Some("http://x/c"));

        let plan = plan_files(&[a, b, c], &recorded, true);
        let paths: Vec<_> = plan.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_orphans_pruned_after_desired() {
        let mut recorded = BTreeMap::new();
        recorded.insert("old.txt".to_string(), record("http://x/old", None));

        let plan = plan_files(&[file("a.txt", Some("http://x/a"))], &recorded, true);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1], FileSpec::removal("old.txt"));

        let plan = plan_files(&[file("a.txt", Some("http://x/a"))], &recorded, false);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_app_removal_only_when_present() {
        let mut remove = app("com.foo", None);
        remove.remove = true;

        let installed: InstalledPackages = [("com.foo".to_string(), None)].into();
        assert_eq!(plan_applications(&[remove.clone()], &installed, ReinstallPolicy::Never).len(), 1);
        assert!(plan_applications(&[remove], &InstalledPackages::new(), ReinstallPolicy::Never).is_empty());
    }

    #[test]
    fn test_app_install_rules() {
        let installed: InstalledPackages = [("com.have".to_string(), Some("1.0".to_string()))].into();
        let mut have = app("com.have", Some("http://x/have.apk"));
        have.version = Some("2.0".to_string());
        let desired = vec![
            app("com.new", Some("http://x/new.apk")),
            app("com.nosource", None),
            have,
            app("com.market", Some("market://details?id=com.market")),
        ];

        let plan = plan_applications(&desired, &installed, ReinstallPolicy::Never);
        let pkgs: Vec<_> = plan.iter().map(|a| a.pkg.as_str()).collect();
        assert_eq!(pkgs, vec!["com.new", "com.market"]);

        let plan = plan_applications(&desired, &installed, ReinstallPolicy::VersionMismatch);
        let pkgs: Vec<_> = plan.iter().map(|a| a.pkg.as_str()).collect();
        assert_eq!(pkgs, vec!["com.new", "com.have", "com.market"]);
    }
}
