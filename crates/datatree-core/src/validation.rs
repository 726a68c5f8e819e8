//! Link diagnostics over a subtree.

use std::fmt;

use crate::path::{PathExecutor, PathMode};
use crate::schema::{Link, LinkKey};
use crate::tree::{DataTree, NodeId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    AbstractLink,
    NoRoot,
    EmptyPath,
    BrokenPath,
    EmptyKey,
    InvalidKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kind: ReportKind,
    pub node: NodeId,
    /// Path of the offending node from the top of its tree.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl DataTree {
    /// Checks every link of `node` and its descendants without resolving or
    /// caching them.
    pub fn validation(&self, node: NodeId) -> Vec<Report> {
        let mut reports = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Ok(data) = self.node(current) else { continue };
            stack.extend(data.children.iter().rev().copied());
            let Ok(def) = self.type_of(current) else { continue };
            for link in def.links() {
                self.validate_link(current, link, &mut reports);
            }
        }
        reports
    }

    fn validate_link(&self, node: NodeId, link: &Link, reports: &mut Vec<Report>) {
        let label = format!("{}::{}", link.owner(), link.name());
        let mut report = |kind: ReportKind, message: String| {
            reports.push(Report {
                kind,
                node,
                path: self.path_from_root(node).unwrap_or_default(),
                message: format!("{label} {message}"),
            });
        };

        if link.is_abstract() {
            report(ReportKind::AbstractLink, "is abstract".to_string());
            return;
        }
        let Some(root) = self.node(node).ok().and_then(|data| data.root) else {
            report(ReportKind::NoRoot, "doesn't have root data".to_string());
            return;
        };
        let path = self.link_path(node, link).unwrap_or_default();
        if path.is_empty() {
            report(ReportKind::EmptyPath, "has empty path".to_string());
            return;
        }
        let mut executor = PathExecutor::new(self, root, &path, PathMode::Lenient);
        if !executor.execute().unwrap_or(false) {
            report(ReportKind::BrokenPath, format!("has broken path: {path}"));
            return;
        }

        let keys = self.link_keys(node, link).unwrap_or_default();
        for key in keys {
            if key.is_empty() {
                if !link.meta().nullable {
                    report(ReportKind::EmptyKey, "has empty key without Nullable meta".to_string());
                }
                continue;
            }
            let mut executor = PathExecutor::new(self, root, &path, PathMode::Lenient);
            executor.append_key(&key);
            let found = executor.execute().unwrap_or(false)
                && matches!(
                    executor.value(),
                    Ok(Some(value)) if !matches!(value, Value::Node(None))
                );
            if !found {
                let full = datatree_path::join(&path, &key);
                report(ReportKind::InvalidKey, format!("has invalid key: {key} ({full})"));
            }
            if link.key_kind() != LinkKey::Collection {
                break;
            }
        }
    }
}
