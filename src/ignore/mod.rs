//! Ignore Matcher: hierarchical per-directory exclusion list.
//!
//! Honors nested ignore files (`.wicked-ignore` by convention, plus
//! `.gitignore` for compatibility with existing repos) and a set of
//! built-in defaults (VCS directories, build outputs, virtualenvs, OS
//! junk, and the indexer's own cache directory). The most-nested matching
//! rule wins; negated patterns (`!pattern`) can re-include a path excluded
//! by a less-specific rule.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Default directory/file name patterns every index run excludes unless
/// explicitly re-included.
pub const BUILTIN_EXCLUDES: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    ".venv/",
    "venv/",
    "__pycache__/",
    ".DS_Store",
    ".wicked-search/",
];

/// Stack of per-directory rule sets. Built once per indexing root and
/// reused for every path tested during the walk.
pub struct IgnoreMatcher {
    builtins: Gitignore,
    /// (directory, ruleset) pairs ordered from shallowest to deepest.
    /// The most-nested (last) matching rule wins.
    layers: Vec<(PathBuf, Gitignore)>,
    visited_dirs: HashSet<PathBuf>,
}

impl IgnoreMatcher {
    /// Build a matcher rooted at `root`, seeding the builtin excludes and
    /// loading a `.wicked-ignore`/`.gitignore` at the root if present.
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in BUILTIN_EXCLUDES {
            builder.add_line(None, pattern)?;
        }
        let builtins = builder.build()?;

        let mut matcher = Self {
            builtins,
            layers: Vec::new(),
            visited_dirs: HashSet::new(),
        };
        matcher.load_dir_rules(root);
        Ok(matcher)
    }

    /// Load any ignore file present directly in `dir` and push it onto the
    /// rule stack. Safe to call repeatedly as the walk descends; directories
    /// already visited (by canonical path) are skipped so symlink loops
    /// cannot cause unbounded rule-stack growth or infinite traversal.
    pub fn load_dir_rules(&mut self, dir: &Path) {
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if !self.visited_dirs.insert(canonical) {
            return;
        }

        for name in [".wicked-ignore", ".gitignore"] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                let mut builder = GitignoreBuilder::new(dir);
                if builder.add(&candidate).is_none() {
                    if let Ok(gi) = builder.build() {
                        self.layers.push((dir.to_path_buf(), gi));
                    }
                }
            }
        }
    }

    /// Decide whether `path` should be excluded from indexing/discovery.
    /// The most-nested ignore file whose pattern matches wins; an explicit
    /// negation (`!pattern`) in a more-nested file re-includes a path
    /// excluded by a shallower rule.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let mut ignored = matches!(
            self.builtins.matched(path, is_dir),
            ignore::Match::Ignore(_)
        );

        for (_dir, rules) in &self.layers {
            match rules.matched(path, is_dir) {
                ignore::Match::Ignore(_) => ignored = true,
                ignore::Match::Whitelist(_) => ignored = false,
                ignore::Match::None => {}
            }
        }

        ignored
    }

    /// Whether this directory has already been visited (used by the file
    /// discovery walker to avoid revisiting a symlinked directory loop).
    pub fn has_visited(&self, dir: &Path) -> bool {
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.visited_dirs.contains(&canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builtin_excludes_match_vcs_and_build_dirs() {
        let dir = tempdir().unwrap();
        let matcher = IgnoreMatcher::new(dir.path()).unwrap();

        assert!(matcher.is_ignored(&dir.path().join(".git/HEAD"), false));
        assert!(matcher.is_ignored(&dir.path().join("target/debug/x"), false));
        assert!(!matcher.is_ignored(&dir.path().join("src/lib.rs"), false));
    }

    #[test]
    fn nested_ignore_file_adds_rules_and_negation_wins() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("pkg");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join(".wicked-ignore"), "*.log\n").unwrap();
        fs::write(sub.join(".wicked-ignore"), "!important.log\n").unwrap();

        let mut matcher = IgnoreMatcher::new(dir.path()).unwrap();
        matcher.load_dir_rules(&sub);

        assert!(matcher.is_ignored(&dir.path().join("debug.log"), false));
        assert!(!matcher.is_ignored(&sub.join("important.log"), false));
    }

    #[test]
    fn visiting_same_directory_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut matcher = IgnoreMatcher::new(dir.path()).unwrap();
        assert!(matcher.has_visited(dir.path()));
        let layer_count = matcher.layers.len();
        matcher.load_dir_rules(dir.path());
        assert_eq!(matcher.layers.len(), layer_count);
    }
}
