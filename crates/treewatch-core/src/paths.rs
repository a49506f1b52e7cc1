//! Path resolution.
//!
//! Every directory the engine keys on goes through here first, so two
//! spellings of the same directory (`docs`, `./docs/`, `/base/docs`)
//! end up as one registry entry. Resolution is purely lexical and never
//! touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Resolves directories against a fixed base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for `base`.
    ///
    /// A relative base is anchored at the process working directory.
    pub fn new(base: impl AsRef<Path>) -> std::io::Result<Self> {
        let base = base.as_ref();
        let base = if base.is_absolute() {
            normalize(base)
        } else {
            normalize(&std::env::current_dir()?.join(base))
        };
        Ok(Self { base })
    }

    /// The absolute base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Produces the canonical absolute form of `dir`.
    ///
    /// Absolute inputs are only normalized. Relative ones are joined
    /// onto the base first. The directory doesn't have to exist.
    pub fn resolve(&self, dir: impl AsRef<Path>) -> PathBuf {
        let dir = dir.as_ref();
        if dir.is_absolute() {
            normalize(dir)
        } else {
            normalize(&self.base.join(dir))
        }
    }

    /// Absolute path of the directory that contains `file`.
    ///
    /// The file is made relative to the base, its last segment dropped,
    /// and the remainder re-prefixed with the base. Files outside the
    /// base fall back to their resolved parent.
    pub fn containing_dir(&self, file: impl AsRef<Path>) -> PathBuf {
        let file = self.resolve(file);
        match file.strip_prefix(&self.base) {
            Ok(relative) => match relative.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => self.base.join(dir),
                _ => self.base.clone(),
            },
            Err(_) => file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| file.clone()),
        }
    }
}

/// Lexically normalizes a path: drops `.`, folds `..`, strips trailing
/// separators. `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Last path segment as a string. Empty for paths like `/`.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased extension including the leading dot, or an empty string.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Parent directory with a fixed point at the root: the parent of `/`
/// is `/` itself.
pub fn parent_or_self(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

/// Returns true if `path` is `dir` or lies anywhere beneath it.
///
/// Matching is per component, so `/data/logs2` is not under `/data/logs`.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new("/srv/site").unwrap()
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let r = resolver();
        assert_eq!(r.resolve("docs"), PathBuf::from("/srv/site/docs"));
        assert_eq!(r.resolve("./docs/"), PathBuf::from("/srv/site/docs"));
        assert_eq!(r.resolve("docs/../assets"), PathBuf::from("/srv/site/assets"));
        assert_eq!(r.resolve("."), PathBuf::from("/srv/site"));
    }

    #[test]
    fn test_resolve_absolute_is_only_normalized() {
        let r = resolver();
        assert_eq!(r.resolve("/tmp/./x/"), PathBuf::from("/tmp/x"));
        assert_eq!(r.resolve("/../.."), PathBuf::from("/"));
    }

    #[test]
    fn test_relative_base_is_anchored_to_cwd() {
        let r = PathResolver::new("sub").unwrap();
        assert!(r.base().is_absolute());
        assert!(r.base().ends_with("sub"));
    }

    #[test]
    fn test_containing_dir_inside_and_outside_base() {
        let r = resolver();
        assert_eq!(
            r.containing_dir("/srv/site/docs/a.txt"),
            PathBuf::from("/srv/site/docs")
        );
        assert_eq!(r.containing_dir("/srv/site/a.txt"), PathBuf::from("/srv/site"));
        assert_eq!(r.containing_dir("/var/log/x.log"), PathBuf::from("/var/log"));
    }

    #[test]
    fn test_extension_is_lowercased_with_dot() {
        assert_eq!(extension(Path::new("/a/Report.TXT")), ".txt");
        assert_eq!(extension(Path::new("/a/archive.tar.gz")), ".gz");
        assert_eq!(extension(Path::new("/a/Makefile")), "");
        assert_eq!(extension(Path::new("/a/.bashrc")), "");
    }

    #[test]
    fn test_parent_reaches_fixed_point() {
        assert_eq!(parent_or_self(Path::new("/a")), Path::new("/"));
        assert_eq!(parent_or_self(Path::new("/")), Path::new("/"));
    }

    #[test]
    fn test_is_within_matches_components() {
        assert!(is_within(Path::new("/data/logs/a.txt"), Path::new("/data/logs")));
        assert!(is_within(Path::new("/data/logs"), Path::new("/data/logs")));
        assert!(!is_within(Path::new("/data/logs2/a.txt"), Path::new("/data/logs")));
    }
}
