//! The include resolver (§4.H) and the `VirtualFileSystem` seam it consumes
//! (§6 "Virtual file system (consumed)").

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lexer::Lexer;

/// Abstract handle to a header resource, independent of the underlying
/// filesystem (GLOSSARY "Virtual file").
pub trait VirtualFile {
    fn path(&self) -> &Path;
    fn is_file(&self) -> bool;
    fn parent(&self) -> Option<PathBuf>;
    /// Reads the file's contents and produces a fresh lexer source over them.
    fn read_to_lexer(&self) -> Result<Lexer>;
}

/// External collaborator abstracting away the concrete filesystem (§1
/// "Out of scope"). Implementors resolve a `(directory, name)` pair to a
/// [`VirtualFile`], or report it missing.
pub trait VirtualFileSystem {
    fn get_file(&self, dir: Option<&Path>, name: &str) -> Option<Box<dyn VirtualFile>>;
}

/// A single search-path list entry used for quote/system/framework lookup.
pub type SearchPath = PathBuf;

/// Resolves `#include`/`#include_next` names against quote, system, and
/// framework path lists, and tracks `#pragma once` (§4.H).
pub struct IncludeResolver {
    pub quote_paths: Vec<SearchPath>,
    pub system_paths: Vec<SearchPath>,
    pub framework_paths: Vec<SearchPath>,
    once_seen: HashSet<PathBuf>,
}

impl Default for IncludeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IncludeResolver {
    pub fn new() -> Self {
        IncludeResolver {
            quote_paths: Vec::new(),
            system_paths: Vec::new(),
            framework_paths: Vec::new(),
            once_seen: HashSet::new(),
        }
    }

    /// `#pragma once`: returns `true` the first time `path` is seen (and
    /// remembers it), `false` on every subsequent call.
    pub fn mark_pragma_once(&mut self, path: &Path) -> bool {
        self.once_seen.insert(path.to_path_buf())
    }

    pub fn already_seen_once(&self, path: &Path) -> bool {
        self.once_seen.contains(path)
    }

    /// Resolves `name` (quoted or angle-bracket) relative to `current_dir`
    /// (the directory of the file doing the including, if any). `skip_past`
    /// is the search-path directory `#include_next` should resume after, or
    /// `None` for an ordinary `#include` (§4.H).
    pub fn resolve(
        &self,
        vfs: &dyn VirtualFileSystem,
        name: &str,
        quoted: bool,
        current_dir: Option<&Path>,
        skip_past: Option<&Path>,
    ) -> std::result::Result<(Box<dyn VirtualFile>, Vec<PathBuf>), Vec<PathBuf>> {
        let mut searched = Vec::new();

        if name.starts_with('/') {
            searched.push(PathBuf::from(name));
            if let Some(f) = vfs.get_file(None, name) {
                return Ok((f, searched));
            }
            return Err(searched);
        }

        let mut skipping = skip_past.is_some();

        if quoted {
            if let Some(dir) = current_dir {
                searched.push(dir.join(name));
                if let Some(f) = vfs.get_file(Some(dir), name) {
                    return Ok((f, searched));
                }
            }
            for p in &self.quote_paths {
                if skipping {
                    if Some(p.as_path()) == skip_past {
                        skipping = false;
                    }
                    continue;
                }
                searched.push(p.join(name));
                if let Some(f) = vfs.get_file(Some(p), name) {
                    return Ok((f, searched));
                }
            }
        } else if let Some((framework, header)) = name.split_once('/') {
            for p in &self.framework_paths {
                let candidate =
                    p.join(format!("{framework}.framework")).join("Headers").join(header);
                searched.push(candidate.clone());
                if let Some(f) = vfs.get_file(Some(candidate.parent().unwrap()), header) {
                    return Ok((f, searched));
                }
            }
        }

        let mut skipping = skip_past.is_some();
        for p in &self.system_paths {
            if skipping {
                if Some(p.as_path()) == skip_past {
                    skipping = false;
                }
                continue;
            }
            searched.push(p.join(name));
            if let Some(f) = vfs.get_file(Some(p), name) {
                return Ok((f, searched));
            }
        }

        Err(searched)
    }

    pub fn not_found_error(name: &str, searched: Vec<PathBuf>) -> Error {
        Error::Include {
            name: name.to_string(),
            searched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::rc::Rc;

    struct MemFile {
        path: PathBuf,
        contents: Rc<String>,
    }

    impl VirtualFile for MemFile {
        fn path(&self) -> &Path {
            &self.path
        }
        fn is_file(&self) -> bool {
            true
        }
        fn parent(&self) -> Option<PathBuf> {
            self.path.parent().map(|p| p.to_path_buf())
        }
        fn read_to_lexer(&self) -> Result<Lexer> {
            Ok(Lexer::new((*self.contents).clone()))
        }
    }

    struct MemFs {
        files: HashMap<PathBuf, String>,
    }

    impl VirtualFileSystem for MemFs {
        fn get_file(&self, dir: Option<&Path>, name: &str) -> Option<Box<dyn VirtualFile>> {
            let path = match dir {
                Some(d) => d.join(name),
                None => PathBuf::from(name),
            };
            self.files.get(&path).map(|c| {
                Box::new(MemFile {
                    path,
                    contents: Rc::new(c.clone()),
                }) as Box<dyn VirtualFile>
            })
        }
    }

    #[test]
    fn resolves_quoted_in_current_dir_first() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/src/foo.h"), "".to_string());
        let fs = MemFs { files };
        let resolver = IncludeResolver::new();
        let res = resolver.resolve(&fs, "foo.h", true, Some(Path::new("/src")), None);
        assert!(res.is_ok());
    }

    #[test]
    fn falls_back_to_system_path() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/usr/include/foo.h"), "".to_string());
        let fs = MemFs { files };
        let mut resolver = IncludeResolver::new();
        resolver.system_paths.push(PathBuf::from("/usr/include"));
        let res = resolver.resolve(&fs, "foo.h", false, None, None);
        assert!(res.is_ok());
    }

    #[test]
    fn reports_full_search_list_on_miss() {
        let fs = MemFs {
            files: HashMap::new(),
        };
        let mut resolver = IncludeResolver::new();
        resolver.system_paths.push(PathBuf::from("/usr/include"));
        let err = resolver
            .resolve(&fs, "missing.h", false, None, None)
            .unwrap_err();
        assert_eq!(err, vec![PathBuf::from("/usr/include/missing.h")]);
    }

    #[test]
    fn pragma_once_idempotent() {
        let mut resolver = IncludeResolver::new();
        let p = PathBuf::from("/a.h");
        assert!(resolver.mark_pragma_once(&p));
        assert!(!resolver.mark_pragma_once(&p));
        assert!(resolver.already_seen_once(&p));
    }

    #[test]
    fn absolute_path_resolves_directly() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/abs/foo.h"), "".to_string());
        let fs = MemFs { files };
        let resolver = IncludeResolver::new();
        assert!(resolver.resolve(&fs, "/abs/foo.h", true, None, None).is_ok());
    }
}
