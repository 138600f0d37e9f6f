//! Source → compiled output cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Remembers where each source file was last compiled to.
///
/// One entry per source path. Entries are only ever added or overwritten and
/// live as long as the cache does.
#[derive(Debug, Default)]
pub struct CompilationCache {
    entries: HashMap<PathBuf, PathBuf>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &Path) -> Option<&Path> {
        self.entries.get(source).map(PathBuf::as_path)
    }

    /// Records `output` for `source`, returning the output it replaced.
    pub fn insert(&mut self, source: PathBuf, output: PathBuf) -> Option<PathBuf> {
        self.entries.insert(source, output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites_same_key() {
        let mut cache = CompilationCache::new();
        assert!(cache.is_empty());

        let source = PathBuf::from("/p/a.ts");
        assert_eq!(cache.insert(source.clone(), "/p/out/a.js".into()), None);
        assert_eq!(
            cache.insert(source.clone(), "/p/out2/a.js".into()),
            Some(PathBuf::from("/p/out/a.js"))
        );

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&source), Some(Path::new("/p/out2/a.js")));
        assert_eq!(cache.get(Path::new("/p/b.ts")), None);
    }
}
