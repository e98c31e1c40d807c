use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;

// ---------------------------------------------------------------------------
// Compiled-pattern cache
// ---------------------------------------------------------------------------

/// Memoizes compiled filter patterns by their source text.
///
/// Both engines resolve patterns through one shared instance, injected at
/// construction. The key space is bounded: configured rule patterns plus the
/// escaped extension-derived patterns, so entries are never evicted.
pub struct PatternCache {
    compiled: Mutex<HashMap<String, Arc<Regex>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self {
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Return the compiled form of `pattern`, compiling it on first use.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        let mut compiled = self.compiled.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(re) = compiled.get(pattern) {
            return Ok(re.clone());
        }
        let re = Arc::new(Regex::new(pattern)?);
        compiled.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.compiled.lock().unwrap().len()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}
