//! A glob set that unconditionally matches when no patterns were given —
//! an empty `inputs`/`include` list means "everything is an input".

use globset::{Glob, GlobSet, GlobSetBuilder};

pub struct InclusiveEmptyGlobSet(Option<GlobSet>);

impl InclusiveEmptyGlobSet {
    pub fn new(patterns: &[Glob]) -> Result<Self, globset::Error> {
        if patterns.is_empty() {
            return Ok(Self(None));
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(pattern.clone());
        }
        Ok(Self(Some(builder.build()?)))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.0.as_ref().map_or(true, |set| set.is_match(path))
    }
}
