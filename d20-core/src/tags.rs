//! Tag metadata shared by links and characters.

use serde::{Deserialize, Serialize};

/// An insertion-ordered set of tag strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag. Returns false if it was already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

/// Something that carries a [`Tags`] set.
pub trait Taggable {
    fn tags(&self) -> &Tags;

    fn tags_mut(&mut self) -> &mut Tags;

    /// Tag with every supplied string, skipping ones already present.
    fn tag<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.tags_mut().insert(tag);
        }
    }

    /// True only if every supplied tag is present.
    fn is_tagged<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter().all(|tag| self.tags().contains(tag.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Thing {
        tags: Tags,
    }

    impl Taggable for Thing {
        fn tags(&self) -> &Tags {
            &self.tags
        }

        fn tags_mut(&mut self) -> &mut Tags {
            &mut self.tags
        }
    }

    #[test]
    fn test_tag_deduplicates() {
        let mut thing = Thing::default();
        thing.tag(["pc", "fighter"]);
        thing.tag(["pc"]);

        assert_eq!(thing.tags().as_slice(), ["pc", "fighter"]);
    }

    #[test]
    fn test_is_tagged_requires_all() {
        let mut thing = Thing::default();
        thing.tag(["pc", "fighter"]);

        assert!(thing.is_tagged(["pc"]));
        assert!(thing.is_tagged(["fighter", "pc"]));
        assert!(!thing.is_tagged(["pc", "wizard"]));
        // Nothing asked for, nothing missing
        assert!(thing.is_tagged(Vec::<&str>::new()));
    }
}
