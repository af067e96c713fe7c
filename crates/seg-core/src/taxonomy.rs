//! Category tree
//!
//! Categories are addressed by qualified name (`Parent/Child/...`). The tree
//! is independent of the relationship graph: segmentations refer to a
//! category by name only, and an unknown name reads as "uncategorized".

use indexmap::IndexMap;

/// Separator between the segments of a qualified name
pub const SEPARATOR: char = '/';

/// Name given to an element created from an empty path
pub const UNSPECIFIED: &str = "Unspecified";

/// Color of top-level elements created without one
pub const DEFAULT_COLOR: &str = "#ff0000";

/// Category tree errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxonomyError {
    /// `a//b` or a trailing separator
    #[error("qualified name `{0}` has an empty segment")]
    EmptySegment(String),

    /// No element under this qualified name
    #[error("unknown category `{0}`")]
    UnknownElement(String),
}

/// One element of the category tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    color: String,
    properties: IndexMap<String, String>,
    children: Vec<Category>,
}

impl Category {
    /// Leaf element
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            properties: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Element name (last segment of its qualified name)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display color
    #[inline]
    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Change the display color
    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    /// Free-form properties in insertion order
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    /// One property
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Set a property, returning the previous value
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    /// Direct children
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Category] {
        &self.children
    }

    /// Direct child by name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Category> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    fn child_or_insert(&mut self, name: &str) -> &mut Category {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(Category::new(name, self.color.clone()));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }
}

/// Category tree keyed by qualified name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    roots: Vec<Category>,
}

impl Taxonomy {
    /// Empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level elements
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[Category] {
        &self.roots
    }

    /// Whether the tree has no elements
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Element by qualified name; the empty name is the root, which is not
    /// an element
    #[must_use]
    pub fn element(&self, qualified: &str) -> Option<&Category> {
        let mut segments = qualified.split(SEPARATOR);
        let first = segments.next().filter(|s| !s.is_empty())?;
        let mut node = self.roots.iter().find(|c| c.name == first)?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Mutable element by qualified name
    pub fn element_mut(&mut self, qualified: &str) -> Option<&mut Category> {
        let mut segments = qualified.split(SEPARATOR);
        let first = segments.next().filter(|s| !s.is_empty())?;
        let mut node = self.roots.iter_mut().find(|c| c.name == first)?;
        for segment in segments {
            node = node.child_mut(segment)?;
        }
        Some(node)
    }

    /// Whether an element exists under `qualified`
    #[inline]
    #[must_use]
    pub fn contains(&self, qualified: &str) -> bool {
        self.element(qualified).is_some()
    }

    /// Element under `qualified`, creating every missing segment
    ///
    /// New elements take their parent's color. An empty name creates (or
    /// returns) the top-level `Unspecified` element.
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::EmptySegment`] for names such as `a//b`.
    pub fn create_element(&mut self, qualified: &str) -> Result<&mut Category, TaxonomyError> {
        let qualified = if qualified.is_empty() { UNSPECIFIED } else { qualified };
        let segments: Vec<&str> = qualified.split(SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TaxonomyError::EmptySegment(qualified.to_string()));
        }

        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| TaxonomyError::EmptySegment(qualified.to_string()))?;
        let index = match self.roots.iter().position(|c| c.name == *first) {
            Some(index) => index,
            None => {
                self.roots.push(Category::new(*first, DEFAULT_COLOR));
                self.roots.len() - 1
            }
        };
        let mut node = &mut self.roots[index];
        for segment in rest {
            node = node.child_or_insert(segment);
        }
        Ok(node)
    }

    /// Detach the element under `qualified` together with its subtree
    ///
    /// # Errors
    ///
    /// [`TaxonomyError::UnknownElement`] if nothing is stored there.
    pub fn remove_element(&mut self, qualified: &str) -> Result<Category, TaxonomyError> {
        let unknown = || TaxonomyError::UnknownElement(qualified.to_string());
        let (siblings, name) = match qualified.rsplit_once(SEPARATOR) {
            Some((parent, name)) => (&mut self.element_mut(parent).ok_or_else(unknown)?.children, name),
            None => (&mut self.roots, qualified),
        };
        let index = siblings.iter().position(|c| c.name == name).ok_or_else(unknown)?;
        Ok(siblings.remove(index))
    }

    /// Every element in depth-first pre-order with its qualified name
    #[must_use]
    pub fn walk(&self) -> Vec<(String, &Category)> {
        fn visit<'a>(prefix: &str, node: &'a Category, out: &mut Vec<(String, &'a Category)>) {
            let qualified = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{prefix}{SEPARATOR}{}", node.name)
            };
            out.push((qualified.clone(), node));
            for child in &node.children {
                visit(&qualified, child, out);
            }
        }

        let mut out = Vec::new();
        for root in &self.roots {
            visit("", root, &mut out);
        }
        out
    }

    /// Add every element of `other` missing from this tree
    ///
    /// Existing elements keep their color; missing properties are copied.
    pub fn merge(&mut self, other: &Taxonomy) {
        for (qualified, incoming) in other.walk() {
            let created = !self.contains(&qualified);
            // Names coming from another tree never hold empty segments.
            let Ok(node) = self.create_element(&qualified) else {
                continue;
            };
            if created {
                node.color = incoming.color.clone();
            }
            for (key, value) in &incoming.properties {
                node.properties.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    /// Fill properties missing from any element with `defaults`
    ///
    /// Returns the qualified names of the repaired elements; reporting them
    /// is left to the caller.
    pub fn repair_properties(&mut self, defaults: &IndexMap<String, String>) -> Vec<String> {
        let names: Vec<String> = self.walk().into_iter().map(|(name, _)| name).collect();
        let mut repaired = Vec::new();
        for qualified in names {
            let Some(node) = self.element_mut(&qualified) else {
                continue;
            };
            let missing: Vec<(&String, &String)> = defaults
                .iter()
                .filter(|(key, _)| !node.properties.contains_key(*key))
                .collect();
            if missing.is_empty() {
                continue;
            }
            for (key, value) in missing {
                tracing::debug!(category = %qualified, property = %key, value = %value, "adding missing property");
                node.properties.insert(key.clone(), value.clone());
            }
            repaired.push(qualified);
        }
        repaired
    }
}
