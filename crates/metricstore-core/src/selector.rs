//! A [`Selector`] names a node in the metric tree: an ordered path such as
//! `[cluster, host, socket0, core12]`. By convention the first two levels
//! below the root are `cluster` and `host`; deeper levels encode topology.

/// An ordered path of tree-edge labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Selector(Vec<String>);

impl Selector {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(parts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, part: impl Into<String>) {
        self.0.push(part.into());
    }

    pub fn child(&self, part: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.push(part);
        new
    }

    /// The `(cluster, host)` prefix, if this selector has at least two parts.
    pub fn cluster_host(&self) -> Option<(&str, &str)> {
        match (self.0.first(), self.0.get(1)) {
            (Some(c), Some(h)) => Some((c.as_str(), h.as_str())),
            _ => None,
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Selector {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_host_extraction() {
        let sel = Selector::new(["fritz", "n1337", "socket0", "core12"]);
        assert_eq!(sel.cluster_host(), Some(("fritz", "n1337")));
        assert_eq!(sel.depth(), 4);
    }

    #[test]
    fn root_has_no_cluster_host() {
        assert_eq!(Selector::root().cluster_host(), None);
    }
}
