//! Maps a parsed line's tags onto a tree selector.

use metricstore_core::Selector;

use crate::parser::ParsedLine;

/// How a subscription's tags become a selector path.
#[derive(Debug, Clone)]
pub struct TagMapping {
    /// Tag keys in the order they become selector segments.
    pub order: Vec<String>,
    /// The tag key that names the cluster (defaults to `"cluster"`).
    pub cluster_tag: String,
    /// Used as the cluster segment when `cluster_tag` is absent from the
    /// line's tags.
    pub default_cluster: Option<String>,
}

impl TagMapping {
    pub fn new(order: Vec<String>) -> Self {
        Self {
            order,
            cluster_tag: "cluster".to_owned(),
            default_cluster: None,
        }
    }

    pub fn with_cluster_tag(mut self, cluster_tag: impl Into<String>) -> Self {
        self.cluster_tag = cluster_tag.into();
        self
    }

    pub fn with_default_cluster(mut self, default_cluster: impl Into<String>) -> Self {
        self.default_cluster = Some(default_cluster.into());
        self
    }
}

/// Builds the selector path for `line` under `mapping`: each key in
/// `mapping.order` found among the line's tags contributes one segment, in
/// order. If the cluster tag is absent, `default_cluster` fills its slot
/// (if configured); otherwise that segment is simply omitted.
pub fn selector_from_tags(line: &ParsedLine, mapping: &TagMapping) -> Selector {
    let mut parts = Vec::with_capacity(mapping.order.len());
    for key in &mapping.order {
        if let Some((_, value)) = line.tags.iter().find(|(k, _)| k == key) {
            parts.push(value.clone());
        } else if key == &mapping.cluster_tag {
            if let Some(default) = &mapping.default_cluster {
                parts.push(default.clone());
            }
        }
    }
    Selector::new(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    #[test]
    fn maps_tags_in_configured_order() {
        let line = parse_line("power,cluster=fritz,host=n1337 flops=1.0 100").unwrap();
        let mapping = TagMapping::new(vec!["cluster".to_owned(), "host".to_owned()]);
        let sel = selector_from_tags(&line, &mapping);
        assert_eq!(sel.parts(), &["fritz".to_owned(), "n1337".to_owned()]);
    }

    #[test]
    fn fills_in_default_cluster_when_tag_absent() {
        let line = parse_line("power,host=n1337 flops=1.0 100").unwrap();
        let mapping =
            TagMapping::new(vec!["cluster".to_owned(), "host".to_owned()]).with_default_cluster("fritz");
        let sel = selector_from_tags(&line, &mapping);
        assert_eq!(sel.parts(), &["fritz".to_owned(), "n1337".to_owned()]);
    }
}
