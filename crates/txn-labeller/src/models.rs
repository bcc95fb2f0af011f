//! Label rule data model.
//!
//! Rules are validated when they are built: patterns are compiled once,
//! case-insensitively, and blank labels or action routes are rejected. A
//! document that fails validation never becomes a snapshot.

use crate::errors::MappingError;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::sync::Arc;

/// A regex tested against the request path and the label it yields.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PathMappingDocument")]
pub struct PathMapping {
    pattern: Regex,
    label: String,
}

#[derive(Deserialize)]
struct PathMappingDocument {
    pattern: String,
    label: String,
}

impl TryFrom<PathMappingDocument> for PathMapping {
    type Error = MappingError;

    fn try_from(doc: PathMappingDocument) -> Result<Self, Self::Error> {
        PathMapping::new(&doc.pattern, doc.label)
    }
}

impl PathMapping {
    /// Compile `pattern` case-insensitively and pair it with `label`.
    ///
    /// # Errors
    ///
    /// `InvalidPattern` if the regex does not compile, `BlankLabel` if the
    /// label is empty or whitespace.
    pub fn new(pattern: &str, label: impl Into<String>) -> Result<Self, MappingError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(MappingError::BlankLabel(pattern.to_string()));
        }

        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| MappingError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self { pattern, label })
    }

    /// The pattern as written in the document.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Unanchored search; anchors must be written into the pattern.
    #[must_use]
    pub fn is_match(&self, request_path: &str) -> bool {
        self.pattern.is_match(request_path)
    }
}

/// Path mappings for one `controller/action` route.
///
/// An action may be overloaded, so several request shapes share one route;
/// `path_mappings` tells them apart. Order is significant: first match wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ActionMappingDocument")]
pub struct ActionMapping {
    action_route: String,
    path_mappings: Vec<PathMapping>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionMappingDocument {
    action_route: String,
    #[serde(default)]
    path_mappings: Option<Vec<PathMapping>>,
}

impl TryFrom<ActionMappingDocument> for ActionMapping {
    type Error = MappingError;

    fn try_from(doc: ActionMappingDocument) -> Result<Self, Self::Error> {
        ActionMapping::new(doc.action_route, doc.path_mappings.unwrap_or_default())
    }
}

impl ActionMapping {
    /// # Errors
    ///
    /// `BlankActionRoute` if `action_route` is empty or whitespace.
    pub fn new(
        action_route: impl Into<String>,
        path_mappings: Vec<PathMapping>,
    ) -> Result<Self, MappingError> {
        let action_route = action_route.into();
        if action_route.trim().is_empty() {
            return Err(MappingError::BlankActionRoute);
        }

        Ok(Self {
            action_route,
            path_mappings,
        })
    }

    #[must_use]
    pub fn action_route(&self) -> &str {
        &self.action_route
    }

    #[must_use]
    pub fn path_mappings(&self) -> &[PathMapping] {
        &self.path_mappings
    }

    /// Case-insensitive comparison of the route against a `controller/action` key.
    #[must_use]
    pub fn matches_route(&self, route_key: &str) -> bool {
        eq_ignore_case(&self.action_route, route_key)
    }

    /// Label of the first path mapping that matches `request_path`.
    #[must_use]
    pub fn label_for(&self, request_path: &str) -> Option<&str> {
        self.path_mappings
            .iter()
            .find(|mapping| mapping.is_match(request_path))
            .map(PathMapping::label)
    }
}

/// An immutable, ordered set of action mappings.
///
/// Cloning is cheap (the rules are behind an `Arc`). A published snapshot is
/// never modified; updates build a new one.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    rules: Arc<[ActionMapping]>,
}

impl Default for RuleSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<ActionMapping>> for RuleSnapshot {
    fn from(rules: Vec<ActionMapping>) -> Self {
        Self::new(rules)
    }
}

impl RuleSnapshot {
    #[must_use]
    pub fn new(rules: Vec<ActionMapping>) -> Self {
        Self {
            rules: Arc::from(rules),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Parse a mapping document (a JSON array of action mappings).
    ///
    /// A literal `null` document is treated as no rules.
    ///
    /// # Errors
    ///
    /// `Json` if the document is malformed or any rule fails validation.
    pub fn from_json(json: &str) -> Result<Self, MappingError> {
        let rules: Option<Vec<ActionMapping>> = serde_json::from_str(json)?;
        Ok(Self::new(rules.unwrap_or_default()))
    }

    #[must_use]
    pub fn rules(&self) -> &[ActionMapping] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule, in snapshot order, whose route equals `controller/action`.
    #[must_use]
    pub fn find_rule(&self, controller: &str, action: &str) -> Option<&ActionMapping> {
        let route_key = format!("{controller}/{action}");
        self.rules.iter().find(|rule| rule.matches_route(&route_key))
    }

    /// Label for the request, or `None` when no rule or pattern applies.
    ///
    /// A matched route whose patterns all miss yields `None` as well; there is
    /// no route-level default label.
    #[must_use]
    pub fn label_for(&self, controller: &str, action: &str, request_path: &str) -> Option<&str> {
        self.find_rule(controller, action)
            .and_then(|rule| rule.label_for(request_path))
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
