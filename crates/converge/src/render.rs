//! Rendering target - serializes a plan into a declarative resource document
//!
//! The document follows the JSON form of resource-template languages:
//!
//! ```json
//! {
//!   "resource": {
//!     "nodeup_file": {
//!       "file__etc_sysconfig_containerd": {
//!         "path": "/etc/sysconfig/containerd",
//!         "depends_on": ["nodeup_file.file__etc_containerd"]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Every map is ordered, so the same plan always renders to the same bytes.

use crate::error::{BuildError, RenderError};
use crate::planner::ExecutionPlan;
use crate::run::{RunPhase, Target};
use crate::types::TaskId;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Prefix for every rendered resource type
pub const RESOURCE_PREFIX: &str = "nodeup";

/// A property value in a rendered resource
#[derive(Debug, Clone, PartialEq)]
pub enum RenderValue {
    /// Inline value
    Literal(Value),
    /// Symbolic reference to an attribute of another task's resource
    Reference { task: TaskId, attribute: String },
}

/// Declarative form of one task
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResource {
    pub kind: String,
    pub properties: BTreeMap<String, RenderValue>,
}

/// A rendered resource document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedDocument {
    resource: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
}

impl RenderedDocument {
    /// Pretty-printed JSON with a trailing newline
    pub fn to_json(&self) -> Result<String, RenderError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Number of resources in the document
    pub fn len(&self) -> usize {
        self.resource.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a resource by type and identifier
    pub fn get(&self, resource_type: &str, identifier: &str) -> Option<&BTreeMap<String, Value>> {
        self.resource.get(resource_type)?.get(identifier)
    }
}

/// Target that renders instead of applying
#[derive(Debug, Default)]
pub struct RenderTarget;

impl Target for RenderTarget {
    type Output = RenderedDocument;

    fn phase(&self) -> RunPhase {
        RunPhase::Rendering
    }

    fn run(&mut self, plan: &ExecutionPlan) -> Result<RenderedDocument, BuildError> {
        Ok(render(plan)?)
    }
}

/// Resource type for a task kind: `PackageManager` becomes `nodeup_package_manager`
pub fn resource_type(kind: &str) -> String {
    let mut out = String::from(RESOURCE_PREFIX);
    out.push('_');
    let mut prev_lower = false;
    for c in kind.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            out.push('_');
            prev_lower = false;
        }
    }
    out
}

/// Identifier-safe token for a task identity
///
/// The kind is lowercased and prefixed; every character of the name outside
/// `[A-Za-z0-9_-]` becomes `_`.
pub fn resource_identifier(id: &TaskId) -> String {
    let name: String = id
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", id.kind.to_ascii_lowercase(), name)
}

/// Fully qualified address `type.identifier` of a task rendered as `kind`
pub fn resource_address(kind: &str, id: &TaskId) -> String {
    format!("{}.{}", resource_type(kind), resource_identifier(id))
}

/// Render every task in the plan
///
/// Pure: reads only task desired state and plan edges. Any task that cannot
/// be rendered aborts the whole render.
pub fn render(plan: &ExecutionPlan) -> Result<RenderedDocument, RenderError> {
    let nodes = plan.nodes();
    let mut resources = Vec::with_capacity(nodes.len());
    let mut addresses: HashMap<&TaskId, String> = HashMap::new();
    let mut claimed: HashMap<String, &TaskId> = HashMap::new();

    // Addresses come from the rendered kind, which is where the resource lands.
    for node in nodes {
        let rendered = node.task.render()?;
        let address = resource_address(&rendered.kind, &node.id);
        if let Some(first) = claimed.get(&address) {
            return Err(RenderError::IdentifierCollision {
                identifier: address,
                first: (*first).clone(),
                second: node.id.clone(),
            });
        }
        claimed.insert(address.clone(), &node.id);
        addresses.insert(&node.id, address);
        resources.push(rendered);
    }

    let mut doc = RenderedDocument::default();

    for (node, rendered) in nodes.iter().zip(resources) {
        let mut body: BTreeMap<String, Value> = BTreeMap::new();

        for (key, value) in rendered.properties {
            let value = match value {
                RenderValue::Literal(v) => v,
                RenderValue::Reference { task, attribute } => {
                    let Some(address) = addresses.get(&task) else {
                        return Err(RenderError::UnresolvedReference {
                            id: node.id.clone(),
                            target: task,
                        });
                    };
                    Value::String(format!("${{{address}.{attribute}}}"))
                }
            };
            body.insert(key, value);
        }

        let depends_on: BTreeSet<&str> = node
            .prerequisites
            .iter()
            .filter_map(|&p| addresses.get(&nodes[p].id).map(String::as_str))
            .collect();
        if !depends_on.is_empty() {
            body.insert(
                "depends_on".to_string(),
                Value::Array(depends_on.into_iter().map(Value::from).collect()),
            );
        }

        doc.resource
            .entry(resource_type(&rendered.kind))
            .or_default()
            .insert(resource_identifier(&node.id), body);
    }

    Ok(doc)
}
