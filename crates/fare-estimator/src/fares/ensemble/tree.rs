use serde::{Deserialize, Serialize};

/// Node of a regression tree. Samples with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Nodes are stored in pre-order; children always sit after their parent,
/// which keeps traversal bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                }
                None => break,
            }
        }
        0.0
    }

    pub fn validate(&self, feature_count: usize) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(TreeError::NonFinite { node: index });
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= feature_count {
                        return Err(TreeError::UnknownFeature {
                            node: index,
                            feature: *feature,
                        });
                    }
                    if !threshold.is_finite() {
                        return Err(TreeError::NonFinite { node: index });
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(TreeError::BadChild { node: index, child });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,
    #[error("node {node} splits on unknown feature {feature}")]
    UnknownFeature { node: usize, feature: usize },
    #[error("node {node} points at invalid child {child}")]
    BadChild { node: usize, child: usize },
    #[error("node {node} holds a non-finite value")]
    NonFinite { node: usize },
}
