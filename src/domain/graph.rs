//! Strategy graph data structures.
//!
//! A strategy graph is a set of nodes joined by directed edges:
//! - `Condition`: one indicator field compared against a threshold
//! - `Logic`: AND/OR over two inputs, NOT over one
//! - `Action`: buy, sell or hold, fired when its single input is true
//!
//! Structural checks (acyclicity, arity, reachability) live in
//! [`graph_eval`](crate::domain::graph_eval), which compiles a graph once before
//! a run.

use std::fmt;

use crate::domain::indicator::{IndicatorField, IndicatorType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Lt,
    Gt,
    Le,
    Ge,
    Above,
    Below,
    CrossOver,
    CrossUnder,
    Breakout,
}

impl ConditionOperator {
    /// Operators that need the previous bar's value.
    pub fn needs_previous(&self) -> bool {
        matches!(self, ConditionOperator::CrossOver | ConditionOperator::CrossUnder)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionOperator::Lt => "<",
            ConditionOperator::Gt => ">",
            ConditionOperator::Le => "<=",
            ConditionOperator::Ge => ">=",
            ConditionOperator::Above => "above",
            ConditionOperator::Below => "below",
            ConditionOperator::CrossOver => "crossover",
            ConditionOperator::CrossUnder => "crossunder",
            ConditionOperator::Breakout => "breakout",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub indicator: IndicatorType,
    pub field: IndicatorField,
    pub operator: ConditionOperator,
    pub threshold: f64,
}

impl Condition {
    /// Condition on the indicator's default field.
    pub fn new(indicator: IndicatorType, operator: ConditionOperator, threshold: f64) -> Self {
        Self {
            indicator,
            field: indicator.default_field(),
            operator,
            threshold,
        }
    }

    pub fn with_field(mut self, field: IndicatorField) -> Self {
        self.field = field;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
    Not,
}

impl LogicOp {
    pub fn arity(&self) -> usize {
        match self {
            LogicOp::Not => 1,
            LogicOp::And | LogicOp::Or => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Condition(Condition),
    Logic(LogicOp),
    Action(ActionKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Per-bar output of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    None,
    Buy,
    Sell,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl StrategyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, id: &str, condition: Condition) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeKind::Condition(condition),
        });
        self
    }

    pub fn logic(mut self, id: &str, op: LogicOp) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeKind::Logic(op),
        });
        self
    }

    pub fn action(mut self, id: &str, action: ActionKind) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeKind::Action(action),
        });
        self
    }

    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Sources of edges ending at `id`, in edge order.
    pub fn inputs_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Distinct indicators referenced by condition nodes, in node order.
    pub fn indicators(&self) -> Vec<IndicatorType> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if let NodeKind::Condition(c) = &node.kind {
                if !out.contains(&c.indicator) {
                    out.push(c.indicator);
                }
            }
        }
        out
    }
}
