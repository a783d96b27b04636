//! Strategy graph compilation and per-bar evaluation.
//!
//! [`compile`] validates a [`StrategyGraph`] once, before any bar is replayed:
//! - node ids are unique and every edge names known nodes
//! - conditions have no inputs, actions have exactly one input and no outputs
//! - NOT takes one input, AND/OR take two
//! - the graph is acyclic and every action traces back to a condition
//! - indicator parameters and fields are compatible with the operator
//!
//! Actions wired to several inputs are first rewritten by [`normalize`] into an
//! explicit chain of OR nodes, so evaluation never has an implicit combinator.
//!
//! # Evaluation Semantics
//!
//! - `<`, `>`, `<=`, `>=`: raw indicator field against the threshold
//! - `above`/`below`: on price-overlay fields (SMA, VWAP, Bollinger bands) the
//!   close's fractional deviation `(close - v) / v` against `+thr` / `-thr`;
//!   elsewhere the field value against the threshold
//! - `crossover`/`crossunder`: the same quantity moving through the bound
//!   between the previous bar and this one; `false` when the previous bar has
//!   no value
//! - `breakout`: overlay fields only; the lower band breaks downward
//!   (`dev < -thr`), every other edge breaks upward (`dev > thr`)
//! - A condition whose indicator has no value at the bar is undefined, not
//!   `false`. Logic is three-valued: AND is false if any input is false, OR
//!   is true if any input is true, NOT of undefined stays undefined. An
//!   action fires only on a defined `true`, so one slow indicator silences
//!   its own branch and nothing else.
//! - When both a buy and a sell action fire, sell wins

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::domain::error::FlowError;
use crate::domain::graph::{
    ActionKind, Condition, ConditionOperator, Edge, LogicOp, Node, NodeKind, Signal,
    StrategyGraph,
};
use crate::domain::indicator::{IndicatorField, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

#[derive(Debug, Clone, PartialEq)]
enum CompiledNode {
    Condition(Condition),
    Logic { op: LogicOp, inputs: Vec<usize> },
    Action { kind: ActionKind, input: usize },
}

/// A validated graph in topological order, ready for per-bar evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    nodes: Vec<CompiledNode>,
    ids: Vec<String>,
    indicators: Vec<IndicatorType>,
}

impl CompiledGraph {
    /// Distinct indicators the graph reads.
    pub fn indicators(&self) -> &[IndicatorType] {
        &self.indicators
    }

    /// Node ids in evaluation order.
    pub fn evaluation_order(&self) -> &[String] {
        &self.ids
    }

    /// Signal produced at `index`.
    pub fn evaluate(
        &self,
        bars: &[PriceBar],
        indicators: &HashMap<IndicatorType, IndicatorSeries>,
        index: usize,
    ) -> Signal {
        let mut values: Vec<Option<bool>> = vec![None; self.nodes.len()];
        let mut buy = false;
        let mut sell = false;

        for (slot, node) in self.nodes.iter().enumerate() {
            let value = match node {
                CompiledNode::Condition(c) => evaluate_condition(c, bars, indicators, index),
                CompiledNode::Logic { op, inputs } => {
                    let mut ins = inputs.iter().map(|&i| values[i]);
                    match op {
                        LogicOp::And => combine(&mut ins, false),
                        LogicOp::Or => combine(&mut ins, true),
                        LogicOp::Not => values[inputs[0]].map(|v| !v),
                    }
                }
                CompiledNode::Action { kind, input } => {
                    let fired = values[*input] == Some(true);
                    if fired {
                        match kind {
                            ActionKind::Buy => buy = true,
                            ActionKind::Sell => sell = true,
                            ActionKind::Hold => {}
                        }
                    }
                    Some(fired)
                }
            };
            values[slot] = value;
        }

        if sell {
            Signal::Sell
        } else if buy {
            Signal::Buy
        } else {
            Signal::None
        }
    }
}

/// Kleene combination: `dominant` wins outright, otherwise any undefined
/// input leaves the result undefined.
fn combine(inputs: &mut dyn Iterator<Item = Option<bool>>, dominant: bool) -> Option<bool> {
    let mut undefined = false;
    for input in inputs {
        match input {
            Some(v) if v == dominant => return Some(dominant),
            Some(_) => {}
            None => undefined = true,
        }
    }
    if undefined { None } else { Some(!dominant) }
}

/// Rewrite every action with more than one input so that it reads from a
/// synthesised OR chain (`<action>__or1`, `<action>__or2`, ...).
pub fn normalize(graph: &StrategyGraph) -> StrategyGraph {
    let mut out = StrategyGraph {
        nodes: graph.nodes.clone(),
        edges: Vec::with_capacity(graph.edges.len()),
    };

    let multi_input_actions: Vec<&str> = graph
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Action(_)))
        .map(|n| n.id.as_str())
        .filter(|id| graph.inputs_of(id).len() > 1)
        .collect();

    out.edges.extend(
        graph
            .edges
            .iter()
            .filter(|e| !multi_input_actions.contains(&e.target.as_str()))
            .cloned(),
    );

    for action in multi_input_actions {
        let inputs = graph.inputs_of(action);
        let mut acc = inputs[0].to_string();
        for (n, next) in inputs[1..].iter().enumerate() {
            let or_id = format!("{}__or{}", action, n + 1);
            out.nodes.push(Node {
                id: or_id.clone(),
                kind: NodeKind::Logic(LogicOp::Or),
            });
            out.edges.push(Edge {
                source: acc,
                target: or_id.clone(),
            });
            out.edges.push(Edge {
                source: next.to_string(),
                target: or_id.clone(),
            });
            acc = or_id;
        }
        debug!(
            action,
            inputs = inputs.len(),
            "synthesised OR chain for multi-input action"
        );
        out.edges.push(Edge {
            source: acc,
            target: action.to_string(),
        });
    }

    out
}

/// Validate and compile `graph` for evaluation.
pub fn compile(graph: &StrategyGraph) -> Result<CompiledGraph, FlowError> {
    check_references(graph)?;
    let graph = normalize(graph);
    check_references(&graph)?;

    for node in &graph.nodes {
        if let NodeKind::Condition(c) = &node.kind {
            check_condition(&node.id, c)?;
        }
    }
    check_arity(&graph)?;

    let order = topological_order(&graph)?;
    check_actions_reachable(&graph)?;

    let slot: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, &n)| (graph.nodes[n].id.as_str(), i))
        .collect();

    let mut nodes = Vec::with_capacity(order.len());
    let mut ids = Vec::with_capacity(order.len());
    for &n in &order {
        let node = &graph.nodes[n];
        let inputs: Vec<usize> = graph
            .inputs_of(&node.id)
            .iter()
            .map(|id| slot[id])
            .collect();
        let compiled = match &node.kind {
            NodeKind::Condition(c) => CompiledNode::Condition(c.clone()),
            NodeKind::Logic(op) => CompiledNode::Logic { op: *op, inputs },
            NodeKind::Action(kind) => CompiledNode::Action {
                kind: *kind,
                input: inputs[0],
            },
        };
        nodes.push(compiled);
        ids.push(node.id.clone());
    }

    Ok(CompiledGraph {
        nodes,
        ids,
        indicators: graph.indicators(),
    })
}

fn check_references(graph: &StrategyGraph) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if node.id.is_empty() {
            return Err(FlowError::graph("node id must not be empty"));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(FlowError::graph(format!("duplicate node id '{}'", node.id)));
        }
    }

    let mut edges = HashSet::new();
    for edge in &graph.edges {
        for end in [&edge.source, &edge.target] {
            if !seen.contains(end.as_str()) {
                return Err(FlowError::graph(format!(
                    "edge {} -> {} references unknown node '{}'",
                    edge.source, edge.target, end
                )));
            }
        }
        if edge.source == edge.target {
            return Err(FlowError::graph(format!(
                "cycle detected: node '{}' feeds itself",
                edge.source
            )));
        }
        if !edges.insert((edge.source.as_str(), edge.target.as_str())) {
            return Err(FlowError::graph(format!(
                "duplicate edge {} -> {}",
                edge.source, edge.target
            )));
        }
    }
    Ok(())
}

fn check_condition(id: &str, condition: &Condition) -> Result<(), FlowError> {
    condition
        .indicator
        .validate()
        .map_err(|e| FlowError::graph(format!("condition '{}': {}", id, e)))?;

    if !condition.indicator.supports_field(condition.field) {
        return Err(FlowError::graph(format!(
            "condition '{}': {} has no field {:?}",
            id, condition.indicator, condition.field
        )));
    }
    if condition.operator == ConditionOperator::Breakout
        && !condition.indicator.is_price_overlay(condition.field)
    {
        return Err(FlowError::graph(format!(
            "condition '{}': breakout needs a price band or average, not {}",
            id, condition.indicator
        )));
    }
    if !condition.threshold.is_finite() {
        return Err(FlowError::graph(format!(
            "condition '{}': threshold must be finite",
            id
        )));
    }
    Ok(())
}

fn check_arity(graph: &StrategyGraph) -> Result<(), FlowError> {
    let mut actions = 0;
    for node in &graph.nodes {
        let inputs = graph.inputs_of(&node.id).len();
        match &node.kind {
            NodeKind::Condition(_) => {
                if inputs > 0 {
                    return Err(FlowError::graph(format!(
                        "condition '{}' cannot have inputs",
                        node.id
                    )));
                }
                if !graph.edges.iter().any(|e| e.source == node.id) {
                    debug!(node = %node.id, "condition feeds no other node");
                }
            }
            NodeKind::Logic(op) => {
                if inputs != op.arity() {
                    return Err(FlowError::graph(format!(
                        "{:?} node '{}' needs {} input(s), has {}",
                        op,
                        node.id,
                        op.arity(),
                        inputs
                    )));
                }
            }
            NodeKind::Action(_) => {
                actions += 1;
                if inputs == 0 {
                    return Err(FlowError::graph(format!(
                        "action '{}' is disconnected",
                        node.id
                    )));
                }
                if graph.edges.iter().any(|e| e.source == node.id) {
                    return Err(FlowError::graph(format!(
                        "action '{}' cannot feed other nodes",
                        node.id
                    )));
                }
            }
        }
    }
    if actions == 0 {
        return Err(FlowError::graph("graph has no action node"));
    }
    Ok(())
}

/// Kahn's algorithm; ties resolved by node order so compilation is stable.
fn topological_order(graph: &StrategyGraph) -> Result<Vec<usize>, FlowError> {
    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; graph.nodes.len()];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    for edge in &graph.edges {
        let s = index[edge.source.as_str()];
        let t = index[edge.target.as_str()];
        in_degree[t] += 1;
        outgoing[s].push(t);
    }

    let mut queue: VecDeque<usize> = (0..graph.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(n) = queue.pop_front() {
        order.push(n);
        for &t in &outgoing[n] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                queue.push_back(t);
            }
        }
    }

    if order.len() != graph.nodes.len() {
        let stuck: Vec<&str> = (0..graph.nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| graph.nodes[i].id.as_str())
            .collect();
        return Err(FlowError::graph(format!(
            "cycle detected among nodes: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

fn check_actions_reachable(graph: &StrategyGraph) -> Result<(), FlowError> {
    for node in &graph.nodes {
        if !matches!(node.kind, NodeKind::Action(_)) {
            continue;
        }
        let mut stack = graph.inputs_of(&node.id);
        let mut visited = HashSet::new();
        let mut reached = false;
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            match graph.node(id).map(|n| &n.kind) {
                Some(NodeKind::Condition(_)) => {
                    reached = true;
                    break;
                }
                Some(NodeKind::Logic(_)) => stack.extend(graph.inputs_of(id)),
                _ => {}
            }
        }
        if !reached {
            return Err(FlowError::graph(format!(
                "action '{}' is not reachable from any condition",
                node.id
            )));
        }
    }
    Ok(())
}

/// Quantity compared against the threshold by above/below/cross operators.
fn level(
    condition: &Condition,
    bars: &[PriceBar],
    series: &IndicatorSeries,
    index: usize,
) -> Option<f64> {
    let value = series.field_at(index, condition.field)?;
    if condition.indicator.is_price_overlay(condition.field) {
        if value == 0.0 {
            return None;
        }
        Some((bars[index].close - value) / value)
    } else {
        Some(value)
    }
}

fn evaluate_condition(
    condition: &Condition,
    bars: &[PriceBar],
    indicators: &HashMap<IndicatorType, IndicatorSeries>,
    index: usize,
) -> Option<bool> {
    let series = indicators.get(&condition.indicator)?;
    if index >= bars.len() {
        return None;
    }

    let overlay = condition.indicator.is_price_overlay(condition.field);
    let thr = condition.threshold;
    let lower_bound = if overlay { -thr } else { thr };

    let fired = match condition.operator {
        ConditionOperator::Lt
        | ConditionOperator::Gt
        | ConditionOperator::Le
        | ConditionOperator::Ge => {
            let value = series.field_at(index, condition.field)?;
            match condition.operator {
                ConditionOperator::Lt => value < thr,
                ConditionOperator::Gt => value > thr,
                ConditionOperator::Le => value <= thr,
                _ => value >= thr,
            }
        }
        ConditionOperator::Above => level(condition, bars, series, index)? > thr,
        ConditionOperator::Below => level(condition, bars, series, index)? < lower_bound,
        ConditionOperator::CrossOver | ConditionOperator::CrossUnder => {
            let curr = level(condition, bars, series, index)?;
            // no previous value: the first evaluable bar cannot cross
            let Some(prev) = index
                .checked_sub(1)
                .and_then(|p| level(condition, bars, series, p))
            else {
                return Some(false);
            };
            if condition.operator == ConditionOperator::CrossOver {
                prev <= thr && curr > thr
            } else {
                prev >= lower_bound && curr < lower_bound
            }
        }
        ConditionOperator::Breakout => {
            let dev = level(condition, bars, series, index)?;
            if condition.field == IndicatorField::BollingerLower {
                dev < -thr
            } else {
                dev > thr
            }
        }
    };
    Some(fired)
}
