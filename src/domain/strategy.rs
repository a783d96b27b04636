//! Strategy definition: a condition graph or a grid parameter set.

use crate::domain::error::FlowError;
use crate::domain::graph::StrategyGraph;
use crate::domain::grid::GridParams;
use crate::domain::indicator::IndicatorType;

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Graph(StrategyGraph),
    Grid(GridParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub kind: StrategyKind,
}

impl Strategy {
    pub fn graph(name: impl Into<String>, graph: StrategyGraph) -> Self {
        Strategy {
            name: name.into(),
            kind: StrategyKind::Graph(graph),
        }
    }

    pub fn grid(name: impl Into<String>, params: GridParams) -> Self {
        Strategy {
            name: name.into(),
            kind: StrategyKind::Grid(params),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StrategyKind::Graph(_) => "graph",
            StrategyKind::Grid(_) => "grid",
        }
    }

    /// Indicators a graph strategy reads. Grid filters are resolved by the
    /// grid engine itself.
    pub fn indicators(&self) -> Vec<IndicatorType> {
        match &self.kind {
            StrategyKind::Graph(g) => g.indicators(),
            StrategyKind::Grid(_) => Vec::new(),
        }
    }

    /// Structural checks that do not need price data.
    pub fn validate(&self) -> Result<(), FlowError> {
        match &self.kind {
            StrategyKind::Graph(g) => crate::domain::graph_eval::compile(g).map(|_| ()),
            StrategyKind::Grid(p) => p.validate(),
        }
    }
}
