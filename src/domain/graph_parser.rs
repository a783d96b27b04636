//! Strategy graph text parser.
//!
//! Recursive descent over the small text fields that describe a graph in
//! configuration: indicator specs (`SMA(20)`, `MACD(12,26,9)`,
//! `BOLLINGER(20,2)`), operators, indicator fields and edge lists
//! (`a -> b, b -> c`). Errors carry the character offset of the problem.
//!
//! [`graph_from_config`] assembles a [`StrategyGraph`] from `[node.<id>]`
//! sections and the `[graph] edges` key. Structural validation happens later,
//! in [`graph_eval::compile`](crate::domain::graph_eval::compile).

use crate::domain::error::{FlowError, ParseError};
use crate::domain::graph::{
    ActionKind, Condition, ConditionOperator, Edge, LogicOp, Node, NodeKind, StrategyGraph,
};
use crate::domain::indicator::{IndicatorField, IndicatorType};
use crate::ports::config_port::ConfigPort;

pub const NODE_SECTION_PREFIX: &str = "node.";
pub const GRAPH_SECTION: &str = "graph";

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing input '{}'", self.remaining())))
        }
    }

    /// Identifier made of alphanumerics and underscores.
    fn parse_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            let found = self
                .peek()
                .map(|c| format!("'{}'", c))
                .unwrap_or_else(|| "end of input".to_string());
            return Err(self.error(format!("expected identifier, found {}", found)));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected integer".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<usize>().map_err(|_| ParseError {
            message: format!("invalid integer: {}", num_str),
            position: start,
        })
    }

    fn parse_single_period(&mut self) -> Result<usize, ParseError> {
        self.expect_char('(')?;
        let period = self.parse_integer()?;
        self.expect_char(')')?;
        Ok(period)
    }

    fn parse_indicator(&mut self) -> Result<IndicatorType, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let name = self.parse_identifier()?.to_ascii_uppercase();

        let indicator = match name.as_str() {
            "PRICE" | "CLOSE" => {
                self.skip_whitespace();
                if self.consume_exact("(") {
                    self.expect_char(')')?;
                }
                IndicatorType::Price
            }
            "SMA" | "MA" => IndicatorType::Sma(self.parse_single_period()?),
            "RSI" => IndicatorType::Rsi(self.parse_single_period()?),
            "VWAP" => IndicatorType::Vwap(self.parse_single_period()?),
            "VOLUME_RATIO" | "VOLUME" => IndicatorType::VolumeRatio(self.parse_single_period()?),
            "MACD" => {
                self.expect_char('(')?;
                let fast = self.parse_integer()?;
                self.expect_char(',')?;
                let slow = self.parse_integer()?;
                self.expect_char(',')?;
                let signal = self.parse_integer()?;
                self.expect_char(')')?;
                IndicatorType::Macd { fast, slow, signal }
            }
            "BOLLINGER" | "BOLL" => {
                self.expect_char('(')?;
                let period = self.parse_integer()?;
                self.expect_char(',')?;
                self.skip_whitespace();
                let mult_pos = self.pos;
                let mult = self.parse_number()?;
                if mult <= 0.0 {
                    return Err(ParseError {
                        message: "deviation multiplier must be positive".to_string(),
                        position: mult_pos,
                    });
                }
                let scaled = mult * 100.0;
                if scaled > u32::MAX as f64 || (scaled.round() - scaled).abs() > 1e-6 {
                    return Err(ParseError {
                        message: "deviation multiplier must be a multiple of 0.01".to_string(),
                        position: mult_pos,
                    });
                }
                self.expect_char(')')?;
                IndicatorType::Bollinger {
                    period,
                    stddev_mult_x100: scaled.round() as u32,
                }
            }
            other => {
                return Err(ParseError {
                    message: format!("unknown indicator '{}'", other),
                    position: start,
                });
            }
        };

        Ok(indicator)
    }

    /// `id (-> id)+` chains separated by commas.
    fn parse_edges(&mut self) -> Result<Vec<Edge>, ParseError> {
        let mut edges = Vec::new();
        if self.at_end() {
            return Ok(edges);
        }

        loop {
            let mut source = self.parse_identifier()?;
            let mut hops = 0;
            loop {
                self.skip_whitespace();
                if !self.consume_exact("->") {
                    break;
                }
                let target = self.parse_identifier()?;
                edges.push(Edge {
                    source: source.to_string(),
                    target: target.to_string(),
                });
                source = target;
                hops += 1;
            }
            if hops == 0 {
                return Err(self.error("expected '->'"));
            }

            if self.at_end() {
                break;
            }
            self.expect_char(',')?;
        }

        Ok(edges)
    }
}

/// Parse an indicator expression such as `RSI(14)` or `BOLLINGER(20, 2.5)`.
/// Names are case-insensitive.
pub fn parse_indicator(input: &str) -> Result<IndicatorType, ParseError> {
    let mut parser = Parser::new(input);
    let indicator = parser.parse_indicator()?;
    parser.expect_end()?;
    Ok(indicator)
}

pub fn parse_operator(input: &str) -> Result<ConditionOperator, ParseError> {
    let trimmed = input.trim();
    let op = match trimmed.to_ascii_lowercase().as_str() {
        "<" | "lt" => ConditionOperator::Lt,
        ">" | "gt" => ConditionOperator::Gt,
        "<=" | "le" => ConditionOperator::Le,
        ">=" | "ge" => ConditionOperator::Ge,
        "above" => ConditionOperator::Above,
        "below" => ConditionOperator::Below,
        "crossover" | "cross_over" => ConditionOperator::CrossOver,
        "crossunder" | "cross_under" => ConditionOperator::CrossUnder,
        "breakout" => ConditionOperator::Breakout,
        _ => {
            return Err(ParseError {
                message: format!("unknown operator '{}'", trimmed),
                position: input.len() - input.trim_start().len(),
            });
        }
    };
    Ok(op)
}

pub fn parse_field(input: &str) -> Result<IndicatorField, ParseError> {
    let trimmed = input.trim();
    let field = match trimmed.to_ascii_lowercase().as_str() {
        "value" => IndicatorField::Value,
        "dif" | "macd" => IndicatorField::MacdDif,
        "dea" | "signal" => IndicatorField::MacdDea,
        "hist" | "histogram" => IndicatorField::MacdHist,
        "upper" => IndicatorField::BollingerUpper,
        "middle" | "mid" => IndicatorField::BollingerMiddle,
        "lower" => IndicatorField::BollingerLower,
        "width" => IndicatorField::BollingerWidth,
        _ => {
            return Err(ParseError {
                message: format!("unknown indicator field '{}'", trimmed),
                position: input.len() - input.trim_start().len(),
            });
        }
    };
    Ok(field)
}

pub fn parse_logic(input: &str) -> Result<LogicOp, ParseError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "and" => Ok(LogicOp::And),
        "or" => Ok(LogicOp::Or),
        "not" => Ok(LogicOp::Not),
        other => Err(ParseError {
            message: format!("unknown logic operator '{}'", other),
            position: input.len() - input.trim_start().len(),
        }),
    }
}

pub fn parse_action(input: &str) -> Result<ActionKind, ParseError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "buy" => Ok(ActionKind::Buy),
        "sell" => Ok(ActionKind::Sell),
        "hold" => Ok(ActionKind::Hold),
        other => Err(ParseError {
            message: format!("unknown action '{}'", other),
            position: input.len() - input.trim_start().len(),
        }),
    }
}

/// Parse `a -> b, b -> c` (or the chain form `a -> b -> c`) into edges.
pub fn parse_edges(input: &str) -> Result<Vec<Edge>, ParseError> {
    Parser::new(input).parse_edges()
}

/// Build a graph from `[node.<id>]` sections plus `[graph] edges`.
///
/// Node ids are lowercased and nodes are ordered by id, so the same file
/// always yields the same graph.
pub fn graph_from_config(config: &dyn ConfigPort) -> Result<StrategyGraph, FlowError> {
    let mut sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(NODE_SECTION_PREFIX))
        .collect();
    sections.sort();

    let mut graph = StrategyGraph::new();
    for section in &sections {
        let id = section[NODE_SECTION_PREFIX.len()..].trim();
        if id.is_empty() {
            return Err(FlowError::config_invalid(section, "", "node id is empty"));
        }
        let kind = node_kind_from_config(config, section)?;
        graph.nodes.push(Node {
            id: id.to_ascii_lowercase(),
            kind,
        });
    }

    let edges = config
        .get_string(GRAPH_SECTION, "edges")
        .unwrap_or_default()
        .to_ascii_lowercase();
    graph.edges = parse_edges(&edges)?;

    Ok(graph)
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, FlowError> {
    match config.get_string(section, key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(FlowError::config_missing(section, key)),
    }
}

fn node_kind_from_config(config: &dyn ConfigPort, section: &str) -> Result<NodeKind, FlowError> {
    let kind = required(config, section, "kind")?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "condition" => Ok(NodeKind::Condition(condition_from_config(config, section)?)),
        "logic" => {
            let op = required(config, section, "op")?;
            let op = parse_logic(&op)
                .map_err(|e| FlowError::config_invalid(section, "op", e.message))?;
            Ok(NodeKind::Logic(op))
        }
        "action" => {
            let action = required(config, section, "action")?;
            let action = parse_action(&action)
                .map_err(|e| FlowError::config_invalid(section, "action", e.message))?;
            Ok(NodeKind::Action(action))
        }
        other => Err(FlowError::config_invalid(
            section,
            "kind",
            format!("unknown node kind '{}'", other),
        )),
    }
}

fn condition_from_config(config: &dyn ConfigPort, section: &str) -> Result<Condition, FlowError> {
    let indicator = parse_indicator(&required(config, section, "indicator")?)?;
    let operator = required(config, section, "operator")?;
    let operator = parse_operator(&operator)
        .map_err(|e| FlowError::config_invalid(section, "operator", e.message))?;

    let threshold = match config.get_string(section, "threshold") {
        None => 0.0,
        Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
            FlowError::config_invalid(section, "threshold", format!("'{}' is not a number", raw))
        })?,
    };
    if !threshold.is_finite() {
        return Err(FlowError::config_invalid(
            section,
            "threshold",
            "threshold must be finite",
        ));
    }

    let mut condition = Condition::new(indicator, operator, threshold);
    if let Some(field) = config.get_string(section, "field") {
        let field = parse_field(&field)
            .map_err(|e| FlowError::config_invalid(section, "field", e.message))?;
        condition = condition.with_field(field);
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn parse_simple_indicators() {
        assert_eq!(parse_indicator("SMA(20)").unwrap(), IndicatorType::Sma(20));
        assert_eq!(parse_indicator("rsi( 14 )").unwrap(), IndicatorType::Rsi(14));
        assert_eq!(parse_indicator("VWAP(10)").unwrap(), IndicatorType::Vwap(10));
        assert_eq!(
            parse_indicator("VOLUME_RATIO(5)").unwrap(),
            IndicatorType::VolumeRatio(5)
        );
        assert_eq!(parse_indicator("PRICE").unwrap(), IndicatorType::Price);
        assert_eq!(parse_indicator("price()").unwrap(), IndicatorType::Price);
    }

    #[test]
    fn parse_multi_parameter_indicators() {
        assert_eq!(
            parse_indicator("MACD(12, 26, 9)").unwrap(),
            IndicatorType::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            }
        );
        assert_eq!(
            parse_indicator("BOLLINGER(20,2.5)").unwrap(),
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 250
            }
        );
    }

    #[test]
    fn unknown_indicator_rejected() {
        let err = parse_indicator("KDJ(9)").unwrap_err();
        assert!(err.message.contains("unknown indicator"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn missing_paren_reports_position() {
        let err = parse_indicator("SMA(20").unwrap_err();
        assert_eq!(err.position, 6);
        assert!(err.message.contains("')'"));
    }

    #[test]
    fn trailing_input_rejected() {
        let err = parse_indicator("SMA(20) extra").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn negative_bollinger_multiplier_rejected() {
        let err = parse_indicator("BOLLINGER(20,-2)").unwrap_err();
        assert!(err.message.contains("multiplier"));
    }

    #[test]
    fn bollinger_multiplier_keeps_hundredths() {
        assert_eq!(
            parse_indicator("BOLLINGER(20, 2.5)").unwrap(),
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 250,
            }
        );
        assert_eq!(
            parse_indicator("BOLL(10,1.05)").unwrap(),
            IndicatorType::Bollinger {
                period: 10,
                stddev_mult_x100: 105,
            }
        );
    }

    #[test]
    fn inexact_or_huge_bollinger_multiplier_rejected() {
        let err = parse_indicator("BOLLINGER(20,2.005)").unwrap_err();
        assert!(err.message.contains("0.01"));
        assert_eq!(err.position, 13);

        let err = parse_indicator("BOLLINGER(20,99999999)").unwrap_err();
        assert!(err.message.contains("multiplier"));
    }

    #[test]
    fn parse_operators() {
        assert_eq!(parse_operator("<").unwrap(), ConditionOperator::Lt);
        assert_eq!(parse_operator(" >= ").unwrap(), ConditionOperator::Ge);
        assert_eq!(
            parse_operator("CrossOver").unwrap(),
            ConditionOperator::CrossOver
        );
        assert_eq!(
            parse_operator("breakout").unwrap(),
            ConditionOperator::Breakout
        );
        assert!(parse_operator("~").is_err());
    }

    #[test]
    fn parse_fields() {
        assert_eq!(parse_field("upper").unwrap(), IndicatorField::BollingerUpper);
        assert_eq!(parse_field("DEA").unwrap(), IndicatorField::MacdDea);
        assert!(parse_field("k").is_err());
    }

    #[test]
    fn parse_edge_lists() {
        let edges = parse_edges("a -> b, b -> c").unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source, "a");
        assert_eq!(edges[1].target, "c");

        let chain = parse_edges("a -> b -> c").unwrap();
        assert_eq!(chain, edges);

        assert!(parse_edges("").unwrap().is_empty());
    }

    #[test]
    fn edge_without_arrow_rejected() {
        let err = parse_edges("a b").unwrap_err();
        assert!(err.message.contains("'->'"));
        assert!(parse_edges("a -> ").is_err());
        assert!(parse_edges("a -> b,").is_err());
    }

    #[test]
    fn graph_from_ini() {
        let content = r#"
[strategy]
kind = graph

[node.oversold]
kind = condition
indicator = RSI(14)
operator = <
threshold = 30

[node.band]
kind = condition
indicator = BOLLINGER(20,2)
field = lower
operator = below
threshold = 0.01

[node.both]
kind = logic
op = AND

[node.entry]
kind = action
action = buy

[graph]
edges = oversold -> both, band -> both, both -> entry
"#;
        let config = FileConfigAdapter::from_string(content).unwrap();
        let graph = graph_from_config(&config).unwrap();

        assert_eq!(graph.nodes.len(), 4);
        // sorted by id
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["band", "both", "entry", "oversold"]);
        assert_eq!(graph.edges.len(), 3);

        match &graph.node("band").unwrap().kind {
            NodeKind::Condition(c) => {
                assert_eq!(c.field, IndicatorField::BollingerLower);
                assert_eq!(c.operator, ConditionOperator::Below);
                assert!((c.threshold - 0.01).abs() < f64::EPSILON);
            }
            other => panic!("expected condition, got {:?}", other),
        }
        assert_eq!(
            graph.node("both").unwrap().kind,
            NodeKind::Logic(LogicOp::And)
        );
    }

    #[test]
    fn graph_from_ini_missing_operator() {
        let content = "[node.c]\nkind = condition\nindicator = SMA(5)\n";
        let config = FileConfigAdapter::from_string(content).unwrap();
        let err = graph_from_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigMissing { ref key, .. } if key == "operator"));
    }

    #[test]
    fn graph_from_ini_bad_threshold() {
        let content =
            "[node.c]\nkind = condition\nindicator = SMA(5)\noperator = >\nthreshold = abc\n";
        let config = FileConfigAdapter::from_string(content).unwrap();
        let err = graph_from_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { ref key, .. } if key == "threshold"));
    }

    #[test]
    fn graph_from_ini_bad_indicator_is_parse_error() {
        let content = "[node.c]\nkind = condition\nindicator = FOO(5)\noperator = >\n";
        let config = FileConfigAdapter::from_string(content).unwrap();
        let err = graph_from_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::GraphParse(_)));
    }

    #[test]
    fn graph_from_ini_unknown_kind() {
        let content = "[node.x]\nkind = trigger\n";
        let config = FileConfigAdapter::from_string(content).unwrap();
        let err = graph_from_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { ref key, .. } if key == "kind"));
    }
}
