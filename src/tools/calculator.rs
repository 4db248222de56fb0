//! Arithmetic and statistics evaluator over a closed expression grammar.
//! Only numbers, the listed operators/functions, parentheses and bracketed
//! numeric lists are accepted; nothing here ever evaluates arbitrary code.

use super::Tool;
use crate::error::{AgentError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// Parameters for calculator invocations
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CalculatorParams {
    /// Expression to evaluate: arithmetic, a statistics call over a
    /// bracketed list, or a `"10km to m"` unit conversion.
    pub expression: String,
}

const LENGTH_UNITS: [(&str, f64); 7] = [
    ("m", 1.0),
    ("km", 1000.0),
    ("cm", 0.01),
    ("mm", 0.001),
    ("inch", 0.0254),
    ("ft", 0.3048),
    ("mile", 1609.344),
];
const WEIGHT_UNITS: [(&str, f64); 5] = [
    ("kg", 1.0),
    ("g", 0.001),
    ("mg", 0.000001),
    ("lb", 0.453592),
    ("oz", 0.0283495),
];
const TEMPERATURE_UNITS: [&str; 3] = ["c", "f", "k"];

/// Calculator tool: arithmetic, math functions, descriptive statistics
/// and fixed-table unit conversion.
#[derive(Debug)]
pub struct CalculatorTool {
    stats_re: Regex,
    unit_re: Regex,
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            stats_re: Regex::new(r"(?i)^(mean|median|std|var)\(\[([^\]]+)\]\)$")
                .expect("stats pattern"),
            unit_re: Regex::new(r"(?i)^([\d.]+)\s*([a-z]+)\s+to\s+([a-z]+)$")
                .expect("unit pattern"),
        }
    }

    /// Evaluate an expression string to a formatted result.
    pub fn evaluate(&self, expression: &str) -> Result<String> {
        let expr = preprocess(expression);
        if expr.is_empty() {
            return Err(AgentError::InvalidExpression("empty expression".to_string()));
        }

        if let Some(caps) = self.unit_re.captures(&expr) {
            return convert_units(&caps[1], &caps[2].to_lowercase(), &caps[3].to_lowercase());
        }
        if let Some(caps) = self.stats_re.captures(&expr) {
            return describe(&caps[1].to_lowercase(), &caps[2]);
        }

        let value = eval_expression(&expr)?;
        Ok(format_number(value))
    }
}

impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Evaluate arithmetic expressions, math functions, statistics (mean/median/std/var) and unit conversions"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression such as '2+3*4', 'sqrt(16)', 'mean([1,2,3])' or '10km to m'"
                }
            },
            "required": ["expression"]
        })
    }

    fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value>> + Send + '_>> {
        Box::pin(async move {
            let params: CalculatorParams = serde_json::from_value(parameters)
                .map_err(|e| AgentError::InvalidExpression(format!("invalid parameters: {}", e)))?;

            debug!(target: "tool_agent::calculator", expression = %params.expression, "evaluating");
            let result = self.evaluate(&params.expression)?;
            Ok(serde_json::Value::String(result))
        })
    }
}

/// Normalize localized operator spellings before lexing.
fn preprocess(expression: &str) -> String {
    expression
        .replace('×', "*")
        .replace('÷', "/")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    FloorDiv,
    Percent,
    Power,
    LParen,
    RParen,
}

fn lex(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| {
                    AgentError::InvalidExpression(format!("bad number literal: {}", literal))
                })?;
                tokens.push(Token::Num(value));
            }
            'a'..='z' | 'A'..='Z' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident.to_lowercase()));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(Token::FloorDiv);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '^' => {
                chars.next();
                tokens.push(Token::Power);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => {
                return Err(AgentError::InvalidExpression(format!(
                    "unexpected character: {}",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over the lexed tokens.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(AgentError::InvalidExpression(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.next();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.next();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.next();
                    value *= self.unary()?;
                }
                Token::Slash => {
                    self.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(AgentError::InvalidExpression(
                            "division by zero".to_string(),
                        ));
                    }
                    value /= divisor;
                }
                Token::FloorDiv => {
                    self.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(AgentError::InvalidExpression(
                            "division by zero".to_string(),
                        ));
                    }
                    value = (value / divisor).floor();
                }
                Token::Percent => {
                    self.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(AgentError::InvalidExpression(
                            "modulo by zero".to_string(),
                        ));
                    }
                    value %= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.next();
            // Right-associative; the exponent may itself carry a sign.
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "pi" => Ok(std::f64::consts::PI),
                "e" => Ok(std::f64::consts::E),
                _ => {
                    self.expect(Token::LParen)?;
                    let argument = self.expression()?;
                    self.expect(Token::RParen)?;
                    apply_function(&name, argument)
                }
            },
            other => Err(AgentError::InvalidExpression(format!(
                "unexpected token: {:?}",
                other
            ))),
        }
    }
}

fn apply_function(name: &str, argument: f64) -> Result<f64> {
    let value = match name {
        "sin" => argument.sin(),
        "cos" => argument.cos(),
        "tan" => argument.tan(),
        "sqrt" => argument.sqrt(),
        "log" => argument.log10(),
        "ln" => argument.ln(),
        "exp" => argument.exp(),
        "abs" => argument.abs(),
        "round" => argument.round(),
        _ => {
            return Err(AgentError::InvalidExpression(format!(
                "unknown function: {}",
                name
            )));
        }
    };
    Ok(value)
}

fn eval_expression(expr: &str) -> Result<f64> {
    let tokens = lex(expr)?;
    if tokens.is_empty() {
        return Err(AgentError::InvalidExpression("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(AgentError::InvalidExpression(format!(
            "trailing input after position {}",
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(AgentError::InvalidExpression(
            "result is not a finite number".to_string(),
        ));
    }
    Ok(value)
}

/// Integers print without a fraction; everything else is rounded to six
/// decimal places.
fn format_number(value: f64) -> String {
    if value.fract().abs() < 1e-9 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", (value * 1e6).round() / 1e6)
    }
}

fn parse_series(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(|item| {
            item.trim().parse::<f64>().map_err(|_| {
                AgentError::InvalidExpression(format!("bad list value: {}", item.trim()))
            })
        })
        .collect()
}

fn describe(operation: &str, raw_values: &str) -> Result<String> {
    let values = parse_series(raw_values)?;
    if values.is_empty() {
        return Err(AgentError::InvalidExpression("empty value list".to_string()));
    }

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;

    let result = match operation {
        "mean" => mean,
        "median" => {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        }
        "std" | "var" => {
            if n < 2 {
                return Err(AgentError::InvalidExpression(
                    "std/var need at least two values".to_string(),
                ));
            }
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            if operation == "var" {
                variance
            } else {
                variance.sqrt()
            }
        }
        _ => {
            return Err(AgentError::InvalidExpression(format!(
                "unknown statistic: {}",
                operation
            )));
        }
    };

    Ok(format!("{}: {:.4} ({} values)", operation, result, n))
}

fn convert_units(raw_value: &str, from: &str, to: &str) -> Result<String> {
    let value: f64 = raw_value
        .parse()
        .map_err(|_| AgentError::InvalidExpression(format!("bad value: {}", raw_value)))?;

    if TEMPERATURE_UNITS.contains(&from) && TEMPERATURE_UNITS.contains(&to) {
        let converted = convert_temperature(value, from, to)?;
        return Ok(format!(
            "{}{} = {:.4}{}",
            value,
            from.to_uppercase(),
            converted,
            to.to_uppercase()
        ));
    }

    for table in [&LENGTH_UNITS[..], &WEIGHT_UNITS[..]] {
        let from_factor = table.iter().find(|(unit, _)| *unit == from);
        let to_factor = table.iter().find(|(unit, _)| *unit == to);
        if let (Some((_, from_factor)), Some((_, to_factor))) = (from_factor, to_factor) {
            let converted = value * from_factor / to_factor;
            return Ok(format!("{}{} = {:.4}{}", value, from, converted, to));
        }
    }

    Err(AgentError::UnknownUnit(format!("{} to {}", from, to)))
}

fn convert_temperature(value: f64, from: &str, to: &str) -> Result<f64> {
    let celsius = match from {
        "c" => value,
        "f" => (value - 32.0) * 5.0 / 9.0,
        "k" => value - 273.15,
        _ => return Err(AgentError::UnknownUnit(from.to_string())),
    };
    match to {
        "c" => Ok(celsius),
        "f" => Ok(celsius * 9.0 / 5.0 + 32.0),
        "k" => Ok(celsius + 273.15),
        _ => Err(AgentError::UnknownUnit(to.to_string())),
    }
}
