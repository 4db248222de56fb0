//! Rule-based command router: maps a free-text instruction to exactly one
//! tool invocation. Rules are checked in a fixed order and the first match
//! wins; an LLM-driven router could be swapped in behind the same contract.

use crate::error::{AgentError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Closed set of tools an instruction can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Calculator,
    Time,
    File,
    Web,
}

impl ToolKind {
    /// Registry name of the tool this instruction dispatches to.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "calculator",
            ToolKind::Time => "time",
            ToolKind::File => "file",
            ToolKind::Web => "web",
        }
    }
}

/// A routed instruction: which tool to run and its structured arguments.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: ToolKind,
    pub arguments: Value,
}

const CALCULATOR_VERBS: [&str; 2] = ["计算", "calculate"];
const FUNCTION_PREFIXES: [&str; 12] = [
    "mean(", "median(", "std(", "var(", "sin(", "cos(", "tan(", "sqrt(", "log(", "ln(", "exp(",
    "abs(",
];
const TIME_KEYWORDS: [&str; 12] = [
    "时间", "几点", "星期", "日期", "今天", "明天", "昨天", "天后", "天前", "倒计时", "时区",
    "现在",
];
const CITY_ZONES: [&str; 8] = [
    "北京", "上海", "广州", "深圳", "纽约", "伦敦", "东京", "巴黎",
];
const FILE_VERBS: [(&str, &str); 18] = [
    ("读取", "read"),
    ("写入", "write"),
    ("保存", "write"),
    ("列出", "list"),
    ("创建目录", "mkdir"),
    ("搜索", "search"),
    ("查找", "search"),
    ("文件信息", "info"),
    ("存在", "exists"),
    ("read", "read"),
    ("write", "write"),
    ("save", "write"),
    ("mkdir", "mkdir"),
    ("search", "search"),
    ("exists", "exists"),
    ("info", "info"),
    ("list", "list"),
    ("ls ", "list"),
];
const WEB_VERBS: [(&str, &str); 10] = [
    ("提取链接", "links"),
    ("链接", "links"),
    ("提取图片", "images"),
    ("图片", "images"),
    ("调用api", "api"),
    ("获取", "fetch"),
    ("抓取", "fetch"),
    ("links", "links"),
    ("images", "images"),
    ("fetch", "fetch"),
];

/// Deterministic first-match-wins router over the four fixed tools.
#[derive(Debug)]
pub struct RuleRouter {
    url_re: Regex,
    date_re: Regex,
    operator_re: Regex,
    unit_re: Regex,
    days_after_re: Regex,
    days_before_re: Regex,
    path_re: Regex,
    token_re: Regex,
    time_word_re: Regex,
}

impl Default for RuleRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRouter {
    pub fn new() -> Self {
        // Pattern literals; compilation cannot fail.
        Self {
            url_re: Regex::new(r"https?://[A-Za-z0-9._~:/?#\[\]@!$&'()*+,;=%-]+")
                .expect("url pattern"),
            date_re: Regex::new(r"\d{4}[-/]\d{1,2}[-/]\d{1,2}").expect("date pattern"),
            operator_re: Regex::new(r"\d\s*[+*×÷^%]|[+*×÷^%]\s*\d|\d\s*-\s*\d|\d\s*/\s*\d")
                .expect("operator pattern"),
            unit_re: Regex::new(r"(?i)^\s*[\d.]+\s*[a-z]+\s+to\s+[a-z]+\s*$")
                .expect("unit pattern"),
            days_after_re: Regex::new(r"(?i)(\d+)\s*(?:天后|days?\s*(?:after|later))")
                .expect("days-after pattern"),
            days_before_re: Regex::new(r"(?i)(\d+)\s*(?:天前|days?\s*ago)")
                .expect("days-before pattern"),
            path_re: Regex::new(r"[\w./*?-]+\.(?:txt|json|csv|md|log|py|rs|toml|yaml|yml)")
                .expect("path pattern"),
            token_re: Regex::new(r"[A-Za-z0-9_*?./-]+").expect("token pattern"),
            // Whole words only, so filenames like update.txt or
            // runtime.log do not look like time queries.
            time_word_re: Regex::new(r"(?i)\b(?:time|date|weekday|timezone|countdown|utc)\b")
                .expect("time-word pattern"),
        }
    }

    /// Route an instruction to a tool invocation. Fails with
    /// `EmptyInstruction` for blank input and `UnroutableInstruction`
    /// when no rule matches.
    pub fn route(&self, instruction: &str) -> Result<ToolInvocation> {
        let text = instruction.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyInstruction);
        }

        // Rule order is fixed; ambiguous instructions resolve to the
        // earliest matching rule.
        if self.matches_calculator(text) {
            return Ok(ToolInvocation {
                tool: ToolKind::Calculator,
                arguments: json!({ "expression": self.extract_expression(text) }),
            });
        }
        if self.matches_time(text) {
            return Ok(ToolInvocation {
                tool: ToolKind::Time,
                arguments: self.extract_time_args(text),
            });
        }
        if self.matches_file(text) {
            return Ok(ToolInvocation {
                tool: ToolKind::File,
                arguments: self.extract_file_args(text),
            });
        }
        if self.matches_web(text) {
            if let Some(arguments) = self.extract_web_args(text) {
                return Ok(ToolInvocation {
                    tool: ToolKind::Web,
                    arguments,
                });
            }
        }

        Err(AgentError::UnroutableInstruction(text.to_string()))
    }

    fn matches_calculator(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if CALCULATOR_VERBS.iter().any(|verb| lower.contains(verb)) {
            return true;
        }
        if FUNCTION_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
        {
            return true;
        }
        if self.unit_re.is_match(text) {
            return true;
        }
        // Operators next to digits signal arithmetic, but date literals
        // also contain `-` and `/`; mask them out first.
        let without_dates = self.date_re.replace_all(text, "");
        self.operator_re.is_match(&without_dates)
    }

    fn matches_time(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        // An explicit file verb next to a filename is a file instruction
        // even when the name contains a time word (读取date.txt).
        if self.path_re.is_match(text) && FILE_VERBS.iter().any(|(verb, _)| lower.contains(verb)) {
            return false;
        }
        if TIME_KEYWORDS.iter().any(|kw| lower.contains(kw)) || self.time_word_re.is_match(text) {
            return true;
        }
        if text.contains('周') {
            return true;
        }
        // "2024-01-01到2024-12-31" style range queries carry no time
        // vocabulary but two date literals.
        if self.date_re.find_iter(text).count() >= 2 {
            return true;
        }
        CITY_ZONES.iter().any(|city| text.contains(city))
    }

    fn matches_file(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if FILE_VERBS.iter().any(|(verb, _)| lower.contains(verb)) {
            // A URL in the text belongs to the web rule instead.
            return !self.url_re.is_match(text);
        }
        self.path_re.is_match(text) && !self.url_re.is_match(text)
    }

    fn matches_web(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.url_re.is_match(text) || WEB_VERBS.iter().any(|(verb, _)| lower.contains(verb))
    }

    /// Strip routing verbs and politeness fillers, leaving the expression.
    fn extract_expression(&self, text: &str) -> String {
        let mut expr = text.to_string();
        for noise in [
            "calculate",
            "Calculate",
            "计算一下",
            "计算",
            "请",
            "帮我",
            "等于多少",
            "是多少",
            "等于几",
        ] {
            expr = expr.replace(noise, "");
        }
        expr.trim()
            .trim_end_matches(['?', '？', '='])
            .trim()
            .to_string()
    }

    fn extract_time_args(&self, text: &str) -> Value {
        if let Some(caps) = self.days_after_re.captures(text) {
            let days: i64 = caps[1].parse().unwrap_or(0);
            return json!({ "op": "offset", "days": days });
        }
        if let Some(caps) = self.days_before_re.captures(text) {
            let days: i64 = caps[1].parse().unwrap_or(0);
            return json!({ "op": "offset", "days": -days });
        }

        let dates: Vec<String> = self
            .date_re
            .find_iter(text)
            .map(|m| m.as_str().replace('/', "-"))
            .collect();
        let lower = text.to_lowercase();

        if lower.contains("倒计时") || lower.contains("countdown") {
            if let Some(date) = dates.first() {
                return json!({ "op": "countdown", "date": date });
            }
        }
        if dates.len() == 2 {
            return json!({ "op": "diff", "from": dates[0], "to": dates[1] });
        }
        if text.contains("星期") || text.contains('周') || lower.contains("weekday") {
            return match dates.first() {
                Some(date) => json!({ "op": "weekday", "date": date }),
                None => json!({ "op": "weekday" }),
            };
        }
        for city in CITY_ZONES {
            if text.contains(city) {
                return json!({ "op": "timezone", "zone": city });
            }
        }
        if lower.contains("utc") {
            return json!({ "op": "utc" });
        }
        json!({ "op": "now" })
    }

    fn extract_file_args(&self, text: &str) -> Value {
        let lower = text.to_lowercase();
        let mut op = "read";
        let mut stripped = text.to_string();
        for (verb, mapped) in FILE_VERBS {
            if lower.contains(verb) {
                op = mapped;
                stripped = strip_verb(text, verb);
                break;
            }
        }

        if op == "write" {
            // Content follows the path after a colon separator.
            let (head, content) = match stripped.split_once([':', '：']) {
                Some((head, content)) => (head.to_string(), content.trim().to_string()),
                None => (stripped.clone(), String::new()),
            };
            let path = self.first_path_token(&head).unwrap_or_default();
            return json!({ "op": "write", "path": path, "content": content });
        }
        if op == "search" {
            let pattern = self
                .token_re
                .find_iter(&stripped)
                .map(|m| m.as_str())
                .find(|token| token.contains('*') || token.contains('?'))
                .unwrap_or("*")
                .to_string();
            return json!({ "op": "search", "path": ".", "pattern": pattern });
        }

        let path = self
            .first_path_token(&stripped)
            .unwrap_or_else(|| ".".to_string());
        json!({ "op": op, "path": path })
    }

    fn first_path_token(&self, text: &str) -> Option<String> {
        self.token_re
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|token| *token != "." && *token != "/")
            .map(|token| token.to_string())
    }

    fn extract_web_args(&self, text: &str) -> Option<Value> {
        let url = self.url_re.find(text)?.as_str().to_string();
        let lower = text.to_lowercase();
        let mut op = "fetch";
        for (verb, mapped) in WEB_VERBS {
            if lower.contains(verb) {
                op = mapped;
                break;
            }
        }
        Some(json!({ "op": op, "url": url }))
    }
}

/// Remove the first occurrence of `verb` from `text`, matching
/// case-insensitively while preserving the rest of the original text
/// (paths and file content are case-sensitive).
fn strip_verb(text: &str, verb: &str) -> String {
    let lower = text.to_lowercase();
    match lower.find(verb) {
        // Verbs are ASCII-lowercase or Chinese, so lowercasing keeps
        // byte offsets stable for the text surrounding the match.
        Some(pos) if text.is_char_boundary(pos) && text.is_char_boundary(pos + verb.len()) => {
            let mut result = String::with_capacity(text.len());
            result.push_str(&text[..pos]);
            result.push(' ');
            result.push_str(&text[pos + verb.len()..]);
            result
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> RuleRouter {
        RuleRouter::new()
    }

    #[test]
    fn test_empty_instruction() {
        assert!(matches!(
            router().route("   "),
            Err(AgentError::EmptyInstruction)
        ));
    }

    #[test]
    fn test_unroutable_instruction() {
        assert!(matches!(
            router().route("你好"),
            Err(AgentError::UnroutableInstruction(_))
        ));
    }

    #[test]
    fn test_calculator_route_strips_verb() {
        let invocation = router().route("计算2+3*4").unwrap();
        assert_eq!(invocation.tool, ToolKind::Calculator);
        assert_eq!(invocation.arguments["expression"], "2+3*4");
    }

    #[test]
    fn test_bare_arithmetic_routes_to_calculator() {
        let invocation = router().route("sqrt(16) + 1").unwrap();
        assert_eq!(invocation.tool, ToolKind::Calculator);
    }

    #[test]
    fn test_unit_conversion_routes_to_calculator() {
        let invocation = router().route("10km to m").unwrap();
        assert_eq!(invocation.tool, ToolKind::Calculator);
    }

    #[test]
    fn test_day_offset_extraction() {
        let invocation = router().route("3天后是几号").unwrap();
        assert_eq!(invocation.tool, ToolKind::Time);
        assert_eq!(invocation.arguments["op"], "offset");
        assert_eq!(invocation.arguments["days"], 3);

        let invocation = router().route("5天前").unwrap();
        assert_eq!(invocation.arguments["days"], -5);
    }

    #[test]
    fn test_date_diff_not_mistaken_for_arithmetic() {
        let invocation = router().route("2024-01-01到2024-12-31的天数").unwrap();
        assert_eq!(invocation.tool, ToolKind::Time);
        assert_eq!(invocation.arguments["op"], "diff");
        assert_eq!(invocation.arguments["from"], "2024-01-01");
        assert_eq!(invocation.arguments["to"], "2024-12-31");
    }

    #[test]
    fn test_weekday_route() {
        let invocation = router().route("今天星期几").unwrap();
        assert_eq!(invocation.tool, ToolKind::Time);
        assert_eq!(invocation.arguments["op"], "weekday");
    }

    #[test]
    fn test_countdown_route() {
        let invocation = router().route("倒计时到2026-12-31").unwrap();
        assert_eq!(invocation.arguments["op"], "countdown");
        assert_eq!(invocation.arguments["date"], "2026-12-31");
    }

    #[test]
    fn test_timezone_route() {
        let invocation = router().route("纽约时间").unwrap();
        assert_eq!(invocation.arguments["op"], "timezone");
        assert_eq!(invocation.arguments["zone"], "纽约");
    }

    #[test]
    fn test_file_read_route() {
        let invocation = router().route("读取missing.txt").unwrap();
        assert_eq!(invocation.tool, ToolKind::File);
        assert_eq!(invocation.arguments["op"], "read");
        assert_eq!(invocation.arguments["path"], "missing.txt");
    }

    #[test]
    fn test_filenames_containing_time_words_route_to_file() {
        let invocation = router().route("读取update.txt").unwrap();
        assert_eq!(invocation.tool, ToolKind::File);
        assert_eq!(invocation.arguments["op"], "read");
        assert_eq!(invocation.arguments["path"], "update.txt");

        let invocation = router().route("保存runtime.log: x").unwrap();
        assert_eq!(invocation.tool, ToolKind::File);
        assert_eq!(invocation.arguments["op"], "write");
        assert_eq!(invocation.arguments["path"], "runtime.log");

        let invocation = router().route("读取date.txt").unwrap();
        assert_eq!(invocation.tool, ToolKind::File);
        assert_eq!(invocation.arguments["path"], "date.txt");
    }

    #[test]
    fn test_time_words_still_route_to_time() {
        let invocation = router().route("what time is it").unwrap();
        assert_eq!(invocation.tool, ToolKind::Time);
        assert_eq!(invocation.arguments["op"], "now");

        let invocation = router().route("utc time").unwrap();
        assert_eq!(invocation.tool, ToolKind::Time);
        assert_eq!(invocation.arguments["op"], "utc");
    }

    #[test]
    fn test_exists_route() {
        let invocation = router().route("notes.txt是否存在").unwrap();
        assert_eq!(invocation.tool, ToolKind::File);
        assert_eq!(invocation.arguments["op"], "exists");
        assert_eq!(invocation.arguments["path"], "notes.txt");
    }

    #[test]
    fn test_file_write_route_preserves_case() {
        let invocation = router().route("保存Notes.txt: Hello World").unwrap();
        assert_eq!(invocation.arguments["op"], "write");
        assert_eq!(invocation.arguments["path"], "Notes.txt");
        assert_eq!(invocation.arguments["content"], "Hello World");
    }

    #[test]
    fn test_file_list_route_defaults_to_root() {
        let invocation = router().route("列出当前目录").unwrap();
        assert_eq!(invocation.arguments["op"], "list");
        assert_eq!(invocation.arguments["path"], ".");
    }

    #[test]
    fn test_file_search_route() {
        let invocation = router().route("搜索*.py文件").unwrap();
        assert_eq!(invocation.arguments["op"], "search");
        assert_eq!(invocation.arguments["pattern"], "*.py");
    }

    #[test]
    fn test_mkdir_route() {
        let invocation = router().route("创建目录test").unwrap();
        assert_eq!(invocation.arguments["op"], "mkdir");
        assert_eq!(invocation.arguments["path"], "test");
    }

    #[test]
    fn test_web_fetch_route() {
        let invocation = router().route("获取https://example.com内容").unwrap();
        assert_eq!(invocation.tool, ToolKind::Web);
        assert_eq!(invocation.arguments["op"], "fetch");
        assert_eq!(invocation.arguments["url"], "https://example.com");
    }

    #[test]
    fn test_web_links_route() {
        let invocation = router().route("提取链接 https://example.com/a").unwrap();
        assert_eq!(invocation.arguments["op"], "links");
    }

    #[test]
    fn test_web_verb_without_url_is_unroutable() {
        assert!(matches!(
            router().route("抓取页面"),
            Err(AgentError::UnroutableInstruction(_))
        ));
    }

    #[test]
    fn test_ambiguous_instruction_takes_earliest_rule() {
        // Matches both the calculator verb and time vocabulary; the
        // calculator rule comes first in the fixed order.
        let invocation = router().route("计算今天日期加7天的平均值").unwrap();
        assert_eq!(invocation.tool, ToolKind::Calculator);
    }
}
