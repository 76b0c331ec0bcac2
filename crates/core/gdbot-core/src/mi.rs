//! GDB/MI 响应分类
//!
//! 只识别会话控制所需的少量协议标记：
//!
//! | 含义 | 文本 |
//! |---|---|
//! | 命令完成，解释器空闲 | `(gdb)` |
//! | 被调试程序恢复运行 | `^running` |
//! | 因断点停止 | `*stopped,reason="breakpoint-hit"` |
//! | 表达式求值结果 | `^done,value="..."` |
//! | 命令被拒绝 | `^error,msg="..."` |
//!
//! 断点命中必须以结构化的停止记录为前提，控制台文本只作辅助。

use std::sync::LazyLock;

use regex::Regex;

pub const PROMPT: &str = "(gdb)";
pub const RUNNING: &str = "^running";
pub const STOPPED: &str = "*stopped";
pub const BREAKPOINT_HIT: &str = "*stopped,reason=\"breakpoint-hit\"";
pub const VALUE_MARKER: &str = "^done,value=\"";
pub const ERROR_MARKER: &str = "^error,msg=\"";

static FRAME_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[,{])(func|file|fullname|line)="((?:[^"\\]|\\.)*)""#)
        .expect("frame field pattern is valid")
});

pub fn has_prompt(text: &str) -> bool {
    text.contains(PROMPT)
}

/// 窗口结束时解释器是否处于可应答状态
///
/// 最后一条 `*stopped` 出现在最后一条 `^running` 之后，或窗口中根本没有
/// `^running`（解释器直接应答了命令），都说明被调试程序已停止。
pub fn ends_halted(text: &str) -> bool {
    match (text.rfind(RUNNING), text.rfind(STOPPED)) {
        (Some(running), Some(stopped)) => stopped > running,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// 按行拼接跨窗口的输出
///
/// 窗口边界可能落在一条记录中间，未以换行结束的尾部留到下一窗口再判断。
#[derive(Debug, Default)]
pub struct LineCarry {
    partial: String,
}

impl LineCarry {
    /// 追加一个窗口的文本，返回其中已完整的行
    pub fn complete(&mut self, text: &str) -> String {
        self.partial.push_str(text);
        match self.partial.rfind('\n') {
            Some(end) => {
                let rest = self.partial.split_off(end + 1);
                std::mem::replace(&mut self.partial, rest)
            }
            None => String::new(),
        }
    }

    /// 尚未完整的尾部
    pub fn pending(&self) -> &str {
        &self.partial
    }
}

/// 提取 `^done,value="..."` 中的值
///
/// 标记不存在或引号未闭合时返回 `None`。
pub fn extract_value(text: &str) -> Option<String> {
    extract_cstring(text, VALUE_MARKER)
}

/// 提取 `^error,msg="..."` 中的错误信息
pub fn error_message(text: &str) -> Option<String> {
    extract_cstring(text, ERROR_MARKER)
}

/// 文本中是否有命中 `location` 的断点停止记录
///
/// `file:line` 与函数名只按记录中的帧信息判断。其他形式（如 `*0x401000`）
/// 无法从帧信息还原，退而要求位置字面量作为完整记号出现在同一窗口中
/// （例如控制台流中的 `Breakpoint 3, 0x401000 in *0x401000 ()`）。
pub fn breakpoint_hit_at(text: &str, location: &BreakpointLocation) -> bool {
    let mut records = breakpoint_records(text).peekable();
    if records.peek().is_none() {
        return false;
    }
    match location {
        BreakpointLocation::Other(literal) => contains_token(text, literal),
        _ => records.any(|record| location.matches_record(record)),
    }
}

/// `needle` 是否出现在 `text` 中，且前后都不紧邻标识符字符
fn contains_token(text: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(needle).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + needle.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn breakpoint_records(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices(BREAKPOINT_HIT).map(move |(start, _)| {
        let rest = &text[start..];
        match rest.find(['\r', '\n']) {
            Some(end) => &rest[..end],
            None => rest,
        }
    })
}

fn extract_cstring(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let body = &text[start..];
    let bytes = body.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(unescape(&body[..i])),
            _ => i += 1,
        }
    }
    None
}

/// 解码 MI C 字符串转义（包括 `\NNN` 八进制）
pub fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escaped = bytes[i + 1];
        i += 2;
        match escaped {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    value = value * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xff) as u8);
            }
            other => out.push(other),
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// 将表达式转义为 MI 命令中的 C 字符串内容
pub fn escape(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 2);
    for c in expression.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// 断点位置说明
///
/// 保留调试器自身的位置语法，只为命中判断做有限的解析。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointLocation {
    /// `file:line`
    FileLine { file: String, line: u32, raw: String },
    /// 函数名（含 `ns::func` 形式）
    Function(String),
    /// 其他形式，例如 `*0x401000`
    Other(String),
}

impl BreakpointLocation {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();

        if let Some((file, line)) = location.rsplit_once(':')
            && !file.is_empty()
            && !file.ends_with(':')
            && let Ok(line) = line.parse::<u32>()
        {
            return BreakpointLocation::FileLine {
                file: file.to_string(),
                line,
                raw: location.to_string(),
            };
        }

        let is_symbol = !location.is_empty()
            && location
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '~' | '$' | '.'));
        if is_symbol {
            BreakpointLocation::Function(location.to_string())
        } else {
            BreakpointLocation::Other(location.to_string())
        }
    }

    /// 原始位置文本
    pub fn as_str(&self) -> &str {
        match self {
            BreakpointLocation::FileLine { raw, .. } => raw,
            BreakpointLocation::Function(name) => name,
            BreakpointLocation::Other(raw) => raw,
        }
    }

    /// 停止记录中的帧信息是否指向该位置
    pub fn matches_record(&self, record: &str) -> bool {
        let mut func = None;
        let mut files = Vec::new();
        let mut line = None;

        for cap in FRAME_FIELD.captures_iter(record) {
            let value = unescape(&cap[2]);
            match &cap[1] {
                "func" => func = Some(value),
                "file" | "fullname" => files.push(value),
                "line" => line = value.parse::<u32>().ok(),
                _ => {}
            }
        }

        match self {
            BreakpointLocation::FileLine {
                file,
                line: wanted,
                ..
            } => line == Some(*wanted) && files.iter().any(|f| path_matches(f, file)),
            BreakpointLocation::Function(name) => func.as_deref() == Some(name.as_str()),
            BreakpointLocation::Other(_) => false,
        }
    }
}

impl std::fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `candidate` 是否以路径分量边界结尾于 `wanted`
fn path_matches(candidate: &str, wanted: &str) -> bool {
    let candidate = candidate.replace('\\', "/");
    let wanted = wanted.replace('\\', "/");
    if candidate == wanted {
        return true;
    }
    candidate
        .strip_suffix(wanted.as_str())
        .is_some_and(|prefix| prefix.ends_with('/'))
}
