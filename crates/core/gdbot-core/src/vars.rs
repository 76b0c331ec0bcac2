//! 表达式求值与类型化变量读写
//!
//! 数值读取采用宽松的前缀解析：忽略前导空白，读取符号和数字，
//! 遇到第一个无法识别的字符即停止；完全无法解析时结果为 0。
//! 调试器回显的 `5 '\005'`、`0x10 <buf>` 之类后缀因此不会影响结果。

use std::sync::LazyLock;

use gdbot_osal::Transport;
use regex::Regex;

use crate::error::{GdbotError, Result};
use crate::mi;
use crate::session::GdbSession;

/// 浮点数前缀：符号、整数/小数部分、可选指数
static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
        .expect("float prefix pattern is valid")
});

/// 一次求值的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// 调试器返回的值文本
    Value(String),
    /// 读到了输出，但其中没有值
    NoValue,
    /// 调试器拒绝了该表达式
    Rejected(String),
}

impl Evaluation {
    pub fn value(&self) -> Option<&str> {
        match self {
            Evaluation::Value(value) => Some(value),
            _ => None,
        }
    }

    /// 取出值，缺失或被拒绝时转换为错误
    pub fn into_value(self, expression: &str) -> Result<String> {
        match self {
            Evaluation::Value(value) => Ok(value),
            Evaluation::NoValue => Err(GdbotError::ParseMiss {
                expression: expression.to_string(),
            }),
            Evaluation::Rejected(message) => Err(GdbotError::Rejected {
                expression: expression.to_string(),
                message,
            }),
        }
    }
}

impl<T: Transport> GdbSession<T> {
    /// 在当前上下文中求值一个表达式
    ///
    /// 赋值表达式（如 `x = 3`）同样适用，结果为赋值后的值。
    pub fn evaluate(&mut self, expression: &str) -> Result<Evaluation> {
        self.send_line(&format!(
            "-data-evaluate-expression \"{}\"\n",
            mi::escape(expression)
        ));
        let response = self.read_for(self.config().default_wait());

        if let Some(value) = response.value() {
            return Ok(Evaluation::Value(value));
        }
        if let Some(message) = response.error_message() {
            return Ok(Evaluation::Rejected(message));
        }
        if response.closed {
            return Err(GdbotError::ChannelClosed);
        }
        Ok(Evaluation::NoValue)
    }

    pub fn read_var(&mut self, name: &str) -> Result<String> {
        self.evaluate(name)?.into_value(name)
    }

    pub fn read_var_int(&mut self, name: &str) -> Result<i64> {
        Ok(parse_int_prefix(&self.read_var(name)?))
    }

    /// 负数按补码回绕，与 `strtoull` 一致
    pub fn read_var_uint(&mut self, name: &str) -> Result<u64> {
        Ok(parse_uint_prefix(&self.read_var(name)?))
    }

    pub fn read_var_double(&mut self, name: &str) -> Result<f64> {
        Ok(parse_float_prefix(&self.read_var(name)?))
    }

    /// 赋值 `name = value`，返回调试器回显的新值
    pub fn write_var(&mut self, name: &str, value: &str) -> Result<String> {
        let expression = format!("{} = {}", name, value);
        self.evaluate(&expression)?.into_value(&expression)
    }

    pub fn write_var_int(&mut self, name: &str, value: i64) -> Result<String> {
        self.write_var(name, &value.to_string())
    }

    pub fn write_var_uint(&mut self, name: &str, value: u64) -> Result<String> {
        self.write_var(name, &value.to_string())
    }

    pub fn write_var_double(&mut self, name: &str, value: f64) -> Result<String> {
        if !value.is_finite() {
            return Err(GdbotError::InvalidArgument(format!(
                "cannot assign non-finite value {} to {}",
                value, name
            )));
        }
        self.write_var(name, &value.to_string())
    }
}

/// 拆出符号和紧随其后的十进制数字串
fn split_sign_digits(text: &str) -> (bool, &str) {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    (negative, &rest[..end])
}

/// 超出范围时饱和
fn parse_int_prefix(text: &str) -> i64 {
    let (negative, digits) = split_sign_digits(text);
    if digits.is_empty() {
        return 0;
    }
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    };
    signed.parse().unwrap_or(if negative { i64::MIN } else { i64::MAX })
}

fn parse_uint_prefix(text: &str) -> u64 {
    let (negative, digits) = split_sign_digits(text);
    if digits.is_empty() {
        return 0;
    }
    let magnitude = digits.parse::<u64>().unwrap_or(u64::MAX);
    if negative { magnitude.wrapping_neg() } else { magnitude }
}

fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    if let Some(found) = FLOAT_PREFIX.find(text) {
        return found.as_str().parse().unwrap_or(0.0);
    }

    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = rest.to_ascii_lowercase();
    let special = if lower.starts_with("inf") {
        f64::INFINITY
    } else if lower.starts_with("nan") {
        f64::NAN
    } else {
        return 0.0;
    };
    if negative { -special } else { special }
}
