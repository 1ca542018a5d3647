//! 日志调用参数规范化
//!
//! 句柄方法同时接受"消息在前"和"上下文在前"两种写法，这里把它们统一成
//! `(context, message)`，底层输出永远只看到这一种顺序。

use serde_json::{Map, Value};

/// 单个调用参数
#[derive(Debug, Clone, PartialEq)]
pub enum LogArg {
    Message(String),
    Context(Map<String, Value>),
}

/// 一次日志调用的全部参数
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogArgs(pub Vec<LogArg>);

/// 规范化后的消息与上下文
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedArgs {
    pub message: String,
    pub context: Map<String, Value>,
}

fn arg_from_value(value: Value) -> LogArg {
    match value {
        Value::Object(map) => LogArg::Context(map),
        Value::String(text) => LogArg::Message(text),
        other => LogArg::Message(other.to_string()),
    }
}

/// 纯函数：把参数列表解析为 `{message, context}`
///
/// 首个参数是字符串时视为消息，若其后恰好只有一个对象则视为上下文；
/// 首个参数是对象时视为上下文，其后可选的字符串视为消息。
pub fn normalize_args(args: &[LogArg]) -> NormalizedArgs {
    match args {
        [] => NormalizedArgs::default(),
        [LogArg::Message(message)] => NormalizedArgs {
            message: message.clone(),
            context: Map::new(),
        },
        [LogArg::Message(message), LogArg::Context(context)] => NormalizedArgs {
            message: message.clone(),
            context: context.clone(),
        },
        [LogArg::Message(message), ..] => NormalizedArgs {
            message: message.clone(),
            context: Map::new(),
        },
        [LogArg::Context(context), rest @ ..] => NormalizedArgs {
            message: match rest.first() {
                Some(LogArg::Message(message)) => message.clone(),
                _ => String::new(),
            },
            context: context.clone(),
        },
    }
}

impl LogArgs {
    pub fn normalize(&self) -> NormalizedArgs {
        normalize_args(&self.0)
    }
}

impl From<&str> for LogArgs {
    fn from(message: &str) -> Self {
        LogArgs(vec![LogArg::Message(message.to_string())])
    }
}

impl From<String> for LogArgs {
    fn from(message: String) -> Self {
        LogArgs(vec![LogArg::Message(message)])
    }
}

impl From<Value> for LogArgs {
    fn from(value: Value) -> Self {
        LogArgs(vec![arg_from_value(value)])
    }
}

impl From<(&str, Value)> for LogArgs {
    fn from((message, context): (&str, Value)) -> Self {
        LogArgs(vec![
            LogArg::Message(message.to_string()),
            arg_from_value(context),
        ])
    }
}

impl From<(String, Value)> for LogArgs {
    fn from((message, context): (String, Value)) -> Self {
        LogArgs(vec![LogArg::Message(message), arg_from_value(context)])
    }
}

impl From<(Value, &str)> for LogArgs {
    fn from((context, message): (Value, &str)) -> Self {
        LogArgs(vec![
            arg_from_value(context),
            LogArg::Message(message.to_string()),
        ])
    }
}

impl From<(Value, String)> for LogArgs {
    fn from((context, message): (Value, String)) -> Self {
        LogArgs(vec![arg_from_value(context), LogArg::Message(message)])
    }
}

impl From<Vec<LogArg>> for LogArgs {
    fn from(args: Vec<LogArg>) -> Self {
        LogArgs(args)
    }
}
