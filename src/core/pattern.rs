//! 文件覆盖模式匹配
//!
//! 覆盖键可以是精确路径，也可以是受限的通配模式：`*` 匹配任意字符序列，
//! `?` 匹配单个字符，其余字符按字面量处理。模式只锚定在路径末尾，
//! 因此可以省略公共的路径前缀。

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

/// 已编译模式的缓存，键为规范化后的模式
static COMPILED: Lazy<RwLock<HashMap<String, Option<Regex>>>> = Lazy::new(Default::default);

/// 去掉路径开头的 `./` 与 `../` 段
pub fn normalize_path(path: &str) -> &str {
    let mut rest = path;
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

/// 将通配模式编译为只锚定末尾的正则
fn compile(pattern: &str) -> Option<Regex> {
    let mut source = String::with_capacity(pattern.len() * 2 + 1);
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}

fn compiled(pattern: &str) -> Option<Regex> {
    if let Some(cached) = COMPILED
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(pattern)
    {
        return cached.clone();
    }
    let regex = compile(pattern);
    COMPILED
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(pattern.to_string(), regex.clone());
    regex
}

/// 判断 `path` 是否命中 `pattern`
///
/// 精确相等优先，从不报错。
pub fn matches(path: &str, pattern: &str) -> bool {
    let path = normalize_path(path);
    let pattern = normalize_path(pattern);

    if path == pattern {
        return true;
    }
    match compiled(pattern) {
        Some(regex) => regex.is_match(path),
        // 超出 regex 编译大小限制的超长模式按字面量后缀比较
        None => path.ends_with(pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/app.js"), "src/app.js");
        assert_eq!(normalize_path("../../lib/a.js"), "lib/a.js");
        assert_eq!(normalize_path(".././x.js"), "x.js");
        assert_eq!(normalize_path("plain.js"), "plain.js");
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("routes/admin.js", "routes/admin.js"));
        assert!(matches("./routes/admin.js", "routes/admin.js"));
        assert!(!matches("routes/admin.js", "routes/user.js"));
    }

    #[test]
    fn test_star_is_end_anchored() {
        assert!(matches("panel.admin.js", "*.admin.js"));
        assert!(matches("src/ui/panel.admin.js", "*.admin.js"));
        assert!(!matches("admin.js.bak", "*.admin.js"));
    }

    #[test]
    fn test_prefix_can_be_omitted() {
        assert!(matches("app/src/services/user.js", "services/*.js"));
        assert!(matches("app/src/routes/admin.js", "routes/admin.js"));
        assert!(!matches("app/src/services/user.ts", "services/*.js"));
    }

    #[test]
    fn test_question_mark_matches_single_char() {
        assert!(matches("log1.txt", "log?.txt"));
        assert!(!matches("log12.txt", "log?.txt"));
    }

    #[test]
    fn test_dot_is_literal() {
        assert!(!matches("fileXjs", "file.js"));
        assert!(!matches("fileXjs", "*file.js"));
        assert!(matches("my.file.js", "*file.js"));
    }

    #[test]
    fn test_compiled_patterns_are_cached() {
        assert!(matches("./jobs/nightly.rs", "./jobs/*.rs"));
        assert!(COMPILED.read().unwrap().contains_key("jobs/*.rs"));
        assert!(matches("jobs/hourly.rs", "jobs/*.rs"));
        assert!(!matches("jobs/hourly.ts", "jobs/*.rs"));
    }

    #[test]
    fn test_regex_metacharacters_degrade_to_literals() {
        assert!(matches("weird[1](x)+.js", "weird[1](x)+.js"));
        assert!(matches("dir/weird[1](x)+.js", "*[1](x)+.js"));
        assert!(!matches("dir/weird1x.js", "*[1](x)+.js"));
    }
}
