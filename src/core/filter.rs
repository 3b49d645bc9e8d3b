//! glob 过滤规则
//!
//! 规则按顺序生效，`!` 开头的是排除规则：
//! - 没有包含规则时，默认全部匹配，只剔除被排除规则命中的路径；
//! - 有包含规则时，路径的最后一条命中规则必须是包含规则。

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("无效的过滤规则 `{pattern}`: {source}")]
pub struct FilterError {
    pub pattern: String,
    #[source]
    pub source: globset::Error,
}

#[derive(Debug, Clone)]
struct Rule {
    exclude: bool,
    matcher: GlobSet,
}

/// 编译后的过滤器
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<Rule>,
    has_includes: bool,
}

impl PathFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let (exclude, body) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern),
            };
            // 单独的 `!` 不匹配任何路径
            if body.is_empty() {
                continue;
            }

            let body = body.trim_start_matches("./");
            let compile = |glob: &str| -> Result<Glob, FilterError> {
                GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| FilterError {
                        pattern: pattern.to_string(),
                        source: e,
                    })
            };

            let mut builder = GlobSetBuilder::new();
            builder.add(compile(body)?);
            // 末尾的 `/**` 同时匹配目录本身
            if let Some(dir) = body.strip_suffix("/**").filter(|d| !d.is_empty()) {
                builder.add(compile(dir)?);
            }
            let matcher = builder.build().map_err(|e| FilterError {
                pattern: pattern.to_string(),
                source: e,
            })?;
            rules.push(Rule { exclude, matcher });
        }

        let has_includes = rules.iter().any(|r| !r.exclude);
        Ok(Self {
            rules,
            has_includes,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        match self.rules.iter().rev().find(|r| r.matcher.is_match(path)) {
            Some(rule) => !rule.exclude,
            None => !self.has_includes,
        }
    }

    /// 保持原顺序返回匹配的路径
    pub fn filter(&self, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter(|p| self.is_match(p))
            .cloned()
            .collect()
    }
}

/// 由文件列表推导需要创建的目录：取父目录，去掉根目录，去重
pub fn derive_folders(files: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter_map(|f| f.rsplit_once('/').map(|(dir, _)| dir))
        .filter(|dir| !dir.is_empty() && *dir != ".")
        .filter(|dir| seen.insert(dir.to_string()))
        .map(str::to_string)
        .collect()
}
