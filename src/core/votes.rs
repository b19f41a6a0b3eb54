//! 投票列表与多数表决

use std::collections::HashMap;

/// 空批量时的哨兵标签
pub const NONE_LABEL: &str = "none";

/// 一次分类周期的结果：每张图像一个标签，空批量时为 `["none"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteList {
    labels: Vec<String>,
}

impl VoteList {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn none() -> Self {
        Self {
            labels: vec![NONE_LABEL.to_string()],
        }
    }

    pub fn is_none(&self) -> bool {
        self.labels.len() == 1 && self.labels[0] == NONE_LABEL
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// 多数表决，见 [`majority`]
    pub fn majority(&self) -> &str {
        majority(&self.labels)
    }
}

impl Default for VoteList {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<String>> for VoteList {
    fn from(labels: Vec<String>) -> Self {
        Self::new(labels)
    }
}

impl<'a> From<Vec<&'a str>> for VoteList {
    fn from(labels: Vec<&'a str>) -> Self {
        Self::new(labels.into_iter().map(str::to_string).collect())
    }
}

/// 出现次数最多的标签；并列时取序列中最先出现的那个。空列表返回哨兵。
pub fn majority<S: AsRef<str>>(votes: &[S]) -> &str {
    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(votes.len());
    for vote in votes {
        *counts.entry(vote.as_ref()).or_insert(0) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for vote in votes {
        let label = vote.as_ref();
        let count = counts[label];
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((label, count)),
        }
    }

    best.map(|(label, _)| label).unwrap_or(NONE_LABEL)
}
