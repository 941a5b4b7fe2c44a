//! 话题得分记录表
//!
//! 咨询过程中的强化式话题记账：每轮对话由督导判定一次相关性，
//! 记录表只负责按固定增量集合 {+2, +1, 0, -1} 调整分数，
//! 从不自行推断相关性。

use serde::{Deserialize, Serialize};

/// 话题在记录表中的句柄（注册顺序下标）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TopicId(pub usize);

/// 单轮对话的相关性判定结果
///
/// 由督导（外部分类步骤）产生，每轮恰好一个。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    /// 高度相关
    High,
    /// 部分相关
    Medium,
    /// 不相关
    None,
    /// 偏离到了其他话题（会触发新话题注册）
    Other,
}

impl Relevance {
    /// 相关性对应的固定分数增量
    pub fn delta(&self) -> i32 {
        match self {
            Relevance::High => 2,
            Relevance::Medium => 1,
            Relevance::Other => 0,
            Relevance::None => -1,
        }
    }
}

/// 记录表中的单个话题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    /// 话题名（已做大小写归一化）
    pub name: String,
    /// 当前分数
    pub score: i32,
    /// 作为当前话题被讨论的次数
    pub visits: u32,
}

/// 话题得分记录表
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopicScoreTable {
    /// 按注册顺序保存的话题
    topics: Vec<TopicEntry>,
    /// 当前核心话题
    core: Option<TopicId>,
}

impl TopicScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// 注册话题；已存在时返回原句柄，新话题以 0 分入表
    pub fn register(&mut self, name: &str) -> TopicId {
        let normalized = Self::normalize(name);
        if let Some(idx) = self.topics.iter().position(|t| t.name == normalized) {
            return TopicId(idx);
        }

        self.topics.push(TopicEntry {
            name: normalized,
            score: 0,
            visits: 0,
        });
        TopicId(self.topics.len() - 1)
    }

    /// 注册并指定核心话题，首次出现时以基准分入表
    ///
    /// 侧写完成后由编排器调用一次；重复调用不会覆盖已有分数。
    pub fn seed_core(&mut self, name: &str, initial_score: i32) -> TopicId {
        let normalized = Self::normalize(name);
        let id = match self.topics.iter().position(|t| t.name == normalized) {
            Some(idx) => TopicId(idx),
            None => {
                self.topics.push(TopicEntry {
                    name: normalized,
                    score: initial_score,
                    visits: 0,
                });
                TopicId(self.topics.len() - 1)
            }
        };
        self.core = Some(id);
        id
    }

    /// 按固定增量调整分数
    ///
    /// 记录表的唯一变更入口；增量必须来自 {+2, +1, 0, -1}。
    pub fn apply_delta(&mut self, id: TopicId, delta: i32) {
        debug_assert!(
            matches!(delta, -1 | 0 | 1 | 2),
            "delta must be one of {{+2, +1, 0, -1}}, got {delta}"
        );
        if let Some(entry) = self.topics.get_mut(id.0) {
            entry.score += delta;
        }
    }

    /// 记一次讨论
    pub fn visit(&mut self, id: TopicId) {
        if let Some(entry) = self.topics.get_mut(id.0) {
            entry.visits += 1;
        }
    }

    /// 当前核心话题：分数最高者
    ///
    /// 平局规则：若现任核心话题在并列集合内则保持不变（防止话题震荡），
    /// 否则取并列中最早注册的话题。
    pub fn core_topic(&mut self) -> Option<TopicId> {
        let max_score = self.topics.iter().map(|t| t.score).max()?;
        let tied: Vec<TopicId> = self
            .topics
            .iter()
            .enumerate()
            .filter(|(_, t)| t.score == max_score)
            .map(|(idx, _)| TopicId(idx))
            .collect();

        let winner = match self.core {
            Some(current) if tied.contains(&current) => current,
            _ => tied[0],
        };

        self.core = Some(winner);
        Some(winner)
    }

    /// 话题名
    pub fn name(&self, id: TopicId) -> Option<&str> {
        self.topics.get(id.0).map(|t| t.name.as_str())
    }

    /// 上次判定出的核心话题名（不重新判定）
    pub fn core_name(&self) -> Option<&str> {
        self.core.and_then(|id| self.name(id))
    }

    /// 所有已注册话题名（注册顺序）
    pub fn names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }

    /// 话题当前分数
    pub fn score(&self, id: TopicId) -> Option<i32> {
        self.topics.get(id.0).map(|t| t.score)
    }

    /// 按 id 查找已注册话题
    pub fn find(&self, name: &str) -> Option<TopicId> {
        let normalized = Self::normalize(name);
        self.topics
            .iter()
            .position(|t| t.name == normalized)
            .map(TopicId)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// 全部话题（注册顺序）
    pub fn entries(&self) -> &[TopicEntry] {
        &self.topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Relevance::High, 2)]
    #[case(Relevance::Medium, 1)]
    #[case(Relevance::Other, 0)]
    #[case(Relevance::None, -1)]
    fn test_relevance_delta(#[case] relevance: Relevance, #[case] expected: i32) {
        assert_eq!(relevance.delta(), expected);
    }

    #[test]
    fn test_score_equals_baseline_plus_deltas() {
        let mut table = TopicScoreTable::new();
        let core = table.seed_core("学业焦虑", 5);

        let judgments = [
            Relevance::High,
            Relevance::Medium,
            Relevance::None,
            Relevance::Other,
            Relevance::High,
        ];
        let mut expected = 5;
        for j in &judgments {
            table.apply_delta(core, j.delta());
            expected += j.delta();
        }

        assert_eq!(table.score(core), Some(expected));
        assert_eq!(expected, 5 + 2 + 1 - 1 + 0 + 2);
    }

    #[test]
    fn test_register_is_case_normalized_and_idempotent() {
        let mut table = TopicScoreTable::new();
        let a = table.register("Social Anxiety");
        let b = table.register("  social anxiety ");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.score(a), Some(0));
    }

    #[test]
    fn test_seed_core_does_not_overwrite_existing_score() {
        let mut table = TopicScoreTable::new();
        let id = table.register("家庭冲突");
        table.apply_delta(id, 2);

        let seeded = table.seed_core("家庭冲突", 5);
        assert_eq!(seeded, id);
        assert_eq!(table.score(id), Some(2));
    }

    #[test]
    fn test_tie_break_prefers_incumbent_core() {
        let mut table = TopicScoreTable::new();
        let a = table.seed_core("a", 5);
        let b = table.register("b");
        // 把 b 拉到同分
        table.apply_delta(b, 2);
        table.apply_delta(b, 2);
        table.apply_delta(b, 1);
        assert_eq!(table.score(a), table.score(b));

        assert_eq!(table.core_topic(), Some(a));
    }

    #[test]
    fn test_tie_break_falls_back_to_earliest_registered() {
        let mut table = TopicScoreTable::new();
        let a = table.register("a");
        let b = table.register("b");
        let core = table.seed_core("c", 1);

        // a 和 b 并列领先，现任核心 c 落后
        table.apply_delta(a, 2);
        table.apply_delta(b, 2);
        assert!(table.score(a) > table.score(core));

        assert_eq!(table.core_topic(), Some(a));
        let _ = b;
    }

    #[test]
    fn test_core_topic_sticky_across_calls() {
        let mut table = TopicScoreTable::new();
        let a = table.seed_core("a", 5);
        let b = table.register("b");
        for _ in 0..3 {
            table.apply_delta(b, 2);
        }
        // b 现在以 6:5 独占领先
        assert_eq!(table.core_topic(), Some(b));
        // a 追平到 6:6 后，b 作为新任核心在并列时保持
        table.apply_delta(a, 1);
        assert_eq!(table.core_topic(), Some(b));
    }
}
