//! CBT 阶段跟踪器
//!
//! 四个治疗阶段的有穷状态机：识别自动思维 → 确定思想陷阱 →
//! 挑战自动思维 → 回归现实思维。只允许向前推进且一次只进一个阶段；
//! 每阶段的完成要素清单和轮次预算都是数据，不是硬编码逻辑。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// CBT 阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CbtStage {
    Stage1,
    Stage2,
    Stage3,
    Stage4,
}

impl CbtStage {
    pub const ALL: [CbtStage; 4] = [
        CbtStage::Stage1,
        CbtStage::Stage2,
        CbtStage::Stage3,
        CbtStage::Stage4,
    ];

    pub fn index(&self) -> usize {
        match self {
            CbtStage::Stage1 => 0,
            CbtStage::Stage2 => 1,
            CbtStage::Stage3 => 2,
            CbtStage::Stage4 => 3,
        }
    }

    /// 相邻的下一阶段；最后一个阶段返回 None
    pub fn next(&self) -> Option<CbtStage> {
        match self {
            CbtStage::Stage1 => Some(CbtStage::Stage2),
            CbtStage::Stage2 => Some(CbtStage::Stage3),
            CbtStage::Stage3 => Some(CbtStage::Stage4),
            CbtStage::Stage4 => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            CbtStage::Stage1 => "stage_1",
            CbtStage::Stage2 => "stage_2",
            CbtStage::Stage3 => "stage_3",
            CbtStage::Stage4 => "stage_4",
        }
    }
}

/// 单个阶段的静态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// 阶段名称
    pub name: String,
    /// 阶段描述
    pub description: String,
    /// 完成要素清单（全部满足即可提前进入下一阶段）
    pub criteria: Vec<String>,
    /// 轮次预算（用尽后强制推进，保证活性）
    pub turn_budget: u32,
    /// 分步子问题（3-5 条，阶段内按序使用、不重复）
    pub sub_questions: Vec<String>,
}

/// 内置的四阶段默认配置
static DEFAULT_STAGES: Lazy<[StageSpec; 4]> = Lazy::new(|| {
    [
        StageSpec {
            name: "识别自动思维".into(),
            description: "帮助来访者觉察情境之下最先冒出来的念头".into(),
            criteria: vec![
                "情境描述".into(),
                "情绪命名".into(),
                "自动思维陈述".into(),
            ],
            turn_budget: 5,
            sub_questions: vec![
                "最近一次情绪波动时，当时发生了什么？".into(),
                "那个瞬间你的感受是什么？".into(),
                "脑海里最先冒出来的想法是什么？".into(),
                "这个想法出现时你做了什么？".into(),
            ],
        },
        StageSpec {
            name: "确定思想陷阱".into(),
            description: "识别自动思维中的认知歪曲模式".into(),
            criteria: vec!["思维模式归类".into(), "陷阱实例确认".into()],
            turn_budget: 5,
            sub_questions: vec![
                "这个想法是不是把事情看成了非黑即白？".into(),
                "你有没有在用一次经历推断所有情况？".into(),
                "你觉得这个想法里有哪些夸大的成分？".into(),
            ],
        },
        StageSpec {
            name: "挑战自动思维".into(),
            description: "检视支持与反对的证据，松动原有信念".into(),
            criteria: vec![
                "支持证据检视".into(),
                "反对证据检视".into(),
                "替代解释提出".into(),
            ],
            turn_budget: 5,
            sub_questions: vec![
                "有哪些事实支持这个想法？".into(),
                "有哪些事实和这个想法矛盾？".into(),
                "如果朋友这样想，你会怎么劝他？".into(),
                "还有没有别的解释方式？".into(),
            ],
        },
        StageSpec {
            name: "回归现实思维".into(),
            description: "用更平衡的想法替代原有自动思维并落实到行动".into(),
            criteria: vec!["现实思维表述".into(), "行动计划制定".into()],
            turn_budget: 5,
            sub_questions: vec![
                "现在再看那个情境，更贴近现实的想法是什么？".into(),
                "带着新的想法，你接下来打算怎么做？".into(),
                "下次再出现类似念头时，你可以提醒自己什么？".into(),
            ],
        },
    ]
});

/// 阶段配置目录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCatalog {
    stages: Vec<StageSpec>,
}

impl StageCatalog {
    /// 内置默认目录，轮次预算统一覆盖为给定值
    pub fn with_turn_budget(turn_budget: u32) -> Self {
        let mut stages: Vec<StageSpec> = DEFAULT_STAGES.to_vec();
        for stage in &mut stages {
            stage.turn_budget = turn_budget;
        }
        Self { stages }
    }

    pub fn new(stages: Vec<StageSpec>) -> Self {
        assert_eq!(stages.len(), 4, "CBT catalog must define exactly 4 stages");
        Self { stages }
    }

    pub fn spec(&self, stage: CbtStage) -> &StageSpec {
        &self.stages[stage.index()]
    }
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self {
            stages: DEFAULT_STAGES.to_vec(),
        }
    }
}

/// 一轮评估之后的推进结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageProgress {
    /// 留在当前阶段
    Continue,
    /// 进入下一阶段
    Advanced(CbtStage),
    /// 第四阶段完成，治疗环节结束
    TherapyComplete,
}

/// CBT 阶段运行时状态
///
/// 阶段下标单调不减；子问题游标每阶段独立，从 0 开始。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTracker {
    current: CbtStage,
    turns: [u32; 4],
    satisfied: [Vec<String>; 4],
    cursor: [usize; 4],
    finished: bool,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: CbtStage::Stage1,
            turns: [0; 4],
            satisfied: Default::default(),
            cursor: [0; 4],
            finished: false,
        }
    }

    pub fn current(&self) -> CbtStage {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 当前阶段已进行的轮次
    pub fn turns_in_stage(&self) -> u32 {
        self.turns[self.current.index()]
    }

    /// 当前阶段已满足的完成要素
    pub fn satisfied_criteria(&self) -> &[String] {
        &self.satisfied[self.current.index()]
    }

    /// 取出当前阶段的下一条子问题
    ///
    /// 阶段内按序不重复；列表耗尽后沿用最后一条作为延伸问法。
    pub fn next_sub_question<'a>(&mut self, spec: &'a StageSpec) -> Option<&'a str> {
        if spec.sub_questions.is_empty() {
            return None;
        }
        let idx = self.cursor[self.current.index()];
        let question = spec
            .sub_questions
            .get(idx)
            .or_else(|| spec.sub_questions.last())?;
        self.cursor[self.current.index()] = idx + 1;
        Some(question.as_str())
    }

    /// 记录一轮对话完成
    pub fn record_turn(&mut self) {
        self.turns[self.current.index()] += 1;
    }

    /// 标记本轮新满足的完成要素
    ///
    /// 只接受清单内的名字；评估失败时传入空集即可（靠轮次预算推进）。
    pub fn mark_satisfied(&mut self, spec: &StageSpec, newly_satisfied: &[String]) {
        let bucket = &mut self.satisfied[self.current.index()];
        for name in newly_satisfied {
            if spec.criteria.contains(name) && !bucket.contains(name) {
                bucket.push(name.clone());
            }
        }
    }

    /// 判定是否推进：要素齐备或轮次预算耗尽
    ///
    /// 第四阶段完成时结束治疗环节而不是继续转移。
    pub fn evaluate_progress(&mut self, spec: &StageSpec) -> StageProgress {
        if self.finished {
            return StageProgress::TherapyComplete;
        }

        let idx = self.current.index();
        let all_satisfied =
            !spec.criteria.is_empty() && self.satisfied[idx].len() >= spec.criteria.len();
        let budget_exhausted = self.turns[idx] >= spec.turn_budget;

        if !all_satisfied && !budget_exhausted {
            return StageProgress::Continue;
        }

        match self.current.next() {
            Some(next) => {
                self.current = next;
                StageProgress::Advanced(next)
            }
            None => {
                self.finished = true;
                StageProgress::TherapyComplete
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StageCatalog {
        StageCatalog::with_turn_budget(3)
    }

    #[test]
    fn test_stage_advances_when_all_criteria_satisfied() {
        let catalog = catalog();
        let mut tracker = StageTracker::new();
        let spec = catalog.spec(tracker.current()).clone();

        tracker.record_turn();
        tracker.mark_satisfied(&spec, &spec.criteria.clone());

        assert_eq!(
            tracker.evaluate_progress(&spec),
            StageProgress::Advanced(CbtStage::Stage2)
        );
    }

    #[test]
    fn test_stage_advances_on_budget_even_without_criteria() {
        let catalog = catalog();
        let mut tracker = StageTracker::new();

        // 评估器始终没有判定任何要素满足
        for _ in 0..3 {
            let spec = catalog.spec(tracker.current()).clone();
            tracker.record_turn();
            tracker.mark_satisfied(&spec, &[]);
        }
        let spec = catalog.spec(tracker.current()).clone();
        assert_eq!(
            tracker.evaluate_progress(&spec),
            StageProgress::Advanced(CbtStage::Stage2)
        );
    }

    #[test]
    fn test_stage_index_is_monotonic_under_any_trace() {
        let catalog = catalog();
        let mut tracker = StageTracker::new();
        let mut last_index = tracker.current().index();

        // 任意评估序列下阶段下标不回退
        for turn in 0..40 {
            if tracker.is_finished() {
                break;
            }
            let spec = catalog.spec(tracker.current()).clone();
            tracker.record_turn();
            if turn % 3 == 0 {
                tracker.mark_satisfied(&spec, &spec.criteria[..1].to_vec());
            }
            tracker.evaluate_progress(&spec);
            assert!(tracker.current().index() >= last_index);
            last_index = tracker.current().index();
        }
    }

    #[test]
    fn test_therapy_completes_within_total_budget() {
        let catalog = catalog();
        let mut tracker = StageTracker::new();
        let mut turns = 0;

        while !tracker.is_finished() {
            let spec = catalog.spec(tracker.current()).clone();
            tracker.record_turn();
            tracker.mark_satisfied(&spec, &[]);
            tracker.evaluate_progress(&spec);
            turns += 1;
            assert!(turns <= 4 * 3, "therapy must finish within 4 * budget turns");
        }
        assert_eq!(turns, 4 * 3);
    }

    #[test]
    fn test_unknown_criteria_are_ignored() {
        let catalog = catalog();
        let mut tracker = StageTracker::new();
        let spec = catalog.spec(tracker.current()).clone();

        tracker.mark_satisfied(&spec, &["不存在的要素".to_string()]);
        assert!(tracker.satisfied_criteria().is_empty());
    }

    #[test]
    fn test_sub_questions_no_repetition_then_reuse_last() {
        let catalog = StageCatalog::default();
        let mut tracker = StageTracker::new();
        let spec = catalog.spec(CbtStage::Stage1).clone();

        let mut seen = Vec::new();
        for _ in 0..spec.sub_questions.len() {
            seen.push(tracker.next_sub_question(&spec).unwrap().to_string());
        }
        // 阶段内不重复
        let mut dedup = seen.clone();
        dedup.dedup();
        assert_eq!(seen.len(), dedup.len());

        // 耗尽后沿用最后一条
        let overflow = tracker.next_sub_question(&spec).unwrap();
        assert_eq!(overflow, seen.last().unwrap());
    }

    #[test]
    fn test_cursor_is_fresh_after_stage_transition() {
        let catalog = StageCatalog::with_turn_budget(1);
        let mut tracker = StageTracker::new();

        let spec1 = catalog.spec(CbtStage::Stage1).clone();
        let first_of_stage1 = tracker.next_sub_question(&spec1).unwrap().to_string();
        tracker.record_turn();
        tracker.evaluate_progress(&spec1);
        assert_eq!(tracker.current(), CbtStage::Stage2);

        let spec2 = catalog.spec(CbtStage::Stage2).clone();
        let first_of_stage2 = tracker.next_sub_question(&spec2).unwrap();
        assert_eq!(first_of_stage2, spec2.sub_questions[0]);
        assert_ne!(first_of_stage2, first_of_stage1);
    }
}
