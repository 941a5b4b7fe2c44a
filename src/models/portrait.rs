//! 来访者画像
//!
//! 画像是档案环节逐轮累积的事实集合，按类别组织，只追加不回写。

use serde::{Deserialize, Serialize};

/// 画像事实类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PortraitCategory {
    /// 触发事件与生活情境
    Events,
    /// 情绪状态
    Emotions,
    /// 行为与应对方式
    Behaviors,
    /// 人际与支持系统
    Relationships,
}

impl PortraitCategory {
    pub const ALL: [PortraitCategory; 4] = [
        PortraitCategory::Events,
        PortraitCategory::Emotions,
        PortraitCategory::Behaviors,
        PortraitCategory::Relationships,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PortraitCategory::Events => "事件情境",
            PortraitCategory::Emotions => "情绪状态",
            PortraitCategory::Behaviors => "行为表现",
            PortraitCategory::Relationships => "人际支持",
        }
    }
}

/// 一条画像事实，记录它在第几轮被提取
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortraitFact {
    pub category: PortraitCategory,
    pub content: String,
    pub turn: u32,
}

/// 单轮提取出的画像增量
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortraitDelta {
    pub facts: Vec<(PortraitCategory, String)>,
}

impl PortraitDelta {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// 来访者画像，追加式累积
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portrait {
    facts: Vec<PortraitFact>,
}

impl Portrait {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(content: &str) -> String {
        content.trim().to_string()
    }

    /// 合并一轮增量；同类别同内容（去除首尾空白后）只保留首次出现
    pub fn absorb(&mut self, delta: PortraitDelta, turn: u32) -> usize {
        let mut added = 0;
        for (category, content) in delta.facts {
            let content = Self::normalize(&content);
            if content.is_empty() {
                continue;
            }
            let exists = self
                .facts
                .iter()
                .any(|f| f.category == category && f.content == content);
            if !exists {
                self.facts.push(PortraitFact {
                    category,
                    content,
                    turn,
                });
                added += 1;
            }
        }
        added
    }

    pub fn facts(&self) -> &[PortraitFact] {
        &self.facts
    }

    pub fn facts_in(&self, category: PortraitCategory) -> impl Iterator<Item = &PortraitFact> {
        self.facts.iter().filter(move |f| f.category == category)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// 渲染为提示词可用的摘要文本，按类别分组、组内保持提取顺序
    pub fn render(&self) -> String {
        let mut out = String::new();
        for category in PortraitCategory::ALL {
            let items: Vec<&str> = self
                .facts_in(category)
                .map(|f| f.content.as_str())
                .collect();
            if items.is_empty() {
                continue;
            }
            out.push_str(category.label());
            out.push_str("：");
            out.push_str(&items.join("；"));
            out.push('\n');
        }
        if out.is_empty() {
            out.push_str("（暂无画像信息）");
        }
        out
    }
}
