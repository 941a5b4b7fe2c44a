use serde::{Deserialize, Serialize};

/// 咨询师流派描述符
///
/// 所有咨询师共用同一个通用 Agent 实现，差异（流派、擅长领域、说话风格）
/// 全部由描述符数据注入，不使用子类型层级。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TherapistDescriptor {
    /// 流派标识，如 "cbt"
    pub id: String,
    /// 展示名称
    pub name: String,
    /// 擅长领域
    pub expertise: Vec<String>,
    /// 平局时的优先级（数值越小越优先）
    pub priority: u32,
    /// 说话风格
    pub style: String,
}

impl TherapistDescriptor {
    /// 内置的默认咨询师目录
    pub fn default_catalog() -> Vec<TherapistDescriptor> {
        vec![
            TherapistDescriptor {
                id: "cbt".into(),
                name: "认知行为疗法咨询师".into(),
                expertise: vec!["焦虑".into(), "抑郁".into(), "认知重构".into()],
                priority: 0,
                style: "结构化、引导式提问".into(),
            },
            TherapistDescriptor {
                id: "psychodynamic".into(),
                name: "心理动力学咨询师".into(),
                expertise: vec!["人际关系".into(), "早期经历".into()],
                priority: 1,
                style: "探索性、关注情感联结".into(),
            },
        ]
    }
}

/// 咨询师目录
///
/// 启动时加载一次，之后各处仅通过 id 引用描述符。
#[derive(Debug, Clone)]
pub struct TherapistCatalog {
    descriptors: Vec<TherapistDescriptor>,
}

impl TherapistCatalog {
    pub fn new(mut descriptors: Vec<TherapistDescriptor>) -> Self {
        descriptors.sort_by_key(|d| d.priority);
        Self { descriptors }
    }

    /// 根据流派 id 查找描述符
    pub fn get(&self, id: &str) -> Option<&TherapistDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// 全部流派 id（按优先级排序）
    pub fn candidate_ids(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.id.clone()).collect()
    }

    /// 流派 id 的优先级，目录外的 id 排在最后
    pub fn priority_of(&self, id: &str) -> u32 {
        self.get(id).map(|d| d.priority).unwrap_or(u32::MAX)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TherapistDescriptor> {
        self.descriptors.iter()
    }
}
