//! 锚点（放置插槽）
//!
//! 一个锚点最多容纳一个对象。标签掩码决定哪些对象可以被自动放置搜索选中；
//! 掩码任一侧为 0 视为通配。占位在放置滑移开始的瞬间就已生效，滑移期间
//! 排他性不被打破。

use glam::Vec3;

use crate::config::get_config;
use crate::math::Pose;

/// 放置插槽
#[derive(Clone, Debug)]
pub struct Anchor {
    // ========================================
    // 静态数据（注册后只读）
    // ========================================

    /// 名称（调试用）
    pub name: String,

    /// 兼容标签掩码（0 表示接受任意对象）
    pub tags: u32,

    /// 最大放置距离（None 取全局默认）
    pub max_place_distance: Option<f32>,

    // ========================================
    // 动态数据
    // ========================================

    /// 是否启用
    pub enabled: bool,

    /// 世界位姿
    pub pose: Pose,

    /// 当前占位对象
    pub(crate) occupant: Option<usize>,

    /// 本帧最近候选（被持对象, 持有它的抓取器），边沿触发提示用
    pub(crate) candidate: Option<(usize, usize)>,
}

impl Anchor {
    /// 在给定世界位姿创建锚点
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            tags: 0,
            max_place_distance: None,
            enabled: true,
            pose,
            occupant: None,
            candidate: None,
        }
    }

    /// 设置兼容标签掩码
    pub fn with_tags(mut self, tags: u32) -> Self {
        self.tags = tags;
        self
    }

    /// 覆盖最大放置距离
    pub fn with_range(mut self, distance: f32) -> Self {
        self.max_place_distance = Some(distance);
        self
    }

    /// 是否已被占用
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    /// 当前占位对象
    #[inline]
    pub fn occupant(&self) -> Option<usize> {
        self.occupant
    }

    /// 生效的最大放置距离
    #[inline]
    pub fn range(&self) -> f32 {
        self.max_place_distance
            .unwrap_or_else(|| get_config().default_max_place_distance)
    }

    /// 标签是否兼容（任一侧为 0 视为通配）
    #[inline]
    pub fn accepts_tags(&self, object_tags: u32) -> bool {
        self.tags == 0 || object_tags == 0 || (self.tags & object_tags) != 0
    }

    /// 给定位置是否在放置范围内
    #[inline]
    pub fn in_range(&self, position: Vec3) -> bool {
        (position - self.pose.position).length() <= self.range()
    }
}
