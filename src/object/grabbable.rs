//! 可抓取对象
//!
//! 场景中可被手持的实体：携带 1..N 个抓取点、约束配置、锚点兼容标签与
//! 依赖关系声明。注册后静态数据只读，动态数据每帧由控制器推进。

use glam::Vec3;

use crate::constraint::{Constraint, ConstraintState};
use crate::math::Pose;
use crate::object::grab_point::GrabPoint;
use crate::object::ObjectFlags;
use crate::transition::TransitionTimer;

// ============================================================================
// 放置滑移
// ============================================================================

/// 在途的锚点放置过渡（占位已生效，位姿仍在滑向锚点）
#[derive(Clone, Copy, Debug)]
pub struct PlacementGlide {
    /// 目标锚点
    pub anchor: usize,
    /// 起始位姿
    pub from: Pose,
    /// 滑移计时器
    pub timer: TransitionTimer,
}

// ============================================================================
// 可抓取对象
// ============================================================================

/// 可抓取实体
#[derive(Debug)]
pub struct Grabbable {
    // ========================================
    // 静态数据（注册后只读）
    // ========================================

    /// 名称（调试用）
    pub name: String,

    /// 抓取点列表（至少一个）
    pub points: Vec<GrabPoint>,

    /// 选择优先级（大者先选）
    pub priority: i32,

    /// 行为开关
    pub flags: ObjectFlags,

    /// 锚点兼容标签掩码（0 表示匹配任意锚点）
    pub tags: u32,

    /// 持握约束配置
    pub constraint: Constraint,

    // ========================================
    // 依赖关系（结构变更时改写）
    // ========================================

    /// 最近可抓取祖先
    pub(crate) parent: Option<usize>,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================

    /// 是否启用
    pub enabled: bool,

    /// 当前世界位姿
    pub pose: Pose,

    /// 本帧更新前位姿快照
    pub(crate) prev_pose: Pose,

    /// 当前所在锚点
    pub(crate) anchor: Option<usize>,

    /// 约束求解动态状态
    pub(crate) constraint_state: ConstraintState,

    /// 在途放置过渡
    pub(crate) placement: Option<PlacementGlide>,
}

impl Grabbable {
    /// 创建对象，至少带一个原点抓取点
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: vec![GrabPoint::new(Pose::IDENTITY)],
            priority: 0,
            flags: ObjectFlags::default(),
            tags: 0,
            constraint: Constraint::free(),
            parent: None,
            enabled: true,
            pose: Pose::IDENTITY,
            prev_pose: Pose::IDENTITY,
            anchor: None,
            constraint_state: ConstraintState::new(),
            placement: None,
        }
    }

    /// 替换抓取点列表（空列表被忽略）
    pub fn with_points(mut self, points: Vec<GrabPoint>) -> Self {
        if !points.is_empty() {
            self.points = points;
        }
        self
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 设置行为开关
    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 设置锚点标签掩码
    pub fn with_tags(mut self, tags: u32) -> Self {
        self.tags = tags;
        self
    }

    /// 设置约束配置
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// 设置初始世界位姿
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self.prev_pose = pose;
        self
    }

    // ========================================
    // 查询
    // ========================================

    /// 抓取点访问
    #[inline]
    pub fn point(&self, index: usize) -> Option<&GrabPoint> {
        self.points.get(index)
    }

    /// 是否在锚点上
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// 所在锚点
    #[inline]
    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    /// 可抓取父对象
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// 是否允许多手持握
    #[inline]
    pub fn allows_multi_grab(&self) -> bool {
        self.flags.contains(ObjectFlags::MULTI_GRAB)
    }

    /// 是否可放置到锚点
    #[inline]
    pub fn is_placeable(&self) -> bool {
        self.flags.contains(ObjectFlags::PLACEABLE)
    }

    /// 是否携带生效的约束配置
    #[inline]
    pub fn is_constrained(&self) -> bool {
        self.constraint.is_active()
    }

    /// 对象中心世界位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    /// 是否依赖父对象（被持父对象驱动、延后到第二遍处理）
    #[inline]
    pub fn is_dependent(&self) -> bool {
        self.parent.is_some() && !self.flags.contains(ObjectFlags::PARENT_INDEPENDENT)
    }

    /// 被持时是否反向牵引父对象朝向
    #[inline]
    pub fn steers_parent(&self) -> bool {
        self.is_dependent() && self.flags.contains(ObjectFlags::CONTROL_PARENT_DIRECTION)
    }

    /// 标签是否与锚点掩码兼容（任一侧为 0 视为通配）
    #[inline]
    pub fn tags_match(&self, anchor_tags: u32) -> bool {
        anchor_tags == 0 || self.tags == 0 || (self.tags & anchor_tags) != 0
    }

    // ========================================
    // 状态推进（crate 内部）
    // ========================================

    /// 捕获约束参考位姿（父对象本地或世界空间）
    pub(crate) fn capture_initial_pose(&mut self, parent_pose: Option<&Pose>) {
        let reference = match parent_pose {
            Some(parent) => parent.relative_to(&self.pose),
            None => self.pose,
        };
        self.constraint_state.capture(reference);
    }

    /// 帧首快照
    #[inline]
    pub(crate) fn snapshot_pose(&mut self) {
        self.prev_pose = self.pose;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::grab_point::GrabPoint;

    #[test]
    fn test_default_flags() {
        let o = Grabbable::new("cup");
        assert!(o.is_placeable());
        assert!(!o.allows_multi_grab());
        assert!(!o.is_dependent());
        assert_eq!(o.points.len(), 1);
    }

    #[test]
    fn test_empty_point_list_ignored() {
        let o = Grabbable::new("cup").with_points(Vec::new());
        assert_eq!(o.points.len(), 1);
    }

    #[test]
    fn test_dependency_flags() {
        let mut o = Grabbable::new("stock")
            .with_flags(ObjectFlags::PLACEABLE | ObjectFlags::CONTROL_PARENT_DIRECTION);
        o.parent = Some(3);
        assert!(o.is_dependent());
        assert!(o.steers_parent());

        o.flags |= ObjectFlags::PARENT_INDEPENDENT;
        assert!(!o.is_dependent());
        assert!(!o.steers_parent());
    }

    #[test]
    fn test_tag_wildcards() {
        let o = Grabbable::new("tool").with_tags(0b0110);
        assert!(o.tags_match(0));
        assert!(o.tags_match(0b0100));
        assert!(!o.tags_match(0b1000));
        let untagged = Grabbable::new("any");
        assert!(untagged.tags_match(0b1000));
    }

    #[test]
    fn test_point_accessor_bounds() {
        let o = Grabbable::new("cup").with_points(vec![GrabPoint::new(Pose::IDENTITY)]);
        assert!(o.point(0).is_some());
        assert!(o.point(1).is_none());
    }
}
