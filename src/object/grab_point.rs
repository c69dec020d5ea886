//! 抓取点
//!
//! 对象上的一个命名握持位置：声明接受哪些手、吸附哪些自由度、以何种方式
//! 计算接近度。候选评分与吸附位姿都从这里取规则，真正的选择在 selector 中。

use glam::{Quat, Vec3};

use crate::config::get_config;
use crate::grabber::{HandFlags, HandSide};
use crate::math::Pose;
use crate::object::shape::GrabShape;
use bitflags::bitflags;

// ============================================================================
// 吸附方式
// ============================================================================

bitflags! {
    /// 吸附的自由度
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SnapFlags: u32 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const FULL = Self::POSITION.bits() | Self::ROTATION.bits();
    }
}

impl Default for SnapFlags {
    fn default() -> Self {
        SnapFlags::FULL
    }
}

/// 吸附方向
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SnapTarget {
    /// 对象移动到手上（常见：小物件）
    #[default]
    ObjectToHand,
    /// 手移动到对象上（常见：固定把手、受约束对象）
    HandToObject,
}

/// 接近度判定方式
#[derive(Clone, Copy, Debug, Default)]
pub enum ProximityMode {
    /// 按到吸附位置的欧氏距离
    #[default]
    Distance,
    /// 对象本地空间包围盒；盒外候选距离被抬到不可达常量
    Volume { min: Vec3, max: Vec3 },
}

// ============================================================================
// 抓取点
// ============================================================================

/// 对象上的握持位置描述（静态数据，注册后只读）
#[derive(Debug)]
pub struct GrabPoint {
    /// 名称（调试用）
    pub name: String,

    /// 对象本地位姿
    pub local: Pose,

    /// 接受的手侧
    pub hands: HandFlags,

    /// 吸附自由度
    pub snap: SnapFlags,

    /// 吸附方向
    pub snap_target: SnapTarget,

    /// 接近度判定
    pub proximity: ProximityMode,

    /// 最大抓取距离（None 取全局默认）
    pub max_grab_distance: Option<f32>,

    /// 旋转失配惩罚权重（米/弧度，0 关闭）
    pub rotation_penalty: f32,

    /// 手姿态资源标识（外部查表用）
    pub pose_id: Option<u32>,

    /// 手姿态混合上限
    pub pose_blend: f32,

    /// 几何细化形状
    pub shape: Option<Box<dyn GrabShape>>,

    /// 是否启用
    pub enabled: bool,
}

impl GrabPoint {
    /// 在对象本地位姿处创建抓取点
    pub fn new(local: Pose) -> Self {
        Self {
            name: String::new(),
            local,
            hands: HandFlags::BOTH,
            snap: SnapFlags::FULL,
            snap_target: SnapTarget::ObjectToHand,
            proximity: ProximityMode::Distance,
            max_grab_distance: None,
            rotation_penalty: 0.0,
            pose_id: None,
            pose_blend: 1.0,
            shape: None,
            enabled: true,
        }
    }

    /// 设置名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 限定接受的手侧
    pub fn with_hands(mut self, hands: HandFlags) -> Self {
        self.hands = hands;
        self
    }

    /// 设置吸附自由度
    pub fn with_snap(mut self, snap: SnapFlags) -> Self {
        self.snap = snap;
        self
    }

    /// 设置吸附方向
    pub fn with_snap_target(mut self, target: SnapTarget) -> Self {
        self.snap_target = target;
        self
    }

    /// 改用包围盒接近度（对象本地空间）
    pub fn with_proximity_volume(mut self, min: Vec3, max: Vec3) -> Self {
        self.proximity = ProximityMode::Volume {
            min: min.min(max),
            max: min.max(max),
        };
        self
    }

    /// 覆盖最大抓取距离
    pub fn with_reach(mut self, distance: f32) -> Self {
        self.max_grab_distance = Some(distance);
        self
    }

    /// 开启旋转失配惩罚
    pub fn with_rotation_penalty(mut self, weight: f32) -> Self {
        self.rotation_penalty = weight.max(0.0);
        self
    }

    /// 绑定手姿态资源
    pub fn with_pose(mut self, pose_id: u32, blend: f32) -> Self {
        self.pose_id = Some(pose_id);
        self.pose_blend = blend.clamp(0.0, 1.0);
        self
    }

    /// 附加几何形状
    pub fn with_shape(mut self, shape: Box<dyn GrabShape>) -> Self {
        self.shape = Some(shape);
        self
    }

    /// 该点是否接受给定手侧
    #[inline]
    pub fn accepts_hand(&self, hand: HandSide) -> bool {
        self.hands.contains(hand.flag())
    }

    /// 是否同时吸附位置与旋转
    #[inline]
    pub fn snaps_fully(&self) -> bool {
        self.snap.contains(SnapFlags::FULL)
    }

    /// 生效的最大抓取距离
    #[inline]
    pub fn reach(&self) -> f32 {
        self.max_grab_distance
            .unwrap_or_else(|| get_config().default_max_grab_distance)
    }

    /// 抓取点世界位姿
    #[inline]
    pub fn world(&self, object_pose: &Pose) -> Pose {
        object_pose.transform(&self.local)
    }

    /// 接近度参考位置（形状最近点，或点本身）
    pub fn proximity_position(&self, object_pose: &Pose, grabber_pos: Vec3) -> Vec3 {
        let world = self.world(object_pose);
        match &self.shape {
            Some(shape) => shape.closest_point(&world, grabber_pos),
            None => world.position,
        }
    }

    /// 抓取器是否处于接近度包围盒内（Distance 模式恒为真）
    pub fn in_proximity_volume(&self, object_pose: &Pose, grabber_pos: Vec3) -> bool {
        match self.proximity {
            ProximityMode::Distance => true,
            ProximityMode::Volume { min, max } => {
                let local = object_pose.inverse().transform_point(grabber_pos);
                local.cmpge(min).all() && local.cmple(max).all()
            }
        }
    }

    /// 给定抓取器位姿的吸附位姿（世界空间）
    pub fn resolve_snap(&self, object_pose: &Pose, grabber_pose: &Pose) -> Pose {
        let world = self.world(object_pose);
        match &self.shape {
            Some(shape) => shape.snap_pose(&world, grabber_pose),
            None => world,
        }
    }

    /// 吸附旋转（惩罚项用）
    pub fn snap_rotation(&self, object_pose: &Pose, grabber_pose: &Pose) -> Quat {
        self.resolve_snap(object_pose, grabber_pose).rotation
    }

    /// 两只手能否同时握住这个点
    #[inline]
    pub fn allows_colocation(&self) -> bool {
        self.shape
            .as_ref()
            .map(|s| s.allows_colocation())
            .unwrap_or(false)
    }
}
