//! 持握约束
//!
//! 对象被手持时对提案位姿的平移/旋转夹取。配置是静态的（随对象注册），
//! 求解状态是动态的（累计角跟踪、进入/退出混合）。
//!
//! 带可抓取父对象的对象在父参考系内求解，根对象在世界空间求解。

mod rotation;
mod solver;

pub use solver::{solve, solve_blended};

use glam::Vec3;

use crate::math::Pose;
use crate::transition::TransitionTimer;

// ============================================================================
// 轴
// ============================================================================

/// 坐标轴标识
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// 单位向量
    #[inline]
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }

    /// 分量下标
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

// ============================================================================
// 平移约束
// ============================================================================

/// 平移约束模式
#[derive(Clone, Copy, Debug, Default)]
pub enum TranslationConstraint {
    /// 无限制
    #[default]
    Free,
    /// 位置钉死在参考位姿
    Locked,
    /// 以参考位置为中心的轴对齐盒
    Box { half_extents: Vec3 },
    /// 以参考位置为中心的球
    Sphere { radius: f32 },
    /// 相对参考位姿的本地轴偏移区间（逐轴）
    LocalOffset { min: Vec3, max: Vec3 },
}

impl TranslationConstraint {
    /// 是否有生效的限制
    #[inline]
    pub fn is_active(&self) -> bool {
        !matches!(self, TranslationConstraint::Free)
    }
}

// ============================================================================
// 旋转约束
// ============================================================================

/// 逐轴旋转限制（弧度，可超过 ±2π）
///
/// 一个轴的 min 与 max 都为 0 时视为锁死；否则该轴激活。恰好一个激活轴走
/// 单轴累计角路径，两个或三个激活轴走纵轴分解路径。
#[derive(Clone, Copy, Debug)]
pub struct RotationLimits {
    /// 逐轴下限
    pub limit_min: Vec3,
    /// 逐轴上限
    pub limit_max: Vec3,
    /// 三轴都激活时的纵轴（两轴激活时取未激活轴，此字段被忽略）
    pub longitudinal: Option<Axis>,
}

impl RotationLimits {
    /// 创建限制，逐分量整理 min <= max
    pub fn new(limit_min: Vec3, limit_max: Vec3) -> Self {
        Self {
            limit_min: limit_min.min(limit_max),
            limit_max: limit_min.max(limit_max),
            longitudinal: None,
        }
    }

    /// 指定纵轴
    pub fn with_longitudinal(mut self, axis: Axis) -> Self {
        self.longitudinal = Some(axis);
        self
    }

    /// 某轴是否激活（min 或 max 非零）
    #[inline]
    pub fn axis_active(&self, axis: Axis) -> bool {
        let i = axis.index();
        self.limit_min[i] != 0.0 || self.limit_max[i] != 0.0
    }

    /// 激活轴数量
    pub fn active_count(&self) -> usize {
        [Axis::X, Axis::Y, Axis::Z]
            .iter()
            .filter(|&&a| self.axis_active(a))
            .count()
    }

    /// 恰好一个激活轴时返回它
    pub fn single_axis(&self) -> Option<Axis> {
        let x = self.axis_active(Axis::X);
        let y = self.axis_active(Axis::Y);
        let z = self.axis_active(Axis::Z);

        if x && !y && !z {
            Some(Axis::X)
        } else if y && !x && !z {
            Some(Axis::Y)
        } else if z && !x && !y {
            Some(Axis::Z)
        } else {
            None
        }
    }

    /// 某轴的 (min, max)
    #[inline]
    pub fn limits_for(&self, axis: Axis) -> (f32, f32) {
        let i = axis.index();
        (self.limit_min[i], self.limit_max[i])
    }

    /// 分解路径使用的纵轴
    ///
    /// 两轴激活时取未激活的那根；三轴激活时取用户指定，缺省回退 Z。
    pub fn longitudinal_axis(&self) -> Axis {
        let inactive: Vec<Axis> = [Axis::X, Axis::Y, Axis::Z]
            .iter()
            .copied()
            .filter(|&a| !self.axis_active(a))
            .collect();
        match inactive.len() {
            1 => inactive[0],
            _ => self.longitudinal.unwrap_or(Axis::Z),
        }
    }
}

/// 旋转约束模式
#[derive(Clone, Copy, Debug, Default)]
pub enum RotationConstraint {
    /// 无限制
    #[default]
    Free,
    /// 旋转钉死在参考位姿
    Locked,
    /// 逐轴限制
    Limits(RotationLimits),
}

impl RotationConstraint {
    /// 是否有生效的限制
    #[inline]
    pub fn is_active(&self) -> bool {
        !matches!(self, RotationConstraint::Free)
    }
}

// ============================================================================
// 约束配置
// ============================================================================

/// 对象的持握约束配置
#[derive(Clone, Copy, Debug, Default)]
pub struct Constraint {
    /// 平移部分
    pub translation: TranslationConstraint,
    /// 旋转部分
    pub rotation: RotationConstraint,
}

impl Constraint {
    /// 无约束
    pub fn free() -> Self {
        Self::default()
    }

    /// 仅平移约束
    pub fn translation(mode: TranslationConstraint) -> Self {
        Self {
            translation: mode,
            rotation: RotationConstraint::Free,
        }
    }

    /// 仅旋转限制
    pub fn rotation(limits: RotationLimits) -> Self {
        Self {
            translation: TranslationConstraint::Free,
            rotation: RotationConstraint::Limits(limits),
        }
    }

    /// 任一部分生效即视为受约束
    #[inline]
    pub fn is_active(&self) -> bool {
        self.translation.is_active() || self.rotation.is_active()
    }
}

// ============================================================================
// 求解状态
// ============================================================================

/// 单轴累计角跟踪
///
/// 假定相邻两帧的角度变化小于 180 度；跨越 ±180 度时把增量折算进累计值，
/// 使限制区间可以超过 ±360 度。
#[derive(Clone, Copy, Debug)]
pub(crate) struct AngleTracker {
    /// 累计角（弧度，夹取后的值）
    pub(crate) cumulative: f32,
    /// 上次夹取输出对应的原始测量角
    pub(crate) prev_raw: f32,
}

/// 约束求解的动态状态
#[derive(Clone, Debug)]
pub struct ConstraintState {
    /// 参考位姿（父本地或世界空间，抓取时捕获）
    pub(crate) initial: Option<Pose>,
    /// 单轴累计角跟踪
    pub(crate) tracker: Option<AngleTracker>,
    /// 进入/退出混合计时器
    pub(crate) blend: TransitionTimer,
    /// 混合起点位姿
    pub(crate) blend_from: Pose,
    /// 当前是否处于约束生效态（控制器维护的边沿检测基准）
    pub(crate) engaged: bool,
}

impl ConstraintState {
    /// 空状态
    pub fn new() -> Self {
        Self {
            initial: None,
            tracker: None,
            blend: TransitionTimer::new(),
            blend_from: Pose::IDENTITY,
            engaged: false,
        }
    }

    /// 捕获参考位姿并清空累计角
    pub(crate) fn capture(&mut self, reference: Pose) {
        self.initial = Some(reference);
        self.tracker = None;
    }

    /// 丢弃全部状态
    pub(crate) fn clear(&mut self) {
        self.initial = None;
        self.tracker = None;
        self.blend.finish();
        self.engaged = false;
    }

    /// 从给定位姿开始一次进入/退出混合
    pub(crate) fn begin_blend(&mut self, from: Pose, duration: f32) {
        self.blend_from = from;
        self.blend.start(duration);
    }

    /// 参考位姿
    #[inline]
    pub fn reference(&self) -> Option<&Pose> {
        self.initial.as_ref()
    }
}

impl Default for ConstraintState {
    fn default() -> Self {
        Self::new()
    }
}
