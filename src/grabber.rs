//! 抓取器（手部效应器）
//!
//! 每个 Grabber 绑定到一个化身的一侧手，同一时间最多持有一个可抓取对象。
//! 位姿由宿主每帧喂入；速度在快照阶段由位姿差分得出，并经滑动窗口平滑，
//! 释放速度计算只使用平滑值。

use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::config::get_config;
use crate::math::Pose;
use crate::transition::TransitionTimer;

// ============================================================================
// 手侧
// ============================================================================

/// 手的左右侧
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    /// 转换为兼容位掩码
    #[inline]
    pub fn flag(self) -> HandFlags {
        match self {
            HandSide::Left => HandFlags::LEFT,
            HandSide::Right => HandFlags::RIGHT,
        }
    }
}

bitflags! {
    /// 手侧兼容掩码（抓取点声明自己接受哪些手）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HandFlags: u32 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const BOTH = Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

impl Default for HandFlags {
    fn default() -> Self {
        HandFlags::BOTH
    }
}

// ============================================================================
// 速度平滑
// ============================================================================

/// 速度滑动窗口（环形缓冲，预分配）
#[derive(Clone, Debug)]
pub struct VelocityTracker {
    /// (线速度, 角速度) 样本
    samples: Vec<(Vec3, Vec3)>,
    /// 下一个写入位置
    head: usize,
    /// 已填充样本数
    filled: usize,
}

impl VelocityTracker {
    /// 按配置窗口大小创建
    pub fn new() -> Self {
        let window = get_config().velocity_window.max(1);
        Self {
            samples: vec![(Vec3::ZERO, Vec3::ZERO); window],
            head: 0,
            filled: 0,
        }
    }

    /// 写入一帧样本
    pub fn push(&mut self, linear: Vec3, angular: Vec3) {
        self.samples[self.head] = (linear, angular);
        self.head = (self.head + 1) % self.samples.len();
        self.filled = (self.filled + 1).min(self.samples.len());
    }

    /// 清空（传送 / 重新启用时）
    pub fn reset(&mut self) {
        self.head = 0;
        self.filled = 0;
    }

    /// 窗口平均线速度
    pub fn smoothed_linear(&self) -> Vec3 {
        self.average().0
    }

    /// 窗口平均角速度
    pub fn smoothed_angular(&self) -> Vec3 {
        self.average().1
    }

    fn average(&self) -> (Vec3, Vec3) {
        if self.filled == 0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        let mut lin = Vec3::ZERO;
        let mut ang = Vec3::ZERO;
        for &(l, a) in self.samples.iter().take(self.filled) {
            lin += l;
            ang += a;
        }
        let inv = 1.0 / self.filled as f32;
        (lin * inv, ang * inv)
    }
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 抓取器
// ============================================================================

/// 释放后手回到真实追踪位姿的混合状态
#[derive(Clone, Copy, Debug)]
pub struct HandBlend {
    /// 起始位姿（释放瞬间的锁定位姿）
    pub from: Pose,
    /// 混合计时器
    pub timer: TransitionTimer,
}

/// 手部效应器
#[derive(Clone, Debug)]
pub struct Grabber {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================

    /// 名称（调试用）
    pub name: String,

    /// 手侧
    pub hand: HandSide,

    /// 所属化身
    pub avatar: usize,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================

    /// 是否启用
    pub enabled: bool,

    /// 当前帧原始追踪位姿
    pub pose: Pose,

    /// 上一帧位姿
    pub prev_pose: Pose,

    /// 原始线速度（米/秒）
    pub velocity: Vec3,

    /// 原始角速度（弧度/秒）
    pub angular_velocity: Vec3,

    /// 速度平滑窗口
    pub(crate) tracker: VelocityTracker,

    /// 当前持有的对象索引
    pub(crate) held: Option<usize>,

    /// 释放后手位姿回退混合
    pub(crate) hand_blend: Option<HandBlend>,
}

impl Grabber {
    /// 创建抓取器
    pub fn new(name: impl Into<String>, hand: HandSide) -> Self {
        Self {
            name: name.into(),
            hand,
            avatar: 0,
            enabled: true,
            pose: Pose::IDENTITY,
            prev_pose: Pose::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            tracker: VelocityTracker::new(),
            held: None,
            hand_blend: None,
        }
    }

    /// 指定化身
    pub fn with_avatar(mut self, avatar: usize) -> Self {
        self.avatar = avatar;
        self
    }

    /// 当前持有的对象
    #[inline]
    pub fn held_object(&self) -> Option<usize> {
        self.held
    }

    /// 是否空手
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    /// 平滑线速度
    #[inline]
    pub fn smoothed_velocity(&self) -> Vec3 {
        self.tracker.smoothed_linear()
    }

    /// 平滑角速度
    #[inline]
    pub fn smoothed_angular_velocity(&self) -> Vec3 {
        self.tracker.smoothed_angular()
    }

    /// 从给定位姿启动释放后手回退混合
    pub(crate) fn begin_hand_blend(&mut self, from: Pose) {
        let mut timer = TransitionTimer::new();
        timer.start(get_config().hand_blend_duration);
        self.hand_blend = Some(HandBlend { from, timer });
    }

    /// 快照阶段：推进到新的追踪位姿并差分出速度
    pub(crate) fn advance_pose(&mut self, pose: Pose, dt: f32) {
        self.prev_pose = self.pose;
        self.pose = pose;

        if dt > 1e-6 {
            self.velocity = (pose.position - self.prev_pose.position) / dt;
            self.angular_velocity = angular_velocity_between(
                self.prev_pose.rotation,
                pose.rotation,
                dt,
            );
            self.tracker.push(self.velocity, self.angular_velocity);
        }
    }
}

/// 由两帧旋转差分角速度（最短弧）
pub(crate) fn angular_velocity_between(prev: Quat, cur: Quat, dt: f32) -> Vec3 {
    if dt <= 1e-6 {
        return Vec3::ZERO;
    }
    let mut delta = cur * prev.conjugate();
    if delta.w < 0.0 {
        delta = -delta;
    }
    let (axis, angle) = delta.to_axis_angle();
    if angle.abs() < 1e-6 || !axis.is_finite() {
        return Vec3::ZERO;
    }
    axis * (angle / dt)
}

// ============================================================================
// 释放速度增幅
// ============================================================================

/// 阈值之上的渐进增幅系数
///
/// 阈值以下恒为 1；阈值之上经过 gradient 宽度线性升到 boost，
/// 之后保持 boost（平滑斜坡，不是硬切换）。
fn graduated_boost(speed: f32, threshold: f32, gradient: f32, boost: f32) -> f32 {
    if speed <= threshold {
        return 1.0;
    }
    let t = ((speed - threshold) / gradient.max(1e-4)).clamp(0.0, 1.0);
    1.0 + (boost - 1.0) * t
}

/// 对平滑速度应用释放增幅
///
/// 水平（XZ）与垂直（Y）分量按各自的阈值斜坡独立增幅。
pub fn scaled_release_velocity(v: Vec3) -> Vec3 {
    let config = get_config();

    let horizontal = Vec3::new(v.x, 0.0, v.z);
    let h_boost = graduated_boost(
        horizontal.length(),
        config.release_speed_threshold,
        config.release_speed_gradient,
        config.release_boost_horizontal,
    );

    let v_boost = graduated_boost(
        v.y.abs(),
        config.release_speed_threshold,
        config.release_speed_gradient,
        config.release_boost_vertical,
    );

    horizontal * h_boost + Vec3::new(0.0, v.y * v_boost, 0.0)
}
