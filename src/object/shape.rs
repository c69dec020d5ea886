//! 抓取点形状
//!
//! 形状是抓取点的几何细化：不再把手吸附到单个固定点，而是在一段几何体上
//! 求最近的有效握持位姿。距离查询与吸附查询都以抓取点的世界位姿为参考系。

use glam::{Quat, Vec3};

use crate::math::{any_perpendicular, quat_angle, twist_angle, wrap_angle, Pose, EPS_LEN_SQ};
use crate::{GrabError, Result};

// ============================================================================
// 形状接口
// ============================================================================

/// 抓取点的几何细化
///
/// 实现者在抓取点参考系内求解。两个查询都必须无 NaN：退化输入回退到
/// 抓取点本身的位姿。
pub trait GrabShape: std::fmt::Debug + Send + Sync {
    /// 形状上离抓取器最近的点（世界空间）
    fn closest_point(&self, point_world: &Pose, grabber_pos: Vec3) -> Vec3;

    /// 形状上最贴合抓取器位姿的吸附位姿（世界空间）
    fn snap_pose(&self, point_world: &Pose, grabber_pose: &Pose) -> Pose;

    /// 是否允许两只手同时握在该形状上
    fn allows_colocation(&self) -> bool {
        false
    }
}

// ============================================================================
// 轴段形状
// ============================================================================

/// 有界轴段：沿抓取点本地某方向的一段线段，可限制绕轴滚转，可双向握持
///
/// 典型用途：杆、柄、剑柄。吸附位置是手在轴上的投影（截断到段内），
/// 吸附旋转保留手绕轴的滚转（可被夹取到给定范围）。
#[derive(Clone, Debug)]
pub struct AxisShape {
    /// 本地轴方向（单位向量）
    axis: Vec3,
    /// 沿轴最小偏移（米）
    min: f32,
    /// 沿轴最大偏移（米）
    max: f32,
    /// 绕轴滚转范围（弧度，None 表示自由滚转）
    roll_range: Option<(f32, f32)>,
    /// 是否允许手反向握持（沿轴翻转 180 度）
    bidirectional: bool,
    /// 是否允许双手共置
    colocate: bool,
}

impl AxisShape {
    /// 创建轴段形状
    ///
    /// 轴向量会被归一化；零向量或 min > max 返回错误。
    pub fn new(axis: Vec3, min: f32, max: f32) -> Result<Self> {
        if axis.length_squared() < EPS_LEN_SQ {
            return Err(GrabError::DegenerateShape("轴向量长度为零".into()));
        }
        if min > max {
            return Err(GrabError::DegenerateShape(format!(
                "轴段范围非法: min={} > max={}",
                min, max
            )));
        }
        Ok(Self {
            axis: axis.normalize(),
            min,
            max,
            roll_range: None,
            bidirectional: false,
            // 段长足够时默认允许双手各握一处
            colocate: max - min > 0.0,
        })
    }

    /// 限制绕轴滚转范围（弧度）
    pub fn with_roll_range(mut self, min: f32, max: f32) -> Self {
        self.roll_range = Some((min.min(max), min.max(max)));
        self
    }

    /// 允许反向握持
    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    /// 覆盖双手共置开关
    pub fn with_colocation(mut self, colocate: bool) -> Self {
        self.colocate = colocate;
        self
    }

    /// 本地轴方向
    #[inline]
    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    /// 轴上投影偏移（截断到段内）
    fn clamped_offset(&self, point_world: &Pose, grabber_pos: Vec3) -> f32 {
        let local = point_world.inverse().transform_point(grabber_pos);
        local.dot(self.axis).clamp(self.min, self.max)
    }

    /// 以给定基准旋转吸附，保留并夹取滚转
    fn snap_rotation_from(&self, base: Quat, grabber_rot: Quat) -> Quat {
        let relative = base.conjugate() * grabber_rot;
        let mut roll = twist_angle(relative, self.axis);
        if let Some((lo, hi)) = self.roll_range {
            roll = wrap_angle(roll).clamp(lo, hi);
        }
        base * Quat::from_axis_angle(self.axis, roll)
    }
}

impl GrabShape for AxisShape {
    fn closest_point(&self, point_world: &Pose, grabber_pos: Vec3) -> Vec3 {
        let t = self.clamped_offset(point_world, grabber_pos);
        point_world.transform_point(self.axis * t)
    }

    fn snap_pose(&self, point_world: &Pose, grabber_pose: &Pose) -> Pose {
        let t = self.clamped_offset(point_world, grabber_pose.position);
        let position = point_world.transform_point(self.axis * t);

        let forward = self.snap_rotation_from(point_world.rotation, grabber_pose.rotation);
        let rotation = if self.bidirectional {
            // 翻转候选：绕垂直轴转 180 度使握持方向反转
            let perp = any_perpendicular(self.axis);
            let flipped_base =
                point_world.rotation * Quat::from_axis_angle(perp, std::f32::consts::PI);
            let backward = self.snap_rotation_from(flipped_base, grabber_pose.rotation);
            if quat_angle(backward, grabber_pose.rotation)
                < quat_angle(forward, grabber_pose.rotation)
            {
                backward
            } else {
                forward
            }
        } else {
            forward
        };

        Pose::new(position, rotation)
    }

    fn allows_colocation(&self) -> bool {
        self.colocate
    }
}
