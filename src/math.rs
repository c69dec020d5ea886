//! 位姿与角度工具
//!
//! Pose 是整个核心使用的刚体位姿（位置 + 旋转，无缩放）。
//! 角度工具处理 ±180° 回绕，供约束求解器做累积角跟踪。

use glam::{Mat4, Quat, Vec3};
use std::f32::consts::PI;

/// 退化判定阈值（长度平方）
pub(crate) const EPS_LEN_SQ: f32 = 1e-8;

// ============================================================================
// 位姿
// ============================================================================

/// 刚体位姿（位置 + 旋转）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// 单位位姿
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// 创建位姿
    #[inline]
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// 仅平移
    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// 从矩阵分解（忽略缩放）
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (_, rotation, position) = m.to_scale_rotation_translation();
        Self { position, rotation }
    }

    /// 位姿复合：先应用 self，再应用 local
    ///
    /// `result = self * local`，即 local 在 self 坐标系下的世界位姿。
    #[inline]
    pub fn transform(&self, local: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * local.position,
            rotation: (self.rotation * local.rotation).normalize(),
        }
    }

    /// 变换一个点
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position + self.rotation * p
    }

    /// 逆位姿
    #[inline]
    pub fn inverse(&self) -> Pose {
        let inv_rot = self.rotation.conjugate();
        Pose {
            position: inv_rot * -self.position,
            rotation: inv_rot,
        }
    }

    /// 求 self 坐标系下 other 的本地位姿
    ///
    /// `self.transform(&self.relative_to(other)) == other`
    #[inline]
    pub fn relative_to(&self, other: &Pose) -> Pose {
        self.inverse().transform(other)
    }

    /// 位置线性插值 + 旋转球面插值
    #[inline]
    pub fn blend(&self, target: &Pose, t: f32) -> Pose {
        let t = t.clamp(0.0, 1.0);
        Pose {
            position: self.position.lerp(target.position, t),
            rotation: self.rotation.slerp(target.rotation, t).normalize(),
        }
    }

    /// 与另一位姿的位置距离
    #[inline]
    pub fn distance(&self, other: &Pose) -> f32 {
        self.position.distance(other.position)
    }
}

// ============================================================================
// 角度工具
// ============================================================================

/// 角度归一化到 [0, 2π)
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut r = angle % (2.0 * PI);
    if r < 0.0 {
        r += 2.0 * PI;
    }
    r
}

/// 回绕到 (-π, π]
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let mut r = normalize_angle(angle);
    if r > PI {
        r -= 2.0 * PI;
    }
    r
}

/// 计算角度差（考虑周期性），结果在 (-π, π]
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    wrap_angle(a - b)
}

/// 两个旋转之间的夹角（弧度，最短弧）
#[inline]
pub fn quat_angle(a: Quat, b: Quat) -> f32 {
    let dot = a.dot(b).abs().clamp(-1.0, 1.0);
    2.0 * dot.acos()
}

/// 取一条与 axis 垂直的稳定单位向量
///
/// axis 接近零向量时返回 Vec3::X。
pub fn any_perpendicular(axis: Vec3) -> Vec3 {
    if axis.length_squared() < EPS_LEN_SQ {
        return Vec3::X;
    }
    // 选分量最小的基向量做叉积，数值最稳定
    let abs = axis.abs();
    let basis = if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::X
    } else if abs.y <= abs.z {
        Vec3::Y
    } else {
        Vec3::Z
    };
    axis.cross(basis).normalize_or_zero()
}

/// 绕 axis 从 from 转到 to 的带符号角度
///
/// 两向量先投影到与 axis 垂直的平面。任一投影退化时返回 0。
pub fn signed_angle_around(axis: Vec3, from: Vec3, to: Vec3) -> f32 {
    let from_p = (from - axis * from.dot(axis)).normalize_or_zero();
    let to_p = (to - axis * to.dot(axis)).normalize_or_zero();
    if from_p.length_squared() < EPS_LEN_SQ || to_p.length_squared() < EPS_LEN_SQ {
        return 0.0;
    }
    let cos = from_p.dot(to_p).clamp(-1.0, 1.0);
    let sin = from_p.cross(to_p).dot(axis);
    sin.atan2(cos)
}

/// 旋转绕 axis 的扭转分量角度（带符号）
///
/// swing-twist 分解的 twist 部分。axis 必须是单位向量。
pub fn twist_angle(rotation: Quat, axis: Vec3) -> f32 {
    let r = Vec3::new(rotation.x, rotation.y, rotation.z);
    let proj = r.dot(axis);
    let angle = 2.0 * proj.atan2(rotation.w);
    wrap_angle(angle)
}

/// 将旋转分解为 swing * twist（twist 绕 axis）
///
/// 投影退化（旋转轴与 axis 垂直）时 twist 为单位四元数。
pub fn swing_twist(rotation: Quat, axis: Vec3) -> (Quat, Quat) {
    let r = Vec3::new(rotation.x, rotation.y, rotation.z);
    let proj = r.dot(axis) * axis;
    let twist = Quat::from_xyzw(proj.x, proj.y, proj.z, rotation.w);
    if twist.length_squared() < EPS_LEN_SQ {
        return (rotation, Quat::IDENTITY);
    }
    let twist = twist.normalize();
    let swing = rotation * twist.conjugate();
    (swing.normalize(), twist)
}

/// 从 from 指向 to 的最短弧旋转
///
/// 任一向量退化时返回单位旋转。
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from.length_squared() < EPS_LEN_SQ || to.length_squared() < EPS_LEN_SQ {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_round_trip() {
        let a = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.7),
        );
        let b = Pose::new(
            Vec3::new(-0.5, 0.25, 4.0),
            Quat::from_rotation_x(-1.2),
        );

        // a * (a^-1 * b) == b
        let local = a.relative_to(&b);
        let back = a.transform(&local);
        assert!(back.position.distance(b.position) < 1e-5);
        assert!(quat_angle(back.rotation, b.rotation) < 1e-4);
    }

    #[test]
    fn test_pose_inverse() {
        let p = Pose::new(Vec3::new(3.0, -1.0, 0.5), Quat::from_rotation_z(2.1));
        let id = p.transform(&p.inverse());
        assert!(id.position.length() < 1e-5);
        assert!(quat_angle(id.rotation, Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(PI * 1.5) - (-PI * 0.5)).abs() < 1e-6);
        assert!((wrap_angle(-PI * 1.5) - (PI * 0.5)).abs() < 1e-6);
        assert!((wrap_angle(0.3) - 0.3).abs() < 1e-6);
        // 跨多圈
        assert!((wrap_angle(5.0 * PI) - PI).abs() < 1e-5);
    }

    #[test]
    fn test_angle_diff_wraps() {
        // 179° 与 -179° 相差 -2°，不是 358°
        let a = 179.0_f32.to_radians();
        let b = -179.0_f32.to_radians();
        let d = angle_diff(b, a);
        assert!((d - 2.0_f32.to_radians()).abs() < 1e-5);
    }

    #[test]
    fn test_signed_angle_around() {
        let axis = Vec3::Y;
        let a = signed_angle_around(axis, Vec3::X, Vec3::Z);
        // X 绕 Y 转到 Z 是 -90°
        assert!((a + PI * 0.5).abs() < 1e-5);

        // 退化输入不产生 NaN
        let z = signed_angle_around(axis, Vec3::Y, Vec3::X);
        assert!(z.abs() < 1e-6);
    }

    #[test]
    fn test_twist_angle() {
        let rot = Quat::from_rotation_y(1.1) ;
        assert!((twist_angle(rot, Vec3::Y) - 1.1).abs() < 1e-5);
        // 纯俯仰对 Y 轴无扭转
        let pitch = Quat::from_rotation_x(0.8);
        assert!(twist_angle(pitch, Vec3::Y).abs() < 1e-5);
    }

    #[test]
    fn test_swing_twist_recompose() {
        let rot = Quat::from_rotation_y(0.9) * Quat::from_rotation_x(0.4);
        let (swing, twist) = swing_twist(rot, Vec3::Y);
        let back = swing * twist;
        assert!(quat_angle(back, rot) < 1e-4);
    }

    #[test]
    fn test_any_perpendicular() {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.3, -0.8, 0.5)] {
            let p = any_perpendicular(axis.normalize());
            assert!(p.dot(axis).abs() < 1e-5);
            assert!((p.length() - 1.0).abs() < 1e-5);
        }
    }
}
