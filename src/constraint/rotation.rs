//! 旋转夹取
//!
//! 单轴路径：以参考位姿为基准测量绕轴的有符号角，按帧间增量累计，
//! 使限制区间可超过 ±360 度（假定相邻帧变化小于 180 度）。夹取后
//! 把累计值与对应的测量角一并写回，再次施加时增量为零。
//!
//! 多轴路径：取纵轴，对旋转后的纵轴方向用 asin/atan2 解出俯仰与偏航，
//! 各自夹取后重建，再对剩余的绕纵轴扭转单独夹取。退化输入回退到
//! 未夹取值，不产生 NaN。

use glam::Quat;

use super::{AngleTracker, Axis, RotationLimits};
use crate::math::{
    any_perpendicular, signed_angle_around, twist_angle, wrap_angle, Pose, EPS_LEN_SQ,
};

/// 单轴累计角夹取
pub(crate) fn clamp_single_axis(
    limits: &RotationLimits,
    axis: Axis,
    initial: &Pose,
    raw: Quat,
    tracker: &mut Option<AngleTracker>,
) -> Quat {
    let local_axis = axis.unit();
    let world_axis = initial.rotation * local_axis;

    // 用参考系里的垂直探针测量绕轴角
    let probe = any_perpendicular(local_axis);
    let ref_dir = initial.rotation * probe;
    let cur_dir = raw * probe;
    let raw_angle = signed_angle_around(world_axis, ref_dir, cur_dir);

    // 帧间增量累计，跨 ±180 度时折算
    let cumulative = match tracker {
        None => raw_angle,
        Some(t) => t.cumulative + wrap_angle(raw_angle - t.prev_raw),
    };

    let (lo, hi) = limits.limits_for(axis);
    let clamped = cumulative.clamp(lo, hi);

    *tracker = Some(AngleTracker {
        cumulative: clamped,
        prev_raw: wrap_angle(clamped),
    });

    initial.rotation * Quat::from_axis_angle(local_axis, clamped)
}

/// 多轴分解夹取（两轴或三轴激活）
pub(crate) fn clamp_multi_axis(limits: &RotationLimits, initial: &Pose, raw: Quat) -> Quat {
    let long = limits.longitudinal_axis();
    // 循环序保证 pitch × yaw = long（右手系分解公式成立）
    let (pitch_axis, yaw_axis) = match long {
        Axis::X => (Axis::Y, Axis::Z),
        Axis::Y => (Axis::Z, Axis::X),
        Axis::Z => (Axis::X, Axis::Y),
    };

    let relative = (initial.rotation.conjugate() * raw).normalize();
    let dir = relative * long.unit();

    let u_p = dir.dot(pitch_axis.unit());
    let u_y = dir.dot(yaw_axis.unit());
    let u_l = dir.dot(long.unit());

    // 俯仰：纵轴方向在偏航轴上的投影
    let pitch = (-u_y).clamp(-1.0, 1.0).asin();
    // 偏航：万向锁附近回退为 0
    let yaw = if u_p * u_p + u_l * u_l < EPS_LEN_SQ {
        0.0
    } else {
        u_p.atan2(u_l)
    };

    let (pitch_lo, pitch_hi) = limits.limits_for(pitch_axis);
    let (yaw_lo, yaw_hi) = limits.limits_for(yaw_axis);
    let pitch_c = pitch.clamp(pitch_lo, pitch_hi);
    let yaw_c = yaw.clamp(yaw_lo, yaw_hi);

    let rel_dir = Quat::from_axis_angle(yaw_axis.unit(), yaw_c)
        * Quat::from_axis_angle(pitch_axis.unit(), pitch_c);

    // 剩余绕纵轴扭转单独夹取（纵轴未激活时被压到 0）
    let residual = rel_dir.conjugate() * relative;
    let roll = wrap_angle(twist_angle(residual, long.unit()));
    let (roll_lo, roll_hi) = limits.limits_for(long);
    let roll_c = roll.clamp(roll_lo, roll_hi);

    let clamped = rel_dir * Quat::from_axis_angle(long.unit(), roll_c);
    initial.rotation * clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::quat_angle;
    use glam::Vec3;

    fn y_limits(deg: f32) -> RotationLimits {
        RotationLimits::new(
            Vec3::new(0.0, -deg.to_radians(), 0.0),
            Vec3::new(0.0, deg.to_radians(), 0.0),
        )
    }

    #[test]
    fn test_single_axis_within_limits() {
        let limits = y_limits(90.0);
        let initial = Pose::IDENTITY;
        let mut tracker = None;
        let raw = Quat::from_rotation_y(0.5);
        let out = clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        assert!(quat_angle(out, raw) < 1e-4);
        assert!((tracker.unwrap().cumulative - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_single_axis_clamps() {
        let limits = y_limits(45.0);
        let initial = Pose::IDENTITY;
        let mut tracker = None;
        let raw = Quat::from_rotation_y(1.2);
        let out = clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        let expect = Quat::from_rotation_y(45.0_f32.to_radians());
        assert!(quat_angle(out, expect) < 1e-4);
    }

    #[test]
    fn test_single_axis_tracks_past_360() {
        // 区间 ±450 度：连续旋转越过 ±180 与 ±360 都不得重置或提前夹取
        let limits = y_limits(450.0);
        let initial = Pose::IDENTITY;
        let mut tracker = None;

        for step in 1..=10 {
            let angle = (step as f32) * 40.0_f32.to_radians();
            let raw = Quat::from_rotation_y(angle);
            clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        }
        // 10 x 40 = 400 度，无夹取
        let cum = tracker.unwrap().cumulative;
        assert!((cum - 400.0_f32.to_radians()).abs() < 1e-3);

        // 再前进两步到 480 度，夹在 450
        for step in 11..=12 {
            let angle = (step as f32) * 40.0_f32.to_radians();
            let raw = Quat::from_rotation_y(angle);
            clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        }
        let cum = tracker.unwrap().cumulative;
        assert!((cum - 450.0_f32.to_radians()).abs() < 1e-3);
    }

    #[test]
    fn test_single_axis_idempotent() {
        let limits = y_limits(45.0);
        let initial = Pose::IDENTITY;
        let mut tracker = None;
        let raw = Quat::from_rotation_y(2.0);
        let first = clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        let cum_first = tracker.unwrap().cumulative;
        let second = clamp_single_axis(&limits, Axis::Y, &initial, first, &mut tracker);
        assert!(quat_angle(first, second) < 1e-4);
        assert!((tracker.unwrap().cumulative - cum_first).abs() < 1e-4);
    }

    #[test]
    fn test_single_axis_nonidentity_initial() {
        let limits = y_limits(45.0);
        let initial = Pose::new(Vec3::ZERO, Quat::from_rotation_x(0.8));
        let mut tracker = None;
        // 以参考系为基准绕本地 Y 转 0.3
        let raw = initial.rotation * Quat::from_rotation_y(0.3);
        let out = clamp_single_axis(&limits, Axis::Y, &initial, raw, &mut tracker);
        assert!(quat_angle(out, raw) < 1e-4);
        assert!((tracker.unwrap().cumulative - 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_multi_axis_pitch_clamp() {
        // X/Y 激活，纵轴 Z
        let limits = RotationLimits::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 0.0));
        let initial = Pose::IDENTITY;
        let raw = Quat::from_rotation_x(0.9);
        let out = clamp_multi_axis(&limits, &initial, raw);
        let expect = Quat::from_rotation_x(0.5);
        assert!(quat_angle(out, expect) < 1e-3);
    }

    #[test]
    fn test_multi_axis_yaw_passthrough() {
        let limits = RotationLimits::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 0.0));
        let initial = Pose::IDENTITY;
        let raw = Quat::from_rotation_y(0.4);
        let out = clamp_multi_axis(&limits, &initial, raw);
        assert!(quat_angle(out, raw) < 1e-3);
    }

    #[test]
    fn test_multi_axis_suppresses_roll_on_inactive_longitudinal() {
        let limits = RotationLimits::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 0.0));
        let initial = Pose::IDENTITY;
        // 纯绕纵轴滚转在纵轴限制为零时被压平
        let raw = Quat::from_rotation_z(0.7);
        let out = clamp_multi_axis(&limits, &initial, raw);
        assert!(quat_angle(out, Quat::IDENTITY) < 1e-3);
    }

    #[test]
    fn test_multi_axis_three_active_roll_clamp() {
        let limits = RotationLimits::new(
            Vec3::new(-1.0, -1.0, -0.2),
            Vec3::new(1.0, 1.0, 0.2),
        )
        .with_longitudinal(Axis::Z);
        let initial = Pose::IDENTITY;
        let raw = Quat::from_rotation_z(0.6);
        let out = clamp_multi_axis(&limits, &initial, raw);
        let expect = Quat::from_rotation_z(0.2);
        assert!(quat_angle(out, expect) < 1e-3);
    }

    #[test]
    fn test_multi_axis_idempotent() {
        let limits = RotationLimits::new(Vec3::new(-0.3, -0.4, 0.0), Vec3::new(0.3, 0.4, 0.0));
        let initial = Pose::new(Vec3::ZERO, Quat::from_rotation_z(0.5));
        let raw = initial.rotation
            * Quat::from_rotation_y(0.9)
            * Quat::from_rotation_x(-0.7)
            * Quat::from_rotation_z(0.3);
        let first = clamp_multi_axis(&limits, &initial, raw);
        let second = clamp_multi_axis(&limits, &initial, first);
        assert!(quat_angle(first, second) < 1e-3);
    }

    #[test]
    fn test_multi_axis_gimbal_no_nan() {
        let limits = RotationLimits::new(Vec3::new(-2.0, -2.0, 0.0), Vec3::new(2.0, 2.0, 0.0));
        let initial = Pose::IDENTITY;
        // 俯仰正好 90 度：偏航回退为 0，不得出现 NaN
        let raw = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        let out = clamp_multi_axis(&limits, &initial, raw);
        assert!(out.is_finite());
        assert!(out.is_normalized());
    }
}
