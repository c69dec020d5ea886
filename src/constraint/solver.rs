//! 约束求解管线
//!
//! 输入提案位姿（参考系内），输出完全夹取后的位姿。所有夹取幂等：
//! 对已夹取位姿再次求解不改变结果。参考位姿缺失时原样返回提案。

use glam::Vec3;

use super::rotation::{clamp_multi_axis, clamp_single_axis};
use super::{Constraint, ConstraintState, RotationConstraint, TranslationConstraint};
use crate::math::Pose;

/// 平移夹取
fn clamp_translation(mode: &TranslationConstraint, initial: &Pose, raw_pos: Vec3) -> Vec3 {
    match mode {
        TranslationConstraint::Free => raw_pos,
        TranslationConstraint::Locked => initial.position,
        TranslationConstraint::Box { half_extents } => raw_pos.clamp(
            initial.position - *half_extents,
            initial.position + *half_extents,
        ),
        TranslationConstraint::Sphere { radius } => {
            let offset = raw_pos - initial.position;
            let len = offset.length();
            if len > *radius && len > 1e-6 {
                initial.position + offset * (*radius / len)
            } else {
                raw_pos
            }
        }
        TranslationConstraint::LocalOffset { min, max } => {
            // 偏移量在参考位姿的本地轴上逐轴夹取
            let local = initial.rotation.conjugate() * (raw_pos - initial.position);
            let clamped = local.clamp(*min, *max);
            initial.position + initial.rotation * clamped
        }
    }
}

/// 对提案位姿求解约束
pub fn solve(constraint: &Constraint, state: &mut ConstraintState, raw: &Pose) -> Pose {
    let initial = match state.initial {
        Some(p) => p,
        None => return *raw,
    };

    let position = clamp_translation(&constraint.translation, &initial, raw.position);

    let rotation = match &constraint.rotation {
        RotationConstraint::Free => raw.rotation,
        RotationConstraint::Locked => initial.rotation,
        RotationConstraint::Limits(limits) => {
            if let Some(axis) = limits.single_axis() {
                clamp_single_axis(limits, axis, &initial, raw.rotation, &mut state.tracker)
            } else if limits.active_count() == 0 {
                // 全零限制等价于锁死
                initial.rotation
            } else {
                clamp_multi_axis(limits, &initial, raw.rotation)
            }
        }
    };

    Pose::new(position, rotation)
}

/// 求解并按进入/退出混合计时器插值
///
/// 混合起点由控制器在边沿处写入；计时器结束后输出即纯夹取结果。
pub fn solve_blended(constraint: &Constraint, state: &mut ConstraintState, raw: &Pose) -> Pose {
    let solved = if state.engaged {
        solve(constraint, state, raw)
    } else {
        *raw
    };

    if state.blend.active() {
        let from = state.blend_from;
        from.blend(&solved, state.blend.factor())
    } else {
        solved
    }
}
