//! 候选选择
//!
//! 抓取器找最佳 (对象, 抓取点)，被持对象找最佳锚点。无状态查询，按槽位
//! 升序扫描，平手保留先到者，结果确定。
//!
//! 选择规则：优先级严格高者直接胜出；同优先级时，与当前最佳同对象比较
//! 带惩罚的 distance，跨对象比较不带旋转惩罚的 distance_no_rot。重叠
//! 惩罚是加在 distance 上的大常量（软惩罚），从不硬拒。

use glam::Vec3;

use crate::config::get_config;
use crate::math::quat_angle;
use crate::registry::GrabRegistry;

// ============================================================================
// 抓取候选
// ============================================================================

/// 一次抓取查询的胜出候选
#[derive(Clone, Copy, Debug)]
pub struct GrabCandidate {
    /// 对象 id
    pub object: usize,
    /// 抓取点下标
    pub point: usize,
    /// 带惩罚距离（同对象比较用）
    pub distance: f32,
    /// 纯接近度距离（跨对象比较用）
    pub distance_no_rot: f32,
    /// 对象优先级
    pub priority: i32,
}

/// 为抓取器找最佳可抓候选
pub fn closest_grabbable(registry: &GrabRegistry, grabber_id: usize) -> Option<GrabCandidate> {
    let grabber = registry.grabber(grabber_id)?;
    if !grabber.enabled {
        return None;
    }
    let config = get_config();

    let mut best: Option<GrabCandidate> = None;

    for (object_id, object) in registry.iter_objects() {
        if !object.enabled {
            continue;
        }
        // 已在手里的对象不参与重新选择
        if grabber.held_object() == Some(object_id) {
            continue;
        }

        for (point_id, point) in object.points.iter().enumerate() {
            if !point.enabled || !point.accepts_hand(grabber.hand) {
                continue;
            }

            let prox = point.proximity_position(&object.pose, grabber.pose.position);
            let euclid = (prox - grabber.pose.position).length();
            if euclid > point.reach() {
                continue;
            }

            // 包围盒外的候选被抬到不可达常量（软偏置，不剔除）
            let base = if point.in_proximity_volume(&object.pose, grabber.pose.position) {
                euclid
            } else {
                config.unreachable_distance
            };

            let rotation_penalty = if point.rotation_penalty > 0.0 {
                let snap_rot = point.snap_rotation(&object.pose, &grabber.pose);
                quat_angle(grabber.pose.rotation, snap_rot) * point.rotation_penalty
            } else {
                0.0
            };

            let overlap = overlap_penalty(
                registry,
                grabber_id,
                object_id,
                point_id,
                &config,
            );

            let candidate = GrabCandidate {
                object: object_id,
                point: point_id,
                distance: base + rotation_penalty + overlap,
                distance_no_rot: base,
                priority: object.priority,
            };

            best = Some(match best {
                None => candidate,
                Some(current) => pick(current, candidate),
            });
        }
    }

    best
}

/// 两候选取优（current 先到，平手保留）
fn pick(current: GrabCandidate, challenger: GrabCandidate) -> GrabCandidate {
    if challenger.priority > current.priority {
        return challenger;
    }
    if challenger.priority < current.priority {
        return current;
    }
    let wins = if challenger.object == current.object {
        challenger.distance < current.distance
    } else {
        challenger.distance_no_rot < current.distance_no_rot
    };
    if wins {
        challenger
    } else {
        current
    }
}

/// 手重叠软惩罚
///
/// 其他手全吸附持握同对象的另一点、而本候选的吸附位置与其过近时，
/// 或者共享同一个带形状的点而两个吸附位置过近时，加上大常量。
fn overlap_penalty(
    registry: &GrabRegistry,
    grabber_id: usize,
    object_id: usize,
    point_id: usize,
    config: &crate::config::ManipulationConfig,
) -> f32 {
    let grab = match registry.grab(object_id) {
        Some(g) => g,
        None => return 0.0,
    };
    let object = match registry.object(object_id) {
        Some(o) => o,
        None => return 0.0,
    };
    let grabber = match registry.grabber(grabber_id) {
        Some(g) => g,
        None => return 0.0,
    };
    let point = match object.point(point_id) {
        Some(p) => p,
        None => return 0.0,
    };

    let my_snap = point.resolve_snap(&object.pose, &grabber.pose).position;
    let mut penalty = 0.0;

    for hold in &grab.holds {
        if hold.grabber == grabber_id {
            continue;
        }
        let held_point = match object.point(hold.point) {
            Some(p) => p,
            None => continue,
        };

        if hold.point != point_id {
            // 不同点：对方全吸附时比较吸附位置间距
            if held_point.snaps_fully() {
                let other_pos = held_point.world(&object.pose).position;
                if (my_snap - other_pos).length() < config.min_hand_distance {
                    penalty += config.overlap_penalty;
                }
            }
        } else if point.shape.is_some() {
            // 同一个带形状的点：比较两手在形状上的吸附位置
            let other_pos = match registry.grabber(hold.grabber) {
                Some(other) => point.resolve_snap(&object.pose, &other.pose).position,
                None => continue,
            };
            if (my_snap - other_pos).length() < config.min_hand_distance {
                penalty += config.overlap_penalty;
            }
        }
    }

    penalty
}

// ============================================================================
// 锚点候选
// ============================================================================

/// 一次放置查询的胜出锚点
#[derive(Clone, Copy, Debug)]
pub struct AnchorCandidate {
    /// 锚点 id
    pub anchor: usize,
    /// 到对象中心的欧氏距离
    pub distance: f32,
}

/// 为对象找最近的可放置锚点
pub fn closest_anchor(registry: &GrabRegistry, object_id: usize) -> Option<AnchorCandidate> {
    let object = registry.object(object_id)?;
    if !object.enabled {
        return None;
    }
    let position = object.position();

    let mut best: Option<AnchorCandidate> = None;
    for (anchor_id, anchor) in registry.iter_anchors() {
        if !anchor.enabled || anchor.is_occupied() || !anchor.accepts_tags(object.tags) {
            continue;
        }
        let distance = (anchor.pose.position - position).length();
        if distance > anchor.range() {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) => distance < b.distance,
        };
        if better {
            best = Some(AnchorCandidate {
                anchor: anchor_id,
                distance,
            });
        }
    }
    best
}

/// 为持有对象的抓取器做可抓范围提示查询（亲和事件用）
pub fn hover_candidate(registry: &GrabRegistry, grabber_id: usize) -> Option<(usize, usize)> {
    let grabber = registry.grabber(grabber_id)?;
    if !grabber.enabled || grabber.held_object().is_some() {
        return None;
    }
    closest_grabbable(registry, grabber_id).map(|c| (c.object, c.point))
}
