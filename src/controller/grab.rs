//! Grab 操作
//!
//! 四种取得方式共用一条事件序列：
//! GrabTrying → Releasing(换手) → Grabbing → Removing(离锚) →
//! [变更] → Released(换手) → Grabbed → Removed(离锚)。
//!
//! 受约束的被锚对象走静默在位脱锚：占用清除但不发 Removing/Removed，
//! 物理保持冻结。

use crate::config::get_config;
use crate::events::{EventFlags, EventKind, GrabEvent};
use crate::math::Pose;
use crate::object::{GrabPoint, SnapFlags, SnapTarget};
use crate::registry::{ActiveGrab, Hold};
use crate::selector;

use super::GrabController;

/// 抓取瞬间捕获的相对位姿：object = hand * offset
///
/// 吸附标志决定 offset 的各分量取原始相对值还是吸附理想值；
/// HandToObject 与无吸附时保持原始相对位姿（对象跟手走，不贴合）。
fn compute_grip_offset(point: &GrabPoint, object_pose: &Pose, grabber_pose: &Pose) -> Pose {
    let raw = grabber_pose.relative_to(object_pose);
    if point.snap_target == SnapTarget::HandToObject || point.snap.is_empty() {
        return raw;
    }

    let snap_world = point.resolve_snap(object_pose, grabber_pose);
    let snap_local = object_pose.relative_to(&snap_world);

    let mut offset = raw;
    if point.snap.contains(SnapFlags::ROTATION) {
        offset.rotation = snap_local.rotation.inverse();
    }
    if point.snap.contains(SnapFlags::POSITION) {
        // hand * offset 把吸附点送回手原点
        offset.position = -(offset.rotation * snap_local.position);
    }
    offset
}

impl GrabController {
    /// 选择器驱动的抓取
    pub fn grab_closest(&mut self, grabber_id: usize) -> bool {
        match selector::closest_grabbable(&self.registry, grabber_id) {
            Some(c) => self.grab(grabber_id, c.object, c.point),
            None => false,
        }
    }

    /// 抓取指定对象的指定抓取点
    ///
    /// 校验失败返回 false 且无任何变更。
    pub fn grab(&mut self, grabber_id: usize, object_id: usize, point_index: usize) -> bool {
        // ---- 校验（无副作用）----
        let (hand, already_held) = match self.registry.grabber(grabber_id) {
            Some(g) if g.enabled => (g.hand, g.held_object()),
            _ => return false,
        };
        let (constrained, anchored, multi_allowed, point_colocates) =
            match self.registry.object(object_id) {
                Some(o) if o.enabled => match o.point(point_index) {
                    Some(p) if p.enabled && p.accepts_hand(hand) => (
                        o.is_constrained(),
                        o.anchor(),
                        o.allows_multi_grab(),
                        p.allows_colocation(),
                    ),
                    _ => return false,
                },
                _ => return false,
            };

        // 同手已持该点 → 已处于请求状态
        if let Some(grab) = self.registry.grab(object_id) {
            if grab.find_hold(grabber_id).map(|h| h.point) == Some(point_index) {
                return false;
            }
        }

        // ---- 换手 / 加手判定 ----
        let mut swap_targets: Vec<usize> = Vec::new();
        let mut second_hand = false;
        if let Some(grab) = self.registry.grab(object_id) {
            let holders_on_point: Vec<usize> = grab
                .holds_on_point(point_index)
                .filter(|h| h.grabber != grabber_id)
                .map(|h| h.grabber)
                .collect();
            if !holders_on_point.is_empty() {
                if multi_allowed && point_colocates {
                    second_hand = true;
                } else {
                    swap_targets = holders_on_point;
                }
            } else if grab
                .holds
                .iter()
                .any(|h| h.grabber != grabber_id)
            {
                if multi_allowed {
                    second_hand = true;
                } else {
                    swap_targets = grab
                        .holds
                        .iter()
                        .filter(|h| h.grabber != grabber_id)
                        .map(|h| h.grabber)
                        .collect();
                }
            }
        }
        let swap = !swap_targets.is_empty();

        // ---- 事件前沿 ----
        self.emit(
            GrabEvent::new(EventKind::GrabTrying, object_id)
                .with_grabber(grabber_id)
                .with_point(point_index),
        );

        // 同手换持：先放掉旧持握（普通释放，不触发顺手放置）
        if let Some(prev) = already_held {
            self.release_hold(grabber_id, prev, false);
        }

        let multi_after = second_hand
            || self
                .registry
                .grab(object_id)
                .map(|g| {
                    g.holds
                        .iter()
                        .filter(|h| h.grabber != grabber_id)
                        .count()
                        > swap_targets.len()
                })
                .unwrap_or(false);

        let mut swap_flags = EventFlags::HAND_SWAP;
        if multi_after {
            swap_flags |= EventFlags::MULTI_HAND;
        }
        for &target in &swap_targets {
            if let Some(hold) = self.registry.grab(object_id).and_then(|g| g.find_hold(target)) {
                let point = hold.point;
                self.emit(
                    GrabEvent::new(EventKind::Releasing, object_id)
                        .with_grabber(target)
                        .with_point(point)
                        .with_flags(swap_flags),
                );
            }
        }

        let mut grab_flags = EventFlags::empty();
        if swap {
            grab_flags |= EventFlags::HAND_SWAP;
        }
        if second_hand || multi_after {
            grab_flags |= EventFlags::MULTI_HAND;
        }
        self.emit(
            GrabEvent::new(EventKind::Grabbing, object_id)
                .with_grabber(grabber_id)
                .with_point(point_index)
                .with_flags(grab_flags),
        );

        // 非约束的被锚对象正常离锚；受约束的走静默在位脱锚
        let announced_anchor = match anchored {
            Some(a) if !constrained => Some(a),
            _ => None,
        };
        if let Some(anchor_id) = announced_anchor {
            self.emit(
                GrabEvent::new(EventKind::Removing, object_id)
                    .with_anchor(anchor_id)
                    .with_grabber(grabber_id),
            );
        }

        // ---- 变更 ----
        for &target in &swap_targets {
            self.detach_hold(object_id, target);
        }

        if let Some(anchor_id) = anchored {
            if let Some(anchor) = self.registry.anchor_mut(anchor_id) {
                anchor.occupant = None;
            }
        }

        let config = get_config();
        let (grip_offset, lock_duration, align_from) = {
            let object = match self.registry.object(object_id) {
                Some(o) => o,
                None => return false,
            };
            let grabber_pose = self
                .registry
                .grabber(grabber_id)
                .map(|g| g.pose)
                .unwrap_or_default();
            let point = match object.point(point_index) {
                Some(p) => p,
                None => return false,
            };
            let offset = compute_grip_offset(point, &object.pose, &grabber_pose);
            let locks = constrained
                || second_hand
                || point.snap_target == SnapTarget::HandToObject;
            let lock = if locks { config.hand_lock_duration } else { 0.0 };
            (offset, lock, object.pose)
        };

        let hold = Hold::new(grabber_id, point_index, grip_offset, lock_duration);
        match self.registry.grab_mut(object_id) {
            Some(grab) => {
                grab.holds.push(hold);
                if swap {
                    // 换手视作重新抓取：对齐过渡从当前位姿重启
                    grab.align_from = align_from;
                    grab.align_timer.start(config.align_duration);
                }
            }
            None => {
                let mut grab = ActiveGrab::new(hold, anchored, align_from);
                grab.align_timer.start(config.align_duration);
                self.registry.insert_grab(object_id, grab);
            }
        }

        if let Some(object) = self.registry.object_mut(object_id) {
            object.anchor = None;
            object.placement = None;
        }
        if let Some(grabber) = self.registry.grabber_mut(grabber_id) {
            grabber.held = Some(object_id);
            grabber.hand_blend = None;
        }

        self.physics.set_kinematic(object_id, true);
        self.scheduler.cancel_tag(object_id);

        // 约束进入：首次接合时捕获参考位姿并启动混合
        if constrained {
            let parent_pose = self
                .registry
                .object(object_id)
                .and_then(|o| o.parent())
                .and_then(|p| self.registry.object(p))
                .map(|p| p.pose);
            let blend_from = self.constraint_space_pose(object_id, parent_pose.as_ref());
            if let Some(object) = self.registry.object_mut(object_id) {
                if object.constraint_state.reference().is_none() {
                    object.capture_initial_pose(parent_pose.as_ref());
                }
                if !object.constraint_state.engaged {
                    object.constraint_state.engaged = true;
                    object
                        .constraint_state
                        .begin_blend(blend_from, config.constraint_blend_duration);
                }
            }
        }

        // ---- 事件后沿 ----
        for &target in &swap_targets {
            self.emit(
                GrabEvent::new(EventKind::Released, object_id)
                    .with_grabber(target)
                    .with_flags(swap_flags),
            );
        }

        let mut grabbed_flags = EventFlags::empty();
        if swap {
            grabbed_flags |= EventFlags::HAND_SWAP;
        }
        if self
            .registry
            .grab(object_id)
            .map(|g| g.is_multi_hand())
            .unwrap_or(false)
        {
            grabbed_flags |= EventFlags::MULTI_HAND;
        }
        self.emit(
            GrabEvent::new(EventKind::Grabbed, object_id)
                .with_grabber(grabber_id)
                .with_point(point_index)
                .with_flags(grabbed_flags),
        );

        if let Some(anchor_id) = announced_anchor {
            self.emit(
                GrabEvent::new(EventKind::Removed, object_id)
                    .with_anchor(anchor_id)
                    .with_grabber(grabber_id),
            );
        }

        if config.debug_log {
            log::debug!(
                "抓取: 抓取器 {} → 对象 {} 点 {} (换手={} 加手={})",
                grabber_id,
                object_id,
                point_index,
                swap,
                second_hand
            );
        }
        true
    }

    /// 摘除一只手的持握：不销毁抓取记录、不碰物理、不发事件
    pub(crate) fn detach_hold(&mut self, object_id: usize, grabber_id: usize) {
        let locked = self.grabber_display_pose(grabber_id);
        if let Some(grab) = self.registry.grab_mut(object_id) {
            grab.holds.retain(|h| h.grabber != grabber_id);
        }
        if let Some(grabber) = self.registry.grabber_mut(grabber_id) {
            grabber.held = None;
            if let Some(from) = locked {
                grabber.begin_hand_blend(from);
            }
        }
    }

    /// 对象在其约束空间中的当前位姿
    pub(crate) fn constraint_space_pose(
        &self,
        object_id: usize,
        parent_pose: Option<&Pose>,
    ) -> Pose {
        let pose = self
            .registry
            .object(object_id)
            .map(|o| o.pose)
            .unwrap_or_default();
        match parent_pose {
            Some(parent) => parent.relative_to(&pose),
            None => pose,
        }
    }
}

// ============ 测试 ============
