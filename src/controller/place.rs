//! Place 与 RemoveFromAnchor 操作
//!
//! 放置在占位上是立即生效的：滑移期间锚点已被占用，排他性在整个
//! 过渡中成立。换锚先对旧锚发 Removing/Removed，再对新锚发
//! Placing/Placed。

use crate::config::get_config;
use crate::events::{EventFlags, EventKind, GrabEvent};
use crate::object::PlacementGlide;
use crate::transition::TransitionTimer;

use super::GrabController;

/// 放置选项
#[derive(Clone, Copy, Debug)]
pub struct PlaceOptions {
    /// 放置前解除全部持握
    pub release_grip: bool,
    /// 立即贴合锚点位姿（不走滑移过渡）
    pub instant: bool,
}

impl Default for PlaceOptions {
    fn default() -> Self {
        Self {
            release_grip: true,
            instant: false,
        }
    }
}

impl PlaceOptions {
    /// 立即放置
    pub fn instant() -> Self {
        Self {
            release_grip: true,
            instant: true,
        }
    }
}

impl GrabController {
    /// 把对象放置到锚点上
    ///
    /// 对象或锚点缺失、锚点已被占用时返回 false 且无变更。
    /// 对象仍被持有且未请求解除持握时同样拒绝。
    pub fn place(&mut self, object_id: usize, anchor_id: usize, options: PlaceOptions) -> bool {
        self.place_internal(object_id, anchor_id, options, None)
    }

    /// 放置的共用内部路径
    ///
    /// `initiator` 是发起放置的那只手（顺手放置场景）：它的持握
    /// 静默解除，其余手正常上报 Releasing/Released。
    pub(crate) fn place_internal(
        &mut self,
        object_id: usize,
        anchor_id: usize,
        options: PlaceOptions,
        initiator: Option<usize>,
    ) -> bool {
        // ---- 校验（无副作用）----
        if self.registry.object(object_id).is_none() {
            return false;
        }
        match self.registry.anchor(anchor_id) {
            Some(anchor) if !anchor.is_occupied() => {}
            _ => return false,
        }
        let held = self.registry.is_grabbed(object_id);
        if held && !options.release_grip {
            return false;
        }
        let old_anchor = self
            .registry
            .object(object_id)
            .and_then(|o| o.anchor())
            .filter(|a| *a != anchor_id);

        // ---- 解除持握 ----
        let reporting_grabber = self
            .registry
            .grab(object_id)
            .and_then(|g| g.primary())
            .map(|h| h.grabber);
        let silent = initiator.or(reporting_grabber);
        if held {
            let holders: Vec<usize> = self
                .registry
                .grab(object_id)
                .map(|g| g.holds.iter().map(|h| h.grabber).collect())
                .unwrap_or_default();
            let multi = holders.len() > 1;
            for grabber in holders {
                if Some(grabber) == silent {
                    self.detach_hold(object_id, grabber);
                    continue;
                }
                let mut flags = EventFlags::empty();
                if multi {
                    flags |= EventFlags::MULTI_HAND;
                }
                self.emit(
                    GrabEvent::new(EventKind::Releasing, object_id)
                        .with_grabber(grabber)
                        .with_flags(flags),
                );
                self.detach_hold(object_id, grabber);
                self.emit(
                    GrabEvent::new(EventKind::Released, object_id)
                        .with_grabber(grabber)
                        .with_flags(flags),
                );
            }
            self.registry.remove_grab(object_id);
        }

        // ---- 换锚：先离开旧锚 ----
        if let Some(old) = old_anchor {
            self.emit(
                GrabEvent::new(EventKind::Removing, object_id).with_anchor(old),
            );
            if let Some(anchor) = self.registry.anchor_mut(old) {
                anchor.occupant = None;
            }
            if let Some(object) = self.registry.object_mut(object_id) {
                object.anchor = None;
            }
            self.emit(
                GrabEvent::new(EventKind::Removed, object_id).with_anchor(old),
            );
        }

        // ---- 放置 ----
        let mut placing = GrabEvent::new(EventKind::Placing, object_id).with_anchor(anchor_id);
        if let Some(grabber) = silent {
            placing = placing.with_grabber(grabber);
        }
        self.emit(placing);

        let anchor_pose = match self.registry.anchor_mut(anchor_id) {
            Some(anchor) => {
                anchor.occupant = Some(object_id);
                anchor.pose
            }
            None => return false,
        };
        let config = get_config();
        if let Some(object) = self.registry.object_mut(object_id) {
            object.anchor = Some(anchor_id);
            if options.instant {
                object.pose = anchor_pose;
                object.placement = None;
            } else {
                let mut timer = TransitionTimer::new();
                timer.start(config.place_duration);
                object.placement = Some(PlacementGlide {
                    anchor: anchor_id,
                    from: object.pose,
                    timer,
                });
            }
        }
        self.physics.set_kinematic(object_id, true);
        if options.instant {
            self.physics.push_kinematic_target(object_id, &anchor_pose);
        }
        self.scheduler.cancel_tag(object_id);

        let mut placed = GrabEvent::new(EventKind::Placed, object_id).with_anchor(anchor_id);
        if let Some(grabber) = silent {
            placed = placed.with_grabber(grabber);
        }
        self.emit(placed);

        if config.debug_log {
            log::debug!(
                "放置: 对象 {} → 锚点 {} (立即={})",
                object_id,
                anchor_id,
                options.instant
            );
        }
        true
    }

    /// 把对象从当前锚点上取下
    ///
    /// 未被锚定时返回 false。仍被持有的对象保持运动学冻结。
    pub fn remove_from_anchor(&mut self, object_id: usize) -> bool {
        let anchor_id = match self.registry.object(object_id).and_then(|o| o.anchor()) {
            Some(a) => a,
            None => return false,
        };

        self.emit(
            GrabEvent::new(EventKind::Removing, object_id).with_anchor(anchor_id),
        );

        if let Some(anchor) = self.registry.anchor_mut(anchor_id) {
            anchor.occupant = None;
        }
        if let Some(object) = self.registry.object_mut(object_id) {
            object.anchor = None;
            object.placement = None;
        }
        if !self.registry.is_grabbed(object_id) {
            self.physics.set_kinematic(object_id, false);
        }

        self.emit(
            GrabEvent::new(EventKind::Removed, object_id).with_anchor(anchor_id),
        );

        if get_config().debug_log {
            log::debug!("离锚: 对象 {} ← 锚点 {}", object_id, anchor_id);
        }
        true
    }
}

// ============ 测试 ============

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;
    use crate::config::{get_config, reset_config};
    use crate::events::EventKind::*;
    use crate::events::{EventKind, GrabEvent};
    use crate::grabber::{Grabber, HandSide};
    use crate::math::Pose;
    use crate::object::{Grabbable, GrabPoint, ObjectFlags};
    use glam::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorded(c: &mut GrabController) -> Rc<RefCell<Vec<(EventKind, Option<usize>)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        c.subscribe(move |e: &GrabEvent| sink.borrow_mut().push((e.kind, e.anchor)));
        log
    }

    #[test]
    fn test_place_validation() {
        reset_config();
        let mut c = GrabController::new();
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("杯架", Pose::IDENTITY));

        assert!(!c.place(99, a, PlaceOptions::instant()));
        assert!(!c.place(o, 99, PlaceOptions::instant()));
        assert!(c.place(o, a, PlaceOptions::instant()));
        // 已在该锚点上 → 占用检查拒绝重复放置
        assert!(!c.place(o, a, PlaceOptions::instant()));
    }

    #[test]
    fn test_anchor_exclusivity() {
        reset_config();
        let mut c = GrabController::new();
        let first = c.register_object(Grabbable::new("甲"));
        let second = c.register_object(Grabbable::new("乙"));
        let a = c.register_anchor(Anchor::new("插槽", Pose::IDENTITY));

        assert!(c.place(first, a, PlaceOptions::instant()));
        assert!(!c.place(second, a, PlaceOptions::instant()));
        assert_eq!(c.registry().anchor(a).unwrap().occupant(), Some(first));
    }

    #[test]
    fn test_instant_place_snaps_pose() {
        reset_config();
        let mut c = GrabController::new();
        let target = Pose::from_position(Vec3::new(1.0, 2.0, 3.0));
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("杯架", target));

        assert!(c.place(o, a, PlaceOptions::instant()));
        let pose = c.registry().object(o).unwrap().pose;
        assert!((pose.position - target.position).length() < 1e-6);
        assert!(c.registry().object(o).unwrap().is_anchored());
    }

    #[test]
    fn test_glide_interpolates_and_holds_occupancy() {
        reset_config();
        let mut c = GrabController::new();
        let target = Pose::from_position(Vec3::new(1.0, 0.0, 0.0));
        let o = c.register_object(Grabbable::new("杯子"));
        let other = c.register_object(Grabbable::new("乙"));
        let a = c.register_anchor(Anchor::new("杯架", target));

        assert!(c.place(o, a, PlaceOptions::default()));

        // 滑移中：占用立即成立，其他对象放不进来
        assert!(c.registry().anchor(a).unwrap().is_occupied());
        assert!(!c.place(other, a, PlaceOptions::default()));

        let duration = get_config().place_duration;
        c.update(duration * 0.5);
        let mid = c.registry().object(o).unwrap().pose.position;
        assert!(mid.x > 0.05 && mid.x < 0.95);

        c.update(duration);
        let done = c.registry().object(o).unwrap().pose.position;
        assert!((done - target.position).length() < 1e-5);
        assert!(c.registry().object(o).unwrap().placement.is_none());
    }

    #[test]
    fn test_reanchor_emits_remove_pair_first() {
        reset_config();
        let mut c = GrabController::new();
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("甲架", Pose::IDENTITY));
        let b = c.register_anchor(Anchor::new("乙架", Pose::from_position(Vec3::X)));
        assert!(c.place(o, a, PlaceOptions::instant()));

        let log = recorded(&mut c);
        assert!(c.place(o, b, PlaceOptions::instant()));

        let events: Vec<(EventKind, Option<usize>)> = log.borrow().clone();
        assert_eq!(
            events,
            vec![
                (Removing, Some(a)),
                (Removed, Some(a)),
                (Placing, Some(b)),
                (Placed, Some(b)),
            ]
        );
        assert!(!c.registry().anchor(a).unwrap().is_occupied());
        assert_eq!(c.registry().anchor(b).unwrap().occupant(), Some(o));
    }

    #[test]
    fn test_place_releases_grips_primary_silent() {
        reset_config();
        let mut c = GrabController::new();
        let left = c.register_grabber(Grabber::new("左手", HandSide::Left));
        let right = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(
            Grabbable::new("步枪")
                .with_flags(ObjectFlags::MULTI_GRAB | ObjectFlags::PLACEABLE)
                .with_points(vec![
                    GrabPoint::new(Pose::IDENTITY),
                    GrabPoint::new(Pose::from_position(Vec3::new(0.0, 0.0, 0.4))),
                ]),
        );
        let a = c.register_anchor(Anchor::new("枪架", Pose::IDENTITY));

        assert!(c.grab(right, o, 0));
        assert!(c.grab(left, o, 1));

        let log = recorded(&mut c);
        assert!(c.place(o, a, PlaceOptions::instant()));

        // 主持握（右手）静默，副手（左手）正常上报
        let kinds: Vec<EventKind> = log.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![Releasing, Released, Placing, Placed]);
        assert!(c.held_object(left).is_none());
        assert!(c.held_object(right).is_none());
        assert!(!c.is_grabbed(o));
    }

    #[test]
    fn test_place_held_without_release_grip_fails() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("杯架", Pose::IDENTITY));

        assert!(c.grab(g, o, 0));
        let options = PlaceOptions {
            release_grip: false,
            instant: true,
        };
        assert!(!c.place(o, a, options));
        assert!(c.is_grabbed(o));
        assert!(!c.registry().anchor(a).unwrap().is_occupied());
    }

    #[test]
    fn test_remove_from_anchor() {
        reset_config();
        let mut c = GrabController::new();
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("杯架", Pose::IDENTITY));
        assert!(c.place(o, a, PlaceOptions::instant()));

        let log = recorded(&mut c);
        assert!(c.remove_from_anchor(o));

        let events: Vec<(EventKind, Option<usize>)> = log.borrow().clone();
        assert_eq!(events, vec![(Removing, Some(a)), (Removed, Some(a))]);
        assert!(!c.registry().anchor(a).unwrap().is_occupied());
        assert!(c.registry().object(o).unwrap().anchor().is_none());

        // 未锚定 → 无操作
        assert!(!c.remove_from_anchor(o));
    }

    #[test]
    fn test_remove_mid_glide_stops_in_place() {
        reset_config();
        let mut c = GrabController::new();
        let target = Pose::from_position(Vec3::new(2.0, 0.0, 0.0));
        let o = c.register_object(Grabbable::new("杯子"));
        let a = c.register_anchor(Anchor::new("杯架", target));

        assert!(c.place(o, a, PlaceOptions::default()));
        c.update(get_config().place_duration * 0.3);
        let mid = c.registry().object(o).unwrap().pose.position;

        assert!(c.remove_from_anchor(o));
        // 滑移中止在原地，不继续也不贴到锚点
        c.update(0.2);
        let after = c.registry().object(o).unwrap().pose.position;
        assert!((after - mid).length() < 1e-5);
        assert!((after - target.position).length() > 0.5);
    }
}
