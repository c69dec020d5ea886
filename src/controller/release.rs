//! Release 操作
//!
//! 释放速度取自释放手的平滑速度，超过阈值后水平/垂直分量独立增幅。
//! 最后一只手松开且对象可放置、无可抓取父级时，范围内有锚点就改为
//! 放置（二选一，该手不上报 Releasing/Released）。

use crate::config::get_config;
use crate::events::{EventFlags, EventKind, GrabEvent};
use crate::grabber::scaled_release_velocity;
use crate::selector;

use super::place::PlaceOptions;
use super::GrabController;

impl GrabController {
    /// 释放持握
    ///
    /// `grabber` 为 None 时释放全部持握者。对象未被请求的手持有时
    /// 返回 false 且无变更。
    pub fn release(&mut self, grabber: Option<usize>, object_id: usize) -> bool {
        match grabber {
            Some(g) => {
                let holds = self
                    .registry
                    .grab(object_id)
                    .map(|gr| gr.has_grabber(g))
                    .unwrap_or(false);
                if !holds {
                    return false;
                }
                self.release_hold(g, object_id, true)
            }
            None => {
                let holders: Vec<usize> = match self.registry.grab(object_id) {
                    Some(gr) => gr.holds.iter().map(|h| h.grabber).collect(),
                    None => return false,
                };
                let mut any = false;
                for g in holders {
                    any |= self.release_hold(g, object_id, true);
                }
                any
            }
        }
    }

    /// 单只手的释放（共用内部路径）
    ///
    /// `allow_place` 控制是否允许顺手放置；生命周期清理与换持场景
    /// 传 false。
    pub(crate) fn release_hold(
        &mut self,
        grabber_id: usize,
        object_id: usize,
        allow_place: bool,
    ) -> bool {
        let (sole, point_index) = match self.registry.grab(object_id) {
            Some(grab) => match grab.find_hold(grabber_id) {
                Some(hold) => (grab.hold_count() == 1, hold.point),
                None => return false,
            },
            None => return false,
        };

        // 顺手放置：最后一只手 + 可放置 + 无可抓取父级依赖 + 范围内有锚点
        if allow_place && sole {
            let eligible = self
                .registry
                .object(object_id)
                .map(|o| o.is_placeable() && !o.is_dependent())
                .unwrap_or(false);
            if eligible {
                if let Some(candidate) = selector::closest_anchor(&self.registry, object_id) {
                    return self.place_internal(
                        object_id,
                        candidate.anchor,
                        PlaceOptions::default(),
                        Some(grabber_id),
                    );
                }
            }
        }

        // ---- 裸释放 ----
        let (linear, angular) = match self.registry.grabber(grabber_id) {
            Some(g) => (
                scaled_release_velocity(g.smoothed_velocity()),
                g.smoothed_angular_velocity(),
            ),
            None => return false,
        };
        let multi_before = self
            .registry
            .grab(object_id)
            .map(|g| g.is_multi_hand())
            .unwrap_or(false);
        let mut flags = EventFlags::empty();
        if multi_before {
            flags |= EventFlags::MULTI_HAND;
        }

        self.emit(
            GrabEvent::new(EventKind::Releasing, object_id)
                .with_grabber(grabber_id)
                .with_point(point_index)
                .with_flags(flags),
        );

        // ---- 变更 ----
        let locked = self.grabber_display_pose(grabber_id);

        let mut was_primary = false;
        let mut last_hold = false;
        if let Some(grab) = self.registry.grab_mut(object_id) {
            if let Some(index) = grab.holds.iter().position(|h| h.grabber == grabber_id) {
                was_primary = index == 0;
                grab.holds.remove(index);
            }
            last_hold = grab.holds.is_empty();
        }

        if let Some(grabber) = self.registry.grabber_mut(grabber_id) {
            grabber.held = None;
        }
        if let Some(from) = locked {
            if let Some(grabber) = self.registry.grabber_mut(grabber_id) {
                grabber.begin_hand_blend(from);
            }
        }

        let config = get_config();
        if last_hold {
            self.registry.remove_grab(object_id);
            let constrained = self
                .registry
                .object(object_id)
                .map(|o| o.is_constrained())
                .unwrap_or(false);
            if constrained {
                // 受约束对象保持运动学冻结，不施加冲量
            } else {
                self.physics.set_kinematic(object_id, false);
                self.physics.apply_release_velocity(object_id, linear, angular);
                self.scheduler
                    .schedule(object_id, config.sync_interval, config.sync_max_duration);
            }
        } else if was_primary {
            // 主持握移交：对象改由下一只手驱动，对齐过渡重启
            let pose = self.registry.object(object_id).map(|o| o.pose);
            if let (Some(pose), Some(grab)) = (pose, self.registry.grab_mut(object_id)) {
                grab.align_from = pose;
                grab.align_timer.start(config.align_duration);
            }
        }

        self.emit(
            GrabEvent::new(EventKind::Released, object_id)
                .with_grabber(grabber_id)
                .with_point(point_index)
                .with_flags(flags),
        );

        if config.debug_log {
            log::debug!(
                "释放: 抓取器 {} ← 对象 {} (剩余持握 {})",
                grabber_id,
                object_id,
                self.registry.grab(object_id).map(|g| g.hold_count()).unwrap_or(0)
            );
        }
        true
    }
}

// ============ 测试 ============

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;
    use crate::config::reset_config;
    use crate::constraint::{Constraint, TranslationConstraint};
    use crate::events::EventKind::*;
    use crate::events::{EventKind, GrabEvent};
    use crate::grabber::{Grabber, HandSide};
    use crate::math::Pose;
    use crate::object::{Grabbable, GrabPoint, ObjectFlags};
    use crate::physics::PhysicsLink;
    use glam::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// 记录物理调用的测试替身
    #[derive(Clone, Default)]
    struct RecordingPhysics {
        kinematic: Rc<RefCell<Vec<(usize, bool)>>>,
        velocities: Rc<RefCell<Vec<(usize, Vec3, Vec3)>>>,
    }

    impl PhysicsLink for RecordingPhysics {
        fn set_kinematic(&mut self, object: usize, kinematic: bool) {
            self.kinematic.borrow_mut().push((object, kinematic));
        }
        fn push_kinematic_target(&mut self, _object: usize, _pose: &Pose) {}
        fn apply_release_velocity(&mut self, object: usize, linear: Vec3, angular: Vec3) {
            self.velocities.borrow_mut().push((object, linear, angular));
        }
        fn read_pose(&self, _object: usize) -> Option<Pose> {
            None
        }
        fn is_sleeping(&self, _object: usize) -> bool {
            false
        }
        fn unregister(&mut self, _object: usize) {}
    }

    fn recorded(c: &mut GrabController) -> Rc<RefCell<Vec<(EventKind, usize)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        c.subscribe(move |e: &GrabEvent| sink.borrow_mut().push((e.kind, e.object)));
        log
    }

    /// 以恒定速度喂若干帧，填满速度平滑窗口
    fn drive(c: &mut GrabController, grabber: usize, velocity: Vec3, frames: usize) {
        let dt = 0.1;
        let mut pos = c.registry().grabber(grabber).unwrap().pose.position;
        for _ in 0..frames {
            pos += velocity * dt;
            c.set_grabber_pose(grabber, Pose::from_position(pos));
            c.update(dt);
        }
    }

    #[test]
    fn test_release_requires_holding() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("方块"));

        assert!(!c.release(Some(g), o));
        assert!(!c.release(None, o));

        assert!(c.grab(g, o, 0));
        let other = c.register_grabber(Grabber::new("左手", HandSide::Left));
        assert!(!c.release(Some(other), o));
        assert!(c.release(Some(g), o));
    }

    #[test]
    fn test_release_slow_velocity_unscaled() {
        reset_config();
        let physics = RecordingPhysics::default();
        let velocities = physics.velocities.clone();
        let mut c = GrabController::new().with_physics(Box::new(physics));
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("杯子"));

        assert!(c.grab(g, o, 0));
        drive(&mut c, g, Vec3::new(0.5, 0.0, 0.0), 12);
        assert!(c.release(Some(g), o));

        let applied = velocities.borrow();
        assert_eq!(applied.len(), 1);
        let (_, linear, _) = applied[0];
        // 阈值之下不增幅
        assert!((linear.x - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_release_fast_velocity_boosted() {
        reset_config();
        let physics = RecordingPhysics::default();
        let velocities = physics.velocities.clone();
        let mut c = GrabController::new().with_physics(Box::new(physics));
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("飞盘"));

        assert!(c.grab(g, o, 0));
        drive(&mut c, g, Vec3::new(4.0, 0.0, 0.0), 12);
        assert!(c.release(Some(g), o));

        let applied = velocities.borrow();
        let (_, linear, _) = applied[0];
        let boost = get_config().release_boost_horizontal;
        // 远超阈值 → 满增幅
        assert!((linear.x - 4.0 * boost).abs() < 0.3);
    }

    #[test]
    fn test_release_unfreezes_physics() {
        reset_config();
        let physics = RecordingPhysics::default();
        let kinematic = physics.kinematic.clone();
        let mut c = GrabController::new().with_physics(Box::new(physics));
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("方块"));

        assert!(c.grab(g, o, 0));
        assert!(c.release(Some(g), o));

        let calls = kinematic.borrow();
        assert_eq!(calls.as_slice(), &[(o, true), (o, false)]);
    }

    #[test]
    fn test_constrained_release_stays_kinematic() {
        reset_config();
        let physics = RecordingPhysics::default();
        let kinematic = physics.kinematic.clone();
        let velocities = physics.velocities.clone();
        let mut c = GrabController::new().with_physics(Box::new(physics));
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(
            Grabbable::new("抽屉")
                .with_constraint(Constraint::translation(TranslationConstraint::LocalOffset {
                    min: Vec3::new(0.0, 0.0, -0.4),
                    max: Vec3::ZERO,
                })),
        );

        assert!(c.grab(g, o, 0));
        drive(&mut c, g, Vec3::new(3.0, 0.0, 0.0), 10);
        assert!(c.release(Some(g), o));

        // 冻结调用只有抓取那一次，无解冻、无冲量
        assert_eq!(kinematic.borrow().as_slice(), &[(o, true)]);
        assert!(velocities.borrow().is_empty());
    }

    #[test]
    fn test_place_instead_of_release() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("工具"));
        let _a = c.register_anchor(Anchor::new("挂架", Pose::from_position(Vec3::new(0.05, 0.0, 0.0))));

        assert!(c.grab(g, o, 0));
        let log = recorded(&mut c);
        assert!(c.release(Some(g), o));

        let events: Vec<EventKind> = log.borrow().iter().map(|(k, _)| *k).collect();
        // 恰好一对 Placing/Placed，该手零 Releasing/Released
        assert_eq!(events, vec![Placing, Placed]);
        assert!(c.registry().object(o).unwrap().is_anchored());
        assert!(c.held_object(g).is_none());
    }

    #[test]
    fn test_release_out_of_anchor_range_is_bare() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("工具"));
        let _a = c.register_anchor(Anchor::new("挂架", Pose::from_position(Vec3::new(5.0, 0.0, 0.0))));

        assert!(c.grab(g, o, 0));
        let log = recorded(&mut c);
        assert!(c.release(Some(g), o));

        let events: Vec<EventKind> = log.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(events, vec![Releasing, Released]);
        assert!(!c.registry().object(o).unwrap().is_anchored());
    }

    #[test]
    fn test_dependent_object_never_auto_places() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let parent = c.register_object(Grabbable::new("底座"));
        let o = c.register_object(Grabbable::new("把手"));
        assert!(c.set_parent(o, Some(parent)));
        let _a = c.register_anchor(Anchor::new("挂架", Pose::IDENTITY));

        assert!(c.grab(g, o, 0));
        let log = recorded(&mut c);
        assert!(c.release(Some(g), o));

        let events: Vec<EventKind> = log.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(events, vec![Releasing, Released]);
    }

    #[test]
    fn test_multi_hand_partial_release() {
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
        let _a = c.register_anchor(Anchor::new("枪架", Pose::IDENTITY));

        assert!(c.grab(right, o, 0));
        assert!(c.grab(left, o, 1));

        // 主持握释放：对象仍被持有，不触发放置
        assert!(c.release(Some(right), o));
        assert!(c.is_grabbed(o));
        assert_eq!(c.registry().grab(o).unwrap().primary().unwrap().grabber, left);
        assert!(!c.registry().object(o).unwrap().is_anchored());

        // 最后一只手释放：范围内锚点 → 顺手放置
        assert!(c.release(Some(left), o));
        assert!(!c.is_grabbed(o));
        assert!(c.registry().object(o).unwrap().is_anchored());
    }

    #[test]
    fn test_release_all_holders() {
        reset_config();
        let mut c = GrabController::new();
        let left = c.register_grabber(Grabber::new("左手", HandSide::Left));
        let right = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(
            Grabbable::new("箱子")
                .with_flags(ObjectFlags::MULTI_GRAB)
                .with_points(vec![
                    GrabPoint::new(Pose::from_position(Vec3::new(-0.2, 0.0, 0.0))),
                    GrabPoint::new(Pose::from_position(Vec3::new(0.2, 0.0, 0.0))),
                ]),
        );

        assert!(c.grab(left, o, 0));
        assert!(c.grab(right, o, 1));
        assert!(c.release(None, o));

        assert!(!c.is_grabbed(o));
        assert!(c.held_object(left).is_none());
        assert!(c.held_object(right).is_none());
    }

    #[test]
    fn test_release_schedules_broadcast_and_regrab_cancels() {
        reset_config();
        let mut c = GrabController::new();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("方块"));

        assert!(c.grab(g, o, 0));
        assert!(c.release(Some(g), o));
        assert!(c.scheduler.has_tag(o));

        assert!(c.grab(g, o, 0));
        assert!(!c.scheduler.has_tag(o));
    }
}
