//! 可抓取对象模块
//!
//! 对象实体、抓取点与形状细化。

mod grab_point;
mod grabbable;
mod shape;

pub use grab_point::{GrabPoint, ProximityMode, SnapFlags, SnapTarget};
pub use grabbable::{Grabbable, PlacementGlide};
pub use shape::{AxisShape, GrabShape};

use bitflags::bitflags;

bitflags! {
    /// 对象行为开关
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObjectFlags: u32 {
        /// 允许多只手同时持握
        const MULTI_GRAB = 1 << 0;
        /// 允许放置到锚点
        const PLACEABLE = 1 << 1;
        /// 有可抓取父对象时仍独立处理（不延后、不参与牵引）
        const PARENT_INDEPENDENT = 1 << 2;
        /// 被持时牵引父对象朝向（look-at 子对象）
        const CONTROL_PARENT_DIRECTION = 1 << 3;
    }
}

impl Default for ObjectFlags {
    fn default() -> Self {
        ObjectFlags::PLACEABLE
    }
}
