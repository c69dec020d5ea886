//! 手姿态查表
//!
//! 核心不计算手姿态，只把 (对象, 抓取点, 化身, 手侧) 映射为外部姿态资源
//! 的标识与混合权重，供渲染侧消费。默认实现直接读抓取点上作者标注的
//! 字段；宿主可注入自己的查表逻辑。

use crate::grabber::HandSide;
use crate::registry::GrabRegistry;

/// 查表结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandPoseSample {
    /// 姿态资源标识
    pub pose_id: u32,
    /// 混合权重 [0, 1]
    pub blend: f32,
}

/// 手姿态提供者
pub trait HandPoseProvider {
    /// 查询姿态；None 表示该点不驱动手姿态
    fn hand_pose(
        &self,
        registry: &GrabRegistry,
        object: usize,
        point: usize,
        avatar: usize,
        hand: HandSide,
    ) -> Option<HandPoseSample>;
}

/// 读取抓取点作者标注的默认提供者
#[derive(Clone, Copy, Debug, Default)]
pub struct PointPoseProvider;

impl HandPoseProvider for PointPoseProvider {
    fn hand_pose(
        &self,
        registry: &GrabRegistry,
        object: usize,
        point: usize,
        _avatar: usize,
        _hand: HandSide,
    ) -> Option<HandPoseSample> {
        let p = registry.object(object)?.point(point)?;
        p.pose_id.map(|pose_id| HandPoseSample {
            pose_id,
            blend: p.pose_blend,
        })
    }
}
