//! 四叉相关接口

use nalgebra::{Point2, Vector2};
use num_traits::One;
use parry2d::bounding_volume::{Aabb, BoundingSphere, BoundingVolume};
use parry2d::math::Real;

use crate::pool::TreePool;
use crate::tree::{Helper, Shape, Tree};

/// 四叉树
pub type QuadTree<T> = Tree<QuadHelper, T, 4>;
/// 四叉树的缓冲池，可在多棵四叉树间共享
pub type QuadPool<T> = TreePool<Point2<Real>, T>;

#[derive(Debug, Clone)]
pub struct QuadHelper();

impl Helper<4> for QuadHelper {
    type Point = Point2<Real>;
    type Vector = Vector2<Real>;
    type Aabb = Aabb;

    fn bounds(center: &Point2<Real>, size: &Vector2<Real>) -> Aabb {
        let two = Real::one() + Real::one();
        let half = size / two;
        Aabb::new(center - half, center + half)
    }

    fn min_max(aabb: &Aabb) -> (Point2<Real>, Point2<Real>) {
        (aabb.mins, aabb.maxs)
    }

    fn aabb(min: &Point2<Real>, max: &Point2<Real>) -> Aabb {
        Aabb::new(*min, *max)
    }

    #[inline]
    fn aabb_contains_point(aabb: &Aabb, point: &Point2<Real>) -> bool {
        contains_point(aabb, point)
    }

    #[inline]
    fn center(min: &Point2<Real>, max: &Point2<Real>) -> Point2<Real> {
        let two = Real::one() + Real::one();
        min + (max - min) / two
    }

    #[inline]
    /// 判断所在的子节点
    fn get_child(center: &Point2<Real>, point: &Point2<Real>) -> usize {
        let mut i: usize = 0;
        if point.x >= center.x {
            i += 1;
        }
        if point.y >= center.y {
            i += 2;
        }
        i
    }

    #[inline]
    fn child_region(
        min: &Point2<Real>,
        max: &Point2<Real>,
        center: &Point2<Real>,
        child: usize,
    ) -> (Point2<Real>, Point2<Real>) {
        let child_min = Point2::new(
            if child & 1 == 0 { min.x } else { center.x },
            if child & 2 == 0 { min.y } else { center.y },
        );
        let child_max = Point2::new(
            if child & 1 == 0 { center.x } else { max.x },
            if child & 2 == 0 { center.y } else { max.y },
        );
        (child_min, child_max)
    }
}

// 左闭右闭，NaN不在任何包围盒内
#[inline]
fn contains_point(aabb: &Aabb, point: &Point2<Real>) -> bool {
    point.x >= aabb.mins.x
        && point.x <= aabb.maxs.x
        && point.y >= aabb.mins.y
        && point.y <= aabb.maxs.y
}

impl Shape<Point2<Real>, Aabb> for Aabb {
    fn contains_point(&self, point: &Point2<Real>) -> bool {
        contains_point(self, point)
    }
    fn contains_region(&self, region: &Aabb) -> bool {
        BoundingVolume::contains(self, region)
    }
    fn intersects_region(&self, region: &Aabb) -> bool {
        BoundingVolume::intersects(self, region)
    }
}

/// 圆查询
impl Shape<Point2<Real>, Aabb> for BoundingSphere {
    fn contains_point(&self, point: &Point2<Real>) -> bool {
        let c = self.center();
        let (dx, dy) = (point.x - c.x, point.y - c.y);
        dx * dx + dy * dy <= self.radius() * self.radius()
    }
    fn contains_region(&self, region: &Aabb) -> bool {
        // 最远的角在圆内
        let c = self.center();
        let dx = (c.x - region.mins.x).abs().max((region.maxs.x - c.x).abs());
        let dy = (c.y - region.mins.y).abs().max((region.maxs.y - c.y).abs());
        dx * dx + dy * dy <= self.radius() * self.radius()
    }
    fn intersects_region(&self, region: &Aabb) -> bool {
        // 最近的点在圆内
        let c = self.center();
        let dx = c.x - c.x.max(region.mins.x).min(region.maxs.x);
        let dy = c.y - c.y.max(region.mins.y).min(region.maxs.y);
        dx * dx + dy * dy <= self.radius() * self.radius()
    }
}

#[cfg(test)]
use crate::tree::TreeOptions;

#[test]
fn test1() {
    use slotmap::{DefaultKey, SlotMap};

    let mut tree: QuadTree<DefaultKey> =
        QuadTree::new(Point2::new(1024.0, 1024.0), Vector2::new(4096.0, 4096.0));
    let mut slot_map = SlotMap::new();
    let mut keys = Vec::new();
    for i in 0..20 {
        let key = slot_map.insert(());
        let point = Point2::new(i as f32 * 10.0, i as f32 * 5.0);
        assert_eq!(tree.add(key, point), Ok(true));
        keys.push((key, point));
    }
    assert_eq!(tree.len(), 20);
    assert!(tree.node_count() > 1);
    tree.check().unwrap();

    let aabb = Aabb::new(Point2::new(0.0, 0.0), Point2::new(45.0, 45.0));
    let result: Vec<DefaultKey> = tree.shape_cast(&aabb).copied().collect();
    assert_eq!(result.len(), 5);
    for (key, _) in keys[0..5].iter() {
        assert!(result.contains(key));
    }

    let (key, point) = keys[3];
    assert_eq!(tree.move_item(&key, &point, Point2::new(2000.0, 2000.0)), Ok(true));
    assert!(!tree.contains(&key, &point));
    assert!(tree.contains(&key, &Point2::new(2000.0, 2000.0)));
    assert_eq!(tree.shape_cast(&aabb).count(), 4);
    tree.check().unwrap();

    for (key, point) in keys.iter().skip(4) {
        assert!(tree.remove(key, point));
    }
    assert_eq!(tree.len(), 4);
    tree.check().unwrap();
}

#[test]
fn test_quadrants() {
    // 四个象限使用同一种编码，移除后树为空
    let mut tree: QuadTree<usize> = QuadTree::new(Point2::new(0.0, 0.0), Vector2::new(8.0, 8.0));
    let points = [
        Point2::new(-1.0, -1.0),
        Point2::new(1.0, -1.0),
        Point2::new(-1.0, 1.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 0.0),
        Point2::new(-4.0, 4.0),
        Point2::new(4.0, -4.0),
    ];
    for (i, p) in points.iter().enumerate() {
        assert_eq!(tree.add(i, *p), Ok(true));
    }
    assert_eq!(tree.leaf_count(), 4);
    tree.check().unwrap();
    for (i, p) in points.iter().enumerate() {
        assert!(tree.contains(&i, p));
        assert!(tree.remove(&i, p));
        assert!(!tree.contains(&i, p));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.leaf_count(), 0);
    tree.check().unwrap();
}

#[test]
fn test_bounds() {
    let mut tree: QuadTree<usize> = QuadTree::new(Point2::new(0.0, 0.0), Vector2::new(4.0, 4.0));
    assert!(tree.add(1, Point2::new(2.0, -2.0)).is_ok());
    assert!(tree.add(2, Point2::new(2.1, 0.0)).is_err());
    assert!(tree.add(3, Point2::new(Real::NAN, 0.0)).is_err());
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.version(), 1);
    assert!(!tree.remove(&2, &Point2::new(2.1, 0.0)));
    assert!(!tree.contains(&2, &Point2::new(2.1, 0.0)));
    assert_eq!(
        tree.move_item(&1, &Point2::new(2.0, -2.0), Point2::new(0.0, 3.0)),
        Ok(false)
    );
    assert!(tree.contains(&1, &Point2::new(2.0, -2.0)));
    tree.check().unwrap();
}

#[test]
fn test_duplicates() {
    let mut tree: QuadTree<usize> = QuadTree::new(Point2::new(0.0, 0.0), Vector2::new(4.0, 4.0));
    let p = Point2::new(1.0, 1.0);
    assert_eq!(tree.add(7, p), Ok(true));
    assert_eq!(tree.add(7, p), Ok(false));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.version(), 1);

    let options = TreeOptions {
        allow_duplicates: true,
        ..Default::default()
    };
    let mut tree: QuadTree<usize> =
        QuadTree::with_options(Point2::new(0.0, 0.0), Vector2::new(4.0, 4.0), options);
    assert_eq!(tree.add(7, p), Ok(true));
    assert_eq!(tree.add(7, p), Ok(true));
    assert_eq!(tree.len(), 2);
    assert!(tree.remove(&7, &p));
    assert!(tree.contains(&7, &p));
    assert!(tree.remove(&7, &p));
    assert!(!tree.contains(&7, &p));
}

#[test]
fn test_move_in_leaf() {
    let mut tree: QuadTree<usize> = QuadTree::new(Point2::new(0.0, 0.0), Vector2::new(4.0, 4.0));
    assert_eq!(tree.add(1, Point2::new(1.0, 1.0)), Ok(true));
    assert_eq!(tree.add(2, Point2::new(-1.0, -1.0)), Ok(true));
    let leaves = tree.leaf_count();
    assert_eq!(
        tree.move_item(&1, &Point2::new(1.0, 1.0), Point2::new(1.5, 0.5)),
        Ok(true)
    );
    assert_eq!(tree.leaf_count(), leaves);
    assert!(tree.contains(&1, &Point2::new(1.5, 0.5)));
    assert!(!tree.contains(&1, &Point2::new(1.0, 1.0)));
    // 移到另一个象限
    assert_eq!(
        tree.move_item(&1, &Point2::new(1.5, 0.5), Point2::new(-1.5, 0.5)),
        Ok(true)
    );
    assert!(tree.contains(&1, &Point2::new(-1.5, 0.5)));
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.leaf_count(), 2);
    // 不存在的单元
    assert_eq!(
        tree.move_item(&3, &Point2::new(-1.5, 0.5), Point2::new(1.0, 1.0)),
        Ok(false)
    );
    tree.check().unwrap();
}

#[test]
fn test_circle_cast() {
    use pcg_rand::Pcg32;
    use rand::{Rng, SeedableRng};

    let mut rng = Pcg32::seed_from_u64(1111);
    let mut tree: QuadTree<usize> =
        QuadTree::new(Point2::new(0.0, 0.0), Vector2::new(1000.0, 1000.0));
    let mut model = Vec::new();
    for i in 0..3000 {
        let p = Point2::new(rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0));
        assert_eq!(tree.add(i, p), Ok(true));
        model.push((i, p));
    }
    tree.check().unwrap();
    for _ in 0..30 {
        let center = Point2::new(rng.gen_range(-600.0..600.0), rng.gen_range(-600.0..600.0));
        let circle = BoundingSphere::new(center, rng.gen_range(1.0..300.0));
        let mut result: Vec<usize> = tree.shape_cast(&circle).copied().collect();
        result.sort_unstable();
        let mut expect: Vec<usize> = model
            .iter()
            .filter(|(_, p)| circle.contains_point(p))
            .map(|(i, _)| *i)
            .collect();
        expect.sort_unstable();
        assert_eq!(result, expect);

        let mut sink = Vec::new();
        assert_eq!(tree.shape_cast_into(&circle, &mut sink), expect.len());
        sink.sort_unstable();
        assert_eq!(sink, expect);
    }
}

#[test]
fn test_shared_pool() {
    use std::sync::Arc;

    let pool: Arc<QuadPool<usize>> = Arc::new(QuadPool::new(4, 2));
    let mut a = QuadTree::with_pool(
        Point2::new(0.0, 0.0),
        Vector2::new(16.0, 16.0),
        TreeOptions::default(),
        pool.clone(),
    );
    for i in 0..6 {
        a.add(i, Point2::new(i as f32 - 3.0, 1.0)).unwrap();
    }
    a.check().unwrap();
    let leaves = a.leaf_count();
    assert!(leaves > 0);
    drop(a);
    assert_eq!(pool.content().cached(0), leaves);

    let mut b = QuadTree::with_pool(
        Point2::new(0.0, 0.0),
        Vector2::new(16.0, 16.0),
        TreeOptions::default(),
        pool.clone(),
    );
    assert_eq!(b.collapse_count(), 4);
    b.add(1, Point2::new(1.0, 1.0)).unwrap();
    assert_eq!(pool.content().cached(0), leaves - 1);
    b.clear();
    assert_eq!(pool.content().cached(0), leaves);
    assert!(b.is_empty());
    assert_eq!(b.node_count(), 1);
}

#[cfg(test)]
fn ulp_below(x: Real) -> Real {
    if x > 0.0 {
        Real::from_bits(x.to_bits() - 1)
    } else if x < 0.0 {
        Real::from_bits(x.to_bits() + 1)
    } else {
        -Real::from_bits(1)
    }
}

#[test]
fn test_edges() {
    use pcg_rand::Pcg32;
    use rand::{Rng, SeedableRng};

    // 非整数的中心和尺寸，单元放在边界、中心及最大角附近
    let mut rng = Pcg32::seed_from_u64(4444);
    for _ in 0..300 {
        let center = Point2::new(rng.gen_range(-1000.0..1000.0), rng.gen_range(-1000.0..1000.0));
        let size = Vector2::new(rng.gen_range(1.0..2000.0), rng.gen_range(1.0..2000.0));
        let mut tree: QuadTree<usize> = QuadTree::new(center, size);
        let (mins, maxs) = (tree.bounds().mins, tree.bounds().maxs);
        let mut model = vec![maxs, mins, center, Point2::new(maxs.x, mins.y), Point2::new(mins.x, maxs.y)];
        for _ in 0..40 {
            model.push(Point2::new(
                maxs.x - rng.gen_range(0.001..0.01) * size.x,
                maxs.y - rng.gen_range(0.001..0.01) * size.y,
            ));
        }
        for (i, p) in model.iter().enumerate() {
            assert_eq!(tree.add(i, *p), Ok(true));
        }
        tree.check().unwrap();
        assert!(tree.node_count() > 1);

        let corner: Vec<usize> = tree.shape_cast(Aabb::new(maxs, maxs)).copied().collect();
        assert_eq!(corner, vec![0]);
        let corner: Vec<usize> = tree.shape_cast(Aabb::new(mins, mins)).copied().collect();
        assert_eq!(corner, vec![1]);
        assert_eq!(tree.shape_cast(BoundingSphere::new(maxs, 0.0)).count(), 1);
        assert_eq!(tree.shape_cast(Aabb::new(mins, maxs)).count(), model.len());

        let shapes = [
            Aabb::new(mins, Point2::new(ulp_below(maxs.x), maxs.y)),
            Aabb::new(mins, Point2::new(maxs.x, ulp_below(maxs.y))),
            Aabb::new(center, maxs),
            Aabb::new(mins, center),
        ];
        for shape in shapes.iter() {
            let mut result: Vec<usize> = tree.shape_cast(shape).copied().collect();
            result.sort_unstable();
            let expect: Vec<usize> = (0..model.len())
                .filter(|i| shape.contains_point(&model[*i]))
                .collect();
            assert_eq!(result, expect);
        }
    }
}
