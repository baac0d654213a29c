//! 八叉相关接口

use nalgebra::{Point3, Vector3};
use num_traits::One;
use parry3d::bounding_volume::{Aabb, BoundingSphere, BoundingVolume};
use parry3d::math::Real;

use crate::pool::TreePool;
use crate::tree::{Helper, Shape, Tree};

/// 八叉树
pub type OctTree<T> = Tree<OctHelper, T, 8>;
/// 八叉树的缓冲池，可在多棵八叉树间共享
pub type OctPool<T> = TreePool<Point3<Real>, T>;

#[derive(Debug, Clone)]
pub struct OctHelper();

impl Helper<8> for OctHelper {
    type Point = Point3<Real>;
    type Vector = Vector3<Real>;
    type Aabb = Aabb;

    fn bounds(center: &Point3<Real>, size: &Vector3<Real>) -> Aabb {
        let two = Real::one() + Real::one();
        let half = size / two;
        Aabb::new(center - half, center + half)
    }

    fn min_max(aabb: &Aabb) -> (Point3<Real>, Point3<Real>) {
        (aabb.mins, aabb.maxs)
    }

    fn aabb(min: &Point3<Real>, max: &Point3<Real>) -> Aabb {
        Aabb::new(*min, *max)
    }

    #[inline]
    fn aabb_contains_point(aabb: &Aabb, point: &Point3<Real>) -> bool {
        contains_point(aabb, point)
    }

    #[inline]
    fn center(min: &Point3<Real>, max: &Point3<Real>) -> Point3<Real> {
        let two = Real::one() + Real::one();
        min + (max - min) / two
    }

    #[inline]
    /// 判断所在的子节点
    fn get_child(center: &Point3<Real>, point: &Point3<Real>) -> usize {
        let mut i: usize = 0;
        if point.x >= center.x {
            i += 1;
        }
        if point.y >= center.y {
            i += 2;
        }
        if point.z >= center.z {
            i += 4;
        }
        i
    }

    #[inline]
    fn child_region(
        min: &Point3<Real>,
        max: &Point3<Real>,
        center: &Point3<Real>,
        child: usize,
    ) -> (Point3<Real>, Point3<Real>) {
        let child_min = Point3::new(
            if child & 1 == 0 { min.x } else { center.x },
            if child & 2 == 0 { min.y } else { center.y },
            if child & 4 == 0 { min.z } else { center.z },
        );
        let child_max = Point3::new(
            if child & 1 == 0 { center.x } else { max.x },
            if child & 2 == 0 { center.y } else { max.y },
            if child & 4 == 0 { center.z } else { max.z },
        );
        (child_min, child_max)
    }
}

// 左闭右闭，NaN不在任何包围盒内
#[inline]
fn contains_point(aabb: &Aabb, point: &Point3<Real>) -> bool {
    point.x >= aabb.mins.x
        && point.x <= aabb.maxs.x
        && point.y >= aabb.mins.y
        && point.y <= aabb.maxs.y
        && point.z >= aabb.mins.z
        && point.z <= aabb.maxs.z
}

impl Shape<Point3<Real>, Aabb> for Aabb {
    fn contains_point(&self, point: &Point3<Real>) -> bool {
        contains_point(self, point)
    }
    fn contains_region(&self, region: &Aabb) -> bool {
        BoundingVolume::contains(self, region)
    }
    fn intersects_region(&self, region: &Aabb) -> bool {
        BoundingVolume::intersects(self, region)
    }
}

/// 球查询
impl Shape<Point3<Real>, Aabb> for BoundingSphere {
    fn contains_point(&self, point: &Point3<Real>) -> bool {
        let c = self.center();
        let (dx, dy, dz) = (point.x - c.x, point.y - c.y, point.z - c.z);
        dx * dx + dy * dy + dz * dz <= self.radius() * self.radius()
    }
    fn contains_region(&self, region: &Aabb) -> bool {
        let c = self.center();
        let dx = (c.x - region.mins.x).abs().max((region.maxs.x - c.x).abs());
        let dy = (c.y - region.mins.y).abs().max((region.maxs.y - c.y).abs());
        let dz = (c.z - region.mins.z).abs().max((region.maxs.z - c.z).abs());
        dx * dx + dy * dy + dz * dz <= self.radius() * self.radius()
    }
    fn intersects_region(&self, region: &Aabb) -> bool {
        let c = self.center();
        let dx = c.x - c.x.max(region.mins.x).min(region.maxs.x);
        let dy = c.y - c.y.max(region.mins.y).min(region.maxs.y);
        let dz = c.z - c.z.max(region.mins.z).min(region.maxs.z);
        dx * dx + dy * dy + dz * dz <= self.radius() * self.radius()
    }
}

#[cfg(test)]
use crate::error::TreeError;
#[cfg(test)]
use crate::tree::TreeOptions;

#[test]
fn test1() {
    let mut tree: OctTree<&str> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    assert_eq!(tree.add("A", Point3::new(1.0, 1.0, 1.0)), Ok(true));
    assert_eq!(tree.add("B", Point3::new(-1.0, -1.0, -1.0)), Ok(true));
    let sphere = BoundingSphere::new(Point3::new(1.0, 1.0, 1.0), 0.5);
    let result: Vec<&str> = tree.shape_cast(&sphere).copied().collect();
    assert_eq!(result, vec!["A"]);

    let all = Aabb::new(Point3::new(-2.0, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0));
    let mut result: Vec<&str> = tree.shape_cast(&all).copied().collect();
    result.sort_unstable();
    assert_eq!(result, vec!["A", "B"]);

    let outside = Aabb::new(Point3::new(3.0, 3.0, 3.0), Point3::new(5.0, 5.0, 5.0));
    assert_eq!(tree.shape_cast(&outside).count(), 0);

    assert!(matches!(
        tree.add("C", Point3::new(0.0, 0.0, 2.5)),
        Err(TreeError::OutOfBounds(_))
    ));
    assert!(tree.remove(&"B", &Point3::new(-1.0, -1.0, -1.0)));
    assert!(!tree.remove(&"B", &Point3::new(-1.0, -1.0, -1.0)));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.add("A", Point3::new(1.0, 1.0, 1.0)), Ok(false));
    assert_eq!(tree.len(), 1);
    tree.check().unwrap();
}

#[test]
fn test_split_collapse() {
    let mut tree: OctTree<usize> =
        OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(16.0, 16.0, 16.0));
    let point = |i: usize| Point3::new(1.0 + i as f32 * 0.0625, 1.0, 1.0);
    for i in 0..8 {
        assert_eq!(tree.add(i, point(i)), Ok(true));
    }
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.add(8, point(8)), Ok(true));
    assert!(tree.node_count() > 1);
    assert_eq!(tree.leaf_count(), 2);
    // 分裂的工作列表借出后归还，反复使用同一个
    assert_eq!(tree.pool().cached_batches(), 1);
    tree.check().unwrap();
    for i in 0..9 {
        assert!(tree.contains(&i, &point(i)));
    }

    for i in [8, 7, 6] {
        assert!(tree.remove(&i, &point(i)));
        tree.check().unwrap();
        assert!(tree.node_count() > 1);
    }
    assert!(tree.remove(&5, &point(5)));
    tree.check().unwrap();
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.len(), 5);
    let mut items: Vec<usize> = tree.iter().map(|(i, _)| *i).collect();
    items.sort_unstable();
    assert_eq!(items, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_max_depth() {
    let options = TreeOptions {
        max_depth: 3,
        ..Default::default()
    };
    let mut tree: OctTree<usize> =
        OctTree::with_options(Point3::new(0.0, 0.0, 0.0), Vector3::new(16.0, 16.0, 16.0), options);
    let p = Point3::new(1.0, 1.0, 1.0);
    for i in 0..20 {
        assert_eq!(tree.add(i, p), Ok(true));
        tree.check().unwrap();
    }
    assert_eq!(tree.node_count(), 4);
    assert_eq!(tree.depth(), 3);
    assert_eq!(tree.leaf_count(), 1);
    assert_eq!(tree.shape_cast(BoundingSphere::new(p, 0.0)).count(), 20);
    for i in 0..20 {
        assert!(tree.remove(&i, &p));
        tree.check().unwrap();
    }
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.leaf_count(), 0);
    assert!(tree.is_empty());
}

#[test]
fn test_move_merge() {
    let mut tree: OctTree<usize> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    let a = Point3::new(1.0, 1.0, 1.0);
    let b = Point3::new(1.5, 1.5, 1.5);
    let c = Point3::new(-1.0, 1.0, 1.0);
    tree.add(1, a).unwrap();
    tree.add(1, b).unwrap();
    tree.add(1, c).unwrap();
    // 同一叶子内合并
    assert_eq!(tree.move_item(&1, &a, b), Ok(true));
    assert_eq!(tree.len(), 2);
    // 跨叶子合并
    assert_eq!(tree.move_item(&1, &c, b), Ok(true));
    assert_eq!(tree.len(), 1);
    assert!(tree.contains(&1, &b));
    tree.check().unwrap();
}

#[test]
fn test_cursor() {
    let mut tree: OctTree<usize> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    for i in 0..4 {
        tree.add(i, Point3::new(i as f32 * 0.25, 0.5, 0.5)).unwrap();
    }
    let all = Aabb::new(Point3::new(-2.0, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0));
    let mut cursor = tree.cast_cursor(all);
    assert!(matches!(cursor.next(&tree), Some(Ok(_))));
    assert_eq!(tree.pool().cached_paths(), 0);
    tree.add(9, Point3::new(-1.0, -1.0, -1.0)).unwrap();
    assert!(matches!(cursor.next(&tree), Some(Err(TreeError::Invalidated))));
    assert!(cursor.is_invalid());
    assert_eq!(tree.pool().cached_paths(), 1);
    assert!(matches!(cursor.next(&tree), Some(Err(TreeError::Invalidated))));

    // 未修改时游标返回全部单元
    let mut cursor = tree.cast_cursor(all);
    let mut count = 0;
    while let Some(item) = cursor.next(&tree) {
        assert!(item.is_ok());
        count += 1;
    }
    assert_eq!(count, 5);
    assert!(!cursor.is_invalid());
    drop(cursor);
    assert_eq!(tree.pool().cached_paths(), 1);
}

#[test]
fn test_pool_reuse() {
    let mut tree: OctTree<usize> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    for i in 0..30 {
        tree.add(i, Point3::new(i as f32 * 0.05, 0.5, -0.5)).unwrap();
    }
    let aabb = Aabb::new(Point3::new(0.0, 0.0, -1.0), Point3::new(0.52, 1.0, 0.0));
    assert_eq!(tree.shape_cast(&aabb).count(), 11);
    assert_eq!(tree.shape_cast(&aabb).count(), 11);
    assert_eq!(tree.pool().cached_paths(), 1);
    // 中途放弃的迭代器也会归还路径
    let mut iter = tree.shape_cast(&aabb);
    assert!(iter.next().is_some());
    assert_eq!(tree.pool().cached_paths(), 0);
    drop(iter);
    assert_eq!(tree.pool().cached_paths(), 1);

    let leaves = tree.leaf_count();
    tree.clear();
    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.shape_cast(&aabb).count(), 0);
    let cached: usize = (0..tree.pool().content().hierarchy())
        .map(|class| tree.pool().content().cached(class))
        .sum();
    assert!(cached >= leaves);
    tree.check().unwrap();
}

#[test]
fn test_random() {
    use pcg_rand::Pcg32;
    use rand::{Rng, SeedableRng};

    let mut rng = Pcg32::seed_from_u64(3333);
    let mut tree: OctTree<usize> =
        OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(200.0, 200.0, 200.0));
    let mut model: Vec<Option<Point3<Real>>> = Vec::new();
    let random_point = |rng: &mut Pcg32| -> Point3<Real> {
        Point3::new(
            rng.gen_range(-100.0..=100.0),
            rng.gen_range(-100.0..=100.0),
            rng.gen_range(-100.0..=100.0),
        )
    };
    for i in 0..2000 {
        let p = random_point(&mut rng);
        assert_eq!(tree.add(i, p), Ok(true));
        model.push(Some(p));
    }
    tree.check().unwrap();
    for _ in 0..500 {
        let i = rng.gen_range(0..model.len());
        if let Some(p) = model[i] {
            if rng.gen_bool(0.5) {
                assert!(tree.remove(&i, &p));
                model[i] = None;
            } else {
                let to = random_point(&mut rng);
                assert_eq!(tree.move_item(&i, &p, to), Ok(true));
                model[i] = Some(to);
            }
        }
    }
    tree.check().unwrap();
    assert_eq!(tree.len(), model.iter().filter(|p| p.is_some()).count());

    for _ in 0..20 {
        let sphere = BoundingSphere::new(random_point(&mut rng), rng.gen_range(1.0..120.0));
        let a = random_point(&mut rng);
        let b = random_point(&mut rng);
        let aabb = Aabb::new(
            Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        );
        for shape in [&sphere as &dyn Shape<Point3<Real>, Aabb>, &aabb] {
            let mut result: Vec<usize> = tree.shape_cast(shape).copied().collect();
            result.sort_unstable();
            let expect: Vec<usize> = model
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.filter(|p| shape.contains_point(p)).map(|_| i))
                .collect();
            assert_eq!(result, expect);
        }
    }
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

    let mut rng = Pcg32::seed_from_u64(5555);
    for _ in 0..200 {
        let center = Point3::new(
            rng.gen_range(-1000.0..1000.0),
            rng.gen_range(-1000.0..1000.0),
            rng.gen_range(-1000.0..1000.0),
        );
        let size = Vector3::new(
            rng.gen_range(1.0..2000.0),
            rng.gen_range(1.0..2000.0),
            rng.gen_range(1.0..2000.0),
        );
        let mut tree: OctTree<usize> = OctTree::new(center, size);
        let (mins, maxs) = (tree.bounds().mins, tree.bounds().maxs);
        let mut model = vec![maxs, mins, center, Point3::new(mins.x, maxs.y, maxs.z)];
        for _ in 0..40 {
            model.push(Point3::new(
                maxs.x - rng.gen_range(0.001..0.01) * size.x,
                maxs.y - rng.gen_range(0.001..0.01) * size.y,
                maxs.z - rng.gen_range(0.001..0.01) * size.z,
            ));
        }
        for (i, p) in model.iter().enumerate() {
            assert_eq!(tree.add(i, *p), Ok(true));
        }
        tree.check().unwrap();

        let corner: Vec<usize> = tree.shape_cast(Aabb::new(maxs, maxs)).copied().collect();
        assert_eq!(corner, vec![0]);
        let corner: Vec<usize> = tree.shape_cast(Aabb::new(mins, mins)).copied().collect();
        assert_eq!(corner, vec![1]);
        assert_eq!(tree.shape_cast(BoundingSphere::new(maxs, 0.0)).count(), 1);
        assert_eq!(tree.shape_cast(Aabb::new(mins, maxs)).count(), model.len());

        let shapes = [
            Aabb::new(mins, Point3::new(ulp_below(maxs.x), maxs.y, maxs.z)),
            Aabb::new(mins, Point3::new(maxs.x, maxs.y, ulp_below(maxs.z))),
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

#[test]
fn test_cursor_other_tree() {
    let mut a: OctTree<usize> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    let mut b: OctTree<usize> = OctTree::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(4.0, 4.0, 4.0));
    for i in 0..3 {
        a.add(i, Point3::new(1.0, 1.0, i as f32 * 0.5)).unwrap();
        b.add(i + 10, Point3::new(-1.0, -1.0, i as f32 * 0.5)).unwrap();
    }
    assert_eq!(a.version(), b.version());
    let all = Aabb::new(Point3::new(-2.0, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0));
    let mut cursor = a.cast_cursor(all);
    assert!(matches!(cursor.next(&b), Some(Err(TreeError::Invalidated))));
    assert!(cursor.is_invalid());
    assert!(matches!(cursor.next(&a), Some(Err(TreeError::Invalidated))));

    let mut cursor = a.cast_cursor(all);
    let mut items = Vec::new();
    while let Some(item) = cursor.next(&a) {
        items.push(*item.unwrap());
    }
    items.sort_unstable();
    assert_eq!(items, vec![0, 1, 2]);
}
