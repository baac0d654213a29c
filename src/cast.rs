//! 形状查询
//! 用显式的路径栈代替递归，路径缓冲从TreePool中借出，查询结束、失效或被丢弃时归还。
//! 父区域已被形状完全包含时，子区域不再做包含和相交判断，叶子中的单元也不再逐个判断。

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::pool::TreePool;
use crate::tree::{Child, Helper, Shape, Tree};

/// 查询路径上的一帧
#[derive(Debug, Clone, Copy)]
pub struct CastFrame<P> {
    node: u32,
    cursor: usize, // 下一个要访问的子节点
    inside: bool,  // 节点区域是否被形状完全包含
    min: P,
    max: P,
}

#[derive(Debug, Clone, Copy)]
struct LeafCursor {
    leaf: usize,
    index: usize,
    inside: bool,
}

struct CastState<P, T> {
    path: Option<Vec<CastFrame<P>>>,
    leaf: Option<LeafCursor>,
    pool: Arc<TreePool<P, T>>,
    tree: u64,
    version: u64,
}

impl<P, T> CastState<P, T> {
    // 归还路径缓冲
    fn finish(&mut self) {
        self.leaf = None;
        if let Some(path) = self.path.take() {
            self.pool.cache_path(path);
        }
    }
}

impl<P: Copy, T> CastState<P, T> {
    fn new<H, S, const N: usize>(tree: &Tree<H, T, N>, shape: &S) -> Self
    where
        H: Helper<N, Point = P>,
        S: Shape<P, H::Aabb>,
    {
        let mut path = tree.pool.take_path(tree.deep);
        if shape.intersects_region(&tree.bounds) {
            path.push(CastFrame {
                node: 0,
                cursor: 0,
                inside: shape.contains_region(&tree.bounds),
                min: tree.min,
                max: tree.max,
            });
        }
        CastState {
            path: Some(path),
            leaf: None,
            pool: tree.pool.clone(),
            tree: tree.id,
            version: tree.version,
        }
    }

    // 是否还是创建时的那棵树，且未被修改
    #[inline]
    fn matches<H: Helper<N>, const N: usize>(&self, tree: &Tree<H, T, N>) -> bool {
        self.tree == tree.id && self.version == tree.version
    }

    fn step<'a, H, S, const N: usize>(&mut self, tree: &'a Tree<H, T, N>, shape: &S) -> Option<&'a T>
    where
        H: Helper<N, Point = P>,
        S: Shape<P, H::Aabb>,
        P: 'a,
    {
        loop {
            if let Some(cursor) = self.leaf.as_mut() {
                let content = &tree.leaves[cursor.leaf].content;
                while cursor.index < content.len() {
                    let (item, point) = &content[cursor.index];
                    cursor.index += 1;
                    if cursor.inside || shape.contains_point(point) {
                        return Some(item);
                    }
                }
                self.leaf = None;
            }
            let path = self.path.as_mut()?;
            let frame = match path.last_mut() {
                Some(frame) => frame,
                None => {
                    self.finish();
                    return None;
                }
            };
            if frame.cursor == N {
                path.pop();
                continue;
            }
            let child = frame.cursor;
            frame.cursor += 1;
            let target = tree.nodes[frame.node as usize].childs[child];
            if target == Child::Empty {
                continue;
            }
            let center = H::center(&frame.min, &frame.max);
            let (min, max) = H::child_region(&frame.min, &frame.max, &center, child);
            let inside = if frame.inside {
                true
            } else {
                let region = H::aabb(&min, &max);
                if !shape.intersects_region(&region) {
                    continue;
                }
                shape.contains_region(&region)
            };
            match target {
                Child::Node(node) => path.push(CastFrame {
                    node,
                    cursor: 0,
                    inside,
                    min,
                    max,
                }),
                Child::Leaf(leaf) => {
                    self.leaf = Some(LeafCursor {
                        leaf: leaf as usize,
                        index: 0,
                        inside,
                    })
                }
                Child::Empty => (),
            }
        }
    }
}

impl<P, T> Drop for CastState<P, T> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// 借用叉树的惰性查询迭代器，借用期间叉树不能被修改
pub struct CastIter<'a, H: Helper<N>, T, S, const N: usize> {
    tree: &'a Tree<H, T, N>,
    shape: S,
    state: CastState<H::Point, T>,
}

impl<'a, H, T, S, const N: usize> Iterator for CastIter<'a, H, T, S, N>
where
    H: Helper<N>,
    S: Shape<H::Point, H::Aabb>,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        debug_assert!(self.state.matches(self.tree));
        self.state.step(self.tree, &self.shape)
    }
}

/// 不借用叉树的惰性查询游标
///
/// 每次前进时传入叉树，并检查版本号。创建后叉树被修改过，或传入的不是创建游标的那棵树，
/// 则返回TreeError::Invalidated，之后一直返回该错误。
pub struct CastCursor<H: Helper<N>, T, S, const N: usize> {
    shape: S,
    state: CastState<H::Point, T>,
    invalid: bool,
    mark: PhantomData<H>,
}

impl<H, T, S, const N: usize> CastCursor<H, T, S, N>
where
    H: Helper<N>,
    S: Shape<H::Point, H::Aabb>,
{
    pub fn next<'a>(&mut self, tree: &'a Tree<H, T, N>) -> Option<Result<&'a T>> {
        if self.invalid || !self.state.matches(tree) {
            if !self.invalid {
                log::debug!(
                    "cast cursor invalidated, tree {} version {} -> tree {} version {}",
                    self.state.tree,
                    self.state.version,
                    tree.id,
                    tree.version
                );
                self.invalid = true;
                self.state.finish();
            }
            return Some(Err(TreeError::Invalidated));
        }
        self.state.step(tree, &self.shape).map(Ok)
    }

    /// 叉树被修改后游标失效
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }
}

impl<H: Helper<N>, T, const N: usize> Tree<H, T, N> {
    /// 查询形状内的单元，返回惰性迭代器
    pub fn shape_cast<S: Shape<H::Point, H::Aabb>>(&self, shape: S) -> CastIter<'_, H, T, S, N> {
        let state = CastState::new(self, &shape);
        CastIter {
            tree: self,
            shape,
            state,
        }
    }

    /// 查询形状内的单元，返回不借用叉树的游标
    pub fn cast_cursor<S: Shape<H::Point, H::Aabb>>(&self, shape: S) -> CastCursor<H, T, S, N> {
        let state = CastState::new(self, &shape);
        CastCursor {
            shape,
            state,
            invalid: false,
            mark: PhantomData,
        }
    }

    /// 查询形状内的单元，并复制到sink中，返回复制的数量
    pub fn shape_cast_into<S: Shape<H::Point, H::Aabb>>(&self, shape: &S, sink: &mut Vec<T>) -> usize
    where
        T: Clone,
    {
        let len = sink.len();
        let mut state = CastState::new(self, shape);
        while let Some(item) = state.step(self, shape) {
            sink.push(item.clone());
        }
        sink.len() - len
    }
}
