//! 固定范围的点叉树
//! 在给定的包围盒内存放(item, position)，支持添加、移除、移动，以及按形状惰性查询。
//! 二维为四叉树，三维为八叉树，维度由Helper决定。
//! 叶子缓冲和查询路径由TreePool管理，池可以在多棵树之间共享。

pub mod cast;
pub mod error;
pub mod oct_helper;
pub mod pool;
pub mod quad_helper;
pub mod tree;

pub use cast::{CastCursor, CastIter};
pub use error::{Result, TreeError};
pub use oct_helper::{OctHelper, OctPool, OctTree};
pub use pool::{ContentPool, FreeList, TreePool, CACHE_HIERARCHY, LEAF_CAPACITY};
pub use quad_helper::{QuadHelper, QuadPool, QuadTree};
pub use tree::{Helper, Shape, Tree, TreeOptions, COLLAPSE_COUNT, DEEP, DEEP_MAX};
