//! Search kernel contract
//!
//! A launch covers one tile with a `grid × grid` arrangement of work items.
//! Work item `(gx, gy)` scans the sub-square
//!
//! ```text
//! x ∈ [start_x + gx·kernel_span, start_x + (gx+1)·kernel_span)
//! y ∈ [start_y + gy·kernel_span, start_y + (gy+1)·kernel_span)
//! ```
//!
//! clipped to the tile (`start + tile_span`) and to `[0, max_xy]`, and emits
//! every `(x, y)` with `x² + y² = n`. Devices collect the emitted pairs and
//! commit them to the launch's count/result buffers.

use std::ops::Range;

/// Name under which the built-in kernel is registered.
pub const SUM_OF_SQUARES_ENTRY: &str = "x2y2n";

/// Scalar arguments of a search launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgs {
    /// Target value
    pub n: u64,
    /// Tile origin
    pub start_x: u64,
    pub start_y: u64,
    /// Side of the square scanned by one work item
    pub kernel_span: u64,
    /// Side of the tile
    pub tile_span: u64,
    /// Inclusive lattice bound
    pub max_xy: u64,
}

impl KernelArgs {
    /// x values scanned by work-item column `gx`, or `None` when clipped away.
    pub fn x_range(&self, gx: u64) -> Option<Range<u64>> {
        self.axis_range(self.start_x, gx)
    }

    /// y values scanned by work-item row `gy`, or `None` when clipped away.
    pub fn y_range(&self, gy: u64) -> Option<Range<u64>> {
        self.axis_range(self.start_y, gy)
    }

    fn axis_range(&self, start: u64, g: u64) -> Option<Range<u64>> {
        let lo = start.checked_add(g.checked_mul(self.kernel_span)?)?;
        let tile_end = start.saturating_add(self.tile_span);
        let bound = self.max_xy.saturating_add(1);
        let hi = lo.saturating_add(self.kernel_span).min(tile_end).min(bound);
        (lo < hi).then_some(lo..hi)
    }
}

/// Error raised by a kernel while executing a work item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct KernelFault(pub String);

/// A search kernel executed by host-side devices.
pub trait SearchKernel: Send + Sync {
    /// Entry point name used to resolve the kernel at build time
    fn name(&self) -> &str;

    /// Execute work item `(gx, gy)` of a launch, calling `emit` for each match.
    fn run_work_item(
        &self,
        args: &KernelArgs,
        gx: u64,
        gy: u64,
        emit: &mut dyn FnMut(u64, u64),
    ) -> Result<(), KernelFault>;
}

/// Reference kernel: for each x in the work item's range solves for
/// `y = isqrt(n - x²)` and keeps exact hits that fall in the y range.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumOfSquaresKernel;

impl SearchKernel for SumOfSquaresKernel {
    fn name(&self) -> &str {
        SUM_OF_SQUARES_ENTRY
    }

    fn run_work_item(
        &self,
        args: &KernelArgs,
        gx: u64,
        gy: u64,
        emit: &mut dyn FnMut(u64, u64),
    ) -> Result<(), KernelFault> {
        let (Some(xs), Some(ys)) = (args.x_range(gx), args.y_range(gy)) else {
            return Ok(());
        };

        for x in xs {
            let Some(xx) = x.checked_mul(x).filter(|&xx| xx <= args.n) else {
                break;
            };
            let rest = args.n - xx;
            let y = isqrt(rest);
            if y * y == rest && ys.contains(&y) {
                emit(x, y);
            }
        }
        Ok(())
    }
}

/// Exact integer square root: the largest `r` with `r² <= n`.
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    // The f64 estimate can be off by one near the top of the u64 range.
    let mut r = (n as f64).sqrt() as u64;
    while r.checked_mul(r).is_none_or(|sq| sq > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= n) {
        r += 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn args(n: u64, start: (u64, u64), kernel_span: u64, tile_span: u64, max_xy: u64) -> KernelArgs {
        KernelArgs {
            n,
            start_x: start.0,
            start_y: start.1,
            kernel_span,
            tile_span,
            max_xy,
        }
    }

    fn run_grid(kernel: &dyn SearchKernel, args: &KernelArgs, grid: u64) -> Vec<(u64, u64)> {
        let mut found = Vec::new();
        for gx in 0..grid {
            for gy in 0..grid {
                kernel
                    .run_work_item(args, gx, gy, &mut |x, y| found.push((x, y)))
                    .unwrap();
            }
        }
        found.sort_unstable();
        found
    }

    #[test]
    fn isqrt_edges() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(24), 4);
        assert_eq!(isqrt(25), 5);
        assert_eq!(isqrt(u64::MAX), u32::MAX as u64);
        assert_eq!(isqrt((u32::MAX as u64) * (u32::MAX as u64)), u32::MAX as u64);
    }

    #[test]
    fn ranges_are_clipped_to_tile_and_bound() {
        let a = args(25, (3, 3), 2, 3, 6);
        assert_eq!(a.x_range(0), Some(3..5));
        assert_eq!(a.x_range(1), Some(5..6));
        assert_eq!(a.x_range(2), None);

        let edge = args(25, (6, 0), 2, 3, 6);
        assert_eq!(edge.x_range(0), Some(6..7));
        assert_eq!(edge.x_range(1), None);
    }

    #[test]
    fn single_tile_finds_all_pairs_for_25() {
        let a = args(25, (0, 0), 4, 7, 6);
        let found = run_grid(&SumOfSquaresKernel, &a, 2);
        assert_eq!(found, vec![(0, 5), (3, 4), (4, 3), (5, 0)]);
    }

    #[test]
    fn work_items_outside_tile_emit_nothing() {
        let a = args(25, (0, 0), 4, 7, 6);
        let mut hits = 0;
        SumOfSquaresKernel
            .run_work_item(&a, 5, 5, &mut |_, _| hits += 1)
            .unwrap();
        assert_eq!(hits, 0);
    }

    proptest! {
        #[test]
        fn isqrt_is_floor_sqrt(n in any::<u64>()) {
            let r = isqrt(n);
            prop_assert!(r.checked_mul(r).is_some_and(|sq| sq <= n));
            prop_assert!((r + 1).checked_mul(r + 1).is_none_or(|sq| sq > n));
        }

        #[test]
        fn kernel_matches_brute_force(n in 1u64..2_000, kernel_span in 1u64..6, grid in 1u64..4) {
            let max_xy = isqrt(n) + 1;
            let tile_span = kernel_span * grid;
            let mut found = Vec::new();
            let mut start_x = 0;
            while start_x <= max_xy {
                let mut start_y = 0;
                while start_y <= max_xy {
                    let a = args(n, (start_x, start_y), kernel_span, tile_span, max_xy);
                    found.extend(run_grid(&SumOfSquaresKernel, &a, grid));
                    start_y += tile_span;
                }
                start_x += tile_span;
            }
            found.sort_unstable();

            let mut expected = Vec::new();
            for x in 0..=max_xy {
                for y in 0..=max_xy {
                    if x * x + y * y == n {
                        expected.push((x, y));
                    }
                }
            }
            prop_assert_eq!(found, expected);
        }
    }
}
