//! Shared math utilities for detection infrastructure.
//!
//! Provides union-find clustering and bounding-box IoU computation
//! used by the face detector and the cascade rectangle grouping.

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Partitions `0..n` into equivalence classes of the `same` predicate.
///
/// Returns one label per element; labels are dense, numbered in order of
/// first appearance.
pub fn partition(n: usize, same: impl Fn(usize, usize) -> bool) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if same(i, j) {
                union(&mut parent, i, j);
            }
        }
    }

    let mut label_of_root = vec![usize::MAX; n];
    let mut labels = Vec::with_capacity(n);
    let mut count = 0;
    for i in 0..n {
        let root = find(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = count;
            count += 1;
        }
        labels.push(label_of_root[root]);
    }
    (labels, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_bbox_iou_perfect() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((bbox_iou(&b, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_find_merges() {
        let mut parent: Vec<usize> = (0..4).collect();
        union(&mut parent, 0, 1);
        union(&mut parent, 2, 3);
        assert_eq!(find(&mut parent, 0), find(&mut parent, 1));
        assert_ne!(find(&mut parent, 1), find(&mut parent, 2));
    }

    #[test]
    fn test_partition_labels_in_first_seen_order() {
        // 0~2, 1~3
        let (labels, count) = partition(4, |a, b| a % 2 == b % 2);
        assert_eq!(count, 2);
        assert_eq!(labels, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_partition_transitive() {
        // Chain 0~1~2 via neighbours only
        let (labels, count) = partition(3, |a, b| b - a == 1);
        assert_eq!(count, 1);
        assert_eq!(labels, vec![0, 0, 0]);
    }

    #[test]
    fn test_partition_empty() {
        let (labels, count) = partition(0, |_, _| true);
        assert!(labels.is_empty());
        assert_eq!(count, 0);
    }
}
