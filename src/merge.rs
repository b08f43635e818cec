use crate::bbox::BBox;

/// Greedily unions overlapping boxes until no pair reaches `iou_threshold`.
///
/// Each pass walks the boxes in order; the current box absorbs every later box
/// it overlaps enough with, growing as it goes. Passes repeat until one of them
/// merges nothing, so the output is a fixed point of this function.
pub fn merge_boxes(boxes: &[BBox], iou_threshold: f32) -> Vec<BBox> {
    let mut boxes = boxes.to_vec();

    loop {
        let mut changed = false;
        let mut used = vec![false; boxes.len()];
        let mut out = Vec::with_capacity(boxes.len());

        for i in 0..boxes.len() {
            if used[i] {
                continue;
            }

            let mut acc = boxes[i];
            for j in i + 1..boxes.len() {
                if used[j] {
                    continue;
                }

                if acc.iou(&boxes[j]) >= iou_threshold {
                    acc = acc.union(&boxes[j]);
                    used[j] = true;
                    changed = true;
                }
            }

            used[i] = true;
            out.push(acc);
        }

        boxes = out;

        if !changed {
            return boxes;
        }
    }
}
