use crate::classify::LocalPartition;

classify_impl!("scan_branchless");

/// Counts the categories first, then writes every element into an exactly sized buffer without
/// branching on the comparison result. The buffer is cut into the three sequences at the end.
#[cfg_attr(feature = "no_inline_sub_functions", inline(never))]
fn classify(v: &[u8], pivot: u8) -> LocalPartition {
    let mut lt_count = 0;
    let mut gt_count = 0;
    for &elem in v {
        lt_count += (elem < pivot) as usize;
        gt_count += (elem > pivot) as usize;
    }
    let eq_count = v.len() - lt_count - gt_count;

    // Write cursor per category, indexed by `(elem >= pivot) + (elem > pivot)`.
    let mut cursors = [0, lt_count, lt_count + eq_count];
    let mut buf = vec![0u8; v.len()];

    for &elem in v {
        let category = (elem >= pivot) as usize + (elem > pivot) as usize;
        buf[cursors[category]] = elem;
        cursors[category] += 1;
    }

    let larger = buf.split_off(lt_count + eq_count);
    let equal = buf.split_off(lt_count);

    LocalPartition {
        smaller: buf,
        equal,
        larger,
    }
}
